#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet, VecDeque},
    rc::Rc,
};

use instant::Duration;
use rockflow::{
    config::Config,
    data_structures::level::{LevelData, LevelLoader, Levels, YamlLevelLoader},
    error::{AudioError, LevelError, RenderError},
    flow::GameFlow,
    game::components::GameRng,
    render::{Frame, Renderer, RendererEvent},
    resources::{
        audio::{AudioProvider, MusicTrack, SoundEffect},
        gpu::{BufferHandle, BufferUsage, GpuAllocator, GpuBuffer},
        input::{InputEvent, InputProvider, KeyCode},
        window::{Surface, Window},
    },
};

pub const FRAME: Duration = Duration::from_millis(16);

pub const CONFIG: &str = r#"
Window:
  width: 800
  height: 600
  xstart: 0
  ystart: 0
  title: Rocks
Shaders:
  vertex: shaders/vertex.wgsl
  pixel: shaders/pixel.wgsl
Renderer:
  clear_color: [0.0, 0.0, 0.1, 1.0]
Menu:
  level_file: menu.yaml
  model_path: models
Level1:
  level_file: level1.yaml
  model_path: models
Music:
  menu_music: menu.ogg
  level1_music: level1.ogg
SFX:
  shot_sound: shot.wav
  explosion_sound: explosion.wav
  ship_explosion_sound: ship_explosion.wav
Player:
  model: Ship
  hitpoints: 3
  thrust: 20.0
  drag: 0.98
  max_speed: 10.0
  turn_speed: 180.0
  fire_cooldown: 0.25
  invulnerable_time: 2.0
Projectile:
  model: Bullet
  speed: 40.0
  lifetime: 1.5
Gameplay:
  enemies: [Enemy1, Enemy2]
  score_per_hit: 100
Enemy1:
  model: Rock
  hitpoints: 1
  speed: 3.0
  initial_shatter_count: 1
Enemy2:
  model: Rock
  hitpoints: 2
  speed: 2.0
"#;

pub const MENU_LEVEL: &str = r#"
indices: [0, 1, 2]
vertices:
  - position: [0, 0, 0]
  - position: [1, 0, 0]
  - position: [1, 0, 1]
objects:
  - name: Title
    meshes:
      - geometry: { index_start: 0, index_count: 3, vertex_start: 0 }
"#;

/// An arena 100 units wide with ship, rock and bullet templates.
pub const LEVEL1: &str = r#"
indices: [0, 1, 2, 0, 2, 3, 0, 1, 2, 0, 1, 3]
vertices:
  - position: [0, 0, 0]
  - position: [1, 0, 0]
  - position: [1, 0, 1]
  - position: [0, 0, 1]
objects:
  - name: Arena
    kind: obstacle
    bounds: { center: [0, 0, 0], extent: [50, 1, 50] }
    meshes:
      - geometry: { index_start: 0, index_count: 6, vertex_start: 0 }
  - name: Ship
    kind: template
    bounds: { center: [0, 0, 0], extent: [1, 1, 1] }
    meshes:
      - geometry: { index_start: 6, index_count: 3, vertex_start: 0 }
      - geometry: { index_start: 9, index_count: 3, vertex_start: 0 }
  - name: Rock
    kind: template
    placement: { position: [20, 0, 20] }
    bounds: { center: [0, 0, 0], extent: [2, 1, 2] }
    meshes:
      - geometry: { index_start: 3, index_count: 3, vertex_start: 0 }
  - name: Bullet
    kind: template
    placement: { scale: [0.2, 0.2, 0.2] }
    bounds: { center: [0, 0, 0], extent: [0.5, 0.5, 0.5] }
    meshes:
      - geometry: { index_start: 0, index_count: 3, vertex_start: 0 }
"#;

pub fn config() -> Config {
    Config::from_str(CONFIG).unwrap()
}

/// Level loader serving the fixture levels from memory.
pub struct FixtureLevels(pub HashMap<String, String>);

impl Default for FixtureLevels {
    fn default() -> Self {
        Self(HashMap::from([
            ("menu.yaml".to_string(), MENU_LEVEL.to_string()),
            ("level1.yaml".to_string(), LEVEL1.to_string()),
        ]))
    }
}

impl LevelLoader for FixtureLevels {
    fn load(&self, level_file: &str, _model_path: &str) -> Result<LevelData, LevelError> {
        let text = self.0.get(level_file).ok_or_else(|| LevelError::Io {
            path: level_file.to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        YamlLevelLoader::parse(text)
    }
}

#[derive(Debug, Default)]
pub struct RenderLog {
    pub frames: usize,
    pub last_batches: usize,
    pub last_instances: usize,
    pub last_clear: [f32; 4],
    pub level_bound: bool,
    pub created: Vec<(String, BufferUsage)>,
    pub released: usize,
    pub pending: Vec<RendererEvent>,
}

struct MemoryBuffer {
    size: u64,
    log: Rc<RefCell<RenderLog>>,
}

impl BufferHandle for MemoryBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn write(&self, _offset: u64, _data: &[u8]) {}

    fn release(&mut self) {
        self.log.borrow_mut().released += 1;
    }
}

/// Renderer that records what it was asked to do.
#[derive(Clone, Default)]
pub struct RecordingRenderer(pub Rc<RefCell<RenderLog>>);

impl RecordingRenderer {
    pub fn raise(&self, event: RendererEvent) {
        self.0.borrow_mut().pending.push(event);
    }

    pub fn live_buffers(&self) -> usize {
        let log = self.0.borrow();
        log.created.len() - log.released
    }
}

impl GpuAllocator for RecordingRenderer {
    fn create_buffer(
        &mut self,
        label: &str,
        usage: BufferUsage,
        contents: &[u8],
    ) -> Result<GpuBuffer, RenderError> {
        self.0.borrow_mut().created.push((label.to_string(), usage));
        Ok(GpuBuffer::new(
            label,
            usage,
            Box::new(MemoryBuffer {
                size: contents.len() as u64,
                log: self.0.clone(),
            }),
        ))
    }
}

impl Renderer for RecordingRenderer {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), RenderError> {
        let mut log = self.0.borrow_mut();
        log.frames += 1;
        log.last_batches = frame.batches.len();
        log.last_instances = frame
            .batches
            .iter()
            .map(|batch| batch.instance_count as usize)
            .sum();
        log.last_clear = frame.clear.color;
        log.level_bound = frame.level.is_some();
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<RendererEvent> {
        std::mem::take(&mut self.0.borrow_mut().pending)
    }
}

#[derive(Debug, Default)]
pub struct KeyState {
    pub down: HashSet<KeyCode>,
    pub events: VecDeque<InputEvent>,
}

/// Keyboard driven by the test.
#[derive(Clone, Default)]
pub struct ScriptedInput(pub Rc<RefCell<KeyState>>);

impl ScriptedInput {
    pub fn press(&self, key: KeyCode) {
        let mut state = self.0.borrow_mut();
        state.down.insert(key);
        state.events.push_back(InputEvent::KeyPressed(key));
    }

    pub fn release(&self, key: KeyCode) {
        let mut state = self.0.borrow_mut();
        state.down.remove(&key);
        state.events.push_back(InputEvent::KeyReleased(key));
    }

    pub fn tap(&self, key: KeyCode) {
        self.press(key);
        self.release(key);
    }

    pub fn pending(&self) -> usize {
        self.0.borrow().events.len()
    }
}

impl InputProvider for ScriptedInput {
    fn is_down(&self, key: KeyCode) -> bool {
        self.0.borrow().down.contains(&key)
    }

    fn pop_event(&mut self) -> Option<InputEvent> {
        self.0.borrow_mut().events.pop_front()
    }
}

#[derive(Debug, Default)]
pub struct AudioLog {
    pub volume: Option<f32>,
    pub playing: Vec<String>,
    pub stopped: Vec<String>,
    pub sounds_played: Vec<String>,
}

struct Track {
    path: String,
    log: Rc<RefCell<AudioLog>>,
}

impl MusicTrack for Track {
    fn play(&mut self, _looping: bool) -> Result<(), AudioError> {
        self.log.borrow_mut().playing.push(self.path.clone());
        Ok(())
    }

    fn stop(&mut self) {
        let mut log = self.log.borrow_mut();
        log.playing.retain(|path| path != &self.path);
        log.stopped.push(self.path.clone());
    }
}

struct Effect {
    path: String,
    log: Rc<RefCell<AudioLog>>,
}

impl SoundEffect for Effect {
    fn play(&mut self) -> Result<(), AudioError> {
        self.log.borrow_mut().sounds_played.push(self.path.clone());
        Ok(())
    }

    fn stop(&mut self) {}
}

#[derive(Clone, Default)]
pub struct RecordingAudio(pub Rc<RefCell<AudioLog>>);

impl AudioProvider for RecordingAudio {
    fn open_music(&mut self, path: &str) -> Result<Box<dyn MusicTrack>, AudioError> {
        Ok(Box::new(Track {
            path: path.to_string(),
            log: self.0.clone(),
        }))
    }

    fn open_sound(&mut self, path: &str) -> Result<Box<dyn SoundEffect>, AudioError> {
        Ok(Box::new(Effect {
            path: path.to_string(),
            log: self.0.clone(),
        }))
    }

    fn set_master_volume(&mut self, volume: f32) {
        self.0.borrow_mut().volume = Some(volume);
    }
}

/// Window whose close flag the test flips.
#[derive(Clone, Default)]
pub struct FakeSurface(pub Rc<Cell<bool>>);

impl FakeSurface {
    pub fn close(&self) {
        self.0.set(true);
    }
}

impl Surface for FakeSurface {
    fn is_closed(&self) -> bool {
        self.0.get()
    }

    fn update(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (800, 600)
    }
}

/// Handles onto the doubles wired into a [`GameFlow`].
pub struct Harness {
    pub flow: GameFlow,
    pub renderer: RecordingRenderer,
    pub input: ScriptedInput,
    pub audio: RecordingAudio,
    pub surface: FakeSurface,
}

impl Harness {
    pub fn new() -> Self {
        let mut flow = GameFlow::new(config());
        flow.world.ctx.insert(Levels(Box::new(FixtureLevels::default())));
        flow.world.ctx.insert(GameRng::seeded(42));
        let renderer = RecordingRenderer::default();
        let input = ScriptedInput::default();
        let audio = RecordingAudio::default();
        let surface = FakeSurface::default();
        flow.attach(
            Window {
                title: "Rocks".to_string(),
                surface: Box::new(surface.clone()),
            },
            Box::new(renderer.clone()),
            Box::new(input.clone()),
            Some(Box::new(audio.clone())),
        )
        .unwrap();
        Self {
            flow,
            renderer,
            input,
            audio,
            surface,
        }
    }

    /// Runs one frame and returns whether a window is still open.
    pub fn frame(&mut self) -> bool {
        self.flow.advance(FRAME).unwrap()
    }

    pub fn frames(&mut self, count: usize) {
        for _ in 0..count {
            self.frame();
        }
    }

    /// Taps Enter and runs the frame that sees it.
    pub fn confirm(&mut self) {
        self.input.press(KeyCode::Enter);
        self.frame();
        self.input.release(KeyCode::Enter);
        self.frame();
    }
}
