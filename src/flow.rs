//! Frame loop and application event loop.
//!
//! [`GameFlow`] owns the [`World`] and runs one frame per call to
//! [`GameFlow::frame`]. [`run`] drives it from winit: it opens the configured
//! window, builds the wgpu renderer and keyboard input, and requests frames
//! until every window reports closed.
//!
//! # Lifecycle Flow
//!
//! Each frame runs, in order:
//! 1. Tick the clock and store the clamped [`DeltaTime`]
//! 2. Update the game state machine (menu, gameplay tick, game over)
//! 3. Handle renderer events (release resources)
//! 4. Process the patches raised so far (gameplay systems, level upload)
//! 5. Destroy the entities queued for destruction
//! 6. Present
//! 7. Update windows and report whether any is still open

use std::{path::Path, sync::Arc};

use instant::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
};

use crate::{
    config::Config,
    context::World,
    data_structures::{entity::Entity, level::{Levels, YamlLevelLoader}, model::ModelManager},
    error::{ConfigError, GameError},
    game::{
        self,
        components::{DeltaTime, GameRng, GameState},
        state, ui,
    },
    render::{self, Graphics, Renderer, RendererInit},
    resources::{
        audio::{Audio, AudioProvider},
        input::{Input, InputProvider, WinitInput},
        surface::WgpuRenderer,
        window::{Window, WindowClosed, WindowSettings, WinitSurface},
    },
};

/// Longest step handed to the systems, in seconds.
pub const MAX_FRAME_STEP: f32 = 1.0 / 30.0;

/// Wall time in seconds, clamped to [`MAX_FRAME_STEP`].
pub fn clamp_delta(elapsed: Duration) -> f32 {
    elapsed.as_secs_f32().min(MAX_FRAME_STEP)
}

#[derive(Debug)]
pub struct FrameClock {
    last_time: Instant,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last_time: Instant::now(),
        }
    }

    /// Time since the previous tick.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_time);
        self.last_time = now;
        elapsed
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct GameFlow {
    pub world: World,
    clock: FrameClock,
}

impl GameFlow {
    /// A world in the main menu state with `config` and the level loader set.
    pub fn new(config: Config) -> Self {
        let mut world = World::new();
        world.ctx.insert(config);
        world.ctx.insert(Levels(Box::new(YamlLevelLoader)));
        world.ctx.insert(GameState::MainMenu);
        world.ctx.insert(DeltaTime(0.0));
        world.ctx.insert(GameRng::from_entropy());
        world.ctx.insert(ModelManager::default());
        Self {
            world,
            clock: FrameClock::new(),
        }
    }

    /// Registers the host collaborators and opens the main menu on `window`.
    pub fn attach(
        &mut self,
        window: Window,
        renderer: Box<dyn Renderer>,
        input: Box<dyn InputProvider>,
        audio: Option<Box<dyn AudioProvider>>,
    ) -> Result<Entity, GameError> {
        let init = match self.world.ctx.get::<Config>() {
            Some(config) => RendererInit::from_config(config)?,
            None => return Err(ConfigError::MissingSection("Shaders".into()).into()),
        };
        self.world.ctx.insert(Graphics(renderer));
        self.world.ctx.insert(Input(input));
        if let Some(audio) = audio {
            self.world.ctx.insert(Audio(audio));
        }
        let display = state::setup_display(&mut self.world, window, init)?;
        ui::initialize_ui(&mut self.world)?;
        state::main_menu_behavior(&mut self.world)?;
        Ok(display)
    }

    /// Runs one frame on wall time. Returns `false` once every window is closed.
    pub fn frame(&mut self) -> Result<bool, GameError> {
        let elapsed = self.clock.tick();
        self.advance(elapsed)
    }

    /// Runs one frame as if `elapsed` had passed.
    pub fn advance(&mut self, elapsed: Duration) -> Result<bool, GameError> {
        self.world.ctx.insert(DeltaTime(clamp_delta(elapsed)));
        state::update_state(&mut self.world)?;
        render::process_renderer_events(&mut self.world);
        game::process_patches(&mut self.world)?;
        let destroyed = self.world.registry.flush_destroyed();
        if destroyed > 0 {
            log::debug!("{} entities destroyed", destroyed);
        }
        render::present(&mut self.world)?;
        update_windows(&mut self.world)
    }
}

/// Updates every open window and tags the ones that closed. Returns whether
/// any window is still open.
pub fn update_windows(world: &mut World) -> Result<bool, GameError> {
    for entity in world
        .registry
        .view::<(Window,)>()
        .without::<(WindowClosed,)>()
        .entities()
    {
        let Some(window) = world.registry.try_get_mut::<Window>(entity) else {
            continue;
        };
        window.surface.update()?;
        if window.surface.is_closed() {
            log::info!("window {} closed", window.title);
            world.registry.emplace(entity, WindowClosed)?;
        }
    }
    Ok(!world
        .registry
        .view::<(Window,)>()
        .without::<(WindowClosed,)>()
        .is_empty())
}

struct App {
    flow: GameFlow,
    settings: WindowSettings,
    audio: Option<Box<dyn AudioProvider>>,
    window: Option<Arc<winit::window::Window>>,
    error: Option<anyhow::Error>,
}

impl App {
    fn open(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window = Arc::new(event_loop.create_window(self.settings.attributes())?);
        let init = match self.flow.world.ctx.get::<Config>() {
            Some(config) => RendererInit::from_config(config)?,
            None => anyhow::bail!("no config loaded"),
        };
        let renderer = futures::executor::block_on(WgpuRenderer::new(window.clone(), &init))?;
        self.flow.attach(
            Window {
                title: self.settings.title.clone(),
                surface: Box::new(WinitSurface::new(window.clone())),
            },
            Box::new(renderer),
            Box::new(WinitInput::default()),
            self.audio.take(),
        )?;
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn step(&mut self, event_loop: &ActiveEventLoop) {
        match self.flow.frame() {
            Ok(true) => (),
            Ok(false) => event_loop.exit(),
            Err(e) => {
                log::error!("frame failed: {}", e);
                self.error = Some(e.into());
                event_loop.exit();
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.open(event_loop) {
            log::error!("startup failed: {}", e);
            self.error = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let world = &mut self.flow.world;
        if let Some(input) = world.ctx.get_mut::<Input>() {
            input.0.handle_window_event(&event);
        }
        for entity in world.registry.view::<(Window,)>().entities() {
            if let Some(window) = world.registry.try_get_mut::<Window>(entity) {
                window.surface.handle_window_event(&event);
            }
        }

        match event {
            WindowEvent::Resized(size) => {
                if let Some(graphics) = world.ctx.get_mut::<Graphics>() {
                    graphics.0.resize(size.width, size.height);
                }
            }
            WindowEvent::CloseRequested | WindowEvent::RedrawRequested => self.step(event_loop),
            _ => (),
        }
    }
}

/// Loads the config at `config_path` and runs the game until its window is
/// closed. Audio is optional; without it the game runs silent.
pub fn run(
    config_path: impl AsRef<Path>,
    audio: Option<Box<dyn AudioProvider>>,
) -> anyhow::Result<()> {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    };

    let config = Config::from_path(config_path)?;
    let settings = WindowSettings::from_config(&config)?;

    let event_loop = EventLoop::new()?;
    let mut app = App {
        flow: GameFlow::new(config),
        settings,
        audio,
        window: None,
        error: None,
    };
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
