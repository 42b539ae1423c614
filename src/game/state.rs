//! The game state machine.
//!
//! `MainMenu -> Gameplay -> GameOver -> MainMenu`, driven by [`update_state`]
//! once per frame. Transitions out of the menu and out of the game over
//! screen wait for a fresh confirm (Enter) press; holding the key across a
//! transition does not skip the next screen.

use cgmath::Point3;

use crate::{
    config::Config,
    context::{Display, World},
    data_structures::{entity::Entity, level::CpuLevel},
    error::GameError,
    render::{Camera, Lighting, RendererInit, RendererState},
    resources::{
        audio::{Audio, play_music, stop_music},
        input::{Input, KeyCode},
        window::Window,
    },
};

use super::{
    cast,
    components::{GameManager, GameOver, GameState, Paused},
    level, systems, ui,
};

pub const MENU_LEVEL: &str = "Menu";
pub const FIRST_LEVEL: &str = "Level1";
pub const MASTER_VOLUME: f32 = 0.1;
pub const CONFIRM_KEYS: [KeyCode; 2] = [KeyCode::Enter, KeyCode::NumpadEnter];

/// Whether a confirm key was down on the previous frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfirmLatch(bool);

/// The camera shown while no player exists.
pub fn menu_camera() -> Camera {
    Camera::looking_at(
        Point3::new(0.0, 0.0, 0.0) + systems::CAMERA_OFFSET,
        Point3::new(0.0, 0.0, 0.0),
    )
}

/// Creates the display entity: window, renderer state and menu camera.
pub fn setup_display(world: &mut World, window: Window, init: RendererInit) -> Result<Entity, GameError> {
    let display = world.registry.create();
    log::info!("display {:?} opened: {}", display, window.title);
    world.registry.emplace(display, window)?;
    world.registry.emplace(display, RendererState::new(init))?;
    world.registry.emplace(display, menu_camera())?;
    world.ctx.insert(Display(display));

    let lighting = match world.ctx.get::<Config>() {
        Some(config) => Lighting::from_config(config)?,
        None => Lighting::default(),
    };
    world.ctx.insert(lighting);
    Ok(display)
}

fn reset_camera(world: &mut World) {
    if let Some(display) = world.display() {
        if let Some(camera) = world.registry.try_get_mut::<Camera>(display) {
            *camera = menu_camera();
        }
    }
}

fn music(world: &World, key: &str) -> Result<Option<String>, GameError> {
    match world.ctx.get::<Config>() {
        Some(config) => Ok(Some(config.at("Music", key)?)),
        None => Ok(None),
    }
}

/// Menu music, the menu level and the menu camera.
pub fn main_menu_behavior(world: &mut World) -> Result<(), GameError> {
    log::info!("entering main menu");
    if let Some(audio) = world.ctx.get_mut::<Audio>() {
        audio.0.set_master_volume(MASTER_VOLUME);
    }
    if let Some(track) = music(world, "menu_music")? {
        play_music(world, &track)?;
    }
    let has_level = world
        .display()
        .is_some_and(|display| world.registry.has::<CpuLevel>(display));
    if !has_level {
        level::load_level(world, MENU_LEVEL)?;
    }
    reset_camera(world);
    Ok(())
}

/// `MainMenu -> Gameplay`.
pub fn start_gameplay(world: &mut World) -> Result<(), GameError> {
    log::info!("starting gameplay");
    stop_music(world);
    cast::destroy_gameplay_entities(world);
    if let Some(display) = world.display() {
        level::remove_cpu_level(world, display);
    }
    level::load_level(world, FIRST_LEVEL)?;
    if let Some(track) = music(world, "level1_music")? {
        play_music(world, &track)?;
    }
    ui::update_ui_level(world, 1);
    ui::reset_ui_score(world);
    if let Some(display) = world.display() {
        world.registry.patch::<RendererState>(display);
    }
    cast::spawn_gameplay_cast(world)?;
    world.ctx.insert(GameState::Gameplay);
    Ok(())
}

/// One gameplay frame: camera, pause toggle and the game manager's tick.
pub fn gameplay_tick(world: &mut World) {
    let manager = world.registry.view::<(GameManager,)>().front();
    if manager.is_some_and(|manager| world.registry.has::<GameOver>(manager)) {
        log::info!("session over");
        world.ctx.insert(GameState::GameOver);
        return;
    }
    systems::update_camera(world);
    systems::check_pause_pressed(world);
    let Some(manager) = manager else {
        log::debug!("no game manager to tick");
        return;
    };
    if !world.registry.has::<Paused>(manager) {
        world.registry.patch::<GameManager>(manager);
    }
}

/// `GameOver -> MainMenu`.
pub fn return_to_menu(world: &mut World) -> Result<(), GameError> {
    log::info!("returning to main menu");
    stop_music(world);
    world.ctx.insert(GameState::MainMenu);
    level::unload_level(world);
    cast::destroy_gameplay_entities(world);
    if let Some(display) = world.display() {
        world.registry.patch::<RendererState>(display);
    }
    ui::commit_high_score(world);
    main_menu_behavior(world)
}

/// A confirm key went down since the last frame.
fn confirm_pressed(world: &mut World) -> bool {
    let down = world
        .ctx
        .get::<Input>()
        .is_some_and(|input| CONFIRM_KEYS.iter().any(|key| input.is_down(*key)));
    let latch = world.ctx.emplace(ConfirmLatch::default());
    let pressed = down && !latch.0;
    latch.0 = down;
    pressed
}

fn drain_input(world: &mut World) {
    if let Some(input) = world.ctx.get_mut::<Input>() {
        input.drain();
    }
}

/// Runs the current state's frame and its transition, if any.
pub fn update_state(world: &mut World) -> Result<(), GameError> {
    let confirm = confirm_pressed(world);
    let state = world.ctx.get::<GameState>().copied().unwrap_or_default();
    match state {
        GameState::MainMenu => {
            drain_input(world);
            if confirm {
                start_gameplay(world)?;
            }
        }
        GameState::Gameplay => gameplay_tick(world),
        GameState::GameOver => {
            drain_input(world);
            if confirm {
                return_to_menu(world)?;
            }
        }
    }
    Ok(())
}
