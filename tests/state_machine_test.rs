mod common;

use cgmath::{InnerSpace, Point3, Vector3};
use common::test_utils::*;
use instant::Duration;
use rockflow::{
    data_structures::{
        instance::Transform,
        level::{CpuLevel, GpuLevel},
        model::ModelManager,
    },
    flow::MAX_FRAME_STEP,
    game::{
        components::{
            Bounds, DeltaTime, Enemy, GameManager, GameState, GameplayKinds, Health, Paused,
            Player,
        },
        ui,
    },
    render::{Camera, RendererEvent},
    resources::{gpu::BufferUsage, input::KeyCode},
    World,
};

fn state(world: &World) -> GameState {
    *world.ctx.get::<GameState>().unwrap()
}

fn gameplay_entities(world: &World) -> usize {
    world
        .registry
        .iter()
        .filter(|entity| world.registry.any_of::<GameplayKinds>(*entity))
        .count()
}

fn enemy_positions(world: &World) -> Vec<Vector3<f32>> {
    world
        .registry
        .view::<(Enemy, Transform)>()
        .iter()
        .map(|enemy| world.registry.get::<Transform>(enemy).unwrap().position())
        .collect()
}

fn kill_player(world: &mut World) {
    let player = world.registry.view::<(Player,)>().front().unwrap();
    world.registry.get_mut::<Health>(player).unwrap().0 = 0;
}

fn vertex_uploads(harness: &Harness) -> usize {
    harness
        .renderer
        .0
        .borrow()
        .created
        .iter()
        .filter(|(_, usage)| *usage == BufferUsage::Vertex)
        .count()
}

#[test]
fn attach_opens_the_main_menu() {
    let mut harness = Harness::new();
    {
        let world = &harness.flow.world;
        assert_eq!(state(world), GameState::MainMenu);
        let display = world.display().unwrap();
        let level = world.registry.get::<CpuLevel>(display).unwrap();
        assert_eq!(level.level_file_path, "menu.yaml");
        assert!(world.registry.has::<GpuLevel>(display));
        assert!(world.ctx.get::<ModelManager>().unwrap().contains("Title"));
        assert_eq!(gameplay_entities(world), 0);
    }
    {
        let audio = harness.audio.0.borrow();
        assert_eq!(audio.volume, Some(0.1));
        assert_eq!(audio.playing, vec!["menu.ogg".to_string()]);
    }

    assert!(harness.frame());
    let log = harness.renderer.0.borrow();
    assert_eq!(log.frames, 1);
    assert!(log.level_bound);
    assert_eq!(log.last_instances, 1);
    assert_eq!(log.last_clear, [0.0, 0.0, 0.1, 1.0]);
}

#[test]
fn confirm_starts_a_session() {
    let mut harness = Harness::new();
    harness.frame();
    harness.confirm();

    let world = &harness.flow.world;
    assert_eq!(state(world), GameState::Gameplay);
    assert_eq!(world.registry.view::<(Player,)>().count(), 1);
    assert_eq!(world.registry.view::<(Enemy,)>().count(), 2);
    assert_eq!(world.registry.view::<(GameManager,)>().count(), 1);

    let display = world.display().unwrap();
    assert_eq!(
        world.registry.get::<CpuLevel>(display).unwrap().level_file_path,
        "level1.yaml"
    );
    let catalog = world.ctx.get::<ModelManager>().unwrap();
    assert!(catalog.contains("Ship") && catalog.contains("Rock"));
    assert!(!catalog.contains("Title"));

    assert_eq!(
        *world.ctx.get::<Bounds>().unwrap(),
        Bounds {
            min_x: -36.5,
            max_x: 36.5,
            min_z: -36.5,
            max_z: 36.5,
        }
    );
    assert_eq!(ui::ui_level(world), 1);
    assert_eq!(ui::ui_lives(world), 3);
    assert_eq!(ui::ui_score(world), 0);

    let camera = world.registry.get::<Camera>(display).unwrap();
    let eye = camera.position();
    assert!((eye - Point3::new(0.0, 45.0, -5.0)).magnitude() < 1e-3);

    let audio = harness.audio.0.borrow();
    assert_eq!(audio.playing, vec!["level1.ogg".to_string()]);
    assert!(audio.stopped.contains(&"menu.ogg".to_string()));
}

#[test]
fn holding_enter_does_not_skip_screens() {
    let mut harness = Harness::new();
    harness.input.press(KeyCode::Enter);
    harness.frames(5);
    assert_eq!(state(&harness.flow.world), GameState::Gameplay);

    kill_player(&mut harness.flow.world);
    harness.frames(3);
    assert_eq!(state(&harness.flow.world), GameState::GameOver);

    harness.input.release(KeyCode::Enter);
    harness.frame();
    assert_eq!(state(&harness.flow.world), GameState::GameOver);
}

#[test]
fn pause_toggles_once_per_press() {
    let mut harness = Harness::new();
    harness.confirm();
    let manager = harness
        .flow
        .world
        .registry
        .view::<(GameManager,)>()
        .front()
        .unwrap();

    harness.input.tap(KeyCode::KeyP);
    harness.input.tap(KeyCode::KeyP);
    harness.frame();
    assert!(!harness.flow.world.registry.has::<Paused>(manager));
    assert_eq!(harness.input.pending(), 0);

    harness.input.tap(KeyCode::KeyP);
    harness.frame();
    assert!(harness.flow.world.registry.has::<Paused>(manager));

    let frozen = enemy_positions(&harness.flow.world);
    harness.frames(5);
    assert_eq!(enemy_positions(&harness.flow.world), frozen);

    harness.input.tap(KeyCode::KeyP);
    harness.frame();
    assert!(!harness.flow.world.registry.has::<Paused>(manager));
    harness.frame();
    assert_ne!(enemy_positions(&harness.flow.world), frozen);
}

#[test]
fn game_over_returns_to_a_clean_menu() {
    let mut harness = Harness::new();
    harness.confirm();
    kill_player(&mut harness.flow.world);
    harness.frame();
    assert_eq!(state(&harness.flow.world), GameState::GameOver);

    // Game over waits for confirmation.
    harness.frames(3);
    assert_eq!(state(&harness.flow.world), GameState::GameOver);

    harness.confirm();
    let world = &harness.flow.world;
    assert_eq!(state(world), GameState::MainMenu);
    assert_eq!(gameplay_entities(world), 0);
    let display = world.display().unwrap();
    assert_eq!(
        world.registry.get::<CpuLevel>(display).unwrap().level_file_path,
        "menu.yaml"
    );
    assert!(!world.ctx.get::<ModelManager>().unwrap().contains("Rock"));
    assert_eq!(
        harness.audio.0.borrow().playing,
        vec!["menu.ogg".to_string()]
    );
    assert!(harness.renderer.0.borrow().level_bound);
}

#[test]
fn high_score_only_moves_up() {
    let mut harness = Harness::new();
    harness.confirm();
    ui::add_ui_score(&mut harness.flow.world, 250);
    kill_player(&mut harness.flow.world);
    harness.frame();
    harness.confirm();
    assert_eq!(ui::ui_high_score(&harness.flow.world), 250);

    harness.confirm();
    assert_eq!(ui::ui_score(&harness.flow.world), 0);
    ui::add_ui_score(&mut harness.flow.world, 100);
    kill_player(&mut harness.flow.world);
    harness.frame();
    harness.confirm();
    assert_eq!(ui::ui_high_score(&harness.flow.world), 250);
}

#[test]
fn long_frames_are_clamped() {
    let mut harness = Harness::new();
    harness.flow.advance(Duration::from_secs(3)).unwrap();
    let dt = harness.flow.world.ctx.get::<DeltaTime>().unwrap().0;
    assert!(dt <= MAX_FRAME_STEP);
    assert!(dt > 0.0);
}

#[test]
fn closing_the_window_ends_the_loop() {
    let mut harness = Harness::new();
    assert!(harness.frame());
    harness.surface.close();
    assert!(!harness.frame());
}

#[test]
fn released_resources_are_uploaded_again() {
    let mut harness = Harness::new();
    harness.frame();
    assert_eq!(vertex_uploads(&harness), 1);
    let live = harness.renderer.live_buffers();
    assert!(live >= 2);

    harness.renderer.raise(RendererEvent::ReleaseResources);
    harness.frame();

    assert_eq!(harness.renderer.0.borrow().released, live);
    assert_eq!(vertex_uploads(&harness), 2);
    assert_eq!(harness.renderer.live_buffers(), live);
    assert!(harness.renderer.0.borrow().level_bound);
}
