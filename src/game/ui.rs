//! Lives, score and level counters.
//!
//! The counters live on a single entity carrying [`UiComponents`]. Every
//! function here looks it up through a view and does nothing when it is
//! missing; none of them creates it.

use crate::{context::World, data_structures::entity::Entity, error::EcsError};

use super::components::UiComponents;

fn ui_entity(world: &World) -> Option<Entity> {
    world.registry.view::<(UiComponents,)>().front()
}

fn with_ui(world: &mut World, update: impl FnOnce(&mut UiComponents)) {
    let Some(entity) = ui_entity(world) else {
        log::debug!("no UI entity, counter update skipped");
        return;
    };
    if let Some(ui) = world.registry.try_get_mut::<UiComponents>(entity) {
        update(ui);
    }
}

fn read_ui(world: &World, read: impl FnOnce(&UiComponents) -> i32) -> i32 {
    ui_entity(world)
        .and_then(|entity| world.registry.try_get::<UiComponents>(entity))
        .map(read)
        .unwrap_or(0)
}

/// Creates the UI entity with every counter at zero.
pub fn initialize_ui(world: &mut World) -> Result<Entity, EcsError> {
    if let Some(entity) = ui_entity(world) {
        return Ok(entity);
    }
    let entity = world.registry.create();
    world.registry.emplace(entity, UiComponents::default())?;
    Ok(entity)
}

pub fn update_ui_level(world: &mut World, level: i32) {
    with_ui(world, |ui| ui.current_level = level);
}

pub fn update_ui_lives(world: &mut World, lives: i32) {
    with_ui(world, |ui| ui.lives = lives);
}

/// Adds `points` to the running score.
pub fn add_ui_score(world: &mut World, points: i32) {
    with_ui(world, |ui| {
        ui.current_score += points;
        log::debug!("score {}", ui.current_score);
    });
}

pub fn reset_ui_score(world: &mut World) {
    with_ui(world, |ui| ui.current_score = 0);
}

pub fn update_ui_high_score(world: &mut World, score: i32) {
    with_ui(world, |ui| ui.high_score = score);
}

/// The running score, 0 without a UI entity.
pub fn ui_score(world: &World) -> i32 {
    read_ui(world, |ui| ui.current_score)
}

/// The high score, 0 without a UI entity.
pub fn ui_high_score(world: &World) -> i32 {
    read_ui(world, |ui| ui.high_score)
}

pub fn ui_lives(world: &World) -> i32 {
    read_ui(world, |ui| ui.lives)
}

pub fn ui_level(world: &World) -> i32 {
    read_ui(world, |ui| ui.current_level)
}

/// Stores the running score as the high score if it beats it.
pub fn commit_high_score(world: &mut World) -> bool {
    let score = ui_score(world);
    if score > ui_high_score(world) {
        update_ui_high_score(world, score);
        log::info!("new high score {}", score);
        true
    } else {
        false
    }
}
