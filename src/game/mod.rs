//! Asteroids gameplay on top of the entity store.

pub mod cast;
pub mod components;
pub mod level;
pub mod state;
pub mod systems;
pub mod ui;

use crate::{context::World, error::GameError, render::RendererState};

use components::GameManager;

/// Handles the patches raised since the last call, in the order they were
/// raised. Patches raised while handling are left for the next frame.
pub fn process_patches(world: &mut World) -> Result<(), GameError> {
    for patch in world.registry.drain_patches() {
        if !world.registry.valid(patch.entity) {
            continue;
        }
        if patch.is::<GameManager>() {
            systems::run_gameplay(world)?;
        } else if patch.is::<RendererState>() {
            level::sync_renderer_level(world)?;
        }
    }
    Ok(())
}
