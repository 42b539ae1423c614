//! rockflow
//!
//! The core of a small asteroids-style game: a sparse-set entity store with
//! typed context singletons, a model catalog filled from level files,
//! per-instance copies of multi-mesh models, the menu/gameplay/game over state
//! machine, the per-frame gameplay systems, and a bridge that turns entity
//! state into instanced draws for a wgpu renderer.
//!
//! High-level modules
//! - `context`: the typed singleton area and the `World` every system receives
//! - `data_structures`: entity store, instance records, models and levels
//! - `game`: gameplay components, systems, UI counters and the state machine
//! - `render`: instance synchronization and the presentation bridge
//! - `resources`: GPU buffers, audio, input, windows and the wgpu renderer
//! - `flow`: frame clock and the main loop
//! - `config`, `error`: configuration lookup and error types
//!

pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod game;
pub mod render;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use context::World;
pub use flow::{GameFlow, run};
pub use resources::input::KeyCode;
