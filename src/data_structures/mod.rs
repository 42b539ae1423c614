//! Entity store and the data it holds.
//!
//! - `entity`, `registry` and `view` make up the sparse-set entity store
//! - `instance` holds per-instance transforms and the GPU instance records
//! - `model` has mesh ranges, bounding boxes and the model catalog
//! - `level` is the CPU/GPU level split and the level file loader

pub mod entity;
pub mod instance;
pub mod level;
pub mod model;
pub mod registry;
pub mod view;
