//! Error types.
//!
//! Missing singletons or entities are not errors: systems treat them as soft
//! no-ops. The types here cover the failures that abort an operation or, for
//! resource acquisition and configuration, the whole startup.

use thiserror::Error;

use crate::data_structures::entity::Entity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EcsError {
    #[error("{0:?} is not a live entity")]
    StaleEntity(Entity),
    #[error("{entity:?} already has a {component}")]
    AlreadyPresent {
        entity: Entity,
        component: &'static str,
    },
    #[error("{entity:?} has no {component}")]
    Missing {
        entity: Entity,
        component: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("config section [{0}] is missing")]
    MissingSection(String),
    #[error("config key {section}.{key} is missing")]
    MissingKey { section: String, key: String },
    #[error("config key {section}.{key} has the wrong type: {source}")]
    Type {
        section: String,
        key: String,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("cannot read level file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("level parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid level geometry: {0}")]
    Geometry(String),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no suitable graphics adapter: {0}")]
    Adapter(String),
    #[error("graphics device request failed: {0}")]
    Device(String),
    #[error("buffer write of {len} bytes at {offset} overflows a buffer of {size} bytes")]
    BufferOverflow { offset: u64, len: u64, size: u64 },
    #[error("cannot load shader {path}: {source}")]
    Shader {
        path: String,
        source: std::io::Error,
    },
    #[error("presentation failed: {0}")]
    Present(String),
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("cannot open audio file {0}")]
    Open(String),
    #[error("audio device unavailable: {0}")]
    Device(String),
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error(transparent)]
    Ecs(#[from] EcsError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Audio(#[from] AudioError),
}
