//! Hierarchical game configuration.
//!
//! The config file is a YAML mapping of sections to key/value pairs:
//!
//! ```yaml
//! Player:
//!   model: Ship
//!   hitpoints: 3
//! ```
//!
//! Lookups are typed through serde. A missing section or key is a hard error:
//! configuration problems are reported at load time instead of being papered
//! over with defaults.

use std::{fs, path::Path};

use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

use crate::error::ConfigError;

#[derive(Clone, Debug, Default)]
pub struct Config {
    root: Mapping,
}

impl Config {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&text)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        let root: Mapping = serde_yaml::from_str(text)?;
        Ok(Self { root })
    }

    fn section(&self, section: &str) -> Result<&Mapping, ConfigError> {
        self.root
            .get(section)
            .and_then(Value::as_mapping)
            .ok_or_else(|| ConfigError::MissingSection(section.to_string()))
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.section(section).is_ok()
    }

    /// `section.key` deserialized as `T`.
    pub fn at<T: DeserializeOwned>(&self, section: &str, key: &str) -> Result<T, ConfigError> {
        let value = self
            .section(section)?
            .get(key)
            .ok_or_else(|| ConfigError::MissingKey {
                section: section.to_string(),
                key: key.to_string(),
            })?;
        serde_yaml::from_value(value.clone()).map_err(|source| ConfigError::Type {
            section: section.to_string(),
            key: key.to_string(),
            source,
        })
    }

    /// Like [`Config::at`] but an absent key or section yields `None`. Type
    /// errors still fail.
    pub fn opt<T: DeserializeOwned>(&self, section: &str, key: &str) -> Result<Option<T>, ConfigError> {
        match self.at(section, key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigError::MissingKey { .. } | ConfigError::MissingSection(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
