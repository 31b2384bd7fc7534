//! Configuration loading for a virtual model
//!
//! The configuration is stored in TOML format and defines:
//! - Where durable artifacts live (optional; in-memory otherwise)
//! - Propagation mode and loop guard
//! - Whether to start empty or reload the storage folder
//! - The logging profile

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use vsum_core::logging_facility::{self, Profile};
use vsum_core::PropagationSettings;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// What `build_and_initialize` does with the storage folder
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InitialBuild {
    /// Start with no roots; artifacts already in the folder are overwritten as roots are committed
    #[default]
    Empty,
    /// Restore every stored root and the correspondence model without running reactions
    Reload,
}

/// Virtual model configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VsumConfig {
    /// Storage folder for durable artifacts.
    #[serde(default)]
    pub storage_folder: Option<PathBuf>,

    /// Propagation mode and loop guard.
    #[serde(default)]
    pub propagation: PropagationSettings,

    #[serde(default)]
    pub initial_build: InitialBuild,

    #[serde(default)]
    pub logging_profile: Profile,
}

impl VsumConfig {
    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: VsumConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration (pure function).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.propagation.max_passes == 0 {
            return Err(ConfigError::ValidationError(
                "propagation.max_passes must be at least 1".to_string(),
            ));
        }
        if self.initial_build == InitialBuild::Reload && self.storage_folder.is_none() {
            return Err(ConfigError::ValidationError(
                "initial_build = \"reload\" requires a storage_folder".to_string(),
            ));
        }
        Ok(())
    }

    /// Initialize the logging facility with the configured profile
    pub fn init_logging(&self) {
        logging_facility::init(self.logging_profile);
    }
}
