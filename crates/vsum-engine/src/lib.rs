//! VSUM Engine - assembly layer
//!
//! Builds a ready-to-use [`vsum_core::VirtualModel`] from propagation
//! specifications, a user interaction and optional filesystem storage,
//! either programmatically or from a TOML configuration file.

pub mod builder;
pub mod config;

pub use builder::VirtualModelBuilder;
pub use config::{ConfigError, InitialBuild, VsumConfig};
