//! VSUM Store - filesystem persistence for the virtual model
//!
//! Provides:
//! - One JSON artifact per registered root, keyed by location key
//! - Correspondence model persistence
//! - Atomic writes and reload of a whole storage folder
//!
//! [`FsModelStore`] implements `vsum_core::ModelPersistence`.

pub mod artifacts;
pub mod errors;

// Re-export key types
pub use artifacts::FsModelStore;
pub use errors::Result;
