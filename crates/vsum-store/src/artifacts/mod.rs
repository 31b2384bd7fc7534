//! Durable artifacts of a storage folder
//!
//! Provides:
//! - Filesystem store with atomic temp→rename writes
//! - Location-key digests and sharded artifact paths
//! - Versioned JSON envelopes

mod atomic;
mod envelope;
mod fs_store;
mod sharding;

pub use envelope::{CorrespondenceArtifact, RootArtifact, SCHEMA_VERSION};
pub use fs_store::FsModelStore;
pub use sharding::location_digest;
