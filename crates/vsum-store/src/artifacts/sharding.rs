//! Artifact naming
//!
//! Location keys are arbitrary strings (they may contain path separators),
//! so artifacts are named after the SHA-256 of the key and sharded into
//! subdirectories by the first 2 hex characters of that digest.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hex SHA-256 of a location key
pub fn location_digest(location_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(location_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compute the shard path for a given digest
///
/// For digest "abc123...", returns "<root>/ab/abc123.<ext>"
pub fn shard_path(root: &Path, digest: &str, extension: &str) -> PathBuf {
    let shard = &digest[..2.min(digest.len())];

    root.join(shard).join(format!("{}.{}", digest, extension))
}
