//! Correlation types for commit tracking and tracing
//!
//! Every commit handed to the propagation engine is stamped with a
//! [`RequestId`] so that the log lines of all its passes, the reactions it
//! executed and any error it surfaced can be joined afterwards.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single commit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new RequestId using UUIDv7 (time-ordered)
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create from an existing string (for deserialization)
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Context carried through a commit for correlation
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
}

impl RequestContext {
    /// Create a new context with a fresh RequestId
    pub fn new() -> Self {
        Self {
            request_id: RequestId::new(),
        }
    }

    /// Create a context with an existing RequestId
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self { request_id }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
