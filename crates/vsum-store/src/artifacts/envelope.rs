//! On-disk artifact envelopes
//!
//! Every artifact is a pretty-printed JSON object carrying the format
//! version and the time it was written next to the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vsum_core::{CorrespondenceModel, RootDocument};

/// Format version written by this crate
pub const SCHEMA_VERSION: u32 = 1;

/// One root document as stored under `models/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootArtifact {
    pub schema_version: u32,
    pub saved_at: DateTime<Utc>,
    pub document: RootDocument,
}

impl RootArtifact {
    pub fn new(document: RootDocument) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            saved_at: Utc::now(),
            document,
        }
    }
}

/// The correspondence model as stored in `correspondences.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrespondenceArtifact {
    pub schema_version: u32,
    pub saved_at: DateTime<Utc>,
    pub correspondences: CorrespondenceModel,
}

impl CorrespondenceArtifact {
    pub fn new(correspondences: CorrespondenceModel) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            saved_at: Utc::now(),
            correspondences,
        }
    }
}
