//! Seam to durable storage
//!
//! After every successful propagation the virtual model hands everything the
//! commit changed (touched root documents, removed locations and the
//! correspondence model) to its persistence collaborator in one call. This
//! happens before the live state is swapped, so a failing store aborts the
//! commit, and the store must leave no part of a failed call behind.

use serde::{Deserialize, Serialize};

use crate::correspondence::CorrespondenceModel;
use crate::errors::Result;
use crate::model::{Element, HierarchicalId};

/// One root with its whole containment tree, in pre-order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootDocument {
    pub location_key: String,
    pub root: HierarchicalId,
    pub elements: Vec<Element>,
}

impl RootDocument {
    /// The root element itself
    pub fn root_element(&self) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == self.root)
    }
}

/// Everything a storage folder holds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub documents: Vec<RootDocument>,
    pub correspondences: CorrespondenceModel,
}

/// Everything one commit changes on durable storage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedChanges {
    /// Roots to write, replacing any previous artifact at their location
    pub stored: Vec<RootDocument>,
    /// Location keys whose artifacts go away
    pub deleted: Vec<String>,
    /// The new correspondence model, when it changed
    pub correspondences: Option<CorrespondenceModel>,
}

impl PersistedChanges {
    pub fn is_empty(&self) -> bool {
        self.stored.is_empty() && self.deleted.is_empty() && self.correspondences.is_none()
    }
}

/// Durable backing store for the virtual model
///
/// One location key maps to one durable artifact.
pub trait ModelPersistence: Send + Sync {
    /// Make all of `changes` durable, or none of them
    ///
    /// # Errors
    ///
    /// Returns `Persistence` or `Serialization` errors from the backing store.
    fn write_changes(&self, changes: &PersistedChanges) -> Result<()>;

    /// Read back every stored root and the correspondence model
    ///
    /// # Errors
    ///
    /// Returns `Persistence` or `Serialization` errors from the backing store.
    fn load(&self) -> Result<PersistedState>;
}
