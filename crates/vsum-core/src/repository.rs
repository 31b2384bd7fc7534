//! Model repository: the named root models of one virtual model
//!
//! Reads are public. Mutation is crate-private and reachable only through
//! the propagation engine, which works on a clone and swaps it in on success.

use crate::change::EChange;
use crate::correspondence::CorrespondenceModel;
use crate::errors::Result;
use crate::model::{Element, HierarchicalId, IdAllocator, ModelSnapshot};
use crate::persistence::RootDocument;

#[derive(Debug, Clone)]
pub struct ModelRepository {
    model: ModelSnapshot,
    correspondences: CorrespondenceModel,
    ids: IdAllocator,
    revision: u64,
}

impl ModelRepository {
    pub(crate) fn new(ids: IdAllocator) -> Self {
        Self {
            model: ModelSnapshot::new(),
            correspondences: CorrespondenceModel::new(),
            ids,
            revision: 0,
        }
    }

    // ===== Reads =====

    /// Look up an element in any owned model; absence is not an error
    pub fn resolve(&self, id: &HierarchicalId) -> Option<&Element> {
        self.model.get(id)
    }

    /// Registered roots matching `predicate`, ordered by location key
    pub fn roots_of_type<F>(&self, predicate: F) -> Vec<&Element>
    where
        F: Fn(&Element) -> bool,
    {
        self.model
            .roots()
            .filter_map(|(_, id)| self.model.get(id))
            .filter(|e| predicate(e))
            .collect()
    }

    pub fn root_at(&self, location_key: &str) -> Option<&Element> {
        self.model
            .root_at(location_key)
            .and_then(|id| self.model.get(id))
    }

    /// Registered `(location_key, root_id)` pairs
    pub fn roots(&self) -> Vec<(String, HierarchicalId)> {
        self.model
            .roots()
            .map(|(k, id)| (k.to_string(), id.clone()))
            .collect()
    }

    pub fn location_of(&self, root: &HierarchicalId) -> Option<&str> {
        self.model.location_of(root)
    }

    /// Root whose containment tree holds `id`
    pub fn root_of(&self, id: &HierarchicalId) -> Option<&HierarchicalId> {
        self.model.root_of(id)
    }

    /// Incremented once per successful commit
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn model(&self) -> &ModelSnapshot {
        &self.model
    }

    /// Copy of the given roots' containment trees
    pub fn snapshot<'a>(&self, roots: impl IntoIterator<Item = &'a HierarchicalId>) -> ModelSnapshot {
        self.model.restrict_to(roots)
    }

    /// Persistable form of the root at `location_key`
    pub fn document(&self, location_key: &str) -> Option<RootDocument> {
        let root = self.model.root_at(location_key)?;
        Some(RootDocument {
            location_key: location_key.to_string(),
            root: root.clone(),
            elements: self.model.subtree_elements(root),
        })
    }

    pub fn correspondences(&self) -> &CorrespondenceModel {
        &self.correspondences
    }

    pub(crate) fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    // ===== Engine-only mutation =====

    /// Apply one record
    ///
    /// Correspondences of deleted elements are kept until
    /// [`Self::drop_dangling_correspondences`], so reactions to a deletion
    /// can still find the correspondents they must delete.
    pub(crate) fn apply(&mut self, change: &EChange) -> Result<()> {
        self.model.apply(change)
    }

    /// Remove every link with an end that is no longer live; returns how many went
    pub(crate) fn drop_dangling_correspondences(&mut self) -> usize {
        let dangling: Vec<HierarchicalId> = self
            .correspondences
            .iter()
            .flat_map(|c| [&c.source, &c.target])
            .filter(|id| !self.model.contains(id))
            .cloned()
            .collect();
        self.correspondences.remove_involving(dangling.iter())
    }

    pub(crate) fn correspondences_mut(&mut self) -> &mut CorrespondenceModel {
        &mut self.correspondences
    }

    /// Check the structural invariants before a commit is accepted
    pub(crate) fn validate(&self) -> Result<()> {
        self.model.check_integrity()
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }

    /// Re-install persisted links whose ends both resolve; returns how many were kept
    pub(crate) fn restore_correspondences(&mut self, correspondences: &CorrespondenceModel) -> usize {
        let mut kept = 0;
        for correspondence in correspondences.iter() {
            if self.model.contains(&correspondence.source)
                && self.model.contains(&correspondence.target)
                && self.correspondences.add(correspondence.clone())
            {
                kept += 1;
            }
        }
        kept
    }
}
