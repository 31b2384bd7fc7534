use std::collections::BTreeSet;

use vsum_core_types::RequestContext;

use super::readonly::View;
use crate::change::{diff, resequence, EChange};
use crate::errors::{Result, VsumError};
use crate::model::{Element, HierarchicalId, ModelSnapshot, Value};
use crate::propagation::PropagationReport;

/// View whose edits are buffered on a private surface and turned into a
/// change batch by diffing against the baseline on commit
///
/// Nothing is visible to the virtual model or to other views until
/// [`CommittableView::commit_changes`] succeeds. A failed commit leaves the
/// surface as it was, so the caller may fix it up or [`revert`](Self::revert).
#[derive(Debug)]
pub struct CommittableView {
    view: View,
    surface: ModelSnapshot,
}

impl CommittableView {
    pub(crate) fn new(view: View) -> Self {
        let surface = view.snapshot.clone();
        Self { view, surface }
    }

    /// The baseline this view was read at
    pub fn baseline(&self) -> &View {
        &self.view
    }

    pub fn revision(&self) -> u64 {
        self.view.revision
    }

    pub fn is_outdated(&self) -> bool {
        self.view.is_outdated()
    }

    // ===== Reads (from the edited surface) =====

    /// Roots registered on the surface, including ones created in this view
    pub fn root_objects(&self) -> Vec<&Element> {
        self.surface
            .roots()
            .filter_map(|(_, id)| self.surface.get(id))
            .collect()
    }

    pub fn root_objects_of_type(&self, type_name: &str) -> Vec<&Element> {
        self.root_objects()
            .into_iter()
            .filter(|e| e.type_name == type_name)
            .collect()
    }

    pub fn element(&self, id: &HierarchicalId) -> Option<&Element> {
        self.surface.get(id)
    }

    pub fn children(&self, id: &HierarchicalId, feature: &str) -> Vec<&Element> {
        self.surface
            .get(id)
            .map(|e| {
                e.references(feature)
                    .iter()
                    .filter_map(|c| self.surface.get(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> &ModelSnapshot {
        &self.surface
    }

    // ===== Edits =====

    /// Create a root and register it at `location_key`
    ///
    /// # Errors
    ///
    /// Returns `DuplicateLocation` if the key is taken on this surface.
    pub fn register_root(&mut self, type_name: &str, location_key: &str) -> Result<HierarchicalId> {
        if self.surface.root_at(location_key).is_some() {
            return Err(VsumError::DuplicateLocation {
                location_key: location_key.to_string(),
            });
        }
        let id = self.view.vsum.ids().new_root_id();
        self.surface.create_element(id.clone(), type_name)?;
        self.surface.insert_root(location_key, &id)?;
        Ok(id)
    }

    /// Create an element appended to the list containment `feature` of `container`
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if `container` is not on the surface, or
    /// `InvalidChange` if `feature` is not a list containment.
    pub fn create_element(
        &mut self,
        container: &HierarchicalId,
        feature: &str,
        type_name: &str,
    ) -> Result<HierarchicalId> {
        let index = self.list_len(container, feature)?;
        let id = self.view.vsum.ids().new_id(container, feature);
        self.surface.create_element(id.clone(), type_name)?;
        if let Err(e) = self
            .surface
            .insert_reference(container, feature, &id, index, true)
        {
            self.surface.delete_element(&id)?;
            return Err(e);
        }
        Ok(id)
    }

    /// Create an element as the occupant of the single containment
    /// `feature`, deleting the previous occupant
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if `container` is not on the surface, or
    /// `InvalidChange` if `feature` is not a single containment.
    pub fn set_contained(
        &mut self,
        container: &HierarchicalId,
        feature: &str,
        type_name: &str,
    ) -> Result<HierarchicalId> {
        let previous = self.element_ref(container)?.reference(feature).cloned();
        let id = self.view.vsum.ids().new_id(container, feature);
        self.surface.create_element(id.clone(), type_name)?;
        if let Err(e) = self.surface.replace_reference(
            container,
            feature,
            previous.as_ref(),
            Some(&id),
            true,
        ) {
            self.surface.delete_element(&id)?;
            return Err(e);
        }
        if let Some(previous) = previous {
            self.surface.delete_element(&previous)?;
        }
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `ElementNotFound` if the element is not on the surface.
    pub fn set_attribute(
        &mut self,
        id: &HierarchicalId,
        feature: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.surface.set_attribute(id, feature, value.into())?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ElementNotFound` if the element is not on the surface.
    pub fn unset_attribute(&mut self, id: &HierarchicalId, feature: &str) -> Result<()> {
        self.surface.unset_attribute(id, feature)?;
        Ok(())
    }

    /// Append `target` to the list cross reference `feature`
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if either end is not on the surface, or
    /// `InvalidChange` if `target` is already referenced or the feature has
    /// another shape.
    pub fn add_reference(
        &mut self,
        id: &HierarchicalId,
        feature: &str,
        target: &HierarchicalId,
    ) -> Result<()> {
        let index = self.list_len(id, feature)?;
        self.surface.insert_reference(id, feature, target, index, false)
    }

    /// Remove `target` from the list reference `feature`
    ///
    /// A removed containment target is deleted on commit.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChange` if `target` is not referenced there.
    pub fn remove_reference(
        &mut self,
        id: &HierarchicalId,
        feature: &str,
        target: &HierarchicalId,
    ) -> Result<()> {
        let index = self.position(id, feature, target)?;
        self.surface.remove_reference(id, feature, target, index)
    }

    /// Point the single cross reference `feature` at `target`, or clear it
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if either end is not on the surface, or
    /// `InvalidChange` if the feature has another shape.
    pub fn set_reference(
        &mut self,
        id: &HierarchicalId,
        feature: &str,
        target: Option<&HierarchicalId>,
    ) -> Result<()> {
        let current = self.element_ref(id)?.reference(feature).cloned();
        if current.as_ref() == target {
            return Ok(());
        }
        self.surface
            .replace_reference(id, feature, current.as_ref(), target, false)
    }

    /// Move `target` to index `to` of the list reference `feature`
    ///
    /// # Errors
    ///
    /// Returns `InvalidChange` if `target` is not referenced there or `to`
    /// is out of range.
    pub fn move_reference(
        &mut self,
        id: &HierarchicalId,
        feature: &str,
        target: &HierarchicalId,
        to: usize,
    ) -> Result<()> {
        let from = self.position(id, feature, target)?;
        if from == to {
            return Ok(());
        }
        self.surface.move_reference(id, feature, target, from, to)
    }

    /// Delete an element with its containment subtree; a root is unregistered
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the element is not on the surface.
    pub fn delete_element(&mut self, id: &HierarchicalId) -> Result<()> {
        self.surface.delete_element(id)?;
        Ok(())
    }

    // ===== Commit =====

    /// Whether the surface differs from the baseline
    pub fn has_uncommitted_changes(&self) -> bool {
        let mut candidate = self.surface.clone();
        candidate.prune_detached();
        candidate != self.view.snapshot
    }

    /// Discard every uncommitted edit
    pub fn revert(&mut self) {
        self.surface = self.view.snapshot.clone();
    }

    /// Derive a batch from the edits, pass it through the view type and
    /// propagate it
    ///
    /// On success the view is refreshed to the committed state of the roots
    /// now on its surface.
    ///
    /// # Errors
    ///
    /// Returns `FilterViolation` if the view type's transformation refers to
    /// an element outside this view, `StaleView` if a selected root was
    /// removed since the view was read, or any propagation error.
    pub fn commit_changes(&mut self) -> Result<PropagationReport> {
        self.commit_changes_with(RequestContext::new())
    }

    /// Like [`Self::commit_changes`], correlated under the caller's request id
    ///
    /// # Errors
    ///
    /// Same as [`Self::commit_changes`].
    pub fn commit_changes_with(&mut self, ctx: RequestContext) -> Result<PropagationReport> {
        let mut candidate = self.surface.clone();
        let pruned = candidate.prune_detached();
        if !pruned.is_empty() {
            tracing::debug!(pruned = pruned.len(), "pruned detached elements before commit");
        }

        let derived = diff(&self.view.snapshot, &candidate);
        let mut batch = self.view.view_type.transform_commit(derived);
        self.check_scope(&batch, &candidate)?;
        resequence(&mut batch);

        if batch.is_empty() {
            tracing::debug!(
                request_id = ctx.request_id.as_str(),
                revision = self.view.revision,
                "nothing to commit"
            );
            return Ok(PropagationReport {
                request_id: ctx.request_id,
                passes: 0,
                changes: Vec::new(),
                produced: 0,
                executed: 0,
                revision: self.view.revision,
            });
        }

        let report = self.view.vsum.commit_view(batch, &self.view.selection, ctx)?;

        self.view.selection = candidate.roots().map(|(_, id)| id.clone()).collect();
        let (snapshot, revision) = self.view.vsum.read(&self.view.selection);
        self.surface = snapshot.clone();
        self.view.snapshot = snapshot;
        self.view.revision = revision;
        Ok(report)
    }

    /// Every id a record touches must be known to the baseline or the candidate
    fn check_scope(&self, batch: &[EChange], candidate: &ModelSnapshot) -> Result<()> {
        let known: BTreeSet<&HierarchicalId> = self
            .view
            .snapshot
            .elements()
            .chain(candidate.elements())
            .map(|e| &e.id)
            .collect();
        for change in batch {
            if let Some(outside) = change
                .referenced_ids()
                .into_iter()
                .find(|id| !known.contains(id))
            {
                return Err(VsumError::FilterViolation {
                    element: outside.to_string(),
                });
            }
        }
        Ok(())
    }

    fn element_ref(&self, id: &HierarchicalId) -> Result<&Element> {
        self.surface
            .get(id)
            .ok_or_else(|| VsumError::ElementNotFound { id: id.to_string() })
    }

    fn list_len(&self, id: &HierarchicalId, feature: &str) -> Result<usize> {
        Ok(self.element_ref(id)?.references(feature).len())
    }

    fn position(&self, id: &HierarchicalId, feature: &str, target: &HierarchicalId) -> Result<usize> {
        self.element_ref(id)?
            .references(feature)
            .iter()
            .position(|t| t == target)
            .ok_or_else(|| {
                VsumError::invalid_change(format!("{} is not referenced by {}.{}", target, id, feature))
            })
    }
}
