use std::sync::Arc;

use super::committable::CommittableView;
use super::view_type::ViewType;
use crate::model::{Element, HierarchicalId, ModelSnapshot};
use crate::vsum::VirtualModel;

/// Read-only projection of the selected roots as of one revision
///
/// A view does not own anything; it holds a copy of committed state and
/// only changes when [`View::update`] is called.
#[derive(Debug)]
pub struct View {
    pub(crate) vsum: VirtualModel,
    pub(crate) view_type: Arc<dyn ViewType>,
    pub(crate) selection: Vec<HierarchicalId>,
    pub(crate) snapshot: ModelSnapshot,
    pub(crate) revision: u64,
}

impl View {
    pub(crate) fn new(
        vsum: VirtualModel,
        view_type: Arc<dyn ViewType>,
        selection: Vec<HierarchicalId>,
    ) -> Self {
        let (snapshot, revision) = vsum.read(&selection);
        Self {
            vsum,
            view_type,
            selection,
            snapshot,
            revision,
        }
    }

    pub fn view_type(&self) -> &Arc<dyn ViewType> {
        &self.view_type
    }

    /// Selected root ids
    pub fn selection(&self) -> &[HierarchicalId] {
        &self.selection
    }

    /// Selected roots that are present in this view
    pub fn root_objects(&self) -> Vec<&Element> {
        self.selection
            .iter()
            .filter_map(|id| self.snapshot.get(id))
            .collect()
    }

    pub fn root_objects_of_type(&self, type_name: &str) -> Vec<&Element> {
        self.root_objects()
            .into_iter()
            .filter(|e| e.type_name == type_name)
            .collect()
    }

    pub fn element(&self, id: &HierarchicalId) -> Option<&Element> {
        self.snapshot.get(id)
    }

    /// Elements held by `feature` of `id`, in list order
    pub fn children(&self, id: &HierarchicalId, feature: &str) -> Vec<&Element> {
        self.snapshot
            .get(id)
            .map(|e| {
                e.references(feature)
                    .iter()
                    .filter_map(|c| self.snapshot.get(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> &ModelSnapshot {
        &self.snapshot
    }

    /// Revision of the committed state this view shows
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether commits happened since this view was read
    pub fn is_outdated(&self) -> bool {
        self.vsum.revision() != self.revision
    }

    /// Re-read committed state; roots deleted in the meantime drop out of the selection
    pub fn update(&mut self) {
        let missing = self.vsum.missing_roots(&self.selection);
        self.selection.retain(|id| !missing.contains(id));
        let (snapshot, revision) = self.vsum.read(&self.selection);
        self.snapshot = snapshot;
        self.revision = revision;
    }

    /// Turn this view into one whose edits are recorded and can be committed
    pub fn with_change_deriving_trait(self) -> CommittableView {
        CommittableView::new(self)
    }
}
