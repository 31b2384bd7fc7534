use std::collections::BTreeSet;
use std::sync::Arc;

use super::readonly::View;
use super::view_type::ViewType;
use crate::errors::{Result, VsumError};
use crate::model::HierarchicalId;
use crate::vsum::VirtualModel;

/// A root that can be included in a view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectableRoot {
    pub id: HierarchicalId,
    pub type_name: String,
    pub location_key: String,
}

/// Chooses the roots a view will cover
///
/// The selectable roots are fixed when the selector is created.
#[derive(Debug)]
pub struct Selector {
    vsum: VirtualModel,
    view_type: Arc<dyn ViewType>,
    selectable: Vec<SelectableRoot>,
    selected: BTreeSet<HierarchicalId>,
}

impl Selector {
    pub(crate) fn new(
        vsum: VirtualModel,
        view_type: Arc<dyn ViewType>,
        selectable: Vec<SelectableRoot>,
    ) -> Self {
        Self {
            vsum,
            view_type,
            selectable,
            selected: BTreeSet::new(),
        }
    }

    pub fn selectable_elements(&self) -> &[SelectableRoot] {
        &self.selectable
    }

    /// Include or exclude one root
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if `root` is not selectable.
    pub fn set_selected(&mut self, root: &HierarchicalId, selected: bool) -> Result<()> {
        if !self.selectable.iter().any(|s| &s.id == root) {
            return Err(VsumError::ElementNotFound {
                id: root.to_string(),
            });
        }
        if selected {
            self.selected.insert(root.clone());
        } else {
            self.selected.remove(root);
        }
        Ok(())
    }

    pub fn select_all(&mut self) -> &mut Self {
        self.selected = self.selectable.iter().map(|s| s.id.clone()).collect();
        self
    }

    /// Select every root whose type is one of `types`
    pub fn select_types(&mut self, types: &[&str]) -> &mut Self {
        self.selected.extend(
            self.selectable
                .iter()
                .filter(|s| types.contains(&s.type_name.as_str()))
                .map(|s| s.id.clone()),
        );
        self
    }

    pub fn is_selected(&self, root: &HierarchicalId) -> bool {
        self.selected.contains(root)
    }

    pub fn selected(&self) -> impl Iterator<Item = &HierarchicalId> {
        self.selected.iter()
    }

    /// Read-only view over the selected roots
    pub fn create_view(&self) -> View {
        View::new(
            self.vsum.clone(),
            self.view_type.clone(),
            self.selected.iter().cloned().collect(),
        )
    }
}
