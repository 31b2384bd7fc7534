//! Tagged links between elements of different models
//!
//! Reactions record which target elements they derived from which source
//! elements, and look them up again when the source changes. Links are
//! symmetric: a lookup from either end finds the other.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::HierarchicalId;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Correspondence {
    pub source: HierarchicalId,
    pub target: HierarchicalId,
    /// Free-form discriminator chosen by the reaction (e.g. `"person"`)
    pub tag: String,
}

impl Correspondence {
    pub fn new(source: HierarchicalId, target: HierarchicalId, tag: impl Into<String>) -> Self {
        Self {
            source,
            target,
            tag: tag.into(),
        }
    }

    /// The end opposite to `id`, if `id` is one of the ends
    pub fn other_end(&self, id: &HierarchicalId) -> Option<&HierarchicalId> {
        if &self.source == id {
            Some(&self.target)
        } else if &self.target == id {
            Some(&self.source)
        } else {
            None
        }
    }

    pub fn involves(&self, id: &HierarchicalId) -> bool {
        &self.source == id || &self.target == id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrespondenceModel {
    links: BTreeSet<Correspondence>,
}

impl CorrespondenceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a link; returns whether it was new
    pub fn add(&mut self, correspondence: Correspondence) -> bool {
        self.links.insert(correspondence)
    }

    /// Remove a link; returns whether it existed
    pub fn remove(&mut self, correspondence: &Correspondence) -> bool {
        self.links.remove(correspondence)
    }

    /// Elements linked to `id`, optionally restricted to one tag
    pub fn corresponding(&self, id: &HierarchicalId, tag: Option<&str>) -> Vec<HierarchicalId> {
        self.links
            .iter()
            .filter(|c| tag.map_or(true, |t| c.tag == t))
            .filter_map(|c| c.other_end(id).cloned())
            .collect()
    }

    /// Drop every link with an end in `ids`; returns how many were dropped
    pub fn remove_involving<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a HierarchicalId>,
    ) -> usize {
        let ids: BTreeSet<&HierarchicalId> = ids.into_iter().collect();
        let before = self.links.len();
        self.links
            .retain(|c| !ids.contains(&c.source) && !ids.contains(&c.target));
        before - self.links.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Correspondence> {
        self.links.iter()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl FromIterator<Correspondence> for CorrespondenceModel {
    fn from_iter<I: IntoIterator<Item = Correspondence>>(iter: I) -> Self {
        Self {
            links: iter.into_iter().collect(),
        }
    }
}
