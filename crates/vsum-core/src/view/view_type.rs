use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use super::filter::{ChangeFilter, FilterChain};
use crate::change::EChange;

/// Kind of view: decides how a view's batch is transformed on commit
pub trait ViewType: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Transform the batch derived from a view before it is propagated
    fn transform_commit(&self, changes: Vec<EChange>) -> Vec<EChange>;
}

/// Passes every change through unchanged
#[derive(Debug)]
pub struct IdentityMappingViewType {
    name: String,
}

impl IdentityMappingViewType {
    pub fn create(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into() })
    }
}

impl ViewType for IdentityMappingViewType {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform_commit(&self, changes: Vec<EChange>) -> Vec<EChange> {
        changes
    }
}

/// Threads every commit through a mutable chain of change filters
#[derive(Debug)]
pub struct ChangeTransformingViewType {
    name: String,
    filters: RwLock<FilterChain>,
}

impl ChangeTransformingViewType {
    pub fn create(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            filters: RwLock::new(FilterChain::new()),
        })
    }

    /// Append a filter; returns whether the chain changed
    pub fn register_filter(&self, filter: Arc<dyn ChangeFilter>) -> bool {
        self.filters.write().register(filter)
    }

    /// Remove a filter; returns whether the chain changed
    pub fn unregister_filter(&self, filter: &Arc<dyn ChangeFilter>) -> bool {
        self.filters.write().unregister(filter)
    }

    pub fn filter_count(&self) -> usize {
        self.filters.read().len()
    }
}

impl ViewType for ChangeTransformingViewType {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform_commit(&self, changes: Vec<EChange>) -> Vec<EChange> {
        self.filters.read().apply(changes)
    }
}
