use std::fmt;
use std::sync::Arc;

use crate::change::{ChangeKind, EChange};

/// Transformation applied to a view's batch before it reaches the engine
pub trait ChangeFilter: Send + Sync {
    fn apply(&self, changes: Vec<EChange>) -> Vec<EChange>;
}

impl<F> ChangeFilter for F
where
    F: Fn(Vec<EChange>) -> Vec<EChange> + Send + Sync,
{
    fn apply(&self, changes: Vec<EChange>) -> Vec<EChange> {
        self(changes)
    }
}

/// Ordered set of filters; identity is the `Arc` allocation
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn ChangeFilter>>,
}

fn same_filter(a: &Arc<dyn ChangeFilter>, b: &Arc<dyn ChangeFilter>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `filter`; returns `false` if it is already registered
    pub fn register(&mut self, filter: Arc<dyn ChangeFilter>) -> bool {
        if self.filters.iter().any(|f| same_filter(f, &filter)) {
            return false;
        }
        self.filters.push(filter);
        true
    }

    /// Remove `filter`; returns `false` if it was not registered
    pub fn unregister(&mut self, filter: &Arc<dyn ChangeFilter>) -> bool {
        let before = self.filters.len();
        self.filters.retain(|f| !same_filter(f, filter));
        self.filters.len() != before
    }

    /// Run `changes` through every filter in registration order
    pub fn apply(&self, changes: Vec<EChange>) -> Vec<EChange> {
        self.filters
            .iter()
            .fold(changes, |changes, filter| filter.apply(changes))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filters.len())
            .finish()
    }
}

/// Filter discarding attribute sets and unsets
pub fn drop_attribute_changes() -> Arc<dyn ChangeFilter> {
    Arc::new(|changes: Vec<EChange>| {
        changes
            .into_iter()
            .filter(EChange::is_structural)
            .collect::<Vec<_>>()
    })
}

/// Filter discarding records of the given kinds
pub fn drop_kinds(kinds: &[ChangeKind]) -> Arc<dyn ChangeFilter> {
    let kinds = kinds.to_vec();
    Arc::new(move |changes: Vec<EChange>| {
        changes
            .into_iter()
            .filter(|c| !kinds.contains(&c.kind()))
            .collect::<Vec<_>>()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeOp;
    use crate::model::{IdAllocator, Value};

    fn batch() -> Vec<EChange> {
        let id = IdAllocator::new().new_root_id();
        vec![
            EChange::new(id.clone(), "Family", ChangeOp::ElementCreated),
            EChange::new(
                id,
                "Family",
                ChangeOp::AttributeSet {
                    feature: "lastName".to_string(),
                    old: None,
                    new: Value::from("Smith"),
                },
            ),
        ]
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut chain = FilterChain::new();
        let filter = drop_attribute_changes();
        assert!(chain.register(filter.clone()));
        assert!(!chain.register(filter.clone()));
        assert_eq!(chain.len(), 1);

        assert!(chain.unregister(&filter));
        assert!(!chain.unregister(&filter));
        assert!(chain.is_empty());
    }

    #[test]
    fn test_filters_run_in_registration_order() {
        let mut chain = FilterChain::new();
        chain.register(Arc::new(|mut changes: Vec<EChange>| {
            changes.truncate(1);
            changes
        }));
        chain.register(drop_kinds(&[ChangeKind::ElementCreated]));

        assert!(chain.apply(batch()).is_empty());
    }

    #[test]
    fn test_drop_attribute_changes_keeps_structure() {
        let kept = drop_attribute_changes().apply(batch());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].kind(), ChangeKind::ElementCreated);
    }
}
