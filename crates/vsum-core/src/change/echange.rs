use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{HierarchicalId, Value};

/// Fieldless discriminant of a change record, used for trigger matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeKind {
    ElementCreated,
    ElementDeleted,
    AttributeSet,
    AttributeUnset,
    ReferenceAdded,
    ReferenceRemoved,
    ReferenceReplaced,
    ReferenceMoved,
    RootInserted,
    RootRemoved,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What happened to the affected element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChangeOp {
    ElementCreated,
    ElementDeleted,
    AttributeSet {
        feature: String,
        old: Option<Value>,
        new: Value,
    },
    AttributeUnset {
        feature: String,
        old: Value,
    },
    /// Insert `target` at `index` of a list-valued reference
    ReferenceAdded {
        feature: String,
        target: HierarchicalId,
        index: usize,
        containment: bool,
    },
    /// Remove `target` found at `index` of a list-valued reference
    ReferenceRemoved {
        feature: String,
        target: HierarchicalId,
        index: usize,
        containment: bool,
    },
    /// Replace the occupant of a single-valued reference
    ReferenceReplaced {
        feature: String,
        old: Option<HierarchicalId>,
        new: Option<HierarchicalId>,
        containment: bool,
    },
    /// Move `target` within a list-valued reference
    ReferenceMoved {
        feature: String,
        target: HierarchicalId,
        from: usize,
        to: usize,
    },
    RootInserted {
        location_key: String,
    },
    RootRemoved {
        location_key: String,
    },
}

/// Atomic, immutable change record
///
/// `sequence` establishes the total order of records within one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EChange {
    pub sequence: u64,
    pub element: HierarchicalId,
    pub element_type: String,
    #[serde(flatten)]
    pub op: ChangeOp,
}

impl EChange {
    /// Create a record with sequence 0; batches are numbered by [`resequence`]
    pub fn new(element: HierarchicalId, element_type: impl Into<String>, op: ChangeOp) -> Self {
        Self {
            sequence: 0,
            element,
            element_type: element_type.into(),
            op,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn kind(&self) -> ChangeKind {
        match &self.op {
            ChangeOp::ElementCreated => ChangeKind::ElementCreated,
            ChangeOp::ElementDeleted => ChangeKind::ElementDeleted,
            ChangeOp::AttributeSet { .. } => ChangeKind::AttributeSet,
            ChangeOp::AttributeUnset { .. } => ChangeKind::AttributeUnset,
            ChangeOp::ReferenceAdded { .. } => ChangeKind::ReferenceAdded,
            ChangeOp::ReferenceRemoved { .. } => ChangeKind::ReferenceRemoved,
            ChangeOp::ReferenceReplaced { .. } => ChangeKind::ReferenceReplaced,
            ChangeOp::ReferenceMoved { .. } => ChangeKind::ReferenceMoved,
            ChangeOp::RootInserted { .. } => ChangeKind::RootInserted,
            ChangeOp::RootRemoved { .. } => ChangeKind::RootRemoved,
        }
    }

    /// Feature name for attribute and reference records
    pub fn feature(&self) -> Option<&str> {
        match &self.op {
            ChangeOp::AttributeSet { feature, .. }
            | ChangeOp::AttributeUnset { feature, .. }
            | ChangeOp::ReferenceAdded { feature, .. }
            | ChangeOp::ReferenceRemoved { feature, .. }
            | ChangeOp::ReferenceReplaced { feature, .. }
            | ChangeOp::ReferenceMoved { feature, .. } => Some(feature),
            _ => None,
        }
    }

    /// Location key for root records
    pub fn location_key(&self) -> Option<&str> {
        match &self.op {
            ChangeOp::RootInserted { location_key } | ChangeOp::RootRemoved { location_key } => {
                Some(location_key)
            }
            _ => None,
        }
    }

    /// New value of an `AttributeSet` record
    pub fn new_value(&self) -> Option<&Value> {
        match &self.op {
            ChangeOp::AttributeSet { new, .. } => Some(new),
            _ => None,
        }
    }

    /// Element newly referenced by this record, if any
    pub fn new_target(&self) -> Option<&HierarchicalId> {
        match &self.op {
            ChangeOp::ReferenceAdded { target, .. } => Some(target),
            ChangeOp::ReferenceReplaced { new, .. } => new.as_ref(),
            _ => None,
        }
    }

    pub fn is_attribute_change(&self) -> bool {
        matches!(
            self.op,
            ChangeOp::AttributeSet { .. } | ChangeOp::AttributeUnset { .. }
        )
    }

    /// Element lifecycle, reference and root records
    pub fn is_structural(&self) -> bool {
        !self.is_attribute_change()
    }

    /// Every element id the record mentions: the affected element and any targets
    pub fn referenced_ids(&self) -> Vec<&HierarchicalId> {
        let mut ids = vec![&self.element];
        match &self.op {
            ChangeOp::ReferenceAdded { target, .. }
            | ChangeOp::ReferenceRemoved { target, .. }
            | ChangeOp::ReferenceMoved { target, .. } => ids.push(target),
            ChangeOp::ReferenceReplaced { old, new, .. } => {
                ids.extend(old.iter());
                ids.extend(new.iter());
            }
            _ => {}
        }
        ids
    }
}

/// Number the records of a batch 1..=n in their current order
pub fn resequence(changes: &mut [EChange]) {
    for (i, change) in changes.iter_mut().enumerate() {
        change.sequence = i as u64 + 1;
    }
}
