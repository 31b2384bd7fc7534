use std::fmt;

use super::registry::TypeHierarchy;
use crate::change::{ChangeKind, EChange};

/// Pattern a change record must fit for a reaction to fire
///
/// Matches on the record kind, the declared type of the affected element
/// (exactly, or including subtypes when widened) and optionally the feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerShape {
    pub kind: ChangeKind,
    pub element_type: String,
    pub feature: Option<String>,
    pub include_subtypes: bool,
}

impl TriggerShape {
    pub fn new(kind: ChangeKind, element_type: impl Into<String>) -> Self {
        Self {
            kind,
            element_type: element_type.into(),
            feature: None,
            include_subtypes: false,
        }
    }

    pub fn created(element_type: impl Into<String>) -> Self {
        Self::new(ChangeKind::ElementCreated, element_type)
    }

    pub fn deleted(element_type: impl Into<String>) -> Self {
        Self::new(ChangeKind::ElementDeleted, element_type)
    }

    pub fn root_inserted(element_type: impl Into<String>) -> Self {
        Self::new(ChangeKind::RootInserted, element_type)
    }

    pub fn root_removed(element_type: impl Into<String>) -> Self {
        Self::new(ChangeKind::RootRemoved, element_type)
    }

    pub fn attribute_set(element_type: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::new(ChangeKind::AttributeSet, element_type).on_feature(feature)
    }

    pub fn reference_added(element_type: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::new(ChangeKind::ReferenceAdded, element_type).on_feature(feature)
    }

    pub fn reference_removed(element_type: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::new(ChangeKind::ReferenceRemoved, element_type).on_feature(feature)
    }

    pub fn reference_replaced(
        element_type: impl Into<String>,
        feature: impl Into<String>,
    ) -> Self {
        Self::new(ChangeKind::ReferenceReplaced, element_type).on_feature(feature)
    }

    /// Restrict to records on one feature
    pub fn on_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Also match records on elements whose type derives from `element_type`
    pub fn with_subtypes(mut self) -> Self {
        self.include_subtypes = true;
        self
    }

    pub fn accepts(&self, change: &EChange, hierarchy: &TypeHierarchy) -> bool {
        if change.kind() != self.kind {
            return false;
        }
        if let Some(feature) = &self.feature {
            if change.feature() != Some(feature.as_str()) {
                return false;
            }
        }
        change.element_type == self.element_type
            || (self.include_subtypes
                && hierarchy.is_subtype_of(&change.element_type, &self.element_type))
    }
}

impl fmt::Display for TriggerShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.element_type)?;
        if let Some(feature) = &self.feature {
            write!(f, ".{}", feature)?;
        }
        if self.include_subtypes {
            f.write_str(" (+subtypes)")?;
        }
        Ok(())
    }
}
