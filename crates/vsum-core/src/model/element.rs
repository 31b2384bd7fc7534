use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::id::HierarchicalId;
use super::value::Value;

/// Back-pointer from a contained element to its container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    pub id: HierarchicalId,
    pub feature: String,
}

/// Ordered targets of one reference feature
///
/// Slots exist only while they hold at least one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSlot {
    /// Targets are owned (contained) by the holder
    pub containment: bool,
    /// List-valued (`true`) or single-valued (`false`)
    pub many: bool,
    pub targets: Vec<HierarchicalId>,
}

/// Node in a typed model graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: HierarchicalId,

    /// Declared type name (e.g. `Family`, `Person`)
    pub type_name: String,

    /// Containing element, `None` for roots and detached elements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerRef>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, ReferenceSlot>,
}

impl Element {
    /// Create a bare element with no container, attributes or references
    pub fn new(id: HierarchicalId, type_name: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            container: None,
            attributes: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }

    pub fn attribute(&self, feature: &str) -> Option<&Value> {
        self.attributes.get(feature)
    }

    /// String attribute, `None` when unset or not a string
    pub fn attribute_str(&self, feature: &str) -> Option<&str> {
        self.attribute(feature).and_then(Value::as_str)
    }

    /// All targets of a reference feature (empty when unset)
    pub fn references(&self, feature: &str) -> &[HierarchicalId] {
        self.references
            .get(feature)
            .map(|slot| slot.targets.as_slice())
            .unwrap_or(&[])
    }

    /// Target of a single-valued reference feature
    pub fn reference(&self, feature: &str) -> Option<&HierarchicalId> {
        self.references(feature).first()
    }

    /// Directly contained elements, feature by feature in list order
    pub fn contents(&self) -> impl Iterator<Item = &HierarchicalId> {
        self.references
            .values()
            .filter(|slot| slot.containment)
            .flat_map(|slot| slot.targets.iter())
    }

    pub fn container_id(&self) -> Option<&HierarchicalId> {
        self.container.as_ref().map(|c| &c.id)
    }

    /// Whether the element has no container
    pub fn is_root(&self) -> bool {
        self.container.is_none()
    }
}
