use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::errors::VsumError;

/// Stable identifier of an element
///
/// Computed once from the containment path at creation time and never
/// changed afterwards, even when the element is moved to another container.
/// Roots render as `r<serial>`, contained elements as
/// `<container>/<feature>.<serial>`. The serial is unique per process, so ids
/// order by creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HierarchicalId {
    serial: u64,
    path: String,
}

impl HierarchicalId {
    /// Creation serial of this id
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Rendered form
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Whether the id was allocated for a root
    pub fn is_root_id(&self) -> bool {
        !self.path.contains('/')
    }
}

impl Ord for HierarchicalId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.serial
            .cmp(&other.serial)
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl PartialOrd for HierarchicalId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for HierarchicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl FromStr for HierarchicalId {
    type Err = VsumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || VsumError::Serialization {
            message: format!("malformed element id '{}'", s),
        };

        let serial = match s.rsplit_once('/') {
            Some((container, last)) if !container.is_empty() => {
                let (_, serial) = last.rsplit_once('.').ok_or_else(malformed)?;
                serial
            }
            Some(_) => return Err(malformed()),
            None => s.strip_prefix('r').ok_or_else(malformed)?,
        };
        let serial = serial.parse::<u64>().map_err(|_| malformed())?;

        Ok(Self {
            serial,
            path: s.to_string(),
        })
    }
}

impl TryFrom<String> for HierarchicalId {
    type Error = VsumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HierarchicalId> for String {
    fn from(id: HierarchicalId) -> Self {
        id.path
    }
}

/// Allocator of element ids
///
/// Clones share one counter, so every working copy of a repository draws
/// from the same sequence and a discarded copy never causes a serial to be
/// handed out twice.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: Arc<AtomicU64>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next_serial(&self) -> u64 {
        self.next.fetch_add(1, AtomicOrdering::Relaxed)
    }

    /// Allocate an id for a new root element
    pub fn new_root_id(&self) -> HierarchicalId {
        let serial = self.next_serial();
        HierarchicalId {
            serial,
            path: format!("r{}", serial),
        }
    }

    /// Allocate an id for an element created inside `container` under `feature`
    pub fn new_id(&self, container: &HierarchicalId, feature: &str) -> HierarchicalId {
        let serial = self.next_serial();
        HierarchicalId {
            serial,
            path: format!("{}/{}.{}", container, feature, serial),
        }
    }

    /// Make sure serials up to and including `serial` are never handed out
    ///
    /// Used after reloading persisted elements.
    pub fn reserve_through(&self, serial: u64) {
        self.next
            .fetch_max(serial.saturating_add(1), AtomicOrdering::Relaxed);
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
