pub mod element;
pub mod id;
pub mod snapshot;
pub mod value;

pub use element::{ContainerRef, Element, ReferenceSlot};
pub use id::{HierarchicalId, IdAllocator};
pub use snapshot::ModelSnapshot;
pub use value::Value;
