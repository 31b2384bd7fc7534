//! Capability-scoped, commit-buffered projections over selected roots

pub mod committable;
pub mod filter;
pub mod readonly;
pub mod selector;
pub mod view_type;

pub use committable::CommittableView;
pub use filter::{drop_attribute_changes, drop_kinds, ChangeFilter, FilterChain};
pub use readonly::View;
pub use selector::{SelectableRoot, Selector};
pub use view_type::{ChangeTransformingViewType, IdentityMappingViewType, ViewType};
