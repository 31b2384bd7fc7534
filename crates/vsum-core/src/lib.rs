//! VSUM Core - virtual single underlying model kernel
//!
//! This crate provides the in-memory model and the machinery that keeps
//! several views of it consistent, including:
//! - Arena model of elements with hierarchical ids and root registrations
//! - Atomic change records and the diff that derives them
//! - Correspondence model linking elements across domains
//! - Reaction registry with trigger matching over a type hierarchy
//! - Fixed-point change propagation with rollback on failure
//! - Selectable, filterable views with commit-buffered editing
//! - The virtual model façade tying the above together
//!
//! Durable storage lives behind [`persistence::ModelPersistence`]; the
//! filesystem implementation is in `vsum-store`.

pub mod change;
pub mod correspondence;
pub mod errors;
pub mod interaction;
pub mod logging_facility;
pub mod model;
pub mod persistence;
pub mod propagation;
pub mod reactions;
pub mod repository;
pub mod view;
pub mod vsum;

pub use vsum_core_types;

// Re-export commonly used types
pub use change::{ChangeKind, ChangeOp, EChange};
pub use correspondence::{Correspondence, CorrespondenceModel};
pub use errors::{ExError, ExErrorKind, Result, VsumError};
pub use interaction::{RejectingUserInteraction, ScriptedUserInteraction, UserInteraction};
pub use model::{Element, HierarchicalId, ModelSnapshot, Value};
pub use persistence::{ModelPersistence, PersistedChanges, PersistedState, RootDocument};
pub use propagation::{ChangePropagationMode, PropagationReport, PropagationSettings};
pub use reactions::{ChangePropagationSpecification, ReactionContext, ReactionRegistry, TriggerShape};
pub use view::{CommittableView, Selector, View, ViewType};
pub use vsum::{PropagationListener, VirtualModel};
