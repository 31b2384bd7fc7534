pub mod context;
pub mod registry;
pub mod trigger;

pub use context::ReactionContext;
pub use registry::{
    ChangePropagationSpecification, Reaction, ReactionRegistry, ReactionRoutine, TypeHierarchy,
};
pub use trigger::TriggerShape;
