pub mod engine;
pub mod mode;

pub use engine::{EngineState, PropagationEngine, PropagationReport};
pub use mode::{ChangePropagationMode, PropagationSettings, DEFAULT_MAX_PASSES};
