use thiserror::Error;
use vsum_core_types::RequestId;

/// Result type alias using VsumError
pub type Result<T> = std::result::Result<T, VsumError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// This taxonomy provides a stable, structured classification of all errors
/// raised by the virtual model. Each kind maps to a stable error code that can
/// be used for programmatic error handling, testing, and log assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Identity / repository
    IdentityConflict,
    DuplicateLocation,
    NotFound,
    InvalidChange,

    // Configuration time
    AmbiguousReaction,
    DuplicateReaction,
    Configuration,

    // Propagation
    ReactionExecution,
    PropagationDivergence,
    UnresolvedChoice,

    // Views
    StaleView,
    FilterViolation,

    // Integration/IO
    Io,
    Serialization,
    Persistence,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::IdentityConflict => "ERR_IDENTITY_CONFLICT",
            ExErrorKind::DuplicateLocation => "ERR_DUPLICATE_LOCATION",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::InvalidChange => "ERR_INVALID_CHANGE",
            ExErrorKind::AmbiguousReaction => "ERR_AMBIGUOUS_REACTION",
            ExErrorKind::DuplicateReaction => "ERR_DUPLICATE_REACTION",
            ExErrorKind::Configuration => "ERR_CONFIGURATION",
            ExErrorKind::ReactionExecution => "ERR_REACTION_EXECUTION",
            ExErrorKind::PropagationDivergence => "ERR_PROPAGATION_DIVERGENCE",
            ExErrorKind::UnresolvedChoice => "ERR_UNRESOLVED_CHOICE",
            ExErrorKind::StaleView => "ERR_STALE_VIEW",
            ExErrorKind::FilterViolation => "ERR_FILTER_VIOLATION",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether errors of this kind are raised while building the virtual model
    /// rather than while committing
    pub fn is_configuration_time(&self) -> bool {
        matches!(
            self,
            ExErrorKind::AmbiguousReaction
                | ExErrorKind::DuplicateReaction
                | ExErrorKind::Configuration
        )
    }
}

/// Canonical structured error type
///
/// This error type provides a structured representation of errors with
/// classification fields for programmatic handling and rich context for debugging.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    location_key: Option<String>,
    reaction: Option<String>,
    request_id: Option<RequestId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            location_key: None,
            reaction: None,
            request_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add element ID context
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add location key context
    pub fn with_location_key(mut self, location_key: impl Into<String>) -> Self {
        self.location_key = Some(location_key.into());
        self
    }

    /// Add reaction name context
    pub fn with_reaction(mut self, reaction: impl Into<String>) -> Self {
        self.reaction = Some(reaction.into());
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the element ID context, if any
    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    /// Get the location key context, if any
    pub fn location_key(&self) -> Option<&str> {
        self.location_key.as_deref()
    }

    /// Get the reaction context, if any
    pub fn reaction(&self) -> Option<&str> {
        self.reaction.as_deref()
    }

    /// Get the request ID context, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (element_id: {})", entity_id)?;
        }
        if let Some(location_key) = &self.location_key {
            write!(f, " (location_key: {})", location_key)?;
        }
        if let Some(reaction) = &self.reaction {
            write!(f, " (reaction: {})", reaction)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Error taxonomy for the virtual model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VsumError {
    // ===== Identity / repository =====
    /// Two live elements resolve to the same id
    #[error("Identity conflict: element {id} already exists")]
    IdentityConflict { id: String },

    /// A root is already registered under the location key
    #[error("Location already occupied: {location_key}")]
    DuplicateLocation { location_key: String },

    /// The element does not exist (or no longer exists)
    #[error("Element not found: {id}")]
    ElementNotFound { id: String },

    /// No root is registered under the location key
    #[error("No root registered at location: {location_key}")]
    LocationNotFound { location_key: String },

    /// A change record cannot be applied to the current model state
    #[error("Invalid change: {reason}")]
    InvalidChange { reason: String },

    // ===== Configuration =====
    /// Two reactions claim the same trigger shape
    #[error("Reaction {reaction} claims trigger {trigger} already claimed by {existing}")]
    AmbiguousReaction {
        reaction: String,
        existing: String,
        trigger: String,
    },

    /// A reaction name was registered twice
    #[error("Reaction registered twice: {reaction}")]
    DuplicateReaction { reaction: String },

    /// The virtual model cannot be built from the supplied configuration
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    // ===== Propagation =====
    /// A reaction failed (returned an error or panicked) during execution
    #[error("Reaction {reaction} failed: {message}")]
    ReactionExecution { reaction: String, message: String },

    /// Cyclic propagation did not reach a fixpoint within the loop guard
    #[error("Propagation did not reach a fixpoint after {passes} passes ({pending} changes pending)")]
    PropagationDivergence { passes: usize, pending: usize },

    /// A reaction requested a user decision that was not answered with a valid choice
    #[error("Reaction {reaction} could not resolve choice '{message}' ({choices} options, answer {answer:?})")]
    UnresolvedChoice {
        reaction: String,
        message: String,
        choices: usize,
        answer: Option<usize>,
    },

    // ===== Views =====
    /// A selected root no longer resolves in the repository
    #[error("View is stale: selected root {root} no longer exists")]
    StaleView { root: String },

    /// A change filter produced a record outside the view's selection
    #[error("Filter output references element {element} outside the view selection")]
    FilterViolation { element: String },

    // ===== Integration =====
    /// The persistence collaborator failed
    #[error("Persistence failure: {message}")]
    Persistence { message: String },

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Internal error (should never happen)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl VsumError {
    /// Shorthand for an `InvalidChange` error
    pub fn invalid_change(reason: impl Into<String>) -> Self {
        VsumError::InvalidChange {
            reason: reason.into(),
        }
    }

    /// Get the canonical kind of this error
    pub fn kind(&self) -> ExErrorKind {
        match self {
            VsumError::IdentityConflict { .. } => ExErrorKind::IdentityConflict,
            VsumError::DuplicateLocation { .. } => ExErrorKind::DuplicateLocation,
            VsumError::ElementNotFound { .. } | VsumError::LocationNotFound { .. } => {
                ExErrorKind::NotFound
            }
            VsumError::InvalidChange { .. } => ExErrorKind::InvalidChange,
            VsumError::AmbiguousReaction { .. } => ExErrorKind::AmbiguousReaction,
            VsumError::DuplicateReaction { .. } => ExErrorKind::DuplicateReaction,
            VsumError::Configuration { .. } => ExErrorKind::Configuration,
            VsumError::ReactionExecution { .. } => ExErrorKind::ReactionExecution,
            VsumError::PropagationDivergence { .. } => ExErrorKind::PropagationDivergence,
            VsumError::UnresolvedChoice { .. } => ExErrorKind::UnresolvedChoice,
            VsumError::StaleView { .. } => ExErrorKind::StaleView,
            VsumError::FilterViolation { .. } => ExErrorKind::FilterViolation,
            VsumError::Persistence { .. } => ExErrorKind::Persistence,
            VsumError::Serialization { .. } => ExErrorKind::Serialization,
            VsumError::Internal { .. } => ExErrorKind::Internal,
        }
    }
}

/// Conversion from VsumError to ExError
impl From<VsumError> for ExError {
    fn from(err: VsumError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        let ex = ExError::new(kind).with_message(message);
        match err {
            VsumError::IdentityConflict { id } | VsumError::ElementNotFound { id } => {
                ex.with_entity_id(id)
            }
            VsumError::DuplicateLocation { location_key }
            | VsumError::LocationNotFound { location_key } => ex.with_location_key(location_key),
            VsumError::AmbiguousReaction { reaction, .. }
            | VsumError::DuplicateReaction { reaction }
            | VsumError::ReactionExecution { reaction, .. }
            | VsumError::UnresolvedChoice { reaction, .. } => ex.with_reaction(reaction),
            VsumError::StaleView { root } => ex.with_entity_id(root),
            VsumError::FilterViolation { element } => ex.with_entity_id(element),
            VsumError::InvalidChange { .. }
            | VsumError::Configuration { .. }
            | VsumError::PropagationDivergence { .. }
            | VsumError::Persistence { .. }
            | VsumError::Serialization { .. }
            | VsumError::Internal { .. } => ex,
        }
    }
}

/// Conversion from a structured collaborator error (e.g. the store) to VsumError
impl From<ExError> for VsumError {
    fn from(err: ExError) -> Self {
        match err.kind() {
            ExErrorKind::Serialization => VsumError::Serialization {
                message: err.to_string(),
            },
            ExErrorKind::Internal => VsumError::Internal {
                message: err.to_string(),
            },
            _ => VsumError::Persistence {
                message: err.to_string(),
            },
        }
    }
}

/// Conversion from serde_json::Error to VsumError
impl From<serde_json::Error> for VsumError {
    fn from(err: serde_json::Error) -> Self {
        VsumError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_propagation_error_kind_codes() {
        let cases = [
            (ExErrorKind::ReactionExecution, "ERR_REACTION_EXECUTION"),
            (
                ExErrorKind::PropagationDivergence,
                "ERR_PROPAGATION_DIVERGENCE",
            ),
            (ExErrorKind::UnresolvedChoice, "ERR_UNRESOLVED_CHOICE"),
            (ExErrorKind::StaleView, "ERR_STALE_VIEW"),
            (ExErrorKind::DuplicateLocation, "ERR_DUPLICATE_LOCATION"),
        ];
        for (kind, expected_code) in cases {
            assert_eq!(kind.code(), expected_code, "Wrong code for {:?}", kind);
        }
    }

    #[test]
    fn test_configuration_time_kinds() {
        assert!(ExErrorKind::AmbiguousReaction.is_configuration_time());
        assert!(ExErrorKind::DuplicateReaction.is_configuration_time());
        assert!(!ExErrorKind::ReactionExecution.is_configuration_time());
        assert!(!ExErrorKind::StaleView.is_configuration_time());
    }

    #[test]
    fn test_vsum_error_converts_with_context() {
        let err = VsumError::DuplicateLocation {
            location_key: "families.json".to_string(),
        };
        let ex: ExError = err.into();
        assert_eq!(ex.kind(), ExErrorKind::DuplicateLocation);
        assert_eq!(ex.location_key(), Some("families.json"));
        assert!(ex.to_string().starts_with("[ERR_DUPLICATE_LOCATION]"));
    }

    #[test]
    fn test_reaction_errors_carry_reaction_name() {
        let err = VsumError::UnresolvedChoice {
            reaction: "TaskCreated".to_string(),
            message: "Which task?".to_string(),
            choices: 2,
            answer: Some(5),
        };
        let ex: ExError = err.into();
        assert_eq!(ex.reaction(), Some("TaskCreated"));
        assert_eq!(ex.code(), "ERR_UNRESOLVED_CHOICE");
    }

    #[test]
    fn test_store_errors_become_persistence_failures() {
        let ex = ExError::new(ExErrorKind::Io).with_message("disk full");
        let err: VsumError = ex.into();
        assert!(matches!(err, VsumError::Persistence { .. }));
        assert_eq!(err.kind(), ExErrorKind::Persistence);
    }
}
