use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{Result, VsumError};

/// Loop guard applied when no other limit is configured
pub const DEFAULT_MAX_PASSES: usize = 64;

/// How far produced changes are propagated within one commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangePropagationMode {
    /// Only the initiating batch is matched
    NonTransitive,
    /// Produced changes are matched again, but each reaction runs at most once
    /// per source element and feature within a commit
    Transitive,
    /// Produced changes are matched again until a fixpoint or the loop guard
    #[default]
    TransitiveCyclic,
}

impl fmt::Display for ChangePropagationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangePropagationMode::NonTransitive => "non_transitive",
            ChangePropagationMode::Transitive => "transitive",
            ChangePropagationMode::TransitiveCyclic => "transitive_cyclic",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationSettings {
    pub mode: ChangePropagationMode,
    /// Passes allowed before a commit fails with `PropagationDivergence`
    pub max_passes: usize,
}

impl PropagationSettings {
    pub fn with_mode(mut self, mode: ChangePropagationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// # Errors
    ///
    /// Returns `Configuration` if `max_passes` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_passes == 0 {
            return Err(VsumError::Configuration {
                reason: "max_passes must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            mode: ChangePropagationMode::default(),
            max_passes: DEFAULT_MAX_PASSES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PropagationSettings::default();
        assert_eq!(settings.mode, ChangePropagationMode::TransitiveCyclic);
        assert_eq!(settings.max_passes, 64);
        settings.validate().unwrap();
    }

    #[test]
    fn test_zero_passes_rejected() {
        let err = PropagationSettings::default()
            .with_max_passes(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, VsumError::Configuration { .. }));
    }

    #[test]
    fn test_mode_names() {
        let mode: ChangePropagationMode = serde_json::from_str("\"non_transitive\"").unwrap();
        assert_eq!(mode, ChangePropagationMode::NonTransitive);
        assert_eq!(ChangePropagationMode::Transitive.to_string(), "transitive");
    }
}
