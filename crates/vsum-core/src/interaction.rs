//! User interaction interface for decisions requested by reactions.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::errors::{Result, VsumError};

/// Resolve a finite choice on behalf of a reaction.
///
/// Called from inside propagation while the commit lock is held; the call
/// may block for as long as it needs.
pub trait UserInteraction: Send + Sync {
    /// Pick one of `choices`, or `None` to decline.
    fn select_single(&self, message: &str, choices: &[String]) -> Option<usize>;
}

/// Scripted answers consumed in order, for tests and batch runs.
///
/// Once the script is exhausted every request is declined.
#[derive(Debug, Default)]
pub struct ScriptedUserInteraction {
    answers: Mutex<VecDeque<usize>>,
}

impl ScriptedUserInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selections(selections: impl IntoIterator<Item = usize>) -> Self {
        Self {
            answers: Mutex::new(selections.into_iter().collect()),
        }
    }

    /// Queue the answer for the next single-selection request
    pub fn add_next_single_selection(&self, index: usize) {
        self.answers.lock().push_back(index);
    }

    /// Answers not consumed yet
    pub fn pending(&self) -> usize {
        self.answers.lock().len()
    }
}

impl UserInteraction for ScriptedUserInteraction {
    fn select_single(&self, message: &str, choices: &[String]) -> Option<usize> {
        let answer = self.answers.lock().pop_front();
        tracing::debug!(message, choices = choices.len(), answer = ?answer, "scripted selection");
        answer
    }
}

/// Declines every request; any reaction that needs a decision fails its commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingUserInteraction;

impl UserInteraction for RejectingUserInteraction {
    fn select_single(&self, _: &str, _: &[String]) -> Option<usize> {
        None
    }
}

/// Ask `interaction` and validate the answer against `choices`
///
/// # Errors
///
/// Returns `UnresolvedChoice` if the answer is missing or out of range.
pub(crate) fn resolve_single(
    interaction: &dyn UserInteraction,
    reaction: &str,
    message: &str,
    choices: &[String],
) -> Result<usize> {
    let answer = interaction.select_single(message, choices);
    match answer {
        Some(index) if index < choices.len() => Ok(index),
        _ => Err(VsumError::UnresolvedChoice {
            reaction: reaction.to_string(),
            message: message.to_string(),
            choices: choices.len(),
            answer,
        }),
    }
}
