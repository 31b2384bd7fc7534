//! Propagation engine
//!
//! Drives one commit through `Idle → Matching → Executing → (Matching …) →
//! Idle`, or into `Failed`. The engine never touches the live repository: it
//! clones it, applies the batch and every reaction-produced record to the
//! clone, and hands the clone back only when the whole commit succeeded.
//!
//! The loop is an explicit worklist. Pass 1 matches the initiating batch;
//! each later pass matches the records produced by the previous one, as far
//! as the propagation mode allows.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use vsum_core_types::{RequestContext, RequestId};

use super::mode::{ChangePropagationMode, PropagationSettings};
use crate::change::{ChangeKind, EChange};
use crate::errors::{Result, VsumError};
use crate::interaction::UserInteraction;
use crate::model::HierarchicalId;
use crate::reactions::{ReactionContext, ReactionRegistry};
use crate::repository::ModelRepository;
use crate::{log_op_end, log_op_error, log_op_start};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Matching,
    Executing,
    /// The last batch was rolled back
    Failed,
}

/// Outcome of a successful commit
#[derive(Debug, Clone)]
pub struct PropagationReport {
    pub request_id: RequestId,
    /// Matching passes run (0 when nothing matched)
    pub passes: usize,
    /// Every record applied, initiating batch first, in sequence order
    pub changes: Vec<EChange>,
    /// Records produced by reactions
    pub produced: usize,
    /// Reaction executions
    pub executed: usize,
    /// Repository revision after the commit
    pub revision: u64,
}

impl PropagationReport {
    /// Records of the initiating batch
    pub fn initiating(&self) -> &[EChange] {
        &self.changes[..self.changes.len() - self.produced]
    }

    /// Records produced by reactions
    pub fn produced_changes(&self) -> &[EChange] {
        &self.changes[self.changes.len() - self.produced..]
    }
}

type DedupKey = (usize, ChangeKind, HierarchicalId, Option<String>);

#[derive(Debug)]
pub struct PropagationEngine {
    state: EngineState,
    settings: PropagationSettings,
}

impl PropagationEngine {
    pub fn new(settings: PropagationSettings) -> Self {
        Self {
            state: EngineState::Idle,
            settings,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn settings(&self) -> PropagationSettings {
        self.settings
    }

    pub fn set_mode(&mut self, mode: ChangePropagationMode) {
        self.settings.mode = mode;
    }

    /// # Errors
    ///
    /// Returns `Configuration` if `max_passes` is zero.
    pub fn set_max_passes(&mut self, max_passes: usize) -> Result<()> {
        let settings = self.settings.with_max_passes(max_passes);
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    /// Apply `batch` to a copy of `repository` and propagate it
    ///
    /// Returns the new repository state for the caller to swap in, together
    /// with a report of everything applied.
    ///
    /// # Errors
    ///
    /// Any error rolls the commit back (the copy is dropped):
    /// - `InvalidChange`, `IdentityConflict`, `DuplicateLocation` when the
    ///   initiating batch cannot be applied or the result is inconsistent
    /// - `ReactionExecution` when a reaction fails or panics
    /// - `UnresolvedChoice` when a user decision is declined or out of range
    /// - `PropagationDivergence` when the loop guard is exceeded
    pub fn propagate(
        &mut self,
        repository: &ModelRepository,
        batch: Vec<EChange>,
        registry: &ReactionRegistry,
        interaction: &dyn UserInteraction,
        ctx: &RequestContext,
    ) -> Result<(ModelRepository, PropagationReport)> {
        log_op_start!(
            "propagate",
            request_id = ctx.request_id.as_str(),
            batch_len = batch.len(),
            mode = %self.settings.mode
        );
        let start = std::time::Instant::now();

        let result = self
            .propagate_impl(repository, batch, registry, interaction, ctx)
            .map_err(|e| {
                self.state = EngineState::Failed;
                log_op_error!(
                    "propagate",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    request_id = ctx.request_id.as_str()
                );
                e
            })?;

        self.state = EngineState::Idle;
        log_op_end!(
            "propagate",
            duration_ms = start.elapsed().as_millis() as u64,
            request_id = ctx.request_id.as_str(),
            pass = result.1.passes,
            produced_len = result.1.produced
        );
        Ok(result)
    }

    fn propagate_impl(
        &mut self,
        repository: &ModelRepository,
        batch: Vec<EChange>,
        registry: &ReactionRegistry,
        interaction: &dyn UserInteraction,
        ctx: &RequestContext,
    ) -> Result<(ModelRepository, PropagationReport)> {
        let mode = self.settings.mode;
        let max_passes = self.settings.max_passes;

        let mut working = repository.clone();
        let mut sequence = 0u64;
        let mut changes = Vec::with_capacity(batch.len());
        for change in batch {
            sequence += 1;
            let change = change.with_sequence(sequence);
            working.apply(&change)?;
            changes.push(change);
        }

        let mut pending = changes.clone();
        let mut passes = 0usize;
        let mut executed = 0usize;
        let mut produced_total = 0usize;
        let mut seen: HashSet<DedupKey> = HashSet::new();

        loop {
            self.state = EngineState::Matching;
            if !pending
                .iter()
                .any(|c| registry.matching(c).next().is_some())
            {
                break;
            }
            if passes >= max_passes {
                return Err(VsumError::PropagationDivergence {
                    passes,
                    pending: pending.len(),
                });
            }
            passes += 1;
            tracing::debug!(
                request_id = ctx.request_id.as_str(),
                pass = passes,
                batch_len = pending.len(),
                "propagation pass"
            );

            let mut next = Vec::new();
            for change in &pending {
                for (index, reaction) in registry.matching(change) {
                    if mode == ChangePropagationMode::Transitive {
                        let key = (
                            index,
                            change.kind(),
                            change.element.clone(),
                            change.feature().map(str::to_string),
                        );
                        if !seen.insert(key) {
                            continue;
                        }
                    }

                    self.state = EngineState::Executing;
                    let mut produced = Vec::new();
                    {
                        let mut reaction_ctx = ReactionContext::new(
                            reaction.name(),
                            &mut working,
                            interaction,
                            &mut produced,
                            &mut sequence,
                        );
                        let outcome = catch_unwind(AssertUnwindSafe(|| {
                            reaction.routine().execute(change, &mut reaction_ctx)
                        }));
                        match outcome {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => return Err(reaction_failure(reaction.name(), err)),
                            Err(payload) => {
                                return Err(VsumError::ReactionExecution {
                                    reaction: reaction.name().to_string(),
                                    message: panic_message(payload.as_ref()),
                                })
                            }
                        }
                    }
                    executed += 1;
                    tracing::debug!(
                        request_id = ctx.request_id.as_str(),
                        reaction = reaction.name(),
                        element_id = change.element.as_str(),
                        produced_len = produced.len(),
                        "reaction executed"
                    );
                    next.extend(produced);
                }
            }

            produced_total += next.len();
            changes.extend(next.iter().cloned());
            pending = match mode {
                ChangePropagationMode::NonTransitive => Vec::new(),
                _ => next,
            };
        }

        let dropped = working.drop_dangling_correspondences();
        if dropped > 0 {
            tracing::debug!(
                request_id = ctx.request_id.as_str(),
                correspondences = dropped,
                "dropped correspondences of deleted elements"
            );
        }
        working.validate()?;
        working.bump_revision();
        let revision = working.revision();
        Ok((
            working,
            PropagationReport {
                request_id: ctx.request_id.clone(),
                passes,
                changes,
                produced: produced_total,
                executed,
                revision,
            },
        ))
    }

    /// Apply `batch` to a copy of `repository` without matching any reaction
    ///
    /// # Errors
    ///
    /// Returns the first record that cannot be applied, or `InvalidChange`
    /// if the result is inconsistent.
    pub fn apply_without_propagation(
        &mut self,
        repository: &ModelRepository,
        batch: Vec<EChange>,
        ctx: &RequestContext,
    ) -> Result<(ModelRepository, PropagationReport)> {
        log_op_start!(
            "apply_without_propagation",
            request_id = ctx.request_id.as_str(),
            batch_len = batch.len()
        );
        let start = std::time::Instant::now();

        let result = apply_batch(repository, batch, ctx).map_err(|e| {
            self.state = EngineState::Failed;
            log_op_error!(
                "apply_without_propagation",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                request_id = ctx.request_id.as_str()
            );
            e
        })?;

        self.state = EngineState::Idle;
        log_op_end!(
            "apply_without_propagation",
            duration_ms = start.elapsed().as_millis() as u64,
            request_id = ctx.request_id.as_str()
        );
        Ok(result)
    }
}

impl Default for PropagationEngine {
    fn default() -> Self {
        Self::new(PropagationSettings::default())
    }
}

fn apply_batch(
    repository: &ModelRepository,
    batch: Vec<EChange>,
    ctx: &RequestContext,
) -> Result<(ModelRepository, PropagationReport)> {
    let mut working = repository.clone();
    let mut changes = Vec::with_capacity(batch.len());
    for (i, change) in batch.into_iter().enumerate() {
        let change = change.with_sequence(i as u64 + 1);
        working.apply(&change)?;
        changes.push(change);
    }
    working.drop_dangling_correspondences();
    working.validate()?;
    working.bump_revision();
    let revision = working.revision();
    Ok((
        working,
        PropagationReport {
            request_id: ctx.request_id.clone(),
            passes: 0,
            changes,
            produced: 0,
            executed: 0,
            revision,
        },
    ))
}

/// Decision and divergence failures keep their kind; everything else is a reaction failure
fn reaction_failure(reaction: &str, err: VsumError) -> VsumError {
    match err {
        VsumError::UnresolvedChoice { .. }
        | VsumError::PropagationDivergence { .. }
        | VsumError::ReactionExecution { .. } => err,
        other => VsumError::ReactionExecution {
            reaction: reaction.to_string(),
            message: other.to_string(),
        },
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeOp;
    use crate::interaction::RejectingUserInteraction;
    use crate::model::{IdAllocator, Value};
    use crate::reactions::{ChangePropagationSpecification, TriggerShape};

    fn new_root_batch(repo: &ModelRepository, type_name: &str, location: &str) -> Vec<EChange> {
        let id = repo.ids().new_root_id();
        vec![
            EChange::new(id.clone(), type_name, ChangeOp::ElementCreated),
            EChange::new(
                id,
                type_name,
                ChangeOp::RootInserted {
                    location_key: location.to_string(),
                },
            ),
        ]
    }

    fn registry(spec: ChangePropagationSpecification) -> ReactionRegistry {
        let mut registry = ReactionRegistry::new();
        registry.register(spec).unwrap();
        registry
    }

    #[test]
    fn test_unmatched_batch_commits_without_passes() {
        let repo = ModelRepository::new(IdAllocator::new());
        let mut engine = PropagationEngine::default();
        let batch = new_root_batch(&repo, "System", "network.json");

        let (next, report) = engine
            .propagate(
                &repo,
                batch,
                &ReactionRegistry::new(),
                &RejectingUserInteraction,
                &RequestContext::new(),
            )
            .unwrap();

        assert_eq!(report.passes, 0);
        assert_eq!(report.changes.len(), 2);
        assert_eq!(next.revision(), 1);
        assert_eq!(repo.revision(), 0);
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_reaction_output_applied_and_reported() {
        let spec = ChangePropagationSpecification::new("net2graph", "Network", "Graph").react(
            "SystemCreated",
            TriggerShape::root_inserted("System"),
            |_: &EChange, ctx: &mut ReactionContext<'_>| {
                let root = ctx.create_root("Root", "graph.json")?;
                ctx.set_attribute(&root, "name", "graph")?;
                Ok(())
            },
        );
        let registry = registry(spec);
        let repo = ModelRepository::new(IdAllocator::new());
        let mut engine = PropagationEngine::default();

        let (next, report) = engine
            .propagate(
                &repo,
                new_root_batch(&repo, "System", "network.json"),
                &registry,
                &RejectingUserInteraction,
                &RequestContext::new(),
            )
            .unwrap();

        assert_eq!(report.executed, 1);
        assert_eq!(report.produced, 3);
        assert_eq!(report.initiating().len(), 2);
        let sequences: Vec<_> = report.changes.iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
        let graph = next.root_at("graph.json").unwrap();
        assert_eq!(graph.attribute("name"), Some(&Value::from("graph")));
    }

    #[test]
    fn test_panicking_reaction_rolls_back() {
        let spec = ChangePropagationSpecification::new("boom", "A", "B").react(
            "Explode",
            TriggerShape::created("System"),
            |_: &EChange, _: &mut ReactionContext<'_>| -> Result<()> { panic!("kaboom") },
        );
        let registry = registry(spec);
        let repo = ModelRepository::new(IdAllocator::new());
        let mut engine = PropagationEngine::default();

        let err = engine
            .propagate(
                &repo,
                new_root_batch(&repo, "System", "network.json"),
                &registry,
                &RejectingUserInteraction,
                &RequestContext::new(),
            )
            .unwrap_err();

        assert_eq!(
            err,
            VsumError::ReactionExecution {
                reaction: "Explode".to_string(),
                message: "panicked: kaboom".to_string(),
            }
        );
        assert_eq!(engine.state(), EngineState::Failed);
        assert!(repo.root_at("network.json").is_none());
    }

    #[test]
    fn test_declined_choice_keeps_its_kind() {
        let spec = ChangePropagationSpecification::new("ask", "A", "B").react(
            "Ask",
            TriggerShape::created("System"),
            |_: &EChange, ctx: &mut ReactionContext<'_>| {
                ctx.select_single("Which?", &["a", "b"])?;
                Ok(())
            },
        );
        let registry = registry(spec);
        let repo = ModelRepository::new(IdAllocator::new());

        let err = PropagationEngine::default()
            .propagate(
                &repo,
                new_root_batch(&repo, "System", "network.json"),
                &registry,
                &RejectingUserInteraction,
                &RequestContext::new(),
            )
            .unwrap_err();
        assert!(matches!(err, VsumError::UnresolvedChoice { answer: None, .. }));
    }

    #[test]
    fn test_apply_without_propagation_bumps_revision() {
        let repo = ModelRepository::new(IdAllocator::new());
        let mut engine = PropagationEngine::default();

        let (next, report) = engine
            .apply_without_propagation(
                &repo,
                new_root_batch(&repo, "System", "network.json"),
                &RequestContext::new(),
            )
            .unwrap();
        assert_eq!(report.executed, 0);
        assert_eq!(report.revision, 1);
        assert!(next.root_at("network.json").is_some());
    }

    #[test]
    fn test_invalid_initial_batch_is_rejected() {
        let repo = ModelRepository::new(IdAllocator::new());
        let mut batch = new_root_batch(&repo, "System", "network.json");
        batch.remove(0);

        let err = PropagationEngine::default()
            .propagate(
                &repo,
                batch,
                &ReactionRegistry::new(),
                &RejectingUserInteraction,
                &RequestContext::new(),
            )
            .unwrap_err();
        assert!(matches!(err, VsumError::ElementNotFound { .. }));
    }
}
