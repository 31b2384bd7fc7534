//! Reaction registry
//!
//! Holds the reactions of every installed propagation specification in
//! registration order, together with the type hierarchy used for subtype
//! widening. Specifications are validated as a whole before anything is
//! installed.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use super::context::ReactionContext;
use super::trigger::TriggerShape;
use crate::change::EChange;
use crate::errors::{Result, VsumError};

/// Declared supertypes, resolved transitively
#[derive(Debug, Clone, Default)]
pub struct TypeHierarchy {
    supertypes: BTreeMap<String, BTreeSet<String>>,
}

impl TypeHierarchy {
    pub fn declare_supertype(&mut self, subtype: impl Into<String>, supertype: impl Into<String>) {
        self.supertypes
            .entry(subtype.into())
            .or_default()
            .insert(supertype.into());
    }

    /// Whether `subtype` derives (directly or transitively) from `supertype`
    pub fn is_subtype_of(&self, subtype: &str, supertype: &str) -> bool {
        let mut seen = HashSet::new();
        let mut frontier = vec![subtype];
        while let Some(next) = frontier.pop() {
            if !seen.insert(next) {
                continue;
            }
            if let Some(parents) = self.supertypes.get(next) {
                if parents.contains(supertype) {
                    return true;
                }
                frontier.extend(parents.iter().map(String::as_str));
            }
        }
        false
    }
}

/// Computation run when a reaction's trigger fits a change record
///
/// Implemented for closures; hand-written routines implement it directly.
pub trait ReactionRoutine: Send + Sync {
    /// React to `change` by reading and editing through `ctx`
    ///
    /// # Errors
    ///
    /// Any error aborts the commit.
    fn execute(&self, change: &EChange, ctx: &mut ReactionContext<'_>) -> Result<()>;
}

impl<F> ReactionRoutine for F
where
    F: Fn(&EChange, &mut ReactionContext<'_>) -> Result<()> + Send + Sync,
{
    fn execute(&self, change: &EChange, ctx: &mut ReactionContext<'_>) -> Result<()> {
        self(change, ctx)
    }
}

/// Named trigger → routine pair
#[derive(Clone)]
pub struct Reaction {
    name: String,
    trigger: TriggerShape,
    routine: Arc<dyn ReactionRoutine>,
}

impl Reaction {
    pub fn new<F>(name: impl Into<String>, trigger: TriggerShape, routine: F) -> Self
    where
        F: Fn(&EChange, &mut ReactionContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self::with_routine(name, trigger, Arc::new(routine))
    }

    pub fn with_routine(
        name: impl Into<String>,
        trigger: TriggerShape,
        routine: Arc<dyn ReactionRoutine>,
    ) -> Self {
        Self {
            name: name.into(),
            trigger,
            routine,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger(&self) -> &TriggerShape {
        &self.trigger
    }

    pub(crate) fn routine(&self) -> &dyn ReactionRoutine {
        self.routine.as_ref()
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

/// Named, ordered set of reactions keeping one domain consistent with another
#[derive(Debug, Clone)]
pub struct ChangePropagationSpecification {
    name: String,
    source_domain: String,
    target_domain: String,
    reactions: Vec<Reaction>,
    supertypes: Vec<(String, String)>,
}

impl ChangePropagationSpecification {
    pub fn new(
        name: impl Into<String>,
        source_domain: impl Into<String>,
        target_domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_domain: source_domain.into(),
            target_domain: target_domain.into(),
            reactions: Vec::new(),
            supertypes: Vec::new(),
        }
    }

    pub fn with_reaction(mut self, reaction: Reaction) -> Self {
        self.reactions.push(reaction);
        self
    }

    /// Shorthand for `with_reaction(Reaction::new(..))`
    pub fn react<F>(self, name: impl Into<String>, trigger: TriggerShape, routine: F) -> Self
    where
        F: Fn(&EChange, &mut ReactionContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.with_reaction(Reaction::new(name, trigger, routine))
    }

    /// Declare `subtype` as deriving from `supertype` for widened triggers
    pub fn with_supertype(
        mut self,
        subtype: impl Into<String>,
        supertype: impl Into<String>,
    ) -> Self {
        self.supertypes.push((subtype.into(), supertype.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_domain(&self) -> &str {
        &self.source_domain
    }

    pub fn target_domain(&self) -> &str {
        &self.target_domain
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReactionRegistry {
    reactions: Vec<Reaction>,
    hierarchy: TypeHierarchy,
    specifications: Vec<String>,
}

impl ReactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install every reaction of `spec`, after the registration order of earlier ones
    ///
    /// # Errors
    ///
    /// Returns `DuplicateReaction` if a reaction name is already taken and
    /// `AmbiguousReaction` if two reactions claim the same trigger shape.
    /// Nothing is installed on error.
    pub fn register(&mut self, spec: ChangePropagationSpecification) -> Result<()> {
        let mut names: HashSet<&str> = self.reactions.iter().map(|r| r.name()).collect();
        let mut claimed: BTreeMap<&TriggerShape, &str> = self
            .reactions
            .iter()
            .map(|r| (r.trigger(), r.name()))
            .collect();

        for reaction in &spec.reactions {
            if !names.insert(reaction.name()) {
                return Err(VsumError::DuplicateReaction {
                    reaction: reaction.name().to_string(),
                });
            }
            if let Some(existing) = claimed.insert(reaction.trigger(), reaction.name()) {
                return Err(VsumError::AmbiguousReaction {
                    reaction: reaction.name().to_string(),
                    existing: existing.to_string(),
                    trigger: reaction.trigger().to_string(),
                });
            }
        }

        tracing::debug!(
            specification = spec.name(),
            reactions = spec.reactions.len(),
            "registered propagation specification"
        );
        for (subtype, supertype) in spec.supertypes {
            self.hierarchy.declare_supertype(subtype, supertype);
        }
        self.reactions.extend(spec.reactions);
        self.specifications.push(spec.name);
        Ok(())
    }

    /// Declare a supertype outside any specification
    pub fn declare_supertype(&mut self, subtype: impl Into<String>, supertype: impl Into<String>) {
        self.hierarchy.declare_supertype(subtype, supertype);
    }

    /// Reactions whose trigger fits `change`, in registration order
    pub fn match_change<'a>(&'a self, change: &'a EChange) -> Vec<&'a Reaction> {
        self.matching(change).map(|(_, r)| r).collect()
    }

    /// Like [`Self::match_change`], with each reaction's registration index
    pub(crate) fn matching<'a>(
        &'a self,
        change: &'a EChange,
    ) -> impl Iterator<Item = (usize, &'a Reaction)> + 'a {
        self.reactions
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.trigger().accepts(change, &self.hierarchy))
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }

    /// Names of installed specifications, in registration order
    pub fn specifications(&self) -> &[String] {
        &self.specifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeOp;
    use crate::model::IdAllocator;

    fn noop(_: &EChange, _: &mut ReactionContext<'_>) -> Result<()> {
        Ok(())
    }

    fn spec(name: &str) -> ChangePropagationSpecification {
        ChangePropagationSpecification::new(name, "Families", "Persons")
    }

    #[test]
    fn test_match_in_registration_order() {
        let mut registry = ReactionRegistry::new();
        registry
            .register(
                spec("a")
                    .react("second", TriggerShape::created("Member").with_subtypes(), noop)
                    .react("first", TriggerShape::created("Member"), noop),
            )
            .unwrap();

        let change = EChange::new(
            IdAllocator::new().new_root_id(),
            "Member",
            ChangeOp::ElementCreated,
        );
        let names: Vec<_> = registry.match_change(&change).iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn test_same_trigger_twice_is_ambiguous() {
        let mut registry = ReactionRegistry::new();
        registry
            .register(spec("a").react("one", TriggerShape::created("Family"), noop))
            .unwrap();

        let err = registry
            .register(spec("b").react("two", TriggerShape::created("Family"), noop))
            .unwrap_err();
        assert!(matches!(err, VsumError::AmbiguousReaction { .. }));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.specifications(), &["a".to_string()]);
    }

    #[test]
    fn test_duplicate_name_rejected_atomically() {
        let mut registry = ReactionRegistry::new();
        let err = registry
            .register(
                spec("a")
                    .react("same", TriggerShape::created("Family"), noop)
                    .react("same", TriggerShape::deleted("Family"), noop),
            )
            .unwrap_err();
        assert!(matches!(err, VsumError::DuplicateReaction { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_transitive_supertypes() {
        let mut hierarchy = TypeHierarchy::default();
        hierarchy.declare_supertype("PeriodicTask", "Task");
        hierarchy.declare_supertype("Task", "Named");
        assert!(hierarchy.is_subtype_of("PeriodicTask", "Named"));
        assert!(!hierarchy.is_subtype_of("Named", "Task"));
    }
}
