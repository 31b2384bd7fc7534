//! Read-through, write-through view of the working repository handed to reactions
//!
//! Every edit is turned into a change record, applied to the working copy
//! immediately and appended to the outgoing batch, so later reactions in the
//! same commit see it.

use crate::change::{ChangeOp, EChange};
use crate::correspondence::Correspondence;
use crate::errors::{Result, VsumError};
use crate::interaction::{resolve_single, UserInteraction};
use crate::model::{Element, HierarchicalId, Value};
use crate::repository::ModelRepository;

pub struct ReactionContext<'a> {
    reaction: &'a str,
    repository: &'a mut ModelRepository,
    interaction: &'a dyn UserInteraction,
    produced: &'a mut Vec<EChange>,
    sequence: &'a mut u64,
}

impl<'a> ReactionContext<'a> {
    pub(crate) fn new(
        reaction: &'a str,
        repository: &'a mut ModelRepository,
        interaction: &'a dyn UserInteraction,
        produced: &'a mut Vec<EChange>,
        sequence: &'a mut u64,
    ) -> Self {
        Self {
            reaction,
            repository,
            interaction,
            produced,
            sequence,
        }
    }

    /// Name of the executing reaction
    pub fn reaction_name(&self) -> &str {
        self.reaction
    }

    // ===== Reads =====

    pub fn repository(&self) -> &ModelRepository {
        &*self.repository
    }

    pub fn resolve(&self, id: &HierarchicalId) -> Option<&Element> {
        self.repository.resolve(id)
    }

    /// Like [`Self::resolve`], failing when the element is gone
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound`.
    pub fn element(&self, id: &HierarchicalId) -> Result<&Element> {
        self.repository
            .resolve(id)
            .ok_or_else(|| VsumError::ElementNotFound { id: id.to_string() })
    }

    pub fn root_at(&self, location_key: &str) -> Option<&Element> {
        self.repository.root_at(location_key)
    }

    /// First registered root (by location key) of the given type
    pub fn first_root_of_type(&self, type_name: &str) -> Option<HierarchicalId> {
        self.repository
            .roots_of_type(|e| e.type_name == type_name)
            .first()
            .map(|e| e.id.clone())
    }

    /// Elements linked to `id` under `tag` (any tag when `None`)
    pub fn corresponding(&self, id: &HierarchicalId, tag: Option<&str>) -> Vec<HierarchicalId> {
        self.repository.correspondences().corresponding(id, tag)
    }

    /// Live elements of `type_name` linked to `id`
    pub fn corresponding_of_type(&self, id: &HierarchicalId, type_name: &str) -> Vec<HierarchicalId> {
        self.corresponding(id, None)
            .into_iter()
            .filter(|c| {
                self.repository
                    .resolve(c)
                    .map(|e| e.type_name == type_name)
                    .unwrap_or(false)
            })
            .collect()
    }

    // ===== Decisions =====

    /// Ask the user to pick one of `choices`
    ///
    /// # Errors
    ///
    /// Returns `UnresolvedChoice` when the answer is missing or out of range.
    pub fn select_single(&self, message: &str, choices: &[&str]) -> Result<usize> {
        let choices: Vec<String> = choices.iter().map(|c| c.to_string()).collect();
        resolve_single(self.interaction, self.reaction, message, &choices)
    }

    // ===== Edits =====

    fn emit(&mut self, change: EChange) -> Result<()> {
        *self.sequence += 1;
        let change = change.with_sequence(*self.sequence);
        self.repository.apply(&change)?;
        self.produced.push(change);
        Ok(())
    }

    fn type_of(&self, id: &HierarchicalId) -> Result<String> {
        Ok(self.element(id)?.type_name.clone())
    }

    /// Create a new root of `type_name` registered under `location_key`
    ///
    /// # Errors
    ///
    /// Returns `DuplicateLocation` if the key is occupied.
    pub fn create_root(&mut self, type_name: &str, location_key: &str) -> Result<HierarchicalId> {
        if self.repository.root_at(location_key).is_some() {
            return Err(VsumError::DuplicateLocation {
                location_key: location_key.to_string(),
            });
        }
        let id = self.repository.ids().new_root_id();
        self.emit(EChange::new(id.clone(), type_name, ChangeOp::ElementCreated))?;
        self.emit(EChange::new(
            id.clone(),
            type_name,
            ChangeOp::RootInserted {
                location_key: location_key.to_string(),
            },
        ))?;
        Ok(id)
    }

    /// Create an element appended to the list-valued containment `feature` of `container`
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the container is gone.
    pub fn create_element(
        &mut self,
        container: &HierarchicalId,
        feature: &str,
        type_name: &str,
    ) -> Result<HierarchicalId> {
        let holder = self.element(container)?;
        let container_type = holder.type_name.clone();
        let index = holder.references(feature).len();
        let id = self.repository.ids().new_id(container, feature);
        self.emit(EChange::new(id.clone(), type_name, ChangeOp::ElementCreated))?;
        self.emit(EChange::new(
            container.clone(),
            container_type,
            ChangeOp::ReferenceAdded {
                feature: feature.to_string(),
                target: id.clone(),
                index,
                containment: true,
            },
        ))?;
        Ok(id)
    }

    /// Create an element in the single-valued containment `feature` of
    /// `container`, deleting any previous occupant
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the container is gone.
    pub fn create_single(
        &mut self,
        container: &HierarchicalId,
        feature: &str,
        type_name: &str,
    ) -> Result<HierarchicalId> {
        let container_type = self.type_of(container)?;
        let previous = self.element(container)?.reference(feature).cloned();
        if let Some(previous) = previous {
            self.delete_element(&previous)?;
        }
        let id = self.repository.ids().new_id(container, feature);
        self.emit(EChange::new(id.clone(), type_name, ChangeOp::ElementCreated))?;
        self.emit(EChange::new(
            container.clone(),
            container_type,
            ChangeOp::ReferenceReplaced {
                feature: feature.to_string(),
                old: None,
                new: Some(id.clone()),
                containment: true,
            },
        ))?;
        Ok(id)
    }

    /// Set an attribute; setting the current value emits nothing
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the element is gone.
    pub fn set_attribute(
        &mut self,
        id: &HierarchicalId,
        feature: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let value = value.into();
        let element = self.element(id)?;
        let old = element.attribute(feature).cloned();
        if old.as_ref() == Some(&value) {
            return Ok(());
        }
        let type_name = element.type_name.clone();
        self.emit(EChange::new(
            id.clone(),
            type_name,
            ChangeOp::AttributeSet {
                feature: feature.to_string(),
                old,
                new: value,
            },
        ))
    }

    /// Unset an attribute; unsetting an unset attribute emits nothing
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the element is gone.
    pub fn unset_attribute(&mut self, id: &HierarchicalId, feature: &str) -> Result<()> {
        let element = self.element(id)?;
        let Some(old) = element.attribute(feature).cloned() else {
            return Ok(());
        };
        let type_name = element.type_name.clone();
        self.emit(EChange::new(
            id.clone(),
            type_name,
            ChangeOp::AttributeUnset {
                feature: feature.to_string(),
                old,
            },
        ))
    }

    /// Append `target` to the list-valued cross reference `feature`
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if either element is gone.
    pub fn add_reference(
        &mut self,
        id: &HierarchicalId,
        feature: &str,
        target: &HierarchicalId,
    ) -> Result<()> {
        let element = self.element(id)?;
        if element.references(feature).contains(target) {
            return Ok(());
        }
        let index = element.references(feature).len();
        let type_name = element.type_name.clone();
        self.emit(EChange::new(
            id.clone(),
            type_name,
            ChangeOp::ReferenceAdded {
                feature: feature.to_string(),
                target: target.clone(),
                index,
                containment: false,
            },
        ))
    }

    /// Remove `target` from the list-valued reference `feature`, if present
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the holder is gone.
    pub fn remove_reference(
        &mut self,
        id: &HierarchicalId,
        feature: &str,
        target: &HierarchicalId,
    ) -> Result<()> {
        let element = self.element(id)?;
        let Some(index) = element.references(feature).iter().position(|t| t == target) else {
            return Ok(());
        };
        let type_name = element.type_name.clone();
        let containment = element
            .references
            .get(feature)
            .map(|s| s.containment)
            .unwrap_or(false);
        self.emit(EChange::new(
            id.clone(),
            type_name,
            ChangeOp::ReferenceRemoved {
                feature: feature.to_string(),
                target: target.clone(),
                index,
                containment,
            },
        ))
    }

    /// Point the single-valued cross reference `feature` at `target`
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if either element is gone.
    pub fn replace_reference(
        &mut self,
        id: &HierarchicalId,
        feature: &str,
        target: Option<&HierarchicalId>,
    ) -> Result<()> {
        let element = self.element(id)?;
        let old = element.reference(feature).cloned();
        if old.as_ref() == target {
            return Ok(());
        }
        let type_name = element.type_name.clone();
        self.emit(EChange::new(
            id.clone(),
            type_name,
            ChangeOp::ReferenceReplaced {
                feature: feature.to_string(),
                old,
                new: target.cloned(),
                containment: false,
            },
        ))
    }

    /// Delete an element and everything it contains
    ///
    /// Emits the removal of every cross reference into the subtree, then the
    /// detach from its container (or root removal), then one deletion per
    /// element, children first. Deleting an element that is already gone
    /// emits nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be applied.
    pub fn delete_element(&mut self, id: &HierarchicalId) -> Result<()> {
        if self.repository.resolve(id).is_none() {
            return Ok(());
        }
        let incoming = self.repository.model().incoming_references(id);
        for (holder, feature, target) in incoming {
            let many = self
                .element(&holder)?
                .references
                .get(&feature)
                .map(|s| s.many)
                .unwrap_or(false);
            if many {
                self.remove_reference(&holder, &feature, &target)?;
            } else {
                self.replace_reference(&holder, &feature, None)?;
            }
        }

        let element = self.element(id)?;
        let type_name = element.type_name.clone();

        if let Some(location_key) = self.repository.location_of(id) {
            let location_key = location_key.to_string();
            self.emit(EChange::new(
                id.clone(),
                type_name,
                ChangeOp::RootRemoved { location_key },
            ))?;
        } else if let Some(container) = element.container.clone() {
            let holder = self.element(&container.id)?;
            let holder_type = holder.type_name.clone();
            let many = holder
                .references
                .get(&container.feature)
                .map(|s| s.many)
                .unwrap_or(true);
            let op = if many {
                let index = holder
                    .references(&container.feature)
                    .iter()
                    .position(|t| t == id)
                    .unwrap_or(0);
                ChangeOp::ReferenceRemoved {
                    feature: container.feature,
                    target: id.clone(),
                    index,
                    containment: true,
                }
            } else {
                ChangeOp::ReferenceReplaced {
                    feature: container.feature,
                    old: Some(id.clone()),
                    new: None,
                    containment: true,
                }
            };
            self.emit(EChange::new(container.id, holder_type, op))?;
        }

        let doomed: Vec<(HierarchicalId, String)> = self
            .repository
            .model()
            .subtree(id)
            .into_iter()
            .rev()
            .filter_map(|d| {
                self.repository
                    .resolve(&d)
                    .map(|e| (d.clone(), e.type_name.clone()))
            })
            .collect();
        for (doomed_id, doomed_type) in doomed {
            self.emit(EChange::new(doomed_id, doomed_type, ChangeOp::ElementDeleted))?;
        }
        Ok(())
    }

    /// Link two elements under `tag`; returns whether the link is new
    pub fn add_correspondence(
        &mut self,
        source: &HierarchicalId,
        target: &HierarchicalId,
        tag: &str,
    ) -> bool {
        self.repository
            .correspondences_mut()
            .add(Correspondence::new(source.clone(), target.clone(), tag))
    }

    /// Unlink two elements; returns whether the link existed
    pub fn remove_correspondence(
        &mut self,
        source: &HierarchicalId,
        target: &HierarchicalId,
        tag: &str,
    ) -> bool {
        self.repository
            .correspondences_mut()
            .remove(&Correspondence::new(source.clone(), target.clone(), tag))
    }
}
