//! Arena of elements keyed by id, plus the root location table
//!
//! A `ModelSnapshot` is the unit the repository owns, views copy out, and
//! `diff` compares. Every edit validates before it mutates, so a failed edit
//! leaves the snapshot untouched.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::element::{ContainerRef, Element, ReferenceSlot};
use super::id::HierarchicalId;
use super::value::Value;
use crate::change::{ChangeOp, EChange};
use crate::errors::{Result, VsumError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    elements: BTreeMap<HierarchicalId, Element>,
    roots: BTreeMap<String, HierarchicalId>,
}

fn not_found(id: &HierarchicalId) -> VsumError {
    VsumError::ElementNotFound { id: id.to_string() }
}

impl ModelSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Queries =====

    pub fn get(&self, id: &HierarchicalId) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn contains(&self, id: &HierarchicalId) -> bool {
        self.elements.contains_key(id)
    }

    /// All elements in id order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Registered roots as `(location_key, root_id)`, ordered by location key
    pub fn roots(&self) -> impl Iterator<Item = (&str, &HierarchicalId)> {
        self.roots.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn root_at(&self, location_key: &str) -> Option<&HierarchicalId> {
        self.roots.get(location_key)
    }

    /// Location key under which `root` is registered
    pub fn location_of(&self, root: &HierarchicalId) -> Option<&str> {
        self.roots
            .iter()
            .find(|(_, id)| *id == root)
            .map(|(k, _)| k.as_str())
    }

    /// Top of the containment chain of `id`
    pub fn root_of(&self, id: &HierarchicalId) -> Option<&HierarchicalId> {
        let mut current = self.elements.get(id)?;
        // Bounded walk; a containment cycle can never be longer than the arena
        for _ in 0..=self.elements.len() {
            match current.container_id() {
                Some(parent) => current = self.elements.get(parent)?,
                None => return Some(&current.id),
            }
        }
        None
    }

    /// `id` followed by everything it transitively contains, in pre-order
    pub fn subtree(&self, id: &HierarchicalId) -> Vec<HierarchicalId> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(next) = stack.pop() {
            if let Some(element) = self.elements.get(&next) {
                let children: Vec<_> = element.contents().cloned().collect();
                stack.extend(children.into_iter().rev());
                out.push(next);
            }
        }
        out
    }

    /// Elements of `id`'s subtree, in pre-order
    pub fn subtree_elements(&self, id: &HierarchicalId) -> Vec<Element> {
        self.subtree(id)
            .iter()
            .filter_map(|i| self.elements.get(i).cloned())
            .collect()
    }

    /// Copy of this snapshot limited to the given roots' containment trees
    pub fn restrict_to<'a>(&self, roots: impl IntoIterator<Item = &'a HierarchicalId>) -> Self {
        let mut restricted = Self::new();
        for root in roots {
            let Some(location) = self.location_of(root) else {
                continue;
            };
            restricted
                .roots
                .insert(location.to_string(), root.clone());
            for element in self.subtree_elements(root) {
                restricted.elements.insert(element.id.clone(), element);
            }
        }
        restricted
    }

    /// Cross references pointing into `id`'s containment subtree
    ///
    /// Returned as `(holder, feature, target)`, holders in id order.
    /// Containment slots are not cross references and are never listed.
    pub fn incoming_references(
        &self,
        id: &HierarchicalId,
    ) -> Vec<(HierarchicalId, String, HierarchicalId)> {
        let doomed: BTreeSet<HierarchicalId> = self.subtree(id).into_iter().collect();
        let mut incoming = Vec::new();
        for element in self.elements.values() {
            for (feature, slot) in element.references.iter().filter(|(_, s)| !s.containment) {
                for target in slot.targets.iter().filter(|t| doomed.contains(*t)) {
                    incoming.push((element.id.clone(), feature.clone(), target.clone()));
                }
            }
        }
        incoming
    }

    /// Largest id serial in the arena
    pub fn max_serial(&self) -> u64 {
        self.elements.keys().map(HierarchicalId::serial).max().unwrap_or(0)
    }

    /// Check the structural invariants of a committed model
    ///
    /// Every registered root exists and is uncontained, every other element is
    /// reachable from a registered root, and container back-pointers agree
    /// with the containing slots.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChange` describing the first violation found.
    pub fn check_integrity(&self) -> Result<()> {
        for (location, root) in &self.roots {
            let element = self.elements.get(root).ok_or_else(|| {
                VsumError::invalid_change(format!(
                    "root {} registered at {} does not exist",
                    root, location
                ))
            })?;
            if element.container.is_some() {
                return Err(VsumError::invalid_change(format!(
                    "root {} registered at {} is contained",
                    root, location
                )));
            }
        }

        for element in self.elements.values() {
            if let Some(container) = &element.container {
                let holds = self
                    .elements
                    .get(&container.id)
                    .map(|c| c.references(&container.feature).contains(&element.id))
                    .unwrap_or(false);
                if !holds {
                    return Err(VsumError::invalid_change(format!(
                        "element {} is not held by its container {}",
                        element.id, container.id
                    )));
                }
            }
            let anchored = self
                .root_of(&element.id)
                .map(|top| self.location_of(top).is_some())
                .unwrap_or(false);
            if !anchored {
                return Err(VsumError::invalid_change(format!(
                    "element {} is not reachable from a registered root",
                    element.id
                )));
            }
        }
        Ok(())
    }

    // ===== Edits =====

    fn get_mut(&mut self, id: &HierarchicalId) -> Result<&mut Element> {
        self.elements.get_mut(id).ok_or_else(|| not_found(id))
    }

    /// Whether `candidate` is `id` or one of its containers
    fn is_ancestor_or_self(&self, candidate: &HierarchicalId, id: &HierarchicalId) -> bool {
        let mut current = Some(id);
        for _ in 0..=self.elements.len() {
            match current {
                Some(c) if c == candidate => return true,
                Some(c) => current = self.elements.get(c).and_then(Element::container_id),
                None => return false,
            }
        }
        false
    }

    fn check_attachable(&self, holder: &HierarchicalId, target: &HierarchicalId) -> Result<()> {
        let element = self.elements.get(target).ok_or_else(|| not_found(target))?;
        if let Some(container) = &element.container {
            return Err(VsumError::invalid_change(format!(
                "element {} is already contained by {}",
                target, container.id
            )));
        }
        if self.is_ancestor_or_self(target, holder) {
            return Err(VsumError::invalid_change(format!(
                "containing {} in {} would create a containment cycle",
                target, holder
            )));
        }
        Ok(())
    }

    fn set_container(&mut self, target: &HierarchicalId, container: Option<ContainerRef>) {
        if let Some(element) = self.elements.get_mut(target) {
            element.container = container;
        }
    }

    /// Add a bare element
    ///
    /// # Errors
    ///
    /// Returns `IdentityConflict` if an element with this id is live.
    pub fn create_element(&mut self, id: HierarchicalId, type_name: &str) -> Result<()> {
        if self.elements.contains_key(&id) {
            return Err(VsumError::IdentityConflict { id: id.to_string() });
        }
        self.elements.insert(id.clone(), Element::new(id, type_name));
        Ok(())
    }

    /// Insert fully-formed elements (e.g. read back from storage)
    ///
    /// # Errors
    ///
    /// Returns `IdentityConflict` if any id is already live; nothing is inserted then.
    pub fn insert_elements(&mut self, elements: Vec<Element>) -> Result<()> {
        if let Some(clash) = elements.iter().find(|e| self.elements.contains_key(&e.id)) {
            return Err(VsumError::IdentityConflict {
                id: clash.id.to_string(),
            });
        }
        for element in elements {
            self.elements.insert(element.id.clone(), element);
        }
        Ok(())
    }

    /// Delete an element with everything it contains
    ///
    /// The element is detached from its container or unregistered as root,
    /// and cross references to any deleted element are dropped. Returns the
    /// deleted ids, children before their containers.
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the element does not exist.
    pub fn delete_element(&mut self, id: &HierarchicalId) -> Result<Vec<HierarchicalId>> {
        let container = self
            .elements
            .get(id)
            .ok_or_else(|| not_found(id))?
            .container
            .clone();

        let mut removed = self.subtree(id);
        removed.reverse();
        let doomed: BTreeSet<&HierarchicalId> = removed.iter().collect();

        if let Some(container) = container {
            if let Some(holder) = self.elements.get_mut(&container.id) {
                remove_target(holder, &container.feature, id);
            }
        }
        self.roots.retain(|_, root| !doomed.contains(root));
        for doomed_id in &removed {
            self.elements.remove(doomed_id);
        }
        for element in self.elements.values_mut() {
            element.references.retain(|_, slot| {
                slot.targets.retain(|t| !doomed.contains(t));
                !slot.targets.is_empty()
            });
        }
        Ok(removed)
    }

    /// Delete every element not reachable from a registered root
    pub fn prune_detached(&mut self) -> Vec<HierarchicalId> {
        let mut reachable = BTreeSet::new();
        for root in self.roots.values() {
            reachable.extend(self.subtree(root));
        }
        let detached: Vec<HierarchicalId> = self
            .elements
            .keys()
            .filter(|id| !reachable.contains(*id))
            .cloned()
            .collect();

        let mut pruned = Vec::new();
        for id in detached {
            if self.elements.contains_key(&id) {
                if let Ok(removed) = self.delete_element(&id) {
                    pruned.extend(removed);
                }
            }
        }
        pruned
    }

    /// Set an attribute, returning the previous value
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the element does not exist.
    pub fn set_attribute(
        &mut self,
        id: &HierarchicalId,
        feature: &str,
        value: Value,
    ) -> Result<Option<Value>> {
        Ok(self
            .get_mut(id)?
            .attributes
            .insert(feature.to_string(), value))
    }

    /// Unset an attribute, returning the previous value
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the element does not exist.
    pub fn unset_attribute(&mut self, id: &HierarchicalId, feature: &str) -> Result<Option<Value>> {
        Ok(self.get_mut(id)?.attributes.remove(feature))
    }

    /// Insert `target` at `index` of a list-valued reference
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` for a missing holder or target and
    /// `InvalidChange` for an out-of-range index, a duplicate target, a
    /// feature shape mismatch, or a target that cannot be contained.
    pub fn insert_reference(
        &mut self,
        id: &HierarchicalId,
        feature: &str,
        target: &HierarchicalId,
        index: usize,
        containment: bool,
    ) -> Result<()> {
        let holder = self.elements.get(id).ok_or_else(|| not_found(id))?;
        let current = holder.references.get(feature);
        if let Some(slot) = current {
            if !slot.many || slot.containment != containment {
                return Err(VsumError::invalid_change(format!(
                    "feature {}.{} has a different shape",
                    id, feature
                )));
            }
            if slot.targets.contains(target) {
                return Err(VsumError::invalid_change(format!(
                    "{} already referenced by {}.{}",
                    target, id, feature
                )));
            }
        }
        let len = current.map(|s| s.targets.len()).unwrap_or(0);
        if index > len {
            return Err(VsumError::invalid_change(format!(
                "index {} out of range for {}.{} (len {})",
                index, id, feature, len
            )));
        }
        if containment {
            self.check_attachable(id, target)?;
        } else if !self.elements.contains_key(target) {
            return Err(not_found(target));
        }

        let holder = self.get_mut(id)?;
        holder
            .references
            .entry(feature.to_string())
            .or_insert_with(|| ReferenceSlot {
                containment,
                many: true,
                targets: Vec::new(),
            })
            .targets
            .insert(index, target.clone());
        if containment {
            self.set_container(
                target,
                Some(ContainerRef {
                    id: id.clone(),
                    feature: feature.to_string(),
                }),
            );
        }
        Ok(())
    }

    /// Remove `target` found at `index` of a list-valued reference
    ///
    /// A removed containment target stays in the arena, detached.
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` for a missing holder and `InvalidChange` when
    /// `target` is not at `index`.
    pub fn remove_reference(
        &mut self,
        id: &HierarchicalId,
        feature: &str,
        target: &HierarchicalId,
        index: usize,
    ) -> Result<()> {
        let holder = self.get_mut(id)?;
        let slot = holder
            .references
            .get_mut(feature)
            .filter(|slot| slot.many && slot.targets.get(index) == Some(target))
            .ok_or_else(|| {
                VsumError::invalid_change(format!(
                    "{} is not at index {} of {}.{}",
                    target, index, id, feature
                ))
            })?;
        let containment = slot.containment;
        slot.targets.remove(index);
        if slot.targets.is_empty() {
            holder.references.remove(feature);
        }
        if containment {
            self.set_container(target, None);
        }
        Ok(())
    }

    /// Replace the occupant of a single-valued reference
    ///
    /// A replaced containment occupant stays in the arena, detached.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChange` if the current occupant is not `old`, the
    /// feature is list-valued, or `new` cannot be contained; `ElementNotFound`
    /// for a missing holder or target.
    pub fn replace_reference(
        &mut self,
        id: &HierarchicalId,
        feature: &str,
        old: Option<&HierarchicalId>,
        new: Option<&HierarchicalId>,
        containment: bool,
    ) -> Result<()> {
        let holder = self.elements.get(id).ok_or_else(|| not_found(id))?;
        let slot = holder.references.get(feature);
        if slot.map(|s| s.many || s.containment != containment).unwrap_or(false) {
            return Err(VsumError::invalid_change(format!(
                "feature {}.{} has a different shape",
                id, feature
            )));
        }
        let occupant = slot.and_then(|s| s.targets.first());
        if occupant != old {
            return Err(VsumError::invalid_change(format!(
                "{}.{} holds {:?}, expected {:?}",
                id,
                feature,
                occupant.map(|o| o.as_str()),
                old.map(|o| o.as_str())
            )));
        }
        if let Some(new) = new {
            if containment {
                if old != Some(new) {
                    self.check_attachable(id, new)?;
                }
            } else if !self.elements.contains_key(new) {
                return Err(not_found(new));
            }
        }

        if let (Some(old), true) = (old, containment) {
            self.set_container(old, None);
        }
        let holder = self.get_mut(id)?;
        match new {
            Some(new) => {
                holder.references.insert(
                    feature.to_string(),
                    ReferenceSlot {
                        containment,
                        many: false,
                        targets: vec![new.clone()],
                    },
                );
            }
            None => {
                holder.references.remove(feature);
            }
        }
        if let (Some(new), true) = (new, containment) {
            self.set_container(
                new,
                Some(ContainerRef {
                    id: id.clone(),
                    feature: feature.to_string(),
                }),
            );
        }
        Ok(())
    }

    /// Move `target` from index `from` to index `to` of a list-valued reference
    ///
    /// # Errors
    ///
    /// Returns `InvalidChange` if `target` is not at `from` or `to` is out of range.
    pub fn move_reference(
        &mut self,
        id: &HierarchicalId,
        feature: &str,
        target: &HierarchicalId,
        from: usize,
        to: usize,
    ) -> Result<()> {
        let holder = self.get_mut(id)?;
        let slot = holder
            .references
            .get_mut(feature)
            .filter(|slot| slot.many && slot.targets.get(from) == Some(target))
            .ok_or_else(|| {
                VsumError::invalid_change(format!(
                    "{} is not at index {} of {}.{}",
                    target, from, id, feature
                ))
            })?;
        if to >= slot.targets.len() {
            return Err(VsumError::invalid_change(format!(
                "index {} out of range for {}.{}",
                to, id, feature
            )));
        }
        let moved = slot.targets.remove(from);
        slot.targets.insert(to, moved);
        Ok(())
    }

    /// Register an uncontained element as root under `location_key`
    ///
    /// # Errors
    ///
    /// Returns `DuplicateLocation` if the key is occupied, `ElementNotFound`
    /// if the element is missing, and `InvalidChange` if it is contained or
    /// already registered elsewhere.
    pub fn insert_root(&mut self, location_key: &str, id: &HierarchicalId) -> Result<()> {
        if self.roots.contains_key(location_key) {
            return Err(VsumError::DuplicateLocation {
                location_key: location_key.to_string(),
            });
        }
        let element = self.elements.get(id).ok_or_else(|| not_found(id))?;
        if element.container.is_some() {
            return Err(VsumError::invalid_change(format!(
                "contained element {} cannot become a root",
                id
            )));
        }
        if let Some(existing) = self.location_of(id) {
            return Err(VsumError::invalid_change(format!(
                "{} is already registered at {}",
                id, existing
            )));
        }
        self.roots.insert(location_key.to_string(), id.clone());
        Ok(())
    }

    /// Unregister the root at `location_key`; the element stays in the arena
    ///
    /// # Errors
    ///
    /// Returns `LocationNotFound` if nothing is registered there and
    /// `InvalidChange` if a different root is.
    pub fn remove_root(&mut self, location_key: &str, id: &HierarchicalId) -> Result<()> {
        match self.roots.get(location_key) {
            None => Err(VsumError::LocationNotFound {
                location_key: location_key.to_string(),
            }),
            Some(registered) if registered != id => Err(VsumError::invalid_change(format!(
                "{} is registered at {}, not {}",
                registered, location_key, id
            ))),
            Some(_) => {
                self.roots.remove(location_key);
                Ok(())
            }
        }
    }

    /// Apply one change record
    ///
    /// Unlike [`Self::delete_element`], an `ElementDeleted` record never
    /// drops cross references on its own: they must have been removed by
    /// earlier records.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying edit, or `InvalidChange` if the
    /// record's declared type disagrees with the live element or it deletes
    /// an element that is still referenced.
    pub fn apply(&mut self, change: &EChange) -> Result<()> {
        let id = &change.element;
        if !matches!(change.op, ChangeOp::ElementCreated) {
            if let Some(element) = self.elements.get(id) {
                if element.type_name != change.element_type {
                    return Err(VsumError::invalid_change(format!(
                        "record #{} declares {} as {}, element is {}",
                        change.sequence, id, change.element_type, element.type_name
                    )));
                }
            }
        }

        match &change.op {
            ChangeOp::ElementCreated => self.create_element(id.clone(), &change.element_type),
            ChangeOp::ElementDeleted => {
                if let Some((holder, feature, target)) =
                    self.incoming_references(id).into_iter().next()
                {
                    return Err(VsumError::invalid_change(format!(
                        "record #{} deletes {} while {}.{} still refers to {}",
                        change.sequence, id, holder, feature, target
                    )));
                }
                self.delete_element(id).map(|_| ())
            }
            ChangeOp::AttributeSet { feature, new, .. } => {
                self.set_attribute(id, feature, new.clone()).map(|_| ())
            }
            ChangeOp::AttributeUnset { feature, .. } => {
                self.unset_attribute(id, feature).map(|_| ())
            }
            ChangeOp::ReferenceAdded {
                feature,
                target,
                index,
                containment,
            } => self.insert_reference(id, feature, target, *index, *containment),
            ChangeOp::ReferenceRemoved {
                feature,
                target,
                index,
                ..
            } => self.remove_reference(id, feature, target, *index),
            ChangeOp::ReferenceReplaced {
                feature,
                old,
                new,
                containment,
            } => self.replace_reference(id, feature, old.as_ref(), new.as_ref(), *containment),
            ChangeOp::ReferenceMoved {
                feature,
                target,
                from,
                to,
            } => self.move_reference(id, feature, target, *from, *to),
            ChangeOp::RootInserted { location_key } => self.insert_root(location_key, id),
            ChangeOp::RootRemoved { location_key } => self.remove_root(location_key, id),
        }
    }
}

fn remove_target(holder: &mut Element, feature: &str, target: &HierarchicalId) {
    if let Some(slot) = holder.references.get_mut(feature) {
        slot.targets.retain(|t| t != target);
        if slot.targets.is_empty() {
            holder.references.remove(feature);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IdAllocator;

    fn family_tree() -> (ModelSnapshot, IdAllocator, HierarchicalId, HierarchicalId) {
        let ids = IdAllocator::new();
        let mut snapshot = ModelSnapshot::new();
        let register = ids.new_root_id();
        snapshot.create_element(register.clone(), "FamilyRegister").unwrap();
        snapshot.insert_root("families.json", &register).unwrap();

        let family = ids.new_id(&register, "families");
        snapshot.create_element(family.clone(), "Family").unwrap();
        snapshot
            .insert_reference(&register, "families", &family, 0, true)
            .unwrap();
        (snapshot, ids, register, family)
    }

    #[test]
    fn test_containment_sets_back_pointer() {
        let (snapshot, _, register, family) = family_tree();
        let element = snapshot.get(&family).unwrap();
        assert_eq!(element.container_id(), Some(&register));
        assert_eq!(snapshot.root_of(&family), Some(&register));
        snapshot.check_integrity().unwrap();
    }

    #[test]
    fn test_create_existing_id_is_identity_conflict() {
        let (mut snapshot, _, _, family) = family_tree();
        let err = snapshot.create_element(family, "Family").unwrap_err();
        assert!(matches!(err, VsumError::IdentityConflict { .. }));
    }

    #[test]
    fn test_delete_cascades_and_strips_cross_references() {
        let (mut snapshot, ids, register, family) = family_tree();
        let father = ids.new_id(&family, "father");
        snapshot.create_element(father.clone(), "Member").unwrap();
        snapshot
            .replace_reference(&family, "father", None, Some(&father), true)
            .unwrap();
        let other = ids.new_root_id();
        snapshot.create_element(other.clone(), "Note").unwrap();
        snapshot.insert_root("notes.json", &other).unwrap();
        snapshot
            .insert_reference(&other, "about", &father, 0, false)
            .unwrap();

        let removed = snapshot.delete_element(&family).unwrap();

        assert_eq!(removed, vec![father.clone(), family.clone()]);
        assert!(!snapshot.contains(&father));
        assert!(snapshot.get(&register).unwrap().references("families").is_empty());
        assert!(snapshot.get(&other).unwrap().references("about").is_empty());
        snapshot.check_integrity().unwrap();
    }

    #[test]
    fn test_deleting_root_unregisters_location() {
        let (mut snapshot, _, register, _) = family_tree();
        snapshot.delete_element(&register).unwrap();
        assert!(snapshot.root_at("families.json").is_none());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_duplicate_location_rejected() {
        let (mut snapshot, ids, _, _) = family_tree();
        let other = ids.new_root_id();
        snapshot.create_element(other.clone(), "FamilyRegister").unwrap();
        let err = snapshot.insert_root("families.json", &other).unwrap_err();
        assert!(matches!(err, VsumError::DuplicateLocation { .. }));
    }

    #[test]
    fn test_contained_element_cannot_be_contained_twice() {
        let (mut snapshot, ids, register, family) = family_tree();
        let second = ids.new_id(&register, "families");
        snapshot.create_element(second.clone(), "Family").unwrap();
        snapshot
            .insert_reference(&register, "families", &second, 1, true)
            .unwrap();

        let err = snapshot
            .insert_reference(&second, "sons", &family, 0, true)
            .unwrap_err();
        assert!(matches!(err, VsumError::InvalidChange { .. }));
        // Nothing changed
        assert!(snapshot.get(&second).unwrap().references("sons").is_empty());
    }

    #[test]
    fn test_containment_cycle_rejected() {
        let (mut snapshot, _, register, family) = family_tree();
        snapshot.remove_root("families.json", &register).unwrap();
        let err = snapshot
            .insert_reference(&family, "owner", &register, 0, true)
            .unwrap_err();
        assert!(matches!(err, VsumError::InvalidChange { .. }));
    }

    #[test]
    fn test_prune_detached_removes_unanchored_trees() {
        let (mut snapshot, ids, register, family) = family_tree();
        let stray = ids.new_root_id();
        snapshot.create_element(stray.clone(), "Family").unwrap();
        snapshot
            .remove_reference(&register, "families", &family, 0)
            .unwrap();

        let mut pruned = snapshot.prune_detached();
        pruned.sort();
        assert_eq!(pruned, vec![family, stray]);
        snapshot.check_integrity().unwrap();
    }

    #[test]
    fn test_restrict_to_copies_selected_trees() {
        let (snapshot, _, register, family) = family_tree();
        let restricted = snapshot.restrict_to([&register]);
        assert!(restricted.contains(&family));
        assert_eq!(restricted.root_at("families.json"), Some(&register));

        let empty = snapshot.restrict_to(std::iter::empty());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_move_reference_reorders() {
        let (mut snapshot, ids, register, family) = family_tree();
        let second = ids.new_id(&register, "families");
        snapshot.create_element(second.clone(), "Family").unwrap();
        snapshot
            .insert_reference(&register, "families", &second, 1, true)
            .unwrap();

        snapshot
            .move_reference(&register, "families", &second, 1, 0)
            .unwrap();
        assert_eq!(
            snapshot.get(&register).unwrap().references("families"),
            &[second, family]
        );
    }

    #[test]
    fn test_applied_deletion_of_referenced_element_rejected() {
        let (mut snapshot, ids, _, family) = family_tree();
        let note = ids.new_root_id();
        snapshot.create_element(note.clone(), "Note").unwrap();
        snapshot.insert_root("notes.json", &note).unwrap();
        snapshot
            .insert_reference(&note, "about", &family, 0, false)
            .unwrap();
        assert_eq!(
            snapshot.incoming_references(&family),
            vec![(note.clone(), "about".to_string(), family.clone())]
        );

        let delete = EChange::new(family.clone(), "Family", ChangeOp::ElementDeleted);
        let err = snapshot.apply(&delete).unwrap_err();
        assert!(matches!(err, VsumError::InvalidChange { .. }));
        assert!(snapshot.contains(&family));

        snapshot.remove_reference(&note, "about", &family, 0).unwrap();
        snapshot.apply(&delete).unwrap();
        assert!(!snapshot.contains(&family));
    }

    #[test]
    fn test_apply_rejects_type_mismatch() {
        let (mut snapshot, _, _, family) = family_tree();
        let change = EChange::new(
            family,
            "Person",
            ChangeOp::AttributeSet {
                feature: "lastName".to_string(),
                old: None,
                new: Value::from("Smith"),
            },
        );
        assert!(matches!(
            snapshot.apply(&change),
            Err(VsumError::InvalidChange { .. })
        ));
    }
}
