//! Minimal, ordered change sets between two snapshots
//!
//! Records are emitted in phases so that applying them in order to `before`
//! never passes through a structurally invalid state:
//!
//! 1. element creations, by id (containers are always older than children)
//! 2. root insertions of new elements at locations that were free
//! 3. attribute sets and unsets
//! 4. reference detachments: list removals by descending index, then
//!    single-valued replacements that empty or vacate a slot. Cross
//!    references into deleted elements are released here too.
//! 5. reference attachments: single-valued replacements, then list moves and
//!    additions in target order
//! 6. root removals, then the remaining root insertions
//! 7. element deletions, children before containers
//!
//! A new root is announced before anything is attached to it, so reactions
//! on its contents find whatever the root's own reaction created. List
//! edits keep the longest run of elements whose relative order survived and
//! move only the others.

use std::collections::{BTreeMap, BTreeSet};

use super::echange::{resequence, ChangeOp, EChange};
use crate::model::{Element, HierarchicalId, ModelSnapshot, ReferenceSlot};

/// Compute the change records turning `before` into `after`, numbered from 1
pub fn diff(before: &ModelSnapshot, after: &ModelSnapshot) -> Vec<EChange> {
    let deleted: BTreeSet<&HierarchicalId> = before
        .elements()
        .map(|e| &e.id)
        .filter(|id| !after.contains(id))
        .collect();

    let mut creations = Vec::new();
    let mut attributes = Vec::new();
    let mut detachments = Vec::new();
    let mut replacements = Vec::new();
    let mut attachments = Vec::new();

    for element in after.elements() {
        let previous = before.get(&element.id);
        if previous.is_none() {
            creations.push(EChange::new(
                element.id.clone(),
                &element.type_name,
                ChangeOp::ElementCreated,
            ));
        }
        attributes.extend(attribute_changes(previous, element));

        let features: BTreeSet<&String> = element
            .references
            .keys()
            .chain(previous.iter().flat_map(|p| p.references.keys()))
            .collect();
        for feature in features {
            let old_slot = previous.and_then(|p| p.references.get(feature));
            let new_slot = element.references.get(feature);
            reference_changes(
                element,
                feature,
                old_slot,
                new_slot,
                &mut detachments,
                &mut replacements,
                &mut attachments,
            );
        }
    }

    // A deleted container releases its surviving contents, and a deleted
    // holder releases cross references into anything else being deleted
    for id in &deleted {
        let Some(element) = before.get(id) else {
            continue;
        };
        for (feature, slot) in &element.references {
            let kept = ReferenceSlot {
                targets: slot
                    .targets
                    .iter()
                    .filter(|t| deleted.contains(t) == slot.containment)
                    .cloned()
                    .collect(),
                ..slot.clone()
            };
            if kept.targets == slot.targets {
                continue;
            }
            let kept = (!kept.targets.is_empty()).then_some(kept);
            reference_changes(
                element,
                feature,
                Some(slot),
                kept.as_ref(),
                &mut detachments,
                &mut replacements,
                &mut attachments,
            );
        }
    }

    let roots = root_changes(before, after);
    let mut changes = creations;
    changes.extend(roots.early_insertions);
    changes.extend(attributes);
    changes.extend(detachments);
    changes.extend(replacements);
    changes.extend(attachments);
    changes.extend(roots.removals);
    changes.extend(roots.insertions);
    changes.extend(deletions(before, &deleted));
    resequence(&mut changes);
    changes
}

/// Synthetic batch of pure insertions reproducing `snapshot` from nothing
pub fn seeding_batch(snapshot: &ModelSnapshot) -> Vec<EChange> {
    diff(&ModelSnapshot::new(), snapshot)
}

fn attribute_changes(previous: Option<&Element>, element: &Element) -> Vec<EChange> {
    let mut out = Vec::new();
    let empty = BTreeMap::new();
    let old_attrs = previous.map(|p| &p.attributes).unwrap_or(&empty);

    for (feature, value) in &element.attributes {
        let old = old_attrs.get(feature);
        if old != Some(value) {
            out.push(EChange::new(
                element.id.clone(),
                &element.type_name,
                ChangeOp::AttributeSet {
                    feature: feature.clone(),
                    old: old.cloned(),
                    new: value.clone(),
                },
            ));
        }
    }
    for (feature, old) in old_attrs {
        if !element.attributes.contains_key(feature) {
            out.push(EChange::new(
                element.id.clone(),
                &element.type_name,
                ChangeOp::AttributeUnset {
                    feature: feature.clone(),
                    old: old.clone(),
                },
            ));
        }
    }
    out
}

fn reference_changes(
    element: &Element,
    feature: &str,
    old_slot: Option<&ReferenceSlot>,
    new_slot: Option<&ReferenceSlot>,
    detachments: &mut Vec<EChange>,
    replacements: &mut Vec<EChange>,
    attachments: &mut Vec<EChange>,
) {
    let record = |op: ChangeOp| EChange::new(element.id.clone(), &element.type_name, op);
    let list = |slot: Option<&ReferenceSlot>| -> Vec<HierarchicalId> {
        slot.filter(|s| s.many)
            .map(|s| s.targets.clone())
            .unwrap_or_default()
    };
    let single = |slot: Option<&ReferenceSlot>| -> Option<HierarchicalId> {
        slot.filter(|s| !s.many).and_then(|s| s.targets.first().cloned())
    };
    let containment = new_slot
        .or(old_slot)
        .map(|s| s.containment)
        .unwrap_or(false);

    // List-valued
    let edits = list_edits(&list(old_slot), &list(new_slot));
    for (target, index) in edits.removals {
        detachments.push(record(ChangeOp::ReferenceRemoved {
            feature: feature.to_string(),
            target,
            index,
            containment: old_slot.map(|s| s.containment).unwrap_or(containment),
        }));
    }
    for edit in edits.placements {
        attachments.push(record(match edit {
            Placement::Add { target, index } => ChangeOp::ReferenceAdded {
                feature: feature.to_string(),
                target,
                index,
                containment,
            },
            Placement::Move { target, from, to } => ChangeOp::ReferenceMoved {
                feature: feature.to_string(),
                target,
                from,
                to,
            },
        }));
    }

    // Single-valued
    let old = single(old_slot);
    let new = single(new_slot);
    if old == new {
        return;
    }
    match (old, new) {
        (Some(old), Some(new)) if containment => {
            // Vacate first so the new occupant may come from anywhere
            detachments.push(record(ChangeOp::ReferenceReplaced {
                feature: feature.to_string(),
                old: Some(old),
                new: None,
                containment,
            }));
            replacements.push(record(ChangeOp::ReferenceReplaced {
                feature: feature.to_string(),
                old: None,
                new: Some(new),
                containment,
            }));
        }
        (old, None) => detachments.push(record(ChangeOp::ReferenceReplaced {
            feature: feature.to_string(),
            old,
            new: None,
            containment: old_slot.map(|s| s.containment).unwrap_or(containment),
        })),
        (old, new) => replacements.push(record(ChangeOp::ReferenceReplaced {
            feature: feature.to_string(),
            old,
            new,
            containment,
        })),
    }
}

enum Placement {
    Add {
        target: HierarchicalId,
        index: usize,
    },
    Move {
        target: HierarchicalId,
        from: usize,
        to: usize,
    },
}

struct ListEdits {
    /// `(target, index)` by descending index, each index valid at its turn
    removals: Vec<(HierarchicalId, usize)>,
    /// By ascending target index, applied after all removals
    placements: Vec<Placement>,
}

/// Explicit add/remove/move edits turning list `old` into list `new`
///
/// Elements on the longest common subsequence stay put; every other kept
/// element costs exactly one move.
fn list_edits(old: &[HierarchicalId], new: &[HierarchicalId]) -> ListEdits {
    let wanted: BTreeSet<&HierarchicalId> = new.iter().collect();
    let mut removals = Vec::new();
    let mut working: Vec<HierarchicalId> = old.to_vec();
    for index in (0..old.len()).rev() {
        if !wanted.contains(&old[index]) {
            removals.push((old[index].clone(), index));
            working.remove(index);
        }
    }

    let stable = stable_run(&working, new);
    let mut placements = Vec::new();
    for (index, target) in new.iter().enumerate() {
        if stable.contains(target) {
            continue;
        }
        let from = working.iter().position(|t| t == target);
        if let Some(from) = from {
            working.remove(from);
        }
        // Right behind its predecessor in `new`, which is already in place
        let to = match index.checked_sub(1) {
            Some(previous) => working
                .iter()
                .position(|t| *t == new[previous])
                .map_or(0, |p| p + 1),
            None => 0,
        };
        working.insert(to, target.clone());
        match from {
            Some(from) if from == to => {}
            Some(from) => placements.push(Placement::Move {
                target: target.clone(),
                from,
                to,
            }),
            None => placements.push(Placement::Add {
                target: target.clone(),
                index: to,
            }),
        }
    }

    ListEdits {
        removals,
        placements,
    }
}

/// Longest run of `new` whose elements appear in `working` in the same order
fn stable_run<'a>(
    working: &[HierarchicalId],
    new: &'a [HierarchicalId],
) -> BTreeSet<&'a HierarchicalId> {
    let position: BTreeMap<&HierarchicalId, usize> =
        working.iter().enumerate().map(|(i, t)| (t, i)).collect();
    let kept: Vec<(usize, &HierarchicalId)> = new
        .iter()
        .filter_map(|t| position.get(t).map(|p| (*p, t)))
        .collect();

    // Patience sorting over old positions
    let mut tails: Vec<usize> = Vec::new();
    let mut parent: Vec<Option<usize>> = vec![None; kept.len()];
    for (i, (pos, _)) in kept.iter().enumerate() {
        let len = tails.partition_point(|&t| kept[t].0 < *pos);
        parent[i] = len.checked_sub(1).map(|l| tails[l]);
        if len == tails.len() {
            tails.push(i);
        } else {
            tails[len] = i;
        }
    }

    let mut stable = BTreeSet::new();
    let mut next = tails.last().copied();
    while let Some(i) = next {
        stable.insert(kept[i].1);
        next = parent[i];
    }
    stable
}

struct RootChanges {
    /// New elements registered at a location nobody held
    early_insertions: Vec<EChange>,
    removals: Vec<EChange>,
    insertions: Vec<EChange>,
}

fn root_changes(before: &ModelSnapshot, after: &ModelSnapshot) -> RootChanges {
    let record = |snapshot: &ModelSnapshot, id: &HierarchicalId, op: ChangeOp| {
        let type_name = snapshot.get(id).map(|e| e.type_name.as_str()).unwrap_or("");
        EChange::new(id.clone(), type_name, op)
    };

    let mut changes = RootChanges {
        early_insertions: Vec::new(),
        removals: Vec::new(),
        insertions: Vec::new(),
    };
    for (location, id) in before.roots() {
        if after.root_at(location) != Some(id) {
            changes.removals.push(record(
                before,
                id,
                ChangeOp::RootRemoved {
                    location_key: location.to_string(),
                },
            ));
        }
    }
    for (location, id) in after.roots() {
        let previous = before.root_at(location);
        if previous == Some(id) {
            continue;
        }
        let change = record(
            after,
            id,
            ChangeOp::RootInserted {
                location_key: location.to_string(),
            },
        );
        if previous.is_none() && !before.contains(id) {
            changes.early_insertions.push(change);
        } else {
            changes.insertions.push(change);
        }
    }
    changes
}

fn deletions(before: &ModelSnapshot, deleted: &BTreeSet<&HierarchicalId>) -> Vec<EChange> {
    let mut out = Vec::new();
    let tops = deleted.iter().filter(|id| {
        before
            .get(id)
            .and_then(Element::container_id)
            .map(|c| !deleted.contains(c))
            .unwrap_or(true)
    });
    for top in tops {
        let mut subtree = before.subtree(top);
        subtree.retain(|id| deleted.contains(id));
        for id in subtree.iter().rev() {
            let type_name = before.get(id).map(|e| e.type_name.as_str()).unwrap_or("");
            out.push(EChange::new(id.clone(), type_name, ChangeOp::ElementDeleted));
        }
    }
    out
}
