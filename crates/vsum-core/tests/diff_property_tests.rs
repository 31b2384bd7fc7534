//! Property tests for change derivation: replaying the derived batch on the
//! old model must yield the new model.

use proptest::prelude::*;

use vsum_core::change::{diff, ChangeKind};
use vsum_core::model::{HierarchicalId, IdAllocator, ModelSnapshot};

fn list_model(root: &HierarchicalId, items: &[HierarchicalId]) -> ModelSnapshot {
    let mut model = ModelSnapshot::new();
    model.create_element(root.clone(), "List").unwrap();
    model.insert_root("list.json", root).unwrap();
    for (index, item) in items.iter().enumerate() {
        model.create_element(item.clone(), "Item").unwrap();
        model
            .insert_reference(root, "items", item, index, true)
            .unwrap();
    }
    model
}

fn replay(before: &ModelSnapshot, after: &ModelSnapshot) -> ModelSnapshot {
    let mut replayed = before.clone();
    for change in diff(before, after) {
        replayed.apply(&change).unwrap();
    }
    replayed
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn list_diff_replays_to_new_list(
        existing in 0usize..8,
        keep in prop::collection::vec(any::<bool>(), 8),
        order in prop::collection::vec(any::<u16>(), 12),
        fresh in 0usize..4,
    ) {
        let ids = IdAllocator::new();
        let root = ids.new_root_id();
        let old: Vec<HierarchicalId> = (0..existing).map(|_| ids.new_id(&root, "items")).collect();
        let added: Vec<HierarchicalId> = (0..fresh).map(|_| ids.new_id(&root, "items")).collect();

        let mut keyed: Vec<(u16, HierarchicalId)> = old
            .iter()
            .zip(&keep)
            .filter(|(_, keep)| **keep)
            .map(|(id, _)| id.clone())
            .chain(added)
            .zip(&order)
            .map(|(id, key)| (*key, id))
            .collect();
        keyed.sort_by_key(|(key, _)| *key);
        let new: Vec<HierarchicalId> = keyed.into_iter().map(|(_, id)| id).collect();

        let before = list_model(&root, &old);
        let after = list_model(&root, &new);
        let replayed = replay(&before, &after);

        prop_assert!(replayed.check_integrity().is_ok());
        prop_assert_eq!(replayed, after);
    }

    #[test]
    fn attribute_diff_replays_to_new_values(
        old_values in prop::collection::vec(prop::option::of(0i64..4), 4),
        new_values in prop::collection::vec(prop::option::of(0i64..4), 4),
    ) {
        let ids = IdAllocator::new();
        let root = ids.new_root_id();
        let items: Vec<HierarchicalId> = (0..4).map(|_| ids.new_id(&root, "items")).collect();

        let mut before = list_model(&root, &items);
        let mut after = list_model(&root, &items);
        for (item, (old, new)) in items.iter().zip(old_values.iter().zip(&new_values)) {
            if let Some(old) = old {
                before.set_attribute(item, "weight", (*old).into()).unwrap();
            }
            if let Some(new) = new {
                after.set_attribute(item, "weight", (*new).into()).unwrap();
            }
        }

        prop_assert_eq!(replay(&before, &after), after);
    }
}

#[test]
fn test_element_moved_between_containers_keeps_identity() {
    // GIVEN an item contained in one list
    let ids = IdAllocator::new();
    let left = ids.new_root_id();
    let right = ids.new_root_id();
    let item = ids.new_id(&left, "items");

    let mut before = ModelSnapshot::new();
    before.create_element(left.clone(), "List").unwrap();
    before.create_element(right.clone(), "List").unwrap();
    before.insert_root("left.json", &left).unwrap();
    before.insert_root("right.json", &right).unwrap();
    before.create_element(item.clone(), "Item").unwrap();
    before.insert_reference(&left, "items", &item, 0, true).unwrap();

    // WHEN it is moved to the other list
    let mut after = before.clone();
    after.remove_reference(&left, "items", &item, 0).unwrap();
    after.insert_reference(&right, "items", &item, 0, true).unwrap();

    // THEN the derived batch neither deletes nor recreates it
    let changes = diff(&before, &after);
    assert!(!changes.iter().any(|c| c.element == item
        && matches!(c.kind(), ChangeKind::ElementCreated | ChangeKind::ElementDeleted)));
    assert_eq!(replay(&before, &after), after);
}

fn count(changes: &[vsum_core::change::EChange], kind: ChangeKind) -> usize {
    changes.iter().filter(|c| c.kind() == kind).count()
}

#[test]
fn test_rotated_list_costs_one_move() {
    // GIVEN a list of five items
    let ids = IdAllocator::new();
    let root = ids.new_root_id();
    let items: Vec<HierarchicalId> = (0..5).map(|_| ids.new_id(&root, "items")).collect();
    let mut rotated = items[1..].to_vec();
    rotated.push(items[0].clone());

    // WHEN the first item is rotated to the end
    let before = list_model(&root, &items);
    let after = list_model(&root, &rotated);
    let changes = diff(&before, &after);

    // THEN a single move describes it
    assert_eq!(changes.len(), 1);
    assert_eq!(count(&changes, ChangeKind::ReferenceMoved), 1);
    assert_eq!(replay(&before, &after), after);
}

#[test]
fn test_reversed_list_keeps_one_item_in_place() {
    let ids = IdAllocator::new();
    let root = ids.new_root_id();
    let items: Vec<HierarchicalId> = (0..6).map(|_| ids.new_id(&root, "items")).collect();
    let reversed: Vec<HierarchicalId> = items.iter().rev().cloned().collect();

    let before = list_model(&root, &items);
    let after = list_model(&root, &reversed);
    let changes = diff(&before, &after);

    assert_eq!(count(&changes, ChangeKind::ReferenceMoved), 5);
    assert_eq!(count(&changes, ChangeKind::ReferenceAdded), 0);
    assert_eq!(replay(&before, &after), after);
}
