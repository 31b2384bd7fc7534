#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use tempfile::TempDir;

use vsum_core::view::{drop_attribute_changes, ChangeTransformingViewType};
use vsum_core::VirtualModel;

const NETWORK: &str = "model/network.network";

fn setup(dir: &TempDir) -> VirtualModel {
    let vsum = common::build_vsum(dir.path(), common::network_to_graph(), common::rejecting());
    let mut view = common::editable_view_of(&vsum, &["System"]);
    view.register_root("System", NETWORK).unwrap();
    view.commit_changes().unwrap();
    vsum
}

fn add_component(vsum: &VirtualModel, name: &str) {
    let mut view = common::editable_view_of(vsum, &["System"]);
    let system = common::only_root(view.baseline(), "System");
    let component = view.create_element(&system, "components", "Component").unwrap();
    view.set_attribute(&component, "name", name).unwrap();
    view.commit_changes().unwrap();
}

fn names(vsum: &VirtualModel, root_type: &str, feature: &str) -> Vec<String> {
    let view = common::view_of(vsum, &[root_type]);
    let root = common::only_root(&view, root_type);
    view.children(&root, feature)
        .iter()
        .map(|e| e.attribute_str("name").unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_system_insertion_creates_graph() {
    let dir = TempDir::new().unwrap();
    let vsum = setup(&dir);

    assert_eq!(common::view_of(&vsum, &["System"]).root_objects().len(), 1);
    assert_eq!(common::view_of(&vsum, &["Root"]).root_objects().len(), 1);
}

#[test]
fn test_component_insertion_creates_entity_with_same_name() {
    // GIVEN a system
    let dir = TempDir::new().unwrap();
    let vsum = setup(&dir);

    // WHEN a named component is added
    add_component(&vsum, "specialname");

    // THEN the graph holds an entity of the same name
    assert_eq!(names(&vsum, "System", "components"), vec!["specialname"]);
    assert_eq!(names(&vsum, "Root", "entities"), vec!["specialname"]);
}

#[test]
fn test_component_rename_follows_to_entity() {
    let dir = TempDir::new().unwrap();
    let vsum = setup(&dir);
    add_component(&vsum, "specialname");

    let mut view = common::editable_view_of(&vsum, &["System"]);
    let system = common::only_root(view.baseline(), "System");
    let component = view.children(&system, "components")[0].id.clone();
    view.set_attribute(&component, "name", "newName").unwrap();
    view.commit_changes().unwrap();

    assert_eq!(names(&vsum, "System", "components"), vec!["newName"]);
    assert_eq!(names(&vsum, "Root", "entities"), vec!["newName"]);
}

#[test]
fn test_component_deletion_deletes_entity() {
    // GIVEN a system with one component
    let dir = TempDir::new().unwrap();
    let vsum = setup(&dir);
    add_component(&vsum, "specialname");

    // WHEN the component is removed from the system
    let mut view = common::editable_view_of(&vsum, &["System"]);
    let system = common::only_root(view.baseline(), "System");
    let component = view.children(&system, "components")[0].id.clone();
    view.remove_reference(&system, "components", &component).unwrap();
    view.commit_changes().unwrap();

    // THEN both lists are empty and no link is left behind
    assert!(names(&vsum, "System", "components").is_empty());
    assert!(names(&vsum, "Root", "entities").is_empty());
    assert_eq!(vsum.correspondences().len(), 1);
}

#[test]
fn test_removing_system_removes_graph() {
    let dir = TempDir::new().unwrap();
    let vsum = setup(&dir);
    add_component(&vsum, "a");
    add_component(&vsum, "b");

    vsum.remove_root(NETWORK).unwrap();

    assert!(vsum.roots().is_empty());
    assert!(vsum.correspondences().is_empty());
}

#[test]
fn test_attribute_filter_lets_only_structure_through() {
    // GIVEN a system and a view type dropping attribute records
    let dir = TempDir::new().unwrap();
    let vsum = setup(&dir);
    let view_type = ChangeTransformingViewType::create("structure-only");
    let filter = drop_attribute_changes();
    assert!(view_type.register_filter(filter.clone()));
    assert!(!view_type.register_filter(filter));

    // WHEN a named component is added through that view type
    let mut selector = vsum.create_selector(view_type);
    selector.select_types(&["System"]);
    let mut view = selector.create_view().with_change_deriving_trait();
    let system = common::only_root(view.baseline(), "System");
    let component = view.create_element(&system, "components", "Component").unwrap();
    view.set_attribute(&component, "name", "specialname").unwrap();
    view.commit_changes().unwrap();

    // THEN the entity exists but no name reached either side
    assert_eq!(names(&vsum, "System", "components"), vec![""]);
    assert_eq!(names(&vsum, "Root", "entities"), vec![""]);
}
