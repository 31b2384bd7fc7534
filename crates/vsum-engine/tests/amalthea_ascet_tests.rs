#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use tempfile::TempDir;

use vsum_core::{ScriptedUserInteraction, VirtualModel, VsumError};

const AMALTHEA: &str = "model/tasks.amalthea";

fn setup(dir: &TempDir, selections: &[usize]) -> (VirtualModel, Arc<ScriptedUserInteraction>) {
    let interaction = Arc::new(ScriptedUserInteraction::with_selections(selections.to_vec()));
    let vsum = common::build_vsum(dir.path(), common::amalthea_to_ascet(), interaction.clone());
    let mut view = common::editable_view_of(&vsum, &["ComponentContainer"]);
    view.register_root("ComponentContainer", AMALTHEA).unwrap();
    view.commit_changes().unwrap();
    (vsum, interaction)
}

fn add_task(vsum: &VirtualModel) -> Result<(), VsumError> {
    let mut view = common::editable_view_of(vsum, &["ComponentContainer"]);
    let container = common::only_root(view.baseline(), "ComponentContainer");
    view.create_element(&container, "tasks", "Task")?;
    view.commit_changes().map(|_| ())
}

fn task_types(vsum: &VirtualModel, root_type: &str) -> Vec<String> {
    let view = common::view_of(vsum, &[root_type]);
    let root = common::only_root(&view, root_type);
    view.children(&root, "tasks")
        .iter()
        .map(|t| t.type_name.clone())
        .collect()
}

#[test]
fn test_component_container_creates_ascet_module() {
    let dir = TempDir::new().unwrap();
    let (vsum, _) = setup(&dir, &[]);

    assert_eq!(common::view_of(&vsum, &["ComponentContainer"]).root_objects().len(), 1);
    assert_eq!(common::view_of(&vsum, &["AscetModule"]).root_objects().len(), 1);
}

#[test]
fn test_first_choice_creates_interrupt_task() {
    // GIVEN the user will pick the first task type
    let dir = TempDir::new().unwrap();
    let (vsum, interaction) = setup(&dir, &[0]);

    // WHEN a task is added
    add_task(&vsum).unwrap();

    // THEN the module holds an interrupt task and the answer was consumed
    assert_eq!(task_types(&vsum, "ComponentContainer"), vec!["Task"]);
    assert_eq!(task_types(&vsum, "AscetModule"), vec![common::TASK_TYPES[0]]);
    assert_eq!(interaction.pending(), 0);
}

#[test]
fn test_second_choice_creates_periodic_task() {
    let dir = TempDir::new().unwrap();
    let (vsum, _) = setup(&dir, &[1]);

    add_task(&vsum).unwrap();

    assert_eq!(task_types(&vsum, "AscetModule"), vec!["PeriodicTask"]);
}

#[test]
fn test_out_of_range_choice_aborts_commit() {
    // GIVEN the user will answer with a choice that does not exist
    let dir = TempDir::new().unwrap();
    let (vsum, _) = setup(&dir, &[5]);
    let revision = vsum.revision();

    // WHEN a task is added
    let err = add_task(&vsum).unwrap_err();

    // THEN the commit fails and neither side changed
    assert!(matches!(err, VsumError::UnresolvedChoice { .. }));
    assert!(task_types(&vsum, "ComponentContainer").is_empty());
    assert!(task_types(&vsum, "AscetModule").is_empty());
    assert_eq!(vsum.revision(), revision);
}

#[test]
fn test_declined_choice_aborts_commit() {
    let dir = TempDir::new().unwrap();
    let (vsum, _) = setup(&dir, &[]);

    let err = add_task(&vsum).unwrap_err();

    assert!(matches!(err, VsumError::UnresolvedChoice { .. }));
    assert!(task_types(&vsum, "AscetModule").is_empty());
}

#[test]
fn test_one_question_per_task() {
    let dir = TempDir::new().unwrap();
    let (vsum, interaction) = setup(&dir, &[2, 3]);

    add_task(&vsum).unwrap();
    add_task(&vsum).unwrap();

    assert_eq!(
        task_types(&vsum, "AscetModule"),
        vec!["SoftwareTask", "TimeTableTask"]
    );
    assert_eq!(interaction.pending(), 0);
}
