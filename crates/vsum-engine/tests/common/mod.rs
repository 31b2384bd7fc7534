use std::path::Path;
use std::sync::Arc;

use vsum_core::model::HierarchicalId;
use vsum_core::reactions::{ChangePropagationSpecification, ReactionContext, TriggerShape};
use vsum_core::view::IdentityMappingViewType;
use vsum_core::{
    CommittableView, RejectingUserInteraction, Result, UserInteraction, View, VirtualModel,
    VsumError,
};
use vsum_engine::VirtualModelBuilder;

/// Build a virtual model over `specification`, stored under `folder`
#[allow(dead_code)]
pub fn build_vsum(
    folder: &Path,
    specification: ChangePropagationSpecification,
    interaction: Arc<dyn UserInteraction>,
) -> VirtualModel {
    VirtualModelBuilder::new()
        .with_storage_folder(folder)
        .with_user_interaction(interaction)
        .with_change_propagation_specification(specification)
        .build_and_initialize()
        .unwrap()
}

#[allow(dead_code)]
pub fn rejecting() -> Arc<dyn UserInteraction> {
    Arc::new(RejectingUserInteraction)
}

/// Read-only view over the roots of the given types
#[allow(dead_code)]
pub fn view_of(vsum: &VirtualModel, types: &[&str]) -> View {
    let mut selector = vsum.create_selector(IdentityMappingViewType::create("default"));
    selector.select_types(types);
    selector.create_view()
}

#[allow(dead_code)]
pub fn editable_view_of(vsum: &VirtualModel, types: &[&str]) -> CommittableView {
    view_of(vsum, types).with_change_deriving_trait()
}

/// The single root of `type_name` visible in `view`
#[allow(dead_code)]
pub fn only_root(view: &View, type_name: &str) -> HierarchicalId {
    let roots = view.root_objects_of_type(type_name);
    assert_eq!(roots.len(), 1, "expected exactly one {type_name} root");
    roots[0].id.clone()
}

#[allow(dead_code)]
fn missing(what: &str) -> VsumError {
    VsumError::invalid_change(format!("{what} has no counterpart"))
}

#[allow(dead_code)]
fn first_corresponding(
    ctx: &ReactionContext<'_>,
    id: &HierarchicalId,
    tag: &str,
) -> Result<HierarchicalId> {
    ctx.corresponding(id, Some(tag))
        .into_iter()
        .next()
        .ok_or_else(|| missing(tag))
}

// ===== families → persons =====

#[allow(dead_code)]
const MEMBER_FEATURES: [(&str, &str); 4] = [
    ("father", "Male"),
    ("mother", "Female"),
    ("sons", "Male"),
    ("daughters", "Female"),
];

#[allow(dead_code)]
fn full_name(ctx: &ReactionContext<'_>, member: &HierarchicalId) -> Result<String> {
    let element = ctx.element(member)?;
    let first = element.attribute_str("firstName").unwrap_or_default().to_string();
    let family = element
        .container_id()
        .cloned()
        .ok_or_else(|| VsumError::invalid_change("member outside a family"))?;
    let last = ctx.element(&family)?.attribute_str("lastName").unwrap_or_default();
    Ok(format!("{first} {last}"))
}

#[allow(dead_code)]
fn create_person(
    ctx: &mut ReactionContext<'_>,
    family: &HierarchicalId,
    member: &HierarchicalId,
    person_type: &str,
) -> Result<()> {
    let register = ctx
        .element(family)?
        .container_id()
        .cloned()
        .ok_or_else(|| VsumError::invalid_change("family outside a register"))?;
    let persons = first_corresponding(ctx, &register, "register")?;
    let person = ctx.create_element(&persons, "persons", person_type)?;
    let name = full_name(ctx, member)?;
    ctx.set_attribute(&person, "fullName", name)?;
    ctx.add_correspondence(member, &person, "person");
    Ok(())
}

#[allow(dead_code)]
fn rename_persons(ctx: &mut ReactionContext<'_>, member: &HierarchicalId) -> Result<()> {
    let persons = ctx.corresponding(member, Some("person"));
    if persons.is_empty() {
        return Ok(());
    }
    let name = full_name(ctx, member)?;
    for person in persons {
        ctx.set_attribute(&person, "fullName", name.clone())?;
    }
    Ok(())
}

/// Families to persons
///
/// - a `FamilyRegister` at `key` gets a `PersonRegister` at `key.persons`
/// - every family member gets a `Male` or `Female` named "first last"
/// - renaming a member or a family renames the persons
/// - deleting a member deletes its person
#[allow(dead_code)]
pub fn families_to_persons() -> ChangePropagationSpecification {
    let mut spec =
        ChangePropagationSpecification::new("families-to-persons", "families", "persons").react(
            "FamilyRegisterInserted",
            TriggerShape::root_inserted("FamilyRegister"),
            |change, ctx| {
                let key = format!("{}.persons", change.location_key().unwrap_or_default());
                let persons = ctx.create_root("PersonRegister", &key)?;
                ctx.add_correspondence(&change.element, &persons, "register");
                Ok(())
            },
        );

    for (feature, person_type) in MEMBER_FEATURES {
        let trigger = if feature == "father" || feature == "mother" {
            TriggerShape::reference_replaced("Family", feature)
        } else {
            TriggerShape::reference_added("Family", feature)
        };
        spec = spec.react(
            format!("{feature}Inserted"),
            trigger,
            move |change, ctx| {
                let Some(member) = change.new_target().cloned() else {
                    return Ok(());
                };
                create_person(ctx, &change.element, &member, person_type)
            },
        );
    }

    spec.react(
        "FirstNameChanged",
        TriggerShape::attribute_set("Member", "firstName"),
        |change, ctx| rename_persons(ctx, &change.element),
    )
    .react(
        "LastNameChanged",
        TriggerShape::attribute_set("Family", "lastName"),
        |change, ctx| {
            let family = ctx.element(&change.element)?;
            let members: Vec<HierarchicalId> = MEMBER_FEATURES
                .iter()
                .flat_map(|(feature, _)| family.references(feature).to_vec())
                .collect();
            for member in members {
                rename_persons(ctx, &member)?;
            }
            Ok(())
        },
    )
    .react(
        "MemberDeleted",
        TriggerShape::deleted("Member"),
        |change, ctx| {
            for person in ctx.corresponding(&change.element, Some("person")) {
                ctx.delete_element(&person)?;
            }
            Ok(())
        },
    )
}

// ===== network → graph =====

/// Network to graph
///
/// - a `System` at `key` gets a graph `Root` at `key.graph`
/// - every component of the system gets an `Entity` of the same name
/// - renaming and deleting components follow through
#[allow(dead_code)]
pub fn network_to_graph() -> ChangePropagationSpecification {
    ChangePropagationSpecification::new("network-to-graph", "network", "graph")
        .react(
            "SystemInserted",
            TriggerShape::root_inserted("System"),
            |change, ctx| {
                let key = format!("{}.graph", change.location_key().unwrap_or_default());
                let graph = ctx.create_root("Root", &key)?;
                ctx.add_correspondence(&change.element, &graph, "graph");
                Ok(())
            },
        )
        .react(
            "ComponentInserted",
            TriggerShape::reference_added("System", "components"),
            |change, ctx| {
                let Some(component) = change.new_target().cloned() else {
                    return Ok(());
                };
                let graph = first_corresponding(ctx, &change.element, "graph")?;
                let entity = ctx.create_element(&graph, "entities", "Entity")?;
                if let Some(name) = ctx.element(&component)?.attribute("name").cloned() {
                    ctx.set_attribute(&entity, "name", name)?;
                }
                ctx.add_correspondence(&component, &entity, "entity");
                Ok(())
            },
        )
        .react(
            "ComponentRenamed",
            TriggerShape::attribute_set("Component", "name"),
            |change, ctx| {
                let Some(name) = change.new_value().cloned() else {
                    return Ok(());
                };
                for entity in ctx.corresponding(&change.element, Some("entity")) {
                    ctx.set_attribute(&entity, "name", name.clone())?;
                }
                Ok(())
            },
        )
        .react(
            "ComponentDeleted",
            TriggerShape::deleted("Component"),
            |change, ctx| {
                for entity in ctx.corresponding(&change.element, Some("entity")) {
                    ctx.delete_element(&entity)?;
                }
                Ok(())
            },
        )
        .react(
            "SystemDeleted",
            TriggerShape::deleted("System"),
            |change, ctx| {
                for graph in ctx.corresponding(&change.element, Some("graph")) {
                    ctx.delete_element(&graph)?;
                }
                Ok(())
            },
        )
}

// ===== amalthea → ascet =====

#[allow(dead_code)]
pub const TASK_TYPES: [&str; 4] = ["InterruptTask", "PeriodicTask", "SoftwareTask", "TimeTableTask"];

/// Amalthea to ASCET
///
/// - a `ComponentContainer` at `key` gets an `AscetModule` at `key.ascet`
/// - every new task asks the user which ASCET task type to create
#[allow(dead_code)]
pub fn amalthea_to_ascet() -> ChangePropagationSpecification {
    ChangePropagationSpecification::new("amalthea-to-ascet", "amalthea", "ascet")
        .react(
            "ComponentContainerInserted",
            TriggerShape::root_inserted("ComponentContainer"),
            |change, ctx| {
                let key = format!("{}.ascet", change.location_key().unwrap_or_default());
                let module = ctx.create_root("AscetModule", &key)?;
                ctx.add_correspondence(&change.element, &module, "module");
                Ok(())
            },
        )
        .react(
            "TaskCreated",
            TriggerShape::reference_added("ComponentContainer", "tasks"),
            |change, ctx| {
                let Some(task) = change.new_target().cloned() else {
                    return Ok(());
                };
                let choice = ctx.select_single("Which task type should be created?", &TASK_TYPES)?;
                let module = first_corresponding(ctx, &change.element, "module")?;
                let created = ctx.create_element(&module, "tasks", TASK_TYPES[choice])?;
                ctx.add_correspondence(&task, &created, "task");
                Ok(())
            },
        )
}
