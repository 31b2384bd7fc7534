use std::sync::Arc;

use vsum_core::interaction::RejectingUserInteraction;
use vsum_core::reactions::{ChangePropagationSpecification, ReactionRegistry, TriggerShape};
use vsum_core::view::IdentityMappingViewType;
use vsum_core::{CommittableView, PropagationSettings, Value, VirtualModel, VsumError};

/// Create a virtual model over `registry` that declines every user choice
#[allow(dead_code)]
pub fn new_vsum(registry: ReactionRegistry) -> VirtualModel {
    new_vsum_with(registry, PropagationSettings::default())
}

#[allow(dead_code)]
pub fn new_vsum_with(registry: ReactionRegistry, settings: PropagationSettings) -> VirtualModel {
    VirtualModel::new(registry, Arc::new(RejectingUserInteraction), settings).unwrap()
}

/// Editable view over every root registered right now
#[allow(dead_code)]
pub fn editable_view(vsum: &VirtualModel) -> CommittableView {
    let mut selector = vsum.create_selector(IdentityMappingViewType::create("editor"));
    selector.select_all();
    selector.create_view().with_change_deriving_trait()
}

/// Registry mirroring every `Register` root into a `Mirror` root
///
/// - a new `Register` at `key` gets a `Mirror` at `key.mirror`
/// - `Register.name` is copied to the mirror, at creation and on change
/// - removing the register removes the mirror
#[allow(dead_code)]
pub fn mirror_registry() -> ReactionRegistry {
    let spec = ChangePropagationSpecification::new("registers-to-mirrors", "registers", "mirrors")
        .react(
            "CreateMirror",
            TriggerShape::root_inserted("Register"),
            |change, ctx| {
                let key = format!("{}.mirror", change.location_key().unwrap_or_default());
                let mirror = ctx.create_root("Mirror", &key)?;
                ctx.add_correspondence(&change.element, &mirror, "mirror");
                if let Some(name) = ctx.element(&change.element)?.attribute("name").cloned() {
                    ctx.set_attribute(&mirror, "name", name)?;
                }
                Ok(())
            },
        )
        .react(
            "CopyName",
            TriggerShape::attribute_set("Register", "name"),
            |change, ctx| {
                let name = change.new_value().cloned().unwrap_or(Value::from(""));
                for mirror in ctx.corresponding(&change.element, Some("mirror")) {
                    ctx.set_attribute(&mirror, "name", name.clone())?;
                }
                Ok(())
            },
        )
        .react(
            "DeleteMirror",
            TriggerShape::deleted("Register"),
            |change, ctx| {
                for mirror in ctx.corresponding(&change.element, Some("mirror")) {
                    ctx.delete_element(&mirror)?;
                }
                Ok(())
            },
        );
    let mut registry = ReactionRegistry::new();
    registry.register(spec).unwrap();
    registry
}

/// Registry whose single reaction increments `Counter.value` until `limit`
///
/// With `limit = None` the reaction never settles.
#[allow(dead_code)]
pub fn counter_registry(limit: Option<i64>) -> ReactionRegistry {
    let spec = ChangePropagationSpecification::new("counter", "counter", "counter").react(
        "Bump",
        TriggerShape::attribute_set("Counter", "value"),
        move |change, ctx| {
            let value = change
                .new_value()
                .and_then(Value::as_int)
                .ok_or_else(|| VsumError::invalid_change("value is not an integer"))?;
            if limit.map(|l| value < l).unwrap_or(true) {
                ctx.set_attribute(&change.element, "value", value + 1)?;
            }
            Ok(())
        },
    );
    let mut registry = ReactionRegistry::new();
    registry.register(spec).unwrap();
    registry
}
