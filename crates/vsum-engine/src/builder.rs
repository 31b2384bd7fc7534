//! Assembly of a virtual model from reaction sets and storage settings

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use vsum_core::errors::{Result, VsumError};
use vsum_core::reactions::{ChangePropagationSpecification, ReactionRegistry};
use vsum_core::{
    log_op_end, log_op_error, log_op_start, ChangePropagationMode, ModelPersistence,
    PropagationSettings, UserInteraction, VirtualModel,
};
use vsum_store::FsModelStore;

use crate::config::{InitialBuild, VsumConfig};

/// Collects everything a virtual model needs, then builds it in one step
///
/// A user interaction is mandatory; every other setting has a default.
#[derive(Default)]
pub struct VirtualModelBuilder {
    storage_folder: Option<PathBuf>,
    interaction: Option<Arc<dyn UserInteraction>>,
    specifications: Vec<ChangePropagationSpecification>,
    settings: PropagationSettings,
    initial_build: InitialBuild,
}

impl std::fmt::Debug for VirtualModelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualModelBuilder")
            .field("storage_folder", &self.storage_folder)
            .field("interaction", &self.interaction.is_some())
            .field("specifications", &self.specifications.len())
            .field("settings", &self.settings)
            .field("initial_build", &self.initial_build)
            .finish()
    }
}

impl VirtualModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take storage folder, propagation settings and initial build from `config`
    pub fn with_config(mut self, config: &VsumConfig) -> Self {
        self.storage_folder = config.storage_folder.clone();
        self.settings = config.propagation;
        self.initial_build = config.initial_build;
        self
    }

    pub fn with_storage_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.storage_folder = Some(folder.into());
        self
    }

    pub fn with_user_interaction(mut self, interaction: Arc<dyn UserInteraction>) -> Self {
        self.interaction = Some(interaction);
        self
    }

    pub fn with_change_propagation_specification(
        mut self,
        specification: ChangePropagationSpecification,
    ) -> Self {
        self.specifications.push(specification);
        self
    }

    pub fn with_change_propagation_specifications(
        mut self,
        specifications: impl IntoIterator<Item = ChangePropagationSpecification>,
    ) -> Self {
        self.specifications.extend(specifications);
        self
    }

    pub fn with_propagation_mode(mut self, mode: ChangePropagationMode) -> Self {
        self.settings = self.settings.with_mode(mode);
        self
    }

    pub fn with_max_propagation_passes(mut self, max_passes: usize) -> Self {
        self.settings = self.settings.with_max_passes(max_passes);
        self
    }

    pub fn with_initial_build(mut self, initial_build: InitialBuild) -> Self {
        self.initial_build = initial_build;
        self
    }

    /// Build the virtual model and bring it to its initial state
    ///
    /// With a storage folder, every later commit is written through to it;
    /// with [`InitialBuild::Reload`] the stored roots and correspondences are
    /// restored first, without running reactions.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if no user interaction was given, the
    /// settings are invalid, or a reload is requested without a storage
    /// folder. Registration errors (`DuplicateReaction`,
    /// `AmbiguousReaction`) and storage errors are passed through.
    pub fn build_and_initialize(self) -> Result<VirtualModel> {
        log_op_start!(
            "build_and_initialize",
            specifications = self.specifications.len(),
            has_storage = self.storage_folder.is_some()
        );
        let start = Instant::now();

        let vsum = self.build_impl().map_err(|e| {
            log_op_error!(
                "build_and_initialize",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "build_and_initialize",
            duration_ms = start.elapsed().as_millis() as u64,
            roots = vsum.roots().len()
        );
        Ok(vsum)
    }

    fn build_impl(self) -> Result<VirtualModel> {
        let interaction = self.interaction.ok_or_else(|| VsumError::Configuration {
            reason: "a user interaction must be supplied".to_string(),
        })?;
        if self.initial_build == InitialBuild::Reload && self.storage_folder.is_none() {
            return Err(VsumError::Configuration {
                reason: "reloading requires a storage folder".to_string(),
            });
        }

        let mut registry = ReactionRegistry::new();
        for specification in self.specifications {
            registry.register(specification)?;
        }

        let vsum = VirtualModel::new(registry, interaction, self.settings)?;

        if let Some(folder) = self.storage_folder {
            let store = FsModelStore::open(&folder)?;
            if self.initial_build == InitialBuild::Reload {
                let persisted = store.load()?;
                tracing::debug!(
                    folder = %folder.display(),
                    roots = persisted.documents.len(),
                    "reloading stored roots"
                );
                vsum.restore(persisted)?;
            }
            vsum.set_persistence(Arc::new(store));
        }

        Ok(vsum)
    }
}
