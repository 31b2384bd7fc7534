//! Virtual model façade
//!
//! Composition root wiring the repository, the reaction registry, the
//! propagation engine and the view factory. All state sits behind one
//! mutex; a commit holds it for the whole propagation, so commits from
//! several views or threads are serialized. Views only ever see committed
//! state copied out under the lock.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

use vsum_core_types::RequestContext;

use crate::change::{seeding_batch, ChangeOp, EChange};
use crate::correspondence::CorrespondenceModel;
use crate::errors::{Result, VsumError};
use crate::interaction::UserInteraction;
use crate::model::{Element, HierarchicalId, IdAllocator, ModelSnapshot};
use crate::persistence::{ModelPersistence, PersistedChanges, PersistedState, RootDocument};
use crate::propagation::{
    ChangePropagationMode, PropagationEngine, PropagationReport, PropagationSettings,
};
use crate::reactions::ReactionRegistry;
use crate::repository::ModelRepository;
use crate::view::{SelectableRoot, Selector, ViewType};
use crate::{log_op_end, log_op_error, log_op_start};

/// Observer of successful commits
pub trait PropagationListener: Send + Sync {
    fn changes_propagated(&self, report: &PropagationReport);
}

impl<F> PropagationListener for F
where
    F: Fn(&PropagationReport) + Send + Sync,
{
    fn changes_propagated(&self, report: &PropagationReport) {
        self(report)
    }
}

struct VsumState {
    repository: ModelRepository,
    registry: ReactionRegistry,
    engine: PropagationEngine,
    interaction: Arc<dyn UserInteraction>,
    persistence: Option<Arc<dyn ModelPersistence>>,
    listeners: Vec<Arc<dyn PropagationListener>>,
}

/// Handle to one virtual single underlying model
///
/// Cheap to clone; every clone refers to the same state.
#[derive(Clone)]
pub struct VirtualModel {
    state: Arc<Mutex<VsumState>>,
    ids: IdAllocator,
}

impl std::fmt::Debug for VirtualModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("VirtualModel")
            .field("revision", &state.repository.revision())
            .field("reactions", &state.registry.len())
            .field("settings", &state.engine.settings())
            .finish_non_exhaustive()
    }
}

impl VirtualModel {
    /// Create an empty virtual model
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the propagation settings are invalid.
    pub fn new(
        registry: ReactionRegistry,
        interaction: Arc<dyn UserInteraction>,
        settings: PropagationSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let ids = IdAllocator::new();
        Ok(Self {
            state: Arc::new(Mutex::new(VsumState {
                repository: ModelRepository::new(ids.clone()),
                registry,
                engine: PropagationEngine::new(settings),
                interaction,
                persistence: None,
                listeners: Vec::new(),
            })),
            ids,
        })
    }

    /// Attach a durable backing store; every later commit is written through it
    pub fn set_persistence(&self, persistence: Arc<dyn ModelPersistence>) {
        self.state.lock().persistence = Some(persistence);
    }

    // ===== Settings =====

    pub fn change_propagation_mode(&self) -> ChangePropagationMode {
        self.state.lock().engine.settings().mode
    }

    pub fn set_change_propagation_mode(&self, mode: ChangePropagationMode) {
        self.state.lock().engine.set_mode(mode);
    }

    pub fn max_propagation_passes(&self) -> usize {
        self.state.lock().engine.settings().max_passes
    }

    /// # Errors
    ///
    /// Returns `Configuration` if `max_passes` is zero.
    pub fn set_max_propagation_passes(&self, max_passes: usize) -> Result<()> {
        self.state.lock().engine.set_max_passes(max_passes)
    }

    pub fn add_propagation_listener(&self, listener: Arc<dyn PropagationListener>) {
        self.state.lock().listeners.push(listener);
    }

    // ===== Views =====

    /// Start selecting roots for a view of the given type
    pub fn create_selector(&self, view_type: Arc<dyn ViewType>) -> Selector {
        Selector::new(self.clone(), view_type, self.selectable_roots())
    }

    // ===== Reads =====

    /// Incremented once per successful commit
    pub fn revision(&self) -> u64 {
        self.state.lock().repository.revision()
    }

    /// Copy of the element with this id, if it is live
    pub fn resolve(&self, id: &HierarchicalId) -> Option<Element> {
        self.state.lock().repository.resolve(id).cloned()
    }

    /// Copy of the root registered at `location_key`
    pub fn root_at(&self, location_key: &str) -> Option<Element> {
        self.state.lock().repository.root_at(location_key).cloned()
    }

    /// Registered `(location_key, root_id)` pairs
    pub fn roots(&self) -> Vec<(String, HierarchicalId)> {
        self.state.lock().repository.roots()
    }

    /// Copies of every registered root of `type_name`
    pub fn roots_of_type(&self, type_name: &str) -> Vec<Element> {
        self.state
            .lock()
            .repository
            .roots_of_type(|e| e.type_name == type_name)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Copy of the correspondence model
    pub fn correspondences(&self) -> CorrespondenceModel {
        self.state.lock().repository.correspondences().clone()
    }

    /// Elements linked to `id`, optionally restricted to one tag
    pub fn corresponding(&self, id: &HierarchicalId, tag: Option<&str>) -> Vec<HierarchicalId> {
        self.state
            .lock()
            .repository
            .correspondences()
            .corresponding(id, tag)
    }

    /// Persistable form of the root at `location_key`
    pub fn document(&self, location_key: &str) -> Option<RootDocument> {
        self.state.lock().repository.document(location_key)
    }

    // ===== Writes =====

    /// Create and register a new empty root, propagating its insertion
    ///
    /// # Errors
    ///
    /// Returns `DuplicateLocation` if the key is occupied, or any
    /// propagation error.
    pub fn register_root(&self, type_name: &str, location_key: &str) -> Result<HierarchicalId> {
        let id = self.ids.new_root_id();
        let batch = vec![
            EChange::new(id.clone(), type_name, ChangeOp::ElementCreated),
            EChange::new(
                id.clone(),
                type_name,
                ChangeOp::RootInserted {
                    location_key: location_key.to_string(),
                },
            ),
        ];
        self.commit("register_root", batch, None, RequestContext::new())?;
        Ok(id)
    }

    /// Delete the root at `location_key` with its whole tree, propagating the deletion
    ///
    /// # Errors
    ///
    /// Returns `LocationNotFound` if nothing is registered there, or any
    /// propagation error.
    pub fn remove_root(&self, location_key: &str) -> Result<PropagationReport> {
        let (before, after) = {
            let state = self.state.lock();
            let root = state.repository.model().root_at(location_key).cloned().ok_or_else(|| {
                VsumError::LocationNotFound {
                    location_key: location_key.to_string(),
                }
            })?;
            // The whole model, so references from other roots are released too
            let before = state.repository.model().clone();
            let mut after = before.clone();
            after.delete_element(&root)?;
            (before, after)
        };
        self.commit(
            "remove_root",
            crate::change::diff(&before, &after),
            None,
            RequestContext::new(),
        )
    }

    /// Seed the repository with a pre-existing model as a batch of pure
    /// insertions, propagated like any other commit
    ///
    /// # Errors
    ///
    /// Returns `DuplicateLocation` or `IdentityConflict` if the model clashes
    /// with what is registered, or any propagation error.
    pub fn attach_model(&self, document: RootDocument) -> Result<PropagationReport> {
        if self.state.lock().repository.root_at(&document.location_key).is_some() {
            return Err(VsumError::DuplicateLocation {
                location_key: document.location_key,
            });
        }
        let mut loaded = ModelSnapshot::new();
        loaded.insert_elements(document.elements)?;
        loaded.insert_root(&document.location_key, &document.root)?;
        self.ids.reserve_through(loaded.max_serial());
        self.commit("attach_model", seeding_batch(&loaded), None, RequestContext::new())
    }

    /// Reload persisted roots and correspondences without running any reaction
    ///
    /// # Errors
    ///
    /// Returns `DuplicateLocation` or `IdentityConflict` if the persisted
    /// state clashes with what is registered, or `InvalidChange` if it is
    /// structurally inconsistent.
    pub fn restore(&self, persisted: PersistedState) -> Result<PropagationReport> {
        let ctx = RequestContext::new();
        log_op_start!(
            "restore",
            request_id = ctx.request_id.as_str(),
            batch_len = persisted.documents.len()
        );
        let start = std::time::Instant::now();

        let result = self.restore_impl(persisted, &ctx).map_err(|e| {
            log_op_error!(
                "restore",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                request_id = ctx.request_id.as_str()
            );
            e
        })?;

        log_op_end!(
            "restore",
            duration_ms = start.elapsed().as_millis() as u64,
            request_id = ctx.request_id.as_str()
        );
        Ok(result)
    }

    fn restore_impl(
        &self,
        persisted: PersistedState,
        ctx: &RequestContext,
    ) -> Result<PropagationReport> {
        let mut loaded = ModelSnapshot::new();
        for document in persisted.documents {
            loaded.insert_elements(document.elements)?;
            loaded.insert_root(&document.location_key, &document.root)?;
        }
        self.ids.reserve_through(loaded.max_serial());

        let mut state = self.state.lock();
        let state = &mut *state;
        let (mut working, report) =
            state
                .engine
                .apply_without_propagation(&state.repository, seeding_batch(&loaded), ctx)?;
        let kept = working.restore_correspondences(&persisted.correspondences);
        tracing::debug!(
            request_id = ctx.request_id.as_str(),
            correspondences = kept,
            "restored correspondences"
        );
        state.repository = working;
        Ok(report)
    }

    // ===== Crate-internal plumbing for views =====

    /// Every registered root, ordered by location key
    pub(crate) fn selectable_roots(&self) -> Vec<SelectableRoot> {
        let state = self.state.lock();
        state
            .repository
            .model()
            .roots()
            .filter_map(|(location_key, id)| {
                state.repository.resolve(id).map(|root| SelectableRoot {
                    id: id.clone(),
                    type_name: root.type_name.clone(),
                    location_key: location_key.to_string(),
                })
            })
            .collect()
    }

    pub(crate) fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    /// Committed state of the given roots, plus the revision it was read at
    pub(crate) fn read(&self, roots: &[HierarchicalId]) -> (ModelSnapshot, u64) {
        let state = self.state.lock();
        (
            state.repository.snapshot(roots.iter()),
            state.repository.revision(),
        )
    }

    /// Roots of `roots` that are no longer registered
    pub(crate) fn missing_roots(&self, roots: &[HierarchicalId]) -> Vec<HierarchicalId> {
        let state = self.state.lock();
        missing(&state.repository, roots)
    }

    /// Propagate a batch derived from a view whose selection is `selection`
    pub(crate) fn commit_view(
        &self,
        batch: Vec<EChange>,
        selection: &[HierarchicalId],
        ctx: RequestContext,
    ) -> Result<PropagationReport> {
        self.commit("commit_changes", batch, Some(selection), ctx)
    }

    fn commit(
        &self,
        op: &'static str,
        batch: Vec<EChange>,
        selection: Option<&[HierarchicalId]>,
        ctx: RequestContext,
    ) -> Result<PropagationReport> {
        log_op_start!(op, request_id = ctx.request_id.as_str(), batch_len = batch.len());
        let start = std::time::Instant::now();

        let result = self.commit_impl(batch, selection, &ctx).map_err(|e| {
            log_op_error!(
                op,
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                request_id = ctx.request_id.as_str()
            );
            e
        });
        let (report, listeners) = result?;

        log_op_end!(
            op,
            duration_ms = start.elapsed().as_millis() as u64,
            request_id = ctx.request_id.as_str(),
            produced_len = report.produced
        );
        // Outside the lock, so listeners may read the virtual model
        for listener in listeners {
            listener.changes_propagated(&report);
        }
        Ok(report)
    }

    fn commit_impl(
        &self,
        batch: Vec<EChange>,
        selection: Option<&[HierarchicalId]>,
        ctx: &RequestContext,
    ) -> Result<(PropagationReport, Vec<Arc<dyn PropagationListener>>)> {
        let mut state = self.state.lock();
        let state = &mut *state;

        if let Some(selection) = selection {
            if let Some(root) = missing(&state.repository, selection).into_iter().next() {
                return Err(VsumError::StaleView {
                    root: root.to_string(),
                });
            }
        }

        let (working, report) = state.engine.propagate(
            &state.repository,
            batch,
            &state.registry,
            state.interaction.as_ref(),
            ctx,
        )?;

        if let Some(persistence) = &state.persistence {
            persist(persistence.as_ref(), &state.repository, &working, ctx)?;
        }
        state.repository = working;
        Ok((report, state.listeners.clone()))
    }
}

fn missing(repository: &ModelRepository, roots: &[HierarchicalId]) -> Vec<HierarchicalId> {
    roots
        .iter()
        .filter(|r| repository.location_of(r).is_none())
        .cloned()
        .collect()
}

/// Hand every root document and the correspondence model that differ
/// between `before` and `after` to the store in one call
fn persist(
    persistence: &dyn ModelPersistence,
    before: &ModelRepository,
    after: &ModelRepository,
    ctx: &RequestContext,
) -> Result<()> {
    let locations: BTreeSet<String> = before
        .roots()
        .into_iter()
        .chain(after.roots())
        .map(|(location, _)| location)
        .collect();

    let mut changes = PersistedChanges::default();
    for location in locations {
        match (before.document(&location), after.document(&location)) {
            (old, Some(new)) if old.as_ref() != Some(&new) => changes.stored.push(new),
            (Some(_), None) => changes.deleted.push(location),
            _ => {}
        }
    }
    if before.correspondences() != after.correspondences() {
        changes.correspondences = Some(after.correspondences().clone());
    }
    if changes.is_empty() {
        return Ok(());
    }

    tracing::debug!(
        request_id = ctx.request_id.as_str(),
        stored = changes.stored.len(),
        deleted = changes.deleted.len(),
        correspondences = changes.correspondences.is_some(),
        "persisting commit"
    );
    persistence.write_changes(&changes)
}
