//! Filesystem-backed model store
//!
//! Layout of a storage folder:
//!
//! ```text
//! <storage>/models/<shard>/<sha256(location_key)>.json
//! <storage>/correspondences.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use vsum_core::{
    CorrespondenceModel, ModelPersistence, PersistedChanges, PersistedState, RootDocument,
};

use crate::artifacts::atomic::{atomic_write, remove_if_exists, stage_write, StagedWrite};
use crate::artifacts::envelope::{CorrespondenceArtifact, RootArtifact, SCHEMA_VERSION};
use crate::artifacts::sharding::{location_digest, shard_path};
use crate::errors::{corrupt_artifact, io_error, serialization_error, unsupported_version, Result};

const MODELS_DIR: &str = "models";
const CORRESPONDENCES_FILE: &str = "correspondences.json";
const ARTIFACT_EXTENSION: &str = "json";

/// One JSON artifact per location key, plus one for the correspondence model
#[derive(Debug, Clone)]
pub struct FsModelStore {
    root: PathBuf,
}

impl FsModelStore {
    /// Open (creating if needed) a storage folder
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(MODELS_DIR)).map_err(|e| io_error("open_storage", e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the artifact for `location_key` lives
    pub fn artifact_path(&self, location_key: &str) -> PathBuf {
        shard_path(
            &self.root.join(MODELS_DIR),
            &location_digest(location_key),
            ARTIFACT_EXTENSION,
        )
    }

    pub fn correspondences_path(&self) -> PathBuf {
        self.root.join(CORRESPONDENCES_FILE)
    }

    /// Write the artifact for `document.location_key`, replacing any previous one
    pub fn write_root(&self, document: &RootDocument) -> Result<PathBuf> {
        let path = self.artifact_path(&document.location_key);
        let json = serde_json::to_vec_pretty(&RootArtifact::new(document.clone()))
            .map_err(|e| serialization_error("write_root", e))?;
        atomic_write(&path, &json)?;

        tracing::debug!(
            location_key = document.location_key.as_str(),
            elements = document.elements.len(),
            size_bytes = json.len(),
            "Stored root artifact"
        );
        Ok(path)
    }

    /// Remove the artifact for `location_key`; returns whether one existed
    pub fn remove_root(&self, location_key: &str) -> Result<bool> {
        let removed = remove_if_exists(&self.artifact_path(location_key))?;
        tracing::debug!(location_key, removed, "Removed root artifact");
        Ok(removed)
    }

    /// Read back the artifact for `location_key`, if present
    pub fn read_root(&self, location_key: &str) -> Result<Option<RootDocument>> {
        let path = self.artifact_path(location_key);
        if !path.exists() {
            return Ok(None);
        }
        let document = read_root_artifact(&path)?;
        if document.location_key != location_key {
            return Err(corrupt_artifact(
                &path,
                &format!("holds location key {}", document.location_key),
            ));
        }
        Ok(Some(document))
    }

    pub fn write_correspondences(&self, correspondences: &CorrespondenceModel) -> Result<()> {
        let json = serde_json::to_vec_pretty(&CorrespondenceArtifact::new(correspondences.clone()))
            .map_err(|e| serialization_error("write_correspondences", e))?;
        atomic_write(&self.correspondences_path(), &json)?;
        tracing::debug!(
            correspondences = correspondences.len(),
            "Stored correspondence artifact"
        );
        Ok(())
    }

    /// Read the correspondence model; an absent artifact reads as empty
    pub fn read_correspondences(&self) -> Result<CorrespondenceModel> {
        let path = self.correspondences_path();
        if !path.exists() {
            return Ok(CorrespondenceModel::new());
        }
        let bytes = fs::read(&path).map_err(|e| io_error("read_correspondences", e))?;
        let artifact: CorrespondenceArtifact = serde_json::from_slice(&bytes)
            .map_err(|e| serialization_error("read_correspondences", e))?;
        check_version(&path, artifact.schema_version)?;
        Ok(artifact.correspondences)
    }

    /// Apply the changes of one commit
    ///
    /// Every new artifact is staged before any is published, so a failed
    /// serialization or write leaves the folder exactly as it was.
    pub fn write_changes(&self, changes: &PersistedChanges) -> Result<()> {
        let mut staged = Vec::new();
        if let Err(e) = self.stage_changes(changes, &mut staged) {
            tracing::debug!(staged = staged.len(), "Discarding staged artifacts");
            for write in staged {
                write.discard();
            }
            return Err(e);
        }

        for write in staged {
            write.publish()?;
        }
        for location_key in &changes.deleted {
            self.remove_root(location_key)?;
        }
        tracing::debug!(
            stored = changes.stored.len(),
            deleted = changes.deleted.len(),
            "Applied commit to storage folder"
        );
        Ok(())
    }

    fn stage_changes(&self, changes: &PersistedChanges, staged: &mut Vec<StagedWrite>) -> Result<()> {
        for document in &changes.stored {
            let json = serde_json::to_vec_pretty(&RootArtifact::new(document.clone()))
                .map_err(|e| serialization_error("write_root", e))?;
            staged.push(stage_write(&self.artifact_path(&document.location_key), &json)?);
        }
        if let Some(correspondences) = &changes.correspondences {
            let json =
                serde_json::to_vec_pretty(&CorrespondenceArtifact::new(correspondences.clone()))
                    .map_err(|e| serialization_error("write_correspondences", e))?;
            staged.push(stage_write(&self.correspondences_path(), &json)?);
        }
        Ok(())
    }

    /// Every stored root, ordered by location key, and the correspondence model
    pub fn read_all(&self) -> Result<PersistedState> {
        let mut documents = Vec::new();
        for path in self.artifact_files()? {
            let document = read_root_artifact(&path)?;
            if self.artifact_path(&document.location_key) != path {
                return Err(corrupt_artifact(&path, "file name does not match its location key"));
            }
            documents.push(document);
        }
        documents.sort_by(|a, b| a.location_key.cmp(&b.location_key));

        let correspondences = self.read_correspondences()?;
        tracing::debug!(
            roots = documents.len(),
            correspondences = correspondences.len(),
            "Loaded storage folder"
        );
        Ok(PersistedState {
            documents,
            correspondences,
        })
    }

    /// Paths of every root artifact under `models/`
    fn artifact_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let models = self.root.join(MODELS_DIR);
        if !models.exists() {
            return Ok(files);
        }
        for shard in fs::read_dir(&models).map_err(|e| io_error("list_models", e))? {
            let shard = shard.map_err(|e| io_error("list_models", e))?.path();
            if !shard.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&shard).map_err(|e| io_error("list_shard", e))? {
                let path = entry.map_err(|e| io_error("list_shard", e))?.path();
                if path.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXTENSION) {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

fn read_root_artifact(path: &Path) -> Result<RootDocument> {
    let bytes = fs::read(path).map_err(|e| io_error("read_root", e))?;
    let artifact: RootArtifact =
        serde_json::from_slice(&bytes).map_err(|e| serialization_error("read_root", e))?;
    check_version(path, artifact.schema_version)?;
    if artifact.document.root_element().is_none() {
        return Err(corrupt_artifact(path, "root element missing from its document"));
    }
    Ok(artifact.document)
}

fn check_version(path: &Path, found: u32) -> Result<()> {
    if found != SCHEMA_VERSION {
        return Err(unsupported_version(path, found));
    }
    Ok(())
}

impl ModelPersistence for FsModelStore {
    fn write_changes(&self, changes: &PersistedChanges) -> vsum_core::Result<()> {
        Ok(FsModelStore::write_changes(self, changes)?)
    }

    fn load(&self) -> vsum_core::Result<PersistedState> {
        Ok(self.read_all()?)
    }
}
