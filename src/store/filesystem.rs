// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Filesystem-backed run store
//!
//! Keeps the whole ledger as a single JSON document in the store directory
//! and rewrites it atomically after each mutation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use super::{
    ArtifactRecord, Ledger, ModuleRun, ModuleRunCompletion, NewArtifact, NewModuleRun,
    NewPipelineRun, PipelineRun, RunStatus, RunStore, StoreStats,
};
use crate::errors::ConvoflowError;

const LEDGER_FILE: &str = "ledger.json";

/// Durable store rooted at a directory
pub struct FilesystemStore {
    dir: PathBuf,
    ledger: Mutex<Ledger>,
}

impl FilesystemStore {
    /// Open (or create) a store in `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ConvoflowError> {
        let dir = dir.into();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                ConvoflowError::store(format!("Failed to create store directory: {}", e))
            })?;
        }

        let path = dir.join(LEDGER_FILE);
        let ledger = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConvoflowError::FileReadError {
                path: path.clone(),
                error: e.to_string(),
            })?;
            serde_json::from_str(&content).map_err(|e| {
                ConvoflowError::store(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            Ledger::default()
        };

        tracing::debug!(store = %dir.display(), "opened run store");

        Ok(Self {
            dir,
            ledger: Mutex::new(ledger),
        })
    }

    /// Store in the default location under a project directory
    pub fn default_store(base_dir: &Path) -> Result<Self, ConvoflowError> {
        Self::open(base_dir.join(".convoflow").join("store"))
    }

    async fn persist(&self, ledger: &Ledger) -> Result<(), ConvoflowError> {
        let json = serde_json::to_vec_pretty(ledger)
            .map_err(|e| ConvoflowError::store(format!("Failed to serialize ledger: {}", e)))?;
        atomic_write(&self.dir.join(LEDGER_FILE), &json).await
    }

    /// Apply a mutation to a copy of the ledger, adopting it once it is on disk
    async fn commit<T, F>(&self, apply: F) -> Result<T, ConvoflowError>
    where
        F: FnOnce(&mut Ledger) -> Result<T, ConvoflowError> + Send,
        T: Send,
    {
        let mut ledger = self.ledger.lock().await;
        let mut staged = ledger.clone();
        let value = apply(&mut staged)?;
        self.persist(&staged).await?;
        *ledger = staged;
        Ok(value)
    }
}

/// Write through a sibling temp file and rename over the target
async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), ConvoflowError> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(LEDGER_FILE);
    let tmp = path.with_file_name(format!(".{}.tmp-{}-{}", file_name, std::process::id(), nanos));

    let write_err = |e: std::io::Error| ConvoflowError::FileWriteError {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    tokio::fs::write(&tmp, bytes).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_err(e));
    }
    Ok(())
}

#[async_trait]
impl RunStore for FilesystemStore {
    async fn create_pipeline_run(&self, new: NewPipelineRun) -> Result<PipelineRun, ConvoflowError> {
        self.commit(move |ledger| Ok(ledger.create_pipeline_run(new))).await
    }

    async fn find_latest_completed_pipeline_run(
        &self,
        input_id: &str,
        pipeline_input_hash: &str,
    ) -> Result<Option<PipelineRun>, ConvoflowError> {
        Ok(self
            .ledger
            .lock()
            .await
            .find_latest_completed_pipeline_run(input_id, pipeline_input_hash))
    }

    async fn update_pipeline_status(&self, id: u64, status: RunStatus) -> Result<(), ConvoflowError> {
        self.commit(move |ledger| ledger.update_pipeline_status(id, status)).await
    }

    async fn create_module_run(&self, new: NewModuleRun) -> Result<ModuleRun, ConvoflowError> {
        self.commit(move |ledger| ledger.create_module_run(new)).await
    }

    async fn find_cacheable_module_run(
        &self,
        input_id: &str,
        module_name: &str,
        module_version: &str,
        module_input_hash: &str,
    ) -> Result<Option<ModuleRun>, ConvoflowError> {
        Ok(self.ledger.lock().await.find_cacheable_module_run(
            input_id,
            module_name,
            module_version,
            module_input_hash,
        ))
    }

    async fn complete_module_run(
        &self,
        id: u64,
        completion: ModuleRunCompletion,
    ) -> Result<ModuleRun, ConvoflowError> {
        self.commit(move |ledger| ledger.complete_module_run(id, completion)).await
    }

    async fn mark_superseded(&self, id: u64, at: DateTime<Utc>) -> Result<(), ConvoflowError> {
        self.commit(move |ledger| ledger.mark_superseded(id, at)).await
    }

    async fn supersede_module(
        &self,
        module_name: &str,
        input_id: Option<&str>,
    ) -> Result<usize, ConvoflowError> {
        let mut ledger = self.ledger.lock().await;
        let mut staged = ledger.clone();
        let count = staged.supersede_module(module_name, input_id);
        if count > 0 {
            self.persist(&staged).await?;
            *ledger = staged;
        }
        Ok(count)
    }

    async fn module_runs_for_pipeline(&self, pipeline_run_id: u64) -> Result<Vec<ModuleRun>, ConvoflowError> {
        Ok(self.ledger.lock().await.module_runs_for_pipeline(pipeline_run_id))
    }

    async fn create_artifact(&self, new: NewArtifact) -> Result<ArtifactRecord, ConvoflowError> {
        self.commit(move |ledger| ledger.create_artifact(new)).await
    }

    async fn primary_artifacts(&self, module_run_id: u64) -> Result<Vec<ArtifactRecord>, ConvoflowError> {
        Ok(self.ledger.lock().await.primary_artifacts(module_run_id))
    }

    async fn artifacts_for_input(&self, input_id: &str) -> Result<Vec<ArtifactRecord>, ConvoflowError> {
        Ok(self.ledger.lock().await.artifacts_for_input(input_id))
    }

    async fn stats(&self) -> Result<StoreStats, ConvoflowError> {
        Ok(self.ledger.lock().await.stats())
    }
}
