// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! In-memory run store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{
    ArtifactRecord, Ledger, ModuleRun, ModuleRunCompletion, NewArtifact, NewModuleRun,
    NewPipelineRun, PipelineRun, RunStatus, RunStore, StoreStats,
};
use crate::errors::ConvoflowError;

/// Volatile store, used for one-off runs and tests
#[derive(Default)]
pub struct MemoryStore {
    ledger: Mutex<Ledger>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current records
    pub async fn snapshot(&self) -> Ledger {
        self.ledger.lock().await.clone()
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_pipeline_run(&self, new: NewPipelineRun) -> Result<PipelineRun, ConvoflowError> {
        Ok(self.ledger.lock().await.create_pipeline_run(new))
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
        self.ledger.lock().await.update_pipeline_status(id, status)
    }

    async fn create_module_run(&self, new: NewModuleRun) -> Result<ModuleRun, ConvoflowError> {
        self.ledger.lock().await.create_module_run(new)
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
        self.ledger.lock().await.complete_module_run(id, completion)
    }

    async fn mark_superseded(&self, id: u64, at: DateTime<Utc>) -> Result<(), ConvoflowError> {
        self.ledger.lock().await.mark_superseded(id, at)
    }

    async fn supersede_module(
        &self,
        module_name: &str,
        input_id: Option<&str>,
    ) -> Result<usize, ConvoflowError> {
        Ok(self.ledger.lock().await.supersede_module(module_name, input_id))
    }

    async fn module_runs_for_pipeline(&self, pipeline_run_id: u64) -> Result<Vec<ModuleRun>, ConvoflowError> {
        Ok(self.ledger.lock().await.module_runs_for_pipeline(pipeline_run_id))
    }

    async fn create_artifact(&self, new: NewArtifact) -> Result<ArtifactRecord, ConvoflowError> {
        self.ledger.lock().await.create_artifact(new)
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
