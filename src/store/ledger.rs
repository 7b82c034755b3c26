// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! In-process record ledger shared by the store backends
//!
//! Holds every record in insertion order and implements the query and
//! transition rules once; backends only decide where the ledger lives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    ArtifactRecord, ArtifactRole, ModuleRun, ModuleRunCompletion, NewArtifact, NewModuleRun,
    NewPipelineRun, PipelineRun, RunStatus, StoreStats,
};
use crate::errors::{ConvoflowError, ConvoflowResult};

/// All persisted records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    next_id: u64,
    pub pipeline_runs: Vec<PipelineRun>,
    pub module_runs: Vec<ModuleRun>,
    pub artifacts: Vec<ArtifactRecord>,
}

impl Ledger {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn create_pipeline_run(&mut self, new: NewPipelineRun) -> PipelineRun {
        let now = Utc::now();
        let run = PipelineRun {
            id: self.allocate_id(),
            input_id: new.input_id,
            pipeline_version: new.pipeline_version,
            pipeline_config_hash: new.pipeline_config_hash,
            pipeline_input_hash: new.pipeline_input_hash,
            status: RunStatus::InProgress,
            created_at: now,
            updated_at: now,
        };
        self.pipeline_runs.push(run.clone());
        run
    }

    pub fn find_latest_completed_pipeline_run(
        &self,
        input_id: &str,
        pipeline_input_hash: &str,
    ) -> Option<PipelineRun> {
        self.pipeline_runs
            .iter()
            .filter(|r| {
                r.input_id == input_id
                    && r.pipeline_input_hash == pipeline_input_hash
                    && r.status == RunStatus::Completed
            })
            .max_by_key(|r| (r.created_at, r.id))
            .cloned()
    }

    pub fn update_pipeline_status(&mut self, id: u64, status: RunStatus) -> ConvoflowResult<()> {
        let run = self
            .pipeline_runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ConvoflowError::RecordNotFound {
                record: "PipelineRun",
                id,
            })?;

        if run.status.is_terminal() || !status.is_terminal() {
            return Err(ConvoflowError::InvalidTransition {
                record: "PipelineRun",
                id,
                from: run.status.to_string(),
                to: status.to_string(),
            });
        }

        run.status = status;
        run.updated_at = Utc::now();
        Ok(())
    }

    pub fn create_module_run(&mut self, new: NewModuleRun) -> ConvoflowResult<ModuleRun> {
        if !self.pipeline_runs.iter().any(|r| r.id == new.pipeline_run_id) {
            return Err(ConvoflowError::RecordNotFound {
                record: "PipelineRun",
                id: new.pipeline_run_id,
            });
        }

        let now = Utc::now();
        let run = ModuleRun {
            id: self.allocate_id(),
            pipeline_run_id: new.pipeline_run_id,
            input_id: new.input_id,
            module_name: new.module_name,
            module_version: new.module_version,
            module_config_hash: new.module_config_hash,
            module_input_hash: new.module_input_hash,
            output_hash: None,
            status: RunStatus::InProgress,
            duration_seconds: None,
            is_cacheable: new.is_cacheable,
            cache_reason: new.cache_reason,
            outputs: None,
            metrics: Default::default(),
            replaces_module_run_id: new.replaces_module_run_id,
            superseded_at: None,
            created_at: now,
            updated_at: now,
        };
        self.module_runs.push(run.clone());
        Ok(run)
    }

    pub fn find_cacheable_module_run(
        &self,
        input_id: &str,
        module_name: &str,
        module_version: &str,
        module_input_hash: &str,
    ) -> Option<ModuleRun> {
        self.module_runs
            .iter()
            .filter(|r| {
                r.input_id == input_id
                    && r.module_name == module_name
                    && r.module_version == module_version
                    && r.module_input_hash == module_input_hash
                    && r.status == RunStatus::Completed
                    && r.is_cacheable
                    && r.superseded_at.is_none()
            })
            .max_by_key(|r| (r.created_at, r.id))
            .cloned()
    }

    pub fn complete_module_run(
        &mut self,
        id: u64,
        completion: ModuleRunCompletion,
    ) -> ConvoflowResult<ModuleRun> {
        let run = self
            .module_runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ConvoflowError::RecordNotFound {
                record: "ModuleRun",
                id,
            })?;

        if run.status.is_terminal() || !completion.status.is_terminal() {
            return Err(ConvoflowError::InvalidTransition {
                record: "ModuleRun",
                id,
                from: run.status.to_string(),
                to: completion.status.to_string(),
            });
        }

        run.status = completion.status;
        if completion.duration_seconds.is_some() {
            run.duration_seconds = completion.duration_seconds;
        }
        if completion.output_hash.is_some() {
            run.output_hash = completion.output_hash;
        }
        if let Some(cacheable) = completion.is_cacheable {
            run.is_cacheable = cacheable;
        }
        if completion.status == RunStatus::Failed {
            run.is_cacheable = false;
        }
        if completion.outputs.is_some() {
            run.outputs = completion.outputs;
        }
        if !completion.metrics.is_empty() {
            run.metrics = completion.metrics;
        }
        run.updated_at = Utc::now();
        Ok(run.clone())
    }

    pub fn mark_superseded(&mut self, id: u64, at: DateTime<Utc>) -> ConvoflowResult<()> {
        let run = self
            .module_runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ConvoflowError::RecordNotFound {
                record: "ModuleRun",
                id,
            })?;

        run.is_cacheable = false;
        run.superseded_at = Some(at);
        run.updated_at = at;
        Ok(())
    }

    pub fn supersede_module(&mut self, module_name: &str, input_id: Option<&str>) -> usize {
        let now = Utc::now();
        let mut count = 0;

        for run in self.module_runs.iter_mut().filter(|r| {
            r.module_name == module_name
                && r.is_cacheable
                && r.superseded_at.is_none()
                && input_id.map_or(true, |id| r.input_id == id)
        }) {
            run.is_cacheable = false;
            run.superseded_at = Some(now);
            run.updated_at = now;
            count += 1;
        }

        count
    }

    pub fn module_runs_for_pipeline(&self, pipeline_run_id: u64) -> Vec<ModuleRun> {
        self.module_runs
            .iter()
            .filter(|r| r.pipeline_run_id == pipeline_run_id)
            .cloned()
            .collect()
    }

    pub fn create_artifact(&mut self, new: NewArtifact) -> ConvoflowResult<ArtifactRecord> {
        if !self.module_runs.iter().any(|r| r.id == new.module_run_id) {
            return Err(ConvoflowError::RecordNotFound {
                record: "ModuleRun",
                id: new.module_run_id,
            });
        }

        if self
            .artifacts
            .iter()
            .any(|a| a.module_run_id == new.module_run_id && a.key == new.key)
        {
            return Err(ConvoflowError::store(format!(
                "artifact '{}' already registered for module run {}",
                new.key, new.module_run_id
            )));
        }

        let record = ArtifactRecord {
            id: self.allocate_id(),
            module_run_id: new.module_run_id,
            input_id: new.input_id,
            key: new.key,
            root: new.root,
            artifact_type: new.artifact_type,
            role: new.role,
            content_hash: new.content_hash,
            created_at: Utc::now(),
        };
        self.artifacts.push(record.clone());
        Ok(record)
    }

    pub fn primary_artifacts(&self, module_run_id: u64) -> Vec<ArtifactRecord> {
        self.artifacts
            .iter()
            .filter(|a| a.module_run_id == module_run_id && a.role == ArtifactRole::Primary)
            .cloned()
            .collect()
    }

    pub fn artifacts_for_input(&self, input_id: &str) -> Vec<ArtifactRecord> {
        self.artifacts
            .iter()
            .filter(|a| a.input_id == input_id)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            pipeline_runs: self.pipeline_runs.len(),
            completed_pipeline_runs: self
                .pipeline_runs
                .iter()
                .filter(|r| r.status == RunStatus::Completed)
                .count(),
            module_runs: self.module_runs.len(),
            cacheable_module_runs: self.module_runs.iter().filter(|r| r.is_cacheable).count(),
            superseded_module_runs: self
                .module_runs
                .iter()
                .filter(|r| r.superseded_at.is_some())
                .count(),
            artifacts: self.artifacts.len(),
        }
    }
}
