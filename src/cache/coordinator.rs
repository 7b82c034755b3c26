// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Pipeline run coordination
//!
//! Opens a fresh pipeline run or, when asked to, hands back the latest
//! completed run for an identical (input, pipeline input hash).

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::hash::hash_payload;
use crate::errors::ConvoflowResult;
use crate::store::{ModuleRun, NewPipelineRun, PipelineRun, RunStatus, RunStore};

/// What to do when an identical run already completed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RerunMode {
    /// Always execute
    #[default]
    NewRun,
    /// Trust the earlier run and execute nothing
    ReuseExistingRun,
}

/// How a pipeline run began
#[derive(Debug, Clone)]
pub enum RunStart {
    Fresh(PipelineRun),
    Reused(PipelineRun),
}

impl RunStart {
    pub fn run(&self) -> &PipelineRun {
        match self {
            Self::Fresh(run) | Self::Reused(run) => run,
        }
    }
}

/// Owns pipeline run records for one executor
pub struct PipelineRunCoordinator {
    store: Arc<dyn RunStore>,
    pipeline_version: String,
}

impl PipelineRunCoordinator {
    pub fn new(store: Arc<dyn RunStore>, pipeline_version: impl Into<String>) -> Self {
        Self {
            store,
            pipeline_version: pipeline_version.into(),
        }
    }

    /// Run-level cache key
    pub fn pipeline_input_hash(content_hash: &str, config_hash: &str) -> ConvoflowResult<String> {
        hash_payload(&json!({
            "transcript_content_hash": content_hash,
            "pipeline_config_hash": config_hash,
        }))
    }

    pub async fn start(
        &self,
        input_id: &str,
        content_hash: &str,
        config_hash: &str,
        mode: RerunMode,
    ) -> ConvoflowResult<RunStart> {
        let input_hash = Self::pipeline_input_hash(content_hash, config_hash)?;

        if mode == RerunMode::ReuseExistingRun {
            if let Some(run) = self
                .store
                .find_latest_completed_pipeline_run(input_id, &input_hash)
                .await?
            {
                tracing::info!(run_id = run.id, input = %input_id, "reusing completed pipeline run");
                return Ok(RunStart::Reused(run));
            }
            tracing::debug!(input = %input_id, "no completed run to reuse");
        }

        let run = self
            .store
            .create_pipeline_run(NewPipelineRun {
                input_id: input_id.to_string(),
                pipeline_version: self.pipeline_version.clone(),
                pipeline_config_hash: config_hash.to_string(),
                pipeline_input_hash: input_hash,
            })
            .await?;

        tracing::info!(run_id = run.id, input = %input_id, "started pipeline run");
        Ok(RunStart::Fresh(run))
    }

    /// Set the terminal status; a second call is an invalid transition
    pub async fn finish(&self, run: &PipelineRun, success: bool) -> ConvoflowResult<()> {
        let status = if success {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        self.store.update_pipeline_status(run.id, status).await?;
        tracing::info!(run_id = run.id, status = %status, "finished pipeline run");
        Ok(())
    }

    /// Module runs recorded under a pipeline run
    pub async fn module_runs(&self, run: &PipelineRun) -> ConvoflowResult<Vec<ModuleRun>> {
        self.store.module_runs_for_pipeline(run.id).await
    }
}
