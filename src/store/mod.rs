// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Run records and their persistence
//!
//! The executor only needs a narrow slice of persistence: pipeline runs,
//! module runs and the artifacts registered by them. [`RunStore`] is that
//! contract; [`MemoryStore`] and [`FilesystemStore`] implement it.

mod filesystem;
mod ledger;
mod memory;

pub use filesystem::FilesystemStore;
pub use ledger::Ledger;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::errors::ConvoflowError;

/// Lifecycle status shared by pipeline and module runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    /// Whether the status is final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One attempt to execute a resolved module set against one input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: u64,
    pub input_id: String,
    pub pipeline_version: String,
    pub pipeline_config_hash: String,
    pub pipeline_input_hash: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to open a pipeline run
#[derive(Debug, Clone)]
pub struct NewPipelineRun {
    pub input_id: String,
    pub pipeline_version: String,
    pub pipeline_config_hash: String,
    pub pipeline_input_hash: String,
}

/// One execution attempt (or cache replay) of a single module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRun {
    pub id: u64,
    pub pipeline_run_id: u64,
    pub input_id: String,
    pub module_name: String,
    pub module_version: String,
    pub module_config_hash: String,
    pub module_input_hash: String,
    pub output_hash: Option<String>,
    pub status: RunStatus,
    pub duration_seconds: Option<f64>,
    pub is_cacheable: bool,
    pub cache_reason: Option<String>,
    /// Result payload reported by the module
    #[serde(default)]
    pub outputs: Option<Value>,
    #[serde(default)]
    pub metrics: BTreeMap<String, Value>,
    pub replaces_module_run_id: Option<u64>,
    pub superseded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to open a module run
#[derive(Debug, Clone)]
pub struct NewModuleRun {
    pub pipeline_run_id: u64,
    pub input_id: String,
    pub module_name: String,
    pub module_version: String,
    pub module_config_hash: String,
    pub module_input_hash: String,
    pub is_cacheable: bool,
    pub cache_reason: Option<String>,
    pub replaces_module_run_id: Option<u64>,
}

/// Terminal update for a module run
#[derive(Debug, Clone)]
pub struct ModuleRunCompletion {
    pub status: RunStatus,
    pub duration_seconds: Option<f64>,
    pub output_hash: Option<String>,
    pub is_cacheable: Option<bool>,
    pub outputs: Option<Value>,
    pub metrics: BTreeMap<String, Value>,
}

impl ModuleRunCompletion {
    /// Successful completion with an output fingerprint
    pub fn completed(output_hash: String) -> Self {
        Self {
            status: RunStatus::Completed,
            duration_seconds: None,
            output_hash: Some(output_hash),
            is_cacheable: None,
            outputs: None,
            metrics: BTreeMap::new(),
        }
    }

    /// Failed completion; failed runs are never cacheable
    pub fn failed() -> Self {
        Self {
            status: RunStatus::Failed,
            duration_seconds: None,
            output_hash: None,
            is_cacheable: Some(false),
            outputs: None,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_outputs(mut self, outputs: Option<Value>, metrics: BTreeMap<String, Value>) -> Self {
        self.outputs = outputs;
        self.metrics = metrics;
        self
    }

    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.is_cacheable = Some(cacheable);
        self
    }
}

/// Role an artifact plays for its module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactRole {
    /// Official output; participates in cache validity and fingerprints
    Primary,
    Intermediate,
    Debug,
    Export,
    Sidecar,
}

impl std::fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Intermediate => write!(f, "intermediate"),
            Self::Debug => write!(f, "debug"),
            Self::Export => write!(f, "export"),
            Self::Sidecar => write!(f, "sidecar"),
        }
    }
}

/// One registered output file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: u64,
    pub module_run_id: u64,
    pub input_id: String,
    /// Slash-separated path relative to `root`
    pub key: String,
    pub root: PathBuf,
    pub artifact_type: Option<String>,
    pub role: ArtifactRole,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Absolute location on disk
    pub fn path(&self) -> PathBuf {
        self.root.join(&self.key)
    }
}

/// Fields needed to register an artifact
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub module_run_id: u64,
    pub input_id: String,
    pub key: String,
    pub root: PathBuf,
    pub artifact_type: Option<String>,
    pub role: ArtifactRole,
    pub content_hash: String,
}

/// Store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub pipeline_runs: usize,
    pub completed_pipeline_runs: usize,
    pub module_runs: usize,
    pub cacheable_module_runs: usize,
    pub superseded_module_runs: usize,
    pub artifacts: usize,
}

/// Persistence contract consumed by the coordinator and module cache
///
/// Implementations own state transitions: a run leaves `in_progress`
/// exactly once and failed module runs are forced non-cacheable.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_pipeline_run(&self, new: NewPipelineRun) -> Result<PipelineRun, ConvoflowError>;

    /// Latest completed run for an identical (input, pipeline input hash)
    async fn find_latest_completed_pipeline_run(
        &self,
        input_id: &str,
        pipeline_input_hash: &str,
    ) -> Result<Option<PipelineRun>, ConvoflowError>;

    async fn update_pipeline_status(&self, id: u64, status: RunStatus) -> Result<(), ConvoflowError>;

    async fn create_module_run(&self, new: NewModuleRun) -> Result<ModuleRun, ConvoflowError>;

    /// Latest completed, cacheable, non-superseded run for an identical key
    async fn find_cacheable_module_run(
        &self,
        input_id: &str,
        module_name: &str,
        module_version: &str,
        module_input_hash: &str,
    ) -> Result<Option<ModuleRun>, ConvoflowError>;

    async fn complete_module_run(
        &self,
        id: u64,
        completion: ModuleRunCompletion,
    ) -> Result<ModuleRun, ConvoflowError>;

    async fn mark_superseded(&self, id: u64, at: DateTime<Utc>) -> Result<(), ConvoflowError>;

    /// Supersede every cacheable run of a module, optionally for one input
    async fn supersede_module(
        &self,
        module_name: &str,
        input_id: Option<&str>,
    ) -> Result<usize, ConvoflowError>;

    async fn module_runs_for_pipeline(&self, pipeline_run_id: u64) -> Result<Vec<ModuleRun>, ConvoflowError>;

    async fn create_artifact(&self, new: NewArtifact) -> Result<ArtifactRecord, ConvoflowError>;

    async fn primary_artifacts(&self, module_run_id: u64) -> Result<Vec<ArtifactRecord>, ConvoflowError>;

    async fn artifacts_for_input(&self, input_id: &str) -> Result<Vec<ArtifactRecord>, ConvoflowError>;

    async fn stats(&self) -> Result<StoreStats, ConvoflowError>;
}
