// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Run summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::plan::write_json_file;
use crate::cache::META_DIR;
use crate::errors::ConvoflowResult;

pub const SUMMARY_FILE: &str = "run_summary.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Failed,
    /// An earlier completed run was trusted; nothing executed
    Reused,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Reused => write!(f, "reused"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedModule {
    pub module: String,
    pub reason: String,
}

/// What happened to one transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub transcript_path: PathBuf,
    pub output_root: PathBuf,
    pub pipeline_run_id: Option<u64>,
    pub status: RunOutcome,
    pub modules_requested: Vec<String>,
    pub execution_order: Vec<String>,
    /// Modules that produced a result, executed or replayed
    pub modules_run: Vec<String>,
    pub modules_failed: Vec<String>,
    pub cache_hits: Vec<String>,
    pub skipped_modules: Vec<SkippedModule>,
    pub errors: Vec<String>,
    /// Module whose fail-fast fault stopped the run
    pub halted_by: Option<String>,
    pub warnings: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub module_results: BTreeMap<String, Value>,
}

impl RunSummary {
    pub fn new(transcript_path: &Path, output_root: &Path, start_time: DateTime<Utc>) -> Self {
        Self {
            transcript_path: transcript_path.to_path_buf(),
            output_root: output_root.to_path_buf(),
            pipeline_run_id: None,
            status: RunOutcome::Completed,
            modules_requested: Vec::new(),
            execution_order: Vec::new(),
            modules_run: Vec::new(),
            modules_failed: Vec::new(),
            cache_hits: Vec::new(),
            skipped_modules: Vec::new(),
            errors: Vec::new(),
            halted_by: None,
            warnings: Vec::new(),
            start_time,
            end_time: start_time,
            duration_seconds: 0.0,
            module_results: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status != RunOutcome::Failed
    }

    pub fn skip(&mut self, module: &str, reason: impl Into<String>) {
        self.skipped_modules.push(SkippedModule {
            module: module.to_string(),
            reason: reason.into(),
        });
    }

    /// Stamp the end time and duration
    pub fn finish(&mut self, status: RunOutcome) {
        self.status = status;
        self.end_time = Utc::now();
        self.duration_seconds = (self.end_time - self.start_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
    }

    pub fn path(output_root: &Path) -> PathBuf {
        output_root.join(META_DIR).join(SUMMARY_FILE)
    }

    pub async fn persist(&self) -> ConvoflowResult<PathBuf> {
        let path = Self::path(&self.output_root);
        write_json_file(&path, self).await?;
        Ok(path)
    }

    pub fn load(output_root: &Path) -> ConvoflowResult<Self> {
        let path = Self::path(output_root);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            crate::errors::ConvoflowError::FileReadError {
                path: path.clone(),
                error: e.to_string(),
            }
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}
