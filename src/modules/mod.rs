// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Analysis module contract and built-in modules
//!
//! Every runnable module implements [`AnalysisModule`]. A [`ModuleSet`] maps
//! registry names to implementations at compile time; nothing is looked up
//! by reflection.

mod momentum;
mod moments;
mod pauses;
mod stats;
mod transcript_output;

pub use momentum::MomentumModule;
pub use moments::MomentsModule;
pub use pauses::PausesModule;
pub use stats::StatsModule;
pub use transcript_output::TranscriptOutputModule;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::cache::hash_payload;
use crate::errors::ConvoflowResult;
use crate::pipeline::ModuleContext;
use crate::store::ArtifactRole;

/// Lower-cased message fragments that stop the whole run
pub const FAIL_FAST_SIGNATURES: [&str; 5] = [
    "speaker map",
    "speaker mapping",
    "no speaker map",
    "speaker mapping required",
    "speaker identification",
];

/// Whether a fault message carries a fail-fast signature
pub fn is_fail_fast_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    FAIL_FAST_SIGNATURES.iter().any(|sig| lowered.contains(sig))
}

/// Fault raised by a module
#[derive(Error, Debug)]
pub enum ModuleError {
    /// Speaker names are required and missing; halts the run
    #[error("speaker identification required: {0}")]
    SpeakerIdentificationRequired(String),

    #[error("missing upstream result '{0}'")]
    MissingResult(String),

    #[error("invalid module config: {0}")]
    Config(String),

    #[error("{0}")]
    Failed(String),

    #[error("failed to write {path}: {error}")]
    Write { path: PathBuf, error: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ModuleError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Fail-fast faults end the run instead of only this module
    pub fn is_fail_fast(&self) -> bool {
        matches!(self, Self::SpeakerIdentificationRequired(_)) || is_fail_fast_message(&self.to_string())
    }
}

pub type ModuleResult<T> = Result<T, ModuleError>;

/// Reported outcome of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Success,
    Error,
}

/// A file a module wrote, optionally with an explicit role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub path: PathBuf,
    #[serde(default)]
    pub role: Option<ArtifactRole>,
    #[serde(default)]
    pub artifact_type: Option<String>,
}

impl ArtifactDescriptor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            role: None,
            artifact_type: None,
        }
    }

    pub fn with_role(mut self, role: ArtifactRole) -> Self {
        self.role = Some(role);
        self
    }
}

/// Structured result of one module execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleOutput {
    pub status: ModuleStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactDescriptor>,
    #[serde(default)]
    pub metrics: BTreeMap<String, Value>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl ModuleOutput {
    pub fn success(started_at: DateTime<Utc>, payload: Value) -> Self {
        Self {
            status: ModuleStatus::Success,
            started_at,
            finished_at: Utc::now(),
            artifacts: Vec::new(),
            metrics: BTreeMap::new(),
            payload,
            error: None,
        }
    }

    /// A result that reports failure instead of raising
    pub fn error(started_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            status: ModuleStatus::Error,
            started_at,
            finished_at: Utc::now(),
            artifacts: Vec::new(),
            metrics: BTreeMap::new(),
            payload: Value::Null,
            error: Some(message.into()),
        }
    }

    pub fn with_artifact(mut self, artifact: ArtifactDescriptor) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_metric(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }

    /// Reported errors become module faults
    pub fn into_result(self) -> ModuleResult<Self> {
        match self.status {
            ModuleStatus::Success => Ok(self),
            ModuleStatus::Error => Err(ModuleError::Failed(
                self.error.unwrap_or_else(|| "module reported an error".into()),
            )),
        }
    }
}

/// A runnable analysis
#[async_trait]
pub trait AnalysisModule: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// Code version; any change invalidates cached results
    fn version(&self) -> &str;

    /// The part of this module's config section that changes its output
    fn cache_affecting_config(&self, section: &Value) -> Value {
        section.clone()
    }

    async fn run(&self, ctx: &ModuleContext) -> ModuleResult<ModuleOutput>;
}

/// Version hash over a module's identity and code version
pub fn module_version(module: &dyn AnalysisModule) -> ConvoflowResult<String> {
    hash_payload(&serde_json::json!({
        "module": module.name(),
        "version": module.version(),
    }))
}

/// Named config values with defaults filled in, as a cache key sees them
///
/// Numbers are normalized so `1` and `1.0` key alike. Values of the wrong
/// type are kept as given; they still change the key and fail at run time.
pub(crate) fn resolved_config(section: &Value, defaults: &[(&str, Value)]) -> Value {
    let resolved = defaults
        .iter()
        .map(|(key, default)| {
            let value = match section.get(*key) {
                None | Some(Value::Null) => default.clone(),
                Some(given) => given.clone(),
            };
            let value = match value.as_f64() {
                Some(n) if value.is_number() => Value::from(n),
                _ => value,
            };
            (key.to_string(), value)
        })
        .collect();
    Value::Object(resolved)
}

/// Name-to-implementation map
#[derive(Clone, Default)]
pub struct ModuleSet {
    modules: BTreeMap<String, Arc<dyn AnalysisModule>>,
}

impl ModuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Implementations for every module in the built-in catalog
    pub fn builtin() -> Self {
        Self::new()
            .with(StatsModule)
            .with(PausesModule)
            .with(MomentumModule)
            .with(MomentsModule)
            .with(TranscriptOutputModule)
    }

    pub fn with(mut self, module: impl AnalysisModule + 'static) -> Self {
        self.insert(Arc::new(module));
        self
    }

    pub fn insert(&mut self, module: Arc<dyn AnalysisModule>) {
        self.modules.insert(module.name().to_string(), module);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AnalysisModule>> {
        self.modules.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ModuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.modules.keys()).finish()
    }
}
