// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Run context
//!
//! [`PipelineContext`] is the single writer owned by the executor. Modules
//! only ever see a [`ModuleContext`], which wraps a frozen, shareable
//! [`ContextSnapshot`].

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{ConvoflowError, ConvoflowResult};
use crate::input::Transcript;
use crate::modules::{ArtifactDescriptor, ModuleError, ModuleResult};

/// Read-only view of the run state at one point in time
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    transcript: Arc<Transcript>,
    results: BTreeMap<String, Arc<Value>>,
}

impl ContextSnapshot {
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn result(&self, module: &str) -> Option<&Value> {
        self.results.get(module).map(Arc::as_ref)
    }

    pub fn completed_modules(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }
}

/// Mutable run state; results accumulate as modules finish
#[derive(Debug)]
pub struct PipelineContext {
    transcript: Arc<Transcript>,
    results: BTreeMap<String, Arc<Value>>,
    frozen: bool,
}

impl PipelineContext {
    pub fn new(transcript: Transcript) -> Self {
        Self {
            transcript: Arc::new(transcript),
            results: BTreeMap::new(),
            frozen: false,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Record a module's payload for its dependents
    pub fn store_result(&mut self, module: &str, payload: Value) -> ConvoflowResult<()> {
        if self.frozen {
            return Err(ConvoflowError::ContextFrozen);
        }
        self.results.insert(module.to_string(), Arc::new(payload));
        Ok(())
    }

    pub fn result(&self, module: &str) -> Option<&Value> {
        self.results.get(module).map(Arc::as_ref)
    }

    /// Current state as a shareable snapshot
    pub fn snapshot(&self) -> Arc<ContextSnapshot> {
        Arc::new(ContextSnapshot {
            transcript: Arc::clone(&self.transcript),
            results: self.results.clone(),
        })
    }

    /// Refuse further writes and hand out the final snapshot
    pub fn freeze(&mut self) -> Arc<ContextSnapshot> {
        self.frozen = true;
        self.snapshot()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

/// What a single module sees while it runs
#[derive(Debug, Clone)]
pub struct ModuleContext {
    snapshot: Arc<ContextSnapshot>,
    module: String,
    output_dir: PathBuf,
    config: Value,
}

impl ModuleContext {
    pub fn new(
        snapshot: Arc<ContextSnapshot>,
        module: impl Into<String>,
        output_dir: PathBuf,
        config: Value,
    ) -> Self {
        Self {
            snapshot,
            module: module.into(),
            output_dir,
            config,
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module
    }

    pub fn transcript(&self) -> &Transcript {
        self.snapshot.transcript()
    }

    /// Payload of an upstream module
    pub fn result(&self, module: &str) -> Option<&Value> {
        self.snapshot.result(module)
    }

    /// Payload of an upstream module, or a fault when it is absent
    pub fn require_result(&self, module: &str) -> ModuleResult<&Value> {
        self.result(module)
            .ok_or_else(|| ModuleError::MissingResult(module.to_string()))
    }

    /// This module's own output directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// This module's config section
    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn config_f64(&self, key: &str, default: f64) -> ModuleResult<f64> {
        match self.config.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => v
                .as_f64()
                .ok_or_else(|| ModuleError::Config(format!("'{}' must be a number", key))),
        }
    }

    pub fn config_usize(&self, key: &str, default: usize) -> ModuleResult<usize> {
        match self.config.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => v
                .as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| ModuleError::Config(format!("'{}' must be a non-negative integer", key))),
        }
    }

    pub fn config_bool(&self, key: &str, default: bool) -> ModuleResult<bool> {
        match self.config.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => v
                .as_bool()
                .ok_or_else(|| ModuleError::Config(format!("'{}' must be a boolean", key))),
        }
    }

    /// Write pretty JSON under the output directory
    pub async fn write_json(&self, relative: &str, value: &Value) -> ModuleResult<ArtifactDescriptor> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let mut descriptor = self.write_bytes(relative, &bytes).await?;
        descriptor.artifact_type = Some("json".into());
        Ok(descriptor)
    }

    /// Write text under the output directory
    pub async fn write_text(&self, relative: &str, text: &str) -> ModuleResult<ArtifactDescriptor> {
        let mut descriptor = self.write_bytes(relative, text.as_bytes()).await?;
        descriptor.artifact_type = Some("text".into());
        Ok(descriptor)
    }

    async fn write_bytes(&self, relative: &str, bytes: &[u8]) -> ModuleResult<ArtifactDescriptor> {
        let path = self.output_dir.join(relative);
        let write_err = |e: std::io::Error| ModuleError::Write {
            path: path.clone(),
            error: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        tokio::fs::write(&path, bytes).await.map_err(write_err)?;

        Ok(ArtifactDescriptor::new(path.clone()))
    }
}
