// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Run configuration
//!
//! Loaded from `convoflow.toml`, `convoflow.yaml` or `convoflow.yml`.
//! Every section is optional.
//!
//! ```toml
//! [pipeline]
//! modules = ["moments", "stats"]
//! reuse_existing_run = false
//!
//! [modules.pauses]
//! min_gap_seconds = 1.5
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cache::{hash_payload, RerunMode};
use crate::errors::{ConvoflowError, ConvoflowResult};

/// File names probed by [`RunConfig::discover`], in order
pub const CONFIG_FILES: [&str; 3] = ["convoflow.toml", "convoflow.yaml", "convoflow.yml"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub pipeline: PipelineSection,
    pub store: StoreSection,
    pub output: OutputSection,
    /// Free-form per-module tables
    pub modules: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Requested modules; empty selects the registry defaults
    pub modules: Vec<String>,
    pub reuse_existing_run: bool,
    /// Reserved; execution stays sequential
    pub parallel: bool,
    pub max_workers: usize,
    /// Feature flags made available to the requirements gate
    pub features: Vec<String>,
    pub enforce_timeouts: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            reuse_existing_run: false,
            parallel: false,
            max_workers: 1,
            features: Vec::new(),
            enforce_timeouts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub enabled: bool,
    /// Defaults to `.convoflow/store` in the working directory
    pub directory: Option<PathBuf>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Base directory; each transcript gets `<directory>/<stem>`
    pub directory: Option<PathBuf>,
}

impl RunConfig {
    /// Load from a TOML or YAML file, chosen by extension
    pub fn load(path: &Path) -> ConvoflowResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConvoflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content)?,
            Some("yaml") | Some("yml") => Self::from_yaml(&content)?,
            _ => {
                return Err(ConvoflowError::Config {
                    message: format!(
                        "'{}' must have a .toml, .yaml or .yml extension",
                        path.display()
                    ),
                })
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load the first config file found in `dir`, or defaults
    pub fn discover(dir: &Path) -> ConvoflowResult<Self> {
        for name in CONFIG_FILES {
            let path = dir.join(name);
            if path.is_file() {
                tracing::debug!(config = %path.display(), "loading run config");
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn from_toml(content: &str) -> ConvoflowResult<Self> {
        toml::from_str(content).map_err(Into::into)
    }

    pub fn from_yaml(content: &str) -> ConvoflowResult<Self> {
        serde_yaml::from_str(content).map_err(Into::into)
    }

    pub fn validate(&self) -> ConvoflowResult<()> {
        if self.pipeline.max_workers == 0 {
            return Err(ConvoflowError::Config {
                message: "pipeline.max_workers must be at least 1".into(),
            });
        }

        if let Some((name, _)) = self
            .modules
            .iter()
            .find(|(_, v)| !(v.is_object() || v.is_null()))
        {
            return Err(ConvoflowError::Config {
                message: format!("[modules.{}] must be a table", name),
            });
        }

        Ok(())
    }

    pub fn rerun_mode(&self) -> RerunMode {
        if self.pipeline.reuse_existing_run {
            RerunMode::ReuseExistingRun
        } else {
            RerunMode::NewRun
        }
    }

    /// One module's table, or an empty object
    pub fn module_config(&self, module: &str) -> Value {
        match self.modules.get(module) {
            Some(Value::Null) | None => json!({}),
            Some(v) => v.clone(),
        }
    }

    /// Run-level config hash over the selection, features and module tables
    pub fn config_hash(&self, modules: &[String]) -> ConvoflowResult<String> {
        let mut modules = modules.to_vec();
        modules.sort();
        modules.dedup();
        let mut features = self.pipeline.features.clone();
        features.sort();
        features.dedup();

        hash_payload(&json!({
            "modules": modules,
            "features": features,
            "module_config": self.modules,
        }))
    }
}
