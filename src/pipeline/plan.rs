// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Execution plans
//!
//! A plan records what was asked for, what will run, and why each module is
//! included. It is written next to the outputs as an audit record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::resolve::Resolution;
use crate::cache::hash_string;
use crate::errors::{ConvoflowError, ConvoflowResult};
use crate::modules::ModuleSet;
use crate::registry::{Category, Registry};

pub const PLAN_FILE: &str = "execution_plan.json";

/// One module's row in the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub dependencies: Vec<String>,
    pub category: Category,
    pub included_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub requested_modules: Vec<String>,
    pub resolved_modules: Vec<String>,
    pub execution_order: Vec<String>,
    pub dependency_graph: BTreeMap<String, PlanEntry>,
    pub modules_added_as_dependencies: Vec<String>,
    /// Requested names the registry does not know
    pub skipped_modules: Vec<String>,
    /// Scheduled modules with no implementation to run
    pub missing_dependencies: Vec<String>,
    pub warnings: Vec<String>,
}

impl ExecutionPlan {
    pub fn build(registry: &Registry, resolution: &Resolution, modules: &ModuleSet) -> Self {
        let mut warnings = Vec::new();

        for name in &resolution.unknown {
            warnings.push(format!("Unknown module '{}' was skipped", name));
        }

        let missing_dependencies: Vec<String> = resolution
            .order
            .iter()
            .filter(|m| !modules.contains(m))
            .cloned()
            .collect();
        for name in &missing_dependencies {
            warnings.push(format!("Module '{}' has no implementation and will fail", name));
        }

        let dependency_graph = resolution
            .order
            .iter()
            .filter_map(|name| {
                let spec = registry.get(name)?;
                let reason = resolution
                    .reasons
                    .get(name)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "requested".into());
                Some((
                    name.clone(),
                    PlanEntry {
                        dependencies: registry.effective_dependencies(name),
                        category: spec.category,
                        included_reason: reason,
                    },
                ))
            })
            .collect();

        let mut resolved_modules = resolution.order.clone();
        resolved_modules.sort();

        Self {
            requested_modules: resolution
                .requested
                .iter()
                .chain(&resolution.unknown)
                .cloned()
                .collect(),
            resolved_modules,
            execution_order: resolution.order.clone(),
            dependency_graph,
            modules_added_as_dependencies: resolution.added_as_dependencies(),
            skipped_modules: resolution.unknown.clone(),
            missing_dependencies,
            warnings,
        }
    }

    /// Stable identifier of the plan contents
    pub fn digest(&self) -> ConvoflowResult<String> {
        Ok(hash_string(&serde_json::to_string(self)?))
    }

    pub fn path(output_root: &Path) -> PathBuf {
        output_root.join(crate::cache::META_DIR).join(PLAN_FILE)
    }

    /// Write the plan under the output root
    pub async fn persist(&self, output_root: &Path) -> ConvoflowResult<PathBuf> {
        let path = Self::path(output_root);
        write_json_file(&path, self).await?;
        tracing::debug!(plan = %path.display(), "execution plan saved");
        Ok(path)
    }
}

/// Pretty-print any serializable value to a file, creating parents
pub(crate) async fn write_json_file<T: Serialize>(path: &Path, value: &T) -> ConvoflowResult<()> {
    let write_err = |e: std::io::Error| ConvoflowError::FileWriteError {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, json).await.map_err(write_err)
}
