// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Module registry
//!
//! A [`RegistryBuilder`] collects module declarations and an implicit
//! dependency policy table. [`RegistryBuilder::finalize`] validates the
//! whole graph once and yields an immutable [`Registry`] that is passed
//! explicitly to everything that needs it.

mod catalog;
pub mod requirements;

pub use requirements::{Capabilities, CapabilityGate, GateDecision, Requirement, RequirementsGate};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{ConvoflowError, ConvoflowResult};
use crate::pipeline::DagBuilder;

/// Default per-module timeout budget
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 600;

/// Cost class of a module; only used to order modules that are ready together
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Light,
    Medium,
    Heavy,
}

impl Category {
    /// Relative cost, lowest first
    pub fn rank(&self) -> u8 {
        match self {
            Self::Light => 0,
            Self::Medium => 1,
            Self::Heavy => 2,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Medium => write!(f, "medium"),
            Self::Heavy => write!(f, "heavy"),
        }
    }
}

/// Declared metadata of one module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub feature_flags: Vec<String>,
    pub timeout_seconds: u64,
    /// Left out when no modules are selected explicitly
    #[serde(default)]
    pub exclude_from_default: bool,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category,
            dependencies: Vec::new(),
            requirements: Vec::new(),
            feature_flags: Vec::new(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            exclude_from_default: false,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.dependencies.extend(deps.iter().map(|d| d.to_string()));
        self
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn feature(mut self, flag: impl Into<String>) -> Self {
        self.feature_flags.push(flag.into());
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn excluded_from_default(mut self) -> Self {
        self.exclude_from_default = true;
        self
    }
}

/// Collects module declarations before validation
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    modules: Vec<ModuleSpec>,
    implicit: BTreeMap<String, Vec<String>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, spec: ModuleSpec) -> Self {
        self.modules.push(spec);
        self
    }

    /// `module` always needs `dependency` even though it does not declare it
    pub fn implicit_dependency(mut self, module: &str, dependency: &str) -> Self {
        let deps = self.implicit.entry(module.to_string()).or_default();
        if !deps.iter().any(|d| d == dependency) {
            deps.push(dependency.to_string());
        }
        self
    }

    /// Validate names, dependencies and acyclicity; freeze the result
    pub fn finalize(self) -> ConvoflowResult<Registry> {
        let mut modules = BTreeMap::new();
        for spec in self.modules {
            if modules.contains_key(&spec.name) {
                return Err(ConvoflowError::DuplicateModule { module: spec.name });
            }
            modules.insert(spec.name.clone(), spec);
        }

        // Entries for modules that are not registered are inert
        let implicit: BTreeMap<String, Vec<String>> = self
            .implicit
            .into_iter()
            .filter(|(module, _)| modules.contains_key(module))
            .collect();

        let dag = DagBuilder::build(modules.values(), &implicit)?;

        tracing::debug!(modules = modules.len(), "registry finalized");

        Ok(Registry {
            modules,
            implicit,
            dag,
        })
    }
}

/// Immutable, validated module catalog
#[derive(Debug)]
pub struct Registry {
    modules: BTreeMap<String, ModuleSpec>,
    implicit: BTreeMap<String, Vec<String>>,
    dag: DagBuilder,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The catalog of built-in transcript analyses
    pub fn builtin() -> ConvoflowResult<Self> {
        catalog::builtin_registry()
    }

    pub fn get(&self, name: &str) -> Option<&ModuleSpec> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Module names in lexicographic order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleSpec> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules selected when the caller names none
    pub fn default_modules(&self) -> Vec<String> {
        self.modules
            .values()
            .filter(|m| !m.exclude_from_default)
            .map(|m| m.name.clone())
            .collect()
    }

    pub fn implicit_dependencies(&self, name: &str) -> &[String] {
        self.implicit.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Declared plus implicit dependencies, declared first, without repeats
    pub fn effective_dependencies(&self, name: &str) -> Vec<String> {
        let Some(spec) = self.modules.get(name) else {
            return Vec::new();
        };

        let mut seen = BTreeSet::new();
        spec.dependencies
            .iter()
            .chain(self.implicit_dependencies(name))
            .filter(|d| seen.insert(d.as_str()))
            .cloned()
            .collect()
    }

    pub fn dag(&self) -> &DagBuilder {
        &self.dag
    }
}
