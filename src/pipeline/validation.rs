// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Pre-run validation
//!
//! Checks the registry, module implementations and run config against each
//! other, and the input and output paths of a run.

use std::path::Path;

use crate::config::RunConfig;
use crate::errors::{ConvoflowError, ConvoflowResult};
use crate::modules::ModuleSet;
use crate::registry::Registry;

pub struct PipelineValidator;

impl PipelineValidator {
    /// Cross-check registry, implementations and config
    pub fn validate(registry: &Registry, modules: &ModuleSet, config: &RunConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        if let Err(e) = config.validate() {
            result.add_error(&e.to_string());
        }

        for name in registry.names() {
            if !modules.contains(name) {
                result.add_error(&format!("Module '{}' is registered but has no implementation", name));
            }
        }

        for name in modules.names() {
            if !registry.contains(name) {
                result.add_warning(&format!(
                    "Implementation '{}' is not registered and can never be scheduled",
                    name
                ));
            }
        }

        for name in &config.pipeline.modules {
            if !registry.contains(name) {
                result.add_warning(&format!("Configured module '{}' is unknown and will be skipped", name));
            }
        }

        for name in config.modules.keys() {
            if !registry.contains(name) {
                result.add_warning(&format!("[modules.{}] configures an unknown module", name));
            }
        }

        if let Err(e) = registry.dag().topological_order_names() {
            result.add_error(&e.to_string());
        }

        if config.pipeline.parallel {
            result.add_warning("pipeline.parallel is not available; modules run sequentially");
        }

        if !config.pipeline.enforce_timeouts {
            result.add_warning("Module timeouts are disabled");
        }

        result
    }

    /// The transcript must be a readable file and the output root a directory
    pub fn validate_paths(transcript: &Path, output_root: &Path) -> ConvoflowResult<()> {
        if !transcript.is_file() {
            return Err(ConvoflowError::validation(
                format!("Transcript '{}' does not exist or is not a file", transcript.display()),
                Some("Pass the path of a transcript JSON file"),
            ));
        }

        if output_root.exists() && !output_root.is_dir() {
            return Err(ConvoflowError::validation(
                format!("Output path '{}' exists and is not a directory", output_root.display()),
                Some("Choose a different --output directory"),
            ));
        }

        std::fs::create_dir_all(output_root).map_err(|e| ConvoflowError::FileWriteError {
            path: output_root.to_path_buf(),
            error: e.to_string(),
        })
    }
}

/// Validation findings
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
