// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Error types with actionable diagnostics
//!
//! Only true faults are errors here. Expected branches of a run (cache
//! misses, requirement skips, reused runs) are modelled as typed return
//! values by the components that produce them.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for convoflow operations
pub type ConvoflowResult<T> = Result<T, ConvoflowError>;

/// Main error type for convoflow
#[derive(Error, Debug, Diagnostic)]
pub enum ConvoflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Validation Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    #[diagnostic(code(convoflow::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(convoflow::config))]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Registry Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Circular dependency detected between modules: {}", modules.join(" → "))]
    #[diagnostic(
        code(convoflow::circular_dependency),
        help("Review the declared and implicit dependencies of these modules")
    )]
    CircularDependency { modules: Vec<String> },

    #[error("Module '{module}' depends on unknown module '{dependency}'")]
    #[diagnostic(
        code(convoflow::unknown_dependency),
        help("Check that '{dependency}' is registered before finalizing the registry")
    )]
    UnknownDependency { module: String, dependency: String },

    #[error("Module '{module}' is registered more than once")]
    #[diagnostic(code(convoflow::duplicate_module))]
    DuplicateModule { module: String },

    #[error("Module '{module}' is not registered")]
    #[diagnostic(
        code(convoflow::unknown_module),
        help("Run 'convoflow modules' to list the available modules")
    )]
    UnknownModule { module: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("{module}: Missing dependencies [{}]{}", missing.join(", "), chain_suffix(missing, chain))]
    #[diagnostic(code(convoflow::missing_dependency))]
    MissingDependency {
        module: String,
        missing: Vec<String>,
        chain: Vec<String>,
    },

    #[error("Error in {module} analysis: {message}")]
    #[diagnostic(code(convoflow::module_execution))]
    ModuleExecution { module: String, message: String },

    #[error("Error in {module} analysis: exceeded its timeout budget of {seconds}s")]
    #[diagnostic(
        code(convoflow::module_timeout),
        help("Raise the module's timeout or set 'enforce_timeouts = false' in the pipeline config")
    )]
    ModuleTimeout { module: String, seconds: u64 },

    #[error("Run context is frozen and cannot be modified")]
    #[diagnostic(code(convoflow::context_frozen))]
    ContextFrozen,

    // ─────────────────────────────────────────────────────────────────────────
    // Store Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("{record} {id} cannot move from '{from}' to '{to}'")]
    #[diagnostic(code(convoflow::invalid_transition))]
    InvalidTransition {
        record: &'static str,
        id: u64,
        from: String,
        to: String,
    },

    #[error("{record} {id} not found")]
    #[diagnostic(code(convoflow::record_not_found))]
    RecordNotFound { record: &'static str, id: u64 },

    #[error("Run store error: {message}")]
    #[diagnostic(code(convoflow::store))]
    Store { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // File Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(convoflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Failed to write file '{path}': {error}")]
    #[diagnostic(code(convoflow::file_write_error))]
    FileWriteError { path: PathBuf, error: String },

    #[error("No transcripts matched pattern: {pattern}")]
    #[diagnostic(
        code(convoflow::no_input_files),
        help("Check that files matching '{pattern}' exist")
    )]
    NoInputFiles { pattern: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(convoflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(convoflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(convoflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(convoflow::toml_error))]
    Toml { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(convoflow::glob_error))]
    GlobPattern { message: String },
}

fn chain_suffix(missing: &[String], chain: &[String]) -> String {
    if chain.is_empty() || chain == missing {
        String::new()
    } else {
        format!(" ({})", chain.join(", "))
    }
}

impl From<std::io::Error> for ConvoflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for ConvoflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for ConvoflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for ConvoflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<glob::PatternError> for ConvoflowError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl ConvoflowError {
    /// Create a validation error with a hint
    pub fn validation(message: impl Into<String>, help: Option<&str>) -> Self {
        Self::Validation {
            message: message.into(),
            help: help.map(str::to_string),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Recovery suggestion for errors that have one
    pub fn recovery(&self) -> Option<RecoverySuggestion> {
        match self {
            Self::CircularDependency { modules } => {
                Some(RecoverySuggestion::fix_circular_dependency(modules))
            }
            Self::MissingDependency { module, missing, .. } => {
                Some(RecoverySuggestion::fix_missing_dependency(module, missing))
            }
            Self::ModuleExecution { module, message } => {
                Some(RecoverySuggestion::fix_module_failure(module, message))
            }
            _ => None,
        }
    }
}
