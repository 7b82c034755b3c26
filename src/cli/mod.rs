// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! CLI command definitions and handlers

pub mod cache;
pub mod graph;
pub mod modules;
pub mod plan;
pub mod run;
pub mod validate;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::RunConfig;
use crate::errors::ConvoflowResult;
use crate::modules::ModuleSet;
use crate::registry::Registry;
use crate::store::{FilesystemStore, MemoryStore, RunStore};

/// Transcript analysis pipeline
///
/// Resolves analysis modules into a dependency-ordered plan and runs it with
/// module-level result caching.
#[derive(Parser, Debug)]
#[clap(
    name = "convoflow",
    version,
    about = "Dependency-ordered, cached transcript analysis",
    long_about = None,
    after_help = "Examples:\n\
        convoflow run talk.json                  Run the default modules\n\
        convoflow run talk.json -m moments       Run moments and what it needs\n\
        convoflow plan -m moments                Show the execution plan\n\
        convoflow cache verify talk.json         Check recorded artifacts\n\n\
        See 'convoflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Config file (default: convoflow.toml / .yaml / .yml in the working directory)
    #[clap(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[clap(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline against one or more transcripts
    Run {
        /// Transcript files or glob patterns
        #[clap(required = true)]
        inputs: Vec<String>,

        /// Modules to request (repeatable)
        #[clap(short, long = "module", value_name = "NAME")]
        modules: Vec<String>,

        /// Reuse an identical completed run instead of executing
        #[clap(long)]
        reuse: bool,

        /// Skip cache lookups (runs are still recorded)
        #[clap(long)]
        no_cache: bool,

        /// Keep run records in memory only
        #[clap(long)]
        no_store: bool,

        /// Output directory (single input only)
        #[clap(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Run store directory
        #[clap(long, value_name = "DIR")]
        store: Option<PathBuf>,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show the execution plan without running anything
    Plan {
        /// Modules to request (repeatable)
        #[clap(short, long = "module", value_name = "NAME")]
        modules: Vec<String>,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show the module dependency graph
    Graph {
        /// Restrict the text listing to these modules and their dependencies
        #[clap(short, long = "module", value_name = "NAME")]
        modules: Vec<String>,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },

    /// List registered modules
    Modules {
        /// Output format
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Validate the registry, implementations and config
    Validate,

    /// Run store and cache management
    Cache {
        #[clap(subcommand)]
        action: CacheAction,

        /// Run store directory
        #[clap(long, global = true, value_name = "DIR")]
        store: Option<PathBuf>,
    },
}

/// Cache management actions
#[derive(Subcommand, Debug, Clone)]
pub enum CacheAction {
    /// Show run store statistics
    Stats,

    /// Supersede cached runs of a module so it recomputes
    Invalidate {
        /// Module name
        module: String,

        /// Only for this transcript
        #[clap(short, long, value_name = "TRANSCRIPT")]
        input: Option<PathBuf>,
    },

    /// Check recorded artifacts of a transcript against the disk
    Verify {
        /// Transcript whose outputs to check
        transcript: PathBuf,

        /// Output directory used for the run
        #[clap(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

/// Explicit config file, or discovery in the working directory
pub fn load_config(path: Option<&Path>) -> ConvoflowResult<RunConfig> {
    match path {
        Some(path) => RunConfig::load(path),
        None => RunConfig::discover(&std::env::current_dir()?),
    }
}

/// Registry and implementations shipped with the binary
pub fn builtin_pipeline() -> ConvoflowResult<(Arc<Registry>, ModuleSet)> {
    Ok((Arc::new(Registry::builtin()?), ModuleSet::builtin()))
}

/// Open the configured run store
///
/// Precedence: `--store`, then `[store] directory`, then `.convoflow/store`.
pub fn open_store(config: &RunConfig, override_dir: Option<&Path>) -> ConvoflowResult<Arc<dyn RunStore>> {
    if !config.store.enabled {
        tracing::debug!("run store disabled, keeping records in memory");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = match (override_dir, &config.store.directory) {
        (Some(dir), _) => FilesystemStore::open(dir)?,
        (None, Some(dir)) => FilesystemStore::open(dir.as_path())?,
        (None, None) => FilesystemStore::default_store(&std::env::current_dir()?)?,
    };

    Ok(Arc::new(store))
}
