// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! # convoflow - Transcript Analysis Pipeline
//!
//! `convoflow` runs analysis modules over conversation transcripts in
//! dependency order and reuses earlier results whenever nothing that affects
//! them has changed.
//!
//! ## Features
//!
//! - **Dependency resolution** - Requested modules pull in what they need, ordered cheap-first
//! - **Module-level caching** - Keyed on content, config, code version and upstream outputs
//! - **Artifact tracking** - Every output file is hashed, classified and verifiable
//! - **Run records** - Pipeline and module runs persist in a local store
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the default modules
//! convoflow run interview.json
//!
//! # Run one module and its dependencies
//! convoflow run interview.json -m moments
//!
//! # Show the plan only
//! convoflow plan -m moments
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod input;
pub mod modules;
pub mod pipeline;
pub mod registry;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::RunConfig;
pub use errors::{ConvoflowError, ConvoflowResult};
pub use pipeline::{ExecutionOptions, PipelineExecutor, RunSummary};
pub use registry::{ModuleSpec, Registry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
