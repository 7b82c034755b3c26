// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Content-addressed caching of pipeline and module runs
//!
//! Run-level reuse is keyed on the transcript content plus the run config.
//! Module-level reuse is keyed on the transcript content, the module's own
//! config, its code version and the output fingerprints of its
//! dependencies, so a change anywhere upstream flows down the hash chain.

mod artifacts;
mod coordinator;
mod hash;
mod integrity;
mod module_cache;

pub use artifacts::{classify_role, output_fingerprint, ArtifactRegistry};
pub use coordinator::{PipelineRunCoordinator, RerunMode, RunStart};
pub use hash::{hash_file, hash_payload, hash_string, to_canonical_json, ContentHasher};
pub use integrity::{verify_artifacts, IntegrityReport, META_DIR};
pub use module_cache::{
    module_config_hash, module_input_hash, CacheLookup, ModuleCacheKey, ModuleRunCache,
};

/// Cache reason recorded on a run that replayed an earlier result
pub const CACHE_HIT_REASON: &str = "cache_hit";
