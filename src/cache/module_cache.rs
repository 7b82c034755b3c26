// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Module-level run cache
//!
//! A prior run is only reused when its key matches exactly and every primary
//! artifact it registered is still on disk. A match whose artifacts vanished
//! is treated as a miss; the replacement run links back to it and the stale
//! run is superseded once the replacement completes.

use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::artifacts::ArtifactRegistry;
use super::hash::hash_payload;
use super::CACHE_HIT_REASON;
use crate::errors::ConvoflowResult;
use crate::store::{ModuleRun, ModuleRunCompletion, NewModuleRun, PipelineRun, RunStore};

/// Hash of the cache-affecting part of one module's config
pub fn module_config_hash(config: &Value) -> ConvoflowResult<String> {
    hash_payload(config)
}

/// Module-level cache key
pub fn module_input_hash(
    content_hash: &str,
    config_hash: &str,
    module_version: &str,
    dependency_fingerprints: &[String],
) -> ConvoflowResult<String> {
    hash_payload(&json!({
        "transcript_content_hash": content_hash,
        "module_config_hash": config_hash,
        "module_version": module_version,
        "dependency_fingerprints": dependency_fingerprints,
    }))
}

/// Everything that identifies one module execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleCacheKey {
    pub input_id: String,
    pub module_name: String,
    pub module_version: String,
    pub module_config_hash: String,
    pub module_input_hash: String,
}

impl ModuleCacheKey {
    /// Derive the key from its parts
    ///
    /// `dependency_fingerprints` follow the module's dependency order, with
    /// an empty string for a dependency that produced nothing this run.
    pub fn derive(
        input_id: &str,
        content_hash: &str,
        module_name: &str,
        module_version: &str,
        cache_config: &Value,
        dependency_fingerprints: &[String],
    ) -> ConvoflowResult<Self> {
        let config_hash = module_config_hash(cache_config)?;
        let input_hash =
            module_input_hash(content_hash, &config_hash, module_version, dependency_fingerprints)?;

        Ok(Self {
            input_id: input_id.to_string(),
            module_name: module_name.to_string(),
            module_version: module_version.to_string(),
            module_config_hash: config_hash,
            module_input_hash: input_hash,
        })
    }
}

/// Result of consulting the cache for one module
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// Replayed: `run` is the completed cache-hit record, `source` the original
    Hit { run: ModuleRun, source: ModuleRun },
    /// Must execute: `run` is in progress
    Miss { run: ModuleRun },
}

pub struct ModuleRunCache {
    store: Arc<dyn RunStore>,
    artifacts: ArtifactRegistry,
    lookups_enabled: bool,
}

impl ModuleRunCache {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self {
            artifacts: ArtifactRegistry::new(Arc::clone(&store)),
            store,
            lookups_enabled: true,
        }
    }

    /// Skip lookups; runs are still recorded and stay cacheable
    pub fn without_lookups(mut self) -> Self {
        self.lookups_enabled = false;
        self
    }

    /// Find a reusable run or open a new one
    pub async fn begin(
        &self,
        pipeline_run: &PipelineRun,
        key: &ModuleCacheKey,
    ) -> ConvoflowResult<CacheLookup> {
        let mut replaces = None;
        let mut reason = if self.lookups_enabled {
            "cache_miss"
        } else {
            "cache_disabled"
        };

        if self.lookups_enabled {
            let candidate = self
                .store
                .find_cacheable_module_run(
                    &key.input_id,
                    &key.module_name,
                    &key.module_version,
                    &key.module_input_hash,
                )
                .await?;

            if let Some(source) = candidate {
                if self.artifacts.primaries_intact(source.id).await? {
                    let run = self.record_hit(pipeline_run, key, &source).await?;
                    tracing::debug!(
                        module = %key.module_name,
                        source_run = source.id,
                        "cache hit"
                    );
                    return Ok(CacheLookup::Hit { run, source });
                }

                tracing::warn!(
                    module = %key.module_name,
                    stale_run = source.id,
                    "cached primary artifacts missing, recomputing"
                );
                replaces = Some(source.id);
                reason = "stale_artifacts";
            }
        }

        let run = self
            .store
            .create_module_run(NewModuleRun {
                pipeline_run_id: pipeline_run.id,
                input_id: key.input_id.clone(),
                module_name: key.module_name.clone(),
                module_version: key.module_version.clone(),
                module_config_hash: key.module_config_hash.clone(),
                module_input_hash: key.module_input_hash.clone(),
                is_cacheable: true,
                cache_reason: Some(reason.to_string()),
                replaces_module_run_id: replaces,
            })
            .await?;

        tracing::debug!(module = %key.module_name, input_hash = %key.module_input_hash, "cache miss");
        Ok(CacheLookup::Miss { run })
    }

    async fn record_hit(
        &self,
        pipeline_run: &PipelineRun,
        key: &ModuleCacheKey,
        source: &ModuleRun,
    ) -> ConvoflowResult<ModuleRun> {
        let run = self
            .store
            .create_module_run(NewModuleRun {
                pipeline_run_id: pipeline_run.id,
                input_id: key.input_id.clone(),
                module_name: key.module_name.clone(),
                module_version: key.module_version.clone(),
                module_config_hash: key.module_config_hash.clone(),
                module_input_hash: key.module_input_hash.clone(),
                is_cacheable: false,
                cache_reason: Some(CACHE_HIT_REASON.to_string()),
                replaces_module_run_id: None,
            })
            .await?;

        self.store
            .complete_module_run(
                run.id,
                ModuleRunCompletion::completed(source.output_hash.clone().unwrap_or_default())
                    .with_duration(0.0)
                    .with_outputs(source.outputs.clone(), source.metrics.clone()),
            )
            .await
    }

    /// Close a successful run with its fingerprint
    pub async fn complete(
        &self,
        run: &ModuleRun,
        output_hash: String,
        duration_seconds: f64,
        payload: Value,
        metrics: BTreeMap<String, Value>,
    ) -> ConvoflowResult<ModuleRun> {
        let done = self
            .store
            .complete_module_run(
                run.id,
                ModuleRunCompletion::completed(output_hash)
                    .with_duration(duration_seconds)
                    .with_outputs(Some(payload), metrics),
            )
            .await?;

        if let Some(stale) = done.replaces_module_run_id {
            self.store.mark_superseded(stale, Utc::now()).await?;
            tracing::debug!(module = %done.module_name, superseded = stale, "superseded stale run");
        }

        Ok(done)
    }

    /// Close a failed run; it will never be reused
    pub async fn fail(&self, run: &ModuleRun, duration_seconds: f64) -> ConvoflowResult<ModuleRun> {
        self.store
            .complete_module_run(
                run.id,
                ModuleRunCompletion::failed().with_duration(duration_seconds),
            )
            .await
    }

    pub fn artifacts(&self) -> &ArtifactRegistry {
        &self.artifacts
    }
}
