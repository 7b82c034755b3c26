// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Artifact registration and output fingerprints

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::hash::{hash_file, hash_payload};
use crate::errors::{ConvoflowError, ConvoflowResult};
use crate::modules::ArtifactDescriptor;
use crate::store::{ArtifactRecord, ArtifactRole, ModuleRun, NewArtifact, RunStore};

/// Infer a role from the output path conventions
///
/// `key` is slash-separated and relative to the output root, for example
/// `stats/data/global/summary.json`.
pub fn classify_role(key: &str) -> ArtifactRole {
    let path = format!("/{}", key.trim_start_matches('/').replace('\\', "/"));
    let speaker_data = path.contains("/data/speakers/");
    let speaker_charts = path.contains("/charts/speakers/");

    if path.contains("/data/global/") || path.contains("/charts/global/") {
        ArtifactRole::Primary
    } else if (path.contains("/data/") && !speaker_data)
        || (path.contains("/charts/") && !speaker_charts)
    {
        ArtifactRole::Primary
    } else if speaker_data || speaker_charts {
        ArtifactRole::Intermediate
    } else if path.contains("/debug/") {
        ArtifactRole::Debug
    } else if path.contains("/export/") || path.contains("/exports/") {
        ArtifactRole::Export
    } else {
        ArtifactRole::Intermediate
    }
}

/// Fingerprint of a module's output for its dependents' cache keys
///
/// Built from the primary artifacts when there are any; otherwise from the
/// module identity and its result payload.
pub fn output_fingerprint(
    module: &str,
    module_version: &str,
    artifacts: &[ArtifactRecord],
    payload: &Value,
) -> ConvoflowResult<String> {
    let mut primary: Vec<(&str, &str)> = artifacts
        .iter()
        .filter(|a| a.role == ArtifactRole::Primary)
        .map(|a| (a.key.as_str(), a.content_hash.as_str()))
        .collect();

    if primary.is_empty() {
        return hash_payload(&json!({
            "module": module,
            "module_version": module_version,
            "outputs": payload,
        }));
    }

    primary.sort();
    hash_payload(&primary)
}

/// Slash-separated key of `path` under `root`
fn artifact_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Every regular file below `dir`, sorted
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> ConvoflowResult<()> {
    if !dir.exists() {
        return Ok(());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| ConvoflowError::FileReadError {
        path: dir.to_path_buf(),
        error: e.to_string(),
    })?;

    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }

    Ok(())
}

pub(crate) fn scan_files(dir: &Path) -> ConvoflowResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();
    Ok(files)
}

/// Catalogs the files a module run produced
pub struct ArtifactRegistry {
    store: Arc<dyn RunStore>,
}

impl ArtifactRegistry {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }

    /// Scan `module_dir`, merge explicit declarations, and record each file
    ///
    /// Declared roles win over path conventions. Files outside `output_root`
    /// cannot be keyed and are skipped.
    pub async fn register(
        &self,
        module_run: &ModuleRun,
        output_root: &Path,
        module_dir: &Path,
        declared: &[ArtifactDescriptor],
    ) -> ConvoflowResult<Vec<ArtifactRecord>> {
        let mut found: BTreeMap<PathBuf, Option<&ArtifactDescriptor>> = scan_files(module_dir)?
            .into_iter()
            .map(|p| (p, None))
            .collect();
        for descriptor in declared {
            found.insert(descriptor.path.clone(), Some(descriptor));
        }

        let mut records = Vec::with_capacity(found.len());
        for (path, descriptor) in found {
            let Some(key) = artifact_key(output_root, &path) else {
                tracing::warn!(
                    module = %module_run.module_name,
                    path = %path.display(),
                    "artifact outside output root, not registered"
                );
                continue;
            };
            if !path.is_file() {
                tracing::warn!(module = %module_run.module_name, key = %key, "declared artifact missing");
                continue;
            }

            let role = descriptor
                .and_then(|d| d.role)
                .unwrap_or_else(|| classify_role(&key));
            let artifact_type = descriptor
                .and_then(|d| d.artifact_type.clone())
                .or_else(|| path.extension().map(|e| e.to_string_lossy().into_owned()));

            let record = self
                .store
                .create_artifact(NewArtifact {
                    module_run_id: module_run.id,
                    input_id: module_run.input_id.clone(),
                    key,
                    root: output_root.to_path_buf(),
                    artifact_type,
                    role,
                    content_hash: hash_file(&path)?,
                })
                .await?;
            records.push(record);
        }

        tracing::debug!(
            module = %module_run.module_name,
            artifacts = records.len(),
            primary = records.iter().filter(|r| r.role == ArtifactRole::Primary).count(),
            "registered artifacts"
        );

        Ok(records)
    }

    /// Whether every primary artifact of a run is still on disk
    pub async fn primaries_intact(&self, module_run_id: u64) -> ConvoflowResult<bool> {
        let primaries = self.store.primary_artifacts(module_run_id).await?;
        Ok(primaries.iter().all(|a| a.path().is_file()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewModuleRun, NewPipelineRun};
    use tempfile::TempDir;

    #[test]
    fn classification_follows_path_conventions() {
        assert_eq!(classify_role("stats/data/global/summary.json"), ArtifactRole::Primary);
        assert_eq!(classify_role("stats/charts/global/bar.png"), ArtifactRole::Primary);
        assert_eq!(classify_role("stats/data/totals.json"), ArtifactRole::Primary);
        assert_eq!(classify_role("stats/data/speakers/alice.json"), ArtifactRole::Intermediate);
        assert_eq!(classify_role("stats/debug/trace.log"), ArtifactRole::Debug);
        assert_eq!(classify_role("transcript_output/exports/t.txt"), ArtifactRole::Export);
        assert_eq!(classify_role("stats/export/t.csv"), ArtifactRole::Export);
        assert_eq!(classify_role("stats/scratch.bin"), ArtifactRole::Intermediate);
    }

    #[test]
    fn only_per_speaker_data_and_charts_are_intermediate() {
        assert_eq!(classify_role("m/speakers/data/x.json"), ArtifactRole::Primary);
        assert_eq!(classify_role("m/speakers/charts/x.png"), ArtifactRole::Primary);
        assert_eq!(classify_role("m/charts/speakers/a.png"), ArtifactRole::Intermediate);
        assert_eq!(classify_role("m/speakers/notes.txt"), ArtifactRole::Intermediate);
        // Speaker charts do not hide a data directory
        assert_eq!(classify_role("m/data/totals/charts/speakers/a.png"), ArtifactRole::Primary);
    }

    fn record(key: &str, hash: &str, role: ArtifactRole) -> ArtifactRecord {
        ArtifactRecord {
            id: 1,
            module_run_id: 1,
            input_id: "t".into(),
            key: key.into(),
            root: "/out".into(),
            artifact_type: None,
            role,
            content_hash: hash.into(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn fingerprint_uses_sorted_primaries() {
        let a = vec![
            record("m/data/global/b.json", "2", ArtifactRole::Primary),
            record("m/data/global/a.json", "1", ArtifactRole::Primary),
            record("m/debug/x", "9", ArtifactRole::Debug),
        ];
        let b = vec![
            record("m/data/global/a.json", "1", ArtifactRole::Primary),
            record("m/data/global/b.json", "2", ArtifactRole::Primary),
        ];

        let payload = json!({"ignored": true});
        assert_eq!(
            output_fingerprint("m", "v1", &a, &payload).unwrap(),
            output_fingerprint("m", "v1", &b, &Value::Null).unwrap()
        );
    }

    #[test]
    fn fingerprint_falls_back_to_payload() {
        let exports = vec![record("m/exports/t.txt", "1", ArtifactRole::Export)];
        let one = output_fingerprint("m", "v1", &exports, &json!({"lines": 1})).unwrap();
        let two = output_fingerprint("m", "v1", &exports, &json!({"lines": 2})).unwrap();
        let bumped = output_fingerprint("m", "v2", &exports, &json!({"lines": 1})).unwrap();

        assert_ne!(one, two);
        assert_ne!(one, bumped);
    }

    #[tokio::test]
    async fn register_scans_and_honors_declared_roles() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let module_dir = root.join("stats");
        std::fs::create_dir_all(module_dir.join("data/global")).unwrap();
        std::fs::create_dir_all(module_dir.join("data/speakers")).unwrap();
        std::fs::write(module_dir.join("data/global/summary.json"), "{}").unwrap();
        std::fs::write(module_dir.join("data/speakers/a.json"), "{}").unwrap();
        std::fs::write(module_dir.join("notes.txt"), "n").unwrap();

        let store: Arc<dyn RunStore> = Arc::new(MemoryStore::new());
        let pipeline = store
            .create_pipeline_run(NewPipelineRun {
                input_id: "t".into(),
                pipeline_version: "v".into(),
                pipeline_config_hash: "c".into(),
                pipeline_input_hash: "h".into(),
            })
            .await
            .unwrap();
        let run = store
            .create_module_run(NewModuleRun {
                pipeline_run_id: pipeline.id,
                input_id: "t".into(),
                module_name: "stats".into(),
                module_version: "v".into(),
                module_config_hash: "c".into(),
                module_input_hash: "i".into(),
                is_cacheable: true,
                cache_reason: None,
                replaces_module_run_id: None,
            })
            .await
            .unwrap();

        let declared = vec![ArtifactDescriptor::new(module_dir.join("notes.txt")).with_role(ArtifactRole::Primary)];
        let registry = ArtifactRegistry::new(Arc::clone(&store));
        let records = registry.register(&run, root, &module_dir, &declared).await.unwrap();

        assert_eq!(records.len(), 3);
        let primary: Vec<&str> = records
            .iter()
            .filter(|r| r.role == ArtifactRole::Primary)
            .map(|r| r.key.as_str())
            .collect();
        assert_eq!(primary, vec!["stats/data/global/summary.json", "stats/notes.txt"]);
        assert!(registry.primaries_intact(run.id).await.unwrap());

        std::fs::remove_file(module_dir.join("notes.txt")).unwrap();
        assert!(!registry.primaries_intact(run.id).await.unwrap());
    }
}
