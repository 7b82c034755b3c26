// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Artifact integrity verification
//!
//! Compares the artifact records of one input with what is on disk.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use super::artifacts::scan_files;
use super::hash::hash_file;
use crate::errors::ConvoflowResult;
use crate::store::{ArtifactRecord, RunStore};

/// Directory under the output root holding plans and summaries
pub const META_DIR: &str = ".convoflow";

/// Findings of an integrity check
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    /// Distinct keys checked
    pub checked: usize,
    /// Recorded files that are gone
    pub missing: Vec<String>,
    /// Recorded files whose bytes changed
    pub mismatched: Vec<String>,
    /// Files on disk that no record mentions
    pub orphans: Vec<PathBuf>,
    /// Keys recorded more than once by a single module run
    pub duplicate_keys: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
            && self.mismatched.is_empty()
            && self.orphans.is_empty()
            && self.duplicate_keys.is_empty()
    }
}

/// Verify every artifact recorded for `input_id` below `output_root`
///
/// Each key is checked against its most recent record; older records of the
/// same key describe files that later runs rewrote.
pub async fn verify_artifacts(
    store: &dyn RunStore,
    input_id: &str,
    output_root: &Path,
) -> ConvoflowResult<IntegrityReport> {
    let records: Vec<ArtifactRecord> = store
        .artifacts_for_input(input_id)
        .await?
        .into_iter()
        .filter(|a| a.root == output_root)
        .collect();

    let mut report = IntegrityReport::default();
    let mut per_run: BTreeSet<(u64, &str)> = BTreeSet::new();
    let mut latest: BTreeMap<&str, &ArtifactRecord> = BTreeMap::new();

    for record in &records {
        if !per_run.insert((record.module_run_id, record.key.as_str())) {
            report.duplicate_keys.push(record.key.clone());
        }
        let newer = latest.get(record.key.as_str()).map_or(true, |r| r.id < record.id);
        if newer {
            latest.insert(record.key.as_str(), record);
        }
    }

    report.checked = latest.len();
    for (key, record) in &latest {
        let path = record.path();
        if !path.is_file() {
            report.missing.push(key.to_string());
        } else if hash_file(&path)? != record.content_hash {
            report.mismatched.push(key.to_string());
        }
    }

    let meta = output_root.join(META_DIR);
    let known: BTreeSet<PathBuf> = latest.values().map(|r| r.path()).collect();
    report.orphans = scan_files(output_root)?
        .into_iter()
        .filter(|p| !p.starts_with(&meta) && !known.contains(p))
        .collect();

    report.duplicate_keys.sort();
    report.duplicate_keys.dedup();

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ArtifactRole, MemoryStore, NewArtifact, NewModuleRun, NewPipelineRun};
    use tempfile::TempDir;

    async fn seed(store: &MemoryStore, root: &Path, files: &[(&str, &str)]) {
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

        for (key, content) in files {
            let path = root.join(key);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
            store
                .create_artifact(NewArtifact {
                    module_run_id: run.id,
                    input_id: "t".into(),
                    key: key.to_string(),
                    root: root.to_path_buf(),
                    artifact_type: None,
                    role: ArtifactRole::Primary,
                    content_hash: hash_file(&path).unwrap(),
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn clean_outputs_verify() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        seed(&store, dir.path(), &[("stats/data/global/a.json", "{}")]).await;
        std::fs::create_dir_all(dir.path().join(META_DIR)).unwrap();
        std::fs::write(dir.path().join(META_DIR).join("run_summary.json"), "{}").unwrap();

        let report = verify_artifacts(&store, "t", dir.path()).await.unwrap();
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.checked, 1);
    }

    #[tokio::test]
    async fn detects_missing_changed_and_orphaned_files() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        seed(
            &store,
            dir.path(),
            &[("stats/data/global/a.json", "{}"), ("stats/data/global/b.json", "{}")],
        )
        .await;

        std::fs::remove_file(dir.path().join("stats/data/global/a.json")).unwrap();
        std::fs::write(dir.path().join("stats/data/global/b.json"), "{\"edited\":1}").unwrap();
        std::fs::write(dir.path().join("stats/stray.txt"), "?").unwrap();

        let report = verify_artifacts(&store, "t", dir.path()).await.unwrap();
        assert_eq!(report.missing, vec!["stats/data/global/a.json"]);
        assert_eq!(report.mismatched, vec!["stats/data/global/b.json"]);
        assert_eq!(report.orphans, vec![dir.path().join("stats/stray.txt")]);
    }

    #[tokio::test]
    async fn newest_record_of_a_key_is_authoritative() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        seed(&store, dir.path(), &[("stats/data/global/a.json", "old")]).await;
        seed(&store, dir.path(), &[("stats/data/global/a.json", "new")]).await;

        let report = verify_artifacts(&store, "t", dir.path()).await.unwrap();
        assert!(report.is_clean(), "{:?}", report);
    }
}
