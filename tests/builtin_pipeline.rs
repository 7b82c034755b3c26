// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

mod common;

use std::sync::Arc;

use common::{transcript_json, write_transcript};
use convoflow::cache::verify_artifacts;
use convoflow::config::RunConfig;
use convoflow::input::Transcript;
use convoflow::modules::ModuleSet;
use convoflow::pipeline::{ExecutionOptions, PipelineExecutor, RunOutcome};
use convoflow::registry::Registry;
use convoflow::store::{FilesystemStore, RunStore};
use serde_json::json;
use tempfile::TempDir;

fn executor(store: Arc<dyn RunStore>, config: RunConfig) -> PipelineExecutor {
    PipelineExecutor::new(
        Arc::new(Registry::builtin().unwrap()),
        ModuleSet::builtin(),
        store,
        config,
    )
}

fn options(dir: &TempDir) -> ExecutionOptions {
    ExecutionOptions {
        output_root: Some(dir.path().join("out")),
        quiet: true,
        ..ExecutionOptions::default()
    }
}

#[tokio::test]
async fn default_selection_runs_every_builtin_module() {
    let dir = TempDir::new().unwrap();
    let transcript = write_transcript(dir.path(), "standup.json", &transcript_json());
    let store: Arc<dyn RunStore> = Arc::new(FilesystemStore::open(dir.path().join("store")).unwrap());
    let executor = executor(Arc::clone(&store), RunConfig::default());

    let summary = executor.execute(&transcript, &options(&dir)).await.unwrap();

    assert_eq!(summary.status, RunOutcome::Completed, "{:?}", summary.errors);
    assert_eq!(
        summary.execution_order,
        vec!["pauses", "stats", "transcript_output", "momentum", "moments"]
    );
    assert_eq!(summary.modules_run, summary.execution_order);

    let out = dir.path().join("out");
    assert!(out.join("stats/data/speakers/Alice.json").is_file());
    assert!(out.join("stats/data/global/summary.json").is_file());
    assert!(out.join("pauses/data/global/pauses.json").is_file());
    assert!(out.join("moments/data/global/moments.json").is_file());

    let export = std::fs::read_to_string(out.join("transcript_output/exports/standup.txt")).unwrap();
    assert!(export.contains("Alice: Thanks for joining today."));

    let input_id = Transcript::load(&transcript).unwrap().input_id();
    let report = verify_artifacts(store.as_ref(), &input_id, &out).await.unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert!(report.checked >= 6);
}

#[tokio::test]
async fn changing_one_module_config_recomputes_only_its_branch() {
    let dir = TempDir::new().unwrap();
    let transcript = write_transcript(dir.path(), "standup.json", &transcript_json());
    let store: Arc<dyn RunStore> = Arc::new(FilesystemStore::open(dir.path().join("store")).unwrap());

    executor(Arc::clone(&store), RunConfig::default())
        .execute(&transcript, &options(&dir))
        .await
        .unwrap();

    let config = RunConfig::from_toml(
        r#"
        [modules.pauses]
        min_gap_seconds = 3.0
        "#,
    )
    .unwrap();
    let summary = executor(Arc::clone(&store), config)
        .execute(&transcript, &options(&dir))
        .await
        .unwrap();

    assert_eq!(summary.status, RunOutcome::Completed);
    assert_eq!(&summary.cache_hits[..2], &["stats", "transcript_output"]);
    assert!(!summary.cache_hits.contains(&"pauses".to_string()));
    assert!(!summary.cache_hits.contains(&"momentum".to_string()));
    assert_eq!(summary.module_results["pauses"]["min_gap_seconds"], json!(3.0));
}

#[tokio::test]
async fn reopened_store_serves_cached_results() {
    let dir = TempDir::new().unwrap();
    let transcript = write_transcript(dir.path(), "standup.json", &transcript_json());
    let store_dir = dir.path().join("store");

    {
        let store: Arc<dyn RunStore> = Arc::new(FilesystemStore::open(&store_dir).unwrap());
        executor(store, RunConfig::default())
            .execute(&transcript, &options(&dir))
            .await
            .unwrap();
    }

    let store: Arc<dyn RunStore> = Arc::new(FilesystemStore::open(&store_dir).unwrap());
    let summary = executor(Arc::clone(&store), RunConfig::default())
        .execute(&transcript, &options(&dir))
        .await
        .unwrap();

    assert_eq!(summary.cache_hits, summary.execution_order);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.pipeline_runs, 2);
    assert_eq!(stats.completed_pipeline_runs, 2);
    assert_eq!(stats.module_runs, 10);
    assert_eq!(stats.cacheable_module_runs, 5);
}

#[tokio::test]
async fn invalidating_a_module_recomputes_it() {
    let dir = TempDir::new().unwrap();
    let transcript = write_transcript(dir.path(), "standup.json", &transcript_json());
    let store: Arc<dyn RunStore> = Arc::new(FilesystemStore::open(dir.path().join("store")).unwrap());
    let executor = executor(Arc::clone(&store), RunConfig::default());

    executor.execute(&transcript, &options(&dir)).await.unwrap();
    let superseded = store.supersede_module("stats", None).await.unwrap();
    assert_eq!(superseded, 1);

    let summary = executor.execute(&transcript, &options(&dir)).await.unwrap();
    assert!(!summary.cache_hits.contains(&"stats".to_string()));
    // Stats output is unchanged, so the export still hits
    assert!(summary.cache_hits.contains(&"transcript_output".to_string()));
}

#[tokio::test]
async fn anonymous_speakers_halt_when_names_are_required() {
    let dir = TempDir::new().unwrap();
    let transcript = write_transcript(
        dir.path(),
        "diarized.json",
        &json!({
            "segments": [
                {"speaker": "SPEAKER_00", "text": "Hello there.", "start": 0.0, "end": 1.0},
                {"speaker": "SPEAKER_01", "text": "Hi.", "start": 1.5, "end": 2.0}
            ]
        }),
    );
    let config = RunConfig::from_toml(
        r#"
        [modules.stats]
        require_named_speakers = true
        "#,
    )
    .unwrap();
    let summary = executor(Arc::new(convoflow::store::MemoryStore::new()), config)
        .execute(&transcript, &options(&dir))
        .await
        .unwrap();

    assert_eq!(summary.status, RunOutcome::Failed);
    assert_eq!(summary.halted_by.as_deref(), Some("stats"));
    assert_eq!(summary.modules_run, vec!["pauses"]);
    assert_eq!(summary.modules_failed, vec!["stats"]);
    assert!(summary.errors[0].contains("speaker identification required"));
}

#[tokio::test]
async fn untimed_transcript_skips_time_based_modules() {
    let dir = TempDir::new().unwrap();
    let transcript = write_transcript(
        dir.path(),
        "notes.json",
        &json!({
            "segments": [
                {"speaker": "Alice", "text": "No timestamps here."},
                {"speaker": "Bob", "text": "None at all."}
            ]
        }),
    );
    let summary = executor(Arc::new(convoflow::store::MemoryStore::new()), RunConfig::default())
        .execute(&transcript, &options(&dir))
        .await
        .unwrap();

    assert_eq!(summary.modules_run, vec!["stats", "transcript_output"]);
    let skipped: Vec<&str> = summary.skipped_modules.iter().map(|s| s.module.as_str()).collect();
    assert!(skipped.contains(&"pauses"));
    // momentum never reaches the gate because pauses produced nothing
    assert!(summary.errors.iter().any(|e| e.starts_with("momentum: Missing dependencies [pauses]")));
    assert_eq!(summary.status, RunOutcome::Failed);
}
