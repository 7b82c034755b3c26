// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

mod common;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{transcript_json, write_transcript, Behavior, Counting};
use convoflow::config::RunConfig;
use convoflow::modules::ModuleSet;
use convoflow::pipeline::{ExecutionOptions, ExecutionPlan, PipelineExecutor, RunOutcome, RunSummary};
use convoflow::registry::{
    Capabilities, Category, GateDecision, ModuleSpec, Registry, Requirement, RequirementsGate,
};
use convoflow::store::{
    ArtifactRecord, MemoryStore, ModuleRun, ModuleRunCompletion, NewArtifact, NewModuleRun,
    NewPipelineRun, PipelineRun, RunStatus, RunStore, StoreStats,
};
use convoflow::ConvoflowError;
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    transcript: PathBuf,
    store: Arc<dyn RunStore>,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let transcript = write_transcript(dir.path(), "meeting.json", &transcript_json());
        Self {
            dir,
            transcript,
            store: Arc::new(MemoryStore::new()),
        }
    }

    fn out(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn executor(&self, registry: &Arc<Registry>, modules: ModuleSet, config: RunConfig) -> PipelineExecutor {
        PipelineExecutor::new(Arc::clone(registry), modules, Arc::clone(&self.store), config)
    }

    fn options(&self, modules: &[&str]) -> ExecutionOptions {
        ExecutionOptions {
            modules: modules.iter().map(|m| m.to_string()).collect(),
            output_root: Some(self.out()),
            no_cache: false,
            quiet: true,
        }
    }

    async fn run(&self, executor: &PipelineExecutor, modules: &[&str]) -> RunSummary {
        executor.execute(&self.transcript, &self.options(modules)).await.unwrap()
    }
}

fn chain_registry() -> Arc<Registry> {
    Arc::new(
        Registry::builder()
            .register(ModuleSpec::new("pauses", Category::Light))
            .register(ModuleSpec::new("momentum", Category::Medium).depends_on(&["pauses"]))
            .register(ModuleSpec::new("moments", Category::Heavy).depends_on(&["momentum"]))
            .finalize()
            .unwrap(),
    )
}

struct Chain {
    pauses: Counting,
    momentum: Counting,
    moments: Counting,
}

impl Chain {
    fn new() -> Self {
        Self {
            pauses: Counting::new("pauses"),
            momentum: Counting::new("momentum"),
            moments: Counting::new("moments"),
        }
    }

    fn set(&self) -> ModuleSet {
        ModuleSet::new()
            .with(self.pauses.clone())
            .with(self.momentum.clone())
            .with(self.moments.clone())
    }

    fn calls(&self) -> [usize; 3] {
        [self.pauses.calls(), self.momentum.calls(), self.moments.calls()]
    }
}

#[tokio::test]
async fn identical_rerun_hits_cache_without_invoking_modules() {
    let h = Harness::new();
    let chain = Chain::new();
    let executor = h.executor(&chain_registry(), chain.set(), RunConfig::default());

    let first = h.run(&executor, &["moments"]).await;
    assert_eq!(first.status, RunOutcome::Completed);
    assert_eq!(first.execution_order, vec!["pauses", "momentum", "moments"]);
    assert!(first.cache_hits.is_empty());
    assert_eq!(chain.calls(), [1, 1, 1]);

    let second = h.run(&executor, &["moments"]).await;
    assert_eq!(second.status, RunOutcome::Completed);
    assert_eq!(second.cache_hits, vec!["pauses", "momentum", "moments"]);
    assert_eq!(chain.calls(), [1, 1, 1]);
    assert_eq!(second.module_results, first.module_results);
    assert_ne!(second.pipeline_run_id, first.pipeline_run_id);
}

#[tokio::test]
async fn selecting_a_dependency_explicitly_resolves_identically() {
    let h = Harness::new();
    let chain = Chain::new();
    let executor = h.executor(&chain_registry(), chain.set(), RunConfig::default());

    let (only_leaf, _) = executor.plan(&h.options(&["moments"])).unwrap();
    let (with_root, _) = executor.plan(&h.options(&["pauses", "moments"])).unwrap();
    assert_eq!(only_leaf.order, with_root.order);
}

#[tokio::test]
async fn deleted_primary_artifact_forces_recompute() {
    let h = Harness::new();
    let chain = Chain::new();
    let executor = h.executor(&chain_registry(), chain.set(), RunConfig::default());

    h.run(&executor, &["moments"]).await;
    std::fs::remove_file(h.out().join("pauses/data/global/pauses.json")).unwrap();

    let second = h.run(&executor, &["moments"]).await;
    assert_eq!(chain.pauses.calls(), 2);
    // Recomputed output is byte-identical, so dependents keep their keys
    assert_eq!(second.cache_hits, vec!["momentum", "moments"]);
    assert!(h.out().join("pauses/data/global/pauses.json").exists());

    let stats = h.store.stats().await.unwrap();
    assert_eq!(stats.superseded_module_runs, 1);
}

#[tokio::test]
async fn bumping_module_version_forces_a_miss() {
    let h = Harness::new();
    let registry = Arc::new(
        Registry::builder()
            .register(ModuleSpec::new("stats", Category::Light))
            .finalize()
            .unwrap(),
    );
    let counter = Arc::new(AtomicUsize::new(0));
    let run_with = |version: &'static str| {
        h.executor(
            &registry,
            ModuleSet::new().with(Counting::new("stats").version(version).sharing(&counter)),
            RunConfig::default(),
        )
    };

    h.run(&run_with("1"), &["stats"]).await;
    h.run(&run_with("1"), &["stats"]).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let bumped = h.run(&run_with("2"), &["stats"]).await;
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(bumped.cache_hits.is_empty());
}

#[tokio::test]
async fn no_cache_executes_again() {
    let h = Harness::new();
    let chain = Chain::new();
    let executor = h.executor(&chain_registry(), chain.set(), RunConfig::default());

    h.run(&executor, &["pauses"]).await;
    let mut options = h.options(&["pauses"]);
    options.no_cache = true;
    let second = executor.execute(&h.transcript, &options).await.unwrap();

    assert_eq!(chain.pauses.calls(), 2);
    assert!(second.cache_hits.is_empty());
}

fn failure_registry() -> Arc<Registry> {
    Arc::new(
        Registry::builder()
            .register(ModuleSpec::new("a", Category::Light))
            .register(ModuleSpec::new("b", Category::Light))
            .register(ModuleSpec::new("c", Category::Light).depends_on(&["a"]))
            .register(ModuleSpec::new("d", Category::Light).depends_on(&["c"]))
            .finalize()
            .unwrap(),
    )
}

#[tokio::test]
async fn failure_is_isolated_and_dependents_are_skipped() {
    let h = Harness::new();
    let a = Counting::new("a").behave(Behavior::Fail("division by zero"));
    let b = Counting::new("b");
    let c = Counting::new("c");
    let d = Counting::new("d");
    let modules = ModuleSet::new()
        .with(a.clone())
        .with(b.clone())
        .with(c.clone())
        .with(d.clone());
    let executor = h.executor(&failure_registry(), modules, RunConfig::default());

    let summary = h.run(&executor, &["a", "b", "c", "d"]).await;

    assert_eq!(summary.execution_order, vec!["a", "b", "c", "d"]);
    assert_eq!(summary.modules_failed, vec!["a"]);
    assert_eq!(summary.modules_run, vec!["b"]);
    assert_eq!((a.calls(), b.calls(), c.calls(), d.calls()), (1, 1, 0, 0));
    assert!(summary.halted_by.is_none());
    assert_eq!(summary.status, RunOutcome::Failed);

    assert_eq!(summary.errors[0], "Error in a analysis: division by zero");
    assert_eq!(summary.errors[1], "c: Missing dependencies [a]");
    assert_eq!(
        summary.errors[2],
        "d: Missing dependencies [c] (c (which requires [a]))"
    );

    let skipped: Vec<&str> = summary.skipped_modules.iter().map(|s| s.module.as_str()).collect();
    assert_eq!(skipped, vec!["c", "d"]);
}

#[tokio::test]
async fn failed_modules_are_never_served_from_cache() {
    let h = Harness::new();
    let a = Counting::new("a").behave(Behavior::Fail("flaky"));
    let executor = h.executor(&failure_registry(), ModuleSet::new().with(a.clone()), RunConfig::default());

    h.run(&executor, &["a"]).await;
    let second = h.run(&executor, &["a"]).await;

    assert_eq!(a.calls(), 2);
    assert!(second.cache_hits.is_empty());
}

#[tokio::test]
async fn fail_fast_signature_halts_the_run() {
    let h = Harness::new();
    let a = Counting::new("a").behave(Behavior::Fail("No speaker map found for this transcript"));
    let b = Counting::new("b");
    let executor = h.executor(
        &failure_registry(),
        ModuleSet::new().with(a.clone()).with(b.clone()),
        RunConfig::default(),
    );

    let summary = h.run(&executor, &["a", "b"]).await;

    assert_eq!(b.calls(), 0);
    assert_eq!(summary.halted_by.as_deref(), Some("a"));
    assert_eq!(summary.status, RunOutcome::Failed);
    assert!(summary.modules_run.is_empty());
}

#[tokio::test]
async fn reported_error_status_is_a_fault() {
    let h = Harness::new();
    let a = Counting::new("a").behave(Behavior::Report("window too small"));
    let b = Counting::new("b");
    let executor = h.executor(
        &failure_registry(),
        ModuleSet::new().with(a.clone()).with(b.clone()),
        RunConfig::default(),
    );

    let summary = h.run(&executor, &["a", "b"]).await;
    assert_eq!(summary.modules_failed, vec!["a"]);
    assert_eq!(summary.modules_run, vec!["b"]);
    assert!(summary.halted_by.is_none());

    let halting = Counting::new("a").behave(Behavior::Report("Speaker identification is required"));
    let b = Counting::new("b");
    let executor = h.executor(
        &failure_registry(),
        ModuleSet::new().with(halting).with(b.clone()),
        RunConfig::default(),
    );
    let summary = h.run(&executor, &["a", "b"]).await;
    assert_eq!(summary.halted_by.as_deref(), Some("a"));
    assert_eq!(b.calls(), 0);
}

#[tokio::test]
async fn unmet_requirements_skip_without_error() {
    let h = Harness::new();
    let registry = Arc::new(
        Registry::builder()
            .register(ModuleSpec::new("acoustics", Category::Heavy).requires(Requirement::Audio))
            .register(ModuleSpec::new("beta", Category::Light).feature("beta"))
            .register(ModuleSpec::new("stats", Category::Light).requires(Requirement::Segments))
            .finalize()
            .unwrap(),
    );
    let acoustics = Counting::new("acoustics");
    let beta = Counting::new("beta");
    let modules = ModuleSet::new()
        .with(acoustics.clone())
        .with(beta.clone())
        .with(Counting::new("stats"));

    let executor = h.executor(&registry, modules.clone(), RunConfig::default());
    let summary = h.run(&executor, &["acoustics", "beta", "stats"]).await;

    assert_eq!(summary.status, RunOutcome::Completed);
    assert!(summary.errors.is_empty());
    assert_eq!(summary.modules_run, vec!["stats"]);
    assert_eq!(acoustics.calls(), 0);
    assert_eq!(beta.calls(), 0);

    let reasons: Vec<&str> = summary.skipped_modules.iter().map(|s| s.reason.as_str()).collect();
    assert!(reasons.contains(&"requires audio"));
    assert!(reasons.contains(&"feature 'beta' is not enabled"));

    let mut config = RunConfig::default();
    config.pipeline.features = vec!["beta".into()];
    let executor = h.executor(&registry, modules, config);
    h.run(&executor, &["beta"]).await;
    assert_eq!(beta.calls(), 1);
}

struct Maintenance;

impl RequirementsGate for Maintenance {
    fn evaluate(&self, spec: &ModuleSpec, _: &Capabilities) -> GateDecision {
        if spec.category == Category::Heavy {
            GateDecision::skip(vec!["heavy modules are paused".into()])
        } else {
            GateDecision::proceed()
        }
    }
}

#[tokio::test]
async fn custom_gate_replaces_capability_checks() {
    let h = Harness::new();
    let chain = Chain::new();
    let executor = h
        .executor(&chain_registry(), chain.set(), RunConfig::default())
        .with_gate(Maintenance);

    let summary = h.run(&executor, &["moments"]).await;

    assert_eq!(summary.modules_run, vec!["pauses", "momentum"]);
    assert_eq!(summary.skipped_modules[0].reason, "heavy modules are paused");
    assert_eq!(summary.status, RunOutcome::Completed);
    assert_eq!(chain.moments.calls(), 0);
}

#[tokio::test]
async fn timeouts_are_enforced() {
    let h = Harness::new();
    let registry = Arc::new(
        Registry::builder()
            .register(ModuleSpec::new("slow", Category::Heavy).timeout(1))
            .register(ModuleSpec::new("fast", Category::Light))
            .finalize()
            .unwrap(),
    );
    let modules = ModuleSet::new()
        .with(Counting::new("slow").behave(Behavior::Sleep(Duration::from_secs(3))))
        .with(Counting::new("fast"));
    let executor = h.executor(&registry, modules, RunConfig::default());

    let summary = h.run(&executor, &["slow", "fast"]).await;

    assert_eq!(summary.modules_run, vec!["fast"]);
    assert_eq!(summary.modules_failed, vec!["slow"]);
    assert!(summary.errors[0].contains("timeout budget of 1s"), "{:?}", summary.errors);
    assert!(summary.halted_by.is_none());
}

#[tokio::test]
async fn blocking_module_is_cut_off_at_its_budget() {
    let h = Harness::new();
    let registry = Arc::new(
        Registry::builder()
            .register(ModuleSpec::new("busy", Category::Heavy).timeout(1))
            .register(ModuleSpec::new("fast", Category::Light))
            .finalize()
            .unwrap(),
    );
    let modules = ModuleSet::new()
        .with(Counting::new("busy").behave(Behavior::Block(Duration::from_secs(3))))
        .with(Counting::new("fast"));
    let executor = h.executor(&registry, modules, RunConfig::default());

    let clock = Instant::now();
    let summary = h.run(&executor, &["busy", "fast"]).await;
    let elapsed = clock.elapsed();

    assert!(elapsed < Duration::from_millis(2500), "run took {:?}", elapsed);
    assert_eq!(summary.modules_failed, vec!["busy"]);
    assert_eq!(summary.modules_run, vec!["fast"]);
    assert!(summary.errors[0].contains("timeout budget of 1s"), "{:?}", summary.errors);
}

#[tokio::test]
async fn panicking_module_fails_only_itself() {
    let h = Harness::new();
    let a = Counting::new("a").behave(Behavior::Panic("index out of bounds"));
    let b = Counting::new("b");
    let executor = h.executor(
        &failure_registry(),
        ModuleSet::new().with(a).with(b.clone()),
        RunConfig::default(),
    );

    let summary = h.run(&executor, &["a", "b"]).await;

    assert_eq!(summary.modules_failed, vec!["a"]);
    assert_eq!(summary.modules_run, vec!["b"]);
    assert_eq!(b.calls(), 1);
    assert!(summary.halted_by.is_none());
    assert!(
        summary.errors[0].contains("panicked: index out of bounds"),
        "{:?}",
        summary.errors
    );
}

#[derive(Clone, Copy, PartialEq)]
enum Reject {
    Artifacts,
    ModuleRuns,
}

/// Memory store that refuses one kind of write
struct FlakyStore {
    inner: MemoryStore,
    reject: Reject,
}

impl FlakyStore {
    fn new(reject: Reject) -> Self {
        Self {
            inner: MemoryStore::new(),
            reject,
        }
    }

    fn refuse(&self, kind: Reject) -> Result<(), ConvoflowError> {
        if self.reject == kind {
            Err(ConvoflowError::store("disk full"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RunStore for FlakyStore {
    async fn create_pipeline_run(&self, new: NewPipelineRun) -> Result<PipelineRun, ConvoflowError> {
        self.inner.create_pipeline_run(new).await
    }

    async fn find_latest_completed_pipeline_run(
        &self,
        input_id: &str,
        pipeline_input_hash: &str,
    ) -> Result<Option<PipelineRun>, ConvoflowError> {
        self.inner
            .find_latest_completed_pipeline_run(input_id, pipeline_input_hash)
            .await
    }

    async fn update_pipeline_status(&self, id: u64, status: RunStatus) -> Result<(), ConvoflowError> {
        self.inner.update_pipeline_status(id, status).await
    }

    async fn create_module_run(&self, new: NewModuleRun) -> Result<ModuleRun, ConvoflowError> {
        self.refuse(Reject::ModuleRuns)?;
        self.inner.create_module_run(new).await
    }

    async fn find_cacheable_module_run(
        &self,
        input_id: &str,
        module_name: &str,
        module_version: &str,
        module_input_hash: &str,
    ) -> Result<Option<ModuleRun>, ConvoflowError> {
        self.inner
            .find_cacheable_module_run(input_id, module_name, module_version, module_input_hash)
            .await
    }

    async fn complete_module_run(
        &self,
        id: u64,
        completion: ModuleRunCompletion,
    ) -> Result<ModuleRun, ConvoflowError> {
        self.inner.complete_module_run(id, completion).await
    }

    async fn mark_superseded(&self, id: u64, at: DateTime<Utc>) -> Result<(), ConvoflowError> {
        self.inner.mark_superseded(id, at).await
    }

    async fn supersede_module(
        &self,
        module_name: &str,
        input_id: Option<&str>,
    ) -> Result<usize, ConvoflowError> {
        self.inner.supersede_module(module_name, input_id).await
    }

    async fn module_runs_for_pipeline(&self, pipeline_run_id: u64) -> Result<Vec<ModuleRun>, ConvoflowError> {
        self.inner.module_runs_for_pipeline(pipeline_run_id).await
    }

    async fn create_artifact(&self, new: NewArtifact) -> Result<ArtifactRecord, ConvoflowError> {
        self.refuse(Reject::Artifacts)?;
        self.inner.create_artifact(new).await
    }

    async fn primary_artifacts(&self, module_run_id: u64) -> Result<Vec<ArtifactRecord>, ConvoflowError> {
        self.inner.primary_artifacts(module_run_id).await
    }

    async fn artifacts_for_input(&self, input_id: &str) -> Result<Vec<ArtifactRecord>, ConvoflowError> {
        self.inner.artifacts_for_input(input_id).await
    }

    async fn stats(&self) -> Result<StoreStats, ConvoflowError> {
        self.inner.stats().await
    }
}

#[tokio::test]
async fn artifact_registration_failure_fails_the_module() {
    let mut h = Harness::new();
    let store = Arc::new(FlakyStore::new(Reject::Artifacts));
    h.store = Arc::clone(&store) as Arc<dyn RunStore>;
    let chain = Chain::new();
    let executor = h.executor(&chain_registry(), chain.set(), RunConfig::default());

    let summary = h.run(&executor, &["momentum"]).await;

    assert_eq!(summary.status, RunOutcome::Failed);
    assert_eq!(summary.modules_failed, vec!["pauses"]);
    assert!(summary.errors[0].contains("failed to record outputs"), "{:?}", summary.errors);
    assert_eq!(chain.momentum.calls(), 0);

    let ledger = store.inner.snapshot().await;
    assert!(ledger.module_runs.iter().all(|r| r.status == RunStatus::Failed));
    assert!(ledger.module_runs.iter().all(|r| !r.is_cacheable));
    assert_eq!(ledger.pipeline_runs[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn store_failure_still_closes_the_pipeline_run() {
    let mut h = Harness::new();
    let store = Arc::new(FlakyStore::new(Reject::ModuleRuns));
    h.store = Arc::clone(&store) as Arc<dyn RunStore>;
    let chain = Chain::new();
    let executor = h.executor(&chain_registry(), chain.set(), RunConfig::default());

    let err = executor
        .execute(&h.transcript, &h.options(&["pauses"]))
        .await
        .unwrap_err();

    assert!(matches!(err, ConvoflowError::Store { .. }));
    assert_eq!(chain.pauses.calls(), 0);
    let ledger = store.inner.snapshot().await;
    assert_eq!(ledger.pipeline_runs.len(), 1);
    assert_eq!(ledger.pipeline_runs[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn reuse_mode_trusts_a_completed_run() {
    let h = Harness::new();
    let chain = Chain::new();
    let mut config = RunConfig::default();
    config.pipeline.reuse_existing_run = true;
    let executor = h.executor(&chain_registry(), chain.set(), config);

    let first = h.run(&executor, &["moments"]).await;
    let second = h.run(&executor, &["moments"]).await;

    assert_eq!(second.status, RunOutcome::Reused);
    assert_eq!(second.pipeline_run_id, first.pipeline_run_id);
    assert_eq!(second.modules_run, first.modules_run);
    assert_eq!(second.module_results, first.module_results);
    assert_eq!(chain.calls(), [1, 1, 1]);
}

#[tokio::test]
async fn missing_implementation_fails_only_that_branch() {
    let h = Harness::new();
    let registry = Arc::new(
        Registry::builder()
            .register(ModuleSpec::new("ghost", Category::Light))
            .register(ModuleSpec::new("after", Category::Light).depends_on(&["ghost"]))
            .register(ModuleSpec::new("stats", Category::Light))
            .finalize()
            .unwrap(),
    );
    let modules = ModuleSet::new().with(Counting::new("after")).with(Counting::new("stats"));
    let executor = h.executor(&registry, modules, RunConfig::default());

    let (_, plan) = executor.plan(&h.options(&["after", "stats"])).unwrap();
    assert_eq!(plan.missing_dependencies, vec!["ghost"]);

    let summary = h.run(&executor, &["after", "stats"]).await;
    assert_eq!(summary.modules_run, vec!["stats"]);
    assert!(summary
        .errors
        .contains(&"Error in ghost analysis: no implementation is registered".to_string()));
    assert!(summary.errors.contains(&"after: Missing dependencies [ghost]".to_string()));
}

#[tokio::test]
async fn plan_and_summary_are_written_next_to_outputs() {
    let h = Harness::new();
    let chain = Chain::new();
    let executor = h.executor(&chain_registry(), chain.set(), RunConfig::default());

    let summary = h.run(&executor, &["momentum", "unheard_of"]).await;

    assert_eq!(summary.skipped_modules[0].module, "unheard_of");
    assert_eq!(summary.skipped_modules[0].reason, "unknown module");
    assert_eq!(summary.modules_run, vec!["pauses", "momentum"]);

    let plan: ExecutionPlan = serde_json::from_str(
        &std::fs::read_to_string(ExecutionPlan::path(&h.out())).unwrap(),
    )
    .unwrap();
    assert_eq!(plan.modules_added_as_dependencies, vec!["pauses"]);
    assert_eq!(plan.skipped_modules, vec!["unheard_of"]);

    let saved = RunSummary::load(&h.out()).unwrap();
    assert_eq!(saved.pipeline_run_id, summary.pipeline_run_id);
    assert_eq!(saved.modules_run, summary.modules_run);
}

#[tokio::test]
async fn missing_transcript_is_a_validation_error() {
    let h = Harness::new();
    let chain = Chain::new();
    let executor = h.executor(&chain_registry(), chain.set(), RunConfig::default());

    let err = executor
        .execute(&h.dir.path().join("absent.json"), &h.options(&["pauses"]))
        .await
        .unwrap_err();
    assert!(matches!(err, convoflow::ConvoflowError::Validation { .. }));
    assert_eq!(chain.pauses.calls(), 0);
}
