// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Pipeline executor
//!
//! Runs the resolved modules of one transcript in order, consulting the
//! module run cache before every execution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use colored::Colorize;
use serde_json::Value;

use super::context::{ModuleContext, PipelineContext};
use super::plan::ExecutionPlan;
use super::resolve::{DependencyResolver, Resolution};
use super::summary::{RunOutcome, RunSummary};
use super::validation::PipelineValidator;
use crate::cache::{
    output_fingerprint, CacheLookup, ModuleCacheKey, ModuleRunCache, PipelineRunCoordinator,
    RunStart,
};
use crate::config::RunConfig;
use crate::errors::{ConvoflowError, ConvoflowResult};
use crate::input::{default_output_root, Transcript};
use crate::modules::{module_version, AnalysisModule, ModuleOutput, ModuleSet};
use crate::registry::{CapabilityGate, Registry, RequirementsGate};
use crate::store::{ModuleRun, PipelineRun, RunStatus, RunStore};

/// Recorded on every pipeline run
pub const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Per-invocation options
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Overrides the configured selection
    pub modules: Vec<String>,
    /// Overrides the configured output location
    pub output_root: Option<PathBuf>,
    /// Skip cache lookups
    pub no_cache: bool,
    /// No progress lines on stdout
    pub quiet: bool,
}

struct ModuleFault {
    error: ConvoflowError,
    fail_fast: bool,
}

/// Pipeline executor
pub struct PipelineExecutor {
    registry: Arc<Registry>,
    modules: ModuleSet,
    store: Arc<dyn RunStore>,
    gate: Arc<dyn RequirementsGate>,
    config: RunConfig,
}

impl PipelineExecutor {
    pub fn new(
        registry: Arc<Registry>,
        modules: ModuleSet,
        store: Arc<dyn RunStore>,
        config: RunConfig,
    ) -> Self {
        Self {
            registry,
            modules,
            store,
            gate: Arc::new(CapabilityGate),
            config,
        }
    }

    /// Replace the requirements gate
    pub fn with_gate(mut self, gate: impl RequirementsGate + 'static) -> Self {
        self.gate = Arc::new(gate);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Modules to request: options, then config, then registry defaults
    pub fn selection(&self, options: &ExecutionOptions) -> Vec<String> {
        if !options.modules.is_empty() {
            options.modules.clone()
        } else if !self.config.pipeline.modules.is_empty() {
            self.config.pipeline.modules.clone()
        } else {
            self.registry.default_modules()
        }
    }

    /// Resolve the selection into a plan without running anything
    pub fn plan(&self, options: &ExecutionOptions) -> ConvoflowResult<(Resolution, ExecutionPlan)> {
        let resolution = DependencyResolver::new(&self.registry).resolve(&self.selection(options))?;
        let plan = ExecutionPlan::build(&self.registry, &resolution, &self.modules);
        Ok((resolution, plan))
    }

    /// Absolute output root for a transcript
    pub fn output_root(&self, transcript: &Path, options: &ExecutionOptions) -> ConvoflowResult<PathBuf> {
        let root = match (&options.output_root, &self.config.output.directory) {
            (Some(root), _) => root.clone(),
            (None, Some(base)) => {
                let stem = transcript
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "transcript".into());
                base.join(stem)
            }
            (None, None) => default_output_root(transcript),
        };

        if root.is_absolute() {
            Ok(root)
        } else {
            Ok(std::env::current_dir()?.join(root))
        }
    }

    /// Execute the pipeline against one transcript
    pub async fn execute(
        &self,
        transcript_path: &Path,
        options: &ExecutionOptions,
    ) -> ConvoflowResult<RunSummary> {
        let started = Utc::now();
        let output_root = self.output_root(transcript_path, options)?;
        PipelineValidator::validate_paths(transcript_path, &output_root)?;

        let (resolution, plan) = self.plan(options)?;
        plan.persist(&output_root).await?;

        let transcript = Transcript::load(transcript_path)?;
        let input_id = transcript.input_id();
        let content_hash = transcript.content_hash()?;
        let capabilities = transcript.capabilities(&self.config.pipeline.features);
        let config_hash = self.config.config_hash(&resolution.order)?;

        if !options.quiet {
            self.print_execution_plan(&transcript, &plan);
        }

        let mut summary = RunSummary::new(transcript.path(), &output_root, started);
        summary.modules_requested = plan.requested_modules.clone();
        summary.execution_order = plan.execution_order.clone();
        summary.warnings = plan.warnings.clone();
        for name in &plan.skipped_modules {
            summary.skip(name, "unknown module");
        }

        if self.config.pipeline.parallel {
            tracing::warn!(
                max_workers = self.config.pipeline.max_workers,
                "parallel execution is not available, running modules sequentially"
            );
            summary
                .warnings
                .push("parallel execution is not available; modules ran sequentially".into());
        }

        let coordinator = PipelineRunCoordinator::new(Arc::clone(&self.store), PIPELINE_VERSION);
        let run = match coordinator
            .start(&input_id, &content_hash, &config_hash, self.config.rerun_mode())
            .await?
        {
            RunStart::Reused(run) => {
                return self.replay(&coordinator, &run, summary, options).await;
            }
            RunStart::Fresh(run) => run,
        };
        summary.pipeline_run_id = Some(run.id);

        let mut cache = ModuleRunCache::new(Arc::clone(&self.store));
        if options.no_cache {
            cache = cache.without_lookups();
        }

        let mut ctx = PipelineContext::new(transcript);
        // Modules that produced a result this run, with their output hash
        let mut fingerprints: BTreeMap<String, String> = BTreeMap::new();
        // Modules skipped for missing dependencies, with what they lacked
        let mut blocked: BTreeMap<String, Vec<String>> = BTreeMap::new();

        // Store failures abort the loop; the run is still closed as failed below
        let looped = async {
            for module in &resolution.order {
                let Some(spec) = self.registry.get(module) else {
                    continue;
                };
                let dependencies = self.registry.effective_dependencies(module);

                let missing: Vec<String> = dependencies
                    .iter()
                    .filter(|d| !fingerprints.contains_key(*d))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    let chain = missing
                        .iter()
                        .map(|d| match blocked.get(d) {
                            Some(upstream) => format!("{} (which requires [{}])", d, upstream.join(", ")),
                            None => d.clone(),
                        })
                        .collect();
                    let err = ConvoflowError::MissingDependency {
                        module: module.clone(),
                        missing: missing.clone(),
                        chain,
                    };
                    tracing::warn!(module = %module, error = %err, "skipping module");
                    if !options.quiet {
                        println!("  {} {} {}", "⊘".yellow(), module.bold(), "(missing dependencies)".dimmed());
                    }
                    summary.errors.push(err.to_string());
                    summary.skip(module, err.to_string());
                    if !options.quiet {
                        print_recovery(&err);
                    }
                    blocked.insert(module.clone(), missing);
                    continue;
                }

                let decision = self.gate.evaluate(spec, &capabilities);
                if decision.skip {
                    tracing::info!(module = %module, reason = %decision.reason(), "requirements not met");
                    if !options.quiet {
                        println!("  {} {} {}", "⊘".yellow(), module.bold(), format!("({})", decision.reason()).dimmed());
                    }
                    summary.skip(module, decision.reason());
                    continue;
                }

                let Some(implementation) = self.modules.get(module) else {
                    let err = ConvoflowError::ModuleExecution {
                        module: module.clone(),
                        message: "no implementation is registered".into(),
                    };
                    tracing::error!(module = %module, "no implementation");
                    summary.errors.push(err.to_string());
                    summary.modules_failed.push(module.clone());
                    continue;
                };

                let version = module_version(implementation.as_ref())?;
                let section = self.config.module_config(module);
                let dependency_fingerprints: Vec<String> = dependencies
                    .iter()
                    .map(|d| fingerprints.get(d).cloned().unwrap_or_default())
                    .collect();
                let key = ModuleCacheKey::derive(
                    &input_id,
                    &content_hash,
                    module,
                    &version,
                    &implementation.cache_affecting_config(&section),
                    &dependency_fingerprints,
                )?;

                let module_run = match cache.begin(&run, &key).await? {
                    CacheLookup::Hit { run: hit, source } => {
                        let payload = hit.outputs.clone().unwrap_or(Value::Null);
                        ctx.store_result(module, payload.clone())?;
                        fingerprints.insert(module.clone(), hit.output_hash.clone().unwrap_or_default());
                        summary.cache_hits.push(module.clone());
                        summary.modules_run.push(module.clone());
                        summary.module_results.insert(module.clone(), payload);
                        tracing::info!(module = %module, source_run = source.id, "reused cached result");
                        if !options.quiet {
                            println!("  {} {} {}", "✓".green(), module.bold(), "(cached)".dimmed());
                        }
                        continue;
                    }
                    CacheLookup::Miss { run } => run,
                };

                let module_dir = output_root.join(module);
                let module_ctx = ModuleContext::new(ctx.snapshot(), module.clone(), module_dir.clone(), section);
                let clock = Instant::now();
                let outcome = self
                    .invoke(Arc::clone(&implementation), module_ctx, spec.timeout_seconds)
                    .await;
                let duration = clock.elapsed().as_secs_f64();

                let outcome = match outcome {
                    Ok(output) => record_outputs(
                        &cache,
                        &module_run,
                        &output_root,
                        &module_dir,
                        &version,
                        output,
                        duration,
                    )
                    .await
                    .map_err(|e| ModuleFault {
                        error: ConvoflowError::ModuleExecution {
                            module: module.clone(),
                            message: format!("failed to record outputs: {}", e),
                        },
                        fail_fast: false,
                    }),
                    Err(fault) => Err(fault),
                };

                match outcome {
                    Ok(recorded) => {
                        ctx.store_result(module, recorded.payload.clone())?;
                        fingerprints.insert(module.clone(), recorded.fingerprint);
                        summary.modules_run.push(module.clone());
                        summary.module_results.insert(module.clone(), recorded.payload);

                        tracing::info!(
                            module = %module,
                            duration_ms = (duration * 1000.0) as u64,
                            artifacts = recorded.artifacts,
                            "module completed"
                        );
                        if !options.quiet {
                            println!("  {} {} ({:.2}s)", "✓".green(), module.bold(), duration);
                        }
                    }
                    Err(fault) => {
                        cache.fail(&module_run, duration).await?;
                        summary.errors.push(fault.error.to_string());
                        summary.modules_failed.push(module.clone());
                        if !options.quiet {
                            println!("  {} {} failed", "✗".red(), module.bold());
                            print_recovery(&fault.error);
                        }

                        if fault.fail_fast {
                            tracing::error!(module = %module, error = %fault.error, "fail-fast fault, stopping run");
                            summary.halted_by = Some(module.clone());
                            break;
                        }
                        tracing::warn!(module = %module, error = %fault.error, "module failed");
                    }
                }
            }
            Ok::<(), ConvoflowError>(())
        }
        .await;

        if let Err(err) = looped {
            tracing::error!(run = run.id, error = %err, "run aborted");
            if let Err(close) = coordinator.finish(&run, false).await {
                tracing::error!(run = run.id, error = %close, "could not close the aborted run");
            }
            return Err(err);
        }

        let finished = ctx.freeze();
        tracing::debug!(results = finished.completed_modules().count(), "run context frozen");

        let success = summary.errors.is_empty();
        coordinator.finish(&run, success).await?;
        summary.finish(if success {
            RunOutcome::Completed
        } else {
            RunOutcome::Failed
        });
        summary.persist().await?;

        if !options.quiet {
            print_outcome(&summary);
        }

        Ok(summary)
    }

    /// Build a summary from a reused pipeline run without executing anything
    async fn replay(
        &self,
        coordinator: &PipelineRunCoordinator,
        run: &PipelineRun,
        mut summary: RunSummary,
        options: &ExecutionOptions,
    ) -> ConvoflowResult<RunSummary> {
        summary.pipeline_run_id = Some(run.id);
        let module_runs = coordinator.module_runs(run).await?;

        for module in summary.execution_order.clone() {
            let latest = module_runs
                .iter()
                .filter(|r| r.module_name == module && r.status == RunStatus::Completed)
                .max_by_key(|r| r.id);
            if let Some(record) = latest {
                summary
                    .module_results
                    .insert(module.clone(), record.outputs.clone().unwrap_or(Value::Null));
                summary.cache_hits.push(module.clone());
                summary.modules_run.push(module);
            }
        }

        summary.finish(RunOutcome::Reused);
        summary.persist().await?;

        if !options.quiet {
            println!(
                "{}",
                format!("Reused pipeline run {} ({} modules)", run.id, summary.modules_run.len()).green()
            );
        }

        Ok(summary)
    }

    /// Run one module on its own thread under its timeout budget
    async fn invoke(
        &self,
        module: Arc<dyn AnalysisModule>,
        ctx: ModuleContext,
        timeout_seconds: u64,
    ) -> Result<ModuleOutput, ModuleFault> {
        let name = ctx.module_name().to_string();
        let runtime = tokio::runtime::Handle::current();
        // Synchronous module work must not hold the thread the timer runs on
        let task = tokio::task::spawn_blocking(move || runtime.block_on(module.run(&ctx)));

        let joined = if self.config.pipeline.enforce_timeouts {
            match tokio::time::timeout(Duration::from_secs(timeout_seconds), task).await {
                Ok(joined) => joined,
                Err(_) => {
                    // A blocking thread cannot be interrupted; it finishes detached
                    tracing::warn!(module = %name, seconds = timeout_seconds, "module overran its budget, detaching");
                    return Err(ModuleFault {
                        error: ConvoflowError::ModuleTimeout {
                            module: name,
                            seconds: timeout_seconds,
                        },
                        fail_fast: false,
                    });
                }
            }
        } else {
            task.await
        };

        let result = match joined {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(module = %name, error = %e, "module task did not finish");
                return Err(ModuleFault {
                    error: ConvoflowError::ModuleExecution {
                        module: name,
                        message: join_failure(e),
                    },
                    fail_fast: false,
                });
            }
        };

        result.and_then(ModuleOutput::into_result).map_err(|e| ModuleFault {
            fail_fast: e.is_fail_fast(),
            error: ConvoflowError::ModuleExecution {
                module: name,
                message: e.to_string(),
            },
        })
    }

    fn print_execution_plan(&self, transcript: &Transcript, plan: &ExecutionPlan) {
        let count = plan.execution_order.len();

        println!();
        println!("{}: {}", "Transcript".bold(), transcript.path().display());
        println!("{}", "═".repeat(50));
        println!(
            "Execution plan ({} module{}):",
            count,
            if count == 1 { "" } else { "s" }
        );
        println!();

        for (i, name) in plan.execution_order.iter().enumerate() {
            let Some(entry) = plan.dependency_graph.get(name) else {
                continue;
            };
            print!("  {}. {} ({})", i + 1, name.bold(), entry.category);
            if !entry.dependencies.is_empty() {
                print!(" {}", format!("[depends: {}]", entry.dependencies.join(", ")).dimmed());
            }
            println!();
        }

        for warning in &plan.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }
        println!();
    }
}

/// What a successful module left in the store
struct Recorded {
    payload: Value,
    fingerprint: String,
    artifacts: usize,
}

/// Register a module's outputs and close its run as completed
async fn record_outputs(
    cache: &ModuleRunCache,
    module_run: &ModuleRun,
    output_root: &Path,
    module_dir: &Path,
    version: &str,
    output: ModuleOutput,
    duration: f64,
) -> ConvoflowResult<Recorded> {
    let records = cache
        .artifacts()
        .register(module_run, output_root, module_dir, &output.artifacts)
        .await?;
    let fingerprint = output_fingerprint(&module_run.module_name, version, &records, &output.payload)?;
    cache
        .complete(
            module_run,
            fingerprint.clone(),
            duration,
            output.payload.clone(),
            output.metrics,
        )
        .await?;

    Ok(Recorded {
        payload: output.payload,
        fingerprint,
        artifacts: records.len(),
    })
}

fn join_failure(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return format!("module task was cancelled: {}", error);
    }
    let payload = error.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".into());
    format!("module panicked: {}", detail)
}

fn print_outcome(summary: &RunSummary) {
    println!();
    if summary.is_success() {
        println!(
            "{}",
            format!(
                "Pipeline completed in {:.2}s ({} run, {} cached, {} skipped)",
                summary.duration_seconds,
                summary.modules_run.len(),
                summary.cache_hits.len(),
                summary.skipped_modules.len()
            )
            .green()
        );
    } else {
        println!(
            "{}",
            format!(
                "Pipeline failed after {:.2}s with {} error{}",
                summary.duration_seconds,
                summary.errors.len(),
                if summary.errors.len() == 1 { "" } else { "s" }
            )
            .red()
        );
        for error in &summary.errors {
            println!("  {} {}", "✗".red(), error);
        }
    }
}

fn print_recovery(error: &ConvoflowError) {
    if let Some(suggestion) = error.recovery() {
        for line in suggestion.to_string().lines() {
            println!("      {}", line.dimmed());
        }
    }
}
