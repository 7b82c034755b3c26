// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Cache command - inspect and manage the run store

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::{builtin_pipeline, load_config, open_store, CacheAction};
use crate::cache::verify_artifacts;
use crate::input::Transcript;
use crate::pipeline::{ExecutionOptions, PipelineExecutor};
use crate::utils::{print_error, print_header, print_info, print_success, print_warning};

/// Run the cache command
pub async fn run(
    action: CacheAction,
    store_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    if !config.store.enabled {
        return Err(miette::miette!(
            "The run store is disabled in the config; there is nothing to inspect"
        ));
    }
    let store = open_store(&config, store_dir.as_deref())?;

    match action {
        CacheAction::Stats => {
            let stats = store.stats().await?;

            print_header("Run Store Statistics");
            println!(
                "  Pipeline runs:   {} ({} completed)",
                stats.pipeline_runs, stats.completed_pipeline_runs
            );
            println!(
                "  Module runs:     {} ({} cacheable, {} superseded)",
                stats.module_runs, stats.cacheable_module_runs, stats.superseded_module_runs
            );
            println!("  Artifacts:       {}", stats.artifacts);

            Ok(())
        }

        CacheAction::Invalidate { module, input } => {
            let (registry, _) = builtin_pipeline()?;
            if !registry.contains(&module) {
                print_warning(&format!("'{}' is not a registered module", module));
            }

            let input_id = match input {
                Some(path) => Some(Transcript::load(&path)?.input_id()),
                None => None,
            };

            let count = store.supersede_module(&module, input_id.as_deref()).await?;
            tracing::info!(module = %module, superseded = count, "invalidated cached runs");

            if count == 0 {
                print_info(&format!("No cached runs of '{}' to invalidate", module));
            } else {
                println!(
                    "{} Invalidated {} cached run{} of '{}'",
                    "✓".green(),
                    count,
                    if count == 1 { "" } else { "s" },
                    module
                );
            }

            Ok(())
        }

        CacheAction::Verify { transcript, output } => {
            let input_id = Transcript::load(&transcript)?.input_id();
            let (registry, modules) = builtin_pipeline()?;
            let executor = PipelineExecutor::new(registry, modules, store, config);
            let options = ExecutionOptions {
                output_root: output,
                ..ExecutionOptions::default()
            };
            let output_root = executor.output_root(&transcript, &options)?;

            let report = verify_artifacts(executor.store().as_ref(), &input_id, &output_root).await?;

            print_header(&format!("Artifact integrity: {}", transcript.display()));
            println!("  Output:  {}", output_root.display());
            println!("  Checked: {}", report.checked);

            for key in &report.missing {
                print_error(&format!("missing: {}", key));
            }
            for key in &report.mismatched {
                print_error(&format!("changed: {}", key));
            }
            for key in &report.duplicate_keys {
                print_warning(&format!("recorded twice: {}", key));
            }
            for path in &report.orphans {
                print_warning(&format!("not recorded: {}", path.display()));
            }

            if report.is_clean() {
                print_success("All recorded artifacts are intact");
                Ok(())
            } else {
                if verbose {
                    println!();
                    println!(
                        "{}",
                        "Run the pipeline again to recompute modules with missing or changed outputs."
                            .dimmed()
                    );
                }
                Err(miette::miette!(
                    "Integrity check failed: {} missing, {} changed, {} unrecorded",
                    report.missing.len(),
                    report.mismatched.len(),
                    report.orphans.len()
                ))
            }
        }
    }
}
