// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Run command - execute the pipeline

use colored::Colorize;
use miette::Result;
use std::path::{Path, PathBuf};

use super::{builtin_pipeline, load_config, open_store, OutputFormat};
use crate::input::expand_inputs;
use crate::pipeline::{ExecutionOptions, PipelineExecutor, PipelineValidator, RunSummary};
use crate::utils::{create_progress_bar, create_spinner, outcome_label, print_error, print_warning};

/// Arguments of `convoflow run`
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub inputs: Vec<String>,
    pub modules: Vec<String>,
    pub reuse: bool,
    pub no_cache: bool,
    pub no_store: bool,
    pub output: Option<PathBuf>,
    pub store: Option<PathBuf>,
    pub format: OutputFormat,
}

/// Run the pipeline
pub async fn run(args: RunArgs, config_path: Option<PathBuf>, verbose: bool) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?;
    if args.reuse {
        config.pipeline.reuse_existing_run = true;
    }
    if args.no_store {
        config.store.enabled = false;
    }

    let transcripts = expand_inputs(&args.inputs)?;
    if args.output.is_some() && transcripts.len() > 1 {
        return Err(miette::miette!(
            "--output names one directory but {} transcripts matched; use [output] directory in the config instead",
            transcripts.len()
        ));
    }

    let (registry, modules) = builtin_pipeline()?;
    let validation = PipelineValidator::validate(&registry, &modules, &config);
    if !validation.is_valid() {
        eprintln!("{}", "Pipeline validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(miette::miette!("Pipeline configuration is invalid"));
    }
    if validation.has_warnings() && verbose {
        eprintln!("{}", "Pipeline warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    let store = open_store(&config, args.store.as_deref())?;
    let executor = PipelineExecutor::new(registry, modules, store, config);

    let json = args.format == OutputFormat::Json;
    let options = ExecutionOptions {
        modules: args.modules,
        output_root: args.output,
        no_cache: args.no_cache,
        quiet: json || !verbose,
    };

    let (summaries, unprocessed) = if transcripts.len() == 1 {
        (vec![run_single(&executor, &transcripts[0], &options, json).await?], 0)
    } else {
        run_batch(&executor, &transcripts, &options, json).await
    };

    if json {
        let out = serde_json::to_string_pretty(&summaries)
            .map_err(|e| miette::miette!("Failed to serialize run summaries: {}", e))?;
        println!("{}", out);
    } else if !verbose {
        for summary in &summaries {
            print_summary(summary);
        }
    }

    let failed = summaries.iter().filter(|s| !s.is_success()).count() + unprocessed;
    if failed > 0 {
        return Err(miette::miette!(
            "{} of {} transcript run{} failed",
            failed,
            transcripts.len(),
            if transcripts.len() == 1 { "" } else { "s" }
        ));
    }

    Ok(())
}

async fn run_single(
    executor: &PipelineExecutor,
    transcript: &Path,
    options: &ExecutionOptions,
    json: bool,
) -> Result<RunSummary> {
    let spinner = (options.quiet && !json)
        .then(|| create_spinner(&format!("Analyzing {}", transcript.display())));

    let result = executor.execute(transcript, options).await;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    Ok(result?)
}

async fn run_batch(
    executor: &PipelineExecutor,
    transcripts: &[PathBuf],
    options: &ExecutionOptions,
    json: bool,
) -> (Vec<RunSummary>, usize) {
    let bar = (options.quiet && !json)
        .then(|| create_progress_bar(transcripts.len() as u64, "Transcripts"));
    let mut summaries = Vec::with_capacity(transcripts.len());

    for transcript in transcripts {
        if let Some(bar) = &bar {
            bar.set_message(transcript.display().to_string());
        }

        // One broken transcript does not stop the batch
        match executor.execute(transcript, options).await {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                tracing::error!(transcript = %transcript.display(), error = %e, "transcript run failed");
                if let Some(bar) = &bar {
                    bar.println(format!("{} {}: {}", "✗".red(), transcript.display(), e));
                } else if !json {
                    print_error(&format!("{}: {}", transcript.display(), e));
                }
            }
        }

        if let Some(bar) = &bar {
            bar.inc(1);
        }
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let unprocessed = transcripts.len() - summaries.len();
    (summaries, unprocessed)
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} {} ({:.2}s)",
        outcome_label(summary.status),
        summary.transcript_path.display().to_string().bold(),
        summary.duration_seconds
    );

    for module in &summary.modules_run {
        let cached = summary.cache_hits.contains(module);
        println!(
            "  {} {}{}",
            "✓".green(),
            module,
            if cached { " (cached)".dimmed().to_string() } else { String::new() }
        );
    }
    for skipped in &summary.skipped_modules {
        print_warning(&format!("{} skipped: {}", skipped.module, skipped.reason));
    }
    for module in &summary.modules_failed {
        print_error(&format!("{} failed", module));
    }
    for error in &summary.errors {
        println!("    {}", error.dimmed());
    }

    println!("  {} {}", "Output:".dimmed(), summary.output_root.display());
}
