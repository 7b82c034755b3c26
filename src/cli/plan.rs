// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Plan command - show what a run would execute

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::{builtin_pipeline, load_config, OutputFormat};
use crate::pipeline::{ExecutionOptions, PipelineExecutor};
use crate::store::MemoryStore;
use crate::utils::{category_label, print_header, print_section, print_warning};

pub async fn run(
    modules: Vec<String>,
    format: OutputFormat,
    config_path: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let (registry, implementations) = builtin_pipeline()?;
    let executor = PipelineExecutor::new(
        registry,
        implementations,
        std::sync::Arc::new(MemoryStore::new()),
        config,
    );

    let options = ExecutionOptions {
        modules,
        ..ExecutionOptions::default()
    };
    let (_, plan) = executor.plan(&options)?;

    if format == OutputFormat::Json {
        let out = serde_json::to_string_pretty(&plan)
            .map_err(|e| miette::miette!("Failed to serialize plan: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    print_header("Execution plan");
    println!("  Requested: {}", plan.requested_modules.join(", "));
    if verbose {
        println!("  Digest:    {}", plan.digest()?);
    }

    print_section("Order");
    for (i, name) in plan.execution_order.iter().enumerate() {
        let Some(entry) = plan.dependency_graph.get(name) else {
            continue;
        };
        print!("  {}. {} ({})", i + 1, name.bold(), category_label(entry.category));
        if !entry.dependencies.is_empty() {
            print!(" {}", format!("[depends: {}]", entry.dependencies.join(", ")).dimmed());
        }
        println!(" {}", format!("- {}", entry.included_reason).dimmed());
    }

    if !plan.warnings.is_empty() {
        print_section("Warnings");
        for warning in &plan.warnings {
            print_warning(warning);
        }
    }

    Ok(())
}
