// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Validate command - check registry, implementations and config

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::{builtin_pipeline, load_config};
use crate::pipeline::PipelineValidator;

pub async fn run(config_path: Option<PathBuf>, verbose: bool) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let (registry, implementations) = builtin_pipeline()?;

    let result = PipelineValidator::validate(&registry, &implementations, &config);

    if !result.errors.is_empty() {
        println!("{}", "Errors:".red().bold());
        for error in &result.errors {
            println!("  {} {}", "✗".red(), error);
        }
        println!();
    }

    if !result.warnings.is_empty() {
        println!("{}", "Warnings:".yellow().bold());
        for warning in &result.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }
        println!();
    }

    if result.is_valid() {
        println!(
            "{} Configuration is valid ({} modules registered)",
            "✓".green(),
            registry.len()
        );

        if verbose {
            let order = registry.dag().topological_order_names()?;
            println!();
            println!("{}", "Registry order:".bold());
            for (i, name) in order.iter().enumerate() {
                println!("  {}. {}", i + 1, name);
            }
        }

        Ok(())
    } else {
        Err(miette::miette!(
            "Validation failed with {} error(s)",
            result.errors.len()
        ))
    }
}
