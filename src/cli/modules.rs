// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Modules command - list the registry

use colored::Colorize;
use miette::Result;
use serde_json::json;

use super::{builtin_pipeline, OutputFormat};
use crate::modules::module_version;
use crate::utils::{category_label, print_header};

pub async fn run(format: OutputFormat, verbose: bool) -> Result<()> {
    let (registry, implementations) = builtin_pipeline()?;

    if format == OutputFormat::Json {
        let mut rows = Vec::with_capacity(registry.len());
        for spec in registry.modules() {
            let version = match implementations.get(&spec.name) {
                Some(module) => Some(module_version(module.as_ref())?),
                None => None,
            };
            rows.push(json!({
                "name": spec.name,
                "description": spec.description,
                "category": spec.category,
                "dependencies": registry.effective_dependencies(&spec.name),
                "requirements": spec.requirements.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "feature_flags": spec.feature_flags,
                "timeout_seconds": spec.timeout_seconds,
                "default": !spec.exclude_from_default,
                "module_version": version,
            }));
        }
        let out = serde_json::to_string_pretty(&rows)
            .map_err(|e| miette::miette!("Failed to serialize modules: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    print_header(&format!("Registered modules ({})", registry.len()));
    for spec in registry.modules() {
        println!("  {} ({})", spec.name.bold(), category_label(spec.category));
        if !spec.description.is_empty() {
            println!("    {}", spec.description.dimmed());
        }

        let deps = registry.effective_dependencies(&spec.name);
        if !deps.is_empty() {
            println!("    depends on: {}", deps.join(", "));
        }

        if verbose {
            for requirement in &spec.requirements {
                println!("    requires {}", requirement);
            }
            for flag in &spec.feature_flags {
                println!("    feature flag: {}", flag);
            }
            println!("    timeout: {}s", spec.timeout_seconds);
            if !implementations.contains(&spec.name) {
                println!("    {}", "no implementation".red());
            }
        }
    }

    Ok(())
}
