// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Graph command - visualize module dependencies

use miette::Result;

use super::{builtin_pipeline, GraphFormat};
use crate::errors::ConvoflowError;
use crate::pipeline::DependencyResolver;

pub async fn run(modules: Vec<String>, format: GraphFormat) -> Result<()> {
    let (registry, _) = builtin_pipeline()?;
    let dag = registry.dag();

    if let Some(unknown) = modules.iter().find(|m| !registry.contains(m)) {
        return Err(ConvoflowError::UnknownModule {
            module: unknown.clone(),
        }
        .into());
    }

    let output = match format {
        GraphFormat::Text => {
            let order = if modules.is_empty() {
                DependencyResolver::new(&registry)
                    .resolve(&registry.names().map(str::to_string).collect::<Vec<_>>())?
                    .order
            } else {
                DependencyResolver::new(&registry).resolve(&modules)?.order
            };
            dag.to_text(&order)
        }
        GraphFormat::Dot => dag.to_dot(),
        GraphFormat::Mermaid => dag.to_mermaid(),
    };

    println!("{}", output);

    Ok(())
}
