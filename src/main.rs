// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! convoflow - dependency-ordered, cached transcript analysis

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use convoflow::cli::{run::RunArgs, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convoflow=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    if cli.no_color {
        convoflow::utils::disable_colors();
    }

    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    match cli.command {
        Commands::Run {
            inputs,
            modules,
            reuse,
            no_cache,
            no_store,
            output,
            store,
            format,
        } => {
            let args = RunArgs {
                inputs,
                modules,
                reuse,
                no_cache,
                no_store,
                output,
                store,
                format,
            };
            convoflow::cli::run::run(args, cli.config, cli.verbose).await
        }
        Commands::Plan { modules, format } => {
            convoflow::cli::plan::run(modules, format, cli.config, cli.verbose).await
        }
        Commands::Graph { modules, format } => {
            convoflow::cli::graph::run(modules, format).await
        }
        Commands::Modules { format } => convoflow::cli::modules::run(format, cli.verbose).await,
        Commands::Validate => convoflow::cli::validate::run(cli.config, cli.verbose).await,
        Commands::Cache { action, store } => {
            convoflow::cli::cache::run(action, store, cli.config, cli.verbose).await
        }
    }
}
