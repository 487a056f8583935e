// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vispipe - pipeline execution engine for image search services.
//!
//! This is the binary entry point: it validates and inspects the pipelines
//! declared in `vispipe.toml` and can dry-run one with stub units.

mod dry_run;
mod inspect;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use vispipe_config::VispipeConfig;

/// Vispipe - pipeline execution engine for image search services.
#[derive(Parser, Debug)]
#[command(name = "vispipe", version, about, long_about = None)]
struct Cli {
    /// Load this file instead of the standard configuration hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration and every configured pipeline.
    Validate {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Print the node table of a pipeline.
    Show {
        /// Pipeline name (defaults to engine.default_pipeline).
        pipeline: Option<String>,
        /// Print the pipeline as TOML instead of a table.
        #[arg(long)]
        toml: bool,
    },
    /// List built-in plugins, optionally filtered by a search query.
    Plugins {
        query: Option<String>,
        /// Print the catalog as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run a pipeline with pass-through units and print its trace.
    DryRun {
        /// Pipeline name (defaults to engine.default_pipeline).
        pipeline: Option<String>,
        /// Initial payload as JSON.
        #[arg(long, default_value = "null")]
        payload: String,
        /// Initial context values as a JSON object.
        #[arg(long)]
        context: Option<String>,
        /// Pause the run if it has not finished after this many milliseconds.
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            vispipe_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.engine.log_level);

    let result = match cli.command {
        Some(Commands::Validate { plain }) => inspect::run_validate(&config, plain),
        Some(Commands::Show { pipeline, toml }) => {
            inspect::run_show(&config, pipeline.as_deref(), toml)
        }
        Some(Commands::Plugins { query, json }) => {
            inspect::run_plugins(query.as_deref().unwrap_or(""), json)
        }
        Some(Commands::DryRun {
            pipeline,
            payload,
            context,
            timeout_ms,
        }) => {
            dry_run::run_dry_run(
                &config,
                pipeline.as_deref(),
                &payload,
                context.as_deref(),
                Duration::from_millis(timeout_ms),
            )
            .await
        }
        None => {
            println!("vispipe: use --help for available commands");
            Ok(())
        }
    };

    if let Err(err) = result {
        err.report();
        std::process::exit(1);
    }
}

fn load_config(
    path: Option<&std::path::Path>,
) -> Result<VispipeConfig, Vec<vispipe_config::ConfigError>> {
    match path {
        Some(path) if !path.is_file() => Err(vec![vispipe_config::ConfigError::Other(format!(
            "config file {} does not exist",
            path.display()
        ))]),
        Some(path) => vispipe_config::load_and_validate_path(path),
        None => vispipe_config::load_and_validate(),
    }
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "vispipe={log_level},vispipe_pipeline={log_level},vispipe_plugin={log_level},warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Failure of a subcommand.
#[derive(Debug)]
pub(crate) enum CommandError {
    /// Rendered through miette.
    Config(vispipe_config::ConfigError),
    Pipeline(vispipe_core::PipelineError),
}

impl CommandError {
    fn report(&self) {
        match self {
            CommandError::Config(err) => {
                vispipe_config::render_errors(std::slice::from_ref(err));
            }
            CommandError::Pipeline(err) => eprintln!("Error: {err}"),
        }
    }
}

impl From<vispipe_config::ConfigError> for CommandError {
    fn from(err: vispipe_config::ConfigError) -> Self {
        CommandError::Config(err)
    }
}

impl From<vispipe_core::PipelineError> for CommandError {
    fn from(err: vispipe_core::PipelineError) -> Self {
        CommandError::Pipeline(err)
    }
}
