// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vispipe validate`, `vispipe show`, and `vispipe plugins` command implementations.

use std::io::IsTerminal;

use vispipe_config::VispipeConfig;
use vispipe_core::{PipelineError, PluginKind};
use vispipe_pipeline::PipelineDefinition;
use vispipe_plugin::{PluginDescriptor, builtin_catalog, search_catalog};

use crate::CommandError;

/// Outcome of validating one pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    /// Valid, but relies on plugins the host must supply.
    Warn,
}

/// Result of validating one pipeline.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

/// Run the `vispipe validate` command.
///
/// The configuration has already passed validation when this runs; this
/// prints one line per pipeline and flags routers the host must supply.
/// With `--plain`, disables colored output.
pub fn run_validate(config: &VispipeConfig, plain: bool) -> Result<(), CommandError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let results = check_pipelines(config)?;

    println!();
    println!("  vispipe validate");
    println!("  {}", "-".repeat(50));
    println!("    {:<20} {}", "log level", config.engine.log_level);
    println!(
        "    {:<20} {}",
        "default pipeline",
        config.engine.default_pipeline.as_deref().unwrap_or("(none)")
    );
    if results.is_empty() {
        println!("    No pipelines configured.");
    }

    let mut warn_count = 0;
    for result in &results {
        let line = match (&result.status, use_color) {
            (CheckStatus::Pass, true) => {
                use colored::Colorize;
                format!("    {} {:<20} {}", "✓".green(), result.name, result.message)
            }
            (CheckStatus::Pass, false) => {
                format!("    [OK]   {:<20} {}", result.name, result.message)
            }
            (CheckStatus::Warn, true) => {
                use colored::Colorize;
                warn_count += 1;
                format!(
                    "    {} {:<20} {}",
                    "!".yellow(),
                    result.name,
                    result.message.yellow()
                )
            }
            (CheckStatus::Warn, false) => {
                warn_count += 1;
                format!("    [WARN] {:<20} {}", result.name, result.message)
            }
        };
        println!("{line}");
    }

    println!();
    println!(
        "  {} pipeline(s) valid, {warn_count} warning(s)",
        results.len()
    );
    Ok(())
}

/// Check every configured pipeline.
pub fn check_pipelines(config: &VispipeConfig) -> Result<Vec<CheckResult>, PipelineError> {
    let definitions = config.definitions()?;
    Ok(definitions
        .iter()
        .map(|(name, definition)| {
            let external = external_routers(definition);
            if external.is_empty() {
                CheckResult {
                    name: name.clone(),
                    status: CheckStatus::Pass,
                    message: format!("{} node(s)", definition.len()),
                }
            } else {
                CheckResult {
                    name: name.clone(),
                    status: CheckStatus::Warn,
                    message: format!(
                        "{} node(s); host must register router(s): {}",
                        definition.len(),
                        external.join(", ")
                    ),
                }
            }
        })
        .collect())
}

/// Routers referenced by `definition` that no built-in plugin provides.
pub(crate) fn external_routers(definition: &PipelineDefinition) -> Vec<&str> {
    let builtin = builtin_catalog();
    definition
        .router_names()
        .into_iter()
        .filter(|name| {
            !builtin
                .iter()
                .any(|d| d.kind == PluginKind::Router && d.name == *name)
        })
        .collect()
}

/// Run the `vispipe show` command.
pub fn run_show(
    config: &VispipeConfig,
    pipeline: Option<&str>,
    as_toml: bool,
) -> Result<(), CommandError> {
    let (name, pipeline) = config.resolve_pipeline(pipeline)?;

    if as_toml {
        print!("{}", pipeline.to_toml()?);
        return Ok(());
    }

    let definition = pipeline.definition()?;
    println!();
    println!("  {name}");
    if let Some(description) = pipeline.description.as_deref() {
        println!("  {description}");
    }
    println!("  {}", "-".repeat(72));
    println!(
        "  {:<4} {:<16} {:<24} {:<12} {}",
        "ID", "NAME", "UNIT", "ROUTER", "ON ERROR"
    );
    for (id, node) in definition.iter() {
        println!(
            "  {:<4} {:<16} {:<24} {:<12} {}",
            id,
            node.name,
            node.unit,
            node.router.as_deref().unwrap_or("-"),
            node.exception_router.as_deref().unwrap_or("halt"),
        );
    }
    Ok(())
}

/// Run the `vispipe plugins` command.
pub fn run_plugins(query: &str, json: bool) -> Result<(), CommandError> {
    let results = search_catalog(query);

    if json {
        let rendered = serde_json::to_string_pretty(&results)
            .map_err(|e| PipelineError::Internal(format!("failed to render catalog: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    if results.is_empty() {
        println!("No built-in plugins match '{query}'.");
        return Ok(());
    }

    println!("Built-in plugins:");
    for descriptor in &results {
        print_descriptor(descriptor);
    }
    Ok(())
}

fn print_descriptor(descriptor: &PluginDescriptor) {
    println!(
        "  {:<16} [{}] {}",
        descriptor.name, descriptor.kind, descriptor.description
    );
    if !descriptor.params.is_empty() {
        println!("  {:<16} params: {}", "", descriptor.params.join(", "));
    }
}
