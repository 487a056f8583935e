// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vispipe dry-run` command implementation.
//!
//! Executes a configured pipeline with stub plugins: every unit passes its
//! payload through unchanged and every router that is not built in continues
//! with the next node. Built-in routers run for real, so the printed trace
//! shows the path the configured wiring takes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use vispipe_config::VispipeConfig;
use vispipe_core::{
    ExecutionContext, NodeId, Params, Payload, PipelineError, PipelineHandle, ProcessingUnit,
    Router, RunOutcome, TraceEntry,
};
use vispipe_pipeline::{PipelineController, PipelineDefinition};
use vispipe_plugin::{PluginRegistry, register_builtins};

use crate::CommandError;
use crate::inspect::external_routers;

/// Returns its payload unchanged.
struct StubUnit {
    name: String,
}

#[async_trait]
impl ProcessingUnit for StubUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        payload: Payload,
        _context: &mut ExecutionContext,
        _handle: Arc<dyn PipelineHandle>,
    ) -> Result<Payload, PipelineError> {
        Ok(payload)
    }
}

/// Continues with the next node in id order.
struct StubRouter {
    name: String,
}

#[async_trait]
impl Router for StubRouter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_node(
        &self,
        _output: &Payload,
        context: &mut ExecutionContext,
        handle: &dyn PipelineHandle,
        _params: &Params,
    ) -> Result<Option<NodeId>, PipelineError> {
        Ok(context
            .current_node_id()
            .next()
            .filter(|next| handle.contains_node(*next)))
    }
}

/// Run the `vispipe dry-run` command.
pub async fn run_dry_run(
    config: &VispipeConfig,
    pipeline: Option<&str>,
    payload: &str,
    context: Option<&str>,
    timeout: Duration,
) -> Result<(), CommandError> {
    let (name, pipeline) = config.resolve_pipeline(pipeline)?;
    let definition = Arc::new(pipeline.definition()?);
    let payload = parse_payload(payload)?;
    let context = parse_context(context)?;

    let registry = Arc::new(stub_registry(&definition).await?);
    let controller = PipelineController::builder(name, definition, registry).build()?;
    let outcome = run_with_timeout(&controller, payload, context, timeout).await?;

    print_trace(name, &controller.trace());
    println!();
    println!("  {:<20} {}", "Final state:", outcome.state);
    if let Some(output) = &outcome.output {
        println!("  {:<20} {output}", "Output:");
    }
    if let Some(error) = controller.last_error() {
        println!("  {:<20} {error}", "Error:");
    }
    Ok(())
}

/// Registry holding a stub for every plugin `definition` references.
async fn stub_registry(definition: &PipelineDefinition) -> Result<PluginRegistry, PipelineError> {
    let registry = PluginRegistry::new();
    register_builtins(&registry).await?;
    for unit in definition.unit_names() {
        registry
            .register_unit(Arc::new(StubUnit {
                name: unit.to_string(),
            }))
            .await?;
    }
    for router in external_routers(definition) {
        warn!(router, "router is not built in; continuing sequentially in its place");
        registry
            .register_router(Arc::new(StubRouter {
                name: router.to_string(),
            }))
            .await?;
    }
    Ok(registry)
}

/// Start a run and pause it if it is still running after `timeout`.
async fn run_with_timeout(
    controller: &PipelineController,
    payload: Payload,
    context: Params,
    timeout: Duration,
) -> Result<RunOutcome, PipelineError> {
    match tokio::time::timeout(timeout, controller.start(payload, context)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            info!(pipeline = controller.name(), "dry run timed out; pausing");
            match controller.pause().await {
                // The run stopped on its own between the timeout and the pause.
                Ok(()) | Err(PipelineError::IllegalState { .. }) => {}
                Err(err) => return Err(err),
            }
            Ok(RunOutcome {
                state: controller.status(),
                output: controller.output(),
            })
        }
    }
}

fn parse_payload(raw: &str) -> Result<Payload, PipelineError> {
    serde_json::from_str(raw)
        .map_err(|e| PipelineError::Validation(format!("--payload is not valid JSON: {e}")))
}

fn parse_context(raw: Option<&str>) -> Result<Params, PipelineError> {
    let Some(raw) = raw else {
        return Ok(Params::new());
    };
    match serde_json::from_str::<Payload>(raw) {
        Ok(Payload::Object(values)) => Ok(values),
        Ok(other) => Err(PipelineError::Validation(format!(
            "--context must be a JSON object, got {other}"
        ))),
        Err(e) => Err(PipelineError::Validation(format!(
            "--context is not valid JSON: {e}"
        ))),
    }
}

fn print_trace(pipeline: &str, trace: &[TraceEntry]) {
    println!();
    println!("  vispipe dry-run: {pipeline}");
    println!("  {}", "-".repeat(60));
    for entry in trace {
        let elapsed = (entry.end_time - entry.start_time).num_milliseconds();
        println!(
            "  {:<4} {:<16} {:<8} {:>5}ms  {}",
            entry.node_id,
            entry.node_name,
            entry.status,
            elapsed,
            entry.router.as_deref().unwrap_or("-"),
        );
    }
    if trace.is_empty() {
        println!("  (no nodes executed)");
    }
}
