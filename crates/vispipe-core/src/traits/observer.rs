// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle notifications emitted by a pipeline controller.

use crate::types::{NodeId, RunReport, TraceEntry};

/// Receives node and run lifecycle events.
///
/// Callbacks run on the controller's worker while it owns the run, so they
/// must return quickly and must not wait on the controller.
pub trait PipelineObserver: Send + Sync {
    /// A node is about to be invoked.
    fn node_started(&self, _pipeline: &str, _node_id: NodeId, _node_name: &str) {}

    /// A node attempt finished and its trace entry was appended.
    fn node_ended(&self, _pipeline: &str, _entry: &TraceEntry) {}

    /// The run reached `Success` or `Error`.
    fn run_completed(&self, _report: &RunReport) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}
