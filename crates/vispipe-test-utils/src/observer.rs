// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observer that records every lifecycle notification for later assertions.

use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use vispipe_core::{NodeId, PipelineObserver, RunReport, TraceEntry};

/// One recorded notification.
#[derive(Debug, Clone)]
pub enum ObservedEvent {
    NodeStarted { node_id: NodeId, node_name: String },
    NodeEnded(TraceEntry),
    RunCompleted(RunReport),
}

/// Captures notifications in arrival order.
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
    completed: watch::Sender<Vec<RunReport>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            completed: watch::Sender::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ids of the nodes that were started, in order.
    pub fn started_ids(&self) -> Vec<u32> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::NodeStarted { node_id, .. } => Some(node_id.get()),
                _ => None,
            })
            .collect()
    }

    /// Reports of every completed run so far.
    pub fn completions(&self) -> Vec<RunReport> {
        self.completed.borrow().clone()
    }

    /// Wait for the `n`-th (1-based) run completion and return its report.
    pub async fn wait_for_completion(&self, n: usize) -> RunReport {
        let mut rx = self.completed.subscribe();
        let reports = rx
            .wait_for(|reports| reports.len() >= n)
            .await
            .expect("observer sender lives as long as the observer");
        reports[n - 1].clone()
    }

    fn record(&self, event: ObservedEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl Default for RecordingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineObserver for RecordingObserver {
    fn node_started(&self, _pipeline: &str, node_id: NodeId, node_name: &str) {
        self.record(ObservedEvent::NodeStarted {
            node_id,
            node_name: node_name.to_string(),
        });
    }

    fn node_ended(&self, _pipeline: &str, entry: &TraceEntry) {
        self.record(ObservedEvent::NodeEnded(entry.clone()));
    }

    fn run_completed(&self, report: &RunReport) {
        self.record(ObservedEvent::RunCompleted(report.clone()));
        self.completed.send_modify(|reports| reports.push(report.clone()));
    }
}
