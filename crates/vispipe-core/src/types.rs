// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the engine, the registry, and plugin implementations.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::context::ExecutionContext;
use crate::error::PipelineError;

/// The data value threaded from unit to unit.
pub type Payload = serde_json::Value;

/// Free-form parameters passed to routers and merged into contexts.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Identifier of a node inside a pipeline definition.
///
/// Node ids are dense, 1-based integers. Zero is never a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct NodeId(u32);

impl NodeId {
    /// The node every run starts from.
    pub const FIRST: NodeId = NodeId(1);

    /// Returns `None` for zero.
    pub fn new(id: u32) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Arithmetic successor, used for implicit sequential routing.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Zero-based position of this node in an ordered node list.
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for NodeId {
    type Error = PipelineError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
            .ok_or_else(|| PipelineError::Validation("node id must be a positive integer".into()))
    }
}

impl From<NodeId> for u32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl FromStr for NodeId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let not_positive =
            || PipelineError::Validation(format!("node id `{s}` is not a positive integer"));
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(not_positive());
        }
        // "01" and "1" would otherwise silently collide.
        if trimmed.len() > 1 && trimmed.starts_with('0') {
            return Err(PipelineError::Validation(format!(
                "node id `{s}` must not have leading zeros"
            )));
        }
        let value: u32 = trimmed.parse().map_err(|_| not_positive())?;
        Self::new(value).ok_or_else(not_positive)
    }
}

/// Identifies the kind of plugin in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    #[strum(serialize = "unit")]
    ProcessingUnit,
    #[strum(serialize = "router")]
    Router,
}

/// Lifecycle state of a pipeline run, owned by its controller.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Init,
    Running,
    Pause,
    Success,
    Error,
}

impl RunState {
    /// True for states a run ends in (`Success`, `Error`).
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Success | RunState::Error)
    }

    /// True for states `start` refuses to leave.
    pub fn is_active(self) -> bool {
        matches!(self, RunState::Running | RunState::Pause)
    }
}

/// Status of the node the context currently points at.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Init,
    /// The node was invoked and has not produced an outcome yet.
    Running,
    Error,
    Success,
}

/// Outcome status of one node attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Success,
    Error,
}

impl From<CompletionStatus> for NodeStatus {
    fn from(status: CompletionStatus) -> Self {
        match status {
            CompletionStatus::Success => NodeStatus::Success,
            CompletionStatus::Error => NodeStatus::Error,
        }
    }
}

/// Immutable record of one node attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub node_id: NodeId,
    pub node_name: String,
    pub unit_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: CompletionStatus,
    pub status_message: String,
    /// Router selected for this attempt; `None` for implicit sequencing or a halt.
    pub router: Option<String>,
}

/// Fractional progress reported by a long-running unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProgress {
    pub total: u64,
    pub done: u64,
}

impl NodeProgress {
    /// Reported for nodes that are not current.
    pub const COMPLETE: NodeProgress = NodeProgress { total: 1, done: 1 };

    /// Reset value when a node starts.
    pub const STARTED: NodeProgress = NodeProgress { total: 1, done: 0 };
}

/// Result delivered by an asynchronous unit through `async_feedback`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFeedback {
    pub node_id: NodeId,
    pub output: Option<Payload>,
    pub status: CompletionStatus,
    pub status_message: String,
    /// Merged into the context before routing.
    pub context_updates: Params,
}

impl NodeFeedback {
    pub fn success(node_id: NodeId, output: Payload) -> Self {
        Self {
            node_id,
            output: Some(output),
            status: CompletionStatus::Success,
            status_message: "success".to_string(),
            context_updates: Params::new(),
        }
    }

    pub fn failure(node_id: NodeId, message: impl Into<String>) -> Self {
        Self {
            node_id,
            output: None,
            status: CompletionStatus::Error,
            status_message: message.into(),
            context_updates: Params::new(),
        }
    }

    /// Attach context updates to merge before routing.
    pub fn with_context(mut self, updates: Params) -> Self {
        self.context_updates = updates;
        self
    }
}

/// Result observed by the caller of a blocking `start`, `wait`, or similar.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub state: RunState,
    /// Final payload on success, `None` otherwise.
    pub output: Option<Payload>,
}

/// Completion notification delivered to observers when a run reaches a terminal state.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub pipeline: String,
    pub run_id: uuid::Uuid,
    pub state: RunState,
    pub context: ExecutionContext,
    pub output: Option<Payload>,
    /// Status message of the failure that halted the run, if any.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_rejects_zero() {
        assert!(NodeId::new(0).is_none());
        assert_eq!(NodeId::new(3).map(NodeId::get), Some(3));
    }

    #[test]
    fn node_id_successor_is_arithmetic() {
        let id = NodeId::new(9).unwrap();
        assert_eq!(id.next(), NodeId::new(10));
        assert_eq!(NodeId::new(u32::MAX).unwrap().next(), None);
    }

    #[test]
    fn node_id_parses_dense_keys_only() {
        assert_eq!("2".parse::<NodeId>().unwrap(), NodeId::new(2).unwrap());
        assert!("0".parse::<NodeId>().is_err());
        assert!("01".parse::<NodeId>().is_err());
        assert!("-1".parse::<NodeId>().is_err());
        assert!("two".parse::<NodeId>().is_err());
    }

    #[test]
    fn node_id_deserialization_rejects_zero() {
        assert!(serde_json::from_str::<NodeId>("0").is_err());
        let id: NodeId = serde_json::from_str("4").unwrap();
        assert_eq!(id.get(), 4);
    }

    #[test]
    fn run_state_display_is_lowercase() {
        assert_eq!(RunState::Pause.to_string(), "pause");
        assert_eq!("error".parse::<RunState>().unwrap(), RunState::Error);
    }

    #[test]
    fn run_state_classification() {
        assert!(RunState::Success.is_terminal());
        assert!(RunState::Error.is_terminal());
        assert!(!RunState::Pause.is_terminal());
        assert!(RunState::Pause.is_active());
        assert!(!RunState::Init.is_active());
    }

    #[test]
    fn plugin_kind_round_trips_through_strum() {
        assert_eq!(PluginKind::ProcessingUnit.to_string(), "unit");
        assert_eq!("router".parse::<PluginKind>().unwrap(), PluginKind::Router);
    }

    #[test]
    fn feedback_constructors_set_status() {
        let id = NodeId::FIRST;
        let ok = NodeFeedback::success(id, serde_json::json!(1));
        assert_eq!(ok.status, CompletionStatus::Success);
        let err = NodeFeedback::failure(id, "boom");
        assert_eq!(err.status, CompletionStatus::Error);
        assert_eq!(err.output, None);
        assert_eq!(NodeStatus::from(err.status), NodeStatus::Error);
    }
}
