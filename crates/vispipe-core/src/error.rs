// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Vispipe pipeline engine.

use thiserror::Error;

use crate::types::{NodeId, PluginKind, RunState};

/// The primary error type used across all Vispipe capability traits and engine operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration errors (unreadable document, bad value types).
    #[error("configuration error: {0}")]
    Config(String),

    /// The pipeline definition document failed validation.
    #[error("invalid pipeline definition: {0}")]
    Validation(String),

    /// A control operation was requested from a state that does not allow it.
    #[error("pipeline `{pipeline}` cannot {operation} while {state}")]
    IllegalState {
        pipeline: String,
        operation: &'static str,
        state: RunState,
    },

    /// Requested plugin was not found in the registry.
    #[error("plugin not found: {kind}/{name}")]
    PluginNotFound { kind: PluginKind, name: String },

    /// A plugin failed its one-time initialization and was not registered.
    #[error("plugin {kind}/{name} failed to initialize: {source}")]
    PluginInit {
        kind: PluginKind,
        name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A router or the definition referenced a node id that does not exist.
    #[error("node {0} is not defined in the pipeline")]
    UnknownNode(NodeId),

    /// Asynchronous feedback named a node other than the current one.
    #[error("`{pipeline}` rejected feedback for node {received}: current node is {current}")]
    FeedbackMismatch {
        pipeline: String,
        current: NodeId,
        received: NodeId,
    },

    /// Asynchronous feedback arrived for a node that is not awaiting a result.
    #[error("node {0} is not waiting for asynchronous feedback")]
    NodeNotInFlight(NodeId),

    /// A processing unit failed while executing.
    #[error("unit `{unit}` failed: {message}")]
    Unit { unit: String, message: String },

    /// A router failed while resolving the next node.
    #[error("router `{router}` failed: {message}")]
    Router { router: String, message: String },

    /// The controller's event loop is no longer running.
    #[error("pipeline worker has stopped")]
    WorkerStopped,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Shorthand for a [`PipelineError::Unit`] failure.
    pub fn unit(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unit {
            unit: unit.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`PipelineError::Router`] failure.
    pub fn router(router: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Router {
            router: router.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_state_names_operation_and_state() {
        let err = PipelineError::IllegalState {
            pipeline: "search".into(),
            operation: "start",
            state: RunState::Running,
        };
        assert_eq!(err.to_string(), "pipeline `search` cannot start while running");
    }

    #[test]
    fn plugin_not_found_formats_kind_and_name() {
        let err = PipelineError::PluginNotFound {
            kind: PluginKind::Router,
            name: "GoToNode".into(),
        };
        assert_eq!(err.to_string(), "plugin not found: router/GoToNode");
    }

    #[test]
    fn unit_shorthand_builds_unit_variant() {
        let err = PipelineError::unit("Vectorize", "model not loaded");
        assert!(matches!(err, PipelineError::Unit { .. }));
        assert_eq!(err.to_string(), "unit `Vectorize` failed: model not loaded");
    }
}
