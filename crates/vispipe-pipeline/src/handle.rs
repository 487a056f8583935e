// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The [`PipelineHandle`] given to units and routers of a controller's runs.

use std::sync::Arc;

use async_trait::async_trait;
use vispipe_core::{
    ExecutionContext, NodeFeedback, NodeId, NodeProgress, PipelineError, PipelineHandle,
};

use crate::controller::Shared;

/// Plugin-facing view of a [`PipelineController`](crate::PipelineController).
///
/// Asynchronous units may keep a clone and call
/// [`async_feedback`](PipelineHandle::async_feedback) from another task once
/// their work is done.
#[derive(Clone)]
pub struct ControllerHandle {
    shared: Arc<Shared>,
}

impl ControllerHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("pipeline", &self.shared.name())
            .finish()
    }
}

#[async_trait]
impl PipelineHandle for ControllerHandle {
    fn pipeline_name(&self) -> &str {
        self.shared.name()
    }

    fn node_progress(&self, node_id: NodeId, total: u64, done: u64) {
        self.shared.node_progress(node_id, total, done);
    }

    fn get_node_progress(&self, node_id: NodeId) -> NodeProgress {
        self.shared.get_node_progress(node_id)
    }

    fn node_id_by_name(&self, node_name: &str) -> Option<NodeId> {
        self.shared.definition().node_id_by_name(node_name)
    }

    fn contains_node(&self, node_id: NodeId) -> bool {
        self.shared.definition().contains(node_id)
    }

    fn context(&self) -> ExecutionContext {
        self.shared.snapshot()
    }

    async fn async_feedback(&self, feedback: NodeFeedback) -> Result<(), PipelineError> {
        self.shared.async_feedback(feedback).await
    }
}
