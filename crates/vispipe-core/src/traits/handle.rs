// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handle exposed by a running pipeline back to its units and routers.

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::PipelineError;
use crate::types::{NodeFeedback, NodeId, NodeProgress};

/// Back-channel from plugins into the controller driving them.
#[async_trait]
pub trait PipelineHandle: Send + Sync {
    /// Name of the pipeline being run.
    fn pipeline_name(&self) -> &str;

    /// Report progress for `node_id`. Ignored unless it is the current node.
    fn node_progress(&self, node_id: NodeId, total: u64, done: u64);

    /// Progress of `node_id`; [`NodeProgress::COMPLETE`] for any node that is not current.
    fn get_node_progress(&self, node_id: NodeId) -> NodeProgress;

    /// First node (in id order) whose display name is `node_name`.
    fn node_id_by_name(&self, node_name: &str) -> Option<NodeId>;

    /// Whether `node_id` exists in the pipeline definition.
    fn contains_node(&self, node_id: NodeId) -> bool;

    /// Snapshot of the context as of the last node boundary.
    fn context(&self) -> ExecutionContext;

    /// Deliver the outcome of an asynchronous unit and resume routing.
    async fn async_feedback(&self, feedback: NodeFeedback) -> Result<(), PipelineError>;
}
