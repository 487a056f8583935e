// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router trait: decides which node runs after the current one.

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::PipelineError;
use crate::traits::handle::PipelineHandle;
use crate::types::{NodeId, Params, Payload};

/// A pluggable capability that picks the next node from a unit's output.
#[async_trait]
pub trait Router: Send + Sync + 'static {
    /// Unique name of this router within a registry.
    fn name(&self) -> &str;

    /// One-time setup, run by the registry when the router is first registered.
    async fn initialize(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Returns the next node id, or `None` to finish the run with `output`.
    ///
    /// `params` are the node's `router_params` (or `exception_router_params`
    /// when routing a failed node).
    async fn next_node(
        &self,
        output: &Payload,
        context: &mut ExecutionContext,
        handle: &dyn PipelineHandle,
        params: &Params,
    ) -> Result<Option<NodeId>, PipelineError>;
}
