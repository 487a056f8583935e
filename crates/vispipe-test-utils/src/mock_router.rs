// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock routers for deterministic testing.

use async_trait::async_trait;
use vispipe_core::{
    ExecutionContext, NodeId, Params, Payload, PipelineError, PipelineHandle, Router,
};

/// Always routes to the same node, or always ends the run.
pub struct FixedRouter {
    name: String,
    target: Option<NodeId>,
}

impl FixedRouter {
    pub fn to(name: impl Into<String>, target: NodeId) -> Self {
        Self {
            name: name.into(),
            target: Some(target),
        }
    }

    /// Ends the run at the node that uses it.
    pub fn finish(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
        }
    }
}

#[async_trait]
impl Router for FixedRouter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_node(
        &self,
        _output: &Payload,
        _context: &mut ExecutionContext,
        _handle: &dyn PipelineHandle,
        _params: &Params,
    ) -> Result<Option<NodeId>, PipelineError> {
        Ok(self.target)
    }
}

/// Jumps to `target` when the output's `flag` field is `true`, otherwise
/// continues with the next node in id order.
pub struct FlagRouter {
    name: String,
    target: NodeId,
}

impl FlagRouter {
    pub fn new(name: impl Into<String>, target: NodeId) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }
}

#[async_trait]
impl Router for FlagRouter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_node(
        &self,
        output: &Payload,
        context: &mut ExecutionContext,
        handle: &dyn PipelineHandle,
        _params: &Params,
    ) -> Result<Option<NodeId>, PipelineError> {
        if output.get("flag").and_then(Payload::as_bool) == Some(true) {
            return Ok(Some(self.target));
        }
        Ok(context
            .current_node_id()
            .next()
            .filter(|next| handle.contains_node(*next)))
    }
}
