// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routers compiled into every Vispipe build.

use async_trait::async_trait;
use serde_json::Value;
use vispipe_core::{
    ExecutionContext, NodeId, Params, Payload, PipelineError, PipelineHandle, Router,
};

/// Context or parameter key holding the id of the node to jump to.
pub const GOTO_NODE_ID: &str = "goto_node_id";

/// Context or parameter key holding the display name of the node to jump to.
pub const GOTO_NODE_NAME: &str = "goto_node_name";

/// Jumps to a node chosen by id or by display name.
///
/// The target is read from the context first (`goto_node_id`, then
/// `goto_node_name`), and the key is consumed so the jump does not repeat on
/// the next routing decision. Without a context target the router falls back to
/// its parameters, which are left untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct GoToNode;

impl GoToNode {
    pub const NAME: &'static str = "GoToNode";
}

enum Target {
    Id(Value),
    Name(Value),
}

#[async_trait]
impl Router for GoToNode {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn next_node(
        &self,
        _output: &Payload,
        context: &mut ExecutionContext,
        handle: &dyn PipelineHandle,
        params: &Params,
    ) -> Result<Option<NodeId>, PipelineError> {
        let target = if let Some(id) = context.remove(GOTO_NODE_ID) {
            Target::Id(id)
        } else if let Some(name) = context.remove(GOTO_NODE_NAME) {
            Target::Name(name)
        } else if let Some(id) = params.get(GOTO_NODE_ID) {
            Target::Id(id.clone())
        } else if let Some(name) = params.get(GOTO_NODE_NAME) {
            Target::Name(name.clone())
        } else {
            return Err(PipelineError::router(
                Self::NAME,
                "goto target not found in context or router params",
            ));
        };

        let next = match target {
            Target::Id(value) => node_id_from_value(&value)?,
            Target::Name(value) => {
                let name = value.as_str().ok_or_else(|| {
                    PipelineError::router(
                        Self::NAME,
                        format!("{GOTO_NODE_NAME} must be a string, got {value}"),
                    )
                })?;
                handle.node_id_by_name(name).ok_or_else(|| {
                    PipelineError::router(
                        Self::NAME,
                        format!("{GOTO_NODE_NAME} `{name}` not found"),
                    )
                })?
            }
        };
        Ok(Some(next))
    }
}

/// Accepts both `3` and `"3"`.
fn node_id_from_value(value: &Value) -> Result<NodeId, PipelineError> {
    let parsed = match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .and_then(NodeId::new),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        PipelineError::router(
            GoToNode::NAME,
            format!("{GOTO_NODE_ID} `{value}` is not a node id"),
        )
    })
}
