// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Processing unit trait: the pluggable step that transforms a payload.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::PipelineError;
use crate::traits::handle::PipelineHandle;
use crate::types::Payload;

/// A pluggable capability that transforms a payload, optionally asynchronously.
///
/// Synchronous units return their output from [`execute`](ProcessingUnit::execute)
/// and the run continues as soon as it returns. Asynchronous units only trigger
/// their work in `execute`; the value they return is ignored and the run stays
/// suspended on the node until the work reports back through
/// [`PipelineHandle::async_feedback`].
#[async_trait]
pub trait ProcessingUnit: Send + Sync + 'static {
    /// Unique name of this unit within a registry.
    fn name(&self) -> &str;

    /// One-time setup, run by the registry when the unit is first registered.
    ///
    /// Expensive work such as loading a model belongs here. An error rejects
    /// the registration.
    async fn initialize(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Whether the outcome is delivered later through async feedback.
    fn is_asynchronous(&self) -> bool {
        false
    }

    /// Run the unit against `payload`.
    ///
    /// The context and payload are lent for the duration of the call only. An
    /// asynchronous unit may deliver its feedback from a spawned task or from
    /// inside this call; feedback sent before `execute` returns is routed as
    /// soon as it does. The engine restores the current node and its status
    /// after the call.
    async fn execute(
        &self,
        payload: Payload,
        context: &mut ExecutionContext,
        handle: Arc<dyn PipelineHandle>,
    ) -> Result<Payload, PipelineError>;
}
