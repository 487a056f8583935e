// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock processing units for deterministic testing.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Notify, mpsc};
use vispipe_core::{
    ExecutionContext, NodeFeedback, NodeId, Payload, PipelineError, PipelineHandle,
    ProcessingUnit,
};

fn increment(unit: &str, payload: &Payload) -> Result<Payload, PipelineError> {
    let n = payload
        .as_i64()
        .ok_or_else(|| PipelineError::unit(unit, format!("expected an integer, got {payload}")))?;
    Ok(json!(n + 1))
}

/// Adds one to an integer payload.
pub struct IncrementUnit {
    name: String,
    calls: AtomicUsize,
}

impl IncrementUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times `execute` was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for IncrementUnit {
    fn default() -> Self {
        Self::new("Increment")
    }
}

#[async_trait]
impl ProcessingUnit for IncrementUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        payload: Payload,
        _context: &mut ExecutionContext,
        _handle: Arc<dyn PipelineHandle>,
    ) -> Result<Payload, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        increment(&self.name, &payload)
    }
}

/// Returns its payload unchanged.
pub struct PassthroughUnit {
    name: String,
}

impl PassthroughUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for PassthroughUnit {
    fn default() -> Self {
        Self::new("Passthrough")
    }
}

#[async_trait]
impl ProcessingUnit for PassthroughUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        payload: Payload,
        _context: &mut ExecutionContext,
        _handle: Arc<dyn PipelineHandle>,
    ) -> Result<Payload, PipelineError> {
        Ok(payload)
    }
}

/// Fails a fixed number of times, then increments like [`IncrementUnit`].
pub struct FailingUnit {
    name: String,
    failures: usize,
    calls: AtomicUsize,
}

impl FailingUnit {
    /// Fails the first `failures` invocations.
    pub fn failing_first(name: impl Into<String>, failures: usize) -> Self {
        Self {
            name: name.into(),
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails every invocation.
    pub fn always(name: impl Into<String>) -> Self {
        Self::failing_first(name, usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessingUnit for FailingUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        payload: Payload,
        _context: &mut ExecutionContext,
        _handle: Arc<dyn PipelineHandle>,
    ) -> Result<Payload, PipelineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(PipelineError::unit(
                &self.name,
                format!("simulated failure #{}", call + 1),
            ));
        }
        increment(&self.name, &payload)
    }
}

/// Blocks inside `execute` until released by the test.
///
/// Each invocation consumes one release.
pub struct GatedUnit {
    name: String,
    entered: Notify,
    release: Notify,
}

impl GatedUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Wait until an invocation has entered `execute`.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one blocked (or the next) invocation return.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl ProcessingUnit for GatedUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        payload: Payload,
        _context: &mut ExecutionContext,
        _handle: Arc<dyn PipelineHandle>,
    ) -> Result<Payload, PipelineError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(payload)
    }
}

/// An invocation of [`AsyncUnit`] waiting for the test to answer it.
pub struct PendingInvocation {
    pub node_id: NodeId,
    pub payload: Payload,
    pub handle: Arc<dyn PipelineHandle>,
}

impl PendingInvocation {
    /// Report success with `output`.
    pub async fn complete(self, output: Payload) -> Result<(), PipelineError> {
        self.handle
            .async_feedback(NodeFeedback::success(self.node_id, output))
            .await
    }

    /// Report failure with `message`.
    pub async fn fail(self, message: &str) -> Result<(), PipelineError> {
        self.handle
            .async_feedback(NodeFeedback::failure(self.node_id, message))
            .await
    }
}

/// Asynchronous unit that hands every invocation to the test.
///
/// `execute` only queues a [`PendingInvocation`]; the node stays in flight
/// until the test delivers feedback for it.
pub struct AsyncUnit {
    name: String,
    pending: mpsc::UnboundedSender<PendingInvocation>,
}

impl AsyncUnit {
    pub fn new(
        name: impl Into<String>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PendingInvocation>) {
        let (pending, rx) = mpsc::unbounded_channel();
        let unit = Arc::new(Self {
            name: name.into(),
            pending,
        });
        (unit, rx)
    }
}

#[async_trait]
impl ProcessingUnit for AsyncUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_asynchronous(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        payload: Payload,
        context: &mut ExecutionContext,
        handle: Arc<dyn PipelineHandle>,
    ) -> Result<Payload, PipelineError> {
        self.pending
            .send(PendingInvocation {
                node_id: context.current_node_id(),
                payload,
                handle,
            })
            .map_err(|_| PipelineError::unit(&self.name, "invocation receiver was dropped"))?;
        Ok(Payload::Null)
    }
}
