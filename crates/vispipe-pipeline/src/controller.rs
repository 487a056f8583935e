// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The pipeline controller: run state machine, run loop, and routing.
//!
//! Each controller owns one event-loop task. `start`, `resume`, and async
//! feedback that advances to a new node all wake that task through a bounded
//! channel; it then drives the run loop until the run suspends on an
//! asynchronous node, pauses, or reaches a terminal state. At most one node of
//! a run executes at any instant.
//!
//! The run record (context and payload) lives behind an async mutex held by
//! whoever is advancing the run. Hosts and plugins read a snapshot published at
//! every node boundary, so status queries never wait on a running unit.
//! Feedback that arrives while the unit of the current node is still executing
//! cannot take that mutex; it is parked and routed once `execute` returns.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vispipe_core::{
    CompletionStatus, ExecutionContext, NodeFeedback, NodeId, NodeProgress, NodeStatus,
    NoopObserver, Params, Payload, PipelineError, PipelineHandle, PipelineObserver, RunOutcome,
    RunReport, RunState, TraceEntry,
};
use vispipe_plugin::PluginRegistry;

use crate::definition::PipelineDefinition;
use crate::handle::ControllerHandle;

/// Mutable run record, owned by whoever is advancing the run.
struct RunData {
    run_id: Uuid,
    context: ExecutionContext,
    /// Input of the current node; kept until routing so a retry sees the same value.
    payload: Payload,
}

/// What hosts and plugins can observe without touching the run record.
#[derive(Default)]
struct RunView {
    run_id: Option<Uuid>,
    context: ExecutionContext,
    trace: Vec<TraceEntry>,
    output: Option<Payload>,
    failure: Option<String>,
}

/// Outcome of one node attempt, before routing.
struct NodeOutcome {
    status: CompletionStatus,
    output: Payload,
    message: String,
}

impl NodeOutcome {
    fn from_feedback(feedback: NodeFeedback, context: &mut ExecutionContext) -> Self {
        context.merge(&feedback.context_updates);
        Self {
            status: feedback.status,
            output: feedback.output.unwrap_or(Payload::Null),
            message: feedback.status_message,
        }
    }
}

/// Feedback delivered while a unit is inside `execute`.
#[derive(Default)]
struct InlineFeedback {
    /// Node whose unit is executing, and whether that unit is asynchronous.
    executing: Option<(NodeId, bool)>,
    parked: Option<NodeFeedback>,
}

pub(crate) struct Shared {
    name: String,
    definition: Arc<PipelineDefinition>,
    registry: Arc<PluginRegistry>,
    observer: Arc<dyn PipelineObserver>,
    state: watch::Sender<RunState>,
    /// True while the event loop is inside the run loop.
    busy: watch::Sender<bool>,
    run: Mutex<RunData>,
    view: StdMutex<RunView>,
    /// Progress of the node the run currently points at.
    progress: StdMutex<(NodeId, NodeProgress)>,
    inline: StdMutex<InlineFeedback>,
    wake: mpsc::Sender<()>,
}

/// Drives runs of one pipeline definition.
///
/// Cloning is cheap; every clone controls the same run.
#[derive(Clone)]
pub struct PipelineController {
    shared: Arc<Shared>,
}

/// Builder for [`PipelineController`].
pub struct PipelineControllerBuilder {
    name: String,
    definition: Arc<PipelineDefinition>,
    registry: Arc<PluginRegistry>,
    observer: Arc<dyn PipelineObserver>,
}

impl PipelineControllerBuilder {
    /// Receive node and run lifecycle events.
    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Spawn the controller's event loop on the current Tokio runtime.
    pub fn build(self) -> Result<PipelineController, PipelineError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            PipelineError::Internal(format!("pipeline controller needs a Tokio runtime: {e}"))
        })?;

        let (wake, wake_rx) = mpsc::channel(1);
        let shared = Arc::new(Shared {
            name: self.name,
            definition: self.definition,
            registry: self.registry,
            observer: self.observer,
            state: watch::Sender::new(RunState::Init),
            busy: watch::Sender::new(false),
            run: Mutex::new(RunData {
                run_id: Uuid::nil(),
                context: ExecutionContext::default(),
                payload: Payload::Null,
            }),
            view: StdMutex::new(RunView::default()),
            progress: StdMutex::new((NodeId::FIRST, NodeProgress::COMPLETE)),
            inline: StdMutex::new(InlineFeedback::default()),
            wake,
        });

        runtime.spawn(event_loop(Arc::downgrade(&shared), wake_rx));
        debug!(
            pipeline = %shared.name,
            nodes = shared.definition.len(),
            "pipeline controller built"
        );

        Ok(PipelineController { shared })
    }
}

/// Runs the run loop once per wake-up. Ends when every controller clone is gone.
async fn event_loop(shared: Weak<Shared>, mut wake: mpsc::Receiver<()>) {
    while wake.recv().await.is_some() {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.drive().await;
    }
}

impl PipelineController {
    pub fn builder(
        name: impl Into<String>,
        definition: Arc<PipelineDefinition>,
        registry: Arc<PluginRegistry>,
    ) -> PipelineControllerBuilder {
        PipelineControllerBuilder {
            name: name.into(),
            definition,
            registry,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn definition(&self) -> &Arc<PipelineDefinition> {
        &self.shared.definition
    }

    /// Start a run and wait until it stops being `Running`.
    ///
    /// Returns on `Success`, `Error`, or `Pause`. A run suspended on an
    /// asynchronous node is still `Running`, so this waits for its feedback.
    pub async fn start(
        &self,
        payload: Payload,
        context: Params,
    ) -> Result<RunOutcome, PipelineError> {
        let mut state = self.shared.state.subscribe();
        self.launch(payload, context).await?;
        let reached = *state
            .wait_for(|s| *s != RunState::Running)
            .await
            .map_err(|_| PipelineError::WorkerStopped)?;
        Ok(RunOutcome {
            state: reached,
            output: self.output(),
        })
    }

    /// Start a run and return immediately with its run id.
    ///
    /// Completion is delivered through [`PipelineObserver::run_completed`].
    pub async fn start_detached(
        &self,
        payload: Payload,
        context: Params,
    ) -> Result<Uuid, PipelineError> {
        self.launch(payload, context).await
    }

    async fn launch(&self, payload: Payload, values: Params) -> Result<Uuid, PipelineError> {
        let shared = &self.shared;
        // Rejected before taking the run lock, which a running unit may hold indefinitely.
        shared.ensure_not_active("start")?;

        let mut run = shared.run.lock().await;
        let mut previous = RunState::Init;
        let claimed = shared.state.send_if_modified(|state| {
            previous = *state;
            if state.is_active() {
                false
            } else {
                *state = RunState::Running;
                true
            }
        });
        if !claimed {
            return Err(shared.illegal("start", previous));
        }

        run.run_id = Uuid::new_v4();
        run.context = ExecutionContext::new(values);
        run.payload = payload;
        {
            let mut view = shared.lock_view();
            *view = RunView {
                run_id: Some(run.run_id),
                context: run.context.clone(),
                ..RunView::default()
            };
        }
        shared.set_progress(NodeId::FIRST, NodeProgress::STARTED);

        info!(pipeline = %shared.name, run_id = %run.run_id, previous = %previous, "run started");
        let run_id = run.run_id;
        drop(run);

        shared.wake();
        Ok(run_id)
    }

    /// Stop advancing after the node currently executing, if any.
    ///
    /// Waits until that node has returned to the loop boundary; never
    /// interrupts a unit.
    pub async fn pause(&self) -> Result<(), PipelineError> {
        let shared = &self.shared;
        let mut previous = RunState::Init;
        let paused = shared.state.send_if_modified(|state| {
            previous = *state;
            if *state == RunState::Running {
                *state = RunState::Pause;
                true
            } else {
                false
            }
        });
        if !paused {
            return Err(shared.illegal("pause", previous));
        }

        info!(pipeline = %shared.name, "pause requested");
        shared
            .busy
            .subscribe()
            .wait_for(|busy| !*busy)
            .await
            .map_err(|_| PipelineError::WorkerStopped)?;
        info!(pipeline = %shared.name, node_id = %self.current_node(), "run paused");
        Ok(())
    }

    /// Continue a paused run, or retry the failed node of a run in `Error`.
    pub async fn resume(&self) -> Result<(), PipelineError> {
        let shared = &self.shared;
        let current = *shared.state.borrow();
        match current {
            RunState::Pause => {
                let resumed = shared.state.send_if_modified(|state| {
                    if *state == RunState::Pause {
                        *state = RunState::Running;
                        true
                    } else {
                        false
                    }
                });
                if !resumed {
                    return Err(shared.illegal("resume", *shared.state.borrow()));
                }
                info!(pipeline = %shared.name, node_id = %self.current_node(), "run resumed");
            }
            RunState::Error => {
                let mut run = shared.run.lock().await;
                let now = *shared.state.borrow();
                if now != RunState::Error {
                    return Err(shared.illegal("resume", now));
                }
                run.context.set_node_status(NodeStatus::Init);
                {
                    let mut view = shared.lock_view();
                    view.failure = None;
                    view.context = run.context.clone();
                }
                shared.state.send_replace(RunState::Running);
                info!(
                    pipeline = %shared.name,
                    run_id = %run.run_id,
                    node_id = %run.context.current_node_id(),
                    "retrying failed node"
                );
            }
            other => return Err(shared.illegal("resume", other)),
        }
        shared.wake();
        Ok(())
    }

    /// Wait until the run is no longer `Running`.
    pub async fn wait(&self) -> Result<RunOutcome, PipelineError> {
        let reached = *self
            .shared
            .state
            .subscribe()
            .wait_for(|s| *s != RunState::Running)
            .await
            .map_err(|_| PipelineError::WorkerStopped)?;
        Ok(RunOutcome {
            state: reached,
            output: self.output(),
        })
    }

    /// Deliver the outcome of an asynchronous node and continue routing.
    ///
    /// Rejected without touching the context or trace when `feedback.node_id`
    /// is not the current node, or when the current node is not awaiting
    /// feedback.
    pub async fn async_feedback(&self, feedback: NodeFeedback) -> Result<(), PipelineError> {
        self.shared.async_feedback(feedback).await
    }

    /// Record progress for the current node. Ignored for any other node.
    pub fn node_progress(&self, node_id: NodeId, total: u64, done: u64) {
        self.shared.node_progress(node_id, total, done);
    }

    /// Progress of `node_id`; complete for any node that is not current.
    pub fn get_node_progress(&self, node_id: NodeId) -> NodeProgress {
        self.shared.get_node_progress(node_id)
    }

    pub fn status(&self) -> RunState {
        *self.shared.state.borrow()
    }

    /// Subscribe to run state transitions.
    pub fn watch_status(&self) -> watch::Receiver<RunState> {
        self.shared.state.subscribe()
    }

    /// Context as of the last node boundary.
    pub fn context(&self) -> ExecutionContext {
        self.shared.lock_view().context.clone()
    }

    pub fn current_node(&self) -> NodeId {
        self.shared.lock_view().context.current_node_id()
    }

    /// Trace entries of the current run, in execution order.
    pub fn trace(&self) -> Vec<TraceEntry> {
        self.shared.lock_view().trace.clone()
    }

    /// Final payload; only set once the run reached `Success`.
    pub fn output(&self) -> Option<Payload> {
        self.shared.lock_view().output.clone()
    }

    /// Status message of the failure that put the run in `Error`.
    pub fn last_error(&self) -> Option<String> {
        self.shared.lock_view().failure.clone()
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.shared.lock_view().run_id
    }

    /// A plugin-facing handle onto this controller.
    pub fn handle(&self) -> Arc<dyn PipelineHandle> {
        Arc::new(ControllerHandle::new(Arc::clone(&self.shared)))
    }
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("name", &self.shared.name)
            .field("state", &self.status())
            .field("nodes", &self.shared.definition.len())
            .finish()
    }
}

impl Shared {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    pub(crate) fn snapshot(&self) -> ExecutionContext {
        self.lock_view().context.clone()
    }

    fn lock_view(&self) -> std::sync::MutexGuard<'_, RunView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake(&self) {
        // A full channel already holds a pending wake-up.
        if let Err(mpsc::error::TrySendError::Closed(())) = self.wake.try_send(()) {
            warn!(pipeline = %self.name, "event loop is gone, wake-up dropped");
        }
    }

    fn illegal(&self, operation: &'static str, state: RunState) -> PipelineError {
        PipelineError::IllegalState {
            pipeline: self.name.clone(),
            operation,
            state,
        }
    }

    fn ensure_not_active(&self, operation: &'static str) -> Result<(), PipelineError> {
        let state = *self.state.borrow();
        if state.is_active() {
            return Err(self.illegal(operation, state));
        }
        Ok(())
    }

    fn publish(&self, run: &RunData) {
        self.lock_view().context = run.context.clone();
    }

    fn set_progress(&self, node_id: NodeId, progress: NodeProgress) {
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = (node_id, progress);
    }

    pub(crate) fn node_progress(&self, node_id: NodeId, total: u64, done: u64) {
        let mut cell = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
        if cell.0 == node_id {
            cell.1 = NodeProgress { total, done };
            debug!(pipeline = %self.name, node_id = %node_id, total, done, "node progress");
        } else {
            debug!(
                pipeline = %self.name,
                node_id = %node_id,
                current = %cell.0,
                "ignoring progress for a node that is not current"
            );
        }
    }

    pub(crate) fn get_node_progress(&self, node_id: NodeId) -> NodeProgress {
        let cell = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
        if cell.0 == node_id {
            cell.1
        } else {
            NodeProgress::COMPLETE
        }
    }

    /// One pass of the event loop.
    async fn drive(self: &Arc<Self>) {
        self.busy.send_replace(true);
        let mut run = self.run.lock().await;
        if let Err(err) = self.advance(&mut run).await {
            self.halt(&mut run, err.to_string());
        }
        drop(run);
        self.busy.send_replace(false);
    }

    /// The run loop: execute nodes until the run suspends, pauses, or ends.
    async fn advance(self: &Arc<Self>, run: &mut RunData) -> Result<(), PipelineError> {
        loop {
            if *self.state.borrow() != RunState::Running {
                return Ok(());
            }
            // An asynchronous node is in flight; feedback continues the run.
            if run.context.node_status() == NodeStatus::Running {
                return Ok(());
            }

            let node_id = run.context.current_node_id();
            let definition = Arc::clone(&self.definition);
            let node = definition
                .node(node_id)
                .ok_or(PipelineError::UnknownNode(node_id))?;
            let unit = self.registry.unit(&node.unit)?;

            let started_at = Utc::now();
            run.context.enter_node(node_id, started_at);
            run.context.merge(&node.context_overrides);
            self.set_progress(node_id, NodeProgress::STARTED);
            self.publish(run);

            info!(
                pipeline = %self.name,
                run_id = %run.run_id,
                node_id = %node_id,
                node = %node.name,
                unit = %node.unit,
                "node started"
            );
            self.observer.node_started(&self.name, node_id, &node.name);

            let handle: Arc<dyn PipelineHandle> =
                Arc::new(ControllerHandle::new(Arc::clone(self)));
            let input = run.payload.clone();
            self.lock_inline().executing = Some((node_id, unit.is_asynchronous()));
            let result = AssertUnwindSafe(unit.execute(input, &mut run.context, handle))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(PipelineError::unit(
                        node.unit.as_str(),
                        panic_message(panic.as_ref()),
                    ))
                });
            let parked = std::mem::take(&mut *self.lock_inline()).parked;
            // The node position belongs to the engine, whatever the unit did to it.
            run.context.enter_node(node_id, started_at);

            let outcome = match (result, parked) {
                (Ok(_), Some(feedback)) if unit.is_asynchronous() => {
                    debug!(
                        pipeline = %self.name,
                        run_id = %run.run_id,
                        node_id = %node_id,
                        status = %feedback.status,
                        "asynchronous feedback received during execute"
                    );
                    NodeOutcome::from_feedback(feedback, &mut run.context)
                }
                (Ok(_), None) if unit.is_asynchronous() => {
                    self.publish(run);
                    debug!(
                        pipeline = %self.name,
                        run_id = %run.run_id,
                        node_id = %node_id,
                        "awaiting asynchronous feedback"
                    );
                    return Ok(());
                }
                (Ok(output), _) => NodeOutcome {
                    status: CompletionStatus::Success,
                    output,
                    message: "success".to_string(),
                },
                (Err(err), parked) => {
                    warn!(
                        pipeline = %self.name,
                        run_id = %run.run_id,
                        node_id = %node_id,
                        error = %err,
                        dropped_feedback = parked.is_some(),
                        "node failed"
                    );
                    NodeOutcome {
                        status: CompletionStatus::Error,
                        output: Payload::Null,
                        message: err.to_string(),
                    }
                }
            };

            self.resolve_route(run, node_id, outcome).await?;
            // Let pause, timers and other pipelines on this runtime make progress.
            tokio::task::yield_now().await;
        }
    }

    /// Record the finished node and move the run to its next node or end it.
    async fn resolve_route(
        self: &Arc<Self>,
        run: &mut RunData,
        node_id: NodeId,
        outcome: NodeOutcome,
    ) -> Result<(), PipelineError> {
        let definition = Arc::clone(&self.definition);
        let node = definition
            .node(node_id)
            .ok_or(PipelineError::UnknownNode(node_id))?;
        let (router_name, params) = match outcome.status {
            CompletionStatus::Success => (node.router.as_deref(), &node.router_params),
            CompletionStatus::Error => (
                node.exception_router.as_deref(),
                &node.exception_router_params,
            ),
        };

        let end_time = Utc::now();
        let entry = TraceEntry {
            node_id,
            node_name: node.name.clone(),
            unit_name: node.unit.clone(),
            start_time: run.context.start_time().unwrap_or(end_time),
            end_time,
            status: outcome.status,
            status_message: outcome.message.clone(),
            router: router_name.map(str::to_string),
        };
        self.lock_view().trace.push(entry.clone());
        self.observer.node_ended(&self.name, &entry);
        info!(
            pipeline = %self.name,
            run_id = %run.run_id,
            node_id = %node_id,
            status = %outcome.status,
            "node ended"
        );

        if outcome.status == CompletionStatus::Error && router_name.is_none() {
            self.halt(run, outcome.message);
            return Ok(());
        }
        run.context.set_node_status(outcome.status.into());

        let next = match router_name {
            Some(name) => {
                let router = self.registry.router(name)?;
                let handle = ControllerHandle::new(Arc::clone(self));
                router
                    .next_node(&outcome.output, &mut run.context, &handle, params)
                    .await?
            }
            None => definition.successor(node_id),
        };

        match next {
            Some(next_id) => {
                if !definition.contains(next_id) {
                    return Err(PipelineError::UnknownNode(next_id));
                }
                debug!(pipeline = %self.name, from = %node_id, to = %next_id, "routed");
                run.payload = outcome.output;
                run.context.advance_to(next_id);
                self.set_progress(next_id, NodeProgress::STARTED);
                self.publish(run);
            }
            None => {
                run.payload = outcome.output.clone();
                self.set_progress(node_id, NodeProgress::COMPLETE);
                self.finish(run, RunState::Success, Some(outcome.output), None);
            }
        }
        Ok(())
    }

    /// Put the run in `Error`, keeping the current node and its input for a retry.
    fn halt(&self, run: &mut RunData, message: String) {
        run.context.set_node_status(NodeStatus::Error);
        error!(
            pipeline = %self.name,
            run_id = %run.run_id,
            node_id = %run.context.current_node_id(),
            error = %message,
            "run halted"
        );
        self.finish(run, RunState::Error, None, Some(message));
    }

    fn finish(
        &self,
        run: &RunData,
        state: RunState,
        output: Option<Payload>,
        failure: Option<String>,
    ) {
        {
            let mut view = self.lock_view();
            view.context = run.context.clone();
            view.output = output.clone();
            view.failure = failure.clone();
        }
        // Waiters read the view once they see the new state.
        self.state.send_replace(state);
        if state == RunState::Success {
            info!(pipeline = %self.name, run_id = %run.run_id, "run succeeded");
        }

        self.observer.run_completed(&RunReport {
            pipeline: self.name.clone(),
            run_id: run.run_id,
            state,
            context: run.context.clone(),
            output,
            error: failure,
        });
    }

    pub(crate) async fn async_feedback(
        self: &Arc<Self>,
        feedback: NodeFeedback,
    ) -> Result<(), PipelineError> {
        // The run lock is held for as long as a unit executes.
        let Some(feedback) = self.park_inline(feedback)? else {
            return Ok(());
        };

        let mut run = self.run.lock().await;
        let current = run.context.current_node_id();
        if feedback.node_id != current {
            return Err(self.mismatch(current, feedback.node_id));
        }
        if run.context.node_status() != NodeStatus::Running {
            return Err(PipelineError::NodeNotInFlight(current));
        }

        debug!(
            pipeline = %self.name,
            run_id = %run.run_id,
            node_id = %current,
            status = %feedback.status,
            "asynchronous feedback received"
        );
        let outcome = NodeOutcome::from_feedback(feedback, &mut run.context);
        if let Err(err) = self.resolve_route(&mut run, current, outcome).await {
            self.halt(&mut run, err.to_string());
            return Err(err);
        }

        let advanced = run.context.node_status() == NodeStatus::Init;
        drop(run);
        if advanced && *self.state.borrow() == RunState::Running {
            self.wake();
        }
        Ok(())
    }

    /// Park `feedback` if a unit is executing; otherwise hand it back.
    fn park_inline(&self, feedback: NodeFeedback) -> Result<Option<NodeFeedback>, PipelineError> {
        let mut inline = self.lock_inline();
        let Some((current, asynchronous)) = inline.executing else {
            return Ok(Some(feedback));
        };
        if feedback.node_id != current {
            return Err(self.mismatch(current, feedback.node_id));
        }
        if !asynchronous || inline.parked.is_some() {
            return Err(PipelineError::NodeNotInFlight(current));
        }
        debug!(
            pipeline = %self.name,
            node_id = %current,
            "feedback parked until execute returns"
        );
        inline.parked = Some(feedback);
        Ok(None)
    }

    fn mismatch(&self, current: NodeId, received: NodeId) -> PipelineError {
        warn!(
            pipeline = %self.name,
            current = %current,
            received = %received,
            "rejected feedback for a node that is not current"
        );
        PipelineError::FeedbackMismatch {
            pipeline: self.name.clone(),
            current,
            received,
        }
    }

    fn lock_inline(&self) -> std::sync::MutexGuard<'_, InlineFeedback> {
        self.inline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;
    use vispipe_core::{ProcessingUnit, Router};

    use super::*;
    use crate::definition::NodeConfig;

    struct AddOne;

    #[async_trait]
    impl ProcessingUnit for AddOne {
        fn name(&self) -> &str {
            "AddOne"
        }

        async fn execute(
            &self,
            payload: Payload,
            _context: &mut ExecutionContext,
            _handle: Arc<dyn PipelineHandle>,
        ) -> Result<Payload, PipelineError> {
            let n = payload
                .as_i64()
                .ok_or_else(|| PipelineError::unit("AddOne", "payload is not an integer"))?;
            Ok(json!(n + 1))
        }
    }

    /// Fails until `failures` invocations have happened.
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProcessingUnit for Flaky {
        fn name(&self) -> &str {
            "Flaky"
        }

        async fn execute(
            &self,
            payload: Payload,
            _context: &mut ExecutionContext,
            _handle: Arc<dyn PipelineHandle>,
        ) -> Result<Payload, PipelineError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(PipelineError::unit("Flaky", "index unavailable"));
            }
            Ok(payload)
        }
    }

    struct Panics;

    #[async_trait]
    impl ProcessingUnit for Panics {
        fn name(&self) -> &str {
            "Panics"
        }

        async fn execute(
            &self,
            _payload: Payload,
            _context: &mut ExecutionContext,
            _handle: Arc<dyn PipelineHandle>,
        ) -> Result<Payload, PipelineError> {
            panic!("tensor shape mismatch");
        }
    }

    /// Reports progress and records the context value it sees.
    struct Reporter;

    #[async_trait]
    impl ProcessingUnit for Reporter {
        fn name(&self) -> &str {
            "Reporter"
        }

        async fn execute(
            &self,
            _payload: Payload,
            context: &mut ExecutionContext,
            handle: Arc<dyn PipelineHandle>,
        ) -> Result<Payload, PipelineError> {
            let id = context.current_node_id();
            handle.node_progress(id, 10, 4);
            let progress = handle.get_node_progress(id);
            let collection = context.get("collection").cloned().unwrap_or_default();
            context.insert("seen_collection", collection);
            Ok(json!([progress.total, progress.done]))
        }
    }

    /// Blocks until released.
    struct Gate {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ProcessingUnit for Gate {
        fn name(&self) -> &str {
            "Gate"
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

    /// Asynchronous unit that answers from a spawned task.
    struct Deferred;

    #[async_trait]
    impl ProcessingUnit for Deferred {
        fn name(&self) -> &str {
            "Deferred"
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
            let node_id = context.current_node_id();
            tokio::spawn(async move {
                let doubled = json!(payload.as_i64().unwrap_or_default() * 2);
                let _ = handle
                    .async_feedback(NodeFeedback::success(node_id, doubled))
                    .await;
            });
            Ok(Payload::Null)
        }
    }

    /// Asynchronous unit that answers before `execute` returns.
    struct Inline;

    #[async_trait]
    impl ProcessingUnit for Inline {
        fn name(&self) -> &str {
            "Inline"
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
            let node_id = context.current_node_id();
            let tripled = json!(payload.as_i64().unwrap_or_default() * 3);
            let mut updates = Params::new();
            updates.insert("answered".into(), json!("inline"));
            handle
                .async_feedback(NodeFeedback::success(node_id, tripled).with_context(updates))
                .await?;

            let again = handle
                .async_feedback(NodeFeedback::success(node_id, Payload::Null))
                .await;
            if !matches!(again, Err(PipelineError::NodeNotInFlight(_))) {
                return Err(PipelineError::unit("Inline", "second answer was accepted"));
            }
            Ok(Payload::Null)
        }
    }

    /// Synchronous unit that wrongly reports feedback for its own node.
    struct Confused;

    #[async_trait]
    impl ProcessingUnit for Confused {
        fn name(&self) -> &str {
            "Confused"
        }

        async fn execute(
            &self,
            payload: Payload,
            context: &mut ExecutionContext,
            handle: Arc<dyn PipelineHandle>,
        ) -> Result<Payload, PipelineError> {
            let node_id = context.current_node_id();
            handle
                .async_feedback(NodeFeedback::success(node_id, Payload::Null))
                .await?;
            Ok(payload)
        }
    }

    /// Asynchronous unit that rewinds the engine's bookkeeping before answering.
    struct Meddler;

    #[async_trait]
    impl ProcessingUnit for Meddler {
        fn name(&self) -> &str {
            "Meddler"
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
            let node_id = context.current_node_id();
            context.set_node_status(NodeStatus::Init);
            context.advance_to(NodeId::FIRST);
            tokio::spawn(async move {
                let _ = handle
                    .async_feedback(NodeFeedback::success(node_id, payload))
                    .await;
            });
            Ok(Payload::Null)
        }
    }

    struct Finish;

    #[async_trait]
    impl Router for Finish {
        fn name(&self) -> &str {
            "Finish"
        }

        async fn next_node(
            &self,
            _output: &Payload,
            _context: &mut ExecutionContext,
            _handle: &dyn PipelineHandle,
            _params: &Params,
        ) -> Result<Option<NodeId>, PipelineError> {
            Ok(None)
        }
    }

    /// Routes to the id in `params["to"]`.
    struct Jump;

    #[async_trait]
    impl Router for Jump {
        fn name(&self) -> &str {
            "Jump"
        }

        async fn next_node(
            &self,
            _output: &Payload,
            _context: &mut ExecutionContext,
            _handle: &dyn PipelineHandle,
            params: &Params,
        ) -> Result<Option<NodeId>, PipelineError> {
            let to = params.get("to").and_then(|v| v.as_u64()).unwrap_or_default();
            Ok(NodeId::new(to as u32))
        }
    }

    fn to(id: u32) -> Params {
        json!({ "to": id }).as_object().cloned().unwrap_or_default()
    }

    async fn registry() -> Arc<PluginRegistry> {
        let registry = PluginRegistry::new();
        registry.register_unit(Arc::new(AddOne)).await.unwrap();
        registry.register_unit(Arc::new(Panics)).await.unwrap();
        registry.register_unit(Arc::new(Reporter)).await.unwrap();
        registry.register_unit(Arc::new(Deferred)).await.unwrap();
        registry.register_unit(Arc::new(Inline)).await.unwrap();
        registry.register_unit(Arc::new(Confused)).await.unwrap();
        registry.register_unit(Arc::new(Meddler)).await.unwrap();
        registry.register_router(Arc::new(Finish)).await.unwrap();
        registry.register_router(Arc::new(Jump)).await.unwrap();
        Arc::new(registry)
    }

    fn controller(registry: Arc<PluginRegistry>, nodes: Vec<NodeConfig>) -> PipelineController {
        let definition = Arc::new(PipelineDefinition::from_sequence(nodes).unwrap());
        PipelineController::builder("test", definition, registry)
            .build()
            .unwrap()
    }

    fn ids(trace: &[TraceEntry]) -> Vec<u32> {
        trace.iter().map(|e| e.node_id.get()).collect()
    }

    #[tokio::test]
    async fn sequential_run_threads_payload() {
        let ctl = controller(
            registry().await,
            vec![
                NodeConfig::new("a", "AddOne"),
                NodeConfig::new("b", "AddOne"),
            ],
        );
        let outcome = ctl.start(json!(10), Params::new()).await.unwrap();
        assert_eq!(outcome.state, RunState::Success);
        assert_eq!(outcome.output, Some(json!(12)));
        assert_eq!(ids(&ctl.trace()), vec![1, 2]);
        assert!(ctl.run_id().is_some());
    }

    #[tokio::test]
    async fn build_outside_runtime_is_an_error() {
        let definition = Arc::new(
            PipelineDefinition::from_sequence([NodeConfig::new("a", "AddOne")]).unwrap(),
        );
        let result = std::thread::spawn(move || {
            PipelineController::builder("test", definition, Arc::new(PluginRegistry::new())).build()
        })
        .join()
        .unwrap();
        assert!(matches!(result, Err(PipelineError::Internal(_))));
    }

    #[tokio::test]
    async fn router_may_end_the_run_early() {
        let ctl = controller(
            registry().await,
            vec![
                NodeConfig::new("a", "AddOne").with_router("Finish", Params::new()),
                NodeConfig::new("b", "AddOne"),
            ],
        );
        let outcome = ctl.start(json!(0), Params::new()).await.unwrap();
        assert_eq!(outcome.output, Some(json!(1)));
        assert_eq!(ids(&ctl.trace()), vec![1]);
        assert_eq!(ctl.trace()[0].router.as_deref(), Some("Finish"));
    }

    #[tokio::test]
    async fn exception_router_handles_failures() {
        let ctl = controller(
            registry().await,
            vec![
                NodeConfig::new("boom", "Panics").with_exception_router("Jump", to(3)),
                NodeConfig::new("skipped", "AddOne"),
                NodeConfig::new("fallback", "AddOne"),
            ],
        );
        // The failed node hands `null` on, which the fallback cannot increment.
        let outcome = ctl.start(json!(1), Params::new()).await.unwrap();
        assert_eq!(outcome.state, RunState::Error);

        let trace = ctl.trace();
        assert_eq!(ids(&trace), vec![1, 3]);
        assert_eq!(trace[0].status, CompletionStatus::Error);
        assert!(trace[0].status_message.contains("tensor shape mismatch"));
        assert_eq!(trace[0].router.as_deref(), Some("Jump"));
    }

    #[tokio::test]
    async fn panic_without_exception_router_halts() {
        let ctl = controller(registry().await, vec![NodeConfig::new("boom", "Panics")]);
        let outcome = ctl.start(json!(1), Params::new()).await.unwrap();
        assert_eq!(outcome.state, RunState::Error);
        assert_eq!(outcome.output, None);
        assert!(ctl.last_error().unwrap().contains("panicked"));
        assert_eq!(ctl.context().node_status(), NodeStatus::Error);
    }

    #[tokio::test]
    async fn router_to_undefined_node_halts() {
        let ctl = controller(
            registry().await,
            vec![NodeConfig::new("a", "AddOne").with_router("Jump", to(7))],
        );
        let outcome = ctl.start(json!(1), Params::new()).await.unwrap();
        assert_eq!(outcome.state, RunState::Error);
        assert!(ctl.last_error().unwrap().contains("node 7"));
    }

    #[tokio::test]
    async fn missing_router_halts() {
        let ctl = controller(
            registry().await,
            vec![NodeConfig::new("a", "AddOne").with_router("Nowhere", Params::new())],
        );
        let outcome = ctl.start(json!(1), Params::new()).await.unwrap();
        assert_eq!(outcome.state, RunState::Error);
        assert!(ctl.last_error().unwrap().contains("router/Nowhere"));
    }

    #[tokio::test]
    async fn resume_retries_the_failed_node_with_its_input() {
        let registry = registry().await;
        registry
            .register_unit(Arc::new(Flaky {
                failures: 1,
                calls: AtomicUsize::new(0),
            }))
            .await
            .unwrap();
        let ctl = controller(
            registry,
            vec![
                NodeConfig::new("a", "AddOne"),
                NodeConfig::new("flaky", "Flaky"),
                NodeConfig::new("c", "AddOne"),
            ],
        );

        let outcome = ctl.start(json!(0), Params::new()).await.unwrap();
        assert_eq!(outcome.state, RunState::Error);
        assert_eq!(ctl.current_node().get(), 2);

        ctl.resume().await.unwrap();
        let outcome = ctl.wait().await.unwrap();
        assert_eq!(outcome.state, RunState::Success);
        assert_eq!(outcome.output, Some(json!(2)));
        assert_eq!(ids(&ctl.trace()), vec![1, 2, 2, 3]);
        assert_eq!(ctl.last_error(), None);
    }

    #[tokio::test]
    async fn context_overrides_and_progress_are_visible_to_units() {
        let mut overrides = Params::new();
        overrides.insert("collection".into(), json!("jade"));
        let ctl = controller(
            registry().await,
            vec![NodeConfig::new("report", "Reporter").with_context(overrides)],
        );

        let outcome = ctl.start(Payload::Null, Params::new()).await.unwrap();
        assert_eq!(outcome.output, Some(json!([10, 4])));
        assert_eq!(ctl.context().get("seen_collection"), Some(&json!("jade")));
        assert_eq!(ctl.get_node_progress(NodeId::FIRST), NodeProgress::COMPLETE);
    }

    #[tokio::test]
    async fn caller_context_seeds_the_run() {
        let mut seed = Params::new();
        seed.insert("collection".into(), json!("landscape"));
        let ctl = controller(registry().await, vec![NodeConfig::new("report", "Reporter")]);
        ctl.start(Payload::Null, seed).await.unwrap();
        assert_eq!(ctl.context().get("seen_collection"), Some(&json!("landscape")));
    }

    #[tokio::test]
    async fn asynchronous_unit_completes_through_feedback() {
        let ctl = controller(
            registry().await,
            vec![
                NodeConfig::new("a", "AddOne"),
                NodeConfig::new("defer", "Deferred"),
                NodeConfig::new("c", "AddOne"),
            ],
        );
        let outcome = ctl.start(json!(1), Params::new()).await.unwrap();
        assert_eq!(outcome.state, RunState::Success);
        assert_eq!(outcome.output, Some(json!(5)));
        assert_eq!(ids(&ctl.trace()), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn feedback_sent_from_inside_execute_is_routed() {
        let ctl = controller(
            registry().await,
            vec![
                NodeConfig::new("inline", "Inline"),
                NodeConfig::new("c", "AddOne"),
            ],
        );
        let run = ctl.start(json!(2), Params::new());
        let outcome = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("run must not wait on its own feedback")
            .unwrap();

        assert_eq!(outcome.state, RunState::Success);
        assert_eq!(outcome.output, Some(json!(7)));
        assert_eq!(ids(&ctl.trace()), vec![1, 2]);
        assert_eq!(ctl.context().get("answered"), Some(&json!("inline")));
    }

    #[tokio::test]
    async fn synchronous_unit_cannot_answer_for_itself() {
        let ctl = controller(registry().await, vec![NodeConfig::new("confused", "Confused")]);
        let run = ctl.start(json!(1), Params::new());
        let outcome = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("run must not wait on its own feedback")
            .unwrap();

        assert_eq!(outcome.state, RunState::Error);
        assert!(ctl.last_error().unwrap().contains("not waiting"));
    }

    #[tokio::test]
    async fn units_cannot_move_the_engine_position() {
        let ctl = controller(
            registry().await,
            vec![
                NodeConfig::new("a", "AddOne"),
                NodeConfig::new("meddle", "Meddler"),
                NodeConfig::new("c", "AddOne"),
            ],
        );
        let outcome = ctl.start(json!(1), Params::new()).await.unwrap();
        assert_eq!(outcome.state, RunState::Success);
        assert_eq!(outcome.output, Some(json!(3)));
        assert_eq!(ids(&ctl.trace()), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn feedback_when_nothing_is_in_flight_is_rejected() {
        let ctl = controller(registry().await, vec![NodeConfig::new("a", "AddOne")]);
        ctl.start(json!(0), Params::new()).await.unwrap();

        let err = ctl
            .async_feedback(NodeFeedback::success(NodeId::FIRST, json!(9)))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NodeNotInFlight(_)));
        assert_eq!(ctl.trace().len(), 1);
        assert_eq!(ctl.output(), Some(json!(1)));
    }

    #[tokio::test]
    async fn pause_and_resume_around_a_running_node() {
        let registry = registry().await;
        let gate = Arc::new(Gate {
            entered: Notify::new(),
            release: Notify::new(),
        });
        registry.register_unit(gate.clone()).await.unwrap();
        let ctl = controller(
            registry,
            vec![NodeConfig::new("gate", "Gate"), NodeConfig::new("b", "AddOne")],
        );

        ctl.start_detached(json!(1), Params::new()).await.unwrap();
        gate.entered.notified().await;

        let pausing = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.pause().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pausing.is_finished());
        assert_eq!(ctl.status(), RunState::Pause);

        gate.release.notify_one();
        pausing.await.unwrap().unwrap();
        assert_eq!(ctl.status(), RunState::Pause);
        assert_eq!(ids(&ctl.trace()), vec![1]);
        assert_eq!(ctl.current_node().get(), 2);

        assert!(matches!(
            ctl.start(json!(0), Params::new()).await,
            Err(PipelineError::IllegalState { .. })
        ));

        ctl.resume().await.unwrap();
        let outcome = ctl.wait().await.unwrap();
        assert_eq!(outcome.state, RunState::Success);
        assert_eq!(outcome.output, Some(json!(2)));
    }

    #[tokio::test]
    async fn illegal_transitions_are_rejected() {
        let ctl = controller(registry().await, vec![NodeConfig::new("a", "AddOne")]);
        assert!(matches!(
            ctl.pause().await,
            Err(PipelineError::IllegalState { operation: "pause", .. })
        ));
        assert!(matches!(
            ctl.resume().await,
            Err(PipelineError::IllegalState { operation: "resume", .. })
        ));

        ctl.start(json!(0), Params::new()).await.unwrap();
        assert!(matches!(
            ctl.resume().await,
            Err(PipelineError::IllegalState { state: RunState::Success, .. })
        ));
    }

    #[tokio::test]
    async fn a_finished_controller_can_run_again() {
        let ctl = controller(registry().await, vec![NodeConfig::new("a", "AddOne")]);
        let first = ctl.start(json!(0), Params::new()).await.unwrap();
        let first_run = ctl.run_id();
        let second = ctl.start(json!(41), Params::new()).await.unwrap();

        assert_eq!(first.output, Some(json!(1)));
        assert_eq!(second.output, Some(json!(42)));
        assert_eq!(ctl.trace().len(), 1);
        assert_ne!(ctl.run_id(), first_run);
    }

    #[test]
    fn panic_messages_are_extracted() {
        assert_eq!(panic_message(&"boom"), "panicked: boom");
        assert_eq!(panic_message(&String::from("bang")), "panicked: bang");
        assert_eq!(panic_message(&42_u8), "panicked");
    }
}
