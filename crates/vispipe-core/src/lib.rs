// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Vispipe pipeline engine.
//!
//! This crate provides the error type, the shared data model (node ids, run
//! and node states, trace entries, the execution context), and the capability
//! traits that processing units and routers implement.

pub mod context;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use context::ExecutionContext;
pub use error::PipelineError;
pub use types::{
    CompletionStatus, NodeFeedback, NodeId, NodeProgress, NodeStatus, Params, Payload,
    PluginKind, RunOutcome, RunReport, RunState, TraceEntry,
};

pub use traits::{NoopObserver, PipelineHandle, PipelineObserver, ProcessingUnit, Router};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;

    struct Doubler;

    #[async_trait]
    impl ProcessingUnit for Doubler {
        fn name(&self) -> &str {
            "Doubler"
        }

        async fn execute(
            &self,
            payload: Payload,
            _context: &mut ExecutionContext,
            _handle: Arc<dyn PipelineHandle>,
        ) -> Result<Payload, PipelineError> {
            let n = payload
                .as_i64()
                .ok_or_else(|| PipelineError::unit(self.name(), "payload is not an integer"))?;
            Ok(Payload::from(n * 2))
        }
    }

    #[tokio::test]
    async fn unit_defaults_are_synchronous_and_initialize_ok() {
        let unit = Doubler;
        assert!(!unit.is_asynchronous());
        assert!(unit.initialize().await.is_ok());
    }

    #[test]
    fn all_traits_are_object_safe() {
        // If any trait stops being dyn-compatible this test won't compile.
        fn _unit(_: Arc<dyn ProcessingUnit>) {}
        fn _router(_: Arc<dyn Router>) {}
        fn _handle(_: Arc<dyn PipelineHandle>) {}
        fn _observer(_: Arc<dyn PipelineObserver>) {}
    }

    #[test]
    fn noop_observer_accepts_events() {
        let observer = NoopObserver;
        observer.node_started("p", NodeId::FIRST, "first");
    }
}
