// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline testing.
//!
//! `TestHarness` assembles an isolated registry (with the built-in routers),
//! a sequentially numbered definition, a recording observer, and a controller.

use std::sync::Arc;

use serde_json::Value;
use vispipe_core::{Params, Payload, PipelineError, ProcessingUnit, Router, RunOutcome};
use vispipe_pipeline::{NodeConfig, PipelineController, PipelineDefinition};
use vispipe_plugin::{PluginRegistry, register_builtins};

use crate::observer::RecordingObserver;

/// Builder for creating test environments.
pub struct TestHarnessBuilder {
    name: String,
    units: Vec<Arc<dyn ProcessingUnit>>,
    routers: Vec<Arc<dyn Router>>,
    nodes: Vec<NodeConfig>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            name: "test".to_string(),
            units: Vec::new(),
            routers: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Set the pipeline name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Register a processing unit.
    pub fn with_unit(mut self, unit: Arc<dyn ProcessingUnit>) -> Self {
        self.units.push(unit);
        self
    }

    /// Register a router.
    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        self.routers.push(router);
        self
    }

    /// Append a node; nodes are numbered from 1 in the order they are added.
    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.nodes.push(node);
        self
    }

    /// Register every plugin and build the controller.
    pub async fn build(self) -> Result<TestHarness, PipelineError> {
        let registry = PluginRegistry::new();
        register_builtins(&registry).await?;
        for unit in self.units {
            registry.register_unit(unit).await?;
        }
        for router in self.routers {
            registry.register_router(router).await?;
        }
        let registry = Arc::new(registry);

        let definition = Arc::new(PipelineDefinition::from_sequence(self.nodes)?);
        let observer = Arc::new(RecordingObserver::new());
        let controller =
            PipelineController::builder(self.name, definition, Arc::clone(&registry))
                .observer(observer.clone())
                .build()?;

        Ok(TestHarness {
            controller,
            registry,
            observer,
        })
    }
}

/// A controller wired to an isolated registry and a recording observer.
pub struct TestHarness {
    pub controller: PipelineController,
    pub registry: Arc<PluginRegistry>,
    pub observer: Arc<RecordingObserver>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Start a run with an empty caller context and wait for it to stop running.
    pub async fn run(&self, payload: Payload) -> Result<RunOutcome, PipelineError> {
        self.controller.start(payload, Params::new()).await
    }

    /// Ids of the trace entries of the current run, in execution order.
    pub fn executed_ids(&self) -> Vec<u32> {
        self.controller
            .trace()
            .iter()
            .map(|entry| entry.node_id.get())
            .collect()
    }
}

/// Build a parameter map from a JSON object literal; anything else is empty.
pub fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}
