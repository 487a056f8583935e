// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution context threaded through a pipeline run.
//!
//! The context is a side channel distinct from the payload. The engine owns the
//! reserved fields (current node, node status, node start time); everything else
//! is a free-form JSON map populated by node `context_overrides`, by the caller of
//! `start`, and by processing units and routers while they hold the context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{NodeId, NodeStatus, Params};

/// Mutable record owned by the controller and lent to one unit or router at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    current_node_id: NodeId,
    node_status: NodeStatus,
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    values: Params,
}

impl ExecutionContext {
    /// A fresh context positioned on the first node, seeded with caller values.
    pub fn new(values: Params) -> Self {
        Self {
            current_node_id: NodeId::FIRST,
            node_status: NodeStatus::Init,
            start_time: None,
            values,
        }
    }

    pub fn current_node_id(&self) -> NodeId {
        self.current_node_id
    }

    pub fn node_status(&self) -> NodeStatus {
        self.node_status
    }

    /// When the current node was last started.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Insert a free-form value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Merge `updates` into the free-form values; later keys win.
    pub fn merge(&mut self, updates: &Params) {
        for (key, value) in updates {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn values(&self) -> &Params {
        &self.values
    }

    /// Engine bookkeeping: mark `node_id` as running from `started_at`.
    #[doc(hidden)]
    pub fn enter_node(&mut self, node_id: NodeId, started_at: DateTime<Utc>) {
        self.current_node_id = node_id;
        self.node_status = NodeStatus::Running;
        self.start_time = Some(started_at);
    }

    /// Engine bookkeeping: record the status of the current node.
    #[doc(hidden)]
    pub fn set_node_status(&mut self, status: NodeStatus) {
        self.node_status = status;
    }

    /// Engine bookkeeping: point the context at the next node to execute.
    #[doc(hidden)]
    pub fn advance_to(&mut self, node_id: NodeId) {
        self.current_node_id = node_id;
        self.node_status = NodeStatus::Init;
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Params::new())
    }
}
