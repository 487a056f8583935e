// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pipeline definitions: the validated, immutable node table a controller runs.
//!
//! A definition document maps stringified node ids (`"1"`, `"2"`, ...) to
//! [`NodeConfig`] objects. Ids must form the contiguous range `1..=N`, so the
//! implicit successor of a node is computed arithmetically.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use vispipe_core::{NodeId, Params, PipelineError};

/// Wiring of a single node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// Display label, also used by name-based routing.
    #[serde(default)]
    pub name: String,

    /// Name of the processing unit to execute.
    #[serde(alias = "processor")]
    pub unit: String,

    /// Merged into the execution context before the unit runs.
    #[serde(default, alias = "context")]
    pub context_overrides: Params,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub router: Option<String>,

    #[serde(default, alias = "router_para")]
    pub router_params: Params,

    /// Router used when the unit fails. Without one a failure halts the run.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub exception_router: Option<String>,

    #[serde(default, alias = "exception_router_para")]
    pub exception_router_params: Params,
}

impl NodeConfig {
    /// A node with no routers or overrides.
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            context_overrides: Params::new(),
            router: None,
            router_params: Params::new(),
            exception_router: None,
            exception_router_params: Params::new(),
        }
    }

    pub fn with_router(mut self, router: impl Into<String>, params: Params) -> Self {
        self.router = Some(router.into());
        self.router_params = params;
        self
    }

    pub fn with_exception_router(mut self, router: impl Into<String>, params: Params) -> Self {
        self.exception_router = Some(router.into());
        self.exception_router_params = params;
        self
    }

    pub fn with_context(mut self, overrides: Params) -> Self {
        self.context_overrides = overrides;
        self
    }
}

/// An empty router name means "no router".
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|name| !name.trim().is_empty()))
}

/// Validated node table, indexed by dense node id.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDefinition {
    nodes: Vec<NodeConfig>,
}

impl PipelineDefinition {
    /// Parse and validate a JSON definition document.
    pub fn from_json(document: &str) -> Result<Self, PipelineError> {
        let nodes: BTreeMap<String, NodeConfig> = serde_json::from_str(document)
            .map_err(|e| PipelineError::Validation(format!("malformed document: {e}")))?;
        Self::from_nodes(nodes)
    }

    /// Number `nodes` sequentially from 1 in iteration order.
    pub fn from_sequence(
        nodes: impl IntoIterator<Item = NodeConfig>,
    ) -> Result<Self, PipelineError> {
        let nodes = nodes
            .into_iter()
            .enumerate()
            .map(|(index, node)| ((index + 1).to_string(), node))
            .collect();
        Self::from_nodes(nodes)
    }

    /// Validate a node table keyed by stringified ids.
    pub fn from_nodes(nodes: BTreeMap<String, NodeConfig>) -> Result<Self, PipelineError> {
        if nodes.is_empty() {
            return Err(PipelineError::Validation(
                "pipeline must define at least one node".into(),
            ));
        }

        let mut by_id = BTreeMap::new();
        for (key, node) in nodes {
            let id: NodeId = key.parse()?;
            if node.unit.trim().is_empty() {
                return Err(PipelineError::Validation(format!(
                    "node {id} does not name a processing unit"
                )));
            }
            by_id.insert(id, node);
        }

        // Keys are distinct positive integers, so the range is dense exactly
        // when the largest id equals the node count.
        let count = by_id.len();
        if let Some((&last, _)) = by_id.last_key_value() {
            if last.get() as usize != count {
                let missing = (1..=last.get())
                    .filter_map(NodeId::new)
                    .find(|id| !by_id.contains_key(id))
                    .map_or_else(String::new, |id| format!(" (node {id} is missing)"));
                return Err(PipelineError::Validation(format!(
                    "node ids must be contiguous from 1 to {count}{missing}"
                )));
            }
        }

        Ok(Self {
            nodes: by_id.into_values().collect(),
        })
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeConfig> {
        self.nodes.get(id.index())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a validated definition.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Implicit sequential successor: `id + 1` if it is defined.
    pub fn successor(&self, id: NodeId) -> Option<NodeId> {
        id.next().filter(|next| self.contains(*next))
    }

    /// First node, in id order, whose display name is `name`.
    pub fn node_id_by_name(&self, name: &str) -> Option<NodeId> {
        self.iter().find(|(_, node)| node.name == name).map(|(id, _)| id)
    }

    /// Nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &NodeConfig)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| {
                let id = NodeId::new(u32::try_from(index + 1).ok()?)?;
                Some((id, node))
            })
    }

    /// Distinct unit names referenced by the definition.
    pub fn unit_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.iter().map(|n| n.unit.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Distinct router names (regular and exception) referenced by the definition.
    pub fn router_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .nodes
            .iter()
            .flat_map(|n| [n.router.as_deref(), n.exception_router.as_deref()])
            .flatten()
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl TryFrom<BTreeMap<String, NodeConfig>> for PipelineDefinition {
    type Error = PipelineError;

    fn try_from(nodes: BTreeMap<String, NodeConfig>) -> Result<Self, Self::Error> {
        Self::from_nodes(nodes)
    }
}
