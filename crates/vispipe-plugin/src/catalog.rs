// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in plugin catalog.
//!
//! Describes the plugins compiled into every Vispipe build and registers them
//! into a registry. Processing units are supplied by the host application.

use std::sync::Arc;

use serde::Serialize;
use vispipe_core::{PipelineError, PluginKind};

use crate::builtin::GoToNode;
use crate::registry::PluginRegistry;

/// Display metadata for a built-in plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub kind: PluginKind,
    pub description: String,
    /// Router parameter or context keys the plugin reads.
    pub params: Vec<String>,
}

/// Returns descriptors for all built-in plugins.
pub fn builtin_catalog() -> Vec<PluginDescriptor> {
    vec![PluginDescriptor {
        name: GoToNode::NAME.to_string(),
        kind: PluginKind::Router,
        description: "Jump to a node by id or display name".to_string(),
        params: vec![
            crate::builtin::GOTO_NODE_ID.to_string(),
            crate::builtin::GOTO_NODE_NAME.to_string(),
        ],
    }]
}

/// Search the built-in catalog by name or description (case-insensitive).
///
/// An empty query returns every entry.
pub fn search_catalog(query: &str) -> Vec<PluginDescriptor> {
    if query.is_empty() {
        return builtin_catalog();
    }
    let query_lower = query.to_lowercase();
    builtin_catalog()
        .into_iter()
        .filter(|d| {
            d.name.to_lowercase().contains(&query_lower)
                || d.description.to_lowercase().contains(&query_lower)
        })
        .collect()
}

/// Register every built-in plugin into `registry`.
pub async fn register_builtins(registry: &PluginRegistry) -> Result<(), PipelineError> {
    registry.register_router(Arc::new(GoToNode)).await
}
