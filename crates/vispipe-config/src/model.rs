// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Vispipe pipeline engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vispipe_core::PipelineError;
use vispipe_pipeline::{NodeConfig, PipelineDefinition};

use crate::diagnostic::{ConfigError, suggest_key};

/// Top-level Vispipe configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VispipeConfig {
    /// Engine-wide settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Named pipeline definitions.
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineConfig>,
}

/// Engine-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Pipeline used when a command does not name one.
    #[serde(default)]
    pub default_pipeline: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            default_pipeline: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One named pipeline.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub description: Option<String>,

    /// Nodes keyed by stringified id (`"1"`, `"2"`, ...).
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeConfig>,
}

impl PipelineConfig {
    /// Validate the node table into a shareable definition.
    pub fn definition(&self) -> Result<PipelineDefinition, PipelineError> {
        PipelineDefinition::from_nodes(self.nodes.clone())
    }

    /// Render the pipeline back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Other(e.to_string()))
    }
}

impl VispipeConfig {
    /// Look up a pipeline by name, suggesting a close match when it is missing.
    pub fn pipeline(&self, name: &str) -> Result<&PipelineConfig, ConfigError> {
        self.pipelines
            .get(name)
            .ok_or_else(|| self.unknown_pipeline(name))
    }

    /// The named pipeline, or the configured default when `name` is `None`.
    pub fn resolve_pipeline<'a>(
        &'a self,
        name: Option<&'a str>,
    ) -> Result<(&'a str, &'a PipelineConfig), ConfigError> {
        let name = name
            .or(self.engine.default_pipeline.as_deref())
            .ok_or_else(|| ConfigError::Validation {
                message: "no pipeline named and engine.default_pipeline is not set".to_string(),
            })?;
        Ok((name, self.pipeline(name)?))
    }

    /// Validated definitions for every configured pipeline.
    pub fn definitions(&self) -> Result<BTreeMap<String, Arc<PipelineDefinition>>, PipelineError> {
        self.pipelines
            .iter()
            .map(|(name, pipeline)| {
                let definition = pipeline.definition().map_err(|e| {
                    PipelineError::Config(format!("pipeline `{name}`: {e}"))
                })?;
                Ok((name.clone(), Arc::new(definition)))
            })
            .collect()
    }

    pub(crate) fn unknown_pipeline(&self, name: &str) -> ConfigError {
        let names: Vec<&str> = self.pipelines.keys().map(String::as_str).collect();
        ConfigError::UnknownPipeline {
            name: name.to_string(),
            suggestion: suggest_key(name, &names),
            available: names.join(", "),
        }
    }
}
