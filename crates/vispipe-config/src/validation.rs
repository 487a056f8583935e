// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes:
//! the log level, the default pipeline reference, and the shape of every
//! configured pipeline's node table.

use tracing::{debug, warn};

use crate::diagnostic::ConfigError;
use crate::model::VispipeConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &VispipeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let level = config.engine.log_level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "engine.log_level `{}` must be one of: {}",
                config.engine.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if let Some(name) = config.engine.default_pipeline.as_deref() {
        if !config.pipelines.contains_key(name) {
            errors.push(config.unknown_pipeline(name));
        }
    }

    for (name, pipeline) in &config.pipelines {
        if let Err(err) = pipeline.definition() {
            errors.push(ConfigError::InvalidPipeline {
                pipeline: name.clone(),
                message: err.to_string(),
            });
        }
    }

    if errors.is_empty() {
        debug!(
            pipelines = config.pipelines.len(),
            default_pipeline = config.engine.default_pipeline.as_deref().unwrap_or("-"),
            "configuration validated"
        );
        Ok(())
    } else {
        for err in &errors {
            warn!(error = %err, "configuration rejected");
        }
        Err(errors)
    }
}
