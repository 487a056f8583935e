// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./vispipe.toml` > `~/.config/vispipe/vispipe.toml` >
//! `/etc/vispipe/vispipe.toml` with environment variable overrides via the
//! `VISPIPE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed here

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::VispipeConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/vispipe/vispipe.toml";
pub(crate) const LOCAL_CONFIG: &str = "vispipe.toml";

/// `~/.config/vispipe/vispipe.toml` (or the platform equivalent).
pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vispipe/vispipe.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/vispipe/vispipe.toml` (system-wide)
/// 3. `~/.config/vispipe/vispipe.toml` (user XDG config)
/// 4. `./vispipe.toml` (local directory)
/// 5. `VISPIPE_*` environment variables
pub fn load_config() -> Result<VispipeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no environment).
pub fn load_config_from_str(toml_content: &str) -> Result<VispipeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(VispipeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<VispipeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(VispipeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(VispipeConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Environment variable provider with explicit section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `VISPIPE_ENGINE_LOG_LEVEL` must map to `engine.log_level`,
/// not `engine.log.level`. Pipelines are only configurable from files.
fn env_provider() -> Env {
    Env::prefixed("VISPIPE_")
        .filter(|key| key.as_str().starts_with("engine_"))
        .map(|key| key.as_str().replacen("engine_", "engine.", 1).into())
}
