// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./sendero.toml` > `~/.config/sendero/sendero.toml`
//! > `/etc/sendero/sendero.toml` with environment variable overrides via the
//! `SENDERO_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::SenderoConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/sendero/sendero.toml` (system-wide)
/// 3. `~/.config/sendero/sendero.toml` (user XDG config)
/// 4. `./sendero.toml` (local directory)
/// 5. `SENDERO_*` environment variables
pub fn load_config() -> Result<SenderoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SenderoConfig::default()))
        .merge(Toml::file("/etc/sendero/sendero.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("sendero/sendero.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("sendero.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<SenderoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SenderoConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<SenderoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SenderoConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `SENDERO_DISPATCH_RATE_PER_SECOND` must
/// map to `dispatch.rate_per_second`, not `dispatch.rate.per.second`.
fn env_provider() -> Env {
    Env::prefixed("SENDERO_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("service_", "service.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("campaign_", "campaign.", 1)
            .replacen("ingest_", "ingest.", 1)
            .replacen("dispatch_", "dispatch.", 1)
            .replacen("provider_", "provider.", 1)
            .replacen("callback_", "callback.", 1)
            .replacen("sweep_", "sweep.", 1);
        mapped.into()
    })
}
