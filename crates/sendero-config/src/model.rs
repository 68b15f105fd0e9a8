// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Sendero campaign pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Sendero configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SenderoConfig {
    /// Service identity and HTTP surface settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Campaign retention and encryption settings.
    #[serde(default)]
    pub campaign: CampaignConfig,

    /// Contact file ingestion settings.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Outbound dispatch pacing settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Messaging provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Delivery callback authentication settings.
    #[serde(default)]
    pub callback: CallbackConfig,

    /// Expiry sweep settings.
    #[serde(default)]
    pub sweep: SweepConfig,
}

/// Service identity and HTTP surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bind address for the HTTP surface (lifecycle API + callbacks).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1:8787".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("sendero").join("sendero.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "sendero.db".to_string())
}

/// Campaign retention and encryption configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    /// Retention horizon in hours. `expires_at = created_at + ttl_hours`,
    /// fixed at creation.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,

    /// Hex-encoded 32-byte AES-256-GCM key for contact-list encryption.
    /// Loaded once at startup; required for any campaign operation.
    #[serde(default)]
    pub encryption_key: Option<String>,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            encryption_key: None,
        }
    }
}

fn default_ttl_hours() -> u64 {
    720 // 30 days
}

/// Contact file ingestion configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Country code prefixed to bare 10-digit local numbers.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            default_country_code: default_country_code(),
        }
    }
}

fn default_country_code() -> String {
    "57".to_string()
}

/// Outbound dispatch pacing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Maximum sends per second. Sends are issued serially at a fixed
    /// inter-message delay of `1 / rate_per_second`.
    #[serde(default = "default_rate_per_second")]
    pub rate_per_second: f64,

    /// Default attempt ceiling for the retry operation.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            rate_per_second: default_rate_per_second(),
            default_max_attempts: default_max_attempts(),
        }
    }
}

fn default_rate_per_second() -> f64 {
    1.0
}

fn default_max_attempts() -> u32 {
    3
}

/// Messaging provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL of the provider messages endpoint.
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Bearer token for the provider API. `None` disables outbound sends.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Bounded timeout for every provider call, in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,

    /// Language code sent with template messages.
    #[serde(default = "default_template_language")]
    pub template_language: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            api_token: None,
            timeout_secs: default_provider_timeout_secs(),
            template_language: default_template_language(),
        }
    }
}

fn default_provider_base_url() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_template_language() -> String {
    "es".to_string()
}

/// Delivery callback authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CallbackConfig {
    /// HMAC-SHA256 secret for `X-Signature` verification of delivery
    /// callbacks. `None` rejects all callbacks (fail-closed).
    #[serde(default)]
    pub signing_secret: Option<String>,
}

/// Expiry sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    /// Interval between routine sweep ticks, in minutes.
    #[serde(default = "default_sweep_interval_minutes")]
    pub interval_minutes: u64,

    /// Aggressive sweep: campaigns older than this are purged regardless
    /// of status.
    #[serde(default = "default_aggressive_age_hours")]
    pub aggressive_age_hours: u64,

    /// Aggressive sweep: audit-log retention window. Security-tagged
    /// entries are exempt.
    #[serde(default = "default_log_retention_hours")]
    pub log_retention_hours: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_sweep_interval_minutes(),
            aggressive_age_hours: default_aggressive_age_hours(),
            log_retention_hours: default_log_retention_hours(),
        }
    }
}

fn default_sweep_interval_minutes() -> u64 {
    60
}

fn default_aggressive_age_hours() -> u64 {
    48
}

fn default_log_retention_hours() -> u64 {
    72
}
