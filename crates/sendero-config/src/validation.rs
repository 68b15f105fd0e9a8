// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as key material length, positive rates, and non-empty
//! paths.

use thiserror::Error;

use crate::model::SenderoConfig;

/// A single configuration problem, suitable for direct display.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config files/env vars could not be parsed or merged.
    #[error("config parse error: {message}")]
    Parse { message: String },

    /// A semantic constraint on a config value failed.
    #[error("invalid config: {message}")]
    Validation { message: String },
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or all collected validation
/// errors (does not fail fast).
pub fn validate_config(config: &SenderoConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.service.bind_address.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "service.bind_address must not be empty".to_string(),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.campaign.ttl_hours == 0 {
        errors.push(ConfigError::Validation {
            message: "campaign.ttl_hours must be greater than zero".to_string(),
        });
    }

    if let Some(ref key) = config.campaign.encryption_key {
        match hex::decode(key) {
            Ok(bytes) if bytes.len() == 32 => {}
            Ok(bytes) => errors.push(ConfigError::Validation {
                message: format!(
                    "campaign.encryption_key must decode to 32 bytes, got {}",
                    bytes.len()
                ),
            }),
            Err(e) => errors.push(ConfigError::Validation {
                message: format!("campaign.encryption_key is not valid hex: {e}"),
            }),
        }
    }

    if !config.dispatch.rate_per_second.is_finite() || config.dispatch.rate_per_second <= 0.0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "dispatch.rate_per_second must be a positive number, got {}",
                config.dispatch.rate_per_second
            ),
        });
    }

    if config.dispatch.default_max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.default_max_attempts must be at least 1".to_string(),
        });
    }

    if config
        .ingest
        .default_country_code
        .bytes()
        .any(|b| !b.is_ascii_digit())
        || config.ingest.default_country_code.is_empty()
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "ingest.default_country_code must be digits only, got `{}`",
                config.ingest.default_country_code
            ),
        });
    }

    if config.provider.timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "provider.timeout_secs must be greater than zero".to_string(),
        });
    }

    if config.sweep.interval_minutes == 0 {
        errors.push(ConfigError::Validation {
            message: "sweep.interval_minutes must be greater than zero".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Print collected configuration errors to stderr, one per line.
pub fn render_errors(errors: &[ConfigError]) {
    for err in errors {
        eprintln!("error: {err}");
    }
}
