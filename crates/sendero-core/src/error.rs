// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Sendero campaign pipeline.

use thiserror::Error;

/// The primary error type used across all Sendero crates.
///
/// Per-contact and per-message failures are never surfaced through this type;
/// they are swallowed into `MessageRecord` status/error fields so a single
/// bad contact cannot sink a campaign. This enum covers campaign-level and
/// infrastructure failures only.
#[derive(Debug, Error)]
pub enum SenderoError {
    /// Configuration errors (invalid TOML, missing required fields, bad key material).
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed input file or contact data that prevents the whole operation.
    #[error("validation error: {0}")]
    Validation(String),

    /// The uploaded file yielded zero valid contacts.
    #[error("no valid contacts remain after validation")]
    EmptyInput,

    /// Referenced campaign does not exist.
    #[error("campaign not found: {campaign_id}")]
    NotFound { campaign_id: String },

    /// Campaign is past its retention horizon; its data is inaccessible by design.
    #[error("campaign {campaign_id} is past its retention window")]
    Expired { campaign_id: String },

    /// Campaign status forbids the requested transition (e.g. dispatch of a
    /// campaign that is already sending or completed). Callers must not
    /// retry automatically.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Provider gateway errors (request construction, unusable response).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Encryption, persistence, or decryption failure. Fatal for the
    /// enclosing operation.
    #[error("store error: {source}")]
    Store {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SenderoError {
    /// Wrap an arbitrary error as a store failure.
    pub fn store<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SenderoError::Store {
            source: Box::new(source),
        }
    }
}
