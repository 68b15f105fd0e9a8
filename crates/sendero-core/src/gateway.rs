// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider gateway boundary.
//!
//! The messaging provider is a downstream black box reached over HTTP. The
//! dispatch engine only requires this trait; production code uses the
//! reqwest-backed client in `sendero-provider`, tests substitute mocks.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::SenderoError;

/// One provider-ready send request for a single contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    /// Normalized destination number (`+<digits>`).
    pub to: String,
    pub template_id: String,
    /// Resolved placeholder -> value map.
    pub variables: BTreeMap<String, String>,
}

/// Structured outcome of one provider send attempt.
///
/// Per-message failures (HTTP errors, provider rejections, timeouts) are
/// reported as `Rejected`, never as `Err` — a single bad send must not
/// abort the remaining batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Accepted {
        provider_message_id: String,
    },
    Rejected {
        error_code: Option<String>,
        error_message: String,
    },
}

/// Outbound client boundary to the messaging provider.
///
/// Implementations must bound every call with a timeout so a stalled send
/// cannot stall the dispatch loop indefinitely.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn send(&self, request: &SendRequest) -> Result<SendOutcome, SenderoError>;
}
