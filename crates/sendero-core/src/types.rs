// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Sendero workspace.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Campaign lifecycle status.
///
/// Transitions are enforced by the store via atomic conditional updates:
/// `created -> sending -> completed`, with `sending -> failed` on
/// unrecoverable dispatch errors. Dispatch is at-most-once per campaign.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Created,
    Sending,
    Completed,
    Failed,
}

/// Per-message delivery status.
///
/// `read` is not a distinct status; a read callback sets `read_at` on a
/// delivered record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Sent,
    Delivered,
    Failed,
    Undelivered,
}

/// Status carried by an asynchronous provider delivery callback.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Sent,
    Delivered,
    Read,
    Failed,
    Undelivered,
}

/// An asynchronous delivery-status callback from the provider.
///
/// Webhook delivery is at-least-once and possibly out of order; the
/// reconciler merges these idempotently into the matching record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub status: CallbackStatus,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// A single contact parsed from an uploaded file.
///
/// Contacts exist only inside the decrypted campaign payload and are never
/// persisted unencrypted. Extra columns from the source file become
/// template-variable candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    /// Normalized to `+<countrycode><number>`, 10-15 digits.
    pub phone: String,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// Returns true if `phone` is a normalized `+<digits>` number of 10-15 digits.
pub fn is_valid_phone(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    (10..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Campaign metadata. The encrypted contact blob stays inside the store and
/// is never exposed through this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    /// Reference to an external, pre-approved message template.
    pub template_id: String,
    /// Set once at creation; immutable.
    pub total_contacts: i64,
    pub status: CampaignStatus,
    /// Template placeholder -> contact column name.
    pub variable_mappings: BTreeMap<String, String>,
    /// Template placeholder -> literal fallback value.
    pub default_values: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    /// Fixed retention horizon; immutable after creation.
    pub expires_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A campaign together with its decrypted contact list.
#[derive(Debug, Clone)]
pub struct DecryptedCampaign {
    pub campaign: Campaign,
    pub contacts: Vec<Contact>,
}

/// One outbound message, tracked from send attempt through delivery callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub campaign_id: String,
    pub phone_number: String,
    /// Set when the provider accepts the send; the only key the reconciler
    /// may use to locate this record.
    pub provider_message_id: Option<String>,
    pub template_variables: BTreeMap<String, String>,
    pub status: MessageStatus,
    pub attempts: i64,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Aggregate outcome of one dispatch invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub total_sent: u64,
    pub successful: u64,
    pub failed: u64,
}

/// Aggregate outcome of one retry invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryResult {
    pub retried: u64,
    pub successful: u64,
    pub still_failed: u64,
}

/// Per-status message counts for a campaign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStats {
    pub total: u64,
    pub queued: u64,
    pub sent: u64,
    pub delivered: u64,
    pub read: u64,
    pub failed: u64,
    pub undelivered: u64,
}
