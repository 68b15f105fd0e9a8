// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted campaign persistence.
//!
//! Contact lists are sealed with AES-256-GCM before they touch disk and only
//! decrypted transiently for dispatch. [`CampaignStore`] is the single entry
//! point; it owns the key material, enforces the retention horizon, and
//! writes the audit trail alongside every mutating operation.

pub mod crypto;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

use chrono::{DateTime, Duration, Utc};
use sendero_core::{
    Campaign, CampaignStats, Contact, DecryptedCampaign, DeliveryEvent, MessageRecord,
    MessageStatus, SenderoError,
};
use tracing::info;
use zeroize::Zeroizing;

pub use database::Database;
pub use models::{AuditEntry, NewCampaign};

/// Store facade over the campaign, message, and audit tables.
///
/// Holds the decoded encryption key (zeroized on drop) and the campaign TTL.
/// Cheap to clone; all clones share the same underlying connection.
#[derive(Clone)]
pub struct CampaignStore {
    db: Database,
    key: Zeroizing<[u8; 32]>,
    ttl: Duration,
}

impl CampaignStore {
    /// Build a store from an opened database, a hex-encoded 256-bit key, and
    /// the campaign TTL in hours.
    pub fn new(db: Database, key_hex: &str, ttl_hours: i64) -> Result<Self, SenderoError> {
        let key = crypto::decode_key(key_hex)?;
        Ok(Self {
            db,
            key,
            ttl: Duration::hours(ttl_hours),
        })
    }

    /// The underlying database handle, for maintenance operations.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Create a campaign whose retention horizon is `now + ttl`.
    pub async fn create(
        &self,
        draft: NewCampaign,
        contacts: &[Contact],
    ) -> Result<Campaign, SenderoError> {
        let now = Utc::now();
        self.create_at(draft, contacts, now, now + self.ttl).await
    }

    /// Create a campaign with explicit timestamps.
    pub async fn create_at(
        &self,
        draft: NewCampaign,
        contacts: &[Contact],
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Campaign, SenderoError> {
        let campaign =
            queries::campaigns::create(&self.db, &self.key, draft, contacts, created_at, expires_at)
                .await?;
        queries::audit::record(
            &self.db,
            "campaign.created",
            "campaign",
            &campaign.id,
            Some(serde_json::json!({
                "name": campaign.name,
                "total_contacts": campaign.total_contacts,
            })),
            false,
        )
        .await?;
        info!(campaign_id = %campaign.id, contacts = campaign.total_contacts, "campaign created");
        Ok(campaign)
    }

    /// Decrypt a campaign's contact list. Fails for expired campaigns.
    pub async fn get_decrypted(&self, id: &str) -> Result<DecryptedCampaign, SenderoError> {
        queries::campaigns::get_decrypted(&self.db, &self.key, id, Utc::now()).await
    }

    /// Campaign metadata without the encrypted payload.
    pub async fn get_meta(&self, id: &str) -> Result<Campaign, SenderoError> {
        queries::campaigns::get_meta(&self.db, id).await
    }

    /// All campaigns, newest first.
    pub async fn list(&self) -> Result<Vec<Campaign>, SenderoError> {
        queries::campaigns::list(&self.db).await
    }

    /// Claim a campaign for dispatch (`created -> sending`). At most one
    /// caller ever succeeds per campaign.
    pub async fn begin_dispatch(&self, id: &str) -> Result<(), SenderoError> {
        queries::campaigns::begin_dispatch(&self.db, id, Utc::now()).await?;
        queries::audit::record(&self.db, "campaign.dispatch_started", "campaign", id, None, false)
            .await
    }

    /// Finish a dispatch (`sending -> completed`).
    pub async fn complete_dispatch(
        &self,
        id: &str,
        details: serde_json::Value,
    ) -> Result<(), SenderoError> {
        queries::campaigns::complete_dispatch(&self.db, id, Utc::now()).await?;
        queries::audit::record(
            &self.db,
            "campaign.dispatch_completed",
            "campaign",
            id,
            Some(details),
            false,
        )
        .await
    }

    /// Abort a dispatch (`sending -> failed`).
    pub async fn mark_failed(&self, id: &str, reason: &str) -> Result<bool, SenderoError> {
        let transitioned = queries::campaigns::mark_failed(&self.db, id).await?;
        if transitioned {
            queries::audit::record(
                &self.db,
                "campaign.dispatch_failed",
                "campaign",
                id,
                Some(serde_json::json!({ "reason": reason })),
                false,
            )
            .await?;
        }
        Ok(transitioned)
    }

    /// Delete a campaign and its message records. Returns the number of
    /// message records removed, or `None` if the campaign did not exist.
    /// The audit entry is security-tagged: deletions survive pruning.
    pub async fn delete(&self, id: &str) -> Result<Option<u64>, SenderoError> {
        let removed = queries::campaigns::delete_cascade(&self.db, id).await?;
        if let Some(messages) = removed {
            queries::audit::record(
                &self.db,
                "campaign.deleted",
                "campaign",
                id,
                Some(serde_json::json!({ "messages_removed": messages })),
                true,
            )
            .await?;
            info!(campaign_id = %id, messages_removed = messages, "campaign deleted");
        }
        Ok(removed)
    }

    /// Campaigns past their retention horizon.
    pub async fn find_expired(&self) -> Result<Vec<String>, SenderoError> {
        queries::campaigns::find_expired(&self.db, Utc::now()).await
    }

    /// Campaigns created before `cutoff`, regardless of status.
    pub async fn find_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, SenderoError> {
        queries::campaigns::find_created_before(&self.db, cutoff).await
    }

    /// Crash recovery: fail every campaign left in `sending` by a previous
    /// process. Returns the number of campaigns recovered.
    pub async fn recover_stale_sending(&self) -> Result<u64, SenderoError> {
        let recovered = queries::campaigns::recover_stale_sending(&self.db).await?;
        if recovered > 0 {
            queries::audit::record(
                &self.db,
                "campaign.stale_sending_recovered",
                "campaign",
                "*",
                Some(serde_json::json!({ "count": recovered })),
                true,
            )
            .await?;
        }
        Ok(recovered)
    }

    /// Insert one message record.
    pub async fn insert_message(&self, record: &MessageRecord) -> Result<(), SenderoError> {
        queries::messages::insert(&self.db, record).await
    }

    /// All message records for a campaign, in insertion order.
    pub async fn messages(&self, campaign_id: &str) -> Result<Vec<MessageRecord>, SenderoError> {
        queries::messages::list_for_campaign(&self.db, campaign_id).await
    }

    /// Failed messages still under the attempt ceiling.
    pub async fn failed_messages(
        &self,
        campaign_id: &str,
        max_attempts: i64,
    ) -> Result<Vec<MessageRecord>, SenderoError> {
        queries::messages::failed_below_attempts(&self.db, campaign_id, max_attempts).await
    }

    /// Record the outcome of one send attempt.
    pub async fn record_attempt(
        &self,
        message_id: &str,
        status: MessageStatus,
        provider_message_id: Option<&str>,
        error_message: Option<&str>,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), SenderoError> {
        queries::messages::record_attempt(
            &self.db,
            message_id,
            status,
            provider_message_id,
            error_message,
            sent_at,
        )
        .await
    }

    /// Merge one provider delivery callback into its message record.
    /// Returns `false` for unknown provider message ids.
    pub async fn apply_delivery_event(
        &self,
        provider_message_id: &str,
        event: &DeliveryEvent,
    ) -> Result<bool, SenderoError> {
        queries::messages::apply_delivery_event(&self.db, provider_message_id, event, Utc::now())
            .await
    }

    /// Per-status counts for a campaign.
    pub async fn stats(&self, campaign_id: &str) -> Result<CampaignStats, SenderoError> {
        self.get_meta(campaign_id).await?;
        queries::messages::stats(&self.db, campaign_id).await
    }

    /// Prune routine audit entries older than `cutoff`.
    pub async fn prune_audit_before(&self, cutoff: DateTime<Utc>) -> Result<u64, SenderoError> {
        queries::audit::prune_before(&self.db, cutoff).await
    }

    /// Most recent audit entries, newest first.
    pub async fn recent_audit(&self, limit: u64) -> Result<Vec<AuditEntry>, SenderoError> {
        queries::audit::recent(&self.db, limit).await
    }
}
