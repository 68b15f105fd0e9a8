// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign dispatch.
//!
//! Dispatch claims the campaign with an atomic `created -> sending`
//! transition, decrypts the contact list, and sends serially through the
//! pacer. Per-contact failures become `failed` message records; only
//! campaign-level failures (decryption, storage) abort the run, which then
//! lands the campaign in `failed`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sendero_core::{
    Contact, DispatchResult, MessageRecord, MessageStatus, ProviderGateway, RetryResult,
    SendOutcome, SendRequest, SenderoError, is_valid_phone,
};
use sendero_store::CampaignStore;
use tracing::{info, warn};

use crate::pacer::Pacer;

/// Drives campaign dispatch and retry against the store and the provider.
#[derive(Clone)]
pub struct DispatchEngine {
    store: CampaignStore,
    gateway: Arc<dyn ProviderGateway>,
    rate_per_second: f64,
    default_max_attempts: i64,
}

impl DispatchEngine {
    pub fn new(
        store: CampaignStore,
        gateway: Arc<dyn ProviderGateway>,
        rate_per_second: f64,
        default_max_attempts: i64,
    ) -> Self {
        Self {
            store,
            gateway,
            rate_per_second,
            default_max_attempts,
        }
    }

    /// Dispatch a campaign once: one message record per contact, paced
    /// serial sends, then `sending -> completed`.
    ///
    /// A second concurrent or later call fails with `Conflict` before any
    /// provider traffic.
    pub async fn dispatch(&self, campaign_id: &str) -> Result<DispatchResult, SenderoError> {
        self.store.begin_dispatch(campaign_id).await?;

        match self.run_dispatch(campaign_id).await {
            Ok(result) => Ok(result),
            Err(e) => {
                // Campaign-level failure: park the campaign in `failed` so
                // the claim is not stuck in `sending` forever.
                let reason = e.to_string();
                if let Err(mark_err) = self.store.mark_failed(campaign_id, &reason).await {
                    warn!(campaign_id, error = %mark_err, "failed to mark campaign failed");
                }
                Err(e)
            }
        }
    }

    async fn run_dispatch(&self, campaign_id: &str) -> Result<DispatchResult, SenderoError> {
        let decrypted = self.store.get_decrypted(campaign_id).await?;
        let campaign = &decrypted.campaign;
        let mut pacer = Pacer::new(self.rate_per_second)?;

        let mut successful: u64 = 0;
        let mut failed: u64 = 0;

        for contact in &decrypted.contacts {
            let variables = resolve_variables(
                contact,
                &campaign.variable_mappings,
                &campaign.default_values,
            );

            let mut record = MessageRecord {
                id: uuid::Uuid::new_v4().to_string(),
                campaign_id: campaign_id.to_string(),
                phone_number: contact.phone.clone(),
                provider_message_id: None,
                template_variables: variables.clone(),
                status: MessageStatus::Failed,
                attempts: 1,
                error_message: None,
                sent_at: None,
                delivered_at: None,
                read_at: None,
            };

            // Malformed numbers never reach the provider and consume no
            // send slot.
            if !is_valid_phone(&contact.phone) {
                record.error_message = Some("invalid phone number".to_string());
                self.store.insert_message(&record).await?;
                failed += 1;
                continue;
            }

            pacer.pace().await;
            let request = SendRequest {
                to: contact.phone.clone(),
                template_id: campaign.template_id.clone(),
                variables,
            };
            // A gateway error is a per-message failure like any rejection;
            // the rest of the batch still goes out.
            let outcome = self.gateway.send(&request).await.unwrap_or_else(|e| {
                warn!(campaign_id, phone = %contact.phone, error = %e, "provider send errored");
                SendOutcome::Rejected {
                    error_code: None,
                    error_message: e.to_string(),
                }
            });
            match outcome {
                SendOutcome::Accepted {
                    provider_message_id,
                } => {
                    record.status = MessageStatus::Sent;
                    record.provider_message_id = Some(provider_message_id);
                    record.sent_at = Some(Utc::now());
                    successful += 1;
                }
                SendOutcome::Rejected {
                    error_code,
                    error_message,
                } => {
                    record.error_message = Some(match error_code {
                        Some(code) => format!("{code}: {error_message}"),
                        None => error_message,
                    });
                    failed += 1;
                }
            }
            self.store.insert_message(&record).await?;
        }

        let result = DispatchResult {
            total_sent: successful + failed,
            successful,
            failed,
        };
        self.store
            .complete_dispatch(
                campaign_id,
                serde_json::json!({
                    "total_sent": result.total_sent,
                    "successful": result.successful,
                    "failed": result.failed,
                }),
            )
            .await?;
        info!(
            campaign_id,
            successful, failed, "campaign dispatch completed"
        );
        Ok(result)
    }

    /// Re-send failed messages still under the attempt ceiling. Each retry
    /// bumps the existing record's attempt counter in place; no new records
    /// are created. Expired campaigns cannot be retried.
    pub async fn retry(
        &self,
        campaign_id: &str,
        max_attempts: Option<i64>,
    ) -> Result<RetryResult, SenderoError> {
        let campaign = self.store.get_meta(campaign_id).await?;
        if Utc::now() > campaign.expires_at {
            return Err(SenderoError::Expired {
                campaign_id: campaign_id.to_string(),
            });
        }

        let ceiling = max_attempts.unwrap_or(self.default_max_attempts);
        let candidates = self.store.failed_messages(campaign_id, ceiling).await?;

        let mut pacer = Pacer::new(self.rate_per_second)?;
        let mut successful: u64 = 0;
        let mut still_failed: u64 = 0;

        for message in &candidates {
            if !is_valid_phone(&message.phone_number) {
                self.store
                    .record_attempt(
                        &message.id,
                        MessageStatus::Failed,
                        None,
                        Some("invalid phone number"),
                        None,
                    )
                    .await?;
                still_failed += 1;
                continue;
            }

            pacer.pace().await;
            let request = SendRequest {
                to: message.phone_number.clone(),
                template_id: campaign.template_id.clone(),
                variables: message.template_variables.clone(),
            };
            let outcome = self.gateway.send(&request).await.unwrap_or_else(|e| {
                warn!(campaign_id, phone = %message.phone_number, error = %e, "provider send errored");
                SendOutcome::Rejected {
                    error_code: None,
                    error_message: e.to_string(),
                }
            });
            match outcome {
                SendOutcome::Accepted {
                    provider_message_id,
                } => {
                    self.store
                        .record_attempt(
                            &message.id,
                            MessageStatus::Sent,
                            Some(&provider_message_id),
                            None,
                            Some(Utc::now()),
                        )
                        .await?;
                    successful += 1;
                }
                SendOutcome::Rejected {
                    error_code,
                    error_message,
                } => {
                    let detail = match error_code {
                        Some(code) => format!("{code}: {error_message}"),
                        None => error_message,
                    };
                    self.store
                        .record_attempt(
                            &message.id,
                            MessageStatus::Failed,
                            None,
                            Some(&detail),
                            None,
                        )
                        .await?;
                    still_failed += 1;
                }
            }
        }

        let result = RetryResult {
            retried: candidates.len() as u64,
            successful,
            still_failed,
        };
        info!(
            campaign_id,
            retried = result.retried,
            successful,
            still_failed,
            "campaign retry completed"
        );
        Ok(result)
    }
}

/// Resolve template variables for one contact: the mapped contact column
/// when it holds a non-empty value, otherwise the literal default, otherwise
/// an empty string. Placeholders present only in the defaults map resolve to
/// their default.
fn resolve_variables(
    contact: &Contact,
    mappings: &BTreeMap<String, String>,
    defaults: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();

    for (placeholder, column) in mappings {
        let from_contact = match column.as_str() {
            "name" => Some(contact.name.as_str()),
            "phone" => Some(contact.phone.as_str()),
            other => contact.extra.get(other).map(String::as_str),
        }
        .filter(|v| !v.is_empty());

        let value = from_contact
            .map(str::to_string)
            .or_else(|| defaults.get(placeholder).cloned())
            .unwrap_or_default();
        out.insert(placeholder.clone(), value);
    }

    for (placeholder, default) in defaults {
        out.entry(placeholder.clone()).or_insert_with(|| default.clone());
    }

    out
}
