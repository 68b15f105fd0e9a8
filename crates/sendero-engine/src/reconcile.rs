// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery reconciliation.
//!
//! Provider callbacks arrive asynchronously, at-least-once, and possibly out
//! of order. Each one is matched to a message record solely by provider
//! message id and merged idempotently; callbacks for unknown ids are logged
//! and dropped without ever creating records.

use sendero_core::{DeliveryEvent, SenderoError};
use sendero_store::CampaignStore;
use serde::Deserialize;
use tracing::{debug, warn};

/// Body of one delivery callback.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackPayload {
    pub provider_message_id: String,
    #[serde(flatten)]
    pub event: DeliveryEvent,
}

/// Merge one delivery callback into its message record.
///
/// Returns `true` when a record held the provider message id, `false` when
/// the id is unknown (stale callback, foreign tenant, or replay after
/// deletion).
pub async fn reconcile(
    store: &CampaignStore,
    payload: &CallbackPayload,
) -> Result<bool, SenderoError> {
    let matched = store
        .apply_delivery_event(&payload.provider_message_id, &payload.event)
        .await?;

    if matched {
        debug!(
            provider_message_id = %payload.provider_message_id,
            status = %payload.event.status,
            "delivery event reconciled"
        );
    } else {
        warn!(
            provider_message_id = %payload.provider_message_id,
            status = %payload.event.status,
            "delivery event for unknown provider message id, dropped"
        );
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockGateway, test_store};
    use crate::DispatchEngine;
    use sendero_core::{CallbackStatus, Contact, MessageStatus};
    use sendero_store::NewCampaign;
    use std::sync::Arc;

    fn payload(id: &str, status: CallbackStatus) -> CallbackPayload {
        CallbackPayload {
            provider_message_id: id.into(),
            event: DeliveryEvent {
                status,
                error_code: None,
                error_message: None,
            },
        }
    }

    async fn dispatched_campaign() -> (CampaignStore, tempfile::TempDir, String) {
        let (store, dir) = test_store().await;
        let campaign = store
            .create(
                NewCampaign {
                    name: "promo".into(),
                    template_id: "promo_v1".into(),
                    variable_mappings: Default::default(),
                    default_values: Default::default(),
                },
                &[Contact {
                    name: "Ana".into(),
                    phone: "+573001234567".into(),
                    extra: Default::default(),
                }],
            )
            .await
            .unwrap();

        let gateway = Arc::new(MockGateway::scripted(vec![
            sendero_core::SendOutcome::Accepted {
                provider_message_id: "wamid.1".into(),
            },
        ]));
        DispatchEngine::new(store.clone(), gateway, 100.0, 3)
            .dispatch(&campaign.id)
            .await
            .unwrap();
        (store, dir, campaign.id)
    }

    #[tokio::test]
    async fn delivered_then_read_updates_the_record() {
        let (store, _dir, campaign_id) = dispatched_campaign().await;

        assert!(reconcile(&store, &payload("wamid.1", CallbackStatus::Delivered))
            .await
            .unwrap());
        assert!(reconcile(&store, &payload("wamid.1", CallbackStatus::Read))
            .await
            .unwrap());

        let records = store.messages(&campaign_id).await.unwrap();
        assert_eq!(records[0].status, MessageStatus::Delivered);
        assert!(records[0].delivered_at.is_some());
        assert!(records[0].read_at.is_some());
    }

    #[tokio::test]
    async fn unknown_id_is_dropped_without_creating_records() {
        let (store, _dir, campaign_id) = dispatched_campaign().await;

        let matched = reconcile(&store, &payload("wamid.stranger", CallbackStatus::Delivered))
            .await
            .unwrap();
        assert!(!matched);
        assert_eq!(store.messages(&campaign_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replayed_callbacks_are_idempotent() {
        let (store, _dir, campaign_id) = dispatched_campaign().await;

        let event = payload("wamid.1", CallbackStatus::Delivered);
        assert!(reconcile(&store, &event).await.unwrap());
        let first = store.messages(&campaign_id).await.unwrap();

        assert!(reconcile(&store, &event).await.unwrap());
        let second = store.messages(&campaign_id).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn callback_payload_parses_flat_json() {
        let payload: CallbackPayload = serde_json::from_str(
            r#"{"provider_message_id":"wamid.1","status":"failed","error_code":"131026","error_message":"blocked"}"#,
        )
        .unwrap();
        assert_eq!(payload.provider_message_id, "wamid.1");
        assert_eq!(payload.event.status, CallbackStatus::Failed);
        assert_eq!(payload.event.error_code.as_deref(), Some("131026"));
    }
}
