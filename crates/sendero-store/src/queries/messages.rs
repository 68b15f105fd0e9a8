// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-message outcome records and delivery reconciliation.
//!
//! Reconciliation is keyed solely by the provider message id. Events for
//! unknown ids update nothing and report `false`; they never create records.
//! Every update is written so that replaying the same event is a no-op.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::params;
use sendero_core::{
    CampaignStats, CallbackStatus, DeliveryEvent, MessageRecord, MessageStatus, SenderoError,
};

use crate::database::{Database, map_tr_err};
use crate::models::{parse_ts, ts};

const MESSAGE_COLUMNS: &str = "id, campaign_id, phone_number, provider_message_id, \
     template_variables, status, attempts, error_message, sent_at, delivered_at, read_at";

/// Insert one message record.
pub async fn insert(db: &Database, record: &MessageRecord) -> Result<(), SenderoError> {
    let row = record.clone();
    let variables_json =
        serde_json::to_string(&row.template_variables).map_err(|e| SenderoError::Store {
            source: Box::new(e),
        })?;

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO message_records (id, campaign_id, phone_number, provider_message_id,
                     template_variables, status, attempts, error_message, sent_at, delivered_at, read_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    row.id,
                    row.campaign_id,
                    row.phone_number,
                    row.provider_message_id,
                    variables_json,
                    row.status.to_string(),
                    row.attempts,
                    row.error_message,
                    row.sent_at.map(ts),
                    row.delivered_at.map(ts),
                    row.read_at.map(ts),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All records for one campaign, in insertion order.
pub async fn list_for_campaign(
    db: &Database,
    campaign_id: &str,
) -> Result<Vec<MessageRecord>, SenderoError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<MessageRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM message_records
                 WHERE campaign_id = ?1 ORDER BY rowid"
            ))?;
            let rows = stmt.query_map(params![campaign_id], message_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Number of records for one campaign.
pub async fn count_for_campaign(db: &Database, campaign_id: &str) -> Result<u64, SenderoError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM message_records WHERE campaign_id = ?1",
                params![campaign_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Failed records still under the attempt ceiling, the retry candidates.
pub async fn failed_below_attempts(
    db: &Database,
    campaign_id: &str,
    max_attempts: i64,
) -> Result<Vec<MessageRecord>, SenderoError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<MessageRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM message_records
                 WHERE campaign_id = ?1 AND status = 'failed' AND attempts < ?2
                 ORDER BY rowid"
            ))?;
            let rows = stmt.query_map(params![campaign_id, max_attempts], message_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Record the outcome of one send attempt: bump the attempt counter and
/// overwrite status, provider id, error, and sent time.
pub async fn record_attempt(
    db: &Database,
    id: &str,
    status: MessageStatus,
    provider_message_id: Option<&str>,
    error_message: Option<&str>,
    sent_at: Option<DateTime<Utc>>,
) -> Result<(), SenderoError> {
    let id = id.to_string();
    let status_s = status.to_string();
    let pmid = provider_message_id.map(str::to_string);
    let error = error_message.map(str::to_string);
    let sent_s = sent_at.map(ts);

    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE message_records
                 SET attempts = attempts + 1, status = ?2, provider_message_id = ?3,
                     error_message = ?4, sent_at = ?5
                 WHERE id = ?1",
                params![id, status_s, pmid, error, sent_s],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Apply one provider delivery callback to the record holding its provider
/// message id. Returns `true` if a record held the id (even if the event
/// changed nothing), `false` for unknown ids.
///
/// Timestamps use `COALESCE` so a replayed event keeps the first observed
/// time. Status only moves forward: a `sent` event arriving after
/// `delivered` does not regress the record.
pub async fn apply_delivery_event(
    db: &Database,
    provider_message_id: &str,
    event: &DeliveryEvent,
    now: DateTime<Utc>,
) -> Result<bool, SenderoError> {
    let pmid = provider_message_id.to_string();
    let now_s = ts(now);
    let error_code = event.error_code.clone();
    let error_message = event.error_message.clone();
    let status = event.status;

    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let affected = match status {
                CallbackStatus::Sent => conn.execute(
                    "UPDATE message_records
                     SET status = CASE WHEN status = 'queued' THEN 'sent' ELSE status END,
                         sent_at = COALESCE(sent_at, ?2)
                     WHERE provider_message_id = ?1",
                    params![pmid, now_s],
                )?,
                CallbackStatus::Delivered => conn.execute(
                    "UPDATE message_records
                     SET status = CASE WHEN status IN ('queued', 'sent') THEN 'delivered'
                                       ELSE status END,
                         delivered_at = COALESCE(delivered_at, ?2)
                     WHERE provider_message_id = ?1",
                    params![pmid, now_s],
                )?,
                // A read receipt implies delivery, so the delivery time is
                // backfilled when the delivered event never arrived.
                CallbackStatus::Read => conn.execute(
                    "UPDATE message_records
                     SET status = CASE WHEN status IN ('queued', 'sent') THEN 'delivered'
                                       ELSE status END,
                         delivered_at = COALESCE(delivered_at, ?2),
                         read_at = COALESCE(read_at, ?2)
                     WHERE provider_message_id = ?1",
                    params![pmid, now_s],
                )?,
                CallbackStatus::Failed | CallbackStatus::Undelivered => {
                    let new_status = if status == CallbackStatus::Failed {
                        "failed"
                    } else {
                        "undelivered"
                    };
                    let detail = match (&error_code, &error_message) {
                        (Some(code), Some(msg)) => Some(format!("{code}: {msg}")),
                        (Some(code), None) => Some(code.clone()),
                        (None, Some(msg)) => Some(msg.clone()),
                        (None, None) => None,
                    };
                    conn.execute(
                        "UPDATE message_records
                         SET status = ?2, error_message = COALESCE(?3, error_message)
                         WHERE provider_message_id = ?1",
                        params![pmid, new_status, detail],
                    )?
                }
            };
            Ok(affected > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Per-status counts for one campaign. `read` counts records with a read
/// receipt; those records are also counted under `delivered`.
pub async fn stats(db: &Database, campaign_id: &str) -> Result<CampaignStats, SenderoError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| -> Result<CampaignStats, rusqlite::Error> {
            let mut out = CampaignStats::default();
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*), COUNT(read_at) FROM message_records
                 WHERE campaign_id = ?1 GROUP BY status",
            )?;
            let rows = stmt.query_map(params![campaign_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u64>(1)?,
                    row.get::<_, u64>(2)?,
                ))
            })?;
            for row in rows {
                let (status, count, read) = row?;
                out.total += count;
                out.read += read;
                match status.as_str() {
                    "queued" => out.queued = count,
                    "sent" => out.sent = count,
                    "delivered" => out.delivered = count,
                    "failed" => out.failed = count,
                    "undelivered" => out.undelivered = count,
                    _ => {}
                }
            }
            Ok(out)
        })
        .await
        .map_err(map_tr_err)
}

fn message_from_row(row: &rusqlite::Row<'_>) -> Result<MessageRecord, rusqlite::Error> {
    let variables_raw: String = row.get(4)?;
    let template_variables = serde_json::from_str(&variables_raw).map_err(|e| corrupt(4, e))?;
    let status_raw: String = row.get(5)?;
    let status = MessageStatus::from_str(&status_raw).map_err(|e| corrupt(5, e))?;

    Ok(MessageRecord {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        phone_number: row.get(2)?,
        provider_message_id: row.get(3)?,
        template_variables,
        status,
        attempts: row.get(6)?,
        error_message: row.get(7)?,
        sent_at: opt_ts(row, 8)?,
        delivered_at: opt_ts(row, 9)?,
        read_at: opt_ts(row, 10)?,
    })
}

fn opt_ts(row: &rusqlite::Row<'_>, idx: usize) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_ts(&s).map_err(|e| corrupt(idx, e)))
        .transpose()
}

fn corrupt(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}
