// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign CRUD and status transitions.
//!
//! Status transitions are single atomic conditional updates (`UPDATE ...
//! WHERE status = ...` checked by affected-row count), never split
//! read-modify-write calls. Two callers racing to dispatch the same campaign
//! cannot both observe `created`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::params;
use sendero_core::{Campaign, CampaignStatus, Contact, DecryptedCampaign, SenderoError};

use crate::crypto;
use crate::database::{Database, map_tr_err};
use crate::models::{NewCampaign, parse_ts, ts};

const CAMPAIGN_COLUMNS: &str = "id, name, template_id, total_contacts, status, \
     variable_mappings, default_values, created_at, expires_at, sent_at, completed_at";

/// Create a campaign: serialize and encrypt the contact list, then insert
/// the row. `total_contacts` is fixed here and never updated.
pub async fn create(
    db: &Database,
    key: &[u8; 32],
    draft: NewCampaign,
    contacts: &[Contact],
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<Campaign, SenderoError> {
    let plaintext = serde_json::to_vec(contacts).map_err(|e| SenderoError::Store {
        source: Box::new(e),
    })?;
    let (ciphertext, nonce) = crypto::seal(key, &plaintext)?;

    let campaign = Campaign {
        id: uuid::Uuid::new_v4().to_string(),
        name: draft.name,
        template_id: draft.template_id,
        total_contacts: contacts.len() as i64,
        status: CampaignStatus::Created,
        variable_mappings: draft.variable_mappings,
        default_values: draft.default_values,
        created_at,
        expires_at,
        sent_at: None,
        completed_at: None,
    };

    let row = campaign.clone();
    let mappings_json = serde_json::to_string(&row.variable_mappings)
        .map_err(|e| SenderoError::Store {
            source: Box::new(e),
        })?;
    let defaults_json =
        serde_json::to_string(&row.default_values).map_err(|e| SenderoError::Store {
            source: Box::new(e),
        })?;
    let nonce_vec = nonce.to_vec();

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO campaigns (id, name, template_id, encrypted_contacts, encryption_iv,
                     total_contacts, status, variable_mappings, default_values, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    row.id,
                    row.name,
                    row.template_id,
                    ciphertext,
                    nonce_vec,
                    row.total_contacts,
                    row.status.to_string(),
                    mappings_json,
                    defaults_json,
                    ts(row.created_at),
                    ts(row.expires_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

    Ok(campaign)
}

/// Load and decrypt a campaign's contact list.
///
/// Fails with `Expired` when the retention horizon has passed -- expired
/// contact data is never decrypted -- and `NotFound` when no row exists.
pub async fn get_decrypted(
    db: &Database,
    key: &[u8; 32],
    id: &str,
    now: DateTime<Utc>,
) -> Result<DecryptedCampaign, SenderoError> {
    let id_owned = id.to_string();
    type Row = (Campaign, Vec<u8>, Vec<u8>);
    let found = db
        .connection()
        .call(move |conn| -> Result<Option<Row>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS}, encrypted_contacts, encryption_iv
                 FROM campaigns WHERE id = ?1"
            ))?;
            let result = stmt.query_row(params![id_owned], |row| {
                Ok((campaign_from_row(row)?, row.get(11)?, row.get(12)?))
            });
            match result {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)?;

    let (campaign, ciphertext, iv) = found.ok_or_else(|| SenderoError::NotFound {
        campaign_id: id.to_string(),
    })?;

    if now > campaign.expires_at {
        return Err(SenderoError::Expired {
            campaign_id: id.to_string(),
        });
    }

    let nonce: [u8; 12] = iv.try_into().map_err(|_| SenderoError::Store {
        source: "corrupted encryption IV (expected 12 bytes)".into(),
    })?;
    let plaintext = crypto::open(key, &nonce, &ciphertext)?;
    let contacts: Vec<Contact> =
        serde_json::from_slice(&plaintext).map_err(|e| SenderoError::Store {
            source: Box::new(e),
        })?;

    Ok(DecryptedCampaign { campaign, contacts })
}

/// Fetch campaign metadata without touching the encrypted payload.
pub async fn get_meta(db: &Database, id: &str) -> Result<Campaign, SenderoError> {
    let id_owned = id.to_string();
    let found = db
        .connection()
        .call(move |conn| -> Result<Option<Campaign>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"
            ))?;
            let result = stmt.query_row(params![id_owned], campaign_from_row);
            match result {
                Ok(c) => Ok(Some(c)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)?;

    found.ok_or_else(|| SenderoError::NotFound {
        campaign_id: id.to_string(),
    })
}

/// List all campaigns, newest first.
pub async fn list(db: &Database) -> Result<Vec<Campaign>, SenderoError> {
    db.connection()
        .call(|conn| -> Result<Vec<Campaign>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map([], campaign_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Why a conditional status transition did not apply.
#[derive(Debug)]
enum TransitionDenied {
    NotFound,
    Expired,
    Conflict(String),
}

/// Atomically transition `created -> sending`, recording `sent_at`.
///
/// This is the at-most-once dispatch guard: the conditional update and the
/// affected-row check close the race window between two concurrent dispatch
/// callers. The loser observes zero affected rows and aborts with
/// `Conflict` without side effects.
pub async fn begin_dispatch(
    db: &Database,
    id: &str,
    now: DateTime<Utc>,
) -> Result<(), SenderoError> {
    let id_owned = id.to_string();
    let now_s = ts(now);

    let outcome = db
        .connection()
        .call(move |conn| -> Result<Result<(), TransitionDenied>, rusqlite::Error> {
            let affected = conn.execute(
                "UPDATE campaigns SET status = 'sending', sent_at = ?2
                 WHERE id = ?1 AND status = 'created' AND expires_at > ?2",
                params![id_owned, now_s],
            )?;
            if affected == 1 {
                return Ok(Ok(()));
            }
            Ok(Err(diagnose_denied(conn, &id_owned, &now_s)?))
        })
        .await
        .map_err(map_tr_err)?;

    outcome.map_err(|denied| denied_to_error(denied, id))
}

/// Atomically transition `sending -> completed`, recording `completed_at`.
pub async fn complete_dispatch(
    db: &Database,
    id: &str,
    now: DateTime<Utc>,
) -> Result<(), SenderoError> {
    let id_owned = id.to_string();
    let now_s = ts(now);

    let outcome = db
        .connection()
        .call(move |conn| -> Result<Result<(), TransitionDenied>, rusqlite::Error> {
            let affected = conn.execute(
                "UPDATE campaigns SET status = 'completed', completed_at = ?2
                 WHERE id = ?1 AND status = 'sending' AND expires_at > ?2",
                params![id_owned, now_s],
            )?;
            if affected == 1 {
                return Ok(Ok(()));
            }
            Ok(Err(diagnose_denied(conn, &id_owned, &now_s)?))
        })
        .await
        .map_err(map_tr_err)?;

    outcome.map_err(|denied| denied_to_error(denied, id))
}

/// Transition `sending -> failed` after an unrecoverable dispatch error.
/// Returns false if the campaign was not in `sending`.
pub async fn mark_failed(db: &Database, id: &str) -> Result<bool, SenderoError> {
    let id_owned = id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let affected = conn.execute(
                "UPDATE campaigns SET status = 'failed' WHERE id = ?1 AND status = 'sending'",
                params![id_owned],
            )?;
            Ok(affected == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a campaign and all its message records in one transaction.
///
/// Returns the number of message records removed, or `None` if the campaign
/// did not exist. Only this cascade may delete message records.
pub async fn delete_cascade(db: &Database, id: &str) -> Result<Option<u64>, SenderoError> {
    let id_owned = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<u64>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let messages = tx.execute(
                "DELETE FROM message_records WHERE campaign_id = ?1",
                params![id_owned],
            )?;
            let campaigns = tx.execute("DELETE FROM campaigns WHERE id = ?1", params![id_owned])?;
            tx.commit()?;
            if campaigns == 0 {
                Ok(None)
            } else {
                Ok(Some(messages as u64))
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Ids of campaigns past their retention horizon.
pub async fn find_expired(
    db: &Database,
    now: DateTime<Utc>,
) -> Result<Vec<String>, SenderoError> {
    let now_s = ts(now);
    db.connection()
        .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
            let mut stmt =
                conn.prepare("SELECT id FROM campaigns WHERE expires_at <= ?1 ORDER BY id")?;
            let rows = stmt.query_map(params![now_s], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Ids of campaigns created before `cutoff`, regardless of status. Used by
/// the aggressive disk-pressure sweep.
pub async fn find_created_before(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<Vec<String>, SenderoError> {
    let cutoff_s = ts(cutoff);
    db.connection()
        .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
            let mut stmt =
                conn.prepare("SELECT id FROM campaigns WHERE created_at < ?1 ORDER BY id")?;
            let rows = stmt.query_map(params![cutoff_s], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Crash recovery: mark every campaign stuck in `sending` as `failed`.
/// A dispatch never survives a process restart.
pub async fn recover_stale_sending(db: &Database) -> Result<u64, SenderoError> {
    db.connection()
        .call(|conn| -> Result<u64, rusqlite::Error> {
            let affected = conn.execute(
                "UPDATE campaigns SET status = 'failed' WHERE status = 'sending'",
                [],
            )?;
            Ok(affected as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Inspect the row to explain why a conditional transition affected nothing.
fn diagnose_denied(
    conn: &rusqlite::Connection,
    id: &str,
    now_s: &str,
) -> Result<TransitionDenied, rusqlite::Error> {
    let result = conn.query_row(
        "SELECT status, expires_at FROM campaigns WHERE id = ?1",
        params![id],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    );
    match result {
        Ok((status, expires_at)) => {
            if expires_at.as_str() <= now_s {
                Ok(TransitionDenied::Expired)
            } else {
                Ok(TransitionDenied::Conflict(status))
            }
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(TransitionDenied::NotFound),
        Err(e) => Err(e),
    }
}

fn denied_to_error(denied: TransitionDenied, id: &str) -> SenderoError {
    match denied {
        TransitionDenied::NotFound => SenderoError::NotFound {
            campaign_id: id.to_string(),
        },
        TransitionDenied::Expired => SenderoError::Expired {
            campaign_id: id.to_string(),
        },
        TransitionDenied::Conflict(status) => {
            SenderoError::Conflict(format!("campaign {id} is already {status}"))
        }
    }
}

/// Map a row selected with [`CAMPAIGN_COLUMNS`] into a [`Campaign`].
fn campaign_from_row(row: &rusqlite::Row<'_>) -> Result<Campaign, rusqlite::Error> {
    let status_raw: String = row.get(4)?;
    let status = CampaignStatus::from_str(&status_raw).map_err(|e| corrupt(4, e))?;

    let mappings_raw: String = row.get(5)?;
    let variable_mappings = serde_json::from_str(&mappings_raw).map_err(|e| corrupt(5, e))?;
    let defaults_raw: String = row.get(6)?;
    let default_values = serde_json::from_str(&defaults_raw).map_err(|e| corrupt(6, e))?;

    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        template_id: row.get(2)?,
        total_contacts: row.get(3)?,
        status,
        variable_mappings,
        default_values,
        created_at: ts_col(row, 7)?,
        expires_at: ts_col(row, 8)?,
        sent_at: opt_ts_col(row, 9)?,
        completed_at: opt_ts_col(row, 10)?,
    })
}

fn ts_col(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> Result<chrono::DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).map_err(|e| corrupt(idx, e))
}

fn opt_ts_col(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> Result<Option<chrono::DateTime<Utc>>, rusqlite::Error> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_ts(&s).map_err(|e| corrupt(idx, e)))
        .transpose()
}

fn corrupt(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn test_key() -> [u8; 32] {
        [7u8; 32]
    }

    fn draft() -> NewCampaign {
        let mut mappings = std::collections::BTreeMap::new();
        mappings.insert("1".to_string(), "name".to_string());
        NewCampaign {
            name: "march-promo".into(),
            template_id: "promo_v2".into(),
            variable_mappings: mappings,
            default_values: std::collections::BTreeMap::new(),
        }
    }

    fn contacts() -> Vec<Contact> {
        vec![
            Contact {
                name: "Ana".into(),
                phone: "+573001234567".into(),
                extra: Default::default(),
            },
            Contact {
                name: "Luis".into(),
                phone: "+573009999999".into(),
                extra: Default::default(),
            },
        ]
    }

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn create_then_get_decrypts_contacts() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();

        let campaign = create(&db, &test_key(), draft(), &contacts(), now, now + Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(campaign.status, CampaignStatus::Created);
        assert_eq!(campaign.total_contacts, 2);

        let decrypted = get_decrypted(&db, &test_key(), &campaign.id, Utc::now())
            .await
            .unwrap();
        assert_eq!(decrypted.contacts, contacts());
        assert_eq!(decrypted.campaign.name, "march-promo");
    }

    #[tokio::test]
    async fn get_after_expiry_fails_without_decrypting() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();

        // Horizon already in the past.
        let campaign = create(
            &db,
            &test_key(),
            draft(),
            &contacts(),
            now - Duration::hours(48),
            now - Duration::hours(1),
        )
        .await
        .unwrap();

        let err = get_decrypted(&db, &test_key(), &campaign.id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SenderoError::Expired { .. }));
    }

    #[tokio::test]
    async fn get_unknown_campaign_is_not_found() {
        let (db, _dir) = setup_db().await;
        let err = get_decrypted(&db, &test_key(), "nope", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SenderoError::NotFound { .. }));
    }

    #[tokio::test]
    async fn begin_dispatch_is_at_most_once() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let campaign = create(&db, &test_key(), draft(), &contacts(), now, now + Duration::hours(24))
            .await
            .unwrap();

        begin_dispatch(&db, &campaign.id, Utc::now()).await.unwrap();

        // Second dispatch must observe `sending` and abort.
        let err = begin_dispatch(&db, &campaign.id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SenderoError::Conflict(_)));
        assert!(err.to_string().contains("sending"));

        let meta = get_meta(&db, &campaign.id).await.unwrap();
        assert_eq!(meta.status, CampaignStatus::Sending);
        assert!(meta.sent_at.is_some());
    }

    #[tokio::test]
    async fn begin_dispatch_on_expired_campaign_fails() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let campaign = create(
            &db,
            &test_key(),
            draft(),
            &contacts(),
            now - Duration::hours(2),
            now - Duration::hours(1),
        )
        .await
        .unwrap();

        let err = begin_dispatch(&db, &campaign.id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SenderoError::Expired { .. }));

        // No side effects: status is untouched.
        let meta = get_meta(&db, &campaign.id).await.unwrap();
        assert_eq!(meta.status, CampaignStatus::Created);
    }

    #[tokio::test]
    async fn complete_dispatch_records_completed_at() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let campaign = create(&db, &test_key(), draft(), &contacts(), now, now + Duration::hours(24))
            .await
            .unwrap();

        begin_dispatch(&db, &campaign.id, Utc::now()).await.unwrap();
        complete_dispatch(&db, &campaign.id, Utc::now())
            .await
            .unwrap();

        let meta = get_meta(&db, &campaign.id).await.unwrap();
        assert_eq!(meta.status, CampaignStatus::Completed);
        assert!(meta.completed_at.is_some());

        // Dispatching a completed campaign is a conflict.
        let err = begin_dispatch(&db, &campaign.id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SenderoError::Conflict(_)));
    }

    #[tokio::test]
    async fn complete_dispatch_without_claim_names_the_actual_status() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let campaign = create(&db, &test_key(), draft(), &contacts(), now, now + Duration::hours(24))
            .await
            .unwrap();

        // Never claimed: the campaign is still `created`.
        let err = complete_dispatch(&db, &campaign.id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SenderoError::Conflict(_)));
        assert!(err.to_string().contains("created"));
    }

    #[tokio::test]
    async fn mark_failed_only_applies_to_sending() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let campaign = create(&db, &test_key(), draft(), &contacts(), now, now + Duration::hours(24))
            .await
            .unwrap();

        // Not sending yet.
        assert!(!mark_failed(&db, &campaign.id).await.unwrap());

        begin_dispatch(&db, &campaign.id, Utc::now()).await.unwrap();
        assert!(mark_failed(&db, &campaign.id).await.unwrap());

        let meta = get_meta(&db, &campaign.id).await.unwrap();
        assert_eq!(meta.status, CampaignStatus::Failed);
    }

    #[tokio::test]
    async fn delete_cascade_removes_messages_and_campaign() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let campaign = create(&db, &test_key(), draft(), &contacts(), now, now + Duration::hours(24))
            .await
            .unwrap();

        for i in 0..3 {
            let record = sendero_core::MessageRecord {
                id: format!("m-{i}"),
                campaign_id: campaign.id.clone(),
                phone_number: "+573001234567".into(),
                provider_message_id: None,
                template_variables: Default::default(),
                status: sendero_core::MessageStatus::Queued,
                attempts: 0,
                error_message: None,
                sent_at: None,
                delivered_at: None,
                read_at: None,
            };
            crate::queries::messages::insert(&db, &record).await.unwrap();
        }

        let deleted = delete_cascade(&db, &campaign.id).await.unwrap();
        assert_eq!(deleted, Some(3));

        assert!(matches!(
            get_meta(&db, &campaign.id).await.unwrap_err(),
            SenderoError::NotFound { .. }
        ));
        let remaining =
            crate::queries::messages::count_for_campaign(&db, &campaign.id)
                .await
                .unwrap();
        assert_eq!(remaining, 0);

        // Deleting again reports absence.
        assert_eq!(delete_cascade(&db, &campaign.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn find_expired_only_returns_past_horizon() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();

        let expired = create(
            &db,
            &test_key(),
            draft(),
            &contacts(),
            now - Duration::hours(2),
            now - Duration::minutes(1),
        )
        .await
        .unwrap();
        let live = create(&db, &test_key(), draft(), &contacts(), now, now + Duration::hours(24))
            .await
            .unwrap();

        let ids = find_expired(&db, Utc::now()).await.unwrap();
        assert!(ids.contains(&expired.id));
        assert!(!ids.contains(&live.id));
    }

    #[tokio::test]
    async fn recover_stale_sending_fails_stuck_campaigns() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let campaign = create(&db, &test_key(), draft(), &contacts(), now, now + Duration::hours(24))
            .await
            .unwrap();
        begin_dispatch(&db, &campaign.id, Utc::now()).await.unwrap();

        let recovered = recover_stale_sending(&db).await.unwrap();
        assert_eq!(recovered, 1);
        let meta = get_meta(&db, &campaign.id).await.unwrap();
        assert_eq!(meta.status, CampaignStatus::Failed);
    }
}
