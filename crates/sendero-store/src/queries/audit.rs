// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit trail.
//!
//! Entries are never updated. Routine entries are pruned by the sweep after
//! the retention window; security-tagged entries are exempt.

use chrono::{DateTime, Utc};
use rusqlite::params;
use sendero_core::SenderoError;

use crate::database::{Database, map_tr_err};
use crate::models::{AuditEntry, parse_ts, ts};

/// Append one entry.
pub async fn record(
    db: &Database,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    details: Option<serde_json::Value>,
    security: bool,
) -> Result<(), SenderoError> {
    let action = action.to_string();
    let resource_type = resource_type.to_string();
    let resource_id = resource_id.to_string();
    let details = details.map(|v| v.to_string());
    let created = ts(Utc::now());

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO audit_log (action, resource_type, resource_id, details, security, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![action, resource_type, resource_id, details, security as i64, created],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete routine entries older than `cutoff`. Security-tagged entries are
/// kept regardless of age. Returns the number of rows removed.
pub async fn prune_before(db: &Database, cutoff: DateTime<Utc>) -> Result<u64, SenderoError> {
    let cutoff_s = ts(cutoff);
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let affected = conn.execute(
                "DELETE FROM audit_log WHERE security = 0 AND created_at < ?1",
                params![cutoff_s],
            )?;
            Ok(affected as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent entries, newest first.
pub async fn recent(db: &Database, limit: u64) -> Result<Vec<AuditEntry>, SenderoError> {
    db.connection()
        .call(move |conn| -> Result<Vec<AuditEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, action, resource_type, resource_id, details, security, created_at
                 FROM audit_log ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                let created_raw: String = row.get(6)?;
                let created_at = parse_ts(&created_raw).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        6,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(AuditEntry {
                    id: row.get(0)?,
                    action: row.get(1)?,
                    resource_type: row.get(2)?,
                    resource_id: row.get(3)?,
                    details: row.get(4)?,
                    security: row.get::<_, i64>(5)? != 0,
                    created_at,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn record_and_recent_roundtrip() {
        let (db, _dir) = setup_db().await;
        record(&db, "campaign.created", "campaign", "c-1", None, false)
            .await
            .unwrap();
        record(
            &db,
            "campaign.deleted",
            "campaign",
            "c-1",
            Some(serde_json::json!({"messages_removed": 3})),
            true,
        )
        .await
        .unwrap();

        let entries = recent(&db, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        // Newest first.
        assert_eq!(entries[0].action, "campaign.deleted");
        assert!(entries[0].security);
        assert!(entries[0].details.as_deref().unwrap().contains("messages_removed"));
        assert!(!entries[1].security);
    }

    #[tokio::test]
    async fn prune_spares_security_entries() {
        let (db, _dir) = setup_db().await;
        record(&db, "campaign.created", "campaign", "c-1", None, false)
            .await
            .unwrap();
        record(&db, "campaign.purged", "campaign", "c-1", None, true)
            .await
            .unwrap();

        // Cutoff in the future: everything routine is eligible.
        let removed = prune_before(&db, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let entries = recent(&db, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "campaign.purged");
    }

    #[tokio::test]
    async fn prune_with_old_cutoff_removes_nothing() {
        let (db, _dir) = setup_db().await;
        record(&db, "campaign.created", "campaign", "c-1", None, false)
            .await
            .unwrap();
        let removed = prune_before(&db, Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }
}
