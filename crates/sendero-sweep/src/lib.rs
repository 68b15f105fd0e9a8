// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expiry and retention sweeps.
//!
//! The routine sweep purges campaigns past their retention horizon. The
//! aggressive sweep reclaims disk under pressure: it purges campaigns by
//! age regardless of status, prunes routine audit entries, and compacts the
//! database file. At most one sweep runs at a time; a tick that finds a
//! sweep in flight skips instead of queueing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use sendero_core::SenderoError;
use sendero_store::CampaignStore;
use tracing::{error, info, warn};

/// Outcome of one completed sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    pub campaigns_purged: u64,
    pub messages_purged: u64,
    /// Routine audit entries removed. Always zero for routine sweeps.
    pub audit_pruned: u64,
}

/// Sweep settings, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct SweepSettings {
    /// Aggressive sweep purges campaigns older than this, in hours.
    pub aggressive_age_hours: u64,
    /// Aggressive sweep prunes routine audit entries older than this, in hours.
    pub log_retention_hours: u64,
}

/// Runs expiry and retention sweeps against the store.
///
/// Clones share the overlap guard, so concurrent ticks across clones still
/// run at most one sweep.
#[derive(Clone)]
pub struct Sweeper {
    store: CampaignStore,
    settings: SweepSettings,
    running: Arc<AtomicBool>,
}

impl Sweeper {
    pub fn new(store: CampaignStore, settings: SweepSettings) -> Self {
        Self {
            store,
            settings,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Routine sweep: purge campaigns whose `expires_at` has passed.
    /// Returns `None` when another sweep is already in flight.
    pub async fn sweep_expired(&self) -> Result<Option<SweepReport>, SenderoError> {
        let Some(_guard) = self.try_begin() else {
            info!("sweep already in flight, skipping");
            return Ok(None);
        };

        let expired = self.store.find_expired().await?;
        let report = self.purge(&expired).await?;

        info!(
            campaigns = report.campaigns_purged,
            messages = report.messages_purged,
            "routine sweep finished"
        );
        Ok(Some(report))
    }

    /// Aggressive sweep: purge campaigns older than the configured age
    /// regardless of status, prune routine audit entries past their
    /// retention window, and compact the database file. Returns `None` when
    /// another sweep is already in flight.
    pub async fn sweep_aggressive(&self) -> Result<Option<SweepReport>, SenderoError> {
        let Some(_guard) = self.try_begin() else {
            info!("sweep already in flight, skipping");
            return Ok(None);
        };

        let now = Utc::now();
        let age_cutoff = now - chrono::Duration::hours(self.settings.aggressive_age_hours as i64);
        let old = self.store.find_created_before(age_cutoff).await?;
        let mut report = self.purge(&old).await?;

        let log_cutoff = now - chrono::Duration::hours(self.settings.log_retention_hours as i64);
        report.audit_pruned = self.store.prune_audit_before(log_cutoff).await?;

        self.vacuum().await?;

        info!(
            campaigns = report.campaigns_purged,
            messages = report.messages_purged,
            audit_pruned = report.audit_pruned,
            "aggressive sweep finished"
        );
        Ok(Some(report))
    }

    /// Run routine sweeps forever on a fixed period. A tick that lands while
    /// a sweep is still running is absorbed by the overlap guard.
    pub async fn run_periodic(self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The immediate first tick: startup doubles as a sweep.
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_expired().await {
                error!(error = %e, "routine sweep failed");
            }
        }
    }

    /// Purge the given campaigns one by one. A failure on one campaign is
    /// logged and does not stop the rest.
    async fn purge(&self, ids: &[String]) -> Result<SweepReport, SenderoError> {
        let mut report = SweepReport::default();
        for id in ids {
            match self.store.delete(id).await {
                Ok(Some(messages)) => {
                    report.campaigns_purged += 1;
                    report.messages_purged += messages;
                }
                // Already gone; another deletion won the race.
                Ok(None) => {}
                Err(e) => {
                    warn!(campaign_id = %id, error = %e, "failed to purge campaign");
                }
            }
        }
        Ok(report)
    }

    async fn vacuum(&self) -> Result<(), SenderoError> {
        self.store
            .database()
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("VACUUM")?;
                Ok(())
            })
            .await
            .map_err(SenderoError::store)
    }

    fn try_begin(&self) -> Option<SweepGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepGuard {
                running: &self.running,
            })
    }
}

/// Releases the overlap guard on drop, including on early error returns.
struct SweepGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sendero_core::Contact;
    use sendero_store::{Database, NewCampaign};
    use tempfile::tempdir;

    const KEY_HEX: &str =
        "0303030303030303030303030303030303030303030303030303030303030303";

    async fn setup() -> (CampaignStore, Sweeper, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("sweep.db").to_str().unwrap())
            .await
            .unwrap();
        let store = CampaignStore::new(db, KEY_HEX, 720).unwrap();
        let sweeper = Sweeper::new(
            store.clone(),
            SweepSettings {
                aggressive_age_hours: 48,
                log_retention_hours: 72,
            },
        );
        (store, sweeper, dir)
    }

    fn draft(name: &str) -> NewCampaign {
        NewCampaign {
            name: name.into(),
            template_id: "promo_v1".into(),
            variable_mappings: Default::default(),
            default_values: Default::default(),
        }
    }

    fn contacts() -> Vec<Contact> {
        vec![Contact {
            name: "Ana".into(),
            phone: "+573001234567".into(),
            extra: Default::default(),
        }]
    }

    #[tokio::test]
    async fn routine_sweep_purges_only_expired_campaigns() {
        let (store, sweeper, _dir) = setup().await;
        let now = Utc::now();

        let expired = store
            .create_at(
                draft("old"),
                &contacts(),
                now - chrono::Duration::hours(800),
                now - chrono::Duration::hours(80),
            )
            .await
            .unwrap();
        let live = store.create(draft("new"), &contacts()).await.unwrap();

        let report = sweeper.sweep_expired().await.unwrap().unwrap();
        assert_eq!(report.campaigns_purged, 1);
        assert_eq!(report.audit_pruned, 0);

        assert!(matches!(
            store.get_meta(&expired.id).await.unwrap_err(),
            SenderoError::NotFound { .. }
        ));
        assert!(store.get_meta(&live.id).await.is_ok());
    }

    #[tokio::test]
    async fn routine_sweep_removes_message_records_with_the_campaign() {
        let (store, sweeper, _dir) = setup().await;
        let now = Utc::now();
        let expired = store
            .create_at(
                draft("old"),
                &contacts(),
                now - chrono::Duration::hours(800),
                now - chrono::Duration::hours(80),
            )
            .await
            .unwrap();
        store
            .insert_message(&sendero_core::MessageRecord {
                id: "m-1".into(),
                campaign_id: expired.id.clone(),
                phone_number: "+573001234567".into(),
                provider_message_id: None,
                template_variables: Default::default(),
                status: sendero_core::MessageStatus::Sent,
                attempts: 1,
                error_message: None,
                sent_at: None,
                delivered_at: None,
                read_at: None,
            })
            .await
            .unwrap();

        let report = sweeper.sweep_expired().await.unwrap().unwrap();
        assert_eq!(report.messages_purged, 1);
        assert!(store.messages(&expired.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn aggressive_sweep_purges_by_age_and_prunes_audit() {
        let (store, sweeper, _dir) = setup().await;
        let now = Utc::now();

        // Not expired, but older than the 48h aggressive cutoff.
        let old = store
            .create_at(
                draft("old"),
                &contacts(),
                now - chrono::Duration::hours(72),
                now + chrono::Duration::hours(648),
            )
            .await
            .unwrap();
        let fresh = store.create(draft("fresh"), &contacts()).await.unwrap();

        let report = sweeper.sweep_aggressive().await.unwrap().unwrap();
        assert_eq!(report.campaigns_purged, 1);

        assert!(matches!(
            store.get_meta(&old.id).await.unwrap_err(),
            SenderoError::NotFound { .. }
        ));
        assert!(store.get_meta(&fresh.id).await.is_ok());

        // The security-tagged deletion entry survives; it is exempt from
        // retention pruning no matter the cutoff.
        let trail = store.recent_audit(20).await.unwrap();
        assert!(trail.iter().any(|e| e.action == "campaign.deleted" && e.security));
    }

    #[tokio::test]
    async fn overlapping_sweep_is_skipped() {
        let (_store, sweeper, _dir) = setup().await;

        sweeper.running.store(true, Ordering::Release);
        assert_eq!(sweeper.sweep_expired().await.unwrap(), None);
        assert_eq!(sweeper.sweep_aggressive().await.unwrap(), None);

        sweeper.running.store(false, Ordering::Release);
        assert!(sweeper.sweep_expired().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn guard_is_released_after_a_sweep() {
        let (_store, sweeper, _dir) = setup().await;
        sweeper.sweep_expired().await.unwrap().unwrap();
        // A second sweep is not blocked by the first one's guard.
        assert!(sweeper.sweep_expired().await.unwrap().is_some());
    }
}
