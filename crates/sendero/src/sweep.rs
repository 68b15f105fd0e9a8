// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `sendero sweep` command implementation.
//!
//! Runs a single routine or aggressive sweep against the configured database
//! and prints the report. Intended for cron and operator use; the serve
//! command already sweeps periodically on its own.

use sendero_config::model::SenderoConfig;
use sendero_core::SenderoError;
use sendero_store::{CampaignStore, Database};
use sendero_sweep::{SweepSettings, Sweeper};

pub async fn run_sweep(config: SenderoConfig, aggressive: bool) -> Result<(), SenderoError> {
    let key_hex = config
        .campaign
        .encryption_key
        .as_deref()
        .ok_or_else(|| {
            SenderoError::Config("campaign.encryption_key is required".to_string())
        })?;

    let db = Database::open(&config.storage.database_path).await?;
    let store = CampaignStore::new(db, key_hex, config.campaign.ttl_hours as i64)?;
    let sweeper = Sweeper::new(
        store,
        SweepSettings {
            aggressive_age_hours: config.sweep.aggressive_age_hours,
            log_retention_hours: config.sweep.log_retention_hours,
        },
    );

    let report = if aggressive {
        sweeper.sweep_aggressive().await?
    } else {
        sweeper.sweep_expired().await?
    };

    // A single-shot sweep cannot overlap itself.
    let report = report.ok_or_else(|| {
        SenderoError::Internal("sweep unexpectedly reported as already running".to_string())
    })?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report)
            .map_err(|e| SenderoError::Internal(e.to_string()))?
    );
    Ok(())
}
