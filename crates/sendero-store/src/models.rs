// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store-local model types and timestamp helpers.
//!
//! The canonical domain types (Campaign, MessageRecord, statuses) live in
//! `sendero-core`; this module adds the creation draft and the audit entry,
//! which only exist at the persistence boundary.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use sendero_core::SenderoError;

pub use sendero_core::{Campaign, CampaignStats, MessageRecord};

/// Caller-supplied fields for a new campaign. Timestamps, id, and the
/// encrypted payload are filled in by the store.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub name: String,
    pub template_id: String,
    /// Template placeholder -> contact column name.
    pub variable_mappings: BTreeMap<String, String>,
    /// Template placeholder -> literal fallback value.
    pub default_values: BTreeMap<String, String>,
}

/// One append-only audit trail entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: Option<String>,
    /// Security-tagged entries are exempt from retention pruning.
    pub security: bool,
    pub created_at: DateTime<Utc>,
}

/// Format a timestamp for storage: fixed-width RFC 3339 with millisecond
/// precision and a `Z` suffix, so lexicographic comparison in SQL matches
/// chronological order.
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp back into `DateTime<Utc>`.
pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, SenderoError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SenderoError::Store {
            source: format!("corrupted timestamp `{raw}`: {e}").into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stored_timestamps_sort_lexicographically() {
        let earlier = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 1, 5, 10, 30, 0).unwrap();
        assert!(ts(earlier) < ts(later));
    }

    #[test]
    fn ts_parse_roundtrip() {
        let now = Utc::now();
        let parsed = parse_ts(&ts(now)).unwrap();
        // Millisecond precision is preserved.
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn parse_ts_rejects_garbage() {
        assert!(parse_ts("not-a-timestamp").is_err());
    }
}
