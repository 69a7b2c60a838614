// forge-core/src/sam.rs
// ============================================================================
// Module: SAM.gov Opportunities
// Description: Federal opportunity and notice records produced by the SAM
//              pull.
// Purpose: Model what the SAM pull (forge-ingest) reads and writes; the
//          paginated feed client itself lives in forge-providers.
// Dependencies: chrono, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Solicitation`] is one federal opportunity, keyed by the feed's own
//! `notice_id` so repeated pulls update the same row instead of duplicating
//! it. Each amendment or status change the feed reports becomes a [`Notice`]
//! attached to that solicitation (§4.10).

// ============================================================================
// SECTION: Imports
// ============================================================================

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

use crate::ids::NoticeId;
use crate::ids::OrganizationId;
use crate::ids::SolicitationId;

// ============================================================================
// SECTION: Solicitation
// ============================================================================

/// One federal opportunity tracked from the SAM.gov feed (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solicitation {
    /// Primary identifier.
    pub id: SolicitationId,
    /// Owning tenant.
    pub organization_id: OrganizationId,
    /// The feed's own opportunity identifier, the dedup key across pulls.
    pub notice_id: String,
    /// Solicitation number as published.
    pub solicitation_number: Option<String>,
    /// Title as published.
    pub title: String,
    /// Raw feed record, kept for fields the model does not promote.
    pub raw: Json,
    /// First time this opportunity was observed by a pull.
    pub first_seen_at: DateTime<Utc>,
    /// Most recent pull that touched this opportunity.
    pub last_seen_at: DateTime<Utc>,
}

impl Solicitation {
    /// Builds a new solicitation from a freshly observed feed record.
    #[must_use]
    pub fn new(
        organization_id: OrganizationId,
        notice_id: impl Into<String>,
        solicitation_number: Option<String>,
        title: impl Into<String>,
        raw: Json,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SolicitationId::new(),
            organization_id,
            notice_id: notice_id.into(),
            solicitation_number,
            title: title.into(),
            raw,
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    /// Applies a re-observed feed record: refreshes the published fields and
    /// `last_seen_at`, leaves `first_seen_at` untouched.
    pub fn record_reobservation(&mut self, solicitation_number: Option<String>, title: impl Into<String>, raw: Json, now: DateTime<Utc>) {
        self.solicitation_number = solicitation_number;
        self.title = title.into();
        self.raw = raw;
        self.last_seen_at = now;
    }
}

// ============================================================================
// SECTION: Notice
// ============================================================================

/// One amendment or status change reported against a [`Solicitation`]
/// (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    /// Primary identifier.
    pub id: NoticeId,
    /// The solicitation this notice amends.
    pub solicitation_id: SolicitationId,
    /// The feed's notice type (e.g. `"presolicitation"`, `"award"`).
    pub notice_type: String,
    /// Publication date as reported by the feed.
    pub posted_date: DateTime<Utc>,
    /// Raw feed record for this notice.
    pub raw: Json,
    /// Creation timestamp (when this crate first recorded the notice).
    pub created_at: DateTime<Utc>,
}

impl Notice {
    /// Builds a new notice record.
    #[must_use]
    pub fn new(solicitation_id: SolicitationId, notice_type: impl Into<String>, posted_date: DateTime<Utc>, raw: Json, now: DateTime<Utc>) -> Self {
        Self { id: NoticeId::new(), solicitation_id, notice_type: notice_type.into(), posted_date, raw, created_at: now }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::OrganizationId;

    fn now() -> DateTime<Utc> {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        DateTime::<Utc>::from_timestamp(0, 0).unwrap()
    }

    fn later() -> DateTime<Utc> {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        DateTime::<Utc>::from_timestamp(3600, 0).unwrap()
    }

    #[test]
    fn reobservation_refreshes_last_seen_but_not_first_seen() {
        let mut solicitation =
            Solicitation::new(OrganizationId::new(), "NOTICE-1", Some("SOL-1".to_string()), "Widgets", serde_json::json!({}), now());
        let first_seen = solicitation.first_seen_at;
        solicitation.record_reobservation(Some("SOL-1".to_string()), "Widgets (amended)", serde_json::json!({"v": 2}), later());
        assert_eq!(solicitation.first_seen_at, first_seen);
        assert_eq!(solicitation.last_seen_at, later());
        assert_eq!(solicitation.title, "Widgets (amended)");
    }

    #[test]
    fn notice_carries_its_solicitation_id() {
        let solicitation =
            Solicitation::new(OrganizationId::new(), "NOTICE-1", None, "Widgets", serde_json::json!({}), now());
        let notice = Notice::new(solicitation.id, "presolicitation", now(), serde_json::json!({}), now());
        assert_eq!(notice.solicitation_id, solicitation.id);
    }
}
