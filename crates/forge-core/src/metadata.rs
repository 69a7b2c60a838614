// forge-core/src/metadata.rs
// ============================================================================
// Module: Asset Metadata
// Description: Experiment-supporting metadata slots attached to an asset.
// Purpose: Let multiple producers (summarizers, classifiers, …) write
//          competing metadata of the same type without clobbering a
//          canonical, currently-promoted record.
// Dependencies: chrono, serde
// ============================================================================

//! ## Overview
//! At most one active canonical [`AssetMetadata`] exists per
//! `(asset_id, metadata_type)` (§3 invariant). [`AssetMetadata::promote`]
//! supersedes the previous canonical record atomically from the caller's
//! point of view: both writes happen under one store transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

use crate::ids::AssetId;
use crate::ids::AssetMetadataId;
use crate::ids::RunId;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Lifecycle status of an [`AssetMetadata`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataStatus {
    /// The current canonical record for its `(asset_id, metadata_type)`.
    Active,
    /// Replaced by a newer record.
    Superseded,
    /// Retired without a replacement.
    Deprecated,
}

// ============================================================================
// SECTION: AssetMetadata
// ============================================================================

/// Experiment-supporting metadata slot (§3 AssetMetadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMetadata {
    /// Primary identifier.
    pub id: AssetMetadataId,
    /// The asset this metadata describes.
    pub asset_id: AssetId,
    /// Caller-defined kind, e.g. `"summary.executive.v1"`.
    pub metadata_type: String,
    /// Schema version of `metadata_content`.
    pub schema_version: u32,
    /// The metadata payload.
    pub metadata_content: Json,
    /// The Run that produced this record, if any.
    pub producer_run_id: Option<RunId>,
    /// Whether this is the canonical record for its type.
    pub is_canonical: bool,
    /// Current status.
    pub status: MetadataStatus,
    /// The record that superseded this one, if any.
    pub superseded_by_id: Option<AssetMetadataId>,
    /// When this record was superseded.
    pub superseded_at: Option<DateTime<Utc>>,
    /// When this record was promoted to canonical.
    pub promoted_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl AssetMetadata {
    /// Creates a new, non-canonical metadata record.
    #[must_use]
    pub fn new(
        asset_id: AssetId,
        metadata_type: impl Into<String>,
        schema_version: u32,
        metadata_content: Json,
        producer_run_id: Option<RunId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AssetMetadataId::new(),
            asset_id,
            metadata_type: metadata_type.into(),
            schema_version,
            metadata_content,
            producer_run_id,
            is_canonical: false,
            status: MetadataStatus::Active,
            superseded_by_id: None,
            superseded_at: None,
            promoted_at: None,
            created_at: now,
        }
    }

    /// Marks this record superseded by `successor`, returning the fields
    /// the caller must also persist on `self` (bucketed here so both
    /// halves of the atomic swap live next to each other).
    pub fn supersede(&mut self, successor: AssetMetadataId, now: DateTime<Utc>) {
        self.status = MetadataStatus::Superseded;
        self.is_canonical = false;
        self.superseded_by_id = Some(successor);
        self.superseded_at = Some(now);
    }

    /// Promotes this record to canonical.
    pub fn promote(&mut self, now: DateTime<Utc>) {
        self.is_canonical = true;
        self.status = MetadataStatus::Active;
        self.promoted_at = Some(now);
    }

    /// Whether `self` and `other` share the `(asset_id, metadata_type)`
    /// slot the canonical-uniqueness invariant is scoped to.
    #[must_use]
    pub fn same_slot(&self, other: &Self) -> bool {
        self.asset_id == other.asset_id && self.metadata_type == other.metadata_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        DateTime::<Utc>::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn promote_sets_canonical_and_active() {
        let mut record = AssetMetadata::new(
            AssetId::new(),
            "summary.executive.v1",
            1,
            serde_json::json!({}),
            None,
            now(),
        );
        record.promote(now());
        assert!(record.is_canonical);
        assert_eq!(record.status, MetadataStatus::Active);
    }

    #[test]
    fn supersede_clears_canonical_and_links_successor() {
        let mut old = AssetMetadata::new(
            AssetId::new(),
            "summary.executive.v1",
            1,
            serde_json::json!({}),
            None,
            now(),
        );
        old.promote(now());
        let new_id = AssetMetadataId::new();
        old.supersede(new_id, now());
        assert!(!old.is_canonical);
        assert_eq!(old.status, MetadataStatus::Superseded);
        assert_eq!(old.superseded_by_id, Some(new_id));
    }

    #[test]
    fn same_slot_requires_matching_asset_and_type() {
        let asset = AssetId::new();
        let a = AssetMetadata::new(asset, "summary.executive.v1", 1, serde_json::json!({}), None, now());
        let b = AssetMetadata::new(asset, "summary.executive.v1", 2, serde_json::json!({}), None, now());
        let c = AssetMetadata::new(asset, "classification.v1", 1, serde_json::json!({}), None, now());
        assert!(a.same_slot(&b));
        assert!(!a.same_slot(&c));
    }
}
