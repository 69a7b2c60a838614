// forge-core/src/asset.rs
// ============================================================================
// Module: Asset
// Description: Canonical document record and its immutable version history.
// Purpose: Model the raw content an organization owns, independent of where
//          it came from (upload, crawl, SharePoint, SAM.gov).
// Dependencies: chrono, serde
// ============================================================================

//! ## Overview
//! An [`Asset`] is the stable identity for a document; each [`AssetVersion`]
//! is an immutable snapshot of its raw bytes. Exactly one version is current
//! at a time (§3 AssetVersion invariant).

// ============================================================================
// SECTION: Imports
// ============================================================================

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

use crate::error::TenantScoped;
use crate::hashing::ContentHash;
use crate::ids::AssetId;
use crate::ids::OrganizationId;
use crate::ids::UserId;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// Where an asset's raw content originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Uploaded directly by a user.
    Upload,
    /// Pulled from a SharePoint sync.
    Sharepoint,
    /// Discovered by a web crawl.
    WebScrape,
    /// A document linked from a crawled page (PDF, DOCX, …).
    WebScrapeDocument,
    /// Pulled from a SAM.gov opportunity.
    SamGov,
}

/// Lifecycle status of an asset's raw content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    /// Uploaded/discovered but not yet extracted.
    Pending,
    /// Extraction succeeded; markdown is available.
    Ready,
    /// Extraction failed.
    Failed,
    /// Soft-deleted; content retained but hidden from normal listing.
    Deleted,
}

/// Depth of extraction applied to an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTier {
    /// No extraction has run yet.
    None,
    /// Plain extractor engine only.
    Basic,
    /// Basic extraction plus an enhancement pass.
    Enhanced,
}

// ============================================================================
// SECTION: Asset
// ============================================================================

/// Canonical document record (§3 Asset).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Primary identifier.
    pub id: AssetId,
    /// Owning tenant.
    pub organization_id: OrganizationId,
    /// Where the content came from.
    pub source_type: SourceType,
    /// Source-specific context (e.g. crawl URL, SharePoint item id).
    pub source_metadata: Json,
    /// Original filename as supplied by the source.
    pub original_filename: String,
    /// MIME type of the raw content.
    pub content_type: String,
    /// Size of the current version's raw content, in bytes.
    pub file_size: u64,
    /// Content hash of the current version, used for dedup lookups.
    pub file_hash: ContentHash,
    /// Object store bucket holding the raw content.
    pub raw_bucket: String,
    /// Object store key of the raw content within `raw_bucket`.
    pub raw_object_key: String,
    /// Current lifecycle status.
    pub status: AssetStatus,
    /// Version number of the current [`AssetVersion`].
    pub current_version_number: u32,
    /// Depth of extraction applied.
    pub extraction_tier: ExtractionTier,
    /// Whether this asset's extension qualifies for an enhancement pass.
    pub enhancement_eligible: bool,
    /// When an enhancement Run was queued, if any.
    pub enhancement_queued_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-modified timestamp.
    pub updated_at: DateTime<Utc>,
    /// The user who created this asset, if any (system-origin assets have
    /// none).
    pub created_by: Option<UserId>,
}

impl TenantScoped for Asset {
    fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }
}

impl Asset {
    /// Returns whether `(raw_bucket, raw_object_key)` matches another
    /// asset's storage location, the basis of the §3 storage-path
    /// collision rule ("reuse of an existing asset, not an error").
    #[must_use]
    pub fn same_storage_location(&self, bucket: &str, object_key: &str) -> bool {
        self.raw_bucket == bucket && self.raw_object_key == object_key
    }

    /// Marks extraction success: flips status to `ready`, tier to `basic`,
    /// and records enhancement eligibility (§4.4 step 7).
    pub fn mark_extraction_ready(&mut self, enhancement_eligible: bool, now: DateTime<Utc>) {
        self.status = AssetStatus::Ready;
        self.extraction_tier = ExtractionTier::Basic;
        self.enhancement_eligible = enhancement_eligible;
        self.updated_at = now;
    }

    /// Marks extraction failure (§4.4 step 10).
    pub fn mark_extraction_failed(&mut self, now: DateTime<Utc>) {
        self.status = AssetStatus::Failed;
        self.updated_at = now;
    }

    /// Marks an enhancement Run as queued, recording when so a second
    /// enqueue attempt can be detected upstream.
    pub fn mark_enhancement_queued(&mut self, now: DateTime<Utc>) {
        self.enhancement_queued_at = Some(now);
        self.updated_at = now;
    }

    /// Marks enhancement success: flips tier to `enhanced` (§4.4 step 9
    /// enhancement path).
    pub fn mark_enhanced(&mut self, now: DateTime<Utc>) {
        self.extraction_tier = ExtractionTier::Enhanced;
        self.updated_at = now;
    }

    /// Soft-deletes the asset.
    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        self.status = AssetStatus::Deleted;
        self.updated_at = now;
    }
}

// ============================================================================
// SECTION: AssetVersion
// ============================================================================

/// Immutable raw-content snapshot of an [`Asset`] (§3 AssetVersion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetVersion {
    /// The asset this version belongs to.
    pub asset_id: AssetId,
    /// Monotonically increasing per asset, starting at 1.
    pub version_number: u32,
    /// Object store bucket.
    pub raw_bucket: String,
    /// Object store key.
    pub raw_object_key: String,
    /// Size in bytes.
    pub file_size: u64,
    /// Content hash.
    pub file_hash: ContentHash,
    /// MIME type.
    pub content_type: String,
    /// Whether this is the asset's current version.
    pub is_current: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// The user who created this version, if any.
    pub created_by: Option<UserId>,
}

impl AssetVersion {
    /// Builds the first version (`version_number = 1`, `is_current = true`)
    /// of a newly created asset.
    #[must_use]
    pub fn first(
        asset_id: AssetId,
        raw_bucket: impl Into<String>,
        raw_object_key: impl Into<String>,
        file_size: u64,
        file_hash: ContentHash,
        content_type: impl Into<String>,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            asset_id,
            version_number: 1,
            raw_bucket: raw_bucket.into(),
            raw_object_key: raw_object_key.into(),
            file_size,
            file_hash,
            content_type: content_type.into(),
            is_current: true,
            created_at: now,
            created_by,
        }
    }

    /// Builds the next version after `previous`, which the caller must
    /// flip to `is_current = false` in the same transaction.
    #[must_use]
    pub fn next_after(
        previous: &Self,
        raw_bucket: impl Into<String>,
        raw_object_key: impl Into<String>,
        file_size: u64,
        file_hash: ContentHash,
        content_type: impl Into<String>,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            asset_id: previous.asset_id,
            version_number: previous.version_number + 1,
            raw_bucket: raw_bucket.into(),
            raw_object_key: raw_object_key.into(),
            file_size,
            file_hash,
            content_type: content_type.into(),
            is_current: true,
            created_at: now,
            created_by,
        }
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
    fn next_version_increments_and_stays_current() {
        let first = AssetVersion::first(
            AssetId::new(),
            "raw",
            "key-1",
            10,
            ContentHash::of(b"a"),
            "text/plain",
            None,
            now(),
        );
        let second = AssetVersion::next_after(
            &first,
            "raw",
            "key-2",
            20,
            ContentHash::of(b"b"),
            "text/plain",
            None,
            now(),
        );
        assert_eq!(second.version_number, 2);
        assert!(second.is_current);
    }

    #[test]
    fn same_storage_location_matches_bucket_and_key() {
        let asset = Asset {
            id: AssetId::new(),
            organization_id: OrganizationId::new(),
            source_type: SourceType::Upload,
            source_metadata: serde_json::json!({}),
            original_filename: "a.pdf".into(),
            content_type: "application/pdf".into(),
            file_size: 1,
            file_hash: ContentHash::of(b"a"),
            raw_bucket: "raw".into(),
            raw_object_key: "org/uploads/1/a.pdf".into(),
            status: AssetStatus::Pending,
            current_version_number: 1,
            extraction_tier: ExtractionTier::None,
            enhancement_eligible: false,
            enhancement_queued_at: None,
            created_at: now(),
            updated_at: now(),
            created_by: None,
        };
        assert!(asset.same_storage_location("raw", "org/uploads/1/a.pdf"));
        assert!(!asset.same_storage_location("raw", "org/uploads/2/a.pdf"));
    }

    #[test]
    fn mark_extraction_ready_sets_tier_and_status() {
        let mut asset = Asset {
            id: AssetId::new(),
            organization_id: OrganizationId::new(),
            source_type: SourceType::Upload,
            source_metadata: serde_json::json!({}),
            original_filename: "a.pdf".into(),
            content_type: "application/pdf".into(),
            file_size: 1,
            file_hash: ContentHash::of(b"a"),
            raw_bucket: "raw".into(),
            raw_object_key: "key".into(),
            status: AssetStatus::Pending,
            current_version_number: 1,
            extraction_tier: ExtractionTier::None,
            enhancement_eligible: false,
            enhancement_queued_at: None,
            created_at: now(),
            updated_at: now(),
            created_by: None,
        };
        asset.mark_extraction_ready(true, now());
        assert_eq!(asset.status, AssetStatus::Ready);
        assert_eq!(asset.extraction_tier, ExtractionTier::Basic);
        assert!(asset.enhancement_eligible);
    }
}
