// forge-core/src/sharepoint.rs
// ============================================================================
// Module: SharePoint Sync
// Description: Remote-folder sync configuration and per-item sync records.
// Purpose: Model what the sync orchestrator (forge-ingest) reads and
//          writes; Graph API calls themselves live in forge-providers.
// Dependencies: chrono, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`SharePointSyncConfig`] owns one remote folder; each
//! [`SharePointSyncedDocument`] tracks one remote item by
//! `(sync_config_id, sharepoint_item_id)` across repeated syncs, comparing
//! ETags to decide new/unchanged/updated (§4.9).

// ============================================================================
// SECTION: Imports
// ============================================================================

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

use crate::hashing::ContentHash;
use crate::ids::AssetId;
use crate::ids::OrganizationId;
use crate::ids::SharePointSyncConfigId;

// ============================================================================
// SECTION: Sync Config
// ============================================================================

/// Remote-folder sync configuration (§3 SharePointSyncConfig).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharePointSyncConfig {
    /// Primary identifier.
    pub id: SharePointSyncConfigId,
    /// Owning tenant.
    pub organization_id: OrganizationId,
    /// Human-readable slug, used in storage paths (§4.4).
    pub slug: String,
    /// Remote site id.
    pub site_id: String,
    /// Remote drive id.
    pub drive_id: String,
    /// Root folder path within the drive.
    pub folder_path: String,
    /// Whether to recurse into subfolders.
    pub recursive: bool,
    /// Skip files larger than this, in bytes.
    pub max_file_size_bytes: Option<u64>,
    /// Shell-style include globs; empty means allow-all.
    #[serde(default)]
    pub include_patterns: Vec<String>,
    /// Shell-style exclude globs, checked first.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Live per-run progress/summary, written during `execute_sync`.
    pub stats: Json,
    /// Whether this config is currently synced.
    pub is_active: bool,
}

/// Sync-run phase recorded into [`SharePointSyncConfig::stats`] (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Walking inventory and syncing individual items.
    Syncing,
    /// Comparing prior synced documents against the observed set.
    DetectingDeletions,
    /// The sync run has finished.
    Completed,
}

// ============================================================================
// SECTION: Synced Document
// ============================================================================

/// Status of one remote item's local mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Present both locally and remotely, content up to date.
    Synced,
    /// Was observed before but is missing from the latest inventory.
    DeletedInSource,
    /// No longer referenced by any active sync config.
    Orphaned,
}

/// Classification of one inventory entry against prior sync state (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncClassification {
    /// No prior record: download and create a new asset.
    New,
    /// Prior record, ETag matches, not a full sync: nothing to do.
    Unchanged,
    /// Prior record, ETag differs or a full sync was requested: redownload.
    Updated,
}

/// Tracks one remote item across repeated syncs (§3
/// SharePointSyncedDocument).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharePointSyncedDocument {
    /// The owning sync config.
    pub sync_config_id: SharePointSyncConfigId,
    /// Remote item identifier, stable across renames.
    pub sharepoint_item_id: String,
    /// The local asset mirroring this item.
    pub asset_id: AssetId,
    /// The remote item's ETag at last sync.
    pub sharepoint_etag: String,
    /// Content hash of the locally stored copy.
    pub content_hash: ContentHash,
    /// Current sync status.
    pub sync_status: SyncStatus,
    /// When this item was first observed missing from inventory.
    pub deleted_detected_at: Option<DateTime<Utc>>,
    /// Last time this item was synced (observed and reconciled).
    pub last_synced_at: DateTime<Utc>,
}

impl SharePointSyncedDocument {
    /// Classifies an inventory entry against this prior record (§4.9
    /// step 2).
    #[must_use]
    pub fn classify(&self, observed_etag: &str, full_sync: bool) -> SyncClassification {
        if !full_sync && self.sharepoint_etag == observed_etag {
            SyncClassification::Unchanged
        } else {
            SyncClassification::Updated
        }
    }

    /// Applies the `unchanged` outcome: bumps `last_synced_at` and clears
    /// a stale `deleted_in_source` status (§4.9 step 2).
    pub fn mark_unchanged(&mut self, now: DateTime<Utc>) {
        self.last_synced_at = now;
        if self.sync_status == SyncStatus::DeletedInSource {
            self.sync_status = SyncStatus::Synced;
            self.deleted_detected_at = None;
        }
    }

    /// Applies the `updated` outcome (§4.9 step 2).
    pub fn mark_updated(&mut self, new_etag: impl Into<String>, new_hash: ContentHash, now: DateTime<Utc>) {
        self.sharepoint_etag = new_etag.into();
        self.content_hash = new_hash;
        self.sync_status = SyncStatus::Synced;
        self.deleted_detected_at = None;
        self.last_synced_at = now;
    }

    /// Marks this document missing from the latest inventory (§4.9 step 3).
    pub fn mark_deleted_in_source(&mut self, now: DateTime<Utc>) {
        if self.sync_status != SyncStatus::DeletedInSource {
            self.sync_status = SyncStatus::DeletedInSource;
            self.deleted_detected_at = Some(now);
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

    fn document() -> SharePointSyncedDocument {
        SharePointSyncedDocument {
            sync_config_id: SharePointSyncConfigId::new(),
            sharepoint_item_id: "item-1".to_string(),
            asset_id: AssetId::new(),
            sharepoint_etag: "etag-1".to_string(),
            content_hash: ContentHash::of(b"v1"),
            sync_status: SyncStatus::Synced,
            deleted_detected_at: None,
            last_synced_at: now(),
        }
    }

    #[test]
    fn matching_etag_without_full_sync_is_unchanged() {
        let document = document();
        assert_eq!(document.classify("etag-1", false), SyncClassification::Unchanged);
    }

    #[test]
    fn differing_etag_is_updated() {
        let document = document();
        assert_eq!(document.classify("etag-2", false), SyncClassification::Updated);
    }

    #[test]
    fn full_sync_forces_updated_even_with_matching_etag() {
        let document = document();
        assert_eq!(document.classify("etag-1", true), SyncClassification::Updated);
    }

    #[test]
    fn mark_unchanged_clears_deleted_in_source() {
        let mut document = document();
        document.sync_status = SyncStatus::DeletedInSource;
        document.deleted_detected_at = Some(now());
        document.mark_unchanged(now());
        assert_eq!(document.sync_status, SyncStatus::Synced);
        assert_eq!(document.deleted_detected_at, None);
    }

    #[test]
    fn mark_deleted_in_source_is_idempotent_on_timestamp() {
        let mut document = document();
        document.mark_deleted_in_source(now());
        let first = document.deleted_detected_at;
        document.mark_deleted_in_source(now());
        assert_eq!(document.deleted_detected_at, first);
    }
}
