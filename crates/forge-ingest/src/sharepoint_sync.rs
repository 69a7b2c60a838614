// forge-ingest/src/sharepoint_sync.rs
// ============================================================================
// Module: SharePoint Sync Orchestrator
// Description: Folder inventory sync against a Microsoft Graph drive
//              (§4.9 C9).
// Dependencies: forge-core, forge-providers, forge-queue, forge-ingest::ports
// ============================================================================

//! ## Overview
//! [`SharePointSyncOrchestrator::execute_sync`] walks one
//! [`SharePointSyncConfig`]'s remote folder, classifies every item against
//! its prior [`SharePointSyncedDocument`], and reconciles deletions in a
//! second pass once the full inventory is known.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use forge_core::asset::Asset;
use forge_core::asset::AssetStatus;
use forge_core::asset::AssetVersion;
use forge_core::asset::ExtractionTier;
use forge_core::asset::SourceType;
use forge_core::hashing::ContentHash;
use forge_core::ids::AssetId;
use forge_core::ids::OrganizationId;
use forge_core::ids::RunId;
use forge_core::ids::SharePointSyncConfigId;
use forge_core::interfaces::DispatchError;
use forge_core::interfaces::ObjectStore;
use forge_core::interfaces::ObjectStoreError;
use forge_core::interfaces::RunStore;
use forge_core::interfaces::StoreError;
use forge_core::run::RunOrigin;
use forge_core::sharepoint::SharePointSyncConfig;
use forge_core::sharepoint::SharePointSyncedDocument;
use forge_core::sharepoint::SyncClassification;
use forge_core::sharepoint::SyncPhase;
use forge_core::sharepoint::SyncStatus;
use forge_providers::GraphClient;
use forge_queue::AssetStore as QueueAssetStore;
use forge_queue::ExtractionQueue;
use forge_queue::RAW_BUCKET;
use serde::Serialize;
use serde_json::Value as Json;
use serde_json::json;
use thiserror::Error;

use crate::ports::AssetVersionStore;
use crate::ports::SharePointStore;
use crate::url_util;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised driving one sync. A per-item download failure is *not* one
/// of these: it is counted against `items_failed` and the sync continues.
#[derive(Debug, Error)]
pub enum SharePointSyncError {
    /// A persistence call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Listing the remote folder failed outright.
    #[error(transparent)]
    Provider(#[from] forge_providers::ProviderError),
    /// Queuing a follow-on extraction failed.
    #[error(transparent)]
    Queue(#[from] forge_queue::QueueError),
    /// Dispatch of a follow-on task failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

// ============================================================================
// SECTION: Summary
// ============================================================================

/// Terminal sync summary (§4.9 step 4).
#[derive(Debug, Clone, Default, Serialize)]
pub struct SharePointSyncSummary {
    /// Remote items observed this run.
    pub items_observed: u32,
    /// Items downloaded for the first time.
    pub items_new: u32,
    /// Items redownloaded because their ETag changed (or a full sync was
    /// requested).
    pub items_updated: u32,
    /// Items whose ETag matched the prior sync; skipped.
    pub items_unchanged: u32,
    /// Items excluded by size or glob filters.
    pub items_skipped: u32,
    /// Previously synced items newly detected missing from the inventory.
    pub items_deleted: u32,
    /// Items that failed to download and were skipped.
    pub items_failed: u32,
}

// ============================================================================
// SECTION: SharePointSyncOrchestrator
// ============================================================================

/// Drives one SharePoint sync Run end to end (§4.9 C9).
pub struct SharePointSyncOrchestrator {
    runs: Arc<dyn RunStore>,
    sync_configs: Arc<dyn SharePointStore>,
    assets: Arc<dyn QueueAssetStore>,
    asset_versions: Arc<dyn AssetVersionStore>,
    objects: Arc<dyn ObjectStore>,
    graph: Arc<dyn GraphClient>,
    extraction_queue: Arc<ExtractionQueue>,
}

impl SharePointSyncOrchestrator {
    /// Wires the orchestrator to its dependencies.
    #[must_use]
    pub fn new(
        runs: Arc<dyn RunStore>,
        sync_configs: Arc<dyn SharePointStore>,
        assets: Arc<dyn QueueAssetStore>,
        asset_versions: Arc<dyn AssetVersionStore>,
        objects: Arc<dyn ObjectStore>,
        graph: Arc<dyn GraphClient>,
        extraction_queue: Arc<ExtractionQueue>,
    ) -> Self {
        Self { runs, sync_configs, assets, asset_versions, objects, graph, extraction_queue }
    }

    /// Runs one full sync for `sync_config_id` (§4.9).
    ///
    /// # Errors
    ///
    /// Returns [`SharePointSyncError`] when the remote inventory cannot be
    /// listed at all, or on a persistence/dispatch failure.
    pub async fn execute_sync(
        &self,
        organization_id: OrganizationId,
        sync_config_id: SharePointSyncConfigId,
        run_id: RunId,
        full_sync: bool,
        now: DateTime<Utc>,
    ) -> Result<SharePointSyncSummary, SharePointSyncError> {
        let mut config = self.sync_configs.get_config(organization_id, sync_config_id).await?;
        let items = self.graph.list_folder(&config.site_id, &config.drive_id, &config.folder_path, config.recursive).await?;

        let mut summary = SharePointSyncSummary::default();
        let mut observed_ids: HashSet<String> = HashSet::new();
        let total = u64::try_from(items.len()).unwrap_or(u64::MAX);

        self.report_phase(&mut config, SyncPhase::Syncing, &summary, now).await?;

        for (index, item) in items.iter().enumerate() {
            summary.items_observed += 1;
            let relative_path = format!("/{}", item.path);
            if !url_util::path_allowed(&relative_path, &config.include_patterns, &config.exclude_patterns) {
                summary.items_skipped += 1;
                continue;
            }
            if let Some(max_size) = config.max_file_size_bytes {
                if item.size > max_size {
                    summary.items_skipped += 1;
                    continue;
                }
            }

            observed_ids.insert(item.item_id.clone());
            let existing = self.sync_configs.find_synced_document(sync_config_id, &item.item_id).await?;

            let classification = existing.as_ref().map_or(SyncClassification::New, |document| document.classify(&item.etag, full_sync));

            match classification {
                SyncClassification::Unchanged => {
                    if let Some(mut document) = existing {
                        document.mark_unchanged(now);
                        self.sync_configs.save_synced_document(document).await?;
                    }
                    summary.items_unchanged += 1;
                }
                SyncClassification::New => {
                    match self.graph.download_item(&config.site_id, &config.drive_id, &item.item_id).await {
                        Ok(bytes) => {
                            self.create_synced_asset(organization_id, sync_config_id, &config.slug, item, bytes, now).await?;
                            summary.items_new += 1;
                        }
                        Err(_) => summary.items_failed += 1,
                    }
                }
                SyncClassification::Updated => {
                    let Some(mut document) = existing else { continue };
                    match self.graph.download_item(&config.site_id, &config.drive_id, &item.item_id).await {
                        Ok(bytes) => {
                            self.overwrite_synced_asset(organization_id, &mut document, bytes, &item.etag, now).await?;
                            summary.items_updated += 1;
                        }
                        Err(_) => summary.items_failed += 1,
                    }
                }
            }

            self.runs.update_progress(organization_id, run_id, u64::try_from(index + 1).unwrap_or(u64::MAX), total, Some("files".to_string())).await?;
        }

        self.report_phase(&mut config, SyncPhase::DetectingDeletions, &summary, now).await?;

        let previously_synced = self.sync_configs.list_synced_documents(sync_config_id).await?;
        for mut document in previously_synced {
            if document.sync_status != SyncStatus::DeletedInSource && !observed_ids.contains(&document.sharepoint_item_id) {
                document.mark_deleted_in_source(now);
                self.sync_configs.save_synced_document(document).await?;
                summary.items_deleted += 1;
            }
        }

        self.report_phase(&mut config, SyncPhase::Completed, &summary, now).await?;
        self.runs.complete(organization_id, run_id, serde_json::to_value(&summary).unwrap_or(Json::Null)).await?;
        Ok(summary)
    }

    async fn report_phase(
        &self,
        config: &mut SharePointSyncConfig,
        phase: SyncPhase,
        summary: &SharePointSyncSummary,
        now: DateTime<Utc>,
    ) -> Result<(), SharePointSyncError> {
        config.stats = json!({
            "phase": phase,
            "summary": summary,
            "updated_at": now,
        });
        *config = self.sync_configs.save_config(config.clone()).await?;
        Ok(())
    }

    async fn create_synced_asset(
        &self,
        organization_id: OrganizationId,
        sync_config_id: SharePointSyncConfigId,
        sync_slug: &str,
        item: &forge_providers::DriveItem,
        bytes: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Result<(), SharePointSyncError> {
        let hash = ContentHash::of(&bytes);
        let relative_path = parent_path(&item.path);
        let raw_key = sharepoint_object_key(organization_id, sync_slug, &relative_path, &item.name);
        self.objects.put_object(RAW_BUCKET, &raw_key, bytes.clone(), &item.content_type).await.map_err(store_error_from_object)?;

        let asset = Asset {
            id: AssetId::new(),
            organization_id,
            source_type: SourceType::Sharepoint,
            source_metadata: json!({
                "sync_slug": sync_slug,
                "relative_path": relative_path,
                "sharepoint_item_id": item.item_id,
            }),
            original_filename: item.name.clone(),
            content_type: item.content_type.clone(),
            file_size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            file_hash: hash.clone(),
            raw_bucket: RAW_BUCKET.to_string(),
            raw_object_key: raw_key,
            status: AssetStatus::Pending,
            current_version_number: 1,
            extraction_tier: ExtractionTier::None,
            enhancement_eligible: false,
            enhancement_queued_at: None,
            created_at: now,
            updated_at: now,
            created_by: None,
        };
        let asset = self.assets.save(asset).await?;
        self.asset_versions
            .create(AssetVersion::first(asset.id, RAW_BUCKET, asset.raw_object_key.clone(), asset.file_size, hash.clone(), item.content_type.clone(), None, now))
            .await?;

        let document = SharePointSyncedDocument {
            sync_config_id,
            sharepoint_item_id: item.item_id.clone(),
            asset_id: asset.id,
            sharepoint_etag: item.etag.clone(),
            content_hash: hash,
            sync_status: SyncStatus::Synced,
            deleted_detected_at: None,
            last_synced_at: now,
        };
        self.sync_configs.save_synced_document(document).await?;

        self.extraction_queue.queue_extraction(organization_id, &asset, RunOrigin::System, 0, None, None, now).await?;
        Ok(())
    }

    async fn overwrite_synced_asset(
        &self,
        organization_id: OrganizationId,
        document: &mut SharePointSyncedDocument,
        bytes: Vec<u8>,
        new_etag: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SharePointSyncError> {
        let hash = ContentHash::of(&bytes);
        let mut asset = self.assets.get(organization_id, document.asset_id).await?;
        self.objects.put_object(&asset.raw_bucket, &asset.raw_object_key, bytes.clone(), &asset.content_type).await.map_err(store_error_from_object)?;

        asset.file_size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        asset.file_hash = hash.clone();
        asset.status = AssetStatus::Pending;
        asset.updated_at = now;
        let asset = self.assets.save(asset).await?;

        document.mark_updated(new_etag, hash, now);
        self.sync_configs.save_synced_document(document.clone()).await?;

        self.extraction_queue.queue_extraction(organization_id, &asset, RunOrigin::System, 0, None, None, now).await?;
        Ok(())
    }
}

fn parent_path(path: &str) -> String {
    path.rsplit_once('/').map_or_else(String::new, |(parent, _)| parent.to_string())
}

fn sharepoint_object_key(organization_id: OrganizationId, sync_slug: &str, relative_path: &str, filename: &str) -> String {
    if relative_path.is_empty() {
        format!("{organization_id}/sharepoint/{sync_slug}/{filename}")
    } else {
        format!("{organization_id}/sharepoint/{sync_slug}/{relative_path}/{filename}")
    }
}

fn store_error_from_object(error: ObjectStoreError) -> StoreError {
    StoreError::Io(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_path_splits_on_last_slash() {
        assert_eq!(parent_path("reports/2026/q1.pdf"), "reports/2026");
        assert_eq!(parent_path("q1.pdf"), "");
    }

    #[test]
    fn sharepoint_object_key_omits_empty_relative_path() {
        let organization_id = OrganizationId::new();
        assert_eq!(sharepoint_object_key(organization_id, "acme", "", "q1.pdf"), format!("{organization_id}/sharepoint/acme/q1.pdf"));
        assert_eq!(sharepoint_object_key(organization_id, "acme", "2026", "q1.pdf"), format!("{organization_id}/sharepoint/acme/2026/q1.pdf"));
    }
}
