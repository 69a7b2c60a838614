// forge-store-sqlite/src/queries.rs
// ============================================================================
// Module: Asset Query / Run Stats Store
// Description: `forge_server::ports::{AssetQueryStore, RunStatsStore}`
//              implementations backed by the same connection as
//              `SqliteStore`'s RunStore/RunGroupStore (§6.1, §6.2).
// Dependencies: rusqlite, tokio, async-trait, forge-core, forge-ingest,
//               forge-server
// ============================================================================

//! ## Overview
//! These two traits exist only because [`forge_server`] needs read paths
//! that `forge_queue::AssetStore` and `forge_core::interfaces::RunStore`
//! don't cover — tenant-scoped listing, version history, health rollups,
//! and a 24h stats window. Implementing them here (rather than in
//! `forge-server` itself) is what lets `SqliteStore` satisfy them without
//! running into Rust's orphan rule: see the crate-level note in
//! `DESIGN.md` on why `forge-store-sqlite` depends on `forge-server`.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use forge_core::asset::Asset;
use forge_core::asset::AssetVersion;
use forge_core::extraction::ExtractionResult;
use forge_core::ids::AssetId;
use forge_core::ids::OrganizationId;
use forge_core::interfaces::StoreError;
use forge_ingest::CandidateFile;
use forge_ingest::ExistingAsset;
use forge_server::ports::AssetFilter;
use forge_server::ports::AssetHealthSummary;
use forge_server::ports::AssetQueryStore;
use forge_server::ports::RunStats;
use forge_server::ports::RunStatsStore;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::error::SqliteStoreError;
use crate::store::SqliteStore;
use crate::store::asset_from_row;
use crate::store::asset_version_from_row;
use crate::store::asset_status_str;
use crate::store::content_hash_from_stored;
use crate::store::extraction_result_from_row;
use crate::store::extraction_tier_str;
use crate::store::parse_id;

#[async_trait]
impl AssetQueryStore for SqliteStore {
    async fn list(&self, organization_id: OrganizationId, filter: AssetFilter, limit: u32, offset: u32) -> Result<Vec<Asset>, StoreError> {
        self.with_connection(move |connection| {
            let (clause, status) = match filter.status {
                Some(status) => (" AND status = ?2", Some(asset_status_str(status).to_string())),
                None => ("", None),
            };
            let sql = format!(
                "SELECT * FROM assets WHERE organization_id = ?1{clause} ORDER BY created_at DESC LIMIT {limit} OFFSET {offset}"
            );
            let mut statement = connection.prepare(&sql)?;
            let rows = if let Some(status) = status {
                statement.query_map(params![organization_id.to_string(), status], asset_from_row)?.collect::<Result<Vec<_>, _>>()?
            } else {
                statement.query_map(params![organization_id.to_string()], asset_from_row)?.collect::<Result<Vec<_>, _>>()?
            };
            Ok(rows)
        })
        .await
    }

    async fn list_versions(&self, organization_id: OrganizationId, asset_id: AssetId) -> Result<Vec<AssetVersion>, StoreError> {
        self.with_connection(move |connection| {
            Self::load_asset_scoped(connection, organization_id, asset_id)?;
            let mut statement = connection.prepare(
                "SELECT * FROM asset_versions WHERE asset_id = ?1 ORDER BY version_number ASC",
            )?;
            let rows = statement.query_map(params![asset_id.to_string()], asset_version_from_row)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn get_version(&self, organization_id: OrganizationId, asset_id: AssetId, version_number: u32) -> Result<AssetVersion, StoreError> {
        self.with_connection(move |connection| {
            Self::load_asset_scoped(connection, organization_id, asset_id)?;
            connection
                .query_row(
                    "SELECT * FROM asset_versions WHERE asset_id = ?1 AND version_number = ?2",
                    params![asset_id.to_string(), version_number],
                    asset_version_from_row,
                )
                .optional()?
                .ok_or_else(|| SqliteStoreError::NotFound(format!("asset {asset_id} version {version_number}")))
        })
        .await
    }

    async fn health(&self, organization_id: OrganizationId) -> Result<AssetHealthSummary, StoreError> {
        self.with_connection(move |connection| {
            let mut summary = AssetHealthSummary::default();
            let mut by_status = connection.prepare(
                "SELECT status, COUNT(*) FROM assets WHERE organization_id = ?1 GROUP BY status",
            )?;
            let rows = by_status.query_map(params![organization_id.to_string()], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((status, count))
            })?;
            for row in rows {
                let (status, count) = row?;
                summary.by_status.insert(status, u64::try_from(count).unwrap_or_default());
            }

            let mut by_tier = connection.prepare(
                "SELECT extraction_tier, COUNT(*) FROM assets WHERE organization_id = ?1 AND status != 'deleted' GROUP BY extraction_tier",
            )?;
            let rows = by_tier.query_map(params![organization_id.to_string()], |row| {
                let tier: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((tier, count))
            })?;
            for row in rows {
                let (tier, count) = row?;
                summary.by_tier.insert(tier, u64::try_from(count).unwrap_or_default());
            }

            let total_storage_bytes: i64 = connection.query_row(
                "SELECT COALESCE(SUM(file_size), 0) FROM assets WHERE organization_id = ?1 AND status != 'deleted'",
                params![organization_id.to_string()],
                |row| row.get(0),
            )?;
            summary.total_storage_bytes = u64::try_from(total_storage_bytes).unwrap_or_default();

            Ok(summary)
        })
        .await
    }

    async fn latest_extraction_result(&self, organization_id: OrganizationId, asset_id: AssetId) -> Result<ExtractionResult, StoreError> {
        self.with_connection(move |connection| {
            Self::load_asset_scoped(connection, organization_id, asset_id)?;
            connection
                .query_row(
                    "SELECT * FROM extraction_results WHERE asset_id = ?1 ORDER BY created_at DESC LIMIT 1",
                    params![asset_id.to_string()],
                    extraction_result_from_row,
                )
                .optional()?
                .ok_or_else(|| SqliteStoreError::NotFound(format!("no extraction result for asset {asset_id}")))
        })
        .await
    }

    async fn inventory(&self, organization_id: OrganizationId) -> Result<Vec<ExistingAsset>, StoreError> {
        self.with_connection(move |connection| {
            let mut statement = connection.prepare(
                "SELECT id, original_filename, file_hash FROM assets WHERE organization_id = ?1 AND status != 'deleted'",
            )?;
            let rows = statement.query_map(params![organization_id.to_string()], |row| {
                let id: String = row.get(0)?;
                let filename: String = row.get(1)?;
                let hash: String = row.get(2)?;
                Ok((id, filename, hash))
            })?;
            let mut existing = Vec::new();
            for row in rows {
                let (id, filename, hash) = row?;
                existing.push(ExistingAsset {
                    asset_id: parse_id::<AssetId>(&id, "asset id")?,
                    filename,
                    content_hash: content_hash_from_stored(hash)?,
                });
            }
            Ok(existing)
        })
        .await
    }

    async fn create_from_candidate(
        &self,
        organization_id: OrganizationId,
        candidate: &CandidateFile,
        raw_bucket: &str,
        raw_object_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Asset, StoreError> {
        let candidate = candidate.clone();
        let raw_bucket = raw_bucket.to_string();
        let raw_object_key = raw_object_key.to_string();
        self.with_connection(move |connection| {
            let asset = Asset {
                id: AssetId::new(),
                organization_id,
                source_type: forge_core::asset::SourceType::Upload,
                source_metadata: serde_json::Value::Null,
                original_filename: candidate.filename,
                content_type: candidate.content_type,
                file_size: candidate.file_size,
                file_hash: candidate.content_hash,
                raw_bucket,
                raw_object_key,
                status: forge_core::asset::AssetStatus::Pending,
                current_version_number: 1,
                extraction_tier: forge_core::asset::ExtractionTier::None,
                enhancement_eligible: false,
                enhancement_queued_at: None,
                created_at: now,
                updated_at: now,
                created_by: None,
            };
            Self::insert_asset(connection, &asset)?;
            Self::insert_asset_version(connection, &asset, 1, true, now)?;
            Ok(asset)
        })
        .await
    }

    async fn overwrite_from_candidate(
        &self,
        organization_id: OrganizationId,
        asset_id: AssetId,
        candidate: &CandidateFile,
        raw_bucket: &str,
        raw_object_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Asset, StoreError> {
        let candidate = candidate.clone();
        let raw_bucket = raw_bucket.to_string();
        let raw_object_key = raw_object_key.to_string();
        self.with_connection(move |connection| {
            let mut asset = Self::load_asset_scoped(connection, organization_id, asset_id)?;
            asset.original_filename = candidate.filename;
            asset.content_type = candidate.content_type;
            asset.file_size = candidate.file_size;
            asset.file_hash = candidate.content_hash;
            asset.raw_bucket = raw_bucket;
            asset.raw_object_key = raw_object_key;
            asset.status = forge_core::asset::AssetStatus::Pending;
            asset.current_version_number += 1;
            asset.extraction_tier = forge_core::asset::ExtractionTier::None;
            asset.updated_at = now;

            connection
                .execute("UPDATE asset_versions SET is_current = 0 WHERE asset_id = ?1", params![asset_id.to_string()])
                .map_err(|error| SqliteStoreError::from_write(error, "asset version"))?;
            Self::insert_asset_version(connection, &asset, asset.current_version_number, true, now)?;
            Self::update_asset(connection, &asset)?;
            Ok(asset)
        })
        .await
    }
}

#[async_trait]
impl RunStatsStore for SqliteStore {
    async fn stats(&self, organization_id: OrganizationId, now: DateTime<Utc>) -> Result<RunStats, StoreError> {
        self.with_connection(move |connection| {
            let since = (now - Duration::hours(24)).to_rfc3339();
            let mut stats = RunStats::default();

            let mut by_status = connection.prepare(
                "SELECT status, COUNT(*) FROM runs WHERE organization_id = ?1 AND created_at >= ?2 GROUP BY status",
            )?;
            let rows = by_status.query_map(params![organization_id.to_string(), since], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((status, count))
            })?;
            for row in rows {
                let (status, count) = row?;
                stats.by_status.insert(status, u64::try_from(count).unwrap_or_default());
            }

            let mut by_type = connection.prepare(
                "SELECT run_type, COUNT(*) FROM runs WHERE organization_id = ?1 AND created_at >= ?2 GROUP BY run_type",
            )?;
            let rows = by_type.query_map(params![organization_id.to_string(), since], |row| {
                let run_type: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((run_type, count))
            })?;
            for row in rows {
                let (run_type, count) = row?;
                stats.by_type.insert(run_type, u64::try_from(count).unwrap_or_default());
            }

            stats.last_24h_total = stats.by_status.values().sum();

            let mut queue_depths = connection.prepare(
                "SELECT run_type, COUNT(*) FROM runs
                 WHERE organization_id = ?1 AND status IN ('pending', 'submitted')
                 GROUP BY run_type",
            )?;
            let rows = queue_depths.query_map(params![organization_id.to_string()], |row| {
                let run_type: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((run_type, count))
            })?;
            for row in rows {
                let (run_type, count) = row?;
                stats.queue_depths.insert(run_type, u64::try_from(count).unwrap_or_default());
            }

            Ok(stats)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use forge_core::asset::AssetStatus;
    use forge_core::hashing::ContentHash;
    use forge_core::ids::OrganizationId;
    use forge_ingest::CandidateFile;
    use forge_server::ports::tier_label;

    use super::*;
    use crate::store::SqliteStoreConfig;

    fn memory_store() -> SqliteStore {
        SqliteStore::open(&SqliteStoreConfig::InMemory).expect("open in-memory store")
    }

    fn candidate(name: &str) -> CandidateFile {
        CandidateFile { filename: name.to_string(), content_hash: ContentHash::of(name.as_bytes()), file_size: 42, content_type: "text/plain".to_string() }
    }

    #[tokio::test]
    async fn create_and_list_round_trip() {
        let store = memory_store();
        let organization_id = OrganizationId::new();
        let asset = store.create_from_candidate(organization_id, &candidate("a.txt"), "raw", "bulk-upload/a.txt", Utc::now()).await.expect("create");
        assert_eq!(asset.status, AssetStatus::Pending);

        let listed = store.list(organization_id, AssetFilter::default(), 10, 0).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, asset.id);
    }

    #[tokio::test]
    async fn overwrite_bumps_version_and_keeps_single_current() {
        let store = memory_store();
        let organization_id = OrganizationId::new();
        let asset = store.create_from_candidate(organization_id, &candidate("a.txt"), "raw", "bulk-upload/a.txt", Utc::now()).await.expect("create");

        let updated = store
            .overwrite_from_candidate(organization_id, asset.id, &candidate("a.txt"), "raw", "bulk-upload/a.txt", Utc::now())
            .await
            .expect("overwrite");
        assert_eq!(updated.current_version_number, 2);

        let versions = store.list_versions(organization_id, asset.id).await.expect("list versions");
        assert_eq!(versions.len(), 2);
        assert_eq!(versions.iter().filter(|v| v.is_current).count(), 1);
    }

    #[tokio::test]
    async fn health_aggregates_by_status_and_tier() {
        let store = memory_store();
        let organization_id = OrganizationId::new();
        store.create_from_candidate(organization_id, &candidate("a.txt"), "raw", "bulk-upload/a.txt", Utc::now()).await.expect("create");

        let summary = store.health(organization_id).await.expect("health");
        assert_eq!(summary.by_status.get("pending"), Some(&1));
        assert_eq!(summary.by_tier.get(tier_label(forge_core::asset::ExtractionTier::None)), Some(&1));
    }

    #[tokio::test]
    async fn inventory_excludes_deleted_assets() {
        let store = memory_store();
        let organization_id = OrganizationId::new();
        store.create_from_candidate(organization_id, &candidate("a.txt"), "raw", "bulk-upload/a.txt", Utc::now()).await.expect("create");

        let inventory = store.inventory(organization_id).await.expect("inventory");
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].filename, "a.txt");
    }
}
