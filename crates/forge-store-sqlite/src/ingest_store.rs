// forge-store-sqlite/src/ingest_store.rs
// ============================================================================
// Module: Ingest Store
// Description: `forge_ingest::ports::{ScrapeStore, AssetVersionStore,
//              AssetDedupeIndex, SharePointStore, SamStore, BudgetStore}`
//              implementations backed by the same connection as
//              `SqliteStore`'s other tables (§4.8, §4.9, §4.10).
// Dependencies: rusqlite, tokio, async-trait, forge-core, forge-ingest,
//               forge-providers
// ============================================================================

//! ## Overview
//! Grouped here for the same reason `queries.rs` exists alongside
//! `store.rs`: the crawl, SharePoint sync, and SAM pull orchestrators each
//! need a slice of persistence forge-core's own traits don't cover, and
//! implementing it on `SqliteStore` keeps one connection and one
//! blocking-thread boundary for every table this store owns.

use async_trait::async_trait;
use forge_core::asset::AssetVersion;
use forge_core::hashing::ContentHash;
use forge_core::ids::AssetId;
use forge_core::ids::OrganizationId;
use forge_core::ids::ScrapeCollectionId;
use forge_core::ids::ScrapeSourceId;
use forge_core::ids::ScrapedAssetId;
use forge_core::ids::SharePointSyncConfigId;
use forge_core::ids::NoticeId;
use forge_core::ids::SolicitationId;
use forge_core::interfaces::StoreError;
use forge_core::sam::Notice;
use forge_core::sam::Solicitation;
use forge_core::scrape::CrawlConfig;
use forge_core::scrape::ScrapeCollection;
use forge_core::scrape::ScrapeMetadata;
use forge_core::scrape::ScrapeSource;
use forge_core::scrape::ScrapedAsset;
use forge_core::scrape::ScrapedAssetKind;
use forge_core::sharepoint::SharePointSyncConfig;
use forge_core::sharepoint::SharePointSyncedDocument;
use forge_core::sharepoint::SyncStatus;
use forge_ingest::ports::AssetDedupeIndex;
use forge_ingest::ports::AssetVersionStore;
use forge_ingest::ports::BudgetStore;
use forge_ingest::ports::SamStore;
use forge_ingest::ports::ScrapeStore;
use forge_ingest::ports::SharePointStore;
use forge_providers::ApiCallBudget;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::error::SqliteStoreError;
use crate::store::SqliteStore;
use crate::store::content_hash_from_stored;
use crate::store::parse_id;
use crate::store::parse_timestamp;

// ============================================================================
// SECTION: ScrapeStore
// ============================================================================

fn scrape_collection_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScrapeCollection> {
    let build = || -> Result<ScrapeCollection, SqliteStoreError> {
        let config: String = row.get(3)?;
        Ok(ScrapeCollection {
            id: parse_id(&row.get::<_, String>(0)?, "scrape collection id")?,
            organization_id: parse_id(&row.get::<_, String>(1)?, "organization id")?,
            slug: row.get(2)?,
            config: serde_json::from_str::<CrawlConfig>(&config).map_err(|error| SqliteStoreError::Corrupt(error.to_string()))?,
            created_at: parse_timestamp(&row.get::<_, String>(4)?)?,
        })
    };
    build().map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error)))
}

fn scrape_source_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScrapeSource> {
    let build = || -> Result<ScrapeSource, SqliteStoreError> {
        Ok(ScrapeSource {
            id: parse_id(&row.get::<_, String>(0)?, "scrape source id")?,
            collection_id: parse_id(&row.get::<_, String>(1)?, "scrape collection id")?,
            url: row.get(2)?,
            is_active: row.get(3)?,
        })
    };
    build().map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error)))
}

fn scraped_asset_kind_str(kind: ScrapedAssetKind) -> &'static str {
    match kind {
        ScrapedAssetKind::Page => "page",
        ScrapedAssetKind::Document => "document",
    }
}

fn parse_scraped_asset_kind(value: &str) -> Result<ScrapedAssetKind, SqliteStoreError> {
    match value {
        "page" => Ok(ScrapedAssetKind::Page),
        "document" => Ok(ScrapedAssetKind::Document),
        other => Err(SqliteStoreError::Corrupt(format!("unknown scraped asset kind: {other}"))),
    }
}

fn scraped_asset_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScrapedAsset> {
    let build = || -> Result<ScrapedAsset, SqliteStoreError> {
        let kind: String = row.get(5)?;
        let content_hash: String = row.get(6)?;
        Ok(ScrapedAsset {
            id: parse_id(&row.get::<_, String>(0)?, "scraped asset id")?,
            collection_id: parse_id(&row.get::<_, String>(1)?, "scrape collection id")?,
            asset_id: parse_id(&row.get::<_, String>(2)?, "asset id")?,
            source_id: row
                .get::<_, Option<String>>(3)?
                .map(|raw| parse_id::<ScrapeSourceId>(&raw, "scrape source id"))
                .transpose()?,
            normalized_url: row.get(4)?,
            kind: parse_scraped_asset_kind(&kind)?,
            scrape_metadata: ScrapeMetadata {
                content_hash: content_hash_from_stored(content_hash)?,
                version_count: row.get(7)?,
            },
            depth: row.get(8)?,
            last_crawled_at: parse_timestamp(&row.get::<_, String>(9)?)?,
        })
    };
    build().map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error)))
}

#[async_trait]
impl ScrapeStore for SqliteStore {
    async fn get_collection(&self, organization_id: OrganizationId, id: ScrapeCollectionId) -> Result<ScrapeCollection, StoreError> {
        self.with_connection(move |connection| {
            connection
                .query_row(
                    "SELECT id, organization_id, slug, config, created_at FROM scrape_collections WHERE id = ?1 AND organization_id = ?2",
                    params![id.to_string(), organization_id.to_string()],
                    scrape_collection_from_row,
                )
                .optional()?
                .ok_or_else(|| SqliteStoreError::NotFound(format!("scrape collection {id}")))
        })
        .await
    }

    async fn list_active_sources(&self, collection_id: ScrapeCollectionId) -> Result<Vec<ScrapeSource>, StoreError> {
        self.with_connection(move |connection| {
            let mut statement = connection
                .prepare("SELECT id, collection_id, url, is_active FROM scrape_sources WHERE collection_id = ?1 AND is_active = 1")?;
            let rows = statement.query_map(params![collection_id.to_string()], scrape_source_from_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(SqliteStoreError::from)
        })
        .await
    }

    async fn find_scraped_asset(&self, collection_id: ScrapeCollectionId, normalized_url: &str) -> Result<Option<ScrapedAsset>, StoreError> {
        let normalized_url = normalized_url.to_string();
        self.with_connection(move |connection| {
            connection
                .query_row(
                    "SELECT id, collection_id, asset_id, source_id, normalized_url, kind, content_hash, version_count, depth, last_crawled_at
                     FROM scraped_assets WHERE collection_id = ?1 AND normalized_url = ?2",
                    params![collection_id.to_string(), normalized_url],
                    scraped_asset_from_row,
                )
                .optional()
                .map_err(SqliteStoreError::from)
        })
        .await
    }

    async fn save_scraped_asset(&self, asset: ScrapedAsset) -> Result<ScrapedAsset, StoreError> {
        self.with_connection(move |connection| {
            connection
                .execute(
                    "INSERT INTO scraped_assets (
                        id, collection_id, asset_id, source_id, normalized_url, kind, content_hash, version_count, depth, last_crawled_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    ON CONFLICT(collection_id, normalized_url) DO UPDATE SET
                        asset_id = excluded.asset_id,
                        source_id = excluded.source_id,
                        kind = excluded.kind,
                        content_hash = excluded.content_hash,
                        version_count = excluded.version_count,
                        depth = excluded.depth,
                        last_crawled_at = excluded.last_crawled_at",
                    params![
                        asset.id.to_string(),
                        asset.collection_id.to_string(),
                        asset.asset_id.to_string(),
                        asset.source_id.map(|id| id.to_string()),
                        asset.normalized_url,
                        scraped_asset_kind_str(asset.kind),
                        asset.scrape_metadata.content_hash.as_str(),
                        asset.scrape_metadata.version_count,
                        asset.depth,
                        asset.last_crawled_at.to_rfc3339(),
                    ],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "scraped asset"))?;
            Ok(asset)
        })
        .await
    }
}

// ============================================================================
// SECTION: AssetVersionStore / AssetDedupeIndex
// ============================================================================

#[async_trait]
impl AssetVersionStore for SqliteStore {
    async fn create(&self, version: AssetVersion) -> Result<AssetVersion, StoreError> {
        self.with_connection(move |connection| {
            connection
                .execute("UPDATE asset_versions SET is_current = 0 WHERE asset_id = ?1", params![version.asset_id.to_string()])
                .map_err(|error| SqliteStoreError::from_write(error, "asset version"))?;
            connection
                .execute(
                    "INSERT INTO asset_versions (
                        asset_id, version_number, raw_bucket, raw_object_key, file_size, file_hash,
                        content_type, is_current, created_at, created_by
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        version.asset_id.to_string(),
                        version.version_number,
                        version.raw_bucket,
                        version.raw_object_key,
                        i64::try_from(version.file_size).unwrap_or(i64::MAX),
                        version.file_hash.as_str(),
                        version.content_type,
                        version.is_current,
                        version.created_at.to_rfc3339(),
                        version.created_by.map(|id| id.to_string()),
                    ],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "asset version"))?;
            Ok(version)
        })
        .await
    }
}

#[async_trait]
impl AssetDedupeIndex for SqliteStore {
    async fn find_by_hash(&self, organization_id: OrganizationId, hash: &ContentHash) -> Result<Option<AssetId>, StoreError> {
        let hash = hash.as_str().to_string();
        self.with_connection(move |connection| {
            connection
                .query_row(
                    "SELECT id FROM assets WHERE organization_id = ?1 AND file_hash = ?2 AND status != 'deleted' LIMIT 1",
                    params![organization_id.to_string(), hash],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
                .map(|raw| parse_id::<AssetId>(&raw, "asset id"))
                .transpose()
                .map_err(SqliteStoreError::from)
        })
        .await
    }
}

// ============================================================================
// SECTION: SharePointStore
// ============================================================================

fn sharepoint_sync_config_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SharePointSyncConfig> {
    let build = || -> Result<SharePointSyncConfig, SqliteStoreError> {
        let include_patterns: String = row.get(8)?;
        let exclude_patterns: String = row.get(9)?;
        let stats: String = row.get(10)?;
        Ok(SharePointSyncConfig {
            id: parse_id(&row.get::<_, String>(0)?, "sharepoint sync config id")?,
            organization_id: parse_id(&row.get::<_, String>(1)?, "organization id")?,
            slug: row.get(2)?,
            site_id: row.get(3)?,
            drive_id: row.get(4)?,
            folder_path: row.get(5)?,
            recursive: row.get(6)?,
            max_file_size_bytes: row.get::<_, Option<i64>>(7)?.map(|value| value.try_into().unwrap_or(u64::MAX)),
            include_patterns: serde_json::from_str(&include_patterns).map_err(|error| SqliteStoreError::Corrupt(error.to_string()))?,
            exclude_patterns: serde_json::from_str(&exclude_patterns).map_err(|error| SqliteStoreError::Corrupt(error.to_string()))?,
            stats: serde_json::from_str(&stats).map_err(|error| SqliteStoreError::Corrupt(error.to_string()))?,
            is_active: row.get(11)?,
        })
    };
    build().map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error)))
}

fn sync_status_str(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Synced => "synced",
        SyncStatus::DeletedInSource => "deleted_in_source",
        SyncStatus::Orphaned => "orphaned",
    }
}

fn parse_sync_status(value: &str) -> Result<SyncStatus, SqliteStoreError> {
    match value {
        "synced" => Ok(SyncStatus::Synced),
        "deleted_in_source" => Ok(SyncStatus::DeletedInSource),
        "orphaned" => Ok(SyncStatus::Orphaned),
        other => Err(SqliteStoreError::Corrupt(format!("unknown sync status: {other}"))),
    }
}

fn synced_document_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SharePointSyncedDocument> {
    let build = || -> Result<SharePointSyncedDocument, SqliteStoreError> {
        let content_hash: String = row.get(4)?;
        let sync_status: String = row.get(5)?;
        Ok(SharePointSyncedDocument {
            sync_config_id: parse_id(&row.get::<_, String>(0)?, "sharepoint sync config id")?,
            sharepoint_item_id: row.get(1)?,
            asset_id: parse_id(&row.get::<_, String>(2)?, "asset id")?,
            sharepoint_etag: row.get(3)?,
            content_hash: content_hash_from_stored(content_hash)?,
            sync_status: parse_sync_status(&sync_status)?,
            deleted_detected_at: row.get::<_, Option<String>>(6)?.map(|raw| parse_timestamp(&raw)).transpose()?,
            last_synced_at: parse_timestamp(&row.get::<_, String>(7)?)?,
        })
    };
    build().map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error)))
}

#[async_trait]
impl SharePointStore for SqliteStore {
    async fn get_config(&self, organization_id: OrganizationId, id: SharePointSyncConfigId) -> Result<SharePointSyncConfig, StoreError> {
        self.with_connection(move |connection| {
            connection
                .query_row(
                    "SELECT id, organization_id, slug, site_id, drive_id, folder_path, recursive, max_file_size_bytes,
                            include_patterns, exclude_patterns, stats, is_active
                     FROM sharepoint_sync_configs WHERE id = ?1 AND organization_id = ?2",
                    params![id.to_string(), organization_id.to_string()],
                    sharepoint_sync_config_from_row,
                )
                .optional()?
                .ok_or_else(|| SqliteStoreError::NotFound(format!("sharepoint sync config {id}")))
        })
        .await
    }

    async fn save_config(&self, config: SharePointSyncConfig) -> Result<SharePointSyncConfig, StoreError> {
        self.with_connection(move |connection| {
            let include_patterns =
                serde_json::to_string(&config.include_patterns).map_err(|error| SqliteStoreError::Corrupt(error.to_string()))?;
            let exclude_patterns =
                serde_json::to_string(&config.exclude_patterns).map_err(|error| SqliteStoreError::Corrupt(error.to_string()))?;
            let stats = config.stats.to_string();
            connection
                .execute(
                    "INSERT INTO sharepoint_sync_configs (
                        id, organization_id, slug, site_id, drive_id, folder_path, recursive, max_file_size_bytes,
                        include_patterns, exclude_patterns, stats, is_active
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    ON CONFLICT(id) DO UPDATE SET
                        folder_path = excluded.folder_path,
                        recursive = excluded.recursive,
                        max_file_size_bytes = excluded.max_file_size_bytes,
                        include_patterns = excluded.include_patterns,
                        exclude_patterns = excluded.exclude_patterns,
                        stats = excluded.stats,
                        is_active = excluded.is_active",
                    params![
                        config.id.to_string(),
                        config.organization_id.to_string(),
                        config.slug,
                        config.site_id,
                        config.drive_id,
                        config.folder_path,
                        config.recursive,
                        config.max_file_size_bytes.map(|value| i64::try_from(value).unwrap_or(i64::MAX)),
                        include_patterns,
                        exclude_patterns,
                        stats,
                        config.is_active,
                    ],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "sharepoint sync config"))?;
            Ok(config)
        })
        .await
    }

    async fn find_synced_document(
        &self,
        sync_config_id: SharePointSyncConfigId,
        sharepoint_item_id: &str,
    ) -> Result<Option<SharePointSyncedDocument>, StoreError> {
        let sharepoint_item_id = sharepoint_item_id.to_string();
        self.with_connection(move |connection| {
            connection
                .query_row(
                    "SELECT sync_config_id, sharepoint_item_id, asset_id, sharepoint_etag, content_hash, sync_status,
                            deleted_detected_at, last_synced_at
                     FROM sharepoint_synced_documents WHERE sync_config_id = ?1 AND sharepoint_item_id = ?2",
                    params![sync_config_id.to_string(), sharepoint_item_id],
                    synced_document_from_row,
                )
                .optional()
                .map_err(SqliteStoreError::from)
        })
        .await
    }

    async fn save_synced_document(&self, document: SharePointSyncedDocument) -> Result<SharePointSyncedDocument, StoreError> {
        self.with_connection(move |connection| {
            connection
                .execute(
                    "INSERT INTO sharepoint_synced_documents (
                        sync_config_id, sharepoint_item_id, asset_id, sharepoint_etag, content_hash, sync_status,
                        deleted_detected_at, last_synced_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(sync_config_id, sharepoint_item_id) DO UPDATE SET
                        asset_id = excluded.asset_id,
                        sharepoint_etag = excluded.sharepoint_etag,
                        content_hash = excluded.content_hash,
                        sync_status = excluded.sync_status,
                        deleted_detected_at = excluded.deleted_detected_at,
                        last_synced_at = excluded.last_synced_at",
                    params![
                        document.sync_config_id.to_string(),
                        document.sharepoint_item_id,
                        document.asset_id.to_string(),
                        document.sharepoint_etag,
                        document.content_hash.as_str(),
                        sync_status_str(document.sync_status),
                        document.deleted_detected_at.map(|t| t.to_rfc3339()),
                        document.last_synced_at.to_rfc3339(),
                    ],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "sharepoint synced document"))?;
            Ok(document)
        })
        .await
    }

    async fn list_synced_documents(&self, sync_config_id: SharePointSyncConfigId) -> Result<Vec<SharePointSyncedDocument>, StoreError> {
        self.with_connection(move |connection| {
            let mut statement = connection.prepare(
                "SELECT sync_config_id, sharepoint_item_id, asset_id, sharepoint_etag, content_hash, sync_status,
                        deleted_detected_at, last_synced_at
                 FROM sharepoint_synced_documents WHERE sync_config_id = ?1",
            )?;
            let rows = statement.query_map(params![sync_config_id.to_string()], synced_document_from_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(SqliteStoreError::from)
        })
        .await
    }
}

// ============================================================================
// SECTION: SamStore / BudgetStore
// ============================================================================

fn solicitation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Solicitation> {
    let build = || -> Result<Solicitation, SqliteStoreError> {
        let raw: String = row.get(5)?;
        Ok(Solicitation {
            id: parse_id(&row.get::<_, String>(0)?, "solicitation id")?,
            organization_id: parse_id(&row.get::<_, String>(1)?, "organization id")?,
            notice_id: row.get(2)?,
            solicitation_number: row.get(3)?,
            title: row.get(4)?,
            raw: serde_json::from_str(&raw).map_err(|error| SqliteStoreError::Corrupt(error.to_string()))?,
            first_seen_at: parse_timestamp(&row.get::<_, String>(6)?)?,
            last_seen_at: parse_timestamp(&row.get::<_, String>(7)?)?,
        })
    };
    build().map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error)))
}

#[async_trait]
impl SamStore for SqliteStore {
    async fn find_solicitation_by_notice_id(&self, organization_id: OrganizationId, notice_id: &str) -> Result<Option<Solicitation>, StoreError> {
        let notice_id = notice_id.to_string();
        self.with_connection(move |connection| {
            connection
                .query_row(
                    "SELECT id, organization_id, notice_id, solicitation_number, title, raw, first_seen_at, last_seen_at
                     FROM sam_solicitations WHERE organization_id = ?1 AND notice_id = ?2",
                    params![organization_id.to_string(), notice_id],
                    solicitation_from_row,
                )
                .optional()
                .map_err(SqliteStoreError::from)
        })
        .await
    }

    async fn save_solicitation(&self, solicitation: Solicitation) -> Result<Solicitation, StoreError> {
        self.with_connection(move |connection| {
            connection
                .execute(
                    "INSERT INTO sam_solicitations (
                        id, organization_id, notice_id, solicitation_number, title, raw, first_seen_at, last_seen_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(organization_id, notice_id) DO UPDATE SET
                        solicitation_number = excluded.solicitation_number,
                        title = excluded.title,
                        raw = excluded.raw,
                        last_seen_at = excluded.last_seen_at",
                    params![
                        solicitation.id.to_string(),
                        solicitation.organization_id.to_string(),
                        solicitation.notice_id,
                        solicitation.solicitation_number,
                        solicitation.title,
                        solicitation.raw.to_string(),
                        solicitation.first_seen_at.to_rfc3339(),
                        solicitation.last_seen_at.to_rfc3339(),
                    ],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "sam solicitation"))?;
            Ok(solicitation)
        })
        .await
    }

    async fn create_notice(&self, notice: Notice) -> Result<Notice, StoreError> {
        self.with_connection(move |connection| {
            connection
                .execute(
                    "INSERT INTO sam_notices (id, solicitation_id, notice_type, posted_date, raw, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        notice.id.to_string(),
                        notice.solicitation_id.to_string(),
                        notice.notice_type,
                        notice.posted_date.to_rfc3339(),
                        notice.raw.to_string(),
                        notice.created_at.to_rfc3339(),
                    ],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "sam notice"))?;
            Ok(notice)
        })
        .await
    }
}

#[async_trait]
impl BudgetStore for SqliteStore {
    async fn load(&self, organization_id: OrganizationId) -> Result<Option<ApiCallBudget>, StoreError> {
        self.with_connection(move |connection| {
            connection
                .query_row(
                    "SELECT budget FROM sam_api_call_budgets WHERE organization_id = ?1",
                    params![organization_id.to_string()],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
                .map(|raw| serde_json::from_str::<ApiCallBudget>(&raw).map_err(|error| SqliteStoreError::Corrupt(error.to_string())))
                .transpose()
                .map_err(SqliteStoreError::from)
        })
        .await
    }

    async fn save(&self, organization_id: OrganizationId, budget: ApiCallBudget) -> Result<(), StoreError> {
        self.with_connection(move |connection| {
            let encoded = serde_json::to_string(&budget).map_err(|error| SqliteStoreError::Corrupt(error.to_string()))?;
            connection
                .execute(
                    "INSERT INTO sam_api_call_budgets (organization_id, budget) VALUES (?1, ?2)
                     ON CONFLICT(organization_id) DO UPDATE SET budget = excluded.budget",
                    params![organization_id.to_string(), encoded],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "sam api call budget"))?;
            Ok(())
        })
        .await
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use forge_core::ids::OrganizationId;
    use forge_core::ids::ScrapeCollectionId;

    use super::*;
    use crate::store::SqliteStoreConfig;

    fn store() -> SqliteStore {
        #[allow(clippy::unwrap_used, reason = "an in-memory database always opens")]
        SqliteStore::open(&SqliteStoreConfig::InMemory).unwrap()
    }

    #[tokio::test]
    async fn scrape_collection_round_trips() {
        let store = store();
        let organization_id = OrganizationId::new();
        let collection = ScrapeCollection {
            id: ScrapeCollectionId::new(),
            organization_id,
            slug: "docs".to_string(),
            config: CrawlConfig {
                max_pages: 100,
                max_depth: 3,
                include_patterns: vec![],
                exclude_patterns: vec![],
                follow_external_links: false,
                download_documents: true,
                document_extensions: vec!["pdf".to_string()],
                delay_seconds: 1.0,
            },
            created_at: Utc::now(),
        };
        store
            .with_connection({
                let collection = collection.clone();
                move |connection| {
                    connection
                        .execute(
                            "INSERT INTO scrape_collections (id, organization_id, slug, config, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                            params![
                                collection.id.to_string(),
                                collection.organization_id.to_string(),
                                collection.slug,
                                serde_json::to_string(&collection.config).unwrap_or_default(),
                                collection.created_at.to_rfc3339(),
                            ],
                        )
                        .map_err(|error| SqliteStoreError::from_write(error, "scrape collection"))?;
                    Ok(())
                }
            })
            .await
            .expect("insert collection");

        let fetched = store.get_collection(organization_id, collection.id).await.expect("fetch collection");
        assert_eq!(fetched.slug, "docs");
        assert_eq!(fetched.config.max_pages, 100);
    }

    #[tokio::test]
    async fn budget_round_trips_through_json_column() {
        let store = store();
        let organization_id = OrganizationId::new();
        assert!(store.load(organization_id).await.expect("load").is_none());

        let budget = ApiCallBudget::new(1_000, Utc::now());
        store.save(organization_id, budget).await.expect("save");
        let loaded = store.load(organization_id).await.expect("load").expect("present");
        assert_eq!(loaded.remaining(), 1_000);
    }

    #[tokio::test]
    async fn dedupe_index_finds_asset_by_hash() {
        use forge_core::asset::Asset;
        use forge_core::asset::AssetStatus;
        use forge_core::asset::ExtractionTier;
        use forge_core::asset::SourceType;
        use forge_core::ids::AssetId;
        use forge_queue::AssetStore as QueueAssetStore;

        let store = store();
        let organization_id = OrganizationId::new();
        let hash = ContentHash::of(b"same-bytes");
        let now = Utc::now();
        let asset = Asset {
            id: AssetId::new(),
            organization_id,
            source_type: SourceType::WebScrape,
            source_metadata: serde_json::json!({}),
            original_filename: "page.html".to_string(),
            content_type: "text/html".to_string(),
            file_size: 10,
            file_hash: hash.clone(),
            raw_bucket: "uploads".to_string(),
            raw_object_key: "k".to_string(),
            status: AssetStatus::Ready,
            current_version_number: 1,
            extraction_tier: ExtractionTier::Basic,
            enhancement_eligible: false,
            enhancement_queued_at: None,
            created_at: now,
            updated_at: now,
            created_by: None,
        };
        QueueAssetStore::save(&store, asset.clone()).await.expect("save asset");

        let found = store.find_by_hash(organization_id, &hash).await.expect("lookup");
        assert_eq!(found, Some(asset.id));
    }

    #[tokio::test]
    async fn creating_a_new_version_clears_the_previous_current_flag() {
        use forge_core::ids::AssetId;

        let store = store();
        let asset_id = AssetId::new();
        let now = Utc::now();
        let version = |number: u32| AssetVersion {
            asset_id,
            version_number: number,
            raw_bucket: "uploads".to_string(),
            raw_object_key: format!("k{number}"),
            file_size: 10,
            file_hash: ContentHash::of(format!("v{number}").as_bytes()),
            content_type: "text/html".to_string(),
            is_current: true,
            created_at: now,
            created_by: None,
        };

        AssetVersionStore::create(&store, version(1)).await.expect("create v1");
        AssetVersionStore::create(&store, version(2)).await.expect("create v2");

        let current_count: i64 = store
            .with_connection(move |connection| {
                connection
                    .query_row(
                        "SELECT COUNT(*) FROM asset_versions WHERE asset_id = ?1 AND is_current = 1",
                        params![asset_id.to_string()],
                        |row| row.get(0),
                    )
                    .map_err(SqliteStoreError::from)
            })
            .await
            .expect("count current versions");
        assert_eq!(current_count, 1);
    }
}
