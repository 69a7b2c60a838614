// forge-ingest/src/ports.rs
// ============================================================================
// Module: Ingest Ports
// Description: Persistence traits the crawl, SharePoint sync, and SAM pull
//              orchestrators need beyond what forge-core and forge-queue
//              already define.
// Purpose: Scrape/SharePoint/SAM configuration and bookkeeping are primarily
//          owned and mutated here, not by every crate, so their store
//          interfaces live next to their one real caller.
// Dependencies: async-trait, forge-core, forge-providers
// ============================================================================

use async_trait::async_trait;
use forge_core::asset::AssetVersion;
use forge_core::hashing::ContentHash;
use forge_core::ids::AssetId;
use forge_core::ids::OrganizationId;
use forge_core::ids::ScrapeCollectionId;
use forge_core::ids::SharePointSyncConfigId;
use forge_core::interfaces::StoreError;
use forge_core::sam::Notice;
use forge_core::sam::Solicitation;
use forge_core::scrape::ScrapeCollection;
use forge_core::scrape::ScrapeSource;
use forge_core::scrape::ScrapedAsset;
use forge_core::sharepoint::SharePointSyncConfig;
use forge_core::sharepoint::SharePointSyncedDocument;
use forge_providers::ApiCallBudget;

/// Crawl collection/source/page persistence, the slice C8 needs.
#[async_trait]
pub trait ScrapeStore: Send + Sync {
    /// Fetches a collection by id, scoped to `organization_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    async fn get_collection(&self, organization_id: OrganizationId, id: ScrapeCollectionId) -> Result<ScrapeCollection, StoreError>;

    /// Lists the collection's active seed sources.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn list_active_sources(&self, collection_id: ScrapeCollectionId) -> Result<Vec<ScrapeSource>, StoreError>;

    /// Finds the prior crawl record at `(collection_id, normalized_url)`,
    /// the §4.8 dedup key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn find_scraped_asset(
        &self,
        collection_id: ScrapeCollectionId,
        normalized_url: &str,
    ) -> Result<Option<ScrapedAsset>, StoreError>;

    /// Creates or overwrites a crawl record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn save_scraped_asset(&self, asset: ScrapedAsset) -> Result<ScrapedAsset, StoreError>;
}

/// Creates [`AssetVersion`] rows. Versioning is driven only by the crawl's
/// re-fetch-and-diff loop (§4.8); uploads and SharePoint syncs overwrite an
/// asset's current raw object in place rather than creating new versions.
#[async_trait]
pub trait AssetVersionStore: Send + Sync {
    /// Persists a new, already-current version, clearing the asset's
    /// previous current version along the way so at most one version of
    /// an asset is ever current.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn create(&self, version: AssetVersion) -> Result<AssetVersion, StoreError>;
}

/// Tenant-wide content-hash lookup, used to deduplicate downloaded
/// documents (§4.8: "Deduplicate by content hash within the tenant").
#[async_trait]
pub trait AssetDedupeIndex: Send + Sync {
    /// Finds any existing asset in this tenant with `hash` as its current
    /// content hash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn find_by_hash(&self, organization_id: OrganizationId, hash: &ContentHash) -> Result<Option<AssetId>, StoreError>;
}

/// SharePoint sync configuration and per-item sync-state persistence, the
/// slice C9 needs.
#[async_trait]
pub trait SharePointStore: Send + Sync {
    /// Fetches a sync config by id, scoped to `organization_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    async fn get_config(&self, organization_id: OrganizationId, id: SharePointSyncConfigId) -> Result<SharePointSyncConfig, StoreError>;

    /// Persists an updated sync config, e.g. its `stats` progress JSON
    /// (§4.9 step 4).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn save_config(&self, config: SharePointSyncConfig) -> Result<SharePointSyncConfig, StoreError>;

    /// Finds the prior sync record for one remote item, keyed by
    /// `sharepoint_item_id` (§4.9 step 2).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn find_synced_document(
        &self,
        sync_config_id: SharePointSyncConfigId,
        sharepoint_item_id: &str,
    ) -> Result<Option<SharePointSyncedDocument>, StoreError>;

    /// Creates or overwrites a synced-document record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn save_synced_document(&self, document: SharePointSyncedDocument) -> Result<SharePointSyncedDocument, StoreError>;

    /// Lists every synced document for a config, for the §4.9 step 3
    /// deleted-in-source sweep.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn list_synced_documents(&self, sync_config_id: SharePointSyncConfigId) -> Result<Vec<SharePointSyncedDocument>, StoreError>;
}

/// Solicitation/Notice persistence, the slice C10 needs.
#[async_trait]
pub trait SamStore: Send + Sync {
    /// Finds a tenant's prior solicitation by the feed's own notice id, the
    /// §4.10 dedup key across pulls.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn find_solicitation_by_notice_id(&self, organization_id: OrganizationId, notice_id: &str) -> Result<Option<Solicitation>, StoreError>;

    /// Creates or overwrites a solicitation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn save_solicitation(&self, solicitation: Solicitation) -> Result<Solicitation, StoreError>;

    /// Records an amendment/status-change notice.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn create_notice(&self, notice: Notice) -> Result<Notice, StoreError>;
}

/// Per-tenant SAM.gov API call budget persistence (§4.10: "asks a usage
/// tracker 'may I make one more call?'"). [`ApiCallBudget`]'s own
/// consume/refresh logic lives in forge-providers; this port only loads and
/// saves the tracked state across pulls.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    /// Loads the current budget for a tenant, if one has been recorded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn load(&self, organization_id: OrganizationId) -> Result<Option<ApiCallBudget>, StoreError>;

    /// Persists the budget state after a pull consumes from it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn save(&self, organization_id: OrganizationId, budget: ApiCallBudget) -> Result<(), StoreError>;
}
