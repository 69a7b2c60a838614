// forge-server/src/ports.rs
// ============================================================================
// Module: Server Ports
// Description: Read/administrative persistence traits the HTTP surface
//              needs beyond what forge-core, forge-queue, and
//              forge-scheduler already define.
// Purpose: Asset listing, version history, aggregated stats, and bulk-upload
//          application are primarily read paths specific to this crate's
//          REST surface, so their store interfaces live here rather than
//          growing forge-core's shared interface module (§6.1, §6.2).
// Dependencies: async-trait, forge-core, forge-ingest
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use forge_core::asset::Asset;
use forge_core::asset::AssetStatus;
use forge_core::asset::AssetVersion;
use forge_core::asset::ExtractionTier;
use forge_core::extraction::ExtractionResult;
use forge_core::ids::AssetId;
use forge_core::ids::OrganizationId;
use forge_core::interfaces::StoreError;
use forge_ingest::CandidateFile;
use forge_ingest::ExistingAsset;

/// Filters accepted by [`AssetQueryStore::list`] (§6.1 `GET /assets`).
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct AssetFilter {
    /// Restrict to a single lifecycle status.
    pub status: Option<AssetStatus>,
}

/// Per-tenant asset collection metrics (§6.1 `GET /assets/health`).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AssetHealthSummary {
    /// Asset count per lifecycle status.
    pub by_status: BTreeMap<String, u64>,
    /// Asset count per extraction tier.
    pub by_tier: BTreeMap<String, u64>,
    /// Sum of `file_size` across every non-deleted asset's current
    /// version, in bytes.
    pub total_storage_bytes: u64,
}

/// Asset read/listing persistence the HTTP surface needs beyond
/// [`forge_queue::AssetStore`]'s single-row `get`/`save` (§6.1 asset
/// queries).
#[async_trait]
pub trait AssetQueryStore: Send + Sync {
    /// Lists assets for a tenant, paginated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn list(&self, organization_id: OrganizationId, filter: AssetFilter, limit: u32, offset: u32) -> Result<Vec<Asset>, StoreError>;

    /// Lists every version of one asset, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the asset does not exist.
    async fn list_versions(&self, organization_id: OrganizationId, asset_id: AssetId) -> Result<Vec<AssetVersion>, StoreError>;

    /// Fetches one specific version by number.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the asset or version does not
    /// exist.
    async fn get_version(&self, organization_id: OrganizationId, asset_id: AssetId, version_number: u32) -> Result<AssetVersion, StoreError>;

    /// Computes the tenant's asset collection health metrics.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn health(&self, organization_id: OrganizationId) -> Result<AssetHealthSummary, StoreError>;

    /// Fetches the most recently created extraction result for one asset,
    /// regardless of whether it is still active (§6.1 `GET
    /// /assets/{id}/extraction`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no extraction has ever been
    /// recorded for this asset.
    async fn latest_extraction_result(&self, organization_id: OrganizationId, asset_id: AssetId) -> Result<ExtractionResult, StoreError>;

    /// Lists the tenant's current, non-deleted assets as a bulk-upload
    /// comparison inventory (§E bulk-upload classification).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn inventory(&self, organization_id: OrganizationId) -> Result<Vec<ExistingAsset>, StoreError>;

    /// Creates a brand-new asset and its first version from an applied
    /// bulk-upload candidate whose bytes are already in the object store
    /// at `(raw_bucket, raw_object_key)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn create_from_candidate(
        &self,
        organization_id: OrganizationId,
        candidate: &CandidateFile,
        raw_bucket: &str,
        raw_object_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Asset, StoreError>;

    /// Overwrites an existing asset's current version in place from an
    /// applied bulk-upload candidate (bulk upload does not version content
    /// the way the crawler does — see `forge-ingest::ports` doc comment on
    /// [`forge_ingest::AssetVersionStore`]).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the asset does not exist.
    async fn overwrite_from_candidate(
        &self,
        organization_id: OrganizationId,
        asset_id: AssetId,
        candidate: &CandidateFile,
        raw_bucket: &str,
        raw_object_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Asset, StoreError>;
}

/// Aggregated Run counts over the trailing 24h, plus current queue depths
/// (§E run stats aggregation).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunStats {
    /// Run count per status, last 24h.
    pub by_status: BTreeMap<String, u64>,
    /// Run count per run type, last 24h.
    pub by_type: BTreeMap<String, u64>,
    /// Total Runs created in the last 24h.
    pub last_24h_total: u64,
    /// Current `pending` + `submitted` count per queue type.
    pub queue_depths: BTreeMap<String, u64>,
}

/// Run aggregation the HTTP surface needs beyond [`forge_core::interfaces::RunStore`]'s
/// row-level `list` (§6.1 `GET /runs/stats`).
#[async_trait]
pub trait RunStatsStore: Send + Sync {
    /// Computes [`RunStats`] as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn stats(&self, organization_id: OrganizationId, now: DateTime<Utc>) -> Result<RunStats, StoreError>;
}

/// Returns the extraction tier label used by [`AssetHealthSummary::by_tier`]
/// keys, kept as one function so every caller aggregates under the same
/// string.
#[must_use]
pub fn tier_label(tier: ExtractionTier) -> &'static str {
    match tier {
        ExtractionTier::None => "none",
        ExtractionTier::Basic => "basic",
        ExtractionTier::Enhanced => "enhanced",
    }
}
