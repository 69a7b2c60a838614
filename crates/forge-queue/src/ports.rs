// forge-queue/src/ports.rs
// ============================================================================
// Module: Queue Ports
// Description: Persistence traits this crate needs beyond the Run/RunGroup
//              interfaces forge-core already defines.
// Purpose: Asset and ExtractionResult are primarily owned and mutated here
//          and in forge-ingest, not by every crate, so their store
//          interfaces live next to their one real caller rather than
//          growing forge-core's shared interface module.
// Dependencies: async-trait, forge-core
// ============================================================================

use async_trait::async_trait;
use forge_core::asset::Asset;
use forge_core::extraction::ExtractionResult;
use forge_core::ids::AssetId;
use forge_core::ids::ExtractionResultId;
use forge_core::ids::OrganizationId;
use forge_core::ids::RunId;
use forge_core::interfaces::StoreError;

/// Asset persistence, the slice C3/C4 need.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Fetches an asset by id, scoped to `organization_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    async fn get(&self, organization_id: OrganizationId, id: AssetId) -> Result<Asset, StoreError>;

    /// Persists a full asset record (optimistic overwrite).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn save(&self, asset: Asset) -> Result<Asset, StoreError>;
}

/// Extraction result persistence, the slice C3/C4 need.
#[async_trait]
pub trait ExtractionResultStore: Send + Sync {
    /// Creates a new extraction result row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn create(&self, result: ExtractionResult) -> Result<ExtractionResult, StoreError>;

    /// Persists an updated extraction result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn save(&self, result: ExtractionResult) -> Result<ExtractionResult, StoreError>;

    /// Fetches the extraction result tied to one run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    async fn get_by_run(&self, run_id: RunId) -> Result<ExtractionResult, StoreError>;

    /// Finds a still-active (`pending`/`running`) extraction result for an
    /// asset, if one exists, for the §4.3 duplicate-suppression check.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn find_active_for_asset(
        &self,
        organization_id: OrganizationId,
        asset_id: AssetId,
    ) -> Result<Option<(RunId, ExtractionResultId)>, StoreError>;
}
