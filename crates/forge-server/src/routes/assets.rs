// forge-server/src/routes/assets.rs
// ============================================================================
// Module: Asset Routes
// Description: `GET /assets`, `/assets/{id}`, `/assets/{id}/extraction`,
//              `/assets/{id}/runs`, `/assets/{id}/versions[/{n}]`,
//              `POST /assets/{id}/reextract`, `GET /assets/health` (§6.1).
// Dependencies: axum, forge-core, forge-queue
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use forge_core::asset::Asset;
use forge_core::asset::AssetVersion;
use forge_core::extraction::ExtractionResult;
use forge_core::ids::AssetId;
use forge_core::run::Run;
use forge_core::run::RunOrigin;

use crate::error::ApiError;
use crate::ports::AssetFilter;
use crate::ports::AssetHealthSummary;
use crate::state::AppState;
use crate::tenant::TenantContext;

/// Query parameters accepted by `GET /assets`. `AssetFilter` is not
/// flattened in here — `serde_urlencoded`, which axum's `Query` extractor
/// uses, does not reliably support `#[serde(flatten)]` over a
/// non-self-describing format — so the one filter field is named directly
/// and assembled into an `AssetFilter` in the handler.
#[derive(Debug, serde::Deserialize)]
pub struct ListAssetsQuery {
    /// Restrict to a single lifecycle status.
    status: Option<forge_core::asset::AssetStatus>,
    /// Page size.
    #[serde(default = "default_limit")]
    limit: u32,
    /// Page offset.
    #[serde(default)]
    offset: u32,
}

/// Default `GET /assets` page size.
fn default_limit() -> u32 {
    50
}

/// `GET /assets`.
///
/// # Errors
///
/// Returns [`ApiError`] on a persistence failure.
pub async fn list(State(state): State<Arc<AppState>>, tenant: TenantContext, Query(query): Query<ListAssetsQuery>) -> Result<Json<Vec<Asset>>, ApiError> {
    let filter = AssetFilter { status: query.status };
    let assets = state.asset_queries.list(tenant.organization_id, filter, query.limit, query.offset).await?;
    Ok(Json(assets))
}

/// `GET /assets/{id}`.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] when the asset does not exist for this
/// tenant.
pub async fn get(State(state): State<Arc<AppState>>, tenant: TenantContext, Path(asset_id): Path<AssetId>) -> Result<Json<Asset>, ApiError> {
    let asset = state.assets.get(tenant.organization_id, asset_id).await?;
    Ok(Json(asset))
}

/// `GET /assets/{id}/extraction`: the most recent extraction result for
/// this asset.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] when no extraction has ever been recorded
/// for this asset.
pub async fn extraction(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Path(asset_id): Path<AssetId>,
) -> Result<Json<ExtractionResult>, ApiError> {
    let result = state.asset_queries.latest_extraction_result(tenant.organization_id, asset_id).await?;
    Ok(Json(result))
}

/// `GET /assets/{id}/runs`: every Run touching this asset. `forge-core`'s
/// `RunStore::list` filters by type/status/origin but not by asset, so this
/// reads the tenant's recent Runs and filters client-side; a dedicated
/// index is a reasonable follow-up if this page ever needs to scale past a
/// single listing call.
///
/// # Errors
///
/// Returns [`ApiError`] on a persistence failure.
pub async fn runs_for_asset(State(state): State<Arc<AppState>>, tenant: TenantContext, Path(asset_id): Path<AssetId>) -> Result<Json<Vec<Run>>, ApiError> {
    let all = state.runs.list(tenant.organization_id, forge_core::interfaces::RunFilter::default(), 10_000, 0).await?;
    let matching: Vec<Run> = all.into_iter().filter(|run| run.input_asset_ids.contains(&asset_id)).collect();
    Ok(Json(matching))
}

/// `GET /assets/{id}/versions`.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] when the asset does not exist.
pub async fn versions(State(state): State<Arc<AppState>>, tenant: TenantContext, Path(asset_id): Path<AssetId>) -> Result<Json<Vec<AssetVersion>>, ApiError> {
    let versions = state.asset_queries.list_versions(tenant.organization_id, asset_id).await?;
    Ok(Json(versions))
}

/// `GET /assets/{id}/versions/{n}`.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] when the asset or that version does not
/// exist.
pub async fn version(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Path((asset_id, version_number)): Path<(AssetId, u32)>,
) -> Result<Json<AssetVersion>, ApiError> {
    let version = state.asset_queries.get_version(tenant.organization_id, asset_id, version_number).await?;
    Ok(Json(version))
}

/// `POST /assets/{id}/reextract`: queues a user-origin, priority
/// extraction, cancelling any pending duplicate (§4.3 priority path).
/// Returns the newly created Run with `202 Accepted`.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] when the asset does not exist, or
/// [`ApiError`] on a queue failure.
pub async fn reextract(State(state): State<Arc<AppState>>, tenant: TenantContext, Path(asset_id): Path<AssetId>) -> Result<(StatusCode, Json<Run>), ApiError> {
    let asset = state.assets.get(tenant.organization_id, asset_id).await?;
    let outcome = state
        .extraction_queue
        .queue_extraction(tenant.organization_id, &asset, RunOrigin::User, 1, None, None, Utc::now())
        .await?;
    let run = match outcome {
        forge_queue::QueueOutcome::Queued { run, .. } | forge_queue::QueueOutcome::AlreadyPending { run, .. } => run,
        forge_queue::QueueOutcome::SkippedContentType => {
            return Err(ApiError::InvalidInput(format!("asset {asset_id} has an inline-extracted content type and cannot be reextracted")));
        }
    };
    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// `GET /assets/health`: per-tenant collection metrics (§E asset
/// health/collection metrics).
///
/// # Errors
///
/// Returns [`ApiError`] on a persistence failure.
pub async fn health(State(state): State<Arc<AppState>>, tenant: TenantContext) -> Result<Json<AssetHealthSummary>, ApiError> {
    let summary = state.asset_queries.health(tenant.organization_id).await?;
    Ok(Json(summary))
}
