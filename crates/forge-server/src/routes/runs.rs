// forge-server/src/routes/runs.rs
// ============================================================================
// Module: Run Routes
// Description: `GET /runs`, `GET /runs/stats` (§6.1).
// Dependencies: axum, forge-core
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Query;
use axum::extract::State;
use chrono::Utc;
use forge_core::interfaces::RunFilter;
use forge_core::run::Run;
use forge_core::run::RunOrigin;
use forge_core::run::RunStatus;
use forge_core::run::RunType;
use serde::Deserialize;

use crate::error::ApiError;
use crate::ports::RunStats;
use crate::state::AppState;
use crate::tenant::TenantContext;

/// Query parameters accepted by `GET /runs`.
#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    /// Restrict to a single run type.
    run_type: Option<RunType>,
    /// Restrict to a single status.
    status: Option<RunStatus>,
    /// Restrict to a single origin.
    origin: Option<RunOrigin>,
    /// Page size.
    #[serde(default = "default_limit")]
    limit: u32,
    /// Page offset.
    #[serde(default)]
    offset: u32,
}

/// Default `GET /runs` page size.
fn default_limit() -> u32 {
    50
}

/// `GET /runs`: lists Runs for the requesting tenant, filtered and
/// paginated.
///
/// # Errors
///
/// Returns [`ApiError`] on a persistence failure.
pub async fn list(State(state): State<Arc<AppState>>, tenant: TenantContext, Query(query): Query<ListRunsQuery>) -> Result<Json<Vec<Run>>, ApiError> {
    let filter = RunFilter { run_type: query.run_type, status: query.status, origin: query.origin };
    let runs = state.runs.list(tenant.organization_id, filter, query.limit, query.offset).await?;
    Ok(Json(runs))
}

/// `GET /runs/stats`: aggregated counts by status/type over the last 24h
/// plus current queue depths (§E run stats aggregation).
///
/// # Errors
///
/// Returns [`ApiError`] on a persistence failure.
pub async fn stats(State(state): State<Arc<AppState>>, tenant: TenantContext) -> Result<Json<RunStats>, ApiError> {
    let stats = state.run_stats.stats(tenant.organization_id, Utc::now()).await?;
    Ok(Json(stats))
}
