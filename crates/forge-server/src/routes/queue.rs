// forge-server/src/routes/queue.rs
// ============================================================================
// Module: Queue Admin Routes
// Description: `POST /queue/submit-tick` (§6.1, §E queue admin surface).
// Dependencies: axum, forge-queue
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;
use crate::tenant::TenantContext;

/// Response body for `POST /queue/submit-tick`.
#[derive(Debug, Serialize)]
pub struct SubmitTickResult {
    /// Number of extractions submitted to the worker pool this tick.
    pub submitted: u32,
}

/// `POST /queue/submit-tick`: forces one submitter iteration out of band,
/// bypassing the periodic beat. An operator-only escape hatch for a stuck
/// or newly enabled queue (§E queue admin surface).
///
/// # Errors
///
/// Returns [`ApiError`] on a persistence or dispatch failure.
pub async fn submit_tick(State(state): State<Arc<AppState>>, tenant: TenantContext) -> Result<Json<SubmitTickResult>, ApiError> {
    let submitted = state.extraction_queue.submit_due(tenant.organization_id, Utc::now()).await?;
    Ok(Json(SubmitTickResult { submitted }))
}
