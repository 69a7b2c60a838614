// forge-server/src/router.rs
// ============================================================================
// Module: Router
// Description: Builds the axum `Router` over every §6.1 route, the
//              generalisation of `decision-gate-mcp::server`'s single-route
//              `Router::new().route(...).with_state(state)` shape to a full
//              REST resource set.
// Dependencies: axum, tower-http
// ============================================================================

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use axum::routing::post;
use tower_http::trace::TraceLayer;

use crate::routes::assets;
use crate::routes::bulk_upload;
use crate::routes::queue;
use crate::routes::runs;
use crate::routes::scheduled_tasks;
use crate::state::AppState;

/// Builds the full router, wired to `state` and wrapped in a request
/// tracing layer (§C observability: `tracing`/`tracing-subscriber` as the
/// teacher's own crates already establish).
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/runs", get(runs::list))
        .route("/runs/stats", get(runs::stats))
        .route("/assets", get(assets::list))
        .route("/assets/health", get(assets::health))
        .route("/assets/{id}", get(assets::get))
        .route("/assets/{id}/extraction", get(assets::extraction))
        .route("/assets/{id}/runs", get(assets::runs_for_asset))
        .route("/assets/{id}/versions", get(assets::versions))
        .route("/assets/{id}/versions/{n}", get(assets::version))
        .route("/assets/{id}/reextract", post(assets::reextract))
        .route("/bulk-upload/analyze", post(bulk_upload::analyze))
        .route("/bulk-upload/apply", post(bulk_upload::apply))
        .route("/scheduled-tasks", get(scheduled_tasks::list).post(scheduled_tasks::create))
        .route("/scheduled-tasks/{name}", get(scheduled_tasks::get).patch(scheduled_tasks::patch).delete(scheduled_tasks::delete))
        .route("/scheduled-tasks/{name}/trigger-now", post(scheduled_tasks::trigger_now))
        .route("/scheduled-tasks/{name}/enable", post(scheduled_tasks::enable))
        .route("/scheduled-tasks/{name}/disable", post(scheduled_tasks::disable))
        .route("/queue/submit-tick", post(queue::submit_tick))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
