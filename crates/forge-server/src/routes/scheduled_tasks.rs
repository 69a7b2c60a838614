// forge-server/src/routes/scheduled_tasks.rs
// ============================================================================
// Module: Scheduled Task Routes
// Description: CRUD plus `trigger-now`/`enable`/`disable` over
//              ScheduledTasks (§6.1, §4.6 C6).
// Dependencies: axum, forge-core, forge-scheduler
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use forge_core::ids::RunId;
use forge_core::scheduled_task::ScheduledTask;
use forge_core::scheduled_task::ScopeType;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;
use crate::tenant::TenantContext;

/// Request body for `POST /scheduled-tasks`.
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    /// Unique task name.
    name: String,
    /// Caller-defined task kind.
    task_type: String,
    /// 5-field cron expression.
    schedule_expression: String,
    /// Global vs. single-tenant scope.
    scope_type: ScopeType,
    /// Owning tenant, required when `scope_type` is `organization`.
    organization_id: Option<forge_core::ids::OrganizationId>,
    /// Opaque task-specific configuration passed to the materialised Run.
    #[serde(default)]
    config: serde_json::Value,
}

/// `GET /scheduled-tasks`: every task, global and tenant-scoped alike —
/// this is an operator surface, not a tenant-scoped one (§6.1).
///
/// # Errors
///
/// Returns [`ApiError`] on a persistence failure.
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ScheduledTask>>, ApiError> {
    let tasks = state.scheduled_tasks.list().await?;
    Ok(Json(tasks))
}

/// `GET /scheduled-tasks/{name}`.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] when no such task exists.
pub async fn get(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<Json<ScheduledTask>, ApiError> {
    let task = state.scheduled_tasks.get(&name).await?;
    Ok(Json(task))
}

/// `POST /scheduled-tasks`: creates a new task, rejecting a malformed cron
/// expression before persisting (§4.6).
///
/// # Errors
///
/// Returns [`ApiError::InvalidInput`] for a malformed cron expression, or
/// [`ApiError`] on a persistence failure such as a duplicate name.
pub async fn create(State(state): State<Arc<AppState>>, Json(request): Json<CreateTaskRequest>) -> Result<(StatusCode, Json<ScheduledTask>), ApiError> {
    forge_scheduler::cron_util::validate(&request.schedule_expression).map_err(|error| ApiError::InvalidInput(error.to_string()))?;

    let now = Utc::now();
    let next_run_at = forge_scheduler::cron_util::next_fire_time(&request.schedule_expression, now).map_err(|error| ApiError::InvalidInput(error.to_string()))?;

    let task = ScheduledTask {
        name: request.name,
        task_type: request.task_type,
        schedule_expression: request.schedule_expression,
        enabled: true,
        scope_type: request.scope_type,
        organization_id: request.organization_id,
        config: request.config,
        last_run_id: None,
        last_run_at: None,
        last_run_status: None,
        next_run_at,
    };
    let created = state.scheduled_tasks.create(task).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PATCH /scheduled-tasks/{name}`: currently supports no partial-update
/// fields beyond `enable`/`disable`, which have their own dedicated
/// endpoints below; this handler exists so the route table matches §6.1's
/// verb list and returns a clear `InvalidInput` rather than a generic
/// method-not-allowed until a real field set is needed.
///
/// # Errors
///
/// Always returns [`ApiError::InvalidInput`].
pub async fn patch(Path(_name): Path<String>) -> Result<Json<ScheduledTask>, ApiError> {
    Err(ApiError::InvalidInput("scheduled-task updates are not yet supported; use enable/disable or delete and recreate".to_string()))
}

/// `DELETE /scheduled-tasks/{name}`: disables the task rather than erasing
/// its history, since `last_run_id`/`last_run_status` are load-bearing
/// audit trail, not disposable state.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] when no such task exists.
pub async fn delete(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<StatusCode, ApiError> {
    state.scheduled_tasks.disable(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /scheduled-tasks/{name}/trigger-now`: materialises a Run
/// immediately, regardless of `next_run_at`, with `origin = user` (§4.6).
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] when no such task exists, or
/// [`ApiError::InvalidInput`] for a malformed cron expression.
pub async fn trigger_now(State(state): State<Arc<AppState>>, tenant: TenantContext, Path(name): Path<String>) -> Result<(StatusCode, Json<RunId>), ApiError> {
    let run_id = state.task_dispatcher.trigger_now(&name, tenant.organization_id, Utc::now()).await?;
    Ok((StatusCode::ACCEPTED, Json(run_id)))
}

/// `POST /scheduled-tasks/{name}/enable`: arms `next_run_at` from the
/// task's own cron expression.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] when no such task exists.
pub async fn enable(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<Json<ScheduledTask>, ApiError> {
    let task = state.scheduled_tasks.get(&name).await?;
    let now = Utc::now();
    let next_run_at = forge_scheduler::cron_util::next_fire_time(&task.schedule_expression, now)
        .map_err(|error| ApiError::InvalidInput(error.to_string()))?
        .ok_or_else(|| ApiError::InvalidInput(format!("schedule expression for {name} never fires again")))?;
    let task = state.scheduled_tasks.enable(&name, next_run_at).await?;
    Ok(Json(task))
}

/// `POST /scheduled-tasks/{name}/disable`.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] when no such task exists.
pub async fn disable(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<Json<ScheduledTask>, ApiError> {
    let task = state.scheduled_tasks.disable(&name).await?;
    Ok(Json(task))
}
