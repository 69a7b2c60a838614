// forge-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Store
// Description: RunStore/RunGroupStore implementations backed by rusqlite.
// Purpose: Give the server and workers a durable, single-file persistence
//          backend without requiring an external database for local and
//          small-deployment use (§6.2).
// Dependencies: rusqlite, tokio, async-trait, forge-core
// ============================================================================

//! ## Overview
//! [`SqliteStore`] wraps one [`rusqlite::Connection`] behind an
//! `Arc<Mutex<_>>` and moves every call onto a blocking thread with
//! [`tokio::task::spawn_blocking`], matching the synchronous-driver-under-an-
//! async-trait pattern the `decision-gate-store-sqlite` crate uses. A single
//! connection keeps write ordering simple; WAL mode (set in
//! [`crate::schema::initialize_schema`]) lets readers proceed concurrently
//! with the writer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use forge_core::asset::Asset;
use forge_core::asset::AssetStatus;
use forge_core::asset::AssetVersion;
use forge_core::asset::ExtractionTier;
use forge_core::asset::SourceType;
use forge_core::extraction::ExtractionResult;
use forge_core::extraction::ExtractionStatus;
use forge_core::hashing::ContentHash;
use forge_core::ids::AssetId;
use forge_core::ids::ExtractionResultId;
use forge_core::ids::OrganizationId;
use forge_core::ids::RunGroupId;
use forge_core::ids::RunId;
use forge_core::ids::TraceId;
use forge_core::ids::UserId;
use forge_core::interfaces::RunFilter;
use forge_core::interfaces::RunGroupStore;
use forge_core::interfaces::RunStore;
use forge_core::interfaces::StoreError;
use forge_core::run::LogLevel;
use forge_core::run::Progress;
use forge_core::run::Run;
use forge_core::run::RunEventType;
use forge_core::run::RunLogEvent;
use forge_core::run::RunOrigin;
use forge_core::run::RunStatus;
use forge_core::run::RunType;
use forge_core::run_group::GroupCompletion;
use forge_core::run_group::GroupStatus;
use forge_core::run_group::RunGroup;
use forge_core::scheduled_task::ScheduledTask;
use forge_core::scheduled_task::ScopeType;
use forge_queue::AssetStore;
use forge_queue::ExtractionResultStore;
use forge_scheduler::ports::ScheduledTaskStore;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde_json::Value as Json;

use crate::error::SqliteStoreError;
use crate::schema::initialize_schema;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Where [`SqliteStore`] keeps its data.
#[derive(Debug, Clone)]
pub enum SqliteStoreConfig {
    /// A file on disk. Created if it does not exist.
    File(PathBuf),
    /// An in-process, non-persistent database (tests only).
    InMemory,
}

impl SqliteStoreConfig {
    /// Convenience constructor for a file-backed store.
    #[must_use]
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::File(path.as_ref().to_path_buf())
    }
}

// ============================================================================
// SECTION: SqliteStore
// ============================================================================

/// SQLite-backed [`RunStore`] and [`RunGroupStore`].
#[derive(Clone)]
pub struct SqliteStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database and initializes the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the connection cannot be opened or
    /// the schema cannot be created.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let connection = match config {
            SqliteStoreConfig::File(path) => Connection::open(path)?,
            SqliteStoreConfig::InMemory => Connection::open_in_memory()?,
        };
        initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Runs a blocking closure against the shared connection on a blocking
    /// thread, translating join failures into [`StoreError::Io`].
    pub(crate) async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, SqliteStoreError> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            #[allow(clippy::expect_used, reason = "a poisoned mutex means a prior panic already corrupted process state")]
            let guard = connection.lock().expect("sqlite connection mutex poisoned");
            f(&guard)
        })
        .await
        .map_err(|join_error| StoreError::Io(join_error.to_string()))?
        .map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Row Mapping — Run
// ============================================================================

fn run_type_str(run_type: RunType) -> &'static str {
    match run_type {
        RunType::Extraction => "extraction",
        RunType::ExtractionEnhancement => "extraction_enhancement",
        RunType::Procedure => "procedure",
        RunType::Pipeline => "pipeline",
        RunType::Scrape => "scrape",
        RunType::SharepointSync => "sharepoint_sync",
        RunType::SamPull => "sam_pull",
        RunType::SystemMaintenance => "system_maintenance",
        RunType::Indexing => "indexing",
    }
}

fn parse_run_type(value: &str) -> Result<RunType, SqliteStoreError> {
    Ok(match value {
        "extraction" => RunType::Extraction,
        "extraction_enhancement" => RunType::ExtractionEnhancement,
        "procedure" => RunType::Procedure,
        "pipeline" => RunType::Pipeline,
        "scrape" => RunType::Scrape,
        "sharepoint_sync" => RunType::SharepointSync,
        "sam_pull" => RunType::SamPull,
        "system_maintenance" => RunType::SystemMaintenance,
        "indexing" => RunType::Indexing,
        other => return Err(SqliteStoreError::Corrupt(format!("unknown run_type {other:?}"))),
    })
}

fn run_origin_str(origin: RunOrigin) -> &'static str {
    match origin {
        RunOrigin::User => "user",
        RunOrigin::System => "system",
        RunOrigin::Scheduled => "scheduled",
        RunOrigin::Event => "event",
        RunOrigin::Group => "group",
    }
}

fn parse_run_origin(value: &str) -> Result<RunOrigin, SqliteStoreError> {
    Ok(match value {
        "user" => RunOrigin::User,
        "system" => RunOrigin::System,
        "scheduled" => RunOrigin::Scheduled,
        "event" => RunOrigin::Event,
        "group" => RunOrigin::Group,
        other => return Err(SqliteStoreError::Corrupt(format!("unknown origin {other:?}"))),
    })
}

fn run_status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "pending",
        RunStatus::Submitted => "submitted",
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
        RunStatus::TimedOut => "timed_out",
        RunStatus::Cancelled => "cancelled",
    }
}

fn parse_run_status(value: &str) -> Result<RunStatus, SqliteStoreError> {
    Ok(match value {
        "pending" => RunStatus::Pending,
        "submitted" => RunStatus::Submitted,
        "running" => RunStatus::Running,
        "completed" => RunStatus::Completed,
        "failed" => RunStatus::Failed,
        "timed_out" => RunStatus::TimedOut,
        "cancelled" => RunStatus::Cancelled,
        other => return Err(SqliteStoreError::Corrupt(format!("unknown run status {other:?}"))),
    })
}

fn log_level_str(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
    }
}

fn parse_log_level(value: &str) -> Result<LogLevel, SqliteStoreError> {
    Ok(match value {
        "INFO" => LogLevel::Info,
        "WARN" => LogLevel::Warn,
        "ERROR" => LogLevel::Error,
        other => return Err(SqliteStoreError::Corrupt(format!("unknown log level {other:?}"))),
    })
}

fn run_event_type_str(event_type: RunEventType) -> &'static str {
    match event_type {
        RunEventType::Start => "start",
        RunEventType::Progress => "progress",
        RunEventType::StepStart => "step_start",
        RunEventType::StepComplete => "step_complete",
        RunEventType::StepError => "step_error",
        RunEventType::Governance => "governance",
        RunEventType::GovernanceViolation => "governance_violation",
        RunEventType::Restart => "restart",
        RunEventType::Summary => "summary",
    }
}

fn parse_run_event_type(value: &str) -> Result<RunEventType, SqliteStoreError> {
    Ok(match value {
        "start" => RunEventType::Start,
        "progress" => RunEventType::Progress,
        "step_start" => RunEventType::StepStart,
        "step_complete" => RunEventType::StepComplete,
        "step_error" => RunEventType::StepError,
        "governance" => RunEventType::Governance,
        "governance_violation" => RunEventType::GovernanceViolation,
        "restart" => RunEventType::Restart,
        "summary" => RunEventType::Summary,
        other => return Err(SqliteStoreError::Corrupt(format!("unknown event type {other:?}"))),
    })
}

pub(crate) fn parse_id<T: FromStr>(value: &str, what: &str) -> Result<T, SqliteStoreError> {
    T::from_str(value).map_err(|_| SqliteStoreError::Corrupt(format!("invalid {what} {value:?}")))
}

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Run> {
    let build = || -> Result<Run, SqliteStoreError> {
        let id: String = row.get("id")?;
        let organization_id: String = row.get("organization_id")?;
        let run_type: String = row.get("run_type")?;
        let origin: String = row.get("origin")?;
        let status: String = row.get("status")?;
        let config: String = row.get("config")?;
        let input_asset_ids: String = row.get("input_asset_ids")?;
        let progress_current: Option<i64> = row.get("progress_current")?;
        let progress_total: Option<i64> = row.get("progress_total")?;
        let progress_unit: Option<String> = row.get("progress_unit")?;
        let results_summary: Option<String> = row.get("results_summary")?;
        let error_message: Option<String> = row.get("error_message")?;
        let created_at: String = row.get("created_at")?;
        let started_at: Option<String> = row.get("started_at")?;
        let completed_at: Option<String> = row.get("completed_at")?;
        let created_by: Option<String> = row.get("created_by")?;
        let group_id: Option<String> = row.get("group_id")?;
        let is_group_parent: bool = row.get("is_group_parent")?;
        let trace_id: Option<String> = row.get("trace_id")?;
        let procedure_slug: Option<String> = row.get("procedure_slug")?;
        let procedure_version: Option<i64> = row.get("procedure_version")?;

        let input_asset_ids: Vec<String> = serde_json::from_str(&input_asset_ids)
            .map_err(|error| SqliteStoreError::Corrupt(error.to_string()))?;
        let input_asset_ids = input_asset_ids
            .iter()
            .map(|raw| parse_id::<AssetId>(raw, "asset id"))
            .collect::<Result<Vec<_>, _>>()?;

        let progress = match (progress_current, progress_total) {
            (Some(current), Some(total)) => Some(Progress::new(
                u64::try_from(current).unwrap_or_default(),
                u64::try_from(total).unwrap_or_default(),
            )),
            _ => None,
        };

        Ok(Run {
            id: parse_id(&id, "run id")?,
            organization_id: parse_id(&organization_id, "organization id")?,
            run_type: parse_run_type(&run_type)?,
            origin: parse_run_origin(&origin)?,
            status: parse_run_status(&status)?,
            config: serde_json::from_str(&config).unwrap_or(Json::Null),
            input_asset_ids,
            progress,
            progress_unit,
            results_summary: results_summary.map(|raw| serde_json::from_str(&raw).unwrap_or(Json::Null)),
            error_message,
            created_at: parse_timestamp(&created_at)?,
            started_at: started_at.map(|raw| parse_timestamp(&raw)).transpose()?,
            completed_at: completed_at.map(|raw| parse_timestamp(&raw)).transpose()?,
            created_by: created_by.map(|raw| parse_id::<UserId>(&raw, "user id")).transpose()?,
            group_id: group_id.map(|raw| parse_id::<RunGroupId>(&raw, "group id")).transpose()?,
            is_group_parent,
            trace_id: trace_id.map(|raw| parse_id::<TraceId>(&raw, "trace id")).transpose()?,
            procedure_slug,
            procedure_version: procedure_version.map(|value| u32::try_from(value).unwrap_or_default()),
        })
    };
    build().map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error)))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, SqliteStoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| SqliteStoreError::Corrupt(error.to_string()))
}

// ============================================================================
// SECTION: RunStore
// ============================================================================

#[async_trait]
impl RunStore for SqliteStore {
    async fn create(&self, run: Run) -> Result<Run, StoreError> {
        self.with_connection(move |connection| {
            let input_asset_ids = serde_json::to_string(
                &run.input_asset_ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
            )
            .map_err(|error| SqliteStoreError::Corrupt(error.to_string()))?;
            connection
                .execute(
                    "INSERT INTO runs (
                        id, organization_id, run_type, origin, status, config, input_asset_ids,
                        progress_current, progress_total, progress_percent, progress_unit,
                        results_summary, error_message, created_at, started_at, completed_at,
                        created_by, group_id, is_group_parent, trace_id, procedure_slug, procedure_version
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
                    params![
                        run.id.to_string(),
                        run.organization_id.to_string(),
                        run_type_str(run.run_type),
                        run_origin_str(run.origin),
                        run_status_str(run.status),
                        run.config.to_string(),
                        input_asset_ids,
                        run.progress.map(|p| i64::try_from(p.current).unwrap_or(i64::MAX)),
                        run.progress.map(|p| i64::try_from(p.total).unwrap_or(i64::MAX)),
                        run.progress.map(|p| i64::from(p.percent)),
                        run.progress_unit,
                        run.results_summary.as_ref().map(ToString::to_string),
                        run.error_message,
                        run.created_at.to_rfc3339(),
                        run.started_at.map(|t| t.to_rfc3339()),
                        run.completed_at.map(|t| t.to_rfc3339()),
                        run.created_by.map(|id| id.to_string()),
                        run.group_id.map(|id| id.to_string()),
                        run.is_group_parent,
                        run.trace_id.map(|id| id.to_string()),
                        run.procedure_slug,
                        run.procedure_version,
                    ],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "run"))?;
            Ok(run)
        })
        .await
    }

    async fn get(&self, organization_id: OrganizationId, id: RunId) -> Result<Run, StoreError> {
        self.with_connection(move |connection| {
            connection
                .query_row(
                    "SELECT * FROM runs WHERE id = ?1 AND organization_id = ?2",
                    params![id.to_string(), organization_id.to_string()],
                    run_from_row,
                )
                .optional()?
                .ok_or_else(|| SqliteStoreError::NotFound(format!("run {id}")))
        })
        .await
    }

    async fn list(
        &self,
        organization_id: OrganizationId,
        filter: RunFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Run>, StoreError> {
        self.with_connection(move |connection| {
            let mut sql = String::from("SELECT * FROM runs WHERE organization_id = ?1");
            let mut bind_strings: Vec<String> = vec![organization_id.to_string()];
            if let Some(run_type) = filter.run_type {
                sql.push_str(" AND run_type = ?");
                bind_strings.push(run_type_str(run_type).to_string());
            }
            if let Some(status) = filter.status {
                sql.push_str(" AND status = ?");
                bind_strings.push(run_status_str(status).to_string());
            }
            if let Some(origin) = filter.origin {
                sql.push_str(" AND origin = ?");
                bind_strings.push(run_origin_str(origin).to_string());
            }
            sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

            let mut statement = connection.prepare(&sql)?;
            let mut param_values: Vec<&dyn rusqlite::ToSql> =
                bind_strings.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
            let limit_i64 = i64::from(limit);
            let offset_i64 = i64::from(offset);
            param_values.push(&limit_i64);
            param_values.push(&offset_i64);

            let rows = statement.query_map(param_values.as_slice(), run_from_row)?;
            let mut runs = Vec::new();
            for row in rows {
                runs.push(row?);
            }
            Ok(runs)
        })
        .await
    }

    async fn update_status(
        &self,
        organization_id: OrganizationId,
        id: RunId,
        new_status: RunStatus,
        error_message: Option<String>,
    ) -> Result<Run, StoreError> {
        self.with_connection(move |connection| {
            let mut run = connection
                .query_row(
                    "SELECT * FROM runs WHERE id = ?1 AND organization_id = ?2",
                    params![id.to_string(), organization_id.to_string()],
                    run_from_row,
                )
                .optional()?
                .ok_or_else(|| SqliteStoreError::NotFound(format!("run {id}")))?;

            run.transition(new_status, error_message, Utc::now())
                .map_err(|error| SqliteStoreError::InvalidTransition(error.to_string()))?;

            connection.execute(
                "UPDATE runs SET status = ?1, error_message = ?2, started_at = ?3, completed_at = ?4 WHERE id = ?5",
                params![
                    run_status_str(run.status),
                    run.error_message,
                    run.started_at.map(|t| t.to_rfc3339()),
                    run.completed_at.map(|t| t.to_rfc3339()),
                    run.id.to_string(),
                ],
            )?;
            Ok(run)
        })
        .await
    }

    async fn complete(&self, organization_id: OrganizationId, id: RunId, results_summary: Json) -> Result<Run, StoreError> {
        self.with_connection(move |connection| {
            let mut run = connection
                .query_row(
                    "SELECT * FROM runs WHERE id = ?1 AND organization_id = ?2",
                    params![id.to_string(), organization_id.to_string()],
                    run_from_row,
                )
                .optional()?
                .ok_or_else(|| SqliteStoreError::NotFound(format!("run {id}")))?;

            run.transition(RunStatus::Completed, None, Utc::now())
                .map_err(|error| SqliteStoreError::InvalidTransition(error.to_string()))?;
            run.results_summary = Some(results_summary);

            connection.execute(
                "UPDATE runs SET status = ?1, results_summary = ?2, started_at = ?3, completed_at = ?4 WHERE id = ?5",
                params![
                    run_status_str(run.status),
                    run.results_summary.as_ref().map(ToString::to_string),
                    run.started_at.map(|t| t.to_rfc3339()),
                    run.completed_at.map(|t| t.to_rfc3339()),
                    run.id.to_string(),
                ],
            )?;
            Ok(run)
        })
        .await
    }

    async fn update_progress(
        &self,
        organization_id: OrganizationId,
        id: RunId,
        current: u64,
        total: u64,
        unit: Option<String>,
    ) -> Result<Run, StoreError> {
        self.with_connection(move |connection| {
            let progress = Progress::new(current, total);
            connection.execute(
                "UPDATE runs SET progress_current = ?1, progress_total = ?2, progress_percent = ?3, progress_unit = ?4
                 WHERE id = ?5 AND organization_id = ?6",
                params![
                    i64::try_from(progress.current).unwrap_or(i64::MAX),
                    i64::try_from(progress.total).unwrap_or(i64::MAX),
                    i64::from(progress.percent),
                    unit,
                    id.to_string(),
                    organization_id.to_string(),
                ],
            )?;
            connection
                .query_row(
                    "SELECT * FROM runs WHERE id = ?1 AND organization_id = ?2",
                    params![id.to_string(), organization_id.to_string()],
                    run_from_row,
                )
                .optional()?
                .ok_or_else(|| SqliteStoreError::NotFound(format!("run {id}")))
        })
        .await
    }

    async fn cancel_pending_runs_for_asset(
        &self,
        organization_id: OrganizationId,
        asset_id: AssetId,
        run_type: RunType,
    ) -> Result<u32, StoreError> {
        self.with_connection(move |connection| {
            let needle = format!("%\"{asset_id}\"%");
            let changed = connection.execute(
                "UPDATE runs SET status = 'cancelled', completed_at = ?1
                 WHERE organization_id = ?2 AND run_type = ?3
                   AND status IN ('pending', 'submitted')
                   AND input_asset_ids LIKE ?4",
                params![Utc::now().to_rfc3339(), organization_id.to_string(), run_type_str(run_type), needle],
            )?;
            Ok(u32::try_from(changed).unwrap_or(u32::MAX))
        })
        .await
    }

    async fn append_log(
        &self,
        run_id: RunId,
        level: LogLevel,
        event_type: RunEventType,
        message: String,
        context: Json,
    ) -> Result<(), StoreError> {
        self.with_connection(move |connection| {
            connection.execute(
                "INSERT INTO run_log_events (run_id, level, event_type, message, context, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run_id.to_string(),
                    log_level_str(level),
                    run_event_type_str(event_type),
                    message,
                    context.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_logs(&self, run_id: RunId) -> Result<Vec<RunLogEvent>, StoreError> {
        self.with_connection(move |connection| {
            let mut statement = connection.prepare(
                "SELECT run_id, level, event_type, message, context, created_at
                 FROM run_log_events WHERE run_id = ?1 ORDER BY seq ASC",
            )?;
            let rows = statement.query_map(params![run_id.to_string()], |row| {
                let build = || -> Result<RunLogEvent, SqliteStoreError> {
                    let run_id: String = row.get(0)?;
                    let level: String = row.get(1)?;
                    let event_type: String = row.get(2)?;
                    let message: String = row.get(3)?;
                    let context: String = row.get(4)?;
                    let created_at: String = row.get(5)?;
                    Ok(RunLogEvent {
                        run_id: parse_id(&run_id, "run id")?,
                        level: parse_log_level(&level)?,
                        event_type: parse_run_event_type(&event_type)?,
                        message,
                        context: serde_json::from_str(&context).unwrap_or(Json::Null),
                        created_at: parse_timestamp(&created_at)?,
                    })
                };
                build().map_err(|error| {
                    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error))
                })
            })?;
            let mut events = Vec::new();
            for row in rows {
                events.push(row?);
            }
            Ok(events)
        })
        .await
    }
}

// ============================================================================
// SECTION: Row Mapping — RunGroup
// ============================================================================

fn group_status_str(status: GroupStatus) -> &'static str {
    match status {
        GroupStatus::Pending => "pending",
        GroupStatus::Running => "running",
        GroupStatus::Partial => "partial",
        GroupStatus::Completed => "completed",
        GroupStatus::Failed => "failed",
        GroupStatus::Cancelled => "cancelled",
    }
}

fn parse_group_status(value: &str) -> Result<GroupStatus, SqliteStoreError> {
    Ok(match value {
        "pending" => GroupStatus::Pending,
        "running" => GroupStatus::Running,
        "partial" => GroupStatus::Partial,
        "completed" => GroupStatus::Completed,
        "failed" => GroupStatus::Failed,
        "cancelled" => GroupStatus::Cancelled,
        other => return Err(SqliteStoreError::Corrupt(format!("unknown group status {other:?}"))),
    })
}

fn group_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunGroup> {
    let build = || -> Result<RunGroup, SqliteStoreError> {
        let id: String = row.get("id")?;
        let organization_id: String = row.get("organization_id")?;
        let group_type: String = row.get("group_type")?;
        let parent_run_id: Option<String> = row.get("parent_run_id")?;
        let status: String = row.get("status")?;
        let total_children: i64 = row.get("total_children")?;
        let completed_children: i64 = row.get("completed_children")?;
        let failed_children: i64 = row.get("failed_children")?;
        let config: String = row.get("config")?;
        let results_summary: Option<String> = row.get("results_summary")?;
        let started_at: String = row.get("started_at")?;
        let completed_at: Option<String> = row.get("completed_at")?;

        Ok(RunGroup {
            id: parse_id(&id, "group id")?,
            organization_id: parse_id(&organization_id, "organization id")?,
            group_type,
            parent_run_id: parent_run_id.map(|raw| parse_id::<RunId>(&raw, "run id")).transpose()?,
            status: parse_group_status(&status)?,
            total_children: u32::try_from(total_children).unwrap_or_default(),
            completed_children: u32::try_from(completed_children).unwrap_or_default(),
            failed_children: u32::try_from(failed_children).unwrap_or_default(),
            config: serde_json::from_str(&config).unwrap_or(Json::Null),
            results_summary: results_summary.map(|raw| serde_json::from_str(&raw).unwrap_or(Json::Null)),
            started_at: parse_timestamp(&started_at)?,
            completed_at: completed_at.map(|raw| parse_timestamp(&raw)).transpose()?,
        })
    };
    build().map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error)))
}

impl SqliteStore {
    fn load_group(connection: &Connection, group_id: RunGroupId) -> Result<RunGroup, SqliteStoreError> {
        connection
            .query_row(
                "SELECT * FROM run_groups WHERE id = ?1",
                params![group_id.to_string()],
                group_from_row,
            )
            .optional()?
            .ok_or_else(|| SqliteStoreError::NotFound(format!("run group {group_id}")))
    }

    fn save_group(connection: &Connection, group: &RunGroup) -> Result<(), SqliteStoreError> {
        connection
            .execute(
                "UPDATE run_groups SET status = ?1, total_children = ?2, completed_children = ?3,
                    failed_children = ?4, results_summary = ?5, completed_at = ?6 WHERE id = ?7",
                params![
                    group_status_str(group.status),
                    group.total_children,
                    group.completed_children,
                    group.failed_children,
                    group.results_summary.as_ref().map(ToString::to_string),
                    group.completed_at.map(|t| t.to_rfc3339()),
                    group.id.to_string(),
                ],
            )
            .map_err(|error| SqliteStoreError::from_write(error, "run group"))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: RunGroupStore
// ============================================================================

#[async_trait]
impl RunGroupStore for SqliteStore {
    async fn create_group(&self, group: RunGroup) -> Result<RunGroup, StoreError> {
        self.with_connection(move |connection| {
            connection
                .execute(
                    "INSERT INTO run_groups (
                        id, organization_id, group_type, parent_run_id, status, total_children,
                        completed_children, failed_children, config, results_summary, started_at, completed_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        group.id.to_string(),
                        group.organization_id.to_string(),
                        group.group_type,
                        group.parent_run_id.map(|id| id.to_string()),
                        group_status_str(group.status),
                        group.total_children,
                        group.completed_children,
                        group.failed_children,
                        group.config.to_string(),
                        group.results_summary.as_ref().map(ToString::to_string),
                        group.started_at.to_rfc3339(),
                        group.completed_at.map(|t| t.to_rfc3339()),
                    ],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "run group"))?;
            Ok(group)
        })
        .await
    }

    async fn get(&self, organization_id: OrganizationId, id: RunGroupId) -> Result<RunGroup, StoreError> {
        self.with_connection(move |connection| {
            let group = Self::load_group(connection, id)?;
            if group.organization_id != organization_id {
                return Err(SqliteStoreError::NotFound(format!("run group {id}")));
            }
            Ok(group)
        })
        .await
    }

    async fn add_child(&self, group_id: RunGroupId, child_run_id: RunId) -> Result<(), StoreError> {
        self.with_connection(move |connection| {
            connection
                .execute(
                    "UPDATE runs SET group_id = ?1 WHERE id = ?2",
                    params![group_id.to_string(), child_run_id.to_string()],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "run"))?;
            Ok(())
        })
        .await
    }

    async fn set_expected_children(&self, group_id: RunGroupId, total: u32) -> Result<(), StoreError> {
        self.with_connection(move |connection| {
            let mut group = Self::load_group(connection, group_id)?;
            group.set_expected_children(total);
            Self::save_group(connection, &group)
        })
        .await
    }

    async fn child_completed(&self, group_id: RunGroupId, now: DateTime<Utc>) -> Result<RunGroup, StoreError> {
        self.with_connection(move |connection| {
            let mut group = Self::load_group(connection, group_id)?;
            group.record_completed(now);
            Self::save_group(connection, &group)?;
            Ok(group)
        })
        .await
    }

    async fn child_failed(&self, group_id: RunGroupId, now: DateTime<Utc>) -> Result<RunGroup, StoreError> {
        self.with_connection(move |connection| {
            let mut group = Self::load_group(connection, group_id)?;
            group.record_failed(now);
            Self::save_group(connection, &group)?;
            Ok(group)
        })
        .await
    }

    async fn finalize_group(&self, group_id: RunGroupId, now: DateTime<Utc>) -> Result<RunGroup, StoreError> {
        self.with_connection(move |connection| {
            let mut group = Self::load_group(connection, group_id)?;
            let _completion: GroupCompletion = group.finalize(now);
            Self::save_group(connection, &group)?;
            Ok(group)
        })
        .await
    }

    async fn mark_group_failed(
        &self,
        group_id: RunGroupId,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<RunGroup, StoreError> {
        self.with_connection(move |connection| {
            let mut group = Self::load_group(connection, group_id)?;
            group.mark_failed(reason, now);
            Self::save_group(connection, &group)?;
            Ok(group)
        })
        .await
    }

    async fn mark_group_cancelled(
        &self,
        group_id: RunGroupId,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<RunGroup, StoreError> {
        self.with_connection(move |connection| {
            let mut group = Self::load_group(connection, group_id)?;
            group.mark_cancelled(reason, now);
            Self::save_group(connection, &group)?;
            Ok(group)
        })
        .await
    }
}

// ============================================================================
// SECTION: Row Mapping — Asset / AssetVersion / ExtractionResult
// ============================================================================

fn source_type_str(source_type: SourceType) -> &'static str {
    match source_type {
        SourceType::Upload => "upload",
        SourceType::Sharepoint => "sharepoint",
        SourceType::WebScrape => "web_scrape",
        SourceType::WebScrapeDocument => "web_scrape_document",
        SourceType::SamGov => "sam_gov",
    }
}

fn parse_source_type(value: &str) -> Result<SourceType, SqliteStoreError> {
    Ok(match value {
        "upload" => SourceType::Upload,
        "sharepoint" => SourceType::Sharepoint,
        "web_scrape" => SourceType::WebScrape,
        "web_scrape_document" => SourceType::WebScrapeDocument,
        "sam_gov" => SourceType::SamGov,
        other => return Err(SqliteStoreError::Corrupt(format!("unknown source_type {other:?}"))),
    })
}

pub(crate) fn asset_status_str(status: AssetStatus) -> &'static str {
    match status {
        AssetStatus::Pending => "pending",
        AssetStatus::Ready => "ready",
        AssetStatus::Failed => "failed",
        AssetStatus::Deleted => "deleted",
    }
}

fn parse_asset_status(value: &str) -> Result<AssetStatus, SqliteStoreError> {
    Ok(match value {
        "pending" => AssetStatus::Pending,
        "ready" => AssetStatus::Ready,
        "failed" => AssetStatus::Failed,
        "deleted" => AssetStatus::Deleted,
        other => return Err(SqliteStoreError::Corrupt(format!("unknown asset status {other:?}"))),
    })
}

pub(crate) fn extraction_tier_str(tier: ExtractionTier) -> &'static str {
    match tier {
        ExtractionTier::None => "none",
        ExtractionTier::Basic => "basic",
        ExtractionTier::Enhanced => "enhanced",
    }
}

fn parse_extraction_tier(value: &str) -> Result<ExtractionTier, SqliteStoreError> {
    Ok(match value {
        "none" => ExtractionTier::None,
        "basic" => ExtractionTier::Basic,
        "enhanced" => ExtractionTier::Enhanced,
        other => return Err(SqliteStoreError::Corrupt(format!("unknown extraction tier {other:?}"))),
    })
}

fn extraction_status_str(status: ExtractionStatus) -> &'static str {
    match status {
        ExtractionStatus::Pending => "pending",
        ExtractionStatus::Running => "running",
        ExtractionStatus::Completed => "completed",
        ExtractionStatus::Failed => "failed",
    }
}

fn parse_extraction_status(value: &str) -> Result<ExtractionStatus, SqliteStoreError> {
    Ok(match value {
        "pending" => ExtractionStatus::Pending,
        "running" => ExtractionStatus::Running,
        "completed" => ExtractionStatus::Completed,
        "failed" => ExtractionStatus::Failed,
        other => return Err(SqliteStoreError::Corrupt(format!("unknown extraction status {other:?}"))),
    })
}

/// Wraps an already-computed hex digest read back from a row without
/// re-hashing it, the same transparent-`Deserialize` trick
/// `forge-server`'s bulk-upload routes use for a client-supplied hash.
pub(crate) fn content_hash_from_stored(value: String) -> Result<ContentHash, SqliteStoreError> {
    serde_json::from_value(Json::String(value)).map_err(|error| SqliteStoreError::Corrupt(error.to_string()))
}

pub(crate) fn asset_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Asset> {
    let build = || -> Result<Asset, SqliteStoreError> {
        let id: String = row.get("id")?;
        let organization_id: String = row.get("organization_id")?;
        let source_type: String = row.get("source_type")?;
        let source_metadata: String = row.get("source_metadata")?;
        let original_filename: String = row.get("original_filename")?;
        let content_type: String = row.get("content_type")?;
        let file_size: i64 = row.get("file_size")?;
        let file_hash: String = row.get("file_hash")?;
        let raw_bucket: String = row.get("raw_bucket")?;
        let raw_object_key: String = row.get("raw_object_key")?;
        let status: String = row.get("status")?;
        let current_version_number: i64 = row.get("current_version_number")?;
        let extraction_tier: String = row.get("extraction_tier")?;
        let enhancement_eligible: bool = row.get("enhancement_eligible")?;
        let enhancement_queued_at: Option<String> = row.get("enhancement_queued_at")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let created_by: Option<String> = row.get("created_by")?;

        Ok(Asset {
            id: parse_id(&id, "asset id")?,
            organization_id: parse_id(&organization_id, "organization id")?,
            source_type: parse_source_type(&source_type)?,
            source_metadata: serde_json::from_str(&source_metadata).unwrap_or(Json::Null),
            original_filename,
            content_type,
            file_size: u64::try_from(file_size).unwrap_or_default(),
            file_hash: content_hash_from_stored(file_hash)?,
            raw_bucket,
            raw_object_key,
            status: parse_asset_status(&status)?,
            current_version_number: u32::try_from(current_version_number).unwrap_or_default(),
            extraction_tier: parse_extraction_tier(&extraction_tier)?,
            enhancement_eligible,
            enhancement_queued_at: enhancement_queued_at.map(|raw| parse_timestamp(&raw)).transpose()?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            created_by: created_by.map(|raw| parse_id::<UserId>(&raw, "user id")).transpose()?,
        })
    };
    build().map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error)))
}

pub(crate) fn asset_version_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AssetVersion> {
    let build = || -> Result<AssetVersion, SqliteStoreError> {
        let asset_id: String = row.get("asset_id")?;
        let version_number: i64 = row.get("version_number")?;
        let raw_bucket: String = row.get("raw_bucket")?;
        let raw_object_key: String = row.get("raw_object_key")?;
        let file_size: i64 = row.get("file_size")?;
        let file_hash: String = row.get("file_hash")?;
        let content_type: String = row.get("content_type")?;
        let is_current: bool = row.get("is_current")?;
        let created_at: String = row.get("created_at")?;
        let created_by: Option<String> = row.get("created_by")?;

        Ok(AssetVersion {
            asset_id: parse_id(&asset_id, "asset id")?,
            version_number: u32::try_from(version_number).unwrap_or_default(),
            raw_bucket,
            raw_object_key,
            file_size: u64::try_from(file_size).unwrap_or_default(),
            file_hash: content_hash_from_stored(file_hash)?,
            content_type,
            is_current,
            created_at: parse_timestamp(&created_at)?,
            created_by: created_by.map(|raw| parse_id::<UserId>(&raw, "user id")).transpose()?,
        })
    };
    build().map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error)))
}

pub(crate) fn extraction_result_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExtractionResult> {
    let build = || -> Result<ExtractionResult, SqliteStoreError> {
        let id: String = row.get("id")?;
        let asset_id: String = row.get("asset_id")?;
        let asset_version_id: Option<String> = row.get("asset_version_id")?;
        let run_id: String = row.get("run_id")?;
        let extractor_version: String = row.get("extractor_version")?;
        let status: String = row.get("status")?;
        let extracted_bucket: Option<String> = row.get("extracted_bucket")?;
        let extracted_object_key: Option<String> = row.get("extracted_object_key")?;
        let structure_metadata: String = row.get("structure_metadata")?;
        let warnings: String = row.get("warnings")?;
        let errors: String = row.get("errors")?;
        let extraction_time_seconds: Option<f64> = row.get("extraction_time_seconds")?;
        let extraction_tier: String = row.get("extraction_tier")?;
        let created_at: String = row.get("created_at")?;

        Ok(ExtractionResult {
            id: parse_id(&id, "extraction result id")?,
            asset_id: parse_id(&asset_id, "asset id")?,
            asset_version_id: asset_version_id.map(|raw| parse_id::<AssetId>(&raw, "asset version id")).transpose()?,
            run_id: parse_id(&run_id, "run id")?,
            extractor_version,
            status: parse_extraction_status(&status)?,
            extracted_bucket,
            extracted_object_key,
            structure_metadata: serde_json::from_str(&structure_metadata).unwrap_or(Json::Null),
            warnings: serde_json::from_str(&warnings).unwrap_or_default(),
            errors: serde_json::from_str(&errors).unwrap_or_default(),
            extraction_time_seconds,
            extraction_tier: parse_extraction_tier(&extraction_tier)?,
            created_at: parse_timestamp(&created_at)?,
        })
    };
    build().map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error)))
}

// ============================================================================
// SECTION: AssetStore / ExtractionResultStore
// ============================================================================

#[async_trait]
impl AssetStore for SqliteStore {
    async fn get(&self, organization_id: OrganizationId, id: AssetId) -> Result<Asset, StoreError> {
        self.with_connection(move |connection| {
            connection
                .query_row(
                    "SELECT * FROM assets WHERE id = ?1 AND organization_id = ?2",
                    params![id.to_string(), organization_id.to_string()],
                    asset_from_row,
                )
                .optional()?
                .ok_or_else(|| SqliteStoreError::NotFound(format!("asset {id}")))
        })
        .await
    }

    async fn save(&self, asset: Asset) -> Result<Asset, StoreError> {
        self.with_connection(move |connection| {
            connection
                .execute(
                    "INSERT INTO assets (
                        id, organization_id, source_type, source_metadata, original_filename, content_type,
                        file_size, file_hash, raw_bucket, raw_object_key, status, current_version_number,
                        extraction_tier, enhancement_eligible, enhancement_queued_at, created_at, updated_at, created_by
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
                    ON CONFLICT(id) DO UPDATE SET
                        source_type = excluded.source_type,
                        source_metadata = excluded.source_metadata,
                        original_filename = excluded.original_filename,
                        content_type = excluded.content_type,
                        file_size = excluded.file_size,
                        file_hash = excluded.file_hash,
                        raw_bucket = excluded.raw_bucket,
                        raw_object_key = excluded.raw_object_key,
                        status = excluded.status,
                        current_version_number = excluded.current_version_number,
                        extraction_tier = excluded.extraction_tier,
                        enhancement_eligible = excluded.enhancement_eligible,
                        enhancement_queued_at = excluded.enhancement_queued_at,
                        updated_at = excluded.updated_at",
                    params![
                        asset.id.to_string(),
                        asset.organization_id.to_string(),
                        source_type_str(asset.source_type),
                        asset.source_metadata.to_string(),
                        asset.original_filename,
                        asset.content_type,
                        i64::try_from(asset.file_size).unwrap_or(i64::MAX),
                        asset.file_hash.as_str(),
                        asset.raw_bucket,
                        asset.raw_object_key,
                        asset_status_str(asset.status),
                        asset.current_version_number,
                        extraction_tier_str(asset.extraction_tier),
                        asset.enhancement_eligible,
                        asset.enhancement_queued_at.map(|t| t.to_rfc3339()),
                        asset.created_at.to_rfc3339(),
                        asset.updated_at.to_rfc3339(),
                        asset.created_by.map(|id| id.to_string()),
                    ],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "asset"))?;
            Ok(asset)
        })
        .await
    }
}

#[async_trait]
impl ExtractionResultStore for SqliteStore {
    async fn create(&self, result: ExtractionResult) -> Result<ExtractionResult, StoreError> {
        self.with_connection(move |connection| {
            connection
                .execute(
                    "INSERT INTO extraction_results (
                        id, asset_id, asset_version_id, run_id, extractor_version, status, extracted_bucket,
                        extracted_object_key, structure_metadata, warnings, errors, extraction_time_seconds,
                        extraction_tier, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        result.id.to_string(),
                        result.asset_id.to_string(),
                        result.asset_version_id.map(|id| id.to_string()),
                        result.run_id.to_string(),
                        result.extractor_version,
                        extraction_status_str(result.status),
                        result.extracted_bucket,
                        result.extracted_object_key,
                        result.structure_metadata.to_string(),
                        serde_json::to_string(&result.warnings).unwrap_or_default(),
                        serde_json::to_string(&result.errors).unwrap_or_default(),
                        result.extraction_time_seconds,
                        extraction_tier_str(result.extraction_tier),
                        result.created_at.to_rfc3339(),
                    ],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "extraction result"))?;
            Ok(result)
        })
        .await
    }

    async fn save(&self, result: ExtractionResult) -> Result<ExtractionResult, StoreError> {
        self.with_connection(move |connection| {
            connection
                .execute(
                    "UPDATE extraction_results SET
                        status = ?1, extracted_bucket = ?2, extracted_object_key = ?3, structure_metadata = ?4,
                        warnings = ?5, errors = ?6, extraction_time_seconds = ?7
                     WHERE id = ?8",
                    params![
                        extraction_status_str(result.status),
                        result.extracted_bucket,
                        result.extracted_object_key,
                        result.structure_metadata.to_string(),
                        serde_json::to_string(&result.warnings).unwrap_or_default(),
                        serde_json::to_string(&result.errors).unwrap_or_default(),
                        result.extraction_time_seconds,
                        result.id.to_string(),
                    ],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "extraction result"))?;
            Ok(result)
        })
        .await
    }

    async fn get_by_run(&self, run_id: RunId) -> Result<ExtractionResult, StoreError> {
        self.with_connection(move |connection| {
            connection
                .query_row(
                    "SELECT * FROM extraction_results WHERE run_id = ?1",
                    params![run_id.to_string()],
                    extraction_result_from_row,
                )
                .optional()?
                .ok_or_else(|| SqliteStoreError::NotFound(format!("extraction result for run {run_id}")))
        })
        .await
    }

    async fn find_active_for_asset(
        &self,
        organization_id: OrganizationId,
        asset_id: AssetId,
    ) -> Result<Option<(RunId, ExtractionResultId)>, StoreError> {
        self.with_connection(move |connection| {
            connection
                .query_row(
                    "SELECT er.run_id, er.id FROM extraction_results er
                     JOIN assets a ON a.id = er.asset_id
                     WHERE er.asset_id = ?1 AND a.organization_id = ?2 AND er.status IN ('pending', 'running')
                     ORDER BY er.created_at DESC LIMIT 1",
                    params![asset_id.to_string(), organization_id.to_string()],
                    |row| {
                        let run_id: String = row.get(0)?;
                        let result_id: String = row.get(1)?;
                        Ok((run_id, result_id))
                    },
                )
                .optional()?
                .map(|(run_id, result_id)| {
                    Ok((parse_id::<RunId>(&run_id, "run id")?, parse_id::<ExtractionResultId>(&result_id, "extraction result id")?))
                })
                .transpose()
        })
        .await
    }
}

// ============================================================================
// SECTION: Asset Helpers (shared with queries.rs)
// ============================================================================

impl SqliteStore {
    /// Fetches an asset scoped to `organization_id`, the same tenant guard
    /// every asset read path needs before touching a row.
    pub(crate) fn load_asset_scoped(connection: &Connection, organization_id: OrganizationId, asset_id: AssetId) -> Result<Asset, SqliteStoreError> {
        connection
            .query_row(
                "SELECT * FROM assets WHERE id = ?1 AND organization_id = ?2",
                params![asset_id.to_string(), organization_id.to_string()],
                asset_from_row,
            )
            .optional()?
            .ok_or_else(|| SqliteStoreError::NotFound(format!("asset {asset_id}")))
    }

    /// Inserts a brand-new asset row.
    pub(crate) fn insert_asset(connection: &Connection, asset: &Asset) -> Result<(), SqliteStoreError> {
        connection
            .execute(
                "INSERT INTO assets (
                    id, organization_id, source_type, source_metadata, original_filename, content_type,
                    file_size, file_hash, raw_bucket, raw_object_key, status, current_version_number,
                    extraction_tier, enhancement_eligible, enhancement_queued_at, created_at, updated_at, created_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    asset.id.to_string(),
                    asset.organization_id.to_string(),
                    source_type_str(asset.source_type),
                    asset.source_metadata.to_string(),
                    asset.original_filename,
                    asset.content_type,
                    i64::try_from(asset.file_size).unwrap_or(i64::MAX),
                    asset.file_hash.as_str(),
                    asset.raw_bucket,
                    asset.raw_object_key,
                    asset_status_str(asset.status),
                    asset.current_version_number,
                    extraction_tier_str(asset.extraction_tier),
                    asset.enhancement_eligible,
                    asset.enhancement_queued_at.map(|t| t.to_rfc3339()),
                    asset.created_at.to_rfc3339(),
                    asset.updated_at.to_rfc3339(),
                    asset.created_by.map(|id| id.to_string()),
                ],
            )
            .map_err(|error| SqliteStoreError::from_write(error, "asset"))?;
        Ok(())
    }

    /// Updates every mutable field of an existing asset row in place.
    pub(crate) fn update_asset(connection: &Connection, asset: &Asset) -> Result<(), SqliteStoreError> {
        connection
            .execute(
                "UPDATE assets SET
                    original_filename = ?1, content_type = ?2, file_size = ?3, file_hash = ?4,
                    raw_bucket = ?5, raw_object_key = ?6, status = ?7, current_version_number = ?8,
                    extraction_tier = ?9, enhancement_eligible = ?10, enhancement_queued_at = ?11,
                    updated_at = ?12
                 WHERE id = ?13",
                params![
                    asset.original_filename,
                    asset.content_type,
                    i64::try_from(asset.file_size).unwrap_or(i64::MAX),
                    asset.file_hash.as_str(),
                    asset.raw_bucket,
                    asset.raw_object_key,
                    asset_status_str(asset.status),
                    asset.current_version_number,
                    extraction_tier_str(asset.extraction_tier),
                    asset.enhancement_eligible,
                    asset.enhancement_queued_at.map(|t| t.to_rfc3339()),
                    asset.updated_at.to_rfc3339(),
                    asset.id.to_string(),
                ],
            )
            .map_err(|error| SqliteStoreError::from_write(error, "asset"))?;
        Ok(())
    }

    /// Inserts one asset version row. `is_current` is the caller's
    /// responsibility to keep unique — callers that bump a version first
    /// clear the prior `is_current` flag. `created_at` is passed
    /// explicitly rather than read off `asset.created_at`, since that
    /// field tracks the asset's own creation time, not each version's.
    pub(crate) fn insert_asset_version(
        connection: &Connection,
        asset: &Asset,
        version_number: u32,
        is_current: bool,
        created_at: DateTime<Utc>,
    ) -> Result<(), SqliteStoreError> {
        connection
            .execute(
                "INSERT INTO asset_versions (
                    asset_id, version_number, raw_bucket, raw_object_key, file_size, file_hash,
                    content_type, is_current, created_at, created_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    asset.id.to_string(),
                    version_number,
                    asset.raw_bucket,
                    asset.raw_object_key,
                    i64::try_from(asset.file_size).unwrap_or(i64::MAX),
                    asset.file_hash.as_str(),
                    asset.content_type,
                    is_current,
                    created_at.to_rfc3339(),
                    asset.created_by.map(|id| id.to_string()),
                ],
            )
            .map_err(|error| SqliteStoreError::from_write(error, "asset version"))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Row Mapping — ScheduledTask
// ============================================================================

fn scope_type_str(scope_type: ScopeType) -> &'static str {
    match scope_type {
        ScopeType::Global => "global",
        ScopeType::Organization => "organization",
    }
}

fn parse_scope_type(value: &str) -> Result<ScopeType, SqliteStoreError> {
    Ok(match value {
        "global" => ScopeType::Global,
        "organization" => ScopeType::Organization,
        other => return Err(SqliteStoreError::Corrupt(format!("unknown scope type {other:?}"))),
    })
}

fn scheduled_task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledTask> {
    let build = || -> Result<ScheduledTask, SqliteStoreError> {
        let name: String = row.get("name")?;
        let task_type: String = row.get("task_type")?;
        let schedule_expression: String = row.get("schedule_expression")?;
        let enabled: bool = row.get("enabled")?;
        let scope_type: String = row.get("scope_type")?;
        let organization_id: Option<String> = row.get("organization_id")?;
        let config: String = row.get("config")?;
        let last_run_id: Option<String> = row.get("last_run_id")?;
        let last_run_at: Option<String> = row.get("last_run_at")?;
        let last_run_status: Option<String> = row.get("last_run_status")?;
        let next_run_at: Option<String> = row.get("next_run_at")?;

        Ok(ScheduledTask {
            name,
            task_type,
            schedule_expression,
            enabled,
            scope_type: parse_scope_type(&scope_type)?,
            organization_id: organization_id.map(|raw| parse_id::<OrganizationId>(&raw, "organization id")).transpose()?,
            config: serde_json::from_str(&config).unwrap_or(Json::Null),
            last_run_id: last_run_id.map(|raw| parse_id::<RunId>(&raw, "run id")).transpose()?,
            last_run_at: last_run_at.map(|raw| parse_timestamp(&raw)).transpose()?,
            last_run_status: last_run_status.map(|raw| parse_run_status(&raw)).transpose()?,
            next_run_at: next_run_at.map(|raw| parse_timestamp(&raw)).transpose()?,
        })
    };
    build().map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error)))
}

// ============================================================================
// SECTION: ScheduledTaskStore
// ============================================================================

#[async_trait]
impl ScheduledTaskStore for SqliteStore {
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>, StoreError> {
        self.with_connection(move |connection| {
            let mut statement = connection
                .prepare("SELECT * FROM scheduled_tasks WHERE enabled = 1 AND next_run_at IS NOT NULL AND next_run_at <= ?1")?;
            let rows = statement.query_map(params![now.to_rfc3339()], scheduled_task_from_row)?;
            let mut tasks = Vec::new();
            for row in rows {
                tasks.push(row?);
            }
            Ok(tasks)
        })
        .await
    }

    async fn get(&self, name: &str) -> Result<ScheduledTask, StoreError> {
        let name = name.to_string();
        self.with_connection(move |connection| {
            connection
                .query_row("SELECT * FROM scheduled_tasks WHERE name = ?1", params![name], scheduled_task_from_row)
                .optional()?
                .ok_or_else(|| SqliteStoreError::NotFound(format!("scheduled task {name}")))
        })
        .await
    }

    async fn list(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        self.with_connection(move |connection| {
            let mut statement = connection.prepare("SELECT * FROM scheduled_tasks ORDER BY name ASC")?;
            let rows = statement.query_map([], scheduled_task_from_row)?;
            let mut tasks = Vec::new();
            for row in rows {
                tasks.push(row?);
            }
            Ok(tasks)
        })
        .await
    }

    async fn create(&self, task: ScheduledTask) -> Result<ScheduledTask, StoreError> {
        self.with_connection(move |connection| {
            connection
                .execute(
                    "INSERT INTO scheduled_tasks (
                        name, task_type, schedule_expression, enabled, scope_type, organization_id, config,
                        last_run_id, last_run_at, last_run_status, next_run_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        task.name,
                        task.task_type,
                        task.schedule_expression,
                        task.enabled,
                        scope_type_str(task.scope_type),
                        task.organization_id.map(|id| id.to_string()),
                        task.config.to_string(),
                        task.last_run_id.map(|id| id.to_string()),
                        task.last_run_at.map(|t| t.to_rfc3339()),
                        task.last_run_status.map(run_status_str),
                        task.next_run_at.map(|t| t.to_rfc3339()),
                    ],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "scheduled task"))?;
            Ok(task)
        })
        .await
    }

    async fn dispatch(&self, name: &str, run: Run, next_run_at: Option<DateTime<Utc>>) -> Result<Run, StoreError> {
        let name = name.to_string();
        self.with_connection(move |connection| {
            let input_asset_ids =
                serde_json::to_string(&run.input_asset_ids.iter().map(ToString::to_string).collect::<Vec<_>>())
                    .map_err(|error| SqliteStoreError::Corrupt(error.to_string()))?;
            connection
                .execute(
                    "INSERT INTO runs (
                        id, organization_id, run_type, origin, status, config, input_asset_ids,
                        progress_current, progress_total, progress_percent, progress_unit,
                        results_summary, error_message, created_at, started_at, completed_at,
                        created_by, group_id, is_group_parent, trace_id, procedure_slug, procedure_version
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, NULL, NULL, NULL, NULL, NULL, ?8, NULL, NULL, ?9, NULL, 0, ?10, ?11, ?12)",
                    params![
                        run.id.to_string(),
                        run.organization_id.to_string(),
                        run_type_str(run.run_type),
                        run_origin_str(run.origin),
                        run_status_str(run.status),
                        run.config.to_string(),
                        input_asset_ids,
                        run.created_at.to_rfc3339(),
                        run.created_by.map(|id| id.to_string()),
                        run.trace_id.map(|id| id.to_string()),
                        run.procedure_slug.clone(),
                        run.procedure_version,
                    ],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "run"))?;

            connection
                .execute(
                    "UPDATE scheduled_tasks SET last_run_id = ?1, last_run_at = ?2, next_run_at = ?3 WHERE name = ?4",
                    params![run.id.to_string(), run.created_at.to_rfc3339(), next_run_at.map(|t| t.to_rfc3339()), name],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "scheduled task"))?;
            Ok(run)
        })
        .await
    }

    async fn record_outcome(&self, name: &str, run_id: RunId, status: RunStatus) -> Result<(), StoreError> {
        let name = name.to_string();
        self.with_connection(move |connection| {
            connection
                .execute(
                    "UPDATE scheduled_tasks SET last_run_status = ?1 WHERE name = ?2 AND last_run_id = ?3",
                    params![run_status_str(status), name, run_id.to_string()],
                )
                .map_err(|error| SqliteStoreError::from_write(error, "scheduled task"))?;
            Ok(())
        })
        .await
    }

    async fn enable(&self, name: &str, next_run_at: DateTime<Utc>) -> Result<ScheduledTask, StoreError> {
        let name = name.to_string();
        self.with_connection(move |connection| {
            let changed = connection.execute(
                "UPDATE scheduled_tasks SET enabled = 1, next_run_at = ?1 WHERE name = ?2",
                params![next_run_at.to_rfc3339(), name],
            )?;
            if changed == 0 {
                return Err(SqliteStoreError::NotFound(format!("scheduled task {name}")));
            }
            connection
                .query_row("SELECT * FROM scheduled_tasks WHERE name = ?1", params![name], scheduled_task_from_row)
                .map_err(SqliteStoreError::from)
        })
        .await
    }

    async fn disable(&self, name: &str) -> Result<ScheduledTask, StoreError> {
        let name = name.to_string();
        self.with_connection(move |connection| {
            let changed = connection.execute(
                "UPDATE scheduled_tasks SET enabled = 0, next_run_at = NULL WHERE name = ?1",
                params![name],
            )?;
            if changed == 0 {
                return Err(SqliteStoreError::NotFound(format!("scheduled task {name}")));
            }
            connection
                .query_row("SELECT * FROM scheduled_tasks WHERE name = ?1", params![name], scheduled_task_from_row)
                .map_err(SqliteStoreError::from)
        })
        .await
    }
}

// ============================================================================
// SECTION: Tenant Discovery
// ============================================================================

impl SqliteStore {
    /// Lists every distinct organization id with at least one row across
    /// the tables a tenant can appear in. The periodic beat uses this to
    /// know which tenants to sweep for `ExtractionQueue::submit_due`,
    /// since that call takes one tenant at a time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    pub async fn list_organization_ids(&self) -> Result<Vec<OrganizationId>, StoreError> {
        self.with_connection(|connection| {
            let mut statement = connection.prepare(
                "SELECT organization_id FROM runs
                 UNION SELECT organization_id FROM scrape_collections
                 UNION SELECT organization_id FROM sharepoint_sync_configs
                 UNION SELECT organization_id FROM scheduled_tasks WHERE organization_id IS NOT NULL",
            )?;
            let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(parse_id(&row?, "organization_id")?);
            }
            Ok(ids)
        })
        .await
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use forge_core::ids::OrganizationId;
    use forge_core::run::RunOrigin;
    use forge_core::run::RunType;
    use serde_json::json;

    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::open(&SqliteStoreConfig::InMemory).expect("open in-memory store")
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = store();
        let org = OrganizationId::new();
        let run = Run::new(org, RunType::Extraction, RunOrigin::System, json!({"a": 1}), Vec::new(), None, Utc::now());
        let created = store.create(run.clone()).await.unwrap();
        let fetched = store.get(org, created.id).await.unwrap();
        assert_eq!(fetched.id, run.id);
        assert_eq!(fetched.status, RunStatus::Pending);
        assert_eq!(fetched.config, json!({"a": 1}));
    }

    #[tokio::test]
    async fn get_from_wrong_tenant_is_not_found() {
        let store = store();
        let org = OrganizationId::new();
        let other_org = OrganizationId::new();
        let run = Run::new(org, RunType::Extraction, RunOrigin::System, Json::Null, Vec::new(), None, Utc::now());
        let created = store.create(run).await.unwrap();
        let result = store.get(other_org, created.id).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_status_enforces_transition_table() {
        let store = store();
        let org = OrganizationId::new();
        let run = Run::new(org, RunType::Extraction, RunOrigin::System, Json::Null, Vec::new(), None, Utc::now());
        let created = store.create(run).await.unwrap();
        store.update_status(org, created.id, RunStatus::Running, None).await.unwrap();
        let completed = store
            .update_status(org, created.id, RunStatus::Completed, None)
            .await
            .unwrap();
        assert_eq!(completed.status, RunStatus::Completed);
        let rejected = store.update_status(org, created.id, RunStatus::Running, None).await;
        assert!(matches!(rejected, Err(StoreError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn append_and_list_logs_preserves_insertion_order() {
        let store = store();
        let org = OrganizationId::new();
        let run = Run::new(org, RunType::Extraction, RunOrigin::System, Json::Null, Vec::new(), None, Utc::now());
        let created = store.create(run).await.unwrap();
        store
            .append_log(created.id, LogLevel::Info, RunEventType::Start, "starting".into(), Json::Null)
            .await
            .unwrap();
        store
            .append_log(created.id, LogLevel::Info, RunEventType::Summary, "done".into(), Json::Null)
            .await
            .unwrap();
        let logs = store.list_logs(created.id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "starting");
        assert_eq!(logs[1].message, "done");
    }

    #[tokio::test]
    async fn run_group_completion_transitions_to_partial() {
        let store = store();
        let org = OrganizationId::new();
        let group = RunGroup::new(org, "bulk_extraction".into(), None, Json::Null, 3, Utc::now());
        let created = store.create_group(group).await.unwrap();
        store.child_completed(created.id, Utc::now()).await.unwrap();
        store.child_completed(created.id, Utc::now()).await.unwrap();
        let after_fail = store.child_failed(created.id, Utc::now()).await.unwrap();
        assert_eq!(after_fail.status, GroupStatus::Partial);
    }

    #[tokio::test]
    async fn cancel_pending_runs_for_asset_only_touches_matching_rows() {
        let store = store();
        let org = OrganizationId::new();
        let asset = AssetId::new();
        let matching = Run::new(
            org,
            RunType::Extraction,
            RunOrigin::System,
            Json::Null,
            vec![asset],
            None,
            Utc::now(),
        );
        let other = Run::new(org, RunType::Extraction, RunOrigin::System, Json::Null, Vec::new(), None, Utc::now());
        let matching = store.create(matching).await.unwrap();
        let other = store.create(other).await.unwrap();

        let cancelled = store
            .cancel_pending_runs_for_asset(org, asset, RunType::Extraction)
            .await
            .unwrap();
        assert_eq!(cancelled, 1);

        let matching_after = store.get(org, matching.id).await.unwrap();
        let other_after = store.get(org, other.id).await.unwrap();
        assert_eq!(matching_after.status, RunStatus::Cancelled);
        assert_eq!(other_after.status, RunStatus::Pending);
    }

    #[tokio::test]
    async fn complete_sets_status_and_results_summary() {
        let store = store();
        let org = OrganizationId::new();
        let run = Run::new(org, RunType::Extraction, RunOrigin::System, Json::Null, Vec::new(), None, Utc::now());
        let created = store.create(run).await.unwrap();
        store.update_status(org, created.id, RunStatus::Running, None).await.unwrap();

        let completed = store.complete(org, created.id, json!({"markdown_length": 42})).await.unwrap();
        assert_eq!(completed.status, RunStatus::Completed);
        assert_eq!(completed.results_summary, Some(json!({"markdown_length": 42})));
    }
}
