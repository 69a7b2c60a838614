// forge-core/src/interfaces.rs
// ============================================================================
// Module: Forge Interfaces
// Description: Backend-agnostic interfaces for persistence and dispatch.
// Purpose: Define the contract surfaces other crates implement and program
//          against, so the store/queue/executor implementations stay
//          swappable without touching callers.
// Dependencies: async-trait, crate::*
// ============================================================================

//! ## Overview
//! Interfaces define how Forge talks to storage and the work broker without
//! embedding backend-specific details. Implementations must be tenant-safe:
//! every read and write is scoped by `organization_id` and callers never see
//! another tenant's rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde_json::Value as Json;
use thiserror::Error;

use crate::ids::AssetId;
use crate::ids::OrganizationId;
use crate::ids::RunGroupId;
use crate::ids::RunId;
use crate::run::LogLevel;
use crate::run::Run;
use crate::run::RunEventType;
use crate::run::RunLogEvent;
use crate::run::RunOrigin;
use crate::run::RunStatus;
use crate::run::RunType;
use crate::run_group::RunGroup;

// ============================================================================
// SECTION: Store Error
// ============================================================================

/// Errors a persistence backend can raise.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O or driver error.
    #[error("store io error: {0}")]
    Io(String),
    /// The requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A unique-index or other constraint was violated.
    #[error("constraint violation: {0}")]
    Constraint(String),
    /// A status transition rejected by the domain state machine.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    /// Data read back from the store failed to deserialize or violated an
    /// invariant the store is supposed to guarantee.
    #[error("corrupt data: {0}")]
    Corrupt(String),
}

// ============================================================================
// SECTION: Run Store
// ============================================================================

/// Filters accepted by [`RunStore::list`] (§6.1 `GET /runs`).
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    /// Restrict to a single run type.
    pub run_type: Option<RunType>,
    /// Restrict to a single status.
    pub status: Option<RunStatus>,
    /// Restrict to a single origin.
    pub origin: Option<RunOrigin>,
}

/// Run persistence (§4.1 C1).
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Creates a new Run in `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn create(&self, run: Run) -> Result<Run, StoreError>;

    /// Fetches a Run by id, scoped to `organization_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no such Run exists for this
    /// tenant, or [`StoreError::Io`] on a persistence failure.
    async fn get(&self, organization_id: OrganizationId, id: RunId) -> Result<Run, StoreError>;

    /// Lists Runs for a tenant matching `filter`, paginated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn list(
        &self,
        organization_id: OrganizationId,
        filter: RunFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Run>, StoreError>;

    /// Transitions a Run's status, enforcing the §4.1 state machine.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] for a disallowed edge, or
    /// [`StoreError::NotFound`] when the Run does not exist.
    async fn update_status(
        &self,
        organization_id: OrganizationId,
        id: RunId,
        new_status: RunStatus,
        error_message: Option<String>,
    ) -> Result<Run, StoreError>;

    /// Updates a Run's progress counters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn update_progress(
        &self,
        organization_id: OrganizationId,
        id: RunId,
        current: u64,
        total: u64,
        unit: Option<String>,
    ) -> Result<Run, StoreError>;

    /// Transitions a Run to `completed` and records its `results_summary`
    /// in one call (§4.4 step 8, §4.5 procedure completion).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] when the Run cannot reach
    /// `completed` from its current status.
    async fn complete(
        &self,
        organization_id: OrganizationId,
        id: RunId,
        results_summary: Json,
    ) -> Result<Run, StoreError>;

    /// Cancels every `pending`/`submitted` Run of `run_type` for an asset,
    /// returning the number cancelled (§4.3 duplicate-suppression
    /// cancellation path).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn cancel_pending_runs_for_asset(
        &self,
        organization_id: OrganizationId,
        asset_id: AssetId,
        run_type: RunType,
    ) -> Result<u32, StoreError>;

    /// Appends a log event to a Run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn append_log(
        &self,
        run_id: RunId,
        level: LogLevel,
        event_type: RunEventType,
        message: String,
        context: Json,
    ) -> Result<(), StoreError>;

    /// Reads a Run's log events in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn list_logs(&self, run_id: RunId) -> Result<Vec<RunLogEvent>, StoreError>;
}

// ============================================================================
// SECTION: RunGroup Store
// ============================================================================

/// RunGroup persistence (§4.2 C2).
#[async_trait]
pub trait RunGroupStore: Send + Sync {
    /// Creates a new group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn create_group(&self, group: RunGroup) -> Result<RunGroup, StoreError>;

    /// Fetches a group by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no such group exists.
    async fn get(&self, organization_id: OrganizationId, id: RunGroupId) -> Result<RunGroup, StoreError>;

    /// Links a child Run to a group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn add_child(&self, group_id: RunGroupId, child_run_id: RunId) -> Result<(), StoreError>;

    /// Sets (or raises) the expected child count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn set_expected_children(&self, group_id: RunGroupId, total: u32) -> Result<(), StoreError>;

    /// Atomically records a completed child and applies the completion
    /// check, returning the updated group when the count actually
    /// changed under contention (duplicate redeliveries leave the group
    /// untouched but still return it for idempotent callers).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn child_completed(&self, group_id: RunGroupId, now: DateTime<Utc>) -> Result<RunGroup, StoreError>;

    /// Atomically records a failed child and applies the completion check.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn child_failed(&self, group_id: RunGroupId, now: DateTime<Utc>) -> Result<RunGroup, StoreError>;

    /// Re-runs the completion check without a new child outcome (§4.2
    /// registration-race edge case).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn finalize_group(&self, group_id: RunGroupId, now: DateTime<Utc>) -> Result<RunGroup, StoreError>;

    /// Marks a group failed outright.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn mark_group_failed(
        &self,
        group_id: RunGroupId,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<RunGroup, StoreError>;

    /// Marks a group cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn mark_group_cancelled(
        &self,
        group_id: RunGroupId,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<RunGroup, StoreError>;
}

// ============================================================================
// SECTION: Object Store
// ============================================================================

/// Errors raised by an [`ObjectStore`] implementation.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// Underlying I/O error.
    #[error("object store io error: {0}")]
    Io(String),
    /// The requested object does not exist.
    #[error("object not found: {bucket}/{key}")]
    NotFound {
        /// Bucket name.
        bucket: String,
        /// Object key within the bucket.
        key: String,
    },
}

/// A bucket+key blob store (§6.3).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes `data` to `(bucket, key)`, overwriting any existing object
    /// (§5: object storage is an idempotent-overwrite content store).
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] on a write failure.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;

    /// Reads the full contents of `(bucket, key)`.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::NotFound`] when absent, or
    /// [`ObjectStoreError::Io`] on a read failure.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// Whether an object exists, without reading its contents.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] on a backend failure other than
    /// not-found.
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, ObjectStoreError>;
}

// ============================================================================
// SECTION: Work Dispatcher
// ============================================================================

/// A unit of background work handed to the worker pool (§5 Scheduling
/// model).
#[derive(Debug, Clone)]
pub struct WorkTask {
    /// The queue this task is routed to (see `forge-queue`'s registry).
    pub queue_type: String,
    /// The Run this task executes.
    pub run_id: RunId,
    /// Owning tenant.
    pub organization_id: OrganizationId,
}

/// Errors raised dispatching a [`WorkTask`].
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The target queue is unknown or disabled.
    #[error("dispatch rejected: {0}")]
    Rejected(String),
    /// The broker is unreachable.
    #[error("dispatch io error: {0}")]
    Io(String),
}

/// Routes [`WorkTask`]s to the worker pool. Producers (API handlers, crawl
/// orchestrator, SharePoint sync, SAM pull, the event bus, the cron
/// dispatcher, and the queue submitter) share one implementation (§5).
#[async_trait]
pub trait WorkDispatcher: Send + Sync {
    /// Enqueues a task for a worker to pick up.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the task cannot be routed.
    async fn dispatch(&self, task: WorkTask) -> Result<(), DispatchError>;
}
