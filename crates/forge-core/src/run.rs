// forge-core/src/run.rs
// ============================================================================
// Module: Run
// Description: The universal execution record and its status lifecycle.
// Purpose: Give every background activity (extraction, procedure, crawl, sync,
//          pull, scheduled task) one append-only record with a strict status
//          machine so progress and failure can be reasoned about uniformly.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A [`Run`] is created in [`RunStatus::Pending`] and may only move along the
//! edges described in [`RunStatus::validate_transition`]. Any other edge is a
//! bug and is reported as [`TransitionError::InvalidTransition`] rather than
//! silently coerced.

// ============================================================================
// SECTION: Imports
// ============================================================================

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;
use thiserror::Error;

use crate::ids::AssetId;
use crate::ids::OrganizationId;
use crate::ids::RunGroupId;
use crate::ids::RunId;
use crate::ids::TraceId;
use crate::ids::UserId;

// ============================================================================
// SECTION: Run Type / Origin
// ============================================================================

/// Discriminates the kind of background work a [`Run`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    /// A single asset extraction attempt.
    Extraction,
    /// A second-pass, higher-fidelity extraction.
    ExtractionEnhancement,
    /// A procedure (declarative step graph) execution.
    Procedure,
    /// A pipeline execution (a named chain of procedures).
    Pipeline,
    /// A web crawl over a scrape collection.
    Scrape,
    /// A SharePoint folder synchronization.
    SharepointSync,
    /// A SAM.gov opportunity feed pull.
    SamPull,
    /// A background maintenance task (cleanup, re-index, etc.).
    SystemMaintenance,
    /// A search-index ingestion.
    Indexing,
}

/// Records what caused a [`Run`] to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOrigin {
    /// Created directly in response to a user request.
    User,
    /// Created by internal system logic (e.g. an enhancement follow-on).
    System,
    /// Created by the scheduled-task dispatcher.
    Scheduled,
    /// Created by the event bus in response to a matching trigger.
    Event,
    /// Created as a child of a [`crate::run_group::RunGroup`] fan-out.
    Group,
}

// ============================================================================
// SECTION: Status Machine
// ============================================================================

/// The strict status lifecycle shared by every [`Run`].
///
/// ```text
/// pending ──► running ──► completed
///    │           ├────► failed
///    │           ├────► timed_out
///    │           └────► cancelled
///    ├────► cancelled     (pre-start cancel)
///    └────► submitted ──► running   (queue-mediated paths only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not yet dispatched to a worker.
    Pending,
    /// Dispatched to a worker by a queue submitter, not yet executing.
    Submitted,
    /// Actively executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Exceeded its queue's configured wall-clock budget.
    TimedOut,
    /// Cancelled before or during execution.
    Cancelled,
}

impl RunStatus {
    /// Returns true for any status a [`Run`] cannot leave.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    /// Validates a proposed status transition against the §4.1 state
    /// machine.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::InvalidTransition`] when `to` is not
    /// reachable from `self` in one step.
    pub fn validate_transition(self, to: Self) -> Result<(), TransitionError> {
        let allowed = match self {
            Self::Pending => matches!(to, Self::Running | Self::Cancelled | Self::Submitted),
            Self::Submitted => matches!(to, Self::Running | Self::Cancelled),
            Self::Running => matches!(
                to,
                Self::Completed | Self::Failed | Self::Cancelled | Self::TimedOut
            ),
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from: self, to })
        }
    }
}

/// Errors raised while driving the [`Run`] status machine.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// The requested edge does not exist in the state machine.
    #[error("invalid run status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// The status the run was in.
        from: RunStatus,
        /// The status that was requested.
        to: RunStatus,
    },
    /// A `failed` transition was requested without an error message.
    #[error("failed transition requires a non-empty error_message")]
    MissingErrorMessage,
}

// ============================================================================
// SECTION: Progress
// ============================================================================

/// Progress counters reported by a running worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Units of work completed so far.
    pub current: u64,
    /// Total units of work, when known.
    pub total: u64,
    /// Unit label (e.g. `"pages"`, `"files"`).
    pub percent: u8,
}

impl Progress {
    /// Builds a progress snapshot, computing `percent` as
    /// `min(100, floor(100 * current / total))`, or `0` when `total == 0`.
    ///
    /// Percentages never go backward is a caller-level invariant (§7); this
    /// constructor only guarantees the formula, not monotonicity across
    /// calls.
    #[must_use]
    pub fn new(current: u64, total: u64) -> Self {
        let percent = if total > 0 {
            let pct = (100u64 * current) / total;
            u8::try_from(pct.min(100)).unwrap_or(100)
        } else {
            0
        };
        Self {
            current,
            total,
            percent,
        }
    }
}

// ============================================================================
// SECTION: Run
// ============================================================================

/// The universal execution record used by every background activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Primary identifier.
    pub id: RunId,
    /// Owning tenant. Every read, write, or trigger is scoped by this field.
    pub organization_id: OrganizationId,
    /// What kind of work this run performs.
    pub run_type: RunType,
    /// What caused the run to be created.
    pub origin: RunOrigin,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Opaque input configuration for the run.
    pub config: Json,
    /// Assets this run consumes, if any.
    pub input_asset_ids: Vec<AssetId>,
    /// Progress counters, when reported.
    pub progress: Option<Progress>,
    /// Unit label for `progress` (e.g. `"pages"`, `"files"`).
    pub progress_unit: Option<String>,
    /// Opaque summary of the run's results, set on completion.
    pub results_summary: Option<Json>,
    /// Error message, set on failure.
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the first `pending -> running` (or `submitted ->
    /// running`) transition.
    pub started_at: Option<DateTime<Utc>>,
    /// Timestamp of the terminal transition.
    pub completed_at: Option<DateTime<Utc>>,
    /// Principal that requested the run, when known.
    pub created_by: Option<UserId>,
    /// Owning [`crate::run_group::RunGroup`], when this run is a fan-out
    /// child.
    pub group_id: Option<RunGroupId>,
    /// True when this run is the parent that spawned a `RunGroup`.
    pub is_group_parent: bool,
    /// Root of the trace this run belongs to. Set to `id` the first time a
    /// run without a trace is executed by the procedure executor (§4.1).
    pub trace_id: Option<TraceId>,
    /// Procedure slug, when `run_type` is `procedure` or `pipeline`.
    pub procedure_slug: Option<String>,
    /// Procedure version, when `run_type` is `procedure` or `pipeline`.
    pub procedure_version: Option<u32>,
}

impl Run {
    /// Creates a new `pending` run. Callers persist the result through a
    /// [`crate::interfaces::RunStore`]; this constructor performs no I/O.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "mirrors the Run record's own field count")]
    pub fn new(
        organization_id: OrganizationId,
        run_type: RunType,
        origin: RunOrigin,
        config: Json,
        input_asset_ids: Vec<AssetId>,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RunId::new(),
            organization_id,
            run_type,
            origin,
            status: RunStatus::Pending,
            config,
            input_asset_ids,
            progress: None,
            progress_unit: None,
            results_summary: None,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            created_by,
            group_id: None,
            is_group_parent: false,
            trace_id: None,
            procedure_slug: None,
            procedure_version: None,
        }
    }

    /// Applies a validated status transition, stamping `started_at` /
    /// `completed_at` as required by §4.1.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the edge is not legal, or when
    /// `to == Failed` and `error_message` is empty.
    pub fn transition(
        &mut self,
        to: RunStatus,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.status.validate_transition(to)?;
        if to == RunStatus::Failed {
            let message = error_message
                .as_deref()
                .filter(|message| !message.is_empty())
                .ok_or(TransitionError::MissingErrorMessage)?;
            self.error_message = Some(message.to_string());
        }
        if to == RunStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = to;
        Ok(())
    }

    /// Updates progress counters, recomputing `percent` per [`Progress::new`].
    pub fn update_progress(&mut self, current: u64, total: u64, unit: impl Into<String>) {
        self.progress = Some(Progress::new(current, total));
        self.progress_unit = Some(unit.into());
    }

    /// Sets the trace id to the run's own id if it has none, making this run
    /// the root of its trace (§4.1).
    pub fn ensure_trace_root(&mut self) {
        if self.trace_id.is_none() {
            self.trace_id = Some(self.id);
        }
    }
}

// ============================================================================
// SECTION: Log Events
// ============================================================================

/// Severity of a [`RunLogEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Informational progress.
    Info,
    /// A recoverable problem worth surfacing.
    Warn,
    /// A fatal or noteworthy failure.
    Error,
}

/// Structural category of a [`RunLogEvent`], used by clients to render
/// timelines without parsing `message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventType {
    /// The run began executing.
    Start,
    /// A progress update.
    Progress,
    /// A procedure step began.
    StepStart,
    /// A procedure step finished.
    StepComplete,
    /// A procedure step raised an error.
    StepError,
    /// A side-effecting function was invoked (governance audit trail).
    Governance,
    /// A side-effecting function was blocked by an exposure check.
    GovernanceViolation,
    /// The run was resumed after a worker restart.
    Restart,
    /// A terminal summary.
    Summary,
}

/// One entry in a run's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEvent {
    /// Owning run.
    pub run_id: RunId,
    /// Severity.
    pub level: LogLevel,
    /// Structural category.
    pub event_type: RunEventType,
    /// Human-readable message.
    pub message: String,
    /// Opaque structured context.
    pub context: Json,
    /// Creation timestamp. Per-run ordering on read is by this field, with
    /// insertion order as the tiebreaker.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        DateTime::<Utc>::from_timestamp(0, 0).unwrap()
    }

    fn new_run() -> Run {
        Run::new(
            OrganizationId::new(),
            RunType::Extraction,
            RunOrigin::System,
            Json::Null,
            Vec::new(),
            None,
            now(),
        )
    }

    #[test]
    fn pending_to_running_sets_started_at() {
        let mut run = new_run();
        run.transition(RunStatus::Running, None, now()).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.started_at, Some(now()));
    }

    #[test]
    fn running_to_completed_sets_completed_at_and_is_terminal() {
        let mut run = new_run();
        run.transition(RunStatus::Running, None, now()).unwrap();
        run.transition(RunStatus::Completed, None, now()).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.completed_at.is_some());
        assert!(run.status.is_terminal());
    }

    #[test]
    fn completed_to_anything_is_rejected() {
        let mut run = new_run();
        run.transition(RunStatus::Running, None, now()).unwrap();
        run.transition(RunStatus::Completed, None, now()).unwrap();
        let err = run.transition(RunStatus::Running, None, now()).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn failed_requires_error_message() {
        let mut run = new_run();
        run.transition(RunStatus::Running, None, now()).unwrap();
        let err = run.transition(RunStatus::Failed, None, now()).unwrap_err();
        assert!(matches!(err, TransitionError::MissingErrorMessage));
    }

    #[test]
    fn pending_can_bypass_submitted_directly_to_running() {
        let mut run = new_run();
        run.transition(RunStatus::Running, None, now()).unwrap();
        assert_eq!(run.status, RunStatus::Running);
    }

    #[test]
    fn submitted_then_running_is_allowed() {
        let mut run = new_run();
        run.transition(RunStatus::Submitted, None, now()).unwrap();
        run.transition(RunStatus::Running, None, now()).unwrap();
        assert_eq!(run.status, RunStatus::Running);
    }

    #[test]
    fn pending_can_cancel_directly() {
        let mut run = new_run();
        run.transition(RunStatus::Cancelled, None, now()).unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
    }

    #[test]
    fn progress_percent_caps_at_100() {
        let progress = Progress::new(150, 100);
        assert_eq!(progress.percent, 100);
    }

    #[test]
    fn progress_percent_is_zero_for_zero_total() {
        let progress = Progress::new(5, 0);
        assert_eq!(progress.percent, 0);
    }

    #[test]
    fn ensure_trace_root_is_idempotent() {
        let mut run = new_run();
        run.ensure_trace_root();
        let first = run.trace_id;
        run.ensure_trace_root();
        assert_eq!(run.trace_id, first);
        assert_eq!(run.trace_id, Some(run.id));
    }
}
