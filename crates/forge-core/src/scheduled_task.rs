// forge-core/src/scheduled_task.rs
// ============================================================================
// Module: Scheduled Task
// Description: Cron-driven Run factory configuration.
// Purpose: Model the row the dispatcher (forge-scheduler) polls and
//          advances; no cron parsing happens here.
// Dependencies: chrono, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`ScheduledTask`] is pure configuration plus last-run bookkeeping.
//! Computing `next_run_at` from `schedule_expression` requires a cron
//! parser and lives in `forge-scheduler`; this module only records the
//! result.

// ============================================================================
// SECTION: Imports
// ============================================================================

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

use crate::ids::OrganizationId;
use crate::ids::RunId;
use crate::run::RunStatus;

// ============================================================================
// SECTION: Scope
// ============================================================================

/// Whether a task applies to one organization or runs globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    /// Applies across every tenant.
    Global,
    /// Applies to a single tenant, named by `organization_id`.
    Organization,
}

// ============================================================================
// SECTION: ScheduledTask
// ============================================================================

/// Cron-driven Run factory (§3 ScheduledTask).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Unique name.
    pub name: String,
    /// Caller-defined task kind, used to pick the materialised Run's type.
    pub task_type: String,
    /// 5-field cron expression.
    pub schedule_expression: String,
    /// Whether the dispatcher evaluates this task at all.
    pub enabled: bool,
    /// Global vs. single-tenant scope.
    pub scope_type: ScopeType,
    /// Owning tenant, required when `scope_type == Organization`.
    pub organization_id: Option<OrganizationId>,
    /// Opaque task-specific configuration passed to the materialised Run.
    pub config: Json,
    /// The most recently materialised Run, if any.
    pub last_run_id: Option<RunId>,
    /// When the most recent Run was materialised.
    pub last_run_at: Option<DateTime<Utc>>,
    /// The most recent Run's terminal status.
    pub last_run_status: Option<RunStatus>,
    /// Next time the dispatcher should materialise a Run; `None` when
    /// `enabled == false`.
    pub next_run_at: Option<DateTime<Utc>>,
}

impl ScheduledTask {
    /// Whether the dispatcher should fire this task at `now` (§4.6: every
    /// enabled row with `next_run_at <= now`).
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run_at.is_some_and(|next| next <= now)
    }

    /// Disables the task, clearing `next_run_at` per §4.6 ("a task with
    /// `enabled = false` has `next_run_at = null`").
    pub fn disable(&mut self) {
        self.enabled = false;
        self.next_run_at = None;
    }

    /// Enables the task, arming it with the given next fire time.
    pub fn enable(&mut self, next_run_at: DateTime<Utc>) {
        self.enabled = true;
        self.next_run_at = Some(next_run_at);
    }

    /// Records that a Run was materialised for this task and advances
    /// `next_run_at` to the caller-recomputed time, matching the §5
    /// restart-safety requirement that the advance commits atomically
    /// with Run creation.
    pub fn record_dispatch(&mut self, run_id: RunId, now: DateTime<Utc>, next_run_at: DateTime<Utc>) {
        self.last_run_id = Some(run_id);
        self.last_run_at = Some(now);
        self.next_run_at = Some(next_run_at);
    }

    /// Records the outcome of a previously dispatched Run.
    pub fn record_outcome(&mut self, status: RunStatus) {
        self.last_run_status = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> ScheduledTask {
        ScheduledTask {
            name: "nightly-maintenance".to_string(),
            task_type: "system_maintenance".to_string(),
            schedule_expression: "0 2 * * *".to_string(),
            enabled: true,
            scope_type: ScopeType::Global,
            organization_id: None,
            config: serde_json::json!({}),
            last_run_id: None,
            last_run_at: None,
            last_run_status: None,
            next_run_at: None,
        }
    }

    fn epoch() -> DateTime<Utc> {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        DateTime::<Utc>::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn disabled_task_is_never_due() {
        let mut task = task();
        task.next_run_at = Some(epoch());
        task.disable();
        assert!(!task.is_due(epoch()));
        assert_eq!(task.next_run_at, None);
    }

    #[test]
    fn due_when_next_run_at_has_passed() {
        let mut task = task();
        task.next_run_at = Some(epoch());
        assert!(task.is_due(epoch()));
    }

    #[test]
    fn record_dispatch_advances_next_run_and_sets_last_run() {
        let mut task = task();
        let run_id = RunId::new();
        let later = epoch() + chrono::Duration::hours(24);
        task.record_dispatch(run_id, epoch(), later);
        assert_eq!(task.last_run_id, Some(run_id));
        assert_eq!(task.next_run_at, Some(later));
    }
}
