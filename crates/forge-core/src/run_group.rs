// forge-core/src/run_group.rs
// ============================================================================
// Module: RunGroup
// Description: Parent/child fan-out tracker and completion detection.
// Purpose: Let a parent Run spawn N children and learn, exactly once, when
//          they have all reached a terminal state.
// Dependencies: chrono, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`RunGroup`] counts child outcomes as they arrive. [`RunGroup::record_completed`]
//! and [`RunGroup::record_failed`] are the only two mutators that move the
//! counters; [`RunGroup::completion`] tells the caller (the owning service,
//! see `forge-queue`) whether this arrival made the group terminal and, if
//! so, what to do about it (§4.2).

// ============================================================================
// SECTION: Imports
// ============================================================================

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

use crate::ids::OrganizationId;
use crate::ids::RunGroupId;
use crate::ids::RunId;

// ============================================================================
// SECTION: Group Status
// ============================================================================

/// Lifecycle status of a [`RunGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Created, no children registered yet.
    Pending,
    /// At least one child outstanding.
    Running,
    /// Terminal: some children completed, some failed.
    Partial,
    /// Terminal: all children completed.
    Completed,
    /// Terminal: all children failed, or the parent died.
    Failed,
    /// Terminal: the parent (or an operator) cancelled the group.
    Cancelled,
}

impl GroupStatus {
    /// Returns true for the statuses a group cannot leave.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Partial | Self::Completed | Self::Failed | Self::Cancelled)
    }
}

// ============================================================================
// SECTION: RunGroup
// ============================================================================

/// Parent/child fan-out aggregator.
///
/// Invariant: `completed_children + failed_children <= total_children`; the
/// group is terminal iff they are equal and `total_children > 0`, or it was
/// explicitly finalized with zero children (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunGroup {
    /// Primary identifier.
    pub id: RunGroupId,
    /// Owning tenant.
    pub organization_id: OrganizationId,
    /// Caller-defined label identifying what kind of fan-out this is (e.g.
    /// `"bulk_extraction"`); used to build the `{group_type}.group_completed`
    /// event name.
    pub group_type: String,
    /// The run that spawned this group, when there is one.
    pub parent_run_id: Option<RunId>,
    /// Current lifecycle status.
    pub status: GroupStatus,
    /// Expected number of children. May be set after children already
    /// started arriving (§4.2 registration race).
    pub total_children: u32,
    /// Children that reached `completed`.
    pub completed_children: u32,
    /// Children that reached `failed`, `timed_out`, or `cancelled`.
    pub failed_children: u32,
    /// Post-group trigger configuration (e.g. `after_procedure_slug`).
    pub config: Json,
    /// Opaque summary set on finalization.
    pub results_summary: Option<Json>,
    /// Creation timestamp.
    pub started_at: DateTime<Utc>,
    /// Terminal timestamp.
    pub completed_at: Option<DateTime<Utc>>,
}

/// The outcome of recording a child result, returned so the caller (which
/// owns event emission and follow-on run creation) can act without this
/// module reaching back out to I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupCompletion {
    /// The group still has outstanding children.
    StillRunning,
    /// This arrival made the group terminal. Carries the final status so
    /// the caller can decide whether to fire `after_procedure_slug`.
    JustCompleted(GroupStatus),
    /// The group was already terminal; this arrival was a duplicate or
    /// late redelivery and changed nothing.
    AlreadyTerminal,
}

impl RunGroup {
    /// Creates a new group in `pending` with the given expected child
    /// count. Pass `0` and call [`RunGroup::finalize`] immediately for
    /// groups that may spawn zero children (§4.2 edge case).
    #[must_use]
    pub fn new(
        organization_id: OrganizationId,
        group_type: impl Into<String>,
        parent_run_id: Option<RunId>,
        config: Json,
        total_children: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RunGroupId::new(),
            organization_id,
            group_type: group_type.into(),
            parent_run_id,
            status: GroupStatus::Pending,
            total_children,
            completed_children: 0,
            failed_children: 0,
            config,
            results_summary: None,
            started_at: now,
            completed_at: None,
        }
    }

    /// Sets (or raises) the expected child count. Used when children are
    /// spawned incrementally and the final count is only known once
    /// enqueuing finishes.
    pub fn set_expected_children(&mut self, total: u32) {
        self.total_children = total;
    }

    /// Returns false once the group can no longer usefully receive more
    /// children (§4.2 spawn gating): a parent that already failed or was
    /// cancelled must not keep enqueuing work that will be orphaned.
    #[must_use]
    pub const fn should_spawn_children(&self) -> bool {
        !matches!(self.status, GroupStatus::Failed | GroupStatus::Cancelled)
    }

    /// Records a completed child and checks for group completion.
    pub fn record_completed(&mut self, now: DateTime<Utc>) -> GroupCompletion {
        if self.status.is_terminal() {
            return GroupCompletion::AlreadyTerminal;
        }
        self.completed_children += 1;
        self.status = GroupStatus::Running;
        self.check_completion(now)
    }

    /// Records a failed child and checks for group completion.
    pub fn record_failed(&mut self, now: DateTime<Utc>) -> GroupCompletion {
        if self.status.is_terminal() {
            return GroupCompletion::AlreadyTerminal;
        }
        self.failed_children += 1;
        self.status = GroupStatus::Running;
        self.check_completion(now)
    }

    /// Finalizes the group immediately, used for the `total_children == 0`
    /// edge case and for the post-registration re-check race described in
    /// §4.2: once a parent finishes registering children, it must call
    /// this even if no new child outcome just arrived, so that children
    /// which completed before registration finished are not stranded.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> GroupCompletion {
        if self.status.is_terminal() {
            return GroupCompletion::AlreadyTerminal;
        }
        if self.total_children == 0 {
            self.status = GroupStatus::Completed;
            self.completed_at = Some(now);
            return GroupCompletion::JustCompleted(self.status);
        }
        self.check_completion(now)
    }

    /// Marks the group `failed` outright (parent died, operator abort).
    /// This disables further spawns via [`RunGroup::should_spawn_children`]
    /// and suppresses the post-group trigger.
    pub fn mark_failed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = GroupStatus::Failed;
        self.completed_at = Some(now);
        self.results_summary = Some(serde_json::json!({ "reason": reason.into() }));
    }

    /// Marks the group `cancelled` (cooperative cancellation, §5).
    pub fn mark_cancelled(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = GroupStatus::Cancelled;
        self.completed_at = Some(now);
        self.results_summary = Some(serde_json::json!({ "reason": reason.into() }));
    }

    /// Core completion check shared by the child-outcome and finalize
    /// paths: `completed + failed == total && total > 0`.
    fn check_completion(&mut self, now: DateTime<Utc>) -> GroupCompletion {
        let settled = self.completed_children + self.failed_children;
        if self.total_children == 0 || settled < self.total_children {
            return GroupCompletion::StillRunning;
        }
        let status = if self.failed_children == 0 {
            GroupStatus::Completed
        } else if self.completed_children == 0 {
            GroupStatus::Failed
        } else {
            GroupStatus::Partial
        };
        self.status = status;
        self.completed_at = Some(now);
        self.results_summary = Some(serde_json::json!({
            "total": self.total_children,
            "completed": self.completed_children,
            "failed": self.failed_children,
        }));
        GroupCompletion::JustCompleted(status)
    }

    /// The event name fired exactly once on terminal transition, per §4.2:
    /// `{group_type}.group_completed`.
    #[must_use]
    pub fn completion_event_name(&self) -> String {
        format!("{}.group_completed", self.group_type)
    }

    /// Whether `config` names a follow-on procedure to run after this
    /// group settles, and the terminal status is eligible (`completed` or
    /// `partial`; an outright `failed` group never spawns a follow-on).
    #[must_use]
    pub fn follow_on_procedure_slug(&self) -> Option<&str> {
        if !matches!(self.status, GroupStatus::Completed | GroupStatus::Partial) {
            return None;
        }
        self.config.get("after_procedure_slug")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        DateTime::<Utc>::from_timestamp(0, 0).unwrap()
    }

    fn group(total: u32) -> RunGroup {
        RunGroup::new(OrganizationId::new(), "bulk_extraction", None, serde_json::json!({}), total, now())
    }

    #[test]
    fn two_complete_one_fail_of_three_is_partial() {
        let mut group = group(3);
        assert_eq!(group.record_completed(now()), GroupCompletion::StillRunning);
        assert_eq!(group.record_completed(now()), GroupCompletion::StillRunning);
        assert_eq!(
            group.record_failed(now()),
            GroupCompletion::JustCompleted(GroupStatus::Partial)
        );
        assert_eq!(group.completed_children + group.failed_children, group.total_children);
    }

    #[test]
    fn all_complete_is_completed() {
        let mut group = group(2);
        assert_eq!(group.record_completed(now()), GroupCompletion::StillRunning);
        assert_eq!(
            group.record_completed(now()),
            GroupCompletion::JustCompleted(GroupStatus::Completed)
        );
    }

    #[test]
    fn all_fail_is_failed() {
        let mut group = group(2);
        assert_eq!(group.record_failed(now()), GroupCompletion::StillRunning);
        assert_eq!(
            group.record_failed(now()),
            GroupCompletion::JustCompleted(GroupStatus::Failed)
        );
    }

    #[test]
    fn zero_children_finalizes_immediately() {
        let mut group = group(0);
        assert_eq!(
            group.finalize(now()),
            GroupCompletion::JustCompleted(GroupStatus::Completed)
        );
    }

    #[test]
    fn late_redelivery_after_terminal_is_noop() {
        let mut group = group(1);
        assert_eq!(
            group.record_completed(now()),
            GroupCompletion::JustCompleted(GroupStatus::Completed)
        );
        assert_eq!(group.record_completed(now()), GroupCompletion::AlreadyTerminal);
        assert_eq!(group.completed_children, 1);
    }

    #[test]
    fn finalize_after_registration_catches_early_children() {
        // Children complete before the parent finishes registering the
        // expected count; finalize() re-runs the check once registration
        // is done.
        let mut group = group(0);
        group.total_children = 1;
        group.completed_children = 1;
        assert_eq!(
            group.finalize(now()),
            GroupCompletion::JustCompleted(GroupStatus::Completed)
        );
    }

    #[test]
    fn failed_group_disables_further_spawns() {
        let mut group = group(2);
        group.mark_failed("parent died", now());
        assert!(!group.should_spawn_children());
    }

    #[test]
    fn failed_outright_has_no_follow_on() {
        let mut group = group(2);
        group.config = serde_json::json!({"after_procedure_slug": "notify"});
        group.mark_failed("parent died", now());
        assert_eq!(group.follow_on_procedure_slug(), None);
    }

    #[test]
    fn partial_group_fires_follow_on() {
        let mut group = group(2);
        group.config = serde_json::json!({"after_procedure_slug": "notify"});
        group.record_completed(now());
        group.record_failed(now());
        assert_eq!(group.follow_on_procedure_slug(), Some("notify"));
    }
}
