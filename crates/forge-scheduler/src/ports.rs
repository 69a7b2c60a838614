// forge-scheduler/src/ports.rs
// ============================================================================
// Module: Scheduler Ports
// Description: Persistence traits this crate needs beyond the Run interface
//              forge-core already defines and the procedure-trigger
//              interface forge-executor already defines.
// Purpose: ScheduledTask rows and the cross-procedure trigger index are
//          primarily owned and mutated here, so their store interfaces
//          live next to their one real caller.
// Dependencies: async-trait, forge-core
// ============================================================================

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use forge_core::ids::OrganizationId;
use forge_core::ids::RunId;
use forge_core::interfaces::StoreError;
use forge_core::procedure::ProcedureDefinition;
use forge_core::run::RunStatus;
use forge_core::scheduled_task::ScheduledTask;

/// `ScheduledTask` persistence, the slice C6 needs.
#[async_trait]
pub trait ScheduledTaskStore: Send + Sync {
    /// Lists every enabled task with `next_run_at <= now` (§4.6).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>, StoreError>;

    /// Fetches a task by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no such task exists.
    async fn get(&self, name: &str) -> Result<ScheduledTask, StoreError>;

    /// Lists every task, for the admin CRUD surface (§6.1).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn list(&self) -> Result<Vec<ScheduledTask>, StoreError>;

    /// Creates a new task, rejecting an invalid cron expression before
    /// persisting (§4.6).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure, including a
    /// duplicate name.
    async fn create(&self, task: ScheduledTask) -> Result<ScheduledTask, StoreError>;

    /// Atomically creates the materialised Run and advances `next_run_at`,
    /// `last_run_id`, `last_run_at` in one commit so a concurrent dispatcher
    /// tick cannot re-materialise the same task (§5 Restart safety).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn dispatch(&self, name: &str, run: forge_core::run::Run, next_run_at: Option<DateTime<Utc>>) -> Result<forge_core::run::Run, StoreError>;

    /// Records the terminal status of a previously dispatched Run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn record_outcome(&self, name: &str, run_id: RunId, status: RunStatus) -> Result<(), StoreError>;

    /// Enables a task, arming `next_run_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no such task exists.
    async fn enable(&self, name: &str, next_run_at: DateTime<Utc>) -> Result<ScheduledTask, StoreError>;

    /// Disables a task, clearing `next_run_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no such task exists.
    async fn disable(&self, name: &str) -> Result<ScheduledTask, StoreError>;
}

/// A procedure matched by the event bus, paired with the slug it lives
/// under so a fired trigger can be written back through
/// [`forge_executor::ports::ProcedureStore::save_triggers`].
#[derive(Debug, Clone)]
pub struct EventMatch {
    /// The owning procedure's slug.
    pub slug: String,
    /// The full definition, so dispatch can read `procedure_slug`/
    /// `procedure_version` and the matched trigger can be found again by
    /// id within `definition.triggers`.
    pub definition: ProcedureDefinition,
    /// Id of the specific trigger that matched, within `definition.triggers`.
    pub trigger_id: forge_core::ids::TriggerId,
}

/// Finds every procedure with an active `event` trigger for a given event
/// name, across an entire tenant (§4.7). [`forge_executor::ports::ProcedureStore`]
/// only resolves one procedure at a time by slug, so the event bus needs
/// this wider index instead.
#[async_trait]
pub trait EventTriggerIndex: Send + Sync {
    /// Lists every procedure in `organization_id` carrying at least one
    /// active trigger of type `event` named `event_name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure.
    async fn find_by_event_name(&self, organization_id: OrganizationId, event_name: &str) -> Result<Vec<EventMatch>, StoreError>;
}
