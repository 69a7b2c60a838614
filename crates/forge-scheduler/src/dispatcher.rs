// forge-scheduler/src/dispatcher.rs
// ============================================================================
// Module: Scheduled-Task Dispatcher
// Description: The periodic beat that materialises Runs from due
//              ScheduledTasks (§4.6 C6).
// Purpose: Evaluate every enabled task with `next_run_at <= now`, create its
//          Run, hand it to a worker, and recompute the task's next fire
//          time — all inside one atomic commit per task so a concurrent
//          tick cannot double-fire it.
// Dependencies: chrono, forge-core, tracing
// ============================================================================

//! ## Overview
//! [`TaskDispatcher::tick`] is the whole of C6. It is driven by an external
//! beat (a timer, a cron-triggered process, whatever the deployment
//! chooses) that calls it with the current time; the dispatcher itself
//! holds no clock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use forge_core::ids::OrganizationId;
use forge_core::ids::RunId;
use forge_core::interfaces::DispatchError;
use forge_core::interfaces::RunStore;
use forge_core::interfaces::StoreError;
use forge_core::interfaces::WorkDispatcher;
use forge_core::interfaces::WorkTask;
use forge_core::run::Run;
use forge_core::run::RunOrigin;
use forge_core::run::RunStatus;
use forge_core::run::RunType;
use forge_core::scheduled_task::ScheduledTask;
use thiserror::Error;

use crate::cron_util;
use crate::cron_util::InvalidCronExpression;
use crate::ports::ScheduledTaskStore;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures from a dispatcher tick or a task mutation.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A task's cron expression is malformed.
    #[error(transparent)]
    Cron(#[from] InvalidCronExpression),
    /// The work broker rejected or could not reach a dispatch.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

// ============================================================================
// SECTION: Task Dispatcher
// ============================================================================

/// Which queue `forge-queue`-style workers drain dispatched ScheduledTask
/// runs from.
const MAINTENANCE_QUEUE: &str = "maintenance";

/// Materialises and dispatches due [`ScheduledTask`]s.
pub struct TaskDispatcher {
    /// ScheduledTask persistence.
    tasks: Arc<dyn ScheduledTaskStore>,
    /// Run persistence.
    runs: Arc<dyn RunStore>,
    /// Worker broker a materialised Run is handed to.
    broker: Arc<dyn WorkDispatcher>,
}

impl TaskDispatcher {
    /// Builds a dispatcher over its three collaborators.
    #[must_use]
    pub fn new(tasks: Arc<dyn ScheduledTaskStore>, runs: Arc<dyn RunStore>, broker: Arc<dyn WorkDispatcher>) -> Self {
        Self { tasks, runs, broker }
    }

    /// Evaluates every due task at `now`, returning the Runs it
    /// materialised. A single task's failure (bad cron, store error) is
    /// logged and skipped rather than aborting the whole tick.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] only when listing due tasks itself fails;
    /// per-task failures are swallowed and logged.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<RunId>, SchedulerError> {
        let due = self.tasks.list_due(now).await?;
        let mut dispatched = Vec::with_capacity(due.len());
        for task in due {
            match self.dispatch_one(&task, now).await {
                Ok(run_id) => dispatched.push(run_id),
                Err(error) => {
                    tracing::warn!(task = %task.name, error = %error, "scheduled task dispatch failed");
                }
            }
        }
        Ok(dispatched)
    }

    /// Manually fires one task regardless of `next_run_at`, as the
    /// `trigger-now` admin action does (§6.1). Always uses `origin = user`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] when the task is unknown, its cron
    /// expression is malformed, or dispatch fails.
    pub async fn trigger_now(&self, name: &str, triggering_org: OrganizationId, now: DateTime<Utc>) -> Result<RunId, SchedulerError> {
        let task = self.tasks.get(name).await?;
        self.materialise(&task, triggering_org, RunOrigin::User, now).await
    }

    /// Dispatches one due task with `origin = scheduled`, using the task's
    /// own organization (global tasks use a nil-equivalent org carried in
    /// their Run config only — materialisation always needs a concrete
    /// tenant, so a global task without an explicit organization is
    /// rejected rather than guessed at).
    async fn dispatch_one(&self, task: &ScheduledTask, now: DateTime<Utc>) -> Result<RunId, SchedulerError> {
        let Some(organization_id) = task.organization_id else {
            return Err(SchedulerError::Store(StoreError::Constraint(format!(
                "global task {:?} has no organization_id to dispatch a scheduled run under; manual trigger must supply one",
                task.name
            ))));
        };
        self.materialise(task, organization_id, RunOrigin::Scheduled, now).await
    }

    /// Shared materialise-then-dispatch path for both the periodic beat and
    /// manual triggering.
    async fn materialise(&self, task: &ScheduledTask, organization_id: OrganizationId, origin: RunOrigin, now: DateTime<Utc>) -> Result<RunId, SchedulerError> {
        let run_type = run_type_for_task(&task.task_type);
        let run = Run::new(organization_id, run_type, origin, task.config.clone(), Vec::new(), None, now);
        let run_id = run.id;
        let run = self.runs.create(run).await?;

        let next_run_at = cron_util::next_fire_time(&task.schedule_expression, now)?;
        self.tasks.dispatch(&task.name, run, next_run_at).await?;

        self.broker
            .dispatch(WorkTask {
                queue_type: MAINTENANCE_QUEUE.to_string(),
                run_id,
                organization_id,
            })
            .await?;
        Ok(run_id)
    }

    /// Records a worker's outcome for a dispatched task run (bookkeeping
    /// only; the Run's own status is the source of truth).
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] on a persistence failure.
    pub async fn record_outcome(&self, name: &str, run_id: RunId, status: RunStatus) -> Result<(), SchedulerError> {
        self.tasks.record_outcome(name, run_id, status).await?;
        Ok(())
    }
}

/// Maps a task's declared `task_type` to the Run variant it materialises
/// (§4.6: "the task's declared type"). Unrecognised values fall back to
/// `system_maintenance`, the type every ScheduledTask seed in the corpus
/// actually uses.
fn run_type_for_task(task_type: &str) -> RunType {
    serde_json::from_value(serde_json::Value::String(task_type.to_string())).unwrap_or(RunType::SystemMaintenance)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use forge_core::interfaces::RunFilter;
    use forge_core::run::LogLevel;
    use forge_core::run::RunEventType;
    use forge_core::run::RunLogEvent;
    use forge_core::scheduled_task::ScopeType;

    use super::*;

    struct MemoryTaskStore {
        tasks: Mutex<BTreeMap<String, ScheduledTask>>,
    }

    #[async_trait]
    impl ScheduledTaskStore for MemoryTaskStore {
        async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>, StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only in-memory mutex is never poisoned")]
            let tasks = self.tasks.lock().unwrap();
            Ok(tasks.values().filter(|task| task.is_due(now)).cloned().collect())
        }

        async fn get(&self, name: &str) -> Result<ScheduledTask, StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only in-memory mutex is never poisoned")]
            let tasks = self.tasks.lock().unwrap();
            tasks.get(name).cloned().ok_or_else(|| StoreError::NotFound(name.to_string()))
        }

        async fn list(&self) -> Result<Vec<ScheduledTask>, StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only in-memory mutex is never poisoned")]
            let tasks = self.tasks.lock().unwrap();
            Ok(tasks.values().cloned().collect())
        }

        async fn create(&self, task: ScheduledTask) -> Result<ScheduledTask, StoreError> {
            cron_util::validate(&task.schedule_expression).map_err(|error| StoreError::Constraint(error.to_string()))?;
            #[allow(clippy::unwrap_used, reason = "test-only in-memory mutex is never poisoned")]
            let mut tasks = self.tasks.lock().unwrap();
            tasks.insert(task.name.clone(), task.clone());
            Ok(task)
        }

        async fn dispatch(&self, name: &str, run: Run, next_run_at: Option<DateTime<Utc>>) -> Result<Run, StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only in-memory mutex is never poisoned")]
            let mut tasks = self.tasks.lock().unwrap();
            let task = tasks.get_mut(name).ok_or_else(|| StoreError::NotFound(name.to_string()))?;
            task.last_run_id = Some(run.id);
            task.last_run_at = Some(run.created_at);
            task.next_run_at = next_run_at;
            Ok(run)
        }

        async fn record_outcome(&self, name: &str, _run_id: RunId, status: RunStatus) -> Result<(), StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only in-memory mutex is never poisoned")]
            let mut tasks = self.tasks.lock().unwrap();
            let task = tasks.get_mut(name).ok_or_else(|| StoreError::NotFound(name.to_string()))?;
            task.last_run_status = Some(status);
            Ok(())
        }

        async fn enable(&self, name: &str, next_run_at: DateTime<Utc>) -> Result<ScheduledTask, StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only in-memory mutex is never poisoned")]
            let mut tasks = self.tasks.lock().unwrap();
            let task = tasks.get_mut(name).ok_or_else(|| StoreError::NotFound(name.to_string()))?;
            task.enable(next_run_at);
            Ok(task.clone())
        }

        async fn disable(&self, name: &str) -> Result<ScheduledTask, StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only in-memory mutex is never poisoned")]
            let mut tasks = self.tasks.lock().unwrap();
            let task = tasks.get_mut(name).ok_or_else(|| StoreError::NotFound(name.to_string()))?;
            task.disable();
            Ok(task.clone())
        }
    }

    struct MemoryRunStore {
        runs: Mutex<BTreeMap<RunId, Run>>,
    }

    #[async_trait]
    impl RunStore for MemoryRunStore {
        async fn create(&self, run: Run) -> Result<Run, StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only in-memory mutex is never poisoned")]
            self.runs.lock().unwrap().insert(run.id, run.clone());
            Ok(run)
        }

        async fn get(&self, _organization_id: OrganizationId, id: RunId) -> Result<Run, StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only in-memory mutex is never poisoned")]
            self.runs.lock().unwrap().get(&id).cloned().ok_or_else(|| StoreError::NotFound(id.to_string()))
        }

        async fn list(&self, _organization_id: OrganizationId, _filter: RunFilter, _limit: u32, _offset: u32) -> Result<Vec<Run>, StoreError> {
            Ok(Vec::new())
        }

        async fn update_status(&self, _organization_id: OrganizationId, _id: RunId, _new_status: RunStatus, _error_message: Option<String>) -> Result<Run, StoreError> {
            Err(StoreError::NotFound("unused in this test".to_string()))
        }

        async fn update_progress(&self, _organization_id: OrganizationId, _id: RunId, _current: u64, _total: u64, _unit: Option<String>) -> Result<Run, StoreError> {
            Err(StoreError::NotFound("unused in this test".to_string()))
        }

        async fn complete(&self, _organization_id: OrganizationId, _id: RunId, _results_summary: serde_json::Value) -> Result<Run, StoreError> {
            Err(StoreError::NotFound("unused in this test".to_string()))
        }

        async fn cancel_pending_runs_for_asset(&self, _organization_id: OrganizationId, _asset_id: forge_core::ids::AssetId, _run_type: RunType) -> Result<u32, StoreError> {
            Ok(0)
        }

        async fn append_log(&self, _run_id: RunId, _level: LogLevel, _event_type: RunEventType, _message: String, _context: serde_json::Value) -> Result<(), StoreError> {
            Ok(())
        }

        async fn list_logs(&self, _run_id: RunId) -> Result<Vec<RunLogEvent>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct RecordingBroker {
        dispatched: Mutex<Vec<WorkTask>>,
    }

    #[async_trait]
    impl WorkDispatcher for RecordingBroker {
        async fn dispatch(&self, task: WorkTask) -> Result<(), DispatchError> {
            #[allow(clippy::unwrap_used, reason = "test-only in-memory mutex is never poisoned")]
            self.dispatched.lock().unwrap().push(task);
            Ok(())
        }
    }

    fn epoch() -> DateTime<Utc> {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        DateTime::<Utc>::from_timestamp(0, 0).unwrap()
    }

    fn due_task(name: &str) -> ScheduledTask {
        ScheduledTask {
            name: name.to_string(),
            task_type: "system_maintenance".to_string(),
            schedule_expression: "0 2 * * *".to_string(),
            enabled: true,
            scope_type: ScopeType::Organization,
            organization_id: Some(OrganizationId::new()),
            config: serde_json::json!({}),
            last_run_id: None,
            last_run_at: None,
            last_run_status: None,
            next_run_at: Some(epoch()),
        }
    }

    fn harness(tasks: Vec<ScheduledTask>) -> (Arc<MemoryTaskStore>, Arc<MemoryRunStore>, Arc<RecordingBroker>, TaskDispatcher) {
        let task_store = Arc::new(MemoryTaskStore {
            tasks: Mutex::new(tasks.into_iter().map(|task| (task.name.clone(), task)).collect()),
        });
        let run_store = Arc::new(MemoryRunStore { runs: Mutex::new(BTreeMap::new()) });
        let broker = Arc::new(RecordingBroker { dispatched: Mutex::new(Vec::new()) });
        let dispatcher = TaskDispatcher::new(task_store.clone(), run_store.clone(), broker.clone());
        (task_store, run_store, broker, dispatcher)
    }

    #[tokio::test]
    async fn tick_dispatches_every_due_task_and_advances_next_run_at() {
        let (task_store, run_store, broker, dispatcher) = harness(vec![due_task("nightly")]);
        let dispatched = dispatcher.tick(epoch()).await.expect("tick must not fail");
        assert_eq!(dispatched.len(), 1);
        assert_eq!(run_store.runs.lock().expect("lock").len(), 1);
        assert_eq!(broker.dispatched.lock().expect("lock").len(), 1);

        let task = task_store.get("nightly").await.expect("task exists");
        assert!(task.next_run_at.expect("recomputed") > epoch());
        assert_eq!(task.last_run_id, Some(dispatched[0]));
    }

    #[tokio::test]
    async fn tick_ignores_tasks_not_yet_due() {
        let mut not_due = due_task("later");
        not_due.next_run_at = Some(epoch() + chrono::Duration::days(1));
        let (_, _, broker, dispatcher) = harness(vec![not_due]);
        let dispatched = dispatcher.tick(epoch()).await.expect("tick must not fail");
        assert!(dispatched.is_empty());
        assert!(broker.dispatched.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn trigger_now_fires_regardless_of_next_run_at_with_user_origin() {
        let mut not_due = due_task("manual");
        not_due.next_run_at = Some(epoch() + chrono::Duration::days(1));
        let org = not_due.organization_id.expect("seeded with an org");
        let (_, run_store, _, dispatcher) = harness(vec![not_due]);
        let run_id = dispatcher.trigger_now("manual", org, epoch()).await.expect("manual trigger must succeed");
        let run = run_store.runs.lock().expect("lock").get(&run_id).cloned().expect("run was created");
        assert_eq!(run.origin, RunOrigin::User);
    }

    #[tokio::test]
    async fn global_task_without_organization_is_skipped_not_crashed() {
        let mut global = due_task("global-cleanup");
        global.organization_id = None;
        global.scope_type = ScopeType::Global;
        let (_, _, broker, dispatcher) = harness(vec![global]);
        let dispatched = dispatcher.tick(epoch()).await.expect("tick swallows per-task failures");
        assert!(dispatched.is_empty());
        assert!(broker.dispatched.lock().expect("lock").is_empty());
    }

    #[test]
    fn unknown_task_type_falls_back_to_system_maintenance() {
        assert_eq!(run_type_for_task("not_a_real_type"), RunType::SystemMaintenance);
        assert_eq!(run_type_for_task("procedure"), RunType::Procedure);
    }
}
