// forge-scheduler/src/event_bus.rs
// ============================================================================
// Module: Event Bus
// Description: `emit` (§4.7 C7) — matches an emitted event against every
//              procedure's active event triggers and materialises Runs for
//              the matches.
// Purpose: Decouple producers (crawl orchestrator, SharePoint sync, SAM
//          pull, API handlers) from the procedures/pipelines a trigger
//          wires to them.
// Dependencies: forge-core, forge-executor, tracing
// ============================================================================

//! ## Overview
//! [`EventBus::emit`] is the one entry point. It is intentionally ignorant
//! of *why* an event fired; callers (the crawl orchestrator, SharePoint
//! sync, SAM pull, the cron dispatcher, API handlers) each construct their
//! own event name and payload per §4.7's producer list in §5.
//!
//! The source distinguishes `procedures_triggered` from
//! `pipelines_triggered` in `emit`'s return shape. `forge-core` does not yet
//! model a pipeline as anything other than a [`forge_core::run::RunType::Pipeline`]
//! run over the same [`forge_core::procedure::ProcedureDefinition`] shape,
//! so every match here is reported as a procedure trigger; `pipelines_triggered`
//! is carried in [`EmitOutcome`] for API compatibility and is always empty
//! until a distinct pipeline store exists.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use forge_core::ids::OrganizationId;
use forge_core::ids::RunId;
use forge_core::interfaces::DispatchError;
use forge_core::interfaces::RunStore;
use forge_core::interfaces::StoreError;
use forge_core::interfaces::WorkDispatcher;
use forge_core::interfaces::WorkTask;
use forge_core::procedure::TriggerType;
use forge_core::run::Run;
use forge_core::run::RunOrigin;
use forge_core::run::RunType;
use forge_executor::ports::ProcedureStore;
use serde_json::Value as Json;
use thiserror::Error;

use crate::filter;
use crate::ports::EventTriggerIndex;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures from [`EventBus::emit`].
#[derive(Debug, Error)]
pub enum EventBusError {
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// What `emit` handed back to its caller (§4.7 signature).
#[derive(Debug, Clone, Default)]
pub struct EmitOutcome {
    /// Runs created for matched procedure triggers.
    pub procedures_triggered: Vec<RunId>,
    /// Runs created for matched pipeline triggers (see module overview for
    /// the current limitation: always empty).
    pub pipelines_triggered: Vec<RunId>,
}

// ============================================================================
// SECTION: Event Bus
// ============================================================================

/// Matches and dispatches event triggers.
pub struct EventBus {
    /// Cross-procedure active-trigger lookup.
    index: Arc<dyn EventTriggerIndex>,
    /// Procedure definition and trigger persistence.
    procedures: Arc<dyn ProcedureStore>,
    /// Run persistence.
    runs: Arc<dyn RunStore>,
    /// Worker broker a materialised Run is handed to.
    broker: Arc<dyn WorkDispatcher>,
}

/// Queue routing key for event-triggered procedure runs.
const PROCEDURE_QUEUE: &str = "procedure";

impl EventBus {
    /// Builds a bus over its four collaborators.
    #[must_use]
    pub fn new(index: Arc<dyn EventTriggerIndex>, procedures: Arc<dyn ProcedureStore>, runs: Arc<dyn RunStore>, broker: Arc<dyn WorkDispatcher>) -> Self {
        Self { index, procedures, runs, broker }
    }

    /// Emits `event_name` with `payload` for `organization_id`. Every
    /// active `event` trigger whose `event_name` matches and whose
    /// optional `event_filter` matches `payload` creates a Run and
    /// re-persists the trigger's fired-counters. A single trigger's
    /// failure to dispatch is logged and does not block the others.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError`] only when the initial trigger lookup
    /// itself fails; per-trigger dispatch failures are swallowed and
    /// logged.
    pub async fn emit(&self, organization_id: OrganizationId, event_name: &str, payload: Json, source_run_id: Option<RunId>, now: chrono::DateTime<chrono::Utc>) -> Result<EmitOutcome, EventBusError> {
        let candidates = self.index.find_by_event_name(organization_id, event_name).await?;
        let mut outcome = EmitOutcome::default();
        for candidate in candidates {
            let Some(trigger) = candidate.definition.triggers.iter().find(|trigger| trigger.id == candidate.trigger_id) else {
                continue;
            };
            if trigger.trigger_type != TriggerType::Event || !trigger.is_active {
                continue;
            }
            if trigger.event_name.as_deref() != Some(event_name) {
                continue;
            }
            if !filter::matches(trigger.event_filter.as_ref(), &payload) {
                continue;
            }
            match self.fire(organization_id, &candidate.slug, candidate.definition.clone(), candidate.trigger_id, &payload, source_run_id, now).await {
                Ok(run_id) => outcome.procedures_triggered.push(run_id),
                Err(error) => {
                    tracing::warn!(slug = %candidate.slug, event = %event_name, error = %error, "event trigger dispatch failed");
                }
            }
        }
        Ok(outcome)
    }

    /// Creates a Run for one matched trigger, dispatches it to a worker,
    /// and records the firing against the procedure's trigger set.
    async fn fire(
        &self,
        organization_id: OrganizationId,
        slug: &str,
        mut definition: forge_core::procedure::ProcedureDefinition,
        trigger_id: forge_core::ids::TriggerId,
        payload: &Json,
        source_run_id: Option<RunId>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<RunId, EventBusError> {
        let config = serde_json::json!({ "event_payload": payload, "source_run_id": source_run_id });
        let mut run = Run::new(organization_id, RunType::Procedure, RunOrigin::Event, config, Vec::new(), None, now);
        run.procedure_slug = Some(slug.to_string());
        run.procedure_version = Some(definition.version);
        let run = self.runs.create(run).await?;

        if let Some(trigger) = definition.triggers.iter_mut().find(|trigger| trigger.id == trigger_id) {
            trigger.record_fired(now, None);
        }
        self.procedures.save_triggers(organization_id, slug, definition.triggers).await?;

        if let Err(error) = self
            .broker
            .dispatch(WorkTask {
                queue_type: PROCEDURE_QUEUE.to_string(),
                run_id: run.id,
                organization_id,
            })
            .await
        {
            let DispatchError::Rejected(reason) | DispatchError::Io(reason) = error;
            tracing::warn!(run_id = %run.id, reason = %reason, "event-triggered run created but dispatch failed");
        }
        Ok(run.id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use forge_core::ids::TriggerId;
    use forge_core::procedure::ProcedureDefinition;
    use forge_core::procedure::Trigger;
    use serde_json::json;

    use super::*;

    struct StaticIndex {
        matches: Vec<crate::ports::EventMatch>,
    }

    #[async_trait]
    impl EventTriggerIndex for StaticIndex {
        async fn find_by_event_name(&self, _organization_id: OrganizationId, _event_name: &str) -> Result<Vec<crate::ports::EventMatch>, StoreError> {
            Ok(self.matches.clone())
        }
    }

    struct RecordingProcedureStore {
        saved: Mutex<Vec<(String, Vec<Trigger>)>>,
    }

    #[async_trait]
    impl ProcedureStore for RecordingProcedureStore {
        async fn get_by_slug(&self, _organization_id: OrganizationId, _slug: &str) -> Result<ProcedureDefinition, StoreError> {
            Err(StoreError::NotFound("unused in this test".to_string()))
        }

        async fn save_triggers(&self, _organization_id: OrganizationId, slug: &str, triggers: Vec<Trigger>) -> Result<(), StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only in-memory mutex is never poisoned")]
            self.saved.lock().unwrap().push((slug.to_string(), triggers));
            Ok(())
        }
    }

    struct RecordingRunStore {
        created: Mutex<Vec<Run>>,
    }

    #[async_trait]
    impl RunStore for RecordingRunStore {
        async fn create(&self, run: Run) -> Result<Run, StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only in-memory mutex is never poisoned")]
            self.created.lock().unwrap().push(run.clone());
            Ok(run)
        }

        async fn get(&self, _organization_id: OrganizationId, id: RunId) -> Result<Run, StoreError> {
            Err(StoreError::NotFound(id.to_string()))
        }

        async fn list(&self, _organization_id: OrganizationId, _filter: forge_core::interfaces::RunFilter, _limit: u32, _offset: u32) -> Result<Vec<Run>, StoreError> {
            Ok(Vec::new())
        }

        async fn update_status(&self, _organization_id: OrganizationId, _id: RunId, _new_status: forge_core::run::RunStatus, _error_message: Option<String>) -> Result<Run, StoreError> {
            Err(StoreError::NotFound("unused in this test".to_string()))
        }

        async fn update_progress(&self, _organization_id: OrganizationId, _id: RunId, _current: u64, _total: u64, _unit: Option<String>) -> Result<Run, StoreError> {
            Err(StoreError::NotFound("unused in this test".to_string()))
        }

        async fn complete(&self, _organization_id: OrganizationId, _id: RunId, _results_summary: Json) -> Result<Run, StoreError> {
            Err(StoreError::NotFound("unused in this test".to_string()))
        }

        async fn cancel_pending_runs_for_asset(&self, _organization_id: OrganizationId, _asset_id: forge_core::ids::AssetId, _run_type: RunType) -> Result<u32, StoreError> {
            Ok(0)
        }

        async fn append_log(&self, _run_id: RunId, _level: forge_core::run::LogLevel, _event_type: forge_core::run::RunEventType, _message: String, _context: Json) -> Result<(), StoreError> {
            Ok(())
        }

        async fn list_logs(&self, _run_id: RunId) -> Result<Vec<forge_core::run::RunLogEvent>, StoreError> {
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

    fn epoch() -> chrono::DateTime<chrono::Utc> {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).unwrap()
    }

    fn trigger(event_name: &str, filter: Option<Json>) -> Trigger {
        Trigger {
            id: TriggerId::new(),
            trigger_type: TriggerType::Event,
            cron_expression: None,
            event_name: Some(event_name.to_string()),
            event_filter: filter,
            is_active: true,
            last_triggered_at: None,
            next_trigger_at: None,
            trigger_count: 0,
        }
    }

    fn definition_with(trigger: Trigger) -> ProcedureDefinition {
        ProcedureDefinition {
            slug: "summarize-notice".to_string(),
            version: 1,
            parameters: Vec::new(),
            steps: Vec::new(),
            triggers: vec![trigger],
            on_error: forge_core::procedure::OnError::Fail,
        }
    }

    #[tokio::test]
    async fn emit_matches_event_name_and_filter_and_creates_a_run() {
        let trig = trigger("notice.created", Some(json!({"agency": "GSA"})));
        let trigger_id = trig.id;
        let definition = definition_with(trig);
        let index = Arc::new(StaticIndex {
            matches: vec![crate::ports::EventMatch { slug: "summarize-notice".to_string(), definition, trigger_id }],
        });
        let procedures = Arc::new(RecordingProcedureStore { saved: Mutex::new(Vec::new()) });
        let runs = Arc::new(RecordingRunStore { created: Mutex::new(Vec::new()) });
        let broker = Arc::new(RecordingBroker { dispatched: Mutex::new(Vec::new()) });
        let bus = EventBus::new(index, procedures.clone(), runs.clone(), broker.clone());

        let outcome = bus
            .emit(OrganizationId::new(), "notice.created", json!({"agency": "GSA", "id": 1}), None, epoch())
            .await
            .expect("emit must not fail");

        assert_eq!(outcome.procedures_triggered.len(), 1);
        assert_eq!(runs.created.lock().expect("lock").len(), 1);
        assert_eq!(broker.dispatched.lock().expect("lock").len(), 1);
        let saved = procedures.saved.lock().expect("lock");
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].1.iter().find(|t| t.id == trigger_id).expect("trigger persisted").trigger_count, 1);
    }

    #[tokio::test]
    async fn emit_skips_trigger_whose_filter_does_not_match() {
        let trig = trigger("notice.created", Some(json!({"agency": "GSA"})));
        let trigger_id = trig.id;
        let definition = definition_with(trig);
        let index = Arc::new(StaticIndex {
            matches: vec![crate::ports::EventMatch { slug: "summarize-notice".to_string(), definition, trigger_id }],
        });
        let procedures = Arc::new(RecordingProcedureStore { saved: Mutex::new(Vec::new()) });
        let runs = Arc::new(RecordingRunStore { created: Mutex::new(Vec::new()) });
        let broker = Arc::new(RecordingBroker { dispatched: Mutex::new(Vec::new()) });
        let bus = EventBus::new(index, procedures, runs.clone(), broker);

        let outcome = bus
            .emit(OrganizationId::new(), "notice.created", json!({"agency": "DOD"}), None, epoch())
            .await
            .expect("emit must not fail");

        assert!(outcome.procedures_triggered.is_empty());
        assert!(runs.created.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn emit_skips_inactive_trigger() {
        let mut trig = trigger("notice.created", None);
        trig.is_active = false;
        let trigger_id = trig.id;
        let definition = definition_with(trig);
        let index = Arc::new(StaticIndex {
            matches: vec![crate::ports::EventMatch { slug: "summarize-notice".to_string(), definition, trigger_id }],
        });
        let procedures = Arc::new(RecordingProcedureStore { saved: Mutex::new(Vec::new()) });
        let runs = Arc::new(RecordingRunStore { created: Mutex::new(Vec::new()) });
        let broker = Arc::new(RecordingBroker { dispatched: Mutex::new(Vec::new()) });
        let bus = EventBus::new(index, procedures, runs.clone(), broker);

        let outcome = bus.emit(OrganizationId::new(), "notice.created", json!({}), None, epoch()).await.expect("emit must not fail");
        assert!(outcome.procedures_triggered.is_empty());
        assert!(runs.created.lock().expect("lock").is_empty());
    }
}
