// forge-executor/src/executor.rs
// ============================================================================
// Module: Procedure Executor
// Description: Walks a procedure definition's step graph against a Run:
//              parameter resolution, flow-control dispatch, function
//              invocation, logging, and trigger reconciliation.
// Purpose: The C5 Procedure executor (§4.5) — the interpreter that turns a
//          declarative step graph into an audited, tenant-scoped Run.
// Dependencies: chrono, cron, forge-core, futures, serde_json, thiserror,
//               tracing
// ============================================================================

//! ## Overview
//! [`ProcedureExecutor::execute`] is what a worker calls when it pops a
//! procedure Run off its queue. It is idempotent on a Run's terminal state,
//! always passes through `running` before any failure path (including a
//! missing required parameter), and ends by transitioning the Run to
//! `completed` or `failed` and reconciling the procedure's cron triggers.
//!
//! The step graph is mutually recursive (a step can be a flow-control step
//! whose branches contain more flow-control steps, arbitrarily deep).
//! [`execute_step_record`] is the single manually-boxed cut point that
//! makes that legal in `async fn` — every other method in the cycle awaits
//! its [`BoxFut`] like any other future.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::DateTime;
use chrono::Utc;
use forge_core::error::DomainError;
use forge_core::ids::OrganizationId;
use forge_core::ids::RunId;
use forge_core::interfaces::RunStore;
use forge_core::interfaces::StoreError;
use forge_core::procedure::ForeachSpec;
use forge_core::procedure::OnError;
use forge_core::procedure::ProcedureDefinition;
use forge_core::procedure::Step;
use forge_core::procedure::TriggerType;
use forge_core::run::LogLevel;
use forge_core::run::RunEventType;
use forge_core::run::RunStatus;
use serde_json::Map;
use serde_json::Value as Json;
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::ports::ProcedureStore;
use crate::registry::FunctionRegistry;
use crate::result::FlowResult;
use crate::result::FunctionStatus;
use crate::template;
use crate::truncate;

/// A future pinned and boxed to break the step interpreter's mutual
/// recursion; see the module overview.
type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised driving a procedure execution end to end. A function
/// call's own failure is *not* one of these: it is caught and folded into
/// the step/procedure outcome rather than propagated (§4.5 step result
/// handling).
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// A persistence call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Step Record
// ============================================================================

/// Outcome of executing one step (plain, flow-control, or legacy foreach),
/// before it's folded into the running procedure summary and the template
/// scope.
#[derive(Debug, Clone)]
struct StepRecord {
    /// Outcome classification.
    status: FunctionStatus,
    /// Opaque payload, merged into `steps.<name>` for later steps.
    data: Json,
    /// Error detail, set when `status == failed`.
    error: Option<String>,
    /// Items processed, for foreach/parallel steps.
    items_processed: Option<u64>,
    /// Items failed, for foreach/parallel steps.
    items_failed: Option<u64>,
    /// Wall-clock duration of this step (including its nested branches).
    duration_ms: u64,
    /// Whether the invoked function is declared side-effecting.
    side_effects: bool,
}

impl StepRecord {
    /// Builds a bare success record with no items/side effects.
    fn success(data: Json, duration_ms: u64) -> Self {
        Self { status: FunctionStatus::Success, data, error: None, items_processed: None, items_failed: None, duration_ms, side_effects: false }
    }

    /// Builds a bare failure record.
    fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: FunctionStatus::Failed,
            data: Json::Null,
            error: Some(error.into()),
            items_processed: None,
            items_failed: None,
            duration_ms,
            side_effects: false,
        }
    }

    /// Builds a record for a step whose `condition` was falsy.
    fn skipped() -> Self {
        Self { status: FunctionStatus::Skipped, data: Json::Null, error: None, items_processed: None, items_failed: None, duration_ms: 0, side_effects: false }
    }
}

// ============================================================================
// SECTION: Procedure Executor
// ============================================================================

/// Drives one procedure Run end to end (§4.5 C5).
pub struct ProcedureExecutor {
    /// Run persistence and audit log.
    runs: Arc<dyn RunStore>,
    /// Procedure definition and trigger persistence.
    procedures: Arc<dyn ProcedureStore>,
    /// Registered, invocable step functions.
    functions: FunctionRegistry,
}

impl ProcedureExecutor {
    /// Wires the executor to its dependencies.
    #[must_use]
    pub fn new(runs: Arc<dyn RunStore>, procedures: Arc<dyn ProcedureStore>, functions: FunctionRegistry) -> Self {
        Self { runs, procedures, functions }
    }

    /// Runs the full procedure execution flow for `run_id` (§4.5 steps 1-9).
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] on a persistence failure. A missing
    /// procedure, a missing required parameter, or a step/function failure
    /// is not an [`ExecutorError`]: each is recorded as a failed or partial
    /// Run instead.
    pub async fn execute(&self, organization_id: OrganizationId, run_id: RunId, supplied_params: Json, now: DateTime<Utc>) -> Result<(), ExecutorError> {
        let run = self.runs.get(organization_id, run_id).await?;
        if run.status.is_terminal() {
            return Ok(());
        }

        let run = self.runs.update_status(organization_id, run_id, RunStatus::Running, None).await?;
        let slug = run.procedure_slug.clone().unwrap_or_default();

        let definition = match self.procedures.get_by_slug(organization_id, &slug).await {
            Ok(definition) => definition,
            Err(error) => {
                self.fail_run(organization_id, run_id, format!("procedure {slug:?} not found: {error}")).await?;
                return Ok(());
            }
        };

        let params = match definition.resolve_parameters(&supplied_params) {
            Ok(params) => params,
            Err(DomainError::MissingRequiredParameter(name)) => {
                self.fail_run(organization_id, run_id, format!("Missing required parameter: {name}")).await?;
                return Ok(());
            }
            Err(error) => {
                self.fail_run(organization_id, run_id, error.to_string()).await?;
                return Ok(());
            }
        };

        self.log(
            run_id,
            LogLevel::Info,
            RunEventType::Start,
            format!("procedure {} v{} started", definition.slug, definition.version),
            serde_json::json!({"slug": definition.slug, "version": definition.version}),
        )
        .await;

        let ctx = ExecutionContext { organization_id, run_id, user_id: run.created_by, dry_run: false };
        let mut scope = build_scope(&params);

        let started = Instant::now();
        let mut failed_steps = Vec::new();
        let mut skipped_steps = Vec::new();
        let mut completed_steps = Vec::new();
        let mut side_effect_steps = Vec::new();
        let mut aborted = false;

        for step in &definition.steps {
            let record = self.execute_step_record(&ctx, step, &scope).await;
            record_into_scope(&mut scope, &step.name, &record);
            match record.status {
                FunctionStatus::Skipped => skipped_steps.push(step.name.clone()),
                FunctionStatus::Failed => {
                    failed_steps.push(step.name.clone());
                    if step.on_error == OnError::Fail {
                        aborted = true;
                    }
                }
                FunctionStatus::Success | FunctionStatus::Partial => completed_steps.push(step.name.clone()),
            }
            if record.side_effects {
                side_effect_steps.push(step.name.clone());
            }
            if aborted {
                break;
            }
        }

        let overall_status = if aborted {
            "failed"
        } else if failed_steps.is_empty() {
            "completed"
        } else {
            "partial"
        };

        let mut summary = Map::new();
        summary.insert("status".to_string(), Json::String(overall_status.to_string()));
        summary.insert("completed_steps".to_string(), string_array(&completed_steps));
        summary.insert("failed_steps".to_string(), string_array(&failed_steps));
        summary.insert("skipped_steps".to_string(), string_array(&skipped_steps));
        summary.insert("duration_ms".to_string(), Json::from(elapsed_ms(started)));
        if !side_effect_steps.is_empty() {
            summary.insert("governance".to_string(), serde_json::json!({"side_effect_steps": side_effect_steps}));
        }
        let summary = Json::Object(summary);

        self.log(
            run_id,
            LogLevel::Info,
            RunEventType::Summary,
            format!("procedure {} finished: {overall_status}", definition.slug),
            summary.clone(),
        )
        .await;

        self.reconcile_triggers(organization_id, &definition, now).await;

        if overall_status == "failed" {
            let message = if failed_steps.is_empty() {
                "procedure failed".to_string()
            } else {
                format!("step(s) failed: {}", failed_steps.join(", "))
            };
            self.fail_run(organization_id, run_id, message).await?;
        } else {
            self.runs.complete(organization_id, run_id, summary).await?;
        }
        Ok(())
    }

    /// Transitions a Run to `failed` with `message`.
    async fn fail_run(&self, organization_id: OrganizationId, run_id: RunId, message: String) -> Result<(), ExecutorError> {
        self.runs.update_status(organization_id, run_id, RunStatus::Failed, Some(message)).await?;
        Ok(())
    }

    /// Appends a truncated, best-effort log entry: a logging failure never
    /// fails the procedure it's attached to.
    async fn log(&self, run_id: RunId, level: LogLevel, event_type: RunEventType, message: impl Into<String>, context: Json) {
        let context = truncate::truncate(&context);
        if let Err(error) = self.runs.append_log(run_id, level, event_type, message.into(), context).await {
            tracing::warn!(error = %error, "failed to append run log");
        }
    }

    /// The boxed recursive core: evaluates `step.condition`, then dispatches
    /// to flow-control, legacy-foreach, or a plain function call.
    fn execute_step_record<'a>(&'a self, ctx: &'a ExecutionContext, step: &'a Step, scope: &'a Json) -> BoxFut<'a, StepRecord> {
        Box::pin(async move {
            if let Some(condition) = &step.condition {
                if !template::is_condition_met(condition, scope) {
                    return StepRecord::skipped();
                }
            }
            let start = Instant::now();
            if step.is_flow_control() {
                return self.execute_flow_step(ctx, step, scope, start).await;
            }
            if let Some(foreach) = &step.foreach {
                return self.execute_legacy_foreach(ctx, step, foreach, scope, start).await;
            }
            self.execute_plain_step(ctx, step, scope, start).await
        })
    }

    /// Invokes a plain (non-flow-control) step's function once.
    async fn execute_plain_step(&self, ctx: &ExecutionContext, step: &Step, scope: &Json, start: Instant) -> StepRecord {
        let Some(function) = self.functions.resolve(&step.function) else {
            let message = format!("unknown function: {}", step.function);
            self.log(ctx.run_id, LogLevel::Error, RunEventType::StepError, message.clone(), serde_json::json!({"step": step.name})).await;
            return StepRecord::failure(message, elapsed_ms(start));
        };
        let meta = function.meta().clone();
        if !meta.exposure.procedure {
            let message = format!("function {} is not exposed to procedures", step.function);
            self.log(
                ctx.run_id,
                LogLevel::Warn,
                RunEventType::GovernanceViolation,
                message.clone(),
                serde_json::json!({"step": step.name, "function": step.function}),
            )
            .await;
            return StepRecord::failure(message, elapsed_ms(start));
        }

        let params = template::render(&step.params, scope);
        self.log(
            ctx.run_id,
            LogLevel::Info,
            RunEventType::StepStart,
            format!("step {} started", step.name),
            serde_json::json!({"step": step.name, "function": step.function}),
        )
        .await;
        if meta.side_effects {
            self.log(
                ctx.run_id,
                LogLevel::Info,
                RunEventType::Governance,
                format!("side-effecting call: {}", step.function),
                serde_json::json!({"step": step.name, "function": step.function, "payload_profile": meta.payload_profile}),
            )
            .await;
        }

        let result = function.call(ctx, params).await;
        let status = result.status;
        let record = StepRecord {
            status,
            data: result.data,
            error: result.error,
            items_processed: result.items_processed,
            items_failed: result.items_failed,
            duration_ms: elapsed_ms(start),
            side_effects: meta.side_effects,
        };
        let (level, event_type) = if status.is_failure() { (LogLevel::Error, RunEventType::StepError) } else { (LogLevel::Info, RunEventType::StepComplete) };
        self.log(ctx.run_id, level, event_type, format!("step {} {}", step.name, status.as_str()), serde_json::json!({"step": step.name, "status": status.as_str()})).await;
        record
    }

    /// Evaluates a flow-control step's directive, then dispatches to the
    /// matching branch runner.
    async fn execute_flow_step(&self, ctx: &ExecutionContext, step: &Step, scope: &Json, start: Instant) -> StepRecord {
        let params = template::render(&step.params, scope);
        let flow = dispatch_flow(step, &params);
        match step.function.as_str() {
            "if_branch" | "switch_branch" => match flow.branch_key {
                Some(key) => self.execute_single_branch(ctx, step, scope, &key, start).await,
                None => StepRecord::success(Json::Null, elapsed_ms(start)),
            },
            "parallel" => self.execute_parallel_branches(ctx, step, scope, flow, start).await,
            "foreach" => self.execute_foreach_branches(ctx, step, scope, flow, start).await,
            other => StepRecord::failure(format!("unreachable flow-control function: {other}"), elapsed_ms(start)),
        }
    }

    /// Runs the branch named `key`, falling back to `default` when `key`
    /// has no branch of its own; a step with neither is a no-op success
    /// (§4.5 `if_branch`/`switch_branch`).
    async fn execute_single_branch(&self, ctx: &ExecutionContext, step: &Step, scope: &Json, key: &str, start: Instant) -> StepRecord {
        let steps = step.branches.get(key).or_else(|| step.branches.get("default"));
        let Some(steps) = steps else {
            return StepRecord::success(Json::Null, elapsed_ms(start));
        };
        self.run_step_sequence(ctx, steps, scope, start).await
    }

    /// Runs every selected branch to completion, classifying the step's
    /// status only after all branches finish (§4.5 `parallel`: branches run
    /// regardless of each other's outcome).
    async fn execute_parallel_branches(&self, ctx: &ExecutionContext, step: &Step, scope: &Json, flow: FlowResult, start: Instant) -> StepRecord {
        let names: Vec<String> = match flow.branches_to_run {
            Some(names) if !names.is_empty() => names,
            _ => step.branches.keys().cloned().collect(),
        };
        let chunk_size = concurrency_chunk_size(flow.concurrency, names.len());

        let mut results = Map::new();
        let mut failed = 0u64;
        let mut completed = 0u64;
        for chunk in names.chunks(chunk_size) {
            let futures = chunk.iter().filter_map(|name| {
                let steps = step.branches.get(name)?;
                let scope = scope.clone();
                Some(async move { (name.clone(), self.run_step_sequence(ctx, steps, &scope, start).await) })
            });
            for (name, record) in futures::future::join_all(futures).await {
                if record.status.is_failure() {
                    failed += 1;
                } else {
                    completed += 1;
                }
                results.insert(name, record.data);
            }
        }
        StepRecord {
            status: classify_branches(failed, step.on_error),
            data: Json::Object(results),
            error: None,
            items_processed: Some(completed),
            items_failed: Some(failed),
            duration_ms: elapsed_ms(start),
            side_effects: false,
        }
    }

    /// Runs the `each` branch once per item in `flow.items_to_iterate`,
    /// filtering by `flow.item_condition` and honoring `flow.concurrency`
    /// (§4.5 `foreach`).
    async fn execute_foreach_branches(&self, ctx: &ExecutionContext, step: &Step, scope: &Json, flow: FlowResult, start: Instant) -> StepRecord {
        let Some(items) = flow.items_to_iterate else {
            return StepRecord::success(Json::Array(Vec::new()), elapsed_ms(start));
        };
        let Some(each_steps) = step.branches.get("each") else {
            return StepRecord::success(Json::Array(Vec::new()), elapsed_ms(start));
        };
        let chunk_size = concurrency_chunk_size(flow.concurrency, 1);

        let mut results = Vec::with_capacity(items.len());
        let mut failed = 0u64;
        let mut completed = 0u64;
        for chunk in items.chunks(chunk_size) {
            let futures = chunk.iter().map(|item| {
                let item_scope = build_scope_with_item(scope, item.clone());
                let condition_met = flow.item_condition.as_deref().is_none_or(|condition| template::is_condition_met(condition, &item_scope));
                async move {
                    if condition_met {
                        self.run_step_sequence(ctx, each_steps, &item_scope, start).await
                    } else {
                        StepRecord::skipped()
                    }
                }
            });
            for record in futures::future::join_all(futures).await {
                match record.status {
                    FunctionStatus::Skipped => {}
                    FunctionStatus::Failed => failed += 1,
                    FunctionStatus::Success | FunctionStatus::Partial => completed += 1,
                }
                results.push(record.data);
            }
        }
        StepRecord {
            status: classify_branches(failed, step.on_error),
            data: Json::Array(results),
            error: None,
            items_processed: Some(completed),
            items_failed: Some(failed),
            duration_ms: elapsed_ms(start),
            side_effects: false,
        }
    }

    /// Legacy single-step `foreach` form (§4.5.1): evaluates `foreach.items_expr`
    /// once, then invokes `step.function` directly per item rather than
    /// running a nested branch.
    async fn execute_legacy_foreach(&self, ctx: &ExecutionContext, step: &Step, foreach: &ForeachSpec, scope: &Json, start: Instant) -> StepRecord {
        let items = match template::evaluate(&foreach.items_expr, scope) {
            Ok(Json::Array(items)) => items,
            Ok(Json::Null) | Err(_) => Vec::new(),
            Ok(other) => vec![other],
        };
        let Some(function) = self.functions.resolve(&step.function) else {
            return StepRecord::failure(format!("unknown function: {}", step.function), elapsed_ms(start));
        };
        let meta = function.meta().clone();
        if !meta.exposure.procedure {
            return StepRecord::failure(format!("function {} is not exposed to procedures", step.function), elapsed_ms(start));
        }
        let chunk_size = usize::try_from(foreach.concurrency).ok().filter(|count| *count > 0).unwrap_or(1);

        let mut outcomes = Vec::with_capacity(items.len());
        let mut failed = 0u64;
        let mut completed = 0u64;
        for (chunk_index, chunk) in items.chunks(chunk_size).enumerate() {
            let base_index = chunk_index * chunk_size;
            let futures = chunk.iter().enumerate().map(|(offset, item)| {
                let item_scope = build_scope_with_item(scope, item.clone());
                let condition_met = foreach.condition.as_deref().is_none_or(|condition| template::is_condition_met(condition, &item_scope));
                let params = template::render(&step.params, &item_scope);
                let item_id = item_identifier(item, base_index + offset);
                let function = function.clone();
                async move {
                    if !condition_met {
                        return (item_id, true, Json::Null, None);
                    }
                    let result = function.call(ctx, params).await;
                    (item_id, !result.status.is_failure(), result.data, result.error)
                }
            });
            for (item_id, success, data, error) in futures::future::join_all(futures).await {
                if success {
                    completed += 1;
                } else {
                    failed += 1;
                }
                outcomes.push(serde_json::json!({"item_id": item_id, "success": success, "result": data, "error": error}));
            }
        }
        StepRecord {
            status: classify(completed, failed, 0),
            data: Json::Array(outcomes),
            error: None,
            items_processed: Some(completed),
            items_failed: Some(failed),
            duration_ms: elapsed_ms(start),
            side_effects: meta.side_effects,
        }
    }

    /// Runs a flat list of steps in order within a local scope copy,
    /// stopping early on a failed step whose own `on_error` is `fail`
    /// (§4.5 sequential step execution).
    async fn run_step_sequence(&self, ctx: &ExecutionContext, steps: &[Step], scope: &Json, start: Instant) -> StepRecord {
        let mut local_scope = scope.clone();
        let mut results = Map::new();
        let mut failed = 0u64;
        let mut completed = 0u64;
        let mut skipped = 0u64;
        let mut last_error = None;
        for step in steps {
            let record = self.execute_step_record(ctx, step, &local_scope).await;
            record_into_scope(&mut local_scope, &step.name, &record);
            results.insert(step.name.clone(), record.data.clone());
            match record.status {
                FunctionStatus::Failed => {
                    failed += 1;
                    last_error = record.error.clone();
                    if step.on_error == OnError::Fail {
                        break;
                    }
                }
                FunctionStatus::Skipped => skipped += 1,
                FunctionStatus::Success | FunctionStatus::Partial => completed += 1,
            }
        }
        StepRecord {
            status: classify(completed, failed, skipped),
            data: Json::Object(results),
            error: last_error,
            items_processed: Some(completed),
            items_failed: Some(failed),
            duration_ms: elapsed_ms(start),
            side_effects: false,
        }
    }

    /// Recomputes `next_trigger_at` for every active cron trigger attached
    /// to `definition` and persists the change. Best-effort: a malformed
    /// cron expression or a persistence failure is logged and swallowed so
    /// it never fails the procedure it's attached to (§4.5 Trigger
    /// reconciliation).
    async fn reconcile_triggers(&self, organization_id: OrganizationId, definition: &ProcedureDefinition, now: DateTime<Utc>) {
        let mut triggers = definition.triggers.clone();
        let mut changed = false;
        for trigger in &mut triggers {
            if trigger.trigger_type != TriggerType::Cron || !trigger.is_active {
                continue;
            }
            let Some(expression) = &trigger.cron_expression else { continue };
            let Ok(schedule) = cron::Schedule::from_str(&quartz_seconds_form(expression)) else {
                tracing::warn!(expression, "unparseable cron expression during trigger reconciliation");
                continue;
            };
            if let Some(next) = schedule.after(&now).next() {
                trigger.next_trigger_at = Some(next);
                changed = true;
            }
        }
        if !changed {
            return;
        }
        if let Err(error) = self.procedures.save_triggers(organization_id, &definition.slug, triggers).await {
            tracing::warn!(error = %error, slug = %definition.slug, "trigger reconciliation failed to persist");
        }
    }
}

/// §4.6/§4.5 cron expressions are standard 5-field (`min hour day month
/// weekday`); the `cron` crate parses the Quartz 6/7-field form with a
/// leading seconds field. A bare 5-field expression gets `"0 "` prepended
/// so it still means what its author wrote; anything else is passed
/// through untouched and left to fail parsing on its own terms.
fn quartz_seconds_form(expression: &str) -> String {
    if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    }
}

// ============================================================================
// SECTION: Flow-control dispatch
// ============================================================================

/// Evaluates one of the four flow-control functions' already-rendered
/// `params` into a [`FlowResult`] directive (§4.5 Flow-control functions).
/// The parameter shape per function is a design inference: `if_branch`/
/// `switch_branch` key off `condition`/`value`; `parallel` reads `branches`
/// and `max_concurrency`; `foreach` reads `items`, `concurrency`, and
/// `item_condition`.
fn dispatch_flow(step: &Step, params: &Json) -> FlowResult {
    match step.function.as_str() {
        "if_branch" => {
            let condition = params.get("condition").is_some_and(forge_core::value::is_truthy);
            FlowResult { branch_key: Some(if condition { "then" } else { "else" }.to_string()), ..FlowResult::default() }
        }
        "switch_branch" => {
            let value = params.get("value").cloned().unwrap_or(Json::Null);
            let key = value.as_str().filter(|candidate| step.branches.contains_key(*candidate)).map(ToString::to_string);
            FlowResult { branch_key: Some(key.unwrap_or_else(|| "default".to_string())), ..FlowResult::default() }
        }
        "parallel" => {
            let branches_to_run = params
                .get("branches")
                .and_then(Json::as_array)
                .map(|items| items.iter().filter_map(Json::as_str).map(ToString::to_string).collect());
            let concurrency = params.get("max_concurrency").and_then(Json::as_u64).and_then(|value| u32::try_from(value).ok());
            FlowResult { branches_to_run, concurrency, ..FlowResult::default() }
        }
        "foreach" => {
            let items_to_iterate = params.get("items").and_then(Json::as_array).cloned();
            let concurrency = params.get("concurrency").and_then(Json::as_u64).and_then(|value| u32::try_from(value).ok());
            let item_condition = params.get("item_condition").and_then(Json::as_str).map(ToString::to_string);
            FlowResult { items_to_iterate, concurrency, item_condition, ..FlowResult::default() }
        }
        _ => FlowResult::default(),
    }
}

// ============================================================================
// SECTION: Scope / Helpers
// ============================================================================

/// Builds the initial template scope: declared parameters, an empty step
/// namespace, and no current item.
fn build_scope(params: &Json) -> Json {
    let mut scope = Map::new();
    scope.insert("params".to_string(), params.clone());
    scope.insert("steps".to_string(), Json::Object(Map::new()));
    scope.insert("item".to_string(), Json::Null);
    Json::Object(scope)
}

/// Returns a copy of `scope` with `item` set, for foreach iteration.
fn build_scope_with_item(scope: &Json, item: Json) -> Json {
    let mut object = scope.as_object().cloned().unwrap_or_default();
    object.insert("item".to_string(), item);
    Json::Object(object)
}

/// Folds a finished step's outcome into `scope.steps.<name>` so later steps
/// can reference it by name.
fn record_into_scope(scope: &mut Json, name: &str, record: &StepRecord) {
    let mut entry = match &record.data {
        Json::Object(map) => map.clone(),
        Json::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };
    entry.insert("status".to_string(), Json::String(record.status.as_str().to_string()));
    if let Some(error) = &record.error {
        entry.insert("error".to_string(), Json::String(error.clone()));
    }
    if let Some(steps) = scope.get_mut("steps").and_then(Json::as_object_mut) {
        steps.insert(name.to_string(), Json::Object(entry));
    }
}

/// Classifies a batch outcome: all-success is `success`, all-non-success
/// is `failed`, a mix is `partial`.
fn classify(completed: u64, failed: u64, skipped: u64) -> FunctionStatus {
    if failed == 0 {
        FunctionStatus::Success
    } else if completed == 0 && skipped == 0 {
        FunctionStatus::Failed
    } else {
        FunctionStatus::Partial
    }
}

/// Classifies a `parallel`/`foreach` step's own outcome from its branch
/// failure count and its `on_error` policy: no failures is always
/// `success`; any failure is `failed` under `on_error: fail` and `partial`
/// under `on_error: continue` (§4.5 `parallel`, `foreach`).
fn classify_branches(failed: u64, on_error: OnError) -> FunctionStatus {
    if failed == 0 {
        FunctionStatus::Success
    } else if on_error == OnError::Fail {
        FunctionStatus::Failed
    } else {
        FunctionStatus::Partial
    }
}

/// Resolves a concurrency hint to a chunk size, defaulting to `default_all`
/// (run everything in one chunk) when unset or zero.
fn concurrency_chunk_size(concurrency: Option<u32>, default_all: usize) -> usize {
    concurrency.and_then(|value| usize::try_from(value).ok()).filter(|count| *count > 0).unwrap_or_else(|| default_all.max(1))
}

/// An item's identifier for the legacy foreach result log: its own `id`
/// field when it has one, else its positional index.
fn item_identifier(item: &Json, index: usize) -> Json {
    item.get("id").cloned().unwrap_or_else(|| Json::from(index))
}

/// Converts an array of plain strings to a `Json::Array` of `Json::String`.
fn string_array(values: &[String]) -> Json {
    Json::Array(values.iter().cloned().map(Json::String).collect())
}

/// Milliseconds elapsed since `start`, saturating rather than panicking on
/// an implausibly long duration.
fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use forge_core::ids::OrganizationId;
    use forge_core::procedure::Parameter;
    use forge_core::run::Run;
    use forge_core::run::RunOrigin;
    use forge_core::run::RunType;

    use super::*;
    use crate::registry::FunctionMeta;
    use crate::registry::ProcedureFunction;
    use crate::result::FunctionResult;

    fn now() -> DateTime<Utc> {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        DateTime::<Utc>::from_timestamp(0, 0).unwrap()
    }

    struct Echo;

    #[async_trait]
    impl ProcedureFunction for Echo {
        fn meta(&self) -> &FunctionMeta {
            static META: std::sync::OnceLock<FunctionMeta> = std::sync::OnceLock::new();
            META.get_or_init(|| FunctionMeta::plain("echo"))
        }

        async fn call(&self, _ctx: &ExecutionContext, params: Json) -> FunctionResult {
            FunctionResult::success(params, 1)
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl ProcedureFunction for AlwaysFails {
        fn meta(&self) -> &FunctionMeta {
            static META: std::sync::OnceLock<FunctionMeta> = std::sync::OnceLock::new();
            META.get_or_init(|| FunctionMeta::plain("always_fails"))
        }

        async fn call(&self, _ctx: &ExecutionContext, _params: Json) -> FunctionResult {
            FunctionResult::failure("boom", 1)
        }
    }

    struct MemoryRunStore {
        run: Mutex<Run>,
    }

    #[async_trait]
    impl RunStore for MemoryRunStore {
        async fn create(&self, run: Run) -> Result<Run, StoreError> {
            Ok(run)
        }

        async fn get(&self, _organization_id: OrganizationId, _id: RunId) -> Result<Run, StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only mutex, never poisoned")]
            Ok(self.run.lock().unwrap().clone())
        }

        async fn list(
            &self,
            _organization_id: OrganizationId,
            _filter: forge_core::interfaces::RunFilter,
            _limit: u32,
            _offset: u32,
        ) -> Result<Vec<Run>, StoreError> {
            Ok(Vec::new())
        }

        async fn update_status(
            &self,
            _organization_id: OrganizationId,
            _id: RunId,
            new_status: RunStatus,
            error_message: Option<String>,
        ) -> Result<Run, StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only mutex, never poisoned")]
            let mut run = self.run.lock().unwrap();
            run.transition(new_status, error_message, now()).map_err(|error| StoreError::InvalidTransition(error.to_string()))?;
            Ok(run.clone())
        }

        async fn update_progress(
            &self,
            _organization_id: OrganizationId,
            _id: RunId,
            _current: u64,
            _total: u64,
            _unit: Option<String>,
        ) -> Result<Run, StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only mutex, never poisoned")]
            Ok(self.run.lock().unwrap().clone())
        }

        async fn complete(&self, _organization_id: OrganizationId, _id: RunId, results_summary: Json) -> Result<Run, StoreError> {
            #[allow(clippy::unwrap_used, reason = "test-only mutex, never poisoned")]
            let mut run = self.run.lock().unwrap();
            run.transition(RunStatus::Completed, None, now()).map_err(|error| StoreError::InvalidTransition(error.to_string()))?;
            run.results_summary = Some(results_summary);
            Ok(run.clone())
        }

        async fn cancel_pending_runs_for_asset(
            &self,
            _organization_id: OrganizationId,
            _asset_id: forge_core::ids::AssetId,
            _run_type: RunType,
        ) -> Result<u32, StoreError> {
            Ok(0)
        }

        async fn append_log(
            &self,
            _run_id: RunId,
            _level: LogLevel,
            _event_type: RunEventType,
            _message: String,
            _context: Json,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        async fn list_logs(&self, _run_id: RunId) -> Result<Vec<forge_core::run::RunLogEvent>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct StaticProcedureStore {
        definition: ProcedureDefinition,
    }

    #[async_trait]
    impl ProcedureStore for StaticProcedureStore {
        async fn get_by_slug(&self, _organization_id: OrganizationId, slug: &str) -> Result<ProcedureDefinition, StoreError> {
            if slug == self.definition.slug {
                Ok(self.definition.clone())
            } else {
                Err(StoreError::NotFound(slug.to_string()))
            }
        }

        async fn save_triggers(&self, _organization_id: OrganizationId, _slug: &str, _triggers: Vec<forge_core::procedure::Trigger>) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn leaf(name: &str, function: &str) -> Step {
        Step {
            name: name.to_string(),
            function: function.to_string(),
            params: serde_json::json!({}),
            condition: None,
            on_error: OnError::Fail,
            branches: std::collections::BTreeMap::new(),
            foreach: None,
        }
    }

    fn harness(definition: ProcedureDefinition) -> (Arc<MemoryRunStore>, ProcedureExecutor, Run) {
        let run = Run::new(OrganizationId::new(), RunType::Procedure, RunOrigin::User, Json::Null, Vec::new(), None, now());
        let runs = Arc::new(MemoryRunStore { run: Mutex::new(run.clone()) });
        let procedures = Arc::new(StaticProcedureStore { definition });
        let mut functions = FunctionRegistry::new();
        functions.register("echo", Arc::new(Echo));
        functions.register("always_fails", Arc::new(AlwaysFails));
        let executor = ProcedureExecutor::new(runs.clone(), procedures, functions);
        (runs, executor, run)
    }

    #[tokio::test]
    async fn successful_procedure_completes_the_run() {
        let definition = ProcedureDefinition {
            slug: "greet".to_string(),
            version: 1,
            parameters: vec![],
            steps: vec![leaf("say_hi", "echo")],
            triggers: vec![],
            on_error: OnError::Fail,
        };
        let (runs, executor, run) = harness(definition);
        executor.execute(run.organization_id, run.id, serde_json::json!({}), now()).await.unwrap();
        let final_run = runs.run.lock().unwrap().clone();
        assert_eq!(final_run.status, RunStatus::Completed);
        assert_eq!(final_run.results_summary.unwrap()["status"], serde_json::json!("completed"));
    }

    #[tokio::test]
    async fn missing_required_parameter_fails_the_run_via_running() {
        let definition = ProcedureDefinition {
            slug: "needs-x".to_string(),
            version: 1,
            parameters: vec![Parameter { name: "x".to_string(), required: true, default: None }],
            steps: vec![leaf("say_hi", "echo")],
            triggers: vec![],
            on_error: OnError::Fail,
        };
        let (runs, executor, run) = harness(definition);
        executor.execute(run.organization_id, run.id, serde_json::json!({}), now()).await.unwrap();
        let final_run = runs.run.lock().unwrap().clone();
        assert_eq!(final_run.status, RunStatus::Failed);
        assert_eq!(final_run.error_message.as_deref(), Some("Missing required parameter: x"));
    }

    #[tokio::test]
    async fn failing_step_with_fail_policy_fails_the_run() {
        let definition = ProcedureDefinition {
            slug: "boom".to_string(),
            version: 1,
            parameters: vec![],
            steps: vec![leaf("explode", "always_fails")],
            triggers: vec![],
            on_error: OnError::Fail,
        };
        let (runs, executor, run) = harness(definition);
        executor.execute(run.organization_id, run.id, serde_json::json!({}), now()).await.unwrap();
        let final_run = runs.run.lock().unwrap().clone();
        assert_eq!(final_run.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn failing_step_with_continue_policy_yields_partial_completion() {
        let mut failing = leaf("explode", "always_fails");
        failing.on_error = OnError::Continue;
        let definition = ProcedureDefinition {
            slug: "resilient".to_string(),
            version: 1,
            parameters: vec![],
            steps: vec![failing, leaf("say_hi", "echo")],
            triggers: vec![],
            on_error: OnError::Continue,
        };
        let (runs, executor, run) = harness(definition);
        executor.execute(run.organization_id, run.id, serde_json::json!({}), now()).await.unwrap();
        let final_run = runs.run.lock().unwrap().clone();
        assert_eq!(final_run.status, RunStatus::Completed);
        assert_eq!(final_run.results_summary.unwrap()["status"], serde_json::json!("partial"));
    }

    #[tokio::test]
    async fn terminal_run_is_a_no_op() {
        let definition = ProcedureDefinition {
            slug: "greet".to_string(),
            version: 1,
            parameters: vec![],
            steps: vec![leaf("say_hi", "echo")],
            triggers: vec![],
            on_error: OnError::Fail,
        };
        let (runs, executor, run) = harness(definition);
        {
            #[allow(clippy::unwrap_used, reason = "test-only mutex, never poisoned")]
            let mut locked = runs.run.lock().unwrap();
            locked.transition(RunStatus::Cancelled, None, now()).unwrap();
        }
        executor.execute(run.organization_id, run.id, serde_json::json!({}), now()).await.unwrap();
        let final_run = runs.run.lock().unwrap().clone();
        assert_eq!(final_run.status, RunStatus::Cancelled);
    }

    #[test]
    fn classify_mixed_outcome_is_partial() {
        assert_eq!(classify(1, 1, 0), FunctionStatus::Partial);
        assert_eq!(classify(2, 0, 0), FunctionStatus::Success);
        assert_eq!(classify(0, 2, 0), FunctionStatus::Failed);
        assert_eq!(classify(0, 1, 1), FunctionStatus::Partial);
    }

    #[test]
    fn classify_branches_honors_on_error() {
        assert_eq!(classify_branches(0, OnError::Fail), FunctionStatus::Success);
        assert_eq!(classify_branches(0, OnError::Continue), FunctionStatus::Success);
        assert_eq!(classify_branches(2, OnError::Fail), FunctionStatus::Failed);
        assert_eq!(classify_branches(2, OnError::Continue), FunctionStatus::Partial);
        assert_eq!(classify_branches(1, OnError::Fail), FunctionStatus::Failed);
        assert_eq!(classify_branches(1, OnError::Continue), FunctionStatus::Partial);
    }

    #[test]
    fn if_branch_dispatch_picks_then_or_else() {
        let step = leaf("check", "if_branch");
        let flow = dispatch_flow(&step, &serde_json::json!({"condition": true}));
        assert_eq!(flow.branch_key.as_deref(), Some("then"));
        let flow = dispatch_flow(&step, &serde_json::json!({"condition": false}));
        assert_eq!(flow.branch_key.as_deref(), Some("else"));
    }

    #[test]
    fn switch_branch_dispatch_falls_back_to_default_for_unknown_value() {
        let mut step = leaf("route", "switch_branch");
        step.branches.insert("a".to_string(), vec![leaf("x", "echo")]);
        let flow = dispatch_flow(&step, &serde_json::json!({"value": "z"}));
        assert_eq!(flow.branch_key.as_deref(), Some("default"));
    }

    #[test]
    fn item_identifier_prefers_declared_id() {
        assert_eq!(item_identifier(&serde_json::json!({"id": "x1"}), 3), serde_json::json!("x1"));
        assert_eq!(item_identifier(&serde_json::json!({"name": "x1"}), 3), serde_json::json!(3));
    }
}
