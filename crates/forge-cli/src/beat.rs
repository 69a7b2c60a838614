// forge-cli/src/beat.rs
// ============================================================================
// Module: Beat
// Description: The periodic background loop: evaluates due scheduled tasks
//              and, per tenant, drains the extraction queue's concurrency
//              gate for newly-submittable runs.
// Purpose: forge-scheduler's TaskDispatcher and forge-queue's ExtractionQueue
//          both define "what happens on a tick" but neither owns a clock;
//          something has to actually call tick() on an interval, and that's
//          a composition-root concern.
// Dependencies: chrono, forge-queue, forge-scheduler, forge-store-sqlite,
//               tokio, tracing
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use forge_queue::ExtractionQueue;
use forge_scheduler::TaskDispatcher;
use forge_store_sqlite::SqliteStore;

/// Runs the periodic beat forever, ticking every `interval`. Intended to be
/// spawned as its own task alongside the HTTP server; a single tick's
/// failure is logged and the loop continues rather than stopping the
/// process.
pub async fn run(task_dispatcher: Arc<TaskDispatcher>, extraction_queue: Arc<ExtractionQueue>, store: Arc<SqliteStore>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        tick_once(&task_dispatcher, &extraction_queue, &store).await;
    }
}

/// One beat: materialises due scheduled tasks, then submits due extraction
/// runs for every known tenant.
async fn tick_once(task_dispatcher: &TaskDispatcher, extraction_queue: &ExtractionQueue, store: &SqliteStore) {
    let now = Utc::now();

    match task_dispatcher.tick(now).await {
        Ok(dispatched) if !dispatched.is_empty() => {
            tracing::info!(count = dispatched.len(), "beat dispatched scheduled tasks");
        }
        Ok(_) => {}
        Err(error) => tracing::error!(%error, "beat failed to evaluate scheduled tasks"),
    }

    let organizations = match store.list_organization_ids().await {
        Ok(organizations) => organizations,
        Err(error) => {
            tracing::error!(%error, "beat failed to list organizations");
            return;
        }
    };

    for organization_id in organizations {
        if let Err(error) = extraction_queue.submit_due(organization_id, now).await {
            tracing::error!(%organization_id, %error, "beat failed to submit due extraction runs");
        }
    }
}
