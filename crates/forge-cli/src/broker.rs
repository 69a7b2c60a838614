// forge-cli/src/broker.rs
// ============================================================================
// Module: Broker
// Description: The in-process WorkDispatcher every producer shares, and the
//              routing table that hands a dispatched WorkTask to the
//              orchestrator that actually drives it.
// Purpose: C1-C10 all produce WorkTasks against one shared dispatch
//          interface; something has to be the worker pool that consumes
//          them, and for a single-process deployment that's this module.
// Dependencies: async-trait, forge-core, forge-executor, forge-ingest,
//               forge-providers, forge-queue, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! [`Broker`] is constructed empty so its `Arc<dyn WorkDispatcher>` can be
//! handed to every orchestrator at construction time, then [`Broker::install`]
//! is called once the orchestrators themselves exist. A task handed to
//! [`Broker::dispatch`] is run on a spawned task rather than inline, so a
//! dispatch call from inside an orchestrator's own `execute` never blocks on
//! the work it just enqueued.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;
use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use forge_core::ids::OrganizationId;
use forge_core::ids::RunId;
use forge_core::ids::ScrapeCollectionId;
use forge_core::ids::SharePointSyncConfigId;
use forge_core::interfaces::DispatchError;
use forge_core::interfaces::ObjectStore;
use forge_core::interfaces::RunStore;
use forge_core::interfaces::WorkDispatcher;
use forge_core::interfaces::WorkTask;
use forge_core::run::Run;
use forge_core::run::RunOrigin;
use forge_core::run::RunStatus;
use forge_core::run::RunType;
use forge_core::value::get_path;
use forge_executor::ProcedureExecutor;
use forge_ingest::CrawlOrchestrator;
use forge_ingest::SamPullOrchestrator;
use forge_ingest::SamPullParams;
use forge_ingest::SharePointSyncOrchestrator;
use forge_providers::ExtractorRegistry;
use forge_providers::SearchIndexClient;
use forge_queue::AssetStore;
use forge_queue::ExtractionOrchestrator;
use forge_queue::PROCESSED_BUCKET;
use forge_queue::markdown_object_key;
use serde_json::Value as Json;
use serde_json::json;

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Every collaborator the broker's routing table needs, installed once the
/// orchestrators that depend on the broker's own `Arc<dyn WorkDispatcher>`
/// have been built.
pub struct Handlers {
    /// Drives extraction Runs (§4.4 C4).
    pub extraction: Arc<ExtractionOrchestrator>,
    /// Drives procedure Runs (§4.5 C5).
    pub procedures: Arc<ProcedureExecutor>,
    /// Drives web crawl Runs (§4.8 C8).
    pub crawl: Arc<CrawlOrchestrator>,
    /// Drives SharePoint sync Runs (§4.9 C9).
    pub sharepoint: Arc<SharePointSyncOrchestrator>,
    /// Drives SAM.gov pull Runs (§4.10 C10).
    pub sam_pull: Arc<SamPullOrchestrator>,
    /// Static per-call parameters a SAM pull Run is driven with.
    pub sam_pull_params: SamPullParams,
    /// Run persistence, for finalizing the orchestrators that do not
    /// finalize their own Run.
    pub runs: Arc<dyn RunStore>,
    /// Asset persistence, for the enhancement and indexing handlers.
    pub assets: Arc<dyn AssetStore>,
    /// Raw/processed object storage.
    pub objects: Arc<dyn ObjectStore>,
    /// Configured extraction engines, for the enhancement re-extraction pass.
    pub extractors: ExtractorRegistry,
    /// Search-index ingestion client.
    pub search_index: Arc<dyn SearchIndexClient>,
    /// The broker itself, for dispatching the Indexing follow-on an
    /// enhancement pass produces.
    pub dispatcher: Arc<dyn WorkDispatcher>,
}

// ============================================================================
// SECTION: Broker
// ============================================================================

/// The shared [`WorkDispatcher`] every producer in the process holds a
/// clone of. Built empty; [`Broker::install`] is called once, after the
/// orchestrators that need this broker's own `Arc<dyn WorkDispatcher>` have
/// been constructed.
#[derive(Default)]
pub struct Broker {
    handlers: OnceLock<Arc<Handlers>>,
}

impl Broker {
    /// Builds an uninstalled broker.
    #[must_use]
    pub fn new() -> Self {
        Self { handlers: OnceLock::new() }
    }

    /// Installs the routing table. Calling this more than once is a
    /// programming error in the composition root; the second call is
    /// ignored and logged rather than panicking.
    pub fn install(&self, handlers: Handlers) {
        if self.handlers.set(Arc::new(handlers)).is_err() {
            tracing::error!("broker already installed, ignoring duplicate install");
        }
    }
}

#[async_trait]
impl WorkDispatcher for Broker {
    async fn dispatch(&self, task: WorkTask) -> Result<(), DispatchError> {
        let Some(handlers) = self.handlers.get() else {
            return Err(DispatchError::Rejected("broker has no installed handlers yet".to_string()));
        };
        tracing::debug!(run_id = %task.run_id, queue_type = %task.queue_type, "dispatching work task");
        tokio::spawn(route(Arc::clone(handlers), task));
        Ok(())
    }
}

// ============================================================================
// SECTION: Routing
// ============================================================================

/// Runs one dispatched task to completion on its own spawned task, logging
/// rather than propagating any failure since nothing awaits this future.
async fn route(handlers: Arc<Handlers>, task: WorkTask) {
    let now = Utc::now();
    let outcome = match task.queue_type.as_str() {
        "extraction" => handlers.extraction.execute(task.organization_id, task.run_id, now).await.map_err(|error| error.to_string()),
        "procedure" => run_procedure(&handlers, task.organization_id, task.run_id, now).await,
        _ => run_maintenance(&handlers, task.organization_id, task.run_id, now).await,
    };
    if let Err(error) = outcome {
        tracing::error!(run_id = %task.run_id, queue_type = %task.queue_type, %error, "work task failed");
    }
}

/// Drives a procedure Run; `ProcedureExecutor` finalizes the Run itself.
async fn run_procedure(handlers: &Handlers, organization_id: OrganizationId, run_id: RunId, now: DateTime<Utc>) -> Result<(), String> {
    let run = handlers.runs.get(organization_id, run_id).await.map_err(|error| error.to_string())?;
    handlers.procedures.execute(organization_id, run_id, run.config, now).await.map_err(|error| error.to_string())
}

/// Routes a `"maintenance"`-queued (or otherwise unrecognised) task by the
/// Run's own `run_type`, since `"maintenance"` fans out over six different
/// kinds of work (§4.11 queue registry).
async fn run_maintenance(handlers: &Handlers, organization_id: OrganizationId, run_id: RunId, now: DateTime<Utc>) -> Result<(), String> {
    let run = handlers.runs.get(organization_id, run_id).await.map_err(|error| error.to_string())?;
    if run.status.is_terminal() {
        return Ok(());
    }
    match run.run_type {
        RunType::Scrape => run_crawl(handlers, &run, now).await,
        RunType::SharepointSync => run_sharepoint_sync(handlers, &run, now).await,
        RunType::SamPull => run_sam_pull(handlers, &run, now).await,
        RunType::ExtractionEnhancement => run_enhancement(handlers, &run, now).await,
        RunType::Indexing => run_indexing(handlers, &run, now).await,
        RunType::SystemMaintenance => {
            handlers.runs.complete(organization_id, run_id, Json::Null).await.map_err(|error| error.to_string())?;
            Ok(())
        }
        RunType::Extraction | RunType::Procedure | RunType::Pipeline => {
            Err(format!("run {run_id} of type {:?} is not a maintenance-queue run type", run.run_type))
        }
    }
}

/// Drives a web crawl Run; the broker finalizes it since `CrawlOrchestrator`
/// does not.
async fn run_crawl(handlers: &Handlers, run: &Run, now: DateTime<Utc>) -> Result<(), String> {
    let Some(collection_id) = get_path(&run.config, "collection_id")
        .and_then(Json::as_str)
        .and_then(|value| ScrapeCollectionId::from_str(value).ok())
    else {
        return fail(handlers, run, "crawl run is missing a valid collection_id".to_string()).await;
    };
    match handlers.crawl.execute(run.organization_id, collection_id, run.id, now).await {
        Ok(summary) => complete(handlers, run, serde_json::to_value(summary).unwrap_or(Json::Null)).await,
        Err(error) => fail(handlers, run, error.to_string()).await,
    }
}

/// Drives a SharePoint sync Run; the broker finalizes it since
/// `SharePointSyncOrchestrator` does not.
async fn run_sharepoint_sync(handlers: &Handlers, run: &Run, now: DateTime<Utc>) -> Result<(), String> {
    let Some(sync_config_id) = get_path(&run.config, "sync_config_id")
        .and_then(Json::as_str)
        .and_then(|value| SharePointSyncConfigId::from_str(value).ok())
    else {
        return fail(handlers, run, "sharepoint sync run is missing a valid sync_config_id".to_string()).await;
    };
    let full_sync = get_path(&run.config, "full_sync").and_then(Json::as_bool).unwrap_or(false);
    match handlers.sharepoint.execute_sync(run.organization_id, sync_config_id, run.id, full_sync, now).await {
        Ok(summary) => complete(handlers, run, serde_json::to_value(summary).unwrap_or(Json::Null)).await,
        Err(error) => fail(handlers, run, error.to_string()).await,
    }
}

/// Drives a SAM.gov pull Run; the broker finalizes it since
/// `SamPullOrchestrator` does not.
async fn run_sam_pull(handlers: &Handlers, run: &Run, now: DateTime<Utc>) -> Result<(), String> {
    match handlers.sam_pull.execute(run.organization_id, run.id, &handlers.sam_pull_params, now).await {
        Ok(summary) => complete(handlers, run, serde_json::to_value(summary).unwrap_or(Json::Null)).await,
        Err(error) => fail(handlers, run, error.to_string()).await,
    }
}

/// Attempts a higher-fidelity re-extraction for an enhancement-eligible
/// asset, overwriting the processed markdown on success and falling back to
/// the existing basic-tier markdown on any failure, then dispatches the
/// Indexing follow-on the basic extraction path itself always queues.
async fn run_enhancement(handlers: &Handlers, run: &Run, now: DateTime<Utc>) -> Result<(), String> {
    let Some(asset_id) = run.input_asset_ids.first().copied() else {
        return fail(handlers, run, "enhancement run has no input asset".to_string()).await;
    };
    let mut asset = handlers.assets.get(run.organization_id, asset_id).await.map_err(|error| error.to_string())?;
    let key = markdown_object_key(&asset);
    let extension = asset.original_filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()).unwrap_or_default();

    if let Some(engine) = handlers.extractors.resolve_for_extension(&extension) {
        match handlers.objects.get_object(&asset.raw_bucket, &asset.raw_object_key).await {
            Ok(bytes) => match engine.extract(bytes, &asset.original_filename).await {
                Ok(outcome) if !outcome.markdown.trim().is_empty() => {
                    if let Err(error) = handlers.objects.put_object(PROCESSED_BUCKET, &key, outcome.markdown.into_bytes(), "text/markdown").await
                    {
                        tracing::warn!(asset_id = %asset_id, %error, "enhancement pass could not persist markdown, keeping basic extraction");
                    }
                }
                Ok(_) => tracing::warn!(asset_id = %asset_id, "enhancement pass returned empty markdown, keeping basic extraction"),
                Err(error) => tracing::warn!(asset_id = %asset_id, %error, "enhancement extraction failed, keeping basic extraction"),
            },
            Err(error) => tracing::warn!(asset_id = %asset_id, %error, "could not read raw content for enhancement pass"),
        }
    }

    asset.mark_enhanced(now);
    handlers.assets.save(asset).await.map_err(|error| error.to_string())?;
    complete(handlers, run, json!({"enhanced": true})).await?;

    let indexing_run = Run::new(run.organization_id, RunType::Indexing, RunOrigin::System, Json::Null, vec![asset_id], None, now);
    let indexing_run = handlers.runs.create(indexing_run).await.map_err(|error| error.to_string())?;
    handlers
        .dispatcher
        .dispatch(WorkTask { queue_type: "maintenance".to_string(), run_id: indexing_run.id, organization_id: run.organization_id })
        .await
        .map_err(|error| error.to_string())
}

/// Pushes an asset's processed markdown into the search index and finalizes
/// the indexing Run.
async fn run_indexing(handlers: &Handlers, run: &Run, _now: DateTime<Utc>) -> Result<(), String> {
    let Some(asset_id) = run.input_asset_ids.first().copied() else {
        return fail(handlers, run, "indexing run has no input asset".to_string()).await;
    };
    let asset = handlers.assets.get(run.organization_id, asset_id).await.map_err(|error| error.to_string())?;
    let key = markdown_object_key(&asset);
    let bytes = handlers.objects.get_object(PROCESSED_BUCKET, &key).await.map_err(|error| error.to_string())?;
    let markdown = String::from_utf8_lossy(&bytes);
    handlers.search_index.index_asset(run.organization_id, asset_id, &markdown).await.map_err(|error| error.to_string())?;
    complete(handlers, run, json!({"indexed": true})).await
}

/// Marks `run` complete with the given results summary.
async fn complete(handlers: &Handlers, run: &Run, results_summary: Json) -> Result<(), String> {
    handlers.runs.complete(run.organization_id, run.id, results_summary).await.map(|_| ()).map_err(|error| error.to_string())
}

/// Marks `run` failed with `message` as its error detail.
async fn fail(handlers: &Handlers, run: &Run, message: String) -> Result<(), String> {
    handlers
        .runs
        .update_status(run.organization_id, run.id, RunStatus::Failed, Some(message))
        .await
        .map(|_| ())
        .map_err(|error| error.to_string())
}
