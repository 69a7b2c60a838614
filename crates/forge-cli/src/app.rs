// forge-cli/src/app.rs
// ============================================================================
// Module: App
// Description: The composition root. Wires every store, queue, provider,
//              and orchestrator into one `AppState` plus the background
//              collaborators `beat.rs` and `main.rs` drive directly.
// Purpose: Every other crate in the workspace defines a trait surface and a
//          concrete struct that implements part of the pipeline; nothing
//          until this crate actually builds one of each and hands them to
//          each other. That's this module's only job.
// Dependencies: forge-config, forge-core, forge-executor, forge-ingest,
//               forge-objectstore, forge-providers, forge-queue,
//               forge-scheduler, forge-server, forge-store-sqlite
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use forge_config::Config;
use forge_core::interfaces::ObjectStore;
use forge_core::interfaces::WorkDispatcher;
use forge_executor::ProcedureExecutor;
use forge_ingest::CrawlOrchestrator;
use forge_ingest::SamPullOrchestrator;
use forge_ingest::SamPullParams;
use forge_ingest::SharePointSyncOrchestrator;
use forge_objectstore::FilesystemObjectStore;
use forge_providers::ExtractorRegistry;
use forge_providers::HttpDocumentFetcher;
use forge_providers::HttpExtractorClient;
use forge_providers::HttpGraphClient;
use forge_providers::HttpRendererClient;
use forge_providers::HttpSamClient;
use forge_providers::HttpSearchIndexClient;
use forge_providers::NullSearchIndexClient;
use forge_providers::SearchIndexClient;
use forge_providers::SimpleHttpFetcher;
use forge_queue::ExtractionOrchestrator;
use forge_queue::ExtractionQueue;
use forge_queue::QueueRegistry;
use forge_scheduler::EventBus;
use forge_scheduler::TaskDispatcher;
use forge_server::AppState;
use forge_store_sqlite::SqliteStore;
use forge_store_sqlite::SqliteStoreConfig;

use crate::broker::Broker;
use crate::broker::Handlers;
use crate::error::CliError;
use crate::error::CliResult;
use crate::functions;
use crate::procedures::ProcedureCache;

/// Everything `main.rs` and `beat.rs` touch after startup: the HTTP state,
/// the periodic-tick collaborators, and the store used to enumerate
/// tenants for the per-organization extraction sweep.
pub struct App {
    /// Shared state handed to `forge_server::build_router`.
    pub state: Arc<AppState>,
    /// Materialises due scheduled tasks; ticked by `beat.rs`.
    pub task_dispatcher: Arc<TaskDispatcher>,
    /// Drains due submissions per tenant; ticked by `beat.rs`.
    pub extraction_queue: Arc<ExtractionQueue>,
    /// Event-trigger fan-out, exposed for the `events emit` CLI command.
    pub event_bus: Arc<EventBus>,
    /// Backing store, for `beat.rs`'s per-tenant enumeration.
    pub store: Arc<SqliteStore>,
}

/// Builds the full application from configuration.
///
/// # Errors
///
/// Returns [`CliError`] when any backing store, object store, or procedure
/// definition directory cannot be opened.
pub async fn build(config: &Config, db_path: &Path, procedures_dir: &Path) -> CliResult<App> {
    let store = Arc::new(SqliteStore::open(&SqliteStoreConfig::file(db_path))?);
    let objects = Arc::new(FilesystemObjectStore::open(config.storage.object_store_base_dir.clone()).await?);
    let procedures = Arc::new(ProcedureCache::load_dir(procedures_dir).map_err(CliError::Procedures)?);

    let extractors = build_extractor_registry(config)?;
    let search_index = build_search_index_client(config);
    let graph = Arc::new(HttpGraphClient::new(env_or_default("FORGE_GRAPH_BASE_URL"), env_or_default("FORGE_GRAPH_BEARER_TOKEN")));
    let sam_client = Arc::new(HttpSamClient::new(env_or_default("FORGE_SAM_BASE_URL"), env_or_default("FORGE_SAM_API_KEY")));
    let documents = Arc::new(HttpDocumentFetcher::new());
    let renderer = build_renderer(config);

    let broker = Arc::new(Broker::new());
    let dispatcher: Arc<dyn WorkDispatcher> = broker.clone();

    let queue_registry = {
        let mut registry = QueueRegistry::with_defaults();
        registry.apply_overrides(&config.queues);
        registry
    };

    let extraction_queue = Arc::new(ExtractionQueue::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::clone(&dispatcher),
        queue_registry,
    ));

    let enhancement_configured = config.extraction_engines.len() > 1;
    let extraction = Arc::new(ExtractionOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::clone(&objects) as Arc<dyn ObjectStore>,
        extractors.clone(),
        Arc::clone(&dispatcher),
        enhancement_configured,
    ));

    let crawl = Arc::new(CrawlOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::clone(&objects) as Arc<dyn ObjectStore>,
        renderer,
        documents.clone(),
        extraction_queue.clone(),
    ));

    let sharepoint = Arc::new(SharePointSyncOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::clone(&objects) as Arc<dyn ObjectStore>,
        graph,
        extraction_queue.clone(),
    ));

    let sam_pull_params = SamPullParams {
        page_size: 100,
        daily_call_limit: 1_000,
        budget_window: ChronoDuration::hours(24),
        download_attachments: true,
    };
    let sam_pull = Arc::new(SamPullOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        sam_client,
        documents,
        store.clone(),
        store.clone(),
        Arc::clone(&objects) as Arc<dyn ObjectStore>,
        extraction_queue.clone(),
    ));

    let procedure_executor = Arc::new(ProcedureExecutor::new(store.clone(), procedures.clone(), functions::builtins()));

    broker.install(Handlers {
        extraction,
        procedures: procedure_executor,
        crawl,
        sharepoint,
        sam_pull,
        sam_pull_params,
        runs: store.clone(),
        assets: store.clone(),
        objects: Arc::clone(&objects) as Arc<dyn ObjectStore>,
        extractors,
        search_index,
        dispatcher: Arc::clone(&dispatcher),
    });

    let task_dispatcher = Arc::new(TaskDispatcher::new(store.clone(), store.clone(), Arc::clone(&dispatcher)));
    let event_bus = Arc::new(EventBus::new(procedures.clone(), procedures, store.clone(), dispatcher));

    let state = Arc::new(AppState {
        runs: store.clone(),
        run_groups: store.clone(),
        assets: store.clone(),
        extraction_results: store.clone(),
        asset_queries: store.clone(),
        run_stats: store.clone(),
        extraction_queue: extraction_queue.clone(),
        scheduled_tasks: store.clone(),
        task_dispatcher: task_dispatcher.clone(),
        object_store: objects,
    });

    Ok(App { state, task_dispatcher, extraction_queue, event_bus, store })
}

/// Builds one [`HttpExtractorClient`] per configured engine, with the
/// entry marked `default` moved first so [`ExtractorRegistry::default_engine`]
/// resolves to it.
fn build_extractor_registry(config: &Config) -> CliResult<ExtractorRegistry> {
    let mut engines = config.extraction_engines.clone();
    engines.sort_by_key(|engine| !engine.default);
    let mut clients: Vec<Arc<dyn forge_providers::ExtractorClient>> = Vec::with_capacity(engines.len());
    for engine in engines {
        let client = HttpExtractorClient::new(engine.base_url, engine.name, engine.formats, Duration::from_secs(engine.timeout_seconds))?;
        clients.push(Arc::new(client));
    }
    Ok(ExtractorRegistry::new(clients))
}

/// Wires a real search-index client when `search.enabled`, otherwise a
/// no-op one (§6.5 search toggle).
fn build_search_index_client(config: &Config) -> Arc<dyn SearchIndexClient> {
    if config.search.enabled {
        let base_url = config.search.base_url.clone().unwrap_or_default();
        Arc::new(HttpSearchIndexClient::new(base_url))
    } else {
        Arc::new(NullSearchIndexClient)
    }
}

/// Wires a JS-rendering fetcher when `FORGE_RENDERER_BASE_URL` is set,
/// otherwise a plain HTTP fetcher with no rendering pass.
fn build_renderer(_config: &Config) -> Arc<dyn forge_providers::RendererClient> {
    match std::env::var("FORGE_RENDERER_BASE_URL") {
        Ok(base_url) if !base_url.trim().is_empty() => Arc::new(HttpRendererClient::new(base_url)),
        _ => Arc::new(SimpleHttpFetcher::new()),
    }
}

/// Reads an environment variable, logging and defaulting to empty when
/// absent rather than failing startup — not every deployment uses every
/// acquisition pipeline (crawl-only deployments need no Graph credentials,
/// for instance).
fn env_or_default(name: &'static str) -> String {
    std::env::var(name).unwrap_or_else(|_| {
        tracing::warn!(variable = name, "environment variable not set, using empty default");
        String::new()
    })
}

