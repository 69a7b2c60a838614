// forge-server/src/state.rs
// ============================================================================
// Module: App State
// Description: The composition root every handler reads from — a plain
//              struct of `Arc<dyn Trait>` collaborators, the same shape
//              `decision-gate-mcp::server::ServerState` uses.
// Dependencies: forge-core, forge-ingest, forge-queue, forge-scheduler
// ============================================================================

use std::sync::Arc;

use forge_core::interfaces::ObjectStore;
use forge_core::interfaces::RunGroupStore;
use forge_core::interfaces::RunStore;
use forge_queue::AssetStore;
use forge_queue::ExtractionQueue;
use forge_queue::ExtractionResultStore;
use forge_scheduler::ScheduledTaskStore;
use forge_scheduler::TaskDispatcher;

use crate::ports::AssetQueryStore;
use crate::ports::RunStatsStore;

/// Every collaborator a handler may need, wired once at startup by
/// `forge-cli` and shared behind an `Arc<AppState>` clone per request.
#[derive(Clone)]
pub struct AppState {
    /// Run persistence (§4.1 C1).
    pub runs: Arc<dyn RunStore>,
    /// RunGroup persistence (§4.2 C2).
    pub run_groups: Arc<dyn RunGroupStore>,
    /// Single-row asset persistence (§3).
    pub assets: Arc<dyn AssetStore>,
    /// Extraction result persistence (§4.3/§4.4).
    pub extraction_results: Arc<dyn ExtractionResultStore>,
    /// Asset listing, version history, health, and bulk-upload application
    /// (§6.1).
    pub asset_queries: Arc<dyn AssetQueryStore>,
    /// Aggregated Run stats (§6.1 `GET /runs/stats`).
    pub run_stats: Arc<dyn RunStatsStore>,
    /// The extraction queue every extraction-producing path shares (§4.3).
    pub extraction_queue: Arc<ExtractionQueue>,
    /// ScheduledTask CRUD (§6.1 `/scheduled-tasks`).
    pub scheduled_tasks: Arc<dyn ScheduledTaskStore>,
    /// Manual and periodic task materialisation (§4.6 C6).
    pub task_dispatcher: Arc<TaskDispatcher>,
    /// Raw object storage, for bulk-upload apply writing candidate bytes
    /// before the asset row exists (§6.3).
    pub object_store: Arc<dyn ObjectStore>,
}
