// forge-queue/src/lib.rs
// ============================================================================
// Crate: forge-queue
// Description: The extraction queue (C3), extraction orchestrator (C4), and
//              queue registry (C4.11).
// Dependencies: forge-core, forge-providers
// ============================================================================

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, missing_docs))]

//! ## Overview
//! Every caller that needs an asset extracted — bulk upload, crawl, SharePoint
//! sync, SAM pull, or a user-initiated reextract — goes through
//! [`queue::ExtractionQueue`]. A worker that pops a queued task drives it to
//! completion with [`orchestrator::ExtractionOrchestrator`]. [`registry::QueueRegistry`]
//! holds the fixed queue identities both consult.

pub mod orchestrator;
pub mod ports;
pub mod queue;
pub mod registry;

pub use orchestrator::ExtractionOrchestrator;
pub use orchestrator::OrchestratorError;
pub use orchestrator::PROCESSED_BUCKET;
pub use orchestrator::RAW_BUCKET;
pub use orchestrator::markdown_object_key;
pub use ports::AssetStore;
pub use ports::ExtractionResultStore;
pub use queue::ExtractionQueue;
pub use queue::QueueError;
pub use queue::QueueOutcome;
pub use queue::is_inline_extracted_content_type;
pub use registry::QueueCapabilities;
pub use registry::QueueDefinition;
pub use registry::QueueDisplay;
pub use registry::QueueParameters;
pub use registry::QueueRegistry;
