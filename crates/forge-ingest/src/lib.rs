// forge-ingest/src/lib.rs
// ============================================================================
// Crate: forge-ingest
// Description: The crawl orchestrator (C8), SharePoint sync (C9), and SAM
//              pull (C10) — the three autonomous content-acquisition
//              pipelines.
// Dependencies: forge-core, forge-providers, forge-queue
// ============================================================================

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, missing_docs))]

//! ## Overview
//! Each pipeline here drives its own kind of Run end to end and, for any
//! asset it produces or changes, either synthesizes a completed extraction
//! inline (crawled HTML, via [`forge_queue::queue::is_inline_extracted_content_type`])
//! or hands it to [`forge_queue::ExtractionQueue`] — the same entry point
//! bulk upload and reextraction use (§4.3).

pub mod bulk_upload;
pub mod crawl;
pub mod ports;
pub mod sam_pull;
pub mod sharepoint_sync;
pub mod url_util;

pub use bulk_upload::classify;
pub use bulk_upload::CandidateFile;
pub use bulk_upload::Classification;
pub use bulk_upload::ExistingAsset;
pub use crawl::CrawlError;
pub use crawl::CrawlOrchestrator;
pub use crawl::CrawlSummary;
pub use ports::AssetDedupeIndex;
pub use ports::AssetVersionStore;
pub use ports::BudgetStore;
pub use ports::SamStore;
pub use ports::ScrapeStore;
pub use ports::SharePointStore;
pub use sam_pull::SamPullError;
pub use sam_pull::SamPullOrchestrator;
pub use sam_pull::SamPullParams;
pub use sam_pull::SamPullSummary;
pub use sharepoint_sync::SharePointSyncError;
pub use sharepoint_sync::SharePointSyncOrchestrator;
pub use sharepoint_sync::SharePointSyncSummary;
