// forge-ingest/src/crawl.rs
// ============================================================================
// Module: Crawl Orchestrator
// Description: Breadth-first URL frontier crawl of a scrape collection
//              (§4.8 C8).
// Dependencies: forge-core, forge-providers, forge-queue, forge-ingest::ports
// ============================================================================

//! ## Overview
//! [`CrawlOrchestrator::execute`] drains a collection's frontier up to
//! `max_pages`, renders each page, diffs it against the prior
//! [`ScrapedAsset`] by content hash, and routes markdown either straight to
//! a synthesized completed Run (inline extraction) or through
//! [`ExtractionQueue`] (everything else), exactly as C4 already does for
//! every other asset source.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use forge_core::asset::Asset;
use forge_core::asset::AssetStatus;
use forge_core::asset::AssetVersion;
use forge_core::asset::ExtractionTier;
use forge_core::asset::SourceType;
use forge_core::extraction::ExtractionResult;
use forge_core::hashing::ContentHash;
use forge_core::ids::AssetId;
use forge_core::ids::OrganizationId;
use forge_core::ids::RunId;
use forge_core::ids::ScrapeCollectionId;
use forge_core::ids::ScrapeSourceId;
use forge_core::ids::ScrapedAssetId;
use forge_core::interfaces::DispatchError;
use forge_core::interfaces::ObjectStore;
use forge_core::interfaces::ObjectStoreError;
use forge_core::interfaces::RunStore;
use forge_core::interfaces::StoreError;
use forge_core::run::LogLevel;
use forge_core::run::Run;
use forge_core::run::RunEventType;
use forge_core::run::RunOrigin;
use forge_core::run::RunStatus;
use forge_core::run::RunType;
use forge_core::scrape::CrawlConfig;
use forge_core::scrape::ScrapeMetadata;
use forge_core::scrape::ScrapedAsset;
use forge_core::scrape::ScrapedAssetKind;
use forge_providers::DocumentFetcher;
use forge_providers::RenderOutcome;
use forge_providers::RendererClient;
use forge_queue::AssetStore as QueueAssetStore;
use forge_queue::ExtractionQueue;
use forge_queue::ExtractionResultStore as QueueExtractionResultStore;
use forge_queue::PROCESSED_BUCKET;
use forge_queue::QueueError;
use forge_queue::RAW_BUCKET;
use forge_queue::markdown_object_key;
use serde::Serialize;
use serde_json::Value as Json;
use serde_json::json;
use thiserror::Error;

use crate::ports::AssetDedupeIndex;
use crate::ports::AssetVersionStore;
use crate::ports::ScrapeStore;
use crate::url_util;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised driving one crawl. A renderer/object-store failure on a
/// single URL is *not* one of these: it is caught, counted against
/// `pages_failed`, and the crawl moves on (§4.8 is page-level resilient by
/// design).
#[derive(Debug, Error)]
pub enum CrawlError {
    /// A persistence call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Queuing a follow-on extraction failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// Dispatch of an inline-extraction follow-on task failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

// ============================================================================
// SECTION: Summary
// ============================================================================

/// Terminal crawl summary (§4.8: "summarise ... and complete the Run").
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlSummary {
    /// Pages whose render attempt succeeded (new, updated, or unchanged).
    pub pages_crawled: u32,
    /// Pages seen for the first time at this URL.
    pub pages_new: u32,
    /// Pages whose content hash changed from a prior crawl.
    pub pages_updated: u32,
    /// Pages whose render attempt failed.
    pub pages_failed: u32,
    /// Total distinct URLs ever added to the frontier.
    pub urls_discovered: u32,
    /// URLs still queued when the crawl stopped (`max_pages` reached).
    pub urls_remaining: u32,
    /// Linked documents discovered on crawled pages.
    pub documents_discovered: u32,
    /// Linked documents actually downloaded (post extension filter and
    /// dedup).
    pub documents_downloaded: u32,
}

struct Frontier {
    queue: VecDeque<FrontierEntry>,
    visited: HashSet<String>,
    discovered: u32,
}

struct FrontierEntry {
    url: String,
    source_id: Option<ScrapeSourceId>,
    depth: u32,
}

impl Frontier {
    fn new() -> Self {
        Self { queue: VecDeque::new(), visited: HashSet::new(), discovered: 0 }
    }

    /// Enqueues `url` if its normalized form has not already been seen.
    fn offer(&mut self, url: &str, source_id: Option<ScrapeSourceId>, depth: u32) {
        let Some(normalized) = url_util::normalize(url) else { return };
        if self.visited.contains(&normalized) {
            return;
        }
        self.visited.insert(normalized.clone());
        self.discovered += 1;
        self.queue.push_back(FrontierEntry { url: normalized, source_id, depth });
    }

    fn pop(&mut self) -> Option<FrontierEntry> {
        self.queue.pop_front()
    }
}

fn url_path(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    match rest.split_once('/') {
        Some((_, path)) => format!("/{path}"),
        None => "/".to_string(),
    }
}

// ============================================================================
// SECTION: CrawlOrchestrator
// ============================================================================

/// Drives one crawl Run end to end (§4.8 C8).
pub struct CrawlOrchestrator {
    runs: Arc<dyn RunStore>,
    collections: Arc<dyn ScrapeStore>,
    assets: Arc<dyn QueueAssetStore>,
    extraction_results: Arc<dyn QueueExtractionResultStore>,
    asset_versions: Arc<dyn AssetVersionStore>,
    dedupe: Arc<dyn AssetDedupeIndex>,
    objects: Arc<dyn ObjectStore>,
    renderer: Arc<dyn RendererClient>,
    documents: Arc<dyn DocumentFetcher>,
    extraction_queue: Arc<ExtractionQueue>,
}

impl CrawlOrchestrator {
    /// Wires the orchestrator to its dependencies.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "mirrors the orchestrator's own dependency count")]
    pub fn new(
        runs: Arc<dyn RunStore>,
        collections: Arc<dyn ScrapeStore>,
        assets: Arc<dyn QueueAssetStore>,
        extraction_results: Arc<dyn QueueExtractionResultStore>,
        asset_versions: Arc<dyn AssetVersionStore>,
        dedupe: Arc<dyn AssetDedupeIndex>,
        objects: Arc<dyn ObjectStore>,
        renderer: Arc<dyn RendererClient>,
        documents: Arc<dyn DocumentFetcher>,
        extraction_queue: Arc<ExtractionQueue>,
    ) -> Self {
        Self { runs, collections, assets, extraction_results, asset_versions, dedupe, objects, renderer, documents, extraction_queue }
    }

    /// Runs the full crawl for `collection_id`, reporting progress and
    /// errors on `run_id` (§4.8).
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] on a persistence or dispatch failure.
    pub async fn execute(
        &self,
        organization_id: OrganizationId,
        collection_id: ScrapeCollectionId,
        run_id: RunId,
        now: DateTime<Utc>,
    ) -> Result<CrawlSummary, CrawlError> {
        let collection = self.collections.get_collection(organization_id, collection_id).await?;
        let sources = self.collections.list_active_sources(collection_id).await?;
        let config = collection.config.clone();

        let mut frontier = Frontier::new();
        for source in &sources {
            frontier.offer(&source.url, Some(source.id), 0);
        }

        let mut summary = CrawlSummary::default();

        while summary.pages_crawled + summary.pages_failed < config.max_pages {
            let Some(entry) = frontier.pop() else { break };
            if config.max_depth != 0 && entry.depth > config.max_depth {
                continue;
            }
            let path = url_path(&entry.url);
            if !url_util::path_allowed(&path, &config.include_patterns, &config.exclude_patterns) {
                continue;
            }

            match self.renderer.render(&entry.url).await {
                Ok(outcome) => {
                    self.process_page(organization_id, collection_id, &collection.slug, &config, &entry, outcome, now, &mut summary, &mut frontier)
                        .await?;
                }
                Err(error) => {
                    summary.pages_failed += 1;
                    self.runs
                        .append_log(
                            run_id,
                            LogLevel::Warn,
                            RunEventType::Progress,
                            format!("render failed for {}: {error}", entry.url),
                            Json::Null,
                        )
                        .await?;
                }
            }

            let processed = summary.pages_crawled + summary.pages_failed;
            self.runs
                .update_progress(organization_id, run_id, u64::from(processed), u64::from(config.max_pages.min(frontier.discovered)), Some("pages".to_string()))
                .await?;

            if config.delay_seconds > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(config.delay_seconds)).await;
            }
        }

        summary.urls_discovered = frontier.discovered;
        summary.urls_remaining = u32::try_from(frontier.queue.len()).unwrap_or(u32::MAX);

        self.runs.complete(organization_id, run_id, serde_json::to_value(&summary).unwrap_or(Json::Null)).await?;
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments, reason = "one crawl step needs its full context")]
    async fn process_page(
        &self,
        organization_id: OrganizationId,
        collection_id: ScrapeCollectionId,
        collection_slug: &str,
        config: &CrawlConfig,
        entry: &FrontierEntry,
        outcome: RenderOutcome,
        now: DateTime<Utc>,
        summary: &mut CrawlSummary,
        frontier: &mut Frontier,
    ) -> Result<(), CrawlError> {
        summary.pages_crawled += 1;
        let content_hash = ContentHash::of(outcome.html.as_bytes());
        let filename = filename_for_url(&entry.url);

        let existing = self.collections.find_scraped_asset(collection_id, &entry.url).await?;
        let mut extraction_candidate: Option<Asset> = None;

        match existing {
            Some(mut scraped) if scraped.is_unchanged(&content_hash) => {
                scraped.record_unchanged(now);
                self.collections.save_scraped_asset(scraped).await?;
            }
            Some(mut scraped) => {
                let mut asset = self.assets.get(organization_id, scraped.asset_id).await?;
                let raw_key = raw_page_key(organization_id, collection_slug, &filename);
                self.objects.put_object(RAW_BUCKET, &raw_key, outcome.html.clone().into_bytes(), "text/html").await.map_err(store_error_from_object)?;
                let version = AssetVersion {
                    asset_id: asset.id,
                    version_number: asset.current_version_number + 1,
                    raw_bucket: RAW_BUCKET.to_string(),
                    raw_object_key: raw_key.clone(),
                    file_size: u64::try_from(outcome.html.len()).unwrap_or(u64::MAX),
                    file_hash: content_hash.clone(),
                    content_type: "text/html".to_string(),
                    is_current: true,
                    created_at: now,
                    created_by: None,
                };
                self.asset_versions.create(version).await?;
                asset.raw_bucket = RAW_BUCKET.to_string();
                asset.raw_object_key = raw_key;
                asset.file_size = u64::try_from(outcome.html.len()).unwrap_or(u64::MAX);
                asset.file_hash = content_hash.clone();
                asset.current_version_number += 1;
                asset.status = AssetStatus::Pending;
                asset.updated_at = now;
                let asset = self.assets.save(asset).await?;

                scraped.record_new_version(content_hash.clone(), now);
                self.collections.save_scraped_asset(scraped).await?;
                summary.pages_updated += 1;
                extraction_candidate = Some(asset);
            }
            None => {
                let raw_key = raw_page_key(organization_id, collection_slug, &filename);
                self.objects.put_object(RAW_BUCKET, &raw_key, outcome.html.clone().into_bytes(), "text/html").await.map_err(store_error_from_object)?;
                let asset = Asset {
                    id: AssetId::new(),
                    organization_id,
                    source_type: SourceType::WebScrape,
                    source_metadata: json!({ "collection_slug": collection_slug, "source_url": entry.url }),
                    original_filename: filename.clone(),
                    content_type: "text/html".to_string(),
                    file_size: u64::try_from(outcome.html.len()).unwrap_or(u64::MAX),
                    file_hash: content_hash.clone(),
                    raw_bucket: RAW_BUCKET.to_string(),
                    raw_object_key: raw_key,
                    status: AssetStatus::Pending,
                    current_version_number: 1,
                    extraction_tier: ExtractionTier::None,
                    enhancement_eligible: false,
                    enhancement_queued_at: None,
                    created_at: now,
                    updated_at: now,
                    created_by: None,
                };
                let asset = self.assets.save(asset).await?;
                self.asset_versions
                    .create(AssetVersion::first(asset.id, RAW_BUCKET, asset.raw_object_key.clone(), asset.file_size, content_hash.clone(), "text/html", None, now))
                    .await?;

                let scraped = ScrapedAsset {
                    id: ScrapedAssetId::new(),
                    collection_id,
                    asset_id: asset.id,
                    source_id: entry.source_id,
                    normalized_url: entry.url.clone(),
                    kind: ScrapedAssetKind::Page,
                    scrape_metadata: ScrapeMetadata { content_hash: content_hash.clone(), version_count: 1 },
                    depth: entry.depth,
                    last_crawled_at: now,
                };
                self.collections.save_scraped_asset(scraped).await?;
                summary.pages_new += 1;
                extraction_candidate = Some(asset);
            }
        }

        if let Some(asset) = extraction_candidate {
            if let Some(markdown) = &outcome.markdown {
                self.extract_inline(organization_id, asset, markdown, now).await?;
            } else {
                self.extraction_queue.queue_extraction(organization_id, &asset, RunOrigin::System, 0, None, None, now).await?;
            }
        }

        for link in &outcome.links {
            if config.follow_external_links || url_util::same_domain(&entry.url, link) {
                frontier.offer(link, entry.source_id, entry.depth + 1);
            }
        }

        if !outcome.document_links.is_empty() {
            summary.documents_discovered += u32::try_from(outcome.document_links.len()).unwrap_or(0);
            self.download_documents(organization_id, collection_id, collection_slug, config, &outcome.document_links, now, summary).await?;
        }

        Ok(())
    }

    async fn extract_inline(&self, organization_id: OrganizationId, mut asset: Asset, markdown: &str, now: DateTime<Utc>) -> Result<(), CrawlError> {
        let run = Run::new(organization_id, RunType::Extraction, RunOrigin::System, json!({ "inline": true }), vec![asset.id], None, now);
        let run = self.runs.create(run).await?;
        self.runs.update_status(organization_id, run.id, RunStatus::Running, None).await?;

        let mut result = ExtractionResult::new(asset.id, None, run.id, "inline:renderer".to_string(), ExtractionTier::Basic, now);
        let object_key = markdown_object_key(&asset);
        self.objects.put_object(PROCESSED_BUCKET, &object_key, markdown.as_bytes().to_vec(), "text/markdown").await.map_err(store_error_from_object)?;
        result.complete(PROCESSED_BUCKET, object_key, Vec::new(), 0.0, Json::Null);
        self.extraction_results.create(result).await?;

        asset.mark_extraction_ready(false, now);
        self.assets.save(asset).await?;

        self.runs.complete(organization_id, run.id, json!({ "source": "inline_crawl" })).await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments, reason = "document download needs its full context")]
    async fn download_documents(
        &self,
        organization_id: OrganizationId,
        collection_id: ScrapeCollectionId,
        collection_slug: &str,
        config: &CrawlConfig,
        links: &[String],
        now: DateTime<Utc>,
        summary: &mut CrawlSummary,
    ) -> Result<(), CrawlError> {
        if !config.download_documents {
            return Ok(());
        }
        for link in links {
            let filename = filename_for_url(link);
            let extension = file_extension(&filename);
            if !config.document_extensions.is_empty() && !config.document_extensions.iter().any(|candidate| candidate.eq_ignore_ascii_case(&extension)) {
                continue;
            }
            let Ok(bytes) = self.documents.fetch(link).await else { continue };
            let hash = ContentHash::of(&bytes);

            if let Some(existing_asset_id) = self.dedupe.find_by_hash(organization_id, &hash).await? {
                let scraped = ScrapedAsset {
                    id: ScrapedAssetId::new(),
                    collection_id,
                    asset_id: existing_asset_id,
                    source_id: None,
                    normalized_url: link.clone(),
                    kind: ScrapedAssetKind::Document,
                    scrape_metadata: ScrapeMetadata { content_hash: hash, version_count: 1 },
                    depth: 0,
                    last_crawled_at: now,
                };
                self.collections.save_scraped_asset(scraped).await?;
                continue;
            }

            let content_type = content_type_for_extension(&extension);
            let raw_key = document_key(organization_id, collection_slug, &filename);
            self.objects.put_object(RAW_BUCKET, &raw_key, bytes.clone(), content_type).await.map_err(store_error_from_object)?;

            let asset = Asset {
                id: AssetId::new(),
                organization_id,
                source_type: SourceType::WebScrapeDocument,
                source_metadata: json!({ "collection_slug": collection_slug, "source_url": link }),
                original_filename: filename,
                content_type: content_type.to_string(),
                file_size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
                file_hash: hash.clone(),
                raw_bucket: RAW_BUCKET.to_string(),
                raw_object_key: raw_key,
                status: AssetStatus::Pending,
                current_version_number: 1,
                extraction_tier: ExtractionTier::None,
                enhancement_eligible: false,
                enhancement_queued_at: None,
                created_at: now,
                updated_at: now,
                created_by: None,
            };
            let asset = self.assets.save(asset).await?;
            self.asset_versions
                .create(AssetVersion::first(asset.id, RAW_BUCKET, asset.raw_object_key.clone(), asset.file_size, hash.clone(), content_type, None, now))
                .await?;

            let scraped = ScrapedAsset {
                id: ScrapedAssetId::new(),
                collection_id,
                asset_id: asset.id,
                source_id: None,
                normalized_url: link.clone(),
                kind: ScrapedAssetKind::Document,
                scrape_metadata: ScrapeMetadata { content_hash: hash, version_count: 1 },
                depth: 0,
                last_crawled_at: now,
            };
            self.collections.save_scraped_asset(scraped).await?;

            self.extraction_queue.queue_extraction(organization_id, &asset, RunOrigin::System, 0, None, None, now).await?;
            summary.documents_downloaded += 1;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Storage Key Helpers
// ============================================================================

fn filename_for_url(url: &str) -> String {
    let path = url_path(url);
    let last = path.rsplit('/').find(|segment| !segment.is_empty()).unwrap_or("index");
    if last.contains('.') {
        last.to_string()
    } else {
        format!("{last}.html")
    }
}

fn file_extension(filename: &str) -> String {
    filename.rsplit_once('.').map(|(_, extension)| extension.to_ascii_lowercase()).unwrap_or_default()
}

fn content_type_for_extension(extension: &str) -> &'static str {
    match extension {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        _ => "application/octet-stream",
    }
}

fn raw_page_key(organization_id: OrganizationId, collection_slug: &str, filename: &str) -> String {
    format!("{organization_id}/scrape/{collection_slug}/pages/{filename}")
}

fn document_key(organization_id: OrganizationId, collection_slug: &str, filename: &str) -> String {
    format!("{organization_id}/scrape/{collection_slug}/documents/{filename}")
}

fn store_error_from_object(error: ObjectStoreError) -> StoreError {
    StoreError::Io(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_for_url_falls_back_to_index_html() {
        assert_eq!(filename_for_url("https://example.com/"), "index.html");
    }

    #[test]
    fn filename_for_url_keeps_existing_extension() {
        assert_eq!(filename_for_url("https://example.com/docs/report.pdf"), "report.pdf");
    }

    #[test]
    fn file_extension_is_lowercased() {
        assert_eq!(file_extension("Report.PDF"), "pdf");
    }

    #[test]
    fn url_path_extracts_path_with_leading_slash() {
        assert_eq!(url_path("https://example.com/docs/guide"), "/docs/guide");
        assert_eq!(url_path("https://example.com"), "/");
    }
}
