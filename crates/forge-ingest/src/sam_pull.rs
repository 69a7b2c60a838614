// forge-ingest/src/sam_pull.rs
// ============================================================================
// Module: SAM Pull Orchestrator
// Description: Paginated SAM.gov opportunity feed ingestion, budget-checked
//              per page (§4.10 C10).
// Dependencies: forge-core, forge-providers, forge-queue, forge-ingest::ports
// ============================================================================

//! ## Overview
//! [`SamPullOrchestrator::execute`] pages through the opportunities feed,
//! upserting a [`Solicitation`]/[`Notice`] pair per record and optionally
//! downloading an attachment through the normal extraction pipeline. Before
//! every page it asks [`BudgetStore`] for the tenant's [`ApiCallBudget`] and
//! halts cleanly, rather than erroring, once the budget is exhausted (§4.10).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use chrono::DateTime;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use forge_core::asset::Asset;
use forge_core::asset::AssetStatus;
use forge_core::asset::AssetVersion;
use forge_core::asset::ExtractionTier;
use forge_core::asset::SourceType;
use forge_core::hashing::ContentHash;
use forge_core::ids::AssetId;
use forge_core::ids::OrganizationId;
use forge_core::ids::RunId;
use forge_core::interfaces::ObjectStore;
use forge_core::interfaces::ObjectStoreError;
use forge_core::interfaces::RunStore;
use forge_core::interfaces::StoreError;
use forge_core::run::RunOrigin;
use forge_core::sam::Notice;
use forge_core::sam::Solicitation;
use forge_providers::ApiCallBudget;
use forge_providers::DocumentFetcher;
use forge_providers::SamClient;
use forge_queue::AssetStore as QueueAssetStore;
use forge_queue::ExtractionQueue;
use forge_queue::RAW_BUCKET;
use serde::Serialize;
use serde_json::Value as Json;
use thiserror::Error;

use crate::ports::BudgetStore;
use crate::ports::SamStore;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised driving one pull.
#[derive(Debug, Error)]
pub enum SamPullError {
    /// A persistence call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Queuing a follow-on extraction failed.
    #[error(transparent)]
    Queue(#[from] forge_queue::QueueError),
}

// ============================================================================
// SECTION: Pull Parameters
// ============================================================================

/// Per-call parameters for one pull (§4.10). Not a persisted entity: the
/// caller (the scheduled-task runner) supplies these from its own static
/// configuration each time it drives a pull.
#[derive(Debug, Clone)]
pub struct SamPullParams {
    /// Records requested per feed page.
    pub page_size: u32,
    /// Calls permitted per budget window, applied when no budget has been
    /// recorded yet or the window has elapsed.
    pub daily_call_limit: u32,
    /// Length of one budget window.
    pub budget_window: ChronoDuration,
    /// Whether to download each record's attachment, when the feed reports
    /// one.
    pub download_attachments: bool,
}

// ============================================================================
// SECTION: Summary
// ============================================================================

/// Terminal pull summary (§4.10).
#[derive(Debug, Clone, Default, Serialize)]
pub struct SamPullSummary {
    /// Feed pages actually fetched.
    pub pages_fetched: u32,
    /// Records observed across all fetched pages.
    pub records_observed: u32,
    /// Solicitations created for the first time.
    pub solicitations_new: u32,
    /// Solicitations re-observed and refreshed.
    pub solicitations_updated: u32,
    /// Notices recorded.
    pub notices_created: u32,
    /// Attachments downloaded.
    pub attachments_downloaded: u32,
    /// Whether the pull stopped early because the API call budget was
    /// exhausted (§4.10).
    pub halted_on_budget: bool,
}

// ============================================================================
// SECTION: SamPullOrchestrator
// ============================================================================

/// Drives one SAM.gov pull Run end to end (§4.10 C10).
pub struct SamPullOrchestrator {
    runs: Arc<dyn RunStore>,
    sam: Arc<dyn SamStore>,
    budgets: Arc<dyn BudgetStore>,
    client: Arc<dyn SamClient>,
    documents: Arc<dyn DocumentFetcher>,
    assets: Arc<dyn QueueAssetStore>,
    asset_versions: Arc<dyn crate::ports::AssetVersionStore>,
    objects: Arc<dyn ObjectStore>,
    extraction_queue: Arc<ExtractionQueue>,
}

impl SamPullOrchestrator {
    /// Wires the orchestrator to its dependencies.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "mirrors the orchestrator's own dependency count")]
    pub fn new(
        runs: Arc<dyn RunStore>,
        sam: Arc<dyn SamStore>,
        budgets: Arc<dyn BudgetStore>,
        client: Arc<dyn SamClient>,
        documents: Arc<dyn DocumentFetcher>,
        assets: Arc<dyn QueueAssetStore>,
        asset_versions: Arc<dyn crate::ports::AssetVersionStore>,
        objects: Arc<dyn ObjectStore>,
        extraction_queue: Arc<ExtractionQueue>,
    ) -> Self {
        Self { runs, sam, budgets, client, documents, assets, asset_versions, objects, extraction_queue }
    }

    /// Runs one pull for `organization_id` (§4.10).
    ///
    /// # Errors
    ///
    /// Returns [`SamPullError`] on a persistence or dispatch failure. A
    /// single page fetch failure is not an error: it stops pagination and
    /// the pull completes with what it already has.
    pub async fn execute(
        &self,
        organization_id: OrganizationId,
        run_id: RunId,
        params: &SamPullParams,
        now: DateTime<Utc>,
    ) -> Result<SamPullSummary, SamPullError> {
        let mut budget = self.budgets.load(organization_id).await?.unwrap_or_else(|| ApiCallBudget::new(params.daily_call_limit, now + params.budget_window));
        budget.refresh_if_expired(now, now + params.budget_window);

        let mut summary = SamPullSummary::default();
        let mut offset: u64 = 0;

        loop {
            if !budget.try_consume() {
                summary.halted_on_budget = true;
                break;
            }

            let Ok(page) = self.client.fetch_page(offset, params.page_size).await else {
                self.runs
                    .append_log(
                        run_id,
                        forge_core::run::LogLevel::Warn,
                        forge_core::run::RunEventType::Progress,
                        format!("sam.gov fetch failed at offset {offset}"),
                        Json::Null,
                    )
                    .await?;
                break;
            };
            summary.pages_fetched += 1;

            if page.records.is_empty() {
                break;
            }

            for record in &page.records {
                summary.records_observed += 1;
                self.ingest_record(organization_id, record, params, now, &mut summary).await?;
            }

            self.runs.update_progress(organization_id, run_id, offset + u64::try_from(page.records.len()).unwrap_or(0), page.total_records.unwrap_or(offset + u64::try_from(page.records.len()).unwrap_or(0)), Some("records".to_string())).await?;

            offset += u64::try_from(page.records.len()).unwrap_or(0);
            if let Some(total) = page.total_records {
                if offset >= total {
                    break;
                }
            }
        }

        self.budgets.save(organization_id, budget).await?;
        self.runs.complete(organization_id, run_id, serde_json::to_value(&summary).unwrap_or(Json::Null)).await?;
        Ok(summary)
    }

    async fn ingest_record(
        &self,
        organization_id: OrganizationId,
        record: &Json,
        params: &SamPullParams,
        now: DateTime<Utc>,
        summary: &mut SamPullSummary,
    ) -> Result<(), SamPullError> {
        let Some(notice_id) = record.get("noticeId").and_then(Json::as_str) else { return Ok(()) };
        let solicitation_number = record.get("solicitationNumber").and_then(Json::as_str).map(str::to_string);
        let title = record.get("title").and_then(Json::as_str).unwrap_or("untitled").to_string();
        let notice_type = record.get("noticeType").and_then(Json::as_str).unwrap_or("unknown").to_string();
        let posted_date = record
            .get("postedDate")
            .and_then(Json::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map_or(now, |parsed| parsed.with_timezone(&Utc));

        let solicitation = match self.sam.find_solicitation_by_notice_id(organization_id, notice_id).await? {
            Some(mut existing) => {
                existing.record_reobservation(solicitation_number, title, record.clone(), now);
                summary.solicitations_updated += 1;
                self.sam.save_solicitation(existing).await?
            }
            None => {
                let created = Solicitation::new(organization_id, notice_id, solicitation_number, title, record.clone(), now);
                summary.solicitations_new += 1;
                self.sam.save_solicitation(created).await?
            }
        };

        let notice = Notice::new(solicitation.id, notice_type, posted_date, record.clone(), now);
        self.sam.create_notice(notice).await?;
        summary.notices_created += 1;

        if params.download_attachments {
            if let Some(attachment_url) = record.get("attachmentUrl").and_then(Json::as_str) {
                if let Ok(bytes) = self.documents.fetch(attachment_url).await {
                    self.save_attachment(organization_id, notice_id, attachment_url, bytes, now).await?;
                    summary.attachments_downloaded += 1;
                }
            }
        }

        Ok(())
    }

    async fn save_attachment(
        &self,
        organization_id: OrganizationId,
        notice_id: &str,
        attachment_url: &str,
        bytes: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Result<(), SamPullError> {
        let hash = ContentHash::of(&bytes);
        let filename = attachment_filename(attachment_url);
        let raw_key = format!("{organization_id}/sam/{notice_id}/{filename}");
        self.objects.put_object(RAW_BUCKET, &raw_key, bytes.clone(), "application/octet-stream").await.map_err(store_error_from_object)?;

        let asset = Asset {
            id: AssetId::new(),
            organization_id,
            source_type: SourceType::SamGov,
            source_metadata: serde_json::json!({ "notice_id": notice_id, "source_url": attachment_url }),
            original_filename: filename,
            content_type: "application/octet-stream".to_string(),
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
            .create(AssetVersion::first(asset.id, RAW_BUCKET, asset.raw_object_key.clone(), asset.file_size, hash, "application/octet-stream", None, now))
            .await?;

        self.extraction_queue.queue_extraction(organization_id, &asset, RunOrigin::System, 0, None, None, now).await?;
        Ok(())
    }
}

fn attachment_filename(url: &str) -> String {
    let last = url.rsplit('/').find(|segment| !segment.is_empty()).unwrap_or("attachment");
    if last.contains('.') { last.to_string() } else { format!("{last}.bin") }
}

fn store_error_from_object(error: ObjectStoreError) -> StoreError {
    StoreError::Io(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_filename_falls_back_to_bin_extension() {
        assert_eq!(attachment_filename("https://sam.gov/files/abc/notice"), "notice.bin");
        assert_eq!(attachment_filename("https://sam.gov/files/abc/spec.pdf"), "spec.pdf");
    }
}
