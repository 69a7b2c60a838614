// forge-queue/src/orchestrator.rs
// ============================================================================
// Module: Extraction Orchestrator
// Description: Drives a single extraction end to end: download, extract,
//              persist, and enqueue the follow-on work (§4.4).
// Dependencies: forge-core, forge-providers, forge-queue::ports
// ============================================================================

//! ## Overview
//! [`ExtractionOrchestrator::execute`] is what a worker calls when it pops a
//! `WorkTask` off the extraction queue. It is idempotent on a Run's terminal
//! state so a redelivered task is a safe no-op (§4.3 Restart resilience).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use forge_core::asset::Asset;
use forge_core::asset::SourceType;
use forge_core::extraction::ExtractionResult;
use forge_core::extraction::ExtractionStatus;
use forge_core::ids::OrganizationId;
use forge_core::ids::RunId;
use forge_core::interfaces::DispatchError;
use forge_core::interfaces::ObjectStore;
use forge_core::interfaces::ObjectStoreError;
use forge_core::interfaces::RunStore;
use forge_core::interfaces::StoreError;
use forge_core::interfaces::WorkDispatcher;
use forge_core::interfaces::WorkTask;
use forge_core::run::LogLevel;
use forge_core::run::Run;
use forge_core::run::RunEventType;
use forge_core::run::RunOrigin;
use forge_core::run::RunStatus;
use forge_core::run::RunType;
use forge_core::value::get_path;
use forge_providers::error::ProviderError;
use forge_providers::extractor::ExtractorRegistry;
use serde_json::Value as Json;
use serde_json::json;
use thiserror::Error;

use crate::ports::AssetStore;
use crate::ports::ExtractionResultStore;

// ============================================================================
// SECTION: Storage policy
// ============================================================================

/// Bucket holding raw uploaded/crawled/synced originals (§6.3).
pub const RAW_BUCKET: &str = "uploads";
/// Bucket holding extracted markdown (§6.3).
pub const PROCESSED_BUCKET: &str = "processed";

/// Builds the deterministic processed-markdown key for an asset, per source
/// type (§4.4 Storage path policy).
#[must_use]
pub fn markdown_object_key(asset: &Asset) -> String {
    let filename = &asset.original_filename;
    match asset.source_type {
        SourceType::Upload | SourceType::SamGov => {
            format!("{}/uploads/{}/{filename}.md", asset.organization_id, asset.id)
        }
        SourceType::WebScrape | SourceType::WebScrapeDocument => {
            let collection_slug = get_path(&asset.source_metadata, "collection_slug")
                .and_then(Json::as_str)
                .unwrap_or("unknown-collection");
            format!("{}/scrape/{collection_slug}/documents/{filename}.md", asset.organization_id)
        }
        SourceType::Sharepoint => {
            let sync_slug = get_path(&asset.source_metadata, "sync_slug").and_then(Json::as_str).unwrap_or("unknown-sync");
            let relative_path =
                get_path(&asset.source_metadata, "relative_path").and_then(Json::as_str).unwrap_or("");
            format!("{}/sharepoint/{sync_slug}/{relative_path}/{filename}.md", asset.organization_id)
        }
    }
}

/// Extensions eligible for the enhancement pass, independent of which engine
/// ran the basic extraction (§4.4 step 7).
const ENHANCEMENT_ELIGIBLE_EXTENSIONS: &[&str] = &["pdf", "docx", "doc"];

fn is_enhancement_eligible(extension: &str) -> bool {
    ENHANCEMENT_ELIGIBLE_EXTENSIONS.iter().any(|candidate| candidate.eq_ignore_ascii_case(extension))
}

fn file_extension(filename: &str) -> String {
    filename.rsplit_once('.').map(|(_, extension)| extension.to_ascii_lowercase()).unwrap_or_default()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised driving one extraction. A provider/object-store failure
/// during the happy path is *not* one of these: it is caught and recorded as
/// an extraction failure (§4.4 step 10) instead of propagating.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A persistence call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Dispatch of a follow-on task failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// The Run named no input asset.
    #[error("extraction run {0} has no input asset")]
    MissingAsset(RunId),
}

// ============================================================================
// SECTION: ExtractionOrchestrator
// ============================================================================

/// Drives one extraction Run end to end (§4.4 C4).
pub struct ExtractionOrchestrator {
    runs: Arc<dyn RunStore>,
    assets: Arc<dyn AssetStore>,
    extraction_results: Arc<dyn ExtractionResultStore>,
    objects: Arc<dyn ObjectStore>,
    extractors: ExtractorRegistry,
    dispatcher: Arc<dyn WorkDispatcher>,
    enhancement_configured: bool,
}

impl ExtractionOrchestrator {
    /// Wires the orchestrator to its dependencies. `enhancement_configured`
    /// reflects whether an enhancement engine is present in configuration
    /// (§4.4 step 9).
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "mirrors the orchestrator's own dependency count")]
    pub fn new(
        runs: Arc<dyn RunStore>,
        assets: Arc<dyn AssetStore>,
        extraction_results: Arc<dyn ExtractionResultStore>,
        objects: Arc<dyn ObjectStore>,
        extractors: ExtractorRegistry,
        dispatcher: Arc<dyn WorkDispatcher>,
        enhancement_configured: bool,
    ) -> Self {
        Self { runs, assets, extraction_results, objects, extractors, dispatcher, enhancement_configured }
    }

    /// Runs the full extraction flow for `run_id` (§4.4 steps 1-10).
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] on a persistence or dispatch failure.
    /// Extractor/object-store failures are caught internally and recorded as
    /// an extraction failure rather than propagated.
    pub async fn execute(&self, organization_id: OrganizationId, run_id: RunId, now: DateTime<Utc>) -> Result<(), OrchestratorError> {
        let run = self.runs.get(organization_id, run_id).await?;
        if run.status.is_terminal() {
            return Ok(());
        }
        if run.status == RunStatus::Running {
            self.runs
                .append_log(run_id, LogLevel::Info, RunEventType::Restart, "Resuming extraction after restart".to_string(), Json::Null)
                .await?;
        }

        let asset_id = run.input_asset_ids.first().copied().ok_or(OrchestratorError::MissingAsset(run_id))?;
        let mut asset = self.assets.get(organization_id, asset_id).await?;
        let mut result = self.extraction_results.get_by_run(run_id).await?;
        if matches!(result.status, ExtractionStatus::Completed | ExtractionStatus::Failed) {
            return Ok(());
        }

        let extension = file_extension(&asset.original_filename);
        let Some(engine) = self.extractors.resolve_for_extension(&extension) else {
            let formats = self.extractors.all_supported_formats();
            let engine_name =
                self.extractors.default_engine().map(|engine| engine.engine_name().to_string()).unwrap_or_else(|| "none".to_string());
            let message = format!(
                "extension '.{extension}' is not supported by the configured engine '{engine_name}' (supports: {})",
                formats.join(", ")
            );
            self.record_failure(organization_id, run, asset, result, vec![message], now).await?;
            return Ok(());
        };

        self.runs.update_status(organization_id, run_id, RunStatus::Running, None).await?;
        result.start();
        result = self.extraction_results.save(result).await?;
        self.runs
            .append_log(
                run_id,
                LogLevel::Info,
                RunEventType::Progress,
                format!("Starting extraction for asset {asset_id}"),
                Json::Null,
            )
            .await?;

        let bytes = match self.objects.get_object(&asset.raw_bucket, &asset.raw_object_key).await {
            Ok(bytes) => bytes,
            Err(error) => {
                self.record_failure(organization_id, run, asset, result, vec![object_store_error_message(&error)], now).await?;
                return Ok(());
            }
        };

        let extraction_started_at = std::time::Instant::now();
        let outcome = engine.extract(bytes, &asset.original_filename).await;
        let elapsed_seconds = extraction_started_at.elapsed().as_secs_f64();

        let outcome = match outcome {
            Ok(outcome) if !outcome.markdown.trim().is_empty() => outcome,
            Ok(_empty) => {
                self.record_failure(organization_id, run, asset, result, vec!["extractor returned empty markdown".to_string()], now)
                    .await?;
                return Ok(());
            }
            Err(error) => {
                self.record_failure(organization_id, run, asset, result, vec![provider_error_message(&error)], now).await?;
                return Ok(());
            }
        };

        let object_key = markdown_object_key(&asset);
        if let Err(error) =
            self.objects.put_object(PROCESSED_BUCKET, &object_key, outcome.markdown.clone().into_bytes(), "text/markdown").await
        {
            self.record_failure(organization_id, run, asset, result, vec![object_store_error_message(&error)], now).await?;
            return Ok(());
        }

        let markdown_length = outcome.markdown.len();
        result.complete(PROCESSED_BUCKET, object_key, outcome.warnings.clone(), elapsed_seconds, outcome.engine_info.clone());
        self.extraction_results.save(result).await?;

        let enhancement_eligible = is_enhancement_eligible(&extension);
        asset.mark_extraction_ready(enhancement_eligible, now);
        let mut asset = self.assets.save(asset).await?;

        let summary = json!({
            "extraction_time": elapsed_seconds,
            "markdown_length": markdown_length,
            "warnings_count": outcome.warnings.len(),
            "engine": engine.engine_name(),
            "engine_name": engine.engine_name(),
        });
        self.runs.complete(organization_id, run_id, summary).await?;

        if enhancement_eligible && self.enhancement_configured {
            let enhancement_run = Run::new(
                organization_id,
                RunType::ExtractionEnhancement,
                RunOrigin::System,
                json!({ "priority": 0 }),
                vec![asset_id],
                None,
                now,
            );
            let enhancement_run = self.runs.create(enhancement_run).await?;
            asset.mark_enhancement_queued(now);
            self.assets.save(asset).await?;
            self.dispatcher
                .dispatch(WorkTask { queue_type: "maintenance".to_string(), run_id: enhancement_run.id, organization_id })
                .await?;
        } else {
            let indexing_run = Run::new(organization_id, RunType::Indexing, RunOrigin::System, Json::Null, vec![asset_id], None, now);
            let indexing_run = self.runs.create(indexing_run).await?;
            self.dispatcher
                .dispatch(WorkTask { queue_type: "maintenance".to_string(), run_id: indexing_run.id, organization_id })
                .await?;
        }

        Ok(())
    }

    /// Records a failed extraction attempt: extraction `failed`, asset
    /// `failed`, Run `failed`, ERROR log (§4.4 step 10).
    async fn record_failure(
        &self,
        organization_id: OrganizationId,
        run: Run,
        mut asset: Asset,
        mut result: ExtractionResult,
        errors: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        let message = errors.join("; ");
        result.fail(errors);
        self.extraction_results.save(result).await?;

        asset.mark_extraction_failed(now);
        self.assets.save(asset).await?;

        self.runs.update_status(organization_id, run.id, RunStatus::Failed, Some(message.clone())).await?;
        self.runs.append_log(run.id, LogLevel::Error, RunEventType::StepError, message, Json::Null).await?;
        Ok(())
    }
}

fn object_store_error_message(error: &ObjectStoreError) -> String {
    error.to_string()
}

fn provider_error_message(error: &ProviderError) -> String {
    error.to_string()
}

#[cfg(test)]
mod tests {
    use forge_core::asset::AssetStatus;
    use forge_core::asset::ExtractionTier;
    use forge_core::hashing::ContentHash;
    use forge_core::ids::AssetId;

    use super::*;

    fn now() -> DateTime<Utc> {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        DateTime::<Utc>::from_timestamp(0, 0).unwrap()
    }

    fn upload_asset() -> Asset {
        Asset {
            id: AssetId::new(),
            organization_id: OrganizationId::new(),
            source_type: SourceType::Upload,
            source_metadata: json!({}),
            original_filename: "report.pdf".into(),
            content_type: "application/pdf".into(),
            file_size: 10,
            file_hash: ContentHash::of(b"a"),
            raw_bucket: RAW_BUCKET.into(),
            raw_object_key: "org/uploads/asset/report.pdf".into(),
            status: AssetStatus::Pending,
            current_version_number: 1,
            extraction_tier: ExtractionTier::None,
            enhancement_eligible: false,
            enhancement_queued_at: None,
            created_at: now(),
            updated_at: now(),
            created_by: None,
        }
    }

    #[test]
    fn markdown_key_for_upload_follows_policy() {
        let asset = upload_asset();
        let key = markdown_object_key(&asset);
        assert_eq!(key, format!("{}/uploads/{}/report.pdf.md", asset.organization_id, asset.id));
    }

    #[test]
    fn markdown_key_for_scrape_reads_collection_slug() {
        let mut asset = upload_asset();
        asset.source_type = SourceType::WebScrape;
        asset.source_metadata = json!({"collection_slug": "rfps"});
        asset.original_filename = "page.html".into();
        let key = markdown_object_key(&asset);
        assert_eq!(key, format!("{}/scrape/rfps/documents/page.html.md", asset.organization_id));
    }

    #[test]
    fn pdf_and_docx_are_enhancement_eligible() {
        assert!(is_enhancement_eligible("pdf"));
        assert!(is_enhancement_eligible("DOCX"));
        assert!(!is_enhancement_eligible("txt"));
    }

    #[test]
    fn file_extension_is_lowercased_without_dot() {
        assert_eq!(file_extension("Report.PDF"), "pdf");
        assert_eq!(file_extension("noext"), "");
    }
}
