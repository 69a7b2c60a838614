// forge-queue/src/queue.rs
// ============================================================================
// Module: Extraction Queue
// Description: Database-backed priority queue over pending extraction runs,
//              with duplicate suppression and a throttled submitter (§4.3).
// Dependencies: forge-core, forge-queue::{ports, registry}
// ============================================================================

//! ## Overview
//! [`ExtractionQueue::queue_extraction`] is the single entry point every
//! caller (bulk upload, crawl, SharePoint sync, SAM pull, reextract) goes
//! through before a worker ever sees an extraction. [`ExtractionQueue::submit_due`]
//! is the periodic tick that actually dispatches work, throttled by the
//! queue registry's `max_concurrent` (§4.11).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use forge_core::asset::Asset;
use forge_core::asset::ExtractionTier;
use forge_core::extraction::ExtractionResult;
use forge_core::ids::AssetId;
use forge_core::ids::OrganizationId;
use forge_core::ids::UserId;
use forge_core::interfaces::DispatchError;
use forge_core::interfaces::RunFilter;
use forge_core::interfaces::RunGroupStore;
use forge_core::interfaces::RunStore;
use forge_core::interfaces::StoreError;
use forge_core::interfaces::WorkDispatcher;
use forge_core::interfaces::WorkTask;
use forge_core::run::Run;
use forge_core::run::RunOrigin;
use forge_core::run::RunStatus;
use forge_core::run::RunType;
use forge_core::value::get_path_or_null;
use serde_json::Value as Json;
use serde_json::json;
use thiserror::Error;

use crate::ports::AssetStore;
use crate::ports::ExtractionResultStore;
use crate::registry::QueueRegistry;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by [`ExtractionQueue`] operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A persistence call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Dispatch to the worker pool failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// The registry has no entry for the requested queue type.
    #[error("unknown queue type: {0}")]
    UnknownQueue(String),
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Result of a [`ExtractionQueue::queue_extraction`] call.
#[derive(Debug)]
pub enum QueueOutcome {
    /// A new extraction run was created.
    Queued {
        /// The newly created run.
        run: Run,
        /// Its paired extraction result.
        result: ExtractionResult,
    },
    /// An existing run already covers this asset; no new row was created.
    AlreadyPending {
        /// The existing run.
        run: Run,
        /// Its paired extraction result.
        result: ExtractionResult,
    },
    /// The asset's content type is extracted inline at crawl time and does
    /// not need a worker (§4.3 skip rule).
    SkippedContentType,
}

/// Content types extracted inline by the crawl orchestrator rather than by a
/// worker (§4.3 skip rule).
const INLINE_EXTRACTED_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Whether `content_type` is extracted inline at crawl time.
#[must_use]
pub fn is_inline_extracted_content_type(content_type: &str) -> bool {
    INLINE_EXTRACTED_CONTENT_TYPES.iter().any(|candidate| candidate.eq_ignore_ascii_case(content_type))
}

// ============================================================================
// SECTION: ExtractionQueue
// ============================================================================

/// The extraction queue (§4.3 C3).
pub struct ExtractionQueue {
    runs: Arc<dyn RunStore>,
    run_groups: Arc<dyn RunGroupStore>,
    assets: Arc<dyn AssetStore>,
    extraction_results: Arc<dyn ExtractionResultStore>,
    dispatcher: Arc<dyn WorkDispatcher>,
    registry: QueueRegistry,
}

impl ExtractionQueue {
    /// Wires the queue to its dependencies.
    #[must_use]
    pub fn new(
        runs: Arc<dyn RunStore>,
        run_groups: Arc<dyn RunGroupStore>,
        assets: Arc<dyn AssetStore>,
        extraction_results: Arc<dyn ExtractionResultStore>,
        dispatcher: Arc<dyn WorkDispatcher>,
        registry: QueueRegistry,
    ) -> Self {
        Self { runs, run_groups, assets, extraction_results, dispatcher, registry }
    }

    /// The `RunGroupStore` this queue was built with, exposed for callers
    /// (e.g. the bulk-upload endpoint) that need to register children on
    /// the same backing store.
    #[must_use]
    pub fn run_groups(&self) -> &Arc<dyn RunGroupStore> {
        &self.run_groups
    }

    /// Queues an extraction for `asset`, applying the skip rule and
    /// duplicate suppression (§4.3).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] on a persistence failure.
    pub async fn queue_extraction(
        &self,
        organization_id: OrganizationId,
        asset: &Asset,
        origin: RunOrigin,
        priority: i32,
        user_id: Option<UserId>,
        extractor_version: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<QueueOutcome, QueueError> {
        if is_inline_extracted_content_type(&asset.content_type) {
            return Ok(QueueOutcome::SkippedContentType);
        }

        if priority > 0 {
            self.runs.cancel_pending_runs_for_asset(organization_id, asset.id, RunType::Extraction).await?;
        }

        if let Some((run_id, _result_id)) =
            self.extraction_results.find_active_for_asset(organization_id, asset.id).await?
        {
            let run = self.runs.get(organization_id, run_id).await?;
            let result = self.extraction_results.get_by_run(run_id).await?;
            return Ok(QueueOutcome::AlreadyPending { run, result });
        }

        let config = json!({
            "priority": priority,
            "extractor_version": extractor_version,
        });
        let run = Run::new(organization_id, RunType::Extraction, origin, config, vec![asset.id], user_id, now);
        let run = self.runs.create(run).await?;

        let result = ExtractionResult::new(
            asset.id,
            None,
            run.id,
            extractor_version.unwrap_or_default(),
            ExtractionTier::None,
            now,
        );
        let result = self.extraction_results.create(result).await?;

        Ok(QueueOutcome::Queued { run, result })
    }

    /// Convenience wrapper used by uploads: looks up the asset, then queues
    /// a system-origin, priority-0 extraction.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] on a persistence failure.
    pub async fn queue_extraction_for_asset(
        &self,
        organization_id: OrganizationId,
        asset_id: AssetId,
        now: DateTime<Utc>,
    ) -> Result<QueueOutcome, QueueError> {
        let asset = self.assets.get(organization_id, asset_id).await.map_err(QueueError::Store)?;
        self.queue_extraction(organization_id, &asset, RunOrigin::System, 0, None, None, now).await
    }

    /// One submitter tick for one tenant: dispatches up to `max_concurrent -
    /// in_flight` pending extractions, ordered `(-priority, enqueued_at)`
    /// (§4.3 throttled submission).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] on a persistence or dispatch failure.
    pub async fn submit_due(&self, organization_id: OrganizationId, now: DateTime<Utc>) -> Result<u32, QueueError> {
        let queue = self
            .registry
            .get("extraction")
            .ok_or_else(|| QueueError::UnknownQueue("extraction".to_string()))?;
        if !queue.parameters.enabled {
            return Ok(0);
        }

        let submitted = self
            .runs
            .list(organization_id, RunFilter { run_type: Some(RunType::Extraction), status: Some(RunStatus::Submitted), origin: None }, 10_000, 0)
            .await?;
        let running = self
            .runs
            .list(organization_id, RunFilter { run_type: Some(RunType::Extraction), status: Some(RunStatus::Running), origin: None }, 10_000, 0)
            .await?;
        let in_flight = u32::try_from(submitted.len() + running.len()).unwrap_or(u32::MAX);
        let budget = queue.parameters.max_concurrent.saturating_sub(in_flight);
        if budget == 0 {
            return Ok(0);
        }

        let mut pending = self
            .runs
            .list(organization_id, RunFilter { run_type: Some(RunType::Extraction), status: Some(RunStatus::Pending), origin: None }, 10_000, 0)
            .await?;
        pending.sort_by(|a, b| priority_of(a).cmp(&priority_of(b)).reverse().then(a.created_at.cmp(&b.created_at)));

        let mut submitted_count = 0u32;
        for run in pending.into_iter().take(budget as usize) {
            self.runs.update_status(organization_id, run.id, RunStatus::Submitted, None).await?;
            self.dispatcher
                .dispatch(WorkTask { queue_type: "extraction".to_string(), run_id: run.id, organization_id })
                .await?;
            submitted_count += 1;
        }
        Ok(submitted_count)
    }
}

fn priority_of(run: &Run) -> i64 {
    get_path_or_null(&run.config, "priority").as_i64().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_content_type_is_inline_extracted() {
        assert!(is_inline_extracted_content_type("text/html"));
        assert!(is_inline_extracted_content_type("TEXT/HTML"));
        assert!(!is_inline_extracted_content_type("application/pdf"));
    }

    #[test]
    fn priority_of_reads_config_field() {
        let run = Run::new(
            OrganizationId::new(),
            RunType::Extraction,
            RunOrigin::System,
            json!({"priority": 1}),
            Vec::new(),
            None,
            Utc::now(),
        );
        assert_eq!(priority_of(&run), 1);
    }

    #[test]
    fn priority_of_defaults_to_zero_when_absent() {
        let run = Run::new(OrganizationId::new(), RunType::Extraction, RunOrigin::System, Json::Null, Vec::new(), None, Utc::now());
        assert_eq!(priority_of(&run), 0);
    }
}
