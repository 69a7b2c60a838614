// forge-core/src/extraction.rs
// ============================================================================
// Module: Extraction Result
// Description: One attempt at converting a raw asset version to markdown.
// Purpose: Record extractor provenance, warnings, and errors for a single
//          extraction attempt, independent of the Run driving it.
// Dependencies: chrono, serde
// ============================================================================

//! ## Overview
//! [`ExtractionResult`] mirrors its owning [`crate::Run`]'s status (§3
//! ExtractionResult invariant): `completed` requires both the bucket and key
//! to be set, since that is what downstream readers (search indexing,
//! enhancement) depend on.

// ============================================================================
// SECTION: Imports
// ============================================================================

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

use crate::asset::ExtractionTier;
use crate::ids::AssetId;
use crate::ids::ExtractionResultId;
use crate::ids::RunId;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Lifecycle status of an [`ExtractionResult`], kept in lockstep with its
/// owning Run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// Queued, not yet started.
    Pending,
    /// Extraction in progress.
    Running,
    /// Extraction succeeded; `extracted_bucket`/`extracted_object_key` set.
    Completed,
    /// Extraction failed; `errors` non-empty.
    Failed,
}

// ============================================================================
// SECTION: ExtractionResult
// ============================================================================

/// One attempt at converting a raw asset version to markdown (§3
/// ExtractionResult).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Primary identifier.
    pub id: ExtractionResultId,
    /// The asset being extracted.
    pub asset_id: AssetId,
    /// The specific version extracted, when known.
    pub asset_version_id: Option<AssetId>,
    /// The Run driving this attempt.
    pub run_id: RunId,
    /// Identifier of the extractor engine/version used.
    pub extractor_version: String,
    /// Current status.
    pub status: ExtractionStatus,
    /// Object store bucket holding the extracted markdown, once completed.
    pub extracted_bucket: Option<String>,
    /// Object store key of the extracted markdown, once completed.
    pub extracted_object_key: Option<String>,
    /// Engine-reported structural metadata (headings, page count, …).
    pub structure_metadata: Json,
    /// Non-fatal warnings surfaced by the extractor.
    pub warnings: Vec<String>,
    /// Fatal errors, populated only on failure.
    pub errors: Vec<String>,
    /// Wall-clock extraction time.
    pub extraction_time_seconds: Option<f64>,
    /// Depth of extraction this attempt represents.
    pub extraction_tier: ExtractionTier,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ExtractionResult {
    /// Creates a new result in `pending` for a freshly queued extraction.
    #[must_use]
    pub fn new(
        asset_id: AssetId,
        asset_version_id: Option<AssetId>,
        run_id: RunId,
        extractor_version: impl Into<String>,
        extraction_tier: ExtractionTier,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ExtractionResultId::new(),
            asset_id,
            asset_version_id,
            run_id,
            extractor_version: extractor_version.into(),
            status: ExtractionStatus::Pending,
            extracted_bucket: None,
            extracted_object_key: None,
            structure_metadata: serde_json::json!({}),
            warnings: Vec::new(),
            errors: Vec::new(),
            extraction_time_seconds: None,
            extraction_tier,
            created_at: now,
        }
    }

    /// Transitions to `running`.
    pub fn start(&mut self) {
        self.status = ExtractionStatus::Running;
    }

    /// Records success (§4.4 step 7): requires a bucket and key per the
    /// `completed` invariant.
    pub fn complete(
        &mut self,
        bucket: impl Into<String>,
        object_key: impl Into<String>,
        warnings: Vec<String>,
        extraction_time_seconds: f64,
        structure_metadata: Json,
    ) {
        self.status = ExtractionStatus::Completed;
        self.extracted_bucket = Some(bucket.into());
        self.extracted_object_key = Some(object_key.into());
        self.warnings = warnings;
        self.extraction_time_seconds = Some(extraction_time_seconds);
        self.structure_metadata = structure_metadata;
    }

    /// Records failure (§4.4 step 10).
    pub fn fail(&mut self, errors: Vec<String>) {
        self.status = ExtractionStatus::Failed;
        self.errors = errors;
    }

    /// Whether this result satisfies the `completed` invariant: bucket and
    /// key both present.
    #[must_use]
    pub fn is_well_formed_completion(&self) -> bool {
        self.status != ExtractionStatus::Completed
            || (self.extracted_bucket.is_some() && self.extracted_object_key.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        DateTime::<Utc>::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn complete_sets_bucket_and_key() {
        let mut result = ExtractionResult::new(
            AssetId::new(),
            None,
            RunId::new(),
            "engine-v1",
            ExtractionTier::Basic,
            now(),
        );
        result.complete("processed", "org/uploads/a/a.md", vec![], 1.5, serde_json::json!({}));
        assert!(result.is_well_formed_completion());
        assert_eq!(result.status, ExtractionStatus::Completed);
    }

    #[test]
    fn pending_result_is_well_formed_without_bucket() {
        let result = ExtractionResult::new(
            AssetId::new(),
            None,
            RunId::new(),
            "engine-v1",
            ExtractionTier::Basic,
            now(),
        );
        assert!(result.is_well_formed_completion());
    }

    #[test]
    fn fail_records_errors() {
        let mut result = ExtractionResult::new(
            AssetId::new(),
            None,
            RunId::new(),
            "engine-v1",
            ExtractionTier::Basic,
            now(),
        );
        result.fail(vec!["unsupported format".into()]);
        assert_eq!(result.status, ExtractionStatus::Failed);
        assert_eq!(result.errors.len(), 1);
    }
}
