// forge-server/src/routes/bulk_upload.rs
// ============================================================================
// Module: Bulk Upload Routes
// Description: `POST /bulk-upload/analyze`, `POST /bulk-upload/apply` (§6.1,
//              §E bulk-upload inventory classification).
// Dependencies: axum, forge-core, forge-ingest, forge-queue
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use forge_core::hashing::ContentHash;
use forge_core::ids::AssetId;
use forge_ingest::CandidateFile;
use forge_ingest::Classification;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;
use crate::tenant::TenantContext;

/// One candidate file as named in a bulk-upload request body. The client
/// has already hashed the bytes it intends to upload; this endpoint never
/// receives the bytes themselves (§E).
#[derive(Debug, Deserialize)]
pub struct CandidateFileRequest {
    /// Filename.
    pub filename: String,
    /// Hex-encoded SHA-256 of the file's bytes.
    pub content_hash: String,
    /// Size in bytes.
    pub file_size: u64,
    /// MIME type.
    pub content_type: String,
}

impl CandidateFileRequest {
    /// Converts the wire form into a [`CandidateFile`]. `content_hash` is
    /// already a hex-encoded digest the client computed, so it is parsed
    /// through [`ContentHash`]'s transparent `Deserialize` impl rather than
    /// hashed again.
    fn into_candidate(self) -> Result<CandidateFile, ApiError> {
        let content_hash: ContentHash = serde_json::from_value(serde_json::Value::String(self.content_hash))
            .map_err(|error| ApiError::InvalidInput(format!("invalid content_hash: {error}")))?;
        Ok(CandidateFile { filename: self.filename, content_hash, file_size: self.file_size, content_type: self.content_type })
    }
}

/// Request body for both `/bulk-upload/analyze` and `/bulk-upload/apply`.
#[derive(Debug, Deserialize)]
pub struct BulkUploadRequest {
    /// The batch of candidate files to classify.
    pub files: Vec<CandidateFileRequest>,
}

/// One classified entry in the response.
#[derive(Debug, Serialize)]
pub struct ClassifiedEntry {
    /// `"new"`, `"updated"`, `"unchanged"`, or `"missing"`.
    pub classification: &'static str,
    /// Filename this entry concerns.
    pub filename: String,
    /// The existing asset this entry matches, when one exists.
    pub existing_asset_id: Option<AssetId>,
}

/// Converts classification results into their wire form.
fn describe(entries: Vec<Classification>) -> Vec<ClassifiedEntry> {
    entries
        .into_iter()
        .map(|entry| match entry {
            Classification::New(candidate) => ClassifiedEntry { classification: "new", filename: candidate.filename, existing_asset_id: None },
            Classification::Updated { candidate, existing_asset_id } => {
                ClassifiedEntry { classification: "updated", filename: candidate.filename, existing_asset_id: Some(existing_asset_id) }
            }
            Classification::Unchanged { candidate, existing_asset_id } => {
                ClassifiedEntry { classification: "unchanged", filename: candidate.filename, existing_asset_id: Some(existing_asset_id) }
            }
            Classification::Missing { existing_asset_id, filename } => {
                ClassifiedEntry { classification: "missing", filename, existing_asset_id: Some(existing_asset_id) }
            }
        })
        .collect()
}

/// `POST /bulk-upload/analyze`: classifies the batch without changing any
/// state.
///
/// # Errors
///
/// Returns [`ApiError`] on a persistence failure reading the tenant's
/// inventory.
pub async fn analyze(State(state): State<Arc<AppState>>, tenant: TenantContext, Json(request): Json<BulkUploadRequest>) -> Result<Json<Vec<ClassifiedEntry>>, ApiError> {
    let existing = state.asset_queries.inventory(tenant.organization_id).await?;
    let candidates = request.files.into_iter().map(CandidateFileRequest::into_candidate).collect::<Result<Vec<_>, _>>()?;
    let classified = forge_ingest::classify(&candidates, &existing);
    Ok(Json(describe(classified)))
}

/// `POST /bulk-upload/apply`: classifies the batch, then creates a new
/// asset for every `new` entry and overwrites every `updated` entry's
/// current content in place, queuing an extraction for each (§4.3 shared
/// entry point). `unchanged` and `missing` entries are reported but left
/// untouched — deletion is not implied by absence from a batch.
///
/// # Errors
///
/// Returns [`ApiError`] on a persistence or queue failure. A failure
/// applying one candidate aborts the whole call; callers that need
/// partial-success semantics should submit smaller batches.
pub async fn apply(State(state): State<Arc<AppState>>, tenant: TenantContext, Json(request): Json<BulkUploadRequest>) -> Result<Json<Vec<ClassifiedEntry>>, ApiError> {
    let existing = state.asset_queries.inventory(tenant.organization_id).await?;
    let candidates = request.files.into_iter().map(CandidateFileRequest::into_candidate).collect::<Result<Vec<_>, _>>()?;
    let classified = forge_ingest::classify(&candidates, &existing);

    let now = Utc::now();
    for entry in &classified {
        let asset_id = match entry {
            Classification::New(candidate) => {
                let object_key = format!("bulk-upload/{}", candidate.filename);
                let asset = state
                    .asset_queries
                    .create_from_candidate(tenant.organization_id, candidate, forge_queue::RAW_BUCKET, &object_key, now)
                    .await?;
                Some(asset.id)
            }
            Classification::Updated { candidate, existing_asset_id } => {
                let object_key = format!("bulk-upload/{}", candidate.filename);
                let asset = state
                    .asset_queries
                    .overwrite_from_candidate(tenant.organization_id, *existing_asset_id, candidate, forge_queue::RAW_BUCKET, &object_key, now)
                    .await?;
                Some(asset.id)
            }
            Classification::Unchanged { .. } | Classification::Missing { .. } => None,
        };
        if let Some(asset_id) = asset_id {
            state.extraction_queue.queue_extraction_for_asset(tenant.organization_id, asset_id, now).await?;
        }
    }

    Ok(Json(describe(classified)))
}
