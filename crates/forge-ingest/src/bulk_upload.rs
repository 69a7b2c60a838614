// forge-ingest/src/bulk_upload.rs
// ============================================================================
// Module: Bulk Upload Classification
// Description: Classifies a batch of candidate files against an
//              organization's existing assets (§6.1 `/bulk-upload/analyze`
//              and `/bulk-upload/apply`).
// Dependencies: forge-core
// ============================================================================

//! ## Overview
//! A bulk upload names a batch of files by filename and content hash before
//! any bytes are transferred. [`classify`] decides, for each candidate,
//! whether it is brand new, an update to an existing asset's content,
//! already present unchanged, or — for an existing asset whose filename is
//! absent from the batch — missing from this upload. The caller (typically
//! `forge-server`'s bulk-upload router) drives `/analyze` from this alone
//! and `/apply` by acting on each [`Classification`] in turn.

// ============================================================================
// SECTION: Imports
// ============================================================================

use forge_core::hashing::ContentHash;
use forge_core::ids::AssetId;

// ============================================================================
// SECTION: Candidate and Existing Inventory
// ============================================================================

/// One file offered in a bulk-upload batch, identified before any bytes are
/// stored.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    /// Filename as the caller intends to store it.
    pub filename: String,
    /// Content hash of the file's bytes.
    pub content_hash: ContentHash,
    /// Size in bytes.
    pub file_size: u64,
    /// MIME type.
    pub content_type: String,
}

/// One row of an organization's existing asset inventory, the slice
/// [`classify`] needs to compare against.
#[derive(Debug, Clone)]
pub struct ExistingAsset {
    /// The asset's id.
    pub asset_id: AssetId,
    /// Its current `original_filename`.
    pub filename: String,
    /// Its current version's content hash.
    pub content_hash: ContentHash,
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// The outcome of comparing one candidate or existing asset against the
/// other side of the batch.
#[derive(Debug, Clone)]
pub enum Classification {
    /// No existing asset shares this filename.
    New(CandidateFile),
    /// An existing asset shares this filename but its content hash differs.
    Updated { candidate: CandidateFile, existing_asset_id: AssetId },
    /// An existing asset shares this filename and content hash.
    Unchanged { candidate: CandidateFile, existing_asset_id: AssetId },
    /// An existing asset's filename is absent from this batch entirely.
    Missing { existing_asset_id: AssetId, filename: String },
}

impl Classification {
    /// A short label for the classification, used by the `/analyze`
    /// response and by logging.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::New(_) => "new",
            Self::Updated { .. } => "updated",
            Self::Unchanged { .. } => "unchanged",
            Self::Missing { .. } => "missing",
        }
    }
}

/// Classifies every candidate against `existing`, plus a [`Classification::Missing`]
/// entry for every existing asset whose filename no candidate names.
/// Matching is by filename; a filename collision across two different
/// candidates is not this function's concern and is left to the caller.
#[must_use]
pub fn classify(candidates: &[CandidateFile], existing: &[ExistingAsset]) -> Vec<Classification> {
    let mut seen_filenames = std::collections::HashSet::new();
    let mut results = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        seen_filenames.insert(candidate.filename.clone());
        match existing.iter().find(|asset| asset.filename == candidate.filename) {
            None => results.push(Classification::New(candidate.clone())),
            Some(asset) if asset.content_hash.as_str() == candidate.content_hash.as_str() => {
                results.push(Classification::Unchanged { candidate: candidate.clone(), existing_asset_id: asset.asset_id });
            }
            Some(asset) => {
                results.push(Classification::Updated { candidate: candidate.clone(), existing_asset_id: asset.asset_id });
            }
        }
    }

    for asset in existing {
        if !seen_filenames.contains(&asset.filename) {
            results.push(Classification::Missing { existing_asset_id: asset.asset_id, filename: asset.filename.clone() });
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(value: &str) -> ContentHash {
        ContentHash::of(value.as_bytes())
    }

    #[test]
    fn unseen_filename_is_new() {
        let candidates = vec![CandidateFile { filename: "a.pdf".to_string(), content_hash: hash("a"), file_size: 1, content_type: "application/pdf".to_string() }];
        let result = classify(&candidates, &[]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].label(), "new");
    }

    #[test]
    fn matching_filename_and_hash_is_unchanged() {
        let existing_id = AssetId::new();
        let candidates = vec![CandidateFile { filename: "a.pdf".to_string(), content_hash: hash("a"), file_size: 1, content_type: "application/pdf".to_string() }];
        let existing = vec![ExistingAsset { asset_id: existing_id, filename: "a.pdf".to_string(), content_hash: hash("a") }];
        let result = classify(&candidates, &existing);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].label(), "unchanged");
    }

    #[test]
    fn matching_filename_different_hash_is_updated() {
        let existing_id = AssetId::new();
        let candidates = vec![CandidateFile { filename: "a.pdf".to_string(), content_hash: hash("a-new"), file_size: 1, content_type: "application/pdf".to_string() }];
        let existing = vec![ExistingAsset { asset_id: existing_id, filename: "a.pdf".to_string(), content_hash: hash("a-old") }];
        let result = classify(&candidates, &existing);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].label(), "updated");
    }

    #[test]
    fn existing_filename_absent_from_batch_is_missing() {
        let existing_id = AssetId::new();
        let existing = vec![ExistingAsset { asset_id: existing_id, filename: "gone.pdf".to_string(), content_hash: hash("gone") }];
        let result = classify(&[], &existing);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].label(), "missing");
    }

    #[test]
    fn mixed_batch_classifies_each_independently() {
        let unchanged_id = AssetId::new();
        let updated_id = AssetId::new();
        let missing_id = AssetId::new();
        let candidates = vec![
            CandidateFile { filename: "new.pdf".to_string(), content_hash: hash("new"), file_size: 1, content_type: "application/pdf".to_string() },
            CandidateFile { filename: "same.pdf".to_string(), content_hash: hash("same"), file_size: 1, content_type: "application/pdf".to_string() },
            CandidateFile { filename: "changed.pdf".to_string(), content_hash: hash("changed-new"), file_size: 1, content_type: "application/pdf".to_string() },
        ];
        let existing = vec![
            ExistingAsset { asset_id: unchanged_id, filename: "same.pdf".to_string(), content_hash: hash("same") },
            ExistingAsset { asset_id: updated_id, filename: "changed.pdf".to_string(), content_hash: hash("changed-old") },
            ExistingAsset { asset_id: missing_id, filename: "removed.pdf".to_string(), content_hash: hash("removed") },
        ];
        let result = classify(&candidates, &existing);
        assert_eq!(result.len(), 4);
        assert!(result.iter().any(|c| c.label() == "new"));
        assert!(result.iter().any(|c| c.label() == "unchanged"));
        assert!(result.iter().any(|c| c.label() == "updated"));
        assert!(result.iter().any(|c| c.label() == "missing"));
    }
}
