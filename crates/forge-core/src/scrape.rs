// forge-core/src/scrape.rs
// ============================================================================
// Module: Web Scrape
// Description: Crawl collection configuration and discovered-page records.
// Purpose: Model what the crawl orchestrator (forge-ingest) reads and
//          writes; URL normalization and the crawl loop itself live there.
// Dependencies: chrono, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`ScrapeCollection`] owns seed [`ScrapeSource`]s and accumulates
//! [`ScrapedAsset`]s as the crawl discovers pages and documents. The
//! `(collection_id, normalized_url)` pair is the dedup key (§3).

// ============================================================================
// SECTION: Imports
// ============================================================================

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::hashing::ContentHash;
use crate::ids::AssetId;
use crate::ids::OrganizationId;
use crate::ids::ScrapeCollectionId;
use crate::ids::ScrapeSourceId;
use crate::ids::ScrapedAssetId;

// ============================================================================
// SECTION: Crawl Config
// ============================================================================

/// Per-collection crawl parameters (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Maximum pages to dequeue in one crawl run.
    pub max_pages: u32,
    /// Maximum link depth from a seed; `0` means unlimited.
    pub max_depth: u32,
    /// Shell-style globs matched against the URL path; empty means
    /// allow-all.
    #[serde(default)]
    pub include_patterns: Vec<String>,
    /// Shell-style globs checked before `include_patterns`.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Whether to enqueue links that leave the seed domain.
    pub follow_external_links: bool,
    /// Whether to download linked documents (PDF, DOCX, …).
    pub download_documents: bool,
    /// File extensions eligible for document download.
    #[serde(default)]
    pub document_extensions: Vec<String>,
    /// Delay between page fetches, for rate limiting.
    pub delay_seconds: f64,
}

// ============================================================================
// SECTION: ScrapeCollection
// ============================================================================

/// Owns seed sources and hosts discovered pages (§3 ScrapeCollection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeCollection {
    /// Primary identifier.
    pub id: ScrapeCollectionId,
    /// Owning tenant.
    pub organization_id: OrganizationId,
    /// Human-readable slug, used in storage paths (§4.4).
    pub slug: String,
    /// Crawl parameters.
    pub config: CrawlConfig,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A seed URL the crawl starts from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeSource {
    /// Primary identifier.
    pub id: ScrapeSourceId,
    /// The owning collection.
    pub collection_id: ScrapeCollectionId,
    /// Seed URL, as configured (not yet normalized).
    pub url: String,
    /// Whether this source is currently crawled.
    pub is_active: bool,
}

// ============================================================================
// SECTION: ScrapedAsset
// ============================================================================

/// What kind of content a [`ScrapedAsset`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapedAssetKind {
    /// A rendered HTML page.
    Page,
    /// A document linked from a page (PDF, DOCX, …).
    Document,
}

/// Crawl-specific metadata carried alongside a [`ScrapedAsset`] (§3:
/// "`scrape_metadata` carries `content_hash` and version count").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeMetadata {
    /// Hash of the most recently fetched content.
    pub content_hash: ContentHash,
    /// Number of [`crate::asset::AssetVersion`]s recorded for this asset
    /// across re-crawls.
    pub version_count: u32,
}

/// Ties an [`crate::asset::Asset`] to `(collection_id, normalized_url)`
/// (§3 ScrapeCollection / ScrapeSource / ScrapedAsset).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedAsset {
    /// Primary identifier.
    pub id: ScrapedAssetId,
    /// The owning collection.
    pub collection_id: ScrapeCollectionId,
    /// The underlying asset record.
    pub asset_id: AssetId,
    /// The seed source this page/document was discovered from, if known.
    pub source_id: Option<ScrapeSourceId>,
    /// The normalized URL this asset was fetched from.
    pub normalized_url: String,
    /// Page vs. linked document.
    pub kind: ScrapedAssetKind,
    /// Crawl-specific bookkeeping.
    pub scrape_metadata: ScrapeMetadata,
    /// Link depth from the nearest seed at discovery time.
    pub depth: u32,
    /// Last time this URL was (re-)crawled.
    pub last_crawled_at: DateTime<Utc>,
}

impl ScrapedAsset {
    /// Whether a freshly computed hash means the page is unchanged,
    /// changed, or (implicitly, by the caller not finding a record at
    /// all) new (§4.8).
    #[must_use]
    pub fn is_unchanged(&self, new_hash: &ContentHash) -> bool {
        &self.scrape_metadata.content_hash == new_hash
    }

    /// Records a re-crawl that produced a new version: bumps the stored
    /// hash and version count.
    pub fn record_new_version(&mut self, new_hash: ContentHash, now: DateTime<Utc>) {
        self.scrape_metadata.content_hash = new_hash;
        self.scrape_metadata.version_count += 1;
        self.last_crawled_at = now;
    }

    /// Records a re-crawl that found no change: only bumps the
    /// last-crawled timestamp.
    pub fn record_unchanged(&mut self, now: DateTime<Utc>) {
        self.last_crawled_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        DateTime::<Utc>::from_timestamp(0, 0).unwrap()
    }

    fn scraped_asset() -> ScrapedAsset {
        ScrapedAsset {
            id: ScrapedAssetId::new(),
            collection_id: ScrapeCollectionId::new(),
            asset_id: AssetId::new(),
            source_id: None,
            normalized_url: "https://example.com/page".to_string(),
            kind: ScrapedAssetKind::Page,
            scrape_metadata: ScrapeMetadata {
                content_hash: ContentHash::of(b"v1"),
                version_count: 1,
            },
            depth: 0,
            last_crawled_at: now(),
        }
    }

    #[test]
    fn matching_hash_is_unchanged() {
        let asset = scraped_asset();
        assert!(asset.is_unchanged(&ContentHash::of(b"v1")));
        assert!(!asset.is_unchanged(&ContentHash::of(b"v2")));
    }

    #[test]
    fn new_version_bumps_hash_and_count() {
        let mut asset = scraped_asset();
        asset.record_new_version(ContentHash::of(b"v2"), now());
        assert_eq!(asset.scrape_metadata.version_count, 2);
        assert_eq!(asset.scrape_metadata.content_hash, ContentHash::of(b"v2"));
    }
}
