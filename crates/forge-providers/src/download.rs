// forge-providers/src/download.rs
// ============================================================================
// Module: Document Fetcher
// Description: Plain byte-level HTTP download for linked documents the
//              crawl orchestrator and SharePoint sync discover.
// Dependencies: reqwest, async-trait
// ============================================================================

//! ## Overview
//! Distinct from [`crate::renderer::RendererClient`], which renders a page
//! and returns markdown/links: a [`DocumentFetcher`] just pulls raw bytes
//! for something the crawl already decided to download (§4.8: "download
//! each to the uploads bucket").

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::ProviderError;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Downloads a linked document's raw bytes.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetches `url`'s full body.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the document cannot be fetched.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}

// ============================================================================
// SECTION: HTTP Implementation
// ============================================================================

/// Plain-HTTP [`DocumentFetcher`].
pub struct HttpDocumentFetcher {
    http: reqwest::Client,
}

impl HttpDocumentFetcher {
    /// Builds a fetcher with a fresh client.
    #[must_use]
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }
}

impl Default for HttpDocumentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self.http.get(url).send().await.map_err(|error| ProviderError::from_reqwest("document", &error))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { service: "document", status, body });
        }
        response.bytes().await.map(|bytes| bytes.to_vec()).map_err(|error| ProviderError::from_reqwest("document", &error))
    }
}
