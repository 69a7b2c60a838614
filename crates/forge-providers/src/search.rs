// forge-providers/src/search.rs
// ============================================================================
// Module: Search Index Client
// Description: Client for the search-index ingestion service.
// Dependencies: reqwest, async-trait, forge-core
// ============================================================================

use async_trait::async_trait;
use forge_core::ids::AssetId;
use forge_core::ids::OrganizationId;
use serde::Serialize;

use crate::error::ProviderError;

/// Ingests extracted content into the search index (§6.4, §4.4 step 9).
#[async_trait]
pub trait SearchIndexClient: Send + Sync {
    /// Indexes (or reindexes) one asset's extracted markdown.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the index service is unreachable or
    /// rejects the document.
    async fn index_asset(
        &self,
        organization_id: OrganizationId,
        asset_id: AssetId,
        markdown: &str,
    ) -> Result<(), ProviderError>;
}

#[derive(Debug, Serialize)]
struct IndexRequest<'a> {
    organization_id: OrganizationId,
    asset_id: AssetId,
    markdown: &'a str,
}

/// HTTP-backed [`SearchIndexClient`].
pub struct HttpSearchIndexClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSearchIndexClient {
    /// Builds a client bound to `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl SearchIndexClient for HttpSearchIndexClient {
    async fn index_asset(
        &self,
        organization_id: OrganizationId,
        asset_id: AssetId,
        markdown: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(format!("{}/documents", self.base_url))
            .json(&IndexRequest { organization_id, asset_id, markdown })
            .send()
            .await
            .map_err(|error| ProviderError::from_reqwest("search-index", &error))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { service: "search-index", status, body });
        }
        Ok(())
    }
}

/// A [`SearchIndexClient`] that does nothing, for deployments with the
/// search toggle disabled (§6.5).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSearchIndexClient;

#[async_trait]
impl SearchIndexClient for NullSearchIndexClient {
    async fn index_asset(
        &self,
        _organization_id: OrganizationId,
        _asset_id: AssetId,
        _markdown: &str,
    ) -> Result<(), ProviderError> {
        Ok(())
    }
}
