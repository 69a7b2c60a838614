// forge-providers/src/graph.rs
// ============================================================================
// Module: Microsoft Graph Client
// Description: SharePoint folder inventory and download client.
// Dependencies: reqwest, async-trait
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ProviderError;

/// One file entry in a SharePoint drive folder listing.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveItem {
    /// Stable SharePoint item id, the join key for
    /// `SharePointSyncedDocument` (§4.9).
    pub item_id: String,
    /// ETag used for change detection.
    pub etag: String,
    /// File name.
    pub name: String,
    /// Path relative to the configured sync root.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Content type as reported by Graph.
    pub content_type: String,
}

/// Microsoft Graph client for SharePoint sync (§6.4, §4.9).
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Lists every file under `folder_path` in `drive_id`, recursing when
    /// `recursive` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when Graph is unreachable or responds
    /// unexpectedly.
    async fn list_folder(
        &self,
        site_id: &str,
        drive_id: &str,
        folder_path: &str,
        recursive: bool,
    ) -> Result<Vec<DriveItem>, ProviderError>;

    /// Downloads one item's bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the item cannot be fetched.
    async fn download_item(&self, site_id: &str, drive_id: &str, item_id: &str) -> Result<Vec<u8>, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<DriveItem>,
}

/// HTTP-backed [`GraphClient`].
pub struct HttpGraphClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl HttpGraphClient {
    /// Builds a client bound to `base_url`, authenticating with
    /// `bearer_token`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into(), bearer_token: bearer_token.into() }
    }
}

#[async_trait]
impl GraphClient for HttpGraphClient {
    async fn list_folder(
        &self,
        site_id: &str,
        drive_id: &str,
        folder_path: &str,
        recursive: bool,
    ) -> Result<Vec<DriveItem>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/sites/{site_id}/drives/{drive_id}/root:/{folder_path}:/children", self.base_url))
            .query(&[("recursive", recursive.to_string())])
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|error| ProviderError::from_reqwest("sharepoint", &error))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { service: "sharepoint", status, body });
        }

        let parsed: ListResponse = response
            .json()
            .await
            .map_err(|error| ProviderError::InvalidResponse { service: "sharepoint", message: error.to_string() })?;
        Ok(parsed.items)
    }

    async fn download_item(&self, site_id: &str, drive_id: &str, item_id: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/sites/{site_id}/drives/{drive_id}/items/{item_id}/content", self.base_url))
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|error| ProviderError::from_reqwest("sharepoint", &error))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { service: "sharepoint", status, body });
        }

        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|error| ProviderError::from_reqwest("sharepoint", &error))
    }
}
