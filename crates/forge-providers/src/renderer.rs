// forge-providers/src/renderer.rs
// ============================================================================
// Module: Renderer Client
// Description: JS-capable page renderer, with a plain-HTTP fallback that
//              extracts links without executing JavaScript.
// Dependencies: reqwest, async-trait
// ============================================================================

//! ## Overview
//! C8 prefers a full renderer; when none is configured it falls back to
//! [`SimpleHttpFetcher`], which fetches the page over plain HTTP and pulls
//! links out of the raw HTML with a conservative regex (§4.8: "if absent,
//! fall back to a simple HTTP fetcher and extract links from HTML alone").

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ProviderError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of rendering one page.
#[derive(Debug, Clone, Default)]
pub struct RenderOutcome {
    /// Raw HTML, hashed for change detection (§4.8).
    pub html: String,
    /// Extracted markdown, when available. Absent for the plain fetcher.
    pub markdown: Option<String>,
    /// Discovered page links, absolute.
    pub links: Vec<String>,
    /// Discovered document links (PDFs, Office files), absolute.
    pub document_links: Vec<String>,
    /// The URL actually served, after redirects.
    pub final_url: String,
}

/// A page renderer (§6.4).
#[async_trait]
pub trait RendererClient: Send + Sync {
    /// Renders `url`, returning HTML, markdown (if the renderer produces
    /// it), and discovered links.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the page cannot be fetched or
    /// rendered.
    async fn render(&self, url: &str) -> Result<RenderOutcome, ProviderError>;
}

// ============================================================================
// SECTION: Full Renderer
// ============================================================================

#[derive(Debug, Deserialize)]
struct RenderResponse {
    html: String,
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    links: Vec<String>,
    #[serde(default)]
    document_links: Vec<String>,
    final_url: String,
}

/// HTTP-backed JavaScript-capable renderer.
pub struct HttpRendererClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRendererClient {
    /// Builds a renderer client bound to `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl RendererClient for HttpRendererClient {
    async fn render(&self, url: &str) -> Result<RenderOutcome, ProviderError> {
        let response = self
            .http
            .get(format!("{}/render", self.base_url))
            .query(&[("url", url)])
            .send()
            .await
            .map_err(|error| ProviderError::from_reqwest("renderer", &error))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { service: "renderer", status, body });
        }

        let parsed: RenderResponse = response
            .json()
            .await
            .map_err(|error| ProviderError::InvalidResponse { service: "renderer", message: error.to_string() })?;

        Ok(RenderOutcome {
            html: parsed.html,
            markdown: parsed.markdown,
            links: parsed.links,
            document_links: parsed.document_links,
            final_url: parsed.final_url,
        })
    }
}

// ============================================================================
// SECTION: Simple HTTP Fallback
// ============================================================================

/// Plain-HTTP fetcher used when no JS-capable renderer is configured.
/// Extracts `href` targets from anchor tags; does not execute JavaScript and
/// never produces markdown.
pub struct SimpleHttpFetcher {
    http: reqwest::Client,
}

impl SimpleHttpFetcher {
    /// Builds a fallback fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    /// Extracts absolute `href` values from anchor tags in `html`, resolved
    /// against `base_url`. Relative links that fail to resolve are dropped.
    #[must_use]
    pub fn extract_links(html: &str, base_url: &str) -> Vec<String> {
        let base = url::Url::parse(base_url).ok();
        let mut links = Vec::new();
        let mut rest = html;
        while let Some(start) = rest.to_ascii_lowercase().find("href=") {
            rest = &rest[start + 5..];
            let quote = rest.chars().next();
            let Some(quote) = quote.filter(|c| *c == '"' || *c == '\'') else {
                continue;
            };
            rest = &rest[1..];
            let Some(end) = rest.find(quote) else { break };
            let raw = &rest[..end];
            rest = &rest[end + 1..];
            let resolved = match &base {
                Some(base) => base.join(raw).ok().map(|u| u.to_string()),
                None => Some(raw.to_string()),
            };
            if let Some(resolved) = resolved {
                links.push(resolved);
            }
        }
        links
    }
}

impl Default for SimpleHttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RendererClient for SimpleHttpFetcher {
    async fn render(&self, url: &str) -> Result<RenderOutcome, ProviderError> {
        let response = self.http.get(url).send().await.map_err(|error| ProviderError::from_reqwest("renderer", &error))?;
        let final_url = response.url().to_string();
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { service: "renderer", status, body });
        }
        let html = response.text().await.map_err(|error| ProviderError::from_reqwest("renderer", &error))?;
        let links = Self::extract_links(&html, &final_url);
        Ok(RenderOutcome { html, markdown: None, links, document_links: Vec::new(), final_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_links_resolves_relative_hrefs() {
        let html = r#"<a href="/a">A</a><a href='https://other.example/b'>B</a>"#;
        let links = SimpleHttpFetcher::extract_links(html, "https://ex.com/start");
        assert_eq!(links, vec!["https://ex.com/a".to_string(), "https://other.example/b".to_string()]);
    }

    #[test]
    fn extract_links_with_no_anchors_is_empty() {
        let links = SimpleHttpFetcher::extract_links("<p>no links here</p>", "https://ex.com/");
        assert!(links.is_empty());
    }
}
