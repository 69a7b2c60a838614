// forge-providers/src/extractor.rs
// ============================================================================
// Module: Extractor Client
// Description: HTTP client for the document-extraction engine(s), plus the
//              ordered registry C4 consults to find an engine for a
//              file extension.
// Dependencies: reqwest, async-trait, forge-core
// ============================================================================

//! ## Overview
//! Forge can be configured with more than one extraction engine (§6.5: "an
//! ordered list with one default"). [`ExtractorRegistry`] holds them in
//! configured order and answers "who handles this extension" for the
//! orchestrator (§4.4 step 2).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

use crate::error::ProviderError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of a successful extraction call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    /// Extracted markdown. Non-empty is required for a successful
    /// extraction (§4.4 step 5).
    pub markdown: String,
    /// Non-fatal warnings surfaced by the engine.
    pub warnings: Vec<String>,
    /// Opaque engine metadata (version, timing breakdown, etc.).
    pub engine_info: Json,
}

/// One configured extraction engine.
#[async_trait]
pub trait ExtractorClient: Send + Sync {
    /// Stable identifier used in log messages and `results_summary.engine`.
    fn engine_name(&self) -> &str;

    /// File extensions this engine accepts, lowercase, without the dot.
    fn supported_formats(&self) -> &[String];

    /// Whether this engine handles `extension` (case-insensitive).
    fn supports(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.supported_formats().iter().any(|format| *format == extension)
    }

    /// Extracts markdown from a file's raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the engine is unreachable or responds
    /// unexpectedly.
    async fn extract(&self, bytes: Vec<u8>, filename: &str) -> Result<ExtractionOutcome, ProviderError>;
}

// ============================================================================
// SECTION: HTTP Implementation
// ============================================================================

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    markdown: String,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    engine_info: Json,
}

/// HTTP-backed [`ExtractorClient`] (§6.4: "POST file → `{markdown, warnings,
/// engine_info}`").
pub struct HttpExtractorClient {
    http: reqwest::Client,
    base_url: String,
    engine_name: String,
    supported_formats: Vec<String>,
}

impl HttpExtractorClient {
    /// Builds a client bound to one configured engine (§6.5 per-engine
    /// timeout and format list).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the HTTP client cannot be constructed.
    pub fn new(
        base_url: impl Into<String>,
        engine_name: impl Into<String>,
        supported_formats: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ProviderError::from_reqwest("extractor", &error))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            engine_name: engine_name.into(),
            supported_formats: supported_formats.into_iter().map(|format| format.to_ascii_lowercase()).collect(),
        })
    }
}

#[async_trait]
impl ExtractorClient for HttpExtractorClient {
    fn engine_name(&self) -> &str {
        &self.engine_name
    }

    fn supported_formats(&self) -> &[String] {
        &self.supported_formats
    }

    async fn extract(&self, bytes: Vec<u8>, filename: &str) -> Result<ExtractionOutcome, ProviderError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .http
            .post(format!("{}/extract", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|error| ProviderError::from_reqwest("extractor", &error))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { service: "extractor", status, body });
        }

        let parsed: ExtractResponse = response
            .json()
            .await
            .map_err(|error| ProviderError::InvalidResponse { service: "extractor", message: error.to_string() })?;

        Ok(ExtractionOutcome {
            markdown: parsed.markdown,
            warnings: parsed.warnings,
            engine_info: parsed.engine_info,
        })
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Ordered set of configured extraction engines (§4.11 registry pattern
/// applied to extractors rather than queues).
#[derive(Clone)]
pub struct ExtractorRegistry {
    engines: Vec<Arc<dyn ExtractorClient>>,
}

impl ExtractorRegistry {
    /// Builds a registry from engines in configured (first-is-default)
    /// order.
    #[must_use]
    pub fn new(engines: Vec<Arc<dyn ExtractorClient>>) -> Self {
        Self { engines }
    }

    /// Finds the first configured engine supporting `extension`.
    #[must_use]
    pub fn resolve_for_extension(&self, extension: &str) -> Option<Arc<dyn ExtractorClient>> {
        self.engines.iter().find(|engine| engine.supports(extension)).cloned()
    }

    /// The default engine (first configured), used for error messages
    /// naming "the configured engine" (§4.4 step 2).
    #[must_use]
    pub fn default_engine(&self) -> Option<Arc<dyn ExtractorClient>> {
        self.engines.first().cloned()
    }

    /// Every format any configured engine supports, for unsupported-type
    /// error messages.
    #[must_use]
    pub fn all_supported_formats(&self) -> Vec<String> {
        let mut formats: Vec<String> =
            self.engines.iter().flat_map(|engine| engine.supported_formats().to_vec()).collect();
        formats.sort();
        formats.dedup();
        formats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEngine {
        name: &'static str,
        formats: Vec<String>,
    }

    #[async_trait]
    impl ExtractorClient for FakeEngine {
        fn engine_name(&self) -> &str {
            self.name
        }

        fn supported_formats(&self) -> &[String] {
            &self.formats
        }

        async fn extract(&self, _bytes: Vec<u8>, _filename: &str) -> Result<ExtractionOutcome, ProviderError> {
            unreachable!("not exercised by these tests")
        }
    }

    fn registry() -> ExtractorRegistry {
        ExtractorRegistry::new(vec![
            Arc::new(FakeEngine { name: "primary", formats: vec!["pdf".into(), "docx".into()] }),
            Arc::new(FakeEngine { name: "fallback", formats: vec!["txt".into()] }),
        ])
    }

    #[test]
    fn resolves_first_matching_engine() {
        let registry = registry();
        let engine = registry.resolve_for_extension("PDF").unwrap();
        assert_eq!(engine.engine_name(), "primary");
    }

    #[test]
    fn unsupported_extension_resolves_to_none() {
        let registry = registry();
        assert!(registry.resolve_for_extension("xyz").is_none());
    }

    #[test]
    fn all_supported_formats_is_deduplicated_and_sorted() {
        let registry = registry();
        assert_eq!(registry.all_supported_formats(), vec!["docx".to_string(), "pdf".to_string(), "txt".to_string()]);
    }

    #[test]
    fn default_engine_is_first_configured() {
        let registry = registry();
        assert_eq!(registry.default_engine().unwrap().engine_name(), "primary");
    }
}
