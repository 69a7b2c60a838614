// forge-providers/src/error.rs
// ============================================================================
// Module: Provider Errors
// Description: Shared error type for every external-service client.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Errors raised calling an external service (§7 `ExternalServiceUnavailable`).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The HTTP call itself failed (connection, TLS, timeout).
    #[error("{service} unavailable: {message}")]
    Unavailable {
        /// Which service failed (`"extractor"`, `"renderer"`, `"sam"`, ...).
        service: &'static str,
        /// Underlying transport error text.
        message: String,
    },
    /// The service responded but the body did not match the expected shape.
    #[error("{service} returned an unexpected response: {message}")]
    InvalidResponse {
        /// Which service responded unexpectedly.
        service: &'static str,
        /// Description of the mismatch.
        message: String,
    },
    /// The service rejected the call with a non-success status.
    #[error("{service} returned status {status}: {body}")]
    Rejected {
        /// Which service rejected the call.
        service: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, truncated by the caller if large.
        body: String,
    },
}

impl ProviderError {
    /// Builds an [`ProviderError::Unavailable`] from a `reqwest` transport
    /// error.
    #[must_use]
    pub fn from_reqwest(service: &'static str, error: &reqwest::Error) -> Self {
        Self::Unavailable {
            service,
            message: error.to_string(),
        }
    }
}
