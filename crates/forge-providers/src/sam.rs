// forge-providers/src/sam.rs
// ============================================================================
// Module: SAM.gov Client
// Description: Paginated opportunity feed client and its per-tenant API
//              call budget tracker.
// Dependencies: reqwest, async-trait, chrono
// ============================================================================

//! ## Overview
//! §4.10: "The pull respects an API-call budget per tenant; before each page
//! it asks a usage tracker 'may I make one more call?' and halts mid-pull if
//! the budget is exhausted." [`ApiCallBudget`] is that tracker, kept as pure
//! logic so the halting behavior is unit-testable without a live feed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ProviderError;

// ============================================================================
// SECTION: Budget
// ============================================================================

/// Tracks remaining SAM.gov API calls for one tenant within a reset window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ApiCallBudget {
    limit: u32,
    remaining: u32,
    resets_at: DateTime<Utc>,
}

impl ApiCallBudget {
    /// Creates a fresh budget of `limit` calls, resetting at `resets_at`.
    #[must_use]
    pub const fn new(limit: u32, resets_at: DateTime<Utc>) -> Self {
        Self { limit, remaining: limit, resets_at }
    }

    /// Calls remaining before the next reset.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Resets to a full budget if `now` has passed `resets_at`, using
    /// `next_resets_at` for the new window.
    pub fn refresh_if_expired(&mut self, now: DateTime<Utc>, next_resets_at: DateTime<Utc>) {
        if now >= self.resets_at {
            self.remaining = self.limit;
            self.resets_at = next_resets_at;
        }
    }

    /// Attempts to consume one call. Returns `true` and decrements
    /// `remaining` if budget was available, `false` (and leaves state
    /// unchanged) if exhausted.
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

// ============================================================================
// SECTION: Feed Client
// ============================================================================

/// One page of opportunities from the SAM.gov feed.
#[derive(Debug, Clone, Deserialize)]
pub struct SamPage {
    /// Raw opportunity records for this page; parsed further upstream into
    /// `Solicitation`/`Notice` rows.
    #[serde(default)]
    pub records: Vec<serde_json::Value>,
    /// Total records across all pages, when the feed reports it.
    pub total_records: Option<u64>,
}

/// Client for the SAM.gov opportunities feed (§6.4, §4.10).
#[async_trait]
pub trait SamClient: Send + Sync {
    /// Fetches one page starting at `offset`, `limit` records.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the feed is unreachable or returns an
    /// unexpected shape.
    async fn fetch_page(&self, offset: u64, limit: u32) -> Result<SamPage, ProviderError>;
}

/// HTTP-backed [`SamClient`].
pub struct HttpSamClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpSamClient {
    /// Builds a client bound to `base_url`, authenticating with `api_key`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into(), api_key: api_key.into() }
    }
}

#[async_trait]
impl SamClient for HttpSamClient {
    async fn fetch_page(&self, offset: u64, limit: u32) -> Result<SamPage, ProviderError> {
        let response = self
            .http
            .get(format!("{}/opportunities", self.base_url))
            .query(&[("offset", offset.to_string()), ("limit", limit.to_string()), ("api_key", self.api_key.clone())])
            .send()
            .await
            .map_err(|error| ProviderError::from_reqwest("sam", &error))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { service: "sam", status, body });
        }

        response.json().await.map_err(|error| ProviderError::InvalidResponse { service: "sam", message: error.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> DateTime<Utc> {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        DateTime::<Utc>::from_timestamp(0, 0).unwrap()
    }

    fn later() -> DateTime<Utc> {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        DateTime::<Utc>::from_timestamp(3600, 0).unwrap()
    }

    #[test]
    fn exhausted_budget_refuses_further_calls() {
        let mut budget = ApiCallBudget::new(2, later());
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn refresh_after_reset_time_restores_full_budget() {
        let mut budget = ApiCallBudget::new(2, epoch());
        budget.try_consume();
        budget.try_consume();
        budget.refresh_if_expired(later(), later());
        assert_eq!(budget.remaining(), 2);
    }

    #[test]
    fn refresh_before_reset_time_is_a_no_op() {
        let mut budget = ApiCallBudget::new(2, later());
        budget.try_consume();
        budget.refresh_if_expired(epoch(), later());
        assert_eq!(budget.remaining(), 1);
    }
}
