// forge-server/src/error.rs
// ============================================================================
// Module: Api Error
// Description: Maps domain and store errors onto the HTTP status/detail
//              shape every handler returns (§7, §B).
// Dependencies: axum, forge-core, forge-queue, forge-scheduler, serde_json
// ============================================================================

//! ## Overview
//! Every handler returns `Result<T, ApiError>`. [`ApiError`] carries the
//! status code the error taxonomy assigns it, a machine-readable `detail`
//! for 4xx responses, and — for 5xx responses — a correlation id a support
//! engineer can follow into the run's log events (§7's "5xx errors carry a
//! correlation id").

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use forge_core::ids::RunId;
use forge_core::interfaces::DispatchError;
use forge_core::interfaces::StoreError;
use forge_queue::QueueError;
use forge_scheduler::SchedulerError;
use serde::Serialize;

// ============================================================================
// SECTION: Api Error
// ============================================================================

/// An error a handler can return, already carrying its HTTP disposition.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request body/query, an unknown slug, or an invalid cron
    /// expression — 400 (§7 `InvalidInput`).
    InvalidInput(String),
    /// The caller's tenant does not own the requested resource — 403 (§7
    /// `TenantViolation`).
    TenantViolation(String),
    /// The requested resource does not exist for this tenant — 404 (§7
    /// `NotFound`).
    NotFound(String),
    /// A state machine rejected the requested transition; this indicates a
    /// bug rather than bad input — 500 (§7 `InvalidStatusTransition`).
    InvalidStatusTransition {
        /// Machine-readable detail message.
        detail: String,
        /// A Run id a support engineer can follow into log events.
        correlation_id: Option<String>,
    },
    /// A downstream dependency (extractor, LLM, object store, queue
    /// broker) failed or is unreachable — 502.
    UpstreamUnavailable {
        /// Machine-readable detail message.
        detail: String,
        /// A Run id a support engineer can follow into log events.
        correlation_id: Option<String>,
    },
    /// A downstream dependency did not respond within its budget — 504.
    UpstreamTimeout {
        /// Machine-readable detail message.
        detail: String,
        /// A Run id a support engineer can follow into log events.
        correlation_id: Option<String>,
    },
}

/// Body shape for every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Machine-readable detail message.
    detail: String,
    /// A Run id a support engineer can follow into log events, present
    /// only on 5xx responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

impl ApiError {
    /// Maps this error onto its HTTP status and response body.
    fn status_and_body(&self) -> (StatusCode, ErrorBody) {
        match self {
            Self::InvalidInput(detail) => (StatusCode::BAD_REQUEST, ErrorBody { detail: detail.clone(), correlation_id: None }),
            Self::TenantViolation(detail) => (StatusCode::FORBIDDEN, ErrorBody { detail: detail.clone(), correlation_id: None }),
            Self::NotFound(detail) => (StatusCode::NOT_FOUND, ErrorBody { detail: detail.clone(), correlation_id: None }),
            Self::InvalidStatusTransition { detail, correlation_id } => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody { detail: detail.clone(), correlation_id: correlation_id.clone() })
            }
            Self::UpstreamUnavailable { detail, correlation_id } => {
                (StatusCode::BAD_GATEWAY, ErrorBody { detail: detail.clone(), correlation_id: correlation_id.clone() })
            }
            Self::UpstreamTimeout { detail, correlation_id } => {
                (StatusCode::GATEWAY_TIMEOUT, ErrorBody { detail: detail.clone(), correlation_id: correlation_id.clone() })
            }
        }
    }

    /// Attaches a correlation id (a Run id, per §7) to a 5xx variant;
    /// no-op on 4xx variants, which carry no correlation id by design.
    #[must_use]
    pub fn with_correlation(mut self, run_id: RunId) -> Self {
        let id = run_id.to_string();
        match &mut self {
            Self::InvalidStatusTransition { correlation_id, .. }
            | Self::UpstreamUnavailable { correlation_id, .. }
            | Self::UpstreamTimeout { correlation_id, .. } => *correlation_id = Some(id),
            Self::InvalidInput(_) | Self::TenantViolation(_) | Self::NotFound(_) => {}
        }
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            tracing::error!(detail = %body.detail, correlation_id = ?body.correlation_id, "request failed");
        }
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(detail) => Self::NotFound(detail),
            StoreError::Constraint(detail) => Self::InvalidInput(detail),
            StoreError::InvalidTransition(detail) => Self::InvalidStatusTransition { detail, correlation_id: None },
            StoreError::Io(detail) | StoreError::Corrupt(detail) => Self::UpstreamUnavailable { detail, correlation_id: None },
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::Rejected(detail) => Self::InvalidInput(detail),
            DispatchError::Io(detail) => Self::UpstreamUnavailable { detail, correlation_id: None },
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(error: QueueError) -> Self {
        match error {
            QueueError::Store(inner) => inner.into(),
            QueueError::Dispatch(inner) => inner.into(),
            QueueError::UnknownQueue(detail) => Self::InvalidInput(detail),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(error: SchedulerError) -> Self {
        match error {
            SchedulerError::Store(inner) => inner.into(),
            SchedulerError::Dispatch(inner) => inner.into(),
            SchedulerError::Cron(inner) => Self::InvalidInput(inner.to_string()),
        }
    }
}
