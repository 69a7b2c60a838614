// forge-server/src/tenant.rs
// ============================================================================
// Module: Tenant Context
// Description: Resolves the requesting organization from a header and fails
//              closed when it is absent or malformed (§6.1 "all
//              document-scoped paths enforce tenant isolation before
//              action").
// Dependencies: axum, forge-core
// ============================================================================

//! ## Overview
//! Every document-scoped route extracts a [`TenantContext`] before touching
//! a store. There is no implicit tenant: a missing or unparsable header is
//! rejected before any handler body runs, the same "fail closed" posture
//! `forge-config` applies to startup configuration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use forge_core::ids::OrganizationId;

use crate::error::ApiError;

/// The header naming the requesting tenant. A production deployment sits
/// this behind an authenticating gateway that sets the header from a
/// verified session; this server trusts it as given, the same boundary
/// `decision-gate-mcp` draws around its own `x-decision-gate-client-subject`
/// header.
pub const ORGANIZATION_HEADER: &str = "x-forge-organization-id";

/// The tenant a request is scoped to, extracted once per request.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext {
    /// The requesting organization.
    pub organization_id: OrganizationId,
}

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(ORGANIZATION_HEADER)
            .ok_or_else(|| ApiError::InvalidInput(format!("missing {ORGANIZATION_HEADER} header")))?;
        let value = header.to_str().map_err(|_err| ApiError::InvalidInput(format!("{ORGANIZATION_HEADER} header is not valid UTF-8")))?;
        let organization_id = OrganizationId::from_str(value)
            .map_err(|_err| ApiError::InvalidInput(format!("{ORGANIZATION_HEADER} header is not a valid organization id")))?;
        Ok(Self { organization_id })
    }
}
