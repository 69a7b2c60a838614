// forge-core/src/error.rs
// ============================================================================
// Module: Core Errors
// Description: Tenant scoping contract and domain-wide validation errors.
// Purpose: Give every crate one place to check "does this entity belong to
//          this org" and one error type for load-time procedure validation.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`TenantScoped`] is implemented by every entity that carries an
//! `organization_id`, letting store and service layers assert isolation with
//! one call instead of matching on field names per type.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::ids::OrganizationId;

// ============================================================================
// SECTION: Tenant Scoping
// ============================================================================

/// Implemented by every entity that belongs to exactly one organization.
pub trait TenantScoped {
    /// Returns the owning organization.
    fn organization_id(&self) -> OrganizationId;

    /// Returns `Ok(())` if `expected` owns this entity, else
    /// [`TenantMismatch`].
    ///
    /// # Errors
    ///
    /// Returns [`TenantMismatch`] when the entity belongs to a different
    /// organization than `expected`.
    fn assert_owned_by(&self, expected: OrganizationId) -> Result<(), TenantMismatch> {
        let actual = self.organization_id();
        if actual == expected {
            Ok(())
        } else {
            Err(TenantMismatch { expected, actual })
        }
    }
}

/// An entity was accessed by a tenant that does not own it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("tenant mismatch: expected org {expected}, entity belongs to org {actual}")]
pub struct TenantMismatch {
    /// The organization making the request.
    pub expected: OrganizationId,
    /// The organization that actually owns the entity.
    pub actual: OrganizationId,
}

// ============================================================================
// SECTION: Domain Validation Errors
// ============================================================================

/// Errors raised validating procedure definitions, metadata promotion, and
/// other structural domain invariants outside the Run/RunGroup state
/// machines (which have their own error types).
#[derive(Debug, Error)]
pub enum DomainError {
    /// A load-time procedure validation failure (§4.5 Validation).
    #[error("invalid procedure definition: {0}")]
    InvalidProcedure(String),
    /// A duplicate step name within a scope.
    #[error("duplicate step name {name:?} in scope {scope:?}")]
    DuplicateStepName {
        /// The offending step name.
        name: String,
        /// The scope (root, or `branch:<name>`) it collided in.
        scope: String,
    },
    /// A required procedure parameter was not supplied and has no default.
    #[error("missing required parameter: {0}")]
    MissingRequiredParameter(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::OrganizationId;

    struct Thing(OrganizationId);

    impl TenantScoped for Thing {
        fn organization_id(&self) -> OrganizationId {
            self.0
        }
    }

    #[test]
    fn same_org_is_ok() {
        let org = OrganizationId::new();
        assert!(Thing(org).assert_owned_by(org).is_ok());
    }

    #[test]
    fn different_org_is_mismatch() {
        let owner = OrganizationId::new();
        let requester = OrganizationId::new();
        let err = Thing(owner).assert_owned_by(requester).unwrap_err();
        assert_eq!(err.expected, requester);
        assert_eq!(err.actual, owner);
    }
}
