// forge-executor/src/ports.rs
// ============================================================================
// Module: Executor Ports
// Description: Procedure definition persistence, the slice this crate needs
//              beyond the Run/RunGroup interfaces forge-core already
//              defines.
// Purpose: Procedure definitions and their triggers are primarily owned and
//          mutated here, not by every crate, so the store interface lives
//          next to its one real caller rather than growing forge-core's
//          shared interface module.
// Dependencies: async-trait, forge-core
// ============================================================================

use async_trait::async_trait;
use forge_core::ids::OrganizationId;
use forge_core::interfaces::StoreError;
use forge_core::procedure::ProcedureDefinition;
use forge_core::procedure::Trigger;

/// Procedure definition persistence, the slice C5 needs.
#[async_trait]
pub trait ProcedureStore: Send + Sync {
    /// Fetches the current version of a procedure by slug, scoped to
    /// `organization_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no such procedure exists for
    /// this tenant.
    async fn get_by_slug(&self, organization_id: OrganizationId, slug: &str) -> Result<ProcedureDefinition, StoreError>;

    /// Persists the reconciled trigger set after an execution (§4.5 Trigger
    /// reconciliation). A missing procedure is a no-op, not an error: a
    /// reconciliation failure must never fail the procedure it's attached
    /// to.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a persistence failure other than
    /// not-found.
    async fn save_triggers(&self, organization_id: OrganizationId, slug: &str, triggers: Vec<Trigger>) -> Result<(), StoreError>;
}
