// forge-executor/src/registry.rs
// ============================================================================
// Module: Function Registry
// Description: The global, side-effect-tagged registry of functions a
//              procedure step may invoke.
// Purpose: Give the step interpreter one place to resolve a step's
//          `function` id and consult its governance metadata, instead of
//          hardcoding a dispatch table per caller.
// Dependencies: async-trait, forge-core, serde_json
// ============================================================================

//! ## Overview
//! [`FunctionMeta::exposure`] gates *where* a function may be invoked from
//! (`exposure_profile.procedure`, §4.5); [`FunctionMeta::side_effects`]
//! decides whether the interpreter emits a `governance` audit log entry
//! before calling it. Both are declared once per function, not re-derived
//! from its behavior.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::context::ExecutionContext;
use crate::result::FunctionResult;

// ============================================================================
// SECTION: Governance Metadata
// ============================================================================

/// Where a function is allowed to be invoked from. Only `procedure` is
/// checked today (§4.5); the struct leaves room for sibling contexts
/// (pipeline step, ad hoc console call) without a breaking change.
#[derive(Debug, Clone, Copy)]
pub struct ExposureProfile {
    /// Whether the procedure executor may invoke this function.
    pub procedure: bool,
}

impl Default for ExposureProfile {
    fn default() -> Self {
        Self { procedure: true }
    }
}

/// Declared metadata for one registered function.
#[derive(Debug, Clone)]
pub struct FunctionMeta {
    /// Whether invoking this function performs a side effect (sends mail,
    /// mutates an external system, writes outside the run's own records).
    /// Side-effecting functions get a `governance` audit log entry.
    pub side_effects: bool,
    /// Where this function may be invoked from.
    pub exposure: ExposureProfile,
    /// Opaque label describing the shape of data this function touches,
    /// carried into the `governance` log entry for audit readability.
    pub payload_profile: String,
}

impl FunctionMeta {
    /// A function with no side effects, available everywhere.
    #[must_use]
    pub fn plain(payload_profile: impl Into<String>) -> Self {
        Self {
            side_effects: false,
            exposure: ExposureProfile::default(),
            payload_profile: payload_profile.into(),
        }
    }

    /// A side-effecting function, available everywhere.
    #[must_use]
    pub fn side_effecting(payload_profile: impl Into<String>) -> Self {
        Self {
            side_effects: true,
            exposure: ExposureProfile::default(),
            payload_profile: payload_profile.into(),
        }
    }
}

// ============================================================================
// SECTION: Procedure Function
// ============================================================================

/// One registered, invocable procedure function.
#[async_trait]
pub trait ProcedureFunction: Send + Sync {
    /// Declared governance metadata, consulted before every invocation.
    fn meta(&self) -> &FunctionMeta;

    /// Invokes the function with already-rendered `params`.
    async fn call(&self, ctx: &ExecutionContext, params: Json) -> FunctionResult;
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// The global registry of invocable functions, keyed by the id a step's
/// `function` field names.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Arc<dyn ProcedureFunction>>,
}

impl FunctionRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { functions: BTreeMap::new() }
    }

    /// Registers a function under `id`, replacing any prior registration
    /// (first-wins is enforced by the caller that loads definitions, not
    /// here — the registry itself just stores the latest binding).
    pub fn register(&mut self, id: impl Into<String>, function: Arc<dyn ProcedureFunction>) {
        self.functions.insert(id.into(), function);
    }

    /// Resolves a function by id.
    #[must_use]
    pub fn resolve(&self, id: &str) -> Option<Arc<dyn ProcedureFunction>> {
        self.functions.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ProcedureFunction for Echo {
        fn meta(&self) -> &FunctionMeta {
            static META: std::sync::OnceLock<FunctionMeta> = std::sync::OnceLock::new();
            META.get_or_init(|| FunctionMeta::plain("echo"))
        }

        async fn call(&self, _ctx: &ExecutionContext, params: Json) -> FunctionResult {
            FunctionResult::success(params, 0)
        }
    }

    #[test]
    fn unregistered_function_resolves_to_none() {
        let registry = FunctionRegistry::new();
        assert!(registry.resolve("echo").is_none());
    }

    #[test]
    fn registered_function_resolves() {
        let mut registry = FunctionRegistry::new();
        registry.register("echo", Arc::new(Echo));
        assert!(registry.resolve("echo").is_some());
        assert!(!registry.resolve("echo").unwrap().meta().side_effects);
    }

    #[test]
    fn side_effecting_meta_flag_is_set() {
        assert!(FunctionMeta::side_effecting("mail").side_effects);
    }
}
