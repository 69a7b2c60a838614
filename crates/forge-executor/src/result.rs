// forge-executor/src/result.rs
// ============================================================================
// Module: Function Results
// Description: What a procedure function hands back to the step interpreter.
// Purpose: Separate a plain, one-shot [`FunctionResult`] from a
//          [`FlowResult`], the directive the four flow-control functions
//          return to tell the interpreter which branches to run.
// Dependencies: serde, serde_json
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

// ============================================================================
// SECTION: Function Status
// ============================================================================

/// Outcome of one function invocation or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionStatus {
    /// Ran to completion without error.
    Success,
    /// Ran but some constituent items failed (foreach/parallel).
    Partial,
    /// Did not complete.
    Failed,
    /// Guarded by a falsy `condition`.
    Skipped,
}

impl FunctionStatus {
    /// Whether this status counts as a failure for `on_error` purposes.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Stable lowercase label, used in log messages instead of `{:?}`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

// ============================================================================
// SECTION: Function Result
// ============================================================================

/// What a plain (non-flow-control) function invocation produces (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResult {
    /// Outcome of the invocation.
    pub status: FunctionStatus,
    /// Opaque payload, visible to later steps as `steps.<name>`.
    pub data: Json,
    /// Count of items this invocation processed, when meaningful.
    pub items_processed: Option<u64>,
    /// Count of items that failed, when meaningful.
    pub items_failed: Option<u64>,
    /// Wall-clock duration of the invocation.
    pub duration_ms: u64,
    /// Human-readable summary.
    pub message: Option<String>,
    /// Error detail, set when `status == failed`.
    pub error: Option<String>,
    /// Opaque extra context.
    pub metadata: Json,
}

impl FunctionResult {
    /// Builds a bare success result with no items/metadata.
    #[must_use]
    pub fn success(data: Json, duration_ms: u64) -> Self {
        Self {
            status: FunctionStatus::Success,
            data,
            items_processed: None,
            items_failed: None,
            duration_ms,
            message: None,
            error: None,
            metadata: Json::Null,
        }
    }

    /// Builds a bare failure result.
    #[must_use]
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: FunctionStatus::Failed,
            data: Json::Null,
            items_processed: None,
            items_failed: None,
            duration_ms,
            message: None,
            error: Some(error.into()),
            metadata: Json::Null,
        }
    }
}

// ============================================================================
// SECTION: Flow Result
// ============================================================================

/// What a flow-control function (`if_branch`, `switch_branch`, `parallel`,
/// `foreach`) hands back to direct the interpreter (§4.5 Flow-control
/// functions). Exactly one directive field is set by a well-behaved flow
/// function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowResult {
    /// `if_branch`/`switch_branch`: the single branch name to run.
    pub branch_key: Option<String>,
    /// `parallel`: branches to run; empty means "all".
    pub branches_to_run: Option<Vec<String>>,
    /// `foreach`: the items to iterate, each passed to the `each` branch.
    pub items_to_iterate: Option<Vec<Json>>,
    /// Concurrency hint for `parallel`/`foreach` (`max_concurrency` /
    /// `concurrency` respectively).
    pub concurrency: Option<u32>,
    /// Per-item guard for `foreach`.
    pub item_condition: Option<String>,
    /// Opaque payload returned verbatim when no directive field is set.
    pub data: Json,
    /// Human-readable summary.
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_status_is_a_failure() {
        assert!(FunctionStatus::Failed.is_failure());
        assert!(!FunctionStatus::Partial.is_failure());
        assert!(!FunctionStatus::Skipped.is_failure());
    }

    #[test]
    fn as_str_matches_serde_rename() {
        assert_eq!(FunctionStatus::Partial.as_str(), "partial");
        assert_eq!(FunctionStatus::Skipped.as_str(), "skipped");
    }
}
