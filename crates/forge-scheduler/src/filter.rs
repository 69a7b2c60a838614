// forge-scheduler/src/filter.rs
// ============================================================================
// Module: Event Filter DSL
// Description: The closed filter language an event Trigger's `event_filter`
//              is written in (§4.7).
// Purpose: Decide whether one emitted event's payload satisfies a trigger's
//          optional filter, without growing a general expression language —
//          the DSL is intentionally closed; a new operator is a spec change.
// Dependencies: serde_json, forge-core
// ============================================================================

//! ## Overview
//! A filter is a JSON object. Each key is a dotted path into the payload;
//! each value is either a plain value (equality, including nested-object
//! structural equality) or a single-key operator object: `$contains`,
//! `$in`, `$ne`. A path missing from the payload resolves to `null` before
//! comparison, per §4.7.

// ============================================================================
// SECTION: Imports
// ============================================================================

use forge_core::value::get_path_or_null;
use serde_json::Value as Json;

// ============================================================================
// SECTION: Matching
// ============================================================================

/// Evaluates an optional event filter against a payload. `None` always
/// matches (§4.7: "optional `event_filter`").
#[must_use]
pub fn matches(filter: Option<&Json>, payload: &Json) -> bool {
    let Some(filter) = filter else { return true };
    let Some(conditions) = filter.as_object() else { return true };
    conditions.iter().all(|(path, expected)| matches_one(payload, path, expected))
}

/// Evaluates a single `path: expected` condition.
fn matches_one(payload: &Json, path: &str, expected: &Json) -> bool {
    let actual = get_path_or_null(payload, path);
    match expected.as_object().filter(|object| object.len() == 1 && object.keys().next().is_some_and(|key| key.starts_with('$'))) {
        Some(operator) => {
            #[allow(clippy::unwrap_used, reason = "filtered to exactly one key above")]
            let (operator_name, operand) = operator.iter().next().unwrap();
            apply_operator(operator_name, operand, actual)
        }
        None => actual == expected,
    }
}

/// Dispatches one of the three operators; an unrecognised `$`-prefixed key
/// never matches rather than panicking, since the DSL is closed and a
/// stray operator is an authoring mistake, not a crash.
fn apply_operator(operator_name: &str, operand: &Json, actual: &Json) -> bool {
    match operator_name {
        "$contains" => actual.as_array().is_some_and(|items| items.iter().any(|item| item == operand)),
        "$in" => operand.as_array().is_some_and(|candidates| candidates.iter().any(|candidate| candidate == actual)),
        "$ne" => actual != operand,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn plain_equality_matches_scalar_field() {
        let filter = json!({"kind": "invoice"});
        assert!(matches(Some(&filter), &json!({"kind": "invoice"})));
        assert!(!matches(Some(&filter), &json!({"kind": "receipt"})));
    }

    #[test]
    fn missing_path_compares_as_null() {
        let filter = json!({"nested.missing": null});
        assert!(matches(Some(&filter), &json!({"nested": {}})));
    }

    #[test]
    fn contains_checks_list_membership() {
        let filter = json!({"tags": {"$contains": "urgent"}});
        assert!(matches(Some(&filter), &json!({"tags": ["urgent", "other"]})));
        assert!(!matches(Some(&filter), &json!({"tags": ["other"]})));
        assert!(!matches(Some(&filter), &json!({"tags": "urgent"})));
    }

    #[test]
    fn in_checks_value_against_candidate_list() {
        let filter = json!({"status": {"$in": ["new", "updated"]}});
        assert!(matches(Some(&filter), &json!({"status": "new"})));
        assert!(!matches(Some(&filter), &json!({"status": "deleted"})));
    }

    #[test]
    fn ne_rejects_equal_values() {
        let filter = json!({"status": {"$ne": "deleted"}});
        assert!(matches(Some(&filter), &json!({"status": "new"})));
        assert!(!matches(Some(&filter), &json!({"status": "deleted"})));
    }

    #[test]
    fn nested_object_values_compare_structurally() {
        let filter = json!({"address": {"city": "Austin", "zip": "78701"}});
        assert!(matches(Some(&filter), &json!({"address": {"city": "Austin", "zip": "78701"}})));
        assert!(!matches(Some(&filter), &json!({"address": {"city": "Dallas", "zip": "78701"}})));
    }

    #[test]
    fn no_filter_always_matches() {
        assert!(matches(None, &json!({"anything": true})));
    }

    #[test]
    fn unrecognised_operator_never_matches() {
        let filter = json!({"k": {"$unsupported": 1}});
        assert!(!matches(Some(&filter), &json!({"k": 1})));
    }
}
