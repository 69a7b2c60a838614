// forge-core/src/value.rs
// ============================================================================
// Module: Step Value
// Description: Dotted-path access and truthiness over JSON-shaped values.
// Purpose: Share one notion of "what does steps.foo.bar mean" between the
//          procedure executor's template renderer and the event bus's
//          filter DSL, instead of each module growing its own path walker.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! The step namespace (`params`, `steps.<name>`, `item`) and the event
//! filter payload (§4.7) are both opaque JSON maps addressed by dotted
//! paths. [`get_path`] is the single implementation of that lookup; missing
//! paths compare as [`serde_json::Value::Null`] per §4.7.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// SECTION: Dotted Path Access
// ============================================================================

/// Resolves a dotted path (e.g. `"steps.fetch.items"`) against a JSON value.
///
/// An empty path returns `root` itself. A missing segment, or a segment
/// that indexes into a non-object/non-array, resolves to `None` rather
/// than erroring; callers that need §4.7's "missing path compares as
/// `null`" semantics should treat `None` as [`Value::Null`].
#[must_use]
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Resolves a dotted path, defaulting missing paths to [`Value::Null`]
/// rather than `None`, matching the event filter DSL's stated semantics.
#[must_use]
pub fn get_path_or_null<'a>(root: &'a Value, path: &str) -> &'a Value {
    static NULL: Value = Value::Null;
    get_path(root, path).unwrap_or(&NULL)
}

// ============================================================================
// SECTION: Truthiness
// ============================================================================

/// Evaluates a JSON value's truthiness for `condition` fields: `null`,
/// `false`, `0`, `0.0`, empty string, and empty array/object are falsy;
/// everything else is truthy.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(num) => num.as_f64().is_none_or(|value| value != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_object_path() {
        let root = json!({"steps": {"fetch": {"items": [1, 2, 3]}}});
        assert_eq!(get_path(&root, "steps.fetch.items.1"), Some(&json!(2)));
    }

    #[test]
    fn missing_path_is_none() {
        let root = json!({"a": 1});
        assert_eq!(get_path(&root, "a.b.c"), None);
    }

    #[test]
    fn missing_path_or_null_is_null() {
        let root = json!({"a": 1});
        assert_eq!(get_path_or_null(&root, "missing"), &Value::Null);
    }

    #[test]
    fn empty_path_returns_root() {
        let root = json!({"a": 1});
        assert_eq!(get_path(&root, ""), Some(&root));
    }

    #[test]
    fn truthiness_matches_common_sense() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!([1])));
    }
}
