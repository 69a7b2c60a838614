// forge-executor/src/truncate.rs
// ============================================================================
// Module: Log Truncation
// Description: Shrinks step input/output payloads before they're written to
//              a Run's log so one verbose step can't blow up the log table.
// Purpose: Give every `RunLogEvent` context blob the same size discipline
//          (§4.5 Logging) instead of each call site truncating ad hoc.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! [`truncate`] recurses through a JSON value with a shrinking character
//! budget: long strings get a `"... [truncated, N chars total]"` suffix,
//! long lists keep their first 5 and last 2 elements with a synthetic
//! marker in between, and dicts split their budget across their values.
//! Anything else that stringifies past the budget is cut with a bare
//! `"... [truncated]"` suffix.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value as Json;

/// Default character budget for a top-level truncation call (§4.5: "~2000
/// chars").
pub const DEFAULT_MAX_LENGTH: usize = 2000;

/// Truncates `data` to [`DEFAULT_MAX_LENGTH`].
#[must_use]
pub fn truncate(data: &Json) -> Json {
    truncate_to(data, DEFAULT_MAX_LENGTH)
}

/// Truncates `data` to an explicit character budget, recursing with a
/// proportionally shrunk budget for nested values.
#[must_use]
pub fn truncate_to(data: &Json, max_length: usize) -> Json {
    match data {
        Json::String(text) => truncate_string(text, max_length),
        Json::Array(items) => truncate_array(items, max_length),
        Json::Object(map) => truncate_object(map, max_length),
        other => truncate_scalar(other, max_length),
    }
}

fn truncate_string(text: &str, max_length: usize) -> Json {
    let char_count = text.chars().count();
    if char_count <= max_length {
        return Json::String(text.to_string());
    }
    let head: String = text.chars().take(max_length).collect();
    Json::String(format!("{head}... [truncated, {char_count} chars total]"))
}

fn truncate_array(items: &[Json], max_length: usize) -> Json {
    if items.len() > 10 {
        let mut shown: Vec<Json> = items[..5].to_vec();
        shown.push(Json::String(format!("... ({} more items) ...", items.len() - 7)));
        shown.extend_from_slice(&items[items.len() - 2..]);
        let budget = (max_length / 10).max(1);
        return Json::Array(shown.iter().map(|item| truncate_to(item, budget)).collect());
    }
    let budget = if items.is_empty() { max_length } else { (max_length / items.len()).max(1) };
    Json::Array(items.iter().map(|item| truncate_to(item, budget)).collect())
}

fn truncate_object(map: &Map<String, Json>, max_length: usize) -> Json {
    let budget = (max_length / map.len().max(1)).max(1);
    let mut result = Map::with_capacity(map.len());
    for (key, value) in map {
        result.insert(key.clone(), truncate_to(value, budget));
    }
    Json::Object(result)
}

fn truncate_scalar(value: &Json, max_length: usize) -> Json {
    if matches!(value, Json::Null) {
        return Json::Null;
    }
    let text = value.to_string();
    let char_count = text.chars().count();
    if char_count <= max_length {
        return value.clone();
    }
    let head: String = text.chars().take(max_length).collect();
    Json::String(format!("{head}... [truncated]"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_string_passes_through() {
        assert_eq!(truncate(&json!("hello")), json!("hello"));
    }

    #[test]
    fn long_string_is_truncated_with_total_length_note() {
        let text = "a".repeat(50);
        let result = truncate_to(&json!(text), 10);
        let Json::String(rendered) = result else { panic!("expected string") };
        assert!(rendered.starts_with(&"a".repeat(10)));
        assert!(rendered.ends_with("... [truncated, 50 chars total]"));
    }

    #[test]
    fn list_of_eleven_keeps_first_five_and_last_two_with_marker() {
        let items: Vec<Json> = (0..11).map(Json::from).collect();
        let result = truncate_to(&Json::Array(items), 100);
        let Json::Array(rendered) = result else { panic!("expected array") };
        assert_eq!(rendered.len(), 8);
        assert_eq!(rendered[0], json!(0));
        assert_eq!(rendered[4], json!(4));
        assert_eq!(rendered[5], json!("... (4 more items) ..."));
        assert_eq!(rendered[6], json!(9));
        assert_eq!(rendered[7], json!(10));
    }

    #[test]
    fn short_list_passes_through_unchanged() {
        let items = vec![json!(1), json!(2), json!(3)];
        assert_eq!(truncate_to(&Json::Array(items.clone()), 100), Json::Array(items));
    }

    #[test]
    fn object_values_share_the_budget() {
        let long_value = "b".repeat(30);
        let data = json!({"a": long_value, "b": "short"});
        let result = truncate_to(&data, 20);
        assert_eq!(result["b"], json!("short"));
        let Json::String(rendered) = &result["a"] else { panic!("expected string") };
        assert!(rendered.contains("truncated"));
    }

    #[test]
    fn null_passes_through() {
        assert_eq!(truncate(&Json::Null), Json::Null);
    }

    #[test]
    fn small_number_passes_through_unchanged() {
        assert_eq!(truncate(&json!(42)), json!(42));
    }
}
