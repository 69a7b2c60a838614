// forge-ingest/src/url_util.rs
// ============================================================================
// Module: URL Utilities
// Description: Equality normalization, same-domain check, and the
//              include/exclude glob matcher the crawl frontier uses.
// Dependencies: url
// ============================================================================

//! ## Overview
//! Two crawled URLs that differ only by case in scheme/host, a trailing
//! slash, or a fragment are the same frontier entry (§4.8: "normalise URLs
//! before equality"). [`normalize`] is the single place that rule lives.

// ============================================================================
// SECTION: Imports
// ============================================================================

use url::Url;

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Normalizes `url` for frontier equality: lowercases scheme and host, drops
/// the fragment, and strips a trailing slash from any path other than `/`
/// itself (§4.8).
#[must_use]
pub fn normalize(raw_url: &str) -> Option<String> {
    let mut parsed = Url::parse(raw_url).ok()?;
    parsed.set_fragment(None);
    let scheme = parsed.scheme().to_ascii_lowercase();
    parsed.set_scheme(&scheme).ok()?;
    if let Some(host) = parsed.host_str() {
        let host = host.to_ascii_lowercase();
        parsed.set_host(Some(&host)).ok()?;
    }
    if parsed.path().len() > 1 && parsed.path().ends_with('/') {
        let trimmed = parsed.path().trim_end_matches('/').to_string();
        parsed.set_path(&trimmed);
    }
    Some(parsed.to_string())
}

/// Whether two URLs share the same host (§4.8: "same-domain check compares
/// netlocs").
#[must_use]
pub fn same_domain(left: &str, right: &str) -> bool {
    let left_host = Url::parse(left).ok().and_then(|url| url.host_str().map(str::to_ascii_lowercase));
    let right_host = Url::parse(right).ok().and_then(|url| url.host_str().map(str::to_ascii_lowercase));
    left_host.is_some() && left_host == right_host
}

// ============================================================================
// SECTION: Include/Exclude Patterns
// ============================================================================

/// Whether `path` is allowed by `include`/`exclude` globs: excludes are
/// checked first, and an empty `include` list means allow-all (§4.8).
#[must_use]
pub fn path_allowed(path: &str, include: &[String], exclude: &[String]) -> bool {
    if exclude.iter().any(|pattern| glob_match(pattern, path)) {
        return false;
    }
    include.is_empty() || include.iter().any(|pattern| glob_match(pattern, path))
}

/// A minimal shell-style glob matcher supporting `*` (any run of characters)
/// and `?` (exactly one character). No character classes or brace
/// expansion; the patterns §4.8 describes need nothing more.
#[must_use]
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    matches_from(&pattern, &candidate)
}

fn matches_from(pattern: &[char], candidate: &[char]) -> bool {
    match pattern.first() {
        None => candidate.is_empty(),
        Some('*') => {
            matches_from(&pattern[1..], candidate) || (!candidate.is_empty() && matches_from(pattern, &candidate[1..]))
        }
        Some('?') => !candidate.is_empty() && matches_from(&pattern[1..], &candidate[1..]),
        Some(literal) => candidate.first() == Some(literal) && matches_from(&pattern[1..], &candidate[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_scheme_and_host() {
        assert_eq!(normalize("HTTPS://Example.COM/Path").as_deref(), Some("https://example.com/Path"));
    }

    #[test]
    fn normalize_drops_fragment_and_trailing_slash() {
        assert_eq!(normalize("https://example.com/path/#section").as_deref(), Some("https://example.com/path"));
    }

    #[test]
    fn normalize_keeps_root_slash() {
        assert_eq!(normalize("https://example.com/").as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn same_domain_is_case_insensitive() {
        assert!(same_domain("https://Example.com/a", "https://example.COM/b"));
        assert!(!same_domain("https://example.com/a", "https://other.com/b"));
    }

    #[test]
    fn glob_star_matches_any_suffix() {
        assert!(glob_match("/docs/*", "/docs/guide/intro"));
        assert!(!glob_match("/docs/*", "/blog/post"));
    }

    #[test]
    fn glob_question_mark_matches_one_character() {
        assert!(glob_match("/page?", "/page1"));
        assert!(!glob_match("/page?", "/page12"));
    }

    #[test]
    fn empty_include_list_allows_everything_unless_excluded() {
        assert!(path_allowed("/anything", &[], &[]));
        assert!(!path_allowed("/private/x", &[], &["/private/*".to_string()]));
    }

    #[test]
    fn exclude_takes_priority_over_include() {
        let include = vec!["/docs/*".to_string()];
        let exclude = vec!["/docs/internal/*".to_string()];
        assert!(path_allowed("/docs/guide", &include, &exclude));
        assert!(!path_allowed("/docs/internal/secret", &include, &exclude));
    }
}
