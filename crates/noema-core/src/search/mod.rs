//! Search pipeline (C6).
//!
//! Token-index query -> fallback substring query -> ranking -> relation
//! expansion -> result caching, per spec.md §4.6.

pub mod pipeline;
pub mod rank;

pub use pipeline::{search, SearchCacheValue};

/// How the caller's raw query classifies (§4.6 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    Simple,
    Compound,
    Phrase,
}

/// Split `query` into quoted phrases and bare terms, classify the shape, and
/// build the FTS5 MATCH expression that ORs each quoted prefix-term
/// (`"term"*`), per spec.md §4.6 step 2.
pub fn parse_query(query: &str) -> (QueryShape, String) {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return (QueryShape::Simple, String::new());
    }

    let terms: Vec<String> = trimmed
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let shape = if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() > 1 {
        QueryShape::Phrase
    } else if terms.len() > 1 {
        QueryShape::Compound
    } else {
        QueryShape::Simple
    };

    if terms.is_empty() {
        return (shape, String::new());
    }

    let expr = terms
        .iter()
        .map(|t| format!("\"{}\"*", sanitize_fts5_term(t)))
        .collect::<Vec<_>>()
        .join(" OR ");

    (shape, expr)
}

/// Escape characters FTS5 would otherwise treat as query syntax inside a
/// quoted term (a literal `"` doubles per SQLite string-literal rules).
fn sanitize_fts5_term(term: &str) -> String {
    term.replace('"', "\"\"")
}

/// Canonical cache fingerprint for a search request (§4.6 step 1):
/// `(query, limit, serialized context, mode)`.
pub fn fingerprint(query: &str, limit: usize, context: Option<&crate::types::SearchContext>, mode: crate::types::SearchMode) -> String {
    let ctx_json = context.map(|c| serde_json::to_string(c).unwrap_or_default()).unwrap_or_default();
    format!("{}\u{1}{}\u{1}{}\u{1}{:?}", query.to_lowercase().trim(), limit, ctx_json, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_query() {
        let (shape, expr) = parse_query("climb");
        assert_eq!(shape, QueryShape::Simple);
        assert_eq!(expr, "\"climb\"*");
    }

    #[test]
    fn parse_compound_query_ors_terms() {
        let (shape, expr) = parse_query("alice bob");
        assert_eq!(shape, QueryShape::Compound);
        assert_eq!(expr, "\"alice\"* OR \"bob\"*");
    }

    #[test]
    fn fingerprint_is_stable_for_same_inputs() {
        let a = fingerprint("Climb", 10, None, crate::types::SearchMode::Auto);
        let b = fingerprint("climb", 10, None, crate::types::SearchMode::Auto);
        assert_eq!(a, b);
    }
}
