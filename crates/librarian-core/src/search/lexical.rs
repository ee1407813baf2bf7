//! Lexical search helpers
//!
//! FTS5 query sanitization. The actual BM25 query runs inside the store,
//! which owns the connections; this module keeps the query-shaping logic
//! testable on its own.

// ============================================================================
// QUERY SANITIZATION
// ============================================================================

/// Turn free text into a safe FTS5 MATCH expression.
///
/// FTS5 treats `"`, `*`, `-`, `^`, parentheses, and bare keywords (AND/OR/
/// NOT/NEAR) as syntax; a natural-language intent full of punctuation would
/// otherwise be a parse error. Each surviving term is quoted and the terms
/// are OR-ed so partial matches still rank.
pub fn sanitize_fts_query(raw: &str) -> String {
    let terms: Vec<String> = raw
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 2)
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    terms.join(" OR ")
}

/// Extract the lexical terms of an intent without FTS quoting, for overlap
/// scoring outside SQLite
pub fn intent_terms(raw: &str) -> Vec<String> {
    raw.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
