//! Code Suggestions
//!
//! Lightweight pattern detection over source text producing actionable
//! suggestions with risk and effort ratings. Currently covers magic-number
//! extraction; the shape leaves room for further detectors.

use serde::{Deserialize, Serialize};

// ============================================================================
// SUGGESTION TYPES
// ============================================================================

/// What kind of change a suggestion proposes
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    /// Replace a numeric literal with a named constant
    ReplaceMagicNumber,
}

/// How risky applying the suggestion is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionRisk {
    /// Behaviour-preserving
    Low,
    /// Needs review
    Medium,
    /// Could change behaviour
    High,
}

/// How much work applying the suggestion is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionEffort {
    /// Single mechanical edit
    Trivial,
    /// A few edits
    Small,
    /// Real refactoring
    Large,
}

/// One detected suggestion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// Proposed change kind
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    /// Risk of applying it
    pub risk: SuggestionRisk,
    /// Effort to apply it
    pub effort: SuggestionEffort,
    /// Whether a tool could apply it without a human
    pub automatable: bool,
    /// 1-indexed line the finding is on
    pub line: u32,
    /// Human-readable description
    pub description: String,
}

// ============================================================================
// MAGIC NUMBER DETECTION
// ============================================================================

/// Numbers that read fine inline: loop bounds, percentages, indexing,
/// common time and size constants
const ACCEPTABLE_NUMBERS: &[i64] = &[
    -1, 0, 1, 2, 3, 4, 5, 8, 10, 16, 24, 32, 60, 64, 100, 128, 256, 512, 1000, 1024,
];

/// Find numeric literals used in comparisons or arithmetic that deserve a
/// named constant. Literals in the acceptable set are skipped, as are
/// declarations that already name them.
pub fn detect_magic_numbers(code: &str) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    for (index, line) in code.lines().enumerate() {
        let trimmed = line.trim();
        // A named assignment is the fix, not the smell
        if trimmed.starts_with("const ")
            || trimmed.starts_with("static ")
            || trimmed.starts_with("//")
            || trimmed.starts_with('*')
        {
            continue;
        }

        for literal in numeric_literals(trimmed) {
            if ACCEPTABLE_NUMBERS.contains(&literal.value) {
                continue;
            }
            suggestions.push(Suggestion {
                suggestion_type: SuggestionType::ReplaceMagicNumber,
                risk: SuggestionRisk::Low,
                effort: SuggestionEffort::Trivial,
                automatable: true,
                line: index as u32 + 1,
                description: format!(
                    "replace magic number {} with a named constant",
                    literal.value
                ),
            });
        }
    }
    suggestions
}

struct Literal {
    value: i64,
}

/// Integer literals appearing next to an operator (comparison, arithmetic,
/// argument position); skips identifiers with digits and version-ish dotted
/// numbers
fn numeric_literals(line: &str) -> Vec<Literal> {
    let bytes = line.as_bytes();
    let mut literals = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            // Part of an identifier like `sha256`?
            let preceded_by_ident = i > 0
                && (bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_' || bytes[i - 1] == b'.');
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            // Dotted (1.5) or identifier-continued (2x) literals are skipped
            let followed_by_ident = i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.');
            if preceded_by_ident || followed_by_ident {
                continue;
            }

            let context_ok = line[..start]
                .trim_end()
                .ends_with(['>', '<', '=', '+', '-', '*', '/', '%', '(', ',']);
            if !context_ok {
                continue;
            }

            if let Ok(value) = line[start..i].parse::<i64>() {
                literals.push(Literal { value });
            }
        } else {
            i += 1;
        }
    }
    literals
}

// ============================================================================
// TESTS
// ============================================================================
