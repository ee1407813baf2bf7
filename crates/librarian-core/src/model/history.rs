//! Git history records
//!
//! Commits, blame chunks, diffs, and reflog entries as produced by the
//! history-backed ingestion sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stable_id;

// ============================================================================
// COMMITS
// ============================================================================

/// Commit message categorisation
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommitCategory {
    /// Bug fix
    Bugfix,
    /// New feature
    Feature,
    /// Refactoring
    Refactor,
    /// Test changes
    Test,
    /// Documentation
    Docs,
    /// Chore / maintenance
    Chore,
    /// Performance work
    Perf,
    /// Formatting only
    Style,
    /// Revert of an earlier commit
    Revert,
    /// Anything else
    #[default]
    Other,
}

impl CommitCategory {
    /// Storage string form
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitCategory::Bugfix => "bugfix",
            CommitCategory::Feature => "feature",
            CommitCategory::Refactor => "refactor",
            CommitCategory::Test => "test",
            CommitCategory::Docs => "docs",
            CommitCategory::Chore => "chore",
            CommitCategory::Perf => "perf",
            CommitCategory::Style => "style",
            CommitCategory::Revert => "revert",
            CommitCategory::Other => "other",
        }
    }
}

/// A parsed commit with derived signals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    /// Full hash
    pub hash: String,
    /// Author name
    pub author: String,
    /// Author email
    pub author_email: String,
    /// Commit timestamp
    pub date: DateTime<Utc>,
    /// First line of the message
    pub message: String,
    /// Files touched
    pub files: Vec<String>,
    /// Derived category
    pub category: CommitCategory,
    /// Risk score in [0, 1]
    pub risk_score: f64,
    /// Summary (LLM when available, heuristic otherwise)
    pub summary: String,
}

// ============================================================================
// BLAME
// ============================================================================

/// A run of consecutive lines with identical ownership
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlameEntry {
    /// `sha256(file:line_start:commit)` truncated to 32 chars
    pub id: String,
    /// Workspace-relative path
    pub file_path: String,
    /// 1-indexed first line of the run
    pub line_start: u32,
    /// 1-indexed last line of the run
    pub line_end: u32,
    /// Author name
    pub author: String,
    /// Author email
    pub author_email: String,
    /// Commit that last touched the run
    pub commit_hash: String,
    /// Commit timestamp
    pub commit_date: DateTime<Utc>,
    /// Line number in the original commit
    pub original_line: u32,
    /// When this entry was indexed
    pub indexed_at: DateTime<Utc>,
}

impl BlameEntry {
    /// Deterministic chunk key
    pub fn id_for(file_path: &str, line_start: u32, commit_hash: &str) -> String {
        stable_id(&format!("{file_path}:{line_start}:{commit_hash}"))
    }
}

// ============================================================================
// DIFFS
// ============================================================================

/// Per-file change classification
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChangeCategory {
    /// Types, signatures, module layout
    Structural,
    /// Logic and control flow
    Behavioral,
    /// Comments, formatting, renames
    Cosmetic,
    /// No single class dominates
    #[default]
    Mixed,
}

impl ChangeCategory {
    /// Storage string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeCategory::Structural => "structural",
            ChangeCategory::Behavioral => "behavioral",
            ChangeCategory::Cosmetic => "cosmetic",
            ChangeCategory::Mixed => "mixed",
        }
    }

    /// Parse the storage string form
    pub fn parse_name(s: &str) -> Self {
        match s {
            "structural" => ChangeCategory::Structural,
            "behavioral" => ChangeCategory::Behavioral,
            "cosmetic" => ChangeCategory::Cosmetic,
            _ => ChangeCategory::Mixed,
        }
    }
}

/// One hunk within a diff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffHunk {
    /// Old-side start line
    pub old_start: u32,
    /// Old-side line count
    pub old_lines: u32,
    /// New-side start line
    pub new_start: u32,
    /// New-side line count
    pub new_lines: u32,
}

/// A commit's changes to one file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRecord {
    /// `sha256(commit:file)` truncated to 32 chars
    pub id: String,
    /// Commit hash
    pub commit_hash: String,
    /// Workspace-relative path
    pub file_path: String,
    /// Lines added
    pub additions: u32,
    /// Lines removed
    pub deletions: u32,
    /// Number of hunks
    pub hunk_count: u32,
    /// Hunk spans
    pub hunks: Vec<DiffHunk>,
    /// Change classification
    pub change_category: ChangeCategory,
    /// Complexity in [0, 1]
    pub complexity: f64,
    /// Impact in [0, 1]
    pub impact_score: f64,
}

impl DiffRecord {
    /// Deterministic record key
    pub fn id_for(commit_hash: &str, file_path: &str) -> String {
        stable_id(&format!("{commit_hash}:{file_path}"))
    }
}

// ============================================================================
// REFLOG
// ============================================================================

/// Ref movement kinds
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReflogAction {
    /// Plain commit
    Commit,
    /// Rebase step
    Rebase,
    /// Reset
    Reset,
    /// Merge
    Merge,
    /// Branch checkout
    Checkout,
    /// Cherry-pick
    CherryPick,
    /// Revert
    Revert,
    /// Pull
    Pull,
    /// Anything else
    #[default]
    Other,
}

impl ReflogAction {
    /// Storage string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ReflogAction::Commit => "commit",
            ReflogAction::Rebase => "rebase",
            ReflogAction::Reset => "reset",
            ReflogAction::Merge => "merge",
            ReflogAction::Checkout => "checkout",
            ReflogAction::CherryPick => "cherry-pick",
            ReflogAction::Revert => "revert",
            ReflogAction::Pull => "pull",
            ReflogAction::Other => "other",
        }
    }

    /// Derive the action from a reflog message prefix
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.starts_with("commit (amend)") || lower.starts_with("commit") {
            ReflogAction::Commit
        } else if lower.starts_with("rebase") {
            ReflogAction::Rebase
        } else if lower.starts_with("reset") {
            ReflogAction::Reset
        } else if lower.starts_with("merge") {
            ReflogAction::Merge
        } else if lower.starts_with("checkout") {
            ReflogAction::Checkout
        } else if lower.starts_with("cherry-pick") {
            ReflogAction::CherryPick
        } else if lower.starts_with("revert") {
            ReflogAction::Revert
        } else if lower.starts_with("pull") {
            ReflogAction::Pull
        } else {
            ReflogAction::Other
        }
    }
}

/// One reflog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflogEntry {
    /// `sha256(ref:commit:timestamp)` truncated to 32 chars
    pub id: String,
    /// Ref name (e.g. `HEAD@{0}`)
    pub ref_name: String,
    /// Commit the ref moved to
    pub commit_hash: String,
    /// Movement kind
    pub action: ReflogAction,
    /// Commit the ref moved from, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_commit: Option<String>,
    /// When the movement happened
    pub timestamp: DateTime<Utc>,
    /// Reflog message
    pub message: String,
}

impl ReflogEntry {
    /// Deterministic entry key
    pub fn id_for(ref_name: &str, commit_hash: &str, timestamp: &DateTime<Utc>) -> String {
        stable_id(&format!("{ref_name}:{commit_hash}:{}", timestamp.timestamp()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blame_id_matches_spec_key() {
        let id = BlameEntry::id_for("src/a.ts", 10, "deadbeef");
        assert_eq!(id.len(), 32);
        assert_eq!(id, stable_id("src/a.ts:10:deadbeef"));
    }

    #[test]
    fn test_reflog_action_prefixes() {
        assert_eq!(ReflogAction::from_message("commit: add feature"), ReflogAction::Commit);
        assert_eq!(ReflogAction::from_message("commit (amend): fix"), ReflogAction::Commit);
        assert_eq!(
            ReflogAction::from_message("rebase (pick): step"),
            ReflogAction::Rebase
        );
        assert_eq!(
            ReflogAction::from_message("checkout: moving from main to dev"),
            ReflogAction::Checkout
        );
        assert_eq!(ReflogAction::from_message("gc: pruning"), ReflogAction::Other);
    }

    #[test]
    fn test_change_category_roundtrip() {
        for category in [
            ChangeCategory::Structural,
            ChangeCategory::Behavioral,
            ChangeCategory::Cosmetic,
            ChangeCategory::Mixed,
        ] {
            assert_eq!(ChangeCategory::parse_name(category.as_str()), category);
        }
    }
}
