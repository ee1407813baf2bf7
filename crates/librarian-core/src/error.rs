//! Error taxonomy
//!
//! Every user-visible failure carries one of the taxonomy kinds below plus a
//! single remediation sentence. Kinds map to distinct process exit codes for
//! the thin CLI collaborator.

use std::path::PathBuf;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Crate-wide error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum LibrarianError {
    /// Caller contract violated; surfaced, not retried
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation requires a prior bootstrap
    #[error("Workspace is not bootstrapped: {0}. Run bootstrap first.")]
    NotBootstrapped(String),

    /// LLM or embedding capability missing
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Wall-clock exceeded
    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout {
        /// What was running
        operation: String,
        /// Elapsed wall-clock milliseconds
        elapsed_ms: u64,
    },

    /// Governor refused; fatal to the current phase
    #[error("Budget exhausted: {0}")]
    BudgetExhausted(String),

    /// Unrecoverable storage state; remediation is `bootstrap --force`
    #[error("Storage corrupt: {0}. Re-run bootstrap with force to rebuild.")]
    StorageCorrupt(String),

    /// A transactional write violated an invariant
    #[error("Invariant violation on {field}: {value}")]
    InvariantViolation {
        /// Field that failed validation
        field: String,
        /// Offending value, rendered
        value: String,
    },

    /// Entity lookup miss, local to the operation
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Input failed validation, local to the operation
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Git error
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// File watcher error
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Workspace path is missing or unreadable
    #[error("Workspace not accessible: {0}")]
    WorkspaceNotAccessible(PathBuf),
}

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, LibrarianError>;

// ============================================================================
// EXIT CODES
// ============================================================================

impl LibrarianError {
    /// Process exit code for the CLI collaborator.
    ///
    /// 0 is success and never produced here; 1 is the generic
    /// preflight/bootstrap/heal failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            LibrarianError::InvalidArgument(_) => 2,
            LibrarianError::NotBootstrapped(_) => 3,
            LibrarianError::ProviderUnavailable(_) => 4,
            LibrarianError::EntityNotFound(_) => 5,
            LibrarianError::StorageCorrupt(_)
            | LibrarianError::InvariantViolation { .. }
            | LibrarianError::Database(_) => 6,
            LibrarianError::ValidationFailed(_) => 7,
            LibrarianError::Timeout { .. } | LibrarianError::BudgetExhausted(_) => 8,
            _ => 1,
        }
    }

    /// Short taxonomy tag used in reports and coverage gaps
    pub fn kind(&self) -> &'static str {
        match self {
            LibrarianError::InvalidArgument(_) => "INVALID_ARGUMENT",
            LibrarianError::NotBootstrapped(_) => "NOT_BOOTSTRAPPED",
            LibrarianError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            LibrarianError::Timeout { .. } => "TIMEOUT",
            LibrarianError::BudgetExhausted(_) => "BUDGET_EXHAUSTED",
            LibrarianError::StorageCorrupt(_) => "STORAGE_CORRUPT",
            LibrarianError::InvariantViolation { .. } => "INVARIANT_VIOLATION",
            LibrarianError::EntityNotFound(_) => "ENTITY_NOT_FOUND",
            LibrarianError::ValidationFailed(_) => "VALIDATION_FAILED",
            LibrarianError::Database(_) => "STORAGE_ERROR",
            LibrarianError::Io(_) => "IO_ERROR",
            LibrarianError::Git(_) => "GIT_ERROR",
            LibrarianError::Watch(_) => "WATCH_ERROR",
            LibrarianError::Serde(_) => "SERDE_ERROR",
            LibrarianError::WorkspaceNotAccessible(_) => "WORKSPACE_NOT_ACCESSIBLE",
        }
    }

    /// Whether this failure aborts the surrounding bootstrap phase outright
    pub fn is_fatal_to_phase(&self) -> bool {
        matches!(
            self,
            LibrarianError::BudgetExhausted(_)
                | LibrarianError::StorageCorrupt(_)
                | LibrarianError::InvariantViolation { .. }
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_distinct() {
        let errors = [
            LibrarianError::InvalidArgument("x".into()),
            LibrarianError::NotBootstrapped("x".into()),
            LibrarianError::ProviderUnavailable("x".into()),
            LibrarianError::EntityNotFound("x".into()),
            LibrarianError::StorageCorrupt("x".into()),
            LibrarianError::ValidationFailed("x".into()),
            LibrarianError::BudgetExhausted("x".into()),
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 7);
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_timeout_message_format() {
        let err = LibrarianError::Timeout {
            operation: "[commits] ingest".to_string(),
            elapsed_ms: 30_000,
        };
        assert_eq!(err.to_string(), "[commits] ingest timed out after 30000ms");
    }

    #[test]
    fn test_invariant_violation_fatal() {
        let err = LibrarianError::InvariantViolation {
            field: "confidence".to_string(),
            value: "1.7".to_string(),
        };
        assert!(err.is_fatal_to_phase());
        assert_eq!(err.kind(), "INVARIANT_VIOLATION");
    }
}
