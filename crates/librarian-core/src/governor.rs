//! Governor
//!
//! Per-phase budget tracking for token and embedding consumption. The
//! governor refuses work *before* a limit is crossed; callers check, then
//! spend.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{LibrarianError, Result};

// ============================================================================
// BUDGETS
// ============================================================================

/// Hard per-phase limits
#[derive(Debug, Clone, Copy)]
pub struct BudgetLimits {
    /// LLM tokens allowed
    pub max_tokens: u64,
    /// Embedding calls allowed
    pub max_embeddings: u64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_tokens: 200_000,
            max_embeddings: 10_000,
        }
    }
}

// ============================================================================
// GOVERNOR CONTEXT
// ============================================================================

/// Thread-safe consumption tracker; each phase owns its own instance
#[derive(Debug)]
pub struct GovernorContext {
    /// Phase this governor belongs to
    phase: String,
    limits: BudgetLimits,
    tokens_used: AtomicU64,
    embeddings_used: AtomicU64,
}

impl GovernorContext {
    /// Create a governor for a phase
    pub fn new(phase: impl Into<String>, limits: BudgetLimits) -> Self {
        Self {
            phase: phase.into(),
            limits,
            tokens_used: AtomicU64::new(0),
            embeddings_used: AtomicU64::new(0),
        }
    }

    /// Phase name
    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// Fail if spending `tokens` more would exceed the limit
    pub fn check_token_budget(&self, tokens: u64) -> Result<()> {
        let used = self.tokens_used.load(Ordering::Relaxed);
        if used.saturating_add(tokens) > self.limits.max_tokens {
            return Err(LibrarianError::BudgetExhausted(format!(
                "phase {}: {} tokens used, {tokens} more would exceed the {} limit",
                self.phase, used, self.limits.max_tokens
            )));
        }
        Ok(())
    }

    /// Fail if one more batch of `count` embeddings would exceed the limit
    pub fn check_embedding_budget(&self, count: u64) -> Result<()> {
        let used = self.embeddings_used.load(Ordering::Relaxed);
        if used.saturating_add(count) > self.limits.max_embeddings {
            return Err(LibrarianError::BudgetExhausted(format!(
                "phase {}: {} embeddings used, {count} more would exceed the {} limit",
                self.phase, used, self.limits.max_embeddings
            )));
        }
        Ok(())
    }

    /// Record tokens actually consumed
    pub fn record_tokens(&self, tokens: u64) {
        self.tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }

    /// Record embedding calls actually made
    pub fn record_embeddings(&self, count: u64) {
        self.embeddings_used.fetch_add(count, Ordering::Relaxed);
    }

    /// Tokens consumed so far
    pub fn tokens_used(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    /// Embedding calls made so far
    pub fn embeddings_used(&self) -> u64 {
        self.embeddings_used.load(Ordering::Relaxed)
    }
}

// ============================================================================
// TESTS
// ============================================================================
