//! LLM service port
//!
//! Summaries only. The transport, provider selection, and prompt plumbing
//! are external collaborators; the core calls through this trait and always
//! has a deterministic fallback when no service is injected (except for
//! sources that declare the LLM *required*).

use async_trait::async_trait;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// LLM port error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Not configured or unreachable
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),
    /// The call exceeded its budget
    #[error("LLM budget exhausted: {0}")]
    BudgetExhausted(String),
    /// The provider failed mid-call
    #[error("LLM call failed: {0}")]
    Failed(String),
}

// ============================================================================
// SERVICE PORT
// ============================================================================

/// A summary request
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    /// What is being summarised (`doc`, `commit`, `module`)
    pub subject: String,
    /// Raw content to summarise
    pub content: String,
    /// Soft cap on summary length, characters
    pub max_chars: usize,
}

/// Port for LLM-backed summarisation
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Produce a one-paragraph summary
    async fn summarize(&self, request: SummaryRequest) -> Result<String, LlmError>;

    /// Approximate tokens a call with this content will consume.
    ///
    /// Used by the governor before the call is made; 4 chars/token is close
    /// enough for budgeting.
    fn estimate_tokens(&self, content: &str) -> u64 {
        (content.len() as u64 / 4).max(1)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLlm;

    #[async_trait]
    impl LlmService for FixedLlm {
        async fn summarize(&self, request: SummaryRequest) -> Result<String, LlmError> {
            Ok(format!("summary of {}", request.subject))
        }
    }

    #[tokio::test]
    async fn test_trait_object_usable() {
        let llm: Box<dyn LlmService> = Box::new(FixedLlm);
        let summary = llm
            .summarize(SummaryRequest {
                subject: "doc".to_string(),
                content: "# Title".to_string(),
                max_chars: 200,
            })
            .await
            .unwrap();
        assert_eq!(summary, "summary of doc");
    }

    #[test]
    fn test_token_estimate_floor() {
        assert_eq!(FixedLlm.estimate_tokens(""), 1);
        assert_eq!(FixedLlm.estimate_tokens(&"x".repeat(400)), 100);
    }
}
