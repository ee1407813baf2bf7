//! Deterministic provider mocks
//!
//! `HashEmbedder` maps token hashes into a fixed-dimensional bag-of-words
//! vector, so similar texts get similar vectors and repeated runs are
//! byte-identical. `StaticLlm`/`FailingLlm` cover both sides of the
//! LLM-availability contract.

use async_trait::async_trait;
use librarian_core::{Embedding, EmbeddingError, EmbeddingService, LlmError, LlmService, SummaryRequest};
use sha2::{Digest, Sha256};

// ============================================================================
// EMBEDDER
// ============================================================================

/// Deterministic token-hash embedder
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Embedder with the given dimensionality
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 2)
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u16::from_le_bytes([digest[0], digest[1]]) as usize % self.dimensions;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingService for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }
        Ok(Embedding::new(self.vector_for(text)))
    }
}

// ============================================================================
// LLM MOCKS
// ============================================================================

/// Always answers with a recognisable summary
pub struct StaticLlm;

#[async_trait]
impl LlmService for StaticLlm {
    async fn summarize(&self, request: SummaryRequest) -> Result<String, LlmError> {
        Ok(format!("[mock summary] {}", request.subject))
    }
}

/// Always fails, for exercising degraded paths
pub struct FailingLlm;

#[async_trait]
impl LlmService for FailingLlm {
    async fn summarize(&self, _request: SummaryRequest) -> Result<String, LlmError> {
        Err(LlmError::Unavailable("mock outage".to_string()))
    }
}
