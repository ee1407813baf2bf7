//! Embeddings
//!
//! The `Embedding` vector type, similarity math, and the `EmbeddingService`
//! port. Model execution lives outside this crate; callers inject an
//! implementation or run without one (semantic scoring degrades to zero
//! weight).

use async_trait::async_trait;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding port error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// The provider is not reachable or not configured
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),
    /// The provider rejected the input
    #[error("Invalid embedding input: {0}")]
    InvalidInput(String),
    /// The provider failed mid-call
    #[error("Embedding generation failed: {0}")]
    Failed(String),
}

// ============================================================================
// EMBEDDING TYPE
// ============================================================================

/// A semantic embedding vector
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The vector
    pub vector: Vec<f32>,
    /// Dimensionality
    pub dimensions: usize,
}

impl Embedding {
    /// Wrap a vector
    pub fn new(vector: Vec<f32>) -> Self {
        let dimensions = vector.len();
        Self { vector, dimensions }
    }

    /// Cosine similarity with another embedding; 0.0 on dimension mismatch
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.dimensions != other.dimensions {
            return 0.0;
        }
        cosine_similarity(&self.vector, &other.vector)
    }

    /// Normalize to unit length in place
    pub fn normalize(&mut self) {
        let norm = self.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut self.vector {
                *x /= norm;
            }
        }
    }

    /// Little-endian f32 bytes for blob storage
    pub fn to_bytes(&self) -> Vec<u8> {
        self.vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Rebuild from blob bytes; `None` when the length is not a multiple of 4
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some(Self::new(vector))
    }
}

/// Cosine similarity of two raw vectors, mapped into [0, 1]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    // Raw cosine is [-1, 1]; retrieval treats similarity as [0, 1]
    ((dot / (norm_a * norm_b)) + 1.0) / 2.0
}

// ============================================================================
// SERVICE PORT
// ============================================================================

/// Port for embedding model execution.
///
/// Implementations must return vectors of a single fixed dimensionality;
/// the store pins that dimension at bootstrap.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Dimensionality every returned vector will have
    fn dimensions(&self) -> usize;

    /// Embed one text
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Embed a batch; default implementation loops
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

// ============================================================================
// TESTS
// ============================================================================
