//! Vector Index
//!
//! HNSW approximate nearest neighbour search over entity embeddings. The
//! index is in-process only; durability comes from the embeddings table the
//! store hydrates it from at open.

use std::collections::HashMap;

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

// ============================================================================
// CONSTANTS
// ============================================================================

/// HNSW connectivity parameter (higher = better recall, more memory)
pub const DEFAULT_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building
pub const DEFAULT_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search (higher = better recall, slower)
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector index error types
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum VectorIndexError {
    /// Failed to create the index
    #[error("Index creation failed: {0}")]
    Creation(String),
    /// Failed to add a vector
    #[error("Failed to add vector: {0}")]
    Add(String),
    /// Failed to search
    #[error("Search failed: {0}")]
    Search(String),
    /// Dimension mismatch
    #[error("Invalid dimensions: expected {expected}, got {got}")]
    InvalidDimensions {
        /// Index dimensionality
        expected: usize,
        /// Offending vector length
        got: usize,
    },
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the vector index
#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    /// Number of dimensions; fixed for the index lifetime
    pub dimensions: usize,
    /// HNSW connectivity parameter
    pub connectivity: usize,
    /// Expansion factor for adding vectors
    pub expansion_add: usize,
    /// Expansion factor for searching
    pub expansion_search: usize,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            dimensions: 256,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
        }
    }
}

// ============================================================================
// VECTOR INDEX
// ============================================================================

/// HNSW vector index keyed by entity id strings
pub struct VectorIndex {
    index: Index,
    config: VectorIndexConfig,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    next_id: u64,
}

impl VectorIndex {
    /// Create an index with custom configuration
    pub fn with_config(config: VectorIndexConfig) -> Result<Self, VectorIndexError> {
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };

        let index = Index::new(&options).map_err(|e| VectorIndexError::Creation(e.to_string()))?;

        Ok(Self {
            index,
            config,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            next_id: 0,
        })
    }

    /// Number of vectors in the index
    pub fn len(&self) -> usize {
        self.index.size()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index dimensionality
    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// Whether an entity is present
    pub fn contains(&self, entity_id: &str) -> bool {
        self.key_to_id.contains_key(entity_id)
    }

    fn reserve(&self, capacity: usize) -> Result<(), VectorIndexError> {
        self.index
            .reserve(capacity)
            .map_err(|e| VectorIndexError::Creation(format!("reserve failed: {e}")))
    }

    /// Add or replace an entity's vector
    pub fn add(&mut self, entity_id: &str, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.config.dimensions {
            return Err(VectorIndexError::InvalidDimensions {
                expected: self.config.dimensions,
                got: vector.len(),
            });
        }

        if let Some(&existing_id) = self.key_to_id.get(entity_id) {
            self.index
                .remove(existing_id)
                .map_err(|e| VectorIndexError::Add(e.to_string()))?;
            self.reserve(self.index.size() + 1)?;
            self.index
                .add(existing_id, vector)
                .map_err(|e| VectorIndexError::Add(e.to_string()))?;
            return Ok(());
        }

        // usearch requires reserve() before add() or it may segfault
        let capacity = self.index.capacity();
        let size = self.index.size();
        if size >= capacity {
            self.reserve(std::cmp::max(capacity * 2, 16))?;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.index
            .add(id, vector)
            .map_err(|e| VectorIndexError::Add(e.to_string()))?;
        self.key_to_id.insert(entity_id.to_string(), id);
        self.id_to_key.insert(id, entity_id.to_string());
        Ok(())
    }

    /// Remove an entity's vector; returns whether it existed
    pub fn remove(&mut self, entity_id: &str) -> Result<bool, VectorIndexError> {
        if let Some(id) = self.key_to_id.remove(entity_id) {
            self.id_to_key.remove(&id);
            self.index
                .remove(id)
                .map_err(|e| VectorIndexError::Add(e.to_string()))?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Nearest neighbours by cosine similarity in [0, 1]
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(String, f32)>, VectorIndexError> {
        if query.len() != self.config.dimensions {
            return Err(VectorIndexError::InvalidDimensions {
                expected: self.config.dimensions,
                got: query.len(),
            });
        }
        if self.is_empty() {
            return Ok(vec![]);
        }

        let results = self
            .index
            .search(query, limit)
            .map_err(|e| VectorIndexError::Search(e.to_string()))?;

        let mut out = Vec::with_capacity(results.keys.len());
        for (key, distance) in results.keys.iter().zip(results.distances.iter()) {
            if let Some(entity_id) = self.id_to_key.get(key) {
                // Cosine distance → similarity, clamped into [0, 1]
                let score = (1.0 - distance).clamp(0.0, 1.0);
                out.push((entity_id.clone(), score));
            }
        }
        Ok(out)
    }
}

// ============================================================================
// TESTS
// ============================================================================
