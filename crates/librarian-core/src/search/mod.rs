//! Search Module
//!
//! The query-time retrieval engine:
//! - HNSW vector search over entity embeddings
//! - FTS5 lexical candidates with query sanitization
//! - Genotype-weighted score fusion with co-change boosting
//! - Isotonic confidence calibration and uncertainty
//! - Fingerprint-keyed query cache with single-flight retrieval

mod cache;
mod calibrate;
mod fusion;
pub(crate) mod lexical;
mod retriever;
pub(crate) mod vector;

pub use cache::{query_fingerprint, QueryCache};
pub use calibrate::{uncertainty, IsotonicCalibrator, Uncertainty};
pub use fusion::{apply_threshold, collect_signals, fuse, CandidateSignals, FusedCandidate};
pub use lexical::{intent_terms, sanitize_fts_query};
pub use retriever::{QueryOptions, QueryResponse, Retriever, UcRequirements};
pub use vector::{VectorIndex, VectorIndexConfig, VectorIndexError};
