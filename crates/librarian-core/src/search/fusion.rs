//! Score Fusion
//!
//! Combines lexical, semantic, and graph-proximity signals per candidate
//! under the retrieval genotype weights.

use std::collections::HashMap;

use crate::config::RetrievalGenotype;

// ============================================================================
// CANDIDATE SIGNALS
// ============================================================================

/// Per-candidate raw signals before fusion
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CandidateSignals {
    /// Normalized lexical score in [0, 1]
    pub lexical: f64,
    /// Cosine similarity in [0, 1]
    pub semantic: f64,
    /// Graph proximity in [0, 1] (1 = seed, decaying per hop)
    pub graph_proximity: f64,
    /// Strongest co-change edge weight touching the candidate, in [0, 1]
    pub co_change_weight: f64,
}

/// A fused candidate
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    /// Entity id
    pub entity_id: String,
    /// Combined score
    pub score: f64,
    /// The raw signals that produced it
    pub signals: CandidateSignals,
}

// ============================================================================
// FUSION
// ============================================================================

/// Merge per-source score maps into one signal table.
///
/// Sources report different candidate sets; absent signals default to zero.
pub fn collect_signals(
    lexical: &[(String, f64)],
    semantic: &[(String, f64)],
    graph: &HashMap<String, f64>,
    co_change: &HashMap<String, f64>,
) -> HashMap<String, CandidateSignals> {
    let mut signals: HashMap<String, CandidateSignals> = HashMap::new();

    let max_lexical = lexical.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max).max(1e-9);
    for (id, score) in lexical {
        signals.entry(id.clone()).or_default().lexical = score / max_lexical;
    }
    for (id, score) in semantic {
        signals.entry(id.clone()).or_default().semantic = score.clamp(0.0, 1.0);
    }
    for (id, proximity) in graph {
        signals.entry(id.clone()).or_default().graph_proximity = proximity.clamp(0.0, 1.0);
    }
    for (id, weight) in co_change {
        if let Some(entry) = signals.get_mut(id) {
            entry.co_change_weight = weight.clamp(0.0, 1.0);
        } else {
            signals.entry(id.clone()).or_default().co_change_weight = weight.clamp(0.0, 1.0);
        }
    }

    signals
}

/// Apply the genotype weights and sort candidates best-first.
///
/// `score = w_lex*lex + w_sem*sim + w_graph*prox + boost*co_change`;
/// ordering ties break on entity id for determinism.
pub fn fuse(
    signals: HashMap<String, CandidateSignals>,
    genotype: &RetrievalGenotype,
) -> Vec<FusedCandidate> {
    let mut candidates: Vec<FusedCandidate> = signals
        .into_iter()
        .map(|(entity_id, signals)| {
            let score = genotype.lexical_weight * signals.lexical
                + genotype.semantic_weight * signals.semantic
                + genotype.graph_weight * signals.graph_proximity
                + genotype.co_change_boost * signals.co_change_weight;
            FusedCandidate {
                entity_id,
                score,
                signals,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    candidates
}

/// Drop candidates scoring below the reranker threshold
pub fn apply_threshold(candidates: Vec<FusedCandidate>, threshold: f64) -> Vec<FusedCandidate> {
    candidates
        .into_iter()
        .filter(|c| c.score >= threshold)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
