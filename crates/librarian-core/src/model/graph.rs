//! Code graph edges
//!
//! Directed typed edges over stable entity ids. Nodes are module and
//! function ids; traversal is bounded BFS over the edge table, never shared
//! mutable node objects.

use serde::{Deserialize, Serialize};

// ============================================================================
// EDGE TYPES
// ============================================================================

/// Relationship kinds in the code graph
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Module imports module
    Imports,
    /// Function calls function
    Calls,
    /// Symbol references symbol
    References,
    /// Module contains function
    Contains,
    /// Files frequently modified in the same commit
    CoChanges,
    /// Module is exercised by a test file
    TestedBy,
    /// File is owned by an author
    OwnedBy,
}

impl EdgeType {
    /// Storage string form
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Imports => "imports",
            EdgeType::Calls => "calls",
            EdgeType::References => "references",
            EdgeType::Contains => "contains",
            EdgeType::CoChanges => "co_changes",
            EdgeType::TestedBy => "tested_by",
            EdgeType::OwnedBy => "owned_by",
        }
    }

    /// Parse the storage string form
    pub fn parse_name(s: &str) -> Option<Self> {
        Some(match s {
            "imports" => EdgeType::Imports,
            "calls" => EdgeType::Calls,
            "references" => EdgeType::References,
            "contains" => EdgeType::Contains,
            "co_changes" => EdgeType::CoChanges,
            "tested_by" => EdgeType::TestedBy,
            "owned_by" => EdgeType::OwnedBy,
            _ => return None,
        })
    }

    /// Edge types followed during retrieval graph expansion
    pub fn expansion_set() -> &'static [EdgeType] {
        &[EdgeType::Imports, EdgeType::Calls, EdgeType::CoChanges]
    }
}

/// Where an edge came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeSource {
    /// Static analysis of the source
    #[default]
    Static,
    /// Co-change mining of git history
    GitCochange,
    /// Inferred by the LLM
    LlmInferred,
}

impl EdgeSource {
    /// Storage string form
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeSource::Static => "static",
            EdgeSource::GitCochange => "git-cochange",
            EdgeSource::LlmInferred => "llm-inferred",
        }
    }

    /// Parse the storage string form
    pub fn parse_name(s: &str) -> Self {
        match s {
            "git-cochange" => EdgeSource::GitCochange,
            "llm-inferred" => EdgeSource::LlmInferred,
            _ => EdgeSource::Static,
        }
    }
}

// ============================================================================
// GRAPH EDGE
// ============================================================================

/// A directed edge in the code graph.
///
/// `(from_id, to_id, edge_type)` is the identity; re-upserting the same
/// identity keeps the maximum weight seen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Source entity id
    pub from_id: String,
    /// Target entity id
    pub to_id: String,
    /// Relationship kind
    pub edge_type: EdgeType,
    /// Strength in [0, 1]
    pub weight: f64,
    /// Provenance
    pub source: EdgeSource,
}

impl GraphEdge {
    /// Build a static-analysis edge with full weight
    pub fn statically(from_id: impl Into<String>, to_id: impl Into<String>, edge_type: EdgeType) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            edge_type,
            weight: 1.0,
            source: EdgeSource::Static,
        }
    }

    /// Build a co-change edge with mined weight
    pub fn co_change(from_id: impl Into<String>, to_id: impl Into<String>, weight: f64) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            edge_type: EdgeType::CoChanges,
            weight: weight.clamp(0.0, 1.0),
            source: EdgeSource::GitCochange,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_type_roundtrip() {
        for edge_type in [
            EdgeType::Imports,
            EdgeType::CoChanges,
            EdgeType::TestedBy,
            EdgeType::OwnedBy,
        ] {
            assert_eq!(EdgeType::parse_name(edge_type.as_str()), Some(edge_type));
        }
    }

    #[test]
    fn test_co_change_weight_clamped() {
        let edge = GraphEdge::co_change("a", "b", 3.5);
        assert_eq!(edge.weight, 1.0);
        assert_eq!(edge.source, EdgeSource::GitCochange);
    }

    #[test]
    fn test_expansion_set_excludes_ownership() {
        assert!(!EdgeType::expansion_set().contains(&EdgeType::OwnedBy));
        assert!(EdgeType::expansion_set().contains(&EdgeType::CoChanges));
    }
}
