//! Code Graph
//!
//! Edge derivation and traversal. The graph lives as an edge table in the
//! store; nodes are stable entity ids. Traversal is bounded BFS with a
//! visited set over that table, so cycles cost nothing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use crate::error::Result;
use crate::model::{CommitRecord, EdgeType, GraphEdge, ModuleEntity};
use crate::storage::{EdgeQuery, KnowledgeStore};

// ============================================================================
// TRAVERSAL
// ============================================================================

/// Bounded BFS from seed ids along the given edge types.
///
/// Returns proximity per reached id: seeds get 1.0, each hop divides by
/// (1 + hop). Both edge directions are followed; `max_nodes` caps the
/// frontier so dense co-change clusters cannot blow up a query.
pub fn expand_from_seeds(
    store: &KnowledgeStore,
    seeds: &[String],
    edge_types: &[EdgeType],
    max_hops: u32,
    max_nodes: usize,
) -> Result<HashMap<String, f64>> {
    let mut proximity: HashMap<String, f64> = HashMap::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut frontier: VecDeque<(String, u32)> = VecDeque::new();

    for seed in seeds {
        if visited.insert(seed.clone()) {
            proximity.insert(seed.clone(), 1.0);
            frontier.push_back((seed.clone(), 0));
        }
    }

    while let Some((node, hop)) = frontier.pop_front() {
        if hop >= max_hops || proximity.len() >= max_nodes {
            continue;
        }

        let outgoing = store.get_graph_edges(&EdgeQuery {
            from_ids: Some(vec![node.clone()]),
            edge_types: Some(edge_types.to_vec()),
            limit: Some(64),
            ..Default::default()
        })?;
        let incoming = store.get_graph_edges(&EdgeQuery {
            to_ids: Some(vec![node.clone()]),
            edge_types: Some(edge_types.to_vec()),
            limit: Some(64),
            ..Default::default()
        })?;

        let next_hop = hop + 1;
        let hop_proximity = 1.0 / (1.0 + next_hop as f64);
        for edge in outgoing.iter().chain(incoming.iter()) {
            for neighbour in [&edge.from_id, &edge.to_id] {
                if proximity.len() >= max_nodes {
                    break;
                }
                if visited.insert(neighbour.clone()) {
                    proximity.insert(neighbour.clone(), hop_proximity);
                    frontier.push_back((neighbour.clone(), next_hop));
                }
            }
        }
    }

    Ok(proximity)
}

// ============================================================================
// IMPORT RESOLUTION
// ============================================================================

/// Resolve a TypeScript/JavaScript import specifier to a workspace-relative
/// module path among the known paths.
///
/// Only relative specifiers resolve; bare package imports are external and
/// return `None`.
pub fn resolve_import(
    from_path: &str,
    specifier: &str,
    known_paths: &HashSet<String>,
) -> Option<String> {
    if !specifier.starts_with('.') {
        return None;
    }

    let base_dir = Path::new(from_path).parent().unwrap_or_else(|| Path::new(""));
    let joined = normalize_path(&base_dir.join(specifier));

    const SUFFIXES: &[&str] = &[
        "", ".ts", ".tsx", ".js", ".jsx", ".mts", ".cts",
        "/index.ts", "/index.tsx", "/index.js",
    ];
    for suffix in SUFFIXES {
        let candidate = format!("{joined}{suffix}");
        if known_paths.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Collapse `.` and `..` segments without touching the filesystem
fn normalize_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                parts.pop();
            }
            other => parts.push(other.as_os_str().to_string_lossy().into_owned()),
        }
    }
    parts.join("/")
}

// ============================================================================
// EDGE DERIVATION
// ============================================================================

/// Import edges for one module against the known module set
pub fn import_edges(
    module: &ModuleEntity,
    specifiers: &[String],
    known_paths: &HashSet<String>,
) -> Vec<GraphEdge> {
    specifiers
        .iter()
        .filter_map(|spec| resolve_import(&module.path, spec, known_paths))
        .map(|target_path| {
            GraphEdge::statically(
                &module.id,
                ModuleEntity::id_for_path(&target_path),
                EdgeType::Imports,
            )
        })
        .collect()
}

/// Co-change edges mined from commit history.
///
/// Weight is the pair's co-occurrence count over the most co-changed pair's
/// count. Pairs below `min_count` are noise and skipped; commits touching
/// more than `max_files_per_commit` files (mass renames, formatting sweeps)
/// are ignored entirely.
pub fn derive_co_change_edges(
    commits: &[CommitRecord],
    min_count: u32,
    max_files_per_commit: usize,
) -> Vec<GraphEdge> {
    let mut pair_counts: HashMap<(String, String), u32> = HashMap::new();

    for commit in commits {
        if commit.files.len() > max_files_per_commit {
            continue;
        }
        let mut files = commit.files.clone();
        files.sort();
        files.dedup();
        for i in 0..files.len() {
            for j in (i + 1)..files.len() {
                *pair_counts
                    .entry((files[i].clone(), files[j].clone()))
                    .or_default() += 1;
            }
        }
    }

    let max_count = pair_counts.values().copied().max().unwrap_or(1).max(1) as f64;
    let mut edges: Vec<GraphEdge> = pair_counts
        .into_iter()
        .filter(|(_, count)| *count >= min_count)
        .map(|((a, b), count)| {
            GraphEdge::co_change(
                ModuleEntity::id_for_path(&a),
                ModuleEntity::id_for_path(&b),
                count as f64 / max_count,
            )
        })
        .collect();
    edges.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.from_id.cmp(&b.from_id))
    });
    edges
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::model::CommitCategory;

    fn commit(files: &[&str]) -> CommitRecord {
        CommitRecord {
            hash: "h".to_string(),
            author: "a".to_string(),
            author_email: "a@x".to_string(),
            date: Utc::now(),
            message: "m".to_string(),
            files: files.iter().map(|f| f.to_string()).collect(),
            category: CommitCategory::Other,
            risk_score: 0.0,
            summary: String::new(),
        }
    }

    #[test]
    fn test_resolve_relative_import() {
        let known: HashSet<String> = ["src/auth/token.ts", "src/util/index.ts", "src/m.ts"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(
            resolve_import("src/auth/login.ts", "./token", &known),
            Some("src/auth/token.ts".to_string())
        );
        assert_eq!(
            resolve_import("src/auth/login.ts", "../util", &known),
            Some("src/util/index.ts".to_string())
        );
        assert_eq!(
            resolve_import("src/auth/login.ts", "../m.ts", &known),
            Some("src/m.ts".to_string())
        );
        assert_eq!(resolve_import("src/auth/login.ts", "lodash", &known), None);
        assert_eq!(resolve_import("src/auth/login.ts", "./missing", &known), None);
    }

    #[test]
    fn test_co_change_weights_normalized() {
        let commits = vec![
            commit(&["a.ts", "b.ts"]),
            commit(&["a.ts", "b.ts"]),
            commit(&["a.ts", "c.ts"]),
        ];
        let edges = derive_co_change_edges(&commits, 1, 50);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].weight, 1.0);
        assert_eq!(edges[1].weight, 0.5);
        assert!(edges.iter().all(|e| e.edge_type == EdgeType::CoChanges));
    }

    #[test]
    fn test_co_change_skips_sweeping_commits() {
        let files: Vec<String> = (0..60).map(|i| format!("f{i}.ts")).collect();
        let refs: Vec<&str> = files.iter().map(String::as_str).collect();
        let commits = vec![commit(&refs)];
        assert!(derive_co_change_edges(&commits, 1, 50).is_empty());
    }

    #[test]
    fn test_expand_bfs_with_cycle() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        // a -> b -> c -> a forms a cycle
        store.upsert_edge(&GraphEdge::statically("a", "b", EdgeType::Imports)).unwrap();
        store.upsert_edge(&GraphEdge::statically("b", "c", EdgeType::Imports)).unwrap();
        store.upsert_edge(&GraphEdge::statically("c", "a", EdgeType::Imports)).unwrap();

        let proximity = expand_from_seeds(
            &store,
            &["a".to_string()],
            &[EdgeType::Imports],
            2,
            100,
        )
        .unwrap();

        assert_eq!(proximity.get("a"), Some(&1.0));
        assert_eq!(proximity.get("b"), Some(&0.5));
        assert_eq!(proximity.get("c"), Some(&0.5)); // reached in 1 hop via incoming edge
    }

    #[test]
    fn test_expand_zero_hops_returns_seeds_only() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store.upsert_edge(&GraphEdge::statically("a", "b", EdgeType::Imports)).unwrap();
        let proximity =
            expand_from_seeds(&store, &["a".to_string()], &[EdgeType::Imports], 0, 100).unwrap();
        assert_eq!(proximity.len(), 1);
    }

    #[test]
    fn test_expand_respects_node_cap() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        for i in 0..20 {
            store
                .upsert_edge(&GraphEdge::statically("hub", format!("n{i}"), EdgeType::Calls))
                .unwrap();
        }
        let proximity = expand_from_seeds(
            &store,
            &["hub".to_string()],
            &[EdgeType::Calls],
            1,
            5,
        )
        .unwrap();
        assert!(proximity.len() <= 5);
    }
}
