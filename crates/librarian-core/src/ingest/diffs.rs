//! Diff Indexer
//!
//! Per-commit, per-file change records: hunk spans, a keyword-based change
//! classification, and derived complexity/impact scores.

use std::path::Path;

use git2::{Patch, Repository};
use serde_json::json;

use crate::model::{
    ChangeCategory, DiffHunk, DiffRecord, IngestionItem, ItemMetadata, TaxonomyTag,
};

use super::{IngestContext, IngestionSource, SourceOutput};

// ============================================================================
// LINE CLASSIFICATION
// ============================================================================

const STRUCTURAL_KEYWORDS: &[&str] = &[
    "interface", "type ", "class ", "enum ", "import ", "export ", "schema",
    "struct", "declare", "namespace",
];

const BEHAVIORAL_KEYWORDS: &[&str] = &[
    "if ", "if(", "else", "for ", "for(", "while", "return", "throw", "await",
    "switch", "catch", "=>",
];

/// Classify added/removed lines by keyword score.
///
/// Thresholds: structural 0.5, behavioral 0.5, cosmetic 0.7; anything else
/// is mixed.
pub fn classify_lines(changed_lines: &[String]) -> ChangeCategory {
    if changed_lines.is_empty() {
        return ChangeCategory::Mixed;
    }

    let mut structural = 0usize;
    let mut behavioral = 0usize;
    let mut cosmetic = 0usize;

    for line in changed_lines {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with("//")
            || trimmed.starts_with("/*")
            || trimmed.starts_with('*')
        {
            cosmetic += 1;
        } else if STRUCTURAL_KEYWORDS.iter().any(|k| trimmed.contains(k)) {
            structural += 1;
        } else if BEHAVIORAL_KEYWORDS.iter().any(|k| trimmed.contains(k)) {
            behavioral += 1;
        }
    }

    let total = changed_lines.len() as f64;
    let structural_score = structural as f64 / total;
    let behavioral_score = behavioral as f64 / total;
    let cosmetic_score = cosmetic as f64 / total;

    if structural_score >= 0.5 {
        ChangeCategory::Structural
    } else if behavioral_score >= 0.5 {
        ChangeCategory::Behavioral
    } else if cosmetic_score >= 0.7 {
        ChangeCategory::Cosmetic
    } else {
        ChangeCategory::Mixed
    }
}

// ============================================================================
// SCORES
// ============================================================================

/// `0.3·hunk_factor + 0.4·change_factor + 0.3·(1 − balance_factor)`
pub fn complexity_score(hunk_count: u32, additions: u32, deletions: u32) -> f64 {
    let hunk_factor = (hunk_count as f64 / 10.0).min(1.0);
    let change_factor = ((additions + deletions) as f64 / 200.0).min(1.0);
    let balance_factor = if additions.max(deletions) == 0 {
        1.0
    } else {
        additions.min(deletions) as f64 / additions.max(deletions) as f64
    };
    (0.3 * hunk_factor + 0.4 * change_factor + 0.3 * (1.0 - balance_factor)).clamp(0.0, 1.0)
}

/// Base 0.5 adjusted by file type, change category, and size; clamped
pub fn impact_score(
    file_path: &str,
    category: ChangeCategory,
    additions: u32,
    deletions: u32,
) -> f64 {
    let mut impact: f64 = 0.5;

    if file_path.contains("test") || file_path.contains("spec") {
        impact -= 0.1;
    } else if file_path.ends_with(".md") || file_path.starts_with("docs/") {
        impact -= 0.2;
    } else if file_path.starts_with("src/") || file_path.starts_with("lib/") {
        impact += 0.2;
    } else if file_path.contains("config") {
        impact += 0.1;
    }

    match category {
        ChangeCategory::Structural => impact += 0.15,
        ChangeCategory::Behavioral => impact += 0.1,
        ChangeCategory::Cosmetic => impact -= 0.2,
        ChangeCategory::Mixed => {}
    }

    let size = additions + deletions;
    if size > 100 {
        impact += 0.1;
    } else if size < 10 {
        impact -= 0.05;
    }

    impact.clamp(0.0, 1.0)
}

// ============================================================================
// HISTORY WALK
// ============================================================================

/// Diff records for the last `max_commits` commits. Blocking.
pub fn walk_diffs(workspace: &Path, max_commits: usize) -> Vec<DiffRecord> {
    let Ok(repo) = Repository::open(workspace) else {
        return Vec::new();
    };
    let Ok(mut revwalk) = repo.revwalk() else {
        return Vec::new();
    };
    if revwalk.push_head().is_err() {
        return Vec::new();
    }

    let mut records = Vec::new();
    for oid in revwalk.flatten().take(max_commits) {
        let Ok(commit) = repo.find_commit(oid) else { continue };
        let Ok(tree) = commit.tree() else { continue };
        let parent_tree = commit.parent(0).and_then(|p| p.tree()).ok();

        let mut diff_options = git2::DiffOptions::new();
        diff_options.context_lines(3);
        let Ok(diff) = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_options))
        else {
            continue;
        };

        let delta_count = diff.deltas().len();
        for delta_index in 0..delta_count {
            let Ok(Some(mut patch)) = Patch::from_diff(&diff, delta_index) else {
                continue;
            };
            let Some(file_path) = patch
                .delta()
                .new_file()
                .path()
                .map(|p| p.to_string_lossy().into_owned())
            else {
                continue;
            };

            let mut hunks = Vec::new();
            let mut changed_lines: Vec<String> = Vec::new();
            let mut additions = 0u32;
            let mut deletions = 0u32;

            let hunk_count = patch.num_hunks();
            for hunk_index in 0..hunk_count {
                if let Ok((hunk, line_count)) = patch.hunk(hunk_index) {
                    hunks.push(DiffHunk {
                        old_start: hunk.old_start(),
                        old_lines: hunk.old_lines(),
                        new_start: hunk.new_start(),
                        new_lines: hunk.new_lines(),
                    });
                    for line_index in 0..line_count {
                        if let Ok(line) = patch.line_in_hunk(hunk_index, line_index) {
                            match line.origin() {
                                '+' => {
                                    additions += 1;
                                    changed_lines
                                        .push(String::from_utf8_lossy(line.content()).into_owned());
                                }
                                '-' => {
                                    deletions += 1;
                                    changed_lines
                                        .push(String::from_utf8_lossy(line.content()).into_owned());
                                }
                                _ => {}
                            }
                        }
                    }
                }
            }

            let category = classify_lines(&changed_lines);
            records.push(DiffRecord {
                id: DiffRecord::id_for(&oid.to_string(), &file_path),
                commit_hash: oid.to_string(),
                additions,
                deletions,
                hunk_count: hunks.len() as u32,
                hunks,
                change_category: category,
                complexity: complexity_score(hunk_count as u32, additions, deletions),
                impact_score: impact_score(&file_path, category, additions, deletions),
                file_path,
            });
        }
    }
    records
}

// ============================================================================
// INGESTION SOURCE
// ============================================================================

/// Per-commit diffs as an ingestion source
#[derive(Debug, Default)]
pub struct DiffSource;

#[async_trait::async_trait]
impl IngestionSource for DiffSource {
    fn source_type(&self) -> &'static str {
        "diffs"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate(&self, item: &IngestionItem) -> bool {
        let in_unit = |key: &str| {
            item.payload
                .get(key)
                .and_then(serde_json::Value::as_f64)
                .is_some_and(|v| (0.0..=1.0).contains(&v))
        };
        item.payload.get("commitHash").is_some() && in_unit("complexity") && in_unit("impactScore")
    }

    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput {
        let workspace = ctx.workspace.clone();
        let max_commits = ctx.max_commits;
        let records =
            match tokio::task::spawn_blocking(move || walk_diffs(&workspace, max_commits)).await {
                Ok(records) => records,
                Err(e) => return SourceOutput::failed(format!("diff walk panicked: {e}")),
            };

        let mut output = SourceOutput::default();
        for record in records {
            let payload = json!({
                "id": record.id,
                "commitHash": record.commit_hash,
                "filePath": record.file_path,
                "additions": record.additions,
                "deletions": record.deletions,
                "hunkCount": record.hunk_count,
                "hunks": record.hunks,
                "changeCategory": record.change_category.as_str(),
                "complexity": record.complexity,
                "impactScore": record.impact_score,
            });
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash: record.id.clone(),
                    taxonomy: vec![TaxonomyTag::Diffs],
                    path: Some(record.file_path.clone()),
                    ..Default::default()
                },
            ));
        }
        output
    }
}

// ============================================================================
// TESTS
// ============================================================================
