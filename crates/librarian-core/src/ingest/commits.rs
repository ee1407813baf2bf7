//! Commit Indexer
//!
//! Walks git history, categorises commit messages (conventional-commit
//! prefixes with a keyword fallback), and scores per-commit risk from file
//! counts, path prefixes, and message keywords.

use std::path::Path;

use chrono::{TimeZone, Utc};
use git2::Repository;
use serde_json::json;

use crate::model::{CommitCategory, CommitRecord, IngestionItem, ItemMetadata, TaxonomyTag};

use super::{IngestContext, IngestionSource, SourceOutput};

// ============================================================================
// MESSAGE CATEGORISATION
// ============================================================================

/// Categorise a commit message: conventional prefix first, keywords second
pub fn categorize_message(message: &str) -> CommitCategory {
    let first_line = message.lines().next().unwrap_or_default();

    if let Some(prefix_end) = first_line.find(':') {
        let prefix = first_line[..prefix_end]
            .split(['(', '!'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match prefix.as_str() {
            "fix" | "bugfix" | "hotfix" => return CommitCategory::Bugfix,
            "feat" | "feature" => return CommitCategory::Feature,
            "refactor" => return CommitCategory::Refactor,
            "test" | "tests" => return CommitCategory::Test,
            "docs" | "doc" => return CommitCategory::Docs,
            "chore" | "build" | "ci" => return CommitCategory::Chore,
            "perf" => return CommitCategory::Perf,
            "style" => return CommitCategory::Style,
            "revert" => return CommitCategory::Revert,
            _ => {}
        }
    }

    let lower = first_line.to_lowercase();
    if lower.starts_with("revert") {
        CommitCategory::Revert
    } else if lower.contains("fix") || lower.contains("bug") || lower.contains("patch") {
        CommitCategory::Bugfix
    } else if lower.contains("add") || lower.contains("implement") || lower.contains("introduce") {
        CommitCategory::Feature
    } else if lower.contains("refactor") || lower.contains("restructure") {
        CommitCategory::Refactor
    } else if lower.contains("test") {
        CommitCategory::Test
    } else if lower.contains("doc") || lower.contains("readme") {
        CommitCategory::Docs
    } else if lower.contains("perf") || lower.contains("optimiz") || lower.contains("speed") {
        CommitCategory::Perf
    } else if lower.contains("format") || lower.contains("lint") || lower.contains("style") {
        CommitCategory::Style
    } else if lower.contains("chore") || lower.contains("bump") || lower.contains("upgrade") {
        CommitCategory::Chore
    } else {
        CommitCategory::Other
    }
}

// ============================================================================
// RISK SCORING
// ============================================================================

/// Risk in [0, 1] from file count, touched path prefixes, and message
/// keywords
pub fn risk_score(message: &str, files: &[String]) -> f64 {
    let mut risk: f64 = 0.1;

    // More files, more risk, bounded
    risk += (files.len() as f64 * 0.02).min(0.2);

    let touches = |prefixes: &[&str]| {
        files.iter().any(|f| {
            prefixes
                .iter()
                .any(|p| f.starts_with(p) || f.contains(&format!("/{p}")))
        })
    };

    if touches(&["src/", "lib/", "services/"]) {
        risk += 0.2;
    }
    if touches(&["config", "infra", ".github/", "deploy"]) {
        risk += 0.15;
    }
    if touches(&["db/", "schema", "migrations"]) {
        risk += 0.2;
    }
    let docs_only = !files.is_empty()
        && files
            .iter()
            .all(|f| f.ends_with(".md") || f.starts_with("docs/"));
    if docs_only {
        risk -= 0.2;
    }
    if files
        .iter()
        .any(|f| f.contains("test") || f.contains("spec") || f.contains("__tests__"))
    {
        risk -= 0.05;
    }

    let lower = message.to_lowercase();
    if lower.contains("hotfix") || lower.contains("critical") || lower.contains("urgent") {
        risk += 0.25;
    } else if lower.contains("fix") {
        risk += 0.15;
    }
    if lower.contains("revert") {
        risk += 0.2;
    }

    risk.clamp(0.0, 1.0)
}

// ============================================================================
// HISTORY WALK
// ============================================================================

/// Walk up to `max_commits` first-parent commits from HEAD.
///
/// Blocking: run under `spawn_blocking`. A workspace without a git repo or
/// without commits yields an empty list, not an error.
pub fn walk_commits(workspace: &Path, max_commits: usize) -> Vec<CommitRecord> {
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
        let message = commit.summary().unwrap_or_default().to_string();
        let author = commit.author();

        let files = commit_files(&repo, &commit);
        let category = categorize_message(&message);
        let risk = risk_score(&message, &files);

        records.push(CommitRecord {
            hash: oid.to_string(),
            author: author.name().unwrap_or_default().to_string(),
            author_email: author.email().unwrap_or_default().to_string(),
            date: Utc
                .timestamp_opt(commit.time().seconds(), 0)
                .single()
                .unwrap_or_else(Utc::now),
            summary: message.clone(),
            message,
            files,
            category,
            risk_score: risk,
        });
    }
    records
}

/// Files a commit touched, from the diff against its first parent
fn commit_files(repo: &Repository, commit: &git2::Commit<'_>) -> Vec<String> {
    let tree = match commit.tree() {
        Ok(tree) => tree,
        Err(_) => return Vec::new(),
    };
    let parent_tree = commit.parent(0).and_then(|p| p.tree()).ok();

    let diff = match repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None) {
        Ok(diff) => diff,
        Err(_) => return Vec::new(),
    };

    let mut files = Vec::new();
    for delta in diff.deltas() {
        if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
            files.push(path.to_string_lossy().into_owned());
        }
    }
    files.sort();
    files.dedup();
    files
}

// ============================================================================
// INGESTION SOURCE
// ============================================================================

/// Commit history as an ingestion source
#[derive(Debug, Default)]
pub struct CommitsSource;

#[async_trait::async_trait]
impl IngestionSource for CommitsSource {
    fn source_type(&self) -> &'static str {
        "commits"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate(&self, item: &IngestionItem) -> bool {
        let risk = item
            .payload
            .get("riskScore")
            .and_then(serde_json::Value::as_f64);
        item.payload.get("hash").is_some() && risk.is_some_and(|r| (0.0..=1.0).contains(&r))
    }

    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput {
        let workspace = ctx.workspace.clone();
        let max_commits = ctx.max_commits;
        let records = match tokio::task::spawn_blocking(move || walk_commits(&workspace, max_commits))
            .await
        {
            Ok(records) => records,
            Err(e) => return SourceOutput::failed(format!("history walk panicked: {e}")),
        };

        let mut output = SourceOutput::default();
        for record in records {
            // LLM summaries are optional here; the heuristic summary is the
            // commit message itself. A failed call still falls back, but the
            // failure lands in per-phase errors.
            let mut summary = record.summary.clone();
            if let Some(llm) = &ctx.llm {
                let estimated = llm.estimate_tokens(&record.message);
                match ctx.governor.check_token_budget(estimated) {
                    Ok(()) => {
                        match llm
                            .summarize(crate::llm::SummaryRequest {
                                subject: format!(
                                    "commit {}",
                                    &record.hash[..8.min(record.hash.len())]
                                ),
                                content: format!(
                                    "{}\nfiles: {}",
                                    record.message,
                                    record.files.join(", ")
                                ),
                                max_chars: 200,
                            })
                            .await
                        {
                            Ok(text) => {
                                ctx.governor.record_tokens(estimated);
                                summary = text;
                            }
                            Err(e) => output
                                .errors
                                .push(format!("{}: llm summary failed: {e}", record.hash)),
                        }
                    }
                    Err(e) => output.errors.push(format!("{}: {e}", record.hash)),
                }
            }

            let payload = json!({
                "hash": record.hash,
                "author": record.author,
                "authorEmail": record.author_email,
                "date": record.date,
                "message": record.message,
                "files": record.files,
                "category": record.category.as_str(),
                "riskScore": record.risk_score,
                "summary": summary,
            });
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash: record.hash.clone(),
                    taxonomy: vec![TaxonomyTag::CommitHistory],
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conventional_prefixes() {
        assert_eq!(categorize_message("fix(auth): patch token leak"), CommitCategory::Bugfix);
        assert_eq!(categorize_message("feat!: breaking api"), CommitCategory::Feature);
        assert_eq!(categorize_message("refactor(core): split module"), CommitCategory::Refactor);
        assert_eq!(categorize_message("docs: update readme"), CommitCategory::Docs);
        assert_eq!(categorize_message("perf: faster path"), CommitCategory::Perf);
    }

    #[test]
    fn test_keyword_fallback() {
        assert_eq!(categorize_message("Fixed the login bug"), CommitCategory::Bugfix);
        assert_eq!(categorize_message("Add rate limiter"), CommitCategory::Feature);
        assert_eq!(categorize_message("Revert \"add rate limiter\""), CommitCategory::Revert);
        assert_eq!(categorize_message("weekly dependency bump"), CommitCategory::Chore);
        assert_eq!(categorize_message("misc changes"), CommitCategory::Other);
    }

    #[test]
    fn test_risk_critical_path_plus_fix_keyword() {
        let risk = risk_score(
            "fix(auth): patch token leak",
            &["src/auth/token.ts".to_string()],
        );
        assert!(risk >= 0.25, "risk was {risk}");
        assert!(risk <= 1.0);
    }

    #[test]
    fn test_risk_docs_only_is_low() {
        let docs = risk_score("update guide", &["docs/guide.md".to_string()]);
        let code = risk_score("update handler", &["src/handler.ts".to_string()]);
        assert!(docs < code);
    }

    #[test]
    fn test_risk_bounds() {
        let files: Vec<String> = (0..100)
            .map(|i| format!("src/migrations/m{i}.ts"))
            .collect();
        let risk = risk_score("hotfix: critical urgent revert fix", &files);
        assert!((0.0..=1.0).contains(&risk));

        assert!((0.0..=1.0).contains(&risk_score("", &[])));
    }

    #[test]
    fn test_walk_commits_without_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(walk_commits(dir.path(), 10).is_empty());
    }
}
