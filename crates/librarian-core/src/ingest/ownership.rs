//! Ownership Indexer
//!
//! Aggregates per-file authorship from commit history. Expertise is the
//! author's share of the commits touching the file.

use std::collections::HashMap;
use std::path::Path;

use serde_json::json;

use crate::model::{IngestionItem, ItemMetadata, TaxonomyTag};

use super::commits::walk_commits;
use super::{IngestContext, IngestionSource, SourceOutput};

// ============================================================================
// AGGREGATION
// ============================================================================

/// One author's stake in a file
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileOwner {
    /// Author name
    pub author: String,
    /// Author email
    pub author_email: String,
    /// Commits by this author touching the file
    pub commit_count: u32,
    /// commit_count / total commits touching the file
    pub expertise: f64,
}

/// Aggregate authorship per file from commit records. Blocking (walks git).
pub fn aggregate_ownership(workspace: &Path, max_commits: usize) -> HashMap<String, Vec<FileOwner>> {
    let commits = walk_commits(workspace, max_commits);

    // file -> (author email -> (name, count))
    let mut counts: HashMap<String, HashMap<String, (String, u32)>> = HashMap::new();
    for commit in &commits {
        for file in &commit.files {
            let entry = counts
                .entry(file.clone())
                .or_default()
                .entry(commit.author_email.clone())
                .or_insert_with(|| (commit.author.clone(), 0));
            entry.1 += 1;
        }
    }

    counts
        .into_iter()
        .map(|(file, authors)| {
            let total: u32 = authors.values().map(|(_, count)| count).sum();
            let mut owners: Vec<FileOwner> = authors
                .into_iter()
                .map(|(email, (name, count))| FileOwner {
                    author: name,
                    author_email: email,
                    commit_count: count,
                    expertise: count as f64 / total.max(1) as f64,
                })
                .collect();
            owners.sort_by(|a, b| {
                b.commit_count
                    .cmp(&a.commit_count)
                    .then_with(|| a.author_email.cmp(&b.author_email))
            });
            (file, owners)
        })
        .collect()
}

// ============================================================================
// INGESTION SOURCE
// ============================================================================

/// Per-file ownership as an ingestion source
#[derive(Debug, Default)]
pub struct OwnershipSource;

#[async_trait::async_trait]
impl IngestionSource for OwnershipSource {
    fn source_type(&self) -> &'static str {
        "ownership"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate(&self, item: &IngestionItem) -> bool {
        let owners = item.payload.get("owners").and_then(|o| o.as_array());
        item.payload.get("file").is_some()
            && owners.is_some_and(|list| {
                list.iter().all(|o| {
                    o.get("expertise")
                        .and_then(serde_json::Value::as_f64)
                        .is_some_and(|e| (0.0..=1.0).contains(&e))
                })
            })
    }

    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput {
        let workspace = ctx.workspace.clone();
        let max_commits = ctx.max_commits;
        let ownership = match tokio::task::spawn_blocking(move || {
            aggregate_ownership(&workspace, max_commits)
        })
        .await
        {
            Ok(ownership) => ownership,
            Err(e) => return SourceOutput::failed(format!("ownership walk panicked: {e}")),
        };

        let mut output = SourceOutput::default();
        let mut files: Vec<_> = ownership.into_iter().collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));

        for (file, owners) in files {
            let payload = json!({
                "file": file,
                "owners": owners,
            });
            let hash = crate::model::content_hash(&serde_json::to_string(&payload).unwrap_or_default());
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash,
                    taxonomy: vec![TaxonomyTag::CodeOwnership],
                    path: Some(file),
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
    fn test_ownership_empty_without_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(aggregate_ownership(dir.path(), 10).is_empty());
    }

    #[test]
    fn test_expertise_sums_to_one() {
        // Build the aggregation directly from synthetic counts by driving
        // the math through a single-author repo
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        let signature = git2::Signature::now("Solo", "solo@example.com").unwrap();

        let mut parent: Option<git2::Oid> = None;
        for round in 0..2 {
            std::fs::write(dir.path().join("a.ts"), format!("v{round}\n")).unwrap();
            let mut index = repo.index().unwrap();
            index.add_path(Path::new("a.ts")).unwrap();
            index.write().unwrap();
            let tree_id = index.write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            let parents: Vec<git2::Commit<'_>> = parent
                .into_iter()
                .filter_map(|oid| repo.find_commit(oid).ok())
                .collect();
            let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
            parent = Some(
                repo.commit(
                    Some("HEAD"),
                    &signature,
                    &signature,
                    &format!("round {round}"),
                    &tree,
                    &parent_refs,
                )
                .unwrap(),
            );
        }

        let ownership = aggregate_ownership(dir.path(), 50);
        let owners = &ownership["a.ts"];
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].commit_count, 2);
        assert!((owners[0].expertise - 1.0).abs() < 1e-9);
    }
}
