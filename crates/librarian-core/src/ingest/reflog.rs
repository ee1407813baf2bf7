//! Reflog Indexer
//!
//! HEAD movement history: commits, rebases, resets, merges, checkouts.
//! The action is derived from the reflog message prefix.

use std::path::Path;

use chrono::{TimeZone, Utc};
use git2::Repository;
use serde_json::json;

use crate::model::{IngestionItem, ItemMetadata, ReflogAction, ReflogEntry, TaxonomyTag};

use super::{IngestContext, IngestionSource, SourceOutput};

// ============================================================================
// REFLOG WALK
// ============================================================================

/// Read HEAD's reflog. Blocking; missing repo or reflog yields empty.
pub fn read_reflog(workspace: &Path, max_entries: usize) -> Vec<ReflogEntry> {
    let Ok(repo) = Repository::open(workspace) else {
        return Vec::new();
    };
    let Ok(reflog) = repo.reflog("HEAD") else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for (index, entry) in reflog.iter().take(max_entries).enumerate() {
        let message = entry.message().unwrap_or_default().to_string();
        let commit_hash = entry.id_new().to_string();
        let previous = entry.id_old();
        let timestamp = Utc
            .timestamp_opt(entry.committer().when().seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);
        let ref_name = format!("HEAD@{{{index}}}");

        entries.push(ReflogEntry {
            id: ReflogEntry::id_for(&ref_name, &commit_hash, &timestamp),
            ref_name,
            commit_hash,
            action: ReflogAction::from_message(&message),
            previous_commit: if previous.is_zero() {
                None
            } else {
                Some(previous.to_string())
            },
            timestamp,
            message,
        });
    }
    entries
}

// ============================================================================
// INGESTION SOURCE
// ============================================================================

/// Ref movement history as an ingestion source
#[derive(Debug, Default)]
pub struct ReflogSource;

#[async_trait::async_trait]
impl IngestionSource for ReflogSource {
    fn source_type(&self) -> &'static str {
        "reflog"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate(&self, item: &IngestionItem) -> bool {
        item.payload.get("commitHash").is_some() && item.payload.get("action").is_some()
    }

    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput {
        let workspace = ctx.workspace.clone();
        let max = ctx.max_commits;
        let entries =
            match tokio::task::spawn_blocking(move || read_reflog(&workspace, max)).await {
                Ok(entries) => entries,
                Err(e) => return SourceOutput::failed(format!("reflog read panicked: {e}")),
            };

        let mut output = SourceOutput::default();
        for entry in entries {
            let payload = json!({
                "id": entry.id,
                "refName": entry.ref_name,
                "commitHash": entry.commit_hash,
                "action": entry.action.as_str(),
                "previousCommit": entry.previous_commit,
                "timestamp": entry.timestamp,
                "message": entry.message,
            });
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash: entry.id.clone(),
                    taxonomy: vec![TaxonomyTag::Reflog],
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
    fn test_reflog_without_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_reflog(dir.path(), 10).is_empty());
    }

    #[test]
    fn test_reflog_records_commit_action() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("a.txt")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let signature = git2::Signature::now("Test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[])
            .unwrap();
        drop(tree);

        let entries = read_reflog(dir.path(), 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, ReflogAction::Commit);
        assert!(entries[0].previous_commit.is_none());
        assert_eq!(entries[0].ref_name, "HEAD@{0}");
    }
}
