//! Blame Indexer
//!
//! Per-file line ownership. git2 blame hunks already group consecutive
//! lines with identical commit/author, which is exactly the chunk shape the
//! store keeps. Binary files yield zero chunks without error.

use std::path::Path;

use chrono::{TimeZone, Utc};
use git2::Repository;
use serde_json::json;

use crate::model::{BlameEntry, IngestionItem, ItemMetadata, TaxonomyTag};

use super::symbols::SOURCE_EXTENSIONS;
use super::{IngestContext, IngestionSource, SourceOutput};

// ============================================================================
// BLAME
// ============================================================================

/// Blame one workspace-relative file into ownership chunks.
///
/// Blocking: run under `spawn_blocking`. Unversioned or binary files yield
/// an empty list.
pub fn blame_file(workspace: &Path, relative: &str) -> Vec<BlameEntry> {
    let Ok(repo) = Repository::open(workspace) else {
        return Vec::new();
    };

    // git blame has no answer for binary content
    if let Ok(bytes) = std::fs::read(workspace.join(relative)) {
        if bytes.contains(&0) {
            return Vec::new();
        }
    }

    let Ok(blame) = repo.blame_file(Path::new(relative), None) else {
        return Vec::new();
    };

    let now = Utc::now();
    let mut entries = Vec::new();
    for hunk in blame.iter() {
        let commit_hash = hunk.final_commit_id().to_string();
        let line_start = hunk.final_start_line() as u32;
        let line_end = line_start + hunk.lines_in_hunk().saturating_sub(1) as u32;

        let signature = hunk.final_signature();
        let author = signature.name().unwrap_or_default().to_string();
        let author_email = signature.email().unwrap_or_default().to_string();
        let commit_date = repo
            .find_commit(hunk.final_commit_id())
            .ok()
            .and_then(|c| Utc.timestamp_opt(c.time().seconds(), 0).single())
            .unwrap_or(now);

        entries.push(BlameEntry {
            id: BlameEntry::id_for(relative, line_start, &commit_hash),
            file_path: relative.to_string(),
            line_start,
            line_end,
            author,
            author_email,
            commit_hash,
            commit_date,
            original_line: hunk.orig_start_line() as u32,
            indexed_at: now,
        });
    }
    entries
}

// ============================================================================
// INGESTION SOURCE
// ============================================================================

/// Line-ownership chunks as an ingestion source: one item per blamed file
#[derive(Debug, Default)]
pub struct BlameSource;

#[async_trait::async_trait]
impl IngestionSource for BlameSource {
    fn source_type(&self) -> &'static str {
        "blame"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate(&self, item: &IngestionItem) -> bool {
        item.payload.get("file").is_some() && item.payload.get("chunks").is_some()
    }

    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput {
        let files = ctx.files_with_extension(SOURCE_EXTENSIONS);
        let workspace = ctx.workspace.clone();

        let per_file = match tokio::task::spawn_blocking(move || {
            files
                .into_iter()
                .map(|file| {
                    let entries = blame_file(&workspace, &file);
                    (file, entries)
                })
                .collect::<Vec<_>>()
        })
        .await
        {
            Ok(blamed) => blamed,
            Err(e) => return SourceOutput::failed(format!("blame walk panicked: {e}")),
        };

        let mut output = SourceOutput::default();
        for (file, entries) in per_file {
            if entries.is_empty() {
                continue;
            }
            let newest_commit = entries
                .iter()
                .map(|e| e.commit_hash.as_str())
                .max()
                .unwrap_or_default();
            let payload = json!({
                "file": file,
                "chunks": entries,
            });
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash: crate::model::content_hash(&format!("{file}:{newest_commit}:{}", entries.len())),
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
    fn test_blame_without_repo_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "const x = 1;\n").unwrap();
        assert!(blame_file(dir.path(), "a.ts").is_empty());
    }

    #[test]
    fn test_blame_binary_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("blob.bin"), [0u8, 159, 146, 150]).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new("blob.bin")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let signature = git2::Signature::now("Test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &signature, &signature, "add blob", &tree, &[])
            .unwrap();

        assert!(blame_file(dir.path(), "blob.bin").is_empty());
    }

    #[test]
    fn test_blame_chunks_consecutive_ownership() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.ts"), "line1\nline2\nline3\n").unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new("a.ts")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let signature = git2::Signature::now("Alice", "alice@example.com").unwrap();
        repo.commit(Some("HEAD"), &signature, &signature, "add a.ts", &tree, &[])
            .unwrap();
        drop(tree);

        let entries = blame_file(dir.path(), "a.ts");
        // One author, one commit: a single chunk spanning all lines
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].line_start, 1);
        assert_eq!(entries[0].line_end, 3);
        assert_eq!(entries[0].author, "Alice");
        assert_eq!(entries[0].id.len(), 32);
    }
}
