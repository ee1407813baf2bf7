//! ADR Indexer
//!
//! Markdown architectural decision records. Recognised by location
//! (`docs/adr/`, `docs/decisions/`) or name (`adr-*.md`, `NNNN-*.md` inside
//! a decisions directory); sections are pulled from the conventional
//! Status / Context / Decision / Consequences headings.

use serde_json::json;

use crate::model::{content_hash, IngestionItem, ItemMetadata, TaxonomyTag};

use super::docs::parse_markdown;
use super::{IngestContext, IngestionSource, SourceOutput};

// ============================================================================
// RECOGNITION + PARSING
// ============================================================================

/// Whether a path looks like an ADR
pub fn is_adr_path(path: &str) -> bool {
    if !path.ends_with(".md") {
        return false;
    }
    let lower = path.to_lowercase();
    let file_name = lower.rsplit('/').next().unwrap_or(&lower);
    lower.contains("/adr/")
        || lower.contains("/adrs/")
        || lower.contains("/decisions/")
        || file_name.starts_with("adr-")
        || file_name.starts_with("adr_")
}

/// One parsed decision record
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdrRecord {
    /// Document title (first heading)
    pub title: String,
    /// `accepted`, `proposed`, `superseded`, ... when stated
    pub status: Option<String>,
    /// Context section text
    pub context: Option<String>,
    /// Decision section text
    pub decision: Option<String>,
    /// Consequences section text
    pub consequences: Option<String>,
}

/// Split an ADR into its conventional sections
pub fn parse_adr(content: &str) -> AdrRecord {
    let structure = parse_markdown(content);
    let title = structure
        .headings
        .first()
        .map(|(_, t)| t.clone())
        .unwrap_or_default();

    let mut record = AdrRecord {
        title,
        ..Default::default()
    };

    // Section bodies: text between a recognised heading and the next heading
    let mut current: Option<&mut Option<String>> = None;
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix('#') {
            let heading = heading.trim_start_matches('#').trim().to_lowercase();
            current = match heading.as_str() {
                "status" => Some(&mut record.status),
                "context" => Some(&mut record.context),
                "decision" => Some(&mut record.decision),
                "consequences" => Some(&mut record.consequences),
                _ => None,
            };
            continue;
        }
        if let Some(section) = current.as_deref_mut() {
            if !trimmed.is_empty() {
                match section {
                    Some(text) => {
                        text.push(' ');
                        text.push_str(trimmed);
                    }
                    None => *section = Some(trimmed.to_string()),
                }
            }
        }
    }
    record
}

// ============================================================================
// INGESTION SOURCE
// ============================================================================

/// Architectural decision records as an ingestion source
#[derive(Debug, Default)]
pub struct AdrSource;

#[async_trait::async_trait]
impl IngestionSource for AdrSource {
    fn source_type(&self) -> &'static str {
        "adrs"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate(&self, item: &IngestionItem) -> bool {
        item.payload.get("path").is_some() && item.payload.get("title").is_some()
    }

    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput {
        let mut output = SourceOutput::default();

        for file in ctx.files.iter().filter(|f| is_adr_path(f)) {
            let content = match ctx.read_file(file) {
                Ok(content) => content,
                Err(e) => {
                    output.errors.push(format!("{file}: {e}"));
                    continue;
                }
            };
            let record = parse_adr(&content);
            let payload = json!({
                "path": file,
                "title": record.title,
                "status": record.status,
                "context": record.context,
                "decision": record.decision,
                "consequences": record.consequences,
            });
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash: content_hash(&content),
                    taxonomy: vec![TaxonomyTag::Decisions, TaxonomyTag::Documentation],
                    path: Some(file.clone()),
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
    fn test_adr_path_recognition() {
        assert!(is_adr_path("docs/adr/0001-use-sqlite.md"));
        assert!(is_adr_path("docs/decisions/0003-single-writer.md"));
        assert!(is_adr_path("notes/adr-retry-policy.md"));
        assert!(!is_adr_path("README.md"));
        assert!(!is_adr_path("docs/adr/diagram.png"));
    }

    #[test]
    fn test_parse_sections() {
        let content = "# 1. Use SQLite\n\n## Status\n\nAccepted\n\n## Context\n\n\
                       We need embedded storage.\nNo server allowed.\n\n## Decision\n\n\
                       SQLite with WAL.\n\n## Consequences\n\nSingle-writer semantics.\n";
        let record = parse_adr(content);
        assert_eq!(record.title, "1. Use SQLite");
        assert_eq!(record.status.as_deref(), Some("Accepted"));
        assert_eq!(
            record.context.as_deref(),
            Some("We need embedded storage. No server allowed.")
        );
        assert_eq!(record.decision.as_deref(), Some("SQLite with WAL."));
        assert_eq!(record.consequences.as_deref(), Some("Single-writer semantics."));
    }

    #[test]
    fn test_parse_adr_without_sections() {
        let record = parse_adr("# Title only\n\nfree-form text");
        assert_eq!(record.title, "Title only");
        assert!(record.status.is_none());
        assert!(record.decision.is_none());
    }
}
