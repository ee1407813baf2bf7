//! Docs Indexer
//!
//! Markdown documentation: headings, links, fenced code blocks, a doc graph
//! (file → heading, file → link), audience classification, and how-to
//! detection. When an LLM is configured the summary comes from it and a
//! failure is an error; without one the fallback is the first heading or the
//! first 160 characters.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Parser, Tag, TagEnd};
use serde_json::json;

use crate::model::{content_hash, IngestionItem, ItemMetadata, TaxonomyTag};

use super::{IngestContext, IngestionSource, SourceOutput};

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Audience classification with a retrieval boost
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocClass {
    /// Retrieval boost in [0.5, 1.0]
    pub boost: f64,
    /// `agent`, `developer`, or `general`
    pub audience: &'static str,
}

/// Pattern table mapping doc paths to audience and boost
pub fn classify_doc(path: &str) -> DocClass {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let upper = file_name.to_uppercase();

    if upper == "AGENTS.MD" || upper == "CLAUDE.MD" {
        DocClass {
            boost: 1.0,
            audience: "agent",
        }
    } else if upper.starts_with("README") {
        DocClass {
            boost: 0.9,
            audience: "general",
        }
    } else if upper.starts_with("CONTRIBUTING") || upper.starts_with("ARCHITECTURE") {
        DocClass {
            boost: 0.8,
            audience: "developer",
        }
    } else if path.starts_with("docs/") {
        DocClass {
            boost: 0.7,
            audience: "developer",
        }
    } else {
        DocClass {
            boost: 0.5,
            audience: "general",
        }
    }
}

const HOW_TO_KEYWORDS: &[&str] = &[
    "how to", "step ", "step-by-step", "install", "usage", "getting started",
    "tutorial", "guide", "walkthrough", "setup",
];

/// Detect how-to content by keyword match
pub fn is_how_to(content: &str) -> bool {
    let lower = content.to_lowercase();
    HOW_TO_KEYWORDS.iter().any(|k| lower.contains(k))
}

// ============================================================================
// MARKDOWN STRUCTURE
// ============================================================================

/// Parsed structure of one markdown file
#[derive(Debug, Clone, Default)]
pub struct DocStructure {
    /// Heading texts in document order, with levels
    pub headings: Vec<(u8, String)>,
    /// Link destinations
    pub links: Vec<String>,
    /// Fenced code block languages
    pub code_blocks: Vec<String>,
}

/// Parse markdown into headings, links, and fenced code blocks
pub fn parse_markdown(content: &str) -> DocStructure {
    let mut structure = DocStructure::default();
    let mut heading_level: Option<u8> = None;
    let mut heading_text = String::new();

    for event in Parser::new(content) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                heading_level = Some(heading_level_number(level));
                heading_text.clear();
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(level) = heading_level.take() {
                    structure.headings.push((level, heading_text.trim().to_string()));
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if heading_level.is_some() {
                    heading_text.push_str(&text);
                }
            }
            Event::Start(Tag::Link { dest_url, .. }) => {
                structure.links.push(dest_url.into_string());
            }
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(language))) => {
                structure.code_blocks.push(language.into_string());
            }
            _ => {}
        }
    }
    structure
}

fn heading_level_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Deterministic fallback summary: first heading, else first 160 chars
pub fn fallback_summary(content: &str, structure: &DocStructure) -> String {
    if let Some((_, heading)) = structure.headings.first() {
        if !heading.is_empty() {
            return heading.clone();
        }
    }
    let mut summary: String = content.trim().chars().take(160).collect();
    if content.trim().chars().count() > 160 {
        summary.push('…');
    }
    summary
}

// ============================================================================
// INGESTION SOURCE
// ============================================================================

/// Markdown documentation as an ingestion source
#[derive(Debug, Default)]
pub struct DocsSource;

#[async_trait::async_trait]
impl IngestionSource for DocsSource {
    fn source_type(&self) -> &'static str {
        "docs"
    }

    fn version(&self) -> &'static str {
        "1.1.0"
    }

    fn validate(&self, item: &IngestionItem) -> bool {
        item.payload.get("path").is_some() && item.payload.get("summary").is_some()
    }

    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput {
        let mut output = SourceOutput::default();

        for file in ctx.files_with_extension(&["md", "markdown"]) {
            let content = match ctx.read_file(&file) {
                Ok(content) => content,
                Err(e) => {
                    output.errors.push(format!("{file}: {e}"));
                    continue;
                }
            };

            let structure = parse_markdown(&content);
            let class = classify_doc(&file);
            let how_to = is_how_to(&content);

            // With an LLM configured, docs summaries must come from it; a
            // failed call is a recorded error, never a silent fallback
            let summary = if let Some(llm) = &ctx.llm {
                let estimated = llm.estimate_tokens(&content);
                if let Err(e) = ctx.governor.check_token_budget(estimated) {
                    output.errors.push(format!("{file}: {e}"));
                    continue;
                }
                match llm
                    .summarize(crate::llm::SummaryRequest {
                        subject: format!("doc {file}"),
                        content: content.clone(),
                        max_chars: 300,
                    })
                    .await
                {
                    Ok(summary) => {
                        ctx.governor.record_tokens(estimated);
                        summary
                    }
                    Err(e) => {
                        output.errors.push(format!("{file}: llm summary failed: {e}"));
                        continue;
                    }
                }
            } else {
                fallback_summary(&content, &structure)
            };

            // Doc graph: file → heading and file → link edges, carried in
            // the payload for the graph phase
            let graph_edges: Vec<serde_json::Value> = structure
                .headings
                .iter()
                .map(|(level, text)| json!({"kind": "heading", "level": level, "text": text}))
                .chain(
                    structure
                        .links
                        .iter()
                        .map(|link| json!({"kind": "link", "target": link})),
                )
                .collect();

            let payload = json!({
                "path": file,
                "title": structure.headings.first().map(|(_, t)| t.clone()),
                "headings": structure.headings.iter().map(|(_, t)| t.clone()).collect::<Vec<_>>(),
                "links": structure.links,
                "codeBlocks": structure.code_blocks,
                "docGraph": graph_edges,
                "boost": class.boost,
                "audience": class.audience,
                "isHowTo": how_to,
                "summary": summary,
            });
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash: content_hash(&content),
                    taxonomy: vec![TaxonomyTag::Documentation],
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
