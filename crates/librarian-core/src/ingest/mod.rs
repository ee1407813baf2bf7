//! Ingestion Framework
//!
//! A registry of typed ingestion sources and a runner that executes them
//! independently with per-source timeouts and revalidation. One source
//! failing or timing out never aborts the others.

mod adr;
mod blame;
mod commits;
mod configs;
mod diffs;
mod docs;
mod ownership;
mod reflog;
mod surfaces;
pub mod symbols;
mod tests_map;

pub use adr::{is_adr_path, parse_adr, AdrRecord, AdrSource};
pub use blame::{blame_file, BlameSource};
pub use commits::{categorize_message, risk_score, walk_commits, CommitsSource};
pub use configs::{strip_json_comments, ConfigSource, DependencySource, SchemaSource};
pub use diffs::{classify_lines, complexity_score, impact_score as diff_impact, DiffSource};
pub use docs::{classify_doc, is_how_to, parse_markdown, DocClass, DocStructure, DocsSource};
pub use ownership::{FileOwner, OwnershipSource};
pub use reflog::ReflogSource;
pub use surfaces::{parse_codeowners, ApiSource, CiSource, SecuritySource};
pub use symbols::{CallRef, FileStructure, SymbolExtractor, SymbolsSource};
pub use tests_map::{is_test_path, test_targets, TestsSource};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::governor::GovernorContext;
use crate::llm::LlmService;
use crate::model::IngestionItem;

// ============================================================================
// SOURCE CONTRACT
// ============================================================================

/// Everything a source needs to run
#[derive(Clone)]
pub struct IngestContext {
    /// Workspace root
    pub workspace: PathBuf,
    /// Discovered workspace-relative files
    pub files: Vec<String>,
    /// Optional LLM for summaries; sources declaring it required fail
    /// without it
    pub llm: Option<Arc<dyn LlmService>>,
    /// Phase budget tracker
    pub governor: Arc<GovernorContext>,
    /// Upper bound on commits walked by history sources
    pub max_commits: usize,
}

impl IngestContext {
    /// Files under the workspace with one of the given extensions
    pub fn files_with_extension(&self, extensions: &[&str]) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| {
                extensions
                    .iter()
                    .any(|ext| f.rsplit('.').next().is_some_and(|e| e.eq_ignore_ascii_case(ext)))
            })
            .cloned()
            .collect()
    }

    /// Read a workspace-relative file
    pub fn read_file(&self, relative: &str) -> std::io::Result<String> {
        std::fs::read_to_string(self.workspace.join(relative))
    }
}

/// Structured output of one source run
#[derive(Debug, Default)]
pub struct SourceOutput {
    /// Items produced
    pub items: Vec<IngestionItem>,
    /// Per-item errors; the source itself still succeeded
    pub errors: Vec<String>,
}

impl SourceOutput {
    /// Shorthand for an error-only output
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            errors: vec![error.into()],
        }
    }
}

/// A typed ingestion source
#[async_trait::async_trait]
pub trait IngestionSource: Send + Sync {
    /// Source type tag (e.g. `commits`, `docs`)
    fn source_type(&self) -> &'static str;

    /// Source version, bumped when the payload shape changes
    fn version(&self) -> &'static str;

    /// Whether this source must have an LLM to run at all
    fn requires_llm(&self) -> bool {
        false
    }

    /// Revalidate an item this source produced
    fn validate(&self, item: &IngestionItem) -> bool;

    /// Produce items; structural errors go into the output, not the Result
    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput;
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Registry of the sources a bootstrap run executes
#[derive(Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn IngestionSource>>,
}

impl SourceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in non-symbol source
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DocsSource::default()));
        registry.register(Arc::new(CommitsSource));
        registry.register(Arc::new(BlameSource));
        registry.register(Arc::new(DiffSource));
        registry.register(Arc::new(ReflogSource));
        registry.register(Arc::new(OwnershipSource));
        registry.register(Arc::new(ConfigSource));
        registry.register(Arc::new(DependencySource));
        registry.register(Arc::new(SchemaSource));
        registry.register(Arc::new(ApiSource));
        registry.register(Arc::new(CiSource));
        registry.register(Arc::new(SecuritySource));
        registry.register(Arc::new(AdrSource));
        registry.register(Arc::new(TestsSource));
        registry
    }

    /// Add a source
    pub fn register(&mut self, source: Arc<dyn IngestionSource>) {
        self.sources.push(source);
    }

    /// All registered sources
    pub fn sources(&self) -> &[Arc<dyn IngestionSource>] {
        &self.sources
    }

    /// Registered source type tags
    pub fn types(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.source_type()).collect()
    }
}

// ============================================================================
// RUNNER
// ============================================================================

/// Per-source accounting in the runner output
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRunSummary {
    /// Source type tag
    pub source_type: String,
    /// Source version
    pub version: String,
    /// Items that survived revalidation
    pub accepted_item_count: usize,
}

/// Combined output of one runner pass
#[derive(Debug, Default)]
pub struct RunnerOutput {
    /// All accepted items across sources
    pub items: Vec<IngestionItem>,
    /// All errors, prefixed with their source tag
    pub errors: Vec<String>,
    /// Per-source accounting
    pub sources: Vec<SourceRunSummary>,
}

/// Run every registered source concurrently, each under its own timeout.
///
/// Items are revalidated through their source's `validate`; invalid items
/// are dropped with a recorded error. Missing `source_type`/`source_version`
/// /`ingested_at` are populated from the source's declared values.
pub async fn run_sources(
    registry: &SourceRegistry,
    ctx: &IngestContext,
    timeout: Duration,
) -> RunnerOutput {
    let mut join_set = tokio::task::JoinSet::new();

    for source in registry.sources() {
        let source = Arc::clone(source);
        let ctx = ctx.clone();
        join_set.spawn(async move {
            let source_type = source.source_type();
            let version = source.version();

            if source.requires_llm() && ctx.llm.is_none() {
                return (
                    source_type,
                    version,
                    SourceOutput::failed(format!(
                        "[{source_type}] requires an LLM but none is configured"
                    )),
                );
            }

            let output = match tokio::time::timeout(timeout, source.ingest(&ctx)).await {
                Ok(output) => output,
                Err(_) => SourceOutput::failed(format!(
                    "[{source_type}] timed out after {}ms",
                    timeout.as_millis()
                )),
            };
            (source_type, version, output)
        });
    }

    let mut runner_output = RunnerOutput::default();
    while let Some(joined) = join_set.join_next().await {
        let Ok((source_type, version, output)) = joined else {
            runner_output
                .errors
                .push("a source task panicked".to_string());
            continue;
        };

        let source = registry
            .sources()
            .iter()
            .find(|s| s.source_type() == source_type);
        let mut accepted = 0;

        for error in output.errors {
            runner_output.errors.push(if error.starts_with('[') {
                error
            } else {
                format!("[{source_type}] {error}")
            });
        }

        for mut item in output.items {
            if item.source_type.is_empty() {
                item.source_type = source_type.to_string();
            }
            if item.source_version.is_empty() {
                item.source_version = version.to_string();
            }
            if item.ingested_at.timestamp() == 0 {
                item.ingested_at = Utc::now();
            }
            let valid = source.map(|s| s.validate(&item)).unwrap_or(true);
            if valid {
                accepted += 1;
                runner_output.items.push(item);
            } else {
                runner_output
                    .errors
                    .push(format!("[{source_type}] dropped invalid item {}", item.id));
            }
        }

        runner_output.sources.push(SourceRunSummary {
            source_type: source_type.to_string(),
            version: version.to_string(),
            accepted_item_count: accepted,
        });
        tracing::debug!(source = source_type, accepted, "source finished");
    }

    runner_output
        .sources
        .sort_by(|a, b| a.source_type.cmp(&b.source_type));
    runner_output
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::BudgetLimits;
    use crate::model::ItemMetadata;

    fn test_ctx() -> IngestContext {
        IngestContext {
            workspace: PathBuf::from("/nonexistent"),
            files: vec!["src/a.ts".to_string(), "README.md".to_string()],
            llm: None,
            governor: Arc::new(GovernorContext::new("test", BudgetLimits::default())),
            max_commits: 50,
        }
    }

    struct SlowSource;

    #[async_trait::async_trait]
    impl IngestionSource for SlowSource {
        fn source_type(&self) -> &'static str {
            "slow"
        }
        fn version(&self) -> &'static str {
            "1.0.0"
        }
        fn validate(&self, _item: &IngestionItem) -> bool {
            true
        }
        async fn ingest(&self, _ctx: &IngestContext) -> SourceOutput {
            tokio::time::sleep(Duration::from_secs(60)).await;
            SourceOutput::default()
        }
    }

    struct MixedSource;

    #[async_trait::async_trait]
    impl IngestionSource for MixedSource {
        fn source_type(&self) -> &'static str {
            "mixed"
        }
        fn version(&self) -> &'static str {
            "1.0.0"
        }
        fn validate(&self, item: &IngestionItem) -> bool {
            item.payload.get("ok").is_some()
        }
        async fn ingest(&self, _ctx: &IngestContext) -> SourceOutput {
            let good = IngestionItem::new(
                "",
                "",
                serde_json::json!({"ok": true}),
                ItemMetadata {
                    hash: "good".to_string(),
                    ..Default::default()
                },
            );
            let bad = IngestionItem::new(
                "mixed",
                "1.0.0",
                serde_json::json!({"broken": true}),
                ItemMetadata {
                    hash: "bad".to_string(),
                    ..Default::default()
                },
            );
            SourceOutput {
                items: vec![good, bad],
                errors: vec!["one item was unreadable".to_string()],
            }
        }
    }

    #[tokio::test]
    async fn test_timeout_records_error_and_continues() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(SlowSource));
        registry.register(Arc::new(MixedSource));

        let output = run_sources(&registry, &test_ctx(), Duration::from_millis(50)).await;

        assert!(output
            .errors
            .iter()
            .any(|e| e.starts_with("[slow] timed out after 50ms")));
        // The other source still ran
        assert!(output.sources.iter().any(|s| s.source_type == "mixed"));
    }

    #[tokio::test]
    async fn test_revalidation_drops_invalid_items() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(MixedSource));

        let output = run_sources(&registry, &test_ctx(), Duration::from_secs(5)).await;

        assert_eq!(output.items.len(), 1);
        let summary = &output.sources[0];
        assert_eq!(summary.accepted_item_count, 1);
        assert!(output.errors.iter().any(|e| e.contains("dropped invalid item")));
        assert!(output.errors.iter().any(|e| e.contains("one item was unreadable")));
    }

    #[tokio::test]
    async fn test_missing_fields_populated_from_source() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(MixedSource));

        let output = run_sources(&registry, &test_ctx(), Duration::from_secs(5)).await;
        let item = &output.items[0];
        assert_eq!(item.source_type, "mixed");
        assert_eq!(item.source_version, "1.0.0");
    }

    #[test]
    fn test_default_registry_covers_source_families() {
        let registry = SourceRegistry::with_defaults();
        let types = registry.types();
        for expected in [
            "docs", "commits", "blame", "diffs", "reflog", "ownership", "configs",
            "dependencies", "schemas", "apis", "ci", "security", "adrs", "tests",
        ] {
            assert!(types.contains(&expected), "missing source {expected}");
        }
    }
}
