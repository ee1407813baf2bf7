//! Test Indexer
//!
//! Maps test files to the modules they exercise, by relative-import
//! analysis and the `foo.test.ts` → `foo.ts` name convention. The graph
//! phase turns these items into `tested_by` edges.

use std::collections::HashSet;

use serde_json::json;

use crate::graph::resolve_import;
use crate::model::{content_hash, IngestionItem, ItemMetadata, TaxonomyTag};

use super::symbols::{SymbolExtractor, SOURCE_EXTENSIONS};
use super::{IngestContext, IngestionSource, SourceOutput};

// ============================================================================
// RECOGNITION + MAPPING
// ============================================================================

/// Whether a path is a test file
pub fn is_test_path(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    path.contains("__tests__/")
        || path.starts_with("test/")
        || path.starts_with("tests/")
        || file_name.contains(".test.")
        || file_name.contains(".spec.")
}

/// Module paths a test exercises, from its imports plus the name convention
pub fn test_targets(test_path: &str, imports: &[String], known_paths: &HashSet<String>) -> Vec<String> {
    let mut targets: Vec<String> = imports
        .iter()
        .filter_map(|specifier| resolve_import(test_path, specifier, known_paths))
        .filter(|target| !is_test_path(target))
        .collect();

    // foo.test.ts → foo.ts next to it
    let by_convention = test_path
        .replace(".test.", ".")
        .replace(".spec.", ".")
        .replace("__tests__/", "");
    if by_convention != test_path && known_paths.contains(&by_convention) {
        targets.push(by_convention);
    }

    targets.sort();
    targets.dedup();
    targets
}

// ============================================================================
// INGESTION SOURCE
// ============================================================================

/// Test-to-module mapping as an ingestion source
#[derive(Debug, Default)]
pub struct TestsSource;

#[async_trait::async_trait]
impl IngestionSource for TestsSource {
    fn source_type(&self) -> &'static str {
        "tests"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate(&self, item: &IngestionItem) -> bool {
        item.payload.get("testFile").is_some() && item.payload.get("targets").is_some()
    }

    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput {
        let known_paths: HashSet<String> = ctx.files.iter().cloned().collect();
        let extractor = SymbolExtractor::new();
        let mut output = SourceOutput::default();

        for file in ctx.files_with_extension(SOURCE_EXTENSIONS) {
            if !is_test_path(&file) {
                continue;
            }
            let content = match ctx.read_file(&file) {
                Ok(content) => content,
                Err(e) => {
                    output.errors.push(format!("{file}: {e}"));
                    continue;
                }
            };
            let structure = extractor.extract(&file, &content);
            let targets = test_targets(&file, &structure.imports, &known_paths);

            let payload = json!({
                "testFile": file,
                "targets": targets,
                "caseCount": content.matches("it(").count() + content.matches("test(").count(),
            });
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash: content_hash(&content),
                    taxonomy: vec![TaxonomyTag::Tests],
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
    fn test_test_path_recognition() {
        assert!(is_test_path("src/auth/token.test.ts"));
        assert!(is_test_path("src/__tests__/token.ts"));
        assert!(is_test_path("tests/integration.ts"));
        assert!(!is_test_path("src/auth/token.ts"));
    }

    #[test]
    fn test_targets_from_imports_and_convention() {
        let known: HashSet<String> = ["src/auth/token.ts", "src/util.ts", "src/auth/token.test.ts"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let imports = vec!["./token".to_string(), "../util".to_string(), "vitest".to_string()];
        let targets = test_targets("src/auth/token.test.ts", &imports, &known);
        assert_eq!(targets, vec!["src/auth/token.ts", "src/util.ts"]);
    }

    #[test]
    fn test_convention_only_mapping() {
        let known: HashSet<String> = ["src/rate.ts", "src/rate.spec.ts"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let targets = test_targets("src/rate.spec.ts", &[], &known);
        assert_eq!(targets, vec!["src/rate.ts"]);
    }
}
