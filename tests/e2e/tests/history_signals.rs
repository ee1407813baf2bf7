//! Git-history signals: commits, blame, diffs, reflog, ownership, and
//! ingestion idempotence over a real repository

use std::sync::Arc;
use std::time::Duration;

use librarian_e2e_tests::harness::TestWorkspace;
use librarian_e2e_tests::mocks::FailingLlm;
use librarian_core::{
    run_sources, BudgetLimits, GovernorContext, IngestContext, SourceRegistry,
};
use serde_json::Value;

fn ingest_ctx(workspace: &TestWorkspace, files: Vec<String>) -> IngestContext {
    IngestContext {
        workspace: workspace.path().to_path_buf(),
        files,
        llm: None,
        governor: Arc::new(GovernorContext::new("test", BudgetLimits::default())),
        max_commits: 100,
    }
}

fn committed_workspace() -> TestWorkspace {
    let workspace = TestWorkspace::new();
    workspace.git_init();
    workspace.write_file(
        "src/auth/token.ts",
        "export function issueToken(user: string): string { return sign(user); }\n",
    );
    workspace.write_file("README.md", "# Auth Service\n\nHow to install: run make.\n");
    workspace.git_commit_all("feat(auth): initial token issuing");

    workspace.write_file(
        "src/auth/token.ts",
        "export function issueToken(user: string): string {\n\
           audit(user);\n\
           return sign(user);\n\
         }\n",
    );
    workspace.git_commit_all("fix(auth): patch token leak");
    workspace
}

#[tokio::test]
async fn commit_indexer_categorises_and_scores_risk() {
    let workspace = committed_workspace();
    let ctx = ingest_ctx(
        &workspace,
        vec!["src/auth/token.ts".to_string(), "README.md".to_string()],
    );

    let registry = SourceRegistry::with_defaults();
    let output = run_sources(&registry, &ctx, Duration::from_secs(30)).await;

    let commit_items: Vec<_> = output
        .items
        .iter()
        .filter(|i| i.source_type == "commits")
        .collect();
    assert_eq!(commit_items.len(), 2);

    let fix = commit_items
        .iter()
        .find(|i| {
            i.payload
                .get("message")
                .and_then(Value::as_str)
                .is_some_and(|m| m.starts_with("fix(auth)"))
        })
        .expect("fix commit item");
    assert_eq!(fix.payload["category"], "bugfix");
    let risk = fix.payload["riskScore"].as_f64().unwrap();
    assert!(risk >= 0.25, "risk was {risk}");
    assert!(risk <= 1.0);
    // No LLM configured: the summary is the message itself
    assert_eq!(fix.payload["summary"], fix.payload["message"]);
}

#[tokio::test]
async fn failing_llm_falls_back_to_heuristic_and_records_errors() {
    let workspace = committed_workspace();
    let mut ctx = ingest_ctx(&workspace, vec!["src/auth/token.ts".to_string()]);
    ctx.llm = Some(Arc::new(FailingLlm));

    let registry = SourceRegistry::with_defaults();
    let output = run_sources(&registry, &ctx, Duration::from_secs(30)).await;

    // The optional-LLM source still produces items with heuristic summaries
    let commit_items: Vec<_> = output
        .items
        .iter()
        .filter(|i| i.source_type == "commits")
        .collect();
    assert_eq!(commit_items.len(), 2);
    for item in &commit_items {
        assert_eq!(item.payload["summary"], item.payload["message"]);
    }

    // But every failed summarization attempt is recorded
    let llm_failures = output
        .errors
        .iter()
        .filter(|e| e.starts_with("[commits]") && e.contains("llm summary failed"))
        .count();
    assert_eq!(llm_failures, 2);
}

#[tokio::test]
async fn ingestion_is_idempotent_on_unchanged_workspace() {
    let workspace = committed_workspace();
    let files = vec!["src/auth/token.ts".to_string(), "README.md".to_string()];
    let registry = SourceRegistry::with_defaults();

    let first = run_sources(&registry, &ingest_ctx(&workspace, files.clone()), Duration::from_secs(30)).await;
    let second = run_sources(&registry, &ingest_ctx(&workspace, files), Duration::from_secs(30)).await;

    let mut first_keys: Vec<(String, String, String, String)> = first
        .items
        .iter()
        .map(|i| {
            (
                i.id.clone(),
                i.source_type.clone(),
                i.source_version.clone(),
                i.metadata.hash.clone(),
            )
        })
        .collect();
    let mut second_keys: Vec<(String, String, String, String)> = second
        .items
        .iter()
        .map(|i| {
            (
                i.id.clone(),
                i.source_type.clone(),
                i.source_version.clone(),
                i.metadata.hash.clone(),
            )
        })
        .collect();
    first_keys.sort();
    second_keys.sort();
    assert_eq!(first_keys, second_keys);
}

#[tokio::test]
async fn blame_groups_lines_and_skips_binaries() {
    let workspace = committed_workspace();
    std::fs::write(workspace.path().join("logo.bin"), [0u8, 1, 2, 3]).unwrap();
    workspace.git_commit_all("chore: add binary asset");

    let ctx = ingest_ctx(
        &workspace,
        vec!["src/auth/token.ts".to_string(), "logo.bin".to_string()],
    );
    let registry = SourceRegistry::with_defaults();
    let output = run_sources(&registry, &ctx, Duration::from_secs(30)).await;

    let blame_items: Vec<_> = output
        .items
        .iter()
        .filter(|i| i.source_type == "blame")
        .collect();
    // The binary yields zero chunks (and therefore no item); the source
    // file yields chunked line ownership
    assert_eq!(blame_items.len(), 1);
    assert_eq!(blame_items[0].payload["file"], "src/auth/token.ts");
    let chunks = blame_items[0].payload["chunks"].as_array().unwrap();
    assert!(!chunks.is_empty());
    for chunk in chunks {
        let start = chunk["lineStart"].as_u64().unwrap();
        let end = chunk["lineEnd"].as_u64().unwrap();
        assert!(start >= 1 && start <= end);
    }
}

#[tokio::test]
async fn diffs_and_reflog_respect_invariants() {
    let workspace = committed_workspace();
    let ctx = ingest_ctx(&workspace, vec!["src/auth/token.ts".to_string()]);
    let registry = SourceRegistry::with_defaults();
    let output = run_sources(&registry, &ctx, Duration::from_secs(30)).await;

    let diff_items: Vec<_> = output
        .items
        .iter()
        .filter(|i| i.source_type == "diffs")
        .collect();
    assert!(!diff_items.is_empty());
    for item in &diff_items {
        let complexity = item.payload["complexity"].as_f64().unwrap();
        let impact = item.payload["impactScore"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&complexity));
        assert!((0.0..=1.0).contains(&impact));
    }

    let reflog_items: Vec<_> = output
        .items
        .iter()
        .filter(|i| i.source_type == "reflog")
        .collect();
    assert!(!reflog_items.is_empty());
    assert!(reflog_items
        .iter()
        .all(|i| i.payload["action"] == "commit"));
}

#[tokio::test]
async fn ownership_expertise_shares_sum_to_one() {
    let workspace = committed_workspace();
    let ctx = ingest_ctx(&workspace, vec!["src/auth/token.ts".to_string()]);
    let registry = SourceRegistry::with_defaults();
    let output = run_sources(&registry, &ctx, Duration::from_secs(30)).await;

    let ownership = output
        .items
        .iter()
        .find(|i| {
            i.source_type == "ownership" && i.payload["file"] == "src/auth/token.ts"
        })
        .expect("ownership item");
    let owners = ownership.payload["owners"].as_array().unwrap();
    let total: f64 = owners
        .iter()
        .map(|o| o["expertise"].as_f64().unwrap())
        .sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn docs_source_classifies_and_summarises_without_llm() {
    let workspace = committed_workspace();
    let ctx = ingest_ctx(&workspace, vec!["README.md".to_string()]);
    let registry = SourceRegistry::with_defaults();
    let output = run_sources(&registry, &ctx, Duration::from_secs(30)).await;

    let doc = output
        .items
        .iter()
        .find(|i| i.source_type == "docs")
        .expect("docs item");
    assert_eq!(doc.payload["audience"], "general");
    assert_eq!(doc.payload["boost"], 0.9);
    assert_eq!(doc.payload["isHowTo"], true);
    // First heading is the deterministic fallback summary
    assert_eq!(doc.payload["summary"], "Auth Service");
}
