//! Bootstrap → query journeys over real workspaces

use std::sync::Arc;

use librarian_e2e_tests::harness::TestWorkspace;
use librarian_e2e_tests::mocks::HashEmbedder;
use librarian_core::{
    FunctionFilter, LibrarianError, PackType, QueryOptions, SymbolKind,
};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn bootstrap_indexes_class_with_method() {
    let mut workspace = TestWorkspace::new();
    workspace.write_file(
        "src/foo.ts",
        "class Foo { bar(): number { return 1; } }",
    );

    let report = workspace.bootstrap(None, None).await;
    assert!(report.success, "errors: {:?}", report.all_errors());

    let store = workspace.store();
    let stats = store.get_stats().unwrap();
    assert_eq!(stats.total_modules, 1);
    assert_eq!(stats.total_functions, 1);

    let symbols = store.get_symbols_for_file("src/foo.ts").unwrap();
    let class = symbols
        .iter()
        .find(|s| s.kind == SymbolKind::Class)
        .expect("class symbol");
    assert_eq!(class.name, "Foo");
    let method = symbols
        .iter()
        .find(|s| s.kind == SymbolKind::Method)
        .expect("method symbol");
    assert_eq!(method.name, "bar");
    assert_eq!(method.qualified_name, "src/foo:Foo.bar");

    let functions = store.get_functions(&FunctionFilter::default()).unwrap();
    assert_eq!(functions.len(), 1);
    assert_eq!(functions[0].name, "bar");
}

#[tokio::test]
async fn bootstrap_captures_aliased_re_export() {
    let mut workspace = TestWorkspace::new();
    workspace.write_file("src/m.ts", "export const X = 1;");
    workspace.write_file("src/index.ts", "export { X as Y } from './m';");

    let report = workspace.bootstrap(None, None).await;
    assert!(report.success);

    let symbols = workspace
        .store()
        .get_symbols_for_file("src/index.ts")
        .unwrap();
    let re_export = symbols
        .iter()
        .find(|s| s.kind == SymbolKind::ReExport)
        .expect("re-export symbol");
    assert_eq!(re_export.name, "Y");
    assert_eq!(re_export.original_name.as_deref(), Some("X"));
    assert_eq!(re_export.from_module.as_deref(), Some("./m"));
}

#[tokio::test]
async fn bootstrap_with_zero_files_succeeds() {
    let mut workspace = TestWorkspace::new();
    let report = workspace.bootstrap(None, None).await;
    assert!(report.success);
    assert_eq!(report.total_files_processed, 0);
    assert_eq!(report.total_functions_indexed, 0);

    let stats = workspace.store().get_stats().unwrap();
    assert_eq!(stats.total_modules, 0);
}

fn rate_limiter_workspace() -> TestWorkspace {
    let workspace = TestWorkspace::new();
    workspace.write_file(
        "src/rateLimiter.ts",
        "/** Enforce request rate limiting per client. */\n\
         export function checkRateLimit(clientId: string): boolean {\n\
           return bucketFor(clientId).tryTake();\n\
         }\n",
    );
    workspace.write_file(
        "src/server.ts",
        "import { checkRateLimit } from './rateLimiter';\n\
         export function handle(req: { client: string }): boolean {\n\
           return checkRateLimit(req.client);\n\
         }\n",
    );
    workspace
}

#[tokio::test]
async fn query_finds_rate_limiter_function() {
    let mut workspace = rate_limiter_workspace();
    let embedder: Arc<dyn librarian_core::EmbeddingService> = Arc::new(HashEmbedder::default());
    let report = workspace.bootstrap(Some(Arc::clone(&embedder)), None).await;
    assert!(report.success, "errors: {:?}", report.all_errors());
    assert!(report.total_context_packs_created > 0);

    let retriever = workspace.retriever(Some(embedder));
    let response = retriever
        .query("How does rate limiting work?", QueryOptions::default())
        .await
        .unwrap();

    assert!(response.total_confidence > 0.0);
    assert!(!response.packs.is_empty(), "explanation: {}", response.explanation);
    let function_pack = response
        .packs
        .iter()
        .find(|p| p.pack_type == PackType::FunctionContext)
        .expect("function_context pack");
    assert!(function_pack
        .related_files
        .contains(&"src/rateLimiter.ts".to_string()));
}

#[tokio::test]
async fn second_identical_query_hits_cache() {
    let mut workspace = rate_limiter_workspace();
    workspace.bootstrap(None, None).await;

    let retriever = workspace.retriever(None);
    let first = retriever
        .query("rate limiting", QueryOptions::default())
        .await
        .unwrap();
    assert!(!first.cache_hit);

    let second = retriever
        .query("rate limiting", QueryOptions::default())
        .await
        .unwrap();
    assert!(second.cache_hit);

    let first_ids: Vec<&str> = first.packs.iter().map(|p| p.pack_id.as_str()).collect();
    let second_ids: Vec<&str> = second.packs.iter().map(|p| p.pack_id.as_str()).collect();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn query_without_bootstrap_is_rejected() {
    let mut workspace = TestWorkspace::new();
    let retriever = workspace.retriever(None);
    let err = retriever
        .query("anything", QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LibrarianError::NotBootstrapped(_)));
}

#[tokio::test]
async fn empty_intent_is_invalid() {
    let mut workspace = rate_limiter_workspace();
    workspace.bootstrap(None, None).await;
    let retriever = workspace.retriever(None);

    let err = retriever
        .query("   ", QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LibrarianError::InvalidArgument(_)));
}

#[tokio::test]
async fn degraded_query_without_embedder_notes_it() {
    let mut workspace = rate_limiter_workspace();
    workspace.bootstrap(None, None).await;
    let retriever = workspace.retriever(None);

    let response = retriever
        .query("rate limiting", QueryOptions::default())
        .await
        .unwrap();
    assert!(response.explanation.contains("degraded"));
}

#[tokio::test]
async fn deleting_a_module_cascades_to_functions_and_packs() {
    let mut workspace = rate_limiter_workspace();
    workspace.bootstrap(None, None).await;
    let store = workspace.store();

    let module = store
        .get_module_by_path("src/rateLimiter.ts")
        .unwrap()
        .expect("module");
    let functions = store
        .get_functions(&FunctionFilter {
            module_id: Some(module.id.clone()),
            ..Default::default()
        })
        .unwrap();
    assert!(!functions.is_empty());

    assert!(store.delete_module(&module.id).unwrap());
    for function in &functions {
        assert!(store.get_function(&function.id).unwrap().is_none());
    }
    let orphan_packs = store
        .get_context_packs(&librarian_core::PackFilter {
            target_ids: Some(
                functions
                    .iter()
                    .map(|f| f.id.clone())
                    .chain([module.id.clone()])
                    .collect(),
            ),
            ..Default::default()
        })
        .unwrap();
    assert!(orphan_packs.is_empty());
}
