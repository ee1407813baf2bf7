//! Incremental indexing: change batches, pack invalidation, cascade
//! reindex, and the magic-number detector

use std::sync::Arc;

use librarian_e2e_tests::harness::TestWorkspace;
use librarian_core::{
    detect_magic_numbers, EventBus, SuggestionEffort, SuggestionRisk, SuggestionType,
    WatchService,
};

fn watch_service(workspace: &mut TestWorkspace) -> WatchService {
    let store = workspace.store();
    WatchService::new(workspace.config(), store, EventBus::default())
}

#[tokio::test]
async fn change_batch_reindexes_and_decays_packs() {
    let mut workspace = TestWorkspace::new();
    workspace.write_file(
        "src/util.ts",
        "/** Shared helpers. */\nexport function clamp(v: number): number { return v; }\n",
    );
    let report = workspace.bootstrap(None, None).await;
    assert!(report.success);

    let store = workspace.store();
    let module = store.get_module_by_path("src/util.ts").unwrap().unwrap();
    let packs_before = store
        .get_context_packs(&librarian_core::PackFilter {
            target_ids: Some(vec![module.id.clone()]),
            ..Default::default()
        })
        .unwrap();
    assert!(!packs_before.is_empty());
    let confidence_before = packs_before[0].confidence;

    // Change the file, then push the event through the watcher
    workspace.write_file(
        "src/util.ts",
        "export function clamp(v: number): number { return Math.max(0, v); }\n\
         export function lerp(a: number, b: number, t: number): number { return a + (b - a) * t; }\n",
    );
    let service = watch_service(&mut workspace);
    service
        .process_batch(vec![workspace.path().join("src/util.ts")])
        .await
        .unwrap();

    let module_after = store.get_module_by_path("src/util.ts").unwrap().unwrap();
    assert!(module_after.exports.contains(&"lerp".to_string()));

    let packs_after = store
        .get_context_packs(&librarian_core::PackFilter {
            target_ids: Some(vec![module.id.clone()]),
            ..Default::default()
        })
        .unwrap();
    assert!((packs_after[0].confidence - confidence_before * 0.9).abs() < 1e-9);
    assert!(packs_after[0].invalidation_reason.is_some());
}

#[tokio::test]
async fn cascade_invalidates_importers() {
    let mut workspace = TestWorkspace::new();
    workspace.write_file("src/base.ts", "export const BASE = 1;\n");
    workspace.write_file(
        "src/consumer.ts",
        "import { BASE } from './base';\nexport function use(): number { return BASE; }\n",
    );
    let mut config = workspace.config();
    config.watch.cascade_delay_ms = 1;
    let report = workspace.bootstrap(None, None).await;
    assert!(report.success);

    let store = workspace.store();
    let consumer = store.get_module_by_path("src/consumer.ts").unwrap().unwrap();
    let consumer_packs = store
        .get_context_packs(&librarian_core::PackFilter {
            target_ids: Some(vec![consumer.id.clone()]),
            ..Default::default()
        })
        .unwrap();
    assert!(!consumer_packs.is_empty());

    workspace.write_file("src/base.ts", "export const BASE = 2;\n");
    let service = WatchService::new(config, Arc::clone(&store), EventBus::default());
    service
        .process_batch(vec![workspace.path().join("src/base.ts")])
        .await
        .unwrap();

    let consumer_packs = store
        .get_context_packs(&librarian_core::PackFilter {
            target_ids: Some(vec![consumer.id.clone()]),
            ..Default::default()
        })
        .unwrap();
    assert!(consumer_packs
        .iter()
        .any(|p| p.invalidation_reason.is_some()));
}

#[tokio::test]
async fn deleting_a_watched_file_purges_it() {
    let mut workspace = TestWorkspace::new();
    workspace.write_file("src/tmp.ts", "export const T = 1;\n");
    workspace.bootstrap(None, None).await;
    let store = workspace.store();
    assert!(store.get_module_by_path("src/tmp.ts").unwrap().is_some());

    workspace.remove_file("src/tmp.ts");
    let service = watch_service(&mut workspace);
    service
        .process_batch(vec![workspace.path().join("src/tmp.ts")])
        .await
        .unwrap();

    assert!(store.get_module_by_path("src/tmp.ts").unwrap().is_none());
    assert!(store.get_symbols_for_file("src/tmp.ts").unwrap().is_empty());
}

#[test]
fn magic_number_detector_matches_contract() {
    let suggestions = detect_magic_numbers("if (count > 999)");
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].suggestion_type, SuggestionType::ReplaceMagicNumber);
    assert_eq!(suggestions[0].risk, SuggestionRisk::Low);
    assert_eq!(suggestions[0].effort, SuggestionEffort::Trivial);
    assert!(suggestions[0].automatable);

    // 100 is in the acceptable set
    assert!(detect_magic_numbers("for (i = 0; i < 100; i++)").is_empty());
}
