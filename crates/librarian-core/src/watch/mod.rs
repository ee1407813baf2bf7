//! File Watcher / Incremental Indexer
//!
//! Consumes an abstract change stream (the OS watcher bridges into it),
//! batches events behind a debounce window, and re-ingests affected
//! modules: symbols re-extracted, graph edges rebuilt, embedding updates
//! enqueued, targeting packs decayed, and importers scheduled for cascade
//! reindex. A storm of events flips the batch into catch-up mode.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::config::{LibrarianConfig, WatchConfig};
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::graph::import_edges;
use crate::ingest::{FileStructure, SymbolExtractor};
use crate::model::{EdgeType, FunctionEntity, ModuleEntity, WatchState};
use crate::storage::{EdgeQuery, KnowledgeStore};

const WATCH_STATE_KEY: &str = "watch.state";
const EMBED_QUEUE_KEY: &str = "embeddings.refresh_queue";

// ============================================================================
// OS WATCHER BRIDGE
// ============================================================================

/// Bridge the OS file watcher into a tokio channel.
///
/// The returned watcher must stay alive for events to flow; callers keep it
/// next to the `WatchService` run loop.
pub fn spawn_os_watcher(
    workspace: &std::path::Path,
    tx: mpsc::Sender<PathBuf>,
) -> Result<notify::RecommendedWatcher> {
    let mut watcher =
        notify::recommended_watcher(move |result: std::result::Result<notify::Event, notify::Error>| {
            match result {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        notify::EventKind::Create(_)
                            | notify::EventKind::Modify(_)
                            | notify::EventKind::Remove(_)
                    ) {
                        for path in event.paths {
                            let _ = tx.blocking_send(path);
                        }
                    }
                }
                Err(e) => tracing::error!(error = %e, "watch error"),
            }
        })?;
    watcher.watch(workspace, RecursiveMode::Recursive)?;
    Ok(watcher)
}

// ============================================================================
// WATCH SERVICE
// ============================================================================

/// Incremental indexer over a change-event stream
pub struct WatchService {
    config: LibrarianConfig,
    store: Arc<KnowledgeStore>,
    bus: EventBus,
    extractor: SymbolExtractor,
}

impl WatchService {
    /// Create a watch service
    pub fn new(config: LibrarianConfig, store: Arc<KnowledgeStore>, bus: EventBus) -> Self {
        Self {
            config,
            store,
            bus,
            extractor: SymbolExtractor::new(),
        }
    }

    fn watch_config(&self) -> &WatchConfig {
        &self.config.watch
    }

    /// Consume the change stream until cancelled
    pub async fn run(&self, mut rx: mpsc::Receiver<PathBuf>, cancel: CancelToken) -> Result<()> {
        self.update_state(|state| {
            state.watch_started_at = Some(chrono::Utc::now());
            state.suspected_dead = false;
            state.effective_config =
                serde_json::to_string(self.watch_config()).unwrap_or_default();
        })?;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            // Block for the first event of a batch, with a heartbeat tick
            let first = match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
                Ok(Some(path)) => path,
                Ok(None) => break,
                Err(_) => {
                    self.update_state(|state| {
                        state.watch_last_heartbeat_at = Some(chrono::Utc::now());
                    })?;
                    continue;
                }
            };

            // Collect the rest of the batch inside the debounce window
            let mut batch = vec![first];
            let window = Duration::from_millis(self.watch_config().batch_window_ms.max(1));
            let deadline = Instant::now() + window;
            let mut storm = false;
            while batch.len() < self.watch_config().storm_threshold {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match tokio::time::timeout(remaining, rx.recv()).await {
                    Ok(Some(path)) => batch.push(path),
                    Ok(None) | Err(_) => break,
                }
            }
            if batch.len() >= self.watch_config().storm_threshold {
                storm = true;
            }

            self.update_state(|state| {
                state.watch_last_event_at = Some(chrono::Utc::now());
                state.watch_last_heartbeat_at = Some(chrono::Utc::now());
                if storm {
                    state.needs_catchup = true;
                }
            })?;

            if self.is_paused()? {
                tracing::debug!("watch paused; dropping batch of {}", batch.len());
                continue;
            }

            if storm {
                self.process_catch_up().await?;
            } else {
                self.process_batch(batch).await?;
            }
        }

        self.update_state(|state| {
            state.watch_last_heartbeat_at = Some(chrono::Utc::now());
        })?;
        Ok(())
    }

    fn is_paused(&self) -> Result<bool> {
        Ok(self.store.get_state("watch.paused")?.as_deref() == Some("true"))
    }

    /// Storm handling: full re-discovery instead of per-file work
    async fn process_catch_up(&self) -> Result<()> {
        tracing::info!("event storm; switching to catch-up reindex");
        self.bus.publish(Event::IndexingStarted {
            scope: "catch-up".to_string(),
        });
        let started = Instant::now();

        let files = crate::bootstrap::discover_workspace_files(&self.config)?;
        let mut count = 0u64;
        for file in &files {
            if SymbolExtractor::handles(file) {
                self.reindex_file(file)?;
                count += 1;
            }
        }

        self.update_state(|state| {
            state.needs_catchup = false;
            state.watch_last_reindex_ok_at = Some(chrono::Utc::now());
        })?;
        self.bus.publish(Event::IndexingComplete {
            duration_ms: started.elapsed().as_millis() as u64,
            counts: count,
        });
        Ok(())
    }

    /// Process one debounced batch. The run loop calls this; it is public
    /// so embedders can drive the indexer from their own event plumbing.
    pub async fn process_batch(&self, batch: Vec<PathBuf>) -> Result<()> {
        let affected = self.affected_files(batch);
        if affected.is_empty() {
            return Ok(());
        }

        self.bus.publish(Event::IndexingStarted {
            scope: "incremental".to_string(),
        });
        let started = Instant::now();

        let mut changed_modules = Vec::new();
        for file in &affected {
            self.bus.publish(Event::FileModified { path: file.clone() });
            if SymbolExtractor::handles(file) {
                if let Some(module_id) = self.reindex_file(file)? {
                    changed_modules.push(module_id);
                }
            }
        }

        self.update_state(|state| {
            state.watch_last_reindex_ok_at = Some(chrono::Utc::now());
        })?;
        self.store.update_metadata(|metadata| {
            metadata.last_indexing = Some(chrono::Utc::now());
        })?;
        self.bus.publish(Event::IndexingComplete {
            duration_ms: started.elapsed().as_millis() as u64,
            counts: changed_modules.len() as u64,
        });

        // Cascade: importers of the changed modules, delayed and batched
        if !changed_modules.is_empty() {
            self.cascade_reindex(&changed_modules).await?;
        }
        Ok(())
    }

    /// Workspace-relative paths from the raw event batch, deduplicated
    fn affected_files(&self, batch: Vec<PathBuf>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for path in batch {
            let Ok(relative) = path.strip_prefix(&self.config.workspace) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if relative.starts_with(".librarian/")
                || relative.starts_with("state/")
                || relative.starts_with(".git/")
            {
                continue;
            }
            if seen.insert(relative.clone()) {
                files.push(relative);
            }
        }
        files
    }

    /// Re-extract one file: module, symbols, functions, import edges, pack
    /// invalidation, and an embedding-refresh enqueue. Returns the module
    /// id when content actually changed.
    fn reindex_file(&self, file: &str) -> Result<Option<String>> {
        let absolute = self.config.workspace.join(file);
        let module_id = ModuleEntity::id_for_path(file);

        let Ok(source) = std::fs::read_to_string(&absolute) else {
            // Deleted (or unreadable): drop the module and its dependents
            if self.store.delete_module(&module_id)? {
                tracing::info!(file, "removed deleted module from the index");
            }
            return Ok(None);
        };

        let structure = self.extractor.extract(file, &source);
        if let Some(existing) = self.store.get_module(&module_id)? {
            if existing.checksum == structure.checksum {
                return Ok(None);
            }
        }

        self.persist_structure(&structure)?;
        self.bus.publish(Event::EntityUpdated {
            entity_id: module_id.clone(),
            field: "checksum".to_string(),
        });

        // Stale packs decay rather than vanish
        self.store
            .invalidate_packs_for_target(&module_id, "source file changed")?;
        for symbol in structure.symbols.iter().filter(|s| s.kind.is_callable()) {
            let qualified = match &symbol.parent {
                Some(parent) => format!("{parent}.{}", symbol.name),
                None => symbol.name.clone(),
            };
            let function_id =
                crate::model::stable_id(&crate::model::qualified_name(file, &qualified));
            self.store
                .invalidate_packs_for_target(&function_id, "source file changed")?;
        }

        self.enqueue_embedding_refresh(&structure)?;
        Ok(Some(module_id))
    }

    fn persist_structure(&self, structure: &FileStructure) -> Result<()> {
        let mut module = ModuleEntity::new(&structure.path);
        module.checksum = structure.checksum.clone();
        module.exports = structure.export_names();
        module.confidence = if structure.symbols.is_empty() { 0.4 } else { 0.7 };
        self.store.upsert_module(&module)?;
        self.store.replace_symbols(&structure.path, &structure.symbols)?;

        for symbol in structure.symbols.iter().filter(|s| s.kind.is_callable()) {
            let qualified = match &symbol.parent {
                Some(parent) => format!("{parent}.{}", symbol.name),
                None => symbol.name.clone(),
            };
            let mut function =
                FunctionEntity::new(&structure.path, &module.id, &qualified, &symbol.name);
            function.start_line = symbol.line;
            function.end_line = symbol.end_line.unwrap_or(symbol.line).max(symbol.line);
            function.signature = symbol.signature.clone();
            function.purpose = symbol.doc.clone();
            function.validation_count = 1;
            self.store.upsert_function(&function)?;
        }

        // Structural edges for this module only
        let known_paths: HashSet<String> = self
            .store
            .get_modules(&Default::default())?
            .into_iter()
            .map(|m| m.path)
            .collect();
        for edge in import_edges(&module, &structure.imports, &known_paths) {
            self.store.upsert_edge(&edge)?;
        }
        Ok(())
    }

    fn enqueue_embedding_refresh(&self, structure: &FileStructure) -> Result<()> {
        let mut queue: Vec<String> = self
            .store
            .get_state(EMBED_QUEUE_KEY)?
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        for symbol in structure.symbols.iter().filter(|s| s.kind.is_callable()) {
            let qualified = match &symbol.parent {
                Some(parent) => format!("{parent}.{}", symbol.name),
                None => symbol.name.clone(),
            };
            let id = crate::model::stable_id(&crate::model::qualified_name(
                &structure.path,
                &qualified,
            ));
            if !queue.contains(&id) {
                queue.push(id);
            }
        }
        self.store
            .set_state(EMBED_QUEUE_KEY, &serde_json::to_string(&queue)?)
    }

    /// Invalidate and refresh importers of the changed modules
    async fn cascade_reindex(&self, changed_modules: &[String]) -> Result<()> {
        let importers = self.store.get_graph_edges(&EdgeQuery {
            to_ids: Some(changed_modules.to_vec()),
            edge_types: Some(vec![EdgeType::Imports]),
            limit: Some(256),
            ..Default::default()
        })?;
        if importers.is_empty() {
            return Ok(());
        }

        tokio::time::sleep(Duration::from_millis(self.watch_config().cascade_delay_ms)).await;
        self.bus.publish(Event::IndexingStarted {
            scope: "cascade".to_string(),
        });
        let started = Instant::now();

        let mut count = 0u64;
        for chunk in importers.chunks(self.watch_config().cascade_batch_size.max(1)) {
            for edge in chunk {
                if let Some(module) = self.store.get_module(&edge.from_id)? {
                    self.store
                        .invalidate_packs_for_target(&module.id, "imported module changed")?;
                    self.reindex_file(&module.path)?;
                    count += 1;
                }
            }
            tokio::task::yield_now().await;
        }

        self.bus.publish(Event::IndexingComplete {
            duration_ms: started.elapsed().as_millis() as u64,
            counts: count,
        });
        Ok(())
    }

    /// Persisted watch state
    pub fn state(&self) -> Result<WatchState> {
        Ok(self
            .store
            .get_state(WATCH_STATE_KEY)?
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default())
    }

    fn update_state(&self, mutate: impl FnOnce(&mut WatchState)) -> Result<()> {
        let mut state = self.state()?;
        mutate(&mut state);
        self.store
            .set_state(WATCH_STATE_KEY, &serde_json::to_string(&state)?)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn service(dir: &std::path::Path) -> (WatchService, Arc<KnowledgeStore>) {
        let store = Arc::new(KnowledgeStore::open_in_memory().unwrap());
        let service = WatchService::new(
            LibrarianConfig::for_workspace(dir),
            Arc::clone(&store),
            EventBus::default(),
        );
        (service, store)
    }

    #[tokio::test]
    async fn test_batch_reindexes_changed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(
            dir.path().join("src/a.ts"),
            "export function alpha() { return 1; }",
        )
        .unwrap();

        let (service, store) = service(dir.path());
        service
            .process_batch(vec![dir.path().join("src/a.ts")])
            .await
            .unwrap();

        let module = store.get_module_by_path("src/a.ts").unwrap().unwrap();
        assert!(module.exports.contains(&"alpha".to_string()));
        assert_eq!(store.get_symbols_for_file("src/a.ts").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
        let (service, store) = service(dir.path());

        service.reindex_file("a.ts").unwrap();
        let first = store.get_module_by_path("a.ts").unwrap().unwrap();

        // Same content: second pass reports no change
        assert!(service.reindex_file("a.ts").unwrap().is_none());
        let second = store.get_module_by_path("a.ts").unwrap().unwrap();
        assert_eq!(first.last_indexed, second.last_indexed);
    }

    #[tokio::test]
    async fn test_changed_file_decays_packs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
        let (service, store) = service(dir.path());
        service.reindex_file("a.ts").unwrap();

        let module = store.get_module_by_path("a.ts").unwrap().unwrap();
        let mut pack =
            crate::model::ContextPack::new(crate::model::PackType::ModuleOverview, &module.id);
        pack.confidence = 0.8;
        store.upsert_pack(&pack).unwrap();

        std::fs::write(dir.path().join("a.ts"), "export const a = 2; export const b = 3;")
            .unwrap();
        service.reindex_file("a.ts").unwrap();

        let decayed = store.get_pack(&pack.pack_id).unwrap().unwrap();
        assert!((decayed.confidence - 0.72).abs() < 1e-9);
        assert!(decayed.invalidation_reason.is_some());
    }

    #[tokio::test]
    async fn test_deleted_file_removes_module() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
        let (service, store) = service(dir.path());
        service.reindex_file("a.ts").unwrap();
        assert!(store.get_module_by_path("a.ts").unwrap().is_some());

        std::fs::remove_file(dir.path().join("a.ts")).unwrap();
        service.reindex_file("a.ts").unwrap();
        assert!(store.get_module_by_path("a.ts").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_watch_state_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _store) = service(dir.path());
        service
            .update_state(|state| {
                state.needs_catchup = true;
            })
            .unwrap();
        assert!(service.state().unwrap().needs_catchup);
    }

    #[tokio::test]
    async fn test_affected_files_filters_state_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _store) = service(dir.path());
        let affected = service.affected_files(vec![
            dir.path().join("src/a.ts"),
            dir.path().join(".librarian/librarian.db"),
            dir.path().join("state/audits/x.json"),
            dir.path().join("src/a.ts"),
        ]);
        assert_eq!(affected, vec!["src/a.ts"]);
    }
}
