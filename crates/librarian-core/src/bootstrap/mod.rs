//! Bootstrap Orchestrator
//!
//! The phased pipeline that turns a workspace into a knowledge index:
//! discover → parse symbols → code graph → ingestion sources → semantic
//! indexing → extra edges → context packs → finalize. Each phase commits a
//! durable checkpoint; `force_resume` continues from the last one. A phase
//! whose item error rate crosses 50% counts as failed, but only
//! `discover_files` and `finalize` failures abort the run.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::config::{BootstrapMode, LibrarianConfig, QualityTier};
use crate::embeddings::EmbeddingService;
use crate::error::{LibrarianError, Result};
use crate::events::{Event, EventBus};
use crate::governor::{BudgetLimits, GovernorContext};
use crate::graph::{derive_co_change_edges, import_edges, resolve_import};
use crate::ingest::{
    run_sources, FileStructure, IngestContext, SourceRegistry, SymbolExtractor,
};
use crate::llm::LlmService;
use crate::model::{
    content_hash, qualified_name, stable_id, BlameEntry, BootstrapPhase, BootstrapReport,
    CommitCategory, CommitRecord, EdgeType, FunctionEntity, GraphEdge, IngestionItem,
    ModuleEntity, PhaseReport,
};
use crate::packs::PackBuilder;
use crate::storage::{FunctionFilter, KnowledgeStore, ModuleFilter};

// ============================================================================
// CHECKPOINT + REQUIREMENT
// ============================================================================

const CHECKPOINT_KEY: &str = "bootstrap.checkpoint";

/// Answer to `is_bootstrap_required`
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapRequirement {
    /// Whether a bootstrap run is needed
    pub required: bool,
    /// Why
    pub reason: String,
}

/// Examine report freshness, metadata tier, and workspace checksum
pub fn is_bootstrap_required(
    config: &LibrarianConfig,
    store: &KnowledgeStore,
    target_tier: QualityTier,
) -> Result<BootstrapRequirement> {
    let Some(report) = store.get_last_bootstrap_report()? else {
        return Ok(BootstrapRequirement {
            required: true,
            reason: "workspace has never been bootstrapped".to_string(),
        });
    };
    if !report.success {
        return Ok(BootstrapRequirement {
            required: true,
            reason: "last bootstrap did not complete".to_string(),
        });
    }

    let metadata = store.get_metadata()?;
    if metadata.quality_tier < target_tier {
        return Ok(BootstrapRequirement {
            required: true,
            reason: format!(
                "index tier is {} but {} was requested",
                metadata.quality_tier.as_str(),
                target_tier.as_str()
            ),
        });
    }

    let files = discover_workspace_files(config)?;
    let checksum = workspace_checksum(&config.workspace, &files);
    if checksum != metadata.workspace_checksum {
        return Ok(BootstrapRequirement {
            required: true,
            reason: "workspace contents changed since the last bootstrap".to_string(),
        });
    }

    Ok(BootstrapRequirement {
        required: false,
        reason: "index is current".to_string(),
    })
}

// ============================================================================
// DISCOVERY
// ============================================================================

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| LibrarianError::InvalidArgument(format!("bad glob {pattern}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| LibrarianError::InvalidArgument(format!("glob set: {e}")))
}

/// Enumerate workspace files honouring include/exclude globs. Paths are
/// workspace-relative with forward slashes, sorted.
pub fn discover_workspace_files(config: &LibrarianConfig) -> Result<Vec<String>> {
    let workspace = &config.workspace;
    if !workspace.is_dir() {
        return Err(LibrarianError::WorkspaceNotAccessible(workspace.clone()));
    }

    let includes = config.bootstrap.effective_includes();
    let include_set = if includes.is_empty() {
        None
    } else {
        Some(build_globset(&includes)?)
    };
    let exclude_set = build_globset(&config.bootstrap.effective_excludes())?;

    let mut files = Vec::new();
    for entry in WalkDir::new(workspace)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            // Prune excluded directories early so .git and node_modules
            // are never walked
            let relative = e.path().strip_prefix(workspace).unwrap_or(e.path());
            let relative = relative.to_string_lossy().replace('\\', "/");
            relative.is_empty() || !exclude_set.is_match(relative.as_str())
        })
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(workspace)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        if exclude_set.is_match(relative.as_str()) {
            continue;
        }
        if let Some(include_set) = &include_set {
            if !include_set.is_match(relative.as_str()) {
                continue;
            }
        }
        files.push(relative);
    }
    files.sort();
    Ok(files)
}

/// Cheap workspace fingerprint: sorted paths with sizes and mtimes, hashed
pub fn workspace_checksum(workspace: &Path, files: &[String]) -> String {
    let mut summary = String::new();
    for file in files {
        summary.push_str(file);
        if let Ok(metadata) = std::fs::metadata(workspace.join(file)) {
            summary.push_str(&format!(
                ":{}:{}",
                metadata.len(),
                metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0)
            ));
        }
        summary.push('\n');
    }
    content_hash(&summary)
}

// ============================================================================
// BOOTSTRAPPER
// ============================================================================

/// Runs the phased bootstrap pipeline against a store
pub struct Bootstrapper {
    config: LibrarianConfig,
    store: Arc<KnowledgeStore>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    llm: Option<Arc<dyn LlmService>>,
    bus: EventBus,
}

/// Mutable state threaded through the phases of one run
#[derive(Default)]
struct RunState {
    files: Vec<String>,
    structures: HashMap<String, FileStructure>,
    functions_indexed: u64,
    packs_created: u64,
}

impl Bootstrapper {
    /// Create a bootstrapper; the service ports may be absent
    pub fn new(
        config: LibrarianConfig,
        store: Arc<KnowledgeStore>,
        embedder: Option<Arc<dyn EmbeddingService>>,
        llm: Option<Arc<dyn LlmService>>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            store,
            embedder,
            llm,
            bus,
        }
    }

    /// Run the pipeline, producing (and persisting) a report even on
    /// failure or cancellation
    pub async fn run(&self, cancel: CancelToken) -> Result<BootstrapReport> {
        self.config.validate()?;
        let started = Instant::now();
        let mut report = BootstrapReport::begin();
        let mut state = RunState::default();

        self.bus.publish(Event::IndexingStarted {
            scope: "bootstrap".to_string(),
        });

        let resume_after = if self.config.bootstrap.force {
            self.store.clear_state(CHECKPOINT_KEY)?;
            None
        } else if self.config.bootstrap.force_resume {
            self.store
                .get_state(CHECKPOINT_KEY)?
                .and_then(|s| BootstrapPhase::parse_name(&s))
        } else {
            None
        };

        let phases = BootstrapPhase::all();
        for (index, phase) in phases.iter().enumerate() {
            if let Some(done) = resume_after {
                // Finalize always re-runs so a resumed run still lands on a
                // fresh metadata row and report
                if *phase <= done && *phase != BootstrapPhase::Finalize {
                    tracing::debug!(phase = phase.as_str(), "skipping checkpointed phase");
                    // Resumed runs still need the in-memory extraction state
                    if *phase == BootstrapPhase::DiscoverFiles {
                        state.files = discover_workspace_files(&self.config)?;
                    }
                    if *phase == BootstrapPhase::ParseSymbols {
                        self.extract_structures(&mut state);
                    }
                    continue;
                }
            }

            if cancel.is_cancelled() {
                report.error = Some("bootstrap cancelled".to_string());
                break;
            }

            self.bus.publish(Event::BootstrapProgress {
                phase: phase.as_str().to_string(),
                progress: index as f64 / phases.len() as f64,
                current_file: None,
            });

            let phase_started = Instant::now();
            tracing::info!(phase = phase.as_str(), "bootstrap phase starting");

            let mut phase_report = match self.run_phase(*phase, &mut state, &cancel).await {
                Ok(phase_report) => phase_report,
                Err(e) => PhaseReport {
                    phase: *phase,
                    duration_ms: 0,
                    errors: vec![e.to_string()],
                    items_processed: 0,
                    items_failed: 1,
                },
            };
            phase_report.duration_ms = phase_started.elapsed().as_millis() as u64;

            let failed = phase_report.failed();
            if failed {
                tracing::warn!(
                    phase = phase.as_str(),
                    errors = phase_report.errors.len(),
                    "phase crossed the error-rate threshold"
                );
            }
            report.phases.push(phase_report);

            if cancel.is_cancelled() {
                report.error = Some("bootstrap cancelled".to_string());
                break;
            }
            if failed && phase.is_fatal() {
                report.error = Some(format!("fatal phase {} failed", phase.as_str()));
                break;
            }
            if !failed {
                self.store.set_state(CHECKPOINT_KEY, phase.as_str())?;
            }
        }

        report.total_files_processed = state.files.len() as u64;
        report.total_functions_indexed = state.functions_indexed;
        report.total_context_packs_created = state.packs_created;
        report.completed_at = Utc::now();
        report.success = report.error.is_none()
            && report.phases.last().map(|p| p.phase) == Some(BootstrapPhase::Finalize)
            && !report.phases.iter().any(|p| p.failed() && p.phase.is_fatal());

        self.store.append_bootstrap_report(&report)?;
        self.write_audit(&report);

        self.bus.publish(Event::IndexingComplete {
            duration_ms: started.elapsed().as_millis() as u64,
            counts: state.functions_indexed,
        });
        Ok(report)
    }

    async fn run_phase(
        &self,
        phase: BootstrapPhase,
        state: &mut RunState,
        cancel: &CancelToken,
    ) -> Result<PhaseReport> {
        match phase {
            BootstrapPhase::DiscoverFiles => self.phase_discover(state),
            BootstrapPhase::ParseSymbols => self.phase_parse_symbols(state, cancel),
            BootstrapPhase::BuildCodeGraph => self.phase_build_graph(state),
            BootstrapPhase::RunIngestionSources => self.phase_run_sources(state).await,
            BootstrapPhase::SemanticIndexing => self.phase_semantic_indexing(cancel).await,
            BootstrapPhase::DeriveExtraEdges => self.phase_extra_edges(),
            BootstrapPhase::BuildContextPacks => self.phase_build_packs(state),
            BootstrapPhase::Finalize => self.phase_finalize(state),
        }
    }

    // ========================================================================
    // PHASES
    // ========================================================================

    fn phase_discover(&self, state: &mut RunState) -> Result<PhaseReport> {
        state.files = discover_workspace_files(&self.config)?;
        tracing::info!(files = state.files.len(), "workspace discovered");
        Ok(PhaseReport {
            phase: BootstrapPhase::DiscoverFiles,
            duration_ms: 0,
            errors: Vec::new(),
            items_processed: state.files.len() as u64,
            items_failed: 0,
        })
    }

    fn extract_structures(&self, state: &mut RunState) {
        let extractor = SymbolExtractor::new();
        for file in &state.files {
            if !SymbolExtractor::handles(file) {
                continue;
            }
            if let Ok(source) = std::fs::read_to_string(self.config.workspace.join(file)) {
                state
                    .structures
                    .insert(file.clone(), extractor.extract(file, &source));
            }
        }
    }

    fn phase_parse_symbols(&self, state: &mut RunState, cancel: &CancelToken) -> Result<PhaseReport> {
        let extractor = SymbolExtractor::new();
        let mut errors = Vec::new();
        let mut processed = 0u64;
        let mut failed = 0u64;

        let source_files: Vec<String> = state
            .files
            .iter()
            .filter(|f| SymbolExtractor::handles(f))
            .cloned()
            .collect();
        let total = source_files.len();

        for (index, file) in source_files.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            if index % 25 == 0 {
                self.bus.publish(Event::BootstrapProgress {
                    phase: BootstrapPhase::ParseSymbols.as_str().to_string(),
                    progress: 1.0 / 8.0 + (index as f64 / total.max(1) as f64) / 8.0,
                    current_file: Some(file.clone()),
                });
            }

            let source = match std::fs::read_to_string(self.config.workspace.join(file)) {
                Ok(source) => source,
                Err(e) => {
                    errors.push(format!("{file}: {e}"));
                    failed += 1;
                    continue;
                }
            };
            let structure = extractor.extract(file, &source);

            if let Err(e) = self.persist_structure(&structure, state) {
                errors.push(format!("{file}: {e}"));
                failed += 1;
            } else {
                processed += 1;
            }
            state.structures.insert(file.clone(), structure);
        }

        Ok(PhaseReport {
            phase: BootstrapPhase::ParseSymbols,
            duration_ms: 0,
            errors,
            items_processed: processed,
            items_failed: failed,
        })
    }

    fn persist_structure(&self, structure: &FileStructure, state: &mut RunState) -> Result<()> {
        let mut module = ModuleEntity::new(&structure.path);
        module.checksum = structure.checksum.clone();
        module.exports = structure.export_names();
        module.purpose = module_purpose(structure);
        module.confidence = if structure.symbols.is_empty() { 0.4 } else { 0.7 };
        self.store.upsert_module(&module)?;
        self.bus.publish(Event::EntityCreated {
            entity_id: module.id.clone(),
            entity_type: "module".to_string(),
        });

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
            function.signature = if symbol.signature.is_empty() {
                format!("{}()", symbol.name)
            } else {
                symbol.signature.clone()
            };
            function.purpose = symbol.doc.clone();
            function.confidence = 0.6;
            self.store.upsert_function(&function)?;
            state.functions_indexed += 1;
        }
        Ok(())
    }

    fn phase_build_graph(&self, state: &mut RunState) -> Result<PhaseReport> {
        let known_paths: HashSet<String> = state.structures.keys().cloned().collect();
        let mut errors = Vec::new();
        let mut processed = 0u64;
        let mut failed = 0u64;

        // Function name → entities, for call edge resolution
        let functions = self.store.get_functions(&FunctionFilter::default())?;
        let mut functions_by_name: HashMap<&str, Vec<&FunctionEntity>> = HashMap::new();
        for function in &functions {
            functions_by_name.entry(&function.name).or_default().push(function);
        }

        for structure in state.structures.values() {
            let module_id = ModuleEntity::id_for_path(&structure.path);

            // imports: module → module
            let module = ModuleEntity {
                id: module_id.clone(),
                path: structure.path.clone(),
                ..ModuleEntity::new(&structure.path)
            };
            let mut dependencies = Vec::new();
            for edge in import_edges(&module, &structure.imports, &known_paths) {
                dependencies.push(edge.to_id.clone());
                if let Err(e) = self.store.upsert_edge(&edge) {
                    errors.push(e.to_string());
                    failed += 1;
                } else {
                    processed += 1;
                }
            }
            if !dependencies.is_empty() {
                self.store.set_module_dependencies(&module_id, &dependencies)?;
            }

            // contains: module → function
            for symbol in structure.symbols.iter().filter(|s| s.kind.is_callable()) {
                let qualified = match &symbol.parent {
                    Some(parent) => format!("{parent}.{}", symbol.name),
                    None => symbol.name.clone(),
                };
                let function_id = stable_id(&qualified_name(&structure.path, &qualified));
                self.store.upsert_edge(&GraphEdge::statically(
                    &module_id,
                    function_id,
                    EdgeType::Contains,
                ))?;
                processed += 1;
            }

            // references: re-exports point at their source module
            for symbol in structure.symbols.iter().filter(|s| s.kind.is_reexport()) {
                if let Some(from) = &symbol.from_module {
                    if let Some(target) = resolve_import(&structure.path, from, &known_paths) {
                        self.store.upsert_edge(&GraphEdge::statically(
                            &module_id,
                            ModuleEntity::id_for_path(&target),
                            EdgeType::References,
                        ))?;
                        processed += 1;
                    }
                }
            }

            // calls: caller function → callee candidates by name.
            // CallRef.caller is already `<path>:<qualified>`, the same input
            // function ids are derived from.
            for call in &structure.calls {
                let caller = stable_id(&call.caller);
                if let Some(callees) = functions_by_name.get(call.callee.as_str()) {
                    for callee in callees.iter().take(3) {
                        if callee.id != caller {
                            self.store.upsert_edge(&GraphEdge {
                                from_id: caller.clone(),
                                to_id: callee.id.clone(),
                                edge_type: EdgeType::Calls,
                                weight: 0.8,
                                source: crate::model::EdgeSource::Static,
                            })?;
                            processed += 1;
                        }
                    }
                }
            }
        }

        Ok(PhaseReport {
            phase: BootstrapPhase::BuildCodeGraph,
            duration_ms: 0,
            errors,
            items_processed: processed,
            items_failed: failed,
        })
    }

    async fn phase_run_sources(&self, state: &mut RunState) -> Result<PhaseReport> {
        let registry = SourceRegistry::with_defaults();
        let governor = Arc::new(GovernorContext::new(
            BootstrapPhase::RunIngestionSources.as_str(),
            BudgetLimits::default(),
        ));
        let ctx = IngestContext {
            workspace: self.config.workspace.clone(),
            files: state.files.clone(),
            llm: self.llm.clone(),
            governor,
            max_commits: self.config.bootstrap.max_commits,
        };

        let timeout = std::time::Duration::from_millis(self.config.bootstrap.source_timeout_ms);
        let output = run_sources(&registry, &ctx, timeout).await;

        let mut errors = output.errors;
        let mut processed = 0u64;
        let mut failed = 0u64;

        for item in &output.items {
            match self.persist_item(item) {
                Ok(()) => processed += 1,
                Err(e) => {
                    errors.push(format!("[{}] {e}", item.source_type));
                    failed += 1;
                }
            }
        }

        tracing::info!(
            items = processed,
            sources = output.sources.len(),
            errors = errors.len(),
            "ingestion sources finished"
        );
        Ok(PhaseReport {
            phase: BootstrapPhase::RunIngestionSources,
            duration_ms: 0,
            errors,
            items_processed: processed,
            items_failed: failed,
        })
    }

    /// Persist an item, plus its typed projection when it carries one
    fn persist_item(&self, item: &IngestionItem) -> Result<()> {
        self.store.upsert_ingestion_item(item)?;
        match item.source_type.as_str() {
            "blame" => {
                if let Some(chunks) = item.payload.get("chunks") {
                    let entries: Vec<BlameEntry> =
                        serde_json::from_value(chunks.clone()).unwrap_or_default();
                    for entry in entries {
                        self.store.upsert_blame_entry(&entry)?;
                    }
                }
            }
            "diffs" => {
                if let Ok(record) = serde_json::from_value(item.payload.clone()) {
                    self.store.upsert_diff_record(&record)?;
                }
            }
            "reflog" => {
                if let Ok(entry) = serde_json::from_value(item.payload.clone()) {
                    self.store.upsert_reflog_entry(&entry)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn phase_semantic_indexing(&self, cancel: &CancelToken) -> Result<PhaseReport> {
        let Some(embedder) = &self.embedder else {
            // No embedding port: phase records the degradation and moves on
            return Ok(PhaseReport {
                phase: BootstrapPhase::SemanticIndexing,
                duration_ms: 0,
                errors: vec!["embedding service not configured; semantic indexing skipped".to_string()],
                items_processed: 0,
                items_failed: 0,
            });
        };

        let governor = GovernorContext::new(
            BootstrapPhase::SemanticIndexing.as_str(),
            BudgetLimits::default(),
        );
        let mut errors = Vec::new();
        let mut processed = 0u64;
        let mut failed = 0u64;

        // Entity id + embedding input, functions first, then docs
        let mut inputs: Vec<(String, String)> = Vec::new();
        for function in self.store.get_functions(&FunctionFilter::default())? {
            inputs.push((function.id.clone(), function.embedding_input()));
        }
        for item in self.store.get_ingestion_items("docs", 10_000)? {
            let text = [
                item.payload.get("title").and_then(Value::as_str),
                item.payload.get("summary").and_then(Value::as_str),
                item.metadata.path.as_deref(),
            ]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n");
            if !text.is_empty() {
                inputs.push((item.id.clone(), text));
            }
        }

        // Fast mode covers only a priority slice of the index
        if self.config.bootstrap.mode == BootstrapMode::Fast {
            let cap = 128.min(inputs.len());
            inputs.truncate(cap);
        }

        let batch_size = self.config.bootstrap.embedding_batch_size.max(1);
        for batch in inputs.chunks(batch_size) {
            if cancel.is_cancelled() {
                break;
            }
            if let Err(e) = governor.check_embedding_budget(batch.len() as u64) {
                errors.push(e.to_string());
                break;
            }
            let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            match embedder.embed_batch(&texts).await {
                Ok(embeddings) => {
                    governor.record_embeddings(batch.len() as u64);
                    for ((entity_id, _), embedding) in batch.iter().zip(embeddings) {
                        match self.store.put_embedding(entity_id, &embedding, "port") {
                            Ok(()) => processed += 1,
                            Err(e) => {
                                errors.push(format!("{entity_id}: {e}"));
                                failed += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    errors.push(format!("embedding batch failed: {e}"));
                    failed += batch.len() as u64;
                }
            }
        }

        Ok(PhaseReport {
            phase: BootstrapPhase::SemanticIndexing,
            duration_ms: 0,
            errors,
            items_processed: processed,
            items_failed: failed,
        })
    }

    fn phase_extra_edges(&self) -> Result<PhaseReport> {
        let mut errors = Vec::new();
        let mut processed = 0u64;

        // Co-change edges from commit items
        let commits = self.load_commit_records()?;
        for edge in derive_co_change_edges(&commits, 2, 50) {
            match self.store.upsert_edge(&edge) {
                Ok(()) => processed += 1,
                Err(e) => errors.push(e.to_string()),
            }
        }

        // Ownership edges from ownership items
        for item in self.store.get_ingestion_items("ownership", 10_000)? {
            let Some(file) = item.payload.get("file").and_then(Value::as_str) else {
                continue;
            };
            let module_id = ModuleEntity::id_for_path(file);
            let owners = item
                .payload
                .get("owners")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for owner in owners.iter().take(3) {
                let Some(email) = owner.get("authorEmail").and_then(Value::as_str) else {
                    continue;
                };
                let expertise = owner
                    .get("expertise")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                let edge = GraphEdge {
                    from_id: module_id.clone(),
                    to_id: format!("author:{email}"),
                    edge_type: EdgeType::OwnedBy,
                    weight: expertise.clamp(0.0, 1.0),
                    source: crate::model::EdgeSource::GitCochange,
                };
                match self.store.upsert_edge(&edge) {
                    Ok(()) => processed += 1,
                    Err(e) => errors.push(e.to_string()),
                }
            }
        }

        // Test-mapping edges from tests items
        for item in self.store.get_ingestion_items("tests", 10_000)? {
            let Some(test_file) = item.payload.get("testFile").and_then(Value::as_str) else {
                continue;
            };
            let targets = item
                .payload
                .get("targets")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for target in targets.iter().filter_map(Value::as_str) {
                let edge = GraphEdge::statically(
                    ModuleEntity::id_for_path(target),
                    ModuleEntity::id_for_path(test_file),
                    EdgeType::TestedBy,
                );
                match self.store.upsert_edge(&edge) {
                    Ok(()) => processed += 1,
                    Err(e) => errors.push(e.to_string()),
                }
            }
        }

        Ok(PhaseReport {
            phase: BootstrapPhase::DeriveExtraEdges,
            duration_ms: 0,
            errors,
            items_processed: processed,
            items_failed: 0,
        })
    }

    fn load_commit_records(&self) -> Result<Vec<CommitRecord>> {
        let mut commits = Vec::new();
        for item in self.store.get_ingestion_items("commits", 10_000)? {
            let payload = &item.payload;
            let files = payload
                .get("files")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            commits.push(CommitRecord {
                hash: payload
                    .get("hash")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                author: payload
                    .get("author")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                author_email: payload
                    .get("authorEmail")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                date: payload
                    .get("date")
                    .and_then(|d| serde_json::from_value(d.clone()).ok())
                    .unwrap_or_else(Utc::now),
                message: payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                files,
                category: payload
                    .get("category")
                    .and_then(Value::as_str)
                    .map(|c| match c {
                        "bugfix" => CommitCategory::Bugfix,
                        "feature" => CommitCategory::Feature,
                        "refactor" => CommitCategory::Refactor,
                        "test" => CommitCategory::Test,
                        "docs" => CommitCategory::Docs,
                        "chore" => CommitCategory::Chore,
                        "perf" => CommitCategory::Perf,
                        "style" => CommitCategory::Style,
                        "revert" => CommitCategory::Revert,
                        _ => CommitCategory::Other,
                    })
                    .unwrap_or_default(),
                risk_score: payload
                    .get("riskScore")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0),
                summary: payload
                    .get("summary")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        Ok(commits)
    }

    fn phase_build_packs(&self, state: &mut RunState) -> Result<PhaseReport> {
        let builder = PackBuilder::new();
        let mut errors = Vec::new();
        let mut processed = 0u64;
        let mut failed = 0u64;

        let modules = self.store.get_modules(&ModuleFilter::default())?;
        let commits = self.load_commit_records()?;
        let fast = self.config.bootstrap.mode == BootstrapMode::Fast;

        for module in &modules {
            let functions = self.store.get_functions(&FunctionFilter {
                module_id: Some(module.id.clone()),
                ..Default::default()
            })?;

            // Fast mode only packs modules that actually export something
            if fast && module.exports.is_empty() && functions.is_empty() {
                continue;
            }

            match self.store.upsert_pack(&builder.module_pack(module, functions.len())) {
                Ok(()) => {
                    processed += 1;
                    state.packs_created += 1;
                }
                Err(e) => {
                    errors.push(e.to_string());
                    failed += 1;
                }
            }

            for function in &functions {
                match self
                    .store
                    .upsert_pack(&builder.function_pack(function, Some(module)))
                {
                    Ok(()) => {
                        processed += 1;
                        state.packs_created += 1;
                    }
                    Err(e) => {
                        errors.push(e.to_string());
                        failed += 1;
                    }
                }
            }

            let touching: Vec<&CommitRecord> = commits
                .iter()
                .filter(|c| c.files.iter().any(|f| f == &module.path))
                .collect();
            if let Some(pack) = builder.change_history_pack(module, &touching) {
                match self.store.upsert_pack(&pack) {
                    Ok(()) => {
                        processed += 1;
                        state.packs_created += 1;
                    }
                    Err(e) => {
                        errors.push(e.to_string());
                        failed += 1;
                    }
                }
            }
        }

        for item in self.store.get_ingestion_items("adrs", 1_000)? {
            if let Some(pack) = builder.decision_pack(&item) {
                match self.store.upsert_pack(&pack) {
                    Ok(()) => {
                        processed += 1;
                        state.packs_created += 1;
                    }
                    Err(e) => {
                        errors.push(e.to_string());
                        failed += 1;
                    }
                }
            }
        }

        // Ownership packs from ownership items
        for item in self.store.get_ingestion_items("ownership", 10_000)? {
            let Some(file) = item.payload.get("file").and_then(Value::as_str) else {
                continue;
            };
            let Some(module) = self.store.get_module_by_path(file)? else {
                continue;
            };
            let owners: Vec<(String, f64)> = item
                .payload
                .get("owners")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(|o| {
                            Some((
                                o.get("author")?.as_str()?.to_string(),
                                o.get("expertise")?.as_f64()?,
                            ))
                        })
                        .collect()
                })
                .unwrap_or_default();
            if let Some(pack) = builder.ownership_pack(&module, &owners) {
                match self.store.upsert_pack(&pack) {
                    Ok(()) => {
                        processed += 1;
                        state.packs_created += 1;
                    }
                    Err(e) => {
                        errors.push(e.to_string());
                        failed += 1;
                    }
                }
            }
        }

        Ok(PhaseReport {
            phase: BootstrapPhase::BuildContextPacks,
            duration_ms: 0,
            errors,
            items_processed: processed,
            items_failed: failed,
        })
    }

    fn phase_finalize(&self, state: &mut RunState) -> Result<PhaseReport> {
        let checksum = workspace_checksum(&self.config.workspace, &state.files);
        let tier = self.config.bootstrap.mode.target_tier();
        self.store.update_metadata(|metadata| {
            metadata.quality_tier = tier;
            metadata.last_bootstrap = Some(Utc::now());
            metadata.total_files = state.files.len() as u64;
            metadata.workspace_checksum = checksum.clone();
        })?;

        Ok(PhaseReport {
            phase: BootstrapPhase::Finalize,
            duration_ms: 0,
            errors: Vec::new(),
            items_processed: 1,
            items_failed: 0,
        })
    }

    /// Write the report JSON under `state/audits/bootstrap/`
    fn write_audit(&self, report: &BootstrapReport) {
        let dir = self.config.audit_dir("bootstrap");
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(error = %e, "could not create audit directory");
            return;
        }
        let file = dir.join(format!(
            "bootstrap-{}.json",
            report.started_at.format("%Y%m%dT%H%M%S")
        ));
        if let Ok(json) = serde_json::to_string_pretty(report) {
            if let Err(e) = std::fs::write(&file, json) {
                tracing::warn!(error = %e, "could not write bootstrap audit");
            }
        }
    }
}

/// One-line module purpose from its structure
fn module_purpose(structure: &FileStructure) -> String {
    // First documented symbol wins; otherwise summarise the exports
    if let Some(doc) = structure
        .symbols
        .iter()
        .find(|s| !s.doc.is_empty())
        .map(|s| s.doc.clone())
    {
        return doc;
    }
    let exports = structure.export_names();
    if exports.is_empty() {
        String::new()
    } else {
        format!("exports {}", exports.join(", "))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(dir: &Path) -> LibrarianConfig {
        LibrarianConfig::for_workspace(dir)
    }

    #[test]
    fn test_discover_honours_excludes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::create_dir_all(dir.path().join(".librarian")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "export const a = 1;").unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
        std::fs::write(dir.path().join(".librarian/librarian.db"), "x").unwrap();

        let files = discover_workspace_files(&config_for(dir.path())).unwrap();
        assert_eq!(files, vec!["src/a.ts"]);
    }

    #[test]
    fn test_discover_with_includes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let mut config = config_for(dir.path());
        config.bootstrap.include = vec!["src/**".to_string()];
        let files = discover_workspace_files(&config).unwrap();
        assert_eq!(files, vec!["src/a.ts"]);
    }

    #[test]
    fn test_discover_missing_workspace_fails() {
        let config = LibrarianConfig::for_workspace("/definitely/not/here");
        assert!(discover_workspace_files(&config).is_err());
    }

    #[test]
    fn test_workspace_checksum_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "one").unwrap();
        let files = vec!["a.ts".to_string()];
        let before = workspace_checksum(dir.path(), &files);

        std::fs::write(dir.path().join("a.ts"), "two-with-longer-content").unwrap();
        let after = workspace_checksum(dir.path(), &files);
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_bootstrap_empty_workspace_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KnowledgeStore::open_in_memory().unwrap());
        let bootstrapper = Bootstrapper::new(
            config_for(dir.path()),
            Arc::clone(&store),
            None,
            None,
            EventBus::default(),
        );

        let report = bootstrapper.run(CancelToken::new()).await.unwrap();
        assert!(report.success, "errors: {:?}", report.all_errors());
        assert_eq!(report.total_files_processed, 0);
        assert_eq!(report.total_functions_indexed, 0);
        assert!(store.get_last_bootstrap_report().unwrap().is_some());
        assert!(store.get_metadata().unwrap().last_bootstrap.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_bootstrap_persists_failed_report() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
        let store = Arc::new(KnowledgeStore::open_in_memory().unwrap());
        let bootstrapper = Bootstrapper::new(
            config_for(dir.path()),
            Arc::clone(&store),
            None,
            None,
            EventBus::default(),
        );

        let cancel = CancelToken::new();
        cancel.cancel();
        let report = bootstrapper.run(cancel).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("bootstrap cancelled"));
        let persisted = store.get_last_bootstrap_report().unwrap().unwrap();
        assert!(!persisted.success);
    }

    #[tokio::test]
    async fn test_is_bootstrap_required_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
        let store = Arc::new(KnowledgeStore::open_in_memory().unwrap());
        let config = config_for(dir.path());

        let requirement =
            is_bootstrap_required(&config, &store, QualityTier::Mvp).unwrap();
        assert!(requirement.required);

        let bootstrapper = Bootstrapper::new(
            config.clone(),
            Arc::clone(&store),
            None,
            None,
            EventBus::default(),
        );
        bootstrapper.run(CancelToken::new()).await.unwrap();

        let requirement =
            is_bootstrap_required(&config, &store, QualityTier::Mvp).unwrap();
        assert!(!requirement.required, "{}", requirement.reason);

        // Requesting a higher tier re-requires bootstrap
        let requirement =
            is_bootstrap_required(&config, &store, QualityTier::Full).unwrap();
        assert!(requirement.required);

        // Changing the workspace re-requires bootstrap
        std::fs::write(dir.path().join("b.ts"), "export const b = 2;").unwrap();
        let requirement =
            is_bootstrap_required(&config, &store, QualityTier::Mvp).unwrap();
        assert!(requirement.required);
    }
}
