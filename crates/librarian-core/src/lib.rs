//! # Librarian Core
//!
//! A local code-knowledge index: ingest a source repository, extract
//! structural and historical signals into a durable SQLite store with an
//! attached HNSW vector index, and answer natural-language intent queries
//! with ranked *context packs*.
//!
//! Four tightly coupled subsystems:
//!
//! - **Ingestion pipeline**: a registry of typed sources (symbols, docs,
//!   commits, blame, diffs, reflog, ownership, configs, dependencies,
//!   schemas, APIs, CI, security, ADRs, tests) run with per-source timeouts
//!   and revalidation
//! - **Knowledge store**: single-writer embedded relational+vector store
//!   with versioned migrations and crash-safe bootstrap checkpoints
//! - **Hybrid retriever**: lexical + vector + graph-proximity fusion with
//!   co-change boosting, dedup, and isotonic confidence calibration
//! - **Homeostasis loop**: MAPE-K control loop selecting recovery
//!   strategies with Thompson Sampling, with anti-pattern detection and
//!   persistent learning
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use librarian_core::prelude::*;
//! use std::sync::Arc;
//!
//! let config = LibrarianConfig::for_workspace("/path/to/repo");
//! let store = Arc::new(KnowledgeStore::open(config.db_path())?);
//!
//! // Index the workspace
//! let bootstrapper = Bootstrapper::new(
//!     config.clone(), Arc::clone(&store), None, None, EventBus::default(),
//! );
//! let report = bootstrapper.run(CancelToken::new()).await?;
//!
//! // Ask it questions
//! let retriever = Retriever::new(Arc::clone(&store), None, config.retrieval.clone());
//! let answer = retriever
//!     .query("How does rate limiting work?", QueryOptions::default())
//!     .await?;
//! ```
//!
//! The LLM and embedding models are *ports* (`LlmService`,
//! `EmbeddingService`); the crate ships no model execution. Without an
//! embedding service, semantic scoring degrades to zero weight; without an
//! LLM, summaries fall back to deterministic heuristics.

// ============================================================================
// MODULES
// ============================================================================

pub mod bootstrap;
pub mod cancel;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod events;
pub mod governor;
pub mod graph;
pub mod homeostasis;
pub mod ingest;
pub mod llm;
pub mod model;
pub mod packs;
pub mod preflight;
pub mod search;
pub mod storage;
pub mod suggest;
pub mod watch;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Errors
pub use error::{LibrarianError, Result};

// Configuration
pub use config::{
    BootstrapConfig, BootstrapMode, BootstrapScope, HomeostasisConfig, LibrarianConfig,
    LlmRequirement, ProviderDefaults, QualityTier, QueryConfig, QueryDepth, RetrievalGenotype,
    TriggerConfig, WatchConfig,
};

// Data model
pub use model::{
    BlameEntry, BootstrapPhase, BootstrapReport, ChangeCategory, CommitCategory, CommitRecord,
    ContextPack, DiffHunk, DiffRecord, EdgeSource, EdgeType, FunctionEntity, GraphEdge,
    IndexMetadata, IngestionItem, ItemMetadata, ModuleEntity, OutcomeHistory, PackOutcome,
    PackType, PhaseReport, ReflogAction, ReflogEntry, SymbolEntry, SymbolKind, SymbolVisibility,
    TaxonomyTag, WatchState,
};

// Storage layer
pub use storage::{
    EdgeQuery, FunctionFilter, KnowledgeStore, ModuleFilter, OrderDirection, PackFilter,
    StoreStats,
};

// Retrieval
pub use search::{
    IsotonicCalibrator, QueryOptions, QueryResponse, Retriever, UcRequirements, Uncertainty,
};

// Ingestion framework
pub use ingest::{
    run_sources, FileStructure, IngestContext, IngestionSource, RunnerOutput, SourceOutput,
    SourceRegistry, SourceRunSummary, SymbolExtractor,
};

// Bootstrap orchestrator
pub use bootstrap::{
    discover_workspace_files, is_bootstrap_required, workspace_checksum, BootstrapRequirement,
    Bootstrapper,
};

// Homeostasis
pub use homeostasis::{
    diagnose_degradation, ActionResult, CycleReport, DegradationKind, Diagnosis, HealthMonitor,
    HealthReport, HealthStatus, HealthTrigger, HomeostasisDaemon, LearnerState, RecoveryStrategy,
    ThompsonLearner,
};

// Watcher
pub use watch::{spawn_os_watcher, WatchService};

// Suggestions
pub use suggest::{
    detect_magic_numbers, Suggestion, SuggestionEffort, SuggestionRisk, SuggestionType,
};

// Preflight
pub use preflight::{
    run_preflight, Capability, CapabilityStatus, PreflightReport, ProviderPresence,
};

// Collaborator plumbing
pub use cancel::CancelToken;
pub use events::{Event, EventBus};
pub use governor::{BudgetLimits, GovernorContext};

// Ports
pub use embeddings::{cosine_similarity, Embedding, EmbeddingError, EmbeddingService};
pub use llm::{LlmError, LlmService, SummaryRequest};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        BootstrapReport, Bootstrapper, CancelToken, ContextPack, Event, EventBus, FunctionEntity,
        KnowledgeStore, LibrarianConfig, LibrarianError, ModuleEntity, QueryDepth, QueryOptions,
        QueryResponse, Result, Retriever, SymbolEntry,
    };

    pub use crate::{EmbeddingService, LlmService};

    pub use crate::{
        HealthTrigger, HomeostasisDaemon, RecoveryStrategy, ThompsonLearner, WatchService,
    };
}
