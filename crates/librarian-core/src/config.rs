//! Configuration
//!
//! All tunables for bootstrap, retrieval, watching, and the homeostasis
//! daemon. Programmatic construction is primary; a `config.toml` under
//! `<workspace>/.librarian/` is honoured when present.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LibrarianError, Result};

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

/// Complete configuration for a librarian instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LibrarianConfig {
    /// Root directory of the workspace being indexed
    pub workspace: PathBuf,
    /// Bootstrap pipeline tuning
    pub bootstrap: BootstrapConfig,
    /// Retrieval scoring genotype
    pub retrieval: RetrievalGenotype,
    /// Default query behaviour
    pub query: QueryConfig,
    /// File watcher behaviour
    pub watch: WatchConfig,
    /// Homeostasis daemon tuning
    pub homeostasis: HomeostasisConfig,
}

impl Default for LibrarianConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            bootstrap: BootstrapConfig::default(),
            retrieval: RetrievalGenotype::default(),
            query: QueryConfig::default(),
            watch: WatchConfig::default(),
            homeostasis: HomeostasisConfig::default(),
        }
    }
}

impl LibrarianConfig {
    /// Create a config rooted at the given workspace
    pub fn for_workspace(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            ..Default::default()
        }
    }

    /// Load `<workspace>/.librarian/config.toml` if present, merging over
    /// defaults. Missing file is not an error.
    pub fn load(workspace: impl Into<PathBuf>) -> Result<Self> {
        let workspace = workspace.into();
        let path = workspace.join(".librarian").join("config.toml");
        if !path.exists() {
            return Ok(Self::for_workspace(workspace));
        }
        let raw = std::fs::read_to_string(&path)?;
        let mut config: LibrarianConfig = toml::from_str(&raw)
            .map_err(|e| LibrarianError::ValidationFailed(format!("config.toml: {e}")))?;
        config.workspace = workspace;
        Ok(config)
    }

    /// Database file location for this workspace
    pub fn db_path(&self) -> PathBuf {
        self.workspace.join(".librarian").join("librarian.db")
    }

    /// Audit directory for a category (`bootstrap`, `evolution`, `heal`)
    pub fn audit_dir(&self, category: &str) -> PathBuf {
        self.workspace.join("state").join("audits").join(category)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.bootstrap.force && self.bootstrap.force_resume {
            return Err(LibrarianError::InvalidArgument(
                "bootstrap.force and bootstrap.force_resume are mutually exclusive".to_string(),
            ));
        }
        self.retrieval.validate()?;
        Ok(())
    }
}

// ============================================================================
// BOOTSTRAP
// ============================================================================

/// Quality tier a bootstrap run targets or achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// Fast mode: semantic indexing and pack building only for hot modules
    #[default]
    Mvp,
    /// All phases, all modules
    Full,
}

impl QualityTier {
    /// String form used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Mvp => "mvp",
            QualityTier::Full => "full",
        }
    }

    /// Parse from the stored string, defaulting to mvp
    pub fn parse_name(s: &str) -> Self {
        match s {
            "full" => QualityTier::Full,
            _ => QualityTier::Mvp,
        }
    }
}

/// Bootstrap mode selecting the target quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapMode {
    /// Skip semantic indexing and pack building for low-priority modules
    #[default]
    Fast,
    /// Run every phase for every module
    Full,
}

impl BootstrapMode {
    /// Tier this mode produces
    pub fn target_tier(&self) -> QualityTier {
        match self {
            BootstrapMode::Fast => QualityTier::Mvp,
            BootstrapMode::Full => QualityTier::Full,
        }
    }
}

/// Indexing scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapScope {
    /// The whole workspace, honouring include/exclude globs
    #[default]
    Full,
    /// The project's own sources and markdown documentation
    Librarian,
}

/// Bootstrap pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BootstrapConfig {
    /// `fast` (mvp tier) or `full`
    pub mode: BootstrapMode,
    /// `full` or `librarian` (dog-food scope)
    pub scope: BootstrapScope,
    /// Include globs; empty means everything
    pub include: Vec<String>,
    /// Exclude globs; always augmented with `state/**` and `.librarian/**`
    pub exclude: Vec<String>,
    /// Discard all state and start over
    pub force: bool,
    /// Continue from the last successful phase checkpoint
    pub force_resume: bool,
    /// Per-source ingestion timeout in milliseconds
    pub source_timeout_ms: u64,
    /// Upper bound on commits walked by history sources
    pub max_commits: usize,
    /// Embedding batch size for semantic indexing
    pub embedding_batch_size: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            mode: BootstrapMode::Fast,
            scope: BootstrapScope::Full,
            include: Vec::new(),
            exclude: Vec::new(),
            force: false,
            force_resume: false,
            source_timeout_ms: 30_000,
            max_commits: 500,
            embedding_batch_size: 32,
        }
    }
}

impl BootstrapConfig {
    /// Exclude globs with the mandatory state directories appended
    pub fn effective_excludes(&self) -> Vec<String> {
        let mut excludes = self.exclude.clone();
        for mandatory in ["state/**", ".librarian/**", ".git/**", "node_modules/**"] {
            if !excludes.iter().any(|e| e == mandatory) {
                excludes.push(mandatory.to_string());
            }
        }
        excludes
    }

    /// Include globs for the configured scope
    pub fn effective_includes(&self) -> Vec<String> {
        if !self.include.is_empty() {
            return self.include.clone();
        }
        match self.scope {
            BootstrapScope::Full => Vec::new(),
            BootstrapScope::Librarian => vec![
                "src/**".to_string(),
                "crates/**".to_string(),
                "docs/**".to_string(),
                "*.md".to_string(),
            ],
        }
    }
}

// ============================================================================
// RETRIEVAL GENOTYPE
// ============================================================================

/// Scoring parameters for the hybrid retriever, exposed as an evolvable
/// genotype
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalGenotype {
    /// Weight of the inverted-index lexical score
    pub lexical_weight: f64,
    /// Weight of vector cosine similarity
    pub semantic_weight: f64,
    /// Weight of graph proximity
    pub graph_weight: f64,
    /// Boost multiplied into co-change edge weight
    pub co_change_boost: f64,
    /// Candidates scoring below this are dropped
    pub reranker_threshold: f64,
    /// BFS hop limit from affected files
    pub graph_expansion_depth: u32,
}

impl Default for RetrievalGenotype {
    fn default() -> Self {
        Self {
            lexical_weight: 0.25,
            semantic_weight: 0.35,
            graph_weight: 0.25,
            co_change_boost: 0.15,
            reranker_threshold: 0.15,
            graph_expansion_depth: 1,
        }
    }
}

impl RetrievalGenotype {
    /// All weights must be finite and non-negative
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("lexical_weight", self.lexical_weight),
            ("semantic_weight", self.semantic_weight),
            ("graph_weight", self.graph_weight),
            ("co_change_boost", self.co_change_boost),
            ("reranker_threshold", self.reranker_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(LibrarianError::InvariantViolation {
                    field: format!("retrieval.{field}"),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// QUERY
// ============================================================================

/// Query depth levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum QueryDepth {
    /// Directly targeted packs only, no graph expansion
    L0,
    /// One hop of graph expansion
    #[default]
    L1,
    /// Two hops, plus change-history packs
    L2,
    /// Expand until budget exhausted, plus ownership and decision packs
    L3,
}

impl QueryDepth {
    /// Vector search k for this depth
    pub fn semantic_k(&self) -> usize {
        match self {
            QueryDepth::L0 | QueryDepth::L1 => 50,
            QueryDepth::L2 => 100,
            QueryDepth::L3 => 200,
        }
    }

    /// Graph hops for this depth (L3 is bounded by the budget, not hops)
    pub fn graph_hops(&self) -> u32 {
        match self {
            QueryDepth::L0 => 0,
            QueryDepth::L1 => 1,
            QueryDepth::L2 => 2,
            QueryDepth::L3 => 4,
        }
    }
}

/// Whether the retriever may call the LLM for summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmRequirement {
    /// Use the LLM when configured
    #[default]
    Auto,
    /// Never call the LLM
    Disabled,
}

/// Default query behaviour
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryConfig {
    /// Default traversal depth
    pub depth: QueryDepth,
    /// LLM usage policy
    pub llm_requirement: LlmRequirement,
    /// Maximum packs returned per query
    pub max_packs: usize,
}

// ============================================================================
// WATCH
// ============================================================================

/// File watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchConfig {
    /// Debounce window for change batches
    pub debounce_ms: u64,
    /// Batch close window
    pub batch_window_ms: u64,
    /// Event count that flips a batch into catch-up mode
    pub storm_threshold: usize,
    /// Delay before cascade reindex of importers
    pub cascade_delay_ms: u64,
    /// Importers reindexed per cascade batch
    pub cascade_batch_size: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            batch_window_ms: 200,
            storm_threshold: 200,
            cascade_delay_ms: 1_000,
            cascade_batch_size: 16,
        }
    }
}

// ============================================================================
// HOMEOSTASIS
// ============================================================================

/// Health trigger tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerConfig {
    /// Scheduled health check interval
    pub interval_ms: u64,
    /// Query failures within the window that trigger a check
    pub query_failure_threshold: u32,
    /// Debounce for file-change triggered checks
    pub file_change_debounce_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 300_000,
            query_failure_threshold: 3,
            file_change_debounce_ms: 5_000,
        }
    }
}

/// Homeostasis daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HomeostasisConfig {
    /// Recovery actions allowed to run at once
    pub max_concurrent_actions: usize,
    /// Token budget per recovery cycle
    pub recovery_budget_tokens: u64,
    /// Trigger tuning
    pub trigger_config: TriggerConfig,
    /// Persist learner state after every cycle
    pub auto_save: bool,
}

impl Default for HomeostasisConfig {
    fn default() -> Self {
        Self {
            max_concurrent_actions: 3,
            recovery_budget_tokens: 50_000,
            trigger_config: TriggerConfig::default(),
            auto_save: true,
        }
    }
}

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Provider selection read from the environment. Selection only; execution
/// lives behind the service ports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDefaults {
    /// LLM provider name
    pub llm_provider: Option<String>,
    /// LLM model name
    pub llm_model: Option<String>,
    /// Embedding model name
    pub embedding_model: Option<String>,
}

impl ProviderDefaults {
    /// Read `LIBRARIAN_LLM_PROVIDER`, `LIBRARIAN_LLM_MODEL`, and
    /// `LIBRARIAN_EMBEDDING_MODEL`
    pub fn from_env() -> Self {
        Self {
            llm_provider: std::env::var("LIBRARIAN_LLM_PROVIDER").ok(),
            llm_model: std::env::var("LIBRARIAN_LLM_MODEL").ok(),
            embedding_model: std::env::var("LIBRARIAN_EMBEDDING_MODEL").ok(),
        }
    }
}

/// Check whether a path lives under the workspace root
pub fn is_within_workspace(workspace: &Path, path: &Path) -> bool {
    path.starts_with(workspace)
}

// ============================================================================
// TESTS
// ============================================================================
