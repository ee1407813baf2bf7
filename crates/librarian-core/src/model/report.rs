//! Bootstrap reports and daemon bookkeeping
//!
//! The append-only audit trail of bootstrap runs, the index metadata
//! singleton, and the watcher's persisted heartbeat state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::QualityTier;

// ============================================================================
// BOOTSTRAP PHASES
// ============================================================================

/// Ordered phases of the bootstrap pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPhase {
    /// Enumerate workspace files honouring globs
    DiscoverFiles,
    /// Extract symbols; persist modules, functions, symbols
    ParseSymbols,
    /// Static imports/calls/references/contains edges
    BuildCodeGraph,
    /// All non-symbol ingestion sources
    RunIngestionSources,
    /// Embedding inputs, batched vector writes
    SemanticIndexing,
    /// Co-change, ownership, and test-mapping edges
    DeriveExtraEdges,
    /// Function/module/decision packs
    BuildContextPacks,
    /// Metadata and report
    Finalize,
}

impl BootstrapPhase {
    /// Every phase, in execution order
    pub fn all() -> &'static [BootstrapPhase] {
        &[
            BootstrapPhase::DiscoverFiles,
            BootstrapPhase::ParseSymbols,
            BootstrapPhase::BuildCodeGraph,
            BootstrapPhase::RunIngestionSources,
            BootstrapPhase::SemanticIndexing,
            BootstrapPhase::DeriveExtraEdges,
            BootstrapPhase::BuildContextPacks,
            BootstrapPhase::Finalize,
        ]
    }

    /// Storage string form
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapPhase::DiscoverFiles => "discover_files",
            BootstrapPhase::ParseSymbols => "parse_symbols",
            BootstrapPhase::BuildCodeGraph => "build_code_graph",
            BootstrapPhase::RunIngestionSources => "run_ingestion_sources",
            BootstrapPhase::SemanticIndexing => "semantic_indexing",
            BootstrapPhase::DeriveExtraEdges => "derive_extra_edges",
            BootstrapPhase::BuildContextPacks => "build_context_packs",
            BootstrapPhase::Finalize => "finalize",
        }
    }

    /// Parse the storage string form
    pub fn parse_name(s: &str) -> Option<Self> {
        BootstrapPhase::all()
            .iter()
            .copied()
            .find(|phase| phase.as_str() == s)
    }

    /// Phases whose failure aborts the whole bootstrap
    pub fn is_fatal(&self) -> bool {
        matches!(self, BootstrapPhase::DiscoverFiles | BootstrapPhase::Finalize)
    }
}

// ============================================================================
// REPORTS
// ============================================================================

/// Outcome of one phase
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    /// Which phase
    pub phase: BootstrapPhase,
    /// Wall-clock duration
    pub duration_ms: u64,
    /// Per-item and phase-level errors
    pub errors: Vec<String>,
    /// Items the phase processed
    pub items_processed: u64,
    /// Items the phase failed on
    pub items_failed: u64,
}

impl PhaseReport {
    /// Whether the error rate crossed the 50% failure threshold
    pub fn failed(&self) -> bool {
        let attempted = self.items_processed + self.items_failed;
        attempted > 0 && self.items_failed * 2 > attempted
    }
}

/// Audit record of one bootstrap run; append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapReport {
    /// Whether the run completed
    pub success: bool,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub completed_at: DateTime<Utc>,
    /// Per-phase outcomes in execution order
    pub phases: Vec<PhaseReport>,
    /// Files discovered and processed
    pub total_files_processed: u64,
    /// Functions indexed
    pub total_functions_indexed: u64,
    /// Context packs created
    pub total_context_packs_created: u64,
    /// Terminal error when the run failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BootstrapReport {
    /// Start a report at now
    pub fn begin() -> Self {
        let now = Utc::now();
        Self {
            success: false,
            started_at: now,
            completed_at: now,
            phases: Vec::new(),
            total_files_processed: 0,
            total_functions_indexed: 0,
            total_context_packs_created: 0,
            error: None,
        }
    }

    /// All errors across phases, prefixed with the phase name
    pub fn all_errors(&self) -> Vec<String> {
        self.phases
            .iter()
            .flat_map(|p| p.errors.iter().map(move |e| format!("[{}] {e}", p.phase.as_str())))
            .collect()
    }
}

// ============================================================================
// METADATA
// ============================================================================

/// Singleton describing the index as a whole
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMetadata {
    /// Schema/content version of the index
    pub version: u32,
    /// Tier the last bootstrap achieved
    pub quality_tier: QualityTier,
    /// Last completed bootstrap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_bootstrap: Option<DateTime<Utc>>,
    /// Last incremental indexing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_indexing: Option<DateTime<Utc>>,
    /// Files in the index
    pub total_files: u64,
    /// Embedding dimensionality, fixed at bootstrap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_dimensions: Option<usize>,
    /// Workspace checksum at last bootstrap
    #[serde(default)]
    pub workspace_checksum: String,
}

impl Default for IndexMetadata {
    fn default() -> Self {
        Self {
            version: 1,
            quality_tier: QualityTier::Mvp,
            last_bootstrap: None,
            last_indexing: None,
            total_files: 0,
            embedding_dimensions: None,
            workspace_checksum: String::new(),
        }
    }
}

// ============================================================================
// WATCH STATE
// ============================================================================

/// Persisted watcher heartbeat, used to detect dead watchers across restarts
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WatchState {
    /// When the watcher started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_started_at: Option<DateTime<Utc>>,
    /// Last heartbeat
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_last_heartbeat_at: Option<DateTime<Utc>>,
    /// Last change event observed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_last_event_at: Option<DateTime<Utc>>,
    /// Last successful incremental reindex
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_last_reindex_ok_at: Option<DateTime<Utc>>,
    /// Heartbeat stale: a restart should assume missed events
    #[serde(default)]
    pub suspected_dead: bool,
    /// Catch-up discovery required on next start
    #[serde(default)]
    pub needs_catchup: bool,
    /// Serialized watch config in effect
    #[serde(default)]
    pub effective_config: String,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_and_roundtrip() {
        let phases = BootstrapPhase::all();
        assert_eq!(phases.len(), 8);
        assert_eq!(phases[0], BootstrapPhase::DiscoverFiles);
        assert_eq!(phases[7], BootstrapPhase::Finalize);
        for phase in phases {
            assert_eq!(BootstrapPhase::parse_name(phase.as_str()), Some(*phase));
        }
    }

    #[test]
    fn test_fatal_phases() {
        assert!(BootstrapPhase::DiscoverFiles.is_fatal());
        assert!(BootstrapPhase::Finalize.is_fatal());
        assert!(!BootstrapPhase::SemanticIndexing.is_fatal());
    }

    #[test]
    fn test_phase_failure_threshold() {
        let report = PhaseReport {
            phase: BootstrapPhase::RunIngestionSources,
            duration_ms: 10,
            errors: vec![],
            items_processed: 4,
            items_failed: 6,
        };
        assert!(report.failed());

        let report = PhaseReport {
            items_processed: 5,
            items_failed: 5,
            ..report
        };
        assert!(!report.failed());
    }

    #[test]
    fn test_all_errors_prefixed() {
        let mut report = BootstrapReport::begin();
        report.phases.push(PhaseReport {
            phase: BootstrapPhase::ParseSymbols,
            duration_ms: 1,
            errors: vec!["bad file".to_string()],
            items_processed: 1,
            items_failed: 1,
        });
        assert_eq!(report.all_errors(), vec!["[parse_symbols] bad file".to_string()]);
    }
}
