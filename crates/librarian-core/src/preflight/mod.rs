//! Preflight
//!
//! Capability probe run before bootstrap or daemon start. Enforces the
//! per-source "LLM required" bits up front instead of at first use, and
//! reports a remediation sentence per failure.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::LibrarianConfig;
use crate::error::{LibrarianError, Result};
use crate::ingest::SourceRegistry;
use crate::storage::KnowledgeStore;

// ============================================================================
// REPORT TYPES
// ============================================================================

/// Probe outcome per capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityStatus {
    /// Fully available
    Ok,
    /// Missing but the system degrades gracefully
    Degraded,
    /// Missing and required
    Failed,
}

/// One probed capability
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    /// Capability name
    pub name: String,
    /// Probe outcome
    pub status: CapabilityStatus,
    /// What was observed
    pub detail: String,
    /// One sentence telling the operator what to do
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

/// Readiness report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightReport {
    /// Whether bootstrap may proceed
    pub ready: bool,
    /// Per-capability results
    pub capabilities: Vec<Capability>,
}

impl PreflightReport {
    /// Degraded (but not failed) capability names
    pub fn degraded(&self) -> Vec<&str> {
        self.capabilities
            .iter()
            .filter(|c| c.status == CapabilityStatus::Degraded)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Convert a failed report into the error the CLI maps to an exit code
    pub fn into_result(self) -> Result<PreflightReport> {
        if self.ready {
            return Ok(self);
        }
        let failed: Vec<String> = self
            .capabilities
            .iter()
            .filter(|c| c.status == CapabilityStatus::Failed)
            .map(|c| format!("{}: {}", c.name, c.detail))
            .collect();
        Err(LibrarianError::ProviderUnavailable(failed.join("; ")))
    }
}

// ============================================================================
// PROBE
// ============================================================================

/// Inputs the probe needs from the caller
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderPresence {
    /// An `EmbeddingService` is injected
    pub embedding: bool,
    /// An `LlmService` is injected
    pub llm: bool,
}

/// Run the capability probe
pub fn run_preflight(
    config: &LibrarianConfig,
    registry: &SourceRegistry,
    providers: ProviderPresence,
) -> PreflightReport {
    let mut capabilities = Vec::new();

    // Workspace
    capabilities.push(if config.workspace.is_dir() {
        Capability {
            name: "workspace".to_string(),
            status: CapabilityStatus::Ok,
            detail: config.workspace.display().to_string(),
            remediation: None,
        }
    } else {
        Capability {
            name: "workspace".to_string(),
            status: CapabilityStatus::Failed,
            detail: format!("{} is not a directory", config.workspace.display()),
            remediation: Some("Point --workspace at the repository root.".to_string()),
        }
    });

    // Git repository: absence degrades the history sources
    capabilities.push(if is_git_repo(&config.workspace) {
        Capability {
            name: "git".to_string(),
            status: CapabilityStatus::Ok,
            detail: "repository found".to_string(),
            remediation: None,
        }
    } else {
        Capability {
            name: "git".to_string(),
            status: CapabilityStatus::Degraded,
            detail: "no git repository; history sources will produce nothing".to_string(),
            remediation: Some("Run inside a git checkout for history signals.".to_string()),
        }
    });

    // Store: open + migrate must work
    capabilities.push(match KnowledgeStore::open(config.db_path()) {
        Ok(store) => {
            let detail = store
                .get_stats()
                .map(|s| format!("{} modules indexed", s.total_modules))
                .unwrap_or_else(|e| e.to_string());
            drop(store);
            Capability {
                name: "store".to_string(),
                status: CapabilityStatus::Ok,
                detail,
                remediation: None,
            }
        }
        Err(e) => Capability {
            name: "store".to_string(),
            status: CapabilityStatus::Failed,
            detail: e.to_string(),
            remediation: Some("Re-run bootstrap with force to rebuild the store.".to_string()),
        },
    });

    // Embedding port: absence degrades semantic retrieval
    capabilities.push(if providers.embedding {
        Capability {
            name: "embeddings".to_string(),
            status: CapabilityStatus::Ok,
            detail: "embedding service configured".to_string(),
            remediation: None,
        }
    } else {
        Capability {
            name: "embeddings".to_string(),
            status: CapabilityStatus::Degraded,
            detail: "no embedding service; semantic scoring weight drops to zero".to_string(),
            remediation: Some("Configure an embedding provider for semantic retrieval.".to_string()),
        }
    });

    // LLM port: failing only when a registered source requires it
    let llm_required: Vec<&str> = registry
        .sources()
        .iter()
        .filter(|s| s.requires_llm())
        .map(|s| s.source_type())
        .collect();
    capabilities.push(if providers.llm {
        Capability {
            name: "llm".to_string(),
            status: CapabilityStatus::Ok,
            detail: "llm service configured".to_string(),
            remediation: None,
        }
    } else if llm_required.is_empty() {
        Capability {
            name: "llm".to_string(),
            status: CapabilityStatus::Degraded,
            detail: "no llm service; summaries fall back to heuristics".to_string(),
            remediation: Some("Configure an LLM provider for richer summaries.".to_string()),
        }
    } else {
        Capability {
            name: "llm".to_string(),
            status: CapabilityStatus::Failed,
            detail: format!(
                "sources requiring an llm are registered: {}",
                llm_required.join(", ")
            ),
            remediation: Some("Configure an LLM provider or unregister those sources.".to_string()),
        }
    });

    let ready = !capabilities
        .iter()
        .any(|c| c.status == CapabilityStatus::Failed);
    PreflightReport { ready, capabilities }
}

fn is_git_repo(workspace: &Path) -> bool {
    git2::Repository::open(workspace).is_ok()
}

// ============================================================================
// TESTS
// ============================================================================
