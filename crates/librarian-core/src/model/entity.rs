//! Modules and functions
//!
//! One `ModuleEntity` per source file; `FunctionEntity` is the retrieval
//! projection of callable symbols, carrying its own confidence and outcome
//! history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::symbol::qualified_name;
use super::stable_id;

// ============================================================================
// MODULE
// ============================================================================

/// A source file and its extracted summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleEntity {
    /// Stable hash of the workspace-relative path
    pub id: String,
    /// Workspace-relative path
    pub path: String,
    /// One-sentence purpose, heuristic or LLM-derived
    pub purpose: String,
    /// Exported symbol names, in declaration order
    pub exports: Vec<String>,
    /// Module ids this module imports
    pub dependencies: Vec<String>,
    /// Evidence confidence in [0, 1]
    pub confidence: f64,
    /// Last time ingestion touched this module
    pub last_indexed: DateTime<Utc>,
    /// Content checksum of the source file
    pub checksum: String,
}

impl ModuleEntity {
    /// Build a module for a workspace-relative path
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id: stable_id(&path),
            path,
            purpose: String::new(),
            exports: Vec::new(),
            dependencies: Vec::new(),
            confidence: 0.5,
            last_indexed: Utc::now(),
            checksum: String::new(),
        }
    }

    /// Module id for a path without constructing the entity
    pub fn id_for_path(path: &str) -> String {
        stable_id(path)
    }
}

// ============================================================================
// FUNCTION
// ============================================================================

/// Success/failure counters observed for retrievals that surfaced an entity
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeHistory {
    /// Retrievals later confirmed useful
    pub successes: u64,
    /// Retrievals later reported unhelpful
    pub failures: u64,
}

impl OutcomeHistory {
    /// Empirical success rate; 0.5 prior when unobserved
    pub fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            0.5
        } else {
            self.successes as f64 / total as f64
        }
    }

    /// Total observations
    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }
}

/// A callable extracted from a module
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionEntity {
    /// Stable hash of the qualified name
    /// (`<path-without-extension>:<name>`)
    pub id: String,
    /// Owning module
    pub module_id: String,
    /// Bare name (`bar` for `Foo.bar`)
    pub name: String,
    /// Workspace-relative file path
    pub file_path: String,
    /// 1-indexed start line
    pub start_line: u32,
    /// 1-indexed end line, >= start_line
    pub end_line: u32,
    /// Source signature text
    pub signature: String,
    /// One-sentence purpose
    pub purpose: String,
    /// Whether an embedding vector is stored for this function
    pub has_embedding: bool,
    /// Evidence confidence in [0, 1]
    pub confidence: f64,
    /// Times this function was returned by a query
    pub access_count: u64,
    /// Last retrieval timestamp
    pub last_accessed: Option<DateTime<Utc>>,
    /// Times revalidated against the source since extraction
    pub validation_count: u64,
    /// Retrieval outcome counters
    pub outcome_history: OutcomeHistory,
}

impl FunctionEntity {
    /// Build a function entity under a module; `qualified` is the
    /// in-module name (`bar` or `Foo.bar`)
    pub fn new(
        module_path: &str,
        module_id: impl Into<String>,
        qualified: &str,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: stable_id(&qualified_name(module_path, qualified)),
            module_id: module_id.into(),
            name: name.into(),
            file_path: module_path.to_string(),
            start_line: 1,
            end_line: 1,
            signature: String::new(),
            purpose: String::new(),
            has_embedding: false,
            confidence: 0.5,
            access_count: 0,
            last_accessed: None,
            validation_count: 0,
            outcome_history: OutcomeHistory::default(),
        }
    }

    /// Text fed to the embedding service: signature, purpose, call context
    pub fn embedding_input(&self) -> String {
        let mut parts = vec![self.signature.clone()];
        if !self.purpose.is_empty() {
            parts.push(self.purpose.clone());
        }
        parts.push(format!("in {}", self.file_path));
        parts.join("\n")
    }
}

// ============================================================================
// TESTS
// ============================================================================
