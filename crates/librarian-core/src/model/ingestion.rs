//! Ingestion items
//!
//! Content-addressed payloads produced by ingestion sources. Identical
//! payload hashes yield identical ids, making re-ingestion a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stable_id;

// ============================================================================
// TAXONOMY
// ============================================================================

/// Categorical tag identifying an item's subject
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyTag {
    /// Source code structure
    CodeStructure,
    /// Project documentation
    Documentation,
    /// Commit history
    CommitHistory,
    /// Line-level authorship
    CodeOwnership,
    /// Dependency manifests and lockfiles
    Dependencies,
    /// Database schemas
    DatabaseSchema,
    /// Runtime and build configuration
    Configuration,
    /// Test suites
    Tests,
    /// HTTP/GraphQL surfaces
    ApiSchemas,
    /// Architectural decision records
    Decisions,
    /// CI/CD pipelines
    CiPipelines,
    /// Security-sensitive configuration
    Security,
    /// Change diffs
    Diffs,
    /// Ref movement history
    Reflog,
    /// Domain vocabulary
    DomainModel,
    /// Team and process signals
    Process,
}

impl TaxonomyTag {
    /// Storage string form
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonomyTag::CodeStructure => "code_structure",
            TaxonomyTag::Documentation => "documentation",
            TaxonomyTag::CommitHistory => "commit_history",
            TaxonomyTag::CodeOwnership => "code_ownership",
            TaxonomyTag::Dependencies => "dependencies",
            TaxonomyTag::DatabaseSchema => "database_schema",
            TaxonomyTag::Configuration => "configuration",
            TaxonomyTag::Tests => "tests",
            TaxonomyTag::ApiSchemas => "api_schemas",
            TaxonomyTag::Decisions => "decisions",
            TaxonomyTag::CiPipelines => "ci_pipelines",
            TaxonomyTag::Security => "security",
            TaxonomyTag::Diffs => "diffs",
            TaxonomyTag::Reflog => "reflog",
            TaxonomyTag::DomainModel => "domain_model",
            TaxonomyTag::Process => "process",
        }
    }
}

// ============================================================================
// INGESTION ITEM
// ============================================================================

/// Metadata attached to every ingestion item
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    /// Content hash of the payload; drives idempotence
    pub hash: String,
    /// Subject tags
    #[serde(default)]
    pub taxonomy: Vec<TaxonomyTag>,
    /// Workspace-relative path the item was derived from, when file-backed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Free-form extras a source wants to carry
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One unit of ingested knowledge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionItem {
    /// Stable hash of `<source_type>:<metadata.hash>`
    pub id: String,
    /// Producing source type (e.g. `commits`, `docs`)
    pub source_type: String,
    /// Producing source version
    pub source_version: String,
    /// When this item was produced
    pub ingested_at: DateTime<Utc>,
    /// Structured payload, source-specific shape
    pub payload: serde_json::Value,
    /// Hash, taxonomy, and extras
    pub metadata: ItemMetadata,
}

impl IngestionItem {
    /// Build an item; the id is derived from source type and payload hash
    pub fn new(
        source_type: impl Into<String>,
        source_version: impl Into<String>,
        payload: serde_json::Value,
        metadata: ItemMetadata,
    ) -> Self {
        let source_type = source_type.into();
        Self {
            id: stable_id(&format!("{source_type}:{}", metadata.hash)),
            source_type,
            source_version: source_version.into(),
            ingested_at: Utc::now(),
            payload,
            metadata,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
