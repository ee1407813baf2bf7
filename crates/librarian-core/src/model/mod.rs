//! Data Model
//!
//! Entities stored in the knowledge store: modules, functions, symbols,
//! graph edges, context packs, ingestion items, history records, and the
//! bootstrap/daemon bookkeeping types.

mod entity;
mod graph;
mod history;
mod ingestion;
mod pack;
mod report;
mod symbol;

pub use entity::{FunctionEntity, ModuleEntity, OutcomeHistory};
pub use graph::{EdgeSource, EdgeType, GraphEdge};
pub use history::{
    BlameEntry, ChangeCategory, CommitCategory, CommitRecord, DiffHunk, DiffRecord, ReflogAction,
    ReflogEntry,
};
pub use ingestion::{IngestionItem, ItemMetadata, TaxonomyTag};
pub use pack::{ContextPack, PackOutcome, PackType};
pub use report::{BootstrapPhase, BootstrapReport, IndexMetadata, PhaseReport, WatchState};
pub use symbol::{qualified_name, SymbolEntry, SymbolKind, SymbolVisibility};

use sha2::{Digest, Sha256};

/// Stable content-addressed identifier: hex SHA-256 truncated to 32 chars.
///
/// Used for module ids (hashed path), blame chunk keys, and ingestion item
/// ids so re-runs over unchanged inputs produce identical ids.
pub fn stable_id(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..32].to_string()
}

/// Full-length hex SHA-256, for content checksums
pub fn content_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_id_deterministic() {
        assert_eq!(stable_id("src/auth/token.ts"), stable_id("src/auth/token.ts"));
        assert_ne!(stable_id("src/a.ts"), stable_id("src/b.ts"));
        assert_eq!(stable_id("anything").len(), 32);
    }

    #[test]
    fn test_content_hash_full_length() {
        assert_eq!(content_hash("x").len(), 64);
    }
}
