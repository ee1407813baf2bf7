//! Storage Module
//!
//! SQLite-based knowledge store with:
//! - FTS5 full-text search with query sanitization
//! - Embedded vector storage hydrated into an HNSW index
//! - Versioned forward-only migrations
//! - Opaque daemon-state key-value and bootstrap audit log

mod migrations;
mod store;

pub use migrations::{apply_migrations, get_current_version, MIGRATIONS};
pub use store::{
    EdgeQuery, FunctionFilter, KnowledgeStore, ModuleFilter, OrderDirection, PackFilter,
    StoreStats,
};
