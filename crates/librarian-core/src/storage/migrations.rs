//! Database Migrations
//!
//! Forward-only schema migrations for the knowledge store.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: modules, functions, symbols, edges, packs, embeddings",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Ingestion items, history records, daemon state, bootstrap reports",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "FTS5 lexical index over entities and packs",
        up: MIGRATION_V3_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Core entities and the code graph
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS modules (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    purpose TEXT NOT NULL DEFAULT '',
    exports TEXT NOT NULL DEFAULT '[]',
    dependencies TEXT NOT NULL DEFAULT '[]',
    confidence REAL NOT NULL DEFAULT 0.5,
    last_indexed TEXT NOT NULL,
    checksum TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_modules_path ON modules(path);
CREATE INDEX IF NOT EXISTS idx_modules_last_indexed ON modules(last_indexed);

CREATE TABLE IF NOT EXISTS functions (
    id TEXT PRIMARY KEY,
    module_id TEXT NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    start_line INTEGER NOT NULL DEFAULT 1,
    end_line INTEGER NOT NULL DEFAULT 1,
    signature TEXT NOT NULL DEFAULT '',
    purpose TEXT NOT NULL DEFAULT '',
    has_embedding INTEGER NOT NULL DEFAULT 0,
    confidence REAL NOT NULL DEFAULT 0.5,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT,
    validation_count INTEGER NOT NULL DEFAULT 0,
    outcome_successes INTEGER NOT NULL DEFAULT 0,
    outcome_failures INTEGER NOT NULL DEFAULT 0,
    CHECK (start_line <= end_line)
);

CREATE INDEX IF NOT EXISTS idx_functions_module ON functions(module_id);
CREATE INDEX IF NOT EXISTS idx_functions_name ON functions(name);
CREATE INDEX IF NOT EXISTS idx_functions_file ON functions(file_path);

CREATE TABLE IF NOT EXISTS symbols (
    qualified_name TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    file TEXT NOT NULL,
    line INTEGER NOT NULL,
    end_line INTEGER,
    parent TEXT,
    exported INTEGER NOT NULL DEFAULT 0,
    visibility TEXT NOT NULL DEFAULT 'public',
    is_async INTEGER NOT NULL DEFAULT 0,
    is_static INTEGER NOT NULL DEFAULT 0,
    decorators TEXT NOT NULL DEFAULT '[]',
    namespace TEXT,
    signature TEXT NOT NULL DEFAULT '',
    doc TEXT NOT NULL DEFAULT '',
    original_name TEXT,
    from_module TEXT,
    PRIMARY KEY (qualified_name, kind, line)
);

CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind);

CREATE TABLE IF NOT EXISTS graph_edges (
    from_id TEXT NOT NULL,
    to_id TEXT NOT NULL,
    edge_type TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 1.0,
    source TEXT NOT NULL DEFAULT 'static',
    PRIMARY KEY (from_id, to_id, edge_type)
);

CREATE INDEX IF NOT EXISTS idx_edges_from ON graph_edges(from_id);
CREATE INDEX IF NOT EXISTS idx_edges_to ON graph_edges(to_id);
CREATE INDEX IF NOT EXISTS idx_edges_type ON graph_edges(edge_type);

CREATE TABLE IF NOT EXISTS context_packs (
    pack_id TEXT PRIMARY KEY,
    pack_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    key_facts TEXT NOT NULL DEFAULT '[]',
    related_files TEXT NOT NULL DEFAULT '[]',
    confidence REAL NOT NULL DEFAULT 0.5,
    calibrated_confidence REAL,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_outcome TEXT NOT NULL DEFAULT 'unknown',
    invalidation_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_packs_target ON context_packs(target_id);
CREATE INDEX IF NOT EXISTS idx_packs_type ON context_packs(pack_type);

-- Embedding vectors as little-endian f32 blobs
CREATE TABLE IF NOT EXISTS embeddings (
    entity_id TEXT PRIMARY KEY,
    vector BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    model TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Ingestion items, history records, daemon bookkeeping
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS ingestion_items (
    id TEXT PRIMARY KEY,
    source_type TEXT NOT NULL,
    source_version TEXT NOT NULL,
    ingested_at TEXT NOT NULL,
    payload TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    taxonomy TEXT NOT NULL DEFAULT '[]',
    path TEXT,
    extra TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_items_source ON ingestion_items(source_type);
CREATE INDEX IF NOT EXISTS idx_items_hash ON ingestion_items(content_hash);
CREATE INDEX IF NOT EXISTS idx_items_path ON ingestion_items(path);

CREATE TABLE IF NOT EXISTS blame_entries (
    id TEXT PRIMARY KEY,
    file_path TEXT NOT NULL,
    line_start INTEGER NOT NULL,
    line_end INTEGER NOT NULL,
    author TEXT NOT NULL,
    author_email TEXT NOT NULL,
    commit_hash TEXT NOT NULL,
    commit_date TEXT NOT NULL,
    original_line INTEGER NOT NULL,
    indexed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blame_file ON blame_entries(file_path);
CREATE INDEX IF NOT EXISTS idx_blame_author ON blame_entries(author_email);

CREATE TABLE IF NOT EXISTS diff_records (
    id TEXT PRIMARY KEY,
    commit_hash TEXT NOT NULL,
    file_path TEXT NOT NULL,
    additions INTEGER NOT NULL DEFAULT 0,
    deletions INTEGER NOT NULL DEFAULT 0,
    hunk_count INTEGER NOT NULL DEFAULT 0,
    hunks TEXT NOT NULL DEFAULT '[]',
    change_category TEXT NOT NULL DEFAULT 'mixed',
    complexity REAL NOT NULL DEFAULT 0.0,
    impact_score REAL NOT NULL DEFAULT 0.0
);

CREATE INDEX IF NOT EXISTS idx_diffs_commit ON diff_records(commit_hash);
CREATE INDEX IF NOT EXISTS idx_diffs_file ON diff_records(file_path);

CREATE TABLE IF NOT EXISTS reflog_entries (
    id TEXT PRIMARY KEY,
    ref_name TEXT NOT NULL,
    commit_hash TEXT NOT NULL,
    action TEXT NOT NULL DEFAULT 'other',
    previous_commit TEXT,
    timestamp TEXT NOT NULL,
    message TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_reflog_action ON reflog_entries(action);

-- Opaque key-value for daemon state (learner, watch, provider defaults)
CREATE TABLE IF NOT EXISTS daemon_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Append-only bootstrap audit log
CREATE TABLE IF NOT EXISTS bootstrap_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    report TEXT NOT NULL,
    success INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Index metadata singleton (id always 1)
CREATE TABLE IF NOT EXISTS metadata (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL DEFAULT 1,
    quality_tier TEXT NOT NULL DEFAULT 'mvp',
    last_bootstrap TEXT,
    last_indexing TEXT,
    total_files INTEGER NOT NULL DEFAULT 0,
    embedding_dimensions INTEGER,
    workspace_checksum TEXT NOT NULL DEFAULT ''
);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// V3: FTS5 lexical index with porter stemming, kept in sync by triggers
const MIGRATION_V3_UP: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS entity_fts USING fts5(
    entity_id UNINDEXED,
    entity_type UNINDEXED,
    name,
    signature,
    purpose,
    summary,
    tokenize='porter ascii'
);

-- Functions feed the lexical index directly
CREATE TRIGGER IF NOT EXISTS functions_fts_ai AFTER INSERT ON functions BEGIN
    INSERT INTO entity_fts(entity_id, entity_type, name, signature, purpose, summary)
    VALUES (NEW.id, 'function', NEW.name, NEW.signature, NEW.purpose, '');
END;

CREATE TRIGGER IF NOT EXISTS functions_fts_ad AFTER DELETE ON functions BEGIN
    DELETE FROM entity_fts WHERE entity_id = OLD.id AND entity_type = 'function';
END;

CREATE TRIGGER IF NOT EXISTS functions_fts_au AFTER UPDATE ON functions BEGIN
    DELETE FROM entity_fts WHERE entity_id = OLD.id AND entity_type = 'function';
    INSERT INTO entity_fts(entity_id, entity_type, name, signature, purpose, summary)
    VALUES (NEW.id, 'function', NEW.name, NEW.signature, NEW.purpose, '');
END;

-- Modules index path and purpose
CREATE TRIGGER IF NOT EXISTS modules_fts_ai AFTER INSERT ON modules BEGIN
    INSERT INTO entity_fts(entity_id, entity_type, name, signature, purpose, summary)
    VALUES (NEW.id, 'module', NEW.path, '', NEW.purpose, '');
END;

CREATE TRIGGER IF NOT EXISTS modules_fts_ad AFTER DELETE ON modules BEGIN
    DELETE FROM entity_fts WHERE entity_id = OLD.id AND entity_type = 'module';
END;

CREATE TRIGGER IF NOT EXISTS modules_fts_au AFTER UPDATE ON modules BEGIN
    DELETE FROM entity_fts WHERE entity_id = OLD.id AND entity_type = 'module';
    INSERT INTO entity_fts(entity_id, entity_type, name, signature, purpose, summary)
    VALUES (NEW.id, 'module', NEW.path, '', NEW.purpose, '');
END;

-- Packs index their summaries under the pack target
CREATE TRIGGER IF NOT EXISTS packs_fts_ai AFTER INSERT ON context_packs BEGIN
    INSERT INTO entity_fts(entity_id, entity_type, name, signature, purpose, summary)
    VALUES (NEW.target_id, 'pack', '', '', '', NEW.summary);
END;

CREATE TRIGGER IF NOT EXISTS packs_fts_ad AFTER DELETE ON context_packs BEGIN
    DELETE FROM entity_fts WHERE entity_id = OLD.target_id AND entity_type = 'pack';
END;

CREATE TRIGGER IF NOT EXISTS packs_fts_au AFTER UPDATE ON context_packs BEGIN
    DELETE FROM entity_fts WHERE entity_id = OLD.target_id AND entity_type = 'pack';
    INSERT INTO entity_fts(entity_id, entity_type, name, signature, purpose, summary)
    VALUES (NEW.target_id, 'pack', '', '', '', NEW.summary);
END;

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_cleanly() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied as usize, MIGRATIONS.len());
        assert_eq!(get_current_version(&conn).unwrap(), MIGRATIONS.last().unwrap().version);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied, 0);
    }

    #[test]
    fn test_versions_strictly_increasing() {
        let mut last = 0;
        for migration in MIGRATIONS {
            assert!(migration.version > last);
            last = migration.version;
        }
    }
}
