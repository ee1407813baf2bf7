//! Knowledge Store
//!
//! Single-writer embedded store over SQLite with an attached HNSW vector
//! index. Separate writer/reader connections give interior mutability: all
//! methods take `&self`, so callers share the store behind an `Arc`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::embeddings::Embedding;
use crate::error::{LibrarianError, Result};
use crate::model::{
    BlameEntry, BootstrapReport, ContextPack, DiffRecord, EdgeSource, EdgeType, FunctionEntity,
    GraphEdge, IndexMetadata, IngestionItem, ItemMetadata, ModuleEntity, OutcomeHistory,
    PackOutcome, PackType, ReflogEntry, SymbolEntry, SymbolKind, SymbolVisibility,
};
use crate::search::lexical::sanitize_fts_query;
use crate::search::vector::{VectorIndex, VectorIndexConfig};

use super::migrations;

// ============================================================================
// FILTERS
// ============================================================================

/// Sort direction for paginated getters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

impl OrderDirection {
    fn sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Filter for `get_modules`
#[derive(Debug, Clone, Default)]
pub struct ModuleFilter {
    /// Restrict to paths under this prefix
    pub path_prefix: Option<String>,
    /// Minimum confidence
    pub min_confidence: Option<f64>,
    /// Column to order by (`path`, `confidence`, `last_indexed`)
    pub order_by: Option<String>,
    /// Sort direction
    pub order_direction: OrderDirection,
    /// Page size
    pub limit: Option<usize>,
    /// Page offset
    pub offset: usize,
}

/// Filter for `get_functions`
#[derive(Debug, Clone, Default)]
pub struct FunctionFilter {
    /// Restrict to one module
    pub module_id: Option<String>,
    /// Exact name match
    pub name: Option<String>,
    /// Restrict to one file
    pub file_path: Option<String>,
    /// Page size
    pub limit: Option<usize>,
    /// Page offset
    pub offset: usize,
}

/// Filter for `get_context_packs`
#[derive(Debug, Clone, Default)]
pub struct PackFilter {
    /// Restrict to one pack type
    pub pack_type: Option<PackType>,
    /// Restrict to these targets
    pub target_ids: Option<Vec<String>>,
    /// Page size
    pub limit: Option<usize>,
}

/// Set-based edge query
#[derive(Debug, Clone, Default)]
pub struct EdgeQuery {
    /// Edges leaving any of these ids
    pub from_ids: Option<Vec<String>>,
    /// Edges entering any of these ids
    pub to_ids: Option<Vec<String>>,
    /// Restrict to these edge types
    pub edge_types: Option<Vec<EdgeType>>,
    /// Cap on rows returned
    pub limit: Option<usize>,
}

/// Aggregate counts and sizes
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Modules in the index
    pub total_modules: u64,
    /// Functions in the index
    pub total_functions: u64,
    /// Symbols in the index
    pub total_symbols: u64,
    /// Graph edges
    pub total_edges: u64,
    /// Context packs
    pub total_packs: u64,
    /// Ingestion items
    pub total_items: u64,
    /// Stored embedding vectors
    pub total_vectors: u64,
    /// Mean pack confidence
    pub average_confidence: f64,
    /// Database file size in bytes
    pub storage_bytes: u64,
}

// ============================================================================
// KNOWLEDGE STORE
// ============================================================================

/// The embedded relational+vector store.
///
/// One writer, many readers: writes serialise behind the writer mutex;
/// readers run against the WAL snapshot.
pub struct KnowledgeStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    vector_index: Mutex<Option<VectorIndex>>,
    path: Option<PathBuf>,
}

impl KnowledgeStore {
    /// Apply performance pragmas shared by both connections
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store at `path`, applying migrations.
    ///
    /// Safe to call repeatedly; a schema that cannot be migrated surfaces as
    /// `StorageCorrupt`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        migrations::apply_migrations(&writer_conn)
            .map_err(|e| LibrarianError::StorageCorrupt(format!("migration failed: {e}")))?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        let store = Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            vector_index: Mutex::new(None),
            path: Some(path),
        };
        store.hydrate_vector_index()?;
        Ok(store)
    }

    /// In-memory store for tests and throwaway runs
    pub fn open_in_memory() -> Result<Self> {
        // A shared-cache URI lets writer and reader see one database
        let uri = format!(
            "file:librarian-mem-{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4()
        );
        let flags = rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
            | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
            | rusqlite::OpenFlags::SQLITE_OPEN_URI;
        let writer_conn = Connection::open_with_flags(&uri, flags)?;
        writer_conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::apply_migrations(&writer_conn)
            .map_err(|e| LibrarianError::StorageCorrupt(format!("migration failed: {e}")))?;
        let reader_conn = Connection::open_with_flags(&uri, flags)?;
        reader_conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            vector_index: Mutex::new(None),
            path: None,
        })
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| LibrarianError::StorageCorrupt("writer lock poisoned".to_string()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| LibrarianError::StorageCorrupt("reader lock poisoned".to_string()))
    }

    /// Release file locks. The store refuses further use after close.
    pub fn close(self) -> Result<()> {
        // Dropping the connections checkpoints WAL and releases locks
        Ok(())
    }

    // ========================================================================
    // MODULES
    // ========================================================================

    /// Insert or update a module. Unchanged checksum is a no-op that leaves
    /// `last_indexed` untouched.
    pub fn upsert_module(&self, module: &ModuleEntity) -> Result<()> {
        validate_unit_interval("module.confidence", module.confidence)?;

        let writer = self.writer()?;
        let existing: Option<String> = writer
            .query_row(
                "SELECT checksum FROM modules WHERE id = ?1",
                params![module.id],
                |row| row.get(0),
            )
            .optional()?;

        if existing.as_deref() == Some(module.checksum.as_str()) && !module.checksum.is_empty() {
            return Ok(());
        }

        writer.execute(
            "INSERT INTO modules (id, path, purpose, exports, dependencies, confidence, last_indexed, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                 purpose = excluded.purpose,
                 exports = excluded.exports,
                 dependencies = excluded.dependencies,
                 confidence = excluded.confidence,
                 last_indexed = excluded.last_indexed,
                 checksum = excluded.checksum",
            params![
                module.id,
                module.path,
                module.purpose,
                serde_json::to_string(&module.exports)?,
                serde_json::to_string(&module.dependencies)?,
                module.confidence,
                module.last_indexed,
                module.checksum,
            ],
        )?;
        Ok(())
    }

    /// Fetch a module by id
    pub fn get_module(&self, id: &str) -> Result<Option<ModuleEntity>> {
        let reader = self.reader()?;
        let module = reader
            .query_row(
                "SELECT id, path, purpose, exports, dependencies, confidence, last_indexed, checksum
                 FROM modules WHERE id = ?1",
                params![id],
                row_to_module,
            )
            .optional()?;
        Ok(module)
    }

    /// Fetch a module by workspace-relative path
    pub fn get_module_by_path(&self, path: &str) -> Result<Option<ModuleEntity>> {
        let reader = self.reader()?;
        let module = reader
            .query_row(
                "SELECT id, path, purpose, exports, dependencies, confidence, last_indexed, checksum
                 FROM modules WHERE path = ?1",
                params![path],
                row_to_module,
            )
            .optional()?;
        Ok(module)
    }

    /// List modules matching a filter
    pub fn get_modules(&self, filter: &ModuleFilter) -> Result<Vec<ModuleEntity>> {
        let order_column = match filter.order_by.as_deref() {
            Some("confidence") => "confidence",
            Some("last_indexed") => "last_indexed",
            _ => "path",
        };
        let sql = format!(
            "SELECT id, path, purpose, exports, dependencies, confidence, last_indexed, checksum
             FROM modules
             WHERE (?1 IS NULL OR path LIKE ?1 || '%')
               AND (?2 IS NULL OR confidence >= ?2)
             ORDER BY {order_column} {}
             LIMIT ?3 OFFSET ?4",
            filter.order_direction.sql()
        );
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                filter.path_prefix,
                filter.min_confidence,
                filter.limit.map(|l| l as i64).unwrap_or(-1),
                filter.offset as i64,
            ],
            row_to_module,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Replace a module's resolved dependency list without touching its
    /// checksum or `last_indexed`
    pub fn set_module_dependencies(&self, id: &str, dependencies: &[String]) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "UPDATE modules SET dependencies = ?2 WHERE id = ?1",
            params![id, serde_json::to_string(dependencies)?],
        )?;
        Ok(())
    }

    /// Delete a module and everything hanging off it: functions, their
    /// embeddings, symbols in the file, and packs targeting module or
    /// functions.
    pub fn delete_module(&self, id: &str) -> Result<bool> {
        let Some(module) = self.get_module(id)? else {
            return Ok(false);
        };

        let function_ids: Vec<String> = {
            let reader = self.reader()?;
            let mut stmt = reader.prepare("SELECT id FROM functions WHERE module_id = ?1")?;
            let ids = stmt
                .query_map(params![id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            ids
        };

        {
            let writer = self.writer()?;
            let tx_ids: Vec<&str> = function_ids.iter().map(String::as_str).collect();
            for chunk in tx_ids.chunks(256) {
                let placeholders = vec!["?"; chunk.len()].join(",");
                writer.execute(
                    &format!("DELETE FROM embeddings WHERE entity_id IN ({placeholders})"),
                    rusqlite::params_from_iter(chunk.iter()),
                )?;
                writer.execute(
                    &format!("DELETE FROM context_packs WHERE target_id IN ({placeholders})"),
                    rusqlite::params_from_iter(chunk.iter()),
                )?;
            }
            writer.execute("DELETE FROM embeddings WHERE entity_id = ?1", params![id])?;
            writer.execute("DELETE FROM context_packs WHERE target_id = ?1", params![id])?;
            writer.execute("DELETE FROM symbols WHERE file = ?1", params![module.path])?;
            writer.execute(
                "DELETE FROM graph_edges WHERE from_id = ?1 OR to_id = ?1",
                params![id],
            )?;
            // Functions cascade via the FK
            writer.execute("DELETE FROM modules WHERE id = ?1", params![id])?;
        }

        let mut index_guard = self
            .vector_index
            .lock()
            .map_err(|_| LibrarianError::StorageCorrupt("vector index lock poisoned".to_string()))?;
        if let Some(index) = index_guard.as_mut() {
            let _ = index.remove(id);
            for function_id in &function_ids {
                let _ = index.remove(function_id);
            }
        }

        Ok(true)
    }

    // ========================================================================
    // FUNCTIONS
    // ========================================================================

    /// Insert or update a function
    pub fn upsert_function(&self, function: &FunctionEntity) -> Result<()> {
        validate_unit_interval("function.confidence", function.confidence)?;
        if function.start_line > function.end_line {
            return Err(LibrarianError::InvariantViolation {
                field: "function.start_line".to_string(),
                value: format!("{} > end_line {}", function.start_line, function.end_line),
            });
        }

        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO functions (
                 id, module_id, name, file_path, start_line, end_line, signature, purpose,
                 has_embedding, confidence, access_count, last_accessed, validation_count,
                 outcome_successes, outcome_failures
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 file_path = excluded.file_path,
                 start_line = excluded.start_line,
                 end_line = excluded.end_line,
                 signature = excluded.signature,
                 purpose = excluded.purpose,
                 has_embedding = excluded.has_embedding,
                 confidence = excluded.confidence,
                 validation_count = excluded.validation_count,
                 -- access and outcome counters only move forward
                 access_count = MAX(functions.access_count, excluded.access_count),
                 outcome_successes = MAX(functions.outcome_successes, excluded.outcome_successes),
                 outcome_failures = MAX(functions.outcome_failures, excluded.outcome_failures)",
            params![
                function.id,
                function.module_id,
                function.name,
                function.file_path,
                function.start_line,
                function.end_line,
                function.signature,
                function.purpose,
                function.has_embedding as i64,
                function.confidence,
                function.access_count as i64,
                function.last_accessed,
                function.validation_count as i64,
                function.outcome_history.successes as i64,
                function.outcome_history.failures as i64,
            ],
        )?;
        Ok(())
    }

    /// Fetch a function by id
    pub fn get_function(&self, id: &str) -> Result<Option<FunctionEntity>> {
        let reader = self.reader()?;
        let function = reader
            .query_row(
                &format!("{FUNCTION_SELECT} WHERE id = ?1"),
                params![id],
                row_to_function,
            )
            .optional()?;
        Ok(function)
    }

    /// List functions matching a filter
    pub fn get_functions(&self, filter: &FunctionFilter) -> Result<Vec<FunctionEntity>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "{FUNCTION_SELECT}
             WHERE (?1 IS NULL OR module_id = ?1)
               AND (?2 IS NULL OR name = ?2)
               AND (?3 IS NULL OR file_path = ?3)
             ORDER BY file_path, start_line
             LIMIT ?4 OFFSET ?5"
        ))?;
        let rows = stmt.query_map(
            params![
                filter.module_id,
                filter.name,
                filter.file_path,
                filter.limit.map(|l| l as i64).unwrap_or(-1),
                filter.offset as i64,
            ],
            row_to_function,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Record that queries surfaced these functions
    pub fn record_function_access(&self, ids: &[String]) -> Result<()> {
        let writer = self.writer()?;
        let now = Utc::now();
        for id in ids {
            writer.execute(
                "UPDATE functions SET access_count = access_count + 1, last_accessed = ?2 WHERE id = ?1",
                params![id, now],
            )?;
        }
        Ok(())
    }

    /// Record retrieval feedback for an entity; counters never decrease
    pub fn record_outcome(&self, entity_id: &str, success: bool) -> Result<()> {
        let writer = self.writer()?;
        let column = if success { "outcome_successes" } else { "outcome_failures" };
        writer.execute(
            &format!("UPDATE functions SET {column} = {column} + 1 WHERE id = ?1"),
            params![entity_id],
        )?;
        let outcome = if success { PackOutcome::Success } else { PackOutcome::Failure };
        writer.execute(
            "UPDATE context_packs SET last_outcome = ?2 WHERE target_id = ?1",
            params![entity_id, outcome.as_str()],
        )?;
        Ok(())
    }

    // ========================================================================
    // SYMBOLS
    // ========================================================================

    /// Replace the symbols of a file with a fresh extraction
    pub fn replace_symbols(&self, file: &str, symbols: &[SymbolEntry]) -> Result<()> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        tx.execute("DELETE FROM symbols WHERE file = ?1", params![file])?;
        for symbol in symbols {
            tx.execute(
                "INSERT OR REPLACE INTO symbols (
                     qualified_name, name, kind, file, line, end_line, parent, exported,
                     visibility, is_async, is_static, decorators, namespace, signature, doc,
                     original_name, from_module
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    symbol.qualified_name,
                    symbol.name,
                    symbol.kind.as_str(),
                    symbol.file,
                    symbol.line,
                    symbol.end_line,
                    symbol.parent,
                    symbol.exported as i64,
                    match symbol.visibility {
                        SymbolVisibility::Public => "public",
                        SymbolVisibility::Private => "private",
                        SymbolVisibility::Protected => "protected",
                    },
                    symbol.is_async as i64,
                    symbol.is_static as i64,
                    serde_json::to_string(&symbol.decorators)?,
                    symbol.namespace,
                    symbol.signature,
                    symbol.doc,
                    symbol.original_name,
                    symbol.from_module,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Symbols extracted from one file
    pub fn get_symbols_for_file(&self, file: &str) -> Result<Vec<SymbolEntry>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT qualified_name, name, kind, file, line, end_line, parent, exported,
                    visibility, is_async, is_static, decorators, namespace, signature, doc,
                    original_name, from_module
             FROM symbols WHERE file = ?1 ORDER BY line",
        )?;
        let rows = stmt.query_map(params![file], row_to_symbol)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Total symbol count
    pub fn count_symbols(&self) -> Result<u64> {
        let reader = self.reader()?;
        let count: i64 = reader.query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ========================================================================
    // GRAPH EDGES
    // ========================================================================

    /// Insert or strengthen an edge. `(from, to, type)` is the identity;
    /// weight only ratchets upward.
    pub fn upsert_edge(&self, edge: &GraphEdge) -> Result<()> {
        validate_unit_interval("edge.weight", edge.weight)?;
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO graph_edges (from_id, to_id, edge_type, weight, source)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(from_id, to_id, edge_type) DO UPDATE SET
                 weight = MAX(graph_edges.weight, excluded.weight),
                 source = excluded.source",
            params![
                edge.from_id,
                edge.to_id,
                edge.edge_type.as_str(),
                edge.weight,
                edge.source.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Set-based edge traversal
    pub fn get_graph_edges(&self, query: &EdgeQuery) -> Result<Vec<GraphEdge>> {
        let mut sql = String::from(
            "SELECT from_id, to_id, edge_type, weight, source FROM graph_edges WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(from_ids) = &query.from_ids {
            if from_ids.is_empty() {
                return Ok(Vec::new());
            }
            sql.push_str(&format!(
                " AND from_id IN ({})",
                vec!["?"; from_ids.len()].join(",")
            ));
            for id in from_ids {
                args.push(Box::new(id.clone()));
            }
        }
        if let Some(to_ids) = &query.to_ids {
            if to_ids.is_empty() {
                return Ok(Vec::new());
            }
            sql.push_str(&format!(
                " AND to_id IN ({})",
                vec!["?"; to_ids.len()].join(",")
            ));
            for id in to_ids {
                args.push(Box::new(id.clone()));
            }
        }
        if let Some(edge_types) = &query.edge_types {
            sql.push_str(&format!(
                " AND edge_type IN ({})",
                vec!["?"; edge_types.len()].join(",")
            ));
            for edge_type in edge_types {
                args.push(Box::new(edge_type.as_str().to_string()));
            }
        }
        sql.push_str(" ORDER BY weight DESC, from_id, to_id");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let refs: Vec<&dyn rusqlite::types::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let rows = stmt.query_map(refs.as_slice(), row_to_edge)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // ========================================================================
    // CONTEXT PACKS
    // ========================================================================

    /// Insert or update a pack; `access_count` never moves backwards
    pub fn upsert_pack(&self, pack: &ContextPack) -> Result<()> {
        validate_unit_interval("pack.confidence", pack.confidence)?;
        if let Some(calibrated) = pack.calibrated_confidence {
            validate_unit_interval("pack.calibrated_confidence", calibrated)?;
        }

        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO context_packs (
                 pack_id, pack_type, target_id, summary, key_facts, related_files,
                 confidence, calibrated_confidence, access_count, last_outcome, invalidation_reason
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(pack_id) DO UPDATE SET
                 summary = excluded.summary,
                 key_facts = excluded.key_facts,
                 related_files = excluded.related_files,
                 confidence = excluded.confidence,
                 calibrated_confidence = excluded.calibrated_confidence,
                 access_count = MAX(context_packs.access_count, excluded.access_count),
                 last_outcome = excluded.last_outcome,
                 invalidation_reason = excluded.invalidation_reason",
            params![
                pack.pack_id,
                pack.pack_type.as_str(),
                pack.target_id,
                pack.summary,
                serde_json::to_string(&pack.key_facts)?,
                serde_json::to_string(&pack.related_files)?,
                pack.confidence,
                pack.calibrated_confidence,
                pack.access_count as i64,
                pack.last_outcome.as_str(),
                pack.invalidation_reason,
            ],
        )?;
        Ok(())
    }

    /// Fetch one pack
    pub fn get_pack(&self, pack_id: &str) -> Result<Option<ContextPack>> {
        let reader = self.reader()?;
        let pack = reader
            .query_row(
                &format!("{PACK_SELECT} WHERE pack_id = ?1"),
                params![pack_id],
                row_to_pack,
            )
            .optional()?;
        Ok(pack)
    }

    /// List packs matching a filter
    pub fn get_context_packs(&self, filter: &PackFilter) -> Result<Vec<ContextPack>> {
        let mut sql = format!("{PACK_SELECT} WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(pack_type) = filter.pack_type {
            sql.push_str(" AND pack_type = ?");
            args.push(Box::new(pack_type.as_str().to_string()));
        }
        if let Some(target_ids) = &filter.target_ids {
            if target_ids.is_empty() {
                return Ok(Vec::new());
            }
            sql.push_str(&format!(
                " AND target_id IN ({})",
                vec!["?"; target_ids.len()].join(",")
            ));
            for id in target_ids {
                args.push(Box::new(id.clone()));
            }
        }
        sql.push_str(" ORDER BY confidence DESC, pack_id");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let refs: Vec<&dyn rusqlite::types::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let rows = stmt.query_map(refs.as_slice(), row_to_pack)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Record that a query returned these packs
    pub fn record_pack_access(&self, pack_ids: &[String]) -> Result<()> {
        let writer = self.writer()?;
        for id in pack_ids {
            writer.execute(
                "UPDATE context_packs SET access_count = access_count + 1 WHERE pack_id = ?1",
                params![id],
            )?;
        }
        Ok(())
    }

    /// Decay and mark packs targeting an entity as stale
    pub fn invalidate_packs_for_target(&self, target_id: &str, reason: &str) -> Result<u64> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE context_packs
             SET confidence = confidence * 0.9,
                 calibrated_confidence = NULL,
                 invalidation_reason = ?2
             WHERE target_id = ?1",
            params![target_id, reason],
        )?;
        Ok(changed as u64)
    }

    // ========================================================================
    // EMBEDDINGS + VECTOR SEARCH
    // ========================================================================

    /// Store a vector for an entity and add it to the live index.
    ///
    /// The first vector written pins the index dimensionality; later
    /// mismatches are invariant violations.
    pub fn put_embedding(&self, entity_id: &str, embedding: &Embedding, model: &str) -> Result<()> {
        let mut index_guard = self
            .vector_index
            .lock()
            .map_err(|_| LibrarianError::StorageCorrupt("vector index lock poisoned".to_string()))?;

        match index_guard.as_ref() {
            Some(index) if index.dimensions() != embedding.dimensions => {
                return Err(LibrarianError::InvariantViolation {
                    field: "embedding.dimensions".to_string(),
                    value: format!("{} != index {}", embedding.dimensions, index.dimensions()),
                });
            }
            None => {
                let index = VectorIndex::with_config(VectorIndexConfig {
                    dimensions: embedding.dimensions,
                    ..VectorIndexConfig::default()
                })
                .map_err(|e| LibrarianError::StorageCorrupt(e.to_string()))?;
                *index_guard = Some(index);
                self.update_metadata(|m| m.embedding_dimensions = Some(embedding.dimensions))?;
            }
            _ => {}
        }

        {
            let writer = self.writer()?;
            writer.execute(
                "INSERT INTO embeddings (entity_id, vector, dimensions, model, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(entity_id) DO UPDATE SET
                     vector = excluded.vector,
                     dimensions = excluded.dimensions,
                     model = excluded.model,
                     created_at = excluded.created_at",
                params![
                    entity_id,
                    embedding.to_bytes(),
                    embedding.dimensions as i64,
                    model,
                    Utc::now(),
                ],
            )?;
            writer.execute(
                "UPDATE functions SET has_embedding = 1 WHERE id = ?1",
                params![entity_id],
            )?;
        }

        if let Some(index) = index_guard.as_mut() {
            index
                .add(entity_id, &embedding.vector)
                .map_err(|e| LibrarianError::StorageCorrupt(e.to_string()))?;
        }
        Ok(())
    }

    /// Fetch a stored vector
    pub fn get_embedding(&self, entity_id: &str) -> Result<Option<Embedding>> {
        let reader = self.reader()?;
        let bytes: Option<Vec<u8>> = reader
            .query_row(
                "SELECT vector FROM embeddings WHERE entity_id = ?1",
                params![entity_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bytes.and_then(|b| Embedding::from_bytes(&b)))
    }

    /// Cosine nearest neighbours, deterministically ordered by
    /// `(similarity desc, id asc)`
    pub fn search_vectors(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let index_guard = self
            .vector_index
            .lock()
            .map_err(|_| LibrarianError::StorageCorrupt("vector index lock poisoned".to_string()))?;
        let Some(index) = index_guard.as_ref() else {
            return Ok(Vec::new());
        };
        let mut results = index
            .search(query, k)
            .map_err(|e| LibrarianError::StorageCorrupt(e.to_string()))?;
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(results)
    }

    /// Count stored vectors
    pub fn count_vectors(&self) -> Result<u64> {
        let reader = self.reader()?;
        let count: i64 = reader.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Load persisted vectors into the in-process index at open
    fn hydrate_vector_index(&self) -> Result<()> {
        let rows: Vec<(String, Vec<u8>)> = {
            let reader = self.reader()?;
            let mut stmt = reader.prepare("SELECT entity_id, vector FROM embeddings")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        if rows.is_empty() {
            return Ok(());
        }

        let mut index_guard = self
            .vector_index
            .lock()
            .map_err(|_| LibrarianError::StorageCorrupt("vector index lock poisoned".to_string()))?;
        for (entity_id, bytes) in rows {
            let Some(embedding) = Embedding::from_bytes(&bytes) else {
                tracing::warn!(entity_id, "skipping undecodable embedding blob");
                continue;
            };
            if index_guard.is_none() {
                let index = VectorIndex::with_config(VectorIndexConfig {
                    dimensions: embedding.dimensions,
                    ..VectorIndexConfig::default()
                })
                .map_err(|e| LibrarianError::StorageCorrupt(e.to_string()))?;
                *index_guard = Some(index);
            }
            if let Some(index) = index_guard.as_mut() {
                if let Err(e) = index.add(&entity_id, &embedding.vector) {
                    tracing::warn!(entity_id, error = %e, "failed to hydrate embedding");
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // LEXICAL SEARCH
    // ========================================================================

    /// BM25-ranked lexical candidates from the FTS index.
    ///
    /// Scores are normalised into (0, 1] with best-rank-first ordering.
    pub fn search_lexical(&self, query: &str, limit: usize) -> Result<Vec<(String, f64)>> {
        let sanitized = sanitize_fts_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT entity_id, bm25(entity_fts) AS rank
             FROM entity_fts
             WHERE entity_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![sanitized, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // bm25() returns lower-is-better; fold duplicate entity ids keeping
        // the best rank, then map to a descending [0, 1] score
        let mut best: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
        for (id, rank) in rows {
            let entry = best.entry(id).or_insert(rank);
            if rank < *entry {
                *entry = rank;
            }
        }
        let mut scored: Vec<(String, f64)> = best
            .into_iter()
            .map(|(id, rank)| (id, 1.0 / (1.0 + rank.max(0.0))))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(scored)
    }

    // ========================================================================
    // INGESTION ITEMS
    // ========================================================================

    /// Insert an item; identical `(id)` from an identical payload hash is a
    /// no-op
    pub fn upsert_ingestion_item(&self, item: &IngestionItem) -> Result<bool> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "INSERT OR IGNORE INTO ingestion_items
                 (id, source_type, source_version, ingested_at, payload, content_hash, taxonomy, path, extra)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                item.id,
                item.source_type,
                item.source_version,
                item.ingested_at,
                serde_json::to_string(&item.payload)?,
                item.metadata.hash,
                serde_json::to_string(&item.metadata.taxonomy)?,
                item.metadata.path,
                serde_json::to_string(&item.metadata.extra)?,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Items from one source type
    pub fn get_ingestion_items(&self, source_type: &str, limit: usize) -> Result<Vec<IngestionItem>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, source_type, source_version, ingested_at, payload, content_hash, taxonomy, path, extra
             FROM ingestion_items WHERE source_type = ?1 ORDER BY id LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![source_type, limit as i64], row_to_item)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // ========================================================================
    // HISTORY RECORDS
    // ========================================================================

    /// Persist a blame chunk
    pub fn upsert_blame_entry(&self, entry: &BlameEntry) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT OR REPLACE INTO blame_entries
                 (id, file_path, line_start, line_end, author, author_email, commit_hash,
                  commit_date, original_line, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.id,
                entry.file_path,
                entry.line_start,
                entry.line_end,
                entry.author,
                entry.author_email,
                entry.commit_hash,
                entry.commit_date,
                entry.original_line,
                entry.indexed_at,
            ],
        )?;
        Ok(())
    }

    /// Blame chunks for a file
    pub fn get_blame_entries(&self, file_path: &str) -> Result<Vec<BlameEntry>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, file_path, line_start, line_end, author, author_email, commit_hash,
                    commit_date, original_line, indexed_at
             FROM blame_entries WHERE file_path = ?1 ORDER BY line_start",
        )?;
        let rows = stmt.query_map(params![file_path], |row| {
            Ok(BlameEntry {
                id: row.get(0)?,
                file_path: row.get(1)?,
                line_start: row.get(2)?,
                line_end: row.get(3)?,
                author: row.get(4)?,
                author_email: row.get(5)?,
                commit_hash: row.get(6)?,
                commit_date: row.get(7)?,
                original_line: row.get(8)?,
                indexed_at: row.get(9)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Persist a per-file diff record
    pub fn upsert_diff_record(&self, record: &DiffRecord) -> Result<()> {
        validate_unit_interval("diff.complexity", record.complexity)?;
        validate_unit_interval("diff.impact_score", record.impact_score)?;
        let writer = self.writer()?;
        writer.execute(
            "INSERT OR REPLACE INTO diff_records
                 (id, commit_hash, file_path, additions, deletions, hunk_count, hunks,
                  change_category, complexity, impact_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id,
                record.commit_hash,
                record.file_path,
                record.additions,
                record.deletions,
                record.hunk_count,
                serde_json::to_string(&record.hunks)?,
                record.change_category.as_str(),
                record.complexity,
                record.impact_score,
            ],
        )?;
        Ok(())
    }

    /// Persist a reflog entry
    pub fn upsert_reflog_entry(&self, entry: &ReflogEntry) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT OR REPLACE INTO reflog_entries
                 (id, ref_name, commit_hash, action, previous_commit, timestamp, message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id,
                entry.ref_name,
                entry.commit_hash,
                entry.action.as_str(),
                entry.previous_commit,
                entry.timestamp,
                entry.message,
            ],
        )?;
        Ok(())
    }

    // ========================================================================
    // DAEMON STATE (opaque KV)
    // ========================================================================

    /// Read an opaque state value
    pub fn get_state(&self, key: &str) -> Result<Option<String>> {
        let reader = self.reader()?;
        let value = reader
            .query_row(
                "SELECT value FROM daemon_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write an opaque state value
    pub fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO daemon_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now()],
        )?;
        Ok(())
    }

    /// Remove a state key
    pub fn clear_state(&self, key: &str) -> Result<()> {
        let writer = self.writer()?;
        writer.execute("DELETE FROM daemon_state WHERE key = ?1", params![key])?;
        Ok(())
    }

    // ========================================================================
    // METADATA + REPORTS
    // ========================================================================

    /// Read the metadata singleton; defaults when none exists yet
    pub fn get_metadata(&self) -> Result<IndexMetadata> {
        let reader = self.reader()?;
        let metadata = reader
            .query_row(
                "SELECT version, quality_tier, last_bootstrap, last_indexing, total_files,
                        embedding_dimensions, workspace_checksum
                 FROM metadata WHERE id = 1",
                [],
                |row| {
                    Ok(IndexMetadata {
                        version: row.get(0)?,
                        quality_tier: crate::config::QualityTier::parse_name(
                            &row.get::<_, String>(1)?,
                        ),
                        last_bootstrap: row.get(2)?,
                        last_indexing: row.get(3)?,
                        total_files: row.get::<_, i64>(4)? as u64,
                        embedding_dimensions: row
                            .get::<_, Option<i64>>(5)?
                            .map(|d| d as usize),
                        workspace_checksum: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(metadata.unwrap_or_default())
    }

    /// Overwrite the metadata singleton
    pub fn set_metadata(&self, metadata: &IndexMetadata) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO metadata (id, version, quality_tier, last_bootstrap, last_indexing,
                                   total_files, embedding_dimensions, workspace_checksum)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                 version = excluded.version,
                 quality_tier = excluded.quality_tier,
                 last_bootstrap = excluded.last_bootstrap,
                 last_indexing = excluded.last_indexing,
                 total_files = excluded.total_files,
                 embedding_dimensions = excluded.embedding_dimensions,
                 workspace_checksum = excluded.workspace_checksum",
            params![
                metadata.version,
                metadata.quality_tier.as_str(),
                metadata.last_bootstrap,
                metadata.last_indexing,
                metadata.total_files as i64,
                metadata.embedding_dimensions.map(|d| d as i64),
                metadata.workspace_checksum,
            ],
        )?;
        Ok(())
    }

    /// Read-modify-write the metadata singleton
    pub fn update_metadata(&self, mutate: impl FnOnce(&mut IndexMetadata)) -> Result<()> {
        let mut metadata = self.get_metadata()?;
        mutate(&mut metadata);
        self.set_metadata(&metadata)
    }

    /// Append a bootstrap report to the audit log
    pub fn append_bootstrap_report(&self, report: &BootstrapReport) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO bootstrap_reports (report, success, created_at) VALUES (?1, ?2, ?3)",
            params![
                serde_json::to_string(report)?,
                report.success as i64,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    /// The most recent bootstrap report, when any
    pub fn get_last_bootstrap_report(&self) -> Result<Option<BootstrapReport>> {
        let reader = self.reader()?;
        let raw: Option<String> = reader
            .query_row(
                "SELECT report FROM bootstrap_reports ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|r| serde_json::from_str(&r).map_err(Into::into))
            .transpose()
    }

    // ========================================================================
    // STATS + CHECKSUMS
    // ========================================================================

    /// Aggregate counts and sizes
    pub fn get_stats(&self) -> Result<StoreStats> {
        let reader = self.reader()?;
        let count = |table: &str| -> rusqlite::Result<i64> {
            reader.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        };
        let total_modules = count("modules")? as u64;
        let total_functions = count("functions")? as u64;
        let total_symbols = count("symbols")? as u64;
        let total_edges = count("graph_edges")? as u64;
        let total_packs = count("context_packs")? as u64;
        let total_items = count("ingestion_items")? as u64;
        let total_vectors = count("embeddings")? as u64;
        let average_confidence: f64 = reader.query_row(
            "SELECT COALESCE(AVG(confidence), 0.0) FROM context_packs",
            [],
            |row| row.get(0),
        )?;
        let page_count: i64 = reader.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = reader.query_row("PRAGMA page_size", [], |row| row.get(0))?;

        Ok(StoreStats {
            total_modules,
            total_functions,
            total_symbols,
            total_edges,
            total_packs,
            total_items,
            total_vectors,
            average_confidence,
            storage_bytes: (page_count * page_size) as u64,
        })
    }

    /// A checksum that changes whenever indexed content changes; the query
    /// cache keys its validity on this. Access counters deliberately do not
    /// participate, so reads never invalidate the cache.
    pub fn index_checksum(&self) -> Result<String> {
        let reader = self.reader()?;
        let summary: String = reader.query_row(
            "SELECT COALESCE(MAX(last_indexed), '') || ':' ||
                    (SELECT COUNT(*) FROM modules) || ':' ||
                    (SELECT COUNT(*) FROM functions) || ':' ||
                    (SELECT COUNT(*) FROM context_packs) || ':' ||
                    (SELECT COUNT(*) FROM context_packs WHERE invalidation_reason IS NOT NULL)
             FROM modules",
            [],
            |row| row.get(0),
        )?;
        Ok(crate::model::content_hash(&summary))
    }

    /// Path this store was opened at, when file-backed
    pub fn db_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

// ============================================================================
// ROW MAPPERS
// ============================================================================

const FUNCTION_SELECT: &str = "SELECT id, module_id, name, file_path, start_line, end_line, signature, purpose,
        has_embedding, confidence, access_count, last_accessed, validation_count,
        outcome_successes, outcome_failures
 FROM functions";

const PACK_SELECT: &str = "SELECT pack_id, pack_type, target_id, summary, key_facts, related_files, confidence,
        calibrated_confidence, access_count, last_outcome, invalidation_reason
 FROM context_packs";

fn row_to_module(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModuleEntity> {
    let exports: String = row.get(3)?;
    let dependencies: String = row.get(4)?;
    Ok(ModuleEntity {
        id: row.get(0)?,
        path: row.get(1)?,
        purpose: row.get(2)?,
        exports: serde_json::from_str(&exports).unwrap_or_default(),
        dependencies: serde_json::from_str(&dependencies).unwrap_or_default(),
        confidence: row.get(5)?,
        last_indexed: row.get(6)?,
        checksum: row.get(7)?,
    })
}

fn row_to_function(row: &rusqlite::Row<'_>) -> rusqlite::Result<FunctionEntity> {
    Ok(FunctionEntity {
        id: row.get(0)?,
        module_id: row.get(1)?,
        name: row.get(2)?,
        file_path: row.get(3)?,
        start_line: row.get(4)?,
        end_line: row.get(5)?,
        signature: row.get(6)?,
        purpose: row.get(7)?,
        has_embedding: row.get::<_, i64>(8)? != 0,
        confidence: row.get(9)?,
        access_count: row.get::<_, i64>(10)? as u64,
        last_accessed: row.get(11)?,
        validation_count: row.get::<_, i64>(12)? as u64,
        outcome_history: OutcomeHistory {
            successes: row.get::<_, i64>(13)? as u64,
            failures: row.get::<_, i64>(14)? as u64,
        },
    })
}

fn row_to_symbol(row: &rusqlite::Row<'_>) -> rusqlite::Result<SymbolEntry> {
    let kind: String = row.get(2)?;
    let visibility: String = row.get(8)?;
    let decorators: String = row.get(11)?;
    Ok(SymbolEntry {
        qualified_name: row.get(0)?,
        name: row.get(1)?,
        kind: SymbolKind::parse_name(&kind).unwrap_or(SymbolKind::Variable),
        file: row.get(3)?,
        line: row.get(4)?,
        end_line: row.get(5)?,
        parent: row.get(6)?,
        exported: row.get::<_, i64>(7)? != 0,
        visibility: match visibility.as_str() {
            "private" => SymbolVisibility::Private,
            "protected" => SymbolVisibility::Protected,
            _ => SymbolVisibility::Public,
        },
        is_async: row.get::<_, i64>(9)? != 0,
        is_static: row.get::<_, i64>(10)? != 0,
        decorators: serde_json::from_str(&decorators).unwrap_or_default(),
        namespace: row.get(12)?,
        signature: row.get(13)?,
        doc: row.get(14)?,
        original_name: row.get(15)?,
        from_module: row.get(16)?,
    })
}

fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphEdge> {
    let edge_type: String = row.get(2)?;
    let source: String = row.get(4)?;
    Ok(GraphEdge {
        from_id: row.get(0)?,
        to_id: row.get(1)?,
        edge_type: EdgeType::parse_name(&edge_type).unwrap_or(EdgeType::References),
        weight: row.get(3)?,
        source: EdgeSource::parse_name(&source),
    })
}

fn row_to_pack(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContextPack> {
    let pack_type: String = row.get(1)?;
    let key_facts: String = row.get(4)?;
    let related_files: String = row.get(5)?;
    let last_outcome: String = row.get(9)?;
    Ok(ContextPack {
        pack_id: row.get(0)?,
        pack_type: PackType::parse_name(&pack_type).unwrap_or(PackType::FunctionContext),
        target_id: row.get(2)?,
        summary: row.get(3)?,
        key_facts: serde_json::from_str(&key_facts).unwrap_or_default(),
        related_files: serde_json::from_str(&related_files).unwrap_or_default(),
        confidence: row.get(6)?,
        calibrated_confidence: row.get(7)?,
        access_count: row.get::<_, i64>(8)? as u64,
        last_outcome: PackOutcome::parse_name(&last_outcome),
        invalidation_reason: row.get(10)?,
    })
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<IngestionItem> {
    let payload: String = row.get(4)?;
    let taxonomy: String = row.get(6)?;
    let extra: String = row.get(8)?;
    Ok(IngestionItem {
        id: row.get(0)?,
        source_type: row.get(1)?,
        source_version: row.get(2)?,
        ingested_at: row.get(3)?,
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        metadata: ItemMetadata {
            hash: row.get(5)?,
            taxonomy: serde_json::from_str(&taxonomy).unwrap_or_default(),
            path: row.get(7)?,
            extra: serde_json::from_str(&extra).unwrap_or_default(),
        },
    })
}

fn validate_unit_interval(field: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) || !value.is_finite() {
        return Err(LibrarianError::InvariantViolation {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stable_id;

    fn store() -> KnowledgeStore {
        KnowledgeStore::open_in_memory().unwrap()
    }

    fn sample_module(path: &str) -> ModuleEntity {
        let mut module = ModuleEntity::new(path);
        module.purpose = "test module".to_string();
        module.checksum = stable_id(path);
        module
    }

    fn sample_function(module: &ModuleEntity, name: &str) -> FunctionEntity {
        let mut function = FunctionEntity::new(&module.path, &module.id, name, name);
        function.signature = format!("function {name}()");
        function.start_line = 1;
        function.end_line = 3;
        function
    }

    #[test]
    fn test_module_roundtrip() {
        let store = store();
        let module = sample_module("src/a.ts");
        store.upsert_module(&module).unwrap();

        let fetched = store.get_module(&module.id).unwrap().unwrap();
        assert_eq!(fetched.path, "src/a.ts");
        assert_eq!(
            store.get_module_by_path("src/a.ts").unwrap().unwrap().id,
            module.id
        );
    }

    #[test]
    fn test_upsert_unchanged_checksum_is_noop() {
        let store = store();
        let mut module = sample_module("src/a.ts");
        store.upsert_module(&module).unwrap();
        let before = store.get_module(&module.id).unwrap().unwrap().last_indexed;

        module.last_indexed = Utc::now() + chrono::Duration::seconds(60);
        store.upsert_module(&module).unwrap();
        let after = store.get_module(&module.id).unwrap().unwrap().last_indexed;
        assert_eq!(before, after);

        module.checksum = "different".to_string();
        store.upsert_module(&module).unwrap();
        let changed = store.get_module(&module.id).unwrap().unwrap().last_indexed;
        assert_ne!(before, changed);
    }

    #[test]
    fn test_confidence_invariant_enforced() {
        let store = store();
        let mut module = sample_module("src/a.ts");
        module.confidence = 1.7;
        let err = store.upsert_module(&module).unwrap_err();
        assert_eq!(err.kind(), "INVARIANT_VIOLATION");
    }

    #[test]
    fn test_function_line_invariant() {
        let store = store();
        let module = sample_module("src/a.ts");
        store.upsert_module(&module).unwrap();
        let mut function = sample_function(&module, "f");
        function.start_line = 10;
        function.end_line = 5;
        assert!(store.upsert_function(&function).is_err());
    }

    #[test]
    fn test_delete_module_cascades() {
        let store = store();
        let module = sample_module("src/a.ts");
        store.upsert_module(&module).unwrap();
        let function = sample_function(&module, "f");
        store.upsert_function(&function).unwrap();

        let mut pack = ContextPack::new(PackType::FunctionContext, &function.id);
        pack.summary = "fn pack".to_string();
        store.upsert_pack(&pack).unwrap();
        let mut module_pack = ContextPack::new(PackType::ModuleOverview, &module.id);
        module_pack.summary = "module pack".to_string();
        store.upsert_pack(&module_pack).unwrap();

        store
            .put_embedding(&function.id, &Embedding::new(vec![0.1, 0.2, 0.3]), "test")
            .unwrap();

        assert!(store.delete_module(&module.id).unwrap());
        assert!(store.get_function(&function.id).unwrap().is_none());
        assert!(store.get_pack(&pack.pack_id).unwrap().is_none());
        assert!(store.get_pack(&module_pack.pack_id).unwrap().is_none());
        assert!(store.get_embedding(&function.id).unwrap().is_none());
    }

    #[test]
    fn test_edge_weight_monotonic() {
        let store = store();
        store
            .upsert_edge(&GraphEdge::co_change("a", "b", 0.8))
            .unwrap();
        store
            .upsert_edge(&GraphEdge::co_change("a", "b", 0.3))
            .unwrap();

        let edges = store
            .get_graph_edges(&EdgeQuery {
                from_ids: Some(vec!["a".to_string()]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].weight, 0.8);
    }

    #[test]
    fn test_edge_query_by_type() {
        let store = store();
        store
            .upsert_edge(&GraphEdge::statically("a", "b", EdgeType::Imports))
            .unwrap();
        store
            .upsert_edge(&GraphEdge::statically("a", "c", EdgeType::Contains))
            .unwrap();

        let imports = store
            .get_graph_edges(&EdgeQuery {
                from_ids: Some(vec!["a".to_string()]),
                edge_types: Some(vec![EdgeType::Imports]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].to_id, "b");
    }

    #[test]
    fn test_vector_search_deterministic_ordering() {
        let store = store();
        // Identical vectors tie on similarity; ordering falls back to id asc
        let v = Embedding::new(vec![1.0, 0.0, 0.0, 0.0]);
        store.put_embedding("b-entity", &v, "test").unwrap();
        store.put_embedding("a-entity", &v, "test").unwrap();

        let results = store.search_vectors(&[1.0, 0.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "a-entity");
        assert_eq!(results[1].0, "b-entity");
    }

    #[test]
    fn test_embedding_dimension_pinned() {
        let store = store();
        store
            .put_embedding("a", &Embedding::new(vec![0.1, 0.2]), "test")
            .unwrap();
        let err = store
            .put_embedding("b", &Embedding::new(vec![0.1, 0.2, 0.3]), "test")
            .unwrap_err();
        assert_eq!(err.kind(), "INVARIANT_VIOLATION");
        assert_eq!(
            store.get_metadata().unwrap().embedding_dimensions,
            Some(2)
        );
    }

    #[test]
    fn test_lexical_search_finds_function() {
        let store = store();
        let module = sample_module("src/rate.ts");
        store.upsert_module(&module).unwrap();
        let mut function = sample_function(&module, "checkRateLimit");
        function.purpose = "enforce request rate limiting".to_string();
        store.upsert_function(&function).unwrap();

        let hits = store.search_lexical("rate limiting", 10).unwrap();
        assert!(hits.iter().any(|(id, _)| id == &function.id));
    }

    #[test]
    fn test_ingestion_item_idempotent() {
        let store = store();
        let metadata = ItemMetadata {
            hash: "h1".to_string(),
            ..Default::default()
        };
        let item = IngestionItem::new("docs", "1.0.0", serde_json::json!({"a": 1}), metadata);
        assert!(store.upsert_ingestion_item(&item).unwrap());
        assert!(!store.upsert_ingestion_item(&item).unwrap());
        assert_eq!(store.get_ingestion_items("docs", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_state_kv_roundtrip() {
        let store = store();
        assert!(store.get_state("learner.state").unwrap().is_none());
        store.set_state("learner.state", "{\"version\":1}").unwrap();
        assert_eq!(
            store.get_state("learner.state").unwrap().as_deref(),
            Some("{\"version\":1}")
        );
        store.clear_state("learner.state").unwrap();
        assert!(store.get_state("learner.state").unwrap().is_none());
    }

    #[test]
    fn test_bootstrap_report_log() {
        let store = store();
        assert!(store.get_last_bootstrap_report().unwrap().is_none());

        let mut report = BootstrapReport::begin();
        report.success = true;
        report.total_files_processed = 3;
        store.append_bootstrap_report(&report).unwrap();

        let mut second = BootstrapReport::begin();
        second.success = false;
        second.error = Some("cancelled".to_string());
        store.append_bootstrap_report(&second).unwrap();

        let last = store.get_last_bootstrap_report().unwrap().unwrap();
        assert!(!last.success);
        assert_eq!(last.error.as_deref(), Some("cancelled"));
    }

    #[test]
    fn test_stats_and_checksum_move_with_writes() {
        let store = store();
        let checksum_empty = store.index_checksum().unwrap();

        let module = sample_module("src/a.ts");
        store.upsert_module(&module).unwrap();
        store.upsert_function(&sample_function(&module, "f")).unwrap();

        let stats = store.get_stats().unwrap();
        assert_eq!(stats.total_modules, 1);
        assert_eq!(stats.total_functions, 1);
        assert_ne!(store.index_checksum().unwrap(), checksum_empty);
    }

    #[test]
    fn test_pack_access_and_outcome() {
        let store = store();
        let module = sample_module("src/a.ts");
        store.upsert_module(&module).unwrap();
        let function = sample_function(&module, "f");
        store.upsert_function(&function).unwrap();
        let pack = ContextPack::new(PackType::FunctionContext, &function.id);
        store.upsert_pack(&pack).unwrap();

        store.record_pack_access(&[pack.pack_id.clone()]).unwrap();
        store.record_pack_access(&[pack.pack_id.clone()]).unwrap();
        store.record_outcome(&function.id, true).unwrap();

        let fetched = store.get_pack(&pack.pack_id).unwrap().unwrap();
        assert_eq!(fetched.access_count, 2);
        assert_eq!(fetched.last_outcome, PackOutcome::Success);
        let function = store.get_function(&function.id).unwrap().unwrap();
        assert_eq!(function.outcome_history.successes, 1);
    }

    #[test]
    fn test_symbols_replace() {
        let store = store();
        let symbol = SymbolEntry::new("Foo", SymbolKind::Class, "src/a.ts", 1);
        store.replace_symbols("src/a.ts", &[symbol]).unwrap();
        assert_eq!(store.get_symbols_for_file("src/a.ts").unwrap().len(), 1);

        let replacement = vec![
            SymbolEntry::new("Bar", SymbolKind::Class, "src/a.ts", 1),
            SymbolEntry::new("baz", SymbolKind::Function, "src/a.ts", 5),
        ];
        store.replace_symbols("src/a.ts", &replacement).unwrap();
        let symbols = store.get_symbols_for_file("src/a.ts").unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].name, "Bar");
    }
}
