//! Relational store for structured records: files, symbols, imports,
//! knowledge entities and typed relationships.
//!
//! Backed by a single SQLite file per scope. Transactions stay short —
//! one logical mutation each — and a file's symbols and imports are
//! replaced atomically together with its `files` row. For any path at
//! most one non-tombstoned record exists; superseded versions are
//! tombstoned, never hard-deleted.

use crate::error::{StoreError, StoreResult};
use crate::types::{Import, Symbol, SymbolKind};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Current schema version. Bump when adding a migration step.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    path TEXT NOT NULL,
    hash TEXT NOT NULL,
    size INTEGER NOT NULL,
    mtime INTEGER NOT NULL,
    language TEXT NOT NULL,
    parse_success INTEGER NOT NULL DEFAULT 0,
    parse_errors TEXT NOT NULL DEFAULT '[]',
    tombstoned INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (path, hash)
);
CREATE INDEX IF NOT EXISTS idx_files_live ON files(path) WHERE tombstoned = 0;

CREATE TABLE IF NOT EXISTS symbols (
    file_hash TEXT NOT NULL,
    path TEXT NOT NULL,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    start_col INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    end_col INTEGER NOT NULL,
    exported INTEGER NOT NULL DEFAULT 0,
    parent TEXT,
    signature TEXT
);
CREATE INDEX IF NOT EXISTS idx_symbols_hash ON symbols(file_hash);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);

CREATE TABLE IF NOT EXISTS imports (
    file_hash TEXT NOT NULL,
    specifier TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_imports_hash ON imports(file_hash);

CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    text_digest TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    collection TEXT NOT NULL,
    authority REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entities_digest ON entities(text_digest);

CREATE TABLE IF NOT EXISTS relationships (
    from_id TEXT NOT NULL,
    to_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 1.0,
    PRIMARY KEY (from_id, to_id, kind)
);
CREATE INDEX IF NOT EXISTS idx_relationships_from ON relationships(from_id);
CREATE INDEX IF NOT EXISTS idx_relationships_to ON relationships(to_id);
"#;

/// A file record as stored. `(path, hash)` is the identity.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub hash: String,
    pub size: u64,
    pub mtime: i64,
    pub language: String,
    pub parse_success: bool,
    pub parse_errors: Vec<String>,
    pub tombstoned: bool,
}

/// A knowledge memory entry.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub id: String,
    pub text_digest: String,
    pub content: String,
    pub metadata: JsonValue,
    pub collection: String,
    pub authority: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// A typed edge between two entities.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipRecord {
    pub from_id: String,
    pub to_id: String,
    pub kind: String,
    pub strength: f64,
}

pub struct RelationalStore {
    conn: Connection,
    path: PathBuf,
}

impl RelationalStore {
    /// Open (creating if needed) the database and run migrations.
    /// Corruption detected here is terminal; a diagnostic trace is dumped
    /// next to the database before the error surfaces.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Open {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        }
        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        conn.busy_timeout(std::time::Duration::from_millis(2_000))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        if let Err(e) = store.create_tables() {
            store.dump_diagnostics(&e);
            return Err(e);
        }
        Ok(store)
    }

    /// In-memory database for tests and ephemeral use.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> StoreResult<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )?;
        let current: u32 = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?;
        for version in (current + 1)..=CURRENT_SCHEMA_VERSION {
            // V1 is the baseline created by SCHEMA_SQL; later versions add DDL here.
            self.conn.execute(
                "INSERT INTO schema_migrations (version) VALUES (?1)",
                [version],
            )?;
            info!(version, "Applied schema migration");
        }
        Ok(())
    }

    fn dump_diagnostics(&self, err: &StoreError) {
        let trace_path = self.path.with_extension("db.crash.txt");
        let body = format!(
            "relational store failed to open\npath: {}\nerror: {}\n",
            self.path.display(),
            err
        );
        if let Err(write_err) = std::fs::write(&trace_path, body) {
            warn!("Could not write diagnostic trace: {write_err}");
        }
    }

    // ---- files / symbols / imports -------------------------------------

    /// Record one fully parsed file. The previous live record for the
    /// path is tombstoned, and symbols and imports are replaced in the
    /// same transaction: readers see either the old state or the new.
    pub fn upsert_file(
        &mut self,
        record: &FileRecord,
        symbols: &[Symbol],
        imports: &[Import],
    ) -> StoreResult<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "UPDATE files SET tombstoned = 1 WHERE path = ?1 AND hash != ?2",
            params![record.path.to_string_lossy(), record.hash],
        )?;
        tx.execute(
            "INSERT INTO files (path, hash, size, mtime, language, parse_success, parse_errors, tombstoned)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)
             ON CONFLICT(path, hash) DO UPDATE SET
                size = excluded.size,
                mtime = excluded.mtime,
                language = excluded.language,
                parse_success = excluded.parse_success,
                parse_errors = excluded.parse_errors,
                tombstoned = 0",
            params![
                record.path.to_string_lossy(),
                record.hash,
                record.size as i64,
                record.mtime,
                record.language,
                record.parse_success,
                serde_json::to_string(&record.parse_errors).unwrap_or_else(|_| "[]".into()),
            ],
        )?;

        tx.execute("DELETE FROM symbols WHERE path = ?1", params![record.path.to_string_lossy()])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO symbols (file_hash, path, kind, name, start_line, start_col,
                                      end_line, end_col, exported, parent, signature)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for symbol in symbols {
                stmt.execute(params![
                    record.hash,
                    record.path.to_string_lossy(),
                    symbol.kind.as_str(),
                    symbol.name.as_ref(),
                    symbol.range.start_line,
                    symbol.range.start_column,
                    symbol.range.end_line,
                    symbol.range.end_column,
                    symbol.exported,
                    symbol.parent.as_deref(),
                    symbol.signature.as_deref(),
                ])?;
            }
        }

        tx.execute("DELETE FROM imports WHERE file_hash = ?1", params![record.hash])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO imports (file_hash, specifier) VALUES (?1, ?2)")?;
            for import in imports {
                stmt.execute(params![record.hash, import.specifier.as_ref()])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Tombstone the live record for a path that disappeared.
    pub fn tombstone_file(&self, path: &Path) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE files SET tombstoned = 1 WHERE path = ?1 AND tombstoned = 0",
            params![path.to_string_lossy()],
        )?;
        Ok(changed > 0)
    }

    /// The live (non-tombstoned) record for a path.
    pub fn live_file(&self, path: &Path) -> StoreResult<Option<FileRecord>> {
        self.conn
            .query_row(
                "SELECT path, hash, size, mtime, language, parse_success, parse_errors, tombstoned
                 FROM files WHERE path = ?1 AND tombstoned = 0",
                params![path.to_string_lossy()],
                row_to_file,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn live_files(&self) -> StoreResult<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, hash, size, mtime, language, parse_success, parse_errors, tombstoned
             FROM files WHERE tombstoned = 0 ORDER BY path",
        )?;
        let rows = stmt.query_map([], row_to_file)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Symbols for a file's live version, insertion-ordered by position.
    pub fn symbols_for_path(&self, path: &Path) -> StoreResult<Vec<Symbol>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.kind, s.name, s.start_line, s.start_col, s.end_line, s.end_col,
                    s.exported, s.parent, s.signature
             FROM symbols s
             JOIN files f ON f.hash = s.file_hash AND f.path = s.path
             WHERE s.path = ?1 AND f.tombstoned = 0
             ORDER BY s.start_line, s.start_col",
        )?;
        let mut counter = crate::types::SymbolCounter::new();
        let rows = stmt.query_map(params![path.to_string_lossy()], |row| {
            let kind_str: String = row.get(0)?;
            let name: String = row.get(1)?;
            let exported: bool = row.get(6)?;
            let parent: Option<String> = row.get(7)?;
            let signature: Option<String> = row.get(8)?;
            Ok((
                kind_str,
                name,
                crate::types::Range::new(row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?),
                exported,
                parent,
                signature,
            ))
        })?;

        let mut symbols = Vec::new();
        for row in rows {
            let (kind_str, name, range, exported, parent, signature) = row?;
            let kind = SymbolKind::parse(&kind_str).ok_or_else(|| StoreError::Corrupted {
                reason: format!("unknown symbol kind '{kind_str}'"),
            })?;
            let mut symbol = Symbol::new(counter.next(), name.as_str(), kind, range).exported(exported);
            if let Some(parent) = parent {
                symbol = symbol.with_parent(parent.as_str());
            }
            if let Some(signature) = signature {
                symbol = symbol.with_signature(signature);
            }
            symbols.push(symbol);
        }
        Ok(symbols)
    }

    pub fn imports_for_path(&self, path: &Path) -> StoreResult<Vec<Import>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.specifier FROM imports i
             JOIN files f ON f.hash = i.file_hash
             WHERE f.path = ?1 AND f.tombstoned = 0
             ORDER BY i.rowid",
        )?;
        let rows = stmt.query_map(params![path.to_string_lossy()], |row| {
            row.get::<_, String>(0)
        })?;
        let mut imports = Vec::new();
        for specifier in rows {
            imports.push(Import::new(specifier?.as_str()));
        }
        Ok(imports)
    }

    pub fn file_count(&self) -> StoreResult<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM files WHERE tombstoned = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    pub fn symbol_count(&self) -> StoreResult<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM symbols s JOIN files f
             ON f.hash = s.file_hash AND f.path = s.path
             WHERE f.tombstoned = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    // ---- entities ------------------------------------------------------

    pub fn upsert_entity(&self, entity: &EntityRecord) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO entities (id, text_digest, content, metadata, collection, authority, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                text_digest = excluded.text_digest,
                content = excluded.content,
                metadata = excluded.metadata,
                collection = excluded.collection,
                authority = excluded.authority,
                updated_at = excluded.updated_at",
            params![
                entity.id,
                entity.text_digest,
                entity.content,
                entity.metadata.to_string(),
                entity.collection,
                entity.authority,
                entity.created_at,
                entity.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn entity(&self, id: &str) -> StoreResult<Option<EntityRecord>> {
        self.conn
            .query_row(
                "SELECT id, text_digest, content, metadata, collection, authority, created_at, updated_at
                 FROM entities WHERE id = ?1",
                params![id],
                row_to_entity,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn entities(&self) -> StoreResult<Vec<EntityRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, text_digest, content, metadata, collection, authority, created_at, updated_at
             FROM entities ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_entity)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_entities(&self, ids: &[String]) -> StoreResult<usize> {
        let mut deleted = 0;
        for id in ids {
            deleted += self
                .conn
                .execute("DELETE FROM entities WHERE id = ?1", params![id])?;
            self.conn.execute(
                "DELETE FROM relationships WHERE from_id = ?1 OR to_id = ?1",
                params![id],
            )?;
        }
        Ok(deleted)
    }

    /// Entities below an authority floor or stale beyond a cutoff.
    pub fn prune_candidates(
        &self,
        max_authority: f64,
        updated_before: Option<&str>,
    ) -> StoreResult<Vec<EntityRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, text_digest, content, metadata, collection, authority, created_at, updated_at
             FROM entities
             WHERE authority <= ?1 AND (?2 IS NULL OR updated_at < ?2)
             ORDER BY authority ASC, updated_at ASC",
        )?;
        let rows = stmt.query_map(params![max_authority, updated_before], row_to_entity)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Pairs of distinct entities sharing a text digest — conflicting
    /// near-duplicates surfaced by prune.
    pub fn digest_conflicts(&self) -> StoreResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, b.id FROM entities a
             JOIN entities b ON a.text_digest = b.text_digest AND a.id < b.id",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn entity_count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    // ---- relationships -------------------------------------------------

    pub fn insert_relationship(&self, edge: &RelationshipRecord) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO relationships (from_id, to_id, kind, strength)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(from_id, to_id, kind) DO UPDATE SET strength = excluded.strength",
            params![edge.from_id, edge.to_id, edge.kind, edge.strength],
        )?;
        Ok(())
    }

    /// Entities related to `id` (either direction), strongest first.
    pub fn related_entities(
        &self,
        id: &str,
        limit: usize,
        min_strength: f64,
    ) -> StoreResult<Vec<(EntityRecord, RelationshipRecord)>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.id, e.text_digest, e.content, e.metadata, e.collection, e.authority,
                    e.created_at, e.updated_at,
                    r.from_id, r.to_id, r.kind, r.strength
             FROM relationships r
             JOIN entities e ON e.id = CASE WHEN r.from_id = ?1 THEN r.to_id ELSE r.from_id END
             WHERE (r.from_id = ?1 OR r.to_id = ?1) AND r.strength >= ?2
             ORDER BY r.strength DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![id, min_strength, limit as i64], |row| {
            let entity = row_to_entity(row)?;
            let edge = RelationshipRecord {
                from_id: row.get(8)?,
                to_id: row.get(9)?,
                kind: row.get(10)?,
                strength: row.get(11)?,
            };
            Ok((entity, edge))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn relationships(&self) -> StoreResult<Vec<RelationshipRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT from_id, to_id, kind, strength FROM relationships ORDER BY from_id")?;
        let rows = stmt.query_map([], |row| {
            Ok(RelationshipRecord {
                from_id: row.get(0)?,
                to_id: row.get(1)?,
                kind: row.get(2)?,
                strength: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn relationship_count(&self) -> StoreResult<u64> {
        let n: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM relationships", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Remove every entity, relationship, file, symbol and import.
    pub fn wipe(&mut self) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM relationships;
             DELETE FROM entities;
             DELETE FROM imports;
             DELETE FROM symbols;
             DELETE FROM files;",
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let path: String = row.get(0)?;
    let parse_errors: String = row.get(6)?;
    Ok(FileRecord {
        path: PathBuf::from(path),
        hash: row.get(1)?,
        size: row.get::<_, i64>(2)? as u64,
        mtime: row.get(3)?,
        language: row.get(4)?,
        parse_success: row.get(5)?,
        parse_errors: serde_json::from_str(&parse_errors).unwrap_or_default(),
        tombstoned: row.get(7)?,
    })
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityRecord> {
    let metadata: String = row.get(3)?;
    Ok(EntityRecord {
        id: row.get(0)?,
        text_digest: row.get(1)?,
        content: row.get(2)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(JsonValue::Null),
        collection: row.get(4)?,
        authority: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
