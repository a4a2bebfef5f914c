use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use duckdb::{params, Connection, Row};
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::{CodeVectorStore, HistoryVectorStore, ProfileStore, SignalStore};
use crate::domain::{
    ChangeFrequency, ChunkType, CodeChunk, CodeSearchResult, DecisionClass, DomainError,
    FileOwner, FileProfile, Filter, FrameworkRole, GitChunk, GitChunkType, Language, Severity,
    Signal, SignalMetadata, SignalType, TemporalScope,
};

pub const CODE_TABLE: &str = "code_chunks";
pub const HISTORY_TABLE: &str = "history_chunks";
pub const SIGNALS_TABLE: &str = "signals";
pub const PROFILES_TABLE: &str = "file_profiles";

/// One DuckDB database holding all four tables. DuckDB allows a single
/// write connection per file, so every table adapter shares this one
/// behind a mutex.
pub struct DuckdbStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckdbStore {
    pub fn open(path: &Path) -> Result<Self, DomainError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| DomainError::storage(format!("Failed to open DuckDB database: {}", e)))?;
        Self::load_vss(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, DomainError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            DomainError::storage(format!("Failed to open DuckDB in-memory DB: {}", e))
        })?;
        Self::load_vss(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn load_vss(conn: &Connection) -> Result<(), DomainError> {
        conn.execute_batch(
            "INSTALL vss; LOAD vss; SET hnsw_enable_experimental_persistence = true;",
        )
        .map_err(|e| DomainError::storage(format!("Failed to initialize VSS extension: {}", e)))
    }

    pub fn code(&self) -> DuckdbCodeStore {
        DuckdbCodeStore {
            conn: Arc::clone(&self.conn),
        }
    }

    pub fn history(&self) -> DuckdbHistoryStore {
        DuckdbHistoryStore {
            conn: Arc::clone(&self.conn),
        }
    }

    pub fn signals(&self) -> DuckdbSignalStore {
        DuckdbSignalStore {
            conn: Arc::clone(&self.conn),
        }
    }

    pub fn profiles(&self) -> DuckdbProfileStore {
        DuckdbProfileStore {
            conn: Arc::clone(&self.conn),
        }
    }
}

// ── Shared helpers ───────────────────────────────────────────────────────

fn vector_literal(vector: &[f32]) -> String {
    let mut s = String::with_capacity(vector.len() * 8);
    s.push('[');
    for (i, v) in vector.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        s.push_str(&format!("{}", v));
    }
    s.push(']');
    s.push_str(&format!("::FLOAT[{}]", vector.len()));
    s
}

/// Maps a "table does not exist" failure to the typed error so the CLI can
/// append the "run `repolens index`" hint.
fn map_query_error(table: &str, e: duckdb::Error) -> DomainError {
    let message = e.to_string();
    if message.contains("does not exist") || message.contains("Catalog Error") {
        DomainError::missing_table(table)
    } else {
        DomainError::storage(format!("Query on {} failed: {}", table, message))
    }
}

fn json_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

fn parse_json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Swaps a freshly written staging table in for the live one inside a
/// single transaction, then restores the HNSW index.
fn swap_staging(
    conn: &Connection,
    table: &str,
    index_sql: &str,
) -> Result<(), DomainError> {
    let sql = format!(
        "BEGIN; DROP TABLE IF EXISTS {table}; \
         ALTER TABLE {table}__staging RENAME TO {table}; COMMIT; {index}",
        table = table,
        index = index_sql,
    );
    conn.execute_batch(&sql)
        .map_err(|e| DomainError::storage(format!("Failed to swap {} generation: {}", table, e)))
}

// ── Code chunks ──────────────────────────────────────────────────────────

pub struct DuckdbCodeStore {
    conn: Arc<Mutex<Connection>>,
}

const CODE_COLUMNS: &str = "id, file_path, package, name, chunk_type, line_start, line_end, \
     content, language, exported, framework_role";

impl DuckdbCodeStore {
    fn create_sql(table: &str, dimension: usize) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                package TEXT NOT NULL,
                name TEXT NOT NULL,
                chunk_type TEXT NOT NULL,
                line_start INTEGER NOT NULL,
                line_end INTEGER NOT NULL,
                content TEXT NOT NULL,
                language TEXT NOT NULL,
                exported BOOLEAN NOT NULL,
                framework_role TEXT,
                vector FLOAT[{}] NOT NULL
            );",
            table, dimension
        )
    }

    fn index_sql() -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS code_hnsw_idx ON {} USING HNSW (vector) WITH (metric = 'cosine');",
            CODE_TABLE
        )
    }

    fn insert_rows(
        conn: &Connection,
        table: &str,
        chunks: &[CodeChunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), DomainError> {
        for (chunk, vector) in chunks.iter().zip(vectors) {
            let sql = format!(
                "INSERT OR REPLACE INTO {} ({}, vector) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, {})",
                table,
                CODE_COLUMNS,
                vector_literal(vector)
            );
            conn.execute(
                &sql,
                params![
                    chunk.id(),
                    chunk.file_path(),
                    chunk.package(),
                    chunk.name(),
                    chunk.chunk_type().as_str(),
                    chunk.line_start() as i64,
                    chunk.line_end() as i64,
                    chunk.content(),
                    chunk.language().as_str(),
                    chunk.exported(),
                    chunk.framework_role().map(|r| r.as_str()),
                ],
            )
            .map_err(|e| {
                DomainError::storage(format!("Failed to insert chunk {}: {}", chunk.id(), e))
            })?;
        }
        Ok(())
    }

    fn row_to_chunk(row: &Row) -> Result<CodeChunk, duckdb::Error> {
        Ok(CodeChunk::reconstitute(
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            ChunkType::parse(&row.get::<_, String>(4)?),
            u32::try_from(row.get::<_, i64>(5)?).unwrap_or(0),
            u32::try_from(row.get::<_, i64>(6)?).unwrap_or(0),
            row.get::<_, String>(7)?,
            Language::parse(&row.get::<_, String>(8)?),
            row.get::<_, bool>(9)?,
            row.get::<_, Option<String>>(10)?
                .as_deref()
                .and_then(FrameworkRole::parse),
        ))
    }
}

#[async_trait]
impl CodeVectorStore for DuckdbCodeStore {
    async fn init(&self, dimension: usize) -> Result<(), DomainError> {
        let conn = self.conn.lock().await;
        conn.execute_batch(&format!(
            "{}{}",
            Self::create_sql(CODE_TABLE, dimension),
            Self::index_sql()
        ))
        .map_err(|e| DomainError::storage(format!("Failed to create {}: {}", CODE_TABLE, e)))
    }

    async fn overwrite(
        &self,
        chunks: &[CodeChunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), DomainError> {
        if chunks.len() != vectors.len() {
            return Err(DomainError::invalid_input(
                "Chunk and vector count mismatch",
            ));
        }
        if chunks.is_empty() {
            // Nothing to stage; clear the live table without touching its
            // pinned vector dimension.
            let conn = self.conn.lock().await;
            conn.execute(&format!("DELETE FROM {}", CODE_TABLE), params![])
                .map_err(|e| map_query_error(CODE_TABLE, e))?;
            return Ok(());
        }
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0).max(1);
        let staging = format!("{}__staging", CODE_TABLE);
        let conn = self.conn.lock().await;
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {}; {}",
            staging,
            Self::create_sql(&staging, dimension)
        ))
        .map_err(|e| DomainError::storage(format!("Failed to create staging table: {}", e)))?;
        Self::insert_rows(&conn, &staging, chunks, vectors)?;
        swap_staging(&conn, CODE_TABLE, &Self::index_sql())?;
        debug!("Overwrote {} with {} chunks", CODE_TABLE, chunks.len());
        Ok(())
    }

    async fn append(
        &self,
        chunks: &[CodeChunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), DomainError> {
        if chunks.len() != vectors.len() {
            return Err(DomainError::invalid_input(
                "Chunk and vector count mismatch",
            ));
        }
        let conn = self.conn.lock().await;
        Self::insert_rows(&conn, CODE_TABLE, chunks, vectors)
    }

    async fn delete(&self, filter: &Filter) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        let sql = format!("DELETE FROM {} WHERE {}", CODE_TABLE, filter.to_sql());
        let deleted = conn
            .execute(&sql, params![])
            .map_err(|e| map_query_error(CODE_TABLE, e))?;
        Ok(deleted as u64)
    }

    async fn search(
        &self,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<CodeSearchResult>, DomainError> {
        let array_lit = vector_literal(vector);
        let mut sql = format!(
            "SELECT {}, 1.0 - array_cosine_distance(vector, {}) AS score FROM {}",
            CODE_COLUMNS, array_lit, CODE_TABLE
        );
        if let Some(filter) = filter {
            sql.push_str(&format!(" WHERE {}", filter.to_sql()));
        }
        sql.push_str(&format!(
            " ORDER BY array_cosine_distance(vector, {}) LIMIT ?",
            array_lit
        ));

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| map_query_error(CODE_TABLE, e))?;
        let mut rows = stmt
            .query(params![limit as i64])
            .map_err(|e| map_query_error(CODE_TABLE, e))?;
        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?
        {
            let score: f32 = row
                .get(11)
                .map_err(|e| DomainError::storage(format!("Failed to read score: {}", e)))?;
            let chunk = Self::row_to_chunk(row)
                .map_err(|e| DomainError::storage(format!("Failed to parse chunk row: {}", e)))?;
            results.push(CodeSearchResult::new(chunk, score));
        }
        Ok(results)
    }

    async fn count(&self) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        count_table(&conn, CODE_TABLE)
    }
}

fn count_table(conn: &Connection, table: &str) -> Result<u64, DomainError> {
    let mut stmt = conn
        .prepare(&format!("SELECT COUNT(*) FROM {}", table))
        .map_err(|e| map_query_error(table, e))?;
    let mut rows = stmt.query(params![]).map_err(|e| map_query_error(table, e))?;
    match rows
        .next()
        .map_err(|e| DomainError::storage(format!("Failed to count {}: {}", table, e)))?
    {
        Some(row) => {
            let count: i64 = row
                .get(0)
                .map_err(|e| DomainError::storage(format!("Failed to read count: {}", e)))?;
            Ok(count as u64)
        }
        None => Ok(0),
    }
}

// ── History chunks ───────────────────────────────────────────────────────

pub struct DuckdbHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

const HISTORY_COLUMNS: &str = "id, sha, author, email, date, subject, body, parents, refs, \
     chunk_type, commit_type, scope, file_path, files_changed, additions, deletions, branch, \
     text, decision_class";

impl DuckdbHistoryStore {
    fn create_sql(table: &str, dimension: usize) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                sha TEXT NOT NULL,
                author TEXT NOT NULL,
                email TEXT NOT NULL,
                date TEXT NOT NULL,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                parents TEXT NOT NULL,
                refs TEXT NOT NULL,
                chunk_type TEXT NOT NULL,
                commit_type TEXT NOT NULL,
                scope TEXT NOT NULL,
                file_path TEXT NOT NULL,
                files_changed INTEGER NOT NULL,
                additions INTEGER NOT NULL,
                deletions INTEGER NOT NULL,
                branch TEXT NOT NULL,
                text TEXT NOT NULL,
                decision_class TEXT NOT NULL,
                vector FLOAT[{}] NOT NULL
            );",
            table, dimension
        )
    }

    fn index_sql() -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS history_hnsw_idx ON {} USING HNSW (vector) WITH (metric = 'cosine');",
            HISTORY_TABLE
        )
    }

    fn insert_rows(
        conn: &Connection,
        table: &str,
        chunks: &[GitChunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), DomainError> {
        for (chunk, vector) in chunks.iter().zip(vectors) {
            let sql = format!(
                "INSERT OR REPLACE INTO {} ({}, vector) VALUES \
                 (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, {})",
                table,
                HISTORY_COLUMNS,
                vector_literal(vector)
            );
            conn.execute(
                &sql,
                params![
                    chunk.id(),
                    chunk.sha(),
                    chunk.author(),
                    chunk.email(),
                    chunk.date(),
                    chunk.subject(),
                    chunk.body(),
                    json_list(chunk.parents()),
                    chunk.refs(),
                    chunk.chunk_type().as_str(),
                    chunk.commit_type(),
                    chunk.scope(),
                    chunk.file_path(),
                    chunk.files_changed() as i64,
                    chunk.additions() as i64,
                    chunk.deletions() as i64,
                    chunk.branch(),
                    chunk.text(),
                    chunk.decision_class().as_str(),
                ],
            )
            .map_err(|e| {
                DomainError::storage(format!("Failed to insert history chunk {}: {}", chunk.id(), e))
            })?;
        }
        Ok(())
    }

    fn row_to_chunk(row: &Row) -> Result<GitChunk, duckdb::Error> {
        Ok(GitChunk::reconstitute(
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
            parse_json_list(&row.get::<_, String>(7)?),
            row.get::<_, String>(8)?,
            GitChunkType::parse(&row.get::<_, String>(9)?),
            row.get::<_, String>(10)?,
            row.get::<_, String>(11)?,
            row.get::<_, String>(12)?,
            u32::try_from(row.get::<_, i64>(13)?).unwrap_or(0),
            u32::try_from(row.get::<_, i64>(14)?).unwrap_or(0),
            u32::try_from(row.get::<_, i64>(15)?).unwrap_or(0),
            row.get::<_, String>(16)?,
            row.get::<_, String>(17)?,
            DecisionClass::parse(&row.get::<_, String>(18)?),
        ))
    }
}

#[async_trait]
impl HistoryVectorStore for DuckdbHistoryStore {
    async fn init(&self, dimension: usize) -> Result<(), DomainError> {
        let conn = self.conn.lock().await;
        conn.execute_batch(&format!(
            "{}{}",
            Self::create_sql(HISTORY_TABLE, dimension),
            Self::index_sql()
        ))
        .map_err(|e| DomainError::storage(format!("Failed to create {}: {}", HISTORY_TABLE, e)))
    }

    async fn overwrite(
        &self,
        chunks: &[GitChunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), DomainError> {
        if chunks.len() != vectors.len() {
            return Err(DomainError::invalid_input(
                "Chunk and vector count mismatch",
            ));
        }
        if chunks.is_empty() {
            let conn = self.conn.lock().await;
            conn.execute(&format!("DELETE FROM {}", HISTORY_TABLE), params![])
                .map_err(|e| map_query_error(HISTORY_TABLE, e))?;
            return Ok(());
        }
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0).max(1);
        let staging = format!("{}__staging", HISTORY_TABLE);
        let conn = self.conn.lock().await;
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {}; {}",
            staging,
            Self::create_sql(&staging, dimension)
        ))
        .map_err(|e| DomainError::storage(format!("Failed to create staging table: {}", e)))?;
        Self::insert_rows(&conn, &staging, chunks, vectors)?;
        swap_staging(&conn, HISTORY_TABLE, &Self::index_sql())?;
        debug!("Overwrote {} with {} chunks", HISTORY_TABLE, chunks.len());
        Ok(())
    }

    async fn append(
        &self,
        chunks: &[GitChunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), DomainError> {
        if chunks.len() != vectors.len() {
            return Err(DomainError::invalid_input(
                "Chunk and vector count mismatch",
            ));
        }
        let conn = self.conn.lock().await;
        Self::insert_rows(&conn, HISTORY_TABLE, chunks, vectors)
    }

    async fn delete(&self, filter: &Filter) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        let sql = format!("DELETE FROM {} WHERE {}", HISTORY_TABLE, filter.to_sql());
        let deleted = conn
            .execute(&sql, params![])
            .map_err(|e| map_query_error(HISTORY_TABLE, e))?;
        Ok(deleted as u64)
    }

    async fn search(
        &self,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<(GitChunk, f32)>, DomainError> {
        let array_lit = vector_literal(vector);
        let mut sql = format!(
            "SELECT {}, 1.0 - array_cosine_distance(vector, {}) AS score FROM {}",
            HISTORY_COLUMNS, array_lit, HISTORY_TABLE
        );
        if let Some(filter) = filter {
            sql.push_str(&format!(" WHERE {}", filter.to_sql()));
        }
        sql.push_str(&format!(
            " ORDER BY array_cosine_distance(vector, {}) LIMIT ?",
            array_lit
        ));

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| map_query_error(HISTORY_TABLE, e))?;
        let mut rows = stmt
            .query(params![limit as i64])
            .map_err(|e| map_query_error(HISTORY_TABLE, e))?;
        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?
        {
            let score: f32 = row
                .get(19)
                .map_err(|e| DomainError::storage(format!("Failed to read score: {}", e)))?;
            let chunk = Self::row_to_chunk(row)
                .map_err(|e| DomainError::storage(format!("Failed to parse history row: {}", e)))?;
            results.push((chunk, score));
        }
        Ok(results)
    }

    async fn find(
        &self,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<GitChunk>, DomainError> {
        let mut sql = format!("SELECT {} FROM {}", HISTORY_COLUMNS, HISTORY_TABLE);
        if let Some(filter) = filter {
            sql.push_str(&format!(" WHERE {}", filter.to_sql()));
        }
        sql.push_str(" ORDER BY date");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| map_query_error(HISTORY_TABLE, e))?;
        let mut rows = stmt
            .query(params![])
            .map_err(|e| map_query_error(HISTORY_TABLE, e))?;
        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?
        {
            let chunk = Self::row_to_chunk(row)
                .map_err(|e| DomainError::storage(format!("Failed to parse history row: {}", e)))?;
            results.push(chunk);
        }
        Ok(results)
    }

    async fn count(&self) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        count_table(&conn, HISTORY_TABLE)
    }
}

// ── Signals ──────────────────────────────────────────────────────────────

pub struct DuckdbSignalStore {
    conn: Arc<Mutex<Connection>>,
}

const SIGNAL_COLUMNS: &str = "id, signal_type, summary, severity, confidence, directory_scope, \
     contributing_shas, temporal_start, temporal_end, metadata_json, decision_class, detected_at";

impl DuckdbSignalStore {
    fn create_sql(table: &str, dimension: usize) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                signal_type TEXT NOT NULL,
                summary TEXT NOT NULL,
                severity TEXT NOT NULL,
                confidence FLOAT NOT NULL,
                directory_scope TEXT NOT NULL,
                contributing_shas TEXT NOT NULL,
                temporal_start TEXT NOT NULL,
                temporal_end TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                decision_class TEXT NOT NULL,
                detected_at TEXT NOT NULL,
                vector FLOAT[{}] NOT NULL
            );",
            table, dimension
        )
    }

    fn insert_rows(
        conn: &Connection,
        table: &str,
        signals: &[Signal],
        vectors: &[Vec<f32>],
    ) -> Result<(), DomainError> {
        for (signal, vector) in signals.iter().zip(vectors) {
            let metadata_json = serde_json::to_string(signal.metadata())
                .map_err(|e| DomainError::internal(format!("Metadata encode failed: {}", e)))?;
            let sql = format!(
                "INSERT OR REPLACE INTO {} ({}, vector) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, {})",
                table,
                SIGNAL_COLUMNS,
                vector_literal(vector)
            );
            conn.execute(
                &sql,
                params![
                    signal.id(),
                    signal.signal_type().as_str(),
                    signal.summary(),
                    signal.severity().as_str(),
                    signal.confidence() as f64,
                    signal.directory_scope(),
                    json_list(signal.contributing_shas()),
                    signal.temporal_scope().start,
                    signal.temporal_scope().end,
                    metadata_json,
                    signal.dominant_class().as_str(),
                    signal.detected_at(),
                ],
            )
            .map_err(|e| {
                DomainError::storage(format!("Failed to insert signal {}: {}", signal.id(), e))
            })?;
        }
        Ok(())
    }

    fn row_to_signal(row: &Row) -> Result<Signal, DomainError> {
        let read = |e: duckdb::Error| DomainError::storage(format!("Signal row: {}", e));
        let signal_type = SignalType::parse(&row.get::<_, String>(1).map_err(read)?)
            .ok_or_else(|| DomainError::parse("Unknown signal type in store"))?;
        let metadata: SignalMetadata =
            serde_json::from_str(&row.get::<_, String>(9).map_err(read)?)
                .map_err(|e| DomainError::parse(format!("Bad signal metadata: {}", e)))?;
        Ok(Signal::reconstitute(
            row.get::<_, String>(0).map_err(read)?,
            signal_type,
            row.get::<_, String>(2).map_err(read)?,
            Severity::parse(&row.get::<_, String>(3).map_err(read)?),
            row.get::<_, f64>(4).map_err(read)? as f32,
            row.get::<_, String>(5).map_err(read)?,
            parse_json_list(&row.get::<_, String>(6).map_err(read)?),
            TemporalScope::new(
                row.get::<_, String>(7).map_err(read)?,
                row.get::<_, String>(8).map_err(read)?,
            ),
            metadata,
            DecisionClass::parse(&row.get::<_, String>(10).map_err(read)?),
            row.get::<_, String>(11).map_err(read)?,
        ))
    }

    fn query_signals(conn: &Connection, sql: &str) -> Result<Vec<Signal>, DomainError> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| map_query_error(SIGNALS_TABLE, e))?;
        let mut rows = stmt
            .query(params![])
            .map_err(|e| map_query_error(SIGNALS_TABLE, e))?;
        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?
        {
            results.push(Self::row_to_signal(row)?);
        }
        Ok(results)
    }
}

#[async_trait]
impl SignalStore for DuckdbSignalStore {
    async fn init(&self, dimension: usize) -> Result<(), DomainError> {
        let conn = self.conn.lock().await;
        conn.execute_batch(&Self::create_sql(SIGNALS_TABLE, dimension))
            .map_err(|e| DomainError::storage(format!("Failed to create {}: {}", SIGNALS_TABLE, e)))
    }

    async fn overwrite(
        &self,
        signals: &[Signal],
        vectors: &[Vec<f32>],
    ) -> Result<(), DomainError> {
        if signals.len() != vectors.len() {
            return Err(DomainError::invalid_input(
                "Signal and vector count mismatch",
            ));
        }
        if signals.is_empty() {
            let conn = self.conn.lock().await;
            conn.execute(&format!("DELETE FROM {}", SIGNALS_TABLE), params![])
                .map_err(|e| map_query_error(SIGNALS_TABLE, e))?;
            return Ok(());
        }
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0).max(1);
        let staging = format!("{}__staging", SIGNALS_TABLE);
        let conn = self.conn.lock().await;
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {}; {}",
            staging,
            Self::create_sql(&staging, dimension)
        ))
        .map_err(|e| DomainError::storage(format!("Failed to create staging table: {}", e)))?;
        Self::insert_rows(&conn, &staging, signals, vectors)?;
        swap_staging(&conn, SIGNALS_TABLE, "")?;
        debug!("Overwrote {} with {} signals", SIGNALS_TABLE, signals.len());
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(Signal, f32)>, DomainError> {
        let array_lit = vector_literal(vector);
        let sql = format!(
            "SELECT {}, 1.0 - array_cosine_distance(vector, {}) AS score FROM {} \
             ORDER BY array_cosine_distance(vector, {}) LIMIT {}",
            SIGNAL_COLUMNS, array_lit, SIGNALS_TABLE, array_lit, limit
        );
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| map_query_error(SIGNALS_TABLE, e))?;
        let mut rows = stmt
            .query(params![])
            .map_err(|e| map_query_error(SIGNALS_TABLE, e))?;
        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?
        {
            let score: f32 = row
                .get(12)
                .map_err(|e| DomainError::storage(format!("Failed to read score: {}", e)))?;
            results.push((Self::row_to_signal(row)?, score));
        }
        Ok(results)
    }

    async fn for_directory(&self, directory: &str) -> Result<Vec<Signal>, DomainError> {
        // Root-scoped signals are visible to every subdirectory.
        let sql = format!(
            "SELECT {} FROM {} WHERE directory_scope = '{}' OR directory_scope = '.'",
            SIGNAL_COLUMNS,
            SIGNALS_TABLE,
            directory.replace('\'', "''")
        );
        let conn = self.conn.lock().await;
        Self::query_signals(&conn, &sql)
    }

    async fn all(&self) -> Result<Vec<Signal>, DomainError> {
        let sql = format!("SELECT {} FROM {}", SIGNAL_COLUMNS, SIGNALS_TABLE);
        let conn = self.conn.lock().await;
        Self::query_signals(&conn, &sql)
    }

    async fn count(&self) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        count_table(&conn, SIGNALS_TABLE)
    }
}

// ── File profiles ────────────────────────────────────────────────────────

pub struct DuckdbProfileStore {
    conn: Arc<Mutex<Connection>>,
}

const PROFILE_COLUMNS: &str = "path, owner_author, owner_percentage, owner_commits, \
     owner_last_change, contributor_count, stability_score, total_changes, revert_count, \
     fix_after_feature_count, change_frequency, risk_score, last_modified, active_signal_ids";

impl DuckdbProfileStore {
    fn create_sql(table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                path TEXT PRIMARY KEY,
                owner_author TEXT,
                owner_percentage FLOAT,
                owner_commits INTEGER,
                owner_last_change TEXT,
                contributor_count INTEGER NOT NULL,
                stability_score INTEGER NOT NULL,
                total_changes INTEGER NOT NULL,
                revert_count INTEGER NOT NULL,
                fix_after_feature_count INTEGER NOT NULL,
                change_frequency TEXT NOT NULL,
                risk_score INTEGER NOT NULL,
                last_modified TEXT NOT NULL,
                active_signal_ids TEXT NOT NULL
            );",
            table
        )
    }

    fn row_to_profile(row: &Row) -> Result<FileProfile, duckdb::Error> {
        let owner_author: Option<String> = row.get(1)?;
        let owner = match owner_author {
            Some(author) => Some(FileOwner {
                author,
                percentage: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0) as f32,
                commits: u32::try_from(row.get::<_, Option<i64>>(3)?.unwrap_or(0)).unwrap_or(0),
                last_change: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            }),
            None => None,
        };
        Ok(FileProfile::reconstitute(
            row.get::<_, String>(0)?,
            owner,
            u32::try_from(row.get::<_, i64>(5)?).unwrap_or(0),
            u32::try_from(row.get::<_, i64>(6)?).unwrap_or(0),
            u32::try_from(row.get::<_, i64>(7)?).unwrap_or(0),
            u32::try_from(row.get::<_, i64>(8)?).unwrap_or(0),
            u32::try_from(row.get::<_, i64>(9)?).unwrap_or(0),
            ChangeFrequency::parse(&row.get::<_, String>(10)?),
            u32::try_from(row.get::<_, i64>(11)?).unwrap_or(0),
            row.get::<_, String>(12)?,
            parse_json_list(&row.get::<_, String>(13)?),
        ))
    }

    fn query_profiles(conn: &Connection, sql: &str) -> Result<Vec<FileProfile>, DomainError> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| map_query_error(PROFILES_TABLE, e))?;
        let mut rows = stmt
            .query(params![])
            .map_err(|e| map_query_error(PROFILES_TABLE, e))?;
        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?
        {
            let profile = Self::row_to_profile(row)
                .map_err(|e| DomainError::storage(format!("Failed to parse profile: {}", e)))?;
            results.push(profile);
        }
        Ok(results)
    }
}

#[async_trait]
impl ProfileStore for DuckdbProfileStore {
    async fn init(&self) -> Result<(), DomainError> {
        let conn = self.conn.lock().await;
        conn.execute_batch(&Self::create_sql(PROFILES_TABLE))
            .map_err(|e| DomainError::storage(format!("Failed to create {}: {}", PROFILES_TABLE, e)))
    }

    async fn overwrite(&self, profiles: &[FileProfile]) -> Result<(), DomainError> {
        let staging = format!("{}__staging", PROFILES_TABLE);
        let conn = self.conn.lock().await;
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {}; {}",
            staging,
            Self::create_sql(&staging)
        ))
        .map_err(|e| DomainError::storage(format!("Failed to create staging table: {}", e)))?;

        for profile in profiles {
            let sql = format!(
                "INSERT OR REPLACE INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                staging, PROFILE_COLUMNS
            );
            conn.execute(
                &sql,
                params![
                    profile.path(),
                    profile.primary_owner().map(|o| o.author.as_str()),
                    profile.primary_owner().map(|o| o.percentage as f64),
                    profile.primary_owner().map(|o| o.commits as i64),
                    profile.primary_owner().map(|o| o.last_change.as_str()),
                    profile.contributor_count() as i64,
                    profile.stability_score() as i64,
                    profile.total_changes() as i64,
                    profile.revert_count() as i64,
                    profile.fix_after_feature_count() as i64,
                    profile.change_frequency().as_str(),
                    profile.risk_score() as i64,
                    profile.last_modified(),
                    json_list(profile.active_signal_ids()),
                ],
            )
            .map_err(|e| {
                DomainError::storage(format!("Failed to insert profile {}: {}", profile.path(), e))
            })?;
        }
        swap_staging(&conn, PROFILES_TABLE, "")?;
        debug!("Overwrote {} with {} profiles", PROFILES_TABLE, profiles.len());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<FileProfile>, DomainError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE path = '{}'",
            PROFILE_COLUMNS,
            PROFILES_TABLE,
            path.replace('\'', "''")
        );
        let conn = self.conn.lock().await;
        Ok(Self::query_profiles(&conn, &sql)?.into_iter().next())
    }

    async fn for_prefix(&self, prefix: &str) -> Result<Vec<FileProfile>, DomainError> {
        let filter = Filter::like_prefix("path", prefix);
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            PROFILE_COLUMNS,
            PROFILES_TABLE,
            filter.to_sql()
        );
        let conn = self.conn.lock().await;
        Self::query_profiles(&conn, &sql)
    }

    async fn count(&self) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        count_table(&conn, PROFILES_TABLE)
    }
}
