use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::types::{Checkpoint, ChunkType, CodeChunk, CoordinatorState};

// ---------------------------------------------------------------------------
// errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("malformed row: {0}")]
    MalformedRow(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("checkpoint not found: {0}")]
    NotFound(Uuid),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn enum_to_sql<T: serde::Serialize>(val: &T) -> String {
    let s = serde_json::to_string(val).expect("serialize enum");
    s.trim_matches('"').to_string()
}

fn enum_from_sql<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, RepositoryError> {
    let quoted = format!("\"{}\"", raw);
    serde_json::from_str(&quoted)
        .map_err(|e| RepositoryError::MalformedRow(format!("enum `{raw}`: {e}")))
}

fn pack_embedding(vec: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn unpack_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<CodeChunk> {
    let chunk_type_str: String = row.get(9)?;
    let symbols_str: String = row.get(7)?;
    let embedding_blob: Option<Vec<u8>> = row.get(6)?;
    let complexity: Option<i64> = row.get(11)?;
    let indexed_at_ms: i64 = row.get(13)?;

    Ok(CodeChunk {
        id: row.get(0)?,
        project_id: row.get(1)?,
        file: row.get(2)?,
        start_line: row.get::<_, i64>(3)? as u32,
        end_line: row.get::<_, i64>(4)? as u32,
        content: row.get(5)?,
        embedding: embedding_blob.map(|b| unpack_embedding(&b)),
        symbols: serde_json::from_str(&symbols_str).unwrap_or_default(),
        chunk_type: enum_from_sql::<ChunkType>(&chunk_type_str)
            .map_err(|e| rusqlite::Error::InvalidColumnType(9, e.to_string(), rusqlite::types::Type::Text))?,
        language: row.get(8)?,
        complexity: complexity.map(|c| c as u32),
        dependencies: None,
        exports: None,
        documentation: None,
        hash: row.get(10)?,
        indexed_at: chrono::DateTime::from_timestamp_millis(indexed_at_ms)
            .unwrap_or_else(Utc::now),
    })
}

// ---------------------------------------------------------------------------
// CodeChunkRepository (§4.8)
// ---------------------------------------------------------------------------

/// Persistent store keyed by chunk id, backed by SQLite.
pub struct CodeChunkRepository {
    conn: Connection,
}

impl CodeChunkRepository {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path.as_ref()).await?;
        let repo = Self { conn };
        repo.init_schema().await?;
        Ok(repo)
    }

    pub async fn new_in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory().await?;
        let repo = Self { conn };
        repo.init_schema().await?;
        Ok(repo)
    }

    async fn init_schema(&self) -> Result<(), RepositoryError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA busy_timeout=5000;

                    CREATE TABLE IF NOT EXISTS code_chunks (
                        id          TEXT PRIMARY KEY,
                        project_id  TEXT NOT NULL,
                        file        TEXT NOT NULL,
                        start_line  INTEGER NOT NULL,
                        end_line    INTEGER NOT NULL,
                        content     TEXT NOT NULL,
                        embedding   BLOB,
                        symbols     TEXT NOT NULL,
                        language    TEXT NOT NULL,
                        chunk_type  TEXT NOT NULL,
                        hash        TEXT NOT NULL,
                        complexity  INTEGER,
                        indexed_at  INTEGER NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_chunks_file ON code_chunks(file);
                    CREATE INDEX IF NOT EXISTS idx_chunks_project ON code_chunks(project_id);
                    CREATE INDEX IF NOT EXISTS idx_chunks_hash ON code_chunks(hash);
                    ",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn insert(&self, chunk: &CodeChunk) -> Result<(), RepositoryError> {
        self.insert_many(std::slice::from_ref(chunk)).await
    }

    /// Batched insert; internally chunked to batches of <= 100 rows per the
    /// §4.8 batch-size contract, each batch committed as one transaction.
    pub async fn insert_many(&self, chunks: &[CodeChunk]) -> Result<(), RepositoryError> {
        const BATCH_SIZE: usize = 100;
        for batch in chunks.chunks(BATCH_SIZE) {
            let rows: Vec<_> = batch
                .iter()
                .map(|c| {
                    (
                        c.id.clone(),
                        c.project_id.clone(),
                        c.file.clone(),
                        c.start_line as i64,
                        c.end_line as i64,
                        c.content.clone(),
                        c.embedding.as_ref().filter(|e| !e.is_empty()).map(|e| pack_embedding(e)),
                        serde_json::to_string(&c.symbols).unwrap_or_else(|_| "[]".into()),
                        c.language.clone(),
                        enum_to_sql(&c.chunk_type),
                        c.hash.clone(),
                        c.complexity.map(|v| v as i64),
                        c.indexed_at.timestamp_millis(),
                    )
                })
                .collect();

            self.conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    {
                        let mut stmt = tx.prepare(
                            "INSERT INTO code_chunks
                                (id, project_id, file, start_line, end_line, content,
                                 embedding, symbols, language, chunk_type, hash, complexity, indexed_at)
                             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)
                             ON CONFLICT(id) DO UPDATE SET
                                content=excluded.content, embedding=excluded.embedding,
                                symbols=excluded.symbols, language=excluded.language,
                                chunk_type=excluded.chunk_type, hash=excluded.hash,
                                complexity=excluded.complexity, indexed_at=excluded.indexed_at",
                        )?;
                        for row in &rows {
                            stmt.execute(rusqlite::params![
                                row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7, row.8,
                                row.9, row.10, row.11, row.12,
                            ])?;
                        }
                    }
                    tx.commit()?;
                    Ok(())
                })
                .await?;
        }
        Ok(())
    }

    pub async fn update(&self, chunk: &CodeChunk) -> Result<(), RepositoryError> {
        self.insert(chunk).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM code_chunks WHERE id = ?1", rusqlite::params![id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn delete_by_file(&self, file: &str) -> Result<u64, RepositoryError> {
        let file = file.to_string();
        let n = self
            .conn
            .call(move |conn| {
                Ok(conn.execute("DELETE FROM code_chunks WHERE file = ?1", rusqlite::params![file])? as u64)
            })
            .await?;
        Ok(n)
    }

    pub async fn delete_by_project(&self, project_id: &str) -> Result<u64, RepositoryError> {
        let project_id = project_id.to_string();
        let n = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM code_chunks WHERE project_id = ?1",
                    rusqlite::params![project_id],
                )? as u64)
            })
            .await?;
        Ok(n)
    }

    pub async fn delete_by_ids(&self, ids: &[String]) -> Result<u64, RepositoryError> {
        let ids = ids.to_vec();
        let n = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut n = 0u64;
                {
                    let mut stmt = tx.prepare("DELETE FROM code_chunks WHERE id = ?1")?;
                    for id in &ids {
                        n += stmt.execute(rusqlite::params![id])? as u64;
                    }
                }
                tx.commit()?;
                Ok(n)
            })
            .await?;
        Ok(n)
    }

    const SELECT_COLUMNS: &'static str = "id, project_id, file, start_line, end_line, content,
            embedding, symbols, language, chunk_type, hash, complexity, NULL, indexed_at";

    pub async fn find_by_id(&self, id: &str) -> Result<Option<CodeChunk>, RepositoryError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM code_chunks WHERE id = ?1",
                    Self::SELECT_COLUMNS
                ))?;
                let mut rows = stmt.query(rusqlite::params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_chunk(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(RepositoryError::from)
    }

    pub async fn find_by_file(&self, file: &str) -> Result<Vec<CodeChunk>, RepositoryError> {
        let file = file.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM code_chunks WHERE file = ?1 ORDER BY start_line ASC",
                    Self::SELECT_COLUMNS
                ))?;
                let mut rows = stmt.query(rusqlite::params![file])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_chunk(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(RepositoryError::from)
    }

    pub async fn find_by_project(&self, project_id: &str) -> Result<Vec<CodeChunk>, RepositoryError> {
        let project_id = project_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM code_chunks WHERE project_id = ?1",
                    Self::SELECT_COLUMNS
                ))?;
                let mut rows = stmt.query(rusqlite::params![project_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_chunk(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(RepositoryError::from)
    }

    pub async fn find_by_hash(&self, hash: &str) -> Result<Vec<CodeChunk>, RepositoryError> {
        let hash = hash.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM code_chunks WHERE hash = ?1",
                    Self::SELECT_COLUMNS
                ))?;
                let mut rows = stmt.query(rusqlite::params![hash])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_chunk(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(RepositoryError::from)
    }

    pub async fn find_by_symbol(
        &self,
        symbol: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<CodeChunk>, RepositoryError> {
        let symbol_like = format!("%\"{}\"%", symbol);
        let project_id = project_id.map(|s| s.to_string());
        self.conn
            .call(move |conn| {
                let (sql, params): (String, Vec<Box<dyn rusqlite::ToSql>>) = match &project_id {
                    Some(pid) => (
                        format!(
                            "SELECT {} FROM code_chunks WHERE symbols LIKE ?1 AND project_id = ?2",
                            Self::SELECT_COLUMNS
                        ),
                        vec![Box::new(symbol_like.clone()), Box::new(pid.clone())],
                    ),
                    None => (
                        format!("SELECT {} FROM code_chunks WHERE symbols LIKE ?1", Self::SELECT_COLUMNS),
                        vec![Box::new(symbol_like.clone())],
                    ),
                };
                let mut stmt = conn.prepare(&sql)?;
                let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
                let mut rows = stmt.query(param_refs.as_slice())?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_chunk(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(RepositoryError::from)
    }

    pub async fn find_all(&self, limit: i64, offset: i64) -> Result<Vec<CodeChunk>, RepositoryError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM code_chunks LIMIT ?1 OFFSET ?2",
                    Self::SELECT_COLUMNS
                ))?;
                let mut rows = stmt.query(rusqlite::params![limit, offset])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_chunk(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(RepositoryError::from)
    }

    pub async fn find_all_with_embeddings(
        &self,
        project_id: &str,
    ) -> Result<Vec<CodeChunk>, RepositoryError> {
        let project_id = project_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM code_chunks WHERE project_id = ?1 AND embedding IS NOT NULL",
                    Self::SELECT_COLUMNS
                ))?;
                let mut rows = stmt.query(rusqlite::params![project_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_chunk(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(RepositoryError::from)
    }

    pub async fn has_file(&self, file: &str) -> Result<bool, RepositoryError> {
        let file = file.to_string();
        let n: i64 = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM code_chunks WHERE file = ?1",
                    rusqlite::params![file],
                    |r| r.get(0),
                )
            })
            .await?;
        Ok(n > 0)
    }

    pub async fn count(&self, project_id: Option<&str>) -> Result<u64, RepositoryError> {
        let project_id = project_id.map(|s| s.to_string());
        let n: i64 = self
            .conn
            .call(move |conn| match &project_id {
                Some(pid) => conn.query_row(
                    "SELECT COUNT(*) FROM code_chunks WHERE project_id = ?1",
                    rusqlite::params![pid],
                    |r| r.get(0),
                ),
                None => conn.query_row("SELECT COUNT(*) FROM code_chunks", [], |r| r.get(0)),
            })
            .await?;
        Ok(n as u64)
    }

    pub async fn get_files(&self, project_id: &str) -> Result<Vec<String>, RepositoryError> {
        let project_id = project_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT file FROM code_chunks WHERE project_id = ?1 ORDER BY file",
                )?;
                let mut rows = stmt.query(rusqlite::params![project_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row.get(0)?);
                }
                Ok(out)
            })
            .await
            .map_err(RepositoryError::from)
    }

    pub async fn get_file_hashes(&self, file: &str) -> Result<HashMap<String, String>, RepositoryError> {
        let file = file.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT id, hash FROM code_chunks WHERE file = ?1")?;
                let mut rows = stmt.query(rusqlite::params![file])?;
                let mut out = HashMap::new();
                while let Some(row) = rows.next()? {
                    out.insert(row.get(0)?, row.get(1)?);
                }
                Ok(out)
            })
            .await
            .map_err(RepositoryError::from)
    }
}

// ---------------------------------------------------------------------------
// CheckpointStore (§4.12 expansion)
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
    async fn load(&self, id: Uuid) -> Result<Checkpoint, CheckpointError>;
    async fn list_by_project(&self, project_id: &str) -> Result<Vec<Checkpoint>, CheckpointError>;
}

/// SQLite-backed `CheckpointStore`, persisted the same way code chunks are.
pub struct SqliteCheckpointStore {
    conn: Connection,
}

impl SqliteCheckpointStore {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let conn = Connection::open(path.as_ref()).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn new_in_memory() -> Result<Self, CheckpointError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), CheckpointError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA busy_timeout=5000;

                    CREATE TABLE IF NOT EXISTS checkpoints (
                        id                  TEXT PRIMARY KEY,
                        name                TEXT,
                        project_id          TEXT NOT NULL,
                        wave_id             INTEGER NOT NULL,
                        completed_task_ids  TEXT NOT NULL,
                        pending_task_ids    TEXT NOT NULL,
                        timestamp           INTEGER NOT NULL,
                        coordinator_state   TEXT NOT NULL,
                        git_commit          TEXT
                    );
                    CREATE INDEX IF NOT EXISTS idx_checkpoints_project ON checkpoints(project_id);
                    ",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let id = checkpoint.id.to_string();
        let name = checkpoint.name.clone();
        let project_id = checkpoint.project_id.clone();
        let wave_id = checkpoint.wave_id as i64;
        let completed = serde_json::to_string(&checkpoint.completed_task_ids)
            .map_err(|e| CheckpointError::MalformedPayload(e.to_string()))?;
        let pending = serde_json::to_string(&checkpoint.pending_task_ids)
            .map_err(|e| CheckpointError::MalformedPayload(e.to_string()))?;
        let timestamp = checkpoint.timestamp.timestamp_millis();
        let coordinator_state = enum_to_sql(&checkpoint.coordinator_state);
        let git_commit = checkpoint.git_commit.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO checkpoints
                        (id, name, project_id, wave_id, completed_task_ids, pending_task_ids,
                         timestamp, coordinator_state, git_commit)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
                     ON CONFLICT(id) DO UPDATE SET
                        name=excluded.name, wave_id=excluded.wave_id,
                        completed_task_ids=excluded.completed_task_ids,
                        pending_task_ids=excluded.pending_task_ids,
                        timestamp=excluded.timestamp, coordinator_state=excluded.coordinator_state,
                        git_commit=excluded.git_commit",
                    rusqlite::params![
                        id, name, project_id, wave_id, completed, pending, timestamp,
                        coordinator_state, git_commit,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Checkpoint, CheckpointError> {
        let id_str = id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT id, name, project_id, wave_id, completed_task_ids, pending_task_ids,
                            timestamp, coordinator_state, git_commit
                     FROM checkpoints WHERE id = ?1",
                    rusqlite::params![id_str],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, i64>(6)?,
                            row.get::<_, String>(7)?,
                            row.get::<_, Option<String>>(8)?,
                        ))
                    },
                )
                .optional()
            })
            .await?;

        let (id_str, name, project_id, wave_id, completed, pending, timestamp, state_str, git_commit) =
            row.ok_or(CheckpointError::NotFound(id))?;

        Ok(Checkpoint {
            id: Uuid::parse_str(&id_str).map_err(|e| CheckpointError::MalformedPayload(e.to_string()))?,
            name,
            project_id,
            wave_id: wave_id as u32,
            completed_task_ids: serde_json::from_str(&completed)
                .map_err(|e| CheckpointError::MalformedPayload(e.to_string()))?,
            pending_task_ids: serde_json::from_str(&pending)
                .map_err(|e| CheckpointError::MalformedPayload(e.to_string()))?,
            timestamp: chrono::DateTime::from_timestamp_millis(timestamp).unwrap_or_else(Utc::now),
            coordinator_state: parse_coordinator_state(&state_str)?,
            git_commit,
        })
    }

    async fn list_by_project(&self, project_id: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        let project_id = project_id.to_string();
        let ids: Vec<String> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT id FROM checkpoints WHERE project_id = ?1")?;
                let mut rows = stmt.query(rusqlite::params![project_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row.get(0)?);
                }
                Ok(out)
            })
            .await?;

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let uuid = Uuid::parse_str(&id).map_err(|e| CheckpointError::MalformedPayload(e.to_string()))?;
            out.push(self.load(uuid).await?);
        }
        Ok(out)
    }
}

fn parse_coordinator_state(raw: &str) -> Result<CoordinatorState, CheckpointError> {
    let quoted = format!("\"{}\"", raw);
    serde_json::from_str(&quoted).map_err(|e| CheckpointError::MalformedPayload(e.to_string()))
}

/// In-memory `CheckpointStore` used by tests that don't need SQLite.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    inner: Mutex<HashMap<Uuid, Checkpoint>>,
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.inner.lock().unwrap().insert(checkpoint.id, checkpoint.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Checkpoint, CheckpointError> {
        self.inner
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(CheckpointError::NotFound(id))
    }

    async fn list_by_project(&self, project_id: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkType;

    fn sample_chunk(id: &str, file: &str, embedding: Option<Vec<f32>>) -> CodeChunk {
        CodeChunk {
            id: id.to_string(),
            project_id: "proj1".into(),
            file: file.to_string(),
            start_line: 1,
            end_line: 10,
            content: "fn foo() {}".into(),
            embedding,
            symbols: vec!["foo".into()],
            chunk_type: ChunkType::Function,
            language: "rust".into(),
            hash: "abc123".into(),
            complexity: Some(1),
            dependencies: None,
            exports: None,
            documentation: None,
            indexed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_find_by_id() {
        let repo = CodeChunkRepository::new_in_memory().await.unwrap();
        let chunk = sample_chunk("c1", "src/lib.rs", Some(vec![1.0, 2.0, 3.0]));
        repo.insert(&chunk).await.unwrap();

        let found = repo.find_by_id("c1").await.unwrap().unwrap();
        assert_eq!(found.file, "src/lib.rs");
        assert_eq!(found.embedding, Some(vec![1.0, 2.0, 3.0]));
    }

    #[tokio::test]
    async fn empty_embedding_persists_as_null() {
        let repo = CodeChunkRepository::new_in_memory().await.unwrap();
        let chunk = sample_chunk("c2", "src/lib.rs", Some(vec![]));
        repo.insert(&chunk).await.unwrap();

        let found = repo.find_by_id("c2").await.unwrap().unwrap();
        assert_eq!(found.embedding, None);
    }

    #[tokio::test]
    async fn find_by_file_orders_by_start_line() {
        let repo = CodeChunkRepository::new_in_memory().await.unwrap();
        let mut c1 = sample_chunk("c1", "f.rs", None);
        c1.start_line = 20;
        let mut c2 = sample_chunk("c2", "f.rs", None);
        c2.start_line = 5;
        repo.insert_many(&[c1, c2]).await.unwrap();

        let found = repo.find_by_file("f.rs").await.unwrap();
        assert_eq!(found[0].id, "c2");
        assert_eq!(found[1].id, "c1");
    }

    #[tokio::test]
    async fn delete_by_file_returns_count() {
        let repo = CodeChunkRepository::new_in_memory().await.unwrap();
        repo.insert_many(&[sample_chunk("c1", "f.rs", None), sample_chunk("c2", "f.rs", None)])
            .await
            .unwrap();
        let n = repo.delete_by_file("f.rs").await.unwrap();
        assert_eq!(n, 2);
        assert!(!repo.has_file("f.rs").await.unwrap());
    }

    #[tokio::test]
    async fn reinserting_same_id_is_idempotent() {
        let repo = CodeChunkRepository::new_in_memory().await.unwrap();
        let chunk = sample_chunk("c1", "f.rs", Some(vec![1.0]));
        repo.insert(&chunk).await.unwrap();
        repo.insert(&chunk).await.unwrap();
        assert_eq!(repo.count(Some("proj1")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn checkpoint_roundtrip() {
        let store = SqliteCheckpointStore::new_in_memory().await.unwrap();
        let cp = Checkpoint {
            id: Uuid::new_v4(),
            name: Some("cp1".into()),
            project_id: "proj1".into(),
            wave_id: 2,
            completed_task_ids: vec!["t1".into()],
            pending_task_ids: vec!["t2".into()],
            timestamp: Utc::now(),
            coordinator_state: CoordinatorState::Paused,
            git_commit: None,
        };
        store.save(&cp).await.unwrap();
        let back = store.load(cp.id).await.unwrap();
        assert_eq!(back.completed_task_ids, cp.completed_task_ids);
        assert_eq!(back.pending_task_ids, cp.pending_task_ids);
        assert_eq!(back.coordinator_state, cp.coordinator_state);
    }

    #[tokio::test]
    async fn checkpoint_not_found() {
        let store = SqliteCheckpointStore::new_in_memory().await.unwrap();
        let err = store.load(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound(_)));
    }

    #[tokio::test]
    async fn in_memory_checkpoint_store_lists_by_project() {
        let store = InMemoryCheckpointStore::default();
        let cp = Checkpoint {
            id: Uuid::new_v4(),
            name: None,
            project_id: "proj1".into(),
            wave_id: 0,
            completed_task_ids: vec![],
            pending_task_ids: vec![],
            timestamp: Utc::now(),
            coordinator_state: CoordinatorState::Idle,
            git_commit: None,
        };
        store.save(&cp).await.unwrap();
        let list = store.list_by_project("proj1").await.unwrap();
        assert_eq!(list.len(), 1);
    }
}
