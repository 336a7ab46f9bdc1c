pub mod models;

use crate::embedding::{embedding_to_bytes, VECTOR_ENCODING};
use crate::error::{RagError, Result};
use models::{document_name, Chunk, Collection};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Marks a row as a live document chunk; other values are reserved.
const OP_ADD: i64 = 1;

pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    pub fn new(app_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(app_dir)?;
        Self::open(&app_dir.join("embeddings.db"))
    }

    pub fn open(path: &Path) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS embeddings_queue (
                seq_id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                operation INTEGER NOT NULL,
                topic TEXT NOT NULL,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                vector BLOB,
                encoding TEXT,
                metadata TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_embeddings_queue_id ON embeddings_queue (id);

            CREATE TABLE IF NOT EXISTS collections (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                topic TEXT NOT NULL,
                UNIQUE (name)
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Collections ──

    pub fn insert_collection(&self, name: &str) -> Result<Collection> {
        let conn = self.conn.lock();
        let collection = Collection {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            topic: name.to_string(),
        };
        conn.execute(
            "INSERT INTO collections (id, name, topic) VALUES (?1, ?2, ?3)",
            params![collection.id, collection.name, collection.topic],
        )?;
        Ok(collection)
    }

    pub fn collection_exists(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM collections WHERE name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn collection_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    /// Name of the `index`-th collection in insertion order (0-based)
    pub fn collection_at(&self, index: usize) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let name = conn
            .query_row(
                "SELECT name FROM collections ORDER BY rowid LIMIT 1 OFFSET ?1",
                params![index as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    // ── Chunks ──

    /// Insert a chunk with its vector.
    ///
    /// Returns `None` without writing when a row with the same id or a
    /// byte-identical vector already exists (first write wins). The check and
    /// the insert run under one lock, so the dedup is atomic for this handle.
    pub fn insert_chunk(&self, id: &str, text: &str, embedding: &[f32]) -> Result<Option<i64>> {
        if embedding.is_empty() {
            return Err(RagError::data(format!("empty embedding for {}", id)));
        }
        let bytes = embedding_to_bytes(embedding);
        let conn = self.conn.lock();

        let existing = conn
            .query_row(
                "SELECT seq_id FROM embeddings_queue WHERE id = ?1 OR vector = ?2 LIMIT 1",
                params![id, bytes],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(None);
        }

        let stored_len: Option<i64> = conn
            .query_row(
                "SELECT length(vector) FROM embeddings_queue WHERE operation = ?1 AND vector IS NOT NULL LIMIT 1",
                params![OP_ADD],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(len) = stored_len {
            if len as usize != bytes.len() {
                return Err(RagError::data(format!(
                    "dimension mismatch for {}: store holds {} values, got {}",
                    id,
                    len / 4,
                    embedding.len()
                )));
            }
        }

        conn.execute(
            "INSERT INTO embeddings_queue (operation, topic, collection, id, vector, encoding) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![OP_ADD, text, document_name(id), id, bytes, VECTOR_ENCODING],
        )?;
        Ok(Some(conn.last_insert_rowid()))
    }

    pub fn delete_chunk(&self, id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM embeddings_queue WHERE id = ?1", params![id])?)
    }

    /// Raw `(id, vector blob)` pairs of every live chunk in insertion order
    pub fn scan_vectors(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, vector FROM embeddings_queue WHERE operation = ?1 ORDER BY seq_id",
        )?;
        let rows = stmt.query_map(params![OP_ADD], |row| {
            Ok((row.get(0)?, row.get::<_, Option<Vec<u8>>>(1)?.unwrap_or_default()))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn vector_blob(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let blob = conn
            .query_row(
                "SELECT vector FROM embeddings_queue WHERE id = ?1",
                params![id],
                |row| row.get::<_, Option<Vec<u8>>>(0),
            )
            .optional()?;
        Ok(blob.flatten())
    }

    pub fn chunk_by_id(&self, id: &str) -> Result<Option<Chunk>> {
        self.query_chunk("WHERE id = ?1", params![id])
    }

    pub fn chunk_by_sequence(&self, sequence: i64) -> Result<Option<Chunk>> {
        self.query_chunk("WHERE seq_id = ?1", params![sequence])
    }

    fn query_chunk(&self, filter: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Option<Chunk>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT id, collection, topic, seq_id, created_at FROM embeddings_queue {}",
            filter
        );
        let chunk = conn
            .query_row(&sql, params, |row| {
                Ok(Chunk {
                    id: row.get(0)?,
                    collection: row.get(1)?,
                    text: row.get(2)?,
                    sequence: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .optional()?;
        Ok(chunk)
    }

    pub fn chunk_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM embeddings_queue WHERE operation = ?1",
            params![OP_ADD],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ── Settings ──

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }
}
