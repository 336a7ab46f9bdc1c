//! Embedding store: chunk and collection bookkeeping plus top-k retrieval.
//!
//! Every operation is non-fatal. Failures go to the [`Reporter`] and the call
//! returns an empty, `false` or `None` result instead.

use crate::db::models::{Chunk, SearchResult};
use crate::db::Database;
use crate::embedding::bytes_to_embedding;
use crate::error::{RagError, Reporter, Result};
use crate::index::{IndexEntry, LinearScan, VectorIndex};

pub struct EmbeddingStore {
    db: Database,
    index: Box<dyn VectorIndex>,
    reporter: Reporter,
}

impl EmbeddingStore {
    pub fn new(db: Database, reporter: Reporter) -> Self {
        Self::with_index(db, Box::new(LinearScan), reporter)
    }

    pub fn with_index(db: Database, index: Box<dyn VectorIndex>, reporter: Reporter) -> Self {
        Self {
            db,
            index,
            reporter,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn add_collection(&self, name: &str) -> bool {
        let result = self.db.insert_collection(name).map(|c| {
            log::info!("Added collection {} ({})", c.name, c.id);
        });
        self.reporter
            .or_report("Error inserting collection", result.map(|_| true), false)
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.reporter.or_report(
            "Error selecting collection",
            self.db.collection_exists(name),
            false,
        )
    }

    pub fn list_collections(&self) -> Vec<String> {
        self.reporter
            .or_report("Error selecting collections", self.db.collection_names(), Vec::new())
    }

    pub fn collection_at(&self, index: usize) -> Option<String> {
        self.reporter
            .or_report("Error selecting collection", self.db.collection_at(index), None)
    }

    /// Store a chunk and its embedding. Returns whether a row was written.
    ///
    /// A row with the same id or a byte-identical vector counts as already
    /// ingested and the call is a silent no-op. Vectors that differ only by
    /// float noise are not considered equal; this is not a content hash.
    pub fn add_document(&self, id: &str, text: &str, embedding: &[f32]) -> bool {
        self.reporter.or_report(
            "Error inserting document",
            self.store_chunk(id, text, embedding),
            false,
        )
    }

    /// Like [`add_document`](Self::add_document) but hands failures back
    /// instead of reporting them. `Ok(false)` is a dedup skip.
    pub fn store_chunk(&self, id: &str, text: &str, embedding: &[f32]) -> Result<bool> {
        match self.db.insert_chunk(id, text, embedding)? {
            Some(sequence) => {
                log::debug!("Stored {} as #{}", id, sequence);
                Ok(true)
            }
            None => {
                log::debug!("Document {} already exists in the database", id);
                Ok(false)
            }
        }
    }

    /// True when the delete ran, whether or not a row matched.
    pub fn remove_document(&self, id: &str) -> bool {
        let result = self.db.delete_chunk(id).map(|n| {
            log::debug!("Removed {} row(s) for {}", n, id);
            true
        });
        self.reporter
            .or_report("Error deleting document", result, false)
    }

    pub fn document_at(&self, sequence: i64) -> Option<Chunk> {
        self.reporter.or_report(
            "Error selecting document",
            self.db.chunk_by_sequence(sequence),
            None,
        )
    }

    /// Stored vector for `id`, exactly as it was written
    pub fn embedding(&self, id: &str) -> Option<Vec<f32>> {
        let result = self
            .db
            .vector_blob(id)
            .and_then(|blob| blob.map(|b| bytes_to_embedding(id, &b)).transpose());
        self.reporter
            .or_report("Error selecting embedding", result, None)
    }

    pub fn chunk_count(&self) -> usize {
        self.reporter
            .or_report("Error counting documents", self.db.chunk_count(), 0)
    }

    /// Rank every stored chunk against `query` and return the best `top_k`.
    ///
    /// Scoring only touches ids and vectors; text and sequence are loaded for
    /// the winners afterwards.
    pub fn find_documents(&self, query: &[f32], top_k: usize) -> Vec<SearchResult> {
        if query.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let rows = match self.db.scan_vectors() {
            Ok(rows) => rows,
            Err(e) => {
                self.reporter.report("Error selecting documents", &e);
                return Vec::new();
            }
        };

        let mut entries = Vec::with_capacity(rows.len());
        for (id, blob) in rows {
            match self.decode_entry(&id, &blob, query.len()) {
                Ok(vector) => entries.push(IndexEntry { id, vector }),
                Err(e) => {
                    log::warn!("Skipping {} during ranking", id);
                    self.reporter.report("Error reading embedding", &e);
                }
            }
        }

        self.index
            .search(query, &entries, top_k)
            .into_iter()
            .filter_map(|(pos, score)| self.hydrate(&entries[pos].id, score))
            .collect()
    }

    fn decode_entry(&self, id: &str, blob: &[u8], dimensions: usize) -> Result<Vec<f32>> {
        let vector = bytes_to_embedding(id, blob)?;
        if vector.len() != dimensions {
            return Err(RagError::data(format!(
                "{} has {} dimensions, query has {}",
                id,
                vector.len(),
                dimensions
            )));
        }
        Ok(vector)
    }

    fn hydrate(&self, id: &str, score: f32) -> Option<SearchResult> {
        let chunk = self
            .reporter
            .or_report("Error selecting metadata", self.db.chunk_by_id(id), None)?;
        Some(SearchResult {
            chunk_id: chunk.id,
            text: chunk.text,
            sequence: chunk.sequence,
            score,
        })
    }
}
