use serde::{Deserialize, Serialize};

/// A stored document chunk. `sequence` is the store-assigned insertion order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub collection: String,
    pub text: String,
    pub sequence: i64,
    pub created_at: String,
}

impl Chunk {
    /// Source document name, the id up to the first `:`
    pub fn document_name(&self) -> &str {
        document_name(&self.id)
    }
}

pub fn document_name(chunk_id: &str) -> &str {
    chunk_id.split(':').next().unwrap_or(chunk_id)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub topic: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk_id: String,
    pub text: String,
    pub sequence: i64,
    /// NaN when either vector has zero magnitude
    pub score: f32,
}
