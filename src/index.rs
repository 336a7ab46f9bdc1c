//! Vector index abstraction used by the store's ranking pass.
//!
//! The store scans `(id, vector)` pairs and hands them to a [`VectorIndex`],
//! which picks the best `top_k` positions. [`LinearScan`] is exact and the
//! default; [`BinaryQuantizedIndex`] trades recall for a cheaper first pass.

use crate::embedding::{cosine_similarity, rank_top_k};
use serde::{Deserialize, Serialize};

/// A stored vector as seen by the ranking pass
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
}

pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return `(position in entries, score)` for at most `top_k` entries,
    /// best first. All entries have the query's dimensionality.
    fn search(&self, query: &[f32], entries: &[IndexEntry], top_k: usize) -> Vec<(usize, f32)>;
}

/// Exact cosine similarity over every entry
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScan;

impl VectorIndex for LinearScan {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn search(&self, query: &[f32], entries: &[IndexEntry], top_k: usize) -> Vec<(usize, f32)> {
        let scored = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();
        rank_top_k(scored, top_k)
    }
}

/// Sign-bit codes packed into u64 words
#[derive(Debug, Clone, PartialEq, Eq)]
struct SignCode(Vec<u64>);

impl SignCode {
    fn quantize(vector: &[f32]) -> Self {
        let mut words = vec![0u64; vector.len().div_ceil(64)];
        for (i, &v) in vector.iter().enumerate() {
            if v >= 0.0 {
                words[i / 64] |= 1u64 << (i % 64);
            }
        }
        Self(words)
    }

    fn hamming(&self, other: &Self) -> u32 {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// Two-stage search: Hamming distance on sign bits picks
/// `ceil(top_k * rerank_multiplier)` candidates, which are then reranked by
/// exact cosine similarity.
#[derive(Debug, Clone, Copy)]
pub struct BinaryQuantizedIndex {
    pub rerank_multiplier: f32,
}

impl Default for BinaryQuantizedIndex {
    fn default() -> Self {
        Self {
            rerank_multiplier: 4.0,
        }
    }
}

impl VectorIndex for BinaryQuantizedIndex {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn search(&self, query: &[f32], entries: &[IndexEntry], top_k: usize) -> Vec<(usize, f32)> {
        if entries.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let code = SignCode::quantize(query);
        let rerank = ((top_k as f32 * self.rerank_multiplier).ceil() as usize).max(top_k);

        let mut candidates: Vec<(usize, u32)> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, code.hamming(&SignCode::quantize(&e.vector))))
            .collect();
        candidates.sort_by_key(|(_, dist)| *dist);
        candidates.truncate(rerank);
        // back to scan order so exact ties stay stable
        candidates.sort_by_key(|(i, _)| *i);

        let scored = candidates
            .into_iter()
            .map(|(i, _)| (i, cosine_similarity(query, &entries[i].vector)))
            .collect();
        rank_top_k(scored, top_k)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    Linear,
    Binary,
}

impl IndexKind {
    pub fn build(self) -> Box<dyn VectorIndex> {
        match self {
            IndexKind::Linear => Box::new(LinearScan),
            IndexKind::Binary => Box::new(BinaryQuantizedIndex::default()),
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            IndexKind::Linear => "linear",
            IndexKind::Binary => "binary",
        })
    }
}

impl std::str::FromStr for IndexKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(IndexKind::Linear),
            "binary" => Ok(IndexKind::Binary),
            other => Err(format!("Unknown index kind: {}", other)),
        }
    }
}
