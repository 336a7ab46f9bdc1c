use crate::error::{RagError, Result};
use std::cmp::Ordering;

/// Tag written to the `encoding` column for vectors produced by [`embedding_to_bytes`]
pub const VECTOR_ENCODING: &str = "f32le";

/// Cosine similarity between two vectors of equal length.
///
/// A zero-magnitude input yields NaN; rank with [`compare_scores`] so such
/// results end up last.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm_a * norm_b)
}

/// Descending order by score with NaN after every real number.
pub fn compare_scores(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

/// Sort scored ids best-first and keep `top_k`. The sort is stable, so equal
/// scores keep their scan order.
pub fn rank_top_k<T>(mut scored: Vec<(T, f32)>, top_k: usize) -> Vec<(T, f32)> {
    scored.sort_by(|a, b| compare_scores(a.1, b.1));
    scored.truncate(top_k);
    scored
}

/// Serialize embedding to bytes for SQLite BLOB storage
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize embedding from SQLite BLOB bytes
pub fn bytes_to_embedding(id: &str, bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(RagError::MalformedVector {
            id: id.to_string(),
            len: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector_is_nan() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_nan());
    }

    #[test]
    fn test_rank_puts_nan_last_and_keeps_ties_stable() {
        let scored = vec![("a", 0.5), ("nan", f32::NAN), ("b", 0.9), ("c", 0.5)];
        let ranked = rank_top_k(scored, 10);
        let ids: Vec<_> = ranked.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec!["b", "a", "c", "nan"]);
    }

    #[test]
    fn test_rank_truncates() {
        let scored = vec![(1, 0.1), (2, 0.2), (3, 0.3)];
        assert_eq!(rank_top_k(scored, 2), vec![(3, 0.3), (2, 0.2)]);
    }

    #[test]
    fn test_embedding_roundtrip_bit_exact() {
        let emb = vec![0.1, 0.2, -0.3, 0.4, f32::MIN_POSITIVE, -0.0];
        let bytes = embedding_to_bytes(&emb);
        let back = bytes_to_embedding("x", &bytes).unwrap();
        let bits = |v: &[f32]| v.iter().map(|f| f.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&emb), bits(&back));
    }

    #[test]
    fn test_malformed_blob_rejected() {
        assert!(bytes_to_embedding("x", &[1, 2, 3]).is_err());
        assert!(bytes_to_embedding("x", &[]).is_err());
    }
}
