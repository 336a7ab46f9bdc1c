//! Boundary-respecting document chunker.
//!
//! Pages are normalized and appended one at a time; whenever the unconsumed
//! text grows past `chunk_length` a chunk is cut at the next whitespace, and
//! the following chunk starts a little before that cut so neighbours overlap
//! by roughly `overlap` characters. Offsets and lengths are in `char`s.

use crate::doc_processor::{normalize_text, SourceDocument};
use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Minimum length of every chunk except the last
    pub chunk_length: usize,
    /// Approximate overlap between consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_length: 800,
            overlap: 80,
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_length == 0 || self.overlap >= self.chunk_length {
            return Err(RagError::data(format!(
                "invalid chunk config: overlap {} must be smaller than chunk length {}",
                self.overlap, self.chunk_length
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    /// `<document>:<page>:<index>`
    pub id: String,
    pub text: String,
    /// 1-based page whose text completed this chunk
    pub page: usize,
    /// Char offset of the chunk in [`document_text`]
    pub offset: usize,
}

/// The normalized text the chunker works on: normalized pages joined by `\n`.
pub fn document_text(pages: &[String]) -> String {
    pages
        .iter()
        .map(|p| normalize_text(p))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn chunk_document(doc: &SourceDocument, config: &ChunkConfig) -> Result<Vec<DocumentChunk>> {
    chunk_pages(&doc.name, &doc.pages, config)
}

pub fn chunk_pages(name: &str, pages: &[String], config: &ChunkConfig) -> Result<Vec<DocumentChunk>> {
    config.validate()?;
    let length = config.chunk_length;

    let mut text: Vec<char> = Vec::new();
    let mut start = 0;
    let mut chunks = Vec::new();

    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            text.push('\n');
        }
        text.extend(normalize_text(page).chars());

        let mut index = 0;
        while text.len() - start > length {
            let rest = &text[start..];
            // No boundary yet; the next page may bring one.
            let Some(end) = (length..rest.len()).find(|&j| rest[j].is_whitespace()) else {
                break;
            };
            chunks.push(DocumentChunk {
                id: format!("{}:{}:{}", name, i + 1, index),
                text: rest[..end].iter().collect(),
                page: i + 1,
                offset: start,
            });
            start += next_start(rest, end, config);
            index += 1;
        }
    }

    let rest = &text[start..];
    let body: Vec<char> = rest
        .iter()
        .copied()
        .skip_while(|c| c.is_whitespace())
        .collect();
    if body.is_empty() {
        return Ok(chunks);
    }
    if body.len() > length && !body.iter().any(|c| c.is_whitespace()) {
        return Err(RagError::data(format!(
            "{}: {} characters without a whitespace boundary",
            name,
            body.len()
        )));
    }

    let page_count = pages.len();
    chunks.push(DocumentChunk {
        id: format!("{}:{}:{}", name, page_count, chunks.len()),
        text: rest.iter().collect(),
        page: page_count,
        offset: start,
    });
    Ok(chunks)
}

/// Start of the next chunk relative to the current one. Always in `1..=end`.
fn next_start(rest: &[char], end: usize, config: &ChunkConfig) -> usize {
    let window = config.chunk_length - config.overlap;
    if let Some(s) = (window..end).find(|&j| rest[j].is_whitespace()) {
        return s;
    }
    let mid = config.chunk_length / 2;
    (1..end)
        .filter(|&j| rest[j].is_whitespace())
        .min_by_key(|&j| j.abs_diff(mid))
        .unwrap_or(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| format!("word{}", i % 37))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn config(chunk_length: usize, overlap: usize) -> ChunkConfig {
        ChunkConfig {
            chunk_length,
            overlap,
        }
    }

    fn reconstruct(chunks: &[DocumentChunk]) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            match chunks.get(i + 1) {
                Some(next) => out.extend(chunk.text.chars().take(next.offset - chunk.offset)),
                None => out.push_str(&chunk.text),
            }
        }
        out
    }

    #[test]
    fn test_short_document_single_chunk() {
        let pages = vec!["Hello world".to_string()];
        let chunks = chunk_pages("a.pdf", &pages, &config(100, 20)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "a.pdf:1:0");
        assert_eq!(chunks[0].text, "Hello world");
    }

    #[test]
    fn test_empty_document_yields_nothing() {
        let pages = vec!["".to_string(), "  \n ".to_string()];
        assert!(chunk_pages("a.pdf", &pages, &config(100, 20)).unwrap().is_empty());
    }

    #[test]
    fn test_boundaries_fall_on_whitespace() {
        let pages = vec![words(400)];
        let text: Vec<char> = document_text(&pages).chars().collect();
        let chunks = chunk_pages("doc", &pages, &config(120, 30)).unwrap();
        assert!(chunks.len() > 3);

        for chunk in &chunks[..chunks.len() - 1] {
            let len = chunk.text.chars().count();
            assert!(len >= 120);
            assert!(text[chunk.offset + len].is_whitespace());
        }
    }

    #[test]
    fn test_chunks_cover_document() {
        let pages = vec![words(150), words(90), "tail end".to_string()];
        let chunks = chunk_pages("doc", &pages, &config(100, 25)).unwrap();
        assert_eq!(reconstruct(&chunks), document_text(&pages));
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let pages = vec![words(300)];
        let chunks = chunk_pages("doc", &pages, &config(100, 25)).unwrap();
        for pair in chunks.windows(2) {
            let first_end = pair[0].offset + pair[0].text.chars().count();
            assert!(pair[1].offset > pair[0].offset);
            assert!(pair[1].offset < first_end);
        }
    }

    #[test]
    fn test_ids_follow_pages_and_last_uses_total_count() {
        let pages = vec![words(60), words(60)];
        let chunks = chunk_pages("book.pdf", &pages, &config(100, 10)).unwrap();

        let last = chunks.last().unwrap();
        assert_eq!(last.id, format!("book.pdf:2:{}", chunks.len() - 1));
        assert_eq!(chunks[0].id, "book.pdf:1:0");
        assert!(chunks.iter().any(|c| c.id == "book.pdf:2:0"));

        let mut ids: Vec<_> = chunks.iter().map(|c| c.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), chunks.len());
    }

    #[test]
    fn test_no_whitespace_fails_document() {
        let pages = vec!["x".repeat(500)];
        let err = chunk_pages("blob", &pages, &config(100, 10)).unwrap_err();
        assert!(matches!(err, RagError::Data(_)));
    }

    #[test]
    fn test_long_word_waits_for_next_page() {
        let pages = vec!["y".repeat(150), words(40)];
        let chunks = chunk_pages("doc", &pages, &config(100, 10)).unwrap();
        assert_eq!(chunks[0].id, "doc:2:0");
        assert!(chunks[0].text.starts_with(&"y".repeat(150)));
        assert_eq!(reconstruct(&chunks), document_text(&pages));
    }

    #[test]
    fn test_overlap_window_without_whitespace_falls_back_to_midpoint() {
        // A single space near the middle, then a long run with no whitespace
        // until just past the chunk length.
        let text = format!("{} {} tail", "a".repeat(45), "b".repeat(60));
        let pages = vec![text];
        let chunks = chunk_pages("doc", &pages, &config(100, 10)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].offset, 45);
        assert_eq!(reconstruct(&chunks), document_text(&pages));
    }

    #[test]
    fn test_multibyte_text() {
        let pages = vec!["héllo wörld ünïcode ".repeat(30)];
        let chunks = chunk_pages("u", &pages, &config(50, 10)).unwrap();
        assert_eq!(reconstruct(&chunks), document_text(&pages));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let pages = vec![words(10)];
        assert!(chunk_pages("doc", &pages, &config(10, 10)).is_err());
        assert!(chunk_pages("doc", &pages, &config(0, 0)).is_err());
    }
}
