use super::Rag;
use crate::chunker::chunk_document;
use crate::db::models::SearchResult;
use crate::doc_processor::SourceDocument;
use crate::error::{RagError, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IngestOutcome {
    /// A collection with this name already exists
    AlreadyIngested,
    Ingested { chunks: usize, stored: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
    pub chunks_stored: usize,
}

/// Chunk, embed and store one document, then record it as a collection.
///
/// Chunks are embedded one at a time. The collection is only added once every
/// chunk is stored or already present, so a document that fails halfway
/// (backend or store error) is retried on the next run.
pub async fn ingest_document(rag: &Rag, doc: &SourceDocument) -> Result<IngestOutcome> {
    if rag.store.has_collection(&doc.name) {
        log::info!("Skipping {}, already ingested", doc.name);
        return Ok(IngestOutcome::AlreadyIngested);
    }

    let chunks = chunk_document(doc, &rag.config.chunk_config())?;
    log::info!("Embedding {} chunk(s) of {}", chunks.len(), doc.name);

    let mut stored = 0;
    for (i, chunk) in chunks.iter().enumerate() {
        let embedding = rag.client.embed(&chunk.text).await?;
        if rag.store.store_chunk(&chunk.id, &chunk.text, &embedding)? {
            stored += 1;
        }
        log::debug!("{}: {}/{}", doc.name, i + 1, chunks.len());
    }

    rag.store.add_collection(&doc.name);
    Ok(IngestOutcome::Ingested {
        chunks: chunks.len(),
        stored,
    })
}

/// Ingest documents in order. A failing document is reported and skipped;
/// the rest still go through.
pub async fn ingest_all<I>(rag: &Rag, docs: I) -> IngestSummary
where
    I: IntoIterator<Item = std::result::Result<SourceDocument, (String, RagError)>>,
{
    let mut summary = IngestSummary::default();
    for doc in docs {
        let doc = match doc {
            Ok(doc) => doc,
            Err((name, e)) => {
                rag.reporter().report(&format!("Error loading {}", name), &e);
                summary.failed += 1;
                continue;
            }
        };
        match ingest_document(rag, &doc).await {
            Ok(IngestOutcome::AlreadyIngested) => summary.skipped += 1,
            Ok(IngestOutcome::Ingested { stored, .. }) => {
                summary.ingested += 1;
                summary.chunks_stored += stored;
            }
            Err(e) => {
                rag.reporter()
                    .report(&format!("Error ingesting {}", doc.name), &e);
                summary.failed += 1;
            }
        }
    }
    log::info!(
        "Ingestion finished: {} new, {} skipped, {} failed",
        summary.ingested,
        summary.skipped,
        summary.failed
    );
    summary
}

/// Top-k chunks for a free-text query
pub async fn search_knowledge_base(
    rag: &Rag,
    query: &str,
    top_k: Option<usize>,
) -> Result<Vec<SearchResult>> {
    let top_k = top_k.unwrap_or(rag.config.top_k);
    let embedding = rag.client.embed(query).await?;
    Ok(rag.store.find_documents(&embedding, top_k))
}

/// Source document of a cited chunk, by its sequence number
pub fn resolve_citation(rag: &Rag, sequence: i64) -> Option<String> {
    rag.store
        .document_at(sequence)
        .map(|chunk| chunk.document_name().to_string())
}
