//! Similarity retrieval with provenance.

use std::time::Duration;

use tracing::debug;

use crate::error::PipelineError;
use crate::providers::with_deadline;
use crate::store::{DocumentStore, VectorIndex};
use crate::types::RetrievedChunk;

/// Embeds a query with the same provider that built the index, searches, and
/// joins each hit to its parent document's provenance.
#[derive(Clone)]
pub struct Retriever {
    index: VectorIndex,
    documents: DocumentStore,
    timeout: Duration,
}

impl Retriever {
    pub fn new(index: VectorIndex, documents: DocumentStore, timeout: Duration) -> Self {
        Self {
            index,
            documents,
            timeout,
        }
    }

    /// Top-`k` chunks scoring at least `min_score`, highest first.
    ///
    /// An empty result means no indexed passage was relevant enough to
    /// ground an answer. That is a normal outcome the caller must handle, not an
    /// error.
    pub async fn retrieve(
        &self,
        query_text: &str,
        k: usize,
        min_score: f32,
    ) -> Result<Vec<RetrievedChunk>, PipelineError> {
        let embedder = self.index.embedder();
        let query_vector = with_deadline(self.timeout, embedder.embed(query_text)).await?;
        let scored = self
            .index
            .search(&query_vector, self.index.model_id(), k)
            .await?;

        let mut results = Vec::with_capacity(scored.len());
        for hit in scored {
            if hit.score < min_score {
                continue;
            }
            let document = self
                .documents
                .get_info(&hit.chunk.document_id)
                .await?
                .ok_or_else(|| {
                    PipelineError::Storage(format!(
                        "chunk {} references retired document {}",
                        hit.chunk.id, hit.chunk.document_id
                    ))
                })?;
            results.push(RetrievedChunk {
                chunk: hit.chunk,
                score: hit.score,
                document,
            });
        }
        debug!(
            query_chars = query_text.chars().count(),
            hits = results.len(),
            min_score,
            "retrieval complete"
        );
        Ok(results)
    }
}
