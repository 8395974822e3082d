//! Ingestion orchestration: store, split, embed with bounded retry.

use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::chunker::Chunker;
use crate::config::RetryPolicy;
use crate::error::PipelineError;
use crate::providers::with_deadline;
use crate::store::{DocumentStore, PutStatus, VectorIndex};
use crate::types::Chunk;

/// One `(source_url, title, raw_text)` tuple handed over by an external
/// crawler or any other ingestion trigger.
#[derive(Clone, Debug)]
pub struct SourcePage {
    pub source_url: String,
    pub title: String,
    pub raw_text: String,
}

impl SourcePage {
    pub fn new(
        source_url: impl Into<String>,
        title: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            raw_text: raw_text.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestStatus {
    /// Stored text was identical; nothing re-chunked or re-embedded.
    Unchanged,
    /// Every chunk embedded and indexed.
    Indexed,
    /// Some chunks exhausted their retry budget; the rest stay searchable.
    PartiallyIndexed,
}

#[derive(Clone, Debug)]
pub struct IngestOutcome {
    pub document_id: String,
    pub source_url: String,
    pub status: IngestStatus,
    pub chunks_indexed: usize,
    pub chunks_failed: usize,
}

/// Batch result: per-document outcomes plus the documents that were rejected
/// outright. A single bad page never aborts the batch.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub outcomes: Vec<IngestOutcome>,
    pub rejected: Vec<(String, PipelineError)>,
}

impl IngestReport {
    pub fn documents_indexed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status != IngestStatus::Unchanged)
            .count()
    }

    pub fn has_failures(&self) -> bool {
        !self.rejected.is_empty()
            || self
                .outcomes
                .iter()
                .any(|o| o.status == IngestStatus::PartiallyIndexed)
    }
}

/// Drives a page through document storage, chunking, and embedding.
#[derive(Clone)]
pub struct IngestPipeline {
    documents: DocumentStore,
    chunker: Chunker,
    index: VectorIndex,
    retry: RetryPolicy,
    timeout: Duration,
}

impl IngestPipeline {
    pub fn new(
        documents: DocumentStore,
        chunker: Chunker,
        index: VectorIndex,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            documents,
            chunker,
            index,
            retry,
            timeout,
        }
    }

    /// Ingests one page. Identical re-ingests are a no-op; changed pages
    /// supersede the prior document before their chunks are re-embedded.
    ///
    /// Embedding failures are retried with exponential backoff; a chunk that
    /// exhausts its budget is counted in `chunks_failed` while the already
    /// embedded chunks remain searchable.
    pub async fn ingest_page(&self, page: &SourcePage) -> Result<IngestOutcome, PipelineError> {
        let put = self
            .documents
            .put(&page.source_url, &page.title, &page.raw_text)
            .await?;

        if put.status == PutStatus::Unchanged {
            return Ok(IngestOutcome {
                document_id: put.document.id,
                source_url: page.source_url.clone(),
                status: IngestStatus::Unchanged,
                chunks_indexed: 0,
                chunks_failed: 0,
            });
        }

        let chunks = self.chunker.split(&put.document);
        let mut indexed = 0usize;
        let mut failed = 0usize;
        for chunk in &chunks {
            match self.upsert_with_retry(chunk).await {
                Ok(()) => indexed += 1,
                Err(err) => {
                    warn!(
                        source_url = %page.source_url,
                        ordinal = chunk.ordinal,
                        error = %err,
                        "chunk embedding exhausted its retry budget"
                    );
                    failed += 1;
                }
            }
        }

        let status = if failed > 0 {
            IngestStatus::PartiallyIndexed
        } else {
            IngestStatus::Indexed
        };
        info!(
            source_url = %page.source_url,
            chunks = chunks.len(),
            indexed,
            failed,
            "page ingested"
        );
        Ok(IngestOutcome {
            document_id: put.document.id,
            source_url: page.source_url.clone(),
            status,
            chunks_indexed: indexed,
            chunks_failed: failed,
        })
    }

    /// Ingests a batch, isolating per-document errors.
    pub async fn ingest_batch(&self, pages: &[SourcePage]) -> IngestReport {
        let mut report = IngestReport::default();
        for page in pages {
            match self.ingest_page(page).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(err) => {
                    warn!(source_url = %page.source_url, error = %err, "page rejected");
                    report.rejected.push((page.source_url.clone(), err));
                }
            }
        }
        info!(
            pages = pages.len(),
            indexed = report.documents_indexed(),
            rejected = report.rejected.len(),
            "batch ingestion finished"
        );
        report
    }

    async fn upsert_with_retry(&self, chunk: &Chunk) -> Result<(), PipelineError> {
        let mut attempt = 1u32;
        loop {
            match with_deadline(self.timeout, self.index.upsert(chunk)).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let jitter = Duration::from_millis(rand::rng().random_range(0..100));
                    let delay = self.retry.delay_for(attempt) + jitter;
                    warn!(
                        chunk_id = %chunk.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "embedding failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
