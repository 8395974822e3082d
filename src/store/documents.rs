//! Document storage with supersede-on-re-ingest semantics.

use chrono::{DateTime, Utc};
use tokio_rusqlite::rusqlite::{Row, Transaction};
use tokio_rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::types::{Document, DocumentInfo};

/// How a `put` resolved against the existing corpus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutStatus {
    /// No prior document for this source URL.
    Inserted,
    /// A prior document existed with different text; it was retired along
    /// with its chunks and embedding records.
    Replaced,
    /// The stored text is byte-identical; nothing was written. Callers skip
    /// re-chunking and re-embedding.
    Unchanged,
}

#[derive(Clone, Debug)]
pub struct PutOutcome {
    pub document: Document,
    pub status: PutStatus,
}

/// Holds raw ingested text units keyed by source URL.
///
/// Documents are immutable: re-ingesting a source URL retires the prior
/// document and cascades the retirement to its chunks and embedding records
/// within one transaction.
#[derive(Clone)]
pub struct DocumentStore {
    conn: Connection,
}

impl DocumentStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Stores a document, superseding any prior entry for the same source
    /// URL. Empty or whitespace-only text is rejected with
    /// [`PipelineError::Content`] and leaves the existing entry in place.
    pub async fn put(
        &self,
        source_url: &str,
        title: &str,
        raw_text: &str,
    ) -> Result<PutOutcome, PipelineError> {
        if raw_text.trim().is_empty() {
            return Err(PipelineError::Content(format!(
                "document '{source_url}' has no readable text"
            )));
        }
        if source_url.trim().is_empty() {
            return Err(PipelineError::Content("document has no source URL".into()));
        }

        let candidate = Document::new(source_url, title, raw_text);
        let row = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let existing: Option<DocumentRow> = tx
                    .query_row(
                        "SELECT id, source_url, title, raw_text, fetched_at
                         FROM documents WHERE source_url = ?1",
                        [&candidate.source_url],
                        row_to_document,
                    )
                    .optional()?;

                let outcome = match existing {
                    Some(prior) if prior.raw_text == candidate.raw_text => {
                        RawPutOutcome {
                            row: prior,
                            status: PutStatus::Unchanged,
                        }
                    }
                    Some(prior) => {
                        tx.execute(
                            "DELETE FROM embedding_records WHERE chunk_id IN
                                 (SELECT id FROM chunks WHERE document_id = ?1)",
                            [&prior.id],
                        )?;
                        tx.execute("DELETE FROM chunks WHERE document_id = ?1", [&prior.id])?;
                        tx.execute("DELETE FROM documents WHERE id = ?1", [&prior.id])?;
                        insert_document(&tx, &candidate)?;
                        RawPutOutcome {
                            row: DocumentRow::from(&candidate),
                            status: PutStatus::Replaced,
                        }
                    }
                    None => {
                        insert_document(&tx, &candidate)?;
                        RawPutOutcome {
                            row: DocumentRow::from(&candidate),
                            status: PutStatus::Inserted,
                        }
                    }
                };
                tx.commit()?;
                Ok(outcome)
            })
            .await?;

        let stored = row.row.into_document()?;
        match row.status {
            PutStatus::Inserted => info!(source_url = %stored.source_url, "document stored"),
            PutStatus::Replaced => info!(source_url = %stored.source_url, "document superseded"),
            PutStatus::Unchanged => debug!(source_url = %stored.source_url, "document unchanged"),
        }
        Ok(PutOutcome {
            document: stored,
            status: row.status,
        })
    }

    /// All live documents, ordered by source URL.
    pub async fn list(&self) -> Result<Vec<Document>, PipelineError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, source_url, title, raw_text, fetched_at
                     FROM documents ORDER BY source_url",
                )?;
                let rows = stmt
                    .query_map([], row_to_document)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(DocumentRow::into_document).collect()
    }

    pub async fn get(&self, document_id: &str) -> Result<Option<Document>, PipelineError> {
        let id = document_id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, source_url, title, raw_text, fetched_at
                         FROM documents WHERE id = ?1",
                        [&id],
                        row_to_document,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(DocumentRow::into_document).transpose()
    }

    /// Provenance only, without loading the document body.
    pub async fn get_info(&self, document_id: &str) -> Result<Option<DocumentInfo>, PipelineError> {
        let id = document_id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, source_url, title, '', fetched_at
                         FROM documents WHERE id = ?1",
                        [&id],
                        row_to_document,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(|row| row.into_document().map(|doc| doc.info())).transpose()
    }

    pub async fn count(&self) -> Result<usize, PipelineError> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count as usize)
    }
}

struct DocumentRow {
    id: String,
    source_url: String,
    title: String,
    raw_text: String,
    fetched_at: String,
}

struct RawPutOutcome {
    row: DocumentRow,
    status: PutStatus,
}

impl DocumentRow {
    fn into_document(self) -> Result<Document, PipelineError> {
        let fetched_at = DateTime::parse_from_rfc3339(&self.fetched_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|err| {
                PipelineError::Storage(format!(
                    "unreadable fetched_at '{}': {err}",
                    self.fetched_at
                ))
            })?;
        Ok(Document {
            id: self.id,
            source_url: self.source_url,
            title: self.title,
            raw_text: self.raw_text,
            fetched_at,
        })
    }
}

impl From<&Document> for DocumentRow {
    fn from(document: &Document) -> Self {
        Self {
            id: document.id.clone(),
            source_url: document.source_url.clone(),
            title: document.title.clone(),
            raw_text: document.raw_text.clone(),
            fetched_at: document.fetched_at.to_rfc3339(),
        }
    }
}

fn row_to_document(row: &Row<'_>) -> tokio_rusqlite::rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        source_url: row.get(1)?,
        title: row.get(2)?,
        raw_text: row.get(3)?,
        fetched_at: row.get(4)?,
    })
}

fn insert_document(
    tx: &Transaction<'_>,
    document: &Document,
) -> tokio_rusqlite::rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO documents (id, source_url, title, raw_text, fetched_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            &document.id,
            &document.source_url,
            &document.title,
            &document.raw_text,
            document.fetched_at.to_rfc3339(),
        ),
    )?;
    Ok(())
}
