//! Model-tagged vector index over chunk embeddings.

use std::sync::Arc;

use tokio_rusqlite::rusqlite::Row;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::error::PipelineError;
use crate::providers::EmbeddingProvider;
use crate::types::{CharSpan, Chunk};

/// A chunk scored by cosine similarity against a query vector.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Computes and persists one embedding record per chunk, and answers
/// similarity searches over them.
///
/// Every record carries the identifier of the model that produced its
/// vector; a search issued with a different model fails with
/// [`PipelineError::ModelMismatch`] rather than silently degrading
/// relevance. Upserts and removals are incremental (no rebuild) and the
/// whole index lives in SQLite, so it survives restarts.
#[derive(Clone)]
pub struct VectorIndex {
    conn: Connection,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl VectorIndex {
    pub fn new(conn: Connection, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { conn, embedder }
    }

    /// Identifier of the embedding model backing this index.
    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.embedder)
    }

    /// Embeds `chunk` and stores the chunk row plus its embedding record,
    /// replacing any prior vector for the same chunk id. The two writes land
    /// in one transaction, so a concurrent search sees the old state or the
    /// new one, never a half-applied upsert.
    pub async fn upsert(&self, chunk: &Chunk) -> Result<(), PipelineError> {
        let vector = self.embedder.embed(&chunk.content).await?;
        let embedding_json = serde_json::to_string(&vector)
            .map_err(|err| PipelineError::Storage(err.to_string()))?;
        let model = self.embedder.model_id().to_string();
        let dims = vector.len() as i64;
        let chunk_id = chunk.id.clone();
        let chunk = chunk.clone();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR REPLACE INTO chunks
                         (id, document_id, ordinal, content, span_start, span_end)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    (
                        &chunk.id,
                        &chunk.document_id,
                        chunk.ordinal as i64,
                        &chunk.content,
                        chunk.span.start as i64,
                        chunk.span.end as i64,
                    ),
                )?;
                tx.execute(
                    "INSERT OR REPLACE INTO embedding_records (chunk_id, model, dims, embedding)
                     VALUES (?1, ?2, ?3, ?4)",
                    (&chunk.id, &model, dims, &embedding_json),
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        debug!(chunk_id = %chunk_id, model = %self.embedder.model_id(), "embedding upserted");
        Ok(())
    }

    /// Retires a chunk: drops its embedding record and its chunk row.
    pub async fn remove(&self, chunk_id: &str) -> Result<(), PipelineError> {
        let id = chunk_id.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM embedding_records WHERE chunk_id = ?1", [&id])?;
                tx.execute("DELETE FROM chunks WHERE id = ?1", [&id])?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Returns the `k` most similar chunks, highest score first, ties broken
    /// by lower chunk id. `model` must match the model that produced every
    /// indexed record.
    pub async fn search(
        &self,
        query_vector: &[f32],
        model: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, PipelineError> {
        let embedding_json = serde_json::to_string(query_vector)
            .map_err(|err| PipelineError::Storage(err.to_string()))?;
        let requested = model.to_string();
        let limit = k as i64;

        let raw = self
            .conn
            .call(move |conn| {
                let mut models = conn.prepare("SELECT DISTINCT model FROM embedding_records")?;
                let indexed: Vec<String> = models
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(other) = indexed.iter().find(|m| *m != &requested) {
                    return Ok(RawSearch::Mismatch(other.clone()));
                }

                let mut stmt = conn.prepare(
                    "SELECT c.id, c.document_id, c.ordinal, c.content, c.span_start, c.span_end,
                            vec_distance_cosine(vec_f32(e.embedding), vec_f32(?1)) AS distance
                     FROM embedding_records e
                     JOIN chunks c ON c.id = e.chunk_id
                     ORDER BY distance ASC, c.id ASC
                     LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map((&embedding_json, limit), row_to_scored)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RawSearch::Rows(rows))
            })
            .await?;

        match raw {
            RawSearch::Mismatch(indexed) => Err(PipelineError::ModelMismatch {
                indexed,
                requested: model.to_string(),
            }),
            RawSearch::Rows(rows) => Ok(rows),
        }
    }

    pub async fn embedding_count(&self) -> Result<usize, PipelineError> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM embedding_records", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count as usize)
    }

    pub async fn chunk_count(&self) -> Result<usize, PipelineError> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count as usize)
    }
}

enum RawSearch {
    Mismatch(String),
    Rows(Vec<ScoredChunk>),
}

fn row_to_scored(row: &Row<'_>) -> tokio_rusqlite::rusqlite::Result<ScoredChunk> {
    let distance: f64 = row.get(6)?;
    Ok(ScoredChunk {
        chunk: Chunk {
            id: row.get(0)?,
            document_id: row.get(1)?,
            ordinal: row.get::<_, i64>(2)? as usize,
            content: row.get(3)?,
            span: CharSpan {
                start: row.get::<_, i64>(4)? as usize,
                end: row.get::<_, i64>(5)? as usize,
            },
        },
        // Cosine distance → similarity.
        score: 1.0 - distance as f32,
    })
}
