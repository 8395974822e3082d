//! Top-level chat service: the stable query API over the pipeline.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::info;

use crate::chunker::Chunker;
use crate::composer::AnswerComposer;
use crate::config::PipelineConfig;
use crate::conversations::ConversationStore;
use crate::error::PipelineError;
use crate::ingest::{IngestOutcome, IngestPipeline, IngestReport, SourcePage};
use crate::providers::{EmbeddingProvider, GenerationProvider};
use crate::retriever::Retriever;
use crate::store::{DocumentStore, Storage, VectorIndex};
use crate::types::Source;

/// Wire shape of the query API.
///
/// This is the sole contract the presentation layer depends on; it stays
/// stable regardless of which providers or persistence backend sit
/// underneath, so direct-model, serverless-relay, and local-relay wirings
/// are interchangeable behind it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<Source>,
    pub conversation_id: String,
}

/// Corpus and conversation statistics.
#[derive(Clone, Debug, Serialize)]
pub struct ServiceStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedding_records: usize,
    pub active_conversations: usize,
    pub embedding_model: String,
    pub generation_model: String,
}

/// Owns the stores, providers, and composer, and exposes the query and
/// ingestion entry points.
pub struct ChatService {
    config: PipelineConfig,
    documents: DocumentStore,
    index: VectorIndex,
    conversations: ConversationStore,
    composer: AnswerComposer,
    ingest: IngestPipeline,
    generation_model: String,
}

impl ChatService {
    /// Opens (or creates) the backing database and wires the pipeline.
    pub async fn open(
        config: PipelineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let storage = Storage::open(&config.db_path).await?;
        let documents = DocumentStore::new(storage.connection());
        let index = VectorIndex::new(storage.connection(), embedder);
        let conversations = ConversationStore::new();
        let retriever = Retriever::new(index.clone(), documents.clone(), config.provider_timeout);
        let composer = AnswerComposer::new(
            retriever,
            conversations.clone(),
            Arc::clone(&generator),
            &config,
        );
        let ingest = IngestPipeline::new(
            documents.clone(),
            Chunker::new(config.chunk_window, config.chunk_overlap),
            index.clone(),
            config.embed_retry,
            config.provider_timeout,
        );
        info!(
            db = %config.db_path.display(),
            embedding_model = %index.model_id(),
            "chat service ready"
        );
        Ok(Self {
            config,
            documents,
            index,
            conversations,
            composer,
            ingest,
            generation_model: generator.model_id().to_string(),
        })
    }

    /// The query API: answers `message` within `conversation_id` (or a
    /// fresh conversation) and returns the answer, its sources, and the
    /// resolved conversation id.
    pub async fn answer(
        &self,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<ChatResponse, PipelineError> {
        let answer = self.composer.answer(message, conversation_id).await?;
        Ok(ChatResponse {
            response: answer.text,
            sources: answer.sources,
            conversation_id: answer.conversation_id,
        })
    }

    /// Ingestion trigger for external crawlers: one page.
    pub async fn ingest_page(&self, page: &SourcePage) -> Result<IngestOutcome, PipelineError> {
        self.ingest.ingest_page(page).await
    }

    /// Ingestion trigger for external crawlers: a batch, per-page isolation.
    pub async fn ingest_batch(&self, pages: &[SourcePage]) -> IngestReport {
        self.ingest.ingest_batch(pages).await
    }

    pub async fn stats(&self) -> Result<ServiceStats, PipelineError> {
        Ok(ServiceStats {
            documents: self.documents.count().await?,
            chunks: self.index.chunk_count().await?,
            embedding_records: self.index.embedding_count().await?,
            active_conversations: self.conversations.conversation_count(),
            embedding_model: self.index.model_id().to_string(),
            generation_model: self.generation_model.clone(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }
}

static SHARED: OnceCell<Arc<ChatService>> = OnceCell::const_new();

/// Process-wide shared service.
///
/// The first caller's `init` constructs the instance; concurrent first uses
/// are serialized by the cell, so exactly one initialization runs. Later
/// calls reuse the same instance for the process lifetime.
pub async fn shared<F, Fut>(init: F) -> Result<Arc<ChatService>, PipelineError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<ChatService, PipelineError>>,
{
    SHARED
        .get_or_try_init(|| async { init().await.map(Arc::new) })
        .await
        .map(Arc::clone)
}

/// The shared service, if one has been initialized.
pub fn shared_instance() -> Option<Arc<ChatService>> {
    SHARED.get().cloned()
}
