//! Provider traits for the embedding and generation backends.
//!
//! Both backends are remote, rate-limited, billable services. Every call is a
//! suspension point bounded by [`with_deadline`]; dropping the future cancels
//! the underlying request. The [`mock`] module holds deterministic in-process
//! implementations for tests and offline runs; [`openai`] holds
//! OpenAI-compatible HTTP clients.

pub mod mock;
pub mod openai;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::types::Role;

pub use mock::{MockEmbeddingProvider, MockGenerationProvider};
pub use openai::{OpenAiChat, OpenAiEmbeddings};

/// Computes embedding vectors for text.
///
/// `model_id` tags every embedding record the indexer writes; mixing vectors
/// from different models in one search is rejected, so implementations must
/// report a stable identifier.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier of the embedding model (e.g. `text-embedding-3-small`).
    fn model_id(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError>;
}

/// One message in the prompt sent to the generation model.
#[derive(Clone, Debug, PartialEq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One retrieved passage offered to the model as grounding, tagged for
/// citation (`[S1]`, `[S2]`, …).
#[derive(Clone, Debug, PartialEq)]
pub struct GroundingPassage {
    pub tag: String,
    pub title: String,
    pub url: String,
    pub text: String,
}

/// Request envelope shared by all generation providers.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub messages: Vec<PromptMessage>,
    pub grounding: Vec<GroundingPassage>,
}

/// Generation result. `cited_tags` carries provider-reported citations when
/// the backend supports structured grounding metadata; `None` means the
/// caller must recover citations from the text or fall back to the full
/// retrieved set.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationOutput {
    pub text: String,
    pub cited_tags: Option<Vec<String>>,
}

/// Produces a grounded answer from a composed prompt.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, PipelineError>;
}

/// Bounds `operation` to `timeout`, failing with [`PipelineError::Timeout`]
/// when it elapses. Distinct from a provider-reported failure so callers can
/// tell "try again later" from "this request was rejected".
pub async fn with_deadline<T, F>(timeout: Duration, operation: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_passes_through_success() {
        let result = with_deadline(Duration::from_secs(1), async { Ok::<_, PipelineError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn deadline_converts_elapsed_to_timeout() {
        let result = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, PipelineError>(())
        })
        .await;
        assert!(matches!(result, Err(PipelineError::Timeout(_))));
    }

    #[tokio::test]
    async fn deadline_preserves_provider_errors() {
        let result: Result<(), _> = with_deadline(Duration::from_secs(1), async {
            Err(PipelineError::Provider("quota exhausted".into()))
        })
        .await;
        assert!(matches!(result, Err(PipelineError::Provider(_))));
    }
}
