//! OpenAI-compatible HTTP clients for the embedding and generation backends.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::providers::{EmbeddingProvider, GenerationOutput, GenerationProvider, GenerationRequest};
use crate::types::Role;

fn build_client(api_key: &str) -> Result<Client, PipelineError> {
    if api_key.trim().is_empty() {
        return Err(PipelineError::Provider("missing API key".into()));
    }
    let mut headers = HeaderMap::new();
    let auth = format!("Bearer {}", api_key.trim());
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&auth).map_err(|_| PipelineError::Provider("invalid API key".into()))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Client::builder()
        .default_headers(headers)
        .build()
        .map_err(|err| PipelineError::Provider(format!("failed to build HTTP client: {err}")))
}

fn status_error(status: StatusCode, body: &str) -> PipelineError {
    PipelineError::Provider(format!("request failed ({status}): {body}"))
}

/// Embeddings client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbeddings {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
}

impl OpenAiEmbeddings {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: impl Into<String>,
        dimensions: Option<usize>,
    ) -> Result<Self, PipelineError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(PipelineError::Provider("missing embedding model name".into()));
        }
        Ok(Self {
            client: build_client(api_key)?,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let request = EmbeddingWireRequest {
            model: &self.model,
            input: [text],
            dimensions: self.dimensions,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| PipelineError::Provider(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<body unavailable>".into());
            return Err(status_error(status, &body));
        }

        let mut parsed: EmbeddingWireResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::Provider(format!("unreadable embedding response: {err}")))?;
        parsed.data.sort_by_key(|entry| entry.index);
        let entry = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Provider("embedding response carried no vectors".into()))?;
        if entry.embedding.is_empty() {
            return Err(PipelineError::Provider("embedding response carried an empty vector".into()));
        }
        Ok(entry.embedding)
    }
}

/// Chat-completions client for OpenAI-compatible endpoints.
///
/// Grounding passages are rendered into the system message; the endpoint
/// reports no structured citation metadata, so `cited_tags` is always `None`
/// and the composer recovers citations from the answer text.
pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(api_key: &str, base_url: &str, model: impl Into<String>) -> Result<Self, PipelineError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(PipelineError::Provider("missing chat model name".into()));
        }
        Ok(Self {
            client: build_client(api_key)?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model,
            temperature: 0.3,
        })
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

fn render_system_prompt(request: &GenerationRequest) -> String {
    let mut system = request.system_prompt.clone();
    if !request.grounding.is_empty() {
        system.push_str("\n\nContext passages:\n");
        for passage in &request.grounding {
            system.push_str(&format!(
                "\n[{tag}] {title} ({url})\n{text}\n",
                tag = passage.tag,
                title = passage.title,
                url = passage.url,
                text = passage.text,
            ));
        }
    }
    system
}

#[async_trait]
impl GenerationProvider for OpenAiChat {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, PipelineError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatWireMessage {
            role: "system",
            content: render_system_prompt(&request),
        });
        for message in &request.messages {
            messages.push(ChatWireMessage {
                role: match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: message.content.clone(),
            });
        }

        let wire = ChatWireRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&wire)
            .send()
            .await
            .map_err(|err| PipelineError::Provider(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<body unavailable>".into());
            return Err(status_error(status, &body));
        }

        let parsed: ChatWireResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::Provider(format!("unreadable chat response: {err}")))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Provider("chat response carried no choices".into()))?;
        Ok(GenerationOutput {
            text: choice.message.content,
            cited_tags: None,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingWireRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingWireResponse {
    data: Vec<EmbeddingWireEntry>,
}

#[derive(Deserialize)]
struct EmbeddingWireEntry {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Serialize)]
struct ChatWireRequest<'a> {
    model: &'a str,
    messages: Vec<ChatWireMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatWireMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatWireResponse {
    choices: Vec<ChatWireChoice>,
}

#[derive(Deserialize)]
struct ChatWireChoice {
    message: ChatWireChoiceMessage,
}

#[derive(Deserialize)]
struct ChatWireChoiceMessage {
    content: String,
}
