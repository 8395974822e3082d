//! HTTP-level tests for the OpenAI-compatible provider clients.

use httpmock::prelude::*;
use serde_json::json;

use chorister::error::PipelineError;
use chorister::providers::{
    EmbeddingProvider, GenerationProvider, GenerationRequest, GroundingPassage, OpenAiChat,
    OpenAiEmbeddings, PromptMessage,
};
use chorister::types::Role;

#[tokio::test]
async fn embeddings_round_trip() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .header("authorization", "Bearer test-key")
                .json_body_partial(r#"{"model": "text-embedding-3-small", "input": ["prelude music"]}"#);
            then.status(200).json_body(json!({
                "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
            }));
        })
        .await;

    let provider = OpenAiEmbeddings::new(
        "test-key",
        &format!("{}/v1", server.base_url()),
        "text-embedding-3-small",
        None,
    )
    .unwrap();

    let vector = provider.embed("prelude music").await.unwrap();
    assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    assert_eq!(provider.model_id(), "text-embedding-3-small");
    mock.assert_async().await;
}

#[tokio::test]
async fn embeddings_rate_limit_maps_to_provider_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(429).body("rate limited");
        })
        .await;

    let provider = OpenAiEmbeddings::new(
        "test-key",
        &format!("{}/v1", server.base_url()),
        "text-embedding-3-small",
        None,
    )
    .unwrap();

    let err = provider.embed("anything").await.unwrap_err();
    assert!(matches!(err, PipelineError::Provider(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn embeddings_reject_empty_payload() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200).json_body(json!({"data": []}));
        })
        .await;

    let provider = OpenAiEmbeddings::new(
        "test-key",
        &format!("{}/v1", server.base_url()),
        "text-embedding-3-small",
        None,
    )
    .unwrap();

    let err = provider.embed("anything").await.unwrap_err();
    assert!(matches!(err, PipelineError::Provider(_)));
}

#[tokio::test]
async fn chat_round_trip_renders_grounding_and_history() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key")
                .body_contains("[S1] Prelude Guidance (https://example.org/prelude)")
                .body_contains("How fast should a hymn be?");
            then.status(200).json_body(json!({
                "choices": [{"message": {"role": "assistant",
                    "content": "A moderate tempo serves best [S1]."}}]
            }));
        })
        .await;

    let provider = OpenAiChat::new("test-key", &format!("{}/v1", server.base_url()), "gpt-4o-mini")
        .unwrap();

    let output = provider
        .generate(GenerationRequest {
            system_prompt: "You are a music-ministry assistant.".into(),
            messages: vec![PromptMessage::new(Role::User, "How fast should a hymn be?")],
            grounding: vec![GroundingPassage {
                tag: "S1".into(),
                title: "Prelude Guidance".into(),
                url: "https://example.org/prelude".into(),
                text: "Choose hymns of moderate tempo.".into(),
            }],
        })
        .await
        .unwrap();

    assert_eq!(output.text, "A moderate tempo serves best [S1].");
    assert!(output.cited_tags.is_none());
    mock.assert_async().await;
}

#[tokio::test]
async fn chat_server_error_maps_to_provider_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(500).body("backend exploded");
        })
        .await;

    let provider = OpenAiChat::new("test-key", &format!("{}/v1", server.base_url()), "gpt-4o-mini")
        .unwrap();

    let err = provider
        .generate(GenerationRequest {
            system_prompt: "framing".into(),
            messages: vec![],
            grounding: vec![],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Provider(_)));
}
