//! End-to-end answer composition through `ChatService` with mock providers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;

use chorister::error::PipelineError;
use chorister::ingest::SourcePage;
use chorister::providers::{
    EmbeddingProvider, GenerationProvider, MockEmbeddingProvider, MockGenerationProvider,
};
use chorister::types::Role;
use chorister::ChatService;

use common::{long_page_text, test_config};

struct Fixture {
    service: ChatService,
    embedder: Arc<MockEmbeddingProvider>,
    generator: Arc<MockGenerationProvider>,
    _dir: tempfile::TempDir,
}

async fn fixture_with(generator: MockGenerationProvider) -> Fixture {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let embedder = Arc::new(MockEmbeddingProvider::new());
    let generator = Arc::new(generator);
    let service = ChatService::open(
        config,
        Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
        Arc::clone(&generator) as Arc<dyn GenerationProvider>,
    )
    .await
    .unwrap();
    Fixture {
        service,
        embedder,
        generator,
        _dir: dir,
    }
}

async fn fixture() -> Fixture {
    fixture_with(MockGenerationProvider::new(
        "Choose a familiar hymn at a moderate tempo.",
    ))
    .await
}

async fn seed_corpus(fx: &Fixture) {
    fx.service
        .ingest_page(&SourcePage::new(
            "https://example.org/music/conducting",
            "Conducting Guidance",
            long_page_text(),
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn null_conversation_id_creates_and_returns_one() {
    let fx = fixture().await;
    seed_corpus(&fx).await;

    let response = fx
        .service
        .answer("How should I pick a sacrament hymn?", None)
        .await
        .unwrap();
    assert!(!response.conversation_id.is_empty());
    assert_eq!(response.response, "Choose a familiar hymn at a moderate tempo.");
    assert_eq!(
        fx.service
            .conversations()
            .turn_count(&response.conversation_id)
            .await,
        2
    );
}

#[tokio::test]
async fn follow_up_appends_to_the_same_conversation() {
    let fx = fixture().await;
    seed_corpus(&fx).await;

    let first = fx.service.answer("How fast should a hymn be?", None).await.unwrap();
    let second = fx
        .service
        .answer("And for the sacrament hymn?", Some(&first.conversation_id))
        .await
        .unwrap();

    assert_eq!(second.conversation_id, first.conversation_id);
    let turns = fx
        .service
        .conversations()
        .history(&first.conversation_id, 10)
        .await;
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[2].role, Role::User);
    assert_eq!(turns[3].role, Role::Assistant);
    for pair in turns.windows(2) {
        assert!(pair[0].at <= pair[1].at);
    }

    // The second generation request carried the earlier exchange.
    let request = fx.generator.last_request().unwrap();
    assert!(request
        .messages
        .iter()
        .any(|m| m.content == "How fast should a hymn be?"));
}

#[tokio::test]
async fn grounded_answer_surfaces_cited_source_from_text_tags() {
    let fx = fixture_with(MockGenerationProvider::new(
        "Prelude music invites reverence [S1].",
    ))
    .await;
    let page = SourcePage::new(
        "https://example.org/music/prelude",
        "Prelude Guidance",
        "Prelude music invites reverence and prepares the congregation to worship.",
    );
    fx.service.ingest_page(&page).await.unwrap();

    let response = fx.service.answer(&page.raw_text, None).await.unwrap();
    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].title, "Prelude Guidance");
    assert_eq!(response.sources[0].url, page.source_url);
}

#[tokio::test]
async fn uncited_answer_falls_back_to_all_grounding_sources() {
    let fx = fixture().await;
    let page = SourcePage::new(
        "https://example.org/music/prelude",
        "Prelude Guidance",
        "Prelude music invites reverence and prepares the congregation to worship.",
    );
    fx.service.ingest_page(&page).await.unwrap();

    let response = fx.service.answer(&page.raw_text, None).await.unwrap();
    assert!(!response.sources.is_empty());
    assert!(response.sources.iter().any(|s| s.url == page.source_url));
}

#[tokio::test]
async fn empty_corpus_answers_without_fabricated_sources() {
    let fx = fixture_with(MockGenerationProvider::new(
        "The indexed material does not cover that.",
    ))
    .await;

    let response = fx.service.answer("What is the choir budget?", None).await.unwrap();
    assert!(response.sources.is_empty());

    // The prompt carried the explicit no-grounding instruction.
    let request = fx.generator.last_request().unwrap();
    assert!(request.grounding.is_empty());
    assert!(request.system_prompt.contains("No relevant passages"));
}

#[tokio::test]
async fn generation_failure_surfaces_and_appends_nothing() {
    let fx = fixture().await;
    seed_corpus(&fx).await;

    let first = fx.service.answer("How do I conduct 3/4?", None).await.unwrap();
    assert_eq!(
        fx.service.conversations().turn_count(&first.conversation_id).await,
        2
    );

    fx.generator.fail_next(1);
    let err = fx
        .service
        .answer("And 6/8?", Some(&first.conversation_id))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Generation(_)));

    // The failed exchange left no orphan turns behind.
    assert_eq!(
        fx.service.conversations().turn_count(&first.conversation_id).await,
        2
    );
}

#[tokio::test]
async fn slow_generation_times_out_distinctly() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.provider_timeout = Duration::from_millis(50);

    let embedder = Arc::new(MockEmbeddingProvider::new());
    let generator = Arc::new(
        MockGenerationProvider::new("too slow").with_delay(Duration::from_secs(2)),
    );
    let service = ChatService::open(
        config,
        Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
        Arc::clone(&generator) as Arc<dyn GenerationProvider>,
    )
    .await
    .unwrap();

    let err = service.answer("Any question", None).await.unwrap_err();
    assert!(matches!(err, PipelineError::Timeout(_)));
}

#[tokio::test]
async fn concurrent_questions_on_distinct_conversations_do_not_block() {
    let fx = fixture().await;
    seed_corpus(&fx).await;
    let service = Arc::new(fx.service);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let service = Arc::clone(&service);
        tasks.push(tokio::spawn(async move {
            service.answer(&format!("Question number {i}"), None).await
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        let response = task.await.unwrap().unwrap();
        ids.push(response.conversation_id);
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 8, "each call got its own conversation");
}

#[tokio::test]
async fn stats_reflect_corpus_and_conversations() {
    let fx = fixture().await;
    seed_corpus(&fx).await;
    fx.service.answer("How fast should a hymn be?", None).await.unwrap();

    let stats = fx.service.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert!(stats.chunks >= 2);
    assert_eq!(stats.chunks, stats.embedding_records);
    assert_eq!(stats.active_conversations, 1);
    assert_eq!(stats.embedding_model, "mock-embed");
    assert_eq!(stats.generation_model, "mock-chat");

    // Keep the embedder handle exercised for parity with the other suite.
    assert_eq!(fx.embedder.model_id(), "mock-embed");
}
