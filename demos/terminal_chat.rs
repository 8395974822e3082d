//! Interactive terminal chat over the query API.
//!
//! Wires `ChatService` directly to OpenAI-compatible providers selected from
//! the environment (the "local relay" wiring of the query contract):
//!
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --example terminal_chat
//! ```
//!
//! Recognized variables: `OPENAI_API_KEY`, `OPENAI_BASE_URL`,
//! `CHORISTER_EMBED_MODEL`, `CHORISTER_CHAT_MODEL`, plus everything
//! `PipelineConfig::from_env` reads. Type `:stats` for corpus statistics and
//! `quit` to leave.

use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use chorister::error::PipelineError;
use chorister::providers::{EmbeddingProvider, GenerationProvider, OpenAiChat, OpenAiEmbeddings};
use chorister::{ChatService, PipelineConfig};

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = PipelineConfig::from_env()?;
    let api_key = env::var("OPENAI_API_KEY")
        .map_err(|_| PipelineError::Provider("OPENAI_API_KEY is not set".into()))?;
    let base_url =
        env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
    let embed_model = env::var("CHORISTER_EMBED_MODEL")
        .unwrap_or_else(|_| "text-embedding-3-small".to_string());
    let chat_model = env::var("CHORISTER_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(OpenAiEmbeddings::new(&api_key, &base_url, embed_model, None)?);
    let generator: Arc<dyn GenerationProvider> =
        Arc::new(OpenAiChat::new(&api_key, &base_url, chat_model)?);

    let service = chorister::service::shared(|| ChatService::open(config, embedder, generator)).await?;

    let stats = service.stats().await?;
    println!("=== chorister terminal chat ===");
    println!(
        "corpus: {} documents, {} indexed chunks (model {})",
        stats.documents, stats.embedding_records, stats.embedding_model
    );
    if stats.embedding_records == 0 {
        println!("note: the index is empty; ingest pages via ChatService::ingest_batch first");
    }
    println!("Type 'quit' or 'exit' to stop.\n");

    let stdin = io::stdin();
    let mut conversation_id: Option<String> = None;
    loop {
        print!("You: ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }
        if input == ":stats" {
            let stats = service.stats().await?;
            println!(
                "{} documents, {} chunks, {} conversations\n",
                stats.documents, stats.chunks, stats.active_conversations
            );
            continue;
        }

        match service.answer(input, conversation_id.as_deref()).await {
            Ok(response) => {
                println!("Bot: {}\n", response.response);
                if !response.sources.is_empty() {
                    println!("Sources:");
                    for source in &response.sources {
                        println!("  - {} ({})", source.title, source.url);
                    }
                    println!();
                }
                conversation_id = Some(response.conversation_id);
            }
            Err(err) => {
                eprintln!("[!] {err}\n");
            }
        }
    }
    Ok(())
}
