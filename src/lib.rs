//! # chorister
//!
//! Retrieval-augmented question answering over a bounded music-ministry
//! knowledge domain: hymn selection, conducting technique, accompaniment,
//! and congregational music policy.
//!
//! ```text
//! Ingestion trigger ──► DocumentStore ──► Chunker ──► VectorIndex
//!   (source_url,          supersede on     windowed     embed + persist
//!    title, raw_text)     re-ingest        overlap      (model-tagged)
//!
//! Query ──► Retriever ──► AnswerComposer ──► Answer { text, sources }
//!             embed +       history + grounding │
//!             search        + generation        ▼
//!                                        ConversationStore
//! ```
//!
//! Ingestion and query run concurrently: ingestion writes the document store
//! and the index, queries only read them, and all SQLite access funnels
//! through one serialized connection. Provider calls (embedding, generation)
//! are bounded by timeouts and retried with backoff where the contract
//! allows it; failures surface as structured [`PipelineError`] values, never
//! as fabricated answers.
//!
//! The top-level entry point is [`ChatService`]: open it with a config and a
//! pair of providers, feed it pages via [`ingest::SourcePage`], and ask it
//! questions through [`ChatService::answer`].

pub mod chunker;
pub mod composer;
pub mod config;
pub mod conversations;
pub mod error;
pub mod ingest;
pub mod providers;
pub mod retriever;
pub mod service;
pub mod store;
pub mod types;

pub use config::{PipelineConfig, RetryPolicy};
pub use error::PipelineError;
pub use service::{ChatResponse, ChatService, ServiceStats};
pub use types::{Answer, Chunk, Conversation, Document, RetrievedChunk, Role, Source, Turn};
