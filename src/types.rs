//! Core data model shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A raw ingested text unit with source provenance.
///
/// Documents are immutable once stored. Re-ingesting the same `source_url`
/// supersedes the prior document (and retires its chunks) rather than
/// mutating it in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_url: String,
    pub title: String,
    pub raw_text: String,
    pub fetched_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        source_url: impl Into<String>,
        title: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_url: source_url.into(),
            title: title.into(),
            raw_text: raw_text.into(),
            fetched_at: Utc::now(),
        }
    }

    /// Provenance view without the document body.
    pub fn info(&self) -> DocumentInfo {
        DocumentInfo {
            id: self.id.clone(),
            source_url: self.source_url.clone(),
            title: self.title.clone(),
            fetched_at: self.fetched_at,
        }
    }
}

/// Lightweight provenance record for a stored document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: String,
    pub source_url: String,
    pub title: String,
    pub fetched_at: DateTime<Utc>,
}

/// Half-open character range within a document's text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

impl CharSpan {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// A bounded contiguous slice of a document used as the unit of retrieval.
///
/// Chunks are derived deterministically from a document and never exist
/// without a parent; retiring the document retires its chunks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub ordinal: usize,
    pub content: String,
    pub span: CharSpan,
}

impl Chunk {
    pub fn new(document_id: impl Into<String>, ordinal: usize, content: impl Into<String>, span: CharSpan) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            ordinal,
            content: content.into(),
            span,
        }
    }
}

/// A citation derived from a chunk's parent document at composition time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
}

/// Author of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message within a conversation's ordered history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
            at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<Source>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources,
            at: Utc::now(),
        }
    }
}

/// Per-conversation turn history keyed by a generated id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// The most recent `limit` turns, oldest first.
    pub fn recent_turns(&self, limit: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// A chunk returned from retrieval, with similarity score and provenance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub document: DocumentInfo,
}

impl RetrievedChunk {
    pub fn source(&self) -> Source {
        Source {
            title: self.document.title.clone(),
            url: self.document.source_url.clone(),
        }
    }
}

/// A grounded answer with the sources used for grounding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Source>,
    pub conversation_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_span_length() {
        let span = CharSpan { start: 10, end: 25 };
        assert_eq!(span.len(), 15);
        assert!(!span.is_empty());
        assert!(CharSpan { start: 5, end: 5 }.is_empty());
    }

    #[test]
    fn recent_turns_bounds_history() {
        let mut conversation = Conversation::new();
        for i in 0..7 {
            conversation.turns.push(Turn::user(format!("question {i}")));
        }
        let recent = conversation.recent_turns(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "question 4");
        assert_eq!(recent[2].content, "question 6");

        // Asking for more than exists returns everything.
        assert_eq!(conversation.recent_turns(100).len(), 7);
    }

    #[test]
    fn retrieved_chunk_source_uses_parent_provenance() {
        let document = Document::new("https://example.org/conducting", "Conducting Basics", "text");
        let chunk = Chunk::new(&document.id, 0, "text", CharSpan { start: 0, end: 4 });
        let retrieved = RetrievedChunk {
            chunk,
            score: 0.9,
            document: document.info(),
        };
        let source = retrieved.source();
        assert_eq!(source.title, "Conducting Basics");
        assert_eq!(source.url, "https://example.org/conducting");
    }

    #[test]
    fn turn_roles_serialize_lowercase() {
        let turn = Turn::user("hello");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "user");
    }
}
