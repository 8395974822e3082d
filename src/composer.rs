//! Grounded answer composition with citation surfacing.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::conversations::ConversationStore;
use crate::error::PipelineError;
use crate::providers::{
    with_deadline, GenerationOutput, GenerationProvider, GenerationRequest, GroundingPassage,
    PromptMessage,
};
use crate::retriever::Retriever;
use crate::types::{Answer, RetrievedChunk, Role, Source, Turn};

const SYSTEM_FRAMING: &str = "You are a music-ministry assistant. You answer questions about \
hymn selection, conducting technique, accompaniment, and congregational music policy. Ground \
every answer in the context passages provided below and cite the passages you used by their \
tags, e.g. [S1]. If the passages do not answer the question, say so honestly instead of \
guessing. Keep explanations clear and beginner-friendly.";

const NO_GROUNDING_NOTE: &str = "\n\nNo relevant passages were found for this question. Say \
that the indexed material does not cover it; do not invent sources.";

/// Builds a grounded prompt from retrieved chunks and conversation history,
/// invokes the generation model, and returns the answer annotated with the
/// sources used for grounding.
pub struct AnswerComposer {
    retriever: Retriever,
    conversations: ConversationStore,
    generator: Arc<dyn GenerationProvider>,
    top_k: usize,
    min_score: f32,
    history_turns: usize,
    timeout: std::time::Duration,
}

impl AnswerComposer {
    pub fn new(
        retriever: Retriever,
        conversations: ConversationStore,
        generator: Arc<dyn GenerationProvider>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            retriever,
            conversations,
            generator,
            top_k: config.top_k,
            min_score: config.min_score,
            history_turns: config.history_turns,
            timeout: config.provider_timeout,
        }
    }

    /// Answers `query_text` within the given conversation (or a fresh one).
    ///
    /// On success both the user turn and the assistant turn are appended to
    /// the conversation. On failure nothing is appended and the error
    /// propagates as a structured result, never a fabricated answer.
    pub async fn answer(
        &self,
        query_text: &str,
        conversation_id: Option<&str>,
    ) -> Result<Answer, PipelineError> {
        let (resolved_id, handle) = self.conversations.get_or_create(conversation_id);
        let history = {
            let conversation = handle.lock().await;
            conversation.recent_turns(self.history_turns).to_vec()
        };

        let retrieved = self
            .retriever
            .retrieve(query_text, self.top_k, self.min_score)
            .await?;
        let grounding = tag_passages(&retrieved);

        let mut system_prompt = SYSTEM_FRAMING.to_string();
        if grounding.is_empty() {
            system_prompt.push_str(NO_GROUNDING_NOTE);
        }

        let mut messages: Vec<PromptMessage> = history
            .iter()
            .map(|turn| PromptMessage::new(turn.role, turn.content.clone()))
            .collect();
        messages.push(PromptMessage::new(Role::User, query_text));

        let request = GenerationRequest {
            system_prompt,
            messages,
            grounding: grounding.clone(),
        };

        let output = match with_deadline(self.timeout, self.generator.generate(request)).await {
            Ok(output) => output,
            Err(PipelineError::Provider(message)) => {
                warn!(%message, "generation backend failed");
                return Err(PipelineError::Generation(message));
            }
            Err(other) => return Err(other),
        };

        let sources = resolve_sources(&output, &retrieved, &grounding);
        debug!(
            conversation_id = %resolved_id,
            grounded_on = retrieved.len(),
            cited = sources.len(),
            "answer composed"
        );

        self.conversations
            .append_exchange(
                &resolved_id,
                Turn::user(query_text),
                Turn::assistant(&output.text, sources.clone()),
            )
            .await?;

        Ok(Answer {
            text: output.text,
            sources,
            conversation_id: resolved_id,
        })
    }
}

fn tag_passages(retrieved: &[RetrievedChunk]) -> Vec<GroundingPassage> {
    retrieved
        .iter()
        .enumerate()
        .map(|(i, hit)| GroundingPassage {
            tag: format!("S{}", i + 1),
            title: hit.document.title.clone(),
            url: hit.document.source_url.clone(),
            text: hit.chunk.content.clone(),
        })
        .collect()
}

/// Resolves which sources to surface with the answer.
///
/// Order of preference: provider-reported citation tags, tags scanned from
/// the answer text, then the full thresholded source set. The fallback keeps
/// grounding provenance visible even when the model's own citation step
/// fails.
fn resolve_sources(
    output: &GenerationOutput,
    retrieved: &[RetrievedChunk],
    grounding: &[GroundingPassage],
) -> Vec<Source> {
    let reported = output
        .cited_tags
        .clone()
        .filter(|tags| !tags.is_empty())
        .or_else(|| scan_tags(&output.text));

    if let Some(tags) = reported {
        let cited = sources_for_tags(&tags, grounding);
        if !cited.is_empty() {
            return cited;
        }
    }
    all_sources(retrieved)
}

fn scan_tags(text: &str) -> Option<Vec<String>> {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let pattern = TAG.get_or_init(|| Regex::new(r"\[(S\d+)\]").expect("valid tag pattern"));
    let mut tags = Vec::new();
    for capture in pattern.captures_iter(text) {
        let tag = capture[1].to_string();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

fn sources_for_tags(tags: &[String], grounding: &[GroundingPassage]) -> Vec<Source> {
    let mut sources: Vec<Source> = Vec::new();
    for tag in tags {
        let Some(passage) = grounding.iter().find(|p| &p.tag == tag) else {
            continue;
        };
        let source = Source {
            title: passage.title.clone(),
            url: passage.url.clone(),
        };
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    sources
}

fn all_sources(retrieved: &[RetrievedChunk]) -> Vec<Source> {
    let mut sources: Vec<Source> = Vec::new();
    for hit in retrieved {
        let source = hit.source();
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    sources
}
