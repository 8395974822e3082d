//! Per-conversation turn history with serialized appends.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::error::PipelineError;
use crate::types::{Conversation, Turn};

type Handle = Arc<AsyncMutex<Conversation>>;

/// In-memory conversation registry.
///
/// Each conversation sits behind its own async mutex, so appends to one
/// conversation are serialized (at most one writer at a time) while distinct
/// conversations proceed independently. The registry map itself is guarded
/// by a short-lived synchronous lock.
#[derive(Clone, Default)]
pub struct ConversationStore {
    inner: Arc<Mutex<HashMap<String, Handle>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a conversation handle.
    ///
    /// A `None` id always creates a fresh conversation. A non-null id that
    /// the store does not know also starts fresh under a *new* generated id,
    /// so client-side id corruption degrades gracefully instead of failing
    /// the request.
    pub fn get_or_create(&self, conversation_id: Option<&str>) -> (String, Handle) {
        let mut registry = self.inner.lock();
        if let Some(id) = conversation_id {
            if let Some(handle) = registry.get(id) {
                return (id.to_string(), Arc::clone(handle));
            }
            debug!(supplied_id = %id, "unknown conversation id, starting fresh");
        }
        let conversation = Conversation::new();
        let id = conversation.id.clone();
        let handle = Arc::new(AsyncMutex::new(conversation));
        registry.insert(id.clone(), Arc::clone(&handle));
        (id, handle)
    }

    fn handle(&self, conversation_id: &str) -> Result<Handle, PipelineError> {
        self.inner
            .lock()
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| {
                PipelineError::Content(format!("unknown conversation '{conversation_id}'"))
            })
    }

    /// Appends one turn, serialized against other writers of the same
    /// conversation.
    pub async fn append_turn(&self, conversation_id: &str, turn: Turn) -> Result<(), PipelineError> {
        let handle = self.handle(conversation_id)?;
        let mut conversation = handle.lock().await;
        conversation.turns.push(turn);
        Ok(())
    }

    /// Appends a user turn and its assistant reply under one lock
    /// acquisition, so the pair never interleaves with a concurrent
    /// exchange on the same conversation.
    pub async fn append_exchange(
        &self,
        conversation_id: &str,
        user: Turn,
        assistant: Turn,
    ) -> Result<(), PipelineError> {
        let handle = self.handle(conversation_id)?;
        let mut conversation = handle.lock().await;
        conversation.turns.push(user);
        conversation.turns.push(assistant);
        Ok(())
    }

    /// The most recent `limit` turns, oldest first. Unknown ids yield an
    /// empty history.
    pub async fn history(&self, conversation_id: &str, limit: usize) -> Vec<Turn> {
        let handle = { self.inner.lock().get(conversation_id).cloned() };
        match handle {
            Some(handle) => handle.lock().await.recent_turns(limit).to_vec(),
            None => Vec::new(),
        }
    }

    pub async fn turn_count(&self, conversation_id: &str) -> usize {
        let handle = { self.inner.lock().get(conversation_id).cloned() };
        match handle {
            Some(handle) => handle.lock().await.turns.len(),
            None => 0,
        }
    }

    /// Number of conversations currently tracked.
    pub fn conversation_count(&self) -> usize {
        self.inner.lock().len()
    }
}
