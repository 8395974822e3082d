//! Deterministic in-process providers for tests and offline runs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::PipelineError;
use crate::providers::{EmbeddingProvider, GenerationOutput, GenerationProvider, GenerationRequest};

/// Hash-derived embeddings: identical text always maps to the same unit
/// vector, distinct text to (near-orthogonal) different vectors.
pub struct MockEmbeddingProvider {
    model: String,
    dims: usize,
    fail_next: AtomicU32,
    delay: Duration,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-embed".to_string(),
            dims: 64,
            fail_next: AtomicU32::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Report a different model identifier, for mismatch scenarios.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_dims(mut self, dims: usize) -> Self {
        self.dims = dims;
        self
    }

    /// Sleep this long inside every call, for timeout scenarios.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes the next `count` calls fail with a provider error, then recover.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut state = fnv1a(text.as_bytes());
        let mut vector: Vec<f32> = (0..self.dims)
            .map(|_| {
                state = xorshift(state);
                // Map to [-1, 1).
                (state >> 40) as f32 / ((1u64 << 23) as f32) - 1.0
            })
            .collect();
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(PipelineError::Provider(
                "mock embedding backend unavailable".into(),
            ));
        }
        Ok(self.vector_for(text))
    }
}

/// Canned generation provider that records the last request it saw.
pub struct MockGenerationProvider {
    model: String,
    answer: String,
    cited_tags: Option<Vec<String>>,
    fail_next: AtomicU32,
    delay: Duration,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl MockGenerationProvider {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            model: "mock-chat".to_string(),
            answer: answer.into(),
            cited_tags: None,
            fail_next: AtomicU32::new(0),
            delay: Duration::ZERO,
            last_request: Mutex::new(None),
        }
    }

    /// Report structured citations alongside the answer text.
    #[must_use]
    pub fn with_cited_tags(mut self, tags: Vec<String>) -> Self {
        self.cited_tags = Some(tags);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// The request captured by the most recent `generate` call.
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().clone()
    }
}

#[async_trait]
impl GenerationProvider for MockGenerationProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, PipelineError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        *self.last_request.lock() = Some(request);
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(PipelineError::Provider("mock generation backend unavailable".into()));
        }
        Ok(GenerationOutput {
            text: self.answer.clone(),
            cited_tags: self.cited_tags.clone(),
        })
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    // A zero state would make xorshift degenerate.
    hash | 1
}

fn xorshift(mut state: u64) -> u64 {
    state ^= state << 13;
    state ^= state >> 7;
    state ^= state << 17;
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeddings_are_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let first = provider.embed("Hymn tempo guidance").await.unwrap();
        let second = provider.embed("Hymn tempo guidance").await.unwrap();
        let other = provider.embed("Organ registration").await.unwrap();
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.len(), 64);
    }

    #[tokio::test]
    async fn embeddings_are_unit_length() {
        let provider = MockEmbeddingProvider::new();
        let vector = provider.embed("prelude music").await.unwrap();
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn failure_injection_recovers() {
        let provider = MockEmbeddingProvider::new();
        provider.fail_next(2);
        assert!(provider.embed("a").await.is_err());
        assert!(provider.embed("a").await.is_err());
        assert!(provider.embed("a").await.is_ok());
    }

    #[tokio::test]
    async fn generation_records_request() {
        let provider = MockGenerationProvider::new("A hymn answer.");
        let request = GenerationRequest {
            system_prompt: "framing".into(),
            messages: vec![],
            grounding: vec![],
        };
        let output = provider.generate(request.clone()).await.unwrap();
        assert_eq!(output.text, "A hymn answer.");
        assert_eq!(provider.last_request().unwrap(), request);
    }
}
