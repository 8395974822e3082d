//! Pipeline configuration with env-backed overrides.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::PipelineError;

/// Retry policy for embedding calls during ingestion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    pub base_delay: Duration,
    /// Ceiling on the backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let doubled = self
            .base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(10));
        doubled.min(self.max_delay)
    }
}

/// Tunables for chunking, retrieval, history bounding, and provider calls.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// SQLite file holding documents, chunks, and embedding records.
    pub db_path: PathBuf,
    /// Chunk window size in characters.
    pub chunk_window: usize,
    /// Overlap between consecutive chunks in characters. Must be smaller
    /// than the window.
    pub chunk_overlap: usize,
    /// How many chunks retrieval returns before thresholding.
    pub top_k: usize,
    /// Minimum cosine similarity for a chunk to ground an answer.
    pub min_score: f32,
    /// Most recent turns included in the generation prompt.
    pub history_turns: usize,
    /// Bounded wait for any single provider call.
    pub provider_timeout: Duration,
    pub embed_retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("chorister.sqlite"),
            chunk_window: 1000,
            chunk_overlap: 200,
            top_k: 4,
            min_score: 0.25,
            history_turns: 20,
            provider_timeout: Duration::from_secs(30),
            embed_retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Resolves configuration from the environment, falling back to the code
    /// defaults. Reads `.env` when present.
    ///
    /// Recognized variables: `CHORISTER_DB`, `CHORISTER_CHUNK_WINDOW`,
    /// `CHORISTER_CHUNK_OVERLAP`, `CHORISTER_TOP_K`, `CHORISTER_MIN_SCORE`,
    /// `CHORISTER_HISTORY_TURNS`, `CHORISTER_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, PipelineError> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Ok(path) = std::env::var("CHORISTER_DB") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(window) = parse_env("CHORISTER_CHUNK_WINDOW")? {
            config.chunk_window = window;
        }
        if let Some(overlap) = parse_env("CHORISTER_CHUNK_OVERLAP")? {
            config.chunk_overlap = overlap;
        }
        if let Some(top_k) = parse_env("CHORISTER_TOP_K")? {
            config.top_k = top_k;
        }
        if let Some(min_score) = parse_env::<f32>("CHORISTER_MIN_SCORE")? {
            config.min_score = min_score;
        }
        if let Some(turns) = parse_env("CHORISTER_HISTORY_TURNS")? {
            config.history_turns = turns;
        }
        if let Some(secs) = parse_env::<u64>("CHORISTER_TIMEOUT_SECS")? {
            config.provider_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.chunk_window == 0 {
            return Err(PipelineError::Content("chunk window must be non-zero".into()));
        }
        if self.chunk_overlap >= self.chunk_window {
            return Err(PipelineError::Content(format!(
                "chunk overlap {} must be smaller than the window {}",
                self.chunk_overlap, self.chunk_window
            )));
        }
        if self.top_k == 0 {
            return Err(PipelineError::Content("top_k must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(PipelineError::Content(format!(
                "min_score {} must lie in [0, 1]",
                self.min_score
            )));
        }
        if self.embed_retry.max_attempts == 0 {
            return Err(PipelineError::Content("retry attempts must be non-zero".into()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, PipelineError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| PipelineError::Content(format!("unable to parse {name}='{raw}'"))),
        Err(_) => Ok(None),
    }
}
