//! Shared fixtures for the integration suites.

use std::path::Path;
use std::time::Duration;

use chorister::config::RetryPolicy;
use chorister::PipelineConfig;

/// Config tuned for tests: small windows so short fixtures span multiple
/// chunks, and a fast retry schedule.
pub fn test_config(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        db_path: dir.join("chorister-test.sqlite"),
        chunk_window: 120,
        chunk_overlap: 20,
        top_k: 4,
        min_score: 0.25,
        history_turns: 20,
        provider_timeout: Duration::from_secs(5),
        embed_retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
    }
}

/// A passage long enough to span several 120-char windows.
pub fn long_page_text() -> String {
    "Prelude music sets a reverent tone before the meeting begins. Choose hymns of \
     moderate tempo and familiar melody so the congregation can join without strain. \
     The conductor establishes the beat pattern in the first measure and keeps the \
     pattern small for quiet verses. Organists may soften registration during the \
     sacrament hymn. Where a choir is available, schedule an anthem that matches the \
     theme of the spoken messages for that week."
        .to_string()
}
