use std::sync::atomic::{AtomicU64, Ordering};

/// Transcript events flowing from an adapter to the turn engine.
#[derive(Debug, Clone)]
pub enum TranscriptEvent {
    /// Partial hypothesis; delivered to observers, never drives the LLM.
    Interim { utterance_id: u64, text: String },
    /// The utterance is complete.
    Final { utterance_id: u64, text: String },
    /// The provider stream failed. Transient failures are retried once by
    /// the turn engine with a fresh session.
    Failed { transient: bool, message: String },
}

static UTTERANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique utterance id for correlating interim and final events.
pub fn next_utterance_id() -> u64 {
    UTTERANCE_ID.fetch_add(1, Ordering::SeqCst)
}
