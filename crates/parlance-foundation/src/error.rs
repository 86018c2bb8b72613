use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Vad(#[from] VadError),

    #[error(transparent)]
    Stt(#[from] SttError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Tts(#[from] TtsError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Illegal session state transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Fatal session error: {0}")]
    Fatal(String),
}

impl From<tokio::task::JoinError> for OrchestratorError {
    fn from(err: tokio::task::JoinError) -> Self {
        OrchestratorError::Fatal(format!("task join failed: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Peer closed the connection")]
    Closed,

    #[error("Audio discontinuity of {gap:?}")]
    Discontinuity { gap: Duration },

    #[error("Malformed inbound frame: {0}")]
    MalformedFrame(String),

    #[error("Transport already attached to session {0}")]
    AlreadyAttached(String),
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Unsupported input format: {rate} Hz, {channels} ch")]
    UnsupportedFormat { rate: u32, channels: u16 },

    #[error("Resampler failed: {0}")]
    Resample(String),
}

#[derive(Error, Debug)]
pub enum VadError {
    #[error("Invalid frame size: expected {expected}, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },

    #[error("Detector inference failed: {0}")]
    Inference(String),

    #[error("Detector saturated after {consecutive_errors} consecutive errors")]
    Saturated { consecutive_errors: u32 },
}

#[derive(Error, Debug)]
pub enum SttError {
    #[error("Provider session could not be opened: {0}")]
    OpenFailed(String),

    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Provider stream failed: {0}")]
    Fatal(String),

    #[error("No final transcript within {0:?}")]
    FinalTimeout(Duration),

    #[error("Unknown STT adapter: {0}")]
    UnknownAdapter(String),
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Provider request failed: {0}")]
    RequestFailed(String),

    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Provider stream failed: {0}")]
    Fatal(String),

    #[error("No token within {0:?}")]
    FirstTokenTimeout(Duration),

    #[error("Tool execution failed: {name}: {reason}")]
    ToolFailed { name: String, reason: String },

    #[error("Unknown LLM adapter: {0}")]
    UnknownAdapter(String),
}

#[derive(Error, Debug)]
pub enum TtsError {
    #[error("Provider session could not be opened: {0}")]
    OpenFailed(String),

    #[error("Provider stream failed: {0}")]
    Fatal(String),

    #[error("No audio within {0:?}")]
    FirstAudioTimeout(Duration),

    #[error("Speak lock already held")]
    SpeakLockHeld,

    #[error("Unknown TTS adapter: {0}")]
    UnknownAdapter(String),
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Retrieval failed: {0}")]
    Failed(String),

    #[error("Retrieval exceeded {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration parse error: {0}")]
    Parse(String),

    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("IO error reading configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// What the scheduler does when an error reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Retry the failed operation once with a fresh provider session.
    RetryOnce,
    /// Abort the current turn and speak the apology fallback.
    SpokenFallback,
    /// Log and keep going; the turn proceeds degraded.
    Continue,
    /// Tear the session down.
    Teardown,
}

impl OrchestratorError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            OrchestratorError::Transport(TransportError::Closed) => RecoveryStrategy::Teardown,
            OrchestratorError::Transport(TransportError::Discontinuity { .. }) => {
                RecoveryStrategy::Continue
            }
            OrchestratorError::Stt(SttError::Transient(_)) => RecoveryStrategy::RetryOnce,
            OrchestratorError::Stt(_) => RecoveryStrategy::SpokenFallback,
            OrchestratorError::Llm(LlmError::Transient(_)) => RecoveryStrategy::RetryOnce,
            OrchestratorError::Llm(_) => RecoveryStrategy::SpokenFallback,
            // A broken synthesis stream is cut off, never retried: hearing the
            // same sentence twice is worse than a short cut.
            OrchestratorError::Tts(_) => RecoveryStrategy::Continue,
            OrchestratorError::Retrieval(_) => RecoveryStrategy::Continue,
            OrchestratorError::Vad(VadError::Saturated { .. }) => RecoveryStrategy::Teardown,
            OrchestratorError::Vad(_) => RecoveryStrategy::Continue,
            OrchestratorError::Fatal(_) | OrchestratorError::IllegalTransition { .. } => {
                RecoveryStrategy::Teardown
            }
            _ => RecoveryStrategy::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_provider_errors_retry_once() {
        let err = OrchestratorError::from(SttError::Transient("socket reset".into()));
        assert_eq!(err.recovery_strategy(), RecoveryStrategy::RetryOnce);
        let err = OrchestratorError::from(LlmError::Transient("503".into()));
        assert_eq!(err.recovery_strategy(), RecoveryStrategy::RetryOnce);
    }

    #[test]
    fn tts_failures_never_retry() {
        let err = OrchestratorError::from(TtsError::Fatal("stream died".into()));
        assert_eq!(err.recovery_strategy(), RecoveryStrategy::Continue);
    }

    #[test]
    fn saturated_detector_tears_down() {
        let err = OrchestratorError::from(VadError::Saturated {
            consecutive_errors: 51,
        });
        assert_eq!(err.recovery_strategy(), RecoveryStrategy::Teardown);
    }
}
