//! Shared foundation for the Parlance voice-agent orchestrator: the error
//! taxonomy, the session turn-taking state machine, and adapter/timeout
//! configuration types every other crate builds on.

pub mod config;
pub mod error;
pub mod state;

pub use config::{AdapterConfig, AdapterConfigExt, TimeoutConfig};
pub use error::{
    AudioError, ConfigError, LlmError, OrchestratorError, RecoveryStrategy, RetrievalError,
    SttError, TransportError, TtsError, VadError,
};
pub use state::{SessionState, StateTracker};
