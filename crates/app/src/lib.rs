//! Parlance: a real-time voice-agent orchestrator.
//!
//! One session is one user talking to one agent over a bidirectional audio
//! transport. Inbound audio is normalized to canonical frames, a voice
//! detector finds speech boundaries, speech streams to a transcription
//! provider, the transcript (grounded by retrieval) drives a streaming
//! model, and the response is synthesized sentence by sentence back to the
//! caller, with barge-in cutting the agent off the moment the user speaks.

pub mod agent;
pub mod config;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;
pub mod turn;

pub use agent::{AgentConfig, AgentSnapshot, AgentStore, Registries};
pub use config::AppConfig;
pub use session::{SessionHandle, SessionManager};
pub use turn::{EngineConfig, TurnEngine};
