//! Turn-taking core: the per-session event-loop engine, the sentence
//! accumulator feeding synthesis, and the conversation record.

pub mod engine;
pub mod history;
pub mod sentence;

pub use engine::{EngineConfig, EngineDeps, TurnEngine};
pub use history::{ConversationHistory, Turn};
pub use sentence::{AccumulatorConfig, SentenceAccumulator};
