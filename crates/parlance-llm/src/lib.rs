//! Streaming language-model capability.
//!
//! A conversation goes in, a token stream comes out. Tool execution belongs
//! to the turn engine; adapters only surface the model's tool requests.

pub mod adapter;
pub mod conversation;
pub mod mock;
pub mod openai_http;
pub mod registry;
pub mod types;

pub use adapter::{LlmAdapter, LlmTurn};
pub use conversation::{approx_tokens, build_prompt, HistoryTurn};
pub use mock::{word_deltas, LlmStep, MockLlmAdapter, MockLlmProbe};
pub use openai_http::OpenAiLlmAdapter;
pub use registry::LlmRegistry;
pub use types::{ChatMessage, FinishReason, LlmEvent, LlmRequest, Role, ToolSpec};
