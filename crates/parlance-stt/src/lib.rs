//! Streaming speech-to-text capability.
//!
//! Canonical frames in, transcript events out. Concrete providers implement
//! [`SttAdapter`] and are selected at session creation through the registry;
//! policies (pre-speech replay, final-transcript timeout, retry-once) live
//! in the turn engine, not here.

pub mod adapter;
pub mod mock;
pub mod registry;
pub mod types;
pub mod websocket;

pub use adapter::{SttAdapter, SttInput, SttSession};
pub use mock::{MockFailure, MockSttAdapter, MockSttProbe, MockSttScript};
pub use registry::SttRegistry;
pub use types::{next_utterance_id, TranscriptEvent};
pub use websocket::WsSttAdapter;
