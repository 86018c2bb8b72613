//! Streaming text-to-speech capability.
//!
//! Sentence-sized text in, PCM out, with audio flowing before the full
//! response is known. The speak lock enforces one live synthesis stream
//! per session.

pub mod adapter;
pub mod http;
pub mod mock;
pub mod registry;
pub mod speak_lock;
pub mod types;

pub use adapter::{TtsAdapter, TtsSession, TtsText};
pub use http::HttpTtsAdapter;
pub use mock::EchoTtsAdapter;
pub use registry::TtsRegistry;
pub use speak_lock::{SpeakLock, SpeakPermit};
pub use types::TtsEvent;
