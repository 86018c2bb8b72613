//! Canonical audio frame pipeline.
//!
//! Everything between components speaks 20 ms / 16 kHz / mono S16LE frames;
//! this crate owns that currency: the frame type, the rate/channel adapters
//! on both edges, and the pre-speech ring buffer.

pub mod assembler;
pub mod frame;
pub mod prespeech;
pub mod resampler;

pub use assembler::{FrameAssembler, FrameEmitter};
pub use frame::{
    AudioFrame, RawAudio, CHANNELS_MONO, FRAME_DURATION, FRAME_SIZE_SAMPLES, SAMPLE_RATE_HZ,
};
pub use prespeech::{PreSpeechBuffer, DEFAULT_PRESPEECH};
pub use resampler::{ResamplerQuality, StreamResampler};
