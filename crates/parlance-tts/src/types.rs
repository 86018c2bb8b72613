/// Synthesized output flowing from an adapter to the turn engine.
///
/// `pcm` is S16LE bytes at whatever rate the adapter runs at; the frame
/// pipeline adapts it to the canonical rate downstream.
#[derive(Debug, Clone)]
pub enum TtsEvent {
    Audio { pcm: Vec<u8>, sample_rate: u32 },
    /// All requested text has been synthesized.
    End,
    /// Mid-stream failure. Never retried; the turn is cut off gracefully.
    Failed { message: String },
}
