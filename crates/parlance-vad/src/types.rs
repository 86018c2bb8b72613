/// Detector output delivered to the turn engine.
#[derive(Debug, Clone, PartialEq)]
pub enum VadEvent {
    /// A debounced run of speech frames followed silence.
    SpeechStart { timestamp_ms: u64, probability: f32 },
    /// Heartbeat during sustained speech, roughly every 200 ms.
    SpeechContinue { timestamp_ms: u64, duration_ms: u64 },
    /// A debounced run of silence frames followed speech.
    SpeechEnd { timestamp_ms: u64, duration_ms: u64 },
    /// The engine failed on too many consecutive frames; session-fatal.
    Saturated { consecutive_errors: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    Silence,
    Speech,
}
