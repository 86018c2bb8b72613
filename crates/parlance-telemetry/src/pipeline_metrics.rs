use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared metrics for one session's pipeline.
///
/// Written from the engine task and the transport tasks, read by observers;
/// everything is a relaxed atomic so no path ever blocks on telemetry.
#[derive(Clone)]
pub struct PipelineMetrics {
    // Frame accounting
    pub frames_in: Arc<AtomicU64>,
    pub frames_out: Arc<AtomicU64>,
    pub frames_dropped_out: Arc<AtomicU64>,
    pub silence_frames_inserted: Arc<AtomicU64>,

    // VAD
    pub speech_starts: Arc<AtomicU64>,
    pub speech_ends: Arc<AtomicU64>,
    pub vad_errors: Arc<AtomicU64>,

    // Turns
    pub turns_completed: Arc<AtomicU64>,
    pub turns_interrupted: Arc<AtomicU64>,
    pub turns_discarded: Arc<AtomicU64>,
    pub barge_ins: Arc<AtomicU64>,

    // Providers
    pub stt_errors: Arc<AtomicU64>,
    pub stt_retries: Arc<AtomicU64>,
    pub llm_errors: Arc<AtomicU64>,
    pub llm_tokens: Arc<AtomicU64>,
    pub tool_invocations: Arc<AtomicU64>,
    pub tts_errors: Arc<AtomicU64>,
    pub tts_audio_bytes: Arc<AtomicU64>,
    pub fallbacks_spoken: Arc<AtomicU64>,
    pub stale_events_dropped: Arc<AtomicU64>,

    // Latency gauges, milliseconds (last observed value)
    pub stt_final_wait_ms: Arc<AtomicU64>,
    pub llm_first_token_ms: Arc<AtomicU64>,
    pub tts_first_audio_ms: Arc<AtomicU64>,
    pub cancellation_ms: Arc<AtomicU64>,

    pub last_speech_at: Arc<RwLock<Option<Instant>>>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            frames_in: Arc::new(AtomicU64::new(0)),
            frames_out: Arc::new(AtomicU64::new(0)),
            frames_dropped_out: Arc::new(AtomicU64::new(0)),
            silence_frames_inserted: Arc::new(AtomicU64::new(0)),
            speech_starts: Arc::new(AtomicU64::new(0)),
            speech_ends: Arc::new(AtomicU64::new(0)),
            vad_errors: Arc::new(AtomicU64::new(0)),
            turns_completed: Arc::new(AtomicU64::new(0)),
            turns_interrupted: Arc::new(AtomicU64::new(0)),
            turns_discarded: Arc::new(AtomicU64::new(0)),
            barge_ins: Arc::new(AtomicU64::new(0)),
            stt_errors: Arc::new(AtomicU64::new(0)),
            stt_retries: Arc::new(AtomicU64::new(0)),
            llm_errors: Arc::new(AtomicU64::new(0)),
            llm_tokens: Arc::new(AtomicU64::new(0)),
            tool_invocations: Arc::new(AtomicU64::new(0)),
            tts_errors: Arc::new(AtomicU64::new(0)),
            tts_audio_bytes: Arc::new(AtomicU64::new(0)),
            fallbacks_spoken: Arc::new(AtomicU64::new(0)),
            stale_events_dropped: Arc::new(AtomicU64::new(0)),
            stt_final_wait_ms: Arc::new(AtomicU64::new(0)),
            llm_first_token_ms: Arc::new(AtomicU64::new(0)),
            tts_first_audio_ms: Arc::new(AtomicU64::new(0)),
            cancellation_ms: Arc::new(AtomicU64::new(0)),
            last_speech_at: Arc::new(RwLock::new(None)),
        }
    }
}

impl PipelineMetrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn gauge(gauge: &AtomicU64, value_ms: u64) {
        gauge.store(value_ms, Ordering::Relaxed);
    }

    pub fn mark_speech(&self) {
        *self.last_speech_at.write() = Some(Instant::now());
    }

    /// One-line summary for the session-close log.
    pub fn summary(&self) -> String {
        format!(
            "frames_in={} frames_out={} turns={} interrupted={} barge_ins={} \
             stt_err={} llm_err={} tts_err={} fallbacks={} tts_bytes={}",
            self.frames_in.load(Ordering::Relaxed),
            self.frames_out.load(Ordering::Relaxed),
            self.turns_completed.load(Ordering::Relaxed),
            self.turns_interrupted.load(Ordering::Relaxed),
            self.barge_ins.load(Ordering::Relaxed),
            self.stt_errors.load(Ordering::Relaxed),
            self.llm_errors.load(Ordering::Relaxed),
            self.tts_errors.load(Ordering::Relaxed),
            self.fallbacks_spoken.load(Ordering::Relaxed),
            self.tts_audio_bytes.load(Ordering::Relaxed),
        )
    }
}
