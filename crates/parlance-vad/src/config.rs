use parlance_audio::{FRAME_SIZE_SAMPLES, SAMPLE_RATE_HZ};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Speech probability above this counts the frame as speech.
    pub threshold: f32,
    /// Run of speech frames required before speech-start fires.
    pub speech_debounce_ms: u32,
    /// Run of silence frames required before speech-end fires.
    pub silence_debounce_ms: u32,
    /// Heartbeat cadence during sustained speech.
    pub heartbeat_ms: u32,
    /// Consecutive engine failures before the detector is declared dead.
    pub max_consecutive_errors: u32,
    pub frame_size_samples: usize,
    pub sample_rate_hz: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            speech_debounce_ms: 100,
            silence_debounce_ms: 500,
            heartbeat_ms: 200,
            max_consecutive_errors: 50,
            frame_size_samples: FRAME_SIZE_SAMPLES,
            sample_rate_hz: SAMPLE_RATE_HZ,
        }
    }
}

impl VadConfig {
    pub fn frame_duration_ms(&self) -> f32 {
        self.frame_size_samples as f32 * 1000.0 / self.sample_rate_hz as f32
    }

    pub fn speech_debounce_frames(&self) -> u32 {
        (self.speech_debounce_ms as f32 / self.frame_duration_ms()).ceil() as u32
    }

    pub fn silence_debounce_frames(&self) -> u32 {
        (self.silence_debounce_ms as f32 / self.frame_duration_ms()).ceil() as u32
    }

    pub fn heartbeat_frames(&self) -> u32 {
        (self.heartbeat_ms as f32 / self.frame_duration_ms()).ceil().max(1.0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlance_audio::FRAME_DURATION;

    #[test]
    fn default_debounce_matches_canonical_frames() {
        let cfg = VadConfig::default();
        assert_eq!(cfg.frame_duration_ms(), FRAME_DURATION.as_millis() as f32);
        // 100 ms onset at 20 ms frames -> 5 frames; 500 ms offset -> 25
        assert_eq!(cfg.speech_debounce_frames(), 5);
        assert_eq!(cfg.silence_debounce_frames(), 25);
        assert_eq!(cfg.heartbeat_frames(), 10);
    }
}
