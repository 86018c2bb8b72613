use parlance_audio::AudioFrame;

use crate::config::VadConfig;
use crate::engine::VadEngine;
use crate::state::VadStateMachine;
use crate::types::{VadEvent, VadState};

/// Engine + debouncer + failure guard, the unit the turn engine owns.
///
/// Engine failures are non-fatal: the frame is classified as non-speech and
/// a consecutive-error counter ticks up. Past the configured limit the
/// detector reports saturation, which the session treats as fatal.
pub struct VadDetector {
    engine: Box<dyn VadEngine>,
    machine: VadStateMachine,
    threshold: f32,
    max_consecutive_errors: u32,
    consecutive_errors: u32,
    saturated: bool,
}

impl VadDetector {
    pub fn new(engine: Box<dyn VadEngine>, config: &VadConfig) -> Self {
        Self {
            engine,
            machine: VadStateMachine::new(config),
            threshold: config.threshold,
            max_consecutive_errors: config.max_consecutive_errors,
            consecutive_errors: 0,
            saturated: false,
        }
    }

    pub fn current_state(&self) -> VadState {
        self.machine.current_state()
    }

    pub fn process(&mut self, frame: &AudioFrame) -> Option<VadEvent> {
        if self.saturated {
            return None;
        }

        let probability = match self.engine.speech_probability(&frame.samples) {
            Ok(p) => {
                self.consecutive_errors = 0;
                p
            }
            Err(err) => {
                self.consecutive_errors += 1;
                tracing::warn!(
                    consecutive = self.consecutive_errors,
                    error = %err,
                    "vad engine failure, classifying frame as non-speech"
                );
                if self.consecutive_errors > self.max_consecutive_errors {
                    self.saturated = true;
                    return Some(VadEvent::Saturated {
                        consecutive_errors: self.consecutive_errors,
                    });
                }
                0.0
            }
        };

        self.machine
            .process(probability >= self.threshold, probability)
    }

    pub fn reset(&mut self) {
        self.engine.reset();
        self.machine.reset();
        self.consecutive_errors = 0;
        self.saturated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlance_audio::{FRAME_SIZE_SAMPLES, SAMPLE_RATE_HZ};
    use parlance_foundation::VadError;
    use std::time::Duration;

    struct ScriptedEngine {
        outcomes: Vec<Result<f32, ()>>,
        cursor: usize,
    }

    impl VadEngine for ScriptedEngine {
        fn speech_probability(&mut self, _frame: &[i16]) -> Result<f32, VadError> {
            let outcome = self.outcomes[self.cursor.min(self.outcomes.len() - 1)];
            self.cursor += 1;
            outcome.map_err(|_| VadError::Inference("scripted".into()))
        }
        fn reset(&mut self) {
            self.cursor = 0;
        }
        fn required_sample_rate(&self) -> u32 {
            SAMPLE_RATE_HZ
        }
        fn required_frame_size(&self) -> usize {
            FRAME_SIZE_SAMPLES
        }
    }

    fn frame() -> AudioFrame {
        AudioFrame {
            samples: vec![0; FRAME_SIZE_SAMPLES],
            timestamp: Duration::ZERO,
        }
    }

    #[test]
    fn engine_errors_count_as_silence() {
        let engine = ScriptedEngine {
            outcomes: vec![Ok(0.9), Ok(0.9), Err(()), Ok(0.9)],
            cursor: 0,
        };
        let mut det = VadDetector::new(Box::new(engine), &VadConfig::default());
        det.process(&frame());
        det.process(&frame());
        // the error frame breaks the onset run
        assert!(det.process(&frame()).is_none());
        det.process(&frame());
        assert_eq!(det.current_state(), VadState::Silence);
    }

    #[test]
    fn saturation_after_error_budget() {
        let engine = ScriptedEngine {
            outcomes: vec![Err(())],
            cursor: 0,
        };
        let cfg = VadConfig {
            max_consecutive_errors: 3,
            ..Default::default()
        };
        let mut det = VadDetector::new(Box::new(engine), &cfg);
        for _ in 0..3 {
            assert!(!matches!(det.process(&frame()), Some(VadEvent::Saturated { .. })));
        }
        assert!(matches!(
            det.process(&frame()),
            Some(VadEvent::Saturated { consecutive_errors: 4 })
        ));
        // after saturation the detector stays quiet
        assert!(det.process(&frame()).is_none());
    }

    #[test]
    fn successes_reset_the_error_run() {
        let engine = ScriptedEngine {
            outcomes: vec![Err(()), Err(()), Ok(0.1), Err(()), Err(()), Ok(0.1)],
            cursor: 0,
        };
        let cfg = VadConfig {
            max_consecutive_errors: 2,
            ..Default::default()
        };
        let mut det = VadDetector::new(Box::new(engine), &cfg);
        for _ in 0..6 {
            assert!(!matches!(det.process(&frame()), Some(VadEvent::Saturated { .. })));
        }
    }
}
