use crate::config::VadConfig;
use crate::types::{VadEvent, VadState};

/// Debouncing state machine over per-frame speech judgements.
///
/// Consumes one boolean per canonical frame and emits speech-start after a
/// sustained onset run, a heartbeat during speech, and speech-end after a
/// sustained offset run. Timestamps count processed frames, so they follow
/// the audio timeline rather than wall clock.
pub struct VadStateMachine {
    state: VadState,
    speech_run: u32,
    silence_run: u32,
    onset_frames: u32,
    offset_frames: u32,
    heartbeat_frames: u32,
    frames_processed: u64,
    speech_started_frame: Option<u64>,
    frames_since_heartbeat: u32,
    frame_duration_ms: f32,
}

impl VadStateMachine {
    pub fn new(config: &VadConfig) -> Self {
        Self {
            state: VadState::Silence,
            speech_run: 0,
            silence_run: 0,
            onset_frames: config.speech_debounce_frames(),
            offset_frames: config.silence_debounce_frames(),
            heartbeat_frames: config.heartbeat_frames(),
            frames_processed: 0,
            speech_started_frame: None,
            frames_since_heartbeat: 0,
            frame_duration_ms: config.frame_duration_ms(),
        }
    }

    pub fn current_state(&self) -> VadState {
        self.state
    }

    pub fn process(&mut self, is_speech: bool, probability: f32) -> Option<VadEvent> {
        self.frames_processed += 1;

        match self.state {
            VadState::Silence => {
                if is_speech {
                    self.speech_run += 1;
                    if self.speech_run >= self.onset_frames {
                        self.state = VadState::Speech;
                        self.speech_run = 0;
                        self.frames_since_heartbeat = 0;
                        // the onset run itself was speech
                        self.speech_started_frame =
                            Some(self.frames_processed.saturating_sub(self.onset_frames as u64));
                        return Some(VadEvent::SpeechStart {
                            timestamp_ms: self.timestamp_ms(),
                            probability,
                        });
                    }
                } else {
                    self.speech_run = 0;
                }
                None
            }
            VadState::Speech => {
                if is_speech {
                    self.silence_run = 0;
                } else {
                    self.silence_run += 1;
                    if self.silence_run >= self.offset_frames {
                        self.state = VadState::Silence;
                        self.silence_run = 0;
                        let duration_ms = self.speech_duration_ms();
                        self.speech_started_frame = None;
                        return Some(VadEvent::SpeechEnd {
                            timestamp_ms: self.timestamp_ms(),
                            duration_ms,
                        });
                    }
                }

                self.frames_since_heartbeat += 1;
                if self.frames_since_heartbeat >= self.heartbeat_frames {
                    self.frames_since_heartbeat = 0;
                    return Some(VadEvent::SpeechContinue {
                        timestamp_ms: self.timestamp_ms(),
                        duration_ms: self.speech_duration_ms(),
                    });
                }
                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = VadState::Silence;
        self.speech_run = 0;
        self.silence_run = 0;
        self.frames_processed = 0;
        self.speech_started_frame = None;
        self.frames_since_heartbeat = 0;
    }

    fn timestamp_ms(&self) -> u64 {
        (self.frames_processed as f32 * self.frame_duration_ms) as u64
    }

    fn speech_duration_ms(&self) -> u64 {
        match self.speech_started_frame {
            Some(start) => {
                ((self.frames_processed - start) as f32 * self.frame_duration_ms) as u64
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> VadStateMachine {
        VadStateMachine::new(&VadConfig::default())
    }

    #[test]
    fn onset_needs_five_frames() {
        let mut sm = machine();
        for _ in 0..4 {
            assert_eq!(sm.process(true, 0.9), None);
        }
        match sm.process(true, 0.9) {
            Some(VadEvent::SpeechStart { timestamp_ms, .. }) => {
                assert_eq!(timestamp_ms, 100);
            }
            other => panic!("expected SpeechStart, got {:?}", other),
        }
        assert_eq!(sm.current_state(), VadState::Speech);
    }

    #[test]
    fn isolated_blips_do_not_trigger() {
        let mut sm = machine();
        for _ in 0..20 {
            assert_eq!(sm.process(true, 0.9), None);
            assert_eq!(sm.process(false, 0.1), None);
        }
        assert_eq!(sm.current_state(), VadState::Silence);
    }

    #[test]
    fn offset_needs_twentyfive_frames() {
        let mut sm = machine();
        for _ in 0..5 {
            sm.process(true, 0.9);
        }
        for _ in 0..24 {
            let ev = sm.process(false, 0.1);
            assert!(!matches!(ev, Some(VadEvent::SpeechEnd { .. })));
        }
        match sm.process(false, 0.1) {
            Some(VadEvent::SpeechEnd { duration_ms, .. }) => assert!(duration_ms > 0),
            other => panic!("expected SpeechEnd, got {:?}", other),
        }
        assert_eq!(sm.current_state(), VadState::Silence);
    }

    #[test]
    fn heartbeat_every_200ms_of_speech() {
        let mut sm = machine();
        for _ in 0..5 {
            sm.process(true, 0.9);
        }
        let mut beats = 0;
        for _ in 0..100 {
            if let Some(VadEvent::SpeechContinue { .. }) = sm.process(true, 0.9) {
                beats += 1;
            }
        }
        // 100 frames of sustained speech = 2 s -> 10 heartbeats
        assert_eq!(beats, 10);
    }

    #[test]
    fn brief_pause_does_not_end_speech() {
        let mut sm = machine();
        for _ in 0..5 {
            sm.process(true, 0.9);
        }
        for _ in 0..10 {
            sm.process(false, 0.1);
        }
        sm.process(true, 0.9);
        assert_eq!(sm.current_state(), VadState::Speech);
    }
}
