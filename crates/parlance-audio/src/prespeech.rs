use std::collections::VecDeque;
use std::time::Duration;

use crate::frame::{AudioFrame, FRAME_DURATION};

/// Default pre-speech window: 500 ms, 25 canonical frames.
pub const DEFAULT_PRESPEECH: Duration = Duration::from_millis(500);

/// Ring of the most recent canonical frames preceding a speech-start event.
///
/// The voice detector only fires once enough speech has accumulated, so the
/// leading phonemes of an utterance are already in the past by the time STT
/// opens. Replaying this window in front of the live stream recovers them.
///
/// Written by the frame path, drained exactly once at speech start. It is
/// not refilled while an STT session is open, which keeps every buffered
/// frame strictly older than the speech-start transition.
pub struct PreSpeechBuffer {
    frames: VecDeque<AudioFrame>,
    capacity: usize,
}

impl PreSpeechBuffer {
    pub fn new(window: Duration) -> Self {
        let capacity = (window.as_millis() / FRAME_DURATION.as_millis()).max(1) as usize;
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, frame: AudioFrame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Take everything buffered, oldest first.
    pub fn drain(&mut self) -> Vec<AudioFrame> {
        self.frames.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn buffered(&self) -> Duration {
        FRAME_DURATION * self.frames.len() as u32
    }
}

impl Default for PreSpeechBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_PRESPEECH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FRAME_SIZE_SAMPLES;

    fn frame(tag: i16, index: u64) -> AudioFrame {
        AudioFrame {
            samples: vec![tag; FRAME_SIZE_SAMPLES],
            timestamp: FRAME_DURATION * index as u32,
        }
    }

    #[test]
    fn default_capacity_is_500ms() {
        let buf = PreSpeechBuffer::default();
        assert_eq!(buf.capacity, 25);
    }

    #[test]
    fn keeps_only_the_newest_window() {
        let mut buf = PreSpeechBuffer::default();
        for i in 0..40 {
            buf.push(frame(i as i16, i));
        }
        assert_eq!(buf.len(), 25);
        let drained = buf.drain();
        assert_eq!(drained[0].samples[0], 15);
        assert_eq!(drained.last().unwrap().samples[0], 39);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_preserves_arrival_order() {
        let mut buf = PreSpeechBuffer::default();
        for i in 0..5 {
            buf.push(frame(i as i16, i));
        }
        let drained = buf.drain();
        let tags: Vec<i16> = drained.iter().map(|f| f.samples[0]).collect();
        assert_eq!(tags, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn buffered_duration_tracks_len() {
        let mut buf = PreSpeechBuffer::default();
        buf.push(frame(0, 0));
        buf.push(frame(1, 1));
        assert_eq!(buf.buffered(), Duration::from_millis(40));
    }
}
