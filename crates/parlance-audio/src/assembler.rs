use std::collections::VecDeque;
use std::time::Duration;

use parlance_foundation::AudioError;

use crate::frame::{AudioFrame, RawAudio, FRAME_SIZE_SAMPLES, SAMPLE_RATE_HZ};
use crate::resampler::{ResamplerQuality, StreamResampler};

/// Ingest side of the frame pipeline: adapts whatever the transport delivers
/// (any rate, any channel count, any chunk size) to canonical 20 ms frames.
///
/// Every input sample is accounted for; partial frames wait in the buffer
/// until the next chunk completes them. Timestamps are derived from the
/// emitted-sample count, so they are strictly monotonic by construction.
pub struct FrameAssembler {
    quality: ResamplerQuality,
    resampler: Option<StreamResampler>,
    input_rate: Option<u32>,
    input_channels: Option<u16>,
    buffer: VecDeque<i16>,
    samples_emitted: u64,
}

impl FrameAssembler {
    pub fn new(quality: ResamplerQuality) -> Self {
        Self {
            quality,
            resampler: None,
            input_rate: None,
            input_channels: None,
            buffer: VecDeque::with_capacity(FRAME_SIZE_SAMPLES * 4),
            samples_emitted: 0,
        }
    }

    /// Consume one raw chunk, producing zero or more canonical frames.
    pub fn ingest(&mut self, raw: &RawAudio) -> Result<Vec<AudioFrame>, AudioError> {
        if raw.sample_rate == 0 || raw.channels == 0 {
            return Err(AudioError::UnsupportedFormat {
                rate: raw.sample_rate,
                channels: raw.channels,
            });
        }

        if self.input_rate != Some(raw.sample_rate) || self.input_channels != Some(raw.channels) {
            self.reconfigure(raw.sample_rate, raw.channels)?;
        }

        let mono = downmix(&raw.samples, raw.channels);
        let at_rate = match self.resampler.as_mut() {
            Some(rs) => rs.process(&mono)?,
            None => mono,
        };

        self.buffer.extend(at_rate);
        Ok(self.drain_full_frames())
    }

    /// Discontinuity handling: emit the silence run covering `gap`, keeping
    /// the timestamp sequence contiguous.
    pub fn insert_silence(&mut self, gap: Duration) -> Vec<AudioFrame> {
        let samples = (gap.as_millis() as u64 * SAMPLE_RATE_HZ as u64 / 1000) as usize;
        self.buffer.extend(std::iter::repeat(0i16).take(samples));
        self.drain_full_frames()
    }

    /// Flush the buffered tail as one final zero-padded frame, if any tail
    /// exists. Used when a stream ends mid-frame.
    pub fn flush_padded(&mut self) -> Option<AudioFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut samples: Vec<i16> = self.buffer.drain(..).collect();
        samples.resize(FRAME_SIZE_SAMPLES, 0);
        Some(self.stamp(samples))
    }

    fn reconfigure(&mut self, rate: u32, channels: u16) -> Result<(), AudioError> {
        tracing::debug!(
            rate,
            channels,
            target_rate = SAMPLE_RATE_HZ,
            "frame assembler input format change"
        );
        self.resampler = if rate == SAMPLE_RATE_HZ {
            None
        } else {
            Some(StreamResampler::with_quality(
                rate,
                SAMPLE_RATE_HZ,
                self.quality,
            )?)
        };
        self.input_rate = Some(rate);
        self.input_channels = Some(channels);
        Ok(())
    }

    fn drain_full_frames(&mut self) -> Vec<AudioFrame> {
        let mut out = Vec::new();
        while self.buffer.len() >= FRAME_SIZE_SAMPLES {
            let samples: Vec<i16> = self.buffer.drain(..FRAME_SIZE_SAMPLES).collect();
            out.push(self.stamp(samples));
        }
        out
    }

    fn stamp(&mut self, samples: Vec<i16>) -> AudioFrame {
        let timestamp =
            Duration::from_micros(self.samples_emitted * 1_000_000 / SAMPLE_RATE_HZ as u64);
        self.samples_emitted += samples.len() as u64;
        AudioFrame { samples, timestamp }
    }
}

/// Emit side: canonical frames back out at whatever rate the transport
/// expects.
pub struct FrameEmitter {
    resampler: Option<StreamResampler>,
    out_rate: u32,
}

impl FrameEmitter {
    pub fn new(out_rate: u32, quality: ResamplerQuality) -> Result<Self, AudioError> {
        let resampler = if out_rate == SAMPLE_RATE_HZ {
            None
        } else {
            Some(StreamResampler::with_quality(
                SAMPLE_RATE_HZ,
                out_rate,
                quality,
            )?)
        };
        Ok(Self {
            resampler,
            out_rate,
        })
    }

    pub fn output_rate(&self) -> u32 {
        self.out_rate
    }

    pub fn emit(&mut self, frame: &AudioFrame) -> Result<Vec<i16>, AudioError> {
        match self.resampler.as_mut() {
            Some(rs) => rs.process(&frame.samples),
            None => Ok(frame.samples.clone()),
        }
    }
}

fn downmix(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let n = channels as usize;
    samples
        .chunks_exact(n)
        .map(|group| {
            let sum: i32 = group.iter().map(|&s| s as i32).sum();
            (sum / n as i32) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FRAME_DURATION;

    #[test]
    fn rechunks_16k_mono_exactly() {
        let mut asm = FrameAssembler::new(ResamplerQuality::Balanced);
        // 50 ms in one chunk: two full frames plus a 10 ms tail
        let raw = RawAudio::mono_16k((0..800).map(|i| i as i16).collect());
        let frames = asm.ingest(&raw).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples.len(), FRAME_SIZE_SAMPLES);
        assert_eq!(frames[0].samples[0], 0);
        assert_eq!(frames[1].samples[0], 320);

        // the tail completes on the next chunk, nothing dropped
        let raw = RawAudio::mono_16k((800..960).map(|i| i as i16).collect());
        let frames = asm.ingest(&raw).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples[0], 640);
    }

    #[test]
    fn timestamps_strictly_monotonic() {
        let mut asm = FrameAssembler::new(ResamplerQuality::Balanced);
        let mut last = None;
        for _ in 0..10 {
            let raw = RawAudio::mono_16k(vec![0; 480]);
            for frame in asm.ingest(&raw).unwrap() {
                if let Some(prev) = last {
                    assert!(frame.timestamp > prev);
                    assert_eq!(frame.timestamp - prev, FRAME_DURATION);
                }
                last = Some(frame.timestamp);
            }
        }
    }

    #[test]
    fn stereo_downmix_averages_pairs() {
        let mut asm = FrameAssembler::new(ResamplerQuality::Balanced);
        let interleaved: Vec<i16> = (0..FRAME_SIZE_SAMPLES)
            .flat_map(|_| [1000i16, -1000])
            .collect();
        let raw = RawAudio {
            samples: interleaved,
            sample_rate: SAMPLE_RATE_HZ,
            channels: 2,
        };
        let frames = asm.ingest(&raw).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn resamples_48k_input() {
        let mut asm = FrameAssembler::new(ResamplerQuality::Fast);
        let mut produced = 0;
        // one second of 48 kHz audio in 10 ms chunks
        for _ in 0..100 {
            let raw = RawAudio {
                samples: vec![2000; 480],
                sample_rate: 48_000,
                channels: 1,
            };
            produced += asm.ingest(&raw).unwrap().len();
        }
        // ~50 canonical frames expected, allowing for filter latency
        assert!((44..=50).contains(&produced), "got {} frames", produced);
    }

    #[test]
    fn silence_gap_keeps_timeline_contiguous() {
        let mut asm = FrameAssembler::new(ResamplerQuality::Balanced);
        let first = asm
            .ingest(&RawAudio::mono_16k(vec![1; FRAME_SIZE_SAMPLES]))
            .unwrap();
        let gap = asm.insert_silence(Duration::from_millis(100));
        assert_eq!(gap.len(), 5);
        assert!(gap.iter().all(|f| f.samples.iter().all(|&s| s == 0)));
        assert_eq!(gap[0].timestamp, first[0].timestamp + FRAME_DURATION);
    }

    #[test]
    fn ingest_emit_identity_at_equal_rates() {
        let mut asm = FrameAssembler::new(ResamplerQuality::Balanced);
        let mut emitter = FrameEmitter::new(SAMPLE_RATE_HZ, ResamplerQuality::Balanced).unwrap();
        let source: Vec<i16> = (0..1600).map(|i| (i % 311) as i16).collect();
        let frames = asm
            .ingest(&RawAudio::mono_16k(source.clone()))
            .unwrap();
        let mut round_trip = Vec::new();
        for frame in &frames {
            round_trip.extend(emitter.emit(frame).unwrap());
        }
        assert_eq!(round_trip, source);
    }

    #[test]
    fn flush_pads_the_tail() {
        let mut asm = FrameAssembler::new(ResamplerQuality::Balanced);
        asm.ingest(&RawAudio::mono_16k(vec![7; 100])).unwrap();
        let tail = asm.flush_padded().unwrap();
        assert_eq!(tail.samples.len(), FRAME_SIZE_SAMPLES);
        assert_eq!(&tail.samples[..100], &[7; 100][..]);
        assert!(tail.samples[100..].iter().all(|&s| s == 0));
        assert!(asm.flush_padded().is_none());
    }

    #[test]
    fn rejects_zero_rate() {
        let mut asm = FrameAssembler::new(ResamplerQuality::Balanced);
        let raw = RawAudio {
            samples: vec![0; 100],
            sample_rate: 0,
            channels: 1,
        };
        assert!(asm.ingest(&raw).is_err());
    }
}
