use parlance_foundation::AudioError;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};

/// Quality presets for the sinc resampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplerQuality {
    /// Short filter, linear interpolation. Lowest CPU.
    Fast,
    /// Default speech-grade preset.
    Balanced,
    /// Long filter, highest stopband attenuation.
    Quality,
}

impl ResamplerQuality {
    fn sinc_params(self) -> SincInterpolationParameters {
        match self {
            ResamplerQuality::Fast => SincInterpolationParameters {
                sinc_len: 32,
                f_cutoff: 0.92,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 64,
                window: WindowFunction::Blackman,
            },
            ResamplerQuality::Balanced => SincInterpolationParameters {
                sinc_len: 64,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 128,
                window: WindowFunction::Blackman2,
            },
            ResamplerQuality::Quality => SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.97,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            },
        }
    }
}

/// Number of input samples fed to rubato per processing call.
/// 512 at 16 kHz is 32 ms, small enough to keep voice latency low.
const PROCESS_CHUNK: usize = 512;

/// Streaming mono i16 resampler.
///
/// Accepts arbitrary-sized input chunks, buffers internally to satisfy
/// rubato's fixed-input-chunk requirement, and applies the rate ratio
/// chunkwise so no drift accumulates across chunks.
pub struct StreamResampler {
    in_rate: u32,
    out_rate: u32,
    inner: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(in_rate: u32, out_rate: u32) -> Result<Self, AudioError> {
        Self::with_quality(in_rate, out_rate, ResamplerQuality::Balanced)
    }

    pub fn with_quality(
        in_rate: u32,
        out_rate: u32,
        quality: ResamplerQuality,
    ) -> Result<Self, AudioError> {
        // Equal rates bypass rubato entirely.
        let inner = if in_rate == out_rate {
            None
        } else {
            let resampler = SincFixedIn::<f32>::new(
                out_rate as f64 / in_rate as f64,
                2.0,
                quality.sinc_params(),
                PROCESS_CHUNK,
                1,
            )
            .map_err(|e| AudioError::Resample(e.to_string()))?;
            Some(resampler)
        };

        Ok(Self {
            in_rate,
            out_rate,
            inner,
            pending: Vec::with_capacity(PROCESS_CHUNK * 2),
        })
    }

    pub fn input_rate(&self) -> u32 {
        self.in_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.out_rate
    }

    /// Resample a chunk of mono i16 samples, returning whatever output is
    /// ready. Input shorter than the internal chunk size is buffered until
    /// enough accumulates.
    pub fn process(&mut self, input: &[i16]) -> Result<Vec<i16>, AudioError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(input.to_vec());
        };

        self.pending
            .extend(input.iter().map(|&s| s as f32 / 32_768.0));

        let mut out = Vec::new();
        while self.pending.len() >= PROCESS_CHUNK {
            let chunk: Vec<f32> = self.pending.drain(..PROCESS_CHUNK).collect();
            let frames = inner
                .process(&[chunk], None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            if let Some(channel) = frames.first() {
                out.extend(
                    channel
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * 32_767.0).round() as i16),
                );
            }
        }
        Ok(out)
    }

    /// Drop buffered input and reset filter state. Used when the upstream
    /// device configuration changes mid-stream.
    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(inner) = self.inner.as_mut() {
            inner.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_at_equal_rates() {
        let mut rs = StreamResampler::new(16_000, 16_000).unwrap();
        let input = vec![3i16, -7, 120, 4000];
        assert_eq!(rs.process(&input).unwrap(), input);
    }

    #[test]
    fn downsample_3x_sample_count() {
        let mut rs = StreamResampler::new(48_000, 16_000).unwrap();
        let input: Vec<i16> = (0..9_600).map(|i| ((i * 37) % 5000) as i16).collect();
        let mut out = rs.process(&input).unwrap();
        out.extend(rs.process(&input).unwrap());
        // 19_200 in -> ~6_400 out, minus filter latency held inside rubato
        assert!(
            out.len() > 5_000 && out.len() <= 6_600,
            "unexpected output length {}",
            out.len()
        );
    }

    #[test]
    fn upsample_preserves_level() {
        let mut rs = StreamResampler::new(16_000, 48_000).unwrap();
        let input = vec![1000i16; 4_096];
        let out = rs.process(&input).unwrap();
        assert!(!out.is_empty());
        let mid = &out[out.len() / 4..out.len() * 3 / 4];
        for &s in mid {
            assert!((850..=1150).contains(&s), "sample {} off level", s);
        }
    }

    #[test]
    fn all_presets_produce_output() {
        for q in [
            ResamplerQuality::Fast,
            ResamplerQuality::Balanced,
            ResamplerQuality::Quality,
        ] {
            let mut rs = StreamResampler::with_quality(44_100, 16_000, q).unwrap();
            let input: Vec<i16> = (0..8_192).map(|i| ((i % 200) as i16 - 100) * 50).collect();
            let mut out = rs.process(&input).unwrap();
            out.extend(rs.process(&input).unwrap());
            assert!(!out.is_empty());
        }
    }
}
