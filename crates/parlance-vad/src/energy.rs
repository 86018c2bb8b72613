use parlance_audio::{FRAME_SIZE_SAMPLES, SAMPLE_RATE_HZ};
use parlance_foundation::VadError;

use crate::engine::VadEngine;

const DBFS_FLOOR: f32 = -100.0;

/// RMS energy of a frame expressed in dBFS.
pub fn frame_dbfs(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return DBFS_FLOOR;
    }
    let sum_squares: i64 = frame.iter().map(|&s| (s as i64) * (s as i64)).sum();
    let rms = ((sum_squares as f64 / frame.len() as f64).sqrt() / 32_768.0) as f32;
    if rms <= 1e-10 {
        DBFS_FLOOR
    } else {
        20.0 * rms.log10()
    }
}

#[derive(Debug, Clone)]
pub struct EnergyVadConfig {
    /// dB above the tracked noise floor at which speech becomes likely.
    pub onset_margin_db: f32,
    /// EMA coefficient for the noise floor tracker.
    pub floor_alpha: f32,
    pub initial_floor_db: f32,
    /// Logistic steepness mapping margin to probability.
    pub slope: f32,
}

impl Default for EnergyVadConfig {
    fn default() -> Self {
        Self {
            onset_margin_db: 9.0,
            floor_alpha: 0.02,
            initial_floor_db: -50.0,
            slope: 0.6,
        }
    }
}

/// Energy-based engine with an EMA-adaptive noise floor.
///
/// The margin of the frame's energy over the floor is squashed through a
/// logistic so the detector interface stays probabilistic and the threshold
/// semantics match heavier neural engines. The floor only adapts on frames
/// judged non-speech, so sustained talking does not raise it.
pub struct EnergyVad {
    cfg: EnergyVadConfig,
    floor_db: f32,
}

impl EnergyVad {
    pub fn new(cfg: EnergyVadConfig) -> Self {
        Self {
            floor_db: cfg.initial_floor_db,
            cfg,
        }
    }

    pub fn noise_floor_db(&self) -> f32 {
        self.floor_db
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(EnergyVadConfig::default())
    }
}

impl VadEngine for EnergyVad {
    fn speech_probability(&mut self, frame: &[i16]) -> Result<f32, VadError> {
        if frame.len() != FRAME_SIZE_SAMPLES {
            return Err(VadError::InvalidFrameSize {
                expected: FRAME_SIZE_SAMPLES,
                actual: frame.len(),
            });
        }

        let energy_db = frame_dbfs(frame);
        let margin = energy_db - (self.floor_db + self.cfg.onset_margin_db);
        let probability = 1.0 / (1.0 + (-self.cfg.slope * margin).exp());

        if probability < 0.5 && energy_db > DBFS_FLOOR {
            self.floor_db += self.cfg.floor_alpha * (energy_db - self.floor_db);
        }

        Ok(probability)
    }

    fn reset(&mut self) {
        self.floor_db = self.cfg.initial_floor_db;
    }

    fn required_sample_rate(&self) -> u32 {
        SAMPLE_RATE_HZ
    }

    fn required_frame_size(&self) -> usize {
        FRAME_SIZE_SAMPLES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(amplitude: f32) -> Vec<i16> {
        (0..FRAME_SIZE_SAMPLES)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * 440.0 * i as f32 / SAMPLE_RATE_HZ as f32;
                (phase.sin() * amplitude) as i16
            })
            .collect()
    }

    #[test]
    fn silence_scores_low() {
        let mut vad = EnergyVad::default();
        let p = vad.speech_probability(&vec![0; FRAME_SIZE_SAMPLES]).unwrap();
        assert!(p < 0.1, "silence probability was {}", p);
    }

    #[test]
    fn loud_tone_scores_high() {
        let mut vad = EnergyVad::default();
        let p = vad.speech_probability(&tone(12_000.0)).unwrap();
        assert!(p > 0.9, "tone probability was {}", p);
    }

    #[test]
    fn floor_adapts_to_background_noise() {
        use rand::Rng;
        let mut vad = EnergyVad::default();
        let mut rng = rand::thread_rng();
        let initial = vad.noise_floor_db();
        for _ in 0..200 {
            let noise: Vec<i16> = (0..FRAME_SIZE_SAMPLES)
                .map(|_| ((rng.gen::<f32>() - 0.5) * 600.0) as i16)
                .collect();
            vad.speech_probability(&noise).unwrap();
        }
        assert!(vad.noise_floor_db() > initial);
        // a quiet hum over the adapted floor should no longer trigger
        let noise: Vec<i16> = (0..FRAME_SIZE_SAMPLES)
            .map(|_| ((rng.gen::<f32>() - 0.5) * 600.0) as i16)
            .collect();
        assert!(vad.speech_probability(&noise).unwrap() < 0.5);
    }

    #[test]
    fn wrong_frame_size_is_an_error() {
        let mut vad = EnergyVad::default();
        assert!(matches!(
            vad.speech_probability(&[0; 100]),
            Err(VadError::InvalidFrameSize { expected: 320, actual: 100 })
        ));
    }

    #[test]
    fn reset_restores_initial_floor() {
        let mut vad = EnergyVad::default();
        for _ in 0..50 {
            vad.speech_probability(&tone(300.0)).unwrap();
        }
        vad.reset();
        assert_eq!(vad.noise_floor_db(), EnergyVadConfig::default().initial_floor_db);
    }
}
