//! # Configuration Module
//!
//! Tunable parameters for the capture/estimation pipeline and the smoothing
//! stage. Every field has a sensible default, so a plain `Default::default()`
//! gives a working guitar-tuner setup. The structs derive serde traits so a
//! frontend can persist them as a profile.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pitch::PitchAlgorithm;

/// Default capture sample rate in Hz (CD quality).
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default number of samples per analysis block.
///
/// At 44.1 kHz this is ~93 ms of audio and gives an FFT bin resolution of
/// ~10.77 Hz, comfortably inside the ±15 Hz match window used by the
/// tuning evaluator.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Configuration for the capture session and pitch estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Requested capture sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per analysis block.
    pub block_size: usize,
    /// Which pitch estimation algorithm to run on each block.
    pub algorithm: PitchAlgorithm,
    /// YIN: cumulative-mean-normalized difference threshold for the
    /// first-dip search.
    pub yin_threshold: f32,
    /// YIN: minimum block RMS amplitude; quieter blocks are treated
    /// as silence.
    pub yin_amplitude_threshold: f32,
    /// FFT peak picking: minimum peak magnitude; weaker peaks are treated
    /// as noise.
    pub fft_noise_floor: f32,
    /// Low-pass pre-filter cutoff in Hz, or `None` to feed raw blocks to
    /// the estimator.
    pub low_pass_cutoff_hz: Option<f32>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            algorithm: PitchAlgorithm::Yin,
            yin_threshold: 0.15,
            yin_amplitude_threshold: 0.01,
            fft_noise_floor: 1.0,
            low_pass_cutoff_hz: Some(crate::filter::DEFAULT_CUTOFF_HZ),
        }
    }
}

/// Configuration for the smoothing/interpolation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// Estimates below this frequency are discarded as sub-audible noise.
    pub noise_gate_hz: f32,
    /// Length of one rate-limit window in milliseconds. Only the freshest
    /// estimate inside a window survives.
    pub step_time_ms: u64,
    /// Number of interpolation sub-steps emitted per window.
    pub step_count: u32,
}

impl SmoothingConfig {
    /// Duration of one full rate-limit window.
    pub fn step_time(&self) -> Duration {
        Duration::from_millis(self.step_time_ms)
    }

    /// Delay between two consecutive interpolated sub-steps.
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_time_ms / self.step_count.max(1) as u64)
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            noise_gate_hz: 50.0,
            step_time_ms: 500,
            step_count: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_detector_config_is_consistent() {
        let config = DetectorConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.block_size, 4096);
        // Bin resolution must stay below the match tolerance of the
        // tuning evaluator, otherwise FFT peak picking is too coarse.
        let bin_resolution = config.sample_rate as f32 / config.block_size as f32;
        assert!(bin_resolution < crate::tuning::MATCH_TOLERANCE_HZ);
    }

    #[test]
    fn smoothing_step_timing() {
        let config = SmoothingConfig::default();
        assert_eq!(config.step_time(), Duration::from_millis(500));
        assert_eq!(config.step_delay(), Duration::from_millis(25));
    }
}
