//! # Pitch Detection Module
//!
//! Converts one block of audio samples into a single fundamental-frequency
//! estimate. Two interchangeable algorithms are provided:
//!
//! - YIN (autocorrelation-based, cumulative-mean-normalized difference),
//!   the more precise choice for stringed instruments
//! - FFT peak picking, cheaper but limited to one bin of resolution
//!
//! Both return `None` for silence, noise, or degenerate results; absence of
//! a pitch is a normal outcome here, never an error.

use serde::{Deserialize, Serialize};

use crate::config::DetectorConfig;
use crate::fft;

/// Selectable pitch estimation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PitchAlgorithm {
    /// YIN-style autocorrelation with parabolic refinement.
    #[default]
    Yin,
    /// Magnitude-spectrum peak picking.
    FftPeak,
}

/// Estimates the fundamental frequency of one block with the configured
/// algorithm.
///
/// # Arguments
/// * `block` - Input audio signal, normalized to [-1.0, 1.0]
/// * `sample_rate` - Sample rate in Hz
/// * `config` - Algorithm choice and thresholds
///
/// # Returns
/// * `Some(frequency)` - Detected fundamental in Hz
/// * `None` - No dominant pitch (silence, noise, or invalid signal)
pub fn estimate(block: &[f32], sample_rate: u32, config: &DetectorConfig) -> Option<f32> {
    match config.algorithm {
        PitchAlgorithm::Yin => detect_pitch_yin(
            block,
            sample_rate,
            config.yin_threshold,
            config.yin_amplitude_threshold,
        ),
        PitchAlgorithm::FftPeak => detect_pitch_fft(block, sample_rate, config.fft_noise_floor),
    }
}

/// A robust implementation of the YIN pitch detection algorithm.
///
/// Steps:
/// 1. RMS amplitude gate to filter out silence
/// 2. Squared-difference function `d(tau)` over `tau` in `[1, N/2)`
/// 3. Cumulative mean normalized difference `d'(tau)`, with `d'(0) = 1`
/// 4. First sub-threshold local minimum of `d'`
/// 5. Parabolic interpolation around the minimum for sub-sample accuracy
///
/// # Arguments
/// * `signal` - Input audio signal
/// * `sample_rate` - Sample rate in Hz
/// * `threshold` - Normalized-difference threshold for the dip search
///   (typically 0.1 to 0.15; lower is stricter)
/// * `amplitude_threshold` - Minimum RMS amplitude for pitch detection
///
/// # Returns
/// * `Some(frequency)` - Detected frequency in Hz
/// * `None` - No pitch detected
pub fn detect_pitch_yin(
    signal: &[f32],
    sample_rate: u32,
    threshold: f32,
    amplitude_threshold: f32,
) -> Option<f32> {
    let frame_size = signal.len();
    let half = frame_size / 2;
    if half < 2 || sample_rate == 0 {
        return None;
    }

    // --- Noise gate: RMS check to filter out silence ---
    let rms = (signal.iter().map(|&s| s * s).sum::<f32>() / frame_size as f32).sqrt();
    if rms < amplitude_threshold {
        return None;
    }

    // --- Difference function d(tau) ---
    let mut yin_buffer = vec![0.0f32; half];
    for tau in 1..half {
        let mut diff = 0.0;
        for i in 0..half {
            let delta = signal[i] - signal[i + tau];
            diff += delta * delta;
        }
        yin_buffer[tau] = diff;
    }

    // --- Cumulative mean normalized difference d'(tau) ---
    let mut running_sum = 0.0;
    yin_buffer[0] = 1.0;
    for tau in 1..half {
        running_sum += yin_buffer[tau];
        if running_sum != 0.0 {
            yin_buffer[tau] *= tau as f32 / running_sum;
        } else {
            yin_buffer[tau] = 1.0;
        }
    }

    // --- First sub-threshold dip, walked down to its local minimum ---
    let mut period = 0;
    for tau in 2..half {
        if yin_buffer[tau] < threshold {
            let mut t = tau;
            while t + 1 < half && yin_buffer[t + 1] < yin_buffer[t] {
                t += 1;
            }
            period = t;
            break;
        }
    }
    if period == 0 {
        return None;
    }

    // --- Parabolic interpolation for sub-sample precision ---
    if period + 1 >= half {
        return None;
    }
    let y1 = yin_buffer[period - 1];
    let y2 = yin_buffer[period];
    let y3 = yin_buffer[period + 1];

    let period_float = if (y1 - 2.0 * y2 + y3) != 0.0 {
        let peak_shift = (y1 - y3) / (2.0 * (y1 - 2.0 * y2 + y3));
        period as f32 + peak_shift
    } else {
        period as f32
    };
    if period_float <= 0.0 {
        return None;
    }

    let frequency = sample_rate as f32 / period_float;

    // Final guard: only valid, positive frequencies leave the estimator.
    if frequency.is_finite() && frequency > 0.0 {
        Some(frequency)
    } else {
        None
    }
}

/// Estimates pitch by picking the strongest magnitude peak in the spectrum.
///
/// The block is Hann-windowed and transformed (see [`crate::fft`]); the bin
/// `k` with the largest magnitude over `k >= 1` wins and maps to
/// `k * sample_rate / N`. Resolution is one bin (`sample_rate / N`), so the
/// caller must pick a block size that keeps one bin below the tuning
/// tolerance.
///
/// # Arguments
/// * `signal` - Input audio signal
/// * `sample_rate` - Sample rate in Hz
/// * `noise_floor` - Minimum accepted peak magnitude
///
/// # Returns
/// * `Some(frequency)` - Frequency of the dominant bin
/// * `None` - Spectrum peak below the noise floor, or degenerate input
pub fn detect_pitch_fft(signal: &[f32], sample_rate: u32, noise_floor: f32) -> Option<f32> {
    if signal.len() < 2 || sample_rate == 0 {
        return None;
    }

    let spectrum = fft::forward(signal);
    let mags = fft::magnitudes(&spectrum);

    // DC (bin 0) is excluded from the search.
    let (peak_bin, peak_mag) = mags
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(k, &m)| (k, m))?;

    if peak_mag < noise_floor {
        return None;
    }

    let frequency = peak_bin as f32 * sample_rate as f32 / signal.len() as f32;
    if frequency.is_finite() && frequency > 0.0 {
        Some(frequency)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: f32, num_samples: usize) -> Vec<f32> {
        (0..num_samples)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn yin_440hz_within_one_percent() {
        let signal = sine(440.0, 44100.0, 4096);
        let detected = detect_pitch_yin(&signal, 44100, 0.15, 0.01).unwrap();
        let error_percent = ((detected - 440.0) / 440.0).abs() * 100.0;
        assert!(
            error_percent < 1.0,
            "detected {detected} Hz, error {error_percent:.2}%"
        );
    }

    #[test]
    fn yin_low_string_e2() {
        // Lowest guitar string; period ~535 samples, well inside N/2 = 4096.
        let signal = sine(82.41, 44100.0, 8192);
        let detected = detect_pitch_yin(&signal, 44100, 0.15, 0.01).unwrap();
        let error_percent = ((detected - 82.41) / 82.41).abs() * 100.0;
        assert!(error_percent < 1.0, "detected {detected} Hz");
    }

    #[test]
    fn yin_rejects_silence() {
        let signal = vec![0.0f32; 4096];
        assert_eq!(detect_pitch_yin(&signal, 44100, 0.15, 0.01), None);
    }

    #[test]
    fn yin_rejects_noise() {
        // Deterministic pseudo-random noise.
        let mut state: u32 = 0x1234_5678;
        let noise: Vec<f32> = (0..4096)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect();
        assert_eq!(detect_pitch_yin(&noise, 44100, 0.15, 0.01), None);
    }

    #[test]
    fn fft_440hz_within_one_bin() {
        let signal = sine(440.0, 44100.0, 4096);
        let detected = detect_pitch_fft(&signal, 44100, 1.0).unwrap();
        let bin_resolution = 44100.0 / 4096.0;
        assert!(
            (detected - 440.0).abs() <= bin_resolution,
            "detected {detected} Hz, bin resolution {bin_resolution} Hz"
        );
    }

    #[test]
    fn fft_rejects_silence() {
        let signal = vec![0.0f32; 4096];
        assert_eq!(detect_pitch_fft(&signal, 44100, 1.0), None);
    }

    #[test]
    fn degenerate_inputs_yield_none() {
        assert_eq!(detect_pitch_yin(&[], 44100, 0.15, 0.01), None);
        assert_eq!(detect_pitch_fft(&[], 44100, 1.0), None);
        assert_eq!(detect_pitch_yin(&[0.5, 0.5], 0, 0.15, 0.01), None);
    }

    #[test]
    fn estimate_dispatches_by_algorithm() {
        let signal = sine(329.63, 44100.0, 4096);
        let yin_config = DetectorConfig::default();
        let fft_config = DetectorConfig {
            algorithm: PitchAlgorithm::FftPeak,
            ..DetectorConfig::default()
        };

        let yin = estimate(&signal, 44100, &yin_config).unwrap();
        let fft = estimate(&signal, 44100, &fft_config).unwrap();
        assert!((yin - 329.63).abs() < 3.3);
        assert!((fft - 329.63).abs() <= 44100.0 / 4096.0);
    }
}
