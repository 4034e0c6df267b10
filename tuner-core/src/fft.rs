//! # Fast Fourier Transform (FFT) Module
//!
//! Frequency-domain helpers for the FFT-based pitch estimator, built on
//! RustFFT. Handles DC offset removal, Hann windowing, the forward transform
//! and magnitude extraction.

use rustfft::{FftPlanner, num_complex::Complex};

/// Removes the DC offset from a signal by making its average value zero.
///
/// A DC component shows up as a large value in bin 0 and leaks into its
/// neighbors, which can dwarf the actual fundamental during peak picking.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window to the buffer to reduce spectral leakage.
fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Performs a forward FFT on a signal and returns the complex spectrum.
///
/// The input is copied, DC-corrected and Hann-windowed before the transform,
/// so the caller's block is left untouched.
///
/// # Arguments
/// * `signal` - Input audio block of any non-zero length
///
/// # Returns
/// * `Vec<Complex<f32>>` - Complex frequency spectrum, same length as input
pub fn forward(signal: &[f32]) -> Vec<Complex<f32>> {
    let mut processed_signal = signal.to_vec();
    remove_dc_offset(&mut processed_signal);
    apply_hann_window(&mut processed_signal);

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(processed_signal.len());

    let mut buffer: Vec<Complex<f32>> = processed_signal
        .into_iter()
        .map(|sample| Complex { re: sample, im: 0.0 })
        .collect();

    fft.process(&mut buffer);
    buffer
}

/// Calculates the magnitude vector from a complex spectrum.
///
/// Only the first half of the spectrum (up to the Nyquist frequency) carries
/// independent information for a real input, so only that half is returned.
///
/// # Arguments
/// * `spectrum` - Complex frequency spectrum from [`forward`]
///
/// # Returns
/// * `Vec<f32>` - Magnitudes for bins `0..=N/2`
pub fn magnitudes(spectrum: &[Complex<f32>]) -> Vec<f32> {
    spectrum
        .iter()
        .take(spectrum.len() / 2 + 1)
        .map(|c| c.norm()) // .norm() is sqrt(re^2 + im^2)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn sine_peak_lands_in_expected_bin() {
        let sample_rate = 44100.0;
        let n = 4096;
        let freq = 440.0;
        let signal: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect();

        let spectrum = forward(&signal);
        let mags = magnitudes(&spectrum);
        assert_eq!(mags.len(), n / 2 + 1);

        let peak_bin = mags
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(k, _)| k)
            .unwrap();

        let expected_bin = (freq * n as f32 / sample_rate).round() as usize;
        assert!(
            peak_bin.abs_diff(expected_bin) <= 1,
            "peak at bin {peak_bin}, expected near {expected_bin}"
        );
    }

    #[test]
    fn dc_only_signal_has_no_dominant_peak() {
        let signal = vec![0.5f32; 2048];
        let spectrum = forward(&signal);
        let mags = magnitudes(&spectrum);
        // After DC removal and windowing nothing substantial remains.
        let max = mags.iter().skip(1).cloned().fold(0.0f32, f32::max);
        assert!(max < 1.0, "residual peak magnitude {max}");
    }
}
