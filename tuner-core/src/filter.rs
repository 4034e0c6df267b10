//! # Signal Pre-processing Module
//!
//! First-order low-pass filtering applied to a raw sample block before pitch
//! estimation. Attenuating content above ~2 kHz suppresses string overtones
//! and hiss that would otherwise mislead the estimators, while leaving the
//! fundamentals of common stringed instruments untouched.

/// Default low-pass cutoff frequency in Hz.
///
/// High enough for the fundamentals of every guitar string (E2 82 Hz up to
/// E4 330 Hz plus headroom), low enough to knock down pick noise.
pub const DEFAULT_CUTOFF_HZ: f32 = 2000.0;

/// Applies a first-order exponential low-pass filter to one block.
///
/// For cutoff `fc` and sample rate `fs`:
/// `rc = 1 / (2π·fc)`, `dt = 1 / fs`, `alpha = dt / (rc + dt)`, and each
/// output sample is `alpha·input[i] + (1 - alpha)·output[i - 1]`.
///
/// The filter is seeded with the block's own first sample and no state is
/// carried between blocks. Each block therefore settles independently over
/// its first few samples; with blocks of a few thousand samples the
/// transient is negligible, and downstream thresholds were tuned against
/// this behavior, so it is kept as is.
///
/// # Arguments
/// * `block` - Input samples, normalized to [-1.0, 1.0]
/// * `sample_rate` - Sample rate in Hz
/// * `cutoff_hz` - Cutoff frequency in Hz
///
/// # Returns
/// * Filtered block of the same length
pub fn low_pass(block: &[f32], sample_rate: u32, cutoff_hz: f32) -> Vec<f32> {
    if block.is_empty() || sample_rate == 0 || cutoff_hz <= 0.0 {
        return block.to_vec();
    }

    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f32;
    let alpha = dt / (rc + dt);

    let mut output = Vec::with_capacity(block.len());
    output.push(block[0]);
    for i in 1..block.len() {
        let previous = output[i - 1];
        output.push(alpha * block[i] + (1.0 - alpha) * previous);
    }
    output
}
