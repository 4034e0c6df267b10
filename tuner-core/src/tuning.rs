//! # Musical Tuning Module
//!
//! Target-tone catalog and the pure tuning evaluator: cents deviation,
//! Low/Match/High classification, and the clamped gauge-needle angle
//! consumed by a rendering frontend.
//!
//! ## Features
//! - Immutable tone catalog per instrument (currently classic guitar)
//! - Cent deviation calculations for tuning accuracy
//! - Absolute-window Low/Match/High classification
//! - Linear, clamped needle-angle mapping for a gauge display

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Absolute match window around the target frequency, in Hz.
///
/// A reading within `target ± MATCH_TOLERANCE_HZ` counts as in tune.
pub const MATCH_TOLERANCE_HZ: f32 = 15.0;

/// Total sweep of the gauge scale, in degrees.
pub const SCALE_ANGLE_DEG: f32 = 140.0;

/// Rotation of the scale's start tick, in degrees.
///
/// Centers the sweep on the vertical: `90 - SCALE_ANGLE_DEG / 2`.
pub const START_ROTATION_DEG: f32 = 90.0 - SCALE_ANGLE_DEG / 2.0;

/// Represents a single target pitch, e.g. one guitar string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    /// Display label (e.g. "E2", "A2")
    pub name: String,
    /// Target frequency in Hz
    pub frequency: f32,
}

impl Tone {
    pub fn new(name: impl Into<String>, frequency: f32) -> Self {
        Self {
            name: name.into(),
            frequency,
        }
    }
}

/// Statically computed tones for a six-string classic guitar in standard
/// tuning, ordered low string to high string. The order is stable: display
/// layouts pair the lower half against the upper half.
static CLASSIC_GUITAR_TONES: Lazy<Vec<Tone>> = Lazy::new(|| {
    vec![
        Tone::new("E2", 82.41),
        Tone::new("A2", 110.0),
        Tone::new("D3", 146.83),
        Tone::new("G3", 196.0),
        Tone::new("B3", 246.94),
        Tone::new("E4", 329.63),
    ]
});

/// A tunable instrument with its ordered, non-empty tone list.
///
/// This is a closed set: supporting a new instrument means adding a variant
/// and its tone table here, not subclassing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instrument {
    ClassicGuitar,
}

impl Instrument {
    /// Human-readable instrument name.
    pub fn name(&self) -> &'static str {
        match self {
            Instrument::ClassicGuitar => "Classic guitar",
        }
    }

    /// The instrument's tones, ordered lowest string first.
    pub fn tones(&self) -> &'static [Tone] {
        match self {
            Instrument::ClassicGuitar => &CLASSIC_GUITAR_TONES,
        }
    }
}

/// Classification of a reading against the target's match window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningStatus {
    Low,
    Match,
    High,
}

/// The result of evaluating one smoothed frequency against a target tone.
///
/// Derived on every update and never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuningResult {
    /// Signed deviation from the target in cents
    /// (positive = sharp, negative = flat).
    pub cents_deviation: f32,
    /// Low/Match/High classification.
    pub status: TuningStatus,
}

/// Calculates the deviation from a target frequency in cents.
///
/// Cents are a logarithmic pitch unit: 100 cents = 1 semitone,
/// 1200 cents = 1 octave. Defined as `0.0` when either frequency is
/// non-positive, so silence never produces a degenerate logarithm.
///
/// # Arguments
/// * `freq` - Measured frequency in Hz
/// * `target_freq` - Target frequency in Hz
pub fn cents_deviation(freq: f32, target_freq: f32) -> f32 {
    if freq <= 0.0 || target_freq <= 0.0 {
        return 0.0;
    }
    1200.0 * (freq / target_freq).log2()
}

/// Evaluates a frequency against a target tone with the default
/// [`MATCH_TOLERANCE_HZ`] window.
pub fn evaluate(current: f32, target: &Tone) -> TuningResult {
    evaluate_with_tolerance(current, target, MATCH_TOLERANCE_HZ)
}

/// Evaluates a frequency against a target tone with an explicit match
/// window.
///
/// # Arguments
/// * `current` - Smoothed frequency reading in Hz
/// * `target` - Target tone
/// * `tolerance_hz` - Half-width of the match window in Hz
pub fn evaluate_with_tolerance(current: f32, target: &Tone, tolerance_hz: f32) -> TuningResult {
    let status = if current < target.frequency - tolerance_hz {
        TuningStatus::Low
    } else if current > target.frequency + tolerance_hz {
        TuningStatus::High
    } else {
        TuningStatus::Match
    };

    TuningResult {
        cents_deviation: cents_deviation(current, target.frequency),
        status,
    }
}

/// Maps a frequency reading onto the gauge-needle angle, in degrees.
///
/// The scale spans `target ± 5 * tolerance / 2` Hz (±37.5 Hz with the
/// default window) over [`SCALE_ANGLE_DEG`] degrees starting at
/// [`START_ROTATION_DEG`]. Off-scale readings are clamped so the needle
/// pins at either end instead of wrapping. A reading at the high end of
/// the scale maps to the start rotation; the sweep runs high to low.
pub fn needle_angle(current: f32, target: &Tone) -> f32 {
    let min_value = target.frequency - 5.0 * MATCH_TOLERANCE_HZ / 2.0;
    let max_value = target.frequency + 5.0 * MATCH_TOLERANCE_HZ / 2.0;

    if current >= max_value {
        START_ROTATION_DEG
    } else if current <= min_value {
        START_ROTATION_DEG + SCALE_ANGLE_DEG
    } else {
        (max_value - current) * SCALE_ANGLE_DEG / (max_value - min_value) + START_ROTATION_DEG
    }
}
