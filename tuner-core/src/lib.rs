// tuner-core/src/lib.rs

//! The signal-processing core of a real-time instrument tuner.
//! This crate estimates the fundamental frequency of incoming audio,
//! smooths the estimate stream for animation, and classifies it against
//! a target tone. It is completely headless and contains no GUI code.
//!
//! Pipeline: audio blocks → low-pass pre-filter → pitch estimator →
//! latest-value frequency stream → smoothing/interpolation →
//! tuning evaluation.

pub mod audio;
pub mod config;
pub mod detector;
pub mod fft;
pub mod filter;
pub mod latest;
pub mod pitch;
pub mod smoothing;
pub mod tuning;

pub use config::{DetectorConfig, SmoothingConfig};
pub use detector::{DetectorState, FrequencyDetector};
pub use pitch::PitchAlgorithm;
pub use smoothing::SmoothingStage;
pub use tuning::{Instrument, Tone, TuningResult, TuningStatus, evaluate};
