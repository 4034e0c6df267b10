//! # Smoothing / Interpolation Module
//!
//! Turns the raw, jittery estimate stream into a densely interpolated value
//! stream suitable for frame-rate animation. Three rules, applied in order:
//!
//! 1. Noise gate: estimates below the configured floor (default 50 Hz) are
//!    discarded as sub-audible noise.
//! 2. Rate limiting: only the freshest gated estimate per window (default
//!    500 ms) survives; intervening values are superseded, not averaged.
//! 3. Interpolation: each new reading is approached linearly from the
//!    previous one in fixed sub-steps (default 20 × 25 ms), so the needle
//!    glides instead of jumping.
//!
//! The interpolation itself is a plain timer-driven state machine
//! ([`Interpolator`]); [`SmoothingStage`] drives it on a worker thread with
//! cooperative, cancellable delays. The stage holds no audio resources and
//! has no failure modes: with no qualifying input it settles at 0.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::config::SmoothingConfig;
use crate::latest::{self, LatestReceiver, LatestSender, RecvTimeoutError};

/// Rolling-pair linear interpolator, seeded at `(0, 0)`.
///
/// [`Interpolator::retarget`] rolls the pair forward to a new rate-limited
/// reading; [`Interpolator::steps`] yields the sub-step values from the
/// previous reading (exclusive) to the current one (inclusive).
#[derive(Debug, Clone)]
pub struct Interpolator {
    previous: f32,
    current: f32,
    step_count: u32,
}

impl Interpolator {
    pub fn new(step_count: u32) -> Self {
        Self {
            previous: 0.0,
            current: 0.0,
            step_count: step_count.max(1),
        }
    }

    /// Rolls the pair forward: the current reading becomes the previous
    /// one, `next` becomes the interpolation target.
    pub fn retarget(&mut self, next: f32) {
        self.previous = self.current;
        self.current = next;
    }

    /// The current interpolation target.
    pub fn current(&self) -> f32 {
        self.current
    }

    /// The `step_count` equally spaced sub-step values leading from the
    /// previous reading to the current one, ending exactly on it.
    pub fn steps(&self) -> impl Iterator<Item = f32> + '_ {
        let step = (self.current - self.previous) / self.step_count as f32;
        let previous = self.previous;
        (1..=self.step_count).map(move |i| previous + step * i as f32)
    }
}

/// Handle to the worker thread driving the smoothing pipeline.
///
/// Dropping the stage (or calling [`SmoothingStage::stop`]) cancels the
/// in-flight interpolation run without emitting further values, then joins
/// the worker.
pub struct SmoothingStage {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SmoothingStage {
    /// Spawns the stage on its own thread.
    ///
    /// # Arguments
    /// * `input` - Raw estimate stream from
    ///   [`crate::detector::FrequencyDetector::frequencies`]; `None` items
    ///   (the fatal-stop sentinel) are ignored by the gate
    /// * `config` - Gate, window and step settings
    ///
    /// # Returns
    /// * The stage handle and the smoothed output stream. The output
    ///   channel closes when the stage exits for any reason.
    pub fn spawn(
        input: LatestReceiver<Option<f32>>,
        config: SmoothingConfig,
    ) -> (Self, LatestReceiver<f32>) {
        let (output_tx, output_rx) = latest::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);
        let handle = thread::spawn(move || run(input, output_tx, config, worker_cancel));
        (
            Self {
                cancel,
                handle: Some(handle),
            },
            output_rx,
        )
    }

    /// Cancels the stage and waits for the worker to exit.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SmoothingStage {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    mut input: LatestReceiver<Option<f32>>,
    output: LatestSender<f32>,
    config: SmoothingConfig,
    cancel: Arc<AtomicBool>,
) {
    let step_delay = config.step_delay();
    let mut interpolator = Interpolator::new(config.step_count);
    // Freshest gated sample observed while the current run was emitting.
    let mut pending: Option<f32> = None;
    let mut input_closed = false;

    'stage: loop {
        // Emit one interpolation run, one sub-step per delay. The seeded
        // (0, 0) pair makes the very first run all zeros, which keeps the
        // output well defined before any estimate arrives. The input is
        // polled between sub-steps, so rate limiting happens by
        // supersession while the run plays out.
        for value in interpolator.steps() {
            if cancel.load(Ordering::Acquire) {
                break 'stage;
            }
            output.send(value);

            let deadline = Instant::now() + step_delay;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match input.recv_timeout(remaining) {
                    Ok(Some(f)) if f > config.noise_gate_hz => pending = Some(f),
                    Ok(_) => {} // gated sample or stop sentinel
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Closed) => {
                        input_closed = true;
                        thread::sleep(deadline.saturating_duration_since(Instant::now()));
                        break;
                    }
                }
            }
        }

        // Roll forward to the freshest reading, or park until one arrives.
        loop {
            if cancel.load(Ordering::Acquire) {
                break 'stage;
            }
            if let Some(next) = pending.take() {
                interpolator.retarget(next);
                break;
            }
            if input_closed {
                break 'stage;
            }
            match input.recv_timeout(step_delay) {
                Ok(Some(f)) if f > config.noise_gate_hz => pending = Some(f),
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Closed) => input_closed = true,
            }
        }
    }

    output.close();
}
