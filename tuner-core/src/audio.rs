//! # Audio Capture Module
//!
//! Real-time audio capture using CPAL (Cross-Platform Audio Library), plus
//! the [`AudioSource`] seam the capture session reads blocks through. The
//! seam keeps the session testable: tests swap the microphone for a
//! deterministic [`SineSource`].
//!
//! ## Features
//! - Automatic audio device selection (mono, f32, nearest supported rate)
//! - Fixed-size block framing of the device callback stream
//! - Transient vs. fatal read-error classification
//! - Deterministic stub source for tests and demos

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};

/// Error reading one block from an audio source.
#[derive(Debug)]
pub enum ReadError {
    /// A single block was lost; the capture loop skips it and continues.
    Transient,
    /// The device is gone (disconnected, closed). The capture loop must
    /// terminate.
    Fatal(String),
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Transient => write!(f, "transient audio read failure"),
            ReadError::Fatal(reason) => write!(f, "fatal audio device error: {reason}"),
        }
    }
}

impl std::error::Error for ReadError {}

/// A source of fixed-size mono sample blocks at a known sample rate.
///
/// Implementations are created inside the capture worker thread and stay
/// there for the lifetime of a session, so they do not need to be `Send`
/// (`cpal::Stream` is not).
pub trait AudioSource {
    /// The actual sample rate of the delivered blocks, in Hz.
    fn sample_rate(&self) -> u32;

    /// Waits up to `timeout` for the next block.
    ///
    /// # Returns
    /// * `Ok(Some(block))` - One block of samples in acquisition order
    /// * `Ok(None)` - No block arrived within the timeout; the caller may
    ///   poll again (this is how the capture loop stays cancellable)
    /// * `Err(ReadError::Transient)` - This block was lost, skip it
    /// * `Err(ReadError::Fatal)` - The device is gone, stop reading
    fn read_block(&mut self, timeout: Duration) -> Result<Option<Vec<f32>>, ReadError>;
}

/// Microphone-backed [`AudioSource`] built on a CPAL input stream.
///
/// The device callback accumulates samples and forwards whole blocks over a
/// bounded channel; if the reader falls behind, `try_send` drops blocks on
/// the callback side rather than stalling the audio thread.
pub struct CpalSource {
    // Held only to keep the capture stream alive; dropping it releases
    // the device.
    _stream: cpal::Stream,
    sample_rate: u32,
    blocks: Receiver<Vec<f32>>,
    failed: Arc<AtomicBool>,
}

impl CpalSource {
    /// Opens the default input device and starts capturing.
    ///
    /// # Arguments
    /// * `sample_rate` - Requested sample rate in Hz; the nearest supported
    ///   rate is used and reported via [`AudioSource::sample_rate`]
    /// * `block_size` - Samples per delivered block
    ///
    /// # Errors
    /// Fails when no input device is available, no mono f32 format is
    /// supported, or the stream cannot be built/started (e.g. permission
    /// denied or device busy). Nothing is left held on failure.
    pub fn open(sample_rate: u32, block_size: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;

        log::info!("using audio input device: {}", device.name()?);

        let configs = device.supported_input_configs()?.collect::<Vec<_>>();
        let supported_config = find_supported_config(configs, sample_rate)
            .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

        let rate = sample_rate.clamp(
            supported_config.min_sample_rate().0,
            supported_config.max_sample_rate().0,
        );
        let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
        let sample_rate_val = config.sample_rate().0;
        let config: cpal::StreamConfig = config.into();

        log::info!("selected sample rate: {sample_rate_val} Hz");

        let failed = Arc::new(AtomicBool::new(false));
        let failed_flag = Arc::clone(&failed);
        let err_fn = move |err| {
            log::error!("audio stream error: {err}");
            failed_flag.store(true, Ordering::Release);
        };

        let (sender, blocks) = bounded::<Vec<f32>>(8);

        // This buffer accumulates audio data from the callback.
        let mut audio_buffer = Vec::with_capacity(block_size * 2);

        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                audio_buffer.extend_from_slice(data);

                // While we have enough data for a full block, forward it.
                while audio_buffer.len() >= block_size {
                    let block = audio_buffer[..block_size].to_vec();

                    // Drop the block if the reader is behind; the audio
                    // thread must never stall.
                    let _ = sender.try_send(block);

                    audio_buffer.drain(..block_size);
                }
            },
            err_fn,
            None,
        )?;

        stream.play()?;

        Ok(Self {
            _stream: stream,
            sample_rate: sample_rate_val,
            blocks,
            failed,
        })
    }
}

impl AudioSource for CpalSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_block(&mut self, timeout: Duration) -> Result<Option<Vec<f32>>, ReadError> {
        if self.failed.load(Ordering::Acquire) {
            return Err(ReadError::Fatal("audio stream reported an error".into()));
        }
        match self.blocks.recv_timeout(timeout) {
            Ok(block) => Ok(Some(block)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(ReadError::Fatal("audio callback stopped".into()))
            }
        }
    }
}

/// Finds the best supported audio configuration for the target sample rate.
///
/// Filters for mono 32-bit float formats and picks the range whose bounds
/// come closest to the target rate.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1 && c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i32 - target_rate as i32).abs();
            let max_diff = (c.max_sample_rate().0 as i32 - target_rate as i32).abs();
            min_diff.min(max_diff)
        })
}

/// Deterministic [`AudioSource`] producing a pure sine tone, one block per
/// configured interval.
///
/// The phase continues across blocks, so estimators see a seamless tone.
/// Useful for tests and for running the pipeline without a microphone.
pub struct SineSource {
    frequency: f32,
    sample_rate: u32,
    block_size: usize,
    interval: Duration,
    position: u64,
    next_due: Instant,
}

impl SineSource {
    /// Creates a source emitting `frequency` Hz sine blocks.
    ///
    /// # Arguments
    /// * `frequency` - Tone frequency in Hz
    /// * `sample_rate` - Sample rate in Hz
    /// * `block_size` - Samples per block
    /// * `interval` - Pacing between consecutive blocks. Pass the real block
    ///   duration (`block_size / sample_rate`) to mimic a live device, or
    ///   something shorter to speed tests up.
    pub fn new(frequency: f32, sample_rate: u32, block_size: usize, interval: Duration) -> Self {
        Self {
            frequency,
            sample_rate,
            block_size,
            interval,
            position: 0,
            next_due: Instant::now(),
        }
    }

    fn next_block(&mut self) -> Vec<f32> {
        let step = 2.0 * std::f32::consts::PI * self.frequency / self.sample_rate as f32;
        let block = (0..self.block_size)
            .map(|i| (step * (self.position + i as u64) as f32).sin() * 0.8)
            .collect();
        self.position += self.block_size as u64;
        block
    }
}

impl AudioSource for SineSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_block(&mut self, timeout: Duration) -> Result<Option<Vec<f32>>, ReadError> {
        let now = Instant::now();
        if self.next_due > now {
            let wait = self.next_due - now;
            if wait > timeout {
                std::thread::sleep(timeout);
                return Ok(None);
            }
            std::thread::sleep(wait);
        }
        self.next_due = Instant::now() + self.interval;
        Ok(Some(self.next_block()))
    }
}
