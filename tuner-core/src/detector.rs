//! # Capture Session Module
//!
//! Owns the audio-capture resource and drives the block-by-block
//! acquire → pre-process → estimate → publish loop on a dedicated worker
//! thread. Detected frequencies are published to a latest-value multicast
//! channel (see [`crate::latest`]); the UI side subscribes as often as it
//! likes and never slows capture down.
//!
//! Lifecycle is a two-state machine, `Stopped <-> Running`. Starting an
//! already-running session first stops it completely (cancel, join, release
//! the device), so at most one capture resource is ever live. Stopping a
//! stopped session is a no-op.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::bounded;

use crate::audio::{AudioSource, CpalSource, ReadError};
use crate::config::DetectorConfig;
use crate::filter;
use crate::latest::{self, LatestReceiver, LatestSender};
use crate::pitch;

/// How long one read may block before the loop re-checks cancellation.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle state of the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Stopped,
    Running,
}

type SourceFactory = Arc<dyn Fn(&DetectorConfig) -> Result<Box<dyn AudioSource>> + Send + Sync>;

/// A frequency detector: capture session plus its published estimate stream.
///
/// The default construction captures from the microphone via
/// [`CpalSource`]; [`FrequencyDetector::with_source`] swaps in any other
/// [`AudioSource`] factory. The factory runs inside the worker thread
/// because `cpal` streams cannot move between threads.
pub struct FrequencyDetector {
    config: DetectorConfig,
    source_factory: SourceFactory,
    publisher: LatestSender<Option<f32>>,
    session: Option<Session>,
}

struct Session {
    cancel: Arc<AtomicBool>,
    live: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl FrequencyDetector {
    /// Creates a microphone-backed detector.
    pub fn new(config: DetectorConfig) -> Self {
        Self::with_source(config, |config: &DetectorConfig| {
            let source = CpalSource::open(config.sample_rate, config.block_size)?;
            Ok(Box::new(source) as Box<dyn AudioSource>)
        })
    }

    /// Creates a detector reading from a custom audio source.
    ///
    /// The factory is invoked on the worker thread each time a session
    /// starts and must fail cleanly when the source cannot be opened.
    pub fn with_source<F>(config: DetectorConfig, source_factory: F) -> Self
    where
        F: Fn(&DetectorConfig) -> Result<Box<dyn AudioSource>> + Send + Sync + 'static,
    {
        let (publisher, _) = latest::channel();
        Self {
            config,
            source_factory: Arc::new(source_factory),
            publisher,
            session: None,
        }
    }

    /// Subscribes to the live stream of frequency estimates.
    ///
    /// Emits `Some(frequency)` for every block with a detected pitch and a
    /// single `None` sentinel if a session dies on a fatal device error.
    /// Delivery is latest-value-biased: a slow subscriber sees a strict
    /// sub-sequence of the published values, never a backlog. Subscriptions
    /// made before `start` simply stay silent until capture begins.
    pub fn frequencies(&self) -> LatestReceiver<Option<f32>> {
        self.publisher.subscribe()
    }

    /// Current lifecycle state.
    ///
    /// Reports `Stopped` as soon as the capture loop has terminated, even
    /// when the termination was a fatal device error rather than a `stop`
    /// call, so a frontend never shows a stale "running" state.
    pub fn state(&self) -> DetectorState {
        match &self.session {
            Some(session) if session.live.load(Ordering::Acquire) => DetectorState::Running,
            _ => DetectorState::Stopped,
        }
    }

    /// Starts a capture session.
    ///
    /// Any already-running session is fully stopped first; the previous
    /// device is released before the new one is acquired. Returns only
    /// after the worker thread has opened the audio source, so a failure
    /// (no device, permission denied, device busy) surfaces here and leaves
    /// the detector `Stopped` with nothing held.
    pub fn start(&mut self) -> Result<()> {
        self.stop();

        let cancel = Arc::new(AtomicBool::new(false));
        let live = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

        let factory = Arc::clone(&self.source_factory);
        let config = self.config.clone();
        let publisher = self.publisher.clone();
        let worker_cancel = Arc::clone(&cancel);
        let worker_live = Arc::clone(&live);

        let handle = thread::Builder::new()
            .name("pitch-capture".into())
            .spawn(move || {
                let source = match factory(&config) {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(err) => {
                        worker_live.store(false, Ordering::Release);
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                capture_loop(source, &config, &publisher, &worker_cancel);
                worker_live.store(false, Ordering::Release);
            })
            .context("failed to spawn capture thread")?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.session = Some(Session {
                    cancel,
                    live,
                    handle,
                });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(anyhow!("capture thread exited before opening the audio source"))
            }
        }
    }

    /// Stops the running session, if any.
    ///
    /// Requests loop termination, waits for the worker to exit and the
    /// capture resource to be released, then returns. Calling this while
    /// already stopped does nothing.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.store(true, Ordering::Release);
            if session.handle.join().is_err() {
                log::error!("capture thread panicked");
            }
        }
    }
}

impl Drop for FrequencyDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The acquire → pre-process → estimate → publish loop.
///
/// Transient read failures skip the block and keep the stream flowing.
/// A fatal device error publishes a `None` sentinel and terminates the
/// loop; the session then reads as `Stopped`.
fn capture_loop(
    mut source: Box<dyn AudioSource>,
    config: &DetectorConfig,
    publisher: &LatestSender<Option<f32>>,
    cancel: &AtomicBool,
) {
    let sample_rate = source.sample_rate();

    while !cancel.load(Ordering::Acquire) {
        match source.read_block(READ_POLL_INTERVAL) {
            Ok(Some(block)) => {
                let block = match config.low_pass_cutoff_hz {
                    Some(cutoff) => filter::low_pass(&block, sample_rate, cutoff),
                    None => block,
                };
                if let Some(frequency) = pitch::estimate(&block, sample_rate, config) {
                    log::debug!("pitch estimate: {frequency:.2} Hz");
                    publisher.send(Some(frequency));
                }
            }
            Ok(None) => {
                // Poll timeout; loop around and re-check cancellation.
            }
            Err(ReadError::Transient) => {
                log::warn!("skipping one audio block after a transient read failure");
            }
            Err(ReadError::Fatal(reason)) => {
                log::error!("capture terminated: {reason}");
                publisher.send(None);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SineSource;
    use crate::latest::RecvTimeoutError;
    use std::sync::atomic::AtomicUsize;

    const BLOCK_SIZE: usize = 1024;
    const BLOCK_INTERVAL: Duration = Duration::from_millis(30);

    fn sine_detector(frequency: f32) -> FrequencyDetector {
        let config = DetectorConfig {
            block_size: BLOCK_SIZE,
            ..DetectorConfig::default()
        };
        FrequencyDetector::with_source(config, move |config: &DetectorConfig| {
            Ok(Box::new(SineSource::new(
                frequency,
                config.sample_rate,
                config.block_size,
                BLOCK_INTERVAL,
            )) as Box<dyn AudioSource>)
        })
    }

    /// Source that delivers a fixed number of good blocks, then fails
    /// fatally.
    struct DyingSource {
        inner: SineSource,
        remaining: usize,
    }

    impl AudioSource for DyingSource {
        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }

        fn read_block(&mut self, timeout: Duration) -> Result<Option<Vec<f32>>, ReadError> {
            if self.remaining == 0 {
                return Err(ReadError::Fatal("device disconnected".into()));
            }
            let block = self.inner.read_block(timeout)?;
            if block.is_some() {
                self.remaining -= 1;
            }
            Ok(block)
        }
    }

    #[test]
    fn no_emission_before_start() {
        let detector = sine_detector(440.0);
        let mut frequencies = detector.frequencies();
        assert_eq!(
            frequencies.recv_timeout(Duration::from_millis(150)),
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn emits_estimates_while_running_and_none_after_stop() {
        let mut detector = sine_detector(440.0);
        let mut frequencies = detector.frequencies();
        detector.start().unwrap();

        let mut collected = Vec::new();
        while collected.len() < 3 {
            match frequencies.recv_timeout(Duration::from_secs(2)) {
                Ok(Some(f)) => collected.push(f),
                other => panic!("expected an estimate, got {other:?}"),
            }
        }
        detector.stop();
        assert_eq!(detector.state(), DetectorState::Stopped);

        for f in &collected {
            assert!((f - 440.0).abs() < 5.0, "estimate {f} Hz too far from 440");
        }
        // Drain anything published before the stop completed, then expect
        // silence.
        while frequencies.try_recv().is_some() {}
        assert_eq!(
            frequencies.recv_timeout(Duration::from_millis(150)),
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn every_block_is_published_in_order() {
        // Five good blocks at a comfortable cadence: the subscriber keeps
        // up, so it sees one estimate per block, then the fatal sentinel.
        let config = DetectorConfig {
            block_size: BLOCK_SIZE,
            ..DetectorConfig::default()
        };
        let mut detector = FrequencyDetector::with_source(config, |config: &DetectorConfig| {
            Ok(Box::new(DyingSource {
                inner: SineSource::new(
                    330.0,
                    config.sample_rate,
                    config.block_size,
                    BLOCK_INTERVAL,
                ),
                remaining: 5,
            }) as Box<dyn AudioSource>)
        });
        let mut frequencies = detector.frequencies();
        detector.start().unwrap();

        let mut count = 0;
        loop {
            match frequencies.recv_timeout(Duration::from_secs(2)) {
                Ok(Some(f)) => {
                    assert!((f - 330.0).abs() < 5.0);
                    count += 1;
                }
                Ok(None) => break, // fatal sentinel
                Err(err) => panic!("stream ended unexpectedly: {err}"),
            }
        }
        assert_eq!(count, 5);
    }

    #[test]
    fn stop_when_already_stopped_is_a_noop() {
        let mut detector = sine_detector(440.0);
        assert_eq!(detector.state(), DetectorState::Stopped);
        detector.stop();
        detector.stop();
        assert_eq!(detector.state(), DetectorState::Stopped);
    }

    #[test]
    fn restart_never_doubles_the_capture_resource() {
        let live_sources = Arc::new(AtomicUsize::new(0));

        struct CountedSource {
            inner: SineSource,
            live: Arc<AtomicUsize>,
        }
        impl AudioSource for CountedSource {
            fn sample_rate(&self) -> u32 {
                self.inner.sample_rate()
            }
            fn read_block(&mut self, timeout: Duration) -> Result<Option<Vec<f32>>, ReadError> {
                self.inner.read_block(timeout)
            }
        }
        impl Drop for CountedSource {
            fn drop(&mut self) {
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::clone(&live_sources);
        let mut detector = FrequencyDetector::with_source(
            DetectorConfig::default(),
            move |config: &DetectorConfig| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(CountedSource {
                    inner: SineSource::new(
                        440.0,
                        config.sample_rate,
                        config.block_size,
                        BLOCK_INTERVAL,
                    ),
                    live: Arc::clone(&counter),
                }) as Box<dyn AudioSource>)
            },
        );

        detector.start().unwrap();
        detector.start().unwrap();
        assert_eq!(live_sources.load(Ordering::SeqCst), 1);
        assert_eq!(detector.state(), DetectorState::Running);

        detector.stop();
        assert_eq!(live_sources.load(Ordering::SeqCst), 0);
        assert_eq!(detector.state(), DetectorState::Stopped);
    }

    #[test]
    fn failed_open_leaves_detector_stopped() {
        let mut detector =
            FrequencyDetector::with_source(DetectorConfig::default(), |_: &DetectorConfig| {
                Err(anyhow!("permission denied"))
            });
        let err = detector.start().unwrap_err();
        assert!(err.to_string().contains("permission denied"));
        assert_eq!(detector.state(), DetectorState::Stopped);
        // And a later stop is still a harmless no-op.
        detector.stop();
    }

    #[test]
    fn fatal_device_error_transitions_to_stopped() {
        let config = DetectorConfig {
            block_size: BLOCK_SIZE,
            ..DetectorConfig::default()
        };
        let mut detector = FrequencyDetector::with_source(config, |config: &DetectorConfig| {
            Ok(Box::new(DyingSource {
                inner: SineSource::new(440.0, config.sample_rate, config.block_size, Duration::ZERO),
                remaining: 2,
            }) as Box<dyn AudioSource>)
        });
        let mut frequencies = detector.frequencies();
        detector.start().unwrap();

        // The sentinel marks the fatal termination.
        loop {
            match frequencies.recv_timeout(Duration::from_secs(2)) {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(err) => panic!("missed the termination sentinel: {err}"),
            }
        }

        // The loop has exited; the session must read as stopped without an
        // explicit stop() call.
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while detector.state() != DetectorState::Stopped {
            assert!(std::time::Instant::now() < deadline, "still running");
            thread::sleep(Duration::from_millis(5));
        }
        detector.stop();
    }
}
