//! # Latest-Value Channel Module
//!
//! A hot multicast channel with drop-oldest backpressure: every subscriber
//! eventually sees only the most recent published value, never an unbounded
//! backlog. This carries the live frequency stream from the capture loop to
//! any number of consumers; freshness matters more than completeness for a
//! live instrument reading.
//!
//! Implementation: a single shared slot (bounded buffer of size 1) guarded
//! by a mutex, a monotonically increasing sequence number, and a condvar to
//! wake blocked receivers. Each receiver remembers the last sequence number
//! it observed, so a slow subscriber sees a strict sub-sequence of the
//! published values with no reordering and no duplication. Publication never
//! blocks on subscribers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct Slot<T> {
    value: Option<T>,
    seq: u64,
    closed: bool,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    available: Condvar,
    senders: AtomicUsize,
}

impl<T> Shared<T> {
    // A poisoned lock only means a publisher panicked mid-send; the slot
    // itself is always in a consistent state, so keep going.
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The publishing side of a latest-value channel.
pub struct LatestSender<T> {
    shared: Arc<Shared<T>>,
}

/// One subscription to a latest-value channel.
///
/// A fresh receiver starts at the current sequence number: it only observes
/// values published after it was created (no replay).
pub struct LatestReceiver<T> {
    shared: Arc<Shared<T>>,
    seen: u64,
}

/// Error returned when the channel is closed and no newer value remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvError;

impl std::fmt::Display for RecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "latest-value channel closed")
    }
}

impl std::error::Error for RecvError {}

/// Error returned by [`LatestReceiver::recv_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    /// No new value arrived within the timeout.
    Timeout,
    /// The channel is closed and no newer value remains.
    Closed,
}

impl std::fmt::Display for RecvTimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecvTimeoutError::Timeout => write!(f, "timed out waiting for a value"),
            RecvTimeoutError::Closed => write!(f, "latest-value channel closed"),
        }
    }
}

impl std::error::Error for RecvTimeoutError {}

/// Creates a latest-value channel, returning the sender and an initial
/// subscription.
pub fn channel<T: Clone>() -> (LatestSender<T>, LatestReceiver<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            value: None,
            seq: 0,
            closed: false,
        }),
        available: Condvar::new(),
        senders: AtomicUsize::new(1),
    });
    let sender = LatestSender {
        shared: Arc::clone(&shared),
    };
    let receiver = LatestReceiver { shared, seen: 0 };
    (sender, receiver)
}

impl<T: Clone> LatestSender<T> {
    /// Publishes a value, overwriting whatever the slot held.
    ///
    /// Never blocks; subscribers that did not consume the previous value
    /// simply never see it.
    pub fn send(&self, value: T) {
        let mut slot = self.shared.lock();
        slot.value = Some(value);
        slot.seq += 1;
        drop(slot);
        self.shared.available.notify_all();
    }

    /// Creates a new subscription starting at the current sequence number.
    pub fn subscribe(&self) -> LatestReceiver<T> {
        let slot = self.shared.lock();
        LatestReceiver {
            shared: Arc::clone(&self.shared),
            seen: slot.seq,
        }
    }

    /// Closes the channel. Receivers still observe a pending newer value
    /// before seeing the closure.
    pub fn close(&self) {
        let mut slot = self.shared.lock();
        slot.closed = true;
        drop(slot);
        self.shared.available.notify_all();
    }
}

impl<T> Clone for LatestSender<T> {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for LatestSender<T> {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            let mut slot = self.shared.lock();
            slot.closed = true;
            drop(slot);
            self.shared.available.notify_all();
        }
    }
}

impl<T: Clone> LatestReceiver<T> {
    /// Blocks until a value newer than the last one seen is available.
    pub fn recv(&mut self) -> Result<T, RecvError> {
        let mut slot = self.shared.lock();
        loop {
            if slot.seq > self.seen {
                self.seen = slot.seq;
                // seq > 0 implies the slot has been written at least once.
                if let Some(value) = slot.value.clone() {
                    return Ok(value);
                }
            }
            if slot.closed {
                return Err(RecvError);
            }
            slot = self
                .shared
                .available
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until a newer value is available or the timeout elapses.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.lock();
        loop {
            if slot.seq > self.seen {
                self.seen = slot.seq;
                if let Some(value) = slot.value.clone() {
                    return Ok(value);
                }
            }
            if slot.closed {
                return Err(RecvTimeoutError::Closed);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RecvTimeoutError::Timeout);
            }
            let (guard, _) = self
                .shared
                .available
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            slot = guard;
        }
    }

    /// Returns a newer value immediately if one is available.
    pub fn try_recv(&mut self) -> Option<T> {
        let slot = self.shared.lock();
        if slot.seq > self.seen {
            self.seen = slot.seq;
            slot.value.clone()
        } else {
            None
        }
    }
}

impl<T> Clone for LatestReceiver<T> {
    /// A cloned receiver is an independent subscription starting at the
    /// current sequence number.
    fn clone(&self) -> Self {
        let slot = self.shared.lock();
        Self {
            shared: Arc::clone(&self.shared),
            seen: slot.seq,
        }
    }
}
