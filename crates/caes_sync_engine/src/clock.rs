//! Wall clock and the polling watermark.

use crate::error::{SyncError, SyncResult};
use caes_model::Timestamp;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time in epoch seconds.
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as Timestamp)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock reading `now`.
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// The lower bound of the next pass. Monotonically non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark(Timestamp);

impl Watermark {
    /// Creates a watermark at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self(start)
    }

    /// Current value.
    pub fn get(&self) -> Timestamp {
        self.0
    }

    /// Moves the watermark to `to`.
    ///
    /// # Errors
    ///
    /// Returns `WatermarkRegression` if `to` is before the current value; the
    /// watermark is left unchanged.
    pub fn advance_to(&mut self, to: Timestamp) -> SyncResult<Timestamp> {
        if to < self.0 {
            return Err(SyncError::WatermarkRegression {
                current: self.0,
                attempted: to,
            });
        }
        self.0 = to;
        Ok(self.0)
    }
}
