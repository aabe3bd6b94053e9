//! Configuration for the poll loop.

use crate::error::{SyncError, SyncResult};
use caes_model::Timestamp;
use std::time::Duration;

/// Configuration of a [`crate::PollLoop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Pause between the end of one pass and the start of the next.
    pub interval: Duration,
    /// Initial watermark. `None` starts from the clock's current time.
    pub start_at: Option<Timestamp>,
}

impl PollConfig {
    /// Creates a configuration with the given interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            start_at: None,
        }
    }

    /// Sets the polling interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Starts the watermark at `since` instead of the current time.
    pub fn with_start_at(mut self, since: Timestamp) -> Self {
        self.start_at = Some(since);
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the interval is zero.
    pub fn validate(&self) -> SyncResult<()> {
        if self.interval.is_zero() {
            return Err(SyncError::Config("polling interval must be positive".into()));
        }
        Ok(())
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}
