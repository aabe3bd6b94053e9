//! Engine state, pass reports and running statistics.

use caes_model::{Timestamp, WriteSummary};
use std::time::{Duration, Instant};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No pass has run yet.
    Idle,
    /// Waiting for both stores to make earlier writes visible.
    Flushing,
    /// Reading and preparing changes from both stores.
    Reading,
    /// Writing secondary changes into the primary.
    WritingPrimary,
    /// Writing primary changes into the secondary.
    WritingSecondary,
    /// The last pass completed.
    Synced,
    /// Both adapters have been closed.
    Closed,
}

impl SyncState {
    /// Returns true while a pass is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Flushing
                | SyncState::Reading
                | SyncState::WritingPrimary
                | SyncState::WritingSecondary
        )
    }

    /// Returns true if a new pass may start.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Synced)
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    /// Lower bound the pass read from.
    pub since: Timestamp,
    /// Entries read from the primary.
    pub primary_read: u64,
    /// Entries read from the secondary.
    pub secondary_read: u64,
    /// Entries nulled because one of the adapters wrote them last pass.
    pub echoes_suppressed: u64,
    /// Secondary entries dropped because the primary holds a newer version.
    pub superseded: u64,
    /// Secondary entries held back because the primary read failed part-way.
    pub deferred: u64,
    /// Whether both stores were read without a backend failure.
    pub complete: bool,
    /// Outcome of the secondary→primary batch.
    pub to_primary: WriteSummary,
    /// Outcome of the primary→secondary batch.
    pub to_secondary: WriteSummary,
    /// Wall time of the pass.
    pub duration: Duration,
}

impl PassReport {
    pub(crate) fn new(since: Timestamp) -> Self {
        Self {
            since,
            primary_read: 0,
            secondary_read: 0,
            echoes_suppressed: 0,
            superseded: 0,
            deferred: 0,
            complete: true,
            to_primary: WriteSummary::default(),
            to_secondary: WriteSummary::default(),
            duration: Duration::ZERO,
        }
    }

    /// Records written to either store.
    pub fn writes(&self) -> u64 {
        self.to_primary.written + self.to_secondary.written
    }

    /// Returns true if the pass wrote nothing.
    pub fn is_quiet(&self) -> bool {
        self.writes() == 0
    }
}

/// Totals over every pass an engine ran.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed passes.
    pub passes: u64,
    /// Entries read from both stores.
    pub entries_read: u64,
    /// Records written to the primary.
    pub written_to_primary: u64,
    /// Records written to the secondary.
    pub written_to_secondary: u64,
    /// Entries nulled by echo suppression.
    pub echoes_suppressed: u64,
    /// Entries dropped by last-write-wins (guard or version conflict).
    pub conflicts: u64,
    /// Entries that failed with a backend error.
    pub failures: u64,
    /// Entries held back for a later pass after an incomplete read.
    pub deferred: u64,
    /// Passes where at least one store could not be read in full.
    pub incomplete_passes: u64,
    /// When the last pass finished.
    pub last_pass: Option<Instant>,
}

impl SyncStats {
    pub(crate) fn record(&mut self, report: &PassReport) {
        self.passes += 1;
        self.entries_read += report.primary_read + report.secondary_read;
        self.written_to_primary += report.to_primary.written;
        self.written_to_secondary += report.to_secondary.written;
        self.echoes_suppressed += report.echoes_suppressed;
        self.conflicts +=
            report.superseded + report.to_primary.conflicts + report.to_secondary.conflicts;
        self.failures += report.to_primary.failed + report.to_secondary.failed;
        self.deferred += report.deferred;
        if !report.complete {
            self.incomplete_passes += 1;
        }
        self.last_pass = Some(Instant::now());
    }
}
