//! The reconciliation pass.

use crate::error::{SyncError, SyncResult};
use crate::state::{PassReport, SyncState, SyncStats};
use caes_model::{EchoSuppressionSet, PreparedRecord, RecordId, StoreAdapter, Timestamp};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Reconciles a primary and a secondary store.
///
/// The engine owns both adapters. Each call to [`SyncEngine::sync`] is one
/// complete, blocking pass; nothing runs in the background.
pub struct SyncEngine<P: StoreAdapter, S: StoreAdapter> {
    primary: P,
    secondary: S,
    state: SyncState,
    stats: SyncStats,
}

impl<P: StoreAdapter, S: StoreAdapter> SyncEngine<P, S> {
    /// Creates an engine over two adapters.
    pub fn new(primary: P, secondary: S) -> Self {
        Self {
            primary,
            secondary,
            state: SyncState::Idle,
            stats: SyncStats::default(),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Gets the accumulated statistics.
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// The primary adapter.
    pub fn primary(&self) -> &P {
        &self.primary
    }

    /// The secondary adapter.
    pub fn secondary(&self) -> &S {
        &self.secondary
    }

    /// Runs one reconciliation pass over everything changed at or after `since`.
    ///
    /// Both change sets are read and prepared before anything is written, so
    /// the primary→secondary batch carries what the primary held when the
    /// pass started. Secondary→primary is written first; together with the
    /// external versioning of the secondary this makes the newer timestamp
    /// win, and equal timestamps go to the secondary's value.
    ///
    /// If the primary could not be read in full, the guard against older
    /// secondary values has nothing to compare with, so every secondary entry
    /// is deferred to a later pass instead of being written blind. The report
    /// is then marked incomplete.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the engine has been closed. Backend failures
    /// are contained by the adapters and only show up in the report.
    pub fn sync(&mut self, since: Timestamp) -> SyncResult<PassReport> {
        if !self.state.can_start_sync() {
            return Err(SyncError::InvalidState { state: self.state });
        }

        let start = Instant::now();
        let mut report = PassReport::new(since);

        self.state = SyncState::Flushing;
        self.primary.flush();
        self.secondary.flush();

        self.state = SyncState::Reading;
        let mut from_secondary = read_prepared(&self.secondary, since);
        let mut from_primary = read_prepared(&self.primary, since);
        let primary_complete = self.primary.last_read_complete();
        report.complete = primary_complete && self.secondary.last_read_complete();
        report.secondary_read = from_secondary.len() as u64;
        report.primary_read = from_primary.len() as u64;

        report.echoes_suppressed = count_suppressed(&from_secondary)
            + count_suppressed(&from_primary)
            + suppress_echoes(&mut from_secondary, self.primary.echo_suppression())
            + suppress_echoes(&mut from_primary, self.secondary.echo_suppression());
        report.superseded = drop_superseded(&mut from_secondary, &from_primary);
        if !primary_complete {
            report.deferred = defer_all(&mut from_secondary);
            warn!(
                since,
                deferred = report.deferred,
                "primary read was incomplete, holding secondary changes back"
            );
        }

        self.state = SyncState::WritingPrimary;
        report.to_primary = self.primary.write_batch(from_secondary);

        self.state = SyncState::WritingSecondary;
        report.to_secondary = self.secondary.write_batch(from_primary);

        self.state = SyncState::Synced;
        report.duration = start.elapsed();
        self.stats.record(&report);

        info!(
            since,
            primary_read = report.primary_read,
            secondary_read = report.secondary_read,
            to_primary = report.to_primary.written,
            to_secondary = report.to_secondary.written,
            echoes = report.echoes_suppressed,
            conflicts = report.superseded + report.to_secondary.conflicts,
            failed = report.to_primary.failed + report.to_secondary.failed,
            deferred = report.deferred,
            complete = report.complete,
            "sync pass complete"
        );
        Ok(report)
    }

    /// Closes both adapters. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.state == SyncState::Closed {
            return;
        }
        self.primary.close();
        self.secondary.close();
        self.state = SyncState::Closed;
    }

    /// Splits the engine back into its adapters.
    pub fn into_parts(self) -> (P, S) {
        (self.primary, self.secondary)
    }
}

fn read_prepared<A: StoreAdapter>(adapter: &A, since: Timestamp) -> Vec<PreparedRecord> {
    let entries: Vec<PreparedRecord> = adapter
        .latest_since(since)
        .map(|raw| adapter.prepare_for_writing(raw))
        .collect();
    debug!(store = adapter.name(), since, entries = entries.len(), "read changes");
    entries
}

fn count_suppressed(entries: &[PreparedRecord]) -> u64 {
    entries.iter().filter(|e| e.is_suppressed()).count() as u64
}

/// Nulls entries the destination wrote in its last batch.
fn suppress_echoes(entries: &mut [PreparedRecord], destination: &EchoSuppressionSet) -> u64 {
    let mut suppressed = 0;
    for entry in entries.iter_mut().filter(|e| !e.is_suppressed()) {
        if destination.contains(&entry.id, entry.timestamp) {
            debug!(id = %entry.id, timestamp = entry.timestamp, "destination wrote this pair last pass");
            entry.suppress();
            suppressed += 1;
        }
    }
    suppressed
}

/// Nulls every entry still carrying a payload.
fn defer_all(entries: &mut [PreparedRecord]) -> u64 {
    let mut deferred = 0;
    for entry in entries.iter_mut().filter(|e| !e.is_suppressed()) {
        entry.suppress();
        deferred += 1;
    }
    deferred
}

/// Nulls primary-bound entries older than what the primary itself reported.
///
/// The primary overwrites unconditionally, so this is the only thing keeping
/// an older secondary value from clobbering a newer primary one.
fn drop_superseded(to_primary: &mut [PreparedRecord], from_primary: &[PreparedRecord]) -> u64 {
    let mut newest: HashMap<RecordId, Timestamp> = HashMap::new();
    for entry in from_primary {
        newest
            .entry(entry.id)
            .and_modify(|ts| *ts = (*ts).max(entry.timestamp))
            .or_insert(entry.timestamp);
    }

    let mut dropped = 0;
    for entry in to_primary.iter_mut().filter(|e| !e.is_suppressed()) {
        if let Some(&primary_ts) = newest.get(&entry.id) {
            if primary_ts > entry.timestamp {
                debug!(
                    id = %entry.id,
                    timestamp = entry.timestamp,
                    primary_ts,
                    "primary holds a newer version, dropping record"
                );
                entry.suppress();
                dropped += 1;
            }
        }
    }
    dropped
}
