//! The contract every store adapter implements.

use crate::echo::EchoSuppressionSet;
use crate::record::{PreparedRecord, Timestamp, WriteSummary};

/// A store the sync engine can read changes from and write records into.
///
/// Adapters own their backend connection and their echo-suppression set
/// exclusively. None of the methods return errors: per-query and per-record
/// failures are logged and contained inside the adapter, which degrades to
/// "no result" or "record skipped".
///
/// # Invariants
///
/// - `latest_since` uses an inclusive lower bound and has no side effects on
///   the backend
/// - `prepare_for_writing` returns the skip sentinel for every pair in the
///   adapter's own echo-suppression set
/// - `write_batch` replaces the echo-suppression set with exactly the pairs
///   it wrote
/// - after `flush` returns, earlier writes are visible to `latest_since`
/// - `last_read_complete` is `false` whenever a backend failure shortened
///   the most recent `latest_since` sequence
pub trait StoreAdapter {
    /// Backend-native entry produced by [`StoreAdapter::latest_since`].
    type Raw;

    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Returns the entries whose timestamp is `>= since`.
    ///
    /// The sequence is lazy and finite. Calling this again re-runs the query.
    /// A failing backend yields an empty sequence.
    fn latest_since(&self, since: Timestamp) -> Box<dyn Iterator<Item = Self::Raw> + '_>;

    /// Whether the most recent [`StoreAdapter::latest_since`] sequence saw
    /// every matching entry.
    ///
    /// Only meaningful once that sequence has been fully consumed. A failed
    /// query or a failed per-entry read makes it `false`; entries that are
    /// legitimately absent (a dangling index entry, say) do not.
    fn last_read_complete(&self) -> bool;

    /// Projects a raw entry of this store and applies echo suppression.
    fn prepare_for_writing(&self, raw: Self::Raw) -> PreparedRecord;

    /// Writes every entry that carries a payload.
    ///
    /// Suppressed entries are counted as skipped. A failing entry is logged
    /// and does not stop the rest of the batch.
    fn write_batch(&mut self, entries: Vec<PreparedRecord>) -> WriteSummary;

    /// The pairs written by the most recent [`StoreAdapter::write_batch`].
    fn echo_suppression(&self) -> &EchoSuppressionSet;

    /// Blocks until earlier writes are visible to [`StoreAdapter::latest_since`].
    fn flush(&mut self);

    /// Releases backend resources. Calling it twice is harmless.
    fn close(&mut self);
}
