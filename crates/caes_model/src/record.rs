//! Records and the entries that flow between read and write side.

use crate::id::RecordId;
use crate::value::Payload;

/// Logical clock value of a record, in epoch seconds.
///
/// Larger means newer; this is the only ordering conflict resolution uses.
pub type Timestamp = i64;

/// A full record as seen by either store.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Join key across both stores.
    pub id: RecordId,
    /// Field values.
    pub payload: Payload,
    /// Logical timestamp of this version.
    pub timestamp: Timestamp,
}

impl Record {
    /// Creates a new record.
    pub fn new(id: RecordId, payload: Payload, timestamp: Timestamp) -> Self {
        Self {
            id,
            payload,
            timestamp,
        }
    }

    /// Returns the `(id, timestamp)` pair identifying this version.
    pub fn key(&self) -> (RecordId, Timestamp) {
        (self.id, self.timestamp)
    }
}

/// An entry ready to be handed to a `write_batch` call.
///
/// A `None` payload is the skip sentinel: the entry was observed but must not
/// be written anywhere. The id and timestamp are always present so the caller
/// can still account for the entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRecord {
    /// Record id.
    pub id: RecordId,
    /// Record timestamp.
    pub timestamp: Timestamp,
    /// Projected payload, or `None` when the entry is suppressed.
    pub payload: Option<Payload>,
}

impl PreparedRecord {
    /// Creates an entry that will be written.
    pub fn ready(id: RecordId, timestamp: Timestamp, payload: Payload) -> Self {
        Self {
            id,
            timestamp,
            payload: Some(payload),
        }
    }

    /// Creates an entry that must not be written.
    pub fn suppressed(id: RecordId, timestamp: Timestamp) -> Self {
        Self {
            id,
            timestamp,
            payload: None,
        }
    }

    /// Returns true if this entry carries the skip sentinel.
    pub fn is_suppressed(&self) -> bool {
        self.payload.is_none()
    }

    /// Turns this entry into a suppressed one, keeping id and timestamp.
    pub fn suppress(&mut self) {
        self.payload = None;
    }

    /// Returns the `(id, timestamp)` pair identifying this version.
    pub fn key(&self) -> (RecordId, Timestamp) {
        (self.id, self.timestamp)
    }
}

impl From<Record> for PreparedRecord {
    fn from(record: Record) -> Self {
        Self::ready(record.id, record.timestamp, record.payload)
    }
}

/// Outcome counts of one `write_batch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Entries durably written.
    pub written: u64,
    /// Entries carrying the skip sentinel.
    pub skipped: u64,
    /// Entries refused because the store already holds a newer version.
    pub conflicts: u64,
    /// Entries that failed with a backend error.
    pub failed: u64,
}

impl WriteSummary {
    /// Total number of entries the batch contained.
    pub fn total(&self) -> u64 {
        self.written + self.skipped + self.conflicts + self.failed
    }

    /// Adds another summary into this one.
    pub fn absorb(&mut self, other: WriteSummary) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.conflicts += other.conflicts;
        self.failed += other.failed;
    }
}
