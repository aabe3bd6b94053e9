//! Column store backend trait definition.

use caes_model::{Payload, RecordId, StoreResult, Timestamp};
use std::sync::Arc;
use std::time::Duration;

/// Partition marker every index entry is written under.
pub const INDEX_PARTITION: i32 = 0;

/// An index entry: `(partition, timestamp)` pointing at a record id.
///
/// The id is part of the key as well, so two records written in the same
/// second do not shadow each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeseriesEntry {
    /// Partition marker.
    pub partition: i32,
    /// Logical timestamp of the write.
    pub timestamp: Timestamp,
    /// Data row this entry points at.
    pub id: RecordId,
}

impl TimeseriesEntry {
    /// Creates an entry in the default partition.
    pub fn new(timestamp: Timestamp, id: RecordId) -> Self {
        Self {
            partition: INDEX_PARTITION,
            timestamp,
            id,
        }
    }
}

/// A single upsert inside a [`ColumnBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Upsert an index entry, optionally expiring after `ttl`.
    UpsertIndex {
        /// Index table name.
        table: String,
        /// Entry to store.
        entry: TimeseriesEntry,
        /// Time to live of the entry.
        ttl: Option<Duration>,
    },
    /// Upsert the given columns of a data row; other columns are kept.
    UpsertRow {
        /// Data table name.
        table: String,
        /// Row key.
        id: RecordId,
        /// Columns to set.
        columns: Payload,
    },
}

/// Mutations applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnBatch {
    mutations: Vec<Mutation>,
}

impl ColumnBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a mutation.
    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    /// Builder-style variant of [`ColumnBatch::push`].
    pub fn with(mut self, mutation: Mutation) -> Self {
        self.push(mutation);
        self
    }

    /// The mutations in application order.
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Number of mutations.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Returns true if the batch holds no mutation.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// A column-family store with a time-ordered index table.
///
/// Backends know nothing about records, projection or echo suppression.
/// They answer index range scans and key lookups, and apply batches
/// atomically.
///
/// # Invariants
///
/// - `scan_index` returns entries ordered by `(timestamp, id)`, expired ones omitted
/// - `apply_batch` makes either every mutation visible or none of them
/// - Backends must be `Send + Sync`
///
/// # Implementors
///
/// - [`crate::MemoryColumnStore`] - For testing
/// - `crate::RocksColumnStore` - For embedded persistent storage
/// - `crate::CassandraColumnStore` - For a shared cluster
pub trait ColumnStore: Send + Sync {
    /// Returns the entries of `partition` with `timestamp >= since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or the backend fails.
    fn scan_index(
        &self,
        table: &str,
        partition: i32,
        since: Timestamp,
    ) -> StoreResult<Vec<TimeseriesEntry>>;

    /// Reads a data row by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails. A missing row is `Ok(None)`.
    fn get_row(&self, table: &str, id: &RecordId) -> StoreResult<Option<Payload>>;

    /// Applies every mutation of the batch, or none of them.
    ///
    /// # Errors
    ///
    /// Returns an error if any mutation fails; nothing is visible then.
    fn apply_batch(&self, batch: &ColumnBatch) -> StoreResult<()>;

    /// Releases backend resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to shut down cleanly.
    fn close(&self) -> StoreResult<()>;
}

impl<T: ColumnStore + ?Sized> ColumnStore for Arc<T> {
    fn scan_index(
        &self,
        table: &str,
        partition: i32,
        since: Timestamp,
    ) -> StoreResult<Vec<TimeseriesEntry>> {
        (**self).scan_index(table, partition, since)
    }

    fn get_row(&self, table: &str, id: &RecordId) -> StoreResult<Option<Payload>> {
        (**self).get_row(table, id)
    }

    fn apply_batch(&self, batch: &ColumnBatch) -> StoreResult<()> {
        (**self).apply_batch(batch)
    }

    fn close(&self) -> StoreResult<()> {
        (**self).close()
    }
}

impl<T: ColumnStore + ?Sized> ColumnStore for Box<T> {
    fn scan_index(
        &self,
        table: &str,
        partition: i32,
        since: Timestamp,
    ) -> StoreResult<Vec<TimeseriesEntry>> {
        (**self).scan_index(table, partition, since)
    }

    fn get_row(&self, table: &str, id: &RecordId) -> StoreResult<Option<Payload>> {
        (**self).get_row(table, id)
    }

    fn apply_batch(&self, batch: &ColumnBatch) -> StoreResult<()> {
        (**self).apply_batch(batch)
    }

    fn close(&self) -> StoreResult<()> {
        (**self).close()
    }
}
