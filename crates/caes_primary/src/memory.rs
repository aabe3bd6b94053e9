//! In-memory column store for testing.

use crate::store::{ColumnBatch, ColumnStore, Mutation, TimeseriesEntry};
use caes_model::{Payload, RecordId, StoreError, StoreResult, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

type IndexTable = BTreeMap<TimeseriesEntry, Option<Instant>>;
type DataTable = HashMap<RecordId, Payload>;

#[derive(Debug, Default)]
struct Tables {
    indexes: HashMap<String, IndexTable>,
    rows: HashMap<String, DataTable>,
}

#[derive(Debug, Default)]
struct Faults {
    index_writes: u32,
    row_writes: u32,
    scans: u32,
    row_reads: u32,
}

fn take_fault(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

/// An in-memory column store.
///
/// Tables are created on first write. Batches are validated completely
/// before anything is applied, which gives the same all-or-nothing
/// visibility as a logged batch on a real cluster.
///
/// Failures can be injected per operation kind to exercise the error paths
/// of the adapter.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads, typically
/// behind an `Arc` so a test can write "from outside" while an adapter
/// holds the same store.
#[derive(Debug, Default)]
pub struct MemoryColumnStore {
    tables: RwLock<Tables>,
    faults: Mutex<Faults>,
    closed: AtomicBool,
}

impl MemoryColumnStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` index upserts fail.
    pub fn fail_next_index_writes(&self, count: u32) {
        self.faults.lock().index_writes = count;
    }

    /// Makes the next `count` row upserts fail.
    pub fn fail_next_row_writes(&self, count: u32) {
        self.faults.lock().row_writes = count;
    }

    /// Makes the next `count` index scans time out.
    pub fn fail_next_scans(&self, count: u32) {
        self.faults.lock().scans = count;
    }

    /// Makes the next `count` row reads time out.
    pub fn fail_next_row_reads(&self, count: u32) {
        self.faults.lock().row_reads = count;
    }

    /// Number of live index entries in a table.
    pub fn index_len(&self, table: &str) -> usize {
        let now = Instant::now();
        self.tables
            .read()
            .indexes
            .get(table)
            .map(|index| index.values().filter(|exp| is_live(**exp, now)).count())
            .unwrap_or(0)
    }

    /// Number of rows in a data table.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .rows
            .get(table)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Returns true once [`ColumnStore::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

fn is_live(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.map_or(true, |at| at > now)
}

impl ColumnStore for MemoryColumnStore {
    fn scan_index(
        &self,
        table: &str,
        partition: i32,
        since: Timestamp,
    ) -> StoreResult<Vec<TimeseriesEntry>> {
        self.ensure_open()?;
        if take_fault(&mut self.faults.lock().scans) {
            return Err(StoreError::Timeout(format!("scan of {table}")));
        }

        let now = Instant::now();
        let tables = self.tables.read();
        let Some(index) = tables.indexes.get(table) else {
            return Ok(Vec::new());
        };

        Ok(index
            .iter()
            .filter(|(entry, expires_at)| {
                entry.partition == partition && entry.timestamp >= since && is_live(**expires_at, now)
            })
            .map(|(entry, _)| *entry)
            .collect())
    }

    fn get_row(&self, table: &str, id: &RecordId) -> StoreResult<Option<Payload>> {
        self.ensure_open()?;
        if take_fault(&mut self.faults.lock().row_reads) {
            return Err(StoreError::Timeout(format!("read of {id} in {table}")));
        }

        Ok(self
            .tables
            .read()
            .rows
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    fn apply_batch(&self, batch: &ColumnBatch) -> StoreResult<()> {
        self.ensure_open()?;

        // Validate every mutation before touching the tables.
        {
            let mut faults = self.faults.lock();
            for mutation in batch.mutations() {
                let failed = match mutation {
                    Mutation::UpsertIndex { .. } => take_fault(&mut faults.index_writes),
                    Mutation::UpsertRow { .. } => take_fault(&mut faults.row_writes),
                };
                if failed {
                    return Err(StoreError::Injected(format!(
                        "batch of {} mutations rejected",
                        batch.len()
                    )));
                }
            }
        }

        let now = Instant::now();
        let mut tables = self.tables.write();
        for mutation in batch.mutations() {
            match mutation {
                Mutation::UpsertIndex { table, entry, ttl } => {
                    let expires_at = ttl.map(|ttl| now + ttl);
                    tables
                        .indexes
                        .entry(table.clone())
                        .or_default()
                        .insert(*entry, expires_at);
                }
                Mutation::UpsertRow { table, id, columns } => {
                    let row = tables
                        .rows
                        .entry(table.clone())
                        .or_default()
                        .entry(*id)
                        .or_default();
                    row.extend(columns.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
        }

        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
