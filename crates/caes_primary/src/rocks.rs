//! RocksDB-backed column store.
//!
//! Every table lives in its own column family. Index keys are laid out so
//! that the byte order of the keys matches `(partition, timestamp, id)`:
//!
//! ```text
//! | partition (4, sign-flipped BE) | timestamp (8, sign-flipped BE) | id (16) |
//! ```
//!
//! Index values and rows are CBOR encoded.

use crate::store::{ColumnBatch, ColumnStore, Mutation, TimeseriesEntry};
use caes_model::{Payload, RecordId, StoreError, StoreResult, Timestamp};
use parking_lot::RwLock;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const INDEX_KEY_LEN: usize = 4 + 8 + 16;

#[derive(Debug, Serialize, Deserialize)]
struct IndexCell {
    expires_at_ms: Option<i64>,
}

/// A column store persisted in an embedded RocksDB instance.
///
/// Tables must be declared when the store is opened. Batches are written
/// through a single `WriteBatch`, so they land atomically.
pub struct RocksColumnStore {
    db: RwLock<Option<DB>>,
    path: PathBuf,
}

impl RocksColumnStore {
    /// Opens (or creates) a store at `path` with one column family per table.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if RocksDB cannot open the directory.
    pub fn open<P: AsRef<Path>>(path: P, tables: &[&str]) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = tables
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)
            .map_err(|e| StoreError::Unavailable(format!("failed to open RocksDB: {e}")))?;

        Ok(Self {
            db: RwLock::new(Some(db)),
            path,
        })
    }

    /// Returns the directory the store lives in.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for RocksColumnStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksColumnStore")
            .field("path", &self.path)
            .field("open", &self.db.read().is_some())
            .finish()
    }
}

fn unavailable(e: rocksdb::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn no_table(table: &str) -> StoreError {
    StoreError::InvalidRequest(format!("unknown table {table}"))
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn index_key(entry: &TimeseriesEntry) -> [u8; INDEX_KEY_LEN] {
    let mut key = [0u8; INDEX_KEY_LEN];
    key[..4].copy_from_slice(&((entry.partition as u32) ^ (1 << 31)).to_be_bytes());
    key[4..12].copy_from_slice(&((entry.timestamp as u64) ^ (1 << 63)).to_be_bytes());
    key[12..].copy_from_slice(entry.id.as_bytes());
    key
}

fn decode_index_key(key: &[u8]) -> Option<TimeseriesEntry> {
    if key.len() != INDEX_KEY_LEN {
        return None;
    }
    let partition = (u32::from_be_bytes(key[..4].try_into().ok()?) ^ (1 << 31)) as i32;
    let timestamp = (u64::from_be_bytes(key[4..12].try_into().ok()?) ^ (1 << 63)) as Timestamp;
    let id = RecordId::from_slice(&key[12..])?;
    Some(TimeseriesEntry {
        partition,
        timestamp,
        id,
    })
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| StoreError::Codec(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> StoreResult<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Codec(e.to_string()))
}

impl ColumnStore for RocksColumnStore {
    fn scan_index(
        &self,
        table: &str,
        partition: i32,
        since: Timestamp,
    ) -> StoreResult<Vec<TimeseriesEntry>> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        let cf = db.cf_handle(table).ok_or_else(|| no_table(table))?;

        let start = index_key(&TimeseriesEntry {
            partition,
            timestamp: since,
            id: RecordId::from_bytes([0; 16]),
        });
        let now = now_ms();
        let mut entries = Vec::new();

        for item in db.iterator_cf(cf, IteratorMode::From(&start, Direction::Forward)) {
            let (key, value) = item.map_err(unavailable)?;
            let Some(entry) = decode_index_key(&key) else {
                continue;
            };
            if entry.partition != partition {
                break;
            }
            let cell: IndexCell = decode(&value)?;
            if cell.expires_at_ms.map_or(true, |at| at > now) {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    fn get_row(&self, table: &str, id: &RecordId) -> StoreResult<Option<Payload>> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        let cf = db.cf_handle(table).ok_or_else(|| no_table(table))?;

        match db.get_cf(cf, id.as_bytes()).map_err(unavailable)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn apply_batch(&self, batch: &ColumnBatch) -> StoreResult<()> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;

        let now = now_ms();
        let mut write = WriteBatch::default();
        let mut staged: HashMap<(&str, RecordId), Payload> = HashMap::new();

        for mutation in batch.mutations() {
            match mutation {
                Mutation::UpsertIndex { table, entry, ttl } => {
                    let cf = db.cf_handle(table).ok_or_else(|| no_table(table))?;
                    let cell = IndexCell {
                        expires_at_ms: ttl.map(|ttl| now.saturating_add(ttl.as_millis() as i64)),
                    };
                    write.put_cf(cf, index_key(entry), encode(&cell)?);
                }
                Mutation::UpsertRow { table, id, columns } => {
                    let cf = db.cf_handle(table).ok_or_else(|| no_table(table))?;
                    let key = (table.as_str(), *id);
                    let mut row = match staged.remove(&key) {
                        Some(row) => row,
                        None => match db.get_cf(cf, id.as_bytes()).map_err(unavailable)? {
                            Some(bytes) => decode(&bytes)?,
                            None => Payload::new(),
                        },
                    };
                    row.extend(columns.iter().map(|(k, v)| (k.clone(), v.clone())));
                    write.put_cf(cf, id.as_bytes(), encode(&row)?);
                    staged.insert(key, row);
                }
            }
        }

        db.write(write).map_err(unavailable)
    }

    fn close(&self) -> StoreResult<()> {
        if let Some(db) = self.db.write().take() {
            db.flush().map_err(unavailable)?;
        }
        Ok(())
    }
}
