//! In-memory search store for testing.

use crate::backend::{SearchBackend, SearchHit};
use caes_model::{StoreError, StoreResult, Timestamp};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone)]
struct StoredDoc {
    version: i64,
    source: Map<String, JsonValue>,
}

#[derive(Debug, Default)]
struct IndexState {
    /// Every acknowledged write.
    live: HashMap<String, StoredDoc>,
    /// What searches see, as of the last refresh.
    searchable: HashMap<String, StoredDoc>,
}

#[derive(Debug, Default)]
struct Faults {
    searches: u32,
    writes: u32,
}

fn take_fault(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

/// An in-memory search store with external versioning.
///
/// Writes are checked against the live version immediately but only show up
/// in searches after [`SearchBackend::refresh`], like a near-real-time index.
/// [`MemorySearchStore::get`] reads the live state, like a realtime get.
#[derive(Debug, Default)]
pub struct MemorySearchStore {
    indexes: RwLock<HashMap<String, IndexState>>,
    faults: Mutex<Faults>,
    closed: AtomicBool,
}

impl MemorySearchStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` searches time out.
    pub fn fail_next_searches(&self, count: u32) {
        self.faults.lock().searches = count;
    }

    /// Makes the next `count` index requests fail as unavailable.
    pub fn fail_next_writes(&self, count: u32) {
        self.faults.lock().writes = count;
    }

    /// Returns the live version and body of a document.
    pub fn get(&self, index: &str, id: &str) -> Option<(i64, Map<String, JsonValue>)> {
        self.indexes
            .read()
            .get(index)
            .and_then(|state| state.live.get(id))
            .map(|doc| (doc.version, doc.source.clone()))
    }

    /// Number of live documents in an index.
    pub fn doc_count(&self, index: &str) -> usize {
        self.indexes
            .read()
            .get(index)
            .map(|state| state.live.len())
            .unwrap_or(0)
    }

    /// Returns true once [`SearchBackend::close`] has been called.
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

fn field_timestamp(source: &Map<String, JsonValue>, field: &str) -> Option<Timestamp> {
    source.get(field).and_then(JsonValue::as_i64)
}

impl SearchBackend for MemorySearchStore {
    fn search_since(
        &self,
        index: &str,
        field: &str,
        since: Timestamp,
        from: usize,
        size: usize,
    ) -> StoreResult<Vec<SearchHit>> {
        self.ensure_open()?;
        if take_fault(&mut self.faults.lock().searches) {
            return Err(StoreError::Timeout(format!("search on {index}")));
        }

        let indexes = self.indexes.read();
        let Some(state) = indexes.get(index) else {
            return Ok(Vec::new());
        };

        let mut matching: Vec<(Timestamp, &String, &StoredDoc)> = state
            .searchable
            .iter()
            .filter_map(|(id, doc)| {
                field_timestamp(&doc.source, field)
                    .filter(|ts| *ts >= since)
                    .map(|ts| (ts, id, doc))
            })
            .collect();
        matching.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        Ok(matching
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(_, id, doc)| SearchHit {
                id: id.clone(),
                version: doc.version,
                source: doc.source.clone(),
            })
            .collect())
    }

    fn index_versioned(
        &self,
        index: &str,
        _doc_type: &str,
        id: &str,
        source: &Map<String, JsonValue>,
        version: i64,
    ) -> StoreResult<()> {
        self.ensure_open()?;
        if take_fault(&mut self.faults.lock().writes) {
            return Err(StoreError::Unavailable(format!("index of {id}")));
        }

        let mut indexes = self.indexes.write();
        let state = indexes.entry(index.to_string()).or_default();
        if let Some(existing) = state.live.get(id) {
            if existing.version >= version {
                return Err(StoreError::VersionConflict {
                    id: id.to_string(),
                    attempted: version,
                });
            }
        }

        state.live.insert(
            id.to_string(),
            StoredDoc {
                version,
                source: source.clone(),
            },
        );
        Ok(())
    }

    fn refresh(&self, index: &str) -> StoreResult<()> {
        self.ensure_open()?;
        if let Some(state) = self.indexes.write().get_mut(index) {
            state.searchable = state.live.clone();
        }
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
