//! Test fixtures over the in-memory stores.
//!
//! Both stores are shared through an `Arc`, so a test can hand adapters to
//! an engine and still write to, or inspect, the stores directly.

use caes_model::{
    payload_from_json, payload_of, payload_to_json, Payload, RecordId, StoreResult, Timestamp,
    Value,
};
use caes_primary::{
    ColumnBatch, ColumnStore, MemoryColumnStore, Mutation, PrimaryAdapter, PrimaryConfig,
    TimeseriesEntry, INDEX_PARTITION,
};
use caes_secondary::{MemorySearchStore, SearchBackend, SecondaryAdapter, SecondaryConfig};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Primary adapter over a shared in-memory column store.
pub type TestPrimary = PrimaryAdapter<Arc<MemoryColumnStore>>;

/// Secondary adapter over a shared in-memory search store.
pub type TestSecondary = SecondaryAdapter<Arc<MemorySearchStore>>;

/// A pair of in-memory stores plus the configuration adapters are built with.
pub struct TestStores {
    /// The column store behind the primary adapter.
    pub column: Arc<MemoryColumnStore>,
    /// The search store behind the secondary adapter.
    pub search: Arc<MemorySearchStore>,
    /// Configuration used for primary adapters.
    pub primary_config: PrimaryConfig,
    /// Configuration used for secondary adapters.
    pub secondary_config: SecondaryConfig,
}

impl TestStores {
    /// Creates empty stores with a `data` table and a `test` index.
    pub fn new() -> Self {
        Self {
            column: Arc::new(MemoryColumnStore::new()),
            search: Arc::new(MemorySearchStore::new()),
            primary_config: PrimaryConfig::new("data"),
            secondary_config: SecondaryConfig::new("test"),
        }
    }

    /// Replaces the primary configuration.
    pub fn with_primary_config(mut self, config: PrimaryConfig) -> Self {
        self.primary_config = config;
        self
    }

    /// Replaces the secondary configuration.
    pub fn with_secondary_config(mut self, config: SecondaryConfig) -> Self {
        self.secondary_config = config;
        self
    }

    /// Builds a fresh pair of adapters over the shared stores.
    pub fn adapters(&self) -> (TestPrimary, TestSecondary) {
        (
            PrimaryAdapter::new(self.primary_config.clone(), Arc::clone(&self.column)),
            SecondaryAdapter::new(self.secondary_config.clone(), Arc::clone(&self.search)),
        )
    }

    /// Writes a record into the primary as an application would.
    pub fn write_primary(&self, id: RecordId, timestamp: Timestamp, payload: Payload) {
        let config = &self.primary_config;
        let mut row = payload;
        row.insert(config.id_field.clone(), Value::Text(id.to_string()));

        let batch = ColumnBatch::new()
            .with(Mutation::UpsertIndex {
                table: config.index_table.clone(),
                entry: TimeseriesEntry::new(timestamp, id),
                ttl: None,
            })
            .with(Mutation::UpsertRow {
                table: config.data_table.clone(),
                id,
                columns: row,
            });
        self.column
            .apply_batch(&batch)
            .expect("outside write to primary failed");
    }

    /// Indexes a document into the secondary as an application would.
    ///
    /// Returns the store's answer, so a test can observe version conflicts.
    pub fn write_secondary(&self, id: RecordId, timestamp: Timestamp, payload: Payload) -> StoreResult<()> {
        let config = &self.secondary_config;
        let mut source = payload_to_json(&payload);
        source.insert(config.timestamp_field.clone(), JsonValue::from(timestamp));
        self.search
            .index_versioned(&config.index, &config.doc_type, &id.to_string(), &source, timestamp)
    }

    /// The primary's data row for `id`, without the id column.
    pub fn primary_row(&self, id: RecordId) -> Option<Payload> {
        let config = &self.primary_config;
        self.column
            .get_row(&config.data_table, &id)
            .expect("primary read failed")
            .map(|mut row| {
                row.remove(&config.id_field);
                row
            })
    }

    /// Every live index entry of the primary, in scan order.
    pub fn primary_index(&self) -> Vec<TimeseriesEntry> {
        self.column
            .scan_index(&self.primary_config.index_table, INDEX_PARTITION, Timestamp::MIN)
            .expect("primary scan failed")
    }

    /// Timestamps the primary index holds for `id`.
    pub fn primary_timestamps(&self, id: RecordId) -> Vec<Timestamp> {
        self.primary_index()
            .into_iter()
            .filter(|entry| entry.id == id)
            .map(|entry| entry.timestamp)
            .collect()
    }

    /// The secondary's stored version and body for `id`, without the timestamp field.
    pub fn secondary_doc(&self, id: RecordId) -> Option<(Timestamp, Payload)> {
        let config = &self.secondary_config;
        self.search
            .get(&config.index, &id.to_string())
            .map(|(version, mut source)| {
                source.remove(&config.timestamp_field);
                (version, payload_from_json(source))
            })
    }
}

impl Default for TestStores {
    fn default() -> Self {
        Self::new()
    }
}

/// The `{vint: 1, vstring: "Hi"}` payload used throughout the tests.
pub fn sample_payload() -> Payload {
    payload_of([("vint", Value::from(1)), ("vstring", Value::from("Hi"))])
}

/// Runs a test with fresh stores and a pair of adapters over them.
pub fn with_stores<F, R>(f: F) -> R
where
    F: FnOnce(&TestStores, TestPrimary, TestSecondary) -> R,
{
    let stores = TestStores::new();
    let (primary, secondary) = stores.adapters();
    f(&stores, primary, secondary)
}
