//! Store adapter over a column store.

use crate::config::PrimaryConfig;
use crate::store::{ColumnBatch, ColumnStore, Mutation, TimeseriesEntry, INDEX_PARTITION};
use caes_model::{
    EchoSuppressionSet, PreparedRecord, Record, StoreAdapter, StoreError, Timestamp, Value,
    WriteSummary,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};

/// Adapter for the column-family store.
///
/// There is no conflict policy on this side: every write overwrites
/// unconditionally. Last-write-wins for records landing here relies entirely
/// on the order in which the sync engine issues its batches.
pub struct PrimaryAdapter<C: ColumnStore> {
    config: PrimaryConfig,
    store: C,
    echo: EchoSuppressionSet,
    read_complete: AtomicBool,
    closed: bool,
}

impl<C: ColumnStore> PrimaryAdapter<C> {
    /// Creates an adapter over the given store.
    pub fn new(config: PrimaryConfig, store: C) -> Self {
        Self {
            config,
            store,
            echo: EchoSuppressionSet::new(),
            read_complete: AtomicBool::new(true),
            closed: false,
        }
    }

    /// Returns the adapter configuration.
    pub fn config(&self) -> &PrimaryConfig {
        &self.config
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &C {
        &self.store
    }

    /// Builds the dual write for one record: index entry first, then the row.
    fn dual_write(&self, record: &PreparedRecord, columns: caes_model::Payload) -> ColumnBatch {
        let mut row = columns;
        row.insert(
            self.config.id_field.clone(),
            Value::Text(record.id.to_string()),
        );

        ColumnBatch::new()
            .with(Mutation::UpsertIndex {
                table: self.config.index_table.clone(),
                entry: TimeseriesEntry::new(record.timestamp, record.id),
                ttl: self.config.write_ttl,
            })
            .with(Mutation::UpsertRow {
                table: self.config.data_table.clone(),
                id: record.id,
                columns: row,
            })
    }

    fn dereference(&self, entry: TimeseriesEntry) -> Option<Record> {
        match self.store.get_row(&self.config.data_table, &entry.id) {
            Ok(Some(row)) => Some(Record::new(entry.id, row, entry.timestamp)),
            Ok(None) => {
                warn!(
                    id = %entry.id,
                    timestamp = entry.timestamp,
                    table = %self.config.data_table,
                    "index entry points at a missing row, dropping it"
                );
                None
            }
            Err(e) => {
                log_store_error(&e, "row lookup");
                self.read_complete.store(false, Ordering::Relaxed);
                None
            }
        }
    }
}

fn log_store_error(error: &StoreError, operation: &str) {
    if error.is_transient() {
        warn!(%error, operation, "primary store temporarily failed");
    } else {
        error!(%error, operation, "primary store rejected the request");
    }
}

impl<C: ColumnStore> StoreAdapter for PrimaryAdapter<C> {
    type Raw = Record;

    fn name(&self) -> &str {
        "primary"
    }

    fn latest_since(&self, since: Timestamp) -> Box<dyn Iterator<Item = Record> + '_> {
        self.read_complete.store(true, Ordering::Relaxed);
        let entries =
            match self
                .store
                .scan_index(&self.config.index_table, INDEX_PARTITION, since)
            {
                Ok(entries) => entries,
                Err(e) => {
                    log_store_error(&e, "index scan");
                    self.read_complete.store(false, Ordering::Relaxed);
                    return Box::new(std::iter::empty());
                }
            };

        debug!(since, hits = entries.len(), "queried primary index");
        Box::new(
            entries
                .into_iter()
                .filter_map(move |entry| self.dereference(entry)),
        )
    }

    fn last_read_complete(&self) -> bool {
        self.read_complete.load(Ordering::Relaxed)
    }

    fn prepare_for_writing(&self, raw: Record) -> PreparedRecord {
        if self.echo.contains(&raw.id, raw.timestamp) {
            debug!(id = %raw.id, timestamp = raw.timestamp, "suppressing primary echo");
            return PreparedRecord::suppressed(raw.id, raw.timestamp);
        }

        let mut payload = raw.payload;
        payload.remove(&self.config.id_field);
        payload.remove(&self.config.timestamp_field);

        PreparedRecord::ready(raw.id, raw.timestamp, self.config.projection.apply(payload))
    }

    fn write_batch(&mut self, entries: Vec<PreparedRecord>) -> WriteSummary {
        let mut summary = WriteSummary::default();
        let mut written = Vec::with_capacity(entries.len());

        for entry in entries {
            let Some(columns) = entry.payload.clone() else {
                debug!(id = %entry.id, "no data to sync for entry, skipping");
                summary.skipped += 1;
                continue;
            };

            let batch = self.dual_write(&entry, columns);
            match self.store.apply_batch(&batch) {
                Ok(()) => {
                    debug!(id = %entry.id, timestamp = entry.timestamp, "wrote record to primary");
                    written.push(entry.key());
                    summary.written += 1;
                }
                Err(e) => {
                    log_store_error(&e, "dual write");
                    summary.failed += 1;
                }
            }
        }

        self.echo.replace(written);
        summary
    }

    fn echo_suppression(&self) -> &EchoSuppressionSet {
        &self.echo
    }

    fn flush(&mut self) {
        // Acknowledged writes are immediately readable on this store.
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.store.close() {
            log_store_error(&e, "close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryColumnStore;
    use caes_model::{payload_of, Projection, RecordId};
    use std::sync::Arc;
    use std::time::Duration;

    fn adapter(config: PrimaryConfig) -> (Arc<MemoryColumnStore>, PrimaryAdapter<Arc<MemoryColumnStore>>) {
        let store = Arc::new(MemoryColumnStore::new());
        (Arc::clone(&store), PrimaryAdapter::new(config, store))
    }

    fn ready(id: RecordId, timestamp: Timestamp) -> PreparedRecord {
        PreparedRecord::ready(
            id,
            timestamp,
            payload_of([("vint", Value::from(1)), ("vstring", Value::from("Hi"))]),
        )
    }

    #[test]
    fn write_then_read_back() {
        let (store, mut primary) = adapter(PrimaryConfig::new("data"));
        let id = RecordId::new();

        let summary = primary.write_batch(vec![ready(id, 10)]);
        assert_eq!(summary.written, 1);
        assert_eq!(store.index_len("ts"), 1);

        let row = store.get_row("data", &id).unwrap().unwrap();
        assert_eq!(row["did"], Value::Text(id.to_string()));
        assert_eq!(row["vint"], Value::Integer(1));

        let records: Vec<Record> = primary.latest_since(10).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key(), (id, 10));
        assert!(primary.latest_since(11).next().is_none());
    }

    #[test]
    fn latest_since_is_restartable() {
        let (_store, mut primary) = adapter(PrimaryConfig::new("data"));
        primary.write_batch(vec![ready(RecordId::new(), 3), ready(RecordId::new(), 4)]);

        assert_eq!(primary.latest_since(0).count(), 2);
        assert_eq!(primary.latest_since(0).count(), 2);
    }

    #[test]
    fn null_payload_is_skipped() {
        let (store, mut primary) = adapter(PrimaryConfig::new("data"));
        let id = RecordId::new();

        let summary = primary.write_batch(vec![PreparedRecord::suppressed(id, 10)]);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.written, 0);
        assert!(store.get_row("data", &id).unwrap().is_none());
        assert_eq!(store.index_len("ts"), 0);
    }

    #[test]
    fn echo_set_holds_exactly_the_last_batch() {
        let (_store, mut primary) = adapter(PrimaryConfig::new("data"));
        let a = RecordId::new();
        let b = RecordId::new();

        primary.write_batch(vec![ready(a, 1), PreparedRecord::suppressed(b, 2)]);
        assert!(primary.echo_suppression().contains(&a, 1));
        assert!(!primary.echo_suppression().contains(&b, 2));
        assert_eq!(primary.echo_suppression().len(), 1);

        primary.write_batch(vec![ready(b, 3)]);
        assert!(!primary.echo_suppression().contains(&a, 1));
        assert!(primary.echo_suppression().contains(&b, 3));
    }

    #[test]
    fn prepare_suppresses_own_writes() {
        let (_store, mut primary) = adapter(PrimaryConfig::new("data"));
        let id = RecordId::new();
        primary.write_batch(vec![ready(id, 10)]);

        let raw = primary.latest_since(0).next().unwrap();
        let prepared = primary.prepare_for_writing(raw);
        assert!(prepared.is_suppressed());
        assert_eq!(prepared.key(), (id, 10));
    }

    #[test]
    fn prepare_strips_id_and_timestamp_fields() {
        let (_store, primary) = adapter(PrimaryConfig::new("data"));
        let id = RecordId::new();
        let raw = Record::new(
            id,
            payload_of([
                ("did", Value::from(id.to_string())),
                ("timestamp", Value::from(10)),
                ("vint", Value::from(1)),
            ]),
            10,
        );

        let payload = primary.prepare_for_writing(raw).payload.unwrap();
        assert_eq!(payload.keys().collect::<Vec<_>>(), ["vint"]);
    }

    #[test]
    fn prepare_applies_projection() {
        let config = PrimaryConfig::new("data").with_projection(Projection::exclude(["secret"]));
        let (_store, primary) = adapter(config);
        let raw = Record::new(
            RecordId::new(),
            payload_of([("secret", Value::from("x")), ("open", Value::from("y"))]),
            1,
        );

        let payload = primary.prepare_for_writing(raw).payload.unwrap();
        assert!(!payload.contains_key("secret"));
        assert!(payload.contains_key("open"));
    }

    #[test]
    fn failing_row_half_is_atomic_and_does_not_abort_batch() {
        let (store, mut primary) = adapter(PrimaryConfig::new("data"));
        let doomed = RecordId::new();
        let fine = RecordId::new();
        store.fail_next_row_writes(1);

        let summary = primary.write_batch(vec![ready(doomed, 5), ready(fine, 6)]);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.written, 1);

        let ids: Vec<RecordId> = primary.latest_since(0).map(|r| r.id).collect();
        assert_eq!(ids, [fine]);
        assert!(store.get_row("data", &doomed).unwrap().is_none());
        assert!(!primary.echo_suppression().contains(&doomed, 5));
        assert!(primary.echo_suppression().contains(&fine, 6));
    }

    #[test]
    fn dangling_index_entry_is_dropped() {
        let (store, primary) = adapter(PrimaryConfig::new("data"));
        let ghost = RecordId::new();
        store
            .apply_batch(&ColumnBatch::new().with(Mutation::UpsertIndex {
                table: "ts".into(),
                entry: TimeseriesEntry::new(7, ghost),
                ttl: None,
            }))
            .unwrap();

        assert_eq!(primary.latest_since(0).count(), 0);
        assert!(primary.last_read_complete());
    }

    #[test]
    fn scan_failure_yields_empty_sequence() {
        let (store, mut primary) = adapter(PrimaryConfig::new("data"));
        primary.write_batch(vec![ready(RecordId::new(), 1)]);
        store.fail_next_scans(1);

        assert_eq!(primary.latest_since(0).count(), 0);
        assert!(!primary.last_read_complete());
        assert_eq!(primary.latest_since(0).count(), 1);
        assert!(primary.last_read_complete());
    }

    #[test]
    fn row_read_failure_marks_read_incomplete() {
        let (store, mut primary) = adapter(PrimaryConfig::new("data"));
        primary.write_batch(vec![ready(RecordId::new(), 1), ready(RecordId::new(), 2)]);
        store.fail_next_row_reads(1);

        assert_eq!(primary.latest_since(0).count(), 1);
        assert!(!primary.last_read_complete());
    }

    #[test]
    fn write_ttl_expires_index_entries() {
        let config = PrimaryConfig::new("data").with_write_ttl(Duration::from_millis(1));
        let (store, mut primary) = adapter(config);
        primary.write_batch(vec![ready(RecordId::new(), 1)]);
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(primary.latest_since(0).count(), 0);
        assert_eq!(store.row_count("data"), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let (store, mut primary) = adapter(PrimaryConfig::new("data"));
        primary.close();
        primary.close();
        assert!(store.is_closed());
        assert_eq!(primary.latest_since(0).count(), 0);
    }
}
