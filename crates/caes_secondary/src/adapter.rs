//! Store adapter over a search backend.

use crate::backend::{SearchBackend, SearchHit};
use crate::config::SecondaryConfig;
use caes_model::{
    payload_from_json, payload_to_json, EchoSuppressionSet, PreparedRecord, RecordId,
    StoreAdapter, StoreError, Timestamp, WriteSummary,
};
use serde_json::{Map, Value as JsonValue};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// A document read back from the search store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Record id parsed from the document id.
    pub id: RecordId,
    /// Record timestamp, taken from the stored version.
    pub timestamp: Timestamp,
    /// Document body as stored.
    pub source: Map<String, JsonValue>,
}

impl Document {
    fn from_hit(hit: SearchHit) -> Option<Self> {
        match hit.id.parse::<RecordId>() {
            Ok(id) => Some(Self {
                id,
                timestamp: hit.version,
                source: hit.source,
            }),
            Err(_) => {
                warn!(id = %hit.id, "document id is not a record id, dropping it");
                None
            }
        }
    }
}

/// Adapter for the document-search store.
///
/// Every write carries the record timestamp as external version, so the
/// search store itself rejects anything older than what it holds.
pub struct SecondaryAdapter<B: SearchBackend> {
    config: SecondaryConfig,
    backend: B,
    echo: EchoSuppressionSet,
    read_complete: AtomicBool,
    closed: bool,
}

impl<B: SearchBackend> SecondaryAdapter<B> {
    /// Creates an adapter over the given backend.
    pub fn new(config: SecondaryConfig, backend: B) -> Self {
        Self {
            config,
            backend,
            echo: EchoSuppressionSet::new(),
            read_complete: AtomicBool::new(true),
            closed: false,
        }
    }

    /// Returns the adapter configuration.
    pub fn config(&self) -> &SecondaryConfig {
        &self.config
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

fn log_store_error(error: &StoreError, operation: &str) {
    if error.is_transient() {
        warn!(%error, operation, "search store temporarily failed");
    } else {
        error!(%error, operation, "search store rejected the request");
    }
}

/// Lazy paginated range query. Stops at the first empty or failed page.
struct Pages<'a, B: SearchBackend> {
    adapter: &'a SecondaryAdapter<B>,
    since: Timestamp,
    from: usize,
    page: std::vec::IntoIter<SearchHit>,
    exhausted: bool,
}

impl<B: SearchBackend> Pages<'_, B> {
    fn fetch(&mut self) -> bool {
        let config = &self.adapter.config;
        match self.adapter.backend.search_since(
            &config.index,
            &config.timestamp_field,
            self.since,
            self.from,
            config.page_size,
        ) {
            Ok(hits) if hits.is_empty() => false,
            Ok(hits) => {
                debug!(from = self.from, hits = hits.len(), "fetched search page");
                self.from += hits.len();
                self.page = hits.into_iter();
                true
            }
            Err(e) => {
                log_store_error(&e, "search");
                self.adapter.read_complete.store(false, Ordering::Relaxed);
                false
            }
        }
    }
}

impl<B: SearchBackend> Iterator for Pages<'_, B> {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        loop {
            if let Some(hit) = self.page.next() {
                match Document::from_hit(hit) {
                    Some(doc) => return Some(doc),
                    None => continue,
                }
            }
            if self.exhausted {
                return None;
            }
            if !self.fetch() {
                self.exhausted = true;
                return None;
            }
        }
    }
}

impl<B: SearchBackend> StoreAdapter for SecondaryAdapter<B> {
    type Raw = Document;

    fn name(&self) -> &str {
        "secondary"
    }

    fn latest_since(&self, since: Timestamp) -> Box<dyn Iterator<Item = Document> + '_> {
        self.read_complete.store(true, Ordering::Relaxed);
        Box::new(Pages {
            adapter: self,
            since,
            from: 0,
            page: Vec::new().into_iter(),
            exhausted: false,
        })
    }

    fn last_read_complete(&self) -> bool {
        self.read_complete.load(Ordering::Relaxed)
    }

    fn prepare_for_writing(&self, raw: Document) -> PreparedRecord {
        if self.echo.contains(&raw.id, raw.timestamp) {
            debug!(id = %raw.id, timestamp = raw.timestamp, "suppressing secondary echo");
            return PreparedRecord::suppressed(raw.id, raw.timestamp);
        }

        let mut source = raw.source;
        source.remove(&self.config.timestamp_field);
        let payload = self.config.projection.apply(payload_from_json(source));

        PreparedRecord::ready(raw.id, raw.timestamp, payload)
    }

    fn write_batch(&mut self, entries: Vec<PreparedRecord>) -> WriteSummary {
        let mut summary = WriteSummary::default();
        let mut written = Vec::with_capacity(entries.len());

        for entry in entries {
            let Some(payload) = &entry.payload else {
                debug!(id = %entry.id, "no data to sync for entry, skipping");
                summary.skipped += 1;
                continue;
            };

            let mut source = payload_to_json(payload);
            source.insert(
                self.config.timestamp_field.clone(),
                JsonValue::from(entry.timestamp),
            );

            match self.backend.index_versioned(
                &self.config.index,
                &self.config.doc_type,
                &entry.id.to_string(),
                &source,
                entry.timestamp,
            ) {
                Ok(()) => {
                    debug!(id = %entry.id, timestamp = entry.timestamp, "wrote record to secondary");
                    written.push(entry.key());
                    summary.written += 1;
                }
                Err(e) if e.is_version_conflict() => {
                    info!(id = %entry.id, timestamp = entry.timestamp, "search store holds a newer version, dropping record");
                    summary.conflicts += 1;
                }
                Err(e) => {
                    log_store_error(&e, "index");
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
        if let Err(e) = self.backend.refresh(&self.config.index) {
            log_store_error(&e, "refresh");
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.backend.close() {
            log_store_error(&e, "close");
        }
    }
}
