//! Search backend trait definition.

use caes_model::{StoreResult, Timestamp};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// A document returned by a range search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Document id as stored.
    pub id: String,
    /// Stored external version.
    pub version: i64,
    /// Document body.
    pub source: Map<String, JsonValue>,
}

/// A document-search store with external versioning.
///
/// # Invariants
///
/// - `index_versioned` succeeds only if `version` is strictly greater than
///   the stored version of the document (or the document is new)
/// - `search_since` only sees writes made before the last `refresh`
/// - Hits are ordered ascending by the timestamp field, then by id
///
/// # Implementors
///
/// - [`crate::MemorySearchStore`] - For testing
/// - [`crate::HttpSearchBackend`] - For a live cluster
pub trait SearchBackend: Send + Sync {
    /// Returns one page of documents whose `field` is `>= since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or times out.
    fn search_since(
        &self,
        index: &str,
        field: &str,
        since: Timestamp,
        from: usize,
        size: usize,
    ) -> StoreResult<Vec<SearchHit>>;

    /// Indexes a document with an external version.
    ///
    /// # Errors
    ///
    /// Returns `VersionConflict` if the stored version is not older, or
    /// another error if the request fails.
    fn index_versioned(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: &Map<String, JsonValue>,
        version: i64,
    ) -> StoreResult<()>;

    /// Makes all prior writes to `index` searchable.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn refresh(&self, index: &str) -> StoreResult<()>;

    /// Releases backend resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to shut down cleanly.
    fn close(&self) -> StoreResult<()>;
}

impl<T: SearchBackend + ?Sized> SearchBackend for Arc<T> {
    fn search_since(
        &self,
        index: &str,
        field: &str,
        since: Timestamp,
        from: usize,
        size: usize,
    ) -> StoreResult<Vec<SearchHit>> {
        (**self).search_since(index, field, since, from, size)
    }

    fn index_versioned(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: &Map<String, JsonValue>,
        version: i64,
    ) -> StoreResult<()> {
        (**self).index_versioned(index, doc_type, id, source, version)
    }

    fn refresh(&self, index: &str) -> StoreResult<()> {
        (**self).refresh(index)
    }

    fn close(&self) -> StoreResult<()> {
        (**self).close()
    }
}

impl<T: SearchBackend + ?Sized> SearchBackend for Box<T> {
    fn search_since(
        &self,
        index: &str,
        field: &str,
        since: Timestamp,
        from: usize,
        size: usize,
    ) -> StoreResult<Vec<SearchHit>> {
        (**self).search_since(index, field, since, from, size)
    }

    fn index_versioned(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: &Map<String, JsonValue>,
        version: i64,
    ) -> StoreResult<()> {
        (**self).index_versioned(index, doc_type, id, source, version)
    }

    fn refresh(&self, index: &str) -> StoreResult<()> {
        (**self).refresh(index)
    }

    fn close(&self) -> StoreResult<()> {
        (**self).close()
    }
}
