//! Error types for store backends.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors a store backend can report.
///
/// Adapters contain these: a failed query becomes an empty result and a failed
/// write skips a single record. Only construction-time failures reach the
/// caller.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend did not answer in time.
    #[error("backend timed out: {0}")]
    Timeout(String),

    /// The backend is temporarily unreachable or overloaded.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the request as malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The store already holds a version at least as new as the one written.
    #[error("version conflict for {id}: version {attempted} is not newer than the stored one")]
    VersionConflict {
        /// Id of the rejected document.
        id: String,
        /// Version the write carried.
        attempted: i64,
    },

    /// Stored bytes or a response body could not be decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// A failure injected by an in-memory store.
    #[error("injected failure: {0}")]
    Injected(String),
}

impl StoreError {
    /// Returns true for timeouts and temporary unavailability.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Unavailable(_))
    }

    /// Returns true if this is an optimistic-versioning rejection.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(StoreError::Timeout("read".into()).is_transient());
        assert!(StoreError::Unavailable("503".into()).is_transient());
        assert!(!StoreError::InvalidRequest("bad".into()).is_transient());
        assert!(!StoreError::Closed.is_transient());

        let conflict = StoreError::VersionConflict {
            id: "d".into(),
            attempted: 3,
        };
        assert!(conflict.is_version_conflict());
        assert!(!conflict.is_transient());
    }

    #[test]
    fn display() {
        let err = StoreError::VersionConflict {
            id: "doc-1".into(),
            attempted: 10,
        };
        assert!(err.to_string().contains("doc-1"));
        assert!(err.to_string().contains("10"));
        assert_eq!(StoreError::Closed.to_string(), "store is closed");
    }
}
