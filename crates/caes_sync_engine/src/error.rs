//! Error types for the sync engine.

use crate::state::SyncState;
use caes_model::Timestamp;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while driving the sync engine.
///
/// Backend failures never show up here: adapters contain them.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Invalid engine or loop configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The engine cannot start a pass in its current state.
    #[error("cannot start a pass while {state:?}")]
    InvalidState {
        /// Current state.
        state: SyncState,
    },

    /// An attempt to move the watermark backwards.
    #[error("watermark regression: {attempted} is before {current}")]
    WatermarkRegression {
        /// Current watermark.
        current: Timestamp,
        /// Rejected value.
        attempted: Timestamp,
    },
}
