//! # caes sync engine
//!
//! Keeps a column-family store (the *primary*) and a document-search store
//! (the *secondary*) converged.
//!
//! One reconciliation pass, [`SyncEngine::sync`], goes:
//! 1. flush both adapters
//! 2. read and prepare everything changed since the watermark on both sides
//! 3. write secondary changes into the primary
//! 4. write primary changes into the secondary
//!
//! The [`PollLoop`] calls `sync` on an interval and owns the watermark.
//!
//! ## Key Invariants
//!
//! - Secondary→primary is always written before primary→secondary
//! - Equal timestamps converge to the value that originated on the secondary
//! - A pair an adapter wrote in its last batch is never copied back to the
//!   other store
//! - Passes never overlap; every backend call is blocking
//! - Nothing is written into the primary in a pass that could not read the
//!   primary in full
//! - The watermark never moves backwards, holds after an incomplete pass and
//!   is not persisted

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod engine;
mod error;
mod poll;
mod state;

pub use clock::{Clock, ManualClock, SystemClock, Watermark};
pub use config::PollConfig;
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use poll::PollLoop;
pub use state::{PassReport, SyncState, SyncStats};
