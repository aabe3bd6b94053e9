//! # caes testkit
//!
//! Test utilities for caes-sync.
//!
//! This crate provides:
//! - Fixtures wiring both adapters to shared in-memory stores
//! - Helpers that write to either store "from outside", the way an
//!   application would, and read back what a store holds
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use caes_testkit::prelude::*;
//!
//! let stores = TestStores::new();
//! let (primary, secondary) = stores.adapters();
//! stores.write_primary(id, 10, sample_payload());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
