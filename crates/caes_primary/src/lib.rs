//! # caes primary
//!
//! The column-family side of caes-sync.
//!
//! The primary store keeps two tables:
//! - a data table holding one row per record id
//! - a time-ordered index table mapping `(partition, timestamp)` to a record id,
//!   used to answer "what changed since T" without scanning the data table
//!
//! Both are written in one atomic batch so the index never points at a row
//! that is not there. The store has no version check: whichever write lands
//! last wins.
//!
//! ## Available Backends
//!
//! - `CassandraColumnStore` - A Cassandra or ScyllaDB cluster over CQL, the
//!   store other applications write to (requires the `cassandra` feature)
//! - `RocksColumnStore` - Embedded RocksDB, one column family per table
//!   (requires the `rocksdb` feature)
//! - [`MemoryColumnStore`] - For testing

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
#[cfg(feature = "cassandra")]
mod cassandra;
mod config;
mod memory;
#[cfg(feature = "rocksdb")]
mod rocks;
mod store;

pub use adapter::PrimaryAdapter;
#[cfg(feature = "cassandra")]
pub use cassandra::{CassandraColumnStore, CassandraConfig};
pub use config::PrimaryConfig;
pub use memory::MemoryColumnStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksColumnStore;
pub use store::{ColumnBatch, ColumnStore, Mutation, TimeseriesEntry, INDEX_PARTITION};
