//! # caes secondary
//!
//! The document-search side of caes-sync.
//!
//! Documents are indexed with an *external* version equal to the record
//! timestamp. The search store accepts a write only when that version is
//! strictly greater than the one it already holds, which makes it the place
//! where last-write-wins is actually enforced.
//!
//! ## Key Invariants
//!
//! - A document's stored version is the timestamp of the record it holds
//! - Writes become searchable after a refresh, which is what `flush` issues
//! - A version conflict drops one record; it never aborts a batch
//!
//! ## Available Backends
//!
//! - [`MemorySearchStore`] - For testing
//! - [`HttpSearchBackend`] - The search store's REST API over an [`HttpClient`]

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod backend;
mod config;
mod http;
mod memory;

pub use adapter::{Document, SecondaryAdapter};
pub use backend::{SearchBackend, SearchHit};
pub use config::SecondaryConfig;
pub use http::{HttpClient, HttpResponse, HttpSearchBackend, Method, ReqwestClient};
pub use memory::MemorySearchStore;
