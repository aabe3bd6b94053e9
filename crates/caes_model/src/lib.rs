//! # caes model
//!
//! Shared types for the caes-sync reconciliation engine.
//!
//! This crate provides:
//! - The record model ([`RecordId`], [`Timestamp`], [`Value`], [`Payload`], [`Record`])
//! - The prepared-entry sentinel handed from read side to write side ([`PreparedRecord`])
//! - Field projection ([`Projection`])
//! - Per-adapter echo suppression ([`EchoSuppressionSet`])
//! - The [`StoreAdapter`] contract both backends implement
//!
//! ## Key Invariants
//!
//! - A record's `id` is the join key across both stores
//! - Projection is a pure, idempotent function of configuration
//! - An echo-suppression set only ever holds the pairs of the most recent write batch
//! - A `None` payload means "do not write this anywhere", never an error

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod echo;
mod error;
mod id;
mod projection;
mod record;
mod value;

pub use adapter::StoreAdapter;
pub use echo::EchoSuppressionSet;
pub use error::{StoreError, StoreResult};
pub use id::RecordId;
pub use projection::Projection;
pub use record::{PreparedRecord, Record, Timestamp, WriteSummary};
pub use value::{payload_from_json, payload_of, payload_to_json, Payload, Value};
