//! Configuration for the primary adapter.

use caes_model::Projection;
use std::time::Duration;

/// Configuration of a [`crate::PrimaryAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryConfig {
    /// Name of the time-ordered index table.
    pub index_table: String,
    /// Name of the data table.
    pub data_table: String,
    /// Column holding the record id in the data table.
    pub id_field: String,
    /// Field carrying the timestamp, stripped from outgoing payloads.
    pub timestamp_field: String,
    /// Time to live of index entries written by the adapter.
    pub write_ttl: Option<Duration>,
    /// Fields allowed to cross to the secondary store.
    pub projection: Projection,
}

impl PrimaryConfig {
    /// Creates a configuration for the given data table.
    pub fn new(data_table: impl Into<String>) -> Self {
        Self {
            index_table: "ts".into(),
            data_table: data_table.into(),
            id_field: "did".into(),
            timestamp_field: "timestamp".into(),
            write_ttl: None,
            projection: Projection::All,
        }
    }

    /// Sets the index table name.
    pub fn with_index_table(mut self, table: impl Into<String>) -> Self {
        self.index_table = table.into();
        self
    }

    /// Sets the id column name.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Sets the timestamp field name.
    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    /// Sets the time to live of written index entries.
    pub fn with_write_ttl(mut self, ttl: Duration) -> Self {
        self.write_ttl = Some(ttl);
        self
    }

    /// Sets the outgoing field projection.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self::new("data")
    }
}
