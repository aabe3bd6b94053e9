//! Configuration for the secondary adapter.

use caes_model::Projection;

/// Configuration of a [`crate::SecondaryAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryConfig {
    /// Index the documents live in.
    pub index: String,
    /// Document type name used on writes.
    pub doc_type: String,
    /// Document field carrying the record timestamp.
    pub timestamp_field: String,
    /// Number of hits fetched per search request.
    pub page_size: usize,
    /// Fields allowed to cross to the primary store.
    pub projection: Projection,
}

impl SecondaryConfig {
    /// Creates a configuration for the given index.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: "_doc".into(),
            timestamp_field: "timestamp".into(),
            page_size: 100,
            projection: Projection::All,
        }
    }

    /// Sets the document type name.
    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = doc_type.into();
        self
    }

    /// Sets the timestamp field name.
    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    /// Sets the search page size. Zero is raised to one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the outgoing field projection.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self::new("caes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SecondaryConfig::new("test");
        assert_eq!(config.index, "test");
        assert_eq!(config.doc_type, "_doc");
        assert_eq!(config.timestamp_field, "timestamp");
        assert_eq!(config.page_size, 100);
        assert_eq!(config.projection, Projection::All);
    }

    #[test]
    fn page_size_is_at_least_one() {
        assert_eq!(SecondaryConfig::default().with_page_size(0).page_size, 1);
    }
}
