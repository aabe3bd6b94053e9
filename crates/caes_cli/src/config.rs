//! Daemon configuration file.
//!
//! ```toml
//! [sync]
//! interval_secs = 10
//!
//! [primary]
//! backend = "cassandra"
//! nodes = ["10.0.0.1:9042", "10.0.0.2:9042"]
//! keyspace = "caes"
//! data_table = "data"
//! exclude = ["secret"]
//!
//! [secondary]
//! url = "http://localhost:9200"
//! index = "test"
//! ```

use caes_model::Projection;
use caes_primary::PrimaryConfig;
use caes_secondary::SecondaryConfig;
use caes_sync_engine::PollConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors raised before the poll loop starts. All of them are fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the schema.
    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A backend could not be set up.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Root configuration, parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Polling settings.
    #[serde(default)]
    pub sync: SyncSection,
    /// Column store settings.
    pub primary: PrimarySection,
    /// Search store settings.
    pub secondary: SecondarySection,
}

/// `[sync]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSection {
    /// Seconds between passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

/// Which column store backs the primary adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryBackend {
    /// Cassandra or ScyllaDB cluster over CQL.
    Cassandra,
    /// Embedded RocksDB.
    Rocksdb,
    /// Process-local store, lost on exit. Nothing outside the daemon can
    /// write to it, so `run` refuses it.
    Memory,
}

/// `[primary]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrimarySection {
    /// Backend kind.
    #[serde(default = "default_primary_backend")]
    pub backend: PrimaryBackend,
    /// Data directory for the RocksDB backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Contact points of the Cassandra backend.
    #[serde(default = "default_nodes")]
    pub nodes: Vec<String>,
    /// Keyspace of the Cassandra backend.
    #[serde(default)]
    pub keyspace: Option<String>,
    /// Cassandra user.
    #[serde(default)]
    pub username: Option<String>,
    /// Cassandra password.
    #[serde(default)]
    pub password: Option<String>,
    /// Cassandra connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Data table name.
    pub data_table: String,
    /// Index table name.
    #[serde(default = "default_index_table")]
    pub index_table: String,
    /// Id column name.
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Timestamp field name.
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    /// TTL of written index entries, in seconds.
    #[serde(default)]
    pub write_ttl_secs: Option<u64>,
    /// Only these fields cross to the secondary.
    #[serde(default)]
    pub include: Option<Vec<String>>,
    /// These fields never cross to the secondary.
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
}

/// `[secondary]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecondarySection {
    /// Base URL of the search cluster.
    pub url: String,
    /// Index name.
    pub index: String,
    /// Document type name.
    #[serde(default = "default_doc_type")]
    pub doc_type: String,
    /// Timestamp field name.
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    /// Hits per search request.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Basic authentication user.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic authentication password.
    #[serde(default)]
    pub password: Option<String>,
    /// Only these fields cross to the primary.
    #[serde(default)]
    pub include: Option<Vec<String>>,
    /// These fields never cross to the primary.
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
}

fn default_interval_secs() -> u64 {
    10
}

fn default_primary_backend() -> PrimaryBackend {
    PrimaryBackend::Cassandra
}

fn default_nodes() -> Vec<String> {
    vec!["127.0.0.1:9042".into()]
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_index_table() -> String {
    "ts".into()
}

fn default_id_field() -> String {
    "did".into()
}

fn default_timestamp_field() -> String {
    "timestamp".into()
}

fn default_doc_type() -> String {
    "_doc".into()
}

fn default_page_size() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn projection(section: &str, include: &Option<Vec<String>>, exclude: &Option<Vec<String>>) -> Projection {
    if include.is_some() && exclude.is_some() {
        warn!(section, "both include and exclude are set, the include list wins");
    }
    Projection::new(include.clone(), exclude.clone())
}

fn require(value: &str, name: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{name} must not be empty")));
    }
    Ok(())
}

impl DaemonConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Checks every value before any backend is contacted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.interval_secs == 0 {
            return Err(ConfigError::Invalid("sync.interval_secs must be positive".into()));
        }

        let primary = &self.primary;
        require(&primary.data_table, "primary.data_table")?;
        require(&primary.index_table, "primary.index_table")?;
        require(&primary.id_field, "primary.id_field")?;
        require(&primary.timestamp_field, "primary.timestamp_field")?;
        if primary.data_table == primary.index_table {
            return Err(ConfigError::Invalid(
                "primary.data_table and primary.index_table must differ".into(),
            ));
        }
        if primary.write_ttl_secs == Some(0) {
            return Err(ConfigError::Invalid("primary.write_ttl_secs must be positive".into()));
        }
        match primary.backend {
            PrimaryBackend::Rocksdb if primary.path.is_none() => {
                return Err(ConfigError::Invalid(
                    "primary.path is required for the rocksdb backend".into(),
                ));
            }
            PrimaryBackend::Cassandra => {
                require(primary.keyspace.as_deref().unwrap_or(""), "primary.keyspace")?;
                if primary.nodes.is_empty() {
                    return Err(ConfigError::Invalid("primary.nodes must not be empty".into()));
                }
                if primary.connect_timeout_secs == 0 {
                    return Err(ConfigError::Invalid(
                        "primary.connect_timeout_secs must be positive".into(),
                    ));
                }
                if primary.password.is_some() && primary.username.is_none() {
                    return Err(ConfigError::Invalid(
                        "primary.password is set without primary.username".into(),
                    ));
                }
            }
            _ => {}
        }

        let secondary = &self.secondary;
        require(&secondary.index, "secondary.index")?;
        require(&secondary.doc_type, "secondary.doc_type")?;
        require(&secondary.timestamp_field, "secondary.timestamp_field")?;
        if !(secondary.url.starts_with("http://") || secondary.url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "secondary.url must be an http(s) URL, got {:?}",
                secondary.url
            )));
        }
        if secondary.page_size == 0 {
            return Err(ConfigError::Invalid("secondary.page_size must be positive".into()));
        }
        if secondary.timeout_secs == 0 {
            return Err(ConfigError::Invalid("secondary.timeout_secs must be positive".into()));
        }
        if secondary.password.is_some() && secondary.username.is_none() {
            return Err(ConfigError::Invalid(
                "secondary.password is set without secondary.username".into(),
            ));
        }

        Ok(())
    }

    /// [`DaemonConfig::validate`], plus the checks that only matter for a
    /// long-running daemon.
    pub fn validate_for_run(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.primary.backend == PrimaryBackend::Memory {
            return Err(ConfigError::Invalid(
                "the memory primary backend cannot be written by anything but the daemon, \
                 use cassandra or rocksdb to run"
                    .into(),
            ));
        }
        Ok(())
    }

    /// Polling settings for the engine loop.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig::new(Duration::from_secs(self.sync.interval_secs))
    }

    /// Settings for the primary adapter.
    pub fn primary_config(&self) -> PrimaryConfig {
        let section = &self.primary;
        let mut config = PrimaryConfig::new(section.data_table.clone())
            .with_index_table(section.index_table.clone())
            .with_id_field(section.id_field.clone())
            .with_timestamp_field(section.timestamp_field.clone())
            .with_projection(projection("primary", &section.include, &section.exclude));
        if let Some(ttl) = section.write_ttl_secs {
            config = config.with_write_ttl(Duration::from_secs(ttl));
        }
        config
    }

    /// Settings for the secondary adapter.
    pub fn secondary_config(&self) -> SecondaryConfig {
        let section = &self.secondary;
        SecondaryConfig::new(section.index.clone())
            .with_doc_type(section.doc_type.clone())
            .with_timestamp_field(section.timestamp_field.clone())
            .with_page_size(section.page_size)
            .with_projection(projection("secondary", &section.include, &section.exclude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
        [primary]
        keyspace = "caes"
        data_table = "data"

        [secondary]
        url = "http://localhost:9200"
        index = "test"
    "#;

    #[test]
    fn minimal_file_gets_defaults() {
        let config = DaemonConfig::parse(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.sync.interval_secs, 10);
        assert_eq!(config.primary.backend, PrimaryBackend::Cassandra);
        assert_eq!(config.primary.nodes, ["127.0.0.1:9042"]);
        assert_eq!(config.primary.connect_timeout_secs, 5);

        let primary = config.primary_config();
        assert_eq!(primary.index_table, "ts");
        assert_eq!(primary.id_field, "did");
        assert_eq!(primary.write_ttl, None);

        let secondary = config.secondary_config();
        assert_eq!(secondary.doc_type, "_doc");
        assert_eq!(secondary.page_size, 100);
        assert_eq!(config.secondary.timeout_secs, 30);

        assert_eq!(config.poll_config().interval, Duration::from_secs(10));
    }

    #[test]
    fn full_file() {
        let config = DaemonConfig::parse(
            r#"
            [sync]
            interval_secs = 5

            [primary]
            backend = "rocksdb"
            path = "/var/lib/caes"
            data_table = "data2"
            index_table = "ts2"
            write_ttl_secs = 3600
            exclude = ["secret"]

            [secondary]
            url = "https://search:9200"
            index = "test"
            doc_type = "doc"
            page_size = 50
            username = "elastic"
            password = "changeme"
            include = ["a", "b"]
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        let primary = config.primary_config();
        assert_eq!(primary.write_ttl, Some(Duration::from_secs(3600)));
        assert!(!primary.projection.allows("secret"));

        let secondary = config.secondary_config();
        assert_eq!(secondary.projection, Projection::include(["a", "b"]));
        assert_eq!(secondary.page_size, 50);
    }

    #[test]
    fn include_wins_over_exclude() {
        let mut config = DaemonConfig::parse(MINIMAL).unwrap();
        config.primary.include = Some(vec!["a".into()]);
        config.primary.exclude = Some(vec!["a".into()]);

        assert!(config.validate().is_ok());
        assert!(config.primary_config().projection.allows("a"));
        assert!(!config.primary_config().projection.allows("b"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases: [fn(&mut DaemonConfig); 10] = [
            |c: &mut DaemonConfig| c.sync.interval_secs = 0,
            |c: &mut DaemonConfig| c.primary.keyspace = None,
            |c: &mut DaemonConfig| c.primary.nodes.clear(),
            |c: &mut DaemonConfig| c.primary.connect_timeout_secs = 0,
            |c: &mut DaemonConfig| c.primary.password = Some("x".into()),
            |c: &mut DaemonConfig| c.primary.data_table = " ".into(),
            |c: &mut DaemonConfig| c.primary.index_table = "data".into(),
            |c: &mut DaemonConfig| c.primary.backend = PrimaryBackend::Rocksdb,
            |c: &mut DaemonConfig| c.secondary.url = "localhost:9200".into(),
            |c: &mut DaemonConfig| c.secondary.page_size = 0,
        ];

        for mutate in cases {
            let mut config = DaemonConfig::parse(MINIMAL).unwrap();
            mutate(&mut config);
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn memory_backend_is_refused_for_run_only() {
        let mut config = DaemonConfig::parse(MINIMAL).unwrap();
        config.primary.backend = PrimaryBackend::Memory;
        config.primary.keyspace = None;

        assert!(config.validate().is_ok());
        assert!(matches!(config.validate_for_run(), Err(ConfigError::Invalid(_))));

        config.primary.backend = PrimaryBackend::Rocksdb;
        config.primary.path = Some("/var/lib/caes".into());
        assert!(config.validate_for_run().is_ok());
    }

    #[test]
    fn cassandra_settings_parse() {
        let config = DaemonConfig::parse(
            r#"
            [primary]
            backend = "cassandra"
            nodes = ["10.0.0.1:9042", "10.0.0.2:9042"]
            keyspace = "caes"
            username = "cassandra"
            password = "secret"
            data_table = "data"

            [secondary]
            url = "http://localhost:9200"
            index = "test"
            "#,
        )
        .unwrap();
        config.validate_for_run().unwrap();
        assert_eq!(config.primary.nodes.len(), 2);
        assert_eq!(config.primary.keyspace.as_deref(), Some("caes"));
    }

    #[test]
    fn unknown_keys_and_missing_tables_fail_to_parse() {
        assert!(matches!(
            DaemonConfig::parse("[primary]\ndata_table = \"d\"\n"),
            Err(ConfigError::Parse(_))
        ));
        let with_typo = format!("{MINIMAL}\n[sync]\ninterval = 3\n");
        assert!(matches!(
            DaemonConfig::parse(&with_typo),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = DaemonConfig::load(file.path()).unwrap();
        assert_eq!(config.secondary.index, "test");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DaemonConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
