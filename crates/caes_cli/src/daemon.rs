//! Backend construction and the daemon commands.

use crate::config::{ConfigError, DaemonConfig, PrimaryBackend};
use crate::signal;
use caes_model::Timestamp;
use caes_primary::{ColumnStore, MemoryColumnStore, PrimaryAdapter};
use caes_secondary::{HttpSearchBackend, ReqwestClient, SecondaryAdapter};
use caes_sync_engine::{PassReport, PollLoop, SyncEngine, SystemClock};
use std::time::Duration;
use tracing::{info, warn};

/// Primary adapter over whichever column store the configuration picks.
pub type DaemonPrimary = PrimaryAdapter<Box<dyn ColumnStore>>;

/// Secondary adapter talking HTTP to the search cluster.
pub type DaemonSecondary = SecondaryAdapter<HttpSearchBackend<ReqwestClient>>;

/// The engine the daemon runs.
pub type DaemonEngine = SyncEngine<DaemonPrimary, DaemonSecondary>;

fn open_column_store(config: &DaemonConfig) -> Result<Box<dyn ColumnStore>, ConfigError> {
    match config.primary.backend {
        PrimaryBackend::Cassandra => open_cassandra(config),
        PrimaryBackend::Rocksdb => open_rocksdb(config),
        PrimaryBackend::Memory => {
            warn!("primary uses the in-memory backend, its data is lost on exit");
            Ok(Box::new(MemoryColumnStore::new()))
        }
    }
}

#[cfg(feature = "cassandra")]
fn open_cassandra(config: &DaemonConfig) -> Result<Box<dyn ColumnStore>, ConfigError> {
    let section = &config.primary;
    let keyspace = section
        .keyspace
        .as_ref()
        .ok_or_else(|| ConfigError::Invalid("primary.keyspace is required for the cassandra backend".into()))?;
    let mut cql = caes_primary::CassandraConfig::new(keyspace.clone())
        .with_nodes(section.nodes.iter().cloned())
        .with_id_column(section.id_field.clone())
        .with_timestamp_column(section.timestamp_field.clone())
        .with_connect_timeout(Duration::from_secs(section.connect_timeout_secs));
    if let Some(username) = &section.username {
        cql = cql.with_credentials(username.clone(), section.password.clone().unwrap_or_default());
    }
    let store = caes_primary::CassandraColumnStore::connect(&cql)
        .map_err(|e| ConfigError::BackendUnavailable(e.to_string()))?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "cassandra"))]
fn open_cassandra(_config: &DaemonConfig) -> Result<Box<dyn ColumnStore>, ConfigError> {
    Err(ConfigError::BackendUnavailable(
        "this binary was built without the cassandra feature".into(),
    ))
}

#[cfg(feature = "rocksdb")]
fn open_rocksdb(config: &DaemonConfig) -> Result<Box<dyn ColumnStore>, ConfigError> {
    let section = &config.primary;
    let path = section
        .path
        .as_ref()
        .ok_or_else(|| ConfigError::Invalid("primary.path is required for the rocksdb backend".into()))?;
    let tables = [section.index_table.as_str(), section.data_table.as_str()];
    let store = caes_primary::RocksColumnStore::open(path, &tables)
        .map_err(|e| ConfigError::BackendUnavailable(e.to_string()))?;
    info!(path = %path.display(), "opened RocksDB primary store");
    Ok(Box::new(store))
}

#[cfg(not(feature = "rocksdb"))]
fn open_rocksdb(_config: &DaemonConfig) -> Result<Box<dyn ColumnStore>, ConfigError> {
    Err(ConfigError::BackendUnavailable(
        "this binary was built without the rocksdb feature".into(),
    ))
}

fn open_search_backend(config: &DaemonConfig) -> Result<HttpSearchBackend<ReqwestClient>, ConfigError> {
    let section = &config.secondary;
    let mut client = ReqwestClient::new(Duration::from_secs(section.timeout_secs))
        .map_err(|e| ConfigError::BackendUnavailable(e.to_string()))?;
    if let Some(username) = &section.username {
        client = client.with_basic_auth(username.clone(), section.password.clone().unwrap_or_default());
    }
    Ok(HttpSearchBackend::new(section.url.clone(), client))
}

/// Validates the configuration and builds both adapters.
pub fn build_engine(config: &DaemonConfig) -> Result<DaemonEngine, ConfigError> {
    config.validate()?;
    let primary = PrimaryAdapter::new(config.primary_config(), open_column_store(config)?);
    let secondary = SecondaryAdapter::new(config.secondary_config(), open_search_backend(config)?);
    Ok(SyncEngine::new(primary, secondary))
}

/// Polls until SIGINT or SIGTERM, then closes both stores.
pub fn run(config: &DaemonConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate_for_run()?;
    let engine = build_engine(config)?;
    let mut poll = PollLoop::new(engine, config.poll_config(), SystemClock)?;
    signal::install(poll.stop_handle())?;
    let passes = poll.run()?;
    info!(passes, "daemon stopped");
    Ok(())
}

/// Runs a single pass from `since` and prints its report.
pub fn once(config: &DaemonConfig, since: Timestamp) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = build_engine(config)?;
    let report = engine.sync(since);
    engine.close();
    print_report(&report?);
    Ok(())
}

/// Validates the configuration without contacting any backend.
pub fn check(config: &DaemonConfig) -> Result<(), ConfigError> {
    config.validate()?;
    let primary = config.primary_config();
    let secondary = config.secondary_config();

    println!("Configuration OK");
    println!();
    println!("  Interval:        {}s", config.sync.interval_secs);
    println!("  Primary backend: {:?}", config.primary.backend);
    match config.primary.backend {
        PrimaryBackend::Cassandra => {
            println!("  Nodes:           {}", config.primary.nodes.join(", "));
            println!("  Keyspace:        {}", config.primary.keyspace.as_deref().unwrap_or(""));
        }
        PrimaryBackend::Rocksdb => {
            if let Some(path) = &config.primary.path {
                println!("  Path:            {}", path.display());
            }
        }
        PrimaryBackend::Memory => {}
    }
    println!("  Index table:     {}", primary.index_table);
    println!("  Data table:      {}", primary.data_table);
    println!("  Search URL:      {}", config.secondary.url);
    println!("  Search index:    {}", secondary.index);
    Ok(())
}

fn print_report(report: &PassReport) {
    println!("Sync pass since {}", report.since);
    println!();
    println!("  Read from primary:     {}", report.primary_read);
    println!("  Read from secondary:   {}", report.secondary_read);
    println!("  Echoes suppressed:     {}", report.echoes_suppressed);
    println!("  Superseded:            {}", report.superseded);
    if !report.complete {
        println!("  Deferred:              {} (a store could not be read in full)", report.deferred);
    }
    println!(
        "  Written to primary:    {} ({} failed)",
        report.to_primary.written, report.to_primary.failed
    );
    println!(
        "  Written to secondary:  {} ({} conflicts, {} failed)",
        report.to_secondary.written, report.to_secondary.conflicts, report.to_secondary.failed
    );
    println!("  Duration:              {:?}", report.duration);
}
