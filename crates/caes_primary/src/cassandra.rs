//! Cassandra-backed column store, spoken to over CQL.
//!
//! Expected schema (table and column names are configurable):
//!
//! ```text
//! CREATE TABLE ts   (id int, timestamp bigint, did uuid,
//!                    PRIMARY KEY (id, timestamp, did));
//! CREATE TABLE data (did uuid PRIMARY KEY, ...);
//! ```
//!
//! Data columns map onto `boolean`, `bigint`, `double`, `text`, `list<..>`
//! and `map<text, ..>`. Other column types are read back as text.
//!
//! The driver is async; every call blocks on a runtime owned by the store.

use crate::store::{ColumnBatch, ColumnStore, Mutation, TimeseriesEntry};
use caes_model::{Payload, RecordId, StoreError, StoreResult, Timestamp, Value};
use parking_lot::RwLock;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::statement::batch::{Batch, BatchType};
use scylla::value::{CqlValue, Row};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::info;
use uuid::Uuid;

/// Connection and schema settings for [`CassandraColumnStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct CassandraConfig {
    /// Contact points, `host:port`.
    pub nodes: Vec<String>,
    /// Keyspace holding both tables.
    pub keyspace: String,
    /// Partition column of the index table.
    pub partition_column: String,
    /// Clustering timestamp column of the index table.
    pub timestamp_column: String,
    /// Record id column, in the index table and as data table key.
    pub id_column: String,
    /// Optional username and password.
    pub credentials: Option<(String, String)>,
    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl CassandraConfig {
    /// Creates a configuration for `keyspace` on a local node.
    pub fn new(keyspace: impl Into<String>) -> Self {
        Self {
            nodes: vec!["127.0.0.1:9042".into()],
            keyspace: keyspace.into(),
            partition_column: "id".into(),
            timestamp_column: "timestamp".into(),
            id_column: "did".into(),
            credentials: None,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the contact points.
    pub fn with_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the record id column.
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    /// Sets the index timestamp column.
    pub fn with_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.timestamp_column = column.into();
        self
    }

    /// Sets username and password.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Checks that every name can be spliced into a statement.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty node list or a bad identifier.
    pub fn validate(&self) -> StoreResult<()> {
        if self.nodes.is_empty() {
            return Err(StoreError::InvalidRequest("no contact points".into()));
        }
        for name in [
            &self.keyspace,
            &self.partition_column,
            &self.timestamp_column,
            &self.id_column,
        ] {
            identifier(name)?;
        }
        Ok(())
    }
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`, the unquoted CQL identifier syntax.
fn identifier(name: &str) -> StoreResult<&str> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidRequest(format!("{name:?} is not a valid CQL identifier")))
    }
}

/// CQL text of the statements the store issues.
#[derive(Debug, Clone)]
struct Statements {
    partition: String,
    timestamp: String,
    id: String,
}

impl Statements {
    fn new(config: &CassandraConfig) -> Self {
        Self {
            partition: config.partition_column.clone(),
            timestamp: config.timestamp_column.clone(),
            id: config.id_column.clone(),
        }
    }

    fn scan(&self, table: &str) -> StoreResult<String> {
        Ok(format!(
            "SELECT {p}, {ts}, {id} FROM {table} WHERE {p} = ? AND {ts} >= ?",
            p = self.partition,
            ts = self.timestamp,
            id = self.id,
            table = identifier(table)?,
        ))
    }

    fn get_row(&self, table: &str) -> StoreResult<String> {
        Ok(format!(
            "SELECT * FROM {} WHERE {} = ?",
            identifier(table)?,
            self.id
        ))
    }

    fn index_insert(&self, table: &str, ttl: Option<Duration>) -> StoreResult<String> {
        let mut cql = format!(
            "INSERT INTO {} ({}, {}, {}) VALUES (?, ?, ?)",
            identifier(table)?,
            self.partition,
            self.timestamp,
            self.id
        );
        if let Some(ttl) = ttl {
            cql.push_str(&format!(" USING TTL {}", ttl.as_secs().max(1)));
        }
        Ok(cql)
    }

    /// Upsert of the given columns; the id column is the key and never set
    /// from the payload.
    fn row_insert(&self, table: &str, id: &RecordId, columns: &Payload) -> StoreResult<(String, Vec<Option<CqlValue>>)> {
        let mut names = vec![self.id.as_str()];
        let mut values = vec![Some(CqlValue::Uuid(id.to_uuid()))];
        for (name, value) in columns.iter().filter(|(name, _)| **name != self.id) {
            names.push(identifier(name)?);
            values.push(to_cql(value)?);
        }
        let marks = vec!["?"; names.len()].join(", ");
        let cql = format!(
            "INSERT INTO {} ({}) VALUES ({marks})",
            identifier(table)?,
            names.join(", ")
        );
        Ok((cql, values))
    }
}

/// Top-level column value; `None` binds CQL null.
fn to_cql(value: &Value) -> StoreResult<Option<CqlValue>> {
    match value {
        Value::Null => Ok(None),
        other => to_cql_element(other).map(Some),
    }
}

fn to_cql_element(value: &Value) -> StoreResult<CqlValue> {
    Ok(match value {
        Value::Null => {
            return Err(StoreError::InvalidRequest(
                "collections cannot hold null".into(),
            ))
        }
        Value::Bool(b) => CqlValue::Boolean(*b),
        Value::Integer(i) => CqlValue::BigInt(*i),
        Value::Float(f) => CqlValue::Double(*f),
        Value::Text(s) => CqlValue::Text(s.clone()),
        Value::List(items) => {
            CqlValue::List(items.iter().map(to_cql_element).collect::<StoreResult<_>>()?)
        }
        Value::Map(map) => CqlValue::Map(
            map.iter()
                .map(|(k, v)| Ok((CqlValue::Text(k.clone()), to_cql_element(v)?)))
                .collect::<StoreResult<_>>()?,
        ),
    })
}

fn from_cql(value: CqlValue) -> Value {
    match value {
        CqlValue::Empty => Value::Null,
        CqlValue::Boolean(b) => Value::Bool(b),
        CqlValue::TinyInt(i) => Value::Integer(i64::from(i)),
        CqlValue::SmallInt(i) => Value::Integer(i64::from(i)),
        CqlValue::Int(i) => Value::Integer(i64::from(i)),
        CqlValue::BigInt(i) => Value::Integer(i),
        CqlValue::Timestamp(ts) => Value::Integer(ts.0),
        CqlValue::Float(f) => Value::Float(f64::from(f)),
        CqlValue::Double(f) => Value::Float(f),
        CqlValue::Text(s) | CqlValue::Ascii(s) => Value::Text(s),
        CqlValue::Uuid(u) => Value::Text(u.to_string()),
        CqlValue::List(items) | CqlValue::Set(items) => {
            Value::List(items.into_iter().map(from_cql).collect())
        }
        CqlValue::Map(pairs) => Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (map_key(from_cql(k)), from_cql(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
        other => Value::Text(format!("{other:?}")),
    }
}

fn map_key(key: Value) -> String {
    match key {
        Value::Text(s) => s,
        other => other.to_json().to_string(),
    }
}

fn unavailable(e: impl Display) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn codec(e: impl Display) -> StoreError {
    StoreError::Codec(e.to_string())
}

/// A column store living in a Cassandra (or ScyllaDB) cluster.
///
/// The index entry and the data row of one batch go out as a single logged
/// batch, so the cluster applies both or neither. Index TTL is the native
/// `USING TTL`; expired entries simply stop showing up in scans.
pub struct CassandraColumnStore {
    runtime: Runtime,
    session: RwLock<Option<Arc<Session>>>,
    statements: Statements,
    keyspace: String,
}

impl CassandraColumnStore {
    /// Connects to the cluster and switches to the configured keyspace.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a bad configuration and `Unavailable`
    /// if no node can be reached.
    pub fn connect(config: &CassandraConfig) -> StoreResult<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("caes-cql")
            .enable_all()
            .build()
            .map_err(unavailable)?;

        let mut builder = SessionBuilder::new()
            .known_nodes(&config.nodes)
            .use_keyspace(&config.keyspace, false)
            .connection_timeout(config.connect_timeout);
        if let Some((username, password)) = &config.credentials {
            builder = builder.user(username, password);
        }
        let session = runtime.block_on(builder.build()).map_err(unavailable)?;
        info!(nodes = ?config.nodes, keyspace = %config.keyspace, "connected to primary cluster");

        Ok(Self {
            runtime,
            session: RwLock::new(Some(Arc::new(session))),
            statements: Statements::new(config),
            keyspace: config.keyspace.clone(),
        })
    }

    fn session(&self) -> StoreResult<Arc<Session>> {
        self.session.read().clone().ok_or(StoreError::Closed)
    }
}

impl std::fmt::Debug for CassandraColumnStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CassandraColumnStore")
            .field("keyspace", &self.keyspace)
            .field("open", &self.session.read().is_some())
            .finish()
    }
}

impl ColumnStore for CassandraColumnStore {
    fn scan_index(
        &self,
        table: &str,
        partition: i32,
        since: Timestamp,
    ) -> StoreResult<Vec<TimeseriesEntry>> {
        let session = self.session()?;
        let cql = self.statements.scan(table)?;
        let result = self
            .runtime
            .block_on(session.query_unpaged(cql, (partition, since)))
            .map_err(unavailable)?;

        let rows = result.into_rows_result().map_err(codec)?;
        let mut entries = Vec::new();
        for row in rows.rows::<(i32, i64, Uuid)>().map_err(codec)? {
            let (partition, timestamp, id) = row.map_err(codec)?;
            entries.push(TimeseriesEntry {
                partition,
                timestamp,
                id: RecordId::from(id),
            });
        }
        entries.sort();
        Ok(entries)
    }

    fn get_row(&self, table: &str, id: &RecordId) -> StoreResult<Option<Payload>> {
        let session = self.session()?;
        let cql = self.statements.get_row(table)?;
        let result = self
            .runtime
            .block_on(session.query_unpaged(cql, (id.to_uuid(),)))
            .map_err(unavailable)?;

        let rows = result.into_rows_result().map_err(codec)?;
        let names: Vec<String> = rows
            .column_specs()
            .iter()
            .map(|spec| spec.name().to_string())
            .collect();
        let Some(row) = rows.rows::<Row>().map_err(codec)?.next() else {
            return Ok(None);
        };

        let row = row.map_err(codec)?;
        let payload = names
            .into_iter()
            .zip(row.columns)
            .map(|(name, value)| (name, value.map_or(Value::Null, from_cql)))
            .collect();
        Ok(Some(payload))
    }

    fn apply_batch(&self, batch: &ColumnBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let session = self.session()?;

        let mut statements = Batch::new(BatchType::Logged);
        let mut values: Vec<Vec<Option<CqlValue>>> = Vec::with_capacity(batch.len());
        for mutation in batch.mutations() {
            match mutation {
                Mutation::UpsertIndex { table, entry, ttl } => {
                    statements.append_statement(self.statements.index_insert(table, *ttl)?.as_str());
                    values.push(vec![
                        Some(CqlValue::Int(entry.partition)),
                        Some(CqlValue::BigInt(entry.timestamp)),
                        Some(CqlValue::Uuid(entry.id.to_uuid())),
                    ]);
                }
                Mutation::UpsertRow { table, id, columns } => {
                    let (cql, row) = self.statements.row_insert(table, id, columns)?;
                    statements.append_statement(cql.as_str());
                    values.push(row);
                }
            }
        }

        self.runtime
            .block_on(session.batch(&statements, values))
            .map_err(unavailable)?;
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let _guard = self.runtime.enter();
        self.session.write().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caes_model::payload_of;

    fn statements() -> Statements {
        Statements::new(&CassandraConfig::new("caes"))
    }

    #[test]
    fn identifiers_are_checked() {
        assert!(identifier("ts").is_ok());
        assert!(identifier("_data_2").is_ok());
        assert!(identifier("").is_err());
        assert!(identifier("2data").is_err());
        assert!(identifier("data; DROP TABLE ts").is_err());
        assert!(identifier("with-dash").is_err());
    }

    #[test]
    fn config_validation() {
        assert!(CassandraConfig::new("caes").validate().is_ok());
        assert!(CassandraConfig::new("bad keyspace").validate().is_err());
        let no_nodes = CassandraConfig::new("caes").with_nodes(Vec::<String>::new());
        assert!(no_nodes.validate().is_err());
    }

    #[test]
    fn scan_filters_partition_and_lower_bound() {
        assert_eq!(
            statements().scan("ts").unwrap(),
            "SELECT id, timestamp, did FROM ts WHERE id = ? AND timestamp >= ?"
        );
        assert!(statements().scan("t s").is_err());
    }

    #[test]
    fn index_insert_carries_ttl() {
        let s = statements();
        assert_eq!(
            s.index_insert("ts", None).unwrap(),
            "INSERT INTO ts (id, timestamp, did) VALUES (?, ?, ?)"
        );
        assert!(s
            .index_insert("ts", Some(Duration::from_secs(3600)))
            .unwrap()
            .ends_with(" USING TTL 3600"));
        assert!(s
            .index_insert("ts", Some(Duration::from_millis(1)))
            .unwrap()
            .ends_with(" USING TTL 1"));
    }

    #[test]
    fn row_insert_keys_by_id_and_skips_id_column() {
        let id = RecordId::new();
        let columns = payload_of([
            ("did", Value::from(id.to_string())),
            ("vint", Value::from(1)),
            ("vstring", Value::from("Hi")),
        ]);

        let (cql, values) = statements().row_insert("data", &id, &columns).unwrap();
        assert_eq!(cql, "INSERT INTO data (did, vint, vstring) VALUES (?, ?, ?)");
        assert_eq!(
            values,
            [
                Some(CqlValue::Uuid(id.to_uuid())),
                Some(CqlValue::BigInt(1)),
                Some(CqlValue::Text("Hi".into())),
            ]
        );
    }

    #[test]
    fn row_insert_rejects_bad_column_names() {
        let columns = payload_of([("no such", 1)]);
        let result = statements().row_insert("data", &RecordId::new(), &columns);
        assert!(matches!(result, Err(StoreError::InvalidRequest(_))));
    }

    #[test]
    fn values_cross_both_ways() {
        let nested = Value::Map(BTreeMap::from([(
            "tags".to_string(),
            Value::List(vec![Value::from("a"), Value::from("b")]),
        )]));
        for value in [
            Value::Bool(true),
            Value::Integer(-4),
            Value::Float(1.5),
            Value::Text("x".into()),
            nested,
        ] {
            let cql = to_cql(&value).unwrap().unwrap();
            assert_eq!(from_cql(cql), value);
        }
        assert_eq!(to_cql(&Value::Null).unwrap(), None);
    }

    #[test]
    fn null_inside_collection_is_rejected() {
        let list = Value::List(vec![Value::Null]);
        assert!(matches!(to_cql(&list), Err(StoreError::InvalidRequest(_))));
    }

    #[test]
    fn narrower_cql_types_widen() {
        assert_eq!(from_cql(CqlValue::Int(7)), Value::Integer(7));
        assert_eq!(from_cql(CqlValue::SmallInt(-2)), Value::Integer(-2));
        assert_eq!(from_cql(CqlValue::Float(0.5)), Value::Float(0.5));
        assert_eq!(from_cql(CqlValue::Ascii("a".into())), Value::Text("a".into()));
        assert_eq!(
            from_cql(CqlValue::Set(vec![CqlValue::Int(1)])),
            Value::List(vec![Value::Integer(1)])
        );
        let id = Uuid::new_v4();
        assert_eq!(from_cql(CqlValue::Uuid(id)), Value::Text(id.to_string()));
    }
}
