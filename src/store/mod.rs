//! Persistence seams: the version ledger, target-table sinks and the bulk writer on top of them.
//!
//! A [`StoreConnector`] opens one [`VersionLedger`] and one [`TableSink`] per directory. The
//! Postgres backend lives in [`postgres`]; [`memory`] keeps everything in process for dry runs
//! and tests.

pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::debug;

use crate::config::DirectoryConfig;
use crate::error::{IngestionError, IngestionResult};
use crate::normalize::normalize_columns;
use crate::types::DataSet;

pub use memory::{MemoryLedger, MemorySink, MemoryStore};
pub use postgres::{PgConnector, PgLedger, PgSink};

/// Ledger row about to be inserted in the pending state.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFileVersion {
    pub file_path: String,
    pub modified_at: NaiveDateTime,
    pub config: serde_json::Value,
    /// `database.table` the file is loaded into.
    pub table_name: String,
}

/// A row of the `file_versions` ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct FileVersion {
    pub id: i64,
    pub file_path: String,
    pub modified_at: NaiveDateTime,
    pub config: serde_json::Value,
    pub table_name: String,
    pub success: bool,
}

/// `schema.table` a directory loads into. Both parts are validated identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetTable {
    pub schema: String,
    pub table: String,
}

impl TargetTable {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::new(config.schema.clone(), config.table_name.clone())
    }

    /// `"schema"."table"` for SQL text.
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Append-only record of file versions and their load outcome.
#[async_trait]
pub trait VersionLedger: Send {
    /// Latest `modified_at` among successful rows for `file_path`.
    async fn latest_success(&mut self, file_path: &str) -> IngestionResult<Option<NaiveDateTime>>;

    /// Insert a row with `success = false` and return its id.
    async fn insert_pending(&mut self, version: &NewFileVersion) -> IngestionResult<i64>;

    async fn mark_success(&mut self, id: i64) -> IngestionResult<()>;
}

/// Destination for prepared rows.
#[async_trait]
pub trait TableSink: Send {
    /// Write every data set into `target` as one unit and return the number of rows written.
    ///
    /// Column names are already normalized and data sets are non-empty.
    async fn load(&mut self, target: &TargetTable, parts: &[DataSet]) -> IngestionResult<u64>;
}

/// Opens the ledger and sink used for one directory.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Ledger: VersionLedger;
    type Sink: TableSink;

    /// Database a directory without `dbname` uses.
    fn default_database(&self) -> &str;

    /// Fails with [`IngestionError::ConnectionFailure`] when the database is unreachable.
    async fn connect(&self, config: &DirectoryConfig) -> IngestionResult<(Self::Ledger, Self::Sink)>;

    /// Close the handles returned by [`connect`](Self::connect) once the directory is done.
    async fn disconnect(&self, ledger: Self::Ledger, sink: Self::Sink) -> IngestionResult<()>;
}

/// Normalizes column names and hands non-empty results to a [`TableSink`].
#[derive(Debug)]
pub struct BulkWriter<S> {
    sink: S,
}

impl<S: TableSink> BulkWriter<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Write all sub-results of one file into `target`.
    ///
    /// Empty data sets are skipped. Two columns normalizing to the same name fail the whole
    /// write before anything reaches the sink.
    pub async fn write(&mut self, target: &TargetTable, parts: Vec<DataSet>) -> IngestionResult<u64> {
        let mut prepared = Vec::with_capacity(parts.len());
        for mut ds in parts {
            if ds.is_empty() {
                debug!(table = %target, "empty result, nothing to write");
                continue;
            }
            let names = normalize_columns(ds.schema.field_names()).map_err(|c| {
                IngestionError::WriteFailure {
                    table: target.to_string(),
                    message: format!(
                        "columns '{}' and '{}' both normalize to '{}'",
                        c.first, c.second, c.normalized
                    ),
                }
            })?;
            for (field, name) in ds.schema.fields.iter_mut().zip(names) {
                field.name = name;
            }
            prepared.push(ds);
        }

        if prepared.is_empty() {
            return Ok(0);
        }
        self.sink.load(target, &prepared).await
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Field, Schema, Value};

    fn sales(columns: &[&str]) -> DataSet {
        DataSet::new(
            Schema::new(columns.iter().map(|c| Field::new(*c, DataType::Int64)).collect()),
            vec![columns.iter().map(|_| Value::Int64(1)).collect()],
        )
    }

    #[tokio::test]
    async fn normalizes_before_loading() {
        let store = MemoryStore::new();
        let mut writer = BulkWriter::new(store.sink());
        let target = TargetTable::new("excel", "sales");

        let written = writer
            .write(&target, vec![sales(&["Сумма", "Order ID"]), DataSet::default()])
            .await
            .unwrap();

        assert_eq!(written, 1);
        let loaded = store.table(&target);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].column_names(), vec!["summa", "order_id"]);
    }

    #[tokio::test]
    async fn collisions_fail_the_write() {
        let store = MemoryStore::new();
        let mut writer = BulkWriter::new(store.sink());
        let target = TargetTable::new("excel", "sales");

        let err = writer
            .write(&target, vec![sales(&["Order ID", "order_id"])])
            .await
            .unwrap_err();

        assert!(matches!(err, IngestionError::WriteFailure { .. }));
        assert!(err.to_string().contains("Order ID"));
        assert!(store.table(&target).is_empty());
    }

    #[test]
    fn quoting() {
        let t = TargetTable::new("excel", "sa\"les");
        assert_eq!(t.to_string(), "excel.sa\"les");
        assert_eq!(t.quoted(), "\"excel\".\"sa\"\"les\"");
    }
}
