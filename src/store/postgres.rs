//! Postgres backend over plain `sqlx` connections.
//!
//! Each directory gets two connections to its database: one for the `file_versions` ledger and
//! one for loading target tables. Target tables must already exist; only the ledger is created.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgConnection, Postgres};
use sqlx::{Connection, QueryBuilder};
use tracing::{debug, info, warn};

use crate::config::DirectoryConfig;
use crate::error::{IngestionError, IngestionResult};
use crate::settings::PgSettings;
use crate::types::{DataSet, DataType};

use super::{quote_ident, NewFileVersion, StoreConnector, TableSink, TargetTable, VersionLedger};

const CREATE_LEDGER: &str = "CREATE TABLE IF NOT EXISTS file_versions (
    id SERIAL PRIMARY KEY,
    file_path TEXT NOT NULL,
    modified_at TIMESTAMP NOT NULL,
    config JSONB,
    table_name TEXT,
    success BOOLEAN DEFAULT FALSE
)";

/// Postgres accepts at most this many bind parameters per statement.
const BIND_LIMIT: usize = 65_535;
const MAX_BATCH_ROWS: usize = 1_000;

/// Written for NULL cells in the COPY stream.
const NULL_MARKER: &str = r"\N";

#[derive(Debug, Clone)]
pub struct PgConnector {
    settings: PgSettings,
}

impl PgConnector {
    pub fn new(settings: PgSettings) -> Self {
        Self { settings }
    }

    async fn open(&self, database: &str) -> IngestionResult<PgConnection> {
        PgConnection::connect_with(&self.settings.connect_options(database))
            .await
            .map_err(|e| IngestionError::ConnectionFailure {
                database: database.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    type Ledger = PgLedger;
    type Sink = PgSink;

    fn default_database(&self) -> &str {
        &self.settings.default_database
    }

    async fn connect(&self, config: &DirectoryConfig) -> IngestionResult<(PgLedger, PgSink)> {
        let database = config
            .database_name
            .as_deref()
            .unwrap_or(&self.settings.default_database);

        let mut ledger_conn = self.open(database).await?;
        sqlx::query(CREATE_LEDGER)
            .execute(&mut ledger_conn)
            .await
            .map_err(|e| IngestionError::ConnectionFailure {
                database: database.to_string(),
                message: format!("cannot prepare file_versions: {e}"),
            })?;
        let sink_conn = self.open(database).await?;

        debug!(database, host = %self.settings.host, "connected");
        Ok((PgLedger { conn: ledger_conn }, PgSink { conn: sink_conn }))
    }

    async fn disconnect(&self, ledger: PgLedger, sink: PgSink) -> IngestionResult<()> {
        let ledger_closed = ledger.conn.close().await;
        let sink_closed = sink.conn.close().await;
        ledger_closed.and(sink_closed)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct PgLedger {
    conn: PgConnection,
}

#[async_trait]
impl VersionLedger for PgLedger {
    async fn latest_success(&mut self, file_path: &str) -> IngestionResult<Option<NaiveDateTime>> {
        let latest = sqlx::query_scalar::<_, Option<NaiveDateTime>>(
            "SELECT MAX(modified_at) FROM file_versions WHERE file_path = $1 AND success",
        )
        .bind(file_path)
        .fetch_one(&mut self.conn)
        .await?;
        Ok(latest)
    }

    async fn insert_pending(&mut self, version: &NewFileVersion) -> IngestionResult<i64> {
        let id = sqlx::query_scalar::<_, i32>(
            "INSERT INTO file_versions (file_path, modified_at, config, table_name, success)
             VALUES ($1, $2, $3, $4, FALSE)
             RETURNING id",
        )
        .bind(&version.file_path)
        .bind(version.modified_at)
        .bind(&version.config)
        .bind(&version.table_name)
        .fetch_one(&mut self.conn)
        .await?;
        Ok(i64::from(id))
    }

    async fn mark_success(&mut self, id: i64) -> IngestionResult<()> {
        let id = i32::try_from(id).map_err(|_| {
            IngestionError::Database(sqlx::Error::Protocol(format!("ledger id {id} out of range")))
        })?;
        sqlx::query("UPDATE file_versions SET success = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct PgSink {
    conn: PgConnection,
}

#[async_trait]
impl TableSink for PgSink {
    /// One transaction per call. Each data set is tried with COPY inside a savepoint; a failed
    /// COPY is rolled back to the savepoint and the same rows go in with batched INSERTs.
    async fn load(&mut self, target: &TargetTable, parts: &[DataSet]) -> IngestionResult<u64> {
        let mut tx = self.conn.begin().await?;
        let mut written = 0;
        for ds in parts {
            written += load_one(&mut tx, target, ds).await?;
        }
        tx.commit().await?;
        info!(table = %target, rows = written, "rows committed");
        Ok(written)
    }
}

async fn load_one(conn: &mut PgConnection, target: &TargetTable, ds: &DataSet) -> IngestionResult<u64> {
    let columns = ds
        .schema
        .fields
        .iter()
        .map(|f| quote_ident(&f.name))
        .collect::<Vec<_>>()
        .join(", ");
    let write_failure = |message: String| IngestionError::WriteFailure {
        table: target.to_string(),
        message,
    };

    let payload = encode_csv(ds).map_err(|e| write_failure(format!("cannot encode rows: {e}")))?;
    let statement = format!(
        "COPY {} ({columns}) FROM STDIN WITH (FORMAT csv, NULL '{NULL_MARKER}')",
        target.quoted()
    );

    let mut savepoint = conn.begin().await?;
    match copy_in(&mut savepoint, &statement, payload).await {
        Ok(rows) => {
            savepoint.commit().await?;
            debug!(table = %target, rows, "copied");
            return Ok(rows);
        }
        Err(e) => {
            savepoint.rollback().await?;
            warn!(table = %target, error = %e, "COPY failed, falling back to batched INSERT");
        }
    }

    insert_batches(conn, target, &columns, ds)
        .await
        .map_err(|e| write_failure(e.to_string()))
}

async fn copy_in(conn: &mut PgConnection, statement: &str, payload: Vec<u8>) -> Result<u64, sqlx::Error> {
    let mut copy = conn.copy_in_raw(statement).await?;
    let sent = copy.send(payload).await.map(|_| ());
    if let Err(e) = sent {
        copy.abort(e.to_string()).await.ok();
        return Err(e);
    }
    copy.finish().await
}

fn encode_csv(ds: &DataSet) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for row in &ds.rows {
        writer.write_record(
            row.iter()
                .map(|v| v.render().unwrap_or_else(|| NULL_MARKER.to_string())),
        )?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

async fn insert_batches(
    conn: &mut PgConnection,
    target: &TargetTable,
    columns: &str,
    ds: &DataSet,
) -> Result<u64, sqlx::Error> {
    let per_batch = rows_per_batch(ds.schema.fields.len());
    let mut written = 0;

    for chunk in ds.rows.chunks(per_batch) {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} ({columns}) ", target.quoted()));
        builder.push_values(chunk, |mut b, row| {
            for (value, field) in row.iter().zip(&ds.schema.fields) {
                match field.data_type {
                    DataType::Int64 => b.push_bind(value.as_i64()),
                    DataType::Float64 => b.push_bind(value.as_f64()),
                    DataType::Bool => b.push_bind(value.as_bool()),
                    DataType::Timestamp => b.push_bind(value.as_timestamp()),
                    DataType::Utf8 => b.push_bind(value.render()),
                };
            }
        });
        written += builder.build().execute(&mut *conn).await?.rows_affected();
    }
    debug!(table = %target, rows = written, batch = per_batch, "inserted");
    Ok(written)
}

/// Rows per INSERT so that `rows * columns` stays within [`BIND_LIMIT`].
fn rows_per_batch(columns: usize) -> usize {
    (BIND_LIMIT / columns.max(1)).clamp(1, MAX_BATCH_ROWS)
}
