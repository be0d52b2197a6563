//! In-process backend used by `--dry-run` and the test suite.
//!
//! Every handle shares one state, so a test can keep the [`MemoryStore`] and inspect what the
//! pipeline wrote through the ledger and sink it handed out.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::config::DirectoryConfig;
use crate::error::{IngestionError, IngestionResult};
use crate::types::DataSet;

use super::{FileVersion, NewFileVersion, StoreConnector, TableSink, TargetTable, VersionLedger};

const MEMORY_DATABASE: &str = "memory";

#[derive(Debug, Default)]
struct State {
    versions: Vec<FileVersion>,
    tables: BTreeMap<TargetTable, Vec<DataSet>>,
    failing: BTreeSet<TargetTable>,
    unreachable: bool,
    connects: usize,
    disconnects: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `connect` always fails, like a database that is down.
    pub fn unreachable() -> Self {
        let store = Self::new();
        store.lock().unreachable = true;
        store
    }

    /// Make every later load into `target` fail.
    pub fn fail_writes_to(&self, target: TargetTable) {
        self.lock().failing.insert(target);
    }

    pub fn ledger(&self) -> MemoryLedger {
        MemoryLedger {
            state: Arc::clone(&self.state),
        }
    }

    pub fn sink(&self) -> MemorySink {
        MemorySink {
            state: Arc::clone(&self.state),
        }
    }

    /// Snapshot of the ledger, in insertion order.
    pub fn versions(&self) -> Vec<FileVersion> {
        self.lock().versions.clone()
    }

    /// Every data set loaded into `target`, in load order.
    pub fn table(&self, target: &TargetTable) -> Vec<DataSet> {
        self.lock().tables.get(target).cloned().unwrap_or_default()
    }

    pub fn row_count(&self, target: &TargetTable) -> usize {
        self.lock()
            .tables
            .get(target)
            .map(|parts| parts.iter().map(DataSet::row_count).sum())
            .unwrap_or(0)
    }

    /// Number of successful `connect` calls so far.
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    /// Number of `disconnect` calls so far.
    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl StoreConnector for MemoryStore {
    type Ledger = MemoryLedger;
    type Sink = MemorySink;

    fn default_database(&self) -> &str {
        MEMORY_DATABASE
    }

    async fn connect(&self, config: &DirectoryConfig) -> IngestionResult<(MemoryLedger, MemorySink)> {
        let mut state = self.lock();
        if state.unreachable {
            return Err(IngestionError::ConnectionFailure {
                database: config
                    .database_name
                    .clone()
                    .unwrap_or_else(|| MEMORY_DATABASE.to_string()),
                message: "connection refused".to_string(),
            });
        }
        state.connects += 1;
        drop(state);
        Ok((self.ledger(), self.sink()))
    }

    async fn disconnect(&self, _ledger: MemoryLedger, _sink: MemorySink) -> IngestionResult<()> {
        self.lock().disconnects += 1;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryLedger {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl VersionLedger for MemoryLedger {
    async fn latest_success(&mut self, file_path: &str) -> IngestionResult<Option<NaiveDateTime>> {
        Ok(lock(&self.state)
            .versions
            .iter()
            .filter(|v| v.success && v.file_path == file_path)
            .map(|v| v.modified_at)
            .max())
    }

    async fn insert_pending(&mut self, version: &NewFileVersion) -> IngestionResult<i64> {
        let mut state = lock(&self.state);
        let id = state.versions.len() as i64 + 1;
        state.versions.push(FileVersion {
            id,
            file_path: version.file_path.clone(),
            modified_at: version.modified_at,
            config: version.config.clone(),
            table_name: version.table_name.clone(),
            success: false,
        });
        Ok(id)
    }

    async fn mark_success(&mut self, id: i64) -> IngestionResult<()> {
        let mut state = lock(&self.state);
        if let Some(row) = state.versions.iter_mut().find(|v| v.id == id) {
            row.success = true;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MemorySink {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl TableSink for MemorySink {
    async fn load(&mut self, target: &TargetTable, parts: &[DataSet]) -> IngestionResult<u64> {
        let mut state = lock(&self.state);
        if state.failing.contains(target) {
            return Err(IngestionError::WriteFailure {
                table: target.to_string(),
                message: "rejected by the in-memory store".to_string(),
            });
        }
        let rows: usize = parts.iter().map(DataSet::row_count).sum();
        state
            .tables
            .entry(target.clone())
            .or_default()
            .extend(parts.iter().cloned());
        Ok(rows as u64)
    }
}
