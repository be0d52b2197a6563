//! Change detection against the `file_versions` ledger.

use std::fs;
use std::path::Path;

use chrono::{DateTime, DurationRound, NaiveDateTime, TimeDelta, Utc};
use tracing::debug;

use crate::config::DirectoryConfig;
use crate::error::IngestionResult;
use crate::store::{NewFileVersion, VersionLedger};

/// Gates files on their modification time and records each load attempt.
#[derive(Debug)]
pub struct VersionTracker<L> {
    ledger: L,
    default_database: String,
}

impl<L: VersionLedger> VersionTracker<L> {
    pub fn new(ledger: L, default_database: impl Into<String>) -> Self {
        Self {
            ledger,
            default_database: default_database.into(),
        }
    }

    /// Whether `path` changed since its latest successful load. Pending and failed attempts are
    /// ignored, so a file that never loaded is always newer.
    pub async fn is_newer(&mut self, path: &Path) -> IngestionResult<bool> {
        let key = ledger_key(path)?;
        let modified_at = file_modified_at(path)?;
        let newer = match self.ledger.latest_success(&key).await? {
            Some(latest) => modified_at > latest,
            None => true,
        };
        debug!(file = %key, %modified_at, newer, "version check");
        Ok(newer)
    }

    /// Record a pending attempt for `path` and return its ledger id.
    pub async fn insert_pending(&mut self, path: &Path, config: &DirectoryConfig) -> IngestionResult<i64> {
        let version = NewFileVersion {
            file_path: ledger_key(path)?,
            modified_at: file_modified_at(path)?,
            config: config.to_json(),
            table_name: config.qualified_table(&self.default_database),
        };
        self.ledger.insert_pending(&version).await
    }

    pub async fn mark_success(&mut self, id: i64) -> IngestionResult<()> {
        self.ledger.mark_success(id).await
    }

    pub fn into_inner(self) -> L {
        self.ledger
    }
}

/// Absolute path string a file is tracked under.
pub fn ledger_key(path: &Path) -> IngestionResult<String> {
    Ok(std::path::absolute(path)?.display().to_string())
}

/// File modification time in UTC, truncated to whole microseconds (the ledger's precision).
pub fn file_modified_at(path: &Path) -> IngestionResult<NaiveDateTime> {
    let modified: DateTime<Utc> = fs::metadata(path)?.modified()?.into();
    let truncated = modified
        .duration_trunc(TimeDelta::microseconds(1))
        .unwrap_or(modified);
    Ok(truncated.naive_utc())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::config::ConfigValue;
    use crate::store::MemoryStore;

    fn config() -> DirectoryConfig {
        let options: BTreeMap<String, ConfigValue> = [("parser", "excel"), ("TableName", "sales")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), ConfigValue::decode(k, v)))
            .collect();
        DirectoryConfig::from_options(options).unwrap()
    }

    fn touch(path: &Path, at: SystemTime) {
        File::options().write(true).open(path).unwrap().set_modified(at).unwrap();
    }

    #[tokio::test]
    async fn only_successful_rows_count() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data_1.xlsx");
        std::fs::write(&file, b"x").unwrap();

        let store = MemoryStore::new();
        let mut tracker = VersionTracker::new(store.ledger(), "postgres");

        assert!(tracker.is_newer(&file).await.unwrap());
        let id = tracker.insert_pending(&file, &config()).await.unwrap();
        // A pending attempt does not satisfy the check.
        assert!(tracker.is_newer(&file).await.unwrap());

        tracker.mark_success(id).await.unwrap();
        assert!(!tracker.is_newer(&file).await.unwrap());

        let versions = store.versions();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].table_name, "postgres.sales");
        assert_eq!(versions[0].config["TableName"], "sales");
        assert!(versions[0].success);
    }

    #[tokio::test]
    async fn newer_mtime_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data_1.xlsx");
        std::fs::write(&file, b"x").unwrap();
        let start = SystemTime::now() - Duration::from_secs(3600);
        touch(&file, start);

        let store = MemoryStore::new();
        let mut tracker = VersionTracker::new(store.ledger(), "postgres");
        let id = tracker.insert_pending(&file, &config()).await.unwrap();
        tracker.mark_success(id).await.unwrap();
        assert!(!tracker.is_newer(&file).await.unwrap());

        touch(&file, start + Duration::from_secs(60));
        assert!(tracker.is_newer(&file).await.unwrap());
    }

    #[test]
    fn mtime_has_microsecond_precision() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.xlsx");
        std::fs::write(&file, b"x").unwrap();
        let at = file_modified_at(&file).unwrap();
        assert_eq!(at.and_utc().timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = file_modified_at(Path::new("/definitely/not/here.xlsx")).unwrap_err();
        assert!(matches!(err, crate::error::IngestionError::Io(_)));
    }
}
