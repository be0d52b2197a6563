//! Tree walk and per-directory driver.
//!
//! For every directory holding a configuration artifact: resolve the configuration, open the
//! store, then take each candidate file through
//! `is_newer → insert_pending → parse → tag with file_version_id → write → mark_success`.
//! A failing file is reported and the next one runs; configuration and connection failures skip
//! the whole directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};
use walkdir::WalkDir;

use crate::config::{resolve_directory_config, DirectoryConfig};
use crate::error::{IngestionError, IngestionResult};
use crate::ingestion::observability::{
    IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats, TracingObserver,
};
use crate::parsers::{strategy_for, ParserRegistry};
use crate::settings::IngestOptions;
use crate::store::{BulkWriter, StoreConnector, TableSink, TargetTable, VersionLedger};
use crate::tracker::VersionTracker;
use crate::types::{DataType, Field, Value};

/// Column added to every written row, pointing at its ledger entry.
pub const FILE_VERSION_COLUMN: &str = "file_version_id";

/// Outcome of one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryReport {
    pub directory: PathBuf,
    pub loaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Rows written across all loaded files.
    pub rows: usize,
    /// Set when the directory was abandoned before (or while) processing files.
    pub failure: Option<String>,
    /// Candidates left untouched because the per-directory cap was reached.
    pub deferred: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub directories: Vec<DirectoryReport>,
}

impl RunSummary {
    pub fn loaded(&self) -> usize {
        self.directories.iter().map(|d| d.loaded).sum()
    }

    pub fn skipped(&self) -> usize {
        self.directories.iter().map(|d| d.skipped).sum()
    }

    pub fn failed(&self) -> usize {
        self.directories.iter().map(|d| d.failed).sum()
    }

    pub fn failed_directories(&self) -> usize {
        self.directories.iter().filter(|d| d.failure.is_some()).count()
    }
}

/// Every directory under `root` (itself included) that holds `config_file_name`, sorted.
pub fn find_configured_directories(root: &Path, config_file_name: &str) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "cannot walk entry, skipping");
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .filter(|dir| dir.join(config_file_name).is_file())
        .collect()
}

/// Regular files of `dir` other than the configuration artifact that pass the `FileName` glob,
/// sorted by name.
pub fn candidate_files(
    dir: &Path,
    config_file_name: &str,
    config: &DirectoryConfig,
) -> IngestionResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            warn!(file = %entry.path().display(), "non UTF-8 file name, skipping");
            continue;
        };
        if name == config_file_name || !config.accepts_file_name(name) {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files)
}

/// Drives ingestion for a tree against one [`StoreConnector`].
pub struct Orchestrator<C> {
    connector: C,
    registry: ParserRegistry,
    options: IngestOptions,
    observer: Arc<dyn IngestionObserver>,
    alert_at: IngestionSeverity,
}

impl<C> std::fmt::Debug for Orchestrator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("alert_at", &self.alert_at)
            .finish_non_exhaustive()
    }
}

impl<C: StoreConnector> Orchestrator<C> {
    pub fn new(connector: C, registry: ParserRegistry, options: IngestOptions) -> Self {
        Self {
            connector,
            registry,
            options,
            observer: Arc::new(TracingObserver),
            alert_at: IngestionSeverity::Critical,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn IngestionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Failures at or above `severity` are also raised through `on_alert`.
    pub fn with_alert_threshold(mut self, severity: IngestionSeverity) -> Self {
        self.alert_at = severity;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Process every configured directory under `root`, one after the other.
    pub async fn run(&self, root: &Path) -> RunSummary {
        let directories = find_configured_directories(root, &self.options.config_file_name);
        if directories.is_empty() {
            info!(
                root = %root.display(),
                config_file = %self.options.config_file_name,
                "no configured directories found"
            );
            return RunSummary::default();
        }
        info!(root = %root.display(), directories = directories.len(), "starting run");

        let mut summary = RunSummary::default();
        for dir in directories {
            let span = info_span!("directory", path = %dir.display());
            let report = self.process_directory(&dir).instrument(span).await;
            summary.directories.push(report);
        }

        info!(
            loaded = summary.loaded(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            failed_directories = summary.failed_directories(),
            "run finished"
        );
        summary
    }

    /// Process the files of one configured directory.
    pub async fn process_directory(&self, dir: &Path) -> DirectoryReport {
        let mut report = DirectoryReport {
            directory: dir.to_path_buf(),
            ..DirectoryReport::default()
        };

        let prepared = async {
            let config = resolve_directory_config(dir, &self.options.config_file_name)?;
            // Checked up front so an unknown parser or unusable strategy options skip the
            // directory before any ledger row is written.
            self.registry.validate(&config)?;
            let files = candidate_files(dir, &self.options.config_file_name, &config)?;
            let (ledger, sink) = self.connector.connect(&config).await?;
            Ok::<_, IngestionError>((config, files, ledger, sink))
        };
        let (config, files, ledger, sink) = match prepared.await {
            Ok(parts) => parts,
            Err(e) => {
                self.report_failure(&IngestionContext::directory(dir), &e);
                report.failure = Some(e.to_string());
                return report;
            }
        };

        let mut tracker = VersionTracker::new(ledger, self.connector.default_database());
        let mut writer = BulkWriter::new(sink);
        let target = TargetTable::from_config(&config);
        debug!(parser = %config.parser_name, table = %target, candidates = files.len(), "directory ready");

        for (idx, path) in files.iter().enumerate() {
            if report.loaded >= self.options.max_files_per_directory {
                report.deferred = files.len() - idx;
                warn!(
                    limit = self.options.max_files_per_directory,
                    deferred = report.deferred,
                    "file limit reached, remaining files wait for the next run"
                );
                break;
            }

            let ctx = IngestionContext::file(dir, path, &config.parser_name);
            match self
                .process_file(path, &config, &target, &mut tracker, &mut writer)
                .await
            {
                Ok(Some(stats)) => {
                    report.loaded += 1;
                    report.rows += stats.rows;
                    self.observer.on_success(&ctx, stats);
                }
                Ok(None) => {
                    report.skipped += 1;
                    self.observer.on_skip(&ctx);
                }
                Err(e) if e.is_directory_fatal() => {
                    report.failed += 1;
                    self.report_failure(&ctx, &e);
                    report.failure = Some(e.to_string());
                    warn!(error = %e, "abandoning the remaining files of the directory");
                    break;
                }
                Err(e) => {
                    report.failed += 1;
                    self.report_failure(&ctx, &e);
                }
            }
        }

        if let Err(e) = self
            .connector
            .disconnect(tracker.into_inner(), writer.into_inner())
            .await
        {
            warn!(error = %e, "closing database connections failed");
        }
        report
    }

    /// `Ok(None)` when the file is unchanged since its last successful load.
    async fn process_file<L, S>(
        &self,
        path: &Path,
        config: &DirectoryConfig,
        target: &TargetTable,
        tracker: &mut VersionTracker<L>,
        writer: &mut BulkWriter<S>,
    ) -> IngestionResult<Option<IngestionStats>>
    where
        L: VersionLedger,
        S: TableSink,
    {
        if !tracker.is_newer(path).await? {
            return Ok(None);
        }

        let version_id = tracker.insert_pending(path, config).await?;

        let output = strategy_for(&self.registry, &config.parser_name, path, config)?.parse()?;
        debug!(file = %path.display(), version_id, rows = output.total_rows(), "parsed");
        let mut parts = output.into_datasets();
        for ds in &mut parts {
            ds.fill_column(
                Field::new(FILE_VERSION_COLUMN, DataType::Int64),
                Value::Int64(version_id),
            );
        }

        let rows = writer.write(target, parts).await?;
        tracker.mark_success(version_id).await?;

        Ok(Some(IngestionStats {
            rows: usize::try_from(rows).unwrap_or(usize::MAX),
            version_id,
        }))
    }

    fn report_failure(&self, ctx: &IngestionContext, error: &IngestionError) {
        let severity = error.severity();
        if severity >= self.alert_at {
            self.observer.on_alert(ctx, severity, error);
        } else {
            self.observer.on_failure(ctx, severity, error);
        }
    }
}
