use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::IngestionError;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (operation failed).
    Error,
    /// Critical error (typically I/O or database connectivity).
    Critical,
}

/// Where an event happened.
///
/// `file` is `None` for directory-level events (configuration or connection failures).
#[derive(Debug, Clone)]
pub struct IngestionContext {
    pub directory: PathBuf,
    pub file: Option<PathBuf>,
    pub parser: Option<String>,
}

impl IngestionContext {
    pub fn directory(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            file: None,
            parser: None,
        }
    }

    pub fn file(directory: impl AsRef<Path>, file: impl AsRef<Path>, parser: &str) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            file: Some(file.as_ref().to_path_buf()),
            parser: Some(parser.to_string()),
        }
    }

    fn subject(&self) -> String {
        match &self.file {
            Some(file) => file.display().to_string(),
            None => self.directory.display().to_string(),
        }
    }
}

/// Stats reported for a successfully loaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Rows written across all sub-results of the file.
    pub rows: usize,
    /// Ledger row that was marked successful.
    pub version_id: i64,
}

/// Observer interface for ingestion outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called when a file was written and marked successful.
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    /// Called when a file is unchanged since its last successful load.
    fn on_skip(&self, _ctx: &IngestionContext) {}

    /// Called when a file or a whole directory fails.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &IngestionError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_skip(&self, ctx: &IngestionContext) {
        for o in &self.observers {
            o.on_skip(ctx);
        }
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Reports outcomes through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        info!(
            file = %ctx.subject(),
            parser = ctx.parser.as_deref().unwrap_or_default(),
            rows = stats.rows,
            version_id = stats.version_id,
            "file loaded"
        );
    }

    fn on_skip(&self, ctx: &IngestionContext) {
        info!(file = %ctx.subject(), "unchanged since last successful load, skipping");
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        if ctx.file.is_some() {
            error!(file = %ctx.subject(), ?severity, error = %error, "file failed");
        } else {
            error!(directory = %ctx.subject(), ?severity, error = %error, "directory skipped");
        }
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.on_failure(ctx, severity, error);
        warn!(target: "sheet_loader::alert", subject = %ctx.subject(), ?severity, error = %error, "ALERT");
    }
}

/// Appends ingestion events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.append_line(&format!(
            "{} ok path={} rows={} version_id={}",
            Utc::now().to_rfc3339(),
            ctx.subject(),
            stats.rows,
            stats.version_id
        ));
    }

    fn on_skip(&self, ctx: &IngestionContext) {
        self.append_line(&format!("{} skip path={}", Utc::now().to_rfc3339(), ctx.subject()));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append_line(&format!(
            "{} fail severity={:?} path={} err={}",
            Utc::now().to_rfc3339(),
            severity,
            ctx.subject(),
            error
        ));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append_line(&format!(
            "{} ALERT severity={:?} path={} err={}",
            Utc::now().to_rfc3339(),
            severity,
            ctx.subject(),
            error
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_observer_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("events.log");
        let obs = FileObserver::new(&log);
        let ctx = IngestionContext::file(dir.path(), dir.path().join("data_1.xlsx"), "excel");

        obs.on_success(&ctx, IngestionStats { rows: 3, version_id: 9 });
        obs.on_skip(&ctx);
        obs.on_failure(
            &ctx,
            IngestionSeverity::Error,
            &IngestionError::NoValueColumns { columns: vec!["id".into()] },
        );

        let text = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("ok") && lines[0].contains("rows=3"));
        assert!(lines[1].contains("skip"));
        assert!(lines[2].contains("severity=Error"));
    }
}
