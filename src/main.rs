//! sheet-loader - load directories of Excel workbooks into Postgres

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use sheet_loader::config::DEFAULT_CONFIG_FILE_NAME;
use sheet_loader::ingestion::{CompositeObserver, FileObserver, IngestionObserver, TracingObserver};
use sheet_loader::logging::{init_logging, LogConfig, LogLevel};
use sheet_loader::parsers::ParserRegistry;
use sheet_loader::pipeline::{Orchestrator, RunSummary};
use sheet_loader::settings::{IngestOptions, Settings, DEFAULT_MAX_FILES_PER_DIRECTORY};
use sheet_loader::store::{MemoryStore, PgConnector, StoreConnector};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "sheet-loader")]
#[command(author, version, about = "Load directories of Excel workbooks into Postgres")]
struct Cli {
    /// Directory to scan; every sub-directory holding the configuration file is processed
    path: PathBuf,

    /// Files loaded per directory in one run
    #[arg(long, env = "INGEST_MAX_FILES", default_value_t = DEFAULT_MAX_FILES_PER_DIRECTORY)]
    max_files: usize,

    /// Name of the per-directory configuration workbook
    #[arg(long, default_value = DEFAULT_CONFIG_FILE_NAME)]
    config_file: String,

    /// Parse and report without writing to Postgres
    #[arg(long)]
    dry_run: bool,

    /// Append one line per outcome to this file
    #[arg(long, value_name = "FILE")]
    event_log: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut settings = Settings::from_env();

    let mut log_config = LogConfig::from_env()?;
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    init_logging(&log_config)?;

    if !cli.path.is_dir() {
        error!(path = %cli.path.display(), "path does not exist or is not a directory");
        return Ok(ExitCode::FAILURE);
    }

    settings.ingest = IngestOptions {
        config_file_name: cli.config_file.clone(),
        max_files_per_directory: cli.max_files,
    };

    let mut observers: Vec<Arc<dyn IngestionObserver>> = vec![Arc::new(TracingObserver)];
    if let Some(path) = &cli.event_log {
        observers.push(Arc::new(FileObserver::new(path)));
    }
    let observer: Arc<dyn IngestionObserver> = Arc::new(CompositeObserver::new(observers));

    let summary = if cli.dry_run {
        info!("dry run, nothing is written to Postgres");
        run(MemoryStore::new(), &cli, &settings, observer).await
    } else {
        run(PgConnector::new(settings.postgres.clone()), &cli, &settings, observer).await
    };

    info!(
        directories = summary.directories.len(),
        loaded = summary.loaded(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "done"
    );
    Ok(ExitCode::SUCCESS)
}

async fn run<C: StoreConnector>(
    connector: C,
    cli: &Cli,
    settings: &Settings,
    observer: Arc<dyn IngestionObserver>,
) -> RunSummary {
    Orchestrator::new(connector, ParserRegistry::with_builtin(), settings.ingest.clone())
        .with_observer(observer)
        .run(&cli.path)
        .await
}
