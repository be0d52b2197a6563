//! `sheet-loader` walks a directory tree and loads Excel workbooks into Postgres tables.
//!
//! Every directory that should be loaded carries a small configuration workbook
//! (`description.xlsx`) with `key`/`value` rows naming the parser, the target table and
//! column options for the files next to it.
//!
//! ## Pipeline
//!
//! 1. [`pipeline::Orchestrator`] finds configured directories and resolves their
//!    [`config::DirectoryConfig`].
//! 2. Candidate files are gated by [`tracker::VersionTracker`] against the `file_versions` ledger:
//!    a file is processed only when its modification time is newer than its latest successful
//!    load.
//! 3. A strategy from [`parsers::ParserRegistry`] (`excel` or `unpivot_excel`) turns the file into
//!    one or more [`types::DataSet`]s.
//! 4. Every row is tagged with `file_version_id`, column names go through
//!    [`normalize::normalize_column_name`] and [`store::BulkWriter`] loads the rows.
//! 5. The ledger row is marked successful only after the write committed.
//!
//! A failing file never stops its directory; a bad configuration or an unreachable database
//! skips the directory.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use sheet_loader::parsers::ParserRegistry;
//! use sheet_loader::pipeline::Orchestrator;
//! use sheet_loader::settings::Settings;
//! use sheet_loader::store::PgConnector;
//!
//! # async fn demo() {
//! let settings = Settings::from_env();
//! let orchestrator = Orchestrator::new(
//!     PgConnector::new(settings.postgres.clone()),
//!     ParserRegistry::with_builtin(),
//!     settings.ingest.clone(),
//! );
//! let summary = orchestrator.run(Path::new("/data/incoming")).await;
//! println!("{} files loaded", summary.loaded());
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: configuration artifact reading and typed directory configuration
//! - [`parsers`]: strategy registry and the built-in strategies
//! - [`store`]: ledger and sink traits, Postgres and in-memory backends
//! - [`ingestion`]: workbook reading and outcome observers
//! - [`types`]: in-memory tabular data
//! - [`error`]: error taxonomy

pub mod config;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod normalize;
pub mod parsers;
pub mod pipeline;
pub mod settings;
pub mod store;
pub mod tracker;
pub mod types;

pub use error::{IngestionError, IngestionResult};
