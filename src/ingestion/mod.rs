//! Workbook reading and outcome reporting shared by the pipeline.
//!
//! - [`excel`] opens workbooks and turns worksheets into typed [`crate::types::DataSet`]s.
//! - [`observability`] reports per-file and per-directory outcomes to [`IngestionObserver`]s.

pub mod excel;
pub mod observability;

pub use excel::{open_workbook, SheetReadOptions, Workbook};
pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats,
    TracingObserver,
};
