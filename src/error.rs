use std::path::PathBuf;

use thiserror::Error;

use crate::ingestion::observability::IngestionSeverity;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Error type returned across the ingestion pipeline.
///
/// Variants fall into two scopes (see [`IngestionError::is_directory_fatal`]): configuration and
/// connection failures stop the current directory, everything else only stops the current file.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Workbook could not be opened or a sheet could not be read.
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// Ledger or target table statement failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The directory has no configuration artifact.
    #[error("configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// The configuration artifact is present but unusable.
    #[error("invalid configuration: {message}")]
    ConfigInvalid { message: String },

    /// The configured parser name is not registered.
    #[error("parser '{name}' not found, available: {known:?}")]
    ParserNotFound { name: String, known: Vec<String> },

    /// The ledger or target database is unreachable.
    #[error("cannot connect to database '{database}': {message}")]
    ConnectionFailure { database: String, message: String },

    /// Requested sheet(s) are absent from the workbook.
    #[error("sheet(s) {requested:?} not found, available: {available:?}")]
    MissingSheet {
        requested: Vec<String>,
        available: Vec<String>,
    },

    /// Configured columns are absent from the parsed data.
    #[error("missing columns {missing:?}, available: {available:?}")]
    MissingColumns {
        missing: Vec<String>,
        available: Vec<String>,
    },

    /// No `YYYYMM`-style period columns were found to unpivot.
    #[error("no period columns (6 digits, e.g. 202301) found to unpivot, columns: {columns:?}")]
    NoValueColumns { columns: Vec<String> },

    /// Writing to the target table failed.
    #[error("write to {table} failed: {message}")]
    WriteFailure { table: String, message: String },
}

impl IngestionError {
    pub(crate) fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    /// Whether this error aborts the remaining files of a directory.
    pub fn is_directory_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigInvalid { .. }
                | Self::ParserNotFound { .. }
                | Self::ConnectionFailure { .. }
        )
    }

    /// Severity used by observers and alert thresholds.
    pub fn severity(&self) -> IngestionSeverity {
        match self {
            Self::Io(_) | Self::ConnectionFailure { .. } => IngestionSeverity::Critical,
            Self::Database(err) => match err {
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_) => {
                    IngestionSeverity::Critical
                }
                _ => IngestionSeverity::Error,
            },
            _ => IngestionSeverity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_and_connection_errors_are_directory_fatal() {
        assert!(IngestionError::config_invalid("x").is_directory_fatal());
        assert!(
            IngestionError::ConnectionFailure {
                database: "db".into(),
                message: "refused".into(),
            }
            .is_directory_fatal()
        );
        assert!(!IngestionError::NoValueColumns { columns: vec![] }.is_directory_fatal());
        assert!(
            !IngestionError::WriteFailure {
                table: "excel.t".into(),
                message: "boom".into(),
            }
            .is_directory_fatal()
        );
    }

    #[test]
    fn parser_not_found_lists_known_names() {
        let err = IngestionError::ParserNotFound {
            name: "csv".into(),
            known: vec!["excel".into(), "unpivot_excel".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'csv'"));
        assert!(msg.contains("unpivot_excel"));
    }
}
