//! Direct strategy: one sheet (or a list of sheets) read as-is.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{ColumnSelection, DirectoryConfig, SheetSelector};
use crate::error::{IngestionError, IngestionResult};
use crate::ingestion::excel::{open_workbook, SheetReadOptions};

use super::{ParseOutput, ParserRegistry, ParsingStrategy};

pub const NAME: &str = "excel";

pub fn register(registry: &mut ParserRegistry) {
    registry.register(NAME, |path, config| Box::new(ExcelStrategy::new(path, config)));
}

/// Reads the configured sheet (first sheet by default), applying `skiprows` and `ColumnList`.
///
/// A `SheetName` list yields one named result per sheet.
#[derive(Debug, Clone)]
pub struct ExcelStrategy {
    path: PathBuf,
    config: DirectoryConfig,
}

impl ExcelStrategy {
    pub fn new(path: &Path, config: &DirectoryConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            config: config.clone(),
        }
    }
}

impl ParsingStrategy for ExcelStrategy {
    fn parse(&self) -> IngestionResult<ParseOutput> {
        let mut workbook = open_workbook(&self.path)?;

        let sheets = match &self.config.sheet_selector {
            SheetSelector::Default => vec![workbook.first_sheet()?],
            SheetSelector::Named(name) => vec![name.clone()],
            SheetSelector::Many(names) => names.clone(),
        };
        workbook.ensure_sheets(&sheets)?;

        let options = SheetReadOptions {
            skip_rows: self.config.skip_rows,
            column_positions: match &self.config.column_list {
                Some(ColumnSelection::Positions(positions)) => Some(positions.clone()),
                _ => None,
            },
        };

        let mut parts = Vec::with_capacity(sheets.len());
        for sheet in sheets {
            let mut ds = workbook.read_sheet(&sheet, &options)?;
            if let Some(ColumnSelection::Names(names)) = &self.config.column_list {
                ds = ds.select(names).map_err(|missing| IngestionError::MissingColumns {
                    missing,
                    available: ds.column_names(),
                })?;
            }
            debug!(
                file = %self.path.display(),
                sheet = %sheet,
                rows = ds.row_count(),
                columns = ?ds.column_names(),
                "sheet parsed"
            );
            parts.push((sheet, ds));
        }

        if matches!(self.config.sheet_selector, SheetSelector::Many(_)) {
            return Ok(ParseOutput::Many(parts));
        }
        let single = parts.into_iter().next().map(|(_, ds)| ds).unwrap_or_default();
        Ok(ParseOutput::Single(single))
    }
}
