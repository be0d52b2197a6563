//! Parsing strategies and their registry.
//!
//! A strategy turns one source file into one or more [`DataSet`]s, driven by the directory's
//! [`DirectoryConfig`]. Strategies are looked up by the configured parser name through
//! [`ParserRegistry`]; each strategy module contributes a `register` function to [`BUILTIN`],
//! so adding a strategy never touches the dispatch code.

pub mod excel;
pub mod registry;
pub mod unpivot;

use std::path::Path;

use crate::config::DirectoryConfig;
use crate::error::IngestionResult;
use crate::types::DataSet;

pub use registry::{ConfigValidator, ParserRegistry, StrategyFactory};

/// Registration hooks of every strategy compiled into the crate.
pub const BUILTIN: &[fn(&mut ParserRegistry)] = &[excel::register, unpivot::register];

/// Result of parsing one file.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutput {
    Single(DataSet),
    /// Named sub-results, e.g. one per sheet, in read order.
    Many(Vec<(String, DataSet)>),
}

impl ParseOutput {
    /// Flatten into the list of data sets to write.
    pub fn into_datasets(self) -> Vec<DataSet> {
        match self {
            ParseOutput::Single(ds) => vec![ds],
            ParseOutput::Many(parts) => parts.into_iter().map(|(_, ds)| ds).collect(),
        }
    }

    pub fn total_rows(&self) -> usize {
        match self {
            ParseOutput::Single(ds) => ds.row_count(),
            ParseOutput::Many(parts) => parts.iter().map(|(_, ds)| ds.row_count()).sum(),
        }
    }
}

/// A parser bound to one file and its directory configuration.
pub trait ParsingStrategy {
    fn parse(&self) -> IngestionResult<ParseOutput>;
}

/// Construct the strategy registered as `name` for `path`.
pub fn strategy_for(
    registry: &ParserRegistry,
    name: &str,
    path: &Path,
    config: &DirectoryConfig,
) -> IngestionResult<Box<dyn ParsingStrategy>> {
    let factory = registry.resolve(name)?;
    Ok(factory(path, config))
}
