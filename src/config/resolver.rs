use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::{IngestionError, IngestionResult};
use crate::ingestion::excel::{open_workbook, SheetReadOptions};

use super::{ConfigValue, DirectoryConfig};

/// Name of the configuration artifact looked up in every source directory.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "description.xlsx";

const KEY_COLUMN: &str = "key";
const VALUE_COLUMN: &str = "value";

/// Read `<dir>/<file_name>` and resolve it into a [`DirectoryConfig`].
///
/// The artifact is a workbook whose first sheet has `key` and `value` columns. Rows with an empty
/// key or value are ignored; later rows override earlier ones with the same key.
///
/// Fails with [`IngestionError::ConfigNotFound`] when the artifact is absent and
/// [`IngestionError::ConfigInvalid`] when it is unreadable or incomplete.
pub fn resolve_directory_config(dir: &Path, file_name: &str) -> IngestionResult<DirectoryConfig> {
    let options = read_options(dir, file_name)?;
    debug!(directory = %dir.display(), keys = ?options.keys().collect::<Vec<_>>(), "configuration read");
    DirectoryConfig::from_options(options)
}

/// Read the raw, decoded key/value options without validating them.
pub fn read_options(dir: &Path, file_name: &str) -> IngestionResult<BTreeMap<String, ConfigValue>> {
    let path = dir.join(file_name);
    if !path.is_file() {
        return Err(IngestionError::ConfigNotFound { path });
    }

    let unreadable = |e: IngestionError| {
        IngestionError::config_invalid(format!("cannot read {}: {e}", path.display()))
    };
    let mut workbook = open_workbook(&path).map_err(unreadable)?;
    let sheet = workbook.first_sheet().map_err(unreadable)?;
    let table = workbook
        .read_sheet(&sheet, &SheetReadOptions::default())
        .map_err(unreadable)?;

    let (Some(key_idx), Some(value_idx)) = (
        table.schema.index_of(KEY_COLUMN),
        table.schema.index_of(VALUE_COLUMN),
    ) else {
        return Err(IngestionError::config_invalid(format!(
            "{file_name} must have '{KEY_COLUMN}' and '{VALUE_COLUMN}' columns, found {:?}",
            table.column_names()
        )));
    };

    let mut options = BTreeMap::new();
    for row in &table.rows {
        let (Some(key), Some(value)) = (row[key_idx].render(), row[value_idx].render()) else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        options.insert(key.to_string(), ConfigValue::decode(key, value));
    }
    Ok(options)
}
