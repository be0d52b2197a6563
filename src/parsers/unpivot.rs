//! Unpivot strategy: wide period columns (`202301`, `202302`, ...) reshaped into long rows.
//!
//! Options live under `AdditionalParameters.unpivot`:
//!
//! | key | default | meaning |
//! |---|---|---|
//! | `var_name` | `var` | output column holding the period |
//! | `value_name` | `val` | output column holding the value |
//! | `max_rows` | `100` | input rows kept before reshaping, `null` keeps all |
//! | `period_pattern` | `^\d{6}$` | regex a column name must match to be unpivoted |

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use crate::config::{ColumnSelection, DirectoryConfig, SheetSelector};
use crate::error::{IngestionError, IngestionResult};
use crate::ingestion::excel::{open_workbook, SheetReadOptions};
use crate::types::{DataSet, DataType, Field, Schema, Value};

use super::{ParseOutput, ParserRegistry, ParsingStrategy};

pub const NAME: &str = "unpivot_excel";

pub const DEFAULT_VAR_NAME: &str = "var";
pub const DEFAULT_VALUE_NAME: &str = "val";
pub const DEFAULT_MAX_ROWS: usize = 100;
pub const DEFAULT_PERIOD_PATTERN: &str = r"^\d{6}$";

const SECTION: &str = "unpivot";

pub fn register(registry: &mut ParserRegistry) {
    registry.register_validated(
        NAME,
        |path, config| Box::new(UnpivotStrategy::new(path, config)),
        |config| UnpivotOptions::from_config(config).map(|_| ()),
    );
}

/// Reshaping options resolved from the directory configuration.
#[derive(Debug, Clone)]
pub struct UnpivotOptions {
    pub id_columns: Vec<String>,
    pub var_name: String,
    pub value_name: String,
    pub max_rows: Option<usize>,
    pub period_pattern: Regex,
}

impl UnpivotOptions {
    pub fn from_config(config: &DirectoryConfig) -> IngestionResult<Self> {
        let id_columns = match &config.column_list {
            Some(ColumnSelection::Names(names)) if !names.is_empty() => names.clone(),
            Some(ColumnSelection::Positions(_)) => {
                return Err(IngestionError::config_invalid(
                    "unpivot needs identifier column names in 'ColumnList', not column letters",
                ));
            }
            _ => {
                return Err(IngestionError::config_invalid(
                    "unpivot needs identifier columns in 'ColumnList'",
                ));
            }
        };

        let text_param = |key: &str, default: &str| -> IngestionResult<String> {
            match config.parameter(SECTION, key) {
                None => Ok(default.to_string()),
                Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(s.clone()),
                Some(other) => Err(IngestionError::config_invalid(format!(
                    "'{SECTION}.{key}' must be a non-empty string, got {other}"
                ))),
            }
        };

        let max_rows = match config.parameter(SECTION, "max_rows") {
            None => Some(DEFAULT_MAX_ROWS),
            Some(serde_json::Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| {
                        IngestionError::config_invalid(format!(
                            "'{SECTION}.max_rows' must be a non-negative integer or null, got {v}"
                        ))
                    })?,
            ),
        };

        let pattern = text_param("period_pattern", DEFAULT_PERIOD_PATTERN)?;
        let period_pattern = Regex::new(&pattern).map_err(|e| {
            IngestionError::config_invalid(format!("bad '{SECTION}.period_pattern': {e}"))
        })?;

        Ok(Self {
            id_columns,
            var_name: text_param("var_name", DEFAULT_VAR_NAME)?,
            value_name: text_param("value_name", DEFAULT_VALUE_NAME)?,
            max_rows,
            period_pattern,
        })
    }
}

/// Reads the configured sheets, concatenates them and melts period columns into
/// `(id columns..., var_name, value_name)` rows.
#[derive(Debug, Clone)]
pub struct UnpivotStrategy {
    path: PathBuf,
    config: DirectoryConfig,
}

impl UnpivotStrategy {
    pub fn new(path: &Path, config: &DirectoryConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            config: config.clone(),
        }
    }
}

impl ParsingStrategy for UnpivotStrategy {
    fn parse(&self) -> IngestionResult<ParseOutput> {
        let options = UnpivotOptions::from_config(&self.config)?;
        let mut workbook = open_workbook(&self.path)?;

        let requested = match &self.config.sheet_selector {
            SheetSelector::Default => {
                return Err(IngestionError::MissingSheet {
                    requested: vec!["<SheetName not set>".to_string()],
                    available: workbook.sheet_names().to_vec(),
                });
            }
            SheetSelector::Named(name) => vec![name.clone()],
            SheetSelector::Many(names) => names.clone(),
        };

        // A list only needs one existing sheet; absent ones are skipped.
        let (present, absent): (Vec<String>, Vec<String>) = requested
            .iter()
            .cloned()
            .partition(|name| workbook.sheet_names().contains(name));
        if present.is_empty() {
            return Err(IngestionError::MissingSheet {
                requested,
                available: workbook.sheet_names().to_vec(),
            });
        }
        if !absent.is_empty() {
            warn!(file = %self.path.display(), missing = ?absent, "sheets not found, skipping them");
        }

        let read = SheetReadOptions {
            skip_rows: self.config.skip_rows,
            column_positions: None,
        };
        let mut parts = Vec::with_capacity(present.len());
        for sheet in &present {
            parts.push(workbook.read_sheet(sheet, &read)?);
        }
        let mut wide = DataSet::concat(parts);

        if let Some(cap) = options.max_rows {
            if wide.row_count() > cap {
                warn!(
                    file = %self.path.display(),
                    rows = wide.row_count(),
                    max_rows = cap,
                    "row cap reached, extra rows are not loaded"
                );
                wide.truncate(cap);
            }
        }

        let long = unpivot(&wide, &options)?;
        debug!(
            file = %self.path.display(),
            input_rows = wide.row_count(),
            output_rows = long.row_count(),
            "unpivoted"
        );
        Ok(ParseOutput::Single(long))
    }
}

/// Melt the period columns of `wide` into long form.
///
/// Output rows are period-major: all rows for the first period column, then the second, and so
/// on, so the output has `rows × periods` rows.
pub fn unpivot(wide: &DataSet, options: &UnpivotOptions) -> IngestionResult<DataSet> {
    let missing: Vec<String> = options
        .id_columns
        .iter()
        .filter(|c| wide.schema.index_of(c).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(IngestionError::MissingColumns {
            missing,
            available: wide.column_names(),
        });
    }

    let id_idxs: Vec<usize> = options
        .id_columns
        .iter()
        .filter_map(|c| wide.schema.index_of(c))
        .collect();
    let value_idxs: Vec<usize> = wide
        .schema
        .fields
        .iter()
        .enumerate()
        .filter(|(_, f)| {
            !options.id_columns.contains(&f.name) && options.period_pattern.is_match(&f.name)
        })
        .map(|(i, _)| i)
        .collect();
    if value_idxs.is_empty() {
        return Err(IngestionError::NoValueColumns {
            columns: wide.column_names(),
        });
    }

    let value_type = value_idxs
        .iter()
        .map(|&i| wide.schema.fields[i].data_type)
        .reduce(DataType::widen)
        .unwrap_or(DataType::Utf8);

    let mut fields: Vec<Field> = id_idxs
        .iter()
        .map(|&i| wide.schema.fields[i].clone())
        .collect();
    fields.push(Field::new(options.var_name.clone(), DataType::Utf8));
    fields.push(Field::new(options.value_name.clone(), value_type));

    let mut rows = Vec::with_capacity(wide.row_count() * value_idxs.len());
    for &v in &value_idxs {
        let period = Value::Utf8(wide.schema.fields[v].name.clone());
        for row in &wide.rows {
            let mut out: Vec<Value> = id_idxs.iter().map(|&i| row[i].clone()).collect();
            out.push(period.clone());
            out.push(row[v].clone().coerce(value_type));
            rows.push(out);
        }
    }

    Ok(DataSet::new(Schema::new(fields), rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> UnpivotOptions {
        UnpivotOptions {
            id_columns: vec!["id".into()],
            var_name: "period".into(),
            value_name: "amount".into(),
            max_rows: Some(DEFAULT_MAX_ROWS),
            period_pattern: Regex::new(DEFAULT_PERIOD_PATTERN).unwrap(),
        }
    }

    fn wide() -> DataSet {
        DataSet::new(
            Schema::new(vec![
                Field::new("id", DataType::Int64),
                Field::new("202301", DataType::Int64),
                Field::new("note", DataType::Utf8),
                Field::new("202302", DataType::Float64),
            ]),
            vec![
                vec![Value::Int64(1), Value::Int64(10), Value::Utf8("x".into()), Value::Float64(1.5)],
                vec![Value::Int64(2), Value::Null, Value::Null, Value::Float64(2.5)],
                vec![Value::Int64(3), Value::Int64(30), Value::Null, Value::Null],
            ],
        )
    }

    #[test]
    fn melts_period_columns_period_major() {
        let out = unpivot(&wide(), &options()).unwrap();
        assert_eq!(out.column_names(), vec!["id", "period", "amount"]);
        assert_eq!(out.row_count(), 3 * 2);
        assert_eq!(out.schema.fields[2].data_type, DataType::Float64);
        assert_eq!(
            out.rows[0],
            vec![Value::Int64(1), Value::Utf8("202301".into()), Value::Float64(10.0)]
        );
        assert_eq!(
            out.rows[4],
            vec![Value::Int64(2), Value::Utf8("202302".into()), Value::Float64(2.5)]
        );
        assert_eq!(out.rows[1][2], Value::Null);
    }

    #[test]
    fn missing_id_columns() {
        let mut opts = options();
        opts.id_columns = vec!["id".into(), "region".into()];
        match unpivot(&wide(), &opts) {
            Err(IngestionError::MissingColumns { missing, .. }) => {
                assert_eq!(missing, vec!["region".to_string()])
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn no_period_columns() {
        let ds = wide().select(&["id".into(), "note".into()]).unwrap();
        let err = unpivot(&ds, &options()).unwrap_err();
        assert!(matches!(err, IngestionError::NoValueColumns { .. }));
    }

    #[test]
    fn options_from_config() {
        use std::collections::BTreeMap;

        use crate::config::ConfigValue;

        let mut opts = BTreeMap::new();
        for (k, v) in [
            ("parser", "unpivot_excel"),
            ("TableName", "plan"),
            ("ColumnList", "['id']"),
            ("AdditionalParameters", r#"{"unpivot": {"var_name": "period", "max_rows": null}}"#),
        ] {
            opts.insert(k.to_string(), ConfigValue::decode(k, v));
        }
        let cfg = DirectoryConfig::from_options(opts).unwrap();
        let o = UnpivotOptions::from_config(&cfg).unwrap();
        assert_eq!(o.var_name, "period");
        assert_eq!(o.value_name, DEFAULT_VALUE_NAME);
        assert_eq!(o.max_rows, None);
        assert!(o.period_pattern.is_match("202412"));
        assert!(!o.period_pattern.is_match("2024-12"));
    }
}
