//! Per-directory declarative configuration.
//!
//! Every source directory carries a small key/value workbook (see [`resolver`]) naming the parser,
//! target table and column options for the files next to it. [`DirectoryConfig`] is its typed form.

pub mod literal;
pub mod resolver;

use std::collections::BTreeMap;

use glob::Pattern;
use serde::Serialize;

use crate::error::{IngestionError, IngestionResult};
use crate::ingestion::excel::parse_column_letters;

pub use literal::parse_literal_list;
pub use resolver::{resolve_directory_config, DEFAULT_CONFIG_FILE_NAME};

pub const KEY_PARSER: &str = "parser";
pub const KEY_PARSER_LEGACY: &str = "ParserInterface";
pub const KEY_SHEET_NAME: &str = "SheetName";
pub const KEY_COLUMN_LIST: &str = "ColumnList";
pub const KEY_ADDITIONAL_PARAMETERS: &str = "AdditionalParameters";
pub const KEY_TABLE_NAME: &str = "TableName";
pub const KEY_DATABASE: &str = "dbname";
pub const KEY_SCHEMA: &str = "schema";
pub const KEY_FILE_NAME: &str = "FileName";
pub const KEY_SKIP_ROWS: &str = "skiprows";

pub const DEFAULT_SCHEMA: &str = "excel";

/// A configuration value after key-specific decoding.
///
/// Decoding never fails the load: a value that does not decode stays [`ConfigValue::Text`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Text(String),
    List(Vec<String>),
    Structured(serde_json::Value),
}

impl ConfigValue {
    /// Decode a raw cell for `key`: list literal for `ColumnList`, JSON for
    /// `AdditionalParameters`, text for everything else.
    pub fn decode(key: &str, raw: &str) -> Self {
        if key.eq_ignore_ascii_case(KEY_COLUMN_LIST) {
            match parse_literal_list(raw) {
                Some(items) => ConfigValue::List(items),
                None => ConfigValue::Text(raw.to_string()),
            }
        } else if key.eq_ignore_ascii_case(KEY_ADDITIONAL_PARAMETERS) {
            match serde_json::from_str(raw) {
                Ok(value) => ConfigValue::Structured(value),
                Err(_) => ConfigValue::Text(raw.to_string()),
            }
        } else {
            ConfigValue::Text(raw.to_string())
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Which sheet(s) a strategy reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    /// The first sheet of the workbook.
    Default,
    Named(String),
    Many(Vec<String>),
}

/// Which columns the direct strategy keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelection {
    /// Header names, matched exactly.
    Names(Vec<String>),
    /// Zero-based sheet positions, from an Excel letter selection such as `A:C,E`.
    Positions(Vec<usize>),
}

/// Typed configuration of one source directory.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub parser_name: String,
    pub sheet_selector: SheetSelector,
    pub column_list: Option<ColumnSelection>,
    /// Free-form, parser-specific parameters (e.g. `unpivot.var_name`).
    pub additional_parameters: serde_json::Value,
    pub table_name: String,
    /// `None` uses the connection default database.
    pub database_name: Option<String>,
    pub schema: String,
    pub file_name_glob: Option<Pattern>,
    pub skip_rows: usize,
    /// Every decoded key/value, as read. Stored with each ledger row.
    pub options: BTreeMap<String, ConfigValue>,
}

impl DirectoryConfig {
    /// Build the typed configuration from decoded options, validating required keys.
    pub fn from_options(options: BTreeMap<String, ConfigValue>) -> IngestionResult<Self> {
        let text = |key: &str| -> Option<String> {
            lookup(&options, key)
                .and_then(ConfigValue::as_text)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let parser_name = text(KEY_PARSER)
            .or_else(|| text(KEY_PARSER_LEGACY))
            .ok_or_else(|| {
                IngestionError::config_invalid(format!(
                    "missing '{KEY_PARSER}' (or '{KEY_PARSER_LEGACY}')"
                ))
            })?;

        let table_name = text(KEY_TABLE_NAME)
            .ok_or_else(|| IngestionError::config_invalid(format!("missing '{KEY_TABLE_NAME}'")))?;
        ensure_identifier(KEY_TABLE_NAME, &table_name)?;

        let schema = text(KEY_SCHEMA).unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        ensure_identifier(KEY_SCHEMA, &schema)?;

        let sheet_selector = match lookup(&options, KEY_SHEET_NAME) {
            None => SheetSelector::Default,
            Some(ConfigValue::List(items)) => SheetSelector::Many(items.clone()),
            Some(ConfigValue::Text(raw)) if raw.trim().is_empty() => SheetSelector::Default,
            Some(ConfigValue::Text(raw)) => match parse_literal_list(raw) {
                Some(items) => SheetSelector::Many(items),
                None => SheetSelector::Named(raw.trim().to_string()),
            },
            Some(ConfigValue::Structured(v)) => SheetSelector::Named(v.to_string()),
        };

        let column_list = match lookup(&options, KEY_COLUMN_LIST) {
            None => None,
            Some(ConfigValue::List(items)) => Some(ColumnSelection::Names(items.clone())),
            Some(ConfigValue::Text(raw)) => Some(ColumnSelection::Positions(
                parse_column_letters(raw).ok_or_else(|| {
                    IngestionError::config_invalid(format!(
                        "'{KEY_COLUMN_LIST}' is neither a list nor a column-letter selection: {raw}"
                    ))
                })?,
            )),
            Some(ConfigValue::Structured(v)) => {
                return Err(IngestionError::config_invalid(format!(
                    "'{KEY_COLUMN_LIST}' must be a list, got {v}"
                )));
            }
        };

        let additional_parameters = match lookup(&options, KEY_ADDITIONAL_PARAMETERS) {
            None => serde_json::Value::Object(Default::default()),
            Some(ConfigValue::Structured(v)) => v.clone(),
            Some(ConfigValue::Text(s)) => serde_json::Value::String(s.clone()),
            Some(ConfigValue::List(items)) => serde_json::Value::from(items.clone()),
        };

        let file_name_glob = text(KEY_FILE_NAME)
            .map(|raw| {
                Pattern::new(&raw).map_err(|e| {
                    IngestionError::config_invalid(format!("bad '{KEY_FILE_NAME}' pattern '{raw}': {e}"))
                })
            })
            .transpose()?;

        let skip_rows = text(KEY_SKIP_ROWS)
            .map(|raw| {
                raw.parse::<usize>().map_err(|_| {
                    IngestionError::config_invalid(format!(
                        "'{KEY_SKIP_ROWS}' must be a non-negative integer, got '{raw}'"
                    ))
                })
            })
            .transpose()?
            .unwrap_or(0);

        let database_name = text(KEY_DATABASE);

        Ok(Self {
            parser_name,
            sheet_selector,
            column_list,
            additional_parameters,
            table_name,
            database_name,
            schema,
            file_name_glob,
            skip_rows,
            options,
        })
    }

    /// `schema.table` as used in SQL statements.
    pub fn target_table(&self) -> String {
        format!("{}.{}", self.schema, self.table_name)
    }

    /// `database.table` as recorded in the ledger.
    pub fn qualified_table(&self, default_database: &str) -> String {
        let database = self.database_name.as_deref().unwrap_or(default_database);
        format!("{database}.{}", self.table_name)
    }

    /// Whether a file name passes the optional `FileName` glob.
    pub fn accepts_file_name(&self, file_name: &str) -> bool {
        self.file_name_glob
            .as_ref()
            .is_none_or(|pattern| pattern.matches(file_name))
    }

    /// Nested `additionalParameters.<section>.<key>` lookup.
    pub fn parameter(&self, section: &str, key: &str) -> Option<&serde_json::Value> {
        self.additional_parameters.get(section)?.get(key)
    }

    /// The decoded options as JSON, for the ledger `config` column.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.options).unwrap_or(serde_json::Value::Null)
    }
}

fn lookup<'a>(options: &'a BTreeMap<String, ConfigValue>, key: &str) -> Option<&'a ConfigValue> {
    options
        .get(key)
        .or_else(|| {
            options
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
}

fn ensure_identifier(key: &str, value: &str) -> IngestionResult<()> {
    if value.chars().all(|c| c.is_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(IngestionError::config_invalid(format!(
            "'{key}' must be a plain identifier (letters, digits, '_'), got '{value}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> BTreeMap<String, ConfigValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ConfigValue::decode(k, v)))
            .collect()
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = DirectoryConfig::from_options(options(&[("parser", "excel"), ("TableName", "sales")]))
            .unwrap();
        assert_eq!(cfg.parser_name, "excel");
        assert_eq!(cfg.schema, "excel");
        assert_eq!(cfg.target_table(), "excel.sales");
        assert_eq!(cfg.qualified_table("postgres"), "postgres.sales");
        assert_eq!(cfg.sheet_selector, SheetSelector::Default);
        assert!(cfg.accepts_file_name("anything.xlsx"));
        assert_eq!(cfg.skip_rows, 0);
    }

    #[test]
    fn legacy_parser_key_and_case_insensitive_lookup() {
        let cfg = DirectoryConfig::from_options(options(&[
            ("ParserInterface", "unpivot_excel"),
            ("tablename", "plan"),
            ("DBNAME", "finance"),
            ("sheetname", "['Лист1', 'Лист2']"),
            ("SKIPROWS", "2"),
        ]))
        .unwrap();
        assert_eq!(cfg.parser_name, "unpivot_excel");
        assert_eq!(cfg.qualified_table("postgres"), "finance.plan");
        assert_eq!(
            cfg.sheet_selector,
            SheetSelector::Many(vec!["Лист1".into(), "Лист2".into()])
        );
        assert_eq!(cfg.skip_rows, 2);
    }

    #[test]
    fn missing_parser_is_invalid() {
        let err = DirectoryConfig::from_options(options(&[("TableName", "t")])).unwrap_err();
        assert!(matches!(err, IngestionError::ConfigInvalid { .. }));
        assert!(err.to_string().contains("parser"));
    }

    #[test]
    fn column_list_and_additional_parameters_decode_or_fall_back() {
        let cfg = DirectoryConfig::from_options(options(&[
            ("parser", "excel"),
            ("TableName", "t"),
            ("ColumnList", "['id', 'name']"),
            ("AdditionalParameters", r#"{"unpivot": {"var_name": "period"}}"#),
        ]))
        .unwrap();
        assert_eq!(
            cfg.column_list,
            Some(ColumnSelection::Names(vec!["id".into(), "name".into()]))
        );
        assert_eq!(cfg.parameter("unpivot", "var_name"), Some(&serde_json::json!("period")));

        let cfg = DirectoryConfig::from_options(options(&[
            ("parser", "excel"),
            ("TableName", "t"),
            ("ColumnList", "A:B"),
            ("AdditionalParameters", "{not json"),
        ]))
        .unwrap();
        assert_eq!(cfg.column_list, Some(ColumnSelection::Positions(vec![0, 1])));
        assert_eq!(cfg.additional_parameters, serde_json::json!("{not json"));
        assert_eq!(cfg.parameter("unpivot", "var_name"), None);
    }

    #[test]
    fn glob_and_identifiers_are_validated() {
        let cfg = DirectoryConfig::from_options(options(&[
            ("parser", "excel"),
            ("TableName", "t"),
            ("FileName", "data_*.xlsx"),
        ]))
        .unwrap();
        assert!(cfg.accepts_file_name("data_1.xlsx"));
        assert!(!cfg.accepts_file_name("other.xlsx"));

        let err = DirectoryConfig::from_options(options(&[
            ("parser", "excel"),
            ("TableName", "t; drop table x"),
        ]))
        .unwrap_err();
        assert!(matches!(err, IngestionError::ConfigInvalid { .. }));

        let err = DirectoryConfig::from_options(options(&[
            ("parser", "excel"),
            ("TableName", "t"),
            ("skiprows", "-1"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("skiprows"));
    }

    #[test]
    fn options_serialize_untagged() {
        let cfg = DirectoryConfig::from_options(options(&[
            ("parser", "excel"),
            ("TableName", "t"),
            ("ColumnList", "['a']"),
        ]))
        .unwrap();
        assert_eq!(
            cfg.to_json(),
            serde_json::json!({"parser": "excel", "TableName": "t", "ColumnList": ["a"]})
        );
    }
}
