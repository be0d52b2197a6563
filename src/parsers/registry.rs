use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::config::DirectoryConfig;
use crate::error::{IngestionError, IngestionResult};

use super::{ParsingStrategy, BUILTIN};

/// Builds a strategy for one file.
pub type StrategyFactory = fn(&Path, &DirectoryConfig) -> Box<dyn ParsingStrategy>;

/// Checks a directory configuration before any file of the directory is touched.
pub type ConfigValidator = fn(&DirectoryConfig) -> IngestionResult<()>;

#[derive(Clone, Copy)]
struct Entry {
    factory: StrategyFactory,
    validate: ConfigValidator,
}

fn accept_any(_: &DirectoryConfig) -> IngestionResult<()> {
    Ok(())
}

/// Name → strategy factory table, populated once at start-up.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    entries: BTreeMap<String, Entry>,
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl ParserRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in strategy.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for register in BUILTIN {
            register(&mut registry);
        }
        registry
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, factory: StrategyFactory) {
        self.register_validated(name, factory, accept_any);
    }

    /// Like [`register`](Self::register), with a configuration check run once per directory.
    pub fn register_validated(
        &mut self,
        name: impl Into<String>,
        factory: StrategyFactory,
        validate: ConfigValidator,
    ) {
        self.entries.insert(name.into(), Entry { factory, validate });
    }

    fn entry(&self, name: &str) -> IngestionResult<Entry> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| IngestionError::ParserNotFound {
                name: name.to_string(),
                known: self.names(),
            })
    }

    /// Look a strategy up by its configured name.
    pub fn resolve(&self, name: &str) -> IngestionResult<StrategyFactory> {
        Ok(self.entry(name)?.factory)
    }

    /// Resolve `config.parser_name` and run its configuration check.
    pub fn validate(&self, config: &DirectoryConfig) -> IngestionResult<()> {
        (self.entry(&config.parser_name)?.validate)(config)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::ParseOutput;
    use crate::types::DataSet;

    struct Empty;

    impl ParsingStrategy for Empty {
        fn parse(&self) -> IngestionResult<ParseOutput> {
            Ok(ParseOutput::Single(DataSet::default()))
        }
    }

    fn empty(_: &Path, _: &DirectoryConfig) -> Box<dyn ParsingStrategy> {
        Box::new(Empty)
    }

    #[test]
    fn builtin_strategies_are_registered() {
        let registry = ParserRegistry::with_builtin();
        assert_eq!(registry.names(), vec!["excel", "unpivot_excel"]);
        assert!(registry.resolve("excel").is_ok());
    }

    #[test]
    fn unknown_name_lists_known_names() {
        let registry = ParserRegistry::with_builtin();
        match registry.resolve("csv") {
            Err(IngestionError::ParserNotFound { name, known }) => {
                assert_eq!(name, "csv");
                assert_eq!(known, vec!["excel", "unpivot_excel"]);
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    fn config(pairs: &[(&str, &str)]) -> DirectoryConfig {
        use crate::config::ConfigValue;

        let options = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ConfigValue::decode(k, v)))
            .collect();
        DirectoryConfig::from_options(options).unwrap()
    }

    #[test]
    fn validation_runs_the_strategy_check() {
        let registry = ParserRegistry::with_builtin();
        let plain = config(&[("parser", "excel"), ("TableName", "t")]);
        assert!(registry.validate(&plain).is_ok());

        let no_ids = config(&[("parser", "unpivot_excel"), ("TableName", "t")]);
        let err = registry.validate(&no_ids).unwrap_err();
        assert!(matches!(err, IngestionError::ConfigInvalid { .. }));
        assert!(err.is_directory_fatal());

        let unknown = config(&[("parser", "csv"), ("TableName", "t")]);
        assert!(matches!(
            registry.validate(&unknown),
            Err(IngestionError::ParserNotFound { .. })
        ));
    }

    #[test]
    fn custom_strategies_can_be_added() {
        let mut registry = ParserRegistry::with_builtin();
        registry.register("empty", empty);
        assert_eq!(registry.names().len(), 3);
        assert!(registry.resolve("empty").is_ok());
    }
}
