//! Process-wide settings, read once at start-up.

use std::env;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;

use crate::config::DEFAULT_CONFIG_FILE_NAME;

pub const DEFAULT_MAX_FILES_PER_DIRECTORY: usize = 100;

/// Postgres connection parameters shared by every directory.
///
/// The database itself comes from each directory's `dbname`, falling back to
/// [`PgSettings::default_database`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub default_database: String,
}

impl Default for PgSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "password".to_string(),
            default_database: "postgres".to_string(),
        }
    }
}

impl PgSettings {
    /// Load from `POSTGRES_HOST`, `POSTGRES_PORT`, `POSTGRES_USER`, `POSTGRES_PASSWORD` and
    /// `POSTGRES_DB`, using the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("POSTGRES_HOST").unwrap_or(defaults.host),
            port: env::var("POSTGRES_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            user: env::var("POSTGRES_USER").unwrap_or(defaults.user),
            password: env::var("POSTGRES_PASSWORD").unwrap_or(defaults.password),
            default_database: env::var("POSTGRES_DB").unwrap_or(defaults.default_database),
        }
    }

    pub fn connect_options(&self, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(database)
    }
}

/// Limits and names applied while walking a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Configuration artifact looked up in every directory.
    pub config_file_name: String,
    /// Files loaded per directory before the rest are left for the next run.
    pub max_files_per_directory: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            config_file_name: DEFAULT_CONFIG_FILE_NAME.to_string(),
            max_files_per_directory: DEFAULT_MAX_FILES_PER_DIRECTORY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub postgres: PgSettings,
    pub ingest: IngestOptions,
}

impl Settings {
    /// Load a `.env` file if present, then read connection parameters from the environment.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            postgres: PgSettings::from_env(),
            ingest: IngestOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_local_postgres() {
        let s = Settings::default();
        assert_eq!(s.postgres.host, "localhost");
        assert_eq!(s.postgres.port, 5432);
        assert_eq!(s.postgres.default_database, "postgres");
        assert_eq!(s.ingest.config_file_name, "description.xlsx");
        assert_eq!(s.ingest.max_files_per_directory, 100);
    }

    #[test]
    fn password_is_not_serialized() {
        let json = serde_json::to_string(&PgSettings::default()).unwrap();
        assert!(!json.contains("password\":"));
        assert!(json.contains("localhost"));
    }
}
