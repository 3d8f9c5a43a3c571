use std::path::PathBuf;

use schemaflow_common::{Error, Result};
use tracing::debug;

pub const ENV_KEY_DSN: &str = "MIGRATION_DSN";
pub const ENV_KEY_OPERATION: &str = "MIGRATION_OPERATION";
pub const ENV_KEY_FORCE_VERSION: &str = "MIGRATION_FORCE_VERSION";
pub const ENV_KEY_FILES_DIR: &str = "MIGRATION_FILES_DIR";
pub const ENV_KEY_TABLE: &str = "MIGRATION_TABLE";

/// Parameters for a single migration invocation, read from flat key/value
/// configuration (normally the process environment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEnv {
    pub dsn: String,
    pub operation: String,
    pub force_version: i64,
    pub files_dir: Option<PathBuf>,
    pub migrations_table: Option<String>,
}

impl MigrationEnv {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup.
    ///
    /// Blank values count as absent. `MIGRATION_DSN` and
    /// `MIGRATION_OPERATION` are required; a missing force version is 0.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let dsn = get(ENV_KEY_DSN).ok_or_else(|| missing(ENV_KEY_DSN))?;
        let operation = get(ENV_KEY_OPERATION).ok_or_else(|| missing(ENV_KEY_OPERATION))?;

        let force_version = match get(ENV_KEY_FORCE_VERSION) {
            Some(raw) => raw.parse::<i64>().map_err(|e| {
                Error::Config(format!(
                    "invalid {ENV_KEY_FORCE_VERSION} value {raw:?}: {e}"
                ))
            })?,
            None => 0,
        };

        let files_dir = get(ENV_KEY_FILES_DIR).map(PathBuf::from);
        let migrations_table = get(ENV_KEY_TABLE);

        debug!(
            operation = %operation,
            force_version,
            files_dir = ?files_dir,
            "loaded migration settings from environment"
        );

        Ok(Self {
            dsn,
            operation,
            force_version,
            files_dir,
            migrations_table,
        })
    }
}

fn missing(key: &str) -> Error {
    Error::Config(format!("missing env: {key}"))
}
