use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use schemaflow_common::{Error, Logger, NoopLogger, Result};

use crate::engine::Migrator;
use crate::logger::LoggerAdapter;
use crate::migrations::ScriptSource;
use crate::version_store::{
    Connector, DEFAULT_MIGRATIONS_TABLE, SqliteConnector, VersionState, VersionStore,
};

pub const DEFAULT_FILES_DIR: &str = "dbmigrations";

/// The operations a runner understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Up,
    Down,
    Force,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Up => "up",
            Operation::Down => "down",
            Operation::Force => "force",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(Operation::Up),
            "down" => Ok(Operation::Down),
            "force" => Ok(Operation::Force),
            other => Err(Error::UnsupportedOperation(other.to_string())),
        }
    }
}

/// One requested operation. `force_version` only matters for `force`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub id: String,
    pub force_version: i64,
}

impl OperationRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            force_version: 0,
        }
    }

    pub fn force(version: i64) -> Self {
        Self {
            id: Operation::Force.as_str().to_string(),
            force_version: version,
        }
    }
}

/// What a successful [`MigrationRunner::run`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// `up` applied these versions, ascending.
    Migrated { versions: Vec<u64> },
    /// `up` found nothing to apply.
    NoChange,
    /// `down` reverted `from`; the recorded version is now `to`.
    RolledBack { from: u64, to: Option<u64> },
    /// `force` recorded `version` as clean.
    Forced { version: Option<u64> },
}

/// Settings for a [`MigrationRunner`]. Build with [`RunnerConfig::builder`].
#[derive(Clone)]
pub struct RunnerConfig {
    files_dir: PathBuf,
    migrations_table: String,
    logger: Arc<dyn Logger>,
}

impl RunnerConfig {
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::default()
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn migrations_table(&self) -> &str {
        &self.migrations_table
    }

    pub fn logger(&self) -> Arc<dyn Logger> {
        self.logger.clone()
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            files_dir: PathBuf::from(DEFAULT_FILES_DIR),
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            logger: Arc::new(NoopLogger),
        }
    }
}

impl fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("files_dir", &self.files_dir)
            .field("migrations_table", &self.migrations_table)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct RunnerConfigBuilder {
    files_dir: Option<PathBuf>,
    migrations_table: Option<String>,
    logger: Option<Arc<dyn Logger>>,
}

impl RunnerConfigBuilder {
    /// Directory holding the change scripts. Defaults to `dbmigrations`.
    pub fn files_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.files_dir = Some(dir.into());
        self
    }

    /// Table that stores the version row. Defaults to `schema_migrations`.
    pub fn migrations_table(mut self, table: impl Into<String>) -> Self {
        self.migrations_table = Some(table.into());
        self
    }

    /// Defaults to [`NoopLogger`].
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<RunnerConfig> {
        let defaults = RunnerConfig::default();

        let files_dir = self.files_dir.unwrap_or(defaults.files_dir);
        if files_dir.as_os_str().is_empty() {
            return Err(Error::Config("migrations directory must not be empty".into()));
        }

        let migrations_table = self.migrations_table.unwrap_or(defaults.migrations_table);
        if !is_valid_table_name(&migrations_table) {
            return Err(Error::Config(format!(
                "invalid migrations table name {migrations_table:?}"
            )));
        }

        Ok(RunnerConfig {
            files_dir,
            migrations_table,
            logger: self.logger.unwrap_or(defaults.logger),
        })
    }
}

fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Runs one migration operation against one database.
///
/// The runner owns its engine handle; build a new one per invocation.
pub struct MigrationRunner {
    migrator: Migrator,
    files_dir: PathBuf,
    log: LoggerAdapter,
}

impl MigrationRunner {
    /// Load scripts from the configured directory and connect to `dsn`
    /// as a SQLite database.
    pub fn new(dsn: &str, config: RunnerConfig) -> Result<Self> {
        Self::connect_with(&SqliteConnector, dsn, config)
    }

    /// Like [`MigrationRunner::new`] with an explicit connector. Scripts are
    /// loaded first, so a bad directory never opens a connection.
    pub fn connect_with(connector: &dyn Connector, dsn: &str, config: RunnerConfig) -> Result<Self> {
        let source = ScriptSource::from_dir(&config.files_dir)?;
        let store = connector
            .connect(dsn, &config.migrations_table)
            .map_err(|e| match e {
                Error::Connection(_) => e,
                other => Error::Connection(format!("creating migration engine: {other}")),
            })?;
        Ok(Self::with_parts(source, store, config))
    }

    /// Assemble a runner from an already-loaded source and store.
    pub fn with_parts(
        source: ScriptSource,
        store: Box<dyn VersionStore>,
        config: RunnerConfig,
    ) -> Self {
        let log = LoggerAdapter::new(config.logger.clone());
        Self {
            migrator: Migrator::new(source, store, Box::new(log.clone())),
            files_dir: config.files_dir,
            log,
        }
    }

    /// Execute `op`. Unknown operation ids fail before the database is touched.
    pub fn run(&mut self, op: &OperationRequest) -> Result<RunOutcome> {
        let operation: Operation = op.id.parse()?;

        let result = match operation {
            Operation::Up => self.run_up(),
            Operation::Down => self.run_down(),
            Operation::Force => self.run_force(op.force_version),
        };

        result.map_err(|source| Error::Operation {
            operation: operation.to_string(),
            source: Box::new(source),
        })
    }

    /// Recorded version and dirty flag. Works while dirty.
    pub fn version(&mut self) -> Result<VersionState> {
        self.migrator.version()
    }

    fn run_up(&mut self) -> Result<RunOutcome> {
        self.log.info("running migrate UP");

        let report = self.migrator.up()?;
        if report.is_empty() {
            self.log.info(&format!(
                "no new migrations found in: {}",
                self.files_dir.display()
            ));
            return Ok(RunOutcome::NoChange);
        }
        Ok(RunOutcome::Migrated {
            versions: report.versions,
        })
    }

    fn run_down(&mut self) -> Result<RunOutcome> {
        self.log.info("running migrate DOWN with STEPS=1");

        let report = self.migrator.down_one()?;
        let from = report.versions.first().copied().ok_or(Error::NoVersion)?;
        Ok(RunOutcome::RolledBack {
            from,
            to: self.migrator.source().prev(from),
        })
    }

    fn run_force(&mut self, version: i64) -> Result<RunOutcome> {
        self.log.info(&format!("running FORCE with VERSION {version}"));

        self.migrator.force(version)?;
        Ok(RunOutcome::Forced {
            version: u64::try_from(version).ok(),
        })
    }
}
