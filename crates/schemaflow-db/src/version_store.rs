use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use schemaflow_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_MIGRATIONS_TABLE: &str = "schema_migrations";

/// Row value used for "no version, but dirty".
const NIL_VERSION: i64 = -1;

/// The persisted `(version, dirty)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionState {
    pub version: Option<u64>,
    pub dirty: bool,
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "{v}, dirty: {}", self.dirty),
            None => write!(f, "none, dirty: {}", self.dirty),
        }
    }
}

/// Persistence and execution backend for the migration engine.
pub trait VersionStore {
    /// Current recorded version and dirty flag.
    fn version(&mut self) -> Result<VersionState>;

    /// Replace the recorded version and dirty flag.
    fn set_version(&mut self, version: Option<u64>, dirty: bool) -> Result<()>;

    /// Run one script body against the target database.
    fn execute(&mut self, body: &str) -> Result<()>;
}

/// Opens a [`VersionStore`] for a DSN.
pub trait Connector {
    fn connect(&self, dsn: &str, migrations_table: &str) -> Result<Box<dyn VersionStore>>;
}

/// Connects to SQLite databases.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn connect(&self, dsn: &str, migrations_table: &str) -> Result<Box<dyn VersionStore>> {
        Ok(Box::new(SqliteVersionStore::connect(dsn, migrations_table)?))
    }
}

/// SQLite-backed version store. Keeps a single row in the migrations table.
pub struct SqliteVersionStore {
    conn: Connection,
    table: String,
}

impl SqliteVersionStore {
    /// Open the database named by `dsn` and ensure the migrations table exists.
    pub fn connect(dsn: &str, migrations_table: &str) -> Result<Self> {
        let conn = match parse_dsn(dsn)? {
            SqliteTarget::Memory => {
                debug!("opening in-memory migration database");
                Connection::open_in_memory().map_err(|e| {
                    Error::Connection(format!("failed to open in-memory database: {e}"))
                })?
            }
            SqliteTarget::File(path) => {
                info!("opening migration database at {}", path.display());
                Connection::open(&path).map_err(|e| {
                    Error::Connection(format!(
                        "failed to open database {}: {e}",
                        path.display()
                    ))
                })?
            }
        };
        Self::with_connection(conn, migrations_table)
    }

    pub fn with_connection(conn: Connection, migrations_table: &str) -> Result<Self> {
        let store = Self {
            conn,
            table: migrations_table.to_string(),
        };
        store.ensure_table()?;
        Ok(store)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn ensure_table(&self) -> Result<()> {
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (
                    version INTEGER NOT NULL PRIMARY KEY,
                    dirty BOOLEAN NOT NULL
                );",
                self.table
            ))
            .map_err(|e| {
                Error::Connection(format!(
                    "failed to create migrations table {}: {e}",
                    self.table
                ))
            })
    }
}

impl VersionStore for SqliteVersionStore {
    fn version(&mut self) -> Result<VersionState> {
        let row: Option<(i64, bool)> = self
            .conn
            .query_row(
                &format!("SELECT version, dirty FROM \"{}\" LIMIT 1", self.table),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to read migration version: {e}")))?;

        Ok(match row {
            None => VersionState::default(),
            Some((version, dirty)) => VersionState {
                version: u64::try_from(version).ok(),
                dirty,
            },
        })
    }

    fn set_version(&mut self, version: Option<u64>, dirty: bool) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to start transaction: {e}")))?;

        tx.execute(&format!("DELETE FROM \"{}\"", self.table), [])
            .map_err(|e| Error::Database(format!("failed to clear migration version: {e}")))?;

        let row = match version {
            Some(v) => Some(i64::try_from(v).map_err(|_| {
                Error::Database(format!("version {v} does not fit in a signed 64-bit column"))
            })?),
            None if dirty => Some(NIL_VERSION),
            None => None,
        };
        if let Some(row) = row {
            tx.execute(
                &format!(
                    "INSERT INTO \"{}\" (version, dirty) VALUES (?1, ?2)",
                    self.table
                ),
                params![row, dirty],
            )
            .map_err(|e| Error::Database(format!("failed to record migration version: {e}")))?;
        }

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit migration version: {e}")))
    }

    fn execute(&mut self, body: &str) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to start transaction: {e}")))?;
        tx.execute_batch(body)
            .map_err(|e| Error::Database(e.to_string()))?;
        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit migration: {e}")))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SqliteTarget {
    Memory,
    File(PathBuf),
}

/// Accepts `sqlite://path`, `sqlite3://path`, `file:path`, `:memory:` or a
/// bare path. Query strings are dropped.
fn parse_dsn(dsn: &str) -> Result<SqliteTarget> {
    let dsn = dsn.trim();
    if dsn.is_empty() {
        return Err(Error::Connection("empty database DSN".into()));
    }

    let rest = if let Some(rest) = dsn
        .strip_prefix("sqlite3://")
        .or_else(|| dsn.strip_prefix("sqlite://"))
    {
        rest
    } else if let Some(rest) = dsn.strip_prefix("file:") {
        rest
    } else if let Some((scheme, _)) = dsn.split_once("://") {
        return Err(Error::Connection(format!(
            "unsupported database scheme {scheme:?}, expected sqlite"
        )));
    } else {
        dsn
    };

    let path = rest.split('?').next().unwrap_or_default();
    match path {
        "" => Err(Error::Connection(format!("no database path in DSN {dsn:?}"))),
        ":memory:" => Ok(SqliteTarget::Memory),
        _ => Ok(SqliteTarget::File(Path::new(path).to_path_buf())),
    }
}
