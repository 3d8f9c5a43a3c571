pub mod driver;
pub mod engine;
pub mod logger;
pub mod migrations;
pub mod runner;
pub mod version_store;

pub use driver::{run_migrations, run_migrations_from_env, run_migrations_with_lookup};
pub use engine::{Migrator, StepReport};
pub use logger::{EngineLog, LoggerAdapter};
pub use migrations::{Direction, Migration, ScriptSource};
pub use runner::{
    DEFAULT_FILES_DIR, MigrationRunner, Operation, OperationRequest, RunOutcome, RunnerConfig,
    RunnerConfigBuilder,
};
pub use version_store::{
    Connector, DEFAULT_MIGRATIONS_TABLE, SqliteConnector, SqliteVersionStore, VersionState,
    VersionStore,
};
