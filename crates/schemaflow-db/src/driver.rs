use std::sync::Arc;

use schemaflow_common::{Error, Logger, Result};
use schemaflow_config::MigrationEnv;

use crate::runner::{MigrationRunner, Operation, OperationRequest, RunOutcome, RunnerConfig};
use crate::version_store::{Connector, SqliteConnector};

/// Read `MIGRATION_*` settings from the process environment and run the
/// requested operation against a SQLite database.
pub fn run_migrations_from_env(logger: Arc<dyn Logger>) -> Result<RunOutcome> {
    let env = MigrationEnv::from_env()?;
    run_migrations(&env, &SqliteConnector, logger)
}

/// Same as [`run_migrations_from_env`] with an injected key lookup and
/// connector. Missing keys fail before `connector` is used.
pub fn run_migrations_with_lookup<F>(
    lookup: F,
    connector: &dyn Connector,
    logger: Arc<dyn Logger>,
) -> Result<RunOutcome>
where
    F: Fn(&str) -> Option<String>,
{
    let env = MigrationEnv::from_lookup(lookup)?;
    run_migrations(&env, connector, logger)
}

/// Run the single operation described by `env`, logging the version state
/// before and after.
///
/// An unknown operation id is rejected before connecting. A failed read of
/// the starting version is only logged; a failed read after a successful
/// operation is returned as [`Error::PostOperationVersion`].
pub fn run_migrations(
    env: &MigrationEnv,
    connector: &dyn Connector,
    logger: Arc<dyn Logger>,
) -> Result<RunOutcome> {
    env.operation.parse::<Operation>()?;

    let mut builder = RunnerConfig::builder().logger(logger.clone());
    if let Some(dir) = &env.files_dir {
        builder = builder.files_dir(dir.clone());
    }
    if let Some(table) = &env.migrations_table {
        builder = builder.migrations_table(table.clone());
    }
    let config = builder.build()?;

    let mut runner = MigrationRunner::connect_with(connector, &env.dsn, config)?;

    match runner.version() {
        Ok(state) => logger.info(&format!("migration version before operation: {state}")),
        Err(e) => logger.error(&format!("getting current migration version: {e}")),
    }

    let outcome = runner.run(&OperationRequest {
        id: env.operation.clone(),
        force_version: env.force_version,
    })?;

    logger.info("successfully finished migration");

    let state = runner
        .version()
        .map_err(|e| Error::PostOperationVersion {
            source: Box::new(e),
        })?;
    logger.info(&format!("migration version after operation: {state}"));

    Ok(outcome)
}
