use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use schemaflow_common::{Error, Logger};
use schemaflow_db::{
    MigrationRunner, OperationRequest, RunOutcome, RunnerConfig, SqliteConnector, VersionState,
    run_migrations_with_lookup,
};
use tempfile::TempDir;

/// Collects every line the runner and engine emit.
#[derive(Default)]
struct CaptureLogger(Mutex<Vec<String>>);

impl Logger for CaptureLogger {
    fn info(&self, message: &str) {
        self.0.lock().unwrap().push(format!("info: {message}"));
    }
    fn error(&self, message: &str) {
        self.0.lock().unwrap().push(format!("error: {message}"));
    }
    fn printf(&self, args: fmt::Arguments<'_>) {
        self.0.lock().unwrap().push(format!("trace: {args}"));
    }
}

/// A scripts directory plus a SQLite database file, both temporary.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir(dir.path().join("migrations")).unwrap();
        Self { dir }
    }

    fn scripts(&self) -> PathBuf {
        self.dir.path().join("migrations")
    }

    fn db_path(&self) -> PathBuf {
        self.dir.path().join("app.db")
    }

    fn dsn(&self) -> String {
        format!("sqlite://{}", self.db_path().display())
    }

    fn script(&self, name: &str, body: &str) -> &Self {
        std::fs::write(self.scripts().join(name), body).unwrap();
        self
    }

    fn standard_scripts(&self) -> &Self {
        self.script(
            "1_create_users.up.sql",
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
        )
        .script("1_create_users.down.sql", "DROP TABLE users;")
        .script(
            "2_add_email.up.sql",
            "ALTER TABLE users ADD COLUMN email TEXT;",
        )
        .script("2_add_email.down.sql", "ALTER TABLE users DROP COLUMN email;")
        .script(
            "3_create_posts.up.sql",
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL);",
        )
        .script("3_create_posts.down.sql", "DROP TABLE posts;")
    }

    fn runner(&self, logger: Arc<dyn Logger>) -> MigrationRunner {
        let config = RunnerConfig::builder()
            .files_dir(self.scripts())
            .logger(logger)
            .build()
            .unwrap();
        MigrationRunner::new(&self.dsn(), config).unwrap()
    }

    fn quiet_runner(&self) -> MigrationRunner {
        self.runner(Arc::new(schemaflow_common::NoopLogger))
    }

    fn tables(&self) -> Vec<String> {
        table_names(&self.db_path())
    }
}

fn table_names(db: &Path) -> Vec<String> {
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name != 'schema_migrations' ORDER BY name",
        )
        .unwrap();
    stmt.query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn state(version: u64, dirty: bool) -> VersionState {
    VersionState {
        version: Some(version),
        dirty,
    }
}

#[test]
fn up_applies_every_script_then_reports_no_change() {
    let fx = Fixture::new();
    fx.standard_scripts();
    let mut runner = fx.quiet_runner();

    let outcome = runner.run(&OperationRequest::new("up")).unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Migrated {
            versions: vec![1, 2, 3]
        }
    );
    assert_eq!(runner.version().unwrap(), state(3, false));
    assert_eq!(fx.tables(), vec!["posts", "users"]);

    let outcome = runner.run(&OperationRequest::new("up")).unwrap();
    assert_eq!(outcome, RunOutcome::NoChange);
    assert_eq!(runner.version().unwrap(), state(3, false));
}

#[test]
fn state_survives_reconnecting() {
    let fx = Fixture::new();
    fx.standard_scripts();
    fx.quiet_runner().run(&OperationRequest::new("up")).unwrap();

    let mut runner = fx.quiet_runner();
    assert_eq!(runner.version().unwrap(), state(3, false));

    fx.script("4_add_index.up.sql", "CREATE INDEX idx_posts_user ON posts(user_id);");
    let mut runner = fx.quiet_runner();
    assert_eq!(
        runner.run(&OperationRequest::new("up")).unwrap(),
        RunOutcome::Migrated { versions: vec![4] }
    );
}

#[test]
fn down_rolls_back_one_step_at_a_time() {
    let fx = Fixture::new();
    fx.standard_scripts();
    let mut runner = fx.quiet_runner();
    runner.run(&OperationRequest::new("up")).unwrap();

    assert_eq!(
        runner.run(&OperationRequest::new("down")).unwrap(),
        RunOutcome::RolledBack {
            from: 3,
            to: Some(2)
        }
    );
    assert_eq!(runner.version().unwrap(), state(2, false));
    assert_eq!(fx.tables(), vec!["users"]);

    runner.run(&OperationRequest::new("down")).unwrap();
    runner.run(&OperationRequest::new("down")).unwrap();
    assert_eq!(runner.version().unwrap(), VersionState::default());
    assert!(fx.tables().is_empty());

    let err = runner.run(&OperationRequest::new("down")).unwrap_err();
    assert!(matches!(err.root(), Error::NoVersion));
}

#[test]
fn failed_script_marks_dirty_and_force_recovers() {
    let fx = Fixture::new();
    fx.standard_scripts()
        .script("4_broken.up.sql", "CREATE TABLE tags (id INTEGER); INSERT INTO nowhere VALUES (1);");
    let mut runner = fx.quiet_runner();

    let err = runner.run(&OperationRequest::new("up")).unwrap_err();
    assert!(err.to_string().starts_with("operation up failed: migration 4/up failed"));
    assert!(matches!(err.root(), Error::Step { version: 4, .. }));

    // Observability keeps working while dirty.
    assert_eq!(runner.version().unwrap(), state(4, true));

    let err = runner.run(&OperationRequest::new("up")).unwrap_err();
    assert!(err.is_dirty());
    let err = runner.run(&OperationRequest::new("down")).unwrap_err();
    assert!(err.is_dirty());

    assert_eq!(
        runner.run(&OperationRequest::force(3)).unwrap(),
        RunOutcome::Forced { version: Some(3) }
    );
    assert_eq!(runner.version().unwrap(), state(3, false));
    assert_eq!(fx.tables(), vec!["posts", "users"]);
}

#[test]
fn force_sets_versions_that_have_no_script() {
    let fx = Fixture::new();
    fx.standard_scripts();
    let mut runner = fx.quiet_runner();

    runner.run(&OperationRequest::force(0)).unwrap();
    assert_eq!(runner.version().unwrap(), state(0, false));

    runner.run(&OperationRequest::force(250)).unwrap();
    assert_eq!(runner.version().unwrap(), state(250, false));
    assert!(fx.tables().is_empty());

    runner.run(&OperationRequest::force(-1)).unwrap();
    assert_eq!(runner.version().unwrap(), VersionState::default());
}

#[test]
fn unsupported_operation_leaves_state_alone() {
    let fx = Fixture::new();
    fx.standard_scripts();
    let mut runner = fx.quiet_runner();
    runner.run(&OperationRequest::new("up")).unwrap();

    let err = runner.run(&OperationRequest::new("redo")).unwrap_err();
    assert_eq!(err.to_string(), "unsupported migration operation: redo");
    assert_eq!(runner.version().unwrap(), state(3, false));
}

#[test]
fn runner_and_engine_logs_reach_the_logger() {
    let fx = Fixture::new();
    fx.script("1_only.up.sql", "CREATE TABLE only_one (id INTEGER);");
    let logger = Arc::new(CaptureLogger::default());
    let mut runner = fx.runner(logger.clone());

    runner.run(&OperationRequest::new("up")).unwrap();
    runner.run(&OperationRequest::new("up")).unwrap();

    let lines = logger.0.lock().unwrap();
    assert_eq!(lines[0], "info: running migrate UP");
    assert_eq!(lines[1], "trace: start 1/u only");
    assert!(lines[2].starts_with("trace: 1/u only ("));
    assert_eq!(lines[3], "info: running migrate UP");
    assert_eq!(
        lines[4],
        format!("info: no new migrations found in: {}", fx.scripts().display())
    );
}

#[test]
fn bad_dsn_is_a_connection_error() {
    let fx = Fixture::new();
    fx.standard_scripts();
    let config = RunnerConfig::builder()
        .files_dir(fx.scripts())
        .build()
        .unwrap();

    let err = MigrationRunner::new("postgres://localhost/app", config)
        .err()
        .expect("postgres DSN must be rejected");
    assert!(matches!(err, Error::Connection(_)));
}

#[test]
fn environment_driver_runs_against_sqlite() {
    let fx = Fixture::new();
    fx.standard_scripts();
    let dsn = fx.dsn();
    let files_dir = fx.scripts().display().to_string();
    let logger = Arc::new(CaptureLogger::default());

    let lookup = |op: &'static str| {
        let dsn = dsn.clone();
        let files_dir = files_dir.clone();
        move |key: &str| match key {
            "MIGRATION_DSN" => Some(dsn.clone()),
            "MIGRATION_OPERATION" => Some(op.to_string()),
            "MIGRATION_FILES_DIR" => Some(files_dir.clone()),
            _ => None,
        }
    };

    let outcome = run_migrations_with_lookup(lookup("up"), &SqliteConnector, logger.clone()).unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Migrated {
            versions: vec![1, 2, 3]
        }
    );

    let outcome =
        run_migrations_with_lookup(lookup("down"), &SqliteConnector, logger.clone()).unwrap();
    assert_eq!(
        outcome,
        RunOutcome::RolledBack {
            from: 3,
            to: Some(2)
        }
    );

    let lines = logger.0.lock().unwrap();
    assert!(lines.contains(&"info: migration version before operation: 3, dirty: false".to_string()));
    assert!(lines.contains(&"info: migration version after operation: 2, dirty: false".to_string()));
}

#[test]
fn version_state_serializes_for_reporting() {
    let json = serde_json::to_value(state(7, true)).unwrap();
    assert_eq!(json, serde_json::json!({"version": 7, "dirty": true}));

    let json = serde_json::to_value(VersionState::default()).unwrap();
    assert_eq!(json, serde_json::json!({"version": null, "dirty": false}));
}
