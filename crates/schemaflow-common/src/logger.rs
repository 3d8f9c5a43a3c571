use std::fmt;

use tracing::{error, info};

/// Logging capability injected into a migration runner.
///
/// `info` and `error` carry the runner's own progress messages. `printf`
/// receives the engine's step-by-step trace output.
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
    fn printf(&self, args: fmt::Arguments<'_>);
}

/// Discards everything. Used when no logger is supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn info(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn printf(&self, _args: fmt::Arguments<'_>) {}
}

/// Forwards to the `tracing` macros under the `schemaflow` target.
/// Level filtering is left to the installed subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        info!(target: "schemaflow", "{message}");
    }

    fn error(&self, message: &str) {
        error!(target: "schemaflow", "{message}");
    }

    fn printf(&self, args: fmt::Arguments<'_>) {
        info!(target: "schemaflow::engine", "{args}");
    }
}
