use std::fmt;
use std::sync::Arc;

use schemaflow_common::Logger;

/// Trace sink used by the migration engine for per-step output.
pub trait EngineLog: Send + Sync {
    fn printf(&self, args: fmt::Arguments<'_>);

    /// Whether step-by-step output is wanted at all.
    fn verbose(&self) -> bool;
}

/// Adapts an application [`Logger`] to [`EngineLog`].
///
/// Verbose output is always on here; level filtering belongs to the
/// wrapped logger.
#[derive(Clone)]
pub struct LoggerAdapter {
    logger: Arc<dyn Logger>,
}

impl LoggerAdapter {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }

    pub fn info(&self, message: &str) {
        self.logger.info(message);
    }

    pub fn error(&self, message: &str) {
        self.logger.error(message);
    }
}

impl EngineLog for LoggerAdapter {
    fn printf(&self, args: fmt::Arguments<'_>) {
        self.logger.printf(args);
    }

    fn verbose(&self) -> bool {
        true
    }
}
