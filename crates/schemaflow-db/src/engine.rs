use std::time::Instant;

use schemaflow_common::{Error, Result};

use crate::logger::EngineLog;
use crate::migrations::{Direction, Migration, ScriptSource};
use crate::version_store::{VersionState, VersionStore};

/// Versions touched by an up or down pass, in the order they ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub versions: Vec<u64>,
}

impl StepReport {
    /// `true` when nothing was applied or reverted.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Applies scripts from a [`ScriptSource`] against a [`VersionStore`].
///
/// Each step first records its target version as dirty, runs the body, then
/// records the same target as clean. A failure in between leaves the dirty
/// marker in place and every later up/down is refused until `force`.
pub struct Migrator {
    source: ScriptSource,
    store: Box<dyn VersionStore>,
    log: Box<dyn EngineLog>,
}

impl Migrator {
    pub fn new(source: ScriptSource, store: Box<dyn VersionStore>, log: Box<dyn EngineLog>) -> Self {
        Self { source, store, log }
    }

    pub fn source(&self) -> &ScriptSource {
        &self.source
    }

    pub fn version(&mut self) -> Result<VersionState> {
        self.store.version()
    }

    /// Apply every migration newer than the recorded version, ascending.
    pub fn up(&mut self) -> Result<StepReport> {
        let current = self.clean_version()?;
        let pending: Vec<Migration> = match current {
            None => self.source.iter().cloned().collect(),
            Some(v) => {
                self.source.get(v).ok_or(Error::MissingVersion(v))?;
                self.source.after(v).cloned().collect()
            }
        };

        let mut report = StepReport::default();
        for migration in &pending {
            self.run_step(migration, Direction::Up, Some(migration.version))?;
            report.versions.push(migration.version);
        }
        Ok(report)
    }

    /// Revert exactly the most recently applied migration.
    pub fn down_one(&mut self) -> Result<StepReport> {
        let current = self.clean_version()?.ok_or(Error::NoVersion)?;
        let migration = self
            .source
            .get(current)
            .cloned()
            .ok_or(Error::MissingVersion(current))?;
        let target = self.source.prev(current);

        self.run_step(&migration, Direction::Down, target)?;
        Ok(StepReport {
            versions: vec![current],
        })
    }

    /// Record `version` as clean without running anything. `-1` clears the
    /// version entirely.
    pub fn force(&mut self, version: i64) -> Result<()> {
        let target = match version {
            -1 => None,
            v if v < -1 => return Err(Error::InvalidVersion(v)),
            v => Some(v as u64),
        };
        self.store.set_version(target, false)
    }

    fn clean_version(&mut self) -> Result<Option<u64>> {
        let state = self.store.version()?;
        if state.dirty {
            return Err(Error::Dirty {
                version: state.version,
            });
        }
        Ok(state.version)
    }

    fn run_step(
        &mut self,
        migration: &Migration,
        direction: Direction,
        target: Option<u64>,
    ) -> Result<()> {
        let started = Instant::now();

        match migration.body(direction) {
            None => {
                self.store.set_version(target, false)?;
                if self.log.verbose() {
                    self.log.printf(format_args!(
                        "{}/{} {} (no {} script)",
                        migration.version,
                        direction.short(),
                        migration.name,
                        direction.as_str()
                    ));
                }
            }
            Some(body) => {
                if self.log.verbose() {
                    self.log.printf(format_args!(
                        "start {}/{} {}",
                        migration.version,
                        direction.short(),
                        migration.name
                    ));
                }
                self.store.set_version(target, true)?;
                self.store.execute(body).map_err(|e| Error::Step {
                    version: migration.version,
                    direction: direction.as_str(),
                    message: e.to_string(),
                })?;
                self.store.set_version(target, false)?;
                if self.log.verbose() {
                    self.log.printf(format_args!(
                        "{}/{} {} ({:.1?})",
                        migration.version,
                        direction.short(),
                        migration.name,
                        started.elapsed()
                    ));
                }
            }
        }
        Ok(())
    }
}
