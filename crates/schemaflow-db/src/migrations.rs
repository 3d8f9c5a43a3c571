use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use schemaflow_common::{Error, Result};
use tracing::{debug, info};

/// `<version>_<title>.<up|down>.<ext>`, e.g. `1_create_users.up.sql`.
static FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)_(.*)\.(down|up)\.(.*)$").expect("migration file pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    /// Short form used in step trace lines (`3/u`, `3/d`).
    pub fn short(self) -> &'static str {
        match self {
            Direction::Up => "u",
            Direction::Down => "d",
        }
    }
}

/// One versioned change script. Either body may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: u64,
    pub name: String,
    pub up: Option<String>,
    pub down: Option<String>,
}

impl Migration {
    pub fn body(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Up => self.up.as_deref(),
            Direction::Down => self.down.as_deref(),
        }
    }
}

/// Ordered, read-only set of migrations keyed by version.
#[derive(Debug, Clone, Default)]
pub struct ScriptSource {
    migrations: BTreeMap<u64, Migration>,
}

impl ScriptSource {
    /// Load every `<version>_<title>.<up|down>.<ext>` file in `dir`.
    ///
    /// Non-matching files and subdirectories are skipped. A missing
    /// directory or a duplicated version/direction pair is an error.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "migrations directory {} does not exist or is not a directory",
                dir.display()
            )));
        }

        let mut migrations: BTreeMap<u64, Migration> = BTreeMap::new();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::Source(format!("failed to read {}: {e}", dir.display()))
        })?;

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some((version, name, direction)) = parse_file_name(file_name)? else {
                debug!("skipping {file_name}: not a migration file");
                continue;
            };

            let body = std::fs::read_to_string(entry.path()).map_err(|e| {
                Error::Source(format!("failed to read {}: {e}", entry.path().display()))
            })?;

            let migration = migrations.entry(version).or_insert_with(|| Migration {
                version,
                name: name.clone(),
                up: None,
                down: None,
            });
            let slot = match direction {
                Direction::Up => &mut migration.up,
                Direction::Down => &mut migration.down,
            };
            if slot.is_some() {
                return Err(Error::Source(format!(
                    "duplicate migration file: {file_name}"
                )));
            }
            *slot = Some(body);
        }

        info!(
            "loaded {} migration(s) from {}",
            migrations.len(),
            dir.display()
        );
        Ok(Self { migrations })
    }

    /// Build a source from already-loaded migrations.
    pub fn from_migrations<I>(migrations: I) -> Result<Self>
    where
        I: IntoIterator<Item = Migration>,
    {
        let mut map = BTreeMap::new();
        for migration in migrations {
            let version = migration.version;
            if map.insert(version, migration).is_some() {
                return Err(Error::Source(format!("duplicate migration version {version}")));
            }
        }
        Ok(Self { migrations: map })
    }

    pub fn get(&self, version: u64) -> Option<&Migration> {
        self.migrations.get(&version)
    }

    pub fn first(&self) -> Option<&Migration> {
        self.migrations.values().next()
    }

    /// Migrations with a version strictly greater than `version`, ascending.
    pub fn after(&self, version: u64) -> impl Iterator<Item = &Migration> {
        self.migrations
            .range((std::ops::Bound::Excluded(version), std::ops::Bound::Unbounded))
            .map(|(_, m)| m)
    }

    /// The version immediately preceding `version`, if any.
    pub fn prev(&self, version: u64) -> Option<u64> {
        self.migrations.range(..version).next_back().map(|(v, _)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

fn parse_file_name(file_name: &str) -> Result<Option<(u64, String, Direction)>> {
    let Some(caps) = FILE_NAME.captures(file_name) else {
        return Ok(None);
    };
    let version = caps[1].parse::<u64>().map_err(|e| {
        Error::Source(format!("invalid version in {file_name}: {e}"))
    })?;
    let direction = if &caps[3] == "up" {
        Direction::Up
    } else {
        Direction::Down
    };
    Ok(Some((version, caps[2].to_string(), direction)))
}
