use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("migration source error: {0}")]
    Source(String),

    #[error("unsupported migration operation: {0}")]
    UnsupportedOperation(String),

    #[error("dirty database version {}: fix and force version", display_version(.version))]
    Dirty { version: Option<u64> },

    #[error("no migration version recorded, nothing to roll back")]
    NoVersion,

    #[error("no migration found for version {0}")]
    MissingVersion(u64),

    #[error("invalid force version {0}: must be -1 or greater")]
    InvalidVersion(i64),

    #[error("migration {version}/{direction} failed: {message}")]
    Step {
        version: u64,
        direction: &'static str,
        message: String,
    },

    #[error("operation {operation} failed: {source}")]
    Operation {
        operation: String,
        #[source]
        source: Box<Error>,
    },

    #[error("getting migration version after operation: {source}")]
    PostOperationVersion {
        #[source]
        source: Box<Error>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Strip operation and post-operation wrappers down to the underlying cause.
    pub fn root(&self) -> &Error {
        match self {
            Error::Operation { source, .. } | Error::PostOperationVersion { source } => {
                source.root()
            }
            other => other,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self.root(), Error::Config(_))
    }

    pub fn is_unsupported_operation(&self) -> bool {
        matches!(self.root(), Error::UnsupportedOperation(_))
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.root(), Error::Dirty { .. })
    }
}

fn display_version(version: &Option<u64>) -> String {
    match version {
        Some(v) => v.to_string(),
        None => "none".to_string(),
    }
}
