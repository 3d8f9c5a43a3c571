pub mod env;

pub use env::{
    ENV_KEY_DSN, ENV_KEY_FILES_DIR, ENV_KEY_FORCE_VERSION, ENV_KEY_OPERATION, ENV_KEY_TABLE,
    MigrationEnv,
};
