use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbInfraError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Configuration error: min pool size {min} exceeds max pool size {max}")]
    InvalidPoolRange { min: u32, max: u32 },

    #[error("External connection source '{name}' not found (tried: {})", tried.join(", "))]
    ResourceLookup { name: String, tried: Vec<String> },

    #[error("Connection source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("Dialect error: {message}")]
    Dialect { message: String },

    #[error("Mapped table '{table}' failed verification")]
    MappingVerification {
        table: String,
        #[source]
        source: DbErr,
    },

    /// The migration runner failed; `source` carries the underlying cause.
    #[error("Error creating database schema from changelog '{changelog}'")]
    Migration {
        changelog: &'static str,
        #[source]
        source: MigrationError,
    },

    #[error("Database error: {0}")]
    Db(#[from] DbErr),
}

impl DbInfraError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Causes of a failed migration run.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("connection source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("dialect detection failed")]
    Dialect(#[source] DbErr),

    #[error("changelog lock table '{table}' could not be prepared")]
    LockTable {
        table: String,
        #[source]
        source: DbErr,
    },

    #[error("changelog lock '{table}' query failed")]
    Lock {
        table: String,
        #[source]
        source: DbErr,
    },

    #[error("changelog lock '{table}' not acquired after {elapsed_ms}ms ({attempts} attempts)")]
    LockTimeout {
        table: String,
        elapsed_ms: u128,
        attempts: u32,
    },

    #[error("migration cancelled after {elapsed_ms}ms")]
    Cancelled { elapsed_ms: u128 },

    #[error("failed to read applied migrations")]
    SchemaCheck(#[source] DbErr),

    #[error("applying changelog failed")]
    Apply(#[source] DbErr),

    #[error("migration body timed out after {timeout_ms}ms")]
    BodyTimeout { timeout_ms: u128 },

    #[error("migration task ended abnormally: {reason}")]
    TaskAborted { reason: &'static str },

    #[error("verification failed: expected {expected} applied migrations, found {applied}")]
    Verification { expected: usize, applied: usize },
}
