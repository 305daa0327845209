// src/error.rs

use std::fmt;

/// Global Migration Error Enum.
/// Every variant is a hard failure: the run stops and the process exits with code 2.
/// Blocked constraints left over after auto-fix are not errors (see `RunStatus::Partial`).
#[derive(Debug)]
pub enum MigrationError {
    // Wrong engine, invalid flags, missing tables, bad configuration
    Precondition(String),

    // Backup tool missing or exited non-zero
    Backup(String),

    // Foreign-key or unique violation inside a mutating transaction
    Integrity(String),

    // Any other store failure
    Database(String),
}

pub type MigrationResult<T> = Result<T, MigrationError>;

impl MigrationError {
    /// Process exit code for a failed run.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationError::Precondition(msg) => write!(f, "precondition failed: {}", msg),
            MigrationError::Backup(msg) => write!(f, "backup failed: {}", msg),
            MigrationError::Integrity(msg) => write!(f, "integrity violation: {}", msg),
            MigrationError::Database(msg) => write!(f, "database error: {}", msg),
        }
    }
}

impl std::error::Error for MigrationError {}

/// Converts `sqlx::Error` into `MigrationError`.
/// Constraint violations (SQLSTATE 23503 / 23505) become `Integrity` so the
/// operator can tell a missed reference apart from a connectivity problem.
impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_foreign_key_violation() || db_err.is_unique_violation() {
                return MigrationError::Integrity(db_err.message().to_string());
            }
        }
        MigrationError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        MigrationError::Database(err.to_string())
    }
}
