// src/config.rs

use std::env;
use dotenvy::dotenv;

use crate::error::{MigrationError, MigrationResult};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    /// Schema that holds the quiz tables.
    pub schema: String,
    /// Logical backup program invoked by the backup gate.
    pub pg_dump_bin: String,
    pub log_dir: String,
    pub connect_retries: u32,
}

impl Config {
    pub fn from_env() -> MigrationResult<Self> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").unwrap_or_default();

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let schema = env::var("MIGRATION_SCHEMA")
            .unwrap_or_else(|_| "public".to_string());

        let pg_dump_bin = env::var("PG_DUMP_BIN")
            .unwrap_or_else(|_| "pg_dump".to_string());

        let log_dir = env::var("MIGRATION_LOG_DIR")
            .unwrap_or_else(|_| "logs".to_string());

        let connect_retries = match env::var("DB_CONNECT_RETRIES") {
            Ok(raw) => raw.parse::<u32>().map_err(|_| {
                MigrationError::Precondition(format!("DB_CONNECT_RETRIES must be a number, got '{}'", raw))
            })?,
            Err(_) => 5,
        };

        Ok(Self {
            database_url,
            rust_log,
            schema,
            pg_dump_bin,
            log_dir,
            connect_retries,
        })
    }

    /// Checks the settings that must hold before any connection is attempted.
    pub fn validate(&self) -> MigrationResult<()> {
        if self.database_url.is_empty() {
            return Err(MigrationError::Precondition(
                "DATABASE_URL must be set (or pass --database-url)".to_string(),
            ));
        }
        crate::utils::ident::ensure_identifier(&self.schema)?;
        Ok(())
    }
}
