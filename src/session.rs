// src/session.rs

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Config;
use crate::error::{MigrationError, MigrationResult};
use crate::utils::conn_url::{self, ConnectionParts};
use crate::utils::ident::ensure_identifier;

/// Database handle for one migration invocation.
///
/// Holds a single-connection pool: every pass runs on the same connection,
/// one transaction at a time. Call `close()` when the run is over.
pub struct Session {
    pool: PgPool,
    schema: String,
    connection: ConnectionParts,
}

impl Session {
    /// Connects with a bounded retry loop.
    /// Refuses non-PostgreSQL URLs before any network traffic.
    pub async fn connect(config: &Config) -> MigrationResult<Self> {
        config.validate()?;
        let connection = conn_url::parse(&config.database_url)?;

        let mut retry_count = 0;
        let pool = loop {
            match PgPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Duration::from_secs(3))
                .connect(&config.database_url)
                .await
            {
                Ok(pool) => break pool,
                Err(e) => {
                    retry_count += 1;
                    if retry_count > config.connect_retries {
                        return Err(MigrationError::Database(format!(
                            "failed to connect after {} attempt(s): {}",
                            retry_count, e
                        )));
                    }
                    tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        };

        tracing::info!(host = %connection.host, database = %connection.database, "Database connected");

        Ok(Self {
            pool,
            schema: config.schema.clone(),
            connection,
        })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool, database_url: &str, schema: &str) -> MigrationResult<Self> {
        ensure_identifier(schema)?;
        Ok(Self {
            pool,
            schema: schema.to_string(),
            connection: conn_url::parse(database_url)?,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn connection(&self) -> &ConnectionParts {
        &self.connection
    }

    /// Checks the dialect the live server reports.
    pub async fn ensure_postgres(&self) -> MigrationResult<String> {
        let version: String = sqlx::query_scalar("SELECT version()")
            .fetch_one(&self.pool)
            .await?;

        if !version.starts_with("PostgreSQL") {
            return Err(MigrationError::Precondition(format!(
                "this tool is for PostgreSQL only, server reports: {}",
                version
            )));
        }
        Ok(version)
    }

    /// Returns the subset of `tables` absent from the session schema, sorted.
    pub async fn missing_tables<'a, I>(&self, tables: I) -> MigrationResult<Vec<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: Vec<String> = sqlx::query_scalar(
            "SELECT table_name::TEXT FROM information_schema.tables WHERE table_schema = $1",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;

        let mut missing: Vec<String> = tables
            .into_iter()
            .filter(|t| !present.iter().any(|p| p == t))
            .map(str::to_string)
            .collect();
        missing.sort();
        missing.dedup();
        Ok(missing)
    }

    pub async fn close(self) {
        self.pool.close().await;
        tracing::debug!("Database session closed");
    }
}
