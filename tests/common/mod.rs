// tests/common/mod.rs

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use constraint_migrator::{
    MigrationError, MigrationResult, migration::backup::BackupTool, session::Session,
    utils::conn_url::ConnectionParts,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// An isolated schema holding the quiz tables, dropped by `teardown`.
pub struct TestDb {
    pub pool: PgPool,
    pub schema: String,
    pub database_url: String,
}

/// Connects through DATABASE_URL and creates a fresh, empty schema.
pub async fn empty_db() -> TestDb {
    // Note: a running Postgres is required; DATABASE_URL points at it.
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    let schema = format!("cm_{}", uuid::Uuid::new_v4().simple());
    sqlx::query(&format!("CREATE SCHEMA \"{}\"", schema))
        .execute(&pool)
        .await
        .expect("Failed to create test schema");

    TestDb {
        pool,
        schema,
        database_url,
    }
}

/// Fresh schema with every quiz table and real foreign keys.
pub async fn quiz_db() -> TestDb {
    let db = empty_db().await;
    for ddl in [
        "CREATE TABLE {s}.users (
            id BIGINT PRIMARY KEY,
            email TEXT,
            student_id TEXT,
            created_at TIMESTAMPTZ DEFAULT now()
        )",
        "CREATE TABLE {s}.subjects (
            id BIGINT PRIMARY KEY,
            name TEXT NOT NULL,
            creator_id BIGINT REFERENCES {s}.users(id)
        )",
        "CREATE TABLE {s}.question_bank (
            id BIGINT PRIMARY KEY,
            subject_id BIGINT REFERENCES {s}.subjects(id),
            creator_id BIGINT REFERENCES {s}.users(id)
        )",
        "CREATE TABLE {s}.quizzes (
            id BIGINT PRIMARY KEY,
            title TEXT NOT NULL,
            creator_id BIGINT REFERENCES {s}.users(id),
            subject_id BIGINT REFERENCES {s}.subjects(id)
        )",
        "CREATE TABLE {s}.questions (
            id BIGINT PRIMARY KEY,
            quiz_id BIGINT REFERENCES {s}.quizzes(id),
            question_bank_id BIGINT REFERENCES {s}.question_bank(id)
        )",
        "CREATE TABLE {s}.quiz_attempts (
            id BIGINT PRIMARY KEY,
            quiz_id BIGINT REFERENCES {s}.quizzes(id),
            student_id BIGINT REFERENCES {s}.users(id)
        )",
        "CREATE TABLE {s}.answers (
            id BIGINT PRIMARY KEY,
            attempt_id BIGINT REFERENCES {s}.quiz_attempts(id),
            question_id BIGINT REFERENCES {s}.questions(id),
            answer_text TEXT,
            answered_at TIMESTAMPTZ
        )",
        "CREATE TABLE {s}.quiz_assignments (
            id BIGINT PRIMARY KEY,
            quiz_id BIGINT REFERENCES {s}.quizzes(id),
            student_id BIGINT REFERENCES {s}.users(id),
            assigned_at TIMESTAMPTZ
        )",
        "CREATE TABLE {s}.revoked_tokens (
            id BIGINT PRIMARY KEY,
            jti TEXT,
            subject TEXT,
            revoked_at TIMESTAMPTZ
        )",
        "CREATE TABLE {s}.user_token_blocks (
            id BIGINT PRIMARY KEY,
            user_id BIGINT REFERENCES {s}.users(id),
            revoked_before TIMESTAMPTZ
        )",
    ] {
        db.exec(ddl).await;
    }
    db
}

impl TestDb {
    pub fn session(&self) -> Session {
        Session::from_pool(self.pool.clone(), &self.database_url, &self.schema)
            .expect("valid test session")
    }

    /// Runs a statement after replacing `{s}` with the quoted test schema.
    pub async fn exec(&self, sql: &str) {
        let sql = sql.replace("{s}", &format!("\"{}\"", self.schema));
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .unwrap_or_else(|e| panic!("statement failed: {}\n{}", e, sql));
    }

    pub async fn scalar(&self, sql: &str) -> i64 {
        let sql = sql.replace("{s}", &format!("\"{}\"", self.schema));
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .unwrap_or_else(|e| panic!("query failed: {}\n{}", e, sql))
    }

    pub async fn ids(&self, sql: &str) -> Vec<i64> {
        let sql = sql.replace("{s}", &format!("\"{}\"", self.schema));
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| panic!("query failed: {}\n{}", e, sql))
    }

    pub async fn index_exists(&self, name: &str) -> bool {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM pg_indexes WHERE schemaname = $1 AND indexname = $2)",
        )
        .bind(&self.schema)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .expect("pg_indexes lookup")
    }

    pub async fn teardown(self) {
        sqlx::query(&format!("DROP SCHEMA \"{}\" CASCADE", self.schema))
            .execute(&self.pool)
            .await
            .expect("Failed to drop test schema");
        self.pool.close().await;
    }
}

/// Backup tool that always fails, as a missing or broken pg_dump would.
pub struct FailingBackup;

#[async_trait]
impl BackupTool for FailingBackup {
    async fn dump(&self, _target: &ConnectionParts, _file: &Path) -> MigrationResult<()> {
        Err(MigrationError::Backup("pg_dump failed with exit code 1".to_string()))
    }
}

/// Backup tool that records every requested file.
#[derive(Default)]
pub struct RecordingBackup {
    pub files: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl BackupTool for RecordingBackup {
    async fn dump(&self, _target: &ConnectionParts, file: &Path) -> MigrationResult<()> {
        self.files.lock().unwrap().push(file.to_path_buf());
        Ok(())
    }
}

pub fn backup_path() -> PathBuf {
    std::env::temp_dir().join(format!("cm_backup_{}.dump", uuid::Uuid::new_v4().simple()))
}
