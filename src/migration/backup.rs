// src/migration/backup.rs

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::process::Command;

use crate::{
    error::{MigrationError, MigrationResult},
    utils::conn_url::ConnectionParts,
};

/// Logical backup facility run before destructive work.
#[async_trait]
pub trait BackupTool: Send + Sync {
    /// Writes a snapshot of `target` to `file`. Any error aborts the run.
    async fn dump(&self, target: &ConnectionParts, file: &Path) -> MigrationResult<()>;
}

/// `pg_dump` in custom format.
pub struct PgDump {
    program: String,
}

impl PgDump {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Program, arguments and extra environment for one dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// Builds the `pg_dump` call; the password travels in `PGPASSWORD`, never on the command line.
pub fn dump_invocation(program: &str, target: &ConnectionParts, file: &Path) -> DumpInvocation {
    let args = vec![
        "-h".to_string(),
        target.host.clone(),
        "-p".to_string(),
        target.port.to_string(),
        "-U".to_string(),
        target.user.clone(),
        "-d".to_string(),
        target.database.clone(),
        "-Fc".to_string(),
        "-f".to_string(),
        file.display().to_string(),
    ];
    let env = target
        .password
        .iter()
        .map(|p| ("PGPASSWORD".to_string(), p.clone()))
        .collect();

    DumpInvocation {
        program: program.to_string(),
        args,
        env,
    }
}

#[async_trait]
impl BackupTool for PgDump {
    async fn dump(&self, target: &ConnectionParts, file: &Path) -> MigrationResult<()> {
        let invocation = dump_invocation(&self.program, target, file);

        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .status()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => MigrationError::Backup(format!(
                    "{} not found in PATH. Install PostgreSQL client tools or run without --backup-file",
                    self.program
                )),
                _ => MigrationError::Backup(format!("failed to start {}: {}", self.program, e)),
            })?;

        if !status.success() {
            return Err(MigrationError::Backup(match status.code() {
                Some(code) => format!("{} failed with exit code {}", self.program, code),
                None => format!("{} was terminated by a signal", self.program),
            }));
        }
        Ok(())
    }
}

/// A directory target gets a timestamped dump file inside it.
pub fn resolve_backup_path(requested: &Path, now: DateTime<Local>) -> PathBuf {
    if requested.is_dir() {
        requested.join(format!("constraints_{}.dump", now.format("%Y%m%d_%H%M%S")))
    } else {
        requested.to_path_buf()
    }
}

/// Runs the gate. Returns the file written; nothing has mutated if this fails.
pub async fn run_backup_gate(
    tool: &dyn BackupTool,
    target: &ConnectionParts,
    requested: &Path,
) -> MigrationResult<PathBuf> {
    let file = resolve_backup_path(requested, Local::now());
    tracing::info!("Creating backup: {}", file.display());

    tool.dump(target, &file).await.map_err(|e| {
        tracing::error!("{}", e);
        e
    })?;

    tracing::info!("Backup created successfully");
    Ok(file)
}
