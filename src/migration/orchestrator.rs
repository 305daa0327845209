// src/migration/orchestrator.rs

use std::path::PathBuf;

use crate::{
    catalog::{self, LOOKUP_INDEXES, UNIQUE_RULES},
    error::{MigrationError, MigrationResult},
    migration::{
        audit::{audit, log_plan},
        backup::{BackupTool, run_backup_gate},
        dedupe::deduplicate,
        index::apply_indexes,
    },
    models::{
        report::{Phase, RunReport, RunStatus},
        rule::{ConstraintRule, LookupIndex},
    },
    session::Session,
};

/// Operator choices for one run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Create indexes instead of only reporting.
    pub apply: bool,
    /// Repair duplicates for blocked rules. Requires `apply`.
    pub auto_fix: bool,
    /// Snapshot target taken before any repair.
    pub backup_file: Option<PathBuf>,
    /// Acknowledges that repairs may run without a snapshot.
    pub skip_backup: bool,
}

impl RunOptions {
    pub fn validate(&self) -> MigrationResult<()> {
        if self.auto_fix && !self.apply {
            return Err(MigrationError::Precondition("--auto-fix requires --apply".to_string()));
        }
        if self.backup_file.is_some() && self.skip_backup {
            return Err(MigrationError::Precondition(
                "--backup-file and --skip-backup are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runs the migration with the built-in rule catalog.
pub async fn run(
    session: &Session,
    options: &RunOptions,
    backup: &dyn BackupTool,
) -> MigrationResult<RunReport> {
    run_with(session, UNIQUE_RULES, LOOKUP_INDEXES, options, backup).await
}

/// Runs the migration state machine over the given rules.
///
/// PRECHECK → REPORT_ONLY (dry run) or
/// PRECHECK → [BACKUP → DEDUPE → RECHECK] → APPLY, always ending in DONE.
pub async fn run_with(
    session: &Session,
    rules: &[ConstraintRule],
    lookups: &[LookupIndex],
    options: &RunOptions,
    backup: &dyn BackupTool,
) -> MigrationResult<RunReport> {
    options.validate()?;
    if options.backup_file.is_some() && !options.auto_fix {
        tracing::warn!("--backup-file has no effect without --auto-fix");
    }

    let mut phases = vec![Phase::Precheck];
    tracing::info!(phase = %Phase::Precheck, "Running PostgreSQL constraint pre-checks...");

    let version = session.ensure_postgres().await?;
    tracing::debug!(%version, "server version");

    let missing = session
        .missing_tables(catalog::required_tables(rules, lookups))
        .await?;
    if !missing.is_empty() {
        return Err(MigrationError::Precondition(format!(
            "schema '{}' is missing table(s): {}",
            session.schema(),
            missing.join(", ")
        )));
    }

    let initial_audit = audit(session, rules).await?;
    log_plan(&initial_audit, rules);

    if !options.apply {
        phases.push(Phase::ReportOnly);
        phases.push(Phase::Done);
        tracing::info!("Dry run only. Re-run with --apply to execute safe index creation.");
        let status = status_of(initial_audit.is_clean());
        return Ok(RunReport {
            status,
            phases,
            initial_audit,
            final_audit: None,
            dedupe: None,
            backup_file: None,
            indexes: Vec::new(),
        });
    }

    let mut final_audit = None;
    let mut dedupe = None;
    let mut backup_file = None;

    if options.auto_fix && !initial_audit.is_clean() {
        match (&options.backup_file, options.skip_backup) {
            (Some(requested), _) => {
                phases.push(Phase::Backup);
                tracing::info!(phase = %Phase::Backup, "Backup gate");
                backup_file = Some(run_backup_gate(backup, session.connection(), requested).await?);
            }
            (None, true) => {
                tracing::warn!(
                    "Auto-fix is running without backup. Recommended: re-run with --backup-file <path>"
                );
            }
            (None, false) => {
                return Err(MigrationError::Precondition(
                    "auto-fix deletes rows; pass --backup-file <path> or --skip-backup".to_string(),
                ));
            }
        }

        phases.push(Phase::Dedupe);
        tracing::info!(phase = %Phase::Dedupe, "Deduplicating blocked rules");
        dedupe = Some(deduplicate(session, rules, &initial_audit).await?);

        phases.push(Phase::Recheck);
        let recheck = audit(session, rules).await?;
        tracing::info!(phase = %Phase::Recheck, "Re-check after auto-fix:");
        if recheck.is_clean() {
            tracing::info!("  All target unique constraints are now clean");
        } else {
            for blocked in &recheck.blocked {
                tracing::warn!(
                    "  - {}: still blocked with {} duplicate group(s)",
                    blocked.name,
                    blocked.duplicate_groups
                );
            }
        }
        final_audit = Some(recheck);
    }

    let effective = final_audit.as_ref().unwrap_or(&initial_audit);

    phases.push(Phase::Apply);
    let indexes = apply_indexes(session, rules, effective, lookups).await?;

    let status = status_of(effective.is_clean());
    phases.push(Phase::Done);

    match status {
        RunStatus::Clean => {
            tracing::info!("All targeted PostgreSQL constraints/indexes are applied safely.")
        }
        RunStatus::Partial => tracing::warn!(
            "Migration applied partially. Resolve remaining duplicates, then re-run with --apply."
        ),
    }

    Ok(RunReport {
        status,
        phases,
        initial_audit,
        final_audit,
        dedupe,
        backup_file,
        indexes,
    })
}

fn status_of(clean: bool) -> RunStatus {
    if clean { RunStatus::Clean } else { RunStatus::Partial }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_fix_requires_apply() {
        let options = RunOptions {
            auto_fix: true,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(MigrationError::Precondition(_))));
    }

    #[test]
    fn backup_and_skip_conflict() {
        let options = RunOptions {
            apply: true,
            auto_fix: true,
            backup_file: Some(PathBuf::from("x.dump")),
            skip_backup: true,
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn defaults_are_a_dry_run() {
        let options = RunOptions::default();
        assert!(!options.apply && !options.auto_fix);
        assert!(options.validate().is_ok());
    }
}
