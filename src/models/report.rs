// src/models/report.rs

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// A rule whose unique index cannot be created yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedRule {
    pub name: String,
    pub description: String,
    /// Number of key groups holding more than one row.
    pub duplicate_groups: i64,
}

/// Ready/blocked partition produced by one audit pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub ready: Vec<String>,
    pub blocked: Vec<BlockedRule>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.blocked.is_empty()
    }

    pub fn is_ready(&self, rule: &str) -> bool {
        self.ready.iter().any(|r| r == rule)
    }

    pub fn is_blocked(&self, rule: &str) -> bool {
        self.blocked.iter().any(|b| b.name == rule)
    }

    /// Duplicate group count for a blocked rule, 0 otherwise.
    pub fn duplicate_groups(&self, rule: &str) -> i64 {
        self.blocked
            .iter()
            .find(|b| b.name == rule)
            .map(|b| b.duplicate_groups)
            .unwrap_or(0)
    }
}

/// Rows removed while repairing one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleRepair {
    pub rule: String,
    pub rows_removed: u64,
    /// Dependent rows re-pointed at a survivor (entity merges only).
    pub references_rewritten: u64,
}

/// Outcome of one dedupe pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupeSummary {
    pub repairs: Vec<RuleRepair>,
}

impl DedupeSummary {
    pub fn rows_removed(&self) -> u64 {
        self.repairs.iter().map(|r| r.rows_removed).sum()
    }

    pub fn removed_for(&self, rule: &str) -> u64 {
        self.repairs
            .iter()
            .filter(|r| r.rule == rule)
            .map(|r| r.rows_removed)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Created,
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexOutcome {
    pub name: String,
    pub unique: bool,
    pub status: IndexStatus,
}

/// Orchestration states, in the order a run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Precheck,
    ReportOnly,
    Backup,
    Dedupe,
    Recheck,
    Apply,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Precheck => "PRECHECK",
            Phase::ReportOnly => "REPORT_ONLY",
            Phase::Backup => "BACKUP",
            Phase::Dedupe => "DEDUPE",
            Phase::Recheck => "RECHECK",
            Phase::Apply => "APPLY",
            Phase::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Terminal status of a run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every rule is ready (and applied, unless dry-run).
    Clean,
    /// Some rules are still blocked.
    Partial,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Clean => 0,
            RunStatus::Partial => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub phases: Vec<Phase>,
    pub initial_audit: AuditReport,
    /// Audit taken after dedupe, when dedupe ran.
    pub final_audit: Option<AuditReport>,
    pub dedupe: Option<DedupeSummary>,
    pub backup_file: Option<PathBuf>,
    pub indexes: Vec<IndexOutcome>,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    /// The audit the final status was computed from.
    pub fn effective_audit(&self) -> &AuditReport {
        self.final_audit.as_ref().unwrap_or(&self.initial_audit)
    }

    pub fn visited(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audit() -> AuditReport {
        AuditReport {
            ready: vec!["uq_revoked_tokens_jti".into()],
            blocked: vec![BlockedRule {
                name: "uq_users_email".into(),
                description: "Email must be unique".into(),
                duplicate_groups: 3,
            }],
        }
    }

    #[test]
    fn audit_lookups() {
        let a = audit();
        assert!(!a.is_clean());
        assert!(a.is_ready("uq_revoked_tokens_jti"));
        assert!(a.is_blocked("uq_users_email"));
        assert_eq!(a.duplicate_groups("uq_users_email"), 3);
        assert_eq!(a.duplicate_groups("uq_revoked_tokens_jti"), 0);
    }

    #[test]
    fn status_exit_codes() {
        assert_eq!(RunStatus::Clean.exit_code(), 0);
        assert_eq!(RunStatus::Partial.exit_code(), 1);
    }

    #[test]
    fn dedupe_totals() {
        let summary = DedupeSummary {
            repairs: vec![
                RuleRepair { rule: "a".into(), rows_removed: 2, references_rewritten: 5 },
                RuleRepair { rule: "b".into(), rows_removed: 1, references_rewritten: 0 },
                RuleRepair { rule: "a".into(), rows_removed: 1, references_rewritten: 0 },
            ],
        };
        assert_eq!(summary.rows_removed(), 4);
        assert_eq!(summary.removed_for("a"), 3);
    }

    #[test]
    fn phase_names_match_state_machine() {
        assert_eq!(Phase::ReportOnly.to_string(), "REPORT_ONLY");
        assert_eq!(serde_json::to_string(&Phase::ReportOnly).unwrap(), "\"report_only\"");
    }
}
