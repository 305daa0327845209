// src/migration/audit.rs

use sqlx::PgConnection;

use crate::{
    error::MigrationResult,
    models::{
        report::{AuditReport, BlockedRule},
        rule::ConstraintRule,
    },
    session::Session,
};

/// Classifies every rule as ready or blocked.
///
/// * Read-only: runs in a `REPEATABLE READ, READ ONLY` transaction so every
///   count comes from the same snapshot.
/// * Rule order is preserved in both partitions.
pub async fn audit(session: &Session, rules: &[ConstraintRule]) -> MigrationResult<AuditReport> {
    let mut tx = session.pool().begin().await?;

    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await?;

    let mut report = AuditReport::default();
    for rule in rules {
        let groups = count_duplicate_groups(&mut tx, session.schema(), rule).await?;
        if groups > 0 {
            tracing::debug!(rule = rule.name, groups, "rule blocked");
            report.blocked.push(BlockedRule {
                name: rule.name.to_string(),
                description: rule.description.to_string(),
                duplicate_groups: groups,
            });
        } else {
            report.ready.push(rule.name.to_string());
        }
    }

    tx.commit().await?;
    Ok(report)
}

/// Number of key groups with more than one row, on the given connection.
pub(crate) async fn count_duplicate_groups(
    conn: &mut PgConnection,
    schema: &str,
    rule: &ConstraintRule,
) -> MigrationResult<i64> {
    let sql = rule.duplicate_count_sql(schema);
    let count: Option<i64> = sqlx::query_scalar(&sql)
        .fetch_one(conn)
        .await
        .map_err(|e| {
            tracing::error!("Failed to count duplicates for {}: {:?}", rule.name, e);
            e
        })?;
    Ok(count.unwrap_or(0))
}

/// Logs the plan: one line per rule with its status.
pub fn log_plan(report: &AuditReport, rules: &[ConstraintRule]) {
    if report.is_clean() {
        tracing::info!("No duplicate groups found for targeted unique constraints");
    } else {
        tracing::warn!("Duplicate data detected. These unique indexes are blocked:");
        for blocked in &report.blocked {
            tracing::warn!(
                "  - {}: {} duplicate group(s) found ({})",
                blocked.name,
                blocked.duplicate_groups,
                blocked.description
            );
        }
    }

    tracing::info!("Planned unique indexes:");
    for rule in rules {
        let status = if report.is_blocked(rule.name) { "BLOCKED" } else { "READY" };
        tracing::info!("  - {}: {}", rule.name, status);
    }
}
