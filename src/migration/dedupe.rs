// src/migration/dedupe.rs

use sqlx::PgConnection;

use crate::{
    error::{MigrationError, MigrationResult},
    migration::audit::count_duplicate_groups,
    models::{
        report::{AuditReport, DedupeSummary, RuleRepair},
        rule::{ConstraintRule, EntityMerge, ForeignKeyRef, Remediation, RowDedupe},
    },
    session::Session,
    utils::ident::{qualified, quote},
};

/// Removes duplicates for blocked rules in a single transaction.
///
/// * Entity merges run first, for each merge rule the audit found blocked.
/// * Every row-dedupe rule is then re-counted inside the same transaction,
///   since merging identities can create new fact duplicates.
/// * Any failure drops the transaction: nothing is merged or deleted.
pub async fn deduplicate(
    session: &Session,
    rules: &[ConstraintRule],
    audit: &AuditReport,
) -> MigrationResult<DedupeSummary> {
    let schema = session.schema();
    let mut tx = session.pool().begin().await?;
    let mut summary = DedupeSummary::default();

    tracing::info!("Running deterministic auto-fix for duplicate rows...");

    for rule in rules {
        match &rule.remediation {
            Remediation::EntityMerge(merge) if audit.is_blocked(rule.name) => {
                merge_entities(&mut tx, schema, rule, merge, rules, &mut summary).await?;
            }
            Remediation::EntityMerge(_) | Remediation::RowDedupe(_) => {}
        }
    }

    for rule in rules {
        match &rule.remediation {
            Remediation::RowDedupe(dedupe) => {
                if count_duplicate_groups(&mut tx, schema, rule).await? == 0 {
                    continue;
                }
                let removed = dedupe_rows(&mut tx, schema, rule, dedupe).await?;
                tracing::info!("Deduped {}: removed {} rows", rule.table, removed);
                summary.repairs.push(RuleRepair {
                    rule: rule.name.to_string(),
                    rows_removed: removed,
                    references_rewritten: 0,
                });
            }
            Remediation::EntityMerge(_) => {}
        }
    }

    tx.commit().await?;
    tracing::info!(rows_removed = summary.rows_removed(), "Auto-fix committed");
    Ok(summary)
}

/// Re-points every reference to the survivor, then deletes the other rows.
async fn merge_entities(
    conn: &mut PgConnection,
    schema: &str,
    rule: &ConstraintRule,
    merge: &EntityMerge,
    rules: &[ConstraintRule],
    summary: &mut DedupeSummary,
) -> MigrationResult<()> {
    let mut rewritten = 0;

    for fk in merge.references {
        // Re-pointing can make two rows of a deduped table collide; resolve
        // that first with the table's own keep policy.
        if let Some((target, dedupe)) = collision_rule(rules, fk) {
            let sql = collision_sql(schema, rule, fk, target, dedupe);
            let removed = execute(conn, &sql, rule).await?;
            if removed > 0 {
                tracing::info!(
                    "Resolved {} {} row(s) that would collide after merging {}",
                    removed,
                    target.table,
                    rule.name
                );
                summary.repairs.push(RuleRepair {
                    rule: target.name.to_string(),
                    rows_removed: removed,
                    references_rewritten: 0,
                });
            }
        }

        let sql = rewrite_sql(schema, rule, fk);
        let updated = execute(conn, &sql, rule).await?;
        tracing::debug!(table = fk.table, column = fk.column, updated, "references rewritten");
        rewritten += updated;
    }

    let sql = delete_merged_sql(schema, rule);
    let removed = execute(conn, &sql, rule).await?;
    tracing::info!(
        "Merged {} by {}: removed {} duplicate row(s), rewrote {} reference(s)",
        rule.table,
        rule.columns.join(", "),
        removed,
        rewritten
    );

    summary.repairs.push(RuleRepair {
        rule: rule.name.to_string(),
        rows_removed: removed,
        references_rewritten: rewritten,
    });
    Ok(())
}

/// Keeps the most recent row of every key group.
async fn dedupe_rows(
    conn: &mut PgConnection,
    schema: &str,
    rule: &ConstraintRule,
    dedupe: &RowDedupe,
) -> MigrationResult<u64> {
    let sql = row_dedupe_sql(schema, rule, dedupe);
    execute(conn, &sql, rule).await
}

async fn execute(conn: &mut PgConnection, sql: &str, rule: &ConstraintRule) -> MigrationResult<u64> {
    let result = sqlx::query(sql).execute(conn).await.map_err(|e| {
        let err = MigrationError::from(e);
        tracing::error!("Auto-fix for {} failed, rolling back: {}", rule.name, err);
        err
    })?;
    Ok(result.rows_affected())
}

/// Row-dedupe rule on the referencing table whose key contains the reference column.
fn collision_rule<'a>(
    rules: &'a [ConstraintRule],
    fk: &ForeignKeyRef,
) -> Option<(&'a ConstraintRule, &'a RowDedupe)> {
    rules.iter().find_map(|r| match &r.remediation {
        Remediation::RowDedupe(d) if r.table == fk.table && r.columns.contains(&fk.column) => Some((r, d)),
        Remediation::RowDedupe(_) | Remediation::EntityMerge(_) => None,
    })
}

/// `old_id -> keep_id` for every non-survivor; survivor is the smallest id of its key group.
fn merge_pairs_cte(schema: &str, rule: &ConstraintRule) -> String {
    format!(
        "WITH dup_map AS (\
            SELECT id AS old_id, MIN(id) OVER (PARTITION BY {key}) AS keep_id \
            FROM {table} WHERE {filter}\
        ), \
        pairs AS (\
            SELECT old_id, keep_id FROM dup_map WHERE old_id <> keep_id\
        )",
        key = rule.key_list(),
        table = qualified(schema, rule.table),
        filter = rule.key_not_null(None),
    )
}

pub(crate) fn rewrite_sql(schema: &str, rule: &ConstraintRule, fk: &ForeignKeyRef) -> String {
    format!(
        "{cte} UPDATE {table} r SET {col} = p.keep_id FROM pairs p WHERE r.{col} = p.old_id",
        cte = merge_pairs_cte(schema, rule),
        table = qualified(schema, fk.table),
        col = quote(fk.column),
    )
}

pub(crate) fn delete_merged_sql(schema: &str, rule: &ConstraintRule) -> String {
    format!(
        "{cte} DELETE FROM {table} u USING pairs p WHERE u.id = p.old_id",
        cte = merge_pairs_cte(schema, rule),
        table = qualified(schema, rule.table),
    )
}

/// Deletes rows of `target` that would share a key once `fk` is re-pointed.
pub(crate) fn collision_sql(
    schema: &str,
    rule: &ConstraintRule,
    fk: &ForeignKeyRef,
    target: &ConstraintRule,
    dedupe: &RowDedupe,
) -> String {
    let projected = target
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if *c == fk.column {
                format!("COALESCE(p.keep_id, t.{}) AS k{}", quote(c), i)
            } else {
                format!("t.{} AS k{}", quote(c), i)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let partition = (0..target.columns.len())
        .map(|i| format!("k{}", i))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "{cte}, \
        remapped AS (\
            SELECT t.id, t.{recency} AS recency, {projected} \
            FROM {table} t LEFT JOIN pairs p ON t.{col} = p.old_id \
            WHERE {filter}\
        ), \
        ranked AS (\
            SELECT id, ROW_NUMBER() OVER (PARTITION BY {partition} ORDER BY recency DESC NULLS LAST, id DESC) AS rn \
            FROM remapped\
        ) \
        DELETE FROM {table} x USING ranked r WHERE x.id = r.id AND r.rn > 1",
        cte = merge_pairs_cte(schema, rule),
        recency = quote(dedupe.recency_column),
        table = qualified(schema, target.table),
        col = quote(fk.column),
        filter = target.key_not_null(Some("t")),
    )
}

pub(crate) fn row_dedupe_sql(schema: &str, rule: &ConstraintRule, dedupe: &RowDedupe) -> String {
    format!(
        "WITH ranked AS (\
            SELECT id, ROW_NUMBER() OVER (PARTITION BY {key} ORDER BY {recency} DESC NULLS LAST, id DESC) AS rn \
            FROM {table} WHERE {filter}\
        ) \
        DELETE FROM {table} x USING ranked r WHERE x.id = r.id AND r.rn > 1",
        key = rule.key_list(),
        recency = quote(dedupe.recency_column),
        table = qualified(schema, rule.table),
        filter = rule.key_not_null(None),
    )
}
