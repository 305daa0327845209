// src/migration/index.rs

use sqlx::PgConnection;

use crate::{
    error::MigrationResult,
    models::{
        report::{AuditReport, IndexOutcome, IndexStatus},
        rule::{ConstraintRule, LookupIndex},
    },
    session::Session,
};

/// Creates unique indexes for ready rules plus every lookup index.
///
/// * Only rules the given audit lists as ready are touched; a blocked rule never gets its index.
/// * All statements are `IF NOT EXISTS` and run in one transaction.
pub async fn apply_indexes(
    session: &Session,
    rules: &[ConstraintRule],
    audit: &AuditReport,
    lookups: &[LookupIndex],
) -> MigrationResult<Vec<IndexOutcome>> {
    let schema = session.schema();
    let mut tx = session.pool().begin().await?;
    let mut outcomes = Vec::new();

    tracing::info!("Applying safe indexes...");

    for rule in rules.iter().filter(|r| audit.is_ready(r.name)) {
        let status = ensure_index(&mut tx, schema, rule.name, &rule.create_sql(schema)).await?;
        tracing::info!("  Applied {} ({})", rule.name, describe(status));
        outcomes.push(IndexOutcome {
            name: rule.name.to_string(),
            unique: true,
            status,
        });
    }

    for lookup in lookups {
        let status = ensure_index(&mut tx, schema, lookup.name, &lookup.create_sql(schema)).await?;
        tracing::info!("  Ensured {} ({})", lookup.name, describe(status));
        outcomes.push(IndexOutcome {
            name: lookup.name.to_string(),
            unique: false,
            status,
        });
    }

    tx.commit().await?;
    Ok(outcomes)
}

async fn ensure_index(
    conn: &mut PgConnection,
    schema: &str,
    name: &str,
    create_sql: &str,
) -> MigrationResult<IndexStatus> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM pg_indexes WHERE schemaname = $1 AND indexname = $2)",
    )
    .bind(schema)
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(create_sql)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create index {}: {:?}", name, e);
            e
        })?;

    Ok(if exists { IndexStatus::AlreadyPresent } else { IndexStatus::Created })
}

fn describe(status: IndexStatus) -> &'static str {
    match status {
        IndexStatus::Created => "created",
        IndexStatus::AlreadyPresent => "already present",
    }
}
