// src/models/rule.rs

use crate::utils::ident::{qualified, quote};

/// A uniqueness rule the migration wants to enforce with a unique index.
/// Declared statically in `catalog`; identity is `name`, which is also the index name.
#[derive(Debug, Clone)]
pub struct ConstraintRule {
    pub name: &'static str,

    /// Table that receives the unique index.
    pub table: &'static str,

    /// Uniqueness key. Rows with a NULL in any key column never collide.
    pub columns: &'static [&'static str],

    /// Emit `WHERE <col> IS NOT NULL` on the index itself.
    pub partial: bool,

    /// Human-readable explanation shown in the plan.
    pub description: &'static str,

    /// How duplicates are repaired when the rule is blocked.
    pub remediation: Remediation,
}

/// Repair strategy for a blocked rule.
#[derive(Debug, Clone)]
pub enum Remediation {
    /// Duplicate identity rows: keep the smallest id, re-point references, delete the rest.
    EntityMerge(EntityMerge),
    /// Duplicate leaf facts: keep the most recent row, delete the rest.
    RowDedupe(RowDedupe),
}

#[derive(Debug, Clone)]
pub struct EntityMerge {
    /// Every foreign key that can point at the merged entity.
    pub references: &'static [ForeignKeyRef],
}

#[derive(Debug, Clone)]
pub struct RowDedupe {
    /// Newest value wins; NULLs rank last, ties fall back to the highest id.
    pub recency_column: &'static str,
}

/// `table.column` referencing the `id` of a merged entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub table: &'static str,
    pub column: &'static str,
}

/// Non-unique lookup index; always safe to create.
#[derive(Debug, Clone)]
pub struct LookupIndex {
    pub name: &'static str,
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

impl ConstraintRule {
    /// `a IS NOT NULL AND b IS NOT NULL`, optionally prefixed by a table alias.
    pub fn key_not_null(&self, alias: Option<&str>) -> String {
        self.columns
            .iter()
            .map(|c| match alias {
                Some(a) => format!("{}.{} IS NOT NULL", a, quote(c)),
                None => format!("{} IS NOT NULL", quote(c)),
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Comma-separated quoted key columns.
    pub fn key_list(&self) -> String {
        self.columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
    }

    /// Counts key groups holding more than one row.
    pub fn duplicate_count_sql(&self, schema: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM (SELECT {key} FROM {table} WHERE {filter} GROUP BY {key} HAVING COUNT(*) > 1) d",
            key = self.key_list(),
            table = qualified(schema, self.table),
            filter = self.key_not_null(None),
        )
    }

    pub fn create_sql(&self, schema: &str) -> String {
        let mut sql = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
            quote(self.name),
            qualified(schema, self.table),
            self.key_list()
        );
        if self.partial {
            sql.push_str(" WHERE ");
            sql.push_str(&self.key_not_null(None));
        }
        sql
    }
}

impl LookupIndex {
    pub fn create_sql(&self, schema: &str) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote(self.name),
            qualified(schema, self.table),
            self.columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWERS: ConstraintRule = ConstraintRule {
        name: "uq_answers_attempt_question",
        table: "answers",
        columns: &["attempt_id", "question_id"],
        partial: false,
        description: "One answer per question in each attempt",
        remediation: Remediation::RowDedupe(RowDedupe { recency_column: "answered_at" }),
    };

    #[test]
    fn duplicate_count_groups_on_the_full_key() {
        assert_eq!(
            ANSWERS.duplicate_count_sql("public"),
            "SELECT COUNT(*) FROM (SELECT \"attempt_id\", \"question_id\" FROM \"public\".\"answers\" \
             WHERE \"attempt_id\" IS NOT NULL AND \"question_id\" IS NOT NULL \
             GROUP BY \"attempt_id\", \"question_id\" HAVING COUNT(*) > 1) d"
        );
    }

    #[test]
    fn partial_rule_adds_where_clause() {
        let rule = ConstraintRule {
            name: "uq_users_student_id",
            table: "users",
            columns: &["student_id"],
            partial: true,
            description: "",
            remediation: Remediation::EntityMerge(EntityMerge { references: &[] }),
        };
        assert_eq!(
            rule.create_sql("s1"),
            "CREATE UNIQUE INDEX IF NOT EXISTS \"uq_users_student_id\" ON \"s1\".\"users\" (\"student_id\") \
             WHERE \"student_id\" IS NOT NULL"
        );
        assert!(!ANSWERS.create_sql("s1").contains("WHERE"));
    }

    #[test]
    fn aliased_filter() {
        assert_eq!(
            ANSWERS.key_not_null(Some("t")),
            "t.\"attempt_id\" IS NOT NULL AND t.\"question_id\" IS NOT NULL"
        );
    }
}
