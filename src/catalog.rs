// src/catalog.rs

//! Declarative rule table for the quiz schema.
//!
//! Adding a constraint means adding an entry here; the auditor, deduplicator
//! and index applier are driven entirely by these records.

use std::collections::BTreeSet;

use crate::models::rule::{
    ConstraintRule, EntityMerge, ForeignKeyRef, LookupIndex, Remediation, RowDedupe,
};

/// Every column that stores a `users.id`.
pub const USER_REFERENCES: &[ForeignKeyRef] = &[
    ForeignKeyRef { table: "quizzes", column: "creator_id" },
    ForeignKeyRef { table: "subjects", column: "creator_id" },
    ForeignKeyRef { table: "question_bank", column: "creator_id" },
    ForeignKeyRef { table: "quiz_attempts", column: "student_id" },
    ForeignKeyRef { table: "quiz_assignments", column: "student_id" },
    ForeignKeyRef { table: "user_token_blocks", column: "user_id" },
];

pub const UNIQUE_RULES: &[ConstraintRule] = &[
    ConstraintRule {
        name: "uq_answers_attempt_question",
        table: "answers",
        columns: &["attempt_id", "question_id"],
        partial: false,
        description: "One answer per question in each attempt",
        remediation: Remediation::RowDedupe(RowDedupe { recency_column: "answered_at" }),
    },
    ConstraintRule {
        name: "uq_quiz_assignments_quiz_student",
        table: "quiz_assignments",
        columns: &["quiz_id", "student_id"],
        partial: false,
        description: "One assignment per student per quiz",
        remediation: Remediation::RowDedupe(RowDedupe { recency_column: "assigned_at" }),
    },
    ConstraintRule {
        name: "uq_revoked_tokens_jti",
        table: "revoked_tokens",
        columns: &["jti"],
        partial: false,
        description: "JWT jti must be globally unique",
        remediation: Remediation::RowDedupe(RowDedupe { recency_column: "revoked_at" }),
    },
    ConstraintRule {
        name: "uq_user_token_blocks_user_id",
        table: "user_token_blocks",
        columns: &["user_id"],
        partial: false,
        description: "Single token-block row per user",
        remediation: Remediation::RowDedupe(RowDedupe { recency_column: "revoked_before" }),
    },
    ConstraintRule {
        name: "uq_users_email",
        table: "users",
        columns: &["email"],
        partial: false,
        description: "Email must be unique",
        remediation: Remediation::EntityMerge(EntityMerge { references: USER_REFERENCES }),
    },
    ConstraintRule {
        name: "uq_users_student_id",
        table: "users",
        columns: &["student_id"],
        partial: true,
        description: "Student/teacher user ID must be unique when present",
        remediation: Remediation::EntityMerge(EntityMerge { references: USER_REFERENCES }),
    },
];

pub const LOOKUP_INDEXES: &[LookupIndex] = &[
    LookupIndex { name: "ix_answers_attempt_id", table: "answers", columns: &["attempt_id"] },
    LookupIndex { name: "ix_answers_question_id", table: "answers", columns: &["question_id"] },
    LookupIndex { name: "ix_question_bank_subject_id", table: "question_bank", columns: &["subject_id"] },
    LookupIndex { name: "ix_question_bank_creator_id", table: "question_bank", columns: &["creator_id"] },
    LookupIndex { name: "ix_questions_quiz_id", table: "questions", columns: &["quiz_id"] },
    LookupIndex { name: "ix_questions_question_bank_id", table: "questions", columns: &["question_bank_id"] },
    LookupIndex { name: "ix_quiz_attempts_quiz_id", table: "quiz_attempts", columns: &["quiz_id"] },
    LookupIndex { name: "ix_quiz_attempts_student_id", table: "quiz_attempts", columns: &["student_id"] },
    LookupIndex { name: "ix_quizzes_creator_id", table: "quizzes", columns: &["creator_id"] },
    LookupIndex { name: "ix_quizzes_subject_id", table: "quizzes", columns: &["subject_id"] },
    LookupIndex { name: "ix_subjects_creator_id", table: "subjects", columns: &["creator_id"] },
];

/// Tables the given rules and indexes touch, including merge references.
pub fn required_tables(rules: &[ConstraintRule], lookups: &[LookupIndex]) -> BTreeSet<&'static str> {
    let mut tables = BTreeSet::new();
    for rule in rules {
        tables.insert(rule.table);
        match &rule.remediation {
            Remediation::EntityMerge(merge) => {
                tables.extend(merge.references.iter().map(|r| r.table));
            }
            Remediation::RowDedupe(_) => {}
        }
    }
    tables.extend(lookups.iter().map(|l| l.table));
    tables
}
