// src/utils/ident.rs

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{MigrationError, MigrationResult};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid identifier regex"));

/// Rejects anything that is not a plain, unquoted-safe SQL identifier.
/// Schema names come from the environment and are spliced into generated SQL.
pub fn ensure_identifier(name: &str) -> MigrationResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(MigrationError::Precondition(format!(
            "'{}' is not a valid SQL identifier",
            name
        )))
    }
}

/// Double-quotes an identifier.
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."table"`
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote(schema), quote(table))
}
