//! Required-field validation
//!
//! Runs before any store access; a failure has no side effects.

use crate::error::{Result, StorageError};

/// Fail with `Missing required <context> fields: a, b` when any value is blank
///
/// Fields are reported in the order given.
pub fn require_fields(context: &str, fields: &[(&str, Option<&str>)]) -> Result<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        return Ok(());
    }
    Err(StorageError::validation(format!(
        "Missing required {} fields: {}",
        context,
        missing.join(", ")
    )))
}

/// Registry documents need line, machine, type and name
pub fn validate_machine_document(
    line: &str,
    machine: &str,
    doc_type: &str,
    doc_name: &str,
) -> Result<()> {
    require_fields(
        "machine history",
        &[
            ("line", Some(line)),
            ("machine", Some(machine)),
            ("doc_type", Some(doc_type)),
            ("doc_name", Some(doc_name)),
        ],
    )
}
