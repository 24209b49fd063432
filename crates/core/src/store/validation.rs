//! Shape checks applied before a record reaches storage.

use policydesk_domain::mapping::remote_field;
use policydesk_domain::{record_id, PolicyDeskError, Record, Result, Table};

/// A full record: non-empty string id and only mapped fields.
pub fn validate_record(table: Table, record: &Record) -> Result<()> {
    record_id(record)?;
    validate_fields(table, record)
}

/// An update payload: at least one field, no id, only mapped fields.
pub fn validate_changes(table: Table, changes: &Record) -> Result<()> {
    if changes.is_empty() {
        return Err(PolicyDeskError::InvalidInput(format!("update on {table} has no changes")));
    }
    if changes.contains_key("id") {
        return Err(PolicyDeskError::InvalidInput(format!(
            "update on {table} must not change the id"
        )));
    }
    validate_fields(table, changes)
}

/// Only indexed fields can be queried.
pub fn validate_index_field(table: Table, field: &str) -> Result<()> {
    if table.is_indexed(field) {
        Ok(())
    } else {
        Err(PolicyDeskError::InvalidInput(format!("{table}.{field} is not an indexed field")))
    }
}

fn validate_fields(table: Table, record: &Record) -> Result<()> {
    match record.keys().find(|key| remote_field(table, key).is_none()) {
        Some(unknown) => {
            Err(PolicyDeskError::InvalidInput(format!("unknown field '{unknown}' for {table}")))
        }
        None => Ok(()),
    }
}
