//! Bidirectional field-name mapping between local and remote records.
//!
//! Local records use camelCase keys; the remote backend uses snake_case
//! columns. Each table has one static, complete table of `(local, remote)`
//! pairs. A key missing from the table is an error in either direction so
//! that no field is ever dropped silently. Values are copied untouched, which
//! is how embedded `documents` and `notes` travel as opaque JSON.

use crate::errors::{PolicyDeskError, Result};
use crate::types::{Record, Table};

type FieldPairs = &'static [(&'static str, &'static str)];

const CUSTOMER_FIELDS: FieldPairs = &[
    ("id", "id"),
    ("createdAt", "created_at"),
    ("firstName", "first_name"),
    ("lastName", "last_name"),
    ("identityNumber", "identity_number"),
    ("phone", "phone"),
    ("type", "type"),
    ("assignedUserId", "assigned_user_id"),
    ("documents", "documents"),
    ("notes", "notes"),
];

const VEHICLE_FIELDS: FieldPairs = &[
    ("id", "id"),
    ("createdAt", "created_at"),
    ("plate", "plate"),
    ("brand", "brand"),
    ("model", "model"),
    ("year", "year"),
    ("chassisNumber", "chassis_number"),
    ("customerId", "customer_id"),
    ("inspectionDate", "inspection_date"),
];

const POLICY_FIELDS: FieldPairs = &[
    ("id", "id"),
    ("createdAt", "created_at"),
    ("customerId", "customer_id"),
    ("vehicleId", "vehicle_id"),
    ("startDate", "start_date"),
    ("endDate", "end_date"),
    ("price", "price"),
    ("type", "type"),
    ("policyNumber", "policy_number"),
];

const USER_FIELDS: FieldPairs = &[
    ("id", "id"),
    ("createdAt", "created_at"),
    ("email", "email"),
    ("role", "role"),
    ("name", "name"),
    ("assignedCustomerId", "assigned_customer_id"),
];

/// The `(local, remote)` field pairs of a table.
pub const fn field_pairs(table: Table) -> FieldPairs {
    match table {
        Table::Customers => CUSTOMER_FIELDS,
        Table::Vehicles => VEHICLE_FIELDS,
        Table::Policies => POLICY_FIELDS,
        Table::Users => USER_FIELDS,
    }
}

/// Remote column name for a local field.
pub fn remote_field(table: Table, local: &str) -> Option<&'static str> {
    field_pairs(table).iter().find(|(l, _)| *l == local).map(|(_, r)| *r)
}

/// Local field name for a remote column.
pub fn local_field(table: Table, remote: &str) -> Option<&'static str> {
    field_pairs(table).iter().find(|(_, r)| *r == remote).map(|(l, _)| *l)
}

/// Translate a local record (full row or changed fields) to remote names.
pub fn to_remote(table: Table, record: &Record) -> Result<Record> {
    translate(table, record, Direction::LocalToRemote)
}

/// Translate a remote row to local names.
pub fn to_local(table: Table, record: &Record) -> Result<Record> {
    translate(table, record, Direction::RemoteToLocal)
}

#[derive(Clone, Copy)]
enum Direction {
    LocalToRemote,
    RemoteToLocal,
}

fn translate(table: Table, record: &Record, direction: Direction) -> Result<Record> {
    let mut out = Record::new();
    for (key, value) in record {
        let mapped = match direction {
            Direction::LocalToRemote => remote_field(table, key),
            Direction::RemoteToLocal => local_field(table, key),
        };
        let Some(mapped) = mapped else {
            let side = match direction {
                Direction::LocalToRemote => "local",
                Direction::RemoteToLocal => "remote",
            };
            return Err(PolicyDeskError::InvalidInput(format!(
                "unmapped {side} field '{key}' for table {table}"
            )));
        };
        out.insert(mapped.to_string(), value.clone());
    }
    Ok(out)
}
