//! Record representation shared by the local and remote stores.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::table::Table;
use crate::errors::{PolicyDeskError, Result};

/// A single row as a JSON object.
///
/// Records in the local store use local (camelCase) field names; records on
/// the wire use remote (snake_case) field names. See [`crate::mapping`].
pub type Record = serde_json::Map<String, Value>;

/// Typed entity stored in one of the synchronized tables.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table this entity lives in.
    const TABLE: Table;

    /// Partial update payload; only set fields are serialized.
    type Changes: Serialize + Send + Sync;

    fn id(&self) -> &str;

    /// Serialize into a local record.
    fn to_record(&self) -> Result<Record> {
        into_record(serde_json::to_value(self)?)
    }

    /// Deserialize from a local record.
    fn from_record(record: Record) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(record))?)
    }
}

/// Serialize a change set into a local record containing only changed fields.
pub fn changes_to_record<C: Serialize>(changes: &C) -> Result<Record> {
    into_record(serde_json::to_value(changes)?)
}

fn into_record(value: Value) -> Result<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(PolicyDeskError::InvalidInput(format!(
            "expected a JSON object record, got {other}"
        ))),
    }
}

/// Extract the `id` field of a record.
pub fn record_id(record: &Record) -> Result<&str> {
    match record.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id),
        Some(_) => Err(PolicyDeskError::InvalidInput("record id must be a non-empty string".into())),
        None => Err(PolicyDeskError::InvalidInput("record is missing an id".into())),
    }
}
