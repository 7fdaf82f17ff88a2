//! Sparse records as returned by the REST API.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use xavyo_connector::error::{ConnectorError, ConnectorResult};

use crate::query::PRIMARY_KEY;

/// Timestamp layout used by the API, e.g. `2024-03-01T09:15:00.000+0000`.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// One remote object: table name plus its returned fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub table: String,
    pub fields: Map<String, Value>,
    /// Name of an external-ID field carried through updates, if the table has one.
    pub external_id_field: Option<String>,
}

impl Record {
    pub fn new(table: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            table: table.into(),
            fields,
            external_id_field: None,
        }
    }

    /// Build a record from a query or retrieve response element.
    ///
    /// The table comes from `attributes.type`, falling back to `table`.
    pub fn from_value(table: &str, value: Value) -> ConnectorResult<Self> {
        let Value::Object(mut fields) = value else {
            return Err(ConnectorError::Serialization {
                message: format!("expected {table} record to be a JSON object"),
            });
        };

        let attributes = fields.remove("attributes");
        let table = attributes
            .as_ref()
            .and_then(|a| a.get("type"))
            .and_then(Value::as_str)
            .unwrap_or(table)
            .to_string();

        Ok(Self::new(table, fields))
    }

    pub fn with_external_id(mut self, field: impl Into<String>) -> Self {
        self.external_id_field = Some(field.into());
        self
    }

    /// Primary key, empty when absent.
    #[must_use]
    pub fn id(&self) -> &str {
        self.str_or_empty(PRIMARY_KEY)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String value of a field; `None` when absent, null or not a string.
    #[must_use]
    pub fn string(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    #[must_use]
    pub fn str_or_empty(&self, field: &str) -> &str {
        self.string(field).unwrap_or("")
    }

    /// String field of a related object, e.g. `Profile.Name`.
    #[must_use]
    pub fn related_string(&self, relation: &str, field: &str) -> Option<&str> {
        self.fields
            .get(relation)
            .and_then(|r| r.get(field))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Boolean field. Accepts `true`, `"true"` and `1`; absent or null is false.
    pub fn flag(&self, field: &str) -> ConnectorResult<bool> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => Ok(s == "true"),
            Some(Value::Number(n)) => Ok(n.as_i64() == Some(1)),
            Some(other) => Err(ConnectorError::Serialization {
                message: format!("{}.{field} is not a boolean: {other}", self.table),
            }),
        }
    }

    /// Like [`Record::flag`], but absent or null yields `default`.
    pub fn flag_or(&self, field: &str, default: bool) -> ConnectorResult<bool> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(default),
            Some(_) => self.flag(field),
        }
    }

    /// Timestamp field converted to UTC. Absent, empty or unparseable values
    /// yield `None`.
    #[must_use]
    pub fn datetime(&self, field: &str) -> Option<DateTime<Utc>> {
        let raw = self.string(field).filter(|s| !s.is_empty())?;
        DateTime::parse_from_str(raw, DATETIME_FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Minimal update payload for this record.
    ///
    /// Carries the primary key, the external-ID field if any, and each
    /// allow-listed field whose current value is non-empty. Nothing outside
    /// the allow-list is ever re-submitted.
    #[must_use]
    pub fn copy_for_update(&self, allowed: &[&str]) -> RecordUpdate {
        let mut update = RecordUpdate::new(self.table.clone(), self.id());

        if let Some(ext) = &self.external_id_field {
            if let Some(value) = self.fields.get(ext).filter(|v| !is_empty_value(v)) {
                update.fields.insert(ext.clone(), value.clone());
            }
        }

        for field in allowed {
            if *field == PRIMARY_KEY {
                continue;
            }
            if let Some(value) = self.fields.get(*field).filter(|v| !is_empty_value(v)) {
                update.fields.insert((*field).to_string(), value.clone());
            }
        }

        update
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// A PATCH payload addressed by table and primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub table: String,
    pub id: String,
    pub fields: Map<String, Value>,
}

impl RecordUpdate {
    pub fn new(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Set or overwrite one field.
    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    /// Request body; the primary key travels in the URL, not the body.
    #[must_use]
    pub fn payload(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}
