//! Change event model and normalization
//!
//! `SourceChange` is the source-specific record handed in by the host;
//! [`normalize`] converts it into the canonical [`ChangeEvent`] envelope
//! that the rest of the pipeline consumes. Normalization is pure: no I/O,
//! no state, and failures are classified so the caller can skip the single
//! offending event instead of aborting the pipeline.

use crate::error::{Result, SinkError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Row-level mutation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// Row created
    Insert,
    /// Row modified
    Update,
    /// Row removed (materialized as a tombstone record)
    Delete,
}

impl Operation {
    /// Wire representation, matching the outbound record format
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Origin metadata attached to every event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Source table name
    pub table: String,

    /// Source database name
    pub database: String,

    /// Source-specific fields (transaction ids, positions, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventMetadata {
    /// Create metadata for a table in a database
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            extra: Map::new(),
        }
    }

    /// Attach a source-specific field (builder-style)
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A change record as emitted by the capture source, before normalization
#[derive(Debug, Clone, Deserialize)]
pub struct SourceChange {
    /// Operation kind as the source names it (case-insensitive)
    pub kind: String,

    /// Post-change row image
    #[serde(default)]
    pub after: Option<Value>,

    /// Pre-change row image
    #[serde(default)]
    pub before: Option<Value>,

    /// Origin metadata; `table` and `database` are required downstream
    pub metadata: EventMetadata,
}

impl SourceChange {
    /// Build an INSERT change
    pub fn insert(database: impl Into<String>, table: impl Into<String>, after: Value) -> Self {
        Self {
            kind: "INSERT".into(),
            after: Some(after),
            before: None,
            metadata: EventMetadata::new(database, table),
        }
    }

    /// Build an UPDATE change
    pub fn update(
        database: impl Into<String>,
        table: impl Into<String>,
        before: Option<Value>,
        after: Value,
    ) -> Self {
        Self {
            kind: "UPDATE".into(),
            after: Some(after),
            before,
            metadata: EventMetadata::new(database, table),
        }
    }

    /// Build a DELETE change
    pub fn delete(database: impl Into<String>, table: impl Into<String>, before: Value) -> Self {
        Self {
            kind: "DELETE".into(),
            after: None,
            before: Some(before),
            metadata: EventMetadata::new(database, table),
        }
    }

    /// Override the operation kind (builder-style, mainly for tests)
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }
}

/// Canonical change envelope, immutable once produced by [`normalize`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Mutation kind
    pub operation: Operation,

    /// Post-change state; for DELETE, a tombstone carrying key fields only
    pub payload: Map<String, Value>,

    /// Origin metadata
    pub metadata: EventMetadata,

    /// Pre-change state (UPDATE and DELETE, when the source supplies it)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Map<String, Value>>,
}

impl ChangeEvent {
    /// Source table this event belongs to
    pub fn table(&self) -> &str {
        &self.metadata.table
    }
}

/// One encoded destination stream entry: the §6 record format, JSON under
/// a single `event` field
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    /// JSON document appended as the `event` field of the stream entry
    pub json: String,
}

impl StreamRecord {
    /// Serialize a change event into its stream entry form
    pub fn encode(event: &ChangeEvent) -> Result<Self> {
        Ok(Self {
            json: serde_json::to_string(event)?,
        })
    }

    /// Decode a stream entry back into a change event
    pub fn decode(&self) -> Result<ChangeEvent> {
        Ok(serde_json::from_str(&self.json)?)
    }
}

/// Convert a source change into the canonical envelope.
///
/// `key_fields` names the identifying columns used to synthesize DELETE
/// tombstones. Unsupported operation kinds and structurally unusable
/// events yield event-local errors — the caller logs and skips them.
pub fn normalize(change: SourceChange, key_fields: &[String]) -> Result<ChangeEvent> {
    if change.metadata.table.is_empty() {
        return Err(SinkError::malformed("metadata.table is missing or empty"));
    }
    if change.metadata.database.is_empty() {
        return Err(SinkError::malformed("metadata.database is missing or empty"));
    }

    let operation = match change.kind.to_ascii_uppercase().as_str() {
        "INSERT" => Operation::Insert,
        "UPDATE" => Operation::Update,
        "DELETE" => Operation::Delete,
        other => {
            return Err(SinkError::UnsupportedOperation(format!(
                "operation kind '{}' for table '{}'",
                other, change.metadata.table
            )));
        }
    };

    match operation {
        Operation::Insert => {
            let payload = require_object("after", change.after)?;
            Ok(ChangeEvent {
                operation,
                payload,
                metadata: change.metadata,
                before: None,
            })
        }
        Operation::Update => {
            let payload = require_object("after", change.after)?;
            let before = optional_object("before", change.before)?;
            Ok(ChangeEvent {
                operation,
                payload,
                metadata: change.metadata,
                before,
            })
        }
        Operation::Delete => {
            // Some sources ship the removed row as a post-image instead of
            // a pre-image; accept either.
            let prior = match (change.before, change.after) {
                (Some(before), _) => require_object("before", Some(before))?,
                (None, Some(after)) => require_object("after", Some(after))?,
                (None, None) => {
                    return Err(SinkError::malformed(format!(
                        "DELETE for table '{}' carries no row image",
                        change.metadata.table
                    )));
                }
            };

            let payload = tombstone(&prior, key_fields);
            if payload.is_empty() {
                return Err(SinkError::malformed(format!(
                    "DELETE for table '{}' has none of the key fields {:?}",
                    change.metadata.table, key_fields
                )));
            }

            Ok(ChangeEvent {
                operation,
                payload,
                metadata: change.metadata,
                before: Some(prior),
            })
        }
    }
}

/// Project the identifying fields out of a row image
fn tombstone(row: &Map<String, Value>, key_fields: &[String]) -> Map<String, Value> {
    key_fields
        .iter()
        .filter_map(|field| row.get(field).map(|v| (field.clone(), v.clone())))
        .collect()
}

fn require_object(name: &str, value: Option<Value>) -> Result<Map<String, Value>> {
    match value {
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(SinkError::malformed(format!(
            "{} image is not a JSON object (got {})",
            name,
            json_kind(&other)
        ))),
        None => Err(SinkError::malformed(format!("{} image is missing", name))),
    }
}

fn optional_object(name: &str, value: Option<Value>) -> Result<Option<Map<String, Value>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        some => require_object(name, some).map(Some),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
