//! Change-event envelope
//!
//! The output message shape: a `schema` section describing the typed fields
//! of the row, and a `payload` section carrying `before`/`after` images plus
//! source metadata and the operation code. Field naming follows the
//! Debezium/Kafka-Connect JSON conventions consumers already speak.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed set of envelope field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    Boolean,
    Bytes,
    String,
    Struct,
    Map,
    Array,
}

/// Schema entry for a single field.
///
/// `semantic_type` serializes as `name` and carries the Debezium logical
/// type (e.g. `io.debezium.time.Date`); `parameters` carries type metadata
/// such as decimal scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub optional: bool,
    #[serde(rename = "field")]
    pub field_name: String,
    #[serde(rename = "name", skip_serializing_if = "Option::is_none", default)]
    pub semantic_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parameters: Option<BTreeMap<String, String>>,
    /// Nested descriptors for struct-typed fields.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fields: Option<Vec<FieldDescriptor>>,
}

impl FieldDescriptor {
    /// Plain optional field with no logical type.
    pub fn plain(field_type: FieldType, field_name: impl Into<String>) -> Self {
        Self {
            field_type,
            optional: true,
            field_name: field_name.into(),
            semantic_type: None,
            parameters: None,
            fields: None,
        }
    }

    /// Optional field with a Debezium logical type.
    pub fn semantic(
        field_type: FieldType,
        field_name: impl Into<String>,
        semantic_type: impl Into<String>,
    ) -> Self {
        Self {
            semantic_type: Some(semantic_type.into()),
            ..Self::plain(field_type, field_name)
        }
    }

    /// Attach parameters.
    pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Attach nested struct fields.
    pub fn with_fields(mut self, fields: Vec<FieldDescriptor>) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// Operation code for the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    #[serde(rename = "r")]
    Read,
    #[serde(rename = "c")]
    Create,
    #[serde(rename = "u")]
    Update,
    #[serde(rename = "d")]
    Delete,
}

/// Event-level schema section: one struct entry per envelope block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSchema {
    pub fields: Vec<FieldDescriptor>,
}

/// Source block identifying where the row came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub connector: String,
    pub ts_ms: i64,
    pub db: String,
    pub schema: String,
    pub table: String,
}

/// Payload section of the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub source: SourceMetadata,
    pub op: Op,
}

/// Full `{schema, payload}` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEventPayload {
    pub schema: EventSchema,
    pub payload: EventPayload,
}

impl SchemaEventPayload {
    /// Assemble a snapshot-read event: `before` is always null and the
    /// schema wraps the field descriptors in a single `after` struct.
    pub fn snapshot_read(
        fields: Vec<FieldDescriptor>,
        after: serde_json::Value,
        source: SourceMetadata,
    ) -> Self {
        let after_block = FieldDescriptor {
            field_type: FieldType::Struct,
            optional: false,
            field_name: "after".to_string(),
            semantic_type: None,
            parameters: None,
            fields: Some(fields),
        };
        Self {
            schema: EventSchema {
                fields: vec![after_block],
            },
            payload: EventPayload {
                before: None,
                after: Some(after),
                source,
                op: Op::Read,
            },
        }
    }
}

/// A ready-to-deliver message.
///
/// `partition_key` maps each PK column to its driver-native value (not the
/// envelope-encoded form) and keeps the width the driver reported, so strict
/// downstream comparisons may observe e.g. `int32(1)` vs `int64(1)` across
/// dialects. It is used for sharding and is not part of the event body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub topic_suffix: String,
    pub partition_key: BTreeMap<String, serde_json::Value>,
    pub event: SchemaEventPayload,
}

impl RawMessage {
    /// Topic suffix convention: `<db>.<schema>.<table>`.
    pub fn topic_suffix_for(db: &str, schema: &str, table: &str) -> String {
        format!("{db}.{schema}.{table}")
    }
}
