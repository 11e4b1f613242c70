//! Row → envelope transformer
//!
//! Joins the converter catalog and the scanner output into the final
//! message stream: one [`RawMessage`] per row, with the `after` block in
//! SELECT column order and the partition key built from the driver-native
//! primary-key values.

use crate::common::dialect::{Dialect, TableRef};
use crate::common::envelope::{
    FieldDescriptor, RawMessage, SchemaEventPayload, SourceMetadata,
};
use crate::common::error::{Error, Result};
use crate::common::source::ColumnSpec;
use crate::common::value::Row;

/// Transformer for one table's scan output.
#[derive(Debug, Clone)]
pub struct RowTransformer {
    columns: Vec<ColumnSpec>,
    descriptors: Vec<FieldDescriptor>,
    key_columns: Vec<String>,
    connector: &'static str,
    db: String,
    table: TableRef,
    topic_suffix: String,
}

impl RowTransformer {
    /// Build a transformer. `columns` must match the scan's SELECT list in
    /// content and order.
    pub fn new(
        dialect: Dialect,
        db: impl Into<String>,
        table: &TableRef,
        columns: &[ColumnSpec],
        key_columns: &[String],
    ) -> Self {
        let db = db.into();
        let descriptors = columns
            .iter()
            .map(|c| c.converter.describe_field(&c.name))
            .collect();
        Self {
            columns: columns.to_vec(),
            descriptors,
            key_columns: key_columns.to_vec(),
            connector: dialect.connector(),
            topic_suffix: RawMessage::topic_suffix_for(&db, &table.schema, &table.name),
            db,
            table: table.clone(),
        }
    }

    /// Field descriptors in SELECT order.
    pub fn descriptors(&self) -> &[FieldDescriptor] {
        &self.descriptors
    }

    /// Transform a single row.
    pub fn transform_row(&self, row: &Row) -> Result<RawMessage> {
        if row.len() != self.columns.len() {
            return Err(Error::catalog(format!(
                "row has {} values but {} columns were selected from {}",
                row.len(),
                self.columns.len(),
                self.table
            )));
        }

        let mut after = serde_json::Map::with_capacity(self.columns.len());
        for (spec, value) in self.columns.iter().zip(row.values()) {
            let encoded = spec.converter.encode(&spec.name, value)?;
            after.insert(
                spec.name.clone(),
                encoded.unwrap_or(serde_json::Value::Null),
            );
        }

        let mut partition_key = std::collections::BTreeMap::new();
        for key in &self.key_columns {
            let value = row.get(key).ok_or_else(|| {
                Error::catalog(format!("row is missing key column {key} of {}", self.table))
            })?;
            partition_key.insert(key.clone(), value.to_plain_json());
        }

        let source = SourceMetadata {
            connector: self.connector.to_string(),
            ts_ms: chrono::Utc::now().timestamp_millis(),
            db: self.db.clone(),
            schema: self.table.schema.clone(),
            table: self.table.name.clone(),
        };

        Ok(RawMessage {
            topic_suffix: self.topic_suffix.clone(),
            partition_key,
            event: SchemaEventPayload::snapshot_read(
                self.descriptors.clone(),
                serde_json::Value::Object(after),
                source,
            ),
        })
    }

    /// Transform a batch, preserving row order.
    pub fn transform_batch(&self, rows: &[Row]) -> Result<Vec<RawMessage>> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }
}
