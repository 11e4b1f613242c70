//! Driver-native value model
//!
//! [`SqlValue`] is the lingua franca between the dialect row decoders and the
//! converter catalog: every driver scalar is mapped into one of these
//! variants before any envelope encoding happens. Partition keys are built
//! from these values directly, not from the encoded form.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// A database value as reported by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// Boolean value
    Bool(bool),
    /// 16-bit signed integer (SMALLINT, promoted TINYINT)
    Int16(i16),
    /// 32-bit signed integer (INTEGER)
    Int32(i32),
    /// 64-bit signed integer (BIGINT)
    Int64(i64),
    /// 32-bit floating point (REAL)
    Float32(f32),
    /// 64-bit floating point (DOUBLE PRECISION)
    Float64(f64),
    /// Arbitrary precision decimal (NUMERIC, DECIMAL, MONEY)
    Decimal(Decimal),
    /// Text string (VARCHAR, TEXT, CHAR, XML)
    String(String),
    /// Binary data (BYTEA, BLOB, VARBINARY)
    Bytes(Vec<u8>),
    /// Date without time (DATE)
    Date(NaiveDate),
    /// Time without date (TIME)
    Time(NaiveTime),
    /// Timestamp without timezone (TIMESTAMP, DATETIME2)
    DateTime(NaiveDateTime),
    /// Timestamp with timezone (TIMESTAMPTZ, DATETIMEOFFSET), normalized UTC
    DateTimeTz(DateTime<Utc>),
    /// UUID / UNIQUEIDENTIFIER
    Uuid(Uuid),
    /// JSON or JSONB document
    Json(serde_json::Value),
    /// Bit string, packed least-significant-bit first.
    /// `len` is the declared bit length.
    Bits { len: usize, bytes: Vec<u8> },
    /// Enum or set member (stored as string)
    Enum(String),
    /// Interval broken into calendar parts (months/days/microseconds)
    Interval { months: i32, days: i32, micros: i64 },
    /// Two-dimensional point
    Point { x: f64, y: f64 },
    /// Geometry/geography payload: WKB plus optional SRID
    Geometry { srid: Option<i32>, wkb: Vec<u8> },
    /// Range in the server's canonical text form, e.g. `[1,10)`
    Range(String),
    /// Key/value map (hstore); a `None` value is a SQL NULL entry
    Hstore(Vec<(String, Option<String>)>),
    /// Array of values
    Array(Vec<SqlValue>),
}

impl SqlValue {
    /// Check if the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short variant name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int16(_) => "int16",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::DateTime(_) => "datetime",
            Self::DateTimeTz(_) => "datetimetz",
            Self::Uuid(_) => "uuid",
            Self::Json(_) => "json",
            Self::Bits { .. } => "bits",
            Self::Enum(_) => "enum",
            Self::Interval { .. } => "interval",
            Self::Point { .. } => "point",
            Self::Geometry { .. } => "geometry",
            Self::Range(_) => "range",
            Self::Hstore(_) => "hstore",
            Self::Array(_) => "array",
        }
    }

    /// Render the driver-native value as plain JSON.
    ///
    /// This is the representation used for partition keys: integers stay
    /// integers at the width the driver reported, temporals become their
    /// textual form, bytes become base64. Envelope encoding is separate and
    /// lives in the converter catalog.
    pub fn to_plain_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Self::Null => J::Null,
            Self::Bool(b) => J::Bool(*b),
            Self::Int16(n) => J::Number((*n).into()),
            Self::Int32(n) => J::Number((*n).into()),
            Self::Int64(n) => J::Number((*n).into()),
            Self::Float32(n) => serde_json::Number::from_f64(f64::from(*n))
                .map(J::Number)
                .unwrap_or(J::Null),
            Self::Float64(n) => serde_json::Number::from_f64(*n)
                .map(J::Number)
                .unwrap_or(J::Null),
            Self::Decimal(d) => J::String(d.to_string()),
            Self::String(s) | Self::Enum(s) | Self::Range(s) => J::String(s.clone()),
            Self::Bytes(b) => J::String(BASE64.encode(b)),
            Self::Date(d) => J::String(d.to_string()),
            Self::Time(t) => J::String(t.to_string()),
            Self::DateTime(dt) => J::String(dt.to_string()),
            Self::DateTimeTz(dt) => J::String(dt.to_rfc3339()),
            Self::Uuid(u) => J::String(u.to_string()),
            Self::Json(j) => j.clone(),
            Self::Bits { bytes, .. } => J::String(BASE64.encode(bytes)),
            Self::Interval {
                months,
                days,
                micros,
            } => J::String(format!("{months} mons {days} days {micros} us")),
            Self::Point { x, y } => serde_json::json!({ "x": x, "y": y }),
            Self::Geometry { srid, wkb } => serde_json::json!({
                "srid": srid,
                "wkb": BASE64.encode(wkb),
            }),
            Self::Hstore(entries) => J::Object(
                entries
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.clone(),
                            v.as_ref().map(|s| J::String(s.clone())).unwrap_or(J::Null),
                        )
                    })
                    .collect(),
            ),
            Self::Array(items) => J::Array(items.iter().map(Self::to_plain_json).collect()),
        }
    }
}

/// A decoded result row: column names in SELECT order plus one [`SqlValue`]
/// per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a new row. Column and value counts must match.
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Column names in SELECT order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in SELECT order.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up a value by column name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }
}
