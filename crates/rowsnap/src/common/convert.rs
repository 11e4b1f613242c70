//! Value converter catalog
//!
//! One converter per supported column type. Each converter answers two
//! questions: what does this column look like in the event schema
//! ([`Converter::describe_field`]), and how does a driver-native value become
//! the envelope encoding ([`Converter::encode`]). NULL passes through every
//! converter unchanged.
//!
//! Dispatch from a dialect's column type to a converter is a pure function
//! that lives with the dialect's type parser; the catalog itself is
//! dialect-agnostic.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{SecondsFormat, Timelike};
use rust_decimal::Decimal;

use crate::common::envelope::{FieldDescriptor, FieldType};
use crate::common::error::{Error, Result};
use crate::common::value::SqlValue;

/// Debezium logical type names.
pub mod semantic {
    pub const DECIMAL: &str = "org.apache.kafka.connect.data.Decimal";
    pub const VARIABLE_SCALE_DECIMAL: &str = "io.debezium.data.VariableScaleDecimal";
    pub const BITS: &str = "io.debezium.data.Bits";
    pub const UUID: &str = "io.debezium.data.Uuid";
    pub const JSON: &str = "io.debezium.data.Json";
    pub const ENUM: &str = "io.debezium.data.Enum";
    pub const ENUM_SET: &str = "io.debezium.data.EnumSet";
    pub const DATE: &str = "io.debezium.time.Date";
    pub const TIME: &str = "io.debezium.time.Time";
    pub const MICRO_TIME: &str = "io.debezium.time.MicroTime";
    pub const NANO_TIME: &str = "io.debezium.time.NanoTime";
    pub const TIMESTAMP: &str = "io.debezium.time.Timestamp";
    pub const MICRO_TIMESTAMP: &str = "io.debezium.time.MicroTimestamp";
    pub const NANO_TIMESTAMP: &str = "io.debezium.time.NanoTimestamp";
    pub const ZONED_TIME: &str = "io.debezium.time.ZonedTime";
    pub const ZONED_TIMESTAMP: &str = "io.debezium.time.ZonedTimestamp";
    pub const YEAR: &str = "io.debezium.time.Year";
    pub const MICRO_DURATION: &str = "io.debezium.time.MicroDuration";
    pub const POINT: &str = "io.debezium.data.geometry.Point";
    pub const GEOMETRY: &str = "io.debezium.data.geometry.Geometry";
    pub const GEOGRAPHY: &str = "io.debezium.data.geometry.Geography";
}

/// Microseconds per month at 30.4375 days/month.
pub const MICROS_PER_MONTH: i64 = 2_629_800_000_000;
const MICROS_PER_DAY: i64 = 86_400_000_000;

/// The converter catalog as a tagged enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Converter {
    Boolean,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    /// Fixed-scale decimal. `precision` is omitted from the schema
    /// parameters when the catalog did not report one.
    Decimal {
        scale: u32,
        precision: Option<u32>,
    },
    /// Decimal whose scale varies per value.
    VariableScaleDecimal,
    /// Currency amount with a fixed scale (2 for PG money, 4 for MSSQL).
    Money { scale: u32 },
    Text,
    Bytes,
    /// Bit string wider than one bit; `len` is the declared width when the
    /// column is fixed-width.
    Bits { len: Option<usize> },
    Uuid,
    Date,
    Time,
    MicroTime,
    NanoTime,
    Timestamp,
    MicroTimestamp,
    NanoTimestamp,
    ZonedTime,
    ZonedTimestamp,
    Year,
    MicroDuration,
    Json,
    Enum,
    EnumSet,
    Point,
    Geometry,
    Geography,
    Range,
    Hstore,
    Array(Box<Converter>),
}

impl Converter {
    /// Schema descriptor for a column handled by this converter.
    pub fn describe_field(&self, name: &str) -> FieldDescriptor {
        match self {
            Self::Boolean => FieldDescriptor::plain(FieldType::Boolean, name),
            Self::Int16 => FieldDescriptor::plain(FieldType::Int16, name),
            Self::Int32 => FieldDescriptor::plain(FieldType::Int32, name),
            Self::Int64 => FieldDescriptor::plain(FieldType::Int64, name),
            Self::Float => FieldDescriptor::plain(FieldType::Float, name),
            Self::Double => FieldDescriptor::plain(FieldType::Double, name),
            Self::Decimal { scale, precision } => {
                let mut params = BTreeMap::new();
                params.insert("scale".to_string(), scale.to_string());
                if let Some(p) = precision {
                    params.insert("connect.decimal.precision".to_string(), p.to_string());
                }
                FieldDescriptor::semantic(FieldType::Bytes, name, semantic::DECIMAL)
                    .with_parameters(params)
            }
            Self::VariableScaleDecimal => FieldDescriptor::semantic(
                FieldType::Struct,
                name,
                semantic::VARIABLE_SCALE_DECIMAL,
            )
            .with_fields(vec![
                FieldDescriptor::plain(FieldType::Int32, "scale"),
                FieldDescriptor::plain(FieldType::Bytes, "value"),
            ]),
            Self::Money { scale } => {
                let mut params = BTreeMap::new();
                params.insert("scale".to_string(), scale.to_string());
                FieldDescriptor::semantic(FieldType::Bytes, name, semantic::DECIMAL)
                    .with_parameters(params)
            }
            Self::Text => FieldDescriptor::plain(FieldType::String, name),
            Self::Bytes => FieldDescriptor::plain(FieldType::Bytes, name),
            Self::Bits { len } => {
                let mut desc = FieldDescriptor::semantic(FieldType::Bytes, name, semantic::BITS);
                if let Some(len) = len {
                    let mut params = BTreeMap::new();
                    params.insert("length".to_string(), len.to_string());
                    desc = desc.with_parameters(params);
                }
                desc
            }
            Self::Uuid => FieldDescriptor::semantic(FieldType::String, name, semantic::UUID),
            Self::Date => FieldDescriptor::semantic(FieldType::Int32, name, semantic::DATE),
            Self::Time => FieldDescriptor::semantic(FieldType::Int32, name, semantic::TIME),
            Self::MicroTime => {
                FieldDescriptor::semantic(FieldType::Int64, name, semantic::MICRO_TIME)
            }
            Self::NanoTime => FieldDescriptor::semantic(FieldType::Int64, name, semantic::NANO_TIME),
            Self::Timestamp => {
                FieldDescriptor::semantic(FieldType::Int64, name, semantic::TIMESTAMP)
            }
            Self::MicroTimestamp => {
                FieldDescriptor::semantic(FieldType::Int64, name, semantic::MICRO_TIMESTAMP)
            }
            Self::NanoTimestamp => {
                FieldDescriptor::semantic(FieldType::Int64, name, semantic::NANO_TIMESTAMP)
            }
            Self::ZonedTime => {
                FieldDescriptor::semantic(FieldType::String, name, semantic::ZONED_TIME)
            }
            Self::ZonedTimestamp => {
                FieldDescriptor::semantic(FieldType::String, name, semantic::ZONED_TIMESTAMP)
            }
            Self::Year => FieldDescriptor::semantic(FieldType::Int32, name, semantic::YEAR),
            Self::MicroDuration => {
                FieldDescriptor::semantic(FieldType::Int64, name, semantic::MICRO_DURATION)
            }
            Self::Json => FieldDescriptor::semantic(FieldType::String, name, semantic::JSON),
            Self::Enum => FieldDescriptor::semantic(FieldType::String, name, semantic::ENUM),
            Self::EnumSet => FieldDescriptor::semantic(FieldType::String, name, semantic::ENUM_SET),
            Self::Point => FieldDescriptor::semantic(FieldType::Struct, name, semantic::POINT)
                .with_fields(vec![
                    FieldDescriptor::plain(FieldType::Double, "x"),
                    FieldDescriptor::plain(FieldType::Double, "y"),
                ]),
            Self::Geometry => FieldDescriptor::semantic(FieldType::Struct, name, semantic::GEOMETRY)
                .with_fields(geometry_fields()),
            Self::Geography => {
                FieldDescriptor::semantic(FieldType::Struct, name, semantic::GEOGRAPHY)
                    .with_fields(geometry_fields())
            }
            Self::Range => FieldDescriptor::plain(FieldType::String, name),
            Self::Hstore => FieldDescriptor::plain(FieldType::Map, name),
            Self::Array(_) => FieldDescriptor::plain(FieldType::Array, name),
        }
    }

    /// Encode a driver-native value for the envelope. NULL stays NULL.
    ///
    /// `column` is threaded through for error attribution only.
    pub fn encode(&self, column: &str, value: &SqlValue) -> Result<Option<serde_json::Value>> {
        use serde_json::json;

        if value.is_null() {
            return Ok(None);
        }

        let encoded = match (self, value) {
            (Self::Boolean, SqlValue::Bool(b)) => json!(b),
            // bit(1) arrives as a single LSB-first packed byte
            (Self::Boolean, SqlValue::Bits { len: 1, bytes }) => {
                json!(bytes.first().copied().unwrap_or(0) & 1 == 1)
            }

            (Self::Int16, SqlValue::Int16(n)) => json!(n),
            (Self::Int32, SqlValue::Int16(n)) => json!(i32::from(*n)),
            (Self::Int32, SqlValue::Int32(n)) => json!(n),
            (Self::Int64, SqlValue::Int16(n)) => json!(i64::from(*n)),
            (Self::Int64, SqlValue::Int32(n)) => json!(i64::from(*n)),
            (Self::Int64, SqlValue::Int64(n)) => json!(n),

            (Self::Float, SqlValue::Float32(n)) => json!(n),
            // SQL Server dispatches both `real` and `float` here; the wider
            // driver value passes through unchanged
            (Self::Float, SqlValue::Float64(n)) => json!(n),
            (Self::Double, SqlValue::Float32(n)) => json!(f64::from(*n)),
            (Self::Double, SqlValue::Float64(n)) => json!(n),

            (Self::Decimal { scale, .. }, SqlValue::Decimal(d)) => {
                encode_decimal(column, *d, *scale)?
            }
            (Self::VariableScaleDecimal, SqlValue::Decimal(d)) => {
                json!({
                    "scale": d.scale() as i32,
                    "value": BASE64.encode(unscaled_be_bytes(d.mantissa())),
                })
            }
            (Self::Money { scale }, SqlValue::Decimal(d)) => encode_decimal(column, *d, *scale)?,
            (Self::Money { scale }, SqlValue::String(s)) => {
                encode_decimal(column, parse_money(column, s)?, *scale)?
            }

            (Self::Text, SqlValue::String(s)) => json!(s),
            (Self::Text, SqlValue::Enum(s)) => json!(s),

            (Self::Bytes, SqlValue::Bytes(b)) => json!(BASE64.encode(b)),

            (Self::Bits { .. }, SqlValue::Bits { bytes, .. }) => json!(BASE64.encode(bytes)),

            (Self::Uuid, SqlValue::Uuid(u)) => json!(u.hyphenated().to_string()),
            (Self::Uuid, SqlValue::String(s)) => json!(s.to_lowercase()),

            (Self::Date, SqlValue::Date(d)) => {
                let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
                json!((*d - epoch).num_days() as i32)
            }

            (Self::Time, SqlValue::Time(t)) => {
                json!(t.num_seconds_from_midnight() as i32 * 1000 + (t.nanosecond() / 1_000_000) as i32)
            }
            (Self::MicroTime, SqlValue::Time(t)) => {
                json!(i64::from(t.num_seconds_from_midnight()) * 1_000_000
                    + i64::from(t.nanosecond() / 1_000))
            }
            (Self::NanoTime, SqlValue::Time(t)) => {
                json!(i64::from(t.num_seconds_from_midnight()) * 1_000_000_000
                    + i64::from(t.nanosecond()))
            }

            (Self::Timestamp, SqlValue::DateTime(dt)) => json!(dt.and_utc().timestamp_millis()),
            (Self::MicroTimestamp, SqlValue::DateTime(dt)) => {
                json!(dt.and_utc().timestamp_micros())
            }
            (Self::NanoTimestamp, SqlValue::DateTime(dt)) => match dt.and_utc().timestamp_nanos_opt()
            {
                Some(ns) => json!(ns),
                None => {
                    return Err(Error::encoding(
                        column,
                        format!("timestamp {dt} out of nanosecond range"),
                    ))
                }
            },

            (Self::ZonedTime, SqlValue::Time(t)) => json!(format_zoned_time(*t)),
            (Self::ZonedTimestamp, SqlValue::DateTimeTz(dt)) => {
                json!(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }

            (Self::Year, SqlValue::Int16(y)) => json!(i32::from(*y)),
            (Self::Year, SqlValue::Int32(y)) => json!(y),

            (
                Self::MicroDuration,
                SqlValue::Interval {
                    months,
                    days,
                    micros,
                },
            ) => {
                let total = i64::from(*months)
                    .checked_mul(MICROS_PER_MONTH)
                    .and_then(|m| m.checked_add(i64::from(*days).checked_mul(MICROS_PER_DAY)?))
                    .and_then(|md| md.checked_add(*micros));
                match total {
                    Some(us) => json!(us),
                    None => {
                        return Err(Error::encoding(
                            column,
                            "interval exceeds the microsecond range".to_string(),
                        ))
                    }
                }
            }

            (Self::Json, SqlValue::Json(v)) => json!(serde_json::to_string(v)?),
            (Self::Json, SqlValue::String(s)) => {
                // re-serialize so whitespace is normalized; key order is the
                // server's canonical order and is preserved
                let parsed: serde_json::Value = serde_json::from_str(s)
                    .map_err(|e| Error::encoding(column, format!("invalid json: {e}")))?;
                json!(serde_json::to_string(&parsed)?)
            }

            (Self::Enum, SqlValue::Enum(s)) | (Self::Enum, SqlValue::String(s)) => json!(s),
            (Self::EnumSet, SqlValue::Enum(s)) | (Self::EnumSet, SqlValue::String(s)) => json!(s),

            (Self::Point, SqlValue::Point { x, y }) => json!({ "x": x, "y": y }),

            (Self::Geometry, SqlValue::Geometry { srid, wkb })
            | (Self::Geography, SqlValue::Geometry { srid, wkb }) => {
                json!({ "srid": srid, "wkb": BASE64.encode(wkb) })
            }

            (Self::Range, SqlValue::Range(s)) | (Self::Range, SqlValue::String(s)) => json!(s),

            (Self::Hstore, SqlValue::Hstore(entries)) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.clone(),
                            v.as_ref()
                                .map(|s| serde_json::Value::String(s.clone()))
                                .unwrap_or(serde_json::Value::Null),
                        )
                    })
                    .collect(),
            ),

            (Self::Array(inner), SqlValue::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(match inner.encode(column, item)? {
                        Some(v) => v,
                        None => serde_json::Value::Null,
                    });
                }
                serde_json::Value::Array(out)
            }

            (_, other) => {
                return Err(Error::encoding(
                    column,
                    format!("{self:?} cannot encode driver value of kind {}", other.type_name()),
                ))
            }
        };

        Ok(Some(encoded))
    }
}

fn geometry_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::plain(FieldType::Int32, "srid"),
        FieldDescriptor::plain(FieldType::Bytes, "wkb"),
    ]
}

/// Encode a decimal at a fixed scale as base64 two's-complement big-endian
/// unscaled bytes.
fn encode_decimal(column: &str, value: Decimal, scale: u32) -> Result<serde_json::Value> {
    let mut rescaled = value;
    rescaled.rescale(scale);
    if rescaled.scale() != scale {
        return Err(Error::encoding(
            column,
            format!("cannot represent {value} at scale {scale}"),
        ));
    }
    Ok(serde_json::Value::String(
        BASE64.encode(unscaled_be_bytes(rescaled.mantissa())),
    ))
}

/// Minimal big-endian two's-complement representation of an integer, the
/// same bytes `java.math.BigInteger#toByteArray` would produce.
fn unscaled_be_bytes(mantissa: i128) -> Vec<u8> {
    let raw = mantissa.to_be_bytes();
    let mut start = 0;
    while start < raw.len() - 1 {
        let redundant = (raw[start] == 0x00 && raw[start + 1] & 0x80 == 0)
            || (raw[start] == 0xFF && raw[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    raw[start..].to_vec()
}

/// Parse a currency string. Only `$` and `,` are recognized decorations;
/// anything else fails rather than guessing a locale.
fn parse_money(column: &str, raw: &str) -> Result<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    cleaned
        .parse::<Decimal>()
        .map_err(|_| Error::encoding(column, format!("unparseable money value: {raw:?}")))
}

/// `HH:MM:SS[.fff]Z` with the fraction omitted when zero and trailing zeros
/// trimmed.
fn format_zoned_time(t: chrono::NaiveTime) -> String {
    let base = t.format("%H:%M:%S").to_string();
    let nanos = t.nanosecond();
    if nanos == 0 {
        return format!("{base}Z");
    }
    let frac = format!("{nanos:09}");
    let frac = frac.trim_end_matches('0');
    format!("{base}.{frac}Z")
}
