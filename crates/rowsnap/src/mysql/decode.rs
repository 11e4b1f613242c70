//! MySQL row decoding
//!
//! The binary protocol reports decimals, bit strings, JSON, enums and sets
//! all as byte blobs, so decoding is driven by the converter the type
//! dispatcher picked for each column rather than by the wire value alone.

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use mysql_async::Value;
use rust_decimal::Decimal;

use crate::common::{ColumnSpec, Converter, Error, Result, Row, SqlValue};

/// Decode one driver value using the column's converter as the target.
pub fn decode_value(column: &str, converter: &Converter, value: Value) -> Result<SqlValue> {
    let mismatch = |value: &Value| {
        Error::encoding(
            column,
            format!("driver value {value:?} does not match {converter:?}"),
        )
    };

    let decoded = match (converter, value) {
        (_, Value::NULL) => SqlValue::Null,

        (Converter::Boolean, Value::Int(n)) => SqlValue::Bool(n != 0),
        (Converter::Boolean, Value::UInt(n)) => SqlValue::Bool(n != 0),
        // bit(1) arrives as a one-byte blob
        (Converter::Boolean, Value::Bytes(b)) => {
            SqlValue::Bool(b.last().copied().unwrap_or(0) & 1 == 1)
        }

        (Converter::Int16, Value::Int(n)) => SqlValue::Int16(n as i16),
        (Converter::Int16, Value::UInt(n)) => SqlValue::Int16(n as i16),
        (Converter::Int32, Value::Int(n)) => SqlValue::Int32(n as i32),
        (Converter::Int32, Value::UInt(n)) => SqlValue::Int32(n as i32),
        (Converter::Int64, Value::Int(n)) => SqlValue::Int64(n),
        (Converter::Int64, Value::UInt(n)) => SqlValue::Int64(n as i64),
        (Converter::Year, Value::Int(n)) => SqlValue::Int32(n as i32),
        (Converter::Year, Value::UInt(n)) => SqlValue::Int32(n as i32),

        (Converter::Float, Value::Float(f)) => SqlValue::Float32(f),
        (Converter::Float, Value::Double(d)) => SqlValue::Float64(d),
        (Converter::Double, Value::Double(d)) => SqlValue::Float64(d),
        (Converter::Double, Value::Float(f)) => SqlValue::Float32(f),

        (
            Converter::Decimal { .. } | Converter::VariableScaleDecimal | Converter::Money { .. },
            Value::Bytes(b),
        ) => {
            let text = String::from_utf8(b)
                .map_err(|_| Error::encoding(column, "decimal is not utf-8".to_string()))?;
            let parsed: Decimal = text
                .parse()
                .map_err(|_| Error::encoding(column, format!("unparseable decimal {text:?}")))?;
            SqlValue::Decimal(parsed)
        }

        (
            Converter::Text | Converter::Enum | Converter::EnumSet | Converter::Json,
            Value::Bytes(b),
        ) => {
            let text = String::from_utf8(b)
                .map_err(|_| Error::encoding(column, "text value is not utf-8".to_string()))?;
            SqlValue::String(text)
        }

        (Converter::Bytes, Value::Bytes(b)) => SqlValue::Bytes(b),

        // bit values come big-endian; repack least-significant-byte first
        (Converter::Bits { len }, Value::Bytes(b)) => {
            let mut bytes: Vec<u8> = b.into_iter().rev().collect();
            let len = len.unwrap_or(bytes.len() * 8);
            bytes.resize(len.div_ceil(8), 0);
            SqlValue::Bits { len, bytes }
        }

        (Converter::Date, Value::Date(y, mo, d, _, _, _, _)) => {
            let date = NaiveDate::from_ymd_opt(i32::from(y), u32::from(mo), u32::from(d))
                .ok_or_else(|| Error::encoding(column, format!("invalid date {y}-{mo}-{d}")))?;
            SqlValue::Date(date)
        }

        (
            Converter::Timestamp | Converter::MicroTimestamp | Converter::NanoTimestamp,
            Value::Date(y, mo, d, h, mi, s, us),
        ) => SqlValue::DateTime(naive_datetime(column, y, mo, d, h, mi, s, us)?),

        (Converter::ZonedTimestamp, Value::Date(y, mo, d, h, mi, s, us)) => {
            let naive = naive_datetime(column, y, mo, d, h, mi, s, us)?;
            SqlValue::DateTimeTz(Utc.from_utc_datetime(&naive))
        }

        (
            Converter::Time | Converter::MicroTime | Converter::NanoTime,
            Value::Time(neg, days, h, m, s, us),
        ) => {
            if neg || days > 0 || h >= 24 {
                return Err(Error::encoding(
                    column,
                    "time value outside the 00:00-24:00 range".to_string(),
                ));
            }
            let time = NaiveTime::from_hms_micro_opt(
                u32::from(h),
                u32::from(m),
                u32::from(s),
                us,
            )
            .ok_or_else(|| Error::encoding(column, "invalid time".to_string()))?;
            SqlValue::Time(time)
        }

        (_, other) => return Err(mismatch(&other)),
    };
    Ok(decoded)
}

#[allow(clippy::too_many_arguments)]
fn naive_datetime(
    column: &str,
    y: u16,
    mo: u8,
    d: u8,
    h: u8,
    mi: u8,
    s: u8,
    us: u32,
) -> Result<chrono::NaiveDateTime> {
    NaiveDate::from_ymd_opt(i32::from(y), u32::from(mo), u32::from(d))
        .and_then(|date| date.and_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us))
        .ok_or_else(|| {
            Error::encoding(
                column,
                format!("invalid datetime {y}-{mo}-{d} {h}:{mi}:{s}.{us}"),
            )
        })
}

/// Decode a full driver row against the SELECT column specs.
pub fn decode_row(columns: &[ColumnSpec], row: mysql_async::Row) -> Result<Row> {
    if row.len() != columns.len() {
        return Err(Error::catalog(format!(
            "result row has {} values but {} columns were selected",
            row.len(),
            columns.len()
        )));
    }

    let mut names = Vec::with_capacity(columns.len());
    let mut values = Vec::with_capacity(columns.len());
    for (idx, spec) in columns.iter().enumerate() {
        let raw = row
            .get_opt::<Value, _>(idx)
            .ok_or_else(|| Error::encoding(&spec.name, "missing column in result".to_string()))?
            .map_err(|e| Error::encoding(&spec.name, e.to_string()))?;
        names.push(spec.name.clone());
        values.push(decode_value(&spec.name, &spec.converter, raw)?);
    }
    Ok(Row::new(names, values))
}

/// Convert a native value into a driver parameter.
pub fn bind_param(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        SqlValue::Int16(n) => Value::Int(i64::from(*n)),
        SqlValue::Int32(n) => Value::Int(i64::from(*n)),
        SqlValue::Int64(n) => Value::Int(*n),
        SqlValue::Float32(n) => Value::Float(*n),
        SqlValue::Float64(n) => Value::Double(*n),
        SqlValue::Decimal(d) => Value::Bytes(d.to_string().into_bytes()),
        SqlValue::String(s) | SqlValue::Enum(s) | SqlValue::Range(s) => {
            Value::Bytes(s.clone().into_bytes())
        }
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
        SqlValue::Date(d) => {
            use chrono::Datelike;
            Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0)
        }
        SqlValue::DateTime(dt) => {
            use chrono::{Datelike, Timelike};
            Value::Date(
                dt.year() as u16,
                dt.month() as u8,
                dt.day() as u8,
                dt.hour() as u8,
                dt.minute() as u8,
                dt.second() as u8,
                dt.and_utc().timestamp_subsec_micros(),
            )
        }
        SqlValue::DateTimeTz(dt) => bind_param(&SqlValue::DateTime(dt.naive_utc())),
        SqlValue::Time(t) => {
            use chrono::Timelike;
            Value::Time(
                false,
                0,
                t.hour() as u8,
                t.minute() as u8,
                t.second() as u8,
                t.nanosecond() / 1000,
            )
        }
        other => Value::Bytes(other.to_plain_json().to_string().into_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_null_for_any_converter() {
        assert_eq!(
            decode_value("c", &Converter::Int32, Value::NULL).unwrap(),
            SqlValue::Null
        );
        assert_eq!(
            decode_value("c", &Converter::Json, Value::NULL).unwrap(),
            SqlValue::Null
        );
    }

    #[test]
    fn test_decode_tinyint1_boolean() {
        // tinyint(1) stores small integers; any non-zero becomes true
        assert_eq!(
            decode_value("c", &Converter::Boolean, Value::Int(1)).unwrap(),
            SqlValue::Bool(true)
        );
        assert_eq!(
            decode_value("c", &Converter::Boolean, Value::Int(7)).unwrap(),
            SqlValue::Bool(true)
        );
        assert_eq!(
            decode_value("c", &Converter::Boolean, Value::Int(0)).unwrap(),
            SqlValue::Bool(false)
        );
    }

    #[test]
    fn test_decode_decimal_from_bytes() {
        let v = decode_value(
            "c",
            &Converter::Decimal {
                scale: 3,
                precision: Some(5),
            },
            Value::Bytes(b"12.345".to_vec()),
        )
        .unwrap();
        assert_eq!(v, SqlValue::Decimal("12.345".parse().unwrap()));
    }

    #[test]
    fn test_decode_bits_reverses_byte_order() {
        // bit(10) value 0b10_00000001 arrives big-endian as [0x02, 0x01]
        let v = decode_value(
            "c",
            &Converter::Bits { len: Some(10) },
            Value::Bytes(vec![0x02, 0x01]),
        )
        .unwrap();
        assert_eq!(
            v,
            SqlValue::Bits {
                len: 10,
                bytes: vec![0x01, 0x02]
            }
        );
    }

    #[test]
    fn test_decode_temporals() {
        let v = decode_value(
            "c",
            &Converter::Timestamp,
            Value::Date(2020, 1, 1, 12, 30, 45, 0),
        )
        .unwrap();
        match v {
            SqlValue::DateTime(dt) => assert_eq!(dt.to_string(), "2020-01-01 12:30:45"),
            other => panic!("unexpected {other:?}"),
        }

        let v = decode_value(
            "c",
            &Converter::ZonedTimestamp,
            Value::Date(2020, 6, 1, 0, 0, 0, 0),
        )
        .unwrap();
        assert!(matches!(v, SqlValue::DateTimeTz(_)));

        let v = decode_value("c", &Converter::Time, Value::Time(false, 0, 1, 2, 3, 0)).unwrap();
        assert_eq!(
            v,
            SqlValue::Time(NaiveTime::from_hms_opt(1, 2, 3).unwrap())
        );
    }

    #[test]
    fn test_decode_out_of_range_time_fails() {
        let err =
            decode_value("c_time", &Converter::Time, Value::Time(true, 0, 1, 0, 0, 0)).unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));

        let err =
            decode_value("c_time", &Converter::Time, Value::Time(false, 2, 0, 0, 0, 0)).unwrap_err();
        assert!(err.to_string().contains("c_time"));
    }

    #[test]
    fn test_decode_mismatch_is_column_scoped() {
        let err = decode_value("c_int", &Converter::Int32, Value::Bytes(b"x".to_vec()))
            .unwrap_err();
        assert!(err.to_string().contains("c_int"));
    }

    #[test]
    fn test_bind_round_trip_ints() {
        assert_eq!(bind_param(&SqlValue::Int32(7)), Value::Int(7));
        assert_eq!(bind_param(&SqlValue::Bool(true)), Value::Int(1));
        assert_eq!(
            bind_param(&SqlValue::String("x".into())),
            Value::Bytes(b"x".to_vec())
        );
    }
}
