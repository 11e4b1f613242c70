//! SQL Server row decoding and key normalization
//!
//! Decoding is driven by the converter the type dispatcher selected for
//! each column. Primary-key values with time components are pre-formatted
//! to text before binding, because the TDS driver has no native time
//! parameter binding; a string already in the right shape passes through
//! unchanged.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use rust_decimal::Decimal;

use crate::common::{ColumnSpec, Converter, Error, Result, Row, SqlValue};

fn get<'a, T>(row: &'a tiberius::Row, idx: usize, column: &str) -> Result<Option<T>>
where
    T: tiberius::FromSql<'a>,
{
    row.try_get::<T, usize>(idx)
        .map_err(|e| Error::encoding(column, e.to_string()))
}

/// Decode one column using its converter as the target type.
fn decode_value(
    row: &tiberius::Row,
    idx: usize,
    column: &str,
    converter: &Converter,
) -> Result<SqlValue> {
    let value = match converter {
        Converter::Boolean => get::<bool>(row, idx, column)?
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        // tinyint surfaces as u8, smallint as i16
        Converter::Int16 => match get::<i16>(row, idx, column) {
            Ok(v) => v.map(SqlValue::Int16).unwrap_or(SqlValue::Null),
            Err(_) => get::<u8>(row, idx, column)?
                .map(|v| SqlValue::Int16(i16::from(v)))
                .unwrap_or(SqlValue::Null),
        },
        Converter::Int32 => get::<i32>(row, idx, column)?
            .map(SqlValue::Int32)
            .unwrap_or(SqlValue::Null),
        Converter::Int64 => get::<i64>(row, idx, column)?
            .map(SqlValue::Int64)
            .unwrap_or(SqlValue::Null),
        // both real and float dispatch to Float; decode at driver width
        Converter::Float | Converter::Double => match get::<f32>(row, idx, column) {
            Ok(v) => v.map(SqlValue::Float32).unwrap_or(SqlValue::Null),
            Err(_) => get::<f64>(row, idx, column)?
                .map(SqlValue::Float64)
                .unwrap_or(SqlValue::Null),
        },
        Converter::Decimal { .. } | Converter::VariableScaleDecimal => {
            get::<Decimal>(row, idx, column)?
                .map(SqlValue::Decimal)
                .unwrap_or(SqlValue::Null)
        }
        // money arrives as a float; rescale to the declared 4 digits
        Converter::Money { scale } => match get::<f64>(row, idx, column)? {
            Some(raw) => {
                let mut d = Decimal::from_f64_retain(raw).ok_or_else(|| {
                    Error::encoding(column, format!("money value {raw} is not finite"))
                })?;
                d.rescale(*scale);
                SqlValue::Decimal(d)
            }
            None => SqlValue::Null,
        },
        Converter::Text => get::<&str>(row, idx, column)?
            .map(|s| SqlValue::String(s.to_string()))
            .unwrap_or(SqlValue::Null),
        Converter::Bytes => get::<&[u8]>(row, idx, column)?
            .map(|b| SqlValue::Bytes(b.to_vec()))
            .unwrap_or(SqlValue::Null),
        Converter::Uuid => get::<uuid::Uuid>(row, idx, column)?
            .map(SqlValue::Uuid)
            .unwrap_or(SqlValue::Null),
        Converter::Date => get::<NaiveDate>(row, idx, column)?
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null),
        Converter::Time | Converter::MicroTime | Converter::NanoTime => {
            get::<NaiveTime>(row, idx, column)?
                .map(SqlValue::Time)
                .unwrap_or(SqlValue::Null)
        }
        Converter::Timestamp | Converter::MicroTimestamp | Converter::NanoTimestamp => {
            get::<NaiveDateTime>(row, idx, column)?
                .map(SqlValue::DateTime)
                .unwrap_or(SqlValue::Null)
        }
        Converter::ZonedTimestamp => get::<DateTime<Utc>>(row, idx, column)?
            .map(SqlValue::DateTimeTz)
            .unwrap_or(SqlValue::Null),
        other => {
            return Err(Error::encoding(
                column,
                format!("no sql server decode path for {other:?}"),
            ))
        }
    };
    Ok(value)
}

/// Decode a full driver row against the SELECT column specs.
pub fn decode_row(columns: &[ColumnSpec], row: &tiberius::Row) -> Result<Row> {
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
        names.push(spec.name.clone());
        values.push(decode_value(row, idx, &spec.name, &spec.converter)?);
    }
    Ok(Row::new(names, values))
}

/// Pre-format temporal key values to text for parameter binding.
///
/// Formats: `HH:MM:SS.ffffff` / `HH:MM:SS.fffffff` for times (seven digits
/// only when the value carries sub-microsecond resolution),
/// `YYYY-MM-DD HH:MM:SS[.f*]` for datetimes, and the `datetimeoffset` form
/// with seven fractional digits and a `+00:00` offset for zoned values.
pub fn normalize_key_value(value: &SqlValue) -> SqlValue {
    match value {
        SqlValue::Time(t) => {
            let base = t.format("%H:%M:%S").to_string();
            let nanos = t.nanosecond();
            if nanos % 1000 == 0 {
                SqlValue::String(format!("{base}.{:06}", nanos / 1000))
            } else {
                SqlValue::String(format!("{base}.{:07}", nanos / 100))
            }
        }
        SqlValue::DateTime(dt) => {
            let base = dt.format("%Y-%m-%d %H:%M:%S").to_string();
            let nanos = dt.nanosecond();
            if nanos == 0 {
                SqlValue::String(base)
            } else {
                let frac = format!("{:07}", nanos / 100);
                SqlValue::String(format!("{base}.{}", frac.trim_end_matches('0')))
            }
        }
        SqlValue::DateTimeTz(dt) => {
            let naive = dt.naive_utc();
            SqlValue::String(format!(
                "{}.{:07} +00:00",
                naive.format("%Y-%m-%d %H:%M:%S"),
                naive.nanosecond() / 100
            ))
        }
        other => other.clone(),
    }
}

/// Bind a (normalized) native value onto a query.
pub fn bind_param<'a>(query: &mut tiberius::Query<'a>, value: &'a SqlValue) {
    match value {
        SqlValue::Null => query.bind(Option::<i32>::None),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int16(n) => query.bind(*n),
        SqlValue::Int32(n) => query.bind(*n),
        SqlValue::Int64(n) => query.bind(*n),
        SqlValue::Float32(n) => query.bind(*n),
        SqlValue::Float64(n) => query.bind(*n),
        SqlValue::Decimal(d) => {
            // tiberius 0.12 implements `ToSql`/`FromSql` for `rust_decimal::Decimal`
            // but not `IntoSql`, which `Query::bind` requires. Convert to the
            // `Numeric` it does accept, mirroring tiberius's own `ToSql` conversion
            // so the bound value is byte-identical.
            let unpacked = d.unpack();
            let mut value = (((unpacked.hi as u128) << 64)
                + ((unpacked.mid as u128) << 32)
                + unpacked.lo as u128) as i128;
            if d.is_sign_negative() {
                value = -value;
            }
            query.bind(tiberius::numeric::Numeric::new_with_scale(
                value,
                d.scale() as u8,
            ))
        }
        SqlValue::String(s) | SqlValue::Enum(s) | SqlValue::Range(s) => query.bind(s.as_str()),
        SqlValue::Bytes(b) => query.bind(b.as_slice()),
        SqlValue::Uuid(u) => query.bind(*u),
        SqlValue::Date(d) => query.bind(*d),
        // time-bearing values were normalized to strings already; these
        // arms only fire for non-key usage and bind the native form
        SqlValue::Time(t) => query.bind(*t),
        SqlValue::DateTime(dt) => query.bind(*dt),
        SqlValue::DateTimeTz(dt) => query.bind(*dt),
        other => query.bind(other.to_plain_json().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_time_microsecond_form() {
        let t = SqlValue::Time(NaiveTime::from_hms_micro_opt(1, 2, 3, 456_789).unwrap());
        assert_eq!(
            normalize_key_value(&t),
            SqlValue::String("01:02:03.456789".to_string())
        );
    }

    #[test]
    fn test_normalize_time_hundred_nanosecond_form() {
        let t = SqlValue::Time(NaiveTime::from_hms_nano_opt(1, 2, 3, 456_789_100).unwrap());
        assert_eq!(
            normalize_key_value(&t),
            SqlValue::String("01:02:03.4567891".to_string())
        );
    }

    #[test]
    fn test_normalize_datetime_trims_fraction() {
        let dt = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(
            normalize_key_value(&SqlValue::DateTime(dt)),
            SqlValue::String("2020-01-01 12:00:00".to_string())
        );

        let dt = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_milli_opt(12, 0, 0, 500)
            .unwrap();
        assert_eq!(
            normalize_key_value(&SqlValue::DateTime(dt)),
            SqlValue::String("2020-01-01 12:00:00.5".to_string())
        );
    }

    #[test]
    fn test_normalize_datetimeoffset_form() {
        let dt = Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(
            normalize_key_value(&SqlValue::DateTimeTz(dt)),
            SqlValue::String("2020-01-01 12:00:00.0000000 +00:00".to_string())
        );
    }

    #[test]
    fn test_normalize_passes_strings_and_ints_through() {
        let s = SqlValue::String("01:02:03.000000".to_string());
        assert_eq!(normalize_key_value(&s), s);

        let n = SqlValue::Int64(42);
        assert_eq!(normalize_key_value(&n), n);
    }
}
