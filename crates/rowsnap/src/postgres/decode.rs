//! PostgreSQL row decoding
//!
//! Maps `tokio_postgres` result rows onto the driver-native [`SqlValue`]
//! model. Types the driver has no `FromSql` for (interval, bit strings,
//! hstore, point, money, ranges, PostGIS payloads) are decoded from their
//! binary wire format here.

use bytes::Buf;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::types::{FromSql, Kind, ToSql, Type};

use crate::common::{Error, Result, Row, SqlValue};

type BoxError = Box<dyn std::error::Error + Sync + Send>;

// ---------------------------------------------------------------------------
// Wire-format parsers
// ---------------------------------------------------------------------------

/// interval: microseconds, days, months
pub(crate) fn parse_interval(mut raw: &[u8]) -> std::result::Result<SqlValue, BoxError> {
    if raw.remaining() < 16 {
        return Err("interval payload too short".into());
    }
    let micros = raw.get_i64();
    let days = raw.get_i32();
    let months = raw.get_i32();
    Ok(SqlValue::Interval {
        months,
        days,
        micros,
    })
}

/// bit/varbit: bit length, then the string packed MSB-first. Repacked here
/// LSB-first so the least significant bit of byte 0 is the rightmost bit of
/// the string.
pub(crate) fn parse_bits(mut raw: &[u8]) -> std::result::Result<SqlValue, BoxError> {
    if raw.remaining() < 4 {
        return Err("bit payload too short".into());
    }
    let len = raw.get_i32();
    if len < 0 || raw.remaining() < (len as usize).div_ceil(8) {
        return Err("bit payload truncated".into());
    }
    let len = len as usize;
    let msb = raw;

    let mut bytes = vec![0u8; len.div_ceil(8)];
    for k in 0..len {
        let i = len - 1 - k;
        if (msb[i / 8] >> (7 - i % 8)) & 1 == 1 {
            bytes[k / 8] |= 1 << (k % 8);
        }
    }
    Ok(SqlValue::Bits { len, bytes })
}

/// point: two float8 coordinates
pub(crate) fn parse_point(mut raw: &[u8]) -> std::result::Result<SqlValue, BoxError> {
    if raw.remaining() < 16 {
        return Err("point payload too short".into());
    }
    let x = raw.get_f64();
    let y = raw.get_f64();
    Ok(SqlValue::Point { x, y })
}

/// money: int8 in hundredths of the currency unit
pub(crate) fn parse_money(mut raw: &[u8]) -> std::result::Result<SqlValue, BoxError> {
    if raw.remaining() < 8 {
        return Err("money payload too short".into());
    }
    let cents = raw.get_i64();
    Ok(SqlValue::Decimal(Decimal::from_i128_with_scale(
        i128::from(cents),
        2,
    )))
}

/// hstore: entry count, then length-prefixed key/value pairs (-1 marks a
/// NULL value)
pub(crate) fn parse_hstore(mut raw: &[u8]) -> std::result::Result<SqlValue, BoxError> {
    if raw.remaining() < 4 {
        return Err("hstore payload too short".into());
    }
    let count = raw.get_i32();
    let mut entries = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        let key = read_text(&mut raw)?.ok_or("hstore key cannot be null")?;
        let value = read_text(&mut raw)?;
        entries.push((key, value));
    }
    Ok(SqlValue::Hstore(entries))
}

fn read_text(raw: &mut &[u8]) -> std::result::Result<Option<String>, BoxError> {
    if raw.remaining() < 4 {
        return Err("hstore payload truncated".into());
    }
    let len = raw.get_i32();
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    if raw.remaining() < len {
        return Err("hstore payload truncated".into());
    }
    let text = std::str::from_utf8(&raw[..len])?.to_string();
    raw.advance(len);
    Ok(Some(text))
}

const EWKB_SRID_FLAG: u32 = 0x2000_0000;

/// PostGIS geometry/geography: EWKB bytes with an optional embedded SRID
pub(crate) fn parse_wkb(raw: &[u8]) -> std::result::Result<SqlValue, BoxError> {
    if raw.len() < 5 {
        return Err("wkb payload too short".into());
    }
    let little_endian = raw[0] == 1;
    let mut header = &raw[1..];
    let gtype = if little_endian {
        header.get_u32_le()
    } else {
        header.get_u32()
    };
    let srid = if gtype & EWKB_SRID_FLAG != 0 {
        if header.remaining() < 4 {
            return Err("wkb srid truncated".into());
        }
        Some(if little_endian {
            header.get_i32_le()
        } else {
            header.get_i32()
        })
    } else {
        None
    };
    Ok(SqlValue::Geometry {
        srid,
        wkb: raw.to_vec(),
    })
}

// range flags
const RANGE_EMPTY: u8 = 0x01;
const RANGE_LB_INC: u8 = 0x02;
const RANGE_UB_INC: u8 = 0x04;
const RANGE_LB_INF: u8 = 0x08;
const RANGE_UB_INF: u8 = 0x10;

/// Range in canonical text form, e.g. `[1,11)` or
/// `["2020-01-01 00:00:00","2020-01-02 00:00:00")`.
pub(crate) fn parse_range(
    range_name: &str,
    mut raw: &[u8],
) -> std::result::Result<SqlValue, BoxError> {
    if raw.remaining() < 1 {
        return Err("range payload too short".into());
    }
    let flags = raw.get_u8();
    if flags & RANGE_EMPTY != 0 {
        return Ok(SqlValue::Range("empty".to_string()));
    }

    let lower = if flags & RANGE_LB_INF == 0 {
        Some(read_range_bound(range_name, &mut raw)?)
    } else {
        None
    };
    let upper = if flags & RANGE_UB_INF == 0 {
        Some(read_range_bound(range_name, &mut raw)?)
    } else {
        None
    };

    let lb = if flags & RANGE_LB_INC != 0 { '[' } else { '(' };
    let ub = if flags & RANGE_UB_INC != 0 { ']' } else { ')' };
    Ok(SqlValue::Range(format!(
        "{lb}{},{}{ub}",
        lower.unwrap_or_default(),
        upper.unwrap_or_default()
    )))
}

fn read_range_bound(
    range_name: &str,
    raw: &mut &[u8],
) -> std::result::Result<String, BoxError> {
    if raw.remaining() < 4 {
        return Err("range bound truncated".into());
    }
    let len = raw.get_i32();
    if len < 0 || raw.remaining() < len as usize {
        return Err("range bound truncated".into());
    }
    let current: &[u8] = raw;
    let (bound, rest) = current.split_at(len as usize);
    *raw = rest;

    let text = match range_name {
        "int4range" => i32::from_sql(&Type::INT4, bound)?.to_string(),
        "int8range" => i64::from_sql(&Type::INT8, bound)?.to_string(),
        "numrange" => Decimal::from_sql(&Type::NUMERIC, bound)?.to_string(),
        "daterange" => NaiveDate::from_sql(&Type::DATE, bound)?
            .format("%Y-%m-%d")
            .to_string(),
        // timestamp bounds contain spaces, so the canonical text quotes them
        "tsrange" => format!(
            "\"{}\"",
            format_ts(&NaiveDateTime::from_sql(&Type::TIMESTAMP, bound)?)
        ),
        "tstzrange" => format!(
            "\"{}+00\"",
            format_ts(&DateTime::<Utc>::from_sql(&Type::TIMESTAMPTZ, bound)?.naive_utc())
        ),
        other => return Err(format!("unsupported range type {other}").into()),
    };
    Ok(text)
}

fn format_ts(dt: &NaiveDateTime) -> String {
    use chrono::Timelike;
    if dt.nanosecond() == 0 {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()
    }
}

/// timetz: microseconds past midnight plus a zone displacement in seconds
/// (positive west of UTC); normalized to a UTC time-of-day
pub(crate) fn parse_timetz(mut raw: &[u8]) -> std::result::Result<SqlValue, BoxError> {
    if raw.remaining() < 12 {
        return Err("timetz payload too short".into());
    }
    let micros = raw.get_i64();
    let zone_secs = raw.get_i32();

    const DAY_MICROS: i64 = 86_400_000_000;
    let utc = (micros + i64::from(zone_secs) * 1_000_000).rem_euclid(DAY_MICROS);
    let time = NaiveTime::from_num_seconds_from_midnight_opt(
        (utc / 1_000_000) as u32,
        ((utc % 1_000_000) * 1000) as u32,
    )
    .ok_or("timetz out of range")?;
    Ok(SqlValue::Time(time))
}

// ---------------------------------------------------------------------------
// FromSql wrappers
// ---------------------------------------------------------------------------

macro_rules! wire_from_sql {
    ($name:ident, $parser:path, $accepts:expr) => {
        struct $name(SqlValue);

        impl<'a> FromSql<'a> for $name {
            fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
                $parser(raw).map($name)
            }

            fn accepts(ty: &Type) -> bool {
                let accepts: fn(&Type) -> bool = $accepts;
                accepts(ty)
            }
        }
    };
}

wire_from_sql!(PgInterval, parse_interval, |ty: &Type| *ty == Type::INTERVAL);
wire_from_sql!(PgBits, parse_bits, |ty: &Type| *ty == Type::BIT
    || *ty == Type::VARBIT);
wire_from_sql!(PgPoint, parse_point, |ty: &Type| *ty == Type::POINT);
wire_from_sql!(PgMoney, parse_money, |ty: &Type| *ty == Type::MONEY);
wire_from_sql!(PgTimeTz, parse_timetz, |ty: &Type| *ty == Type::TIMETZ);
wire_from_sql!(PgHstore, parse_hstore, |ty: &Type| ty.name() == "hstore");
wire_from_sql!(PgWkb, parse_wkb, |ty: &Type| ty.name() == "geometry"
    || ty.name() == "geography");

struct PgRangeText(SqlValue);

impl<'a> FromSql<'a> for PgRangeText {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        parse_range(ty.name(), raw).map(PgRangeText)
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            ty.name(),
            "int4range" | "int8range" | "numrange" | "tsrange" | "tstzrange" | "daterange"
        )
    }
}

/// Accepts any type and yields its payload as UTF-8 text. Used for
/// user-defined enums, whose wire format is the label itself.
struct AnyText(String);

impl<'a> FromSql<'a> for AnyText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(AnyText(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

/// Decode a driver row into the native value model.
pub fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(decode_value(row, idx, column.name(), column.type_())?);
    }
    Ok(Row::new(columns, values))
}

fn get<'a, T>(row: &'a tokio_postgres::Row, idx: usize, column: &str) -> Result<Option<T>>
where
    T: FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| Error::encoding(column, e.to_string()))
}

fn decode_array<'a, T>(
    row: &'a tokio_postgres::Row,
    idx: usize,
    column: &str,
    f: impl Fn(T) -> SqlValue,
) -> Result<SqlValue>
where
    T: FromSql<'a>,
{
    Ok(match get::<Vec<Option<T>>>(row, idx, column)? {
        Some(items) => SqlValue::Array(
            items
                .into_iter()
                .map(|item| item.map(&f).unwrap_or(SqlValue::Null))
                .collect(),
        ),
        None => SqlValue::Null,
    })
}

fn decode_value(
    row: &tokio_postgres::Row,
    idx: usize,
    column: &str,
    ty: &Type,
) -> Result<SqlValue> {
    macro_rules! scalar {
        ($t:ty, $variant:expr) => {
            get::<$t>(row, idx, column)?
                .map($variant)
                .unwrap_or(SqlValue::Null)
        };
    }

    // Type constants are not usable as match patterns; dispatch on the
    // catalog name instead (array type names carry a leading underscore).
    let value = match ty.name() {
        "bool" => scalar!(bool, SqlValue::Bool),
        "int2" => scalar!(i16, SqlValue::Int16),
        "int4" => scalar!(i32, SqlValue::Int32),
        "int8" => scalar!(i64, SqlValue::Int64),
        "float4" => scalar!(f32, SqlValue::Float32),
        "float8" => scalar!(f64, SqlValue::Float64),
        // NaN is not representable as a decimal; it surfaces as NULL, which
        // the converter then passes through
        "numeric" => match row.try_get::<_, Option<Decimal>>(idx) {
            Ok(Some(d)) => SqlValue::Decimal(d),
            Ok(None) | Err(_) => SqlValue::Null,
        },
        "money" => scalar!(PgMoney, |m: PgMoney| m.0),
        "text" | "varchar" | "bpchar" | "name" | "xml" | "unknown" => {
            scalar!(String, SqlValue::String)
        }
        "bytea" => scalar!(Vec<u8>, SqlValue::Bytes),
        "bit" | "varbit" => scalar!(PgBits, |b: PgBits| b.0),
        "uuid" => scalar!(uuid::Uuid, SqlValue::Uuid),
        "date" => scalar!(NaiveDate, SqlValue::Date),
        "time" => scalar!(NaiveTime, SqlValue::Time),
        "timetz" => scalar!(PgTimeTz, |t: PgTimeTz| t.0),
        "timestamp" => scalar!(NaiveDateTime, SqlValue::DateTime),
        "timestamptz" => scalar!(DateTime<Utc>, SqlValue::DateTimeTz),
        "interval" => scalar!(PgInterval, |i: PgInterval| i.0),
        "json" | "jsonb" => scalar!(serde_json::Value, SqlValue::Json),
        "point" => scalar!(PgPoint, |p: PgPoint| p.0),

        "_bool" => decode_array(row, idx, column, SqlValue::Bool)?,
        "_int2" => decode_array(row, idx, column, SqlValue::Int16)?,
        "_int4" => decode_array(row, idx, column, SqlValue::Int32)?,
        "_int8" => decode_array(row, idx, column, SqlValue::Int64)?,
        "_float4" => decode_array(row, idx, column, SqlValue::Float32)?,
        "_float8" => decode_array(row, idx, column, SqlValue::Float64)?,
        "_numeric" => decode_array(row, idx, column, SqlValue::Decimal)?,
        "_text" | "_varchar" | "_bpchar" => decode_array(row, idx, column, SqlValue::String)?,
        "_bytea" => decode_array(row, idx, column, SqlValue::Bytes)?,
        "_uuid" => decode_array(row, idx, column, SqlValue::Uuid)?,
        "_date" => decode_array(row, idx, column, SqlValue::Date)?,

        "hstore" => scalar!(PgHstore, |h: PgHstore| h.0),
        "geometry" | "geography" => scalar!(PgWkb, |g: PgWkb| g.0),
        "int4range" | "int8range" | "numrange" | "tsrange" | "tstzrange" | "daterange" => {
            scalar!(PgRangeText, |r: PgRangeText| r.0)
        }
        _ if matches!(ty.kind(), Kind::Enum(_)) => {
            scalar!(AnyText, |t: AnyText| SqlValue::Enum(t.0))
        }
        other => {
            return Err(Error::encoding(
                column,
                format!("unsupported result type {other}"),
            ))
        }
    };
    Ok(value)
}

// ---------------------------------------------------------------------------
// Parameter binding
// ---------------------------------------------------------------------------

/// Convert a native value into a driver parameter.
pub fn bind_param(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null => Box::new(Option::<i32>::None),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::Int16(n) => Box::new(*n),
        SqlValue::Int32(n) => Box::new(*n),
        SqlValue::Int64(n) => Box::new(*n),
        SqlValue::Float32(n) => Box::new(*n),
        SqlValue::Float64(n) => Box::new(*n),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::String(s) | SqlValue::Enum(s) | SqlValue::Range(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Time(t) => Box::new(*t),
        SqlValue::DateTime(dt) => Box::new(*dt),
        SqlValue::DateTimeTz(dt) => Box::new(*dt),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Json(j) => Box::new(j.clone()),
        // remaining kinds are not realistic key values; bind their textual
        // rendering so the failure mode is a server-side type error
        other => Box::new(other.to_plain_json().to_string()),
    }
}
