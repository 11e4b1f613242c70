//! PostgreSQL type catalog
//!
//! Closed enumeration of the supported column types, the parser from
//! `information_schema`/`pg_catalog` names, and the pure dispatcher onto
//! the converter catalog.

use crate::common::{Converter, Error, Result, TypeOpts};

/// Supported PostgreSQL column types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgType {
    Bool,
    Int16,
    Int32,
    Int64,
    Real,
    Double,
    /// numeric/decimal; precision and scale are runtime type modifiers
    Numeric,
    Money,
    /// char, bpchar, varchar, text, name, xml
    Text,
    Bytea,
    /// fixed-width bit(n)
    Bit,
    /// varying bit
    VarBit,
    Uuid,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Interval,
    Json,
    JsonB,
    /// user-defined enum
    Enum,
    Point,
    Geometry,
    Geography,
    Int4Range,
    Int8Range,
    NumRange,
    TsRange,
    TsTzRange,
    DateRange,
    Hstore,
    Array(Box<PgType>),
}

impl std::fmt::Display for PgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Array(inner) => write!(f, "{inner}[]"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// Parse a type from its `udt_name` (e.g. `int4`, `_text`, `numrange`) plus
/// the `pg_type.typtype` kind char (`e` marks user-defined enums).
pub fn parse_pg_type(udt_name: &str, type_kind: &str) -> Option<PgType> {
    let udt_name = udt_name.to_lowercase();

    if let Some(element) = udt_name.strip_prefix('_') {
        return parse_pg_type(element, type_kind).map(|t| PgType::Array(Box::new(t)));
    }

    let ty = match udt_name.as_str() {
        "bool" => PgType::Bool,
        "int2" => PgType::Int16,
        "int4" => PgType::Int32,
        "int8" => PgType::Int64,
        "float4" => PgType::Real,
        "float8" => PgType::Double,
        "numeric" => PgType::Numeric,
        "money" => PgType::Money,
        "char" | "bpchar" | "varchar" | "text" | "name" | "xml" => PgType::Text,
        "bytea" => PgType::Bytea,
        "bit" => PgType::Bit,
        "varbit" => PgType::VarBit,
        "uuid" => PgType::Uuid,
        "date" => PgType::Date,
        "time" => PgType::Time,
        "timetz" => PgType::TimeTz,
        "timestamp" => PgType::Timestamp,
        "timestamptz" => PgType::TimestampTz,
        "interval" => PgType::Interval,
        "json" => PgType::Json,
        "jsonb" => PgType::JsonB,
        "point" => PgType::Point,
        "geometry" => PgType::Geometry,
        "geography" => PgType::Geography,
        "int4range" => PgType::Int4Range,
        "int8range" => PgType::Int8Range,
        "numrange" => PgType::NumRange,
        "tsrange" => PgType::TsRange,
        "tstzrange" => PgType::TsTzRange,
        "daterange" => PgType::DateRange,
        "hstore" => PgType::Hstore,
        _ if type_kind == "e" => PgType::Enum,
        _ => return None,
    };
    Some(ty)
}

/// Dispatch a column type onto a converter. Fails with the type name and
/// column name for unsupported combinations.
pub fn dispatch(column: &str, ty: &PgType, opts: &TypeOpts) -> Result<Converter> {
    let converter = match ty {
        PgType::Bool => Converter::Boolean,
        PgType::Int16 => Converter::Int16,
        PgType::Int32 => Converter::Int32,
        PgType::Int64 => Converter::Int64,
        PgType::Real => Converter::Float,
        PgType::Double => Converter::Double,
        // numeric without type modifiers has per-value scale
        PgType::Numeric => match opts.scale {
            Some(scale) => Converter::Decimal {
                scale,
                precision: opts.precision,
            },
            None => Converter::VariableScaleDecimal,
        },
        PgType::Money => Converter::Money { scale: 2 },
        PgType::Text => Converter::Text,
        PgType::Bytea => Converter::Bytes,
        PgType::Bit => match opts.size {
            Some(1) => Converter::Boolean,
            len => Converter::Bits { len: len.map(|n| n as usize) },
        },
        PgType::VarBit => Converter::Bits { len: None },
        PgType::Uuid => Converter::Uuid,
        PgType::Date => Converter::Date,
        PgType::Time => Converter::MicroTime,
        PgType::TimeTz => Converter::ZonedTime,
        PgType::Timestamp => Converter::MicroTimestamp,
        PgType::TimestampTz => Converter::ZonedTimestamp,
        PgType::Interval => Converter::MicroDuration,
        PgType::Json | PgType::JsonB => Converter::Json,
        PgType::Enum => Converter::Enum,
        PgType::Point => Converter::Point,
        PgType::Geometry => Converter::Geometry,
        PgType::Geography => Converter::Geography,
        PgType::Int4Range
        | PgType::Int8Range
        | PgType::NumRange
        | PgType::TsRange
        | PgType::TsTzRange
        | PgType::DateRange => Converter::Range,
        PgType::Hstore => Converter::Hstore,
        PgType::Array(element) => {
            let inner = dispatch(column, element, opts)?;
            if matches!(inner, Converter::Array(_)) {
                return Err(Error::type_dispatch(column, format!("{ty} (nested array)")));
            }
            Converter::Array(Box::new(inner))
        }
    };
    Ok(converter)
}
