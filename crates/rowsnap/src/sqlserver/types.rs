//! SQL Server type catalog
//!
//! Parses `INFORMATION_SCHEMA` type names plus their precision columns and
//! dispatches onto the converter catalog. Temporal types split on
//! `DATETIME_PRECISION`: 0-3 map to millisecond converters, 4-6 to
//! microsecond, 7 to nanosecond.

use crate::common::{Converter, Error, Result, TypeOpts};

/// Supported SQL Server column types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsSqlType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Decimal { precision: u32, scale: u32 },
    Money,
    SmallMoney,
    Date,
    Time { precision: u32 },
    DateTime2 { precision: u32 },
    DateTimeOffset,
    /// smalldatetime and datetime, both millisecond-resolution
    DateTime,
    /// char, nchar, varchar, nvarchar, text, ntext, xml
    String,
    UniqueIdentifier,
    /// image, binary, varbinary
    Bytes,
}

/// Parse an `INFORMATION_SCHEMA.COLUMNS` row's type description.
pub fn parse_mssql_type(
    data_type: &str,
    opts: &TypeOpts,
) -> std::result::Result<MsSqlType, String> {
    let ty = match data_type.trim().to_lowercase().as_str() {
        "bit" => MsSqlType::Bit,
        "tinyint" => MsSqlType::TinyInt,
        "smallint" => MsSqlType::SmallInt,
        "int" => MsSqlType::Int,
        "bigint" => MsSqlType::BigInt,
        "real" => MsSqlType::Real,
        "float" => MsSqlType::Float,
        "decimal" | "numeric" => match (opts.precision, opts.scale) {
            (Some(precision), Some(scale)) => MsSqlType::Decimal { precision, scale },
            _ => return Err(format!("{data_type} requires precision and scale")),
        },
        "money" => MsSqlType::Money,
        "smallmoney" => MsSqlType::SmallMoney,
        "date" => MsSqlType::Date,
        "time" => MsSqlType::Time {
            precision: opts.datetime_precision.unwrap_or(7),
        },
        "datetime2" => MsSqlType::DateTime2 {
            precision: opts.datetime_precision.unwrap_or(7),
        },
        "datetimeoffset" => MsSqlType::DateTimeOffset,
        "smalldatetime" | "datetime" => MsSqlType::DateTime,
        "char" | "nchar" | "varchar" | "nvarchar" | "text" | "ntext" | "xml" => MsSqlType::String,
        "uniqueidentifier" => MsSqlType::UniqueIdentifier,
        "image" | "binary" | "varbinary" => MsSqlType::Bytes,
        other => return Err(format!("unsupported sql server type {other:?}")),
    };
    Ok(ty)
}

/// Dispatch a parsed type onto a converter.
pub fn dispatch(column: &str, ty: &MsSqlType) -> Result<Converter> {
    let converter = match ty {
        MsSqlType::Bit => Converter::Boolean,
        MsSqlType::TinyInt | MsSqlType::SmallInt => Converter::Int16,
        MsSqlType::Int => Converter::Int32,
        MsSqlType::BigInt => Converter::Int64,
        MsSqlType::Real | MsSqlType::Float => Converter::Float,
        MsSqlType::Decimal { precision, scale } => Converter::Decimal {
            scale: *scale,
            precision: Some(*precision),
        },
        MsSqlType::Money | MsSqlType::SmallMoney => Converter::Money { scale: 4 },
        MsSqlType::Date => Converter::Date,
        MsSqlType::Time { precision: 0..=3 } => Converter::Time,
        MsSqlType::Time { precision: 4..=6 } => Converter::MicroTime,
        MsSqlType::Time { precision: 7 } => Converter::NanoTime,
        MsSqlType::DateTime2 { precision: 0..=3 } => Converter::Timestamp,
        MsSqlType::DateTime2 { precision: 4..=6 } => Converter::MicroTimestamp,
        MsSqlType::DateTime2 { precision: 7 } => Converter::NanoTimestamp,
        MsSqlType::DateTimeOffset => Converter::ZonedTimestamp,
        MsSqlType::DateTime => Converter::Timestamp,
        MsSqlType::String => Converter::Text,
        MsSqlType::UniqueIdentifier => Converter::Uuid,
        MsSqlType::Bytes => Converter::Bytes,
        other => return Err(Error::type_dispatch(column, format!("{other:?}"))),
    };
    Ok(converter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(precision: Option<u32>, scale: Option<u32>, dtp: Option<u32>) -> TypeOpts {
        TypeOpts {
            precision,
            scale,
            datetime_precision: dtp,
            size: None,
        }
    }

    #[test]
    fn test_parse_integers() {
        let o = TypeOpts::default();
        assert_eq!(parse_mssql_type("tinyint", &o).unwrap(), MsSqlType::TinyInt);
        assert_eq!(parse_mssql_type("smallint", &o).unwrap(), MsSqlType::SmallInt);
        assert_eq!(parse_mssql_type("int", &o).unwrap(), MsSqlType::Int);
        assert_eq!(parse_mssql_type("BIGINT", &o).unwrap(), MsSqlType::BigInt);
    }

    #[test]
    fn test_parse_decimal_requires_modifiers() {
        assert_eq!(
            parse_mssql_type("decimal", &opts(Some(10), Some(2), None)).unwrap(),
            MsSqlType::Decimal {
                precision: 10,
                scale: 2
            }
        );
        assert!(parse_mssql_type("numeric", &TypeOpts::default()).is_err());
    }

    #[test]
    fn test_parse_strings_and_bytes() {
        let o = TypeOpts::default();
        for name in ["char", "nchar", "varchar", "nvarchar", "text", "ntext", "xml"] {
            assert_eq!(parse_mssql_type(name, &o).unwrap(), MsSqlType::String);
        }
        for name in ["image", "binary", "varbinary"] {
            assert_eq!(parse_mssql_type(name, &o).unwrap(), MsSqlType::Bytes);
        }
    }

    #[test]
    fn test_dispatch_integer_widths() {
        assert_eq!(
            dispatch("c", &MsSqlType::TinyInt).unwrap(),
            Converter::Int16
        );
        assert_eq!(
            dispatch("c", &MsSqlType::SmallInt).unwrap(),
            Converter::Int16
        );
        assert_eq!(dispatch("c", &MsSqlType::Int).unwrap(), Converter::Int32);
        assert_eq!(dispatch("c", &MsSqlType::BigInt).unwrap(), Converter::Int64);
    }

    #[test]
    fn test_dispatch_time_precision_split() {
        for (precision, expected) in [
            (0, Converter::Time),
            (3, Converter::Time),
            (4, Converter::MicroTime),
            (6, Converter::MicroTime),
            (7, Converter::NanoTime),
        ] {
            assert_eq!(
                dispatch("c", &MsSqlType::Time { precision }).unwrap(),
                expected,
                "time({precision})"
            );
        }
    }

    #[test]
    fn test_dispatch_datetime2_precision_split() {
        for (precision, expected) in [
            (0, Converter::Timestamp),
            (3, Converter::Timestamp),
            (5, Converter::MicroTimestamp),
            (7, Converter::NanoTimestamp),
        ] {
            assert_eq!(
                dispatch("c", &MsSqlType::DateTime2 { precision }).unwrap(),
                expected,
                "datetime2({precision})"
            );
        }
    }

    #[test]
    fn test_dispatch_legacy_datetimes_are_millisecond() {
        assert_eq!(
            dispatch("c", &MsSqlType::DateTime).unwrap(),
            Converter::Timestamp
        );
        assert_eq!(
            dispatch("c", &MsSqlType::DateTimeOffset).unwrap(),
            Converter::ZonedTimestamp
        );
    }

    #[test]
    fn test_dispatch_money_scale() {
        assert_eq!(
            dispatch("c", &MsSqlType::Money).unwrap(),
            Converter::Money { scale: 4 }
        );
        assert_eq!(
            dispatch("c", &MsSqlType::SmallMoney).unwrap(),
            Converter::Money { scale: 4 }
        );
    }

    #[test]
    fn test_dispatch_out_of_range_precision_fails() {
        let err = dispatch("c_time", &MsSqlType::Time { precision: 9 }).unwrap_err();
        assert!(matches!(err, Error::TypeDispatch { .. }));
        assert!(err.to_string().contains("c_time"));
    }
}
