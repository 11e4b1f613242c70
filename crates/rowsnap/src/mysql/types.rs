//! MySQL type catalog
//!
//! Parses the `type(meta) [unsigned]` strings that `DESCRIBE` reports and
//! dispatches them onto the converter catalog. Unsigned integers are
//! promoted one width up so the signed driver value always fits.

use crate::common::{Converter, Error, Result};

/// Supported MySQL column types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MySqlType {
    /// `tinyint(1)`, MySQL's boolean
    TinyIntBool,
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal { precision: u32, scale: u32 },
    Char { size: Option<u32> },
    Varchar { size: Option<u32> },
    Text,
    Binary,
    Blob,
    Bit { len: u32 },
    Date,
    DateTime { fsp: u32 },
    Timestamp { fsp: u32 },
    Time { fsp: u32 },
    Year,
    Json,
    Enum,
    Set,
}

/// Parse a `DESCRIBE` type string, e.g. `int(11) unsigned`,
/// `decimal(5,3)`, `varchar(255)`, `enum('a','b')`.
pub fn parse_mysql_type(raw: &str) -> std::result::Result<MySqlType, String> {
    let raw = raw.trim().to_lowercase();

    let (base, rest) = match raw.find('(') {
        Some(open) => {
            let close = raw
                .rfind(')')
                .ok_or_else(|| format!("unbalanced parentheses in {raw:?}"))?;
            (
                raw[..open].trim(),
                (raw[open + 1..close].trim(), raw[close + 1..].trim()),
            )
        }
        None => match raw.split_once(' ') {
            Some((base, flags)) => (base, ("", flags)),
            None => (raw.as_str(), ("", "")),
        },
    };
    let (meta, flags) = rest;
    let unsigned = flags.split_whitespace().any(|f| f == "unsigned");

    let parse_size = |meta: &str| -> std::result::Result<Option<u32>, String> {
        if meta.is_empty() {
            return Ok(None);
        }
        meta.parse::<u32>()
            .map(Some)
            .map_err(|_| format!("invalid size in {raw:?}"))
    };

    let ty = match base {
        "tinyint" => {
            if unsigned {
                MySqlType::SmallInt
            } else if meta == "1" {
                MySqlType::TinyIntBool
            } else {
                MySqlType::TinyInt
            }
        }
        "smallint" => {
            if unsigned {
                MySqlType::MediumInt
            } else {
                MySqlType::SmallInt
            }
        }
        "mediumint" => {
            if unsigned {
                MySqlType::Int
            } else {
                MySqlType::MediumInt
            }
        }
        "int" | "integer" => {
            if unsigned {
                MySqlType::BigInt
            } else {
                MySqlType::Int
            }
        }
        "bigint" => MySqlType::BigInt,
        "float" => MySqlType::Float,
        "double" | "real" => MySqlType::Double,
        "decimal" | "numeric" => {
            let (p, s) = meta
                .split_once(',')
                .ok_or_else(|| format!("{base} requires precision and scale, got {raw:?}"))?;
            MySqlType::Decimal {
                precision: p
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid precision in {raw:?}"))?,
                scale: s
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid scale in {raw:?}"))?,
            }
        }
        "char" => MySqlType::Char {
            size: parse_size(meta)?,
        },
        "varchar" => MySqlType::Varchar {
            size: parse_size(meta)?,
        },
        "tinytext" | "text" | "mediumtext" | "longtext" => MySqlType::Text,
        "binary" | "varbinary" => MySqlType::Binary,
        "tinyblob" | "blob" | "mediumblob" | "longblob" => MySqlType::Blob,
        "bit" => MySqlType::Bit {
            len: parse_size(meta)?.unwrap_or(1),
        },
        "date" => MySqlType::Date,
        "datetime" => MySqlType::DateTime {
            fsp: parse_size(meta)?.unwrap_or(0),
        },
        "timestamp" => MySqlType::Timestamp {
            fsp: parse_size(meta)?.unwrap_or(0),
        },
        "time" => MySqlType::Time {
            fsp: parse_size(meta)?.unwrap_or(0),
        },
        "year" => MySqlType::Year,
        "json" => MySqlType::Json,
        "enum" => MySqlType::Enum,
        "set" => MySqlType::Set,
        other => return Err(format!("unsupported mysql type {other:?}")),
    };
    Ok(ty)
}

/// Dispatch a parsed type onto a converter.
pub fn dispatch(column: &str, ty: &MySqlType) -> Result<Converter> {
    let converter = match ty {
        MySqlType::TinyIntBool => Converter::Boolean,
        MySqlType::TinyInt | MySqlType::SmallInt => Converter::Int16,
        MySqlType::MediumInt | MySqlType::Int => Converter::Int32,
        MySqlType::BigInt => Converter::Int64,
        MySqlType::Float => Converter::Float,
        MySqlType::Double => Converter::Double,
        MySqlType::Decimal { precision, scale } => Converter::Decimal {
            scale: *scale,
            precision: Some(*precision),
        },
        MySqlType::Char { .. } | MySqlType::Varchar { .. } | MySqlType::Text => Converter::Text,
        MySqlType::Binary | MySqlType::Blob => Converter::Bytes,
        MySqlType::Bit { len: 1 } => Converter::Boolean,
        MySqlType::Bit { len } => Converter::Bits {
            len: Some(*len as usize),
        },
        MySqlType::Date => Converter::Date,
        MySqlType::DateTime { fsp } if *fsp <= 3 => Converter::Timestamp,
        MySqlType::DateTime { fsp } if *fsp <= 6 => Converter::MicroTimestamp,
        // the session runs in UTC, so TIMESTAMP values are absolute
        MySqlType::Timestamp { fsp } if *fsp <= 6 => Converter::ZonedTimestamp,
        MySqlType::Time { fsp } if *fsp <= 3 => Converter::Time,
        MySqlType::Time { fsp } if *fsp <= 6 => Converter::MicroTime,
        MySqlType::Year => Converter::Year,
        MySqlType::Json => Converter::Json,
        MySqlType::Enum => Converter::Enum,
        MySqlType::Set => Converter::EnumSet,
        other => return Err(Error::type_dispatch(column, format!("{other:?}"))),
    };
    Ok(converter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integers_and_promotions() {
        assert_eq!(parse_mysql_type("int(11)").unwrap(), MySqlType::Int);
        assert_eq!(
            parse_mysql_type("tinyint unsigned").unwrap(),
            MySqlType::SmallInt
        );
        assert_eq!(
            parse_mysql_type("smallint(5) unsigned").unwrap(),
            MySqlType::MediumInt
        );
        assert_eq!(
            parse_mysql_type("mediumint unsigned").unwrap(),
            MySqlType::Int
        );
        assert_eq!(
            parse_mysql_type("int unsigned").unwrap(),
            MySqlType::BigInt
        );
        assert_eq!(
            parse_mysql_type("bigint(20) unsigned").unwrap(),
            MySqlType::BigInt
        );
    }

    #[test]
    fn test_parse_tinyint1_is_boolean() {
        assert_eq!(parse_mysql_type("tinyint(1)").unwrap(), MySqlType::TinyIntBool);
        assert_eq!(parse_mysql_type("tinyint(4)").unwrap(), MySqlType::TinyInt);
    }

    #[test]
    fn test_parse_decimal_requires_both_parts() {
        assert_eq!(
            parse_mysql_type("decimal(5,3)").unwrap(),
            MySqlType::Decimal {
                precision: 5,
                scale: 3
            }
        );
        assert!(parse_mysql_type("decimal(5)").is_err());
        assert!(parse_mysql_type("numeric").is_err());
    }

    #[test]
    fn test_parse_varchar_carries_size() {
        assert_eq!(
            parse_mysql_type("varchar(255)").unwrap(),
            MySqlType::Varchar { size: Some(255) }
        );
    }

    #[test]
    fn test_parse_enum_and_set() {
        assert_eq!(parse_mysql_type("enum('a','b')").unwrap(), MySqlType::Enum);
        assert_eq!(parse_mysql_type("set('x','y')").unwrap(), MySqlType::Set);
    }

    #[test]
    fn test_parse_temporals() {
        assert_eq!(
            parse_mysql_type("datetime(6)").unwrap(),
            MySqlType::DateTime { fsp: 6 }
        );
        assert_eq!(
            parse_mysql_type("timestamp").unwrap(),
            MySqlType::Timestamp { fsp: 0 }
        );
        assert_eq!(parse_mysql_type("time(3)").unwrap(), MySqlType::Time { fsp: 3 });
    }

    #[test]
    fn test_parse_unknown_type_fails() {
        assert!(parse_mysql_type("geometrycollection").is_err());
    }

    #[test]
    fn test_dispatch_decimal_descriptor() {
        // decimal(5,3) keeps both parameters for the schema
        let conv = dispatch("d", &MySqlType::Decimal { precision: 5, scale: 3 }).unwrap();
        assert_eq!(
            conv,
            Converter::Decimal {
                scale: 3,
                precision: Some(5)
            }
        );
    }

    #[test]
    fn test_dispatch_bit_widths() {
        assert_eq!(
            dispatch("b", &MySqlType::Bit { len: 1 }).unwrap(),
            Converter::Boolean
        );
        assert_eq!(
            dispatch("b", &MySqlType::Bit { len: 5 }).unwrap(),
            Converter::Bits { len: Some(5) }
        );
    }

    #[test]
    fn test_dispatch_temporal_precision_split() {
        assert_eq!(
            dispatch("t", &MySqlType::DateTime { fsp: 0 }).unwrap(),
            Converter::Timestamp
        );
        assert_eq!(
            dispatch("t", &MySqlType::DateTime { fsp: 6 }).unwrap(),
            Converter::MicroTimestamp
        );
        assert_eq!(
            dispatch("t", &MySqlType::Timestamp { fsp: 0 }).unwrap(),
            Converter::ZonedTimestamp
        );
        assert_eq!(
            dispatch("t", &MySqlType::Time { fsp: 0 }).unwrap(),
            Converter::Time
        );
        assert_eq!(
            dispatch("t", &MySqlType::Time { fsp: 6 }).unwrap(),
            Converter::MicroTime
        );
    }

    #[test]
    fn test_dispatch_out_of_range_precision_fails() {
        let err = dispatch("t", &MySqlType::Time { fsp: 9 }).unwrap_err();
        assert!(matches!(err, Error::TypeDispatch { .. }));
    }
}
