//! Column type mapping from JDBC type codes to target dialects.
//!
//! Each dialect has its own closed lookup table keyed by the
//! `java.sql.Types` code found in the schema export. Entries ending in `()`
//! take the declared column size; sizes above [`VARCHAR_CEILING`] (or not
//! positive) fall back to the dialect's unbounded text type.

use crate::error::NormalizeError;
use ahash::AHashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JDBC type codes (`java.sql.Types`) understood by the mapper
pub mod sql_types {
    pub const LONGNVARCHAR: i32 = -16;
    pub const NCHAR: i32 = -15;
    pub const NVARCHAR: i32 = -9;
    pub const BIT: i32 = -7;
    pub const TINYINT: i32 = -6;
    pub const BIGINT: i32 = -5;
    pub const LONGVARBINARY: i32 = -4;
    pub const VARBINARY: i32 = -3;
    pub const BINARY: i32 = -2;
    pub const LONGVARCHAR: i32 = -1;
    pub const CHAR: i32 = 1;
    pub const NUMERIC: i32 = 2;
    pub const DECIMAL: i32 = 3;
    pub const INTEGER: i32 = 4;
    pub const SMALLINT: i32 = 5;
    pub const FLOAT: i32 = 6;
    pub const REAL: i32 = 7;
    pub const DOUBLE: i32 = 8;
    pub const VARCHAR: i32 = 12;
    pub const BOOLEAN: i32 = 16;
    pub const DATE: i32 = 91;
    pub const TIME: i32 = 92;
    pub const TIMESTAMP: i32 = 93;
    pub const OTHER: i32 = 1111;
    pub const BLOB: i32 = 2004;
    pub const CLOB: i32 = 2005;
    pub const SQLXML: i32 = 2009;
    pub const NCLOB: i32 = 2011;
    pub const TIME_WITH_TIMEZONE: i32 = 2013;
    pub const TIMESTAMP_WITH_TIMEZONE: i32 = 2014;
}

use sql_types::*;

/// Largest size kept as a bounded character type
pub const VARCHAR_CEILING: i64 = 4000;

/// Target dialect for type names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Dialect {
    /// Generic ISO SQL DDL
    #[default]
    #[serde(rename = "iso")]
    Iso,
    /// Oracle SQL*Loader control-file field types
    #[serde(rename = "oracle-ctl")]
    OracleCtl,
    /// Oracle DDL
    #[serde(rename = "oracle")]
    OracleDdl,
    /// SQLite DDL
    #[serde(rename = "sqlite")]
    Sqlite,
}

impl Dialect {
    /// Whether this dialect names DDL column types (as opposed to loader field types)
    pub fn supports_ddl(&self) -> bool {
        !matches!(self, Dialect::OracleCtl)
    }

    /// Type used when a bounded character type would be too large
    pub fn unbounded_text(&self) -> &'static str {
        match self {
            Dialect::Iso | Dialect::OracleDdl => "clob",
            Dialect::Sqlite => "text",
            Dialect::OracleCtl => "char(1000000)",
        }
    }

    fn table(&self) -> &'static AHashMap<i32, &'static str> {
        match self {
            Dialect::Iso => &ISO_TYPES,
            Dialect::OracleCtl => &ORACLE_CTL_TYPES,
            Dialect::OracleDdl => &ORACLE_DDL_TYPES,
            Dialect::Sqlite => &SQLITE_TYPES,
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "iso" | "sql" => Ok(Dialect::Iso),
            "oracle" | "oracle-ddl" => Ok(Dialect::OracleDdl),
            "oracle-ctl" | "ctl" | "sqlldr" => Ok(Dialect::OracleCtl),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            _ => Err(format!(
                "Unknown dialect: {}. Valid options: iso, oracle, oracle-ctl, sqlite",
                s
            )),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Iso => write!(f, "iso"),
            Dialect::OracleCtl => write!(f, "oracle-ctl"),
            Dialect::OracleDdl => write!(f, "oracle"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// A type code with no entry in the dialect's table
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unsupported type code {code} for dialect {dialect}")]
pub struct UnsupportedTypeError {
    pub code: i32,
    pub dialect: Dialect,
}

impl UnsupportedTypeError {
    /// Attach the (original) table and column names
    pub fn for_column(self, table: &str, column: &str) -> NormalizeError {
        NormalizeError::UnsupportedType {
            table: table.to_string(),
            column: column.to_string(),
            code: self.code,
            dialect: self.dialect.to_string(),
        }
    }
}

static ISO_TYPES: Lazy<AHashMap<i32, &'static str>> = Lazy::new(|| {
    AHashMap::from_iter([
        (LONGNVARCHAR, "clob"),
        (NCHAR, "varchar()"),
        (NVARCHAR, "varchar()"),
        (BIT, "boolean"),
        (TINYINT, "integer"),
        (BIGINT, "bigint"),
        (LONGVARBINARY, "blob"),
        (VARBINARY, "blob"),
        (BINARY, "blob"),
        (LONGVARCHAR, "clob"),
        (CHAR, "varchar()"),
        (NUMERIC, "numeric"),
        (DECIMAL, "decimal"),
        (INTEGER, "integer"),
        (SMALLINT, "integer"),
        (FLOAT, "float"),
        (REAL, "real"),
        (DOUBLE, "double precision"),
        (VARCHAR, "varchar()"),
        (BOOLEAN, "boolean"),
        (DATE, "date"),
        (TIME, "time"),
        (TIMESTAMP, "timestamp"),
        (BLOB, "blob"),
        (CLOB, "clob"),
        (SQLXML, "clob"),
        (NCLOB, "clob"),
        (TIME_WITH_TIMEZONE, "time with time zone"),
        (TIMESTAMP_WITH_TIMEZONE, "timestamp with time zone"),
    ])
});

static ORACLE_DDL_TYPES: Lazy<AHashMap<i32, &'static str>> = Lazy::new(|| {
    AHashMap::from_iter([
        (LONGNVARCHAR, "clob"),
        (NCHAR, "varchar()"),
        (NVARCHAR, "varchar()"),
        (BIT, "number(1)"),
        (TINYINT, "number(3)"),
        (BIGINT, "number(19)"),
        (LONGVARBINARY, "blob"),
        (VARBINARY, "blob"),
        (BINARY, "blob"),
        (LONGVARCHAR, "clob"),
        (CHAR, "varchar()"),
        (NUMERIC, "number"),
        (DECIMAL, "number"),
        (INTEGER, "number(10)"),
        (SMALLINT, "number(5)"),
        (FLOAT, "float"),
        (REAL, "binary_float"),
        (DOUBLE, "binary_double"),
        (VARCHAR, "varchar()"),
        (BOOLEAN, "number(1)"),
        (DATE, "date"),
        (TIME, "timestamp"),
        (TIMESTAMP, "timestamp"),
        (BLOB, "blob"),
        (CLOB, "clob"),
        (SQLXML, "clob"),
        (NCLOB, "nclob"),
        (TIME_WITH_TIMEZONE, "timestamp with time zone"),
        (TIMESTAMP_WITH_TIMEZONE, "timestamp with time zone"),
    ])
});

static SQLITE_TYPES: Lazy<AHashMap<i32, &'static str>> = Lazy::new(|| {
    AHashMap::from_iter([
        (LONGNVARCHAR, "text"),
        (NCHAR, "varchar()"),
        (NVARCHAR, "varchar()"),
        (BIT, "integer"),
        (TINYINT, "integer"),
        (BIGINT, "integer"),
        (LONGVARBINARY, "blob"),
        (VARBINARY, "blob"),
        (BINARY, "blob"),
        (LONGVARCHAR, "text"),
        (CHAR, "varchar()"),
        (NUMERIC, "numeric"),
        (DECIMAL, "numeric"),
        (INTEGER, "integer"),
        (SMALLINT, "integer"),
        (FLOAT, "real"),
        (REAL, "real"),
        (DOUBLE, "real"),
        (VARCHAR, "varchar()"),
        (BOOLEAN, "integer"),
        (DATE, "text"),
        (TIME, "text"),
        (TIMESTAMP, "text"),
        (BLOB, "blob"),
        (CLOB, "text"),
        (SQLXML, "text"),
        (NCLOB, "text"),
        (TIME_WITH_TIMEZONE, "text"),
        (TIMESTAMP_WITH_TIMEZONE, "text"),
    ])
});

// Binary types are exported as separate files, so SQL*Loader never sees them
// inline and they have no field type here.
static ORACLE_CTL_TYPES: Lazy<AHashMap<i32, &'static str>> = Lazy::new(|| {
    AHashMap::from_iter([
        (LONGNVARCHAR, "char(1000000)"),
        (NCHAR, "char()"),
        (NVARCHAR, "char()"),
        (BIT, "integer external"),
        (TINYINT, "integer external"),
        (BIGINT, "integer external"),
        (LONGVARCHAR, "char(1000000)"),
        (CHAR, "char()"),
        (NUMERIC, "decimal external"),
        (DECIMAL, "decimal external"),
        (INTEGER, "integer external"),
        (SMALLINT, "integer external"),
        (FLOAT, "float external"),
        (REAL, "float external"),
        (DOUBLE, "float external"),
        (VARCHAR, "char()"),
        (BOOLEAN, "integer external"),
        (DATE, "date \"YYYY-MM-DD\""),
        (TIME, "char(30)"),
        (TIMESTAMP, "timestamp \"YYYY-MM-DD HH24:MI:SS.FF\""),
        (CLOB, "char(1000000)"),
        (SQLXML, "char(1000000)"),
        (NCLOB, "char(1000000)"),
        (TIME_WITH_TIMEZONE, "char(30)"),
        (
            TIMESTAMP_WITH_TIMEZONE,
            "timestamp with time zone \"YYYY-MM-DD HH24:MI:SS.FF TZH:TZM\"",
        ),
    ])
});

/// Type mapper for turning JDBC type codes into dialect type names
pub struct TypeMapper;

impl TypeMapper {
    /// Map a type code and declared size to the dialect's column type
    pub fn map_type(
        code: i32,
        declared_size: i64,
        dialect: Dialect,
    ) -> Result<String, UnsupportedTypeError> {
        let template = dialect
            .table()
            .get(&code)
            .ok_or(UnsupportedTypeError { code, dialect })?;

        match template.strip_suffix("()") {
            Some(base) => {
                if declared_size <= 0 || declared_size > VARCHAR_CEILING {
                    Ok(dialect.unbounded_text().to_string())
                } else {
                    Ok(format!("{base}({declared_size})"))
                }
            }
            None => Ok(template.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DDL_DIALECTS: [Dialect; 3] = [Dialect::Iso, Dialect::OracleDdl, Dialect::Sqlite];

    #[test]
    fn test_varchar_ceiling_boundary() {
        for dialect in DDL_DIALECTS {
            assert_eq!(
                TypeMapper::map_type(VARCHAR, 4000, dialect).unwrap(),
                "varchar(4000)"
            );
            assert_eq!(
                TypeMapper::map_type(VARCHAR, 4001, dialect).unwrap(),
                dialect.unbounded_text()
            );
        }
        assert_eq!(
            TypeMapper::map_type(VARCHAR, 4000, Dialect::OracleCtl).unwrap(),
            "char(4000)"
        );
        assert_eq!(
            TypeMapper::map_type(VARCHAR, 4001, Dialect::OracleCtl).unwrap(),
            "char(1000000)"
        );
    }

    #[test]
    fn test_unbounded_types() {
        assert_eq!(TypeMapper::map_type(VARCHAR, 4001, Dialect::Iso).unwrap(), "clob");
        assert_eq!(TypeMapper::map_type(VARCHAR, 4001, Dialect::Sqlite).unwrap(), "text");
    }

    #[test]
    fn test_non_positive_size_is_unbounded() {
        assert_eq!(TypeMapper::map_type(CHAR, 0, Dialect::Iso).unwrap(), "clob");
        assert_eq!(TypeMapper::map_type(NVARCHAR, -1, Dialect::Sqlite).unwrap(), "text");
    }

    #[test]
    fn test_fixed_types_ignore_size() {
        assert_eq!(TypeMapper::map_type(INTEGER, 10, Dialect::Iso).unwrap(), "integer");
        assert_eq!(
            TypeMapper::map_type(INTEGER, 10, Dialect::OracleDdl).unwrap(),
            "number(10)"
        );
        assert_eq!(
            TypeMapper::map_type(TIMESTAMP, 29, Dialect::Iso).unwrap(),
            "timestamp"
        );
        assert_eq!(TypeMapper::map_type(BOOLEAN, 1, Dialect::Sqlite).unwrap(), "integer");
    }

    #[test]
    fn test_unknown_code_is_an_error() {
        let err = TypeMapper::map_type(OTHER, 0, Dialect::Iso).unwrap_err();
        assert_eq!(err.code, OTHER);
        assert_eq!(err.dialect, Dialect::Iso);
        assert!(err.to_string().contains("1111"));
    }

    #[test]
    fn test_ctl_has_no_binary_types() {
        assert!(TypeMapper::map_type(BLOB, 0, Dialect::OracleCtl).is_err());
        assert!(TypeMapper::map_type(BLOB, 0, Dialect::Iso).is_ok());
    }

    #[test]
    fn test_dialect_parsing() {
        assert_eq!("ISO".parse::<Dialect>().unwrap(), Dialect::Iso);
        assert_eq!("oracle".parse::<Dialect>().unwrap(), Dialect::OracleDdl);
        assert_eq!("oracle-ctl".parse::<Dialect>().unwrap(), Dialect::OracleCtl);
        assert_eq!("sqlite".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert!("mysql".parse::<Dialect>().is_err());
        assert!(!Dialect::OracleCtl.supports_ddl());
    }
}
