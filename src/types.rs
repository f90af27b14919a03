use chrono::{NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::translation::PlaceholderStyle;

/// Scalar values moved between Arrow columns and backend parameters/rows.
///
/// Every driver adapter converts through this enum so the columnar helpers never need to
/// branch on driver types:
/// ```rust
/// use arrow_sql_middleware::prelude::*;
///
/// let row = vec![
///     CellValue::Int(1),
///     CellValue::Text("alice".into()),
///     CellValue::Null,
/// ];
/// assert!(row[2].is_null());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value (no time zone)
    Timestamp(NaiveDateTime),
    /// Calendar date
    Date(NaiveDate),
    /// Binary data
    Blob(Vec<u8>),
    /// NULL value
    Null,
}

impl CellValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let CellValue::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let CellValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            CellValue::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            CellValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Render the value as text; used when a column mixes incompatible types.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            CellValue::Int(i) => Some(i.to_string()),
            CellValue::Float(f) => Some(f.to_string()),
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Bool(b) => Some(b.to_string()),
            CellValue::Timestamp(dt) => Some(dt.format("%F %T%.f").to_string()),
            CellValue::Date(d) => Some(d.format("%F").to_string()),
            CellValue::Blob(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            CellValue::Null => None,
        }
    }
}

/// SQL dialects the middleware knows how to normalize operations for.
///
/// The dialect is derived from the connection URI's scheme and carried explicitly on the
/// connection; it is never inferred from a backend handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `PostgreSQL`: named schemas, native `$N` placeholders
    Postgres,
    /// `SQLite`: embedded file database without named schemas, positional `?` placeholders
    Sqlite,
    /// Flight SQL query-serving protocol: named schemas, positional `?` placeholders
    FlightSql,
}

impl Dialect {
    /// Resolve a dialect from a URI scheme.
    #[must_use]
    pub fn from_scheme(scheme: &str) -> Option<Dialect> {
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "sqlite" | "file" => Some(Dialect::Sqlite),
            "grpc" | "grpc+tls" | "grpc+tcp" | "flightsql" => Some(Dialect::FlightSql),
            _ => None,
        }
    }

    /// Whether an explicit schema qualifier is honored by this dialect.
    #[must_use]
    pub fn supports_schemas(self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    /// Placeholder convention the backend binds parameters with.
    #[must_use]
    pub fn placeholder_style(self) -> PlaceholderStyle {
        match self {
            Dialect::Postgres => PlaceholderStyle::Ordinal,
            Dialect::Sqlite | Dialect::FlightSql => PlaceholderStyle::Positional,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgresql",
            Dialect::Sqlite => "sqlite",
            Dialect::FlightSql => "flightsql",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Policy for bulk-writing a table into its destination.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    /// Append to an existing table
    #[default]
    Append,
    /// Create a new table; fails if it already exists
    Create,
    /// Create the table if missing, then append
    CreateAppend,
    /// Drop any existing table and create it fresh
    Replace,
}

impl IngestMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IngestMode::Append => "append",
            IngestMode::Create => "create",
            IngestMode::CreateAppend => "create_append",
            IngestMode::Replace => "replace",
        }
    }
}

impl std::str::FromStr for IngestMode {
    type Err = crate::error::ArrowSqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append" => Ok(IngestMode::Append),
            "create" => Ok(IngestMode::Create),
            "create_append" => Ok(IngestMode::CreateAppend),
            "replace" => Ok(IngestMode::Replace),
            other => Err(crate::error::ArrowSqlError::ArgumentError(format!(
                "unknown ingest mode '{other}'; expected one of append, create, create_append, replace"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_from_scheme() {
        assert_eq!(Dialect::from_scheme("postgresql"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_scheme("POSTGRES"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_scheme("sqlite"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_scheme("grpc+tls"), Some(Dialect::FlightSql));
        assert_eq!(Dialect::from_scheme("mysql"), None);
    }

    #[test]
    fn only_sqlite_is_schemaless() {
        assert!(Dialect::Postgres.supports_schemas());
        assert!(Dialect::FlightSql.supports_schemas());
        assert!(!Dialect::Sqlite.supports_schemas());
    }

    #[test]
    fn ingest_mode_parses_wire_names() {
        assert_eq!("create_append".parse::<IngestMode>().unwrap(), IngestMode::CreateAppend);
        assert_eq!(IngestMode::Replace.as_str(), "replace");
        assert_eq!(IngestMode::default(), IngestMode::Append);
        assert!("upsert".parse::<IngestMode>().is_err());
    }
}
