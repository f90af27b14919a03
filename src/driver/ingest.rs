use arrow::datatypes::Schema;

use crate::error::ArrowSqlError;
use crate::query_utils::{qualified_name, quote_identifier};
use crate::table::sql_type_name;
use crate::translation::PlaceholderStyle;
use crate::types::{Dialect, IngestMode};

/// SQL a driver runs to bulk-ingest a table: setup statements, then one parameterized
/// insert per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestPlan {
    pub setup: Vec<String>,
    pub insert: String,
}

/// Build the statements for ingesting rows shaped like `schema_of_data` into
/// `[db_schema.]table_name` under `mode`.
///
/// # Errors
/// Returns `ArrowSqlError::ArgumentError` for a payload without columns and
/// `ArrowSqlError::Unimplemented` for column types without a SQL counterpart.
pub fn plan_ingest(
    dialect: Dialect,
    table_name: &str,
    db_schema: Option<&str>,
    schema_of_data: &Schema,
    mode: IngestMode,
) -> Result<IngestPlan, ArrowSqlError> {
    let fields = schema_of_data.fields();
    if fields.is_empty() {
        return Err(ArrowSqlError::ArgumentError(format!(
            "cannot ingest a table with no columns into {table_name}"
        )));
    }

    let target = qualified_name(db_schema, table_name);
    let column_defs = fields
        .iter()
        .map(|field| {
            let sql_type = sql_type_name(field.data_type(), dialect)?;
            let nullability = if field.is_nullable() { "" } else { " NOT NULL" };
            Ok(format!(
                "{} {sql_type}{nullability}",
                quote_identifier(field.name())
            ))
        })
        .collect::<Result<Vec<_>, ArrowSqlError>>()?
        .join(", ");

    let setup = match mode {
        IngestMode::Append => Vec::new(),
        IngestMode::Create => vec![format!("CREATE TABLE {target} ({column_defs})")],
        IngestMode::CreateAppend => {
            vec![format!("CREATE TABLE IF NOT EXISTS {target} ({column_defs})")]
        }
        IngestMode::Replace => vec![
            format!("DROP TABLE IF EXISTS {target}"),
            format!("CREATE TABLE {target} ({column_defs})"),
        ],
    };

    let column_list = fields
        .iter()
        .map(|field| quote_identifier(field.name()))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=fields.len())
        .map(|n| match dialect.placeholder_style() {
            PlaceholderStyle::Ordinal => format!("${n}"),
            PlaceholderStyle::Positional => PlaceholderStyle::POSITIONAL_TOKEN.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ");

    Ok(IngestPlan {
        setup,
        insert: format!("INSERT INTO {target} ({column_list}) VALUES ({placeholders})"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field};

    fn shape() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("label", DataType::Utf8, true),
        ])
    }

    #[test]
    fn append_only_inserts() {
        let plan = plan_ingest(Dialect::Sqlite, "t", None, &shape(), IngestMode::Append).unwrap();
        assert!(plan.setup.is_empty());
        assert_eq!(plan.insert, "INSERT INTO t (id, label) VALUES (?, ?)");
    }

    #[test]
    fn replace_drops_then_creates() {
        let plan =
            plan_ingest(Dialect::Postgres, "t", Some("s"), &shape(), IngestMode::Replace).unwrap();
        assert_eq!(
            plan.setup,
            vec![
                "DROP TABLE IF EXISTS s.t".to_string(),
                "CREATE TABLE s.t (id BIGINT NOT NULL, label TEXT)".to_string(),
            ]
        );
        assert_eq!(plan.insert, "INSERT INTO s.t (id, label) VALUES ($1, $2)");
    }

    #[test]
    fn create_append_is_idempotent_ddl() {
        let plan =
            plan_ingest(Dialect::Sqlite, "t", None, &shape(), IngestMode::CreateAppend).unwrap();
        assert_eq!(
            plan.setup,
            vec!["CREATE TABLE IF NOT EXISTS t (id INTEGER NOT NULL, label TEXT)".to_string()]
        );
    }

    #[test]
    fn empty_payload_is_rejected() {
        let err = plan_ingest(Dialect::Sqlite, "t", None, &Schema::empty(), IngestMode::Create)
            .unwrap_err();
        assert!(matches!(err, ArrowSqlError::ArgumentError(_)));
    }
}
