//! Dialect adapter: rewrites operations into the shape a backend expects.
//!
//! Everything here is pure. [`normalize`] never mutates the caller's operation, so the same
//! `Operation` can be executed against several connections of different dialects.

use std::borrow::Cow;

use tracing::warn;

use crate::error::ArrowSqlError;
use crate::operation::{BulkInsert, Operation, SimpleDelete, SimpleUpdate, UpdateDelete};
use crate::table::project_columns;
use crate::translation::{PlaceholderStyle, rewrite_to_positional};
use crate::types::Dialect;

/// Produce the form of `op` that `dialect` can execute.
///
/// - schema qualifiers are dropped (with a warning) for dialects without schemas;
/// - `default_schema` fills in a `BulkInsert` that names none;
/// - `SimpleUpdate` / `SimpleDelete` are expanded into an `UpdateDelete`;
/// - an auto-adjusting `UpdateDelete` is rewritten from `$N` to `?` with its payload
///   permuted to match, for dialects with positional placeholders.
///
/// # Errors
/// Returns `ArrowSqlError::ArgumentError` if the operation cannot be expressed for the
/// dialect, e.g. a placeholder that references a missing payload column.
pub fn normalize<'a>(
    dialect: Dialect,
    op: &'a Operation,
    default_schema: Option<&str>,
) -> Result<Cow<'a, Operation>, ArrowSqlError> {
    match op {
        Operation::Read(_) => Ok(Cow::Borrowed(op)),
        Operation::BulkInsert(insert) => {
            let wanted = insert.schema.as_deref().or(default_schema);
            let resolved = effective_schema(dialect, wanted, &insert.table_name);
            if resolved == insert.schema.as_deref() {
                return Ok(Cow::Borrowed(op));
            }
            let resolved = resolved.map(str::to_string);
            Ok(Cow::Owned(Operation::BulkInsert(BulkInsert {
                schema: resolved,
                ..insert.clone()
            })))
        }
        Operation::UpdateDelete(update) => match adjust_update_delete(dialect, update)? {
            Cow::Borrowed(_) => Ok(Cow::Borrowed(op)),
            Cow::Owned(adjusted) => Ok(Cow::Owned(Operation::UpdateDelete(adjusted))),
        },
        Operation::SimpleUpdate(update) => Ok(Cow::Owned(Operation::UpdateDelete(
            expand_simple_update(dialect, update)?,
        ))),
        Operation::SimpleDelete(delete) => Ok(Cow::Owned(Operation::UpdateDelete(
            expand_simple_delete(dialect, delete)?,
        ))),
    }
}

/// Expand a `SimpleUpdate` into the `UpdateDelete` that `dialect` executes.
pub(crate) fn expand_simple_update(
    dialect: Dialect,
    update: &SimpleUpdate,
) -> Result<UpdateDelete, ArrowSqlError> {
    let mut update = update.clone();
    if effective_schema(dialect, update.schema(), update.table_name()).is_none() {
        update.clear_schema();
    }
    let expanded = update.to_update_delete()?;
    Ok(adjust_update_delete(dialect, &expanded)?.into_owned())
}

/// Expand a `SimpleDelete` into the `UpdateDelete` that `dialect` executes.
pub(crate) fn expand_simple_delete(
    dialect: Dialect,
    delete: &SimpleDelete,
) -> Result<UpdateDelete, ArrowSqlError> {
    let mut delete = delete.clone();
    if effective_schema(dialect, delete.schema(), delete.table_name()).is_none() {
        delete.clear_schema();
    }
    let expanded = delete.to_update_delete()?;
    Ok(adjust_update_delete(dialect, &expanded)?.into_owned())
}

/// The schema qualifier `dialect` will honor for `target`.
fn effective_schema<'s>(dialect: Dialect, schema: Option<&'s str>, target: &str) -> Option<&'s str> {
    match schema {
        Some(schema) if !dialect.supports_schemas() => {
            warn!(
                dialect = dialect.name(),
                schema,
                target,
                "schema qualifier ignored: dialect has no named schemas"
            );
            None
        }
        other => other,
    }
}

/// Rewrite an `UpdateDelete` for the dialect's placeholder convention.
///
/// For positional dialects each `$N` occurrence, in text order, becomes `?` and pulls
/// payload column `N - 1` into the matching position, so `... $2 ... $1` over `[a, b]`
/// binds `[b, a]`. Operations with `auto_adjust` off, and ordinal dialects, are returned
/// untouched.
///
/// # Errors
/// Returns `ArrowSqlError::ArgumentError` if a placeholder has no payload column.
pub fn adjust_update_delete(
    dialect: Dialect,
    op: &UpdateDelete,
) -> Result<Cow<'_, UpdateDelete>, ArrowSqlError> {
    if !op.auto_adjust || dialect.placeholder_style() != PlaceholderStyle::Positional {
        return Ok(Cow::Borrowed(op));
    }
    let rewritten = rewrite_to_positional(&op.query)?;
    let width = op.data.num_columns();
    if let Some(&missing) = rewritten.binding_order.iter().find(|&&idx| idx >= width) {
        return Err(ArrowSqlError::ArgumentError(format!(
            "placeholder ${} has no matching column; the payload has {width} columns",
            missing + 1
        )));
    }
    let data = project_columns(&op.data, &rewritten.binding_order)?;
    Ok(Cow::Owned(UpdateDelete {
        query: rewritten.sql,
        data,
        auto_adjust: op.auto_adjust,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    use crate::operation::Read;

    fn pair() -> RecordBatch {
        RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("a", DataType::Int64, false),
                Field::new("b", DataType::Utf8, false),
            ])),
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec!["x", "y"])),
            ],
        )
        .unwrap()
    }

    fn names(batch: &RecordBatch) -> Vec<String> {
        batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    fn as_update_delete(op: &Operation) -> &UpdateDelete {
        match op {
            Operation::UpdateDelete(update) => update,
            other => panic!("expected update/delete, got {}", other.kind()),
        }
    }

    #[test]
    fn positional_dialect_permutes_columns() {
        let op: Operation = UpdateDelete::new("UPDATE t SET b = $2 WHERE a = $1", pair())
            .unwrap()
            .into();
        let normalized = normalize(Dialect::Sqlite, &op, None).unwrap();
        let update = as_update_delete(&normalized);
        assert_eq!(update.query(), "UPDATE t SET b = ? WHERE a = ?");
        assert_eq!(names(update.data()), vec!["b", "a"]);

        // The caller's operation is untouched.
        assert_eq!(as_update_delete(&op).query(), "UPDATE t SET b = $2 WHERE a = $1");
    }

    #[test]
    fn flight_sql_is_positional_too() {
        let op: Operation = UpdateDelete::new("DELETE FROM t WHERE b = $2", pair())
            .unwrap()
            .into();
        let normalized = normalize(Dialect::FlightSql, &op, None).unwrap();
        let update = as_update_delete(&normalized);
        assert_eq!(update.query(), "DELETE FROM t WHERE b = ?");
        assert_eq!(names(update.data()), vec!["b"]);
    }

    #[test]
    fn ordinal_dialect_and_opt_out_are_untouched() {
        let op: Operation = UpdateDelete::new("UPDATE t SET b = $2 WHERE a = $1", pair())
            .unwrap()
            .into();
        assert!(matches!(
            normalize(Dialect::Postgres, &op, None).unwrap(),
            Cow::Borrowed(_)
        ));

        let opted_out: Operation = UpdateDelete::new("UPDATE t SET b = $2 WHERE a = $1", pair())
            .unwrap()
            .with_auto_adjust(false)
            .into();
        assert!(matches!(
            normalize(Dialect::Sqlite, &opted_out, None).unwrap(),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn repeated_placeholder_duplicates_column() {
        let update = UpdateDelete::new("UPDATE t SET a = $1 WHERE a = $1 OR b = $2", pair())
            .unwrap();
        let adjusted = adjust_update_delete(Dialect::Sqlite, &update).unwrap();
        assert_eq!(names(adjusted.data()), vec!["a", "a", "b"]);
    }

    #[test]
    fn unresolvable_placeholder_is_an_argument_error() {
        let update = UpdateDelete {
            query: "DELETE FROM t WHERE a = $3".into(),
            data: pair(),
            auto_adjust: true,
        };
        let err = adjust_update_delete(Dialect::Sqlite, &update).unwrap_err();
        assert!(matches!(err, ArrowSqlError::ArgumentError(msg) if msg.contains("$3")));
    }

    #[test]
    fn schema_dropped_for_sqlite_but_kept_elsewhere() {
        let op: Operation = BulkInsert::new("t", pair()).unwrap().with_schema("s").into();

        let on_sqlite = normalize(Dialect::Sqlite, &op, None).unwrap();
        let Operation::BulkInsert(insert) = on_sqlite.as_ref() else {
            unreachable!()
        };
        assert_eq!(insert.schema(), None);

        assert!(matches!(
            normalize(Dialect::Postgres, &op, None).unwrap(),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn default_schema_fills_unqualified_bulk_insert() {
        let op: Operation = BulkInsert::new("t", pair()).unwrap().into();
        let normalized = normalize(Dialect::Postgres, &op, Some("staging")).unwrap();
        let Operation::BulkInsert(insert) = normalized.as_ref() else {
            unreachable!()
        };
        assert_eq!(insert.schema(), Some("staging"));

        let explicit: Operation = BulkInsert::new("t", pair()).unwrap().with_schema("s").into();
        let normalized = normalize(Dialect::Postgres, &explicit, Some("staging")).unwrap();
        let Operation::BulkInsert(insert) = normalized.as_ref() else {
            unreachable!()
        };
        assert_eq!(insert.schema(), Some("s"));
    }

    #[test]
    fn builders_expand_and_lose_schema_on_sqlite() {
        let op: Operation = SimpleUpdate::new("t", pair(), ["b"], ["a"])
            .unwrap()
            .with_schema("s")
            .into();
        let normalized = normalize(Dialect::Sqlite, &op, None).unwrap();
        let update = as_update_delete(&normalized);
        assert_eq!(update.query(), "UPDATE t SET b = ? WHERE a = ?");
        assert_eq!(names(update.data()), vec!["b", "a"]);

        let op: Operation = SimpleDelete::new("t", pair(), ["a"])
            .unwrap()
            .with_schema("s")
            .into();
        let normalized = normalize(Dialect::Postgres, &op, None).unwrap();
        assert_eq!(
            as_update_delete(&normalized).query(),
            "DELETE FROM s.t WHERE a = $1"
        );
    }

    #[test]
    fn reads_pass_through() {
        let op: Operation = Read::new("SELECT $1").unwrap().into();
        assert!(matches!(
            normalize(Dialect::Sqlite, &op, None).unwrap(),
            Cow::Borrowed(_)
        ));
    }
}
