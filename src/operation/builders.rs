use arrow::record_batch::RecordBatch;

use super::UpdateDelete;
use crate::error::ArrowSqlError;
use crate::query_utils::{qualified_name, quote_identifier};
use crate::table::select_columns;

fn collect_columns<I, S>(columns: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    columns.into_iter().map(Into::into).collect()
}

fn check_target(
    table_name: &str,
    data: &RecordBatch,
    column_sets: &[(&str, &[String])],
) -> Result<(), ArrowSqlError> {
    if table_name.trim().is_empty() {
        return Err(ArrowSqlError::ArgumentError(
            "table name must not be empty".into(),
        ));
    }
    for (label, columns) in column_sets {
        if columns.is_empty() {
            return Err(ArrowSqlError::ArgumentError(format!(
                "at least one {label} column is required"
            )));
        }
        // Fails with the missing column's name.
        select_columns(data, columns)?;
    }
    Ok(())
}

/// `col = $n` terms joined by `separator`, numbered from `first`.
fn assignments(columns: &[String], first: usize, separator: &str) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(offset, column)| format!("{} = ${}", quote_identifier(column), first + offset))
        .collect::<Vec<_>>()
        .join(separator)
}

/// `UPDATE [schema.]table SET v1 = $1, ... WHERE w1 = $k AND ...`, one statement per
/// payload row.
///
/// Value columns are numbered first and predicate columns after them; the payload is cut
/// down to exactly those columns in that order.
///
/// ```rust
/// # use std::sync::Arc;
/// # use arrow::array::{Int64Array, StringArray};
/// # use arrow::datatypes::{DataType, Field, Schema};
/// # use arrow::record_batch::RecordBatch;
/// use arrow_sql_middleware::prelude::*;
///
/// # fn demo() -> Result<(), ArrowSqlError> {
/// # let data = RecordBatch::try_new(
/// #     Arc::new(Schema::new(vec![
/// #         Field::new("id", DataType::Int64, false),
/// #         Field::new("status", DataType::Utf8, false),
/// #     ])),
/// #     vec![Arc::new(Int64Array::from(vec![7])), Arc::new(StringArray::from(vec!["shipped"]))],
/// # )?;
/// let update = SimpleUpdate::new("orders", data, ["status"], ["id"])?;
/// assert_eq!(update.query(), "UPDATE orders SET status = $1 WHERE id = $2");
/// # Ok(()) }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleUpdate {
    table_name: String,
    schema: Option<String>,
    value_columns: Vec<String>,
    where_columns: Vec<String>,
    data: RecordBatch,
}

impl SimpleUpdate {
    /// # Errors
    /// Returns `ArrowSqlError::ArgumentError` if the table name is blank, either column list
    /// is empty, or a listed column is missing from `data`.
    pub fn new<V, W, S, T>(
        table_name: impl Into<String>,
        data: RecordBatch,
        value_columns: V,
        where_columns: W,
    ) -> Result<Self, ArrowSqlError>
    where
        V: IntoIterator<Item = S>,
        S: Into<String>,
        W: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let table_name = table_name.into();
        let value_columns = collect_columns(value_columns);
        let where_columns = collect_columns(where_columns);
        check_target(
            &table_name,
            &data,
            &[
                ("value", value_columns.as_slice()),
                ("predicate", where_columns.as_slice()),
            ],
        )?;
        Ok(Self {
            table_name,
            schema: None,
            value_columns,
            where_columns,
            data,
        })
    }

    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub(crate) fn clear_schema(&mut self) {
        self.schema = None;
    }

    /// The synthesized statement, using ordinal placeholders.
    #[must_use]
    pub fn query(&self) -> String {
        format!(
            "UPDATE {} SET {} WHERE {}",
            qualified_name(self.schema.as_deref(), &self.table_name),
            assignments(&self.value_columns, 1, ", "),
            assignments(&self.where_columns, self.value_columns.len() + 1, " AND "),
        )
    }

    /// Expand into the equivalent [`UpdateDelete`].
    ///
    /// # Errors
    /// Returns `ArrowSqlError::ArgumentError` if the payload no longer matches the columns.
    pub fn to_update_delete(&self) -> Result<UpdateDelete, ArrowSqlError> {
        let ordered: Vec<&String> = self
            .value_columns
            .iter()
            .chain(self.where_columns.iter())
            .collect();
        let payload = select_columns(&self.data, &ordered)?;
        UpdateDelete::new(self.query(), payload)
    }
}

/// `DELETE FROM [schema.]table WHERE w1 = $1 AND ...`, one statement per payload row.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleDelete {
    table_name: String,
    schema: Option<String>,
    where_columns: Vec<String>,
    data: RecordBatch,
}

impl SimpleDelete {
    /// # Errors
    /// Returns `ArrowSqlError::ArgumentError` if the table name is blank, the predicate list
    /// is empty, or a listed column is missing from `data`.
    pub fn new<W, T>(
        table_name: impl Into<String>,
        data: RecordBatch,
        where_columns: W,
    ) -> Result<Self, ArrowSqlError>
    where
        W: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let table_name = table_name.into();
        let where_columns = collect_columns(where_columns);
        check_target(&table_name, &data, &[("predicate", where_columns.as_slice())])?;
        Ok(Self {
            table_name,
            schema: None,
            where_columns,
            data,
        })
    }

    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub(crate) fn clear_schema(&mut self) {
        self.schema = None;
    }

    #[must_use]
    pub fn query(&self) -> String {
        format!(
            "DELETE FROM {} WHERE {}",
            qualified_name(self.schema.as_deref(), &self.table_name),
            assignments(&self.where_columns, 1, " AND "),
        )
    }

    /// Expand into the equivalent [`UpdateDelete`].
    ///
    /// # Errors
    /// Returns `ArrowSqlError::ArgumentError` if the payload no longer matches the columns.
    pub fn to_update_delete(&self) -> Result<UpdateDelete, ArrowSqlError> {
        let payload = select_columns(&self.data, &self.where_columns)?;
        UpdateDelete::new(self.query(), payload)
    }
}
