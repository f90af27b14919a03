//! Helpers over Arrow `RecordBatch`, the interchange format for query results and
//! write payloads.

mod cells;

use std::sync::Arc;

use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::error::ArrowSqlError;
use crate::types::Dialect;

pub use cells::{ColumnSpec, build_record_batch, cell_value, row_values, rows};

/// Reorder/select columns of `data` by index. Indices may repeat.
///
/// # Errors
/// Returns `ArrowSqlError::ArgumentError` if an index is out of range.
pub fn project_columns(data: &RecordBatch, indices: &[usize]) -> Result<RecordBatch, ArrowSqlError> {
    let schema = data.schema();
    let mut fields = Vec::with_capacity(indices.len());
    let mut columns = Vec::with_capacity(indices.len());
    for &idx in indices {
        if idx >= data.num_columns() {
            return Err(ArrowSqlError::ArgumentError(format!(
                "column index {idx} is out of range; the payload has {} columns",
                data.num_columns()
            )));
        }
        fields.push(schema.field(idx).clone());
        columns.push(Arc::clone(data.column(idx)));
    }

    let options = RecordBatchOptions::new().with_row_count(Some(data.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        columns,
        &options,
    )?)
}

/// Select columns of `data` by name, in the order given.
///
/// # Errors
/// Returns `ArrowSqlError::ArgumentError` naming the first column missing from `data`.
pub fn select_columns<S: AsRef<str>>(
    data: &RecordBatch,
    names: &[S],
) -> Result<RecordBatch, ArrowSqlError> {
    let schema = data.schema();
    let indices = names
        .iter()
        .map(|name| {
            schema.index_of(name.as_ref()).map_err(|_| {
                ArrowSqlError::ArgumentError(format!(
                    "column '{}' is not present in the payload",
                    name.as_ref()
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    project_columns(data, &indices)
}

/// Compare two tables as multisets of rows, ignoring column and row order.
///
/// Columns are matched by name; values are compared after conversion to `CellValue`, so
/// `Int32` and `Int64` columns holding the same numbers compare equal.
///
/// # Errors
/// Propagates conversion errors from [`cell_value`].
pub fn same_rows_unordered(left: &RecordBatch, right: &RecordBatch) -> Result<bool, ArrowSqlError> {
    if left.num_columns() != right.num_columns() || left.num_rows() != right.num_rows() {
        return Ok(false);
    }

    let names: Vec<String> = left
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let Ok(right) = select_columns(right, &names) else {
        return Ok(false);
    };

    let mut left_rows: Vec<String> = rows(left)?.iter().map(|r| format!("{r:?}")).collect();
    let mut right_rows: Vec<String> = rows(&right)?.iter().map(|r| format!("{r:?}")).collect();
    left_rows.sort();
    right_rows.sort();
    Ok(left_rows == right_rows)
}

/// Column type used when a bulk ingest has to create its destination table.
///
/// # Errors
/// Returns `ArrowSqlError::Unimplemented` for Arrow types without a SQL counterpart.
pub fn sql_type_name(data_type: &DataType, dialect: Dialect) -> Result<&'static str, ArrowSqlError> {
    let name = match dialect {
        // Reads decode BOOLEAN, DATE and DATETIME columns by their declared type.
        Dialect::Sqlite => match data_type {
            DataType::Boolean => "BOOLEAN",
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => "INTEGER",
            DataType::Float32 | DataType::Float64 => "REAL",
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Null => "TEXT",
            DataType::Binary | DataType::LargeBinary => "BLOB",
            DataType::Date32 => "DATE",
            DataType::Timestamp(_, _) => "DATETIME",
            other => return Err(unsupported(other)),
        },
        Dialect::Postgres | Dialect::FlightSql => match data_type {
            DataType::Boolean => "BOOLEAN",
            DataType::Int8 | DataType::Int16 | DataType::UInt8 => "SMALLINT",
            DataType::Int32 | DataType::UInt16 => "INTEGER",
            DataType::Int64 | DataType::UInt32 | DataType::UInt64 => "BIGINT",
            DataType::Float32 => "REAL",
            DataType::Float64 => "DOUBLE PRECISION",
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Null => "TEXT",
            DataType::Binary | DataType::LargeBinary => "BYTEA",
            DataType::Date32 => "DATE",
            DataType::Timestamp(_, None) => "TIMESTAMP",
            DataType::Timestamp(_, Some(_)) => "TIMESTAMPTZ",
            other => return Err(unsupported(other)),
        },
    };
    Ok(name)
}

fn unsupported(data_type: &DataType) -> ArrowSqlError {
    ArrowSqlError::Unimplemented(format!("no SQL column type for Arrow type {data_type}"))
}
