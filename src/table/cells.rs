use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Date32Array, Float64Array, Int64Array,
    StringArray, TimestampMicrosecondArray, new_null_array,
};
use arrow::datatypes::{
    DataType, Date32Type, Field, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type,
    Int64Type, Schema, TimeUnit, TimestampMicrosecondType, TimestampMillisecondType,
    TimestampNanosecondType, TimestampSecondType, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::NaiveDate;

use crate::error::ArrowSqlError;
use crate::types::CellValue;

/// Name and optional declared type of one result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    /// Used when no non-null value is available to infer the type from.
    pub type_hint: Option<DataType>,
}

impl ColumnSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_hint: None,
        }
    }

    #[must_use]
    pub fn with_type_hint(mut self, type_hint: Option<DataType>) -> Self {
        self.type_hint = type_hint;
        self
    }
}

fn unix_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn missing_timestamp(row: usize) -> ArrowSqlError {
    ArrowSqlError::ExecutionError(format!("timestamp at row {row} is out of range"))
}

/// Read the value at `row` of `array` as a `CellValue`.
///
/// # Errors
/// Returns `ArrowSqlError::Unimplemented` for Arrow types with no `CellValue` mapping and
/// `ArrowSqlError::ExecutionError` for values that do not fit (e.g. `u64` above `i64::MAX`).
pub fn cell_value(array: &dyn Array, row: usize) -> Result<CellValue, ArrowSqlError> {
    if array.is_null(row) {
        return Ok(CellValue::Null);
    }

    let value = match array.data_type() {
        DataType::Null => CellValue::Null,
        DataType::Boolean => CellValue::Bool(array.as_boolean().value(row)),
        DataType::Int8 => CellValue::Int(i64::from(array.as_primitive::<Int8Type>().value(row))),
        DataType::Int16 => CellValue::Int(i64::from(array.as_primitive::<Int16Type>().value(row))),
        DataType::Int32 => CellValue::Int(i64::from(array.as_primitive::<Int32Type>().value(row))),
        DataType::Int64 => CellValue::Int(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => CellValue::Int(i64::from(array.as_primitive::<UInt8Type>().value(row))),
        DataType::UInt16 => {
            CellValue::Int(i64::from(array.as_primitive::<UInt16Type>().value(row)))
        }
        DataType::UInt32 => {
            CellValue::Int(i64::from(array.as_primitive::<UInt32Type>().value(row)))
        }
        DataType::UInt64 => {
            let raw = array.as_primitive::<UInt64Type>().value(row);
            CellValue::Int(i64::try_from(raw).map_err(|e| {
                ArrowSqlError::ExecutionError(format!("value {raw} does not fit in i64: {e}"))
            })?)
        }
        DataType::Float32 => {
            CellValue::Float(f64::from(array.as_primitive::<Float32Type>().value(row)))
        }
        DataType::Float64 => CellValue::Float(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => CellValue::Text(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => CellValue::Text(array.as_string::<i64>().value(row).to_string()),
        DataType::Binary => CellValue::Blob(array.as_binary::<i32>().value(row).to_vec()),
        DataType::LargeBinary => CellValue::Blob(array.as_binary::<i64>().value(row).to_vec()),
        DataType::Date32 => CellValue::Date(
            array
                .as_primitive::<Date32Type>()
                .value_as_date(row)
                .ok_or_else(|| missing_timestamp(row))?,
        ),
        DataType::Timestamp(unit, _) => {
            let dt = match unit {
                TimeUnit::Second => array
                    .as_primitive::<TimestampSecondType>()
                    .value_as_datetime(row),
                TimeUnit::Millisecond => array
                    .as_primitive::<TimestampMillisecondType>()
                    .value_as_datetime(row),
                TimeUnit::Microsecond => array
                    .as_primitive::<TimestampMicrosecondType>()
                    .value_as_datetime(row),
                TimeUnit::Nanosecond => array
                    .as_primitive::<TimestampNanosecondType>()
                    .value_as_datetime(row),
            };
            CellValue::Timestamp(dt.ok_or_else(|| missing_timestamp(row))?)
        }
        other => {
            return Err(ArrowSqlError::Unimplemented(format!(
                "Arrow type {other} cannot be bound as a SQL parameter"
            )));
        }
    };
    Ok(value)
}

/// Read one row of `data` as `CellValue`s, in column order.
///
/// # Errors
/// Propagates conversion errors from [`cell_value`].
pub fn row_values(data: &RecordBatch, row: usize) -> Result<Vec<CellValue>, ArrowSqlError> {
    data.columns()
        .iter()
        .map(|column| cell_value(column.as_ref(), row))
        .collect()
}

/// Read every row of `data`.
///
/// # Errors
/// Propagates conversion errors from [`cell_value`].
pub fn rows(data: &RecordBatch) -> Result<Vec<Vec<CellValue>>, ArrowSqlError> {
    (0..data.num_rows()).map(|row| row_values(data, row)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inferred {
    Int,
    Float,
    Bool,
    Text,
    Timestamp,
    Date,
    Blob,
}

fn infer(values: &[&CellValue]) -> Option<Inferred> {
    let mut inferred: Option<Inferred> = None;
    for value in values {
        let kind = match value {
            CellValue::Null => continue,
            CellValue::Int(_) => Inferred::Int,
            CellValue::Float(_) => Inferred::Float,
            CellValue::Bool(_) => Inferred::Bool,
            CellValue::Text(_) => Inferred::Text,
            CellValue::Timestamp(_) => Inferred::Timestamp,
            CellValue::Date(_) => Inferred::Date,
            CellValue::Blob(_) => Inferred::Blob,
        };
        inferred = Some(match (inferred, kind) {
            (None, kind) => kind,
            (Some(prev), kind) if prev == kind => prev,
            (Some(Inferred::Int | Inferred::Float), Inferred::Int | Inferred::Float) => {
                Inferred::Float
            }
            // Mixed storage classes (SQLite allows them) fall back to text.
            _ => Inferred::Text,
        });
    }
    inferred
}

fn build_column(
    spec: &ColumnSpec,
    values: &[&CellValue],
) -> Result<(DataType, ArrayRef), ArrowSqlError> {
    let Some(kind) = infer(values) else {
        let data_type = spec.type_hint.clone().unwrap_or(DataType::Utf8);
        return Ok((data_type.clone(), new_null_array(&data_type, values.len())));
    };

    let array: ArrayRef = match kind {
        Inferred::Int => Arc::new(Int64Array::from(
            values.iter().map(|v| v.as_int()).collect::<Vec<_>>(),
        )),
        Inferred::Float => Arc::new(Float64Array::from(
            values.iter().map(|v| v.as_float()).collect::<Vec<_>>(),
        )),
        Inferred::Bool => Arc::new(BooleanArray::from(
            values
                .iter()
                .map(|v| match v {
                    CellValue::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        Inferred::Text => Arc::new(StringArray::from(
            values.iter().map(|v| v.to_text()).collect::<Vec<_>>(),
        )),
        Inferred::Timestamp => Arc::new(TimestampMicrosecondArray::from(
            values
                .iter()
                .map(|v| match v {
                    CellValue::Timestamp(dt) => Some(dt.and_utc().timestamp_micros()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        Inferred::Date => {
            let epoch = unix_epoch();
            let days = values
                .iter()
                .map(|v| match v {
                    CellValue::Date(d) => {
                        i32::try_from(d.signed_duration_since(epoch).num_days()).ok()
                    }
                    _ => None,
                })
                .collect::<Vec<_>>();
            Arc::new(Date32Array::from(days))
        }
        Inferred::Blob => Arc::new(BinaryArray::from(
            values
                .iter()
                .map(|v| match v {
                    CellValue::Blob(bytes) => Some(bytes.as_slice()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
    };
    Ok((array.data_type().clone(), array))
}

/// Assemble a `RecordBatch` from row-major values.
///
/// Column types are inferred from the values: integers become `Int64`, a mix of integers
/// and floats becomes `Float64`, and any other mix falls back to `Utf8`. An all-null column
/// takes its `type_hint`, or `Utf8` without one.
///
/// # Errors
/// Returns `ArrowSqlError::ExecutionError` if a row has the wrong number of values, or an
/// Arrow error if the batch cannot be assembled.
pub fn build_record_batch(
    columns: &[ColumnSpec],
    rows: &[Vec<CellValue>],
) -> Result<RecordBatch, ArrowSqlError> {
    if let Some((idx, row)) = rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != columns.len())
    {
        return Err(ArrowSqlError::ExecutionError(format!(
            "row {idx} has {} values but the result has {} columns",
            row.len(),
            columns.len()
        )));
    }

    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());
    for (col_idx, spec) in columns.iter().enumerate() {
        let values: Vec<&CellValue> = rows.iter().map(|row| &row[col_idx]).collect();
        let (data_type, array) = build_column(spec, &values)?;
        fields.push(Field::new(spec.name.as_str(), data_type, true));
        arrays.push(array);
    }

    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        arrays,
        &options,
    )?)
}
