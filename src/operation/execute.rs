use arrow::record_batch::RecordBatch;
use tracing::debug;

use super::Operation;
use crate::dialect::{expand_simple_delete, expand_simple_update};
use crate::driver::Cursor;
use crate::error::ArrowSqlError;
use crate::types::Dialect;

/// Run one already-normalized operation on `cursor`.
///
/// Backend failures come back as `OperationError` carrying the operation's context; the
/// caller owns rollback.
pub(crate) async fn execute_operation(
    op: &Operation,
    dialect: Dialect,
    cursor: &mut dyn Cursor,
) -> Result<Option<RecordBatch>, ArrowSqlError> {
    debug!(kind = op.kind(), dialect = dialect.name(), "executing operation");
    dispatch(op, dialect, cursor)
        .await
        .map_err(|source| ArrowSqlError::operation(op.error_context(), source))
}

async fn dispatch(
    op: &Operation,
    dialect: Dialect,
    cursor: &mut dyn Cursor,
) -> Result<Option<RecordBatch>, ArrowSqlError> {
    match op {
        Operation::Read(read) => {
            cursor.execute(&read.query).await?;
            Ok(Some(cursor.fetch_table().await?))
        }
        Operation::BulkInsert(insert) => {
            cursor
                .bulk_ingest(
                    &insert.table_name,
                    &insert.data,
                    insert.schema.as_deref(),
                    insert.mode,
                )
                .await?;
            Ok(None)
        }
        Operation::UpdateDelete(update) => {
            cursor.execute_batched(&update.query, &update.data).await?;
            Ok(None)
        }
        // Normally expanded by `normalize`; the same expansion applies here.
        Operation::SimpleUpdate(update) => {
            let expanded = expand_simple_update(dialect, update)?;
            cursor.execute_batched(&expanded.query, &expanded.data).await?;
            Ok(None)
        }
        Operation::SimpleDelete(delete) => {
            let expanded = expand_simple_delete(dialect, delete)?;
            cursor.execute_batched(&expanded.query, &expanded.data).await?;
            Ok(None)
        }
    }
}
