//! Units of work executed inside a connection's transaction.
//!
//! `Operation` is a closed set: a read, a bulk ingest, a parameterized update/delete, and
//! the single-table [`SimpleUpdate`] / [`SimpleDelete`] forms that expand into an
//! update/delete from column lists.

mod builders;
mod execute;

use arrow::record_batch::RecordBatch;

use crate::error::ArrowSqlError;
use crate::query_utils::qualified_name;
use crate::translation::max_ordinal;
use crate::types::IngestMode;

pub use builders::{SimpleDelete, SimpleUpdate};
pub(crate) use execute::execute_operation;

/// One unit of work in a batch.
///
/// ```rust
/// use arrow_sql_middleware::prelude::*;
///
/// # fn demo() -> Result<(), ArrowSqlError> {
/// let read: Operation = Read::new("SELECT * FROM orders")?.into();
/// assert!(!read.is_state_modifying());
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub enum Operation {
    Read(Read),
    BulkInsert(BulkInsert),
    UpdateDelete(UpdateDelete),
    SimpleUpdate(SimpleUpdate),
    SimpleDelete(SimpleDelete),
}

impl Operation {
    /// Whether executing this operation can change database state.
    #[must_use]
    pub fn is_state_modifying(&self) -> bool {
        match self {
            Operation::Read(_) => false,
            Operation::BulkInsert(_)
            | Operation::UpdateDelete(_)
            | Operation::SimpleUpdate(_)
            | Operation::SimpleDelete(_) => true,
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Read(_) => "read",
            Operation::BulkInsert(_) => "bulk_insert",
            Operation::UpdateDelete(_) => "update_delete",
            Operation::SimpleUpdate(_) => "simple_update",
            Operation::SimpleDelete(_) => "simple_delete",
        }
    }

    /// Context attached to `OperationError` when this operation fails.
    #[must_use]
    pub fn error_context(&self) -> String {
        match self {
            Operation::Read(op) => format!("Failed to execute query:\n{}", op.query),
            Operation::BulkInsert(op) => format!(
                "Failed to bulk insert data into {}",
                qualified_name(op.schema.as_deref(), &op.table_name)
            ),
            Operation::UpdateDelete(op) => format!("Failed to execute query:\n{}", op.query),
            Operation::SimpleUpdate(op) => format!("Failed to execute query:\n{}", op.query()),
            Operation::SimpleDelete(op) => format!("Failed to execute query:\n{}", op.query()),
        }
    }
}

/// Read-only query whose result is fetched as a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Read {
    pub(crate) query: String,
}

impl Read {
    /// # Errors
    /// Returns `ArrowSqlError::ArgumentError` if `query` is blank.
    pub fn new(query: impl Into<String>) -> Result<Self, ArrowSqlError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(ArrowSqlError::ArgumentError(
                "read query must not be empty".into(),
            ));
        }
        Ok(Self { query })
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }
}

/// Bulk ingest of a table into `[schema.]table_name`.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkInsert {
    pub(crate) table_name: String,
    pub(crate) schema: Option<String>,
    pub(crate) mode: IngestMode,
    pub(crate) data: RecordBatch,
}

impl BulkInsert {
    /// Append `data` to `table_name`. Use [`BulkInsert::with_mode`] for other policies.
    ///
    /// # Errors
    /// Returns `ArrowSqlError::ArgumentError` if `table_name` is blank.
    pub fn new(table_name: impl Into<String>, data: RecordBatch) -> Result<Self, ArrowSqlError> {
        let table_name = table_name.into();
        if table_name.trim().is_empty() {
            return Err(ArrowSqlError::ArgumentError(
                "bulk insert table name must not be empty".into(),
            ));
        }
        Ok(Self {
            table_name,
            schema: None,
            mode: IngestMode::default(),
            data,
        })
    }

    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: IngestMode) -> Self {
        self.mode = mode;
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

    #[must_use]
    pub fn mode(&self) -> IngestMode {
        self.mode
    }

    #[must_use]
    pub fn data(&self) -> &RecordBatch {
        &self.data
    }
}

/// Parameterized UPDATE/DELETE executed once per payload row.
///
/// The query uses ordinal placeholders; placeholder `$N` binds payload column `N - 1`.
/// With `auto_adjust` on (the default), the query and payload are rewritten for backends
/// that only understand positional `?` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDelete {
    pub(crate) query: String,
    pub(crate) data: RecordBatch,
    pub(crate) auto_adjust: bool,
}

impl UpdateDelete {
    /// # Errors
    /// Returns `ArrowSqlError::ArgumentError` if the query is blank or references a
    /// placeholder beyond the payload's column count.
    pub fn new(query: impl Into<String>, data: RecordBatch) -> Result<Self, ArrowSqlError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(ArrowSqlError::ArgumentError(
                "update/delete query must not be empty".into(),
            ));
        }
        let highest = max_ordinal(&query)?;
        if highest > data.num_columns() {
            return Err(ArrowSqlError::ArgumentError(format!(
                "query references ${highest} but the payload has only {} columns",
                data.num_columns()
            )));
        }
        Ok(Self {
            query,
            data,
            auto_adjust: true,
        })
    }

    /// Toggle dialect auto-adjustment of placeholders and column order.
    #[must_use]
    pub fn with_auto_adjust(mut self, auto_adjust: bool) -> Self {
        self.auto_adjust = auto_adjust;
        self
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn data(&self) -> &RecordBatch {
        &self.data
    }

    #[must_use]
    pub fn auto_adjust(&self) -> bool {
        self.auto_adjust
    }
}

impl From<Read> for Operation {
    fn from(op: Read) -> Self {
        Operation::Read(op)
    }
}

impl From<BulkInsert> for Operation {
    fn from(op: BulkInsert) -> Self {
        Operation::BulkInsert(op)
    }
}

impl From<UpdateDelete> for Operation {
    fn from(op: UpdateDelete) -> Self {
        Operation::UpdateDelete(op)
    }
}

impl From<SimpleUpdate> for Operation {
    fn from(op: SimpleUpdate) -> Self {
        Operation::SimpleUpdate(op)
    }
}

impl From<SimpleDelete> for Operation {
    fn from(op: SimpleDelete) -> Self {
        Operation::SimpleDelete(op)
    }
}
