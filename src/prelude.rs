//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::connection::{
    Batch, BatchResult, Connection, ConnectionOptions, ConnectionOptionsBuilder,
};
pub use crate::dialect::{adjust_update_delete, normalize};
pub use crate::driver::{BackendHandle, Cursor, Driver, DriverRef, DriverRegistry};
pub use crate::error::ArrowSqlError;
pub use crate::operation::{BulkInsert, Operation, Read, SimpleDelete, SimpleUpdate, UpdateDelete};
pub use crate::table::{
    ColumnSpec, build_record_batch, project_columns, same_rows_unordered, select_columns,
};
pub use crate::translation::PlaceholderStyle;
pub use crate::types::{CellValue, Dialect, IngestMode};
pub use crate::uri::ConnectionUri;

#[cfg(feature = "postgres")]
pub use crate::driver::postgres::PostgresDriver;
#[cfg(feature = "sqlite")]
pub use crate::driver::sqlite::SqliteDriver;
