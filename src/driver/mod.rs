//! Backend driver seam.
//!
//! A [`Driver`] opens [`BackendHandle`]s for one dialect; a handle hands out a short-lived
//! [`Cursor`] per batch and owns commit/rollback. Handles are opened with autocommit off:
//! the first cursor implicitly begins a transaction that stays open until `commit` or
//! `rollback`.

mod ingest;
mod registry;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

use crate::error::ArrowSqlError;
use crate::types::{Dialect, IngestMode};
use crate::uri::ConnectionUri;

pub use ingest::{IngestPlan, plan_ingest};
pub use registry::DriverRegistry;

/// Factory for backend handles of one dialect.
#[async_trait]
pub trait Driver: Send + Sync {
    /// The dialect this driver speaks.
    fn dialect(&self) -> Dialect;

    /// Open a new handle with autocommit disabled.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be reached or opened.
    async fn connect(&self, uri: &ConnectionUri) -> Result<Box<dyn BackendHandle>, ArrowSqlError>;
}

/// One open backend connection.
#[async_trait]
pub trait BackendHandle: Send {
    /// Borrow a cursor for the duration of one batch.
    ///
    /// # Errors
    /// Returns an error if the implicit transaction cannot be started.
    async fn cursor<'a>(&'a mut self) -> Result<Box<dyn Cursor + 'a>, ArrowSqlError>;

    /// # Errors
    /// Returns an error if the backend rejects the commit.
    async fn commit(&mut self) -> Result<(), ArrowSqlError>;

    /// # Errors
    /// Returns an error if the backend rejects the rollback.
    async fn rollback(&mut self) -> Result<(), ArrowSqlError>;

    /// Whether `schema` exists on the backend.
    ///
    /// # Errors
    /// Returns an error if the catalog lookup fails.
    async fn schema_exists(&mut self, schema: &str) -> Result<bool, ArrowSqlError>;

    /// Release the handle. Any open transaction is discarded by the backend.
    ///
    /// # Errors
    /// Returns an error if the backend reports a failure while closing.
    async fn close(self: Box<Self>) -> Result<(), ArrowSqlError>;
}

/// Executes statements inside the handle's open transaction.
#[async_trait]
pub trait Cursor: Send {
    /// Run `query`; a result set, if any, is held for [`Cursor::fetch_table`].
    ///
    /// # Errors
    /// Returns the backend error for a failing statement.
    async fn execute(&mut self, query: &str) -> Result<(), ArrowSqlError>;

    /// Take the result set of the last [`Cursor::execute`] as a table.
    ///
    /// # Errors
    /// Returns `ArrowSqlError::ExecutionError` when no result set is pending.
    async fn fetch_table(&mut self) -> Result<RecordBatch, ArrowSqlError>;

    /// Write `data` into `[schema.]table_name` following `mode`.
    ///
    /// # Errors
    /// Returns the backend error for a failing DDL or insert.
    async fn bulk_ingest(
        &mut self,
        table_name: &str,
        data: &RecordBatch,
        schema: Option<&str>,
        mode: IngestMode,
    ) -> Result<(), ArrowSqlError>;

    /// Run the parameterized `query` once per row of `data`, binding columns by position.
    ///
    /// # Errors
    /// Returns the backend error for the first failing row.
    async fn execute_batched(&mut self, query: &str, data: &RecordBatch)
    -> Result<(), ArrowSqlError>;

    /// Release the cursor.
    ///
    /// # Errors
    /// Returns an error if the backend reports a failure while closing.
    async fn close(self: Box<Self>) -> Result<(), ArrowSqlError>;
}

impl std::fmt::Debug for dyn Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Driver").field(&self.dialect()).finish()
    }
}

/// Shared driver reference as stored by the registry and connections.
pub type DriverRef = Arc<dyn Driver>;
