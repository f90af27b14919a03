//! Transactional connection: every batch runs in one all-or-nothing transaction.

use std::borrow::Cow;

use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::dialect::normalize;
use crate::driver::{BackendHandle, DriverRef, DriverRegistry};
use crate::error::ArrowSqlError;
use crate::operation::{Operation, execute_operation};
use crate::types::Dialect;
use crate::uri::ConnectionUri;

fn default_persistent() -> bool {
    true
}

/// Options for opening a [`Connection`].
///
/// Deserializable so applications can keep it in their own config files:
/// ```rust
/// use arrow_sql_middleware::prelude::*;
///
/// let opts: ConnectionOptions =
///     serde_json::from_str(r#"{ "uri": "sqlite://app.db", "persistent": false }"#).unwrap();
/// assert!(!opts.persistent);
/// assert_eq!(opts.default_schema, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    pub uri: String,
    /// Keep one backend handle open across batches instead of one per batch.
    #[serde(default = "default_persistent")]
    pub persistent: bool,
    /// Schema applied to bulk inserts that name none.
    #[serde(default)]
    pub default_schema: Option<String>,
}

impl ConnectionOptions {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            persistent: true,
            default_schema: None,
        }
    }

    #[must_use]
    pub fn with_persistence(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    #[must_use]
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }
}

/// Fluent builder for connection options.
#[derive(Debug, Clone)]
pub struct ConnectionOptionsBuilder {
    opts: ConnectionOptions,
}

impl ConnectionOptionsBuilder {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            opts: ConnectionOptions::new(uri),
        }
    }

    #[must_use]
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.opts.persistent = persistent;
        self
    }

    #[must_use]
    pub fn default_schema(mut self, schema: impl Into<String>) -> Self {
        self.opts.default_schema = Some(schema.into());
        self
    }

    #[must_use]
    pub fn finish(self) -> ConnectionOptions {
        self.opts
    }

    /// Open a connection with the bundled drivers.
    ///
    /// # Errors
    /// Same as [`Connection::open_with`].
    pub async fn build(self) -> Result<Connection, ArrowSqlError> {
        Connection::open_with(self.finish(), &DriverRegistry::with_default_drivers()).await
    }
}

/// Operations submitted to [`Connection::execute`].
#[derive(Debug, Clone, Copy)]
pub enum Batch<'a> {
    /// Exactly one operation of any kind.
    Single(&'a Operation),
    /// Several operations, all of them state-modifying.
    Many(&'a [Operation]),
}

impl Batch<'_> {
    fn operations(&self) -> &[Operation] {
        match self {
            Batch::Single(op) => std::slice::from_ref(*op),
            Batch::Many(ops) => ops,
        }
    }
}

impl<'a> From<&'a Operation> for Batch<'a> {
    fn from(op: &'a Operation) -> Self {
        Batch::Single(op)
    }
}

impl<'a> From<&'a [Operation]> for Batch<'a> {
    fn from(ops: &'a [Operation]) -> Self {
        Batch::Many(ops)
    }
}

impl<'a> From<&'a Vec<Operation>> for Batch<'a> {
    fn from(ops: &'a Vec<Operation>) -> Self {
        Batch::Many(ops.as_slice())
    }
}

/// Results of a batch, shaped like the batch that produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResult {
    Single(Option<RecordBatch>),
    /// One entry per operation, in input order.
    Many(Vec<Option<RecordBatch>>),
}

impl BatchResult {
    /// Flatten into one entry per operation.
    #[must_use]
    pub fn into_vec(self) -> Vec<Option<RecordBatch>> {
        match self {
            BatchResult::Single(result) => vec![result],
            BatchResult::Many(results) => results,
        }
    }
}

/// Reject batches the transaction protocol cannot run. Never touches the backend.
fn validate_batch(ops: &[Operation]) -> Result<(), ArrowSqlError> {
    if ops.is_empty() {
        return Err(ArrowSqlError::ArgumentError(
            "a batch needs at least one operation".into(),
        ));
    }
    if ops.len() > 1
        && let Some(read) = ops.iter().find(|op| !op.is_state_modifying())
    {
        return Err(ArrowSqlError::ArgumentError(format!(
            "a batch of several operations may only modify state; found a {} operation",
            read.kind()
        )));
    }
    Ok(())
}

/// Run `ops` in order on one cursor, stopping at the first failure. The cursor is closed
/// before returning either way.
async fn run_operations(
    handle: &mut dyn BackendHandle,
    dialect: Dialect,
    ops: &[Cow<'_, Operation>],
) -> Result<Vec<Option<RecordBatch>>, ArrowSqlError> {
    let mut cursor = handle.cursor().await?;
    let mut results = Vec::with_capacity(ops.len());
    let mut failure = None;
    for op in ops {
        match execute_operation(op, dialect, cursor.as_mut()).await {
            Ok(result) => results.push(result),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    let closed = cursor.close().await;
    match (failure, closed) {
        (Some(e), Err(close_err)) => {
            error!(error = %close_err, "failed to close cursor after a failed operation");
            Err(e)
        }
        (Some(e), Ok(())) => Err(e),
        (None, Err(close_err)) => Err(close_err),
        (None, Ok(())) => Ok(results),
    }
}

/// Run `ops` as one transaction on `handle`: commit if every operation succeeds,
/// otherwise roll back and return the first error.
async fn run_transaction(
    handle: &mut dyn BackendHandle,
    dialect: Dialect,
    ops: &[Cow<'_, Operation>],
) -> Result<Vec<Option<RecordBatch>>, ArrowSqlError> {
    match run_operations(handle, dialect, ops).await {
        Ok(results) => match handle.commit().await {
            Ok(()) => Ok(results),
            Err(commit_err) => {
                rollback_logged(handle).await;
                Err(commit_err)
            }
        },
        Err(e) => {
            debug!(error = %e, "rolling back batch");
            rollback_logged(handle).await;
            Err(e)
        }
    }
}

async fn rollback_logged(handle: &mut dyn BackendHandle) {
    if let Err(rollback_err) = handle.rollback().await {
        error!(error = %rollback_err, "rollback failed");
    }
}

async fn close_logged(handle: Box<dyn BackendHandle>) {
    if let Err(e) = handle.close().await {
        error!(error = %e, "failed to close backend handle");
    }
}

/// A connection to one backend, tagged with its dialect.
///
/// A persistent connection keeps a single backend handle for its whole life; an ephemeral
/// one opens a fresh handle for every [`Connection::execute`] call and closes it afterwards.
/// Either way each call is one transaction.
pub struct Connection {
    uri: ConnectionUri,
    driver: DriverRef,
    handle: Option<Box<dyn BackendHandle>>,
    persistent: bool,
    default_schema: Option<String>,
}

impl Connection {
    /// Open a connection using the drivers bundled with this build.
    ///
    /// # Errors
    /// Returns `ArrowSqlError::DriverUnavailableError` if no driver serves the URI's scheme,
    /// or the backend's error if a persistent handle cannot be opened.
    pub async fn open(uri: &str, persistent: bool) -> Result<Self, ArrowSqlError> {
        let options = ConnectionOptions::new(uri).with_persistence(persistent);
        Self::open_with(options, &DriverRegistry::with_default_drivers()).await
    }

    /// Open a connection resolving the driver from `registry`.
    ///
    /// # Errors
    /// Returns `ArrowSqlError::DriverUnavailableError` if `registry` has no driver for the
    /// URI's dialect, `ArrowSqlError::MissingSchemaError` if the default schema does not
    /// exist, or the backend's error if connecting fails.
    pub async fn open_with(
        options: ConnectionOptions,
        registry: &DriverRegistry,
    ) -> Result<Self, ArrowSqlError> {
        let uri = ConnectionUri::parse(&options.uri)?;
        let dialect = uri.dialect();
        let driver = registry.driver_for(dialect)?;

        let handle = if options.persistent {
            Some(driver.connect(&uri).await?)
        } else {
            None
        };
        debug!(uri = %uri, dialect = dialect.name(), persistent = options.persistent, "opened connection");

        let mut connection = Self {
            uri,
            driver,
            handle,
            persistent: options.persistent,
            default_schema: None,
        };
        if let Some(schema) = options.default_schema {
            connection.set_default_schema(schema).await?;
        }
        Ok(connection)
    }

    async fn set_default_schema(&mut self, schema: String) -> Result<(), ArrowSqlError> {
        let dialect = self.dialect();
        if !dialect.supports_schemas() {
            warn!(
                dialect = dialect.name(),
                schema = %schema,
                "default schema ignored: dialect has no named schemas"
            );
            return Ok(());
        }

        let exists = match self.handle.as_mut() {
            Some(handle) => handle.schema_exists(&schema).await?,
            None => {
                let mut handle = self.driver.connect(&self.uri).await?;
                let exists = handle.schema_exists(&schema).await;
                close_logged(handle).await;
                exists?
            }
        };
        if !exists {
            return Err(ArrowSqlError::MissingSchemaError(schema));
        }
        self.default_schema = Some(schema);
        Ok(())
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.uri.dialect()
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// The connection URI, password masked as `***` unless `reveal_credentials` is set.
    #[must_use]
    pub fn uri(&self, reveal_credentials: bool) -> String {
        self.uri.display(reveal_credentials)
    }

    #[must_use]
    pub fn default_schema(&self) -> Option<&str> {
        self.default_schema.as_deref()
    }

    /// Execute `batch` in a single transaction.
    ///
    /// Operations run in order; the first failure stops the batch, rolls back everything
    /// it did, and is returned as `ArrowSqlError::OperationError`.
    ///
    /// # Errors
    /// Returns `ArrowSqlError::ArgumentError` for an empty batch, a multi-operation batch
    /// containing a read, or an operation the dialect cannot express (all before any
    /// backend call); `ArrowSqlError::OperationError` for a failed operation; or the
    /// backend's error if the handle, cursor, or commit fails.
    pub async fn execute(&mut self, batch: Batch<'_>) -> Result<BatchResult, ArrowSqlError> {
        let ops = batch.operations();
        validate_batch(ops)?;
        let dialect = self.dialect();
        let normalized = ops
            .iter()
            .map(|op| normalize(dialect, op, self.default_schema.as_deref()))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(operations = normalized.len(), dialect = dialect.name(), "executing batch");
        let mut results = if self.persistent {
            let handle = self.persistent_handle()?;
            run_transaction(handle, dialect, &normalized).await?
        } else {
            let mut handle = self.driver.connect(&self.uri).await?;
            let outcome = run_transaction(handle.as_mut(), dialect, &normalized).await;
            close_logged(handle).await;
            outcome?
        };

        Ok(match batch {
            Batch::Single(_) => BatchResult::Single(results.pop().flatten()),
            Batch::Many(_) => BatchResult::Many(results),
        })
    }

    /// Execute one operation; returns the table a read produces.
    ///
    /// # Errors
    /// See [`Connection::execute`].
    pub async fn execute_one(
        &mut self,
        op: &Operation,
    ) -> Result<Option<RecordBatch>, ArrowSqlError> {
        match self.execute(Batch::Single(op)).await? {
            BatchResult::Single(result) => Ok(result),
            BatchResult::Many(mut results) => Ok(results.pop().flatten()),
        }
    }

    /// Execute several state-modifying operations as one transaction.
    ///
    /// # Errors
    /// See [`Connection::execute`].
    pub async fn execute_many(
        &mut self,
        ops: &[Operation],
    ) -> Result<Vec<Option<RecordBatch>>, ArrowSqlError> {
        Ok(self.execute(Batch::Many(ops)).await?.into_vec())
    }

    fn persistent_handle(&mut self) -> Result<&mut dyn BackendHandle, ArrowSqlError> {
        match self.handle.as_mut() {
            Some(handle) => Ok(handle.as_mut()),
            None => Err(ArrowSqlError::ConnectionError(
                "persistent backend handle is closed".into(),
            )),
        }
    }

    /// Close the backend handle of a persistent connection.
    ///
    /// # Errors
    /// Returns the backend's error if closing fails.
    pub async fn close(mut self) -> Result<(), ArrowSqlError> {
        match self.handle.take() {
            Some(handle) => {
                handle.close().await?;
                debug!(uri = %self.uri, "closed connection");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take()
            && let Ok(runtime) = tokio::runtime::Handle::try_current()
        {
            runtime.spawn(close_logged(handle));
        }
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.uri(false))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("uri", &self.uri(false))
            .field("dialect", &self.dialect())
            .field("persistent", &self.persistent)
            .field("default_schema", &self.default_schema)
            .finish_non_exhaustive()
    }
}
