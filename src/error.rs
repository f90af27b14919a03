use thiserror::Error;

use arrow::error::ArrowError;

#[derive(Debug, Error)]
pub enum ArrowSqlError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    ArrowError(#[from] ArrowError),

    #[error(transparent)]
    UriError(#[from] url::ParseError),

    /// No backend driver is registered for the URI's dialect.
    #[error("Driver unavailable: {0}")]
    DriverUnavailableError(String),

    /// Invalid batch composition or invalid operation arguments. Raised before any
    /// backend interaction.
    #[error("Invalid argument: {0}")]
    ArgumentError(String),

    /// A backend call failed while executing one operation of a batch. The transaction
    /// has already been rolled back when this reaches the caller.
    #[error("{context}: {source}")]
    OperationError {
        context: String,
        #[source]
        source: Box<ArrowSqlError>,
    },

    #[error("Database schema '{0}' does not exist")]
    MissingSchemaError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),
}

impl ArrowSqlError {
    /// Wrap a backend failure with the context of the operation that caused it.
    #[must_use]
    pub fn operation(context: impl Into<String>, source: ArrowSqlError) -> Self {
        ArrowSqlError::OperationError {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// The operation context, if this error came out of a failed operation.
    #[must_use]
    pub fn operation_context(&self) -> Option<&str> {
        match self {
            ArrowSqlError::OperationError { context, .. } => Some(context),
            _ => None,
        }
    }
}
