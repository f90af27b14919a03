//! `SQLite` adapter over rusqlite.
//!
//! Every rusqlite call runs on the blocking pool through [`run_blocking`], holding the
//! connection's mutex for the duration of the call. Handles open their own database
//! connection, so an ephemeral `:memory:` connection starts empty on every batch.

use std::sync::Arc;

use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::{BackendHandle, Cursor, Driver, plan_ingest};
use crate::error::ArrowSqlError;
use crate::query_utils::extract_column_names;
use crate::table::{ColumnSpec, build_record_batch, rows};
use crate::types::{CellValue, Dialect, IngestMode};
use crate::uri::ConnectionUri;

type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R, ArrowSqlError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, ArrowSqlError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| ArrowSqlError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}

/// Convert a `CellValue` to a rusqlite `Value`.
///
/// `SQLite` has no boolean, date, or timestamp storage class: booleans bind as 0/1 and
/// temporal values as ISO-8601 text.
#[must_use]
pub fn cell_to_sqlite_value(value: &CellValue) -> Value {
    match value {
        CellValue::Int(i) => Value::Integer(*i),
        CellValue::Float(f) => Value::Real(*f),
        CellValue::Text(s) => Value::Text(s.clone()),
        CellValue::Bool(b) => Value::Integer(i64::from(*b)),
        CellValue::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        CellValue::Date(d) => Value::Text(d.format("%F").to_string()),
        CellValue::Blob(bytes) => Value::Blob(bytes.clone()),
        CellValue::Null => Value::Null,
    }
}

fn sqlite_extract_value(row: &rusqlite::Row, idx: usize) -> Result<CellValue, ArrowSqlError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => CellValue::Null,
        Value::Integer(i) => CellValue::Int(i),
        Value::Real(f) => CellValue::Float(f),
        Value::Text(s) => CellValue::Text(s),
        Value::Blob(b) => CellValue::Blob(b),
    })
}

/// How the values of a result column are read back, going by its declared type.
///
/// `SQLite` stores booleans as integers and temporal values as text; the column's
/// declaration is the only record of what they were.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclaredType {
    Boolean,
    Date,
    Timestamp,
    Stored,
}

impl DeclaredType {
    fn from_decl(decl: Option<&str>) -> Self {
        let Some(decl) = decl else {
            return DeclaredType::Stored;
        };
        let decl = decl.trim().to_ascii_uppercase();
        if decl.starts_with("BOOL") {
            DeclaredType::Boolean
        } else if decl.starts_with("DATETIME") || decl.starts_with("TIMESTAMP") {
            DeclaredType::Timestamp
        } else if decl == "DATE" {
            DeclaredType::Date
        } else {
            DeclaredType::Stored
        }
    }

    fn type_hint(self) -> Option<DataType> {
        match self {
            DeclaredType::Boolean => Some(DataType::Boolean),
            DeclaredType::Date => Some(DataType::Date32),
            DeclaredType::Timestamp => Some(DataType::Timestamp(TimeUnit::Microsecond, None)),
            DeclaredType::Stored => None,
        }
    }

    /// Values that do not parse as the declared type are kept as stored.
    fn decode(self, value: CellValue) -> CellValue {
        match (self, value) {
            (DeclaredType::Boolean, CellValue::Int(i)) => CellValue::Bool(i != 0),
            (DeclaredType::Date, CellValue::Text(text)) => {
                match NaiveDate::parse_from_str(&text, "%F") {
                    Ok(day) => CellValue::Date(day),
                    Err(_) => CellValue::Text(text),
                }
            }
            (DeclaredType::Timestamp, CellValue::Text(text)) => {
                match NaiveDateTime::parse_from_str(&text, "%F %T%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(&text, "%FT%T%.f"))
                {
                    Ok(ts) => CellValue::Timestamp(ts),
                    Err(_) => CellValue::Text(text),
                }
            }
            (_, value) => value,
        }
    }
}

fn sqlite_params(data: &RecordBatch) -> Result<Vec<Vec<Value>>, ArrowSqlError> {
    Ok(rows(data)?
        .iter()
        .map(|row| row.iter().map(cell_to_sqlite_value).collect())
        .collect())
}

/// Execute `sql`, collecting its result set if it produces one.
fn run_statement(
    conn: &mut rusqlite::Connection,
    sql: &str,
) -> Result<Option<RecordBatch>, ArrowSqlError> {
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() == 0 {
        drop(stmt);
        conn.execute_batch(sql)?;
        return Ok(None);
    }

    let declared: Vec<DeclaredType> = stmt
        .columns()
        .iter()
        .map(|column| DeclaredType::from_decl(column.decl_type()))
        .collect();
    let columns: Vec<ColumnSpec> = extract_column_names(stmt.column_names(), |name| *name)
        .into_iter()
        .zip(&declared)
        .map(|(name, decl)| ColumnSpec::new(name).with_type_hint(decl.type_hint()))
        .collect();
    let mut result_rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let values = declared
            .iter()
            .enumerate()
            .map(|(idx, decl)| sqlite_extract_value(row, idx).map(|value| decl.decode(value)))
            .collect::<Result<Vec<_>, _>>()?;
        result_rows.push(values);
    }
    build_record_batch(&columns, &result_rows).map(Some)
}

/// Run one prepared statement per parameter row.
fn run_per_row(
    conn: &mut rusqlite::Connection,
    sql: &str,
    params: &[Vec<Value>],
) -> Result<(), ArrowSqlError> {
    let mut stmt = conn.prepare_cached(sql)?;
    for row in params {
        stmt.execute(rusqlite::params_from_iter(row.iter()))?;
    }
    Ok(())
}

/// Driver for `sqlite://`, `file:`, bare-path, and `:memory:` URIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

#[async_trait]
impl Driver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn connect(&self, uri: &ConnectionUri) -> Result<Box<dyn BackendHandle>, ArrowSqlError> {
        let path = uri
            .sqlite_path()
            .ok_or_else(|| {
                ArrowSqlError::ConnectionError(format!(
                    "URI '{}' does not name a SQLite database",
                    uri.display(false)
                ))
            })?
            .to_string();
        let label = path.clone();
        let conn = tokio::task::spawn_blocking(move || rusqlite::Connection::open(path))
            .await
            .map_err(|e| {
                ArrowSqlError::ConnectionError(format!("sqlite spawn_blocking join error: {e}"))
            })??;
        debug!(database = %label, "opened sqlite handle");
        Ok(Box::new(SqliteHandle {
            conn: Arc::new(Mutex::new(conn)),
            in_transaction: false,
        }))
    }
}

/// An open `SQLite` database with an explicit `BEGIN`..`COMMIT` transaction.
pub struct SqliteHandle {
    conn: SharedSqliteConnection,
    in_transaction: bool,
}

impl SqliteHandle {
    fn conn_handle(&self) -> SharedSqliteConnection {
        Arc::clone(&self.conn)
    }
}

impl std::fmt::Debug for SqliteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHandle")
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BackendHandle for SqliteHandle {
    async fn cursor<'a>(&'a mut self) -> Result<Box<dyn Cursor + 'a>, ArrowSqlError> {
        if !self.in_transaction {
            run_blocking(self.conn_handle(), |guard| {
                guard.execute_batch("BEGIN").map_err(ArrowSqlError::from)
            })
            .await?;
            self.in_transaction = true;
        }
        Ok(Box::new(SqliteCursor {
            conn: self.conn_handle(),
            pending: None,
        }))
    }

    async fn commit(&mut self) -> Result<(), ArrowSqlError> {
        if !self.in_transaction {
            return Ok(());
        }
        run_blocking(self.conn_handle(), |guard| {
            guard.execute_batch("COMMIT").map_err(ArrowSqlError::from)
        })
        .await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ArrowSqlError> {
        if !self.in_transaction {
            return Ok(());
        }
        // Some failures make SQLite abandon the transaction on its own.
        let result = run_blocking(self.conn_handle(), |guard| {
            if guard.is_autocommit() {
                Ok(())
            } else {
                guard.execute_batch("ROLLBACK").map_err(ArrowSqlError::from)
            }
        })
        .await;
        self.in_transaction = false;
        result
    }

    async fn schema_exists(&mut self, schema: &str) -> Result<bool, ArrowSqlError> {
        let wanted = schema.to_string();
        run_blocking(self.conn_handle(), move |guard| {
            let mut stmt = guard.prepare("PRAGMA database_list")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names.iter().any(|name| name == &wanted))
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<(), ArrowSqlError> {
        let SqliteHandle { conn, .. } = *self;
        let Ok(mutex) = Arc::try_unwrap(conn) else {
            // A cursor still holds the connection; it closes when the last clone drops.
            return Ok(());
        };
        let conn = mutex.into_inner();
        tokio::task::spawn_blocking(move || conn.close().map_err(|(_, e)| ArrowSqlError::from(e)))
            .await
            .map_err(|e| {
                ArrowSqlError::ConnectionError(format!("sqlite spawn_blocking join error: {e}"))
            })??;
        debug!("closed sqlite handle");
        Ok(())
    }
}

/// Cursor over a [`SqliteHandle`]'s open transaction.
pub struct SqliteCursor {
    conn: SharedSqliteConnection,
    pending: Option<RecordBatch>,
}

#[async_trait]
impl Cursor for SqliteCursor {
    async fn execute(&mut self, query: &str) -> Result<(), ArrowSqlError> {
        let sql = query.to_string();
        self.pending = run_blocking(Arc::clone(&self.conn), move |guard| {
            run_statement(guard, &sql)
        })
        .await?;
        Ok(())
    }

    async fn fetch_table(&mut self) -> Result<RecordBatch, ArrowSqlError> {
        self.pending.take().ok_or_else(|| {
            ArrowSqlError::ExecutionError("statement did not produce a result set".into())
        })
    }

    async fn bulk_ingest(
        &mut self,
        table_name: &str,
        data: &RecordBatch,
        schema: Option<&str>,
        mode: IngestMode,
    ) -> Result<(), ArrowSqlError> {
        let plan = plan_ingest(Dialect::Sqlite, table_name, schema, &data.schema(), mode)?;
        let params = sqlite_params(data)?;
        debug!(table = table_name, rows = params.len(), mode = mode.as_str(), "sqlite ingest");
        run_blocking(Arc::clone(&self.conn), move |guard| {
            for statement in &plan.setup {
                guard.execute_batch(statement)?;
            }
            run_per_row(guard, &plan.insert, &params)
        })
        .await
    }

    async fn execute_batched(
        &mut self,
        query: &str,
        data: &RecordBatch,
    ) -> Result<(), ArrowSqlError> {
        let sql = query.to_string();
        let params = sqlite_params(data)?;
        run_blocking(Arc::clone(&self.conn), move |guard| {
            run_per_row(guard, &sql, &params)
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<(), ArrowSqlError> {
        Ok(())
    }
}
