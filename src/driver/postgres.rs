//! `PostgreSQL` adapter over tokio-postgres.

use std::error::Error;

use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_postgres::{Client, NoTls};
use tokio_util::bytes;
use tracing::{debug, error};

use super::{BackendHandle, Cursor, Driver, plan_ingest};
use crate::error::ArrowSqlError;
use crate::query_utils::extract_column_names;
use crate::table::{ColumnSpec, build_record_batch, rows};
use crate::types::{CellValue, Dialect, IngestMode};
use crate::uri::ConnectionUri;

impl ToSql for CellValue {
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        // tokio-postgres only binds a Rust type to its exact column type, so narrow or
        // widen to whatever the server inferred for the placeholder.
        match self {
            CellValue::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                _ => (*i).to_sql(ty, out),
            },
            CellValue::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => (*f).to_sql(ty, out),
            },
            CellValue::Text(s) => s.to_sql(ty, out),
            CellValue::Bool(b) => (*b).to_sql(ty, out),
            CellValue::Timestamp(dt) => match *ty {
                Type::TIMESTAMPTZ => dt.and_utc().to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
            CellValue::Date(d) => d.to_sql(ty, out),
            CellValue::Blob(bytes) => bytes.to_sql(ty, out),
            CellValue::Null => Ok(IsNull::Yes),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::BYTEA
        )
    }

    to_sql_checked!();
}

/// Arrow type used for a result column when every value in it is NULL.
fn type_hint(ty: &Type) -> DataType {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 => DataType::Int64,
        Type::FLOAT4 | Type::FLOAT8 => DataType::Float64,
        Type::BOOL => DataType::Boolean,
        Type::TIMESTAMP | Type::TIMESTAMPTZ => DataType::Timestamp(TimeUnit::Microsecond, None),
        Type::DATE => DataType::Date32,
        Type::BYTEA => DataType::Binary,
        _ => DataType::Utf8,
    }
}

/// Extract a `CellValue` from a tokio-postgres row at `idx`.
///
/// # Errors
/// Returns `ArrowSqlError::PostgresError` if the column cannot be read as its declared type.
pub fn postgres_extract_value(
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<CellValue, ArrowSqlError> {
    let type_info = row.columns()[idx].type_();
    let value = match *type_info {
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| CellValue::Int(i64::from(v))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| CellValue::Int(i64::from(v))),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(CellValue::Int),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| CellValue::Float(f64::from(v))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(CellValue::Float),
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(CellValue::Bool),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(CellValue::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| CellValue::Timestamp(v.naive_utc())),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.map(CellValue::Date),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(CellValue::Blob),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(|v| CellValue::Text(v.to_string())),
        // For other types, attempt to get as string
        _ => row.try_get::<_, Option<String>>(idx)?.map(CellValue::Text),
    };
    Ok(value.unwrap_or(CellValue::Null))
}

fn parameter_refs(row: &[CellValue]) -> Vec<&(dyn ToSql + Sync)> {
    row.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

/// Run one prepared statement per payload row.
async fn execute_per_row(
    client: &Client,
    sql: &str,
    data: &RecordBatch,
) -> Result<(), ArrowSqlError> {
    let stmt = client.prepare(sql).await?;
    for row in rows(data)? {
        client.execute(&stmt, &parameter_refs(&row)).await?;
    }
    Ok(())
}

/// Driver for `postgres://` and `postgresql://` URIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

#[async_trait]
impl Driver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn connect(&self, uri: &ConnectionUri) -> Result<Box<dyn BackendHandle>, ArrowSqlError> {
        let (client, connection) = tokio_postgres::connect(uri.as_str(), NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection terminated");
            }
        });
        debug!(uri = %uri, "opened postgres handle");
        Ok(Box::new(PostgresHandle {
            client,
            in_transaction: false,
        }))
    }
}

/// An open `PostgreSQL` session with an explicit `BEGIN`..`COMMIT` transaction.
pub struct PostgresHandle {
    client: Client,
    in_transaction: bool,
}

impl std::fmt::Debug for PostgresHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresHandle")
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BackendHandle for PostgresHandle {
    async fn cursor<'a>(&'a mut self) -> Result<Box<dyn Cursor + 'a>, ArrowSqlError> {
        if !self.in_transaction {
            self.client.batch_execute("BEGIN").await?;
            self.in_transaction = true;
        }
        Ok(Box::new(PostgresCursor {
            client: &self.client,
            pending: None,
        }))
    }

    async fn commit(&mut self) -> Result<(), ArrowSqlError> {
        if !self.in_transaction {
            return Ok(());
        }
        self.client.batch_execute("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ArrowSqlError> {
        if !self.in_transaction {
            return Ok(());
        }
        let result = self.client.batch_execute("ROLLBACK").await;
        self.in_transaction = false;
        result.map_err(ArrowSqlError::from)
    }

    async fn schema_exists(&mut self, schema: &str) -> Result<bool, ArrowSqlError> {
        let row = self
            .client
            .query_opt(
                "SELECT 1 FROM information_schema.schemata WHERE schema_name = $1",
                &[&schema],
            )
            .await?;
        Ok(row.is_some())
    }

    async fn close(self: Box<Self>) -> Result<(), ArrowSqlError> {
        // Dropping the client ends the connection task; the server discards any open
        // transaction.
        drop(self);
        debug!("closed postgres handle");
        Ok(())
    }
}

/// Cursor over a [`PostgresHandle`]'s open transaction.
pub struct PostgresCursor<'a> {
    client: &'a Client,
    pending: Option<RecordBatch>,
}

#[async_trait]
impl Cursor for PostgresCursor<'_> {
    async fn execute(&mut self, query: &str) -> Result<(), ArrowSqlError> {
        let stmt = self.client.prepare(query).await?;
        if stmt.columns().is_empty() {
            self.client.execute(&stmt, &[]).await?;
            self.pending = None;
            return Ok(());
        }

        let names = extract_column_names(stmt.columns().iter(), |col| col.name());
        let columns: Vec<ColumnSpec> = names
            .into_iter()
            .zip(stmt.columns())
            .map(|(name, col)| ColumnSpec::new(name).with_type_hint(Some(type_hint(col.type_()))))
            .collect();
        let result_rows = self
            .client
            .query(&stmt, &[])
            .await?
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|idx| postgres_extract_value(row, idx))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.pending = Some(build_record_batch(&columns, &result_rows)?);
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
        let plan = plan_ingest(Dialect::Postgres, table_name, schema, &data.schema(), mode)?;
        debug!(table = table_name, rows = data.num_rows(), mode = mode.as_str(), "postgres ingest");
        for statement in &plan.setup {
            self.client.batch_execute(statement).await?;
        }
        execute_per_row(self.client, &plan.insert, data).await
    }

    async fn execute_batched(
        &mut self,
        query: &str,
        data: &RecordBatch,
    ) -> Result<(), ArrowSqlError> {
        execute_per_row(self.client, query, data).await
    }

    async fn close(self: Box<Self>) -> Result<(), ArrowSqlError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_values_accept_common_column_types() {
        assert!(<CellValue as ToSql>::accepts(&Type::INT4));
        assert!(<CellValue as ToSql>::accepts(&Type::TIMESTAMPTZ));
        assert!(!<CellValue as ToSql>::accepts(&Type::POINT));
    }

    #[test]
    fn integers_narrow_to_the_column_type() {
        let mut out = bytes::BytesMut::new();
        CellValue::Int(7).to_sql(&Type::INT2, &mut out).unwrap();
        assert_eq!(&out[..], &7_i16.to_be_bytes());

        let mut out = bytes::BytesMut::new();
        assert!(CellValue::Int(i64::MAX).to_sql(&Type::INT4, &mut out).is_err());
    }

    #[test]
    fn all_null_columns_keep_their_type() {
        assert_eq!(type_hint(&Type::INT4), DataType::Int64);
        assert_eq!(type_hint(&Type::DATE), DataType::Date32);
        assert_eq!(type_hint(&Type::NUMERIC), DataType::Utf8);
    }
}
