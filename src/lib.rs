//! Dialect-agnostic transactional execution over SQL backends, with Arrow
//! `RecordBatch`es as the data format.
//!
//! A [`Connection`] runs batches of [`Operation`]s (reads, bulk inserts, parameterized
//! updates/deletes) in one all-or-nothing transaction. Queries are written once with
//! ordinal `$N` placeholders; the dialect adapter rewrites them, and reorders payload
//! columns, for backends that bind positionally.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use arrow::array::{Int64Array, StringArray};
//! use arrow::datatypes::{DataType, Field, Schema};
//! use arrow::record_batch::RecordBatch;
//! use arrow_sql_middleware::prelude::*;
//!
//! # async fn demo() -> Result<(), ArrowSqlError> {
//! let mut conn = Connection::open("sqlite:///tmp/orders.db", true).await?;
//! let orders = RecordBatch::try_new(
//!     Arc::new(Schema::new(vec![
//!         Field::new("id", DataType::Int64, false),
//!         Field::new("status", DataType::Utf8, false),
//!     ])),
//!     vec![
//!         Arc::new(Int64Array::from(vec![1, 2])),
//!         Arc::new(StringArray::from(vec!["open", "open"])),
//!     ],
//! )?;
//! let insert = BulkInsert::new("orders", orders)?.with_mode(IngestMode::CreateAppend);
//! conn.execute_one(&insert.into()).await?;
//!
//! let table = conn
//!     .execute_one(&Read::new("SELECT * FROM orders")?.into())
//!     .await?;
//! assert_eq!(table.map(|t| t.num_rows()), Some(2));
//! conn.close().await?;
//! # Ok(()) }
//! ```

pub mod connection;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod operation;
pub mod prelude;
pub mod query_utils;
pub mod table;
pub mod translation;
pub mod types;
pub mod uri;

pub use connection::{Batch, BatchResult, Connection, ConnectionOptions, ConnectionOptionsBuilder};
pub use error::ArrowSqlError;
pub use operation::{BulkInsert, Operation, Read, SimpleDelete, SimpleUpdate, UpdateDelete};
pub use types::{CellValue, Dialect, IngestMode};
