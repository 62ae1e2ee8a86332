//! SQLite source reader implementation.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use crate::core::{Row, RowStream, SourceReader, SqlValue};
use crate::error::Result;

/// SQLite source reader.
pub struct SqliteReader {
    pool: SqlitePool,
    prefix: String,
}

impl SqliteReader {
    /// Create a reader over an open pool.
    pub fn new(pool: SqlitePool, prefix: &str) -> Self {
        Self {
            pool,
            prefix: prefix.to_string(),
        }
    }
}

#[async_trait]
impl SourceReader for SqliteReader {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        table_columns(&self.pool, table).await
    }

    async fn character_set(&self, _table: &str) -> Result<Option<String>> {
        // SQLite text is always stored in the database encoding.
        Ok(None)
    }

    fn stream_rows<'a>(&'a self, sql: &'a str) -> RowStream<'a> {
        let mut columns: Option<Arc<[String]>> = None;
        sqlx::query(sql)
            .fetch(&self.pool)
            .map(move |result: std::result::Result<SqliteRow, sqlx::Error>| -> Result<Row> {
                let row = result?;
                let names = columns
                    .get_or_insert_with(|| {
                        row.columns().iter().map(|c| c.name().to_string()).collect()
                    })
                    .clone();
                let values = (0..row.len()).map(|i| decode_value(&row, i)).collect();
                Ok(Row::new(names, values))
            })
            .boxed()
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }
}

/// Column names of a table, `None` when it does not exist.
pub(super) async fn table_columns(pool: &SqlitePool, table: &str) -> Result<Option<Vec<String>>> {
    let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?1)")
        .bind(table)
        .fetch_all(pool)
        .await?;
    Ok((!columns.is_empty()).then_some(columns))
}

/// Decode one column by the storage class of its value.
fn decode_value(row: &SqliteRow, idx: usize) -> SqlValue {
    let storage = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return SqlValue::Null,
        Ok(raw) => raw.type_info().name().to_ascii_uppercase(),
        Err(_) => return SqlValue::Null,
    };

    let decoded = match storage.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => row
            .try_get_unchecked::<i64, _>(idx)
            .ok()
            .map(SqlValue::I64),
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => row
            .try_get_unchecked::<f64, _>(idx)
            .ok()
            .map(SqlValue::F64),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(idx)
            .ok()
            .map(SqlValue::Bytes),
        _ => None,
    };

    decoded
        .or_else(|| row.try_get_unchecked::<String, _>(idx).ok().map(SqlValue::Text))
        .unwrap_or(SqlValue::Null)
}
