//! SQLite target writer implementation.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool};
use sqlx::Connection;
use tokio::sync::Mutex;
use tracing::debug;

use super::dialect::SqliteDialect;
use crate::core::{Dialect, SqlValue, TableStructure, TargetWriter, DATETIME_FORMAT};
use crate::error::{PorterError, Result};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite target writer. Batch inserts run on one held session connection.
pub struct SqliteWriter {
    pool: SqlitePool,
    session: Mutex<Option<PoolConnection<Sqlite>>>,
    dialect: SqliteDialect,
}

impl SqliteWriter {
    /// Create a writer over an open pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            session: Mutex::new(None),
            dialect: SqliteDialect::new(),
        }
    }
}

#[async_trait]
impl TargetWriter for SqliteWriter {
    async fn drop_table(&self, table: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.dialect.quote_ident(table));
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| PorterError::write_failure(table, e))?;
        debug!("SQLite: dropped {}", table);
        Ok(())
    }

    async fn create_table(&self, table: &str, structure: &TableStructure) -> Result<()> {
        let sql = self.dialect.create_table_sql(table, structure);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| PorterError::write_failure(table, e))?;
        debug!("SQLite: created {} ({} columns)", table, structure.len());
        Ok(())
    }

    async fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        super::reader::table_columns(&self.pool, table).await
    }

    async fn write_batch(
        &self,
        table: &str,
        cols: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        if rows.is_empty() || cols.is_empty() {
            return Ok(0);
        }

        let row_count = rows.len() as u64;
        let per_statement = self.dialect.rows_per_statement(cols.len());

        let mut guard = self.session.lock().await;
        let conn = match guard.take() {
            Some(conn) => guard.insert(conn),
            None => guard.insert(
                self.pool
                    .acquire()
                    .await
                    .map_err(|e| PorterError::pool(e, "acquiring SQLite session"))?,
            ),
        };

        let mut remaining = rows.into_iter();
        loop {
            let chunk: Vec<Vec<SqlValue>> = remaining.by_ref().take(per_statement).collect();
            if chunk.is_empty() {
                break;
            }
            let sql = self.dialect.insert_sql(table, cols, chunk.len());
            let mut query = sqlx::query(&sql);
            for value in chunk.into_iter().flatten() {
                query = bind_value(query, value);
            }
            query
                .execute(&mut **conn)
                .await
                .map_err(|e| PorterError::write_failure(table, format!("INSERT batch: {}", e)))?;
        }

        debug!("SQLite: wrote {} rows to {}", row_count, table);
        Ok(row_count)
    }

    async fn reset(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        if let Some(old) = guard.take() {
            old.detach().close().await?;
        }
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| PorterError::pool(e, "acquiring SQLite session"))?;
        *guard = Some(conn);
        debug!("SQLite: write session reset");
        Ok(())
    }

    async fn set_character_set(&self, charset: &str) -> Result<()> {
        debug!("SQLite: ignoring character set {}", charset);
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }
}

/// Bind one value. Temporal and decimal values are stored as text.
fn bind_value(query: SqliteQuery<'_>, value: SqlValue) -> SqliteQuery<'_> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(b) => query.bind(b),
        SqlValue::I64(i) => query.bind(i),
        SqlValue::F64(f) => query.bind(f),
        SqlValue::Decimal(d) => query.bind(d.to_string()),
        SqlValue::Text(s) => query.bind(s),
        SqlValue::Bytes(b) => query.bind(b),
        SqlValue::DateTime(dt) => query.bind(dt.format(DATETIME_FORMAT).to_string()),
        SqlValue::Date(d) => query.bind(d.format("%Y-%m-%d").to_string()),
        SqlValue::Time(t) => query.bind(t.format("%H:%M:%S").to_string()),
    }
}
