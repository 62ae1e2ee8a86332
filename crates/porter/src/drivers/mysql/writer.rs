//! MySQL/MariaDB target writer implementation.
//!
//! Uses mysql_async for connection pooling and multi-row INSERT for loading.
//! Batch inserts run on one held session connection so that
//! [`TargetWriter::reset`] has a connection to re-establish.

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::dialect::MysqlDialect;
use crate::config::ConnectionConfig;
use crate::core::{Dialect, SqlValue, TableStructure, TargetWriter};
use crate::error::{PorterError, Result};

/// MySQL target writer implementation using mysql_async.
pub struct MysqlWriter {
    pool: Pool,
    session: Mutex<Option<Conn>>,
    charset: StdMutex<String>,
    dialect: MysqlDialect,
}

impl MysqlWriter {
    /// Create a new MySQL writer from a connection entry.
    pub async fn new(config: &ConnectionConfig) -> Result<Self> {
        let constraints = PoolConstraints::new(1, config.max_connections.max(1))
            .ok_or_else(|| PorterError::Config("invalid MySQL pool constraints".into()))?;

        let builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .db_name(Some(&config.name))
            .user(Some(&config.user))
            .pass(Some(&config.pass))
            .init(vec![format!("SET NAMES {}", config.charset)]);

        let opts: Opts = builder
            .pool_opts(PoolOpts::new().with_constraints(constraints))
            .into();
        let pool = Pool::new(opts);

        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| PorterError::pool(e, "creating MySQL target pool"))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| PorterError::pool(e, "testing MySQL target connection"))?;
        drop(conn);

        info!(
            "Connected to MySQL target: {}:{}/{}",
            config.host, config.port, config.name
        );

        Ok(Self {
            pool,
            session: Mutex::new(None),
            charset: StdMutex::new(config.charset.clone()),
            dialect: MysqlDialect::new(),
        })
    }

    fn current_charset(&self) -> String {
        match self.charset.lock() {
            Ok(charset) => charset.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn fresh_conn(&self) -> Result<Conn> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| PorterError::pool(e, "getting MySQL connection"))?;
        conn.query_drop(format!("SET NAMES {}", self.current_charset()))
            .await?;
        Ok(conn)
    }
}

#[async_trait]
impl TargetWriter for MysqlWriter {
    async fn drop_table(&self, table: &str) -> Result<()> {
        let mut conn = self.fresh_conn().await?;
        let sql = format!("DROP TABLE IF EXISTS {}", self.dialect.quote_ident(table));
        conn.query_drop(&sql)
            .await
            .map_err(|e| PorterError::write_failure(table, e))?;
        debug!("MySQL: dropped {}", table);
        Ok(())
    }

    async fn create_table(&self, table: &str, structure: &TableStructure) -> Result<()> {
        let mut conn = self.fresh_conn().await?;
        let sql = format!(
            "{} ENGINE=InnoDB DEFAULT CHARSET={}",
            self.dialect.create_table_sql(table, structure),
            self.current_charset()
        );
        conn.query_drop(&sql)
            .await
            .map_err(|e| PorterError::write_failure(table, e))?;
        debug!("MySQL: created {} ({} columns)", table, structure.len());
        Ok(())
    }

    async fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        let mut conn = self.fresh_conn().await?;
        let columns: Vec<String> = conn
            .exec(
                r#"
                SELECT CAST(COLUMN_NAME AS CHAR(255))
                FROM INFORMATION_SCHEMA.COLUMNS
                WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
                ORDER BY ORDINAL_POSITION
                "#,
                vec![mysql_async::Value::from(table)],
            )
            .await?;
        Ok((!columns.is_empty()).then_some(columns))
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
            None => guard.insert(self.fresh_conn().await?),
        };

        for chunk in rows.chunks(per_statement) {
            let sql = self.dialect.insert_sql(table, cols, chunk.len());
            let params: Vec<mysql_async::Value> = chunk
                .iter()
                .flat_map(|row| row.iter().map(sql_value_to_mysql))
                .collect();

            conn.exec_drop(&sql, params)
                .await
                .map_err(|e| PorterError::write_failure(table, format!("INSERT batch: {}", e)))?;
        }

        debug!("MySQL: wrote {} rows to {}", row_count, table);
        Ok(row_count)
    }

    async fn reset(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        // Returning the old connection to the pool lets the pool reset it too.
        guard.take();
        let mut conn = self.fresh_conn().await?;
        conn.reset().await?;
        conn.query_drop(format!("SET NAMES {}", self.current_charset()))
            .await?;
        *guard = Some(conn);
        debug!("MySQL: write session reset");
        Ok(())
    }

    async fn set_character_set(&self, charset: &str) -> Result<()> {
        match self.charset.lock() {
            Ok(mut current) => *current = charset.to_string(),
            Err(poisoned) => *poisoned.into_inner() = charset.to_string(),
        }
        let mut guard = self.session.lock().await;
        if let Some(conn) = guard.as_mut() {
            conn.query_drop(format!("SET NAMES {}", charset)).await?;
        }
        info!("MySQL: character set is now {}", charset);
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut conn = self.fresh_conn().await?;
        conn.query_drop(sql).await?;
        Ok(conn.affected_rows())
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn db_type(&self) -> &str {
        "mysql"
    }
}

/// Convert SqlValue to mysql_async::Value.
fn sql_value_to_mysql(value: &SqlValue) -> mysql_async::Value {
    use mysql_async::Value;

    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        SqlValue::I64(i) => Value::Int(*i),
        SqlValue::F64(f) => Value::Double(*f),
        SqlValue::Decimal(d) => Value::Bytes(d.to_string().into_bytes()),
        SqlValue::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
        SqlValue::DateTime(dt) => Value::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            dt.and_utc().timestamp_subsec_micros(),
        ),
        SqlValue::Date(d) => Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1_000,
        ),
    }
}
