//! MySQL/MariaDB source reader implementation.
//!
//! Uses SQLx for connection pooling and streams query results row by row.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::core::{Row, RowStream, SourceReader, SqlValue};
use crate::error::{PorterError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL/MariaDB source reader.
pub struct MysqlReader {
    pool: MySqlPool,
    prefix: String,
}

impl MysqlReader {
    /// Create a new MySQL reader from a connection entry.
    pub async fn new(config: &ConnectionConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.user)
            .password(&config.pass)
            .charset(&config.charset)
            .ssl_mode(MySqlSslMode::Preferred);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections as u32)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| PorterError::pool(e, "creating MySQL source pool"))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| PorterError::pool(e, "testing MySQL source connection"))?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, config.name
        );

        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
        })
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        // CAST to CHAR to sidestep collation/binary differences across servers
        let columns: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        debug!("MySQL: {} has {} columns", table, columns.len());
        Ok((!columns.is_empty()).then_some(columns))
    }

    async fn character_set(&self, table: &str) -> Result<Option<String>> {
        let charset: Option<String> = sqlx::query_scalar(
            r#"
            SELECT CAST(c.CHARACTER_SET_NAME AS CHAR(64))
            FROM INFORMATION_SCHEMA.TABLES t
            JOIN INFORMATION_SCHEMA.COLLATION_CHARACTER_SET_APPLICABILITY c
                ON c.COLLATION_NAME = t.TABLE_COLLATION
            WHERE t.TABLE_SCHEMA = DATABASE() AND t.TABLE_NAME = ?
            "#,
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;
        Ok(charset)
    }

    fn stream_rows<'a>(&'a self, sql: &'a str) -> RowStream<'a> {
        let mut columns: Option<Arc<[String]>> = None;
        sqlx::query(sql)
            .fetch(&self.pool)
            .map(move |result: std::result::Result<MySqlRow, sqlx::Error>| -> Result<Row> {
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
        "mysql"
    }
}

/// Unsigned values above `i64::MAX` keep their magnitude as decimals.
fn unsigned_value(v: u64) -> SqlValue {
    match i64::try_from(v) {
        Ok(i) => SqlValue::I64(i),
        Err(_) => SqlValue::Decimal(rust_decimal::Decimal::from(v)),
    }
}

/// Decode one column by its reported type, falling back to text.
fn decode_value(row: &MySqlRow, idx: usize) -> SqlValue {
    let is_null: bool = row.try_get_raw(idx).map(|r| r.is_null()).unwrap_or(true);
    if is_null {
        return SqlValue::Null;
    }

    let type_name = row.columns()[idx].type_info().name().to_ascii_lowercase();
    let decoded = match type_name.as_str() {
        "boolean" => row.try_get::<bool, _>(idx).ok().map(SqlValue::Bool),
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" => {
            row.try_get::<i64, _>(idx).ok().map(SqlValue::I64)
        }
        t if t.ends_with("unsigned") => row.try_get::<u64, _>(idx).ok().map(unsigned_value),
        "float" | "double" | "real" => row.try_get::<f64, _>(idx).ok().map(SqlValue::F64),
        "decimal" | "numeric" => row
            .try_get::<rust_decimal::Decimal, _>(idx)
            .ok()
            .map(SqlValue::Decimal),
        "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "bit"
        | "geometry" => row.try_get::<Vec<u8>, _>(idx).ok().map(SqlValue::Bytes),
        "date" => row.try_get::<chrono::NaiveDate, _>(idx).ok().map(SqlValue::Date),
        "time" => row.try_get::<chrono::NaiveTime, _>(idx).ok().map(SqlValue::Time),
        "datetime" | "timestamp" => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .ok()
            .map(SqlValue::DateTime),
        _ => None,
    };

    decoded
        .or_else(|| row.try_get::<String, _>(idx).ok().map(SqlValue::Text))
        .or_else(|| {
            row.try_get_unchecked::<Vec<u8>, _>(idx)
                .ok()
                .map(|b| SqlValue::Text(String::from_utf8_lossy(&b).into_owned()))
        })
        .unwrap_or_else(|| {
            warn!(
                "MySQL: could not decode column {} of type {}, using NULL",
                row.columns()[idx].name(),
                type_name
            );
            SqlValue::Null
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_value_keeps_magnitude() {
        assert_eq!(unsigned_value(42), SqlValue::I64(42));
        assert_eq!(
            unsigned_value(u64::MAX),
            SqlValue::Decimal(rust_decimal::Decimal::from(u64::MAX))
        );
    }
}
