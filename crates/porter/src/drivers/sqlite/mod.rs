//! SQLite database driver.
//!
//! Used for single-file forums and for local runs where the source, the
//! intermediate tables and the destination share one database file.

mod dialect;
mod reader;
mod writer;

pub use dialect::SqliteDialect;
pub use reader::SqliteReader;
pub use writer::SqliteWriter;

use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::ConnectionConfig;
use crate::error::{PorterError, Result};

/// Open a pool over the database file named by the connection.
///
/// WAL mode lets the import phase read intermediate tables while the
/// destination tables are written on another connection.
pub async fn connect(config: &ConnectionConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(&config.name)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections as u32)
        .connect_with(options)
        .await
        .map_err(|e| PorterError::pool(e, "opening SQLite database"))?;

    info!("Opened SQLite database: {}", config.name);
    Ok(pool)
}
