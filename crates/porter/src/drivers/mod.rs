//! Database driver implementations.
//!
//! - [`mysql`]: MySQL/MariaDB (sqlx reader, mysql_async writer)
//! - [`sqlite`]: SQLite (sqlx reader and writer)
//!
//! Each driver implements `SourceReader`, `TargetWriter` and `Dialect` from
//! [`crate::core`]. Connection descriptors pick the driver from the
//! configured adapter.

pub mod mysql;
pub mod sqlite;

pub use mysql::{MysqlDialect, MysqlReader, MysqlWriter};
pub use sqlite::{SqliteDialect, SqliteReader, SqliteWriter};

/// Replace the `:_` table prefix placeholder in an extraction query.
pub fn substitute_prefix(sql: &str, prefix: &str) -> String {
    sql.replace(":_", prefix)
}
