//! MySQL/MariaDB database driver.
//!
//! - [`MysqlDialect`]: SQL syntax strategy
//! - [`MysqlReader`]: streaming source reader (SQLx)
//! - [`MysqlWriter`]: destination writer (mysql_async)
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod dialect;
mod reader;
mod writer;

pub use dialect::MysqlDialect;
pub use reader::MysqlReader;
pub use writer::MysqlWriter;
