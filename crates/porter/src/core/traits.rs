//! Core traits for database-agnostic extraction and loading.
//!
//! - [`SourceReader`]: streams rows out of a source (or intermediate) database
//! - [`TargetWriter`]: creates tables in and bulk-inserts into a destination
//! - [`Dialect`]: SQL syntax strategy for generating DDL and inserts

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

use super::schema::{TableStructure, TypeDescriptor};
use super::value::{Row, SqlValue};

/// Forward-only stream of source rows.
pub type RowStream<'a> = BoxStream<'a, Result<Row>>;

/// Read rows from a source database.
///
/// Implementations must stream: [`stream_rows`](SourceReader::stream_rows)
/// yields one row at a time from a server-side cursor and never collects the
/// whole result set.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Table prefix substituted for the `:_` placeholder in extraction queries.
    fn prefix(&self) -> &str;

    /// Column names of a table, or `None` if the table does not exist.
    ///
    /// `table` is the physical (already prefixed) table name.
    async fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>>;

    /// Character set governing a table, if the engine exposes one.
    async fn character_set(&self, table: &str) -> Result<Option<String>>;

    /// Run a query and stream its rows.
    fn stream_rows<'a>(&'a self, sql: &'a str) -> RowStream<'a>;

    /// Get the database type identifier (e.g., "mysql", "sqlite").
    fn db_type(&self) -> &str;
}

/// Write schema and data to a destination database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Drop a table if it exists.
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Create a table with every column nullable.
    async fn create_table(&self, table: &str, structure: &TableStructure) -> Result<()>;

    /// Column names of a table, or `None` if the table does not exist.
    async fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>>;

    /// Insert a batch of rows aligned with `cols`. An empty batch is a no-op.
    async fn write_batch(&self, table: &str, cols: &[String], rows: Vec<Vec<SqlValue>>)
        -> Result<u64>;

    /// Re-establish the session used for batch writes.
    ///
    /// Called before every batch-streaming session so that state left behind
    /// by an earlier cursor read cannot leak into the inserts.
    async fn reset(&self) -> Result<()>;

    /// Apply a connection character set for subsequent writes.
    async fn set_character_set(&self, charset: &str) -> Result<()>;

    /// Execute a statement that returns no rows. Used by finalization steps.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// SQL dialect of this destination.
    fn dialect(&self) -> &dyn Dialect;

    /// Get the database type identifier (e.g., "mysql", "sqlite").
    fn db_type(&self) -> &str;
}

/// SQL syntax strategy for different database engines.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier.
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_ident(&self, name: &str) -> String;

    /// Concrete column type for a type descriptor.
    fn column_type(&self, ty: &TypeDescriptor) -> String;

    /// Maximum number of bind parameters in one statement.
    fn max_placeholders(&self) -> usize;

    /// Build `CREATE TABLE` DDL with all columns nullable.
    fn create_table_sql(&self, table: &str, structure: &TableStructure) -> String {
        let col_defs: Vec<String> = structure
            .columns()
            .iter()
            .map(|c| format!("{} {} NULL", self.quote_ident(&c.name), self.column_type(&c.ty)))
            .collect();
        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.quote_ident(table),
            col_defs.join(",\n    ")
        )
    }

    /// Build a multi-row `INSERT` with `?` placeholders.
    fn insert_sql(&self, table: &str, cols: &[String], rows: usize) -> String {
        let col_list: Vec<String> = cols.iter().map(|c| self.quote_ident(c)).collect();
        let row_placeholders = format!("({})", vec!["?"; cols.len()].join(", "));
        let all_placeholders: Vec<String> = std::iter::repeat_n(row_placeholders, rows).collect();
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.quote_ident(table),
            col_list.join(", "),
            all_placeholders.join(", ")
        )
    }

    /// Rows per `INSERT` statement for a given column count.
    fn rows_per_statement(&self, num_cols: usize) -> usize {
        if num_cols == 0 {
            0
        } else {
            (self.max_placeholders() / num_cols).max(1)
        }
    }
}
