//! Core abstractions for database-agnostic migration.
//!
//! - [`schema`]: destination type descriptors and table structures
//! - [`value`]: SQL values and name-addressable rows
//! - [`traits`]: readers, writers and dialects implemented by `drivers`

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{ColumnDef, TableStructure, TypeDescriptor, DEFAULT_VARCHAR_LENGTH};
pub use traits::{Dialect, RowStream, SourceReader, TargetWriter};
pub use value::{Row, SqlValue, DATETIME_FORMAT};
