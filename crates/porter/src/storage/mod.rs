//! Intermediate and destination storage.
//!
//! - [`DatabaseStorage`]: the batch writer over a [`TargetWriter`](crate::core::TargetWriter)
//! - [`FileStorage`]: flat export file, used for file output runs

mod database;
mod file;
mod memory;

pub use database::DatabaseStorage;
pub use file::FileStorage;
pub use memory::MemorySampler;

use async_trait::async_trait;

use crate::core::{RowStream, TableStructure};
use crate::error::Result;
use crate::mapping::RowPlan;

/// Per-`store` results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub rows: u64,
    /// Bulk inserts issued, including the final partial one.
    pub flushes: usize,
    /// Process memory in bytes, one sample per flush plus one at stream end.
    pub memory: Vec<u64>,
}

/// Where normalized rows go.
///
/// One instance lives for a whole run and owns the set of tables already
/// reset in that run.
#[async_trait]
pub trait Storage: Send {
    /// Table prefix applied to entity names.
    fn prefix(&self) -> &str;

    fn set_prefix(&mut self, prefix: &str);

    /// Character set for subsequent writes.
    async fn set_character_set(&mut self, charset: &str) -> Result<()>;

    async fn begin(&mut self) -> Result<()>;

    async fn end(&mut self) -> Result<()>;

    /// Create the destination table for an entity unless it was already
    /// reset in this run.
    async fn prepare(&mut self, entity: &str, structure: &TableStructure) -> Result<()>;

    /// Normalize and write a row stream in batches.
    async fn store(&mut self, plan: &RowPlan, rows: RowStream<'_>) -> Result<StoreStats>;

    /// Whether the prefixed table exists with every requested column.
    /// With no columns requested only the table must exist.
    async fn exists(&self, entity: &str, columns: &[&str]) -> Result<bool>;
}
