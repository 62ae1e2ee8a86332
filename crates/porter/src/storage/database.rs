//! Batch writer over a destination database.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use tracing::{debug, info};

use super::{MemorySampler, StoreStats, Storage};
use crate::config::DEFAULT_BATCH_SIZE;
use crate::core::{RowStream, SqlValue, TableStructure, TargetWriter};
use crate::error::Result;
use crate::mapping::RowPlan;

/// Buffers normalized rows and writes them with one bulk insert per full
/// batch.
pub struct DatabaseStorage {
    writer: Arc<dyn TargetWriter>,
    prefix: String,
    /// Prefixed names of tables created in this run.
    reset_tables: HashSet<String>,
    batch_size: usize,
    sampler: MemorySampler,
}

impl DatabaseStorage {
    pub fn new(writer: Arc<dyn TargetWriter>) -> Self {
        Self {
            writer,
            prefix: String::new(),
            reset_tables: HashSet::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            sampler: MemorySampler::new(),
        }
    }

    /// Set the flush threshold (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn writer(&self) -> Arc<dyn TargetWriter> {
        self.writer.clone()
    }

    fn table(&self, entity: &str) -> String {
        format!("{}{}", self.prefix, entity)
    }

    async fn flush(&self, table: &str, cols: &[String], batch: Vec<Vec<SqlValue>>) -> Result<()> {
        let rows = self.writer.write_batch(table, cols, batch).await?;
        debug!("{}: flushed {} rows", table, rows);
        Ok(())
    }
}

#[async_trait]
impl Storage for DatabaseStorage {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn set_prefix(&mut self, prefix: &str) {
        self.prefix = prefix.to_string();
    }

    async fn set_character_set(&mut self, charset: &str) -> Result<()> {
        self.writer.set_character_set(charset).await
    }

    async fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    async fn end(&mut self) -> Result<()> {
        Ok(())
    }

    async fn prepare(&mut self, entity: &str, structure: &TableStructure) -> Result<()> {
        let table = self.table(entity);
        if self.reset_tables.contains(&table) {
            debug!("{}: already reset in this run, appending", table);
            return Ok(());
        }
        self.writer.drop_table(&table).await?;
        self.writer.create_table(&table, structure).await?;
        info!("Created table {}", table);
        self.reset_tables.insert(table);
        Ok(())
    }

    async fn store(&mut self, plan: &RowPlan, mut rows: RowStream<'_>) -> Result<StoreStats> {
        let table = self.table(plan.entity());
        let cols = plan.column_names();
        let mut stats = StoreStats::default();
        let mut batch: Vec<Vec<SqlValue>> = Vec::with_capacity(self.batch_size);
        let mut bound = None;

        self.writer.reset().await?;

        while let Some(row) = rows.try_next().await? {
            let normalizer = match bound.take() {
                Some(b) => bound.insert(b),
                None => bound.insert(plan.bind(row.columns())?),
            };
            batch.push(normalizer.normalize(&row));
            stats.rows += 1;

            if batch.len() == self.batch_size {
                stats.memory.push(self.sampler.sample());
                let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                self.flush(&table, &cols, full).await?;
                stats.flushes += 1;
            }
        }

        stats.memory.push(self.sampler.sample());
        if !batch.is_empty() {
            self.flush(&table, &cols, batch).await?;
            stats.flushes += 1;
        }

        Ok(stats)
    }

    async fn exists(&self, entity: &str, columns: &[&str]) -> Result<bool> {
        let table = self.table(entity);
        let Some(present) = self.writer.table_columns(&table).await? else {
            return Ok(false);
        };
        Ok(columns
            .iter()
            .all(|wanted| present.iter().any(|c| c.eq_ignore_ascii_case(wanted))))
    }
}

impl std::fmt::Debug for DatabaseStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseStorage")
            .field("db_type", &self.writer.db_type())
            .field("prefix", &self.prefix)
            .field("batch_size", &self.batch_size)
            .field("reset_tables", &self.reset_tables.len())
            .finish()
    }
}
