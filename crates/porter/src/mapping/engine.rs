//! Row normalization and the per-entity export driver.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::filter::apply_chain;
use super::{ExportOperation, Filter};
use crate::core::{Row, SourceReader, SqlValue, TableStructure, TypeDescriptor};
use crate::drivers::substitute_prefix;
use crate::error::{PorterError, Result};
use crate::platform::RequiredTable;
use crate::storage::Storage;

/// Outcome of one `export_table` call.
#[derive(Debug, Clone)]
pub struct ExportStats {
    pub entity: String,
    pub rows: u64,
    pub flushes: usize,
    /// Process memory (bytes) sampled at each flush.
    pub memory: Vec<u64>,
    pub elapsed: Duration,
    /// Extraction SQL after prefix substitution.
    pub query: String,
}

impl ExportStats {
    /// Peak sampled memory in bytes.
    pub fn peak_memory(&self) -> u64 {
        self.memory.iter().copied().max().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
enum ColumnSource {
    /// Value comes from a mapped source column.
    Mapped {
        column: String,
        default: Option<SqlValue>,
    },
    /// Source column of the same name, if the query returns one.
    Passthrough,
}

#[derive(Debug, Clone)]
struct PlannedColumn {
    target: String,
    ty: TypeDescriptor,
    source: ColumnSource,
    filters: Vec<Filter>,
}

/// Normalization rules for one operation, resolved once before any row is read.
///
/// Output rows follow the destination structure's column order. Each
/// destination column takes its mapped source column, else a source column of
/// the same name that is not itself mapped elsewhere, else its declared
/// default, else NULL.
#[derive(Debug, Clone)]
pub struct RowPlan {
    entity: String,
    structure: TableStructure,
    columns: Vec<PlannedColumn>,
}

impl RowPlan {
    /// Resolve an operation's column map against its structure.
    ///
    /// Map types override or add structure columns. A map target that is
    /// neither declared nor typed is an error.
    pub fn resolve(op: &ExportOperation) -> Result<Self> {
        let mut structure = op.structure.clone();
        for (_, spec) in op.column_map.entries() {
            if let Some(ty) = &spec.ty {
                structure.set(spec.target.clone(), ty.clone());
            }
        }

        for (_, spec) in op.column_map.entries() {
            if !structure.contains(&spec.target) {
                return Err(PorterError::UndeclaredColumn {
                    entity: op.entity.clone(),
                    column: spec.target.clone(),
                });
            }
        }

        let columns = structure
            .columns()
            .iter()
            .map(|def| {
                let mapped = op
                    .column_map
                    .entries()
                    .iter()
                    .find(|(_, spec)| spec.target == def.name);

                let (source, mut filters) = match mapped {
                    Some((column, spec)) => (
                        ColumnSource::Mapped {
                            column: column.clone(),
                            default: spec.default.clone(),
                        },
                        spec.filters.clone(),
                    ),
                    None => (ColumnSource::Passthrough, Vec::new()),
                };
                if let Some(extra) = op.filters.get(&def.name) {
                    filters.extend(extra.iter().cloned());
                }

                PlannedColumn {
                    target: def.name.clone(),
                    ty: def.ty.clone(),
                    source,
                    filters,
                }
            })
            .collect();

        Ok(Self {
            entity: op.entity.clone(),
            structure,
            columns,
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Destination structure including map-declared types.
    pub fn structure(&self) -> &TableStructure {
        &self.structure
    }

    /// Destination column names in output order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.target.clone()).collect()
    }

    /// Full filter chain of a destination column.
    pub fn filters(&self, column: &str) -> &[Filter] {
        self.columns
            .iter()
            .find(|c| c.target == column)
            .map(|c| c.filters.as_slice())
            .unwrap_or_default()
    }

    /// Bind the plan to a result set's column names.
    ///
    /// Fails with `MissingColumn` when a mapped source column is absent and
    /// has no default.
    pub fn bind(&self, source_columns: &[String]) -> Result<BoundPlan<'_>> {
        let position = |name: &str| {
            source_columns
                .iter()
                .position(|c| c == name)
                .or_else(|| source_columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
        };
        let is_mapped_elsewhere = |name: &str| {
            self.columns.iter().any(|c| {
                matches!(&c.source, ColumnSource::Mapped { column, .. }
                    if column.eq_ignore_ascii_case(name) && !c.target.eq_ignore_ascii_case(name))
            })
        };

        let mut slots = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let slot = match &column.source {
                ColumnSource::Mapped { column: source, default } => match position(source) {
                    Some(idx) => Slot::Index(idx),
                    None => match default {
                        Some(_) => Slot::Null,
                        None => {
                            return Err(PorterError::MissingColumn {
                                entity: self.entity.clone(),
                                column: source.clone(),
                            })
                        }
                    },
                },
                ColumnSource::Passthrough => match position(&column.target) {
                    Some(idx) if !is_mapped_elsewhere(&column.target) => Slot::Index(idx),
                    _ => Slot::Null,
                },
            };
            slots.push(slot);
        }

        Ok(BoundPlan { plan: self, slots })
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Index(usize),
    Null,
}

/// A [`RowPlan`] bound to one result set's column positions.
#[derive(Debug)]
pub struct BoundPlan<'p> {
    plan: &'p RowPlan,
    slots: Vec<Slot>,
}

impl BoundPlan<'_> {
    /// Normalize one source row into destination column order.
    pub fn normalize(&self, row: &Row) -> Vec<SqlValue> {
        self.plan
            .columns
            .iter()
            .zip(&self.slots)
            .map(|(column, slot)| {
                let mut value = match slot {
                    Slot::Index(idx) => row.values()[*idx].clone(),
                    Slot::Null => SqlValue::Null,
                };
                if value.is_null() {
                    if let ColumnSource::Mapped {
                        default: Some(default),
                        ..
                    } = &column.source
                    {
                        value = default.clone();
                    }
                }
                coerce(apply_chain(&column.filters, value, row), &column.ty)
            })
            .collect()
    }
}

/// Bring a value in line with its destination column type.
fn coerce(value: SqlValue, ty: &TypeDescriptor) -> SqlValue {
    match (ty, value) {
        (_, SqlValue::Null) => SqlValue::Null,
        (TypeDescriptor::Integer | TypeDescriptor::BigInt, SqlValue::Bool(b)) => {
            SqlValue::I64(i64::from(b))
        }
        (TypeDescriptor::Integer | TypeDescriptor::BigInt, SqlValue::Text(s)) => {
            match s.trim().parse::<i64>() {
                Ok(i) => SqlValue::I64(i),
                Err(_) => SqlValue::Text(s),
            }
        }
        (TypeDescriptor::Double, SqlValue::I64(i)) => SqlValue::F64(i as f64),
        (TypeDescriptor::Double, SqlValue::Text(s)) => match s.trim().parse::<f64>() {
            Ok(f) => SqlValue::F64(f),
            Err(_) => SqlValue::Text(s),
        },
        (
            TypeDescriptor::Varchar(_)
            | TypeDescriptor::Text
            | TypeDescriptor::LongText
            | TypeDescriptor::Enum(_),
            value @ (SqlValue::Bool(_)
            | SqlValue::I64(_)
            | SqlValue::F64(_)
            | SqlValue::Decimal(_)
            | SqlValue::DateTime(_)
            | SqlValue::Date(_)
            | SqlValue::Time(_)
            | SqlValue::Bytes(_)),
        ) => value.to_text().map(SqlValue::Text).unwrap_or(SqlValue::Null),
        (_, value) => value,
    }
}

/// Check that every required source table and column exists.
///
/// Table names are unprefixed; the reader's prefix is applied. The first
/// absent table or column is reported.
pub async fn verify_source(reader: &dyn SourceReader, required: &[RequiredTable]) -> Result<()> {
    for requirement in required {
        let table = format!("{}{}", reader.prefix(), requirement.table);
        let Some(columns) = reader.table_columns(&table).await? else {
            return Err(PorterError::missing_table(table));
        };
        for wanted in requirement.columns {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(wanted)) {
                return Err(PorterError::missing_source_column(table, *wanted));
            }
        }
        debug!("Verified source table {}", table);
    }
    Ok(())
}

/// Run one export operation: prepare the destination table, stream the
/// source query through normalization, and store it in batches.
pub async fn export_table(
    reader: &dyn SourceReader,
    storage: &mut dyn Storage,
    op: &ExportOperation,
) -> Result<ExportStats> {
    let start = Instant::now();
    let plan = RowPlan::resolve(op)?;
    let query = substitute_prefix(&op.query, reader.prefix());

    storage.prepare(&op.entity, plan.structure()).await?;

    debug!("{}: running extraction query", op.entity);
    let stored = storage.store(&plan, reader.stream_rows(&query)).await?;

    let stats = ExportStats {
        entity: op.entity.clone(),
        rows: stored.rows,
        flushes: stored.flushes,
        memory: stored.memory,
        elapsed: start.elapsed(),
        query,
    };
    info!(
        "{}: {} rows in {:.2}s",
        stats.entity,
        stats.rows,
        stats.elapsed.as_secs_f64()
    );
    Ok(stats)
}
