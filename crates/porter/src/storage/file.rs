//! Flat export file storage.
//!
//! ```text
//! Porter export file
//! // charset: utf8mb4
//!
//! Table: User
//! UserID:integer,Name:varchar(50)
//! 1,"Alice"
//! \N,"Quote \" and newline \n"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::TryStreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use super::{MemorySampler, StoreStats, Storage};
use crate::config::DEFAULT_BATCH_SIZE;
use crate::core::{RowStream, SqlValue, TableStructure};
use crate::error::{PorterError, Result};
use crate::mapping::RowPlan;

const HEADER: &str = "Porter export file";

/// Writes every entity into one export file.
pub struct FileStorage {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    prefix: String,
    charset: String,
    /// Entity to its `name:type` header line.
    sections: HashMap<String, String>,
    columns: HashMap<String, Vec<String>>,
    current: Option<String>,
    batch_size: usize,
    sampler: MemorySampler,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            out: None,
            prefix: String::new(),
            charset: "utf8mb4".to_string(),
            sections: HashMap::new(),
            columns: HashMap::new(),
            current: None,
            batch_size: DEFAULT_BATCH_SIZE,
            sampler: MemorySampler::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn out(&mut self) -> Result<&mut BufWriter<File>> {
        self.out.as_mut().ok_or_else(|| {
            PorterError::Io(std::io::Error::other(format!(
                "export file {} is not open",
                self.path.display()
            )))
        })
    }

    async fn write_section_header(&mut self, entity: &str) -> Result<()> {
        let columns = self.sections.get(entity).cloned().unwrap_or_default();
        let out = self.out()?;
        out.write_all(format!("\nTable: {}\n{}\n", entity, columns).as_bytes())
            .await?;
        self.current = Some(entity.to_string());
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn set_prefix(&mut self, prefix: &str) {
        self.prefix = prefix.to_string();
    }

    async fn set_character_set(&mut self, charset: &str) -> Result<()> {
        self.charset = charset.to_string();
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut out = BufWriter::new(File::create(&self.path).await?);
        out.write_all(format!("{}\n// charset: {}\n", HEADER, self.charset).as_bytes())
            .await?;
        self.out = Some(out);
        info!("Writing export file {}", self.path.display());
        Ok(())
    }

    async fn end(&mut self) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            out.flush().await?;
            out.into_inner().sync_all().await?;
        }
        Ok(())
    }

    async fn prepare(&mut self, entity: &str, structure: &TableStructure) -> Result<()> {
        if self.sections.contains_key(entity) {
            debug!("{}: already written in this run, appending", entity);
            return Ok(());
        }
        let header: Vec<String> = structure
            .columns()
            .iter()
            .map(|c| format!("{}:{}", c.name, c.ty))
            .collect();
        self.sections.insert(entity.to_string(), header.join(","));
        self.columns.insert(entity.to_string(), structure.column_names());
        self.write_section_header(entity).await
    }

    async fn store(&mut self, plan: &RowPlan, mut rows: RowStream<'_>) -> Result<StoreStats> {
        let entity = plan.entity().to_string();
        if self.current.as_deref() != Some(entity.as_str()) {
            self.write_section_header(&entity).await?;
        }

        let mut stats = StoreStats::default();
        let mut pending = 0usize;
        let mut bound = None;

        while let Some(row) = rows.try_next().await? {
            let normalizer = match bound.take() {
                Some(b) => bound.insert(b),
                None => bound.insert(plan.bind(row.columns())?),
            };
            let line = format_line(&normalizer.normalize(&row));
            self.out()?.write_all(line.as_bytes()).await?;
            stats.rows += 1;
            pending += 1;

            if pending == self.batch_size {
                stats.memory.push(self.sampler.sample());
                self.out()?.flush().await?;
                stats.flushes += 1;
                pending = 0;
            }
        }

        stats.memory.push(self.sampler.sample());
        if pending > 0 {
            self.out()?.flush().await?;
            stats.flushes += 1;
        }
        Ok(stats)
    }

    async fn exists(&self, entity: &str, columns: &[&str]) -> Result<bool> {
        Ok(self.columns.get(entity).is_some_and(|present| {
            columns
                .iter()
                .all(|wanted| present.iter().any(|c| c.eq_ignore_ascii_case(wanted)))
        }))
    }
}

fn format_line(values: &[SqlValue]) -> String {
    let fields: Vec<String> = values.iter().map(format_field).collect();
    let mut line = fields.join(",");
    line.push('\n');
    line
}

fn format_field(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "\\N".to_string(),
        SqlValue::Bool(_) | SqlValue::I64(_) | SqlValue::F64(_) | SqlValue::Decimal(_) => {
            value.to_string()
        }
        other => {
            let text = other.to_text().unwrap_or_default();
            let mut quoted = String::with_capacity(text.len() + 2);
            quoted.push('"');
            for c in text.chars() {
                match c {
                    '\\' => quoted.push_str("\\\\"),
                    '"' => quoted.push_str("\\\""),
                    '\n' => quoted.push_str("\\n"),
                    '\r' => quoted.push_str("\\r"),
                    c => quoted.push(c),
                }
            }
            quoted.push('"');
            quoted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Row, TypeDescriptor};
    use crate::mapping::ExportOperation;
    use futures::StreamExt;

    #[test]
    fn test_format_field() {
        assert_eq!(format_field(&SqlValue::Null), "\\N");
        assert_eq!(format_field(&SqlValue::I64(3)), "3");
        assert_eq!(
            format_field(&SqlValue::from("Quote \" and newline \n")),
            "\"Quote \\\" and newline \\n\""
        );
    }

    #[tokio::test]
    async fn test_writes_sections_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("export.txt");
        let mut storage = FileStorage::new(&path);

        let structure = TableStructure::new()
            .with("UserID", TypeDescriptor::Integer)
            .with("Name", TypeDescriptor::Varchar(50));
        let op = ExportOperation::new("User", "q", structure.clone());
        let plan = RowPlan::resolve(&op).unwrap();

        storage.begin().await.unwrap();
        storage.prepare("User", &structure).await.unwrap();
        assert!(storage.exists("User", &["UserID", "Name"]).await.unwrap());
        assert!(!storage.exists("User", &["Email"]).await.unwrap());

        let rows = futures::stream::iter(vec![
            Ok(Row::from_pairs([("UserID", SqlValue::I64(1)), ("Name", "Alice".into())])),
            Ok(Row::from_pairs([("UserID", SqlValue::Null), ("Name", "Bob".into())])),
        ])
        .boxed();
        let stats = storage.store(&plan, rows).await.unwrap();
        assert_eq!(stats.rows, 2);
        assert_eq!(stats.flushes, 1);

        storage.prepare("User", &structure).await.unwrap();
        let more = futures::stream::iter(vec![Ok(Row::from_pairs([
            ("UserID", SqlValue::I64(3)),
            ("Name", SqlValue::from("Cy")),
        ]))])
        .boxed();
        storage.store(&plan, more).await.unwrap();
        storage.end().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Porter export file\n// charset: utf8mb4\n\nTable: User\nUserID:integer,Name:varchar(50)\n1,\"Alice\"\n\\N,\"Bob\"\n3,\"Cy\"\n"
        );
    }
}
