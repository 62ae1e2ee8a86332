//! Connection descriptors: a resolved alias plus the means to open it.

use std::sync::Arc;

use tracing::info;

use crate::config::{Adapter, ConnectionConfig, ConnectionKind};
use crate::core::{SourceReader, TargetWriter};
use crate::drivers::{mysql, sqlite};
use crate::error::{PorterError, Result};

/// A named connection resolved from configuration. Immutable once built.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    alias: String,
    kind: ConnectionKind,
    parameters: ConnectionConfig,
}

impl ConnectionDescriptor {
    /// Build a descriptor from its config entry.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            alias: config.alias.clone(),
            kind: config.kind,
            parameters: config.clone(),
        }
    }

    /// Alias this descriptor was resolved from.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Connection kind.
    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// Raw connection parameters.
    pub fn parameters(&self) -> &ConnectionConfig {
        &self.parameters
    }

    /// Table prefix configured for this connection.
    pub fn prefix(&self) -> &str {
        &self.parameters.prefix
    }

    /// Open a live database handle.
    pub async fn open(&self) -> Result<Database> {
        if self.kind != ConnectionKind::Database {
            return Err(PorterError::Config(format!(
                "connection '{}' is a {} connection, not a database",
                self.alias, self.kind
            )));
        }

        let adapter = self.parameters.adapter.ok_or_else(|| {
            PorterError::Config(format!("connection '{}' has no adapter", self.alias))
        })?;

        let database = match adapter {
            Adapter::Mysql => {
                let reader = mysql::MysqlReader::new(&self.parameters).await?;
                let writer = mysql::MysqlWriter::new(&self.parameters).await?;
                Database {
                    alias: self.alias.clone(),
                    reader: Arc::new(reader),
                    writer: Arc::new(writer),
                }
            }
            Adapter::Sqlite => {
                let pool = sqlite::connect(&self.parameters).await?;
                Database {
                    alias: self.alias.clone(),
                    reader: Arc::new(sqlite::SqliteReader::new(pool.clone(), &self.parameters.prefix)),
                    writer: Arc::new(sqlite::SqliteWriter::new(pool)),
                }
            }
        };

        info!(
            "Opened {} connection '{}'",
            database.reader.db_type(),
            self.alias
        );
        Ok(database)
    }
}

/// A live database: one reader and one writer over the same database.
#[derive(Clone)]
pub struct Database {
    alias: String,
    reader: Arc<dyn SourceReader>,
    writer: Arc<dyn TargetWriter>,
}

impl Database {
    /// Assemble a database handle from already-built driver objects.
    pub fn new(
        alias: impl Into<String>,
        reader: Arc<dyn SourceReader>,
        writer: Arc<dyn TargetWriter>,
    ) -> Self {
        Self {
            alias: alias.into(),
            reader,
            writer,
        }
    }

    /// Alias of the connection this handle was opened from.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Reader using the connection's own table prefix.
    pub fn reader(&self) -> Arc<dyn SourceReader> {
        self.reader.clone()
    }

    /// Reader over the same database with a different table prefix.
    ///
    /// The import phase reads the intermediate tables this way.
    pub fn reader_with_prefix(&self, prefix: &str) -> Arc<dyn SourceReader> {
        Arc::new(PrefixedReader {
            inner: self.reader.clone(),
            prefix: prefix.to_string(),
        })
    }

    /// Destination writer.
    pub fn writer(&self) -> Arc<dyn TargetWriter> {
        self.writer.clone()
    }

    /// Reset the write session (driver-level reconnect).
    pub async fn reset(&self) -> Result<()> {
        self.writer.reset().await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("alias", &self.alias)
            .field("db_type", &self.reader.db_type())
            .finish()
    }
}

/// Reader wrapper that overrides the placeholder prefix.
struct PrefixedReader {
    inner: Arc<dyn SourceReader>,
    prefix: String,
}

#[async_trait::async_trait]
impl SourceReader for PrefixedReader {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        self.inner.table_columns(table).await
    }

    async fn character_set(&self, table: &str) -> Result<Option<String>> {
        self.inner.character_set(table).await
    }

    fn stream_rows<'a>(&'a self, sql: &'a str) -> crate::core::RowStream<'a> {
        self.inner.stream_rows(sql)
    }

    fn db_type(&self) -> &str {
        self.inner.db_type()
    }
}
