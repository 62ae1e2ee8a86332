//! Configuration type definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default prefix for intermediate (canonical model) tables.
pub const DEFAULT_INTERMEDIATE_PREFIX: &str = "PORT_";

/// Default flush threshold of the batch writer.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Named connections, resolved by alias.
    pub connections: Vec<ConnectionConfig>,

    /// Run behavior options.
    #[serde(default)]
    pub options: PorterOptions,
}

/// What a connection alias points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    #[default]
    Database,
    #[serde(alias = "files")]
    File,
    Api,
}

impl std::fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectionKind::Database => "database",
            ConnectionKind::File => "file",
            ConnectionKind::Api => "api",
        })
    }
}

/// Database engine behind a database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adapter {
    #[serde(alias = "mariadb")]
    Mysql,
    Sqlite,
}

/// One named connection as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Name the connection is referenced by.
    pub alias: String,

    /// Connection kind (default: database).
    #[serde(rename = "type", default)]
    pub kind: ConnectionKind,

    /// Database engine (required for database connections).
    #[serde(default)]
    pub adapter: Option<Adapter>,

    /// Database host (default: localhost).
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name. For sqlite this is the database file path.
    #[serde(default)]
    pub name: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub pass: String,

    /// Table prefix of the platform living in this database.
    #[serde(default)]
    pub prefix: String,

    /// Connection character set (default: utf8mb4).
    #[serde(default = "default_charset")]
    pub charset: String,

    /// Output path for file connections.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Run behavior options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PorterOptions {
    /// Prefix for intermediate tables (default: PORT_).
    #[serde(default = "default_intermediate_prefix")]
    pub intermediate_prefix: String,

    /// Rows per bulk insert (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Record every extraction query into the run comments.
    #[serde(default)]
    pub capture_queries: bool,
}

impl Default for PorterOptions {
    fn default() -> Self {
        Self {
            intermediate_prefix: default_intermediate_prefix(),
            batch_size: default_batch_size(),
            capture_queries: false,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

fn default_max_connections() -> usize {
    4
}

fn default_intermediate_prefix() -> String {
    DEFAULT_INTERMEDIATE_PREFIX.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
