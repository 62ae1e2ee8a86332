//! Error types for the porter library.

use thiserror::Error;

/// Main error type for porter operations.
#[derive(Error, Debug)]
pub enum PorterError {
    /// Configuration error (invalid YAML, unknown alias, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A table or column the source platform requires does not exist.
    #[error("Missing source structure: {}", describe_structure(.table, .column.as_deref()))]
    MissingSourceStructure {
        table: String,
        column: Option<String>,
    },

    /// A row lacks a mapped column and no default was declared for it.
    #[error("Missing column '{column}' while exporting {entity}")]
    MissingColumn { entity: String, column: String },

    /// A type descriptor could not be resolved into a column type.
    #[error("Unsupported type descriptor '{descriptor}' for column '{column}'")]
    UnsupportedTypeDescriptor { column: String, descriptor: String },

    /// A column map targets a column the table structure does not declare.
    #[error("Column '{column}' is mapped for {entity} but not declared in its structure")]
    UndeclaredColumn { entity: String, column: String },

    /// A filter name in a column map declaration is not known.
    #[error("Unknown filter '{0}'")]
    UnknownFilter(String),

    /// No platform is registered under the requested name.
    #[error("Unknown {kind} platform '{name}'")]
    UnknownPlatform { kind: &'static str, name: String },

    /// The destination rejected a bulk insert or DDL statement.
    #[error("Write failed for table {table}: {message}")]
    DestinationWriteFailure { table: String, message: String },

    /// The optional finalization step failed. Imported data is kept.
    #[error("Finalization failed for {platform}: {message}")]
    FinalizationFailure { platform: String, message: String },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Source database query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Destination database error (MySQL writer)
    #[error("Destination database error: {0}")]
    Destination(#[from] mysql_async::Error),

    /// IO error (file storage, config files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_structure(table: &str, column: Option<&str>) -> String {
    match column {
        Some(column) => format!("column '{}' on table '{}'", column, table),
        None => format!("table '{}'", table),
    }
}

impl PorterError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        PorterError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a DestinationWriteFailure error
    pub fn write_failure(table: impl Into<String>, message: impl ToString) -> Self {
        PorterError::DestinationWriteFailure {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a MissingSourceStructure error for an absent table.
    pub fn missing_table(table: impl Into<String>) -> Self {
        PorterError::MissingSourceStructure {
            table: table.into(),
            column: None,
        }
    }

    /// Create a MissingSourceStructure error for an absent column.
    pub fn missing_source_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        PorterError::MissingSourceStructure {
            table: table.into(),
            column: Some(column.into()),
        }
    }

    /// Short machine-friendly name of the error kind, used in run comments.
    pub fn kind(&self) -> &'static str {
        match self {
            PorterError::Config(_) => "Config",
            PorterError::MissingSourceStructure { .. } => "MissingSourceStructure",
            PorterError::MissingColumn { .. } => "MissingColumn",
            PorterError::UnsupportedTypeDescriptor { .. } => "UnsupportedTypeDescriptor",
            PorterError::UndeclaredColumn { .. } => "UndeclaredColumn",
            PorterError::UnknownFilter(_) => "UnknownFilter",
            PorterError::UnknownPlatform { .. } => "UnknownPlatform",
            PorterError::DestinationWriteFailure { .. } => "DestinationWriteFailure",
            PorterError::FinalizationFailure { .. } => "FinalizationFailure",
            PorterError::Pool { .. } => "Pool",
            PorterError::Source(_) => "Source",
            PorterError::Destination(_) => "Destination",
            PorterError::Io(_) => "Io",
            PorterError::Yaml(_) => "Yaml",
            PorterError::Json(_) => "Json",
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            PorterError::Config(_)
            | PorterError::UnknownPlatform { .. }
            | PorterError::UnknownFilter(_)
            | PorterError::Yaml(_) => 2,
            PorterError::MissingSourceStructure { .. } => 3,
            PorterError::Pool { .. } | PorterError::Source(_) | PorterError::Destination(_) => 4,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for porter operations.
pub type Result<T> = std::result::Result<T, PorterError>;
