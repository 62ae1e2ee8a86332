//! MySQL dialect implementation.

use crate::core::{Dialect, TypeDescriptor};

/// MySQL's limit on placeholders in one prepared statement.
pub const MYSQL_MAX_PLACEHOLDERS: usize = 65535;

/// MySQL/MariaDB SQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect.
    pub fn new() -> Self {
        Self
    }

    /// Quote a string literal.
    pub fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn column_type(&self, ty: &TypeDescriptor) -> String {
        match ty {
            TypeDescriptor::Integer => "INT".to_string(),
            TypeDescriptor::BigInt => "BIGINT".to_string(),
            TypeDescriptor::Varchar(len) => format!("VARCHAR({})", len),
            TypeDescriptor::Varbinary => "BLOB".to_string(),
            TypeDescriptor::Enum(options) => {
                let options: Vec<String> = options.iter().map(|o| Self::quote_literal(o)).collect();
                format!("ENUM({})", options.join(", "))
            }
            TypeDescriptor::Text => "TEXT".to_string(),
            TypeDescriptor::LongText => "LONGTEXT".to_string(),
            TypeDescriptor::DateTime => "DATETIME".to_string(),
            TypeDescriptor::Date => "DATE".to_string(),
            TypeDescriptor::Double => "DOUBLE".to_string(),
        }
    }

    fn max_placeholders(&self) -> usize {
        MYSQL_MAX_PLACEHOLDERS
    }
}
