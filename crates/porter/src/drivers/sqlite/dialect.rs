//! SQLite dialect implementation.

use crate::core::{Dialect, TypeDescriptor};

/// SQLite's default SQLITE_MAX_VARIABLE_NUMBER since 3.32.
pub const SQLITE_MAX_PLACEHOLDERS: usize = 32766;

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Create a new SQLite dialect.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn column_type(&self, ty: &TypeDescriptor) -> String {
        match ty {
            TypeDescriptor::Integer => "INTEGER".to_string(),
            TypeDescriptor::BigInt => "BIGINT".to_string(),
            TypeDescriptor::Varchar(len) => format!("VARCHAR({})", len),
            TypeDescriptor::Varbinary => "BLOB".to_string(),
            // Enumerations are stored as their text value.
            TypeDescriptor::Enum(_) | TypeDescriptor::Text | TypeDescriptor::LongText => {
                "TEXT".to_string()
            }
            TypeDescriptor::DateTime => "DATETIME".to_string(),
            TypeDescriptor::Date => "DATE".to_string(),
            TypeDescriptor::Double => "REAL".to_string(),
        }
    }

    fn max_placeholders(&self) -> usize {
        SQLITE_MAX_PLACEHOLDERS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        let d = SqliteDialect::new();
        assert_eq!(d.quote_ident("User"), "\"User\"");
        assert_eq!(d.quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_column_types() {
        let d = SqliteDialect::new();
        assert_eq!(d.column_type(&TypeDescriptor::enumeration(["m", "f"])), "TEXT");
        assert_eq!(d.column_type(&TypeDescriptor::Double), "REAL");
        assert_eq!(d.rows_per_statement(3), 10922);
    }
}
