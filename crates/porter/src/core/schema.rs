//! Destination schema types: type descriptors and table structures.
//!
//! Platform declarations describe destination columns with short MySQL-style
//! type strings (`"int"`, `"varchar(100)"`, `"tinyint(1)"`, ...). They are
//! parsed once into [`TypeDescriptor`] when the declaration is built, so the
//! batch writer never inspects type strings per row or per table.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{PorterError, Result};

/// Length used when a `varchar` length is missing or unparsable.
pub const DEFAULT_VARCHAR_LENGTH: u16 = 100;

static VARCHAR_LENGTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^varchar\(([0-9]{1,3})\)").expect("static regex"));

/// Destination column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    /// 32-bit integer. Narrower aliases (`int`, `tinyint(1)`, ...) land here.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Variable length string.
    Varchar(u16),
    /// Binary blob column.
    Varbinary,
    /// Enumerated column over a fixed option list.
    Enum(Vec<String>),
    /// Unbounded text.
    Text,
    /// Long unbounded text (`mediumtext`, `longtext`).
    LongText,
    /// Date and time.
    DateTime,
    /// Date only.
    Date,
    /// Double precision floating point.
    Double,
}

impl TypeDescriptor {
    /// Parse a declaration type string.
    ///
    /// Accepts the canonical vocabulary plus abbreviated aliases and width
    /// annotations, case-insensitively.
    pub fn parse(descriptor: &str) -> Option<Self> {
        let normalized = descriptor.trim().to_ascii_lowercase();
        let base = normalized
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default();

        let parsed = match base {
            "int" | "integer" | "tinyint" | "smallint" | "mediumint" | "tinyinteger"
            | "smallinteger" | "mediuminteger" | "bool" | "boolean" => TypeDescriptor::Integer,
            "bigint" | "biginteger" => TypeDescriptor::BigInt,
            "varchar" | "string" => TypeDescriptor::Varchar(varchar_length(&normalized)),
            "char" => TypeDescriptor::Varchar(varchar_length(&normalized.replacen("char", "varchar", 1))),
            "varbinary" | "binary" | "blob" | "mediumblob" | "longblob" => {
                TypeDescriptor::Varbinary
            }
            "enum" => TypeDescriptor::Enum(enum_options(descriptor)?),
            "text" | "tinytext" => TypeDescriptor::Text,
            "mediumtext" | "longtext" => TypeDescriptor::LongText,
            "datetime" | "timestamp" => TypeDescriptor::DateTime,
            "date" => TypeDescriptor::Date,
            "double" | "float" | "decimal" | "real" => TypeDescriptor::Double,
            _ => return None,
        };
        Some(parsed)
    }

    /// Enumerated column over an option list (the array form of a declaration).
    pub fn enumeration<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TypeDescriptor::Enum(options.into_iter().map(Into::into).collect())
    }

    /// Whether values of this type are integers.
    pub fn is_integer(&self) -> bool {
        matches!(self, TypeDescriptor::Integer | TypeDescriptor::BigInt)
    }
}

/// Extract the `varchar(n)` length, defaulting to [`DEFAULT_VARCHAR_LENGTH`].
pub fn varchar_length(descriptor: &str) -> u16 {
    VARCHAR_LENGTH
        .captures(descriptor)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .filter(|len| *len > 0)
        .unwrap_or(DEFAULT_VARCHAR_LENGTH)
}

fn enum_options(descriptor: &str) -> Option<Vec<String>> {
    let open = descriptor.find('(')?;
    let close = descriptor.rfind(')')?;
    if close <= open {
        return None;
    }
    let options: Vec<String> = descriptor[open + 1..close]
        .split(',')
        .map(|o| o.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if options.is_empty() {
        None
    } else {
        Some(options)
    }
}

impl FromStr for TypeDescriptor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TypeDescriptor::parse(s).ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Integer => f.write_str("integer"),
            TypeDescriptor::BigInt => f.write_str("bigint"),
            TypeDescriptor::Varchar(len) => write!(f, "varchar({})", len),
            TypeDescriptor::Varbinary => f.write_str("varbinary"),
            TypeDescriptor::Enum(options) => write!(f, "enum({})", options.join(",")),
            TypeDescriptor::Text => f.write_str("text"),
            TypeDescriptor::LongText => f.write_str("longtext"),
            TypeDescriptor::DateTime => f.write_str("datetime"),
            TypeDescriptor::Date => f.write_str("date"),
            TypeDescriptor::Double => f.write_str("double"),
        }
    }
}

/// One destination column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: TypeDescriptor,
}

/// Ordered destination table structure. All columns are nullable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStructure {
    columns: Vec<ColumnDef>,
}

impl TableStructure {
    /// Create an empty structure.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(column, type string)` pairs, failing on the first
    /// unresolvable type string.
    pub fn parse<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut structure = Self::new();
        for (name, descriptor) in pairs {
            let name = name.into();
            let ty = TypeDescriptor::parse(descriptor.as_ref()).ok_or_else(|| {
                PorterError::UnsupportedTypeDescriptor {
                    column: name.clone(),
                    descriptor: descriptor.as_ref().to_string(),
                }
            })?;
            structure.set(name, ty);
        }
        Ok(structure)
    }

    /// Builder-style column append.
    pub fn with(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.set(name, ty);
        self
    }

    /// Insert a column, or replace the type of an existing one in place.
    pub fn set(&mut self, name: impl Into<String>, ty: TypeDescriptor) {
        let name = name.into();
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.ty = ty,
            None => self.columns.push(ColumnDef { name, ty }),
        }
    }

    /// Look up a column's type.
    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.ty)
    }

    /// Whether the structure declares the column.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether no columns are declared.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_aliases_normalize() {
        for alias in ["int", "int(11)", "tinyint", "tinyint(1)", "smallint", "INTEGER"] {
            assert_eq!(TypeDescriptor::parse(alias), Some(TypeDescriptor::Integer), "{alias}");
        }
        assert_eq!(TypeDescriptor::parse("bigint(20)"), Some(TypeDescriptor::BigInt));
    }

    #[test]
    fn test_varchar_length() {
        assert_eq!(TypeDescriptor::parse("varchar(50)"), Some(TypeDescriptor::Varchar(50)));
        assert_eq!(TypeDescriptor::parse("varchar(999)"), Some(TypeDescriptor::Varchar(999)));
        assert_eq!(TypeDescriptor::parse("varchar"), Some(TypeDescriptor::Varchar(100)));
        assert_eq!(TypeDescriptor::parse("varchar(abc)"), Some(TypeDescriptor::Varchar(100)));
        assert_eq!(varchar_length("varchar(0)"), DEFAULT_VARCHAR_LENGTH);
    }

    #[test]
    fn test_enum_and_binary() {
        assert_eq!(
            TypeDescriptor::parse("enum('m','f','u')"),
            Some(TypeDescriptor::enumeration(["m", "f", "u"]))
        );
        assert_eq!(TypeDescriptor::parse("enum()"), None);
        assert_eq!(TypeDescriptor::parse("varbinary(16)"), Some(TypeDescriptor::Varbinary));
    }

    #[test]
    fn test_unknown_descriptor_fails_structure_parse() {
        let err = TableStructure::parse([("Id", "int"), ("Shape", "geometry")]).unwrap_err();
        match err {
            PorterError::UnsupportedTypeDescriptor { column, descriptor } => {
                assert_eq!(column, "Shape");
                assert_eq!(descriptor, "geometry");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_structure_set_replaces_in_place() {
        let mut s = TableStructure::parse([("UserID", "int"), ("Name", "varchar(50)")]).unwrap();
        s.set("UserID", TypeDescriptor::BigInt);
        assert_eq!(s.column_names(), vec!["UserID", "Name"]);
        assert_eq!(s.get("UserID"), Some(&TypeDescriptor::BigInt));
    }
}
