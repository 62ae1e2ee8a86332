//! Export operations and column maps.
//!
//! An [`ExportOperation`] is one entity's extraction query plus the rules
//! that turn its rows into destination rows: a [`ColumnMap`] (rename, type,
//! filter chain, default per source column), the destination
//! [`TableStructure`], and extra per-destination-column filters.
//!
//! Column maps can be built in code or declared in JSON, where each entry is
//! either a bare target name or `{"Column", "Type"?, "Filter"?, "Default"?}`:
//!
//! ```json
//! {
//!   "Author_ID": "UserID",
//!   "Username": {"Column": "Name", "Filter": "htmlDecode"},
//!   "Real_name": {"Column": "FullName", "Type": "varchar(50)"}
//! }
//! ```

mod engine;
mod filter;

pub use engine::{export_table, verify_source, ExportStats, RowPlan};
pub use filter::{apply_chain, html_decode, Filter};

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::capability::{Flag, Modes};
use crate::core::{SqlValue, TableStructure, TypeDescriptor};
use crate::error::{PorterError, Result};

/// What happens to one source column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Destination column name.
    pub target: String,
    /// Type override or addition for the destination structure.
    pub ty: Option<TypeDescriptor>,
    /// Filters applied in declared order.
    pub filters: Vec<Filter>,
    /// Value used when the source column is absent or NULL.
    pub default: Option<SqlValue>,
}

impl ColumnSpec {
    /// Plain rename.
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ty: None,
            filters: Vec::new(),
            default: None,
        }
    }

    pub fn typed(mut self, ty: TypeDescriptor) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn default(mut self, value: impl Into<SqlValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Ordered map of source column to [`ColumnSpec`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    entries: Vec<(String, ColumnSpec)>,
}

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename `source` to `target`.
    pub fn rename(self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.column(source, ColumnSpec::to(target))
    }

    /// Add or replace the rule for `source`.
    pub fn column(mut self, source: impl Into<String>, spec: ColumnSpec) -> Self {
        let source = source.into();
        match self.entries.iter_mut().find(|(s, _)| *s == source) {
            Some((_, existing)) => *existing = spec,
            None => self.entries.push((source, spec)),
        }
        self
    }

    /// Resolve declarations in order, failing on the first bad type or filter.
    pub fn from_decls<I>(decls: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, ColumnSpecDecl)>,
    {
        let mut map = Self::new();
        for (source, decl) in decls {
            let spec = decl.resolve()?;
            map = map.column(source, spec);
        }
        Ok(map)
    }

    /// Parse a JSON object declaration, keeping key order.
    pub fn from_json(json: &str) -> Result<Self> {
        let decls: OrderedDecls = serde_json::from_str(json)?;
        Self::from_decls(decls.0)
    }

    pub fn entries(&self) -> &[(String, ColumnSpec)] {
        &self.entries
    }

    /// Rule for a source column (case-insensitive fallback).
    pub fn get(&self, source: &str) -> Option<&ColumnSpec> {
        self.entries
            .iter()
            .find(|(s, _)| s == source)
            .or_else(|| self.entries.iter().find(|(s, _)| s.eq_ignore_ascii_case(source)))
            .map(|(_, spec)| spec)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One column map entry as declared: a bare target name or a full rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ColumnSpecDecl {
    Target(String),
    Rule {
        #[serde(rename = "Column")]
        column: String,
        #[serde(rename = "Type", default)]
        ty: Option<String>,
        #[serde(rename = "Filter", default)]
        filter: Option<FilterDecl>,
        #[serde(rename = "Default", default)]
        default: Option<serde_json::Value>,
    },
}

/// A single filter name or an ordered chain of names.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FilterDecl {
    One(String),
    Chain(Vec<String>),
}

impl ColumnSpecDecl {
    /// Resolve type strings and filter names.
    pub fn resolve(self) -> Result<ColumnSpec> {
        match self {
            ColumnSpecDecl::Target(target) => Ok(ColumnSpec::to(target)),
            ColumnSpecDecl::Rule {
                column,
                ty,
                filter,
                default,
            } => {
                let ty = ty
                    .map(|descriptor| {
                        TypeDescriptor::parse(&descriptor).ok_or_else(|| {
                            PorterError::UnsupportedTypeDescriptor {
                                column: column.clone(),
                                descriptor,
                            }
                        })
                    })
                    .transpose()?;
                let filters = match filter {
                    None => Vec::new(),
                    Some(FilterDecl::One(name)) => vec![Filter::parse(&name)?],
                    Some(FilterDecl::Chain(names)) => names
                        .iter()
                        .map(|name| Filter::parse(name))
                        .collect::<Result<Vec<_>>>()?,
                };
                Ok(ColumnSpec {
                    target: column,
                    ty,
                    filters,
                    default: default.map(json_to_value),
                })
            }
        }
    }
}

fn json_to_value(value: serde_json::Value) -> SqlValue {
    match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(b) => SqlValue::Bool(b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(SqlValue::I64)
            .or_else(|| n.as_f64().map(SqlValue::F64))
            .unwrap_or(SqlValue::Null),
        serde_json::Value::String(s) => SqlValue::Text(s),
        other => SqlValue::Text(other.to_string()),
    }
}

/// JSON object entries in document order.
struct OrderedDecls(Vec<(String, ColumnSpecDecl)>);

impl<'de> Deserialize<'de> for OrderedDecls {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = OrderedDecls;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of source column to column rule")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, ColumnSpecDecl>()? {
                    entries.push((key, value));
                }
                Ok(OrderedDecls(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// Extra filters keyed by destination column, applied after the map's chain.
pub type FilterSet = BTreeMap<String, Vec<Filter>>;

/// When an operation runs relative to negotiated feature suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gate {
    #[default]
    Always,
    /// Dropped when the flag's feature is suppressed.
    Unless(Flag),
    /// Runs only when the flag's feature is suppressed.
    When(Flag),
}

impl Gate {
    pub fn admits(&self, modes: &Modes) -> bool {
        match self {
            Gate::Always => true,
            Gate::Unless(flag) => !modes.is_suppressed(*flag),
            Gate::When(flag) => modes.is_suppressed(*flag),
        }
    }
}

/// One entity's extraction and normalization rules.
#[derive(Debug, Clone)]
pub struct ExportOperation {
    /// Destination entity (unprefixed table name).
    pub entity: String,
    /// Extraction SQL using `:_` for the table prefix.
    pub query: String,
    pub column_map: ColumnMap,
    pub structure: TableStructure,
    pub filters: FilterSet,
    pub gate: Gate,
    /// Intermediate entities this operation reads (import side).
    pub reads: Vec<String>,
}

impl ExportOperation {
    pub fn new(entity: impl Into<String>, query: impl Into<String>, structure: TableStructure) -> Self {
        Self {
            entity: entity.into(),
            query: query.into(),
            column_map: ColumnMap::new(),
            structure,
            filters: FilterSet::new(),
            gate: Gate::Always,
            reads: Vec::new(),
        }
    }

    pub fn with_map(mut self, column_map: ColumnMap) -> Self {
        self.column_map = column_map;
        self
    }

    /// Add a filter for a destination column.
    pub fn with_filter(mut self, column: impl Into<String>, filter: Filter) -> Self {
        self.filters.entry(column.into()).or_default().push(filter);
        self
    }

    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    pub fn reading<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reads.extend(entities.into_iter().map(Into::into));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_keeps_order_and_resolves() {
        let map = ColumnMap::from_json(
            r#"{
                "Author_ID": "UserID",
                "Username": {"Column": "Name", "Filter": "HTMLDecoder"},
                "Real_name": {"Column": "FullName", "Type": "varchar(50)", "Filter": ["trim", "nullIfEmpty"]},
                "Banned": {"Column": "Banned", "Default": 0}
            }"#,
        )
        .unwrap();

        let sources: Vec<&str> = map.entries().iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(sources, ["Author_ID", "Username", "Real_name", "Banned"]);
        assert_eq!(map.get("author_id").unwrap().target, "UserID");
        assert_eq!(map.get("Username").unwrap().filters, vec![Filter::HtmlDecode]);

        let real_name = map.get("Real_name").unwrap();
        assert_eq!(real_name.ty, Some(TypeDescriptor::Varchar(50)));
        assert_eq!(real_name.filters, vec![Filter::Trim, Filter::NullIfEmpty]);
        assert_eq!(map.get("Banned").unwrap().default, Some(SqlValue::I64(0)));
    }

    #[test]
    fn test_from_json_rejects_bad_declarations() {
        let err = ColumnMap::from_json(r#"{"a": {"Column": "A", "Type": "geometry"}}"#).unwrap_err();
        assert!(matches!(err, PorterError::UnsupportedTypeDescriptor { .. }));

        let err = ColumnMap::from_json(r#"{"a": {"Column": "A", "Filter": "nope"}}"#).unwrap_err();
        assert!(matches!(err, PorterError::UnknownFilter(_)));
    }

    #[test]
    fn test_gate_admits() {
        let none = Modes::default();
        let suppressed = Modes::suppressing([Flag::HasDiscussionBody]);
        assert!(Gate::Always.admits(&suppressed));
        assert!(Gate::Unless(Flag::HasDiscussionBody).admits(&none));
        assert!(!Gate::Unless(Flag::HasDiscussionBody).admits(&suppressed));
        assert!(Gate::When(Flag::HasDiscussionBody).admits(&suppressed));
        assert!(!Gate::When(Flag::HasDiscussionBody).admits(&none));
    }
}
