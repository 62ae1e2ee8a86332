//! SQL value and row types shared by readers, the mapping engine and writers.
//!
//! Values are owned: a row pulled from a source cursor is normalized and moved
//! into the batch buffer, so there is no source buffer worth borrowing from.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// Canonical datetime text format used by filters and file storage.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Any integer width, widened to 64 bits.
    I64(i64),

    /// Floating point value.
    F64(f64),

    /// Exact numeric value.
    Decimal(Decimal),

    /// Text data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Text view of the value, if it is textual.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value as text, or `None` for NULL.
    ///
    /// Binary data is decoded lossily as UTF-8.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            SqlValue::I64(v) => Some(v.to_string()),
            SqlValue::F64(v) => Some(v.to_string()),
            SqlValue::Decimal(v) => Some(v.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            SqlValue::DateTime(v) => Some(v.format(DATETIME_FORMAT).to_string()),
            SqlValue::Date(v) => Some(v.format("%Y-%m-%d").to_string()),
            SqlValue::Time(v) => Some(v.format("%H:%M:%S").to_string()),
        }
    }

    /// Interpret the value as an integer when it has an unambiguous integer form.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Bool(b) => Some(i64::from(*b)),
            SqlValue::I64(v) => Some(*v),
            SqlValue::F64(v) if v.fract() == 0.0 => Some(*v as i64),
            SqlValue::Decimal(d) if d.fract().is_zero() => i64::try_from(*d).ok(),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I64(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// A name-addressable row as yielded by a source cursor.
///
/// Column names are shared between all rows of one result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row. `values` must be aligned with `columns`.
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a row from `(name, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        let (columns, values): (Vec<String>, Vec<SqlValue>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(columns.into(), values)
    }

    /// Column names in result-set order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in result-set order.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Position of a column. Exact match first, then case-insensitive,
    /// since MySQL column labels are case-insensitive.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    /// Whether the result set contains the column.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Value of a column, if present.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.position(name).map(|i| &self.values[i])
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
