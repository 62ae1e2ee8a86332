//! Column filters: pure value transforms applied during normalization.
//!
//! Filters are resolved by name when a column map is declared. Every filter
//! is idempotent, so re-normalizing an already normalized row changes nothing.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::DateTime;
use regex::{Captures, Regex};

use crate::core::{Row, SqlValue, DATETIME_FORMAT};
use crate::error::PorterError;

static HTML_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("static regex")
});

static CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+)\s*\((.*)\)$").expect("static regex"));

/// A named, pure value transform.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Decode HTML entities (`&amp;` to `&`), including nested encodings.
    HtmlDecode,
    /// Vendor boolean (`y`, `yes`, `true`, `on`, non-zero) to 0/1.
    Bool,
    /// Parse text as an integer; unparsable text becomes NULL.
    Integer,
    /// Empty or whitespace-only text becomes NULL.
    NullIfEmpty,
    /// Strip surrounding whitespace.
    Trim,
    /// Unix seconds to `YYYY-MM-DD HH:MM:SS` (UTC).
    Timestamp,
    /// Prefix the value with another column of the same row.
    ///
    /// A value that already starts with `column + separator` is left as is.
    /// This keeps re-normalization a no-op, but it also means a raw value that
    /// happens to begin with that prefix is not prefixed again.
    Concat { column: String, separator: String },
    /// Replace NULL with a fixed value.
    Default(SqlValue),
}

impl Filter {
    /// Apply the filter to one value. `row` is the source row the value came from.
    pub fn apply(&self, value: SqlValue, row: &Row) -> SqlValue {
        match self {
            Filter::HtmlDecode => match value {
                SqlValue::Text(s) => SqlValue::Text(html_decode(&s)),
                other => other,
            },
            Filter::Bool => match &value {
                SqlValue::Null => SqlValue::Null,
                SqlValue::Bool(b) => SqlValue::I64(i64::from(*b)),
                SqlValue::I64(i) => SqlValue::I64(i64::from(*i != 0)),
                SqlValue::F64(f) => SqlValue::I64(i64::from(*f != 0.0)),
                other => {
                    let text = other.to_text().unwrap_or_default();
                    SqlValue::I64(i64::from(is_truthy(&text)))
                }
            },
            Filter::Integer => match &value {
                SqlValue::Null | SqlValue::I64(_) => value,
                other => other.as_i64().map(SqlValue::I64).unwrap_or(SqlValue::Null),
            },
            Filter::NullIfEmpty => match &value {
                SqlValue::Text(s) if s.trim().is_empty() => SqlValue::Null,
                SqlValue::Bytes(b) if b.is_empty() => SqlValue::Null,
                _ => value,
            },
            Filter::Trim => match value {
                SqlValue::Text(s) => {
                    let trimmed = s.trim();
                    if trimmed.len() == s.len() {
                        SqlValue::Text(s)
                    } else {
                        SqlValue::Text(trimmed.to_string())
                    }
                }
                other => other,
            },
            Filter::Timestamp => {
                let seconds = match &value {
                    SqlValue::I64(i) => Some(*i),
                    SqlValue::Text(s) => s.trim().parse::<i64>().ok(),
                    SqlValue::Decimal(_) => value.as_i64(),
                    _ => None,
                };
                match seconds.and_then(|s| DateTime::from_timestamp(s, 0)) {
                    Some(dt) => SqlValue::Text(dt.naive_utc().format(DATETIME_FORMAT).to_string()),
                    None => value,
                }
            }
            Filter::Concat { column, separator } => {
                let Some(prefix) = row.get(column).and_then(SqlValue::to_text) else {
                    return value;
                };
                let Some(text) = value.to_text() else {
                    return value;
                };
                let head = format!("{}{}", prefix, separator);
                if text.starts_with(&head) {
                    SqlValue::Text(text)
                } else {
                    SqlValue::Text(head + &text)
                }
            }
            Filter::Default(default) => {
                if value.is_null() {
                    default.clone()
                } else {
                    value
                }
            }
        }
    }

    /// Parse a filter declaration such as `trim`, `HTMLDecoder` or
    /// `concat(Salt, $)`.
    pub fn parse(declaration: &str) -> Result<Self, PorterError> {
        let declaration = declaration.trim();
        let unknown = || PorterError::UnknownFilter(declaration.to_string());

        if let Some(caps) = CALL.captures(declaration) {
            let name = caps[1].to_ascii_lowercase();
            let args = &caps[2];
            return match name.as_str() {
                "concat" => {
                    let (column, separator) = args.split_once(',').ok_or_else(unknown)?;
                    Ok(Filter::Concat {
                        column: column.trim().to_string(),
                        separator: unquote(separator.trim()).to_string(),
                    })
                }
                "default" => Ok(Filter::Default(literal(args.trim()))),
                _ => Err(unknown()),
            };
        }

        match declaration.to_ascii_lowercase().as_str() {
            "htmldecode" | "htmldecoder" => Ok(Filter::HtmlDecode),
            "bool" | "boolean" => Ok(Filter::Bool),
            "integer" | "int" => Ok(Filter::Integer),
            "nullifempty" => Ok(Filter::NullIfEmpty),
            "trim" => Ok(Filter::Trim),
            "timestamp" | "timestamptodate" => Ok(Filter::Timestamp),
            _ => Err(unknown()),
        }
    }
}

impl FromStr for Filter {
    type Err = PorterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::HtmlDecode => f.write_str("htmlDecode"),
            Filter::Bool => f.write_str("bool"),
            Filter::Integer => f.write_str("integer"),
            Filter::NullIfEmpty => f.write_str("nullIfEmpty"),
            Filter::Trim => f.write_str("trim"),
            Filter::Timestamp => f.write_str("timestamp"),
            Filter::Concat { column, separator } => write!(f, "concat({}, '{}')", column, separator),
            Filter::Default(value) => write!(f, "default({})", value),
        }
    }
}

/// Apply a chain of filters in declared order.
pub fn apply_chain(filters: &[Filter], value: SqlValue, row: &Row) -> SqlValue {
    filters.iter().fold(value, |v, filter| filter.apply(v, row))
}

fn is_truthy(text: &str) -> bool {
    match text.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "on" | "t" => true,
        other => other.parse::<f64>().map(|n| n != 0.0).unwrap_or(false),
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| s.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .unwrap_or(s)
}

fn literal(s: &str) -> SqlValue {
    if s.eq_ignore_ascii_case("null") {
        return SqlValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return SqlValue::I64(i);
    }
    SqlValue::Text(unquote(s).to_string())
}

/// Decode HTML entities until the text stops changing.
///
/// Every decoded entity is shorter than its encoding, so the loop ends.
pub fn html_decode(text: &str) -> String {
    let mut current = Cow::Borrowed(text);
    loop {
        let next = HTML_ENTITY.replace_all(&current, |caps: &Captures| {
            decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        });
        if next == current {
            return current.into_owned();
        }
        current = Cow::Owned(next.into_owned());
    }
}

fn decode_entity(entity: &str) -> Option<String> {
    if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32).map(String::from);
    }
    if let Some(dec) = entity.strip_prefix('#') {
        return dec.parse::<u32>().ok().and_then(char::from_u32).map(String::from);
    }
    let decoded = match entity {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{a0}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "hellip" => "\u{2026}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        _ => return None,
    };
    Some(decoded.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_row() -> Row {
        Row::from_pairs(Vec::<(String, SqlValue)>::new())
    }

    #[test]
    fn test_parse_names_and_calls() {
        assert_eq!(Filter::parse("HTMLDecoder").unwrap(), Filter::HtmlDecode);
        assert_eq!(Filter::parse("nullIfEmpty").unwrap(), Filter::NullIfEmpty);
        assert_eq!(
            Filter::parse("concat(Salt, '$')").unwrap(),
            Filter::Concat {
                column: "Salt".into(),
                separator: "$".into()
            }
        );
        assert_eq!(Filter::parse("default(0)").unwrap(), Filter::Default(SqlValue::I64(0)));
        assert!(matches!(
            Filter::parse("rot13"),
            Err(PorterError::UnknownFilter(name)) if name == "rot13"
        ));
    }

    #[test]
    fn test_html_decode_nested() {
        assert_eq!(html_decode("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(html_decode("&amp;lt;b&amp;gt;"), "<b>");
        assert_eq!(
            html_decode("&amp;amp;amp;amp;amp;lt;b&amp;amp;amp;amp;amp;gt;"),
            "<b>"
        );
        assert_eq!(html_decode("&#65;&#x42;"), "AB");
        assert_eq!(html_decode("&unknown; stays"), "&unknown; stays");
    }

    #[test]
    fn test_bool_and_integer() {
        let row = empty_row();
        assert_eq!(Filter::Bool.apply("y".into(), &row), SqlValue::I64(1));
        assert_eq!(Filter::Bool.apply("n".into(), &row), SqlValue::I64(0));
        assert_eq!(Filter::Bool.apply(SqlValue::I64(5), &row), SqlValue::I64(1));
        assert_eq!(Filter::Integer.apply(" 12 ".into(), &row), SqlValue::I64(12));
        assert_eq!(Filter::Integer.apply("abc".into(), &row), SqlValue::Null);
    }

    #[test]
    fn test_timestamp() {
        let row = empty_row();
        assert_eq!(
            Filter::Timestamp.apply(SqlValue::I64(0), &row),
            SqlValue::from("1970-01-01 00:00:00")
        );
        assert_eq!(
            Filter::Timestamp.apply("1614834367".into(), &row),
            SqlValue::from("2021-03-04 05:06:07")
        );
    }

    #[test]
    fn test_concat_uses_row() {
        let row = Row::from_pairs([("Salt", SqlValue::from("abc"))]);
        let filter = Filter::parse("concat(Salt, '$')").unwrap();
        assert_eq!(filter.apply("hash".into(), &row), SqlValue::from("abc$hash"));
        assert_eq!(filter.apply(SqlValue::Null, &row), SqlValue::Null);
    }

    #[test]
    fn test_concat_leaves_prefixed_value() {
        let row = Row::from_pairs([("Salt", SqlValue::from("abc"))]);
        let filter = Filter::parse("concat(Salt, '$')").unwrap();
        assert_eq!(filter.apply("abc$hash".into(), &row), SqlValue::from("abc$hash"));
        assert_eq!(filter.apply("abchash".into(), &row), SqlValue::from("abc$abchash"));
    }

    #[test]
    fn test_every_filter_is_idempotent() {
        let row = Row::from_pairs([("Salt", SqlValue::from("s"))]);
        let filters = [
            Filter::HtmlDecode,
            Filter::Bool,
            Filter::Integer,
            Filter::NullIfEmpty,
            Filter::Trim,
            Filter::Timestamp,
            Filter::parse("concat(Salt, ':')").unwrap(),
            Filter::Default("none".into()),
        ];
        let inputs = [
            SqlValue::from("  &amp;amp; x "),
            SqlValue::from("&amp;amp;amp;amp;amp;lt;b&amp;amp;amp;amp;amp;gt;"),
            SqlValue::from("&amp;amp;amp;amp;amp;amp;amp;amp;quot;"),
            SqlValue::from(""),
            SqlValue::from("1614834367"),
            SqlValue::I64(7),
            SqlValue::Null,
        ];
        for filter in &filters {
            for input in &inputs {
                let once = filter.apply(input.clone(), &row);
                let twice = filter.apply(once.clone(), &row);
                assert_eq!(once, twice, "{} is not idempotent on {:?}", filter, input);
            }
        }
    }
}
