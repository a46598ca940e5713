//! Filter language
//!
//! A filter key is `column` or `column.operator`; the value is the operand.
//! Filters compose with AND only. The operator set is closed: an unknown
//! suffix is rejected rather than silently treated as equality.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::store::Row;

/// Longest identifier Postgres keeps without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Invalid filter column '{0}'")]
    InvalidColumn(String),

    #[error("Unknown filter operator '{op}' in '{key}'")]
    UnknownOperator { key: String, op: String },

    #[error("Filter '{key}' expects {expected}")]
    InvalidOperand { key: String, expected: &'static str },
}

/// Comparison and containment operators, addressed by key suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    Is,
    In,
    Contains,
    ContainedBy,
}

impl FilterOp {
    pub const ALL: [FilterOp; 12] = [
        FilterOp::Eq,
        FilterOp::Neq,
        FilterOp::Gt,
        FilterOp::Gte,
        FilterOp::Lt,
        FilterOp::Lte,
        FilterOp::Like,
        FilterOp::Ilike,
        FilterOp::Is,
        FilterOp::In,
        FilterOp::Contains,
        FilterOp::ContainedBy,
    ];

    pub fn parse(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == suffix)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Like => "like",
            FilterOp::Ilike => "ilike",
            FilterOp::Is => "is",
            FilterOp::In => "in",
            FilterOp::Contains => "contains",
            FilterOp::ContainedBy => "containedBy",
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column-scoped predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: JsonValue,
}

/// Plain SQL identifier: letter or underscore, then letters, digits, underscores.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= MAX_IDENTIFIER_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Filter {
    /// Parse a single `key -> value` filter entry.
    pub fn parse(key: &str, value: JsonValue) -> Result<Self, FilterError> {
        let (column, op) = match key.split_once('.') {
            Some((column, suffix)) => {
                let op = FilterOp::parse(suffix).ok_or_else(|| FilterError::UnknownOperator {
                    key: key.to_string(),
                    op: suffix.to_string(),
                })?;
                (column, op)
            }
            None => (key, FilterOp::Eq),
        };

        if !is_identifier(column) {
            return Err(FilterError::InvalidColumn(column.to_string()));
        }

        let operand_ok = match op {
            FilterOp::In => value.is_array(),
            FilterOp::Is => matches!(value, JsonValue::Null | JsonValue::Bool(_)),
            FilterOp::Like | FilterOp::Ilike => value.is_string(),
            _ => true,
        };
        if !operand_ok {
            let expected = match op {
                FilterOp::In => "an array",
                FilterOp::Is => "null, true or false",
                _ => "a string pattern",
            };
            return Err(FilterError::InvalidOperand {
                key: key.to_string(),
                expected,
            });
        }

        Ok(Self {
            column: column.to_string(),
            op,
            value,
        })
    }

    /// Parse a whole filter mapping. Entries keep the caller's key order.
    pub fn parse_all(
        filters: serde_json::Map<String, JsonValue>,
    ) -> Result<Vec<Self>, FilterError> {
        filters
            .into_iter()
            .map(|(key, value)| Self::parse(&key, value))
            .collect()
    }

    /// Evaluate against an in-memory row, following SQL null semantics:
    /// comparisons against NULL are never true.
    pub fn matches(&self, row: &Row) -> bool {
        let actual = row.get(&self.column).unwrap_or(&JsonValue::Null);
        match self.op {
            FilterOp::Eq => sql_eq(actual, &self.value) == Some(true),
            FilterOp::Neq => sql_eq(actual, &self.value) == Some(false),
            FilterOp::Gt => compare_values(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => compare_values(actual, &self.value) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Like => like_match(actual, &self.value, false),
            FilterOp::Ilike => like_match(actual, &self.value, true),
            FilterOp::Is => match &self.value {
                JsonValue::Null => actual.is_null(),
                other => actual == other,
            },
            FilterOp::In => self
                .value
                .as_array()
                .map(|items| items.iter().any(|v| sql_eq(actual, v) == Some(true)))
                .unwrap_or(false),
            FilterOp::Contains => !actual.is_null() && json_contains(actual, &self.value),
            FilterOp::ContainedBy => !actual.is_null() && json_contains(&self.value, actual),
        }
    }
}

fn sql_eq(a: &JsonValue, b: &JsonValue) -> Option<bool> {
    match (a, b) {
        (JsonValue::Null, _) | (_, JsonValue::Null) => None,
        (JsonValue::Number(x), JsonValue::Number(y)) => Some(x.as_f64() == y.as_f64()),
        _ => Some(a == b),
    }
}

/// Ordering between two scalar JSON values of the same kind. Nulls and
/// mismatched kinds are incomparable.
pub fn compare_values(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn like_match(actual: &JsonValue, pattern: &JsonValue, case_insensitive: bool) -> bool {
    let text = match actual {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        _ => return false,
    };
    let Some(pattern) = pattern.as_str() else {
        return false;
    };
    like_regex(pattern, case_insensitive)
        .map(|re| re.is_match(&text))
        .unwrap_or(false)
}

/// Translate a SQL LIKE pattern (`%`, `_`, backslash escape) to an anchored regex.
fn like_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let mut source = String::from(if case_insensitive { "(?is)^" } else { "(?s)^" });
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    source.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source)
}

/// jsonb-style containment: does `container` contain `contained`?
fn json_contains(container: &JsonValue, contained: &JsonValue) -> bool {
    match (container, contained) {
        (JsonValue::Array(outer), JsonValue::Array(inner)) => inner
            .iter()
            .all(|needle| outer.iter().any(|hay| json_contains(hay, needle))),
        (JsonValue::Object(outer), JsonValue::Object(inner)) => {
            inner.iter().all(|(key, needle)| {
                outer
                    .get(key)
                    .map(|hay| json_contains(hay, needle))
                    .unwrap_or(false)
            })
        }
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        _ => container == contained,
    }
}
