//! Query-related data models.
//!
//! This module defines the bound parameter types, the column records used by
//! insert/update/replace, and the synthesized statements handed to the executor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of rows per statement for batch insert/replace.
pub const DEFAULT_BATCH_CHUNK: usize = 100;

/// Chunk size used when a caller supplies a non-positive override.
pub const FALLBACK_BATCH_CHUNK: usize = 500;

/// A single bound parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Signed integer value (stored as i64 for maximum range)
    Int(i64),
    /// Unsigned integer value (BIGINT UNSIGNED ids, offsets)
    UInt(u64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }

    /// Parse a command-line style literal: `null`, `true`/`false`, integers,
    /// floats, and everything else as a string.
    pub fn parse_literal(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("null") {
            return Self::Null;
        }
        if raw.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        if let Ok(v) = raw.parse::<i64>() {
            return Self::Int(v);
        }
        if let Ok(v) = raw.parse::<u64>() {
            return Self::UInt(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            if v.is_finite() {
                return Self::Float(v);
            }
        }
        Self::String(raw.to_string())
    }
}

macro_rules! param_from {
    ($($ty:ty => $variant:ident as $cast:ty),+ $(,)?) => {
        $(
            impl From<$ty> for QueryParam {
                fn from(v: $ty) -> Self {
                    QueryParam::$variant(v as $cast)
                }
            }
        )+
    };
}

param_from! {
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    isize => Int as i64,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    usize => UInt as u64,
    f32 => Float as f64,
    f64 => Float as f64,
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        QueryParam::Bool(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        QueryParam::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        QueryParam::String(v)
    }
}

impl From<&String> for QueryParam {
    fn from(v: &String) -> Self {
        QueryParam::String(v.clone())
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(QueryParam::Null)
    }
}

/// Right-hand side of a condition or a positional argument of a raw fragment.
///
/// `List` is the array shape: it drives `IN`/`NOT IN` and expands a single `?`
/// into one placeholder per element.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(QueryParam),
    List(Vec<QueryParam>),
}

impl Operand {
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Number of placeholders this operand occupies once expanded.
    pub fn placeholder_count(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::List(items) => items.len(),
        }
    }

    pub(crate) fn into_params(self) -> Vec<QueryParam> {
        match self {
            Self::Scalar(p) => vec![p],
            Self::List(items) => items,
        }
    }
}

macro_rules! scalar_operand_from {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(v: $ty) -> Self {
                    Operand::Scalar(v.into())
                }
            }
        )+
    };
}

scalar_operand_from!(
    QueryParam, bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, &str,
    String, &String,
);

impl<T: Into<QueryParam>> From<Option<T>> for Operand {
    fn from(v: Option<T>) -> Self {
        Operand::Scalar(v.into())
    }
}

impl<T: Into<QueryParam>> From<Vec<T>> for Operand {
    fn from(v: Vec<T>) -> Self {
        Operand::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<QueryParam>, const N: usize> From<[T; N]> for Operand {
    fn from(v: [T; N]) -> Self {
        Operand::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<QueryParam> + Clone> From<&[T]> for Operand {
    fn from(v: &[T]) -> Self {
        Operand::List(v.iter().cloned().map(Into::into).collect())
    }
}

/// Ordered column/value map for insert, update and replace.
///
/// Column order is insertion order so synthesized SQL is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<(String, QueryParam)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing an earlier value for the same column.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<QueryParam>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Builder-style [`Record::set`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&QueryParam> {
        self.columns
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryParam)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<QueryParam>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, QueryParam);
    type IntoIter = std::vec::IntoIter<(String, QueryParam)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// Statement kinds the builder can synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    SelectCount,
    Insert,
    InsertBatch,
    Update,
    Replace,
    ReplaceBatch,
    Delete,
    Raw,
}

impl StatementKind {
    /// Whether statements of this kind modify data.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Select | Self::SelectCount | Self::Raw)
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Self::InsertBatch | Self::ReplaceBatch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::SelectCount => "select_count",
            Self::Insert => "insert",
            Self::InsertBatch => "insert_batch",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::ReplaceBatch => "replace_batch",
            Self::Delete => "delete",
            Self::Raw => "raw",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<QueryParam>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<QueryParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Count of `?` placeholders in the SQL text.
    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }

    /// True when every placeholder has exactly one parameter.
    pub fn is_aligned(&self) -> bool {
        self.placeholder_count() == self.params.len()
    }
}

/// Result of synthesizing the builder state: the kind plus one statement per
/// SQL text (batch kinds yield one per chunk).
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub kind: StatementKind,
    pub statements: Vec<Statement>,
    pub force_primary: bool,
    /// Set for inserts (including raw `INSERT ...`) so the last insert id is captured.
    pub captures_insert_id: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::Int(42).type_name(), "int");
        assert_eq!(QueryParam::from("hello").type_name(), "string");
        assert_eq!(QueryParam::from(7u32), QueryParam::UInt(7));
        assert_eq!(QueryParam::from(None::<i32>), QueryParam::Null);
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(QueryParam::parse_literal("NULL"), QueryParam::Null);
        assert_eq!(QueryParam::parse_literal("true"), QueryParam::Bool(true));
        assert_eq!(QueryParam::parse_literal("-3"), QueryParam::Int(-3));
        assert_eq!(
            QueryParam::parse_literal("18446744073709551615"),
            QueryParam::UInt(u64::MAX)
        );
        assert_eq!(QueryParam::parse_literal("1.5"), QueryParam::Float(1.5));
        assert_eq!(
            QueryParam::parse_literal("O'Brien"),
            QueryParam::String("O'Brien".to_string())
        );
    }

    #[test]
    fn test_operand_shapes() {
        let list: Operand = vec![18, 19, 20].into();
        assert!(list.is_list());
        assert_eq!(list.placeholder_count(), 3);

        let scalar: Operand = 18.into();
        assert!(!scalar.is_list());
        assert_eq!(scalar.into_params(), vec![QueryParam::Int(18)]);

        let from_array: Operand = ["a", "b"].into();
        assert_eq!(from_array.placeholder_count(), 2);
    }

    #[test]
    fn test_record_keeps_insertion_order_and_overwrites() {
        let mut record = Record::new().with("name", "alice").with("age", 30);
        record.set("name", "bob");
        let columns: Vec<&str> = record.columns().collect();
        assert_eq!(columns, vec!["name", "age"]);
        assert_eq!(record.get("name"), Some(&QueryParam::from("bob")));
        assert!(!record.contains("missing"));
    }

    #[test]
    fn test_statement_alignment() {
        let stmt = Statement::new(
            "SELECT * FROM `t` WHERE `a` = ? LIMIT ?",
            vec![QueryParam::Int(1), QueryParam::UInt(10)],
        );
        assert!(stmt.is_aligned());
        let bad = Statement::new("SELECT ?", vec![]);
        assert!(!bad.is_aligned());
    }

    #[test]
    fn test_statement_kind_classification() {
        assert!(StatementKind::Insert.is_mutation());
        assert!(StatementKind::Delete.is_mutation());
        assert!(!StatementKind::Select.is_mutation());
        assert!(!StatementKind::Raw.is_mutation());
        assert!(StatementKind::ReplaceBatch.is_batch());
        assert_eq!(StatementKind::SelectCount.to_string(), "select_count");
    }
}
