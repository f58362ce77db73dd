//! WHERE / HAVING condition construction.
//!
//! A condition is a field, an operator and an operand. The operator is either
//! given explicitly or parsed from trailing text in the field (`"age >"`).
//! Invalid operator/operand combinations are rejected here, when the condition
//! is added, never at execution time.

use crate::error::{DbError, DbResult};
use crate::models::{Operand, QueryParam};
use crate::query::escape::escape_field;
use std::fmt;
use std::str::FromStr;

/// Comparison operators accepted in conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    LtGt,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
    IsNull,
    IsNotNull,
    In,
    NotIn,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::LtGt => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
        }
    }

    /// Operators that take a list operand.
    pub fn takes_list(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Operators that take no operand at all.
    pub fn is_unary(&self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Operator {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        let op = match normalized.as_str() {
            "=" => Self::Eq,
            "!=" => Self::NotEq,
            "<>" => Self::LtGt,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "<" => Self::Lt,
            "<=" => Self::Le,
            "LIKE" => Self::Like,
            "NOT LIKE" => Self::NotLike,
            "IS NULL" => Self::IsNull,
            "IS NOT NULL" => Self::IsNotNull,
            "IN" => Self::In,
            "NOT IN" => Self::NotIn,
            _ => {
                return Err(DbError::unsupported_operator(
                    s.trim(),
                    "operator is not recognised",
                ));
            }
        };
        Ok(op)
    }
}

/// Split `"age >"` into `("age", Some(">"))`. An explicit operator wins over
/// trailing text.
fn split_field<'a>(field: &'a str, explicit: Option<&'a str>) -> (&'a str, Option<&'a str>) {
    let field = field.trim();
    if let Some(op) = explicit.filter(|op| !op.trim().is_empty()) {
        return (field, Some(op));
    }
    match field.split_once(' ') {
        Some((name, op)) if !name.is_empty() => (name, Some(op.trim())),
        _ => (field, None),
    }
}

/// Build a single condition fragment and its parameters.
pub fn build_condition(
    field: &str,
    operand: Operand,
    explicit_op: Option<&str>,
) -> DbResult<(String, Vec<QueryParam>)> {
    let (name, op_text) = split_field(field, explicit_op);
    let column = escape_field(name);
    let op = op_text.map(str::parse::<Operator>).transpose()?;

    match operand {
        Operand::List(items) => {
            let op = op.unwrap_or(Operator::In);
            if !op.takes_list() {
                return Err(DbError::unsupported_operator(
                    op.as_sql(),
                    "a list value only supports IN and NOT IN",
                ));
            }
            if items.is_empty() {
                // IN () is a syntax error in MySQL; keep the boolean meaning instead.
                let always = if op == Operator::In { "0 = 1" } else { "1 = 1" };
                return Ok((always.to_string(), Vec::new()));
            }
            let marks = vec!["?"; items.len()].join(",");
            Ok((format!("{} {} ({})", column, op.as_sql(), marks), items))
        }
        Operand::Scalar(value) => {
            let op = op.unwrap_or(Operator::Eq);
            if op.takes_list() {
                return Err(DbError::unsupported_operator(
                    op.as_sql(),
                    "IN and NOT IN require a list value",
                ));
            }
            if op.is_unary() {
                return Ok((format!("{} {}", column, op.as_sql()), Vec::new()));
            }
            Ok((format!("{} {} ?", column, op.as_sql()), vec![value]))
        }
    }
}

/// How a condition attaches to what is already in the clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

/// Accumulated WHERE or HAVING text (without the keyword) and its parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClauseBuf {
    sql: String,
    params: Vec<QueryParam>,
}

impl ClauseBuf {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }

    /// Append a fragment. Right after an opening parenthesis no conjunction is
    /// inserted, which is what makes explicit grouping work.
    pub fn push(&mut self, conj: Conjunction, fragment: &str, params: Vec<QueryParam>) {
        if !self.sql.is_empty() && !self.sql.ends_with('(') {
            self.sql.push_str(conj.as_sql());
        }
        self.sql.push_str(fragment);
        self.params.extend(params);
    }

    pub fn open_group(&mut self, conj: Conjunction) {
        if !self.sql.is_empty() && !self.sql.ends_with('(') {
            self.sql.push_str(conj.as_sql());
        }
        self.sql.push('(');
    }

    pub fn close_group(&mut self) {
        if !self.sql.is_empty() {
            self.sql.push(')');
        }
    }

    /// Render with the leading keyword, or `None` when empty.
    pub fn render(&self, keyword: &str) -> Option<String> {
        if self.sql.is_empty() {
            None
        } else {
            Some(format!("{} {}", keyword, self.sql))
        }
    }
}

/// Expand each `?` in a raw fragment by its operand: list operands become one
/// placeholder per element. Extra operands are appended to the parameters;
/// missing ones leave their `?` in place so the executor's alignment check
/// reports the mismatch.
///
/// An empty list expands to `NULL` so `IN (?)` stays valid SQL and matches no
/// row. `NOT IN (NULL)` matches no row either; use `where_` with an operator
/// for the `1 = 1` rewrite.
pub fn expand_placeholders(sql: &str, operands: Vec<Operand>) -> (String, Vec<QueryParam>) {
    let mut out = String::with_capacity(sql.len());
    let mut params = Vec::new();
    let mut operands = operands.into_iter();

    for ch in sql.chars() {
        if ch != '?' {
            out.push(ch);
            continue;
        }
        match operands.next() {
            Some(Operand::List(items)) if items.is_empty() => out.push_str("NULL"),
            Some(Operand::List(items)) => {
                out.push_str(&vec!["?"; items.len()].join(","));
                params.extend(items);
            }
            Some(Operand::Scalar(p)) => {
                out.push('?');
                params.push(p);
            }
            None => out.push('?'),
        }
    }
    for rest in operands {
        params.extend(rest.into_params());
    }
    (out, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(v: &[i64]) -> Vec<QueryParam> {
        v.iter().map(|i| QueryParam::Int(*i)).collect()
    }

    #[test]
    fn test_list_defaults_to_in() {
        let (sql, params) = build_condition("age", vec![18, 19, 20].into(), None).unwrap();
        assert_eq!(sql, "`age` IN (?,?,?)");
        assert_eq!(params, ints(&[18, 19, 20]));
    }

    #[test]
    fn test_operator_parsed_from_field() {
        let (sql, params) = build_condition("age >", 18.into(), None).unwrap();
        assert_eq!(sql, "`age` > ?");
        assert_eq!(params, ints(&[18]));
    }

    #[test]
    fn test_operator_case_and_spacing_normalized() {
        let (sql, _) = build_condition("name  not   like", "a%".into(), None).unwrap();
        assert_eq!(sql, "`name` NOT LIKE ?");
    }

    #[test]
    fn test_explicit_operator() {
        let (sql, params) = build_condition("id", vec![1, 2].into(), Some("not in")).unwrap();
        assert_eq!(sql, "`id` NOT IN (?,?)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_is_null_has_no_params() {
        let (sql, params) =
            build_condition("deleted_at IS NULL", QueryParam::Null.into(), None).unwrap();
        assert_eq!(sql, "`deleted_at` IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_list_with_scalar_operator_rejected() {
        let err = build_condition("age >", vec![1, 2].into(), None).unwrap_err();
        assert!(matches!(err, DbError::UnsupportedOperator { .. }));
    }

    #[test]
    fn test_scalar_with_in_rejected() {
        let err = build_condition("age", 1.into(), Some("IN")).unwrap_err();
        assert!(matches!(err, DbError::UnsupportedOperator { .. }));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = build_condition("age BETWEEN", 1.into(), None).unwrap_err();
        match err {
            DbError::UnsupportedOperator { operator, .. } => assert_eq!(operator, "BETWEEN"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_list_keeps_boolean_meaning() {
        let (sql, params) = build_condition("id", Vec::<i64>::new().into(), None).unwrap();
        assert_eq!(sql, "0 = 1");
        assert!(params.is_empty());
        let (sql, _) = build_condition("id", Vec::<i64>::new().into(), Some("NOT IN")).unwrap();
        assert_eq!(sql, "1 = 1");
    }

    #[test]
    fn test_clause_grouping() {
        let mut clause = ClauseBuf::default();
        clause.push(Conjunction::And, "`x` = ?", ints(&[0]));
        clause.open_group(Conjunction::And);
        clause.push(Conjunction::And, "`a` = ?", ints(&[1]));
        clause.push(Conjunction::Or, "`b` = ?", ints(&[2]));
        clause.close_group();
        assert_eq!(
            clause.render("WHERE").unwrap(),
            "WHERE `x` = ? AND (`a` = ? OR `b` = ?)"
        );
        assert_eq!(clause.params(), ints(&[0, 1, 2]).as_slice());
    }

    #[test]
    fn test_close_group_on_empty_clause_is_noop() {
        let mut clause = ClauseBuf::default();
        clause.close_group();
        assert!(clause.is_empty());
        assert_eq!(clause.render("HAVING"), None);
    }

    #[test]
    fn test_expand_placeholders_empty_list() {
        let (sql, params) = expand_placeholders(
            "id IN (?) AND kind = ?",
            vec![Operand::List(Vec::new()), "a".into()],
        );
        assert_eq!(sql, "id IN (NULL) AND kind = ?");
        assert_eq!(params, vec![QueryParam::from("a")]);
    }

    #[test]
    fn test_expand_placeholders_with_lists() {
        let (sql, params) = expand_placeholders(
            "`id` IN (?) AND `status` = ?",
            vec![vec![1, 2, 3].into(), "on".into()],
        );
        assert_eq!(sql, "`id` IN (?,?,?) AND `status` = ?");
        assert_eq!(params.len(), 4);
    }
}
