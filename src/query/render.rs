//! Literal SQL rendering for logs and audits.
//!
//! The output interleaves the statement text with escaped literal values. It is
//! only ever used for diagnostics; execution always binds parameters.

use crate::models::{QueryParam, Statement};
use std::fmt;

/// Backslash-escape `\`, `'` and `"`.
pub fn add_slashes(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    for ch in input.chars() {
        if matches!(ch, '\\' | '\'' | '"') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Literal text for one parameter.
pub fn literal(param: &QueryParam) -> String {
    match param {
        QueryParam::Null => "NULL".to_string(),
        QueryParam::Bool(true) => "1".to_string(),
        QueryParam::Bool(false) => "0".to_string(),
        QueryParam::Int(v) => v.to_string(),
        QueryParam::UInt(v) => v.to_string(),
        QueryParam::Float(v) => v.to_string(),
        QueryParam::String(s) => format!("'{}'", add_slashes(s)),
    }
}

/// Substitute each `?` with the literal of the matching parameter.
///
/// A mismatch degrades the text only: surplus placeholders stay as `?`,
/// surplus parameters are ignored.
pub fn render_statement(stmt: &Statement) -> String {
    let mut out = String::with_capacity(stmt.sql.len() + stmt.params.len() * 4);
    let mut params = stmt.params.iter();
    for ch in stmt.sql.chars() {
        if ch == '?' {
            match params.next() {
                Some(p) => out.push_str(&literal(p)),
                None => out.push('?'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Rendered form of a terminal call: batch kinds render one string per chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedSql {
    Single(String),
    Batch(Vec<String>),
}

impl RenderedSql {
    pub fn from_statements(statements: &[Statement], batch: bool) -> Self {
        if batch {
            RenderedSql::Batch(statements.iter().map(render_statement).collect())
        } else {
            RenderedSql::Single(
                statements
                    .first()
                    .map(render_statement)
                    .unwrap_or_default(),
            )
        }
    }

    /// All rendered strings, in execution order.
    pub fn statements(&self) -> Vec<&str> {
        match self {
            RenderedSql::Single(s) => vec![s.as_str()],
            RenderedSql::Batch(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for RenderedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderedSql::Single(s) => f.write_str(s),
            RenderedSql::Batch(v) => f.write_str(&v.join(";\n")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_slashes() {
        assert_eq!(add_slashes(r#"O'Brien"#), r#"O\'Brien"#);
        assert_eq!(add_slashes(r#"a\b"c"#), r#"a\\b\"c"#);
    }

    #[test]
    fn test_literals() {
        assert_eq!(literal(&QueryParam::Bool(true)), "1");
        assert_eq!(literal(&QueryParam::Bool(false)), "0");
        assert_eq!(literal(&QueryParam::Int(-4)), "-4");
        assert_eq!(literal(&QueryParam::Float(2.5)), "2.5");
        assert_eq!(literal(&QueryParam::Null), "NULL");
        assert_eq!(literal(&QueryParam::from("x")), "'x'");
    }

    #[test]
    fn test_render_statement() {
        let stmt = Statement::new(
            "SELECT * FROM `t` WHERE `a` IN (?,?) AND `b` = ?",
            vec![1.into(), 2.into(), "it's".into()],
        );
        assert_eq!(
            render_statement(&stmt),
            r#"SELECT * FROM `t` WHERE `a` IN (1,2) AND `b` = 'it\'s'"#
        );
    }

    #[test]
    fn test_render_mismatch_degrades() {
        let short = Statement::new("SELECT ?, ?", vec![1.into()]);
        assert_eq!(render_statement(&short), "SELECT 1, ?");
        let long = Statement::new("SELECT ?", vec![1.into(), 2.into()]);
        assert_eq!(render_statement(&long), "SELECT 1");
    }

    #[test]
    fn test_rendered_batch_display() {
        let rendered = RenderedSql::Batch(vec!["A".into(), "B".into()]);
        assert_eq!(rendered.to_string(), "A;\nB");
        assert_eq!(rendered.statements(), vec!["A", "B"]);
    }
}
