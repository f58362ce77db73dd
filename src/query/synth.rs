//! Clause assembly.
//!
//! Each statement kind concatenates its clauses in a fixed order, and the
//! parameter vector follows the same order so that placeholder `i` always binds
//! parameter `i`.

use super::QueryState;
use crate::error::{DbError, DbResult};
use crate::models::{Plan, QueryParam, Statement, StatementKind};

pub(crate) fn synthesize(state: QueryState) -> DbResult<Plan> {
    let kind = state
        .kind
        .ok_or_else(|| DbError::invalid_input("no statement kind selected"))?;

    let (statements, captures_insert_id) = match kind {
        StatementKind::Select | StatementKind::SelectCount => (vec![select(&state, kind)?], false),
        StatementKind::Insert | StatementKind::Replace => (
            values(&state, kind)?.into_iter().take(1).collect(),
            kind == StatementKind::Insert,
        ),
        StatementKind::InsertBatch | StatementKind::ReplaceBatch => {
            (values(&state, kind)?, kind == StatementKind::InsertBatch)
        }
        StatementKind::Update => (vec![update(&state)?], false),
        StatementKind::Delete => (vec![delete(&state)?], false),
        StatementKind::Raw => {
            let sql = state.raw_sql.clone().unwrap_or_default();
            let is_insert = sql
                .trim_start()
                .get(..6)
                .is_some_and(|head| head.eq_ignore_ascii_case("INSERT"));
            (vec![Statement::new(sql, state.raw_params.clone())], is_insert)
        }
    };

    Ok(Plan {
        kind,
        statements,
        force_primary: state.force_primary,
        captures_insert_id,
    })
}

/// Accumulates clause texts and their parameters in lockstep.
#[derive(Default)]
struct Parts {
    sql: Vec<String>,
    params: Vec<QueryParam>,
}

impl Parts {
    fn text(&mut self, text: impl Into<String>) {
        self.sql.push(text.into());
    }

    fn clause(&mut self, text: Option<String>, params: &[QueryParam]) {
        if let Some(text) = text {
            self.sql.push(text);
            self.params.extend_from_slice(params);
        }
    }

    fn list(&mut self, keyword: &str, items: &[String]) {
        if !items.is_empty() {
            self.sql.push(format!("{} {}", keyword, items.join(",")));
        }
    }

    fn finish(self) -> Statement {
        Statement::new(self.sql.join(" "), self.params)
    }
}

fn require_table(state: &QueryState, kind: StatementKind) -> DbResult<String> {
    if state.tables.is_empty() {
        return Err(DbError::invalid_input(format!(
            "{} requires a table",
            kind.as_str()
        )));
    }
    Ok(state.tables.join(","))
}

fn select(state: &QueryState, kind: StatementKind) -> DbResult<Statement> {
    let tables = require_table(state, kind)?;
    let mut parts = Parts::default();

    match (&state.count_expr, kind) {
        (Some(expr), StatementKind::SelectCount) => parts.text(expr.clone()),
        _ => {
            let fields = if state.fields.is_empty() {
                "*".to_string()
            } else {
                state.fields.join(",")
            };
            let distinct = if state.distinct { "DISTINCT " } else { "" };
            parts.text(format!("SELECT {}{}", distinct, fields));
        }
    }
    parts.text(format!("FROM {}", tables));
    parts.sql.extend(state.joins.iter().cloned());
    parts.clause(state.where_clause.render("WHERE"), state.where_clause.params());
    parts.list("GROUP BY", &state.group_by);
    parts.clause(state.having_clause.render("HAVING"), state.having_clause.params());
    parts.list("ORDER BY", &state.order_by);
    push_limit(&mut parts, state, true);
    Ok(parts.finish())
}

fn update(state: &QueryState) -> DbResult<Statement> {
    let tables = require_table(state, StatementKind::Update)?;
    if state.set_fragments.is_empty() {
        return Err(DbError::invalid_input("update requires at least one column"));
    }
    let mut parts = Parts::default();
    parts.text(format!("UPDATE {}", tables));
    parts.sql.extend(state.joins.iter().cloned());
    parts.text(format!("SET {}", state.set_fragments.join(",")));
    parts.params.extend_from_slice(&state.set_params);
    parts.clause(state.where_clause.render("WHERE"), state.where_clause.params());
    parts.list("ORDER BY", &state.order_by);
    push_limit(&mut parts, state, false);
    Ok(parts.finish())
}

fn delete(state: &QueryState) -> DbResult<Statement> {
    let tables = require_table(state, StatementKind::Delete)?;
    let mut parts = Parts::default();
    parts.text(format!("DELETE FROM {}", tables));
    parts.clause(state.where_clause.render("WHERE"), state.where_clause.params());
    parts.list("ORDER BY", &state.order_by);
    push_limit(&mut parts, state, false);
    Ok(parts.finish())
}

/// INSERT/REPLACE statements, one per chunk of rows. An empty row set yields
/// no statements.
fn values(state: &QueryState, kind: StatementKind) -> DbResult<Vec<Statement>> {
    let table = require_table(state, kind)?;
    if state.rows.is_empty() {
        return Ok(Vec::new());
    }
    if state.columns.is_empty() {
        return Err(DbError::invalid_input(format!(
            "{} requires at least one column",
            kind.as_str()
        )));
    }

    let verb = match kind {
        StatementKind::Replace | StatementKind::ReplaceBatch => "REPLACE",
        _ if state.ignore => "INSERT IGNORE",
        _ => "INSERT",
    };
    let head = format!("{} INTO {} ({})", verb, table, state.columns.join(","));
    let tuple = format!("({})", vec!["?"; state.columns.len()].join(","));

    Ok(state
        .rows
        .chunks(state.chunk_size.max(1))
        .map(|chunk| {
            let tuples = vec![tuple.as_str(); chunk.len()].join(",");
            let params = chunk.iter().flatten().cloned().collect();
            Statement::new(format!("{} VALUES {}", head, tuples), params)
        })
        .collect())
}

/// Explicit limit/offset wins over page/count. Only SELECT may carry an offset
/// since MySQL rejects `LIMIT o,n` on UPDATE and DELETE.
fn push_limit(parts: &mut Parts, state: &QueryState, allow_offset: bool) {
    if let Some(limit) = state.limit.filter(|l| *l > 0) {
        match state.offset.filter(|_| allow_offset) {
            Some(offset) => {
                parts.text("LIMIT ?,?");
                parts.params.push(QueryParam::UInt(offset));
                parts.params.push(QueryParam::UInt(limit));
            }
            None => {
                parts.text("LIMIT ?");
                parts.params.push(QueryParam::UInt(limit));
            }
        }
        return;
    }
    if let Some(count) = state.count.filter(|c| *c > 0) {
        let page = state.page.unwrap_or(1).max(1);
        if allow_offset {
            parts.text("LIMIT ?,?");
            parts.params.push(QueryParam::UInt((page - 1).saturating_mul(count)));
            parts.params.push(QueryParam::UInt(count));
        } else {
            parts.text("LIMIT ?");
            parts.params.push(QueryParam::UInt(count));
        }
    }
}
