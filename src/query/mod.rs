//! Fluent SQL builder.
//!
//! [`QueryBuilder`] accumulates clause fragments across chained calls and
//! synthesizes parameterized statements on [`QueryBuilder::build`]. It performs
//! no I/O; [`crate::db::Db`] wraps it with routing, execution and transactions.
//!
//! - `escape`: identifier quoting and the raw-expression escape hatch
//! - `condition`: operator parsing and WHERE/HAVING accumulation
//! - `synth`: clause assembly per statement kind
//! - `render`: literal SQL for diagnostics

pub mod condition;
pub mod escape;
pub mod render;
mod synth;

use crate::error::DbResult;
use crate::models::{
    DEFAULT_BATCH_CHUNK, FALLBACK_BATCH_CHUNK, Operand, Plan, QueryParam, Record, StatementKind,
};
use condition::{ClauseBuf, Conjunction, build_condition, expand_placeholders};
use escape::{escape_field, escape_table, split_top_level};
pub use render::RenderedSql;

/// Clause state for one statement. Cleared by every terminal call.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct QueryState {
    pub kind: Option<StatementKind>,
    pub distinct: bool,
    pub ignore: bool,
    pub force_primary: bool,
    pub fields: Vec<String>,
    pub count_expr: Option<String>,
    pub tables: Vec<String>,
    pub joins: Vec<String>,
    pub where_clause: ClauseBuf,
    pub having_clause: ClauseBuf,
    pub group_by: Vec<String>,
    pub order_by: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub page: Option<u64>,
    pub count: Option<u64>,
    /// Escaped insert/replace columns.
    pub columns: Vec<String>,
    /// Insert/replace rows, one parameter per column.
    pub rows: Vec<Vec<QueryParam>>,
    pub chunk_size: usize,
    pub set_fragments: Vec<String>,
    pub set_params: Vec<QueryParam>,
    pub raw_sql: Option<String>,
    pub raw_params: Vec<QueryParam>,
}

/// Stateful, single-owner SQL builder.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    state: QueryState,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statement kind selected so far, if any.
    pub fn kind(&self) -> Option<StatementKind> {
        self.state.kind
    }

    pub fn is_force_primary(&self) -> bool {
        self.state.force_primary
    }

    /// Drop all accumulated clause state.
    pub fn reset(&mut self) {
        self.state = QueryState::default();
    }

    /// Synthesize the accumulated state into statements and reset the builder.
    ///
    /// The builder is reset even when synthesis fails.
    pub fn build(&mut self) -> DbResult<Plan> {
        let state = std::mem::take(&mut self.state);
        synth::synthesize(state)
    }

    /// Render the accumulated state as literal SQL for diagnostics. Terminal:
    /// the builder is reset and nothing is executed.
    pub fn get_sql(&mut self) -> DbResult<RenderedSql> {
        let plan = self.build()?;
        Ok(RenderedSql::from_statements(
            &plan.statements,
            plan.kind.is_batch(),
        ))
    }

    // -------------------------------------------------------------------------
    // Statement kinds
    // -------------------------------------------------------------------------

    /// `SELECT` with a comma separated field list; empty or `*` selects all.
    pub fn select(&mut self, fields: &str) -> &mut Self {
        self.state.kind = Some(StatementKind::Select);
        self.state.fields = split_top_level(fields, ',')
            .iter()
            .map(|f| escape_field(f))
            .collect();
        self
    }

    /// `SELECT` with fields given one by one; each item may itself be a comma list.
    pub fn select_list<I, S>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.state.kind = Some(StatementKind::Select);
        self.state.fields = fields
            .into_iter()
            .flat_map(|f| split_top_level(f.as_ref(), ','))
            .map(|f| escape_field(&f))
            .collect();
        self
    }

    /// `SELECT COUNT(field) AS total`.
    pub fn select_count(&mut self, field: &str) -> &mut Self {
        self.select_count_as(field, "total")
    }

    pub fn select_count_as(&mut self, field: &str, alias: &str) -> &mut Self {
        let field = field.trim();
        let field = if field.is_empty() || field == "*" {
            "*".to_string()
        } else {
            escape_field(field)
        };
        self.state.kind = Some(StatementKind::SelectCount);
        self.state.count_expr = Some(format!(
            "SELECT COUNT({}) `{}`",
            field,
            alias.trim().replace('`', "")
        ));
        self
    }

    pub fn insert(&mut self, table: &str, record: Record) -> &mut Self {
        self.set_rows(StatementKind::Insert, table, &[record], DEFAULT_BATCH_CHUNK)
    }

    /// Multi-row insert split into statements of at most 100 rows.
    pub fn insert_batch(&mut self, table: &str, rows: &[Record]) -> &mut Self {
        self.set_rows(StatementKind::InsertBatch, table, rows, DEFAULT_BATCH_CHUNK)
    }

    /// Multi-row insert with an explicit chunk size; non-positive sizes use 500.
    pub fn insert_batch_chunked(
        &mut self,
        table: &str,
        rows: &[Record],
        max_rows: i64,
    ) -> &mut Self {
        self.set_rows(StatementKind::InsertBatch, table, rows, chunk_size(max_rows))
    }

    pub fn replace(&mut self, table: &str, record: Record) -> &mut Self {
        self.set_rows(StatementKind::Replace, table, &[record], DEFAULT_BATCH_CHUNK)
    }

    pub fn replace_batch(&mut self, table: &str, rows: &[Record]) -> &mut Self {
        self.set_rows(StatementKind::ReplaceBatch, table, rows, DEFAULT_BATCH_CHUNK)
    }

    pub fn replace_batch_chunked(
        &mut self,
        table: &str,
        rows: &[Record],
        max_rows: i64,
    ) -> &mut Self {
        self.set_rows(StatementKind::ReplaceBatch, table, rows, chunk_size(max_rows))
    }

    /// Columns come from the first row; every row contributes a value for each
    /// of them (NULL when absent), so the placeholder grid stays rectangular.
    fn set_rows(
        &mut self,
        kind: StatementKind,
        table: &str,
        rows: &[Record],
        chunk: usize,
    ) -> &mut Self {
        self.state.kind = Some(kind);
        self.state.tables = vec![escape_table(table)];
        self.state.chunk_size = chunk;

        let names: Vec<String> = rows
            .first()
            .map(|r| r.columns().map(String::from).collect())
            .unwrap_or_default();
        self.state.columns = names.iter().map(|c| escape_field(c)).collect();
        self.state.rows = rows
            .iter()
            .map(|row| {
                names
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or(QueryParam::Null))
                    .collect()
            })
            .collect();
        self
    }

    /// `UPDATE table SET col = ?, ...`.
    pub fn update(&mut self, table: &str, record: Record) -> &mut Self {
        self.state.kind = Some(StatementKind::Update);
        self.state.tables = vec![escape_table(table)];
        for (column, value) in record {
            self.state
                .set_fragments
                .push(format!("{} = ?", escape_field(&column)));
            self.state.set_params.push(value);
        }
        self
    }

    /// Raw SET fragment such as `hits = hits + 1`.
    pub fn set_expr(&mut self, fragment: &str) -> &mut Self {
        let fragment = fragment.trim();
        if !fragment.is_empty() {
            self.state.set_fragments.push(fragment.to_string());
        }
        self
    }

    pub fn delete(&mut self, table: &str) -> &mut Self {
        self.state.kind = Some(StatementKind::Delete);
        self.state.tables = vec![escape_table(table)];
        self
    }

    /// Pre-built statement text with positional operands; list operands expand
    /// their `?` into one placeholder per element.
    pub fn sql(&mut self, text: &str, operands: Vec<Operand>) -> &mut Self {
        let (sql, params) = expand_placeholders(text, operands);
        self.state.kind = Some(StatementKind::Raw);
        self.state.raw_sql = Some(sql);
        self.state.raw_params = params;
        self
    }

    // -------------------------------------------------------------------------
    // Tables and modifiers
    // -------------------------------------------------------------------------

    /// Add a table to the FROM list (`name`, `name alias`, `db.name`).
    pub fn from(&mut self, table: &str) -> &mut Self {
        self.state.tables.push(escape_table(table));
        self
    }

    pub fn from_as(&mut self, table: &str, alias: &str) -> &mut Self {
        self.from(&format!("{} {}", table.trim(), alias.trim()))
    }

    pub fn join(&mut self, table: &str, on: &str) -> &mut Self {
        self.push_join("JOIN", table, on)
    }

    pub fn left_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.push_join("LEFT JOIN", table, on)
    }

    pub fn right_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.push_join("RIGHT JOIN", table, on)
    }

    fn push_join(&mut self, keyword: &str, table: &str, on: &str) -> &mut Self {
        self.state
            .joins
            .push(format!("{} {} ON {}", keyword, escape_table(table), on.trim()));
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.state.distinct = true;
        self
    }

    /// `INSERT IGNORE` for insert kinds.
    pub fn ignore(&mut self) -> &mut Self {
        self.state.ignore = true;
        self
    }

    /// Route the next statement to the primary even if it is a read.
    pub fn force_master(&mut self) -> &mut Self {
        self.state.force_primary = true;
        self
    }

    // -------------------------------------------------------------------------
    // WHERE
    // -------------------------------------------------------------------------

    /// AND condition. The operator may trail the field: `where_("age >", 18)`.
    pub fn where_(&mut self, field: &str, value: impl Into<Operand>) -> DbResult<&mut Self> {
        self.push_where(Conjunction::And, field, value.into(), None)
    }

    pub fn where_op(
        &mut self,
        field: &str,
        op: &str,
        value: impl Into<Operand>,
    ) -> DbResult<&mut Self> {
        self.push_where(Conjunction::And, field, value.into(), Some(op))
    }

    pub fn or_where(&mut self, field: &str, value: impl Into<Operand>) -> DbResult<&mut Self> {
        self.push_where(Conjunction::Or, field, value.into(), None)
    }

    pub fn or_where_op(
        &mut self,
        field: &str,
        op: &str,
        value: impl Into<Operand>,
    ) -> DbResult<&mut Self> {
        self.push_where(Conjunction::Or, field, value.into(), Some(op))
    }

    /// AND each pair in order. A NULL operand makes the key a raw condition.
    pub fn multi_where(
        &mut self,
        conditions: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Operand>)>,
    ) -> DbResult<&mut Self> {
        for (field, value) in conditions {
            match value.into() {
                Operand::Scalar(QueryParam::Null) => {
                    self.where_sql(field.as_ref(), Vec::new());
                }
                operand => {
                    self.push_where(Conjunction::And, field.as_ref(), operand, None)?;
                }
            }
        }
        Ok(self)
    }

    pub fn multi_or_where(
        &mut self,
        conditions: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Operand>)>,
    ) -> DbResult<&mut Self> {
        for (field, value) in conditions {
            self.push_where(Conjunction::Or, field.as_ref(), value.into(), None)?;
        }
        Ok(self)
    }

    /// Raw WHERE fragment joined with AND.
    pub fn where_sql(&mut self, fragment: &str, operands: Vec<Operand>) -> &mut Self {
        let (sql, params) = expand_placeholders(fragment.trim(), operands);
        self.state
            .where_clause
            .push(Conjunction::And, &sql, params);
        self
    }

    pub fn begin_where_group(&mut self) -> &mut Self {
        self.state.where_clause.open_group(Conjunction::And);
        self
    }

    pub fn begin_or_where_group(&mut self) -> &mut Self {
        self.state.where_clause.open_group(Conjunction::Or);
        self
    }

    pub fn end_where_group(&mut self) -> &mut Self {
        self.state.where_clause.close_group();
        self
    }

    /// A rejected condition discards the whole statement under construction.
    fn push_where(
        &mut self,
        conj: Conjunction,
        field: &str,
        operand: Operand,
        op: Option<&str>,
    ) -> DbResult<&mut Self> {
        match build_condition(field, operand, op) {
            Ok((sql, params)) => {
                self.state.where_clause.push(conj, &sql, params);
                Ok(self)
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    // -------------------------------------------------------------------------
    // HAVING
    // -------------------------------------------------------------------------

    pub fn having(&mut self, field: &str, value: impl Into<Operand>) -> DbResult<&mut Self> {
        self.push_having(Conjunction::And, field, value.into(), None)
    }

    pub fn having_op(
        &mut self,
        field: &str,
        op: &str,
        value: impl Into<Operand>,
    ) -> DbResult<&mut Self> {
        self.push_having(Conjunction::And, field, value.into(), Some(op))
    }

    pub fn or_having(&mut self, field: &str, value: impl Into<Operand>) -> DbResult<&mut Self> {
        self.push_having(Conjunction::Or, field, value.into(), None)
    }

    pub fn or_having_op(
        &mut self,
        field: &str,
        op: &str,
        value: impl Into<Operand>,
    ) -> DbResult<&mut Self> {
        self.push_having(Conjunction::Or, field, value.into(), Some(op))
    }

    pub fn multi_having(
        &mut self,
        conditions: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Operand>)>,
    ) -> DbResult<&mut Self> {
        for (field, value) in conditions {
            self.push_having(Conjunction::And, field.as_ref(), value.into(), None)?;
        }
        Ok(self)
    }

    pub fn multi_or_having(
        &mut self,
        conditions: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Operand>)>,
    ) -> DbResult<&mut Self> {
        for (field, value) in conditions {
            self.push_having(Conjunction::Or, field.as_ref(), value.into(), None)?;
        }
        Ok(self)
    }

    pub fn having_sql(&mut self, fragment: &str, operands: Vec<Operand>) -> &mut Self {
        let (sql, params) = expand_placeholders(fragment.trim(), operands);
        self.state
            .having_clause
            .push(Conjunction::And, &sql, params);
        self
    }

    pub fn begin_having_group(&mut self) -> &mut Self {
        self.state.having_clause.open_group(Conjunction::And);
        self
    }

    pub fn begin_or_having_group(&mut self) -> &mut Self {
        self.state.having_clause.open_group(Conjunction::Or);
        self
    }

    pub fn end_having_group(&mut self) -> &mut Self {
        self.state.having_clause.close_group();
        self
    }

    fn push_having(
        &mut self,
        conj: Conjunction,
        field: &str,
        operand: Operand,
        op: Option<&str>,
    ) -> DbResult<&mut Self> {
        match build_condition(field, operand, op) {
            Ok((sql, params)) => {
                self.state.having_clause.push(conj, &sql, params);
                Ok(self)
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Grouping, ordering, pagination
    // -------------------------------------------------------------------------

    /// Comma separated GROUP BY fields.
    pub fn group_by(&mut self, fields: &str) -> &mut Self {
        self.state.group_by.extend(
            split_top_level(fields, ',')
                .iter()
                .map(|f| escape_field(f)),
        );
        self
    }

    /// Comma separated ORDER BY items, each optionally followed by ASC/DESC.
    pub fn order_by(&mut self, items: &str) -> &mut Self {
        for item in split_top_level(items, ',') {
            self.state.order_by.push(order_item(&item));
        }
        self
    }

    /// Row limit; 0 means no limit.
    pub fn limit(&mut self, count: u64) -> &mut Self {
        self.state.limit = Some(count);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.state.offset = Some(offset);
        self
    }

    /// 1-based page number; values <= 1 mean the first page.
    pub fn page(&mut self, page: i64) -> &mut Self {
        self.state.page = Some(page.max(1) as u64);
        self
    }

    /// Rows per page.
    pub fn count(&mut self, count: u64) -> &mut Self {
        self.state.count = Some(count);
        self
    }
}

fn chunk_size(max_rows: i64) -> usize {
    if max_rows <= 0 {
        FALLBACK_BATCH_CHUNK
    } else {
        max_rows as usize
    }
}

fn order_item(item: &str) -> String {
    let item = item.trim();
    if let Some((field, dir)) = item.rsplit_once(char::is_whitespace) {
        let dir = dir.to_ascii_uppercase();
        if dir == "DESC" || dir == "ASC" {
            return format!("{} {}", escape_field(field), dir);
        }
    }
    escape_field(item)
}
