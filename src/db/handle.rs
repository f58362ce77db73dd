//! The `Db` handle: a query builder bound to a connection group.
//!
//! A `Db` is single-owner. Clause methods accumulate state on the embedded
//! [`QueryBuilder`]; the terminal calls `exec`, `fetch`, `fetch_all` and
//! `get_sql` synthesize, route, run and reset it. The transaction binding
//! survives terminal calls.
//!
//! ```ignore
//! let mut db = registry.db("db/main").await?;
//! db.select("id, name").from("users").where_("age >", 18)?.order_by("id DESC").limit(10);
//! let rows: Vec<JsonRow> = db.fetch_all().await?;
//! ```

use crate::db::executor::{self, Conn, RouteRequest, Terminal, random_replica};
use crate::db::hooks::{ExecuteEvent, HookRegistry, Target};
use crate::db::macros::{forward_to_builder, try_forward_to_builder};
use crate::db::registry::ConnectionGroup;
use crate::db::transaction::TransactionState;
use crate::error::{DbError, DbResult};
use crate::models::{Operand, Plan, Record, Statement};
use crate::query::{QueryBuilder, RenderedSql};
use sqlx::FromRow;
use sqlx::mysql::MySqlRow;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Db {
    builder: QueryBuilder,
    group: Arc<ConnectionGroup>,
    hooks: Arc<HookRegistry>,
    tx: TransactionState,
    affected_rows: u64,
    last_insert_id: u64,
}

impl Db {
    pub fn new(group: Arc<ConnectionGroup>, hooks: Arc<HookRegistry>) -> Self {
        Self {
            builder: QueryBuilder::new(),
            group,
            hooks,
            tx: TransactionState::default(),
            affected_rows: 0,
            last_insert_id: 0,
        }
    }

    pub fn group(&self) -> &Arc<ConnectionGroup> {
        &self.group
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// Clause state accumulated so far.
    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    /// Discard accumulated clause state without executing.
    pub fn reset(&mut self) -> &mut Self {
        self.builder.reset();
        self
    }

    forward_to_builder! {
        fn select(&mut self, fields: &str);
        fn select_list(&mut self, fields: impl IntoIterator<Item = impl AsRef<str>>);
        fn select_count(&mut self, field: &str);
        fn select_count_as(&mut self, field: &str, alias: &str);
        fn insert(&mut self, table: &str, record: Record);
        fn insert_batch(&mut self, table: &str, rows: &[Record]);
        fn insert_batch_chunked(&mut self, table: &str, rows: &[Record], max_rows: i64);
        fn update(&mut self, table: &str, record: Record);
        fn set_expr(&mut self, fragment: &str);
        fn replace(&mut self, table: &str, record: Record);
        fn replace_batch(&mut self, table: &str, rows: &[Record]);
        fn replace_batch_chunked(&mut self, table: &str, rows: &[Record], max_rows: i64);
        fn delete(&mut self, table: &str);
        fn sql(&mut self, text: &str, operands: Vec<Operand>);
        fn from(&mut self, table: &str);
        fn from_as(&mut self, table: &str, alias: &str);
        fn join(&mut self, table: &str, on: &str);
        fn left_join(&mut self, table: &str, on: &str);
        fn right_join(&mut self, table: &str, on: &str);
        fn distinct(&mut self);
        fn ignore(&mut self);
        fn force_master(&mut self);
        fn where_sql(&mut self, fragment: &str, operands: Vec<Operand>);
        fn having_sql(&mut self, fragment: &str, operands: Vec<Operand>);
        fn begin_where_group(&mut self);
        fn begin_or_where_group(&mut self);
        fn end_where_group(&mut self);
        fn begin_having_group(&mut self);
        fn begin_or_having_group(&mut self);
        fn end_having_group(&mut self);
        fn group_by(&mut self, fields: &str);
        fn order_by(&mut self, items: &str);
        fn limit(&mut self, count: u64);
        fn offset(&mut self, offset: u64);
        fn page(&mut self, page: i64);
        fn count(&mut self, count: u64);
    }

    try_forward_to_builder! {
        fn where_(&mut self, field: &str, value: impl Into<Operand>);
        fn where_op(&mut self, field: &str, op: &str, value: impl Into<Operand>);
        fn or_where(&mut self, field: &str, value: impl Into<Operand>);
        fn or_where_op(&mut self, field: &str, op: &str, value: impl Into<Operand>);
        fn multi_where(&mut self, conditions: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Operand>)>);
        fn multi_or_where(&mut self, conditions: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Operand>)>);
        fn having(&mut self, field: &str, value: impl Into<Operand>);
        fn having_op(&mut self, field: &str, op: &str, value: impl Into<Operand>);
        fn or_having(&mut self, field: &str, value: impl Into<Operand>);
        fn or_having_op(&mut self, field: &str, op: &str, value: impl Into<Operand>);
        fn multi_having(&mut self, conditions: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Operand>)>);
        fn multi_or_having(&mut self, conditions: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Operand>)>);
    }

    // -------------------------------------------------------------------------
    // Terminals
    // -------------------------------------------------------------------------

    /// Render the accumulated statement with literal values. Nothing is executed.
    pub fn get_sql(&mut self) -> DbResult<RenderedSql> {
        self.builder.get_sql()
    }

    /// Run the statement on the primary (or the open transaction) and return
    /// the affected row count. Batch kinds run chunk by chunk and stop at the
    /// first failure; [`Db::affected_rows`] keeps the rows accrued until then.
    pub async fn exec(&mut self) -> DbResult<u64> {
        self.affected_rows = 0;
        self.last_insert_id = 0;
        let plan = self.builder.build()?;
        let target = self.route(&plan, Terminal::Exec)?;
        let operation = plan.kind.as_str();

        for stmt in &plan.statements {
            let observed = Observed::start(&self.hooks, self.group.name(), operation, stmt, target);
            let result = match connection(&self.group, &mut self.tx, target) {
                Ok(conn) => executor::execute(conn, stmt).await,
                Err(e) => Err(e),
            };
            let done = observed.finish(result)?;
            self.affected_rows += done.rows_affected();
            if plan.captures_insert_id {
                self.last_insert_id = done.last_insert_id();
            }
        }
        Ok(self.affected_rows)
    }

    /// First row, or `None` when the statement returns no rows.
    pub async fn fetch<T>(&mut self) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
    {
        let plan = self.builder.build()?;
        let target = self.route(&plan, Terminal::Fetch)?;
        let stmt = single_statement(&plan)?;
        let observed = Observed::start(
            &self.hooks,
            self.group.name(),
            plan.kind.as_str(),
            stmt,
            target,
        );
        let result = match connection(&self.group, &mut self.tx, target) {
            Ok(conn) => executor::fetch_optional(conn, stmt).await,
            Err(e) => Err(e),
        };
        observed.finish(result)
    }

    /// All rows.
    pub async fn fetch_all<T>(&mut self) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
    {
        let plan = self.builder.build()?;
        let target = self.route(&plan, Terminal::FetchAll)?;
        let stmt = single_statement(&plan)?;
        let observed = Observed::start(
            &self.hooks,
            self.group.name(),
            plan.kind.as_str(),
            stmt,
            target,
        );
        let result = match connection(&self.group, &mut self.tx, target) {
            Ok(conn) => executor::fetch_all(conn, stmt).await,
            Err(e) => Err(e),
        };
        observed.finish(result)
    }

    /// Rows affected by the last `exec`.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Auto-increment id generated by the last insert `exec`; 0 otherwise.
    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    fn route(&self, plan: &Plan, terminal: Terminal) -> DbResult<Target> {
        let request = RouteRequest {
            kind: plan.kind,
            terminal,
            in_transaction: self.tx.is_active(),
            force_primary: plan.force_primary,
        };
        executor::route(
            self.group.name(),
            request,
            self.group.replicas().len(),
            self.group.replica_policy(),
            random_replica,
        )
    }

    // -------------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------------

    /// Open a transaction, or join the one already open.
    pub async fn begin_trans(&mut self) -> DbResult<()> {
        if self.tx.is_active() {
            self.tx.begin(self.group.primary()).await?;
            return Ok(());
        }
        let stmt = Statement::new("BEGIN", Vec::new());
        let observed =
            Observed::start(&self.hooks, self.group.name(), "begin", &stmt, Target::Primary);
        let result = self.tx.begin(self.group.primary()).await;
        observed.finish(result).map(|_| ())
    }

    /// Commit when leaving the outermost transaction; otherwise only decrement.
    /// A no-op outside a transaction.
    pub async fn commit_trans(&mut self) -> DbResult<()> {
        if self.tx.depth() != 1 {
            self.tx.commit().await?;
            return Ok(());
        }
        let stmt = Statement::new("COMMIT", Vec::new());
        let observed =
            Observed::start(&self.hooks, self.group.name(), "commit", &stmt, Target::Transaction);
        let result = self.tx.commit().await;
        observed.finish(result).map(|_| ())
    }

    /// Roll back when leaving the outermost transaction; otherwise only
    /// decrement. A no-op outside a transaction.
    pub async fn rollback_trans(&mut self) -> DbResult<()> {
        if self.tx.depth() != 1 {
            self.tx.rollback().await?;
            return Ok(());
        }
        let stmt = Statement::new("ROLLBACK", Vec::new());
        let observed =
            Observed::start(&self.hooks, self.group.name(), "rollback", &stmt, Target::Transaction);
        let result = self.tx.rollback().await;
        observed.finish(result).map(|_| ())
    }

    pub fn transaction_depth(&self) -> u32 {
        self.tx.depth()
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_active()
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("group", &self.group.name())
            .field("kind", &self.builder.kind())
            .field("transaction", &self.tx)
            .finish_non_exhaustive()
    }
}

/// Resolve a routing target to a connection. Takes the fields separately so
/// the caller can keep borrowing the hooks.
fn connection<'a>(
    group: &'a ConnectionGroup,
    tx: &'a mut TransactionState,
    target: Target,
) -> DbResult<Conn<'a>> {
    match target {
        Target::Primary => Ok(Conn::Pool(group.primary())),
        Target::Replica(index) => group
            .replica(index)
            .map(Conn::Pool)
            .ok_or_else(|| DbError::internal(format!("replica {} out of range", index))),
        Target::Transaction => tx
            .connection()
            .map(Conn::Transaction)
            .ok_or_else(|| DbError::transaction("transaction is open but no connection is bound")),
    }
}

fn single_statement(plan: &Plan) -> DbResult<&Statement> {
    match plan.statements.as_slice() {
        [stmt] => Ok(stmt),
        _ => Err(DbError::invalid_input(format!(
            "{} produced {} statements; use exec for batch writes",
            plan.kind,
            plan.statements.len()
        ))),
    }
}

/// Fires the before-hook on start and the after- or error-hook on finish.
struct Observed<'a> {
    hooks: &'a HookRegistry,
    group: &'a str,
    operation: &'a str,
    statement: &'a Statement,
    target: Target,
    started: Instant,
}

impl<'a> Observed<'a> {
    fn start(
        hooks: &'a HookRegistry,
        group: &'a str,
        operation: &'a str,
        statement: &'a Statement,
        target: Target,
    ) -> Self {
        let observed = Self {
            hooks,
            group,
            operation,
            statement,
            target,
            started: Instant::now(),
        };
        hooks.before(&observed.event(Duration::ZERO));
        observed
    }

    fn event(&self, elapsed: Duration) -> ExecuteEvent<'a> {
        ExecuteEvent {
            group: self.group,
            operation: self.operation,
            statement: self.statement,
            target: self.target,
            elapsed,
        }
    }

    fn finish<R>(self, result: DbResult<R>) -> DbResult<R> {
        let event = self.event(self.started.elapsed());
        match &result {
            Ok(_) => self.hooks.after(&event),
            Err(e) => self.hooks.error(&event, e),
        }
        result
    }
}
