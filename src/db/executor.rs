//! Statement execution and read/write routing.
//!
//! Routing decides which connection a statement runs on; the run functions
//! bind parameters and execute on either a pool or the bound transaction
//! connection.
//!
//! Statements are sent non-persistent so each prepared statement is released
//! after use instead of accumulating in the connection's statement cache.

use crate::config::ReplicaPolicy;
use crate::db::hooks::Target;
use crate::db::params::mysql_arguments;
use crate::error::{DbError, DbResult};
use crate::models::{Statement, StatementKind};
use sqlx::mysql::{MySqlConnection, MySqlQueryResult, MySqlRow};
use sqlx::{FromRow, MySqlPool};

/// Terminal call that triggered execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Exec,
    Fetch,
    FetchAll,
}

/// Inputs of the routing decision.
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest {
    pub kind: StatementKind,
    pub terminal: Terminal,
    pub in_transaction: bool,
    pub force_primary: bool,
}

impl RouteRequest {
    /// Reads of Select/SelectCount/Raw outside a transaction may use a replica.
    pub fn replica_eligible(&self) -> bool {
        self.terminal != Terminal::Exec
            && !self.kind.is_mutation()
            && !self.in_transaction
            && !self.force_primary
    }
}

/// Pick the connection for a statement. `pick` chooses a replica index in
/// `0..replicas` and is only called when there is at least one replica.
pub fn route(
    group: &str,
    request: RouteRequest,
    replicas: usize,
    policy: ReplicaPolicy,
    pick: impl FnOnce(usize) -> usize,
) -> DbResult<Target> {
    if request.in_transaction {
        return Ok(Target::Transaction);
    }
    if !request.replica_eligible() {
        return Ok(Target::Primary);
    }
    if replicas == 0 {
        return match policy {
            ReplicaPolicy::Primary => Ok(Target::Primary),
            ReplicaPolicy::Fail => Err(DbError::no_replica_available(group)),
        };
    }
    Ok(Target::Replica(pick(replicas).min(replicas - 1)))
}

/// Uniform random replica index.
pub fn random_replica(replicas: usize) -> usize {
    use rand::Rng;
    rand::thread_rng().gen_range(0..replicas)
}

/// Where to run: a pool or the connection of an open transaction.
pub(crate) enum Conn<'a> {
    Pool(&'a MySqlPool),
    Transaction(&'a mut MySqlConnection),
}

/// Refuse statements whose placeholder count does not match their parameters.
pub fn check_alignment(stmt: &Statement) -> DbResult<()> {
    if stmt.is_aligned() {
        return Ok(());
    }
    Err(DbError::invalid_input(format!(
        "statement has {} placeholders but {} parameters",
        stmt.placeholder_count(),
        stmt.params.len()
    )))
}

/// Map a driver error from a pool call; an acquire timeout reports that
/// pool's configured limit.
pub(crate) fn pool_error(pool: &MySqlPool, err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::PoolTimedOut => {
            DbError::acquire_timeout(pool.options().get_acquire_timeout())
        }
        other => other.into(),
    }
}

pub(crate) async fn execute(conn: Conn<'_>, stmt: &Statement) -> DbResult<MySqlQueryResult> {
    check_alignment(stmt)?;
    let query = sqlx::query_with(&stmt.sql, mysql_arguments(&stmt.params)?).persistent(false);
    let result = match conn {
        Conn::Pool(pool) => query
            .execute(pool)
            .await
            .map_err(|e| pool_error(pool, e))?,
        Conn::Transaction(tx) => query.execute(tx).await?,
    };
    Ok(result)
}

pub(crate) async fn fetch_optional<T>(conn: Conn<'_>, stmt: &Statement) -> DbResult<Option<T>>
where
    T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
{
    check_alignment(stmt)?;
    let query =
        sqlx::query_as_with::<_, T, _>(&stmt.sql, mysql_arguments(&stmt.params)?).persistent(false);
    let row = match conn {
        Conn::Pool(pool) => query
            .fetch_optional(pool)
            .await
            .map_err(|e| pool_error(pool, e))?,
        Conn::Transaction(tx) => query.fetch_optional(tx).await?,
    };
    Ok(row)
}

pub(crate) async fn fetch_all<T>(conn: Conn<'_>, stmt: &Statement) -> DbResult<Vec<T>>
where
    T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
{
    check_alignment(stmt)?;
    let query =
        sqlx::query_as_with::<_, T, _>(&stmt.sql, mysql_arguments(&stmt.params)?).persistent(false);
    let rows = match conn {
        Conn::Pool(pool) => query
            .fetch_all(pool)
            .await
            .map_err(|e| pool_error(pool, e))?,
        Conn::Transaction(tx) => query.fetch_all(tx).await?,
    };
    Ok(rows)
}
