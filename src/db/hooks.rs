//! Execution hooks.
//!
//! Every statement the executor runs passes through three callbacks: `before`
//! fires prior to execution, `after` fires on success with the elapsed time,
//! and `error` fires on failure. The defaults are the crate's logging path for
//! execution: a slow-query warning and an error log carrying the rendered SQL.
//! Each callback can be replaced at runtime and restored with
//! [`HookRegistry::reset`].

use crate::config::DEFAULT_SLOW_QUERY_MS;
use crate::error::DbError;
use crate::models::Statement;
use crate::query::render::render_statement;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Where a statement ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Primary,
    Replica(usize),
    Transaction,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Replica(i) => write!(f, "replica[{}]", i),
            Self::Transaction => write!(f, "transaction"),
        }
    }
}

/// What the hooks see for one statement.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteEvent<'a> {
    pub group: &'a str,
    /// Statement kind (`select`, `insert_batch`, ...) or `begin`/`commit`/`rollback`.
    pub operation: &'a str,
    pub statement: &'a Statement,
    pub target: Target,
    /// Zero for `before`.
    pub elapsed: Duration,
}

impl ExecuteEvent<'_> {
    /// The statement with literal values substituted, for logs.
    pub fn rendered_sql(&self) -> String {
        render_statement(self.statement)
    }
}

pub type BeforeHook = Arc<dyn Fn(&ExecuteEvent<'_>) + Send + Sync>;
pub type AfterHook = Arc<dyn Fn(&ExecuteEvent<'_>) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&ExecuteEvent<'_>, &DbError) + Send + Sync>;

/// Shared, overridable execution callbacks.
pub struct HookRegistry {
    slow_query: Duration,
    before: RwLock<BeforeHook>,
    after: RwLock<AfterHook>,
    error: RwLock<ErrorHook>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::with_slow_query_threshold(Duration::from_millis(DEFAULT_SLOW_QUERY_MS))
    }

    /// Defaults with a custom slow-query threshold for the after-hook.
    pub fn with_slow_query_threshold(slow_query: Duration) -> Self {
        Self {
            slow_query,
            before: RwLock::new(default_before()),
            after: RwLock::new(default_after(slow_query)),
            error: RwLock::new(default_error()),
        }
    }

    pub fn slow_query_threshold(&self) -> Duration {
        self.slow_query
    }

    pub fn set_before(&self, hook: impl Fn(&ExecuteEvent<'_>) + Send + Sync + 'static) {
        *write(&self.before) = Arc::new(hook);
    }

    pub fn set_after(&self, hook: impl Fn(&ExecuteEvent<'_>) + Send + Sync + 'static) {
        *write(&self.after) = Arc::new(hook);
    }

    pub fn set_error(&self, hook: impl Fn(&ExecuteEvent<'_>, &DbError) + Send + Sync + 'static) {
        *write(&self.error) = Arc::new(hook);
    }

    /// Restore the default callbacks.
    pub fn reset(&self) {
        *write(&self.before) = default_before();
        *write(&self.after) = default_after(self.slow_query);
        *write(&self.error) = default_error();
    }

    // The lock is released before the callback runs so a hook may replace hooks.

    pub(crate) fn before(&self, event: &ExecuteEvent<'_>) {
        let hook = Arc::clone(&read(&self.before));
        hook(event);
    }

    pub(crate) fn after(&self, event: &ExecuteEvent<'_>) {
        let hook = Arc::clone(&read(&self.after));
        hook(event);
    }

    pub(crate) fn error(&self, event: &ExecuteEvent<'_>, err: &DbError) {
        let hook = Arc::clone(&read(&self.error));
        hook(event, err);
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("slow_query", &self.slow_query)
            .finish_non_exhaustive()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn default_before() -> BeforeHook {
    Arc::new(|event: &ExecuteEvent<'_>| {
        debug!(
            group = %event.group,
            operation = %event.operation,
            target = %event.target,
            sql = %event.statement.sql,
            params = event.statement.params.len(),
            "Executing statement"
        );
    })
}

fn default_after(slow_query: Duration) -> AfterHook {
    Arc::new(move |event: &ExecuteEvent<'_>| {
        if event.elapsed >= slow_query {
            warn!(
                group = %event.group,
                operation = %event.operation,
                target = %event.target,
                elapsed_ms = event.elapsed.as_millis() as u64,
                sql = %event.rendered_sql(),
                "Slow query"
            );
        }
    })
}

fn default_error() -> ErrorHook {
    Arc::new(|event: &ExecuteEvent<'_>, err: &DbError| {
        error!(
            group = %event.group,
            operation = %event.operation,
            target = %event.target,
            elapsed_ms = event.elapsed.as_millis() as u64,
            sql = %event.rendered_sql(),
            error = %err,
            "Statement failed"
        );
    })
}
