//! Nested transactions bound to a `Db` handle.
//!
//! Only the outermost begin/commit/rollback touch the database. Inner calls
//! move a depth counter, so code that opens its own transaction composes with
//! callers that already hold one. While the depth is positive every statement
//! runs on the bound connection.
//!
//! # Design Decisions
//!
//! - **Pure `TxDepth` counter**: the nesting rules are testable without a server
//! - **Owned `Transaction<'static, MySql>`**: sqlx rolls back on drop, so a
//!   handle dropped mid-transaction never leaks an open transaction
//! - **Inner rollback is bookkeeping only**: the outermost caller decides

use crate::db::executor::pool_error;
use crate::error::{DbError, DbResult};
use sqlx::mysql::MySqlConnection;
use sqlx::{MySql, MySqlPool, Transaction};
use tracing::{debug, warn};

/// Effect of a begin/commit/rollback call on the depth counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStep {
    /// 0 → 1: open a real transaction
    Open,
    /// Depth changed but stayed positive
    Nested,
    /// 1 → 0: commit or roll back for real
    Close,
    /// Commit/rollback with no transaction open
    Noop,
}

/// Transaction nesting depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxDepth(u32);

impl TxDepth {
    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn is_active(&self) -> bool {
        self.0 > 0
    }

    pub fn begin(&mut self) -> TxStep {
        self.0 += 1;
        if self.0 == 1 {
            TxStep::Open
        } else {
            TxStep::Nested
        }
    }

    /// Shared by commit and rollback.
    pub fn end(&mut self) -> TxStep {
        match self.0 {
            0 => TxStep::Noop,
            1 => {
                self.0 = 0;
                TxStep::Close
            }
            _ => {
                self.0 -= 1;
                TxStep::Nested
            }
        }
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// Depth counter plus the bound connection.
#[derive(Default)]
pub struct TransactionState {
    depth: TxDepth,
    tx: Option<Transaction<'static, MySql>>,
}

impl TransactionState {
    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    pub fn is_active(&self) -> bool {
        self.depth.is_active()
    }

    /// Connection every statement must use while a transaction is open.
    pub(crate) fn connection(&mut self) -> Option<&mut MySqlConnection> {
        self.tx.as_deref_mut()
    }

    /// Returns the step taken. A failed real begin leaves the depth at 0.
    pub(crate) async fn begin(&mut self, pool: &MySqlPool) -> DbResult<TxStep> {
        let step = self.depth.begin();
        if step == TxStep::Open {
            match pool.begin().await {
                Ok(tx) => self.tx = Some(tx),
                Err(e) => {
                    self.depth.clear();
                    return Err(pool_error(pool, e));
                }
            }
        }
        debug!(depth = self.depth.get(), ?step, "Begin transaction");
        Ok(step)
    }

    /// The binding is released whether or not the real commit succeeds.
    pub(crate) async fn commit(&mut self) -> DbResult<TxStep> {
        let step = self.depth.end();
        if step == TxStep::Close {
            self.take()?.commit().await?;
        }
        debug!(depth = self.depth.get(), ?step, "Commit transaction");
        Ok(step)
    }

    pub(crate) async fn rollback(&mut self) -> DbResult<TxStep> {
        let step = self.depth.end();
        if step == TxStep::Close {
            self.take()?.rollback().await?;
        }
        debug!(depth = self.depth.get(), ?step, "Rollback transaction");
        Ok(step)
    }

    fn take(&mut self) -> DbResult<Transaction<'static, MySql>> {
        self.tx
            .take()
            .ok_or_else(|| DbError::transaction("no connection bound to the open transaction"))
    }
}

impl std::fmt::Debug for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionState")
            .field("depth", &self.depth.get())
            .field("bound", &self.tx.is_some())
            .finish()
    }
}

impl Drop for TransactionState {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!(
                depth = self.depth.get(),
                "Db handle dropped with an open transaction, rolling back"
            );
        }
    }
}
