//! frame-db
//!
//! A fluent MySQL query builder over grouped connection pools. Each group has
//! one primary and any number of replicas; reads go to a random replica,
//! writes and transactions to the primary. Transactions nest by depth and
//! every statement passes through before/after/error hooks.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod query;

pub use config::{ConfigProvider, FileConfigProvider, GroupConfig, HostConfig, StaticConfigProvider};
pub use db::{ConnectionRegistry, Db, HookRegistry, JsonRow, Table, TableDescriptor};
pub use error::{DbError, DbResult};
pub use models::{Operand, QueryParam, Record};
pub use query::QueryBuilder;
