//! Data models shared by the builder and the executor.
//!
//! This module re-exports all model types used throughout the crate.

pub mod query;

// Re-export commonly used types
pub use query::{
    DEFAULT_BATCH_CHUNK, FALLBACK_BATCH_CHUNK, Operand, Plan, QueryParam, Record, Statement,
    StatementKind,
};
