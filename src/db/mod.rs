//! Database access layer.
//!
//! - Connection groups and the registry that resolves them
//! - Read/write routing and statement execution
//! - The `Db` handle with nested transactions
//! - Execution hooks
//! - Row decoding into JSON values
//! - The table helper

pub mod executor;
pub mod handle;
pub mod hooks;
mod macros;
pub mod params;
pub mod registry;
pub mod table;
pub mod transaction;
pub mod types;

pub use executor::{RouteRequest, Terminal};
pub use handle::Db;
pub use hooks::{ExecuteEvent, HookRegistry, Target};
pub use registry::{ConnectionGroup, ConnectionRegistry};
pub use table::{Filter, Table, TableDescriptor};
pub use transaction::{TxDepth, TxStep};
pub use types::JsonRow;
