//! Parameter binding for MySQL statements.
//!
//! Builds the driver's argument buffer from a statement's `QueryParam` vector
//! so plain queries and `FromRow` queries bind the same way.

use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use sqlx::Arguments;
use sqlx::mysql::MySqlArguments;

/// Encode every parameter, in order, into a MySQL argument buffer.
pub(crate) fn mysql_arguments(params: &[QueryParam]) -> DbResult<MySqlArguments> {
    let mut args = MySqlArguments::default();
    for (index, param) in params.iter().enumerate() {
        let added = match param {
            QueryParam::Null => args.add(None::<String>),
            QueryParam::Bool(v) => args.add(*v),
            QueryParam::Int(v) => args.add(*v),
            QueryParam::UInt(v) => args.add(*v),
            QueryParam::Float(v) => args.add(*v),
            QueryParam::String(v) => args.add(v.clone()),
        };
        added.map_err(|e| {
            DbError::invalid_input(format!(
                "cannot bind parameter {} ({}): {}",
                index + 1,
                param.type_name(),
                e
            ))
        })?;
    }
    Ok(args)
}
