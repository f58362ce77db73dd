//! Error types for frame-db.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Each variant carries enough context (group name, operator, SQL state) for the
//! caller or an error hook to report the failure without re-deriving it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error for group '{group}': {message}")]
    Configuration { group: String, message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Unsupported operator '{operator}': {reason}")]
    UnsupportedOperator { operator: String, reason: String },

    #[error("Statement failed: {message}")]
    Statement {
        message: String,
        /// e.g., "23000" for an integrity constraint violation
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("No replica configured for group '{group}'")]
    NoReplicaAvailable { group: String },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Timeout: {operation}")]
    Timeout { operation: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error for a connection group.
    pub fn configuration(group: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            group: group.into(),
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an unsupported operator error.
    pub fn unsupported_operator(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    /// Create a statement error with optional SQL state.
    pub fn statement(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Statement {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn no_replica_available(group: impl Into<String>) -> Self {
        Self::NoReplicaAvailable {
            group: group.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Pool acquire timeout, naming the configured limit.
    pub fn acquire_timeout(limit: std::time::Duration) -> Self {
        Self::timeout(format!("connection pool acquire exceeded {}s", limit.as_secs()))
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Statement { suggestion, .. } => Some(suggestion),
            Self::NoReplicaAvailable { .. } => {
                Some("Add replicas to the group or set replica_policy = \"primary\"")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the host configuration and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::statement(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::statement(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire"),
            sqlx::Error::PoolClosed => DbError::connection(
                "Connection pool is closed",
                "The registry was shut down; resolve the group again",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::invalid_input(format!(
                "Column not found in result set: {}",
                col
            )),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
