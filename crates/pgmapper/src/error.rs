//! Error types for pgmapper

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for pgmapper operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for query construction and execution.
///
/// Query-construction errors (`UnknownField`, `UnsupportedLookup`,
/// `InvalidLookupValue`, `Unsupported`) are always raised before the driver is
/// touched. The error is `Clone` so a query can keep the first construction
/// error it hit and report it again from [`Query::to_sql`](crate::Query::to_sql).
#[derive(Debug, Clone, Error)]
pub enum OrmError {
    /// A field path segment does not name a field of the model it was resolved against
    #[error("Unknown field '{segment}' in path '{path}' on model '{model}'")]
    UnknownField {
        path: String,
        segment: String,
        model: String,
    },

    /// A lookup suffix has no registered operator
    #[error("Unsupported lookup '{lookup}' in path '{path}'")]
    UnsupportedLookup { lookup: String, path: String },

    /// The value bound to a lookup has the wrong shape (e.g. a scalar for `__in`)
    #[error("Invalid value for lookup '{lookup}' on '{path}': {message}")]
    InvalidLookupValue {
        path: String,
        lookup: String,
        message: String,
    },

    /// A feature the query layer explicitly does not support
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// `get()` matched no rows
    #[error("Not found: {0}")]
    NotFound(String),

    /// `get()` matched more than one row
    #[error("Multiple results: expected 1 row from '{table}', got {got}")]
    MultipleResults { table: String, got: usize },

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error reported by tokio-postgres
    #[error("Query error: {0}")]
    Query(Arc<tokio_postgres::Error>),

    /// Failure reported by a non-Postgres driver implementation
    #[error("Driver error: {0}")]
    Driver(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Pool error
    #[error("Pool error: {0}")]
    Pool(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Model definition or input validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create an unknown-field error
    pub fn unknown_field(
        path: impl Into<String>,
        segment: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self::UnknownField {
            path: path.into(),
            segment: segment.into(),
            model: model.into(),
        }
    }

    /// Create an unsupported-lookup error
    pub fn unsupported_lookup(lookup: impl Into<String>, path: impl Into<String>) -> Self {
        Self::UnsupportedLookup {
            lookup: lookup.into(),
            path: path.into(),
        }
    }

    /// Create an invalid-lookup-value error
    pub fn invalid_lookup_value(
        path: impl Into<String>,
        lookup: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidLookupValue {
            path: path.into(),
            lookup: lookup.into(),
            message: message.into(),
        }
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an unsupported-feature error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a multiple results error
    pub fn is_multiple_results(&self) -> bool {
        matches!(self, Self::MultipleResults { .. })
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this error was raised while building a query (before any I/O)
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownField { .. }
                | Self::UnsupportedLookup { .. }
                | Self::InvalidLookupValue { .. }
                | Self::Unsupported(_)
        )
    }

    /// Check if this error was surfaced by the driver
    pub fn is_driver_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Query(_)
                | Self::Driver(_)
                | Self::UniqueViolation(_)
                | Self::ForeignKeyViolation(_)
                | Self::CheckViolation(_)
                | Self::Pool(_)
        )
    }

    /// Parse a tokio_postgres error into a more specific OrmError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(Arc::new(err))
    }
}

impl From<tokio_postgres::Error> for OrmError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::from_db_error(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
