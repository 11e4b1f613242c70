//! Error types for snapshot operations
//!
//! Granular error classification so the scanner can tell transient driver
//! failures (retried by the batch envelope) from fatal ones (surfaced
//! immediately).

use thiserror::Error;

/// Result type for rowsnap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Driver/wire errors (retriable)
    Query,
    /// Catalog/schema mismatches
    Catalog,
    /// Type dispatch and value encoding
    Encoding,
    /// Configuration errors
    Configuration,
    /// Sink delivery errors
    Sink,
    /// Cancellation
    Cancelled,
    /// Everything else
    Other,
}

/// Errors surfaced by the snapshot core.
#[derive(Error, Debug)]
pub enum Error {
    /// The table exists but holds no rows; raised during PK bounds fetch,
    /// before any scan query is issued. Callers may skip the table or emit
    /// a schema-only signal.
    #[error("no primary key values for empty table {schema}.{table}")]
    EmptyTable { schema: String, table: String },

    /// A column's declared type has no converter.
    #[error("unsupported data type {kind} for column {column}")]
    TypeDispatch { column: String, kind: String },

    /// A value could not be represented in its target encoding.
    #[error("cannot encode column {column}: {detail}")]
    Encoding { column: String, detail: String },

    /// Transient wire/driver error. Retried by the per-batch envelope.
    #[error("query error: {message}")]
    Query {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Catalog inconsistency: missing PK columns, excluded PK column,
    /// column lists that do not line up.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// `next_batch` was called on a finished scanner.
    #[error("no more rows")]
    NoMoreRows,

    /// The run was cancelled between batches.
    #[error("cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Sink delivery failure. Fatal for the per-table run.
    #[error("sink error: {0}")]
    Sink(String),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            source: None,
        }
    }

    /// Create a query error wrapping a driver error.
    pub fn query_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Query {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a catalog error.
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a type dispatch error.
    pub fn type_dispatch(column: impl Into<String>, kind: impl std::fmt::Display) -> Self {
        Self::TypeDispatch {
            column: column.into(),
            kind: kind.to_string(),
        }
    }

    /// Create an encoding error scoped to a column.
    pub fn encoding(column: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Encoding {
            column: column.into(),
            detail: detail.into(),
        }
    }

    /// Create a sink error.
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink(message.into())
    }

    /// Whether the per-batch retry envelope may retry this error.
    ///
    /// Only wire-level query failures are transient; everything else —
    /// including [`Error::EmptyTable`] — surfaces immediately.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Query { .. } | Self::Io(_))
    }

    /// Get the error category for logging.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Query { .. } | Self::Io(_) => ErrorCategory::Query,
            Self::EmptyTable { .. } | Self::Catalog(_) => ErrorCategory::Catalog,
            Self::TypeDispatch { .. } | Self::Encoding { .. } | Self::Json(_) => {
                ErrorCategory::Encoding
            }
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Sink(_) => ErrorCategory::Sink,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::NoMoreRows => ErrorCategory::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::EmptyTable {
            schema: "public".into(),
            table: "users".into(),
        };
        assert!(err.to_string().contains("public.users"));

        let err = Error::type_dispatch("c_custom", "geometry_collection");
        assert!(err.to_string().contains("c_custom"));
        assert!(err.to_string().contains("geometry_collection"));
    }

    #[test]
    fn test_error_is_retriable() {
        assert!(Error::query("connection reset").is_retriable());

        assert!(!Error::catalog("missing pk").is_retriable());
        assert!(!Error::encoding("c_interval", "overflow").is_retriable());
        assert!(!Error::Cancelled.is_retriable());
        assert!(!Error::EmptyTable {
            schema: "public".into(),
            table: "empty".into()
        }
        .is_retriable());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(Error::query("x").category(), ErrorCategory::Query);
        assert_eq!(Error::catalog("x").category(), ErrorCategory::Catalog);
        assert_eq!(
            Error::encoding("c", "d").category(),
            ErrorCategory::Encoding
        );
        assert_eq!(Error::Cancelled.category(), ErrorCategory::Cancelled);
    }
}
