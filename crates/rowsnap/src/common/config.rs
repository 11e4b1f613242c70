//! Per-table scan configuration

use crate::common::dialect::TableRef;
use crate::common::error::{Error, Result};
use crate::common::retry::RetryPolicy;
use crate::common::value::SqlValue;

/// Configuration for scanning one table.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// The table to scan.
    pub table: TableRef,
    /// Rows per batch.
    pub batch_size: usize,
    /// Columns to leave out of the emitted envelope. Excluding a primary-key
    /// column is a catalog error.
    pub excluded_columns: Vec<String>,
    /// Optional starting-bound override, positional over the PK columns.
    pub start_values: Option<Vec<SqlValue>>,
    /// Optional ending-bound override, positional over the PK columns.
    pub end_values: Option<Vec<SqlValue>>,
    /// Retry policy for each batch query.
    pub retry: RetryPolicy,
}

impl TableConfig {
    /// Create a builder for the given table.
    pub fn builder(schema: impl Into<String>, table: impl Into<String>) -> TableConfigBuilder {
        TableConfigBuilder {
            table: TableRef::new(schema, table),
            batch_size: 5_000,
            excluded_columns: Vec::new(),
            start_values: None,
            end_values: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Basic sanity checks that need no catalog access.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        Ok(())
    }
}

/// Builder for [`TableConfig`].
#[derive(Debug, Clone)]
pub struct TableConfigBuilder {
    table: TableRef,
    batch_size: usize,
    excluded_columns: Vec<String>,
    start_values: Option<Vec<SqlValue>>,
    end_values: Option<Vec<SqlValue>>,
    retry: RetryPolicy,
}

impl TableConfigBuilder {
    /// Rows per batch (minimum 1).
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Exclude a column from the emitted envelope.
    pub fn exclude_column(mut self, column: impl Into<String>) -> Self {
        self.excluded_columns.push(column.into());
        self
    }

    /// Override the starting bound (positional over the PK columns).
    pub fn start_values(mut self, values: Vec<SqlValue>) -> Self {
        self.start_values = Some(values);
        self
    }

    /// Override the ending bound (positional over the PK columns).
    pub fn end_values(mut self, values: Vec<SqlValue>) -> Self {
        self.end_values = Some(values);
        self
    }

    /// Retry policy for batch queries.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the config.
    pub fn build(self) -> TableConfig {
        TableConfig {
            table: self.table,
            batch_size: self.batch_size,
            excluded_columns: self.excluded_columns,
            start_values: self.start_values,
            end_values: self.end_values,
            retry: self.retry,
        }
    }
}
