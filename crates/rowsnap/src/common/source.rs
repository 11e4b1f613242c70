//! Source connection abstraction
//!
//! The capability record the scanner is generic over: schema introspection,
//! PK bounds, and batch fetch. One implementation per dialect lives in the
//! corresponding feature-gated module.

use async_trait::async_trait;

use crate::common::convert::Converter;
use crate::common::dialect::{Dialect, TableRef};
use crate::common::error::Result;
use crate::common::value::{Row, SqlValue};

/// Optional type modifiers reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeOpts {
    /// Numeric scale
    pub scale: Option<u32>,
    /// Numeric precision
    pub precision: Option<u32>,
    /// Declared size (character/bit length)
    pub size: Option<u32>,
    /// Fractional-seconds precision
    pub datetime_precision: Option<u32>,
}

/// A column with its dispatched converter, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Converter the type dispatcher selected for this column
    pub converter: Converter,
}

impl ColumnSpec {
    /// Create a column spec.
    pub fn new(name: impl Into<String>, converter: Converter) -> Self {
        Self {
            name: name.into(),
            converter,
        }
    }
}

/// MIN/MAX of the PK tuple, in PK column order.
#[derive(Debug, Clone, PartialEq)]
pub struct PkBounds {
    pub min: Vec<SqlValue>,
    pub max: Vec<SqlValue>,
}

/// A live connection to a source database.
///
/// Implementations decode driver rows into [`Row`]s of [`SqlValue`]s; all
/// envelope encoding happens downstream in the transformer.
#[async_trait]
pub trait SourceConnection: Send {
    /// The dialect this connection speaks.
    fn dialect(&self) -> Dialect;

    /// Name of the connected database, used for topic suffixes and the
    /// event `source` block.
    fn database(&self) -> &str;

    /// List columns with dispatched converters, in declaration order.
    async fn describe_columns(&mut self, table: &TableRef) -> Result<Vec<ColumnSpec>>;

    /// Primary-key column names in index order.
    async fn primary_key_columns(&mut self, table: &TableRef) -> Result<Vec<String>>;

    /// Fetch MIN and MAX of the PK tuple. `pk_columns` lists the key
    /// columns with their converters, in index order; decoders that cannot
    /// rely on driver-reported result types use the converter as the decode
    /// target.
    ///
    /// Returns [`crate::common::error::Error::EmptyTable`] when the table
    /// has no rows; callers interpret that as "exists, has no rows".
    async fn pk_bounds(&mut self, table: &TableRef, pk_columns: &[ColumnSpec]) -> Result<PkBounds>;

    /// Estimated row count from catalog statistics, used for logging only.
    async fn estimate_row_count(&mut self, _table: &TableRef) -> Result<Option<u64>> {
        Ok(None)
    }

    /// Execute a scan query and decode the result set. `columns` matches
    /// the query's SELECT list.
    ///
    /// Parameters are bound in the order (starts..., ends...).
    async fn fetch_batch(
        &mut self,
        sql: &str,
        columns: &[ColumnSpec],
        starts: &[SqlValue],
        ends: &[SqlValue],
    ) -> Result<Vec<Row>>;
}
