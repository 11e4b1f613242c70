//! Key-range table scanner
//!
//! Resumable, bounded, batched pagination over a table in primary-key
//! order. Bounds are fetched once up front (MIN/MAX of the PK tuple, with
//! optional config overrides), then each batch advances the cursor to the
//! last row's key tuple. The first batch compares inclusively (`>=`),
//! subsequent batches exclusively (`>`), so no row is emitted twice.
//!
//! Termination: an empty batch, or the cursor reaching the upper bound.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::common::config::TableConfig;
use crate::common::dialect::TableRef;
use crate::common::error::{Error, Result};
use crate::common::keys::Keys;
use crate::common::retry::RetryPolicy;
use crate::common::source::{ColumnSpec, SourceConnection};
use crate::common::value::Row;

/// Shared cancellation flag, observed at batch boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Batched key-range scanner over one table.
#[derive(Debug)]
pub struct TableScanner<'a, C: SourceConnection> {
    conn: &'a mut C,
    table: TableRef,
    batch_size: usize,
    retry: RetryPolicy,
    keys: Keys,
    key_columns: Vec<String>,
    columns: Vec<ColumnSpec>,
    select_names: Vec<String>,
    first_batch: bool,
    done: bool,
    cancel: CancelFlag,
}

impl<'a, C: SourceConnection> TableScanner<'a, C> {
    /// Introspect the table and position the cursor at its lower bound.
    ///
    /// Fails with [`Error::EmptyTable`] when the table has no rows — in that
    /// case no scan query is ever issued.
    pub async fn open(
        conn: &'a mut C,
        config: &TableConfig,
        cancel: CancelFlag,
    ) -> Result<TableScanner<'a, C>> {
        config.validate()?;
        let table = config.table.clone();

        let all_columns = conn.describe_columns(&table).await?;
        let key_columns = conn.primary_key_columns(&table).await?;
        if key_columns.is_empty() {
            return Err(Error::catalog(format!("table {table} has no primary key")));
        }

        for key in &key_columns {
            if !all_columns.iter().any(|c| &c.name == key) {
                return Err(Error::catalog(format!(
                    "primary key column {key} not present in declared columns of {table}"
                )));
            }
            if config.excluded_columns.contains(key) {
                return Err(Error::catalog(format!(
                    "cannot exclude primary key column {key} of {table}"
                )));
            }
        }
        for excluded in &config.excluded_columns {
            if !all_columns.iter().any(|c| &c.name == excluded) {
                return Err(Error::catalog(format!(
                    "excluded column {excluded} does not exist in {table}"
                )));
            }
        }

        let columns: Vec<ColumnSpec> = all_columns
            .into_iter()
            .filter(|c| !config.excluded_columns.contains(&c.name))
            .collect();
        let select_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        if let Some(estimate) = conn.estimate_row_count(&table).await? {
            debug!(table = %table, estimate, "row count estimate");
        }

        let mut key_specs = Vec::with_capacity(key_columns.len());
        for key in &key_columns {
            let spec = columns
                .iter()
                .find(|c| &c.name == key)
                .ok_or_else(|| Error::catalog(format!("missing key column {key}")))?;
            key_specs.push(spec.clone());
        }
        let bounds = conn.pk_bounds(&table, &key_specs).await?;
        let mut keys = Keys::from_names(key_columns.iter().cloned());
        keys.load_values(Some(&bounds.min), Some(&bounds.max))?;
        keys.load_values(config.start_values.as_deref(), config.end_values.as_deref())?;

        debug!(table = %table, keys = ?keys.column_names(), "scan bounds resolved");

        Ok(TableScanner {
            conn,
            table,
            batch_size: config.batch_size,
            retry: config.retry.clone(),
            keys,
            key_columns,
            columns,
            select_names,
            first_batch: true,
            done: false,
            cancel,
        })
    }

    /// Columns the scan selects (exclusions applied), in declaration order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Primary-key column names in index order.
    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    /// The dialect of the underlying connection.
    pub fn dialect(&self) -> crate::common::dialect::Dialect {
        self.conn.dialect()
    }

    /// Whether another batch may be fetched.
    pub fn has_next(&self) -> bool {
        !self.done
    }

    /// Fetch the next batch.
    ///
    /// The batch query runs under the per-batch retry envelope; the returned
    /// batch may be empty exactly once, at termination.
    pub async fn next_batch(&mut self) -> Result<Vec<Row>> {
        if !self.has_next() {
            return Err(Error::NoMoreRows);
        }
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let sql = self.conn.dialect().build_scan_query(
            &self.table,
            &self.key_columns,
            &self.select_names,
            self.batch_size,
            self.first_batch,
        );
        let starts = self.keys.starting_values();
        let ends = self.keys.ending_values();

        let mut attempt = 0u32;
        let rows = loop {
            match self
                .conn
                .fetch_batch(&sql, &self.columns, &starts, &ends)
                .await
            {
                Ok(rows) => break rows,
                Err(err) if err.is_retriable() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        table = %self.table,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "batch query failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        if rows.is_empty() || self.keys.is_exhausted() {
            self.done = true;
        } else if let Some(last) = rows.last() {
            // Advance the cursor to the last emitted key tuple; the next
            // batch compares strictly so that row is not re-emitted.
            for name in self.key_columns.clone() {
                let value = last.get(&name).ok_or_else(|| {
                    Error::catalog(format!("scan result missing key column {name}"))
                })?;
                self.keys.update_starting_value(&name, value.clone())?;
            }
        }
        self.first_batch = false;

        debug!(
            table = %self.table,
            rows = rows.len(),
            done = self.done,
            "fetched scan batch"
        );
        Ok(rows)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory source for scanner tests.

    use async_trait::async_trait;
    use std::cmp::Ordering as CmpOrdering;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::common::dialect::{Dialect, TableRef};
    use crate::common::error::{Error, Result};
    use crate::common::source::{ColumnSpec, PkBounds, SourceConnection};
    use crate::common::value::{Row, SqlValue};

    fn cmp_value(a: &SqlValue, b: &SqlValue) -> CmpOrdering {
        match (a, b) {
            (SqlValue::Int32(x), SqlValue::Int32(y)) => x.cmp(y),
            (SqlValue::Int64(x), SqlValue::Int64(y)) => x.cmp(y),
            (SqlValue::Bool(x), SqlValue::Bool(y)) => x.cmp(y),
            (SqlValue::String(x), SqlValue::String(y)) => x.cmp(y),
            _ => CmpOrdering::Equal,
        }
    }

    pub fn cmp_tuple(a: &[SqlValue], b: &[SqlValue]) -> CmpOrdering {
        for (x, y) in a.iter().zip(b) {
            match cmp_value(x, y) {
                CmpOrdering::Equal => continue,
                other => return other,
            }
        }
        CmpOrdering::Equal
    }

    /// Sorted in-memory table speaking the Postgres dialect.
    #[derive(Debug)]
    pub struct MockConnection {
        pub columns: Vec<ColumnSpec>,
        pub key_columns: Vec<String>,
        pub rows: Vec<Row>,
        pub fetch_calls: Arc<AtomicU32>,
        pub transient_failures: AtomicU32,
    }

    impl MockConnection {
        pub fn new(columns: Vec<ColumnSpec>, key_columns: Vec<String>, mut rows: Vec<Row>) -> Self {
            let keys = key_columns.clone();
            rows.sort_by(|a, b| cmp_tuple(&key_tuple(a, &keys), &key_tuple(b, &keys)));
            Self {
                columns,
                key_columns,
                rows,
                fetch_calls: Arc::new(AtomicU32::new(0)),
                transient_failures: AtomicU32::new(0),
            }
        }

        /// Make the next `n` fetches fail with a retriable error.
        pub fn fail_next_fetches(&self, n: u32) {
            self.transient_failures.store(n, Ordering::SeqCst);
        }
    }

    pub fn key_tuple(row: &Row, key_columns: &[String]) -> Vec<SqlValue> {
        key_columns
            .iter()
            .map(|k| row.get(k).cloned().unwrap_or(SqlValue::Null))
            .collect()
    }

    #[async_trait]
    impl SourceConnection for MockConnection {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        fn database(&self) -> &str {
            "testdb"
        }

        async fn describe_columns(&mut self, _table: &TableRef) -> Result<Vec<ColumnSpec>> {
            Ok(self.columns.clone())
        }

        async fn primary_key_columns(&mut self, _table: &TableRef) -> Result<Vec<String>> {
            Ok(self.key_columns.clone())
        }

        async fn pk_bounds(&mut self, table: &TableRef, pk: &[ColumnSpec]) -> Result<PkBounds> {
            let names: Vec<String> = pk.iter().map(|c| c.name.clone()).collect();
            match (self.rows.first(), self.rows.last()) {
                (Some(first), Some(last)) => Ok(PkBounds {
                    min: key_tuple(first, &names),
                    max: key_tuple(last, &names),
                }),
                _ => Err(Error::EmptyTable {
                    schema: table.schema.clone(),
                    table: table.name.clone(),
                }),
            }
        }

        async fn fetch_batch(
            &mut self,
            sql: &str,
            _columns: &[ColumnSpec],
            starts: &[SqlValue],
            ends: &[SqlValue],
        ) -> Result<Vec<Row>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.transient_failures.load(Ordering::SeqCst) > 0 {
                self.transient_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::query("mock transient failure"));
            }

            let inclusive = sql.contains(">=");
            let limit: usize = sql
                .rsplit(' ')
                .next()
                .and_then(|n| n.parse().ok())
                .expect("scan sql ends with LIMIT n");

            let key_columns = self.key_columns.clone();
            Ok(self
                .rows
                .iter()
                .filter(|row| {
                    let tuple = key_tuple(row, &key_columns);
                    let lower = cmp_tuple(&tuple, starts);
                    let upper = cmp_tuple(&tuple, ends);
                    let lower_ok = if inclusive {
                        lower != CmpOrdering::Less
                    } else {
                        lower == CmpOrdering::Greater
                    };
                    lower_ok && upper != CmpOrdering::Greater
                })
                .take(limit)
                .cloned()
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{key_tuple, MockConnection};
    use super::*;
    use crate::common::convert::Converter;
    use crate::common::source::ColumnSpec;
    use crate::common::value::SqlValue;

    fn fixture_columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("c_int_pk", Converter::Int32),
            ColumnSpec::new("c_boolean_pk", Converter::Boolean),
            ColumnSpec::new("c_text_pk", Converter::Text),
            ColumnSpec::new("c_text_value", Converter::Text),
        ]
    }

    fn fixture_keys() -> Vec<String> {
        vec![
            "c_int_pk".into(),
            "c_boolean_pk".into(),
            "c_text_pk".into(),
        ]
    }

    fn fixture_row(i: i32) -> Row {
        Row::new(
            vec![
                "c_int_pk".into(),
                "c_boolean_pk".into(),
                "c_text_pk".into(),
                "c_text_value".into(),
            ],
            vec![
                SqlValue::Int32(i / 5),
                SqlValue::Bool(i % 2 == 0),
                SqlValue::String(format!("t{i:02}")),
                SqlValue::String(format!("v{i:02}")),
            ],
        )
    }

    fn fixture_25() -> MockConnection {
        MockConnection::new(
            fixture_columns(),
            fixture_keys(),
            (0..25).map(fixture_row).collect(),
        )
    }

    async fn collect_all(conn: &mut MockConnection, config: &TableConfig) -> Vec<Row> {
        let mut scanner = TableScanner::open(conn, config, CancelFlag::new())
            .await
            .unwrap();
        let mut out = Vec::new();
        while scanner.has_next() {
            out.extend(scanner.next_batch().await.unwrap());
        }
        out
    }

    fn config(batch_size: usize) -> TableConfig {
        TableConfig::builder("public", "scan_fixture")
            .batch_size(batch_size)
            .build()
    }

    #[tokio::test]
    async fn test_batch_size_does_not_change_order_or_coverage() {
        let expected = fixture_25().rows;

        for batch_size in [1usize, 2, 5, 6, 24, 25, 26] {
            let mut conn = fixture_25();
            let emitted = collect_all(&mut conn, &config(batch_size)).await;
            assert_eq!(
                emitted.len(),
                25,
                "batch size {batch_size} lost or duplicated rows"
            );
            assert_eq!(emitted, expected, "batch size {batch_size} changed order");
        }
    }

    #[tokio::test]
    async fn test_emission_is_ascending_composite_order() {
        let mut conn = fixture_25();
        let keys = fixture_keys();
        let emitted = collect_all(&mut conn, &config(6)).await;
        for pair in emitted.windows(2) {
            assert_eq!(
                super::mock::cmp_tuple(&key_tuple(&pair[0], &keys), &key_tuple(&pair[1], &keys)),
                std::cmp::Ordering::Less
            );
        }
    }

    #[tokio::test]
    async fn test_singleton_table_min_equals_max() {
        let mut conn = MockConnection::new(
            fixture_columns(),
            fixture_keys(),
            vec![fixture_row(0)],
        );
        let cfg = config(10);
        let mut scanner = TableScanner::open(&mut conn, &cfg, CancelFlag::new())
            .await
            .unwrap();

        let batch = scanner.next_batch().await.unwrap();
        assert_eq!(batch.len(), 1);
        // min == max: the inclusive first batch returned the row and the
        // scanner terminated without another query.
        assert!(!scanner.has_next());
        assert!(matches!(
            scanner.next_batch().await.unwrap_err(),
            Error::NoMoreRows
        ));
    }

    #[tokio::test]
    async fn test_batch_larger_than_range_terminates_on_next_call() {
        let mut conn = fixture_25();
        let calls = conn.fetch_calls.clone();
        let cfg = config(100);
        let mut scanner = TableScanner::open(&mut conn, &cfg, CancelFlag::new())
            .await
            .unwrap();

        let batch = scanner.next_batch().await.unwrap();
        assert_eq!(batch.len(), 25);
        assert!(scanner.has_next());

        let batch = scanner.next_batch().await.unwrap();
        assert!(batch.is_empty());
        assert!(!scanner.has_next());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_table_never_issues_a_scan_query() {
        let mut conn = MockConnection::new(fixture_columns(), fixture_keys(), vec![]);
        let calls = conn.fetch_calls.clone();
        let cfg = config(10);

        let err = TableScanner::open(&mut conn, &cfg, CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyTable { .. }));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bounds_override_restricts_the_scan() {
        let rows: Vec<Row> = (0..25).map(fixture_row).collect();
        let keys = fixture_keys();
        let mut sorted = rows.clone();
        sorted.sort_by(|a, b| {
            super::mock::cmp_tuple(&key_tuple(a, &keys), &key_tuple(b, &keys))
        });
        let start = key_tuple(&sorted[5], &keys);
        let end = key_tuple(&sorted[20], &keys);

        let mut conn = MockConnection::new(fixture_columns(), keys.clone(), rows);
        let cfg = TableConfig::builder("public", "scan_fixture")
            .batch_size(4)
            .start_values(start)
            .end_values(end)
            .build();
        let emitted = collect_all(&mut conn, &cfg).await;

        assert_eq!(emitted, sorted[5..=20].to_vec());
    }

    #[tokio::test]
    async fn test_transient_fetch_errors_are_retried() {
        let mut conn = fixture_25();
        conn.fail_next_fetches(2);
        let cfg = TableConfig::builder("public", "scan_fixture")
            .batch_size(25)
            .retry(
                RetryPolicy::builder()
                    .base(std::time::Duration::from_millis(1))
                    .cap(std::time::Duration::from_millis(2))
                    .max_attempts(5)
                    .build(),
            )
            .build();

        let mut scanner = TableScanner::open(&mut conn, &cfg, CancelFlag::new())
            .await
            .unwrap();
        let batch = scanner.next_batch().await.unwrap();
        assert_eq!(batch.len(), 25);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_surfaces_the_error() {
        let mut conn = fixture_25();
        conn.fail_next_fetches(10);
        let cfg = TableConfig::builder("public", "scan_fixture")
            .retry(
                RetryPolicy::builder()
                    .base(std::time::Duration::from_millis(1))
                    .cap(std::time::Duration::from_millis(1))
                    .max_attempts(2)
                    .build(),
            )
            .build();

        let mut scanner = TableScanner::open(&mut conn, &cfg, CancelFlag::new())
            .await
            .unwrap();
        assert!(matches!(
            scanner.next_batch().await.unwrap_err(),
            Error::Query { .. }
        ));
    }

    #[tokio::test]
    async fn test_cancellation_is_observed_between_batches() {
        let mut conn = fixture_25();
        let cancel = CancelFlag::new();
        let cfg = config(5);
        let mut scanner = TableScanner::open(&mut conn, &cfg, cancel.clone())
            .await
            .unwrap();

        scanner.next_batch().await.unwrap();
        cancel.cancel();
        assert!(matches!(
            scanner.next_batch().await.unwrap_err(),
            Error::Cancelled
        ));
    }

    #[tokio::test]
    async fn test_excluding_a_pk_column_is_a_catalog_error() {
        let mut conn = fixture_25();
        let cfg = TableConfig::builder("public", "scan_fixture")
            .exclude_column("c_int_pk")
            .build();
        let err = TableScanner::open(&mut conn, &cfg, CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Catalog(_)));
    }

    #[tokio::test]
    async fn test_excluding_an_unknown_column_is_a_catalog_error() {
        let mut conn = fixture_25();
        let cfg = TableConfig::builder("public", "scan_fixture")
            .exclude_column("no_such_column")
            .build();
        let err = TableScanner::open(&mut conn, &cfg, CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Catalog(_)));
    }

    #[tokio::test]
    async fn test_excluded_value_column_is_dropped_from_select() {
        let mut conn = fixture_25();
        let cfg = TableConfig::builder("public", "scan_fixture")
            .exclude_column("c_text_value")
            .batch_size(30)
            .build();
        let mut scanner = TableScanner::open(&mut conn, &cfg, CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(scanner.columns().len(), 3);

        let batch = scanner.next_batch().await.unwrap();
        assert_eq!(batch.len(), 25);
    }
}
