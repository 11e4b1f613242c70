//! Writer loop
//!
//! The mechanical pump tying scanner, transformer and sink together: while
//! the scanner has batches, transform and deliver them, counting rows.
//! Tables run sequentially in config order; an empty table is a typed,
//! skippable outcome, any other error ends the run unless the runner was
//! configured to continue.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use crate::common::config::TableConfig;
use crate::common::error::{Error, Result};
use crate::common::scan::{CancelFlag, TableScanner};
use crate::common::sink::Sink;
use crate::common::source::SourceConnection;
use crate::common::transform::RowTransformer;

/// Run counters shared across tables.
#[derive(Debug, Default)]
pub struct ScanStats {
    rows_emitted: AtomicU64,
    batches: AtomicU64,
    tables_completed: AtomicU64,
    tables_empty: AtomicU64,
    tables_failed: AtomicU64,
}

impl ScanStats {
    /// Create zeroed stats.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_batch(&self, rows: u64) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.rows_emitted.fetch_add(rows, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> ScanStatsSnapshot {
        ScanStatsSnapshot {
            rows_emitted: self.rows_emitted.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            tables_completed: self.tables_completed.load(Ordering::Relaxed),
            tables_empty: self.tables_empty.load(Ordering::Relaxed),
            tables_failed: self.tables_failed.load(Ordering::Relaxed),
        }
    }
}

/// Copyable view of [`ScanStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanStatsSnapshot {
    pub rows_emitted: u64,
    pub batches: u64,
    pub tables_completed: u64,
    pub tables_empty: u64,
    pub tables_failed: u64,
}

/// Terminal state of one table's run.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOutcome {
    /// Scanned to completion.
    Completed { rows: u64 },
    /// Table exists but holds no rows; no scan query was issued.
    Empty,
    /// The run failed; the message is the surfaced error.
    Failed(String),
}

/// Multi-table snapshot runner.
pub struct SnapshotRunner {
    tables: Vec<TableConfig>,
    continue_on_error: bool,
    cancel: CancelFlag,
    stats: Arc<ScanStats>,
}

impl SnapshotRunner {
    /// Create a runner over the given tables, processed in order.
    pub fn new(tables: Vec<TableConfig>) -> Self {
        Self {
            tables,
            continue_on_error: false,
            cancel: CancelFlag::new(),
            stats: Arc::new(ScanStats::new()),
        }
    }

    /// Keep going with the remaining tables after a table fails.
    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    /// The cancellation flag observed at batch boundaries.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run counters.
    pub fn stats(&self) -> ScanStatsSnapshot {
        self.stats.snapshot()
    }

    /// Snapshot every configured table into the sink.
    ///
    /// Returns per-table outcomes keyed by `schema.table`. An empty table is
    /// recorded and skipped; any other error fails the run unless
    /// `continue_on_error` is set. `on_finish` is invoked once at the end of
    /// a successful run.
    pub async fn run<C, S>(
        &self,
        conn: &mut C,
        sink: &mut S,
    ) -> Result<BTreeMap<String, TableOutcome>>
    where
        C: SourceConnection,
        S: Sink,
    {
        let mut outcomes = BTreeMap::new();

        for config in &self.tables {
            let name = config.table.to_string();
            match run_table(conn, config, sink, self.cancel.clone(), &self.stats).await {
                Ok(rows) => {
                    self.stats.tables_completed.fetch_add(1, Ordering::Relaxed);
                    outcomes.insert(name, TableOutcome::Completed { rows });
                }
                Err(Error::EmptyTable { schema, table }) => {
                    info!(table = %config.table, "table is empty, skipping");
                    self.stats.tables_empty.fetch_add(1, Ordering::Relaxed);
                    outcomes.insert(format!("{schema}.{table}"), TableOutcome::Empty);
                }
                Err(err) => {
                    error!(table = %config.table, error = %err, "table snapshot failed");
                    self.stats.tables_failed.fetch_add(1, Ordering::Relaxed);
                    if !self.continue_on_error {
                        return Err(err);
                    }
                    outcomes.insert(name, TableOutcome::Failed(err.to_string()));
                }
            }
        }

        sink.on_finish()
            .await
            .map_err(|e| Error::sink(format!("sink finish failed: {e}")))?;
        Ok(outcomes)
    }
}

/// Snapshot one table: open the scanner, pump batches through the
/// transformer into the sink, and return the number of rows emitted.
pub async fn run_table<C, S>(
    conn: &mut C,
    config: &TableConfig,
    sink: &mut S,
    cancel: CancelFlag,
    stats: &ScanStats,
) -> Result<u64>
where
    C: SourceConnection,
    S: Sink,
{
    let db = conn.database().to_string();
    let dialect = conn.dialect();
    let mut scanner = TableScanner::open(conn, config, cancel).await?;
    let transformer = RowTransformer::new(
        dialect,
        db,
        &config.table,
        scanner.columns(),
        scanner.key_columns(),
    );

    let mut total = 0u64;
    while scanner.has_next() {
        let rows = scanner.next_batch().await?;
        if rows.is_empty() {
            continue;
        }
        let count = rows.len() as u64;
        let messages = transformer.transform_batch(&rows)?;
        sink.write_raw_messages(messages).await?;
        total += count;
        stats.record_batch(count);
    }

    info!(table = %config.table, rows = total, "table snapshot complete");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::convert::Converter;
    use crate::common::scan::mock::MockConnection;
    use crate::common::sink::MemorySink;
    use crate::common::source::ColumnSpec;
    use crate::common::value::{Row, SqlValue};

    fn simple_row(i: i32) -> Row {
        Row::new(
            vec!["pk".into(), "v".into()],
            vec![SqlValue::Int32(i), SqlValue::String(format!("v{i}"))],
        )
    }

    fn simple_conn(rows: Vec<Row>) -> MockConnection {
        MockConnection::new(
            vec![
                ColumnSpec::new("pk", Converter::Int32),
                ColumnSpec::new("v", Converter::Text),
            ],
            vec!["pk".into()],
            rows,
        )
    }

    #[tokio::test]
    async fn test_run_single_table() {
        let mut conn = simple_conn((0..10).map(simple_row).collect());
        let mut sink = MemorySink::new();
        let runner = SnapshotRunner::new(vec![TableConfig::builder("public", "t")
            .batch_size(3)
            .build()]);

        let outcomes = runner.run(&mut conn, &mut sink).await.unwrap();

        assert_eq!(
            outcomes.get("public.t"),
            Some(&TableOutcome::Completed { rows: 10 })
        );
        assert_eq!(sink.messages.len(), 10);
        assert!(sink.finished);

        let stats = runner.stats();
        assert_eq!(stats.rows_emitted, 10);
        assert_eq!(stats.tables_completed, 1);
        // 10 rows at batch size 3 → batches of 3,3,3,1
        assert_eq!(stats.batches, 4);
    }

    #[tokio::test]
    async fn test_messages_preserve_scan_order() {
        let mut conn = simple_conn((0..7).map(simple_row).collect());
        let mut sink = MemorySink::new();
        let runner = SnapshotRunner::new(vec![TableConfig::builder("public", "t")
            .batch_size(2)
            .build()]);
        runner.run(&mut conn, &mut sink).await.unwrap();

        let pks: Vec<i64> = sink
            .messages
            .iter()
            .map(|m| m.partition_key["pk"].as_i64().unwrap())
            .collect();
        assert_eq!(pks, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_empty_table_is_a_skippable_outcome() {
        let mut conn = simple_conn(vec![]);
        let mut sink = MemorySink::new();
        let runner = SnapshotRunner::new(vec![TableConfig::builder("public", "empty").build()]);

        let outcomes = runner.run(&mut conn, &mut sink).await.unwrap();

        assert_eq!(outcomes.get("public.empty"), Some(&TableOutcome::Empty));
        assert!(sink.messages.is_empty());
        assert_eq!(runner.stats().tables_empty, 1);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_the_run_by_default() {
        let mut conn = simple_conn((0..3).map(simple_row).collect());
        let mut sink = MemorySink::new();
        // Excluding a PK column is a catalog error at open time.
        let runner = SnapshotRunner::new(vec![TableConfig::builder("public", "t")
            .exclude_column("pk")
            .build()]);

        let err = runner.run(&mut conn, &mut sink).await.unwrap_err();
        assert!(matches!(err, Error::Catalog(_)));
        assert!(!sink.finished);
    }

    #[tokio::test]
    async fn test_continue_on_error_records_the_failure() {
        let mut conn = simple_conn((0..3).map(simple_row).collect());
        let mut sink = MemorySink::new();
        let runner = SnapshotRunner::new(vec![
            TableConfig::builder("public", "bad")
                .exclude_column("pk")
                .build(),
            TableConfig::builder("public", "t").build(),
        ])
        .continue_on_error(true);

        let outcomes = runner.run(&mut conn, &mut sink).await.unwrap();

        assert!(matches!(
            outcomes.get("public.bad"),
            Some(TableOutcome::Failed(_))
        ));
        assert_eq!(
            outcomes.get("public.t"),
            Some(&TableOutcome::Completed { rows: 3 })
        );
        assert_eq!(runner.stats().tables_failed, 1);
    }

    #[tokio::test]
    async fn test_cancellation_fails_the_run() {
        let mut conn = simple_conn((0..3).map(simple_row).collect());
        let mut sink = MemorySink::new();
        let runner = SnapshotRunner::new(vec![TableConfig::builder("public", "t").build()]);
        runner.cancel_flag().cancel();

        let err = runner.run(&mut conn, &mut sink).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
