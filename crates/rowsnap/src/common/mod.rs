//! # Common snapshot types
//!
//! Database-agnostic pieces of the snapshot pipeline:
//!
//! - [`SqlValue`] / [`Row`] - driver-native value model
//! - [`Keys`] - primary-key scan cursor
//! - [`Converter`] - value converter catalog
//! - [`Dialect`] - quoting, placeholders and scan-query assembly
//! - [`SourceConnection`] - capability record the scanner is generic over
//! - [`TableScanner`] - bounded, batched key-range pagination
//! - [`RowTransformer`] - row → envelope transformation
//! - [`SnapshotRunner`] - multi-table writer loop
//! - [`Sink`] - destination contract
//! - [`RetryPolicy`] - per-batch retry envelope
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     Per-table pipeline                    │
//! ├───────────────────────────────────────────────────────────┤
//! │ SourceConnection ──▶ TableScanner ──▶ RowTransformer ──▶  │
//! │  (introspection,      (bounds, keyset     (converters,    │
//! │   batch fetch)         pagination,         envelope,      │
//! │                        retry, cancel)      partition key) │
//! │                                        ──▶ Sink           │
//! └───────────────────────────────────────────────────────────┘
//! ```

mod config;
mod convert;
mod dialect;
mod envelope;
mod error;
mod keys;
mod retry;
mod scan;
mod sink;
mod source;
mod transform;
mod value;
mod writer;

pub use config::{TableConfig, TableConfigBuilder};
pub use convert::{semantic, Converter, MICROS_PER_MONTH};
pub use dialect::{scan_param_count, Dialect, TableRef};
pub use envelope::{
    EventPayload, EventSchema, FieldDescriptor, FieldType, Op, RawMessage, SchemaEventPayload,
    SourceMetadata,
};
pub use error::{Error, ErrorCategory, Result};
pub use keys::{Key, Keys};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use scan::{CancelFlag, TableScanner};
pub use sink::{MemorySink, Sink, StdoutSink};
pub use source::{ColumnSpec, PkBounds, SourceConnection, TypeOpts};
pub use transform::RowTransformer;
pub use value::{Row, SqlValue};
pub use writer::{run_table, ScanStats, ScanStatsSnapshot, SnapshotRunner, TableOutcome};
