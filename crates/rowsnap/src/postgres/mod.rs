//! # PostgreSQL source
//!
//! Snapshot source for PostgreSQL via tokio-postgres.
//!
//! - Catalog introspection through `information_schema` plus `pg_catalog`
//!   for type kinds and modifiers
//! - Primary keys in index order via `pg_index`
//! - Keyset pagination with native row-constructor comparisons
//! - Hand-decoded wire formats for interval, bit strings, hstore, money,
//!   point, ranges and PostGIS payloads
//!
//! Ranges, hstore and geometry/geography require the matching server
//! extensions.
//!
//! # Example
//!
//! ```rust,ignore
//! use rowsnap::postgres::PostgresSource;
//! use rowsnap::{SnapshotRunner, StdoutSink, TableConfig};
//!
//! let mut conn = PostgresSource::connect("postgres://localhost/mydb").await?;
//! let mut sink = StdoutSink::new();
//! let runner = SnapshotRunner::new(vec![
//!     TableConfig::builder("public", "users").build(),
//! ]);
//! runner.run(&mut conn, &mut sink).await?;
//! ```

mod decode;
mod schema;
mod types;

pub use decode::{bind_param, decode_row};
pub use schema::PostgresSource;
pub use types::{dispatch, parse_pg_type, PgType};
