//! # SQL Server source
//!
//! Snapshot source for Microsoft SQL Server via Tiberius (TDS).
//!
//! - Catalog introspection through `INFORMATION_SCHEMA`
//! - Pagination with `SELECT TOP n`; the composite-tuple bound predicate is
//!   expanded into its lexicographic OR form because T-SQL has no row
//!   constructors
//! - Temporal primary-key values are pre-formatted to text before binding
//!   (the driver has no native time parameter binding)
//!
//! # Example
//!
//! ```rust,ignore
//! use rowsnap::sqlserver::{SqlServerConfig, SqlServerSource};
//! use rowsnap::{SnapshotRunner, StdoutSink, TableConfig};
//!
//! let config = SqlServerConfig {
//!     host: "localhost".into(),
//!     database: "mydb".into(),
//!     username: "sa".into(),
//!     password: "secret".into(),
//!     ..Default::default()
//! };
//! let mut conn = SqlServerSource::connect(&config).await?;
//! let mut sink = StdoutSink::new();
//! let runner = SnapshotRunner::new(vec![
//!     TableConfig::builder("dbo", "users").build(),
//! ]);
//! runner.run(&mut conn, &mut sink).await?;
//! ```

mod decode;
mod schema;
mod types;

pub use decode::{decode_row, normalize_key_value};
pub use schema::{SqlServerConfig, SqlServerSource};
pub use types::{dispatch, parse_mssql_type, MsSqlType};
