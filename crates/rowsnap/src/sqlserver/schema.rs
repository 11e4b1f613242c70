//! SQL Server source connection
//!
//! TDS connection handling via Tiberius, catalog introspection through
//! `INFORMATION_SCHEMA`, TOP-1 PK bounds, and batched scan fetch with
//! lexicographically expanded tuple predicates.

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::common::{
    ColumnSpec, Dialect, Error, PkBounds, Result, Row, SourceConnection, SqlValue, TableRef,
    TypeOpts,
};
use crate::sqlserver::decode::{bind_param, decode_row, normalize_key_value};
use crate::sqlserver::types::{dispatch, parse_mssql_type};

// INFORMATION_SCHEMA precision columns come back as tinyint/smallint;
// cast everything to INT so decoding is uniform
const DESCRIBE_COLUMNS_SQL: &str = r#"
    SELECT
        c.COLUMN_NAME,
        c.DATA_TYPE,
        CAST(c.NUMERIC_PRECISION AS INT),
        CAST(c.NUMERIC_SCALE AS INT),
        CAST(c.DATETIME_PRECISION AS INT),
        CAST(c.CHARACTER_MAXIMUM_LENGTH AS INT)
    FROM INFORMATION_SCHEMA.COLUMNS c
    WHERE c.TABLE_SCHEMA = @P1 AND c.TABLE_NAME = @P2
    ORDER BY c.ORDINAL_POSITION
"#;

const PRIMARY_KEYS_SQL: &str = r#"
    SELECT ku.COLUMN_NAME
    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
        ON tc.CONSTRAINT_NAME = ku.CONSTRAINT_NAME
        AND tc.TABLE_SCHEMA = ku.TABLE_SCHEMA
        AND tc.TABLE_NAME = ku.TABLE_NAME
    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
        AND tc.TABLE_SCHEMA = @P1 AND tc.TABLE_NAME = @P2
    ORDER BY ku.ORDINAL_POSITION
"#;

const ESTIMATE_SQL: &str = r#"
    SELECT CAST(SUM(p.rows) AS BIGINT)
    FROM sys.partitions p
    JOIN sys.objects o ON o.object_id = p.object_id
    JOIN sys.schemas s ON s.schema_id = o.schema_id
    WHERE s.name = @P1 AND o.name = @P2 AND p.index_id IN (0, 1)
"#;

/// Connection settings for SQL Server.
#[derive(Debug, Clone)]
pub struct SqlServerConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
    pub application_name: String,
}

impl Default for SqlServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1433,
            database: "master".to_string(),
            username: "sa".to_string(),
            password: String::new(),
            encrypt: true,
            trust_server_certificate: false,
            application_name: "rowsnap".to_string(),
        }
    }
}

/// SQL Server implementation of [`SourceConnection`].
pub struct SqlServerSource {
    client: Client<Compat<TcpStream>>,
    database: String,
}

impl SqlServerSource {
    /// Connect to SQL Server.
    pub async fn connect(config: &SqlServerConfig) -> Result<Self> {
        debug!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "connecting to sql server"
        );

        let mut tiberius_config = Config::new();
        tiberius_config.host(&config.host);
        tiberius_config.port(config.port);
        tiberius_config.database(&config.database);
        tiberius_config.application_name(&config.application_name);
        tiberius_config.authentication(AuthMethod::sql_server(&config.username, &config.password));

        if config.encrypt {
            tiberius_config.encryption(EncryptionLevel::Required);
            if config.trust_server_certificate {
                tiberius_config.trust_cert();
            }
        } else {
            tiberius_config.encryption(EncryptionLevel::NotSupported);
        }

        let tcp = TcpStream::connect(tiberius_config.get_addr())
            .await
            .map_err(|e| Error::query_with_source("sql server tcp connect failed", e))?;
        tcp.set_nodelay(true)
            .map_err(|e| Error::query_with_source("failed to set nodelay", e))?;

        let client = Client::connect(tiberius_config, tcp.compat_write())
            .await
            .map_err(|e| Error::query_with_source("sql server handshake failed", e))?;

        info!(database = %config.database, "sql server source connected");
        Ok(Self {
            client,
            database: config.database.clone(),
        })
    }

    async fn run_query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<tiberius::Row>> {
        let normalized: Vec<SqlValue> = params.iter().map(normalize_key_value).collect();
        let mut query = Query::new(sql.to_string());
        for value in &normalized {
            bind_param(&mut query, value);
        }
        let stream = query
            .query(&mut self.client)
            .await
            .map_err(|e| Error::query_with_source("query failed", e))?;
        stream
            .into_first_result()
            .await
            .map_err(|e| Error::query_with_source("result fetch failed", e))
    }

    async fn query_bounds(
        &mut self,
        table: &TableRef,
        pk_columns: &[ColumnSpec],
        ascending: bool,
    ) -> Result<Option<Vec<SqlValue>>> {
        let names: Vec<String> = pk_columns.iter().map(|c| c.name.clone()).collect();
        let sql = Dialect::SqlServer.build_bounds_query(table, &names, ascending);
        let rows = self.run_query(&sql, &[]).await?;
        match rows.first() {
            Some(row) => Ok(Some(decode_row(pk_columns, row)?.values().to_vec())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SourceConnection for SqlServerSource {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    fn database(&self) -> &str {
        &self.database
    }

    async fn describe_columns(&mut self, table: &TableRef) -> Result<Vec<ColumnSpec>> {
        let params = [
            SqlValue::String(table.schema.clone()),
            SqlValue::String(table.name.clone()),
        ];
        let rows = self.run_query(DESCRIBE_COLUMNS_SQL, &params).await?;

        if rows.is_empty() {
            return Err(Error::catalog(format!("table {table} has no columns")));
        }

        let mut specs = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row
                .try_get::<&str, usize>(0)
                .map_err(|e| Error::catalog(e.to_string()))?
                .map(str::to_string)
                .ok_or_else(|| Error::catalog("column name is null"))?;
            let data_type: String = row
                .try_get::<&str, usize>(1)
                .map_err(|e| Error::catalog(e.to_string()))?
                .map(str::to_string)
                .ok_or_else(|| Error::catalog("data type is null"))?;
            let opts = TypeOpts {
                precision: get_u32(&row, 2)?,
                scale: get_u32(&row, 3)?,
                datetime_precision: get_u32(&row, 4)?,
                size: get_u32(&row, 5)?,
            };

            let ty = parse_mssql_type(&data_type, &opts)
                .map_err(|detail| Error::type_dispatch(&name, detail))?;
            let converter = dispatch(&name, &ty)?;
            specs.push(ColumnSpec::new(name, converter));
        }

        debug!(table = %table, columns = specs.len(), "described columns");
        Ok(specs)
    }

    async fn primary_key_columns(&mut self, table: &TableRef) -> Result<Vec<String>> {
        let params = [
            SqlValue::String(table.schema.clone()),
            SqlValue::String(table.name.clone()),
        ];
        let rows = self.run_query(PRIMARY_KEYS_SQL, &params).await?;

        rows.iter()
            .map(|row| {
                row.try_get::<&str, usize>(0)
                    .map_err(|e| Error::catalog(e.to_string()))?
                    .map(str::to_string)
                    .ok_or_else(|| Error::catalog("primary key column name is null"))
            })
            .collect()
    }

    async fn pk_bounds(&mut self, table: &TableRef, pk_columns: &[ColumnSpec]) -> Result<PkBounds> {
        let min = self.query_bounds(table, pk_columns, true).await?;
        let max = self.query_bounds(table, pk_columns, false).await?;
        match (min, max) {
            (Some(min), Some(max)) => Ok(PkBounds { min, max }),
            _ => Err(Error::EmptyTable {
                schema: table.schema.clone(),
                table: table.name.clone(),
            }),
        }
    }

    async fn estimate_row_count(&mut self, table: &TableRef) -> Result<Option<u64>> {
        let params = [
            SqlValue::String(table.schema.clone()),
            SqlValue::String(table.name.clone()),
        ];
        let rows = self.run_query(ESTIMATE_SQL, &params).await?;
        Ok(rows
            .first()
            .and_then(|row| row.try_get::<i64, usize>(0).ok().flatten())
            .filter(|n| *n >= 0)
            .map(|n| n as u64))
    }

    async fn fetch_batch(
        &mut self,
        sql: &str,
        columns: &[ColumnSpec],
        starts: &[SqlValue],
        ends: &[SqlValue],
    ) -> Result<Vec<Row>> {
        let params: Vec<SqlValue> = starts.iter().chain(ends).cloned().collect();
        let rows = self.run_query(sql, &params).await?;
        rows.iter().map(|row| decode_row(columns, row)).collect()
    }
}

fn get_u32(row: &tiberius::Row, idx: usize) -> Result<Option<u32>> {
    Ok(row
        .try_get::<i32, usize>(idx)
        .map_err(|e| Error::catalog(e.to_string()))?
        .and_then(|v| u32::try_from(v).ok()))
}
