//! SQL dialect abstraction
//!
//! Vendor-specific SQL generation for the key-range scan: identifier
//! quoting, parameter placeholders, pagination syntax, and the
//! composite-tuple bound predicate. Everything here is pure string
//! assembly — parameters are always bound through the driver, never
//! interpolated.
//!
//! PostgreSQL and MySQL get native row-constructor comparisons. SQL Server
//! has no row constructors, so the tuple comparison is expanded into its
//! lexicographic OR form; the same placeholder may appear several times in
//! the text, but the bound parameter vector is still exactly
//! (starts..., ends...).

use serde::{Deserialize, Serialize};

/// A schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Schema (PostgreSQL/SQL Server) or database (MySQL)
    pub schema: String,
    /// Table name
    pub name: String,
}

impl TableRef {
    /// Create a new table reference.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Source dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    MySql,
    SqlServer,
}

impl Dialect {
    /// Connector name used in the event `source` block.
    pub fn connector(&self) -> &'static str {
        match self {
            Self::Postgres => "postgresql",
            Self::MySql => "mysql",
            Self::SqlServer => "sqlserver",
        }
    }

    /// Quote an identifier, doubling any embedded quote character.
    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", name.replace('`', "``")),
            Self::Postgres | Self::SqlServer => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Quote a schema-qualified table name.
    pub fn quote_table(&self, table: &TableRef) -> String {
        format!(
            "{}.{}",
            self.quote_ident(&table.schema),
            self.quote_ident(&table.name)
        )
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::MySql => "?".to_string(),
            Self::SqlServer => format!("@P{index}"),
        }
    }

    /// Build the key-range scan query.
    ///
    /// The WHERE clause compares the PK tuple against the starting values
    /// with `>=` on the first batch and `>` afterwards, and against the
    /// ending values with `<=`. Parameters are bound in the order: all
    /// starting values, then all ending values (`2 × |PK|` total).
    pub fn build_scan_query(
        &self,
        table: &TableRef,
        pk_columns: &[String],
        select_columns: &[String],
        batch_size: usize,
        first_batch: bool,
    ) -> String {
        let cols = select_columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(",");
        let order = pk_columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(",");

        let lower_cmp = if first_batch { ">=" } else { ">" };
        let lower = self.tuple_predicate(pk_columns, lower_cmp, 0);
        let upper = self.tuple_predicate(pk_columns, "<=", pk_columns.len());

        match self {
            Self::Postgres | Self::MySql => format!(
                "SELECT {cols} FROM {table} WHERE {lower} AND {upper} ORDER BY {order} LIMIT {batch_size}",
                table = self.quote_table(table),
            ),
            Self::SqlServer => format!(
                "SELECT TOP {batch_size} {cols} FROM {table} WHERE {lower} AND {upper} ORDER BY {order}",
                table = self.quote_table(table),
            ),
        }
    }

    /// Build the PK bounds query (`ascending` for the minimum, descending
    /// for the maximum).
    pub fn build_bounds_query(
        &self,
        table: &TableRef,
        pk_columns: &[String],
        ascending: bool,
    ) -> String {
        let cols = pk_columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(",");
        let dir = if ascending { "ASC" } else { "DESC" };
        let order = pk_columns
            .iter()
            .map(|c| format!("{} {dir}", self.quote_ident(c)))
            .collect::<Vec<_>>()
            .join(",");

        match self {
            Self::Postgres | Self::MySql => format!(
                "SELECT {cols} FROM {table} ORDER BY {order} LIMIT 1",
                table = self.quote_table(table),
            ),
            Self::SqlServer => format!(
                "SELECT TOP 1 {cols} FROM {table} ORDER BY {order}",
                table = self.quote_table(table),
            ),
        }
    }

    /// Tuple comparison against parameters `param_offset+1 ..= param_offset+n`.
    ///
    /// `cmp` applies to the full tuple (`>=`, `>` or `<=`).
    fn tuple_predicate(&self, pk_columns: &[String], cmp: &str, param_offset: usize) -> String {
        match self {
            Self::Postgres | Self::MySql => {
                let lhs = pk_columns
                    .iter()
                    .map(|c| self.quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(",");
                let rhs = (1..=pk_columns.len())
                    .map(|i| self.placeholder(param_offset + i))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("({lhs}) {cmp} ({rhs})")
            }
            // No row constructors in T-SQL: expand lexicographically. The
            // strict comparator drops the '=' everywhere but the last
            // position, where the tuple comparator applies as-is.
            Self::SqlServer => {
                let strict = &cmp[..1];
                let n = pk_columns.len();
                let clauses: Vec<String> = (0..n)
                    .map(|i| {
                        let mut parts: Vec<String> = (0..i)
                            .map(|j| {
                                format!(
                                    "{} = {}",
                                    self.quote_ident(&pk_columns[j]),
                                    self.placeholder(param_offset + j + 1)
                                )
                            })
                            .collect();
                        let op = if i == n - 1 { cmp } else { strict };
                        parts.push(format!(
                            "{} {op} {}",
                            self.quote_ident(&pk_columns[i]),
                            self.placeholder(param_offset + i + 1)
                        ));
                        format!("({})", parts.join(" AND "))
                    })
                    .collect();
                format!("({})", clauses.join(" OR "))
            }
        }
    }
}

/// Number of bound parameters a scan query takes.
pub fn scan_param_count(pk_len: usize) -> usize {
    2 * pk_len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(Dialect::Postgres.quote_ident("users"), "\"users\"");
        assert_eq!(Dialect::SqlServer.quote_ident("users"), "\"users\"");
        assert_eq!(Dialect::MySql.quote_ident("users"), "`users`");

        // Embedded quotes are doubled.
        assert_eq!(Dialect::Postgres.quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(Dialect::MySql.quote_ident("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_placeholder_styles() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::MySql.placeholder(3), "?");
        assert_eq!(Dialect::SqlServer.placeholder(3), "@P3");
    }

    #[test]
    fn test_postgres_scan_query_first_batch() {
        let sql = Dialect::Postgres.build_scan_query(
            &TableRef::new("public", "t"),
            &pk(&["a", "b"]),
            &pk(&["a", "b", "v"]),
            25,
            true,
        );
        assert_eq!(
            sql,
            "SELECT \"a\",\"b\",\"v\" FROM \"public\".\"t\" \
             WHERE (\"a\",\"b\") >= ($1,$2) AND (\"a\",\"b\") <= ($3,$4) \
             ORDER BY \"a\",\"b\" LIMIT 25"
        );
    }

    #[test]
    fn test_postgres_scan_query_subsequent_batches_are_exclusive() {
        let sql = Dialect::Postgres.build_scan_query(
            &TableRef::new("public", "t"),
            &pk(&["a"]),
            &pk(&["a"]),
            10,
            false,
        );
        assert!(sql.contains("(\"a\") > ($1)"));
        assert!(!sql.contains(">="));
    }

    #[test]
    fn test_mysql_scan_query() {
        let sql = Dialect::MySql.build_scan_query(
            &TableRef::new("mydb", "t"),
            &pk(&["id"]),
            &pk(&["id", "v"]),
            5,
            true,
        );
        assert_eq!(
            sql,
            "SELECT `id`,`v` FROM `mydb`.`t` WHERE (`id`) >= (?) AND (`id`) <= (?) \
             ORDER BY `id` LIMIT 5"
        );
    }

    #[test]
    fn test_sqlserver_scan_query_uses_top() {
        let sql = Dialect::SqlServer.build_scan_query(
            &TableRef::new("dbo", "t"),
            &pk(&["id"]),
            &pk(&["id"]),
            5,
            true,
        );
        assert_eq!(
            sql,
            "SELECT TOP 5 \"id\" FROM \"dbo\".\"t\" \
             WHERE ((\"id\" >= @P1)) AND ((\"id\" <= @P2)) ORDER BY \"id\""
        );
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_sqlserver_composite_expansion() {
        let sql = Dialect::SqlServer.build_scan_query(
            &TableRef::new("dbo", "t"),
            &pk(&["a", "b"]),
            &pk(&["a", "b"]),
            2,
            false,
        );
        // Lower bound: (a > @P1) OR (a = @P1 AND b > @P2)
        assert!(sql.contains("(\"a\" > @P1) OR (\"a\" = @P1 AND \"b\" > @P2)"));
        // Upper bound: (a < @P3) OR (a = @P3 AND b <= @P4)
        assert!(sql.contains("(\"a\" < @P3) OR (\"a\" = @P3 AND \"b\" <= @P4)"));
    }

    #[test]
    fn test_sqlserver_inclusive_first_batch_expansion() {
        let sql = Dialect::SqlServer.build_scan_query(
            &TableRef::new("dbo", "t"),
            &pk(&["a", "b"]),
            &pk(&["a", "b"]),
            2,
            true,
        );
        assert!(sql.contains("(\"a\" > @P1) OR (\"a\" = @P1 AND \"b\" >= @P2)"));
    }

    #[test]
    fn test_scan_parameter_contract() {
        // Invariant: 2 × |PK| parameters, starts then ends.
        assert_eq!(scan_param_count(3), 6);
        let sql = Dialect::Postgres.build_scan_query(
            &TableRef::new("public", "t"),
            &pk(&["a", "b", "c"]),
            &pk(&["a", "b", "c"]),
            1,
            true,
        );
        assert!(sql.contains(">= ($1,$2,$3)"));
        assert!(sql.contains("<= ($4,$5,$6)"));
    }

    #[test]
    fn test_bounds_queries() {
        let t = TableRef::new("public", "t");
        assert_eq!(
            Dialect::Postgres.build_bounds_query(&t, &pk(&["a", "b"]), true),
            "SELECT \"a\",\"b\" FROM \"public\".\"t\" ORDER BY \"a\" ASC,\"b\" ASC LIMIT 1"
        );
        assert_eq!(
            Dialect::SqlServer.build_bounds_query(&TableRef::new("dbo", "t"), &pk(&["a"]), false),
            "SELECT TOP 1 \"a\" FROM \"dbo\".\"t\" ORDER BY \"a\" DESC"
        );
    }

    #[test]
    fn test_connector_names() {
        assert_eq!(Dialect::Postgres.connector(), "postgresql");
        assert_eq!(Dialect::MySql.connector(), "mysql");
        assert_eq!(Dialect::SqlServer.connector(), "sqlserver");
    }
}
