use std::fmt;

use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::sync_error;

/// Alias for the derived table a count query wraps.
const COUNT_ALIAS: &str = "ROWSYNC_T";

/// Vendor-specific SQL generation capabilities.
///
/// One implementation exists per supported engine. The command builder asks the dialect
/// for identifier quoting, parameter placeholders, and the pagination and count forms;
/// everything else about a statement is dialect-neutral.
pub trait SqlDialect: Send + Sync {
    /// Dialect name as it appears in configuration.
    fn name(&self) -> &'static str;

    /// Quotes a table or column identifier.
    fn quote(&self, ident: &str) -> String;

    /// Placeholder for the `index`-th positional parameter, 1-based.
    fn placeholder(&self, index: usize) -> String;

    /// Wraps a filtered projection in the dialect's page form.
    ///
    /// The returned statement carries exactly two positional parameters whose values
    /// come from [`SqlDialect::page_args`]. `pk` is the quoted ordering key and may be
    /// empty when the source is a view without one.
    fn page_query(&self, base: &str, pk: &str) -> String;

    /// Bind values for the two pagination parameters, in bind order.
    ///
    /// Pages are 1-indexed.
    fn page_args(&self, page_index: u64, page_size: u64) -> [u64; 2];

    /// Wraps a key projection in the dialect's count form.
    fn count_query(&self, inner: &str) -> String {
        format!("SELECT COUNT(1) FROM ({inner}) {COUNT_ALIAS}")
    }
}

impl fmt::Debug for dyn SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// MySQL dialect: backquote quoting, `?` placeholders, `LIMIT offset, size` pagination.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn page_query(&self, base: &str, _pk: &str) -> String {
        format!("{base} LIMIT ?, ?")
    }

    fn page_args(&self, page_index: u64, page_size: u64) -> [u64; 2] {
        [(page_index - 1) * page_size, page_size]
    }
}

/// PostgreSQL dialect: double-quote quoting, `$n` placeholders, `LIMIT`/`OFFSET`
/// pagination ordered by the primary key.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn page_query(&self, base: &str, pk: &str) -> String {
        if pk.is_empty() {
            format!("{base} LIMIT $1 OFFSET $2")
        } else {
            format!("{base} ORDER BY {pk} LIMIT $1 OFFSET $2")
        }
    }

    fn page_args(&self, page_index: u64, page_size: u64) -> [u64; 2] {
        [page_size, (page_index - 1) * page_size]
    }
}

/// SQL Server dialect: bracket quoting, `?` placeholders, `ROW_NUMBER()` window
/// pagination bounded by an inclusive row range.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl SqlDialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn page_query(&self, base: &str, pk: &str) -> String {
        // OVER requires an ordering; (SELECT NULL) keeps the window legal without one.
        let order = if pk.is_empty() { "(SELECT NULL)" } else { pk };
        format!(
            "SELECT * FROM (SELECT ROW_NUMBER() OVER (ORDER BY {order}) AS ROW_ID, S.* \
             FROM ({base}) S) T WHERE T.ROW_ID BETWEEN ? AND ?"
        )
    }

    fn page_args(&self, page_index: u64, page_size: u64) -> [u64; 2] {
        [(page_index - 1) * page_size + 1, page_index * page_size]
    }
}

/// Resolves a dialect by its configuration name.
///
/// Unknown names fail here, before any connection is attempted.
pub fn dialect_for(name: &str) -> SyncResult<&'static dyn SqlDialect> {
    match name.to_ascii_lowercase().as_str() {
        "mysql" => Ok(&MySqlDialect),
        "postgres" | "postgresql" => Ok(&PostgresDialect),
        "sqlserver" | "mssql" => Ok(&SqlServerDialect),
        other => Err(sync_error!(
            ErrorKind::DialectError,
            "Unknown SQL dialect",
            other
        )),
    }
}
