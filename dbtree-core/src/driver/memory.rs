//! In-process driver backed by plain vectors.
//!
//! Catalogs, tables and rows keep insertion order, which stands in for the
//! "driver order" a real server reports. Every successful `connect()` and
//! every `close()` is counted so callers can check that connections are
//! released on all paths, and failures can be injected at each call.

use super::{CellValue, Driver, DriverConnection, Endpoint, ResultSet, like_matches};
use crate::Result;
use crate::error::{DbTreeError, DriverMessage};
use crate::models::DriverKind;
use crate::security::Credentials;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const SELECT_ALL_PREFIX: &str = "SELECT * FROM ";

/// A table with a fixed column list and rows.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTable {
    /// Table name
    pub name: String,
    /// Column names in result order
    pub columns: Vec<String>,
    /// Rows in retrieval order
    pub rows: Vec<Vec<CellValue>>,
}

impl MemoryTable {
    /// A table with `columns` and no rows.
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row of cell values.
    pub fn with_row(mut self, row: impl IntoIterator<Item = CellValue>) -> Self {
        self.rows.push(row.into_iter().collect());
        self
    }

    /// Appends a row of text values.
    pub fn with_text_row<I, S>(self, row: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_row(row.into_iter().map(|v| CellValue::Text(v.into())))
    }
}

/// A catalog holding tables in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryCatalog {
    /// Catalog name
    pub name: String,
    /// Tables in insertion order
    pub tables: Vec<MemoryTable>,
}

impl MemoryCatalog {
    /// An empty catalog.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    /// Adds a table after any existing ones.
    pub fn with_table(mut self, table: MemoryTable) -> Self {
        self.tables.push(table);
        self
    }

    fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Connect/close bookkeeping shared by a driver and its connections.
#[derive(Debug, Default)]
pub struct ConnectionCounters {
    connect_attempts: AtomicUsize,
    connects: AtomicUsize,
    closes: AtomicUsize,
    queries: AtomicUsize,
}

impl ConnectionCounters {
    /// Calls to `connect()`, including rejected ones.
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Connections successfully opened.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Connections closed.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Statements passed to `execute_query`.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Connections opened but not yet closed.
    pub fn open(&self) -> usize {
        self.connects().saturating_sub(self.closes())
    }
}

#[derive(Debug, Clone, Default)]
struct FailurePlan {
    unreachable: bool,
    rejected_catalogs: HashSet<String>,
    catalog_listing: bool,
    table_listing: HashSet<String>,
    queries: HashSet<String>,
}

/// In-memory driver with call counting and failure injection.
///
/// # Example
/// ```rust
/// use dbtree_core::driver::{MemoryCatalog, MemoryDriver, MemoryTable};
///
/// let driver = MemoryDriver::new().with_catalog(
///     MemoryCatalog::new("pets").with_table(
///         MemoryTable::new("dogs", ["name"]).with_text_row(["Rex"]),
///     ),
/// );
/// assert_eq!(driver.counters().connects(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    catalogs: Arc<Vec<MemoryCatalog>>,
    failures: Arc<FailurePlan>,
    query_delay: Option<Duration>,
    counters: Arc<ConnectionCounters>,
}

impl MemoryDriver {
    /// A driver with no catalogs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a catalog after any existing ones.
    pub fn with_catalog(mut self, catalog: MemoryCatalog) -> Self {
        Arc::make_mut(&mut self.catalogs).push(catalog);
        self
    }

    /// Makes every `connect()` fail as if the host were down.
    pub fn unreachable(mut self) -> Self {
        Arc::make_mut(&mut self.failures).unreachable = true;
        self
    }

    /// Makes connections scoped to `catalog` fail as if access were denied.
    pub fn reject_catalog(mut self, catalog: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.failures)
            .rejected_catalogs
            .insert(catalog.into());
        self
    }

    /// Makes `list_catalogs()` fail.
    pub fn fail_catalog_listing(mut self) -> Self {
        Arc::make_mut(&mut self.failures).catalog_listing = true;
        self
    }

    /// Makes `list_tables()` fail inside `catalog`.
    pub fn fail_table_listing(mut self, catalog: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.failures)
            .table_listing
            .insert(catalog.into());
        self
    }

    /// Makes any statement against `table` fail.
    pub fn fail_queries_on(mut self, table: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.failures)
            .queries
            .insert(table.into());
        self
    }

    /// Delays every statement by `delay` before answering.
    pub const fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = Some(delay);
        self
    }

    /// Call counters shared with every connection this driver opened.
    pub fn counters(&self) -> Arc<ConnectionCounters> {
        Arc::clone(&self.counters)
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Memory
    }

    async fn connect(
        &self,
        endpoint: &Endpoint,
        _credentials: &Credentials,
    ) -> Result<Box<dyn DriverConnection>> {
        self.counters
            .connect_attempts
            .fetch_add(1, Ordering::SeqCst);

        if self.failures.unreachable {
            return Err(DbTreeError::connection_failed(
                endpoint.to_string(),
                DriverMessage::new("Communications link failure"),
            ));
        }

        if let Some(catalog) = &endpoint.catalog {
            if self.failures.rejected_catalogs.contains(catalog) {
                return Err(DbTreeError::connection_failed(
                    endpoint.to_string(),
                    DriverMessage::new(format!("Access denied to database '{}'", catalog)),
                ));
            }
            if !self.catalogs.iter().any(|c| &c.name == catalog) {
                return Err(DbTreeError::connection_failed(
                    endpoint.to_string(),
                    DriverMessage::new(format!("Unknown database '{}'", catalog)),
                ));
            }
        }

        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            catalog: endpoint.catalog.clone(),
            catalogs: Arc::clone(&self.catalogs),
            failures: Arc::clone(&self.failures),
            query_delay: self.query_delay,
            counters: Arc::clone(&self.counters),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    catalog: Option<String>,
    catalogs: Arc<Vec<MemoryCatalog>>,
    failures: Arc<FailurePlan>,
    query_delay: Option<Duration>,
    counters: Arc<ConnectionCounters>,
    closed: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DbTreeError::query_failed(
                "memory connection",
                DriverMessage::new("connection already closed"),
            ));
        }
        Ok(())
    }

    fn scoped_catalog(&self) -> Result<&MemoryCatalog> {
        let name = self.catalog.as_deref().ok_or_else(|| {
            DbTreeError::query_failed("memory connection", DriverMessage::new("No database selected"))
        })?;
        self.catalogs
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| {
                DbTreeError::query_failed(
                    "memory connection",
                    DriverMessage::new(format!("Unknown database '{}'", name)),
                )
            })
    }
}

/// Extracts the table name from `SELECT * FROM `name``.
fn parse_select_all(sql: &str) -> Option<String> {
    let quoted = sql.strip_prefix(SELECT_ALL_PREFIX)?.trim();
    let inner = quoted.strip_prefix('`')?.strip_suffix('`')?;
    if inner.replace("``", "").contains('`') {
        return None;
    }
    Some(inner.replace("``", "`"))
}

#[async_trait]
impl DriverConnection for MemoryConnection {
    async fn list_catalogs(&mut self) -> Result<Vec<String>> {
        self.ensure_open()?;
        if self.failures.catalog_listing {
            return Err(DbTreeError::query_failed(
                "list catalogs",
                DriverMessage::new("SHOW DATABASES denied"),
            ));
        }
        Ok(self.catalogs.iter().map(|c| c.name.clone()).collect())
    }

    async fn list_tables(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let catalog = self.scoped_catalog()?;
        if self.failures.table_listing.contains(&catalog.name) {
            return Err(DbTreeError::query_failed(
                format!("list tables in '{}'", catalog.name),
                DriverMessage::new("table metadata unavailable"),
            ));
        }
        Ok(catalog
            .tables
            .iter()
            .filter(|t| like_matches(pattern, &t.name))
            .map(|t| t.name.clone())
            .collect())
    }

    async fn execute_query(&mut self, sql: &str) -> Result<ResultSet> {
        self.ensure_open()?;
        self.counters.queries.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.query_delay {
            tokio::time::sleep(delay).await;
        }

        let table_name = parse_select_all(sql).ok_or_else(|| {
            DbTreeError::query_failed(
                sql.to_string(),
                DriverMessage::new("You have an error in your SQL syntax"),
            )
        })?;

        if self.failures.queries.contains(&table_name) {
            return Err(DbTreeError::query_failed(
                sql.to_string(),
                DriverMessage::new(format!("SELECT command denied for table '{}'", table_name)),
            ));
        }

        let catalog = self.scoped_catalog()?;
        let table = catalog.table(&table_name).ok_or_else(|| {
            DbTreeError::query_failed(
                sql.to_string(),
                DriverMessage::new(format!(
                    "Table '{}.{}' doesn't exist",
                    catalog.name, table_name
                )),
            )
        })?;

        let mut result = ResultSet::with_column_names(table.columns.iter().cloned());
        result.rows = table.rows.clone();
        Ok(result)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pets_driver() -> MemoryDriver {
        MemoryDriver::new()
            .with_catalog(MemoryCatalog::new("mysql").with_table(MemoryTable::new("user", ["User"])))
            .with_catalog(
                MemoryCatalog::new("pets")
                    .with_table(
                        MemoryTable::new("dogs", ["id", "name"])
                            .with_row([CellValue::Integer(1), CellValue::Text("Rex".into())]),
                    )
                    .with_table(MemoryTable::new("cats", ["name"])),
            )
    }

    fn endpoint(catalog: Option<&str>) -> Endpoint {
        Endpoint {
            host: "localhost".to_string(),
            port: None,
            catalog: catalog.map(str::to_string),
        }
    }

    fn creds() -> Credentials {
        Credentials::new("root".to_string(), None)
    }

    #[test]
    fn test_parse_select_all() {
        assert_eq!(parse_select_all("SELECT * FROM `dogs`"), Some("dogs".to_string()));
        assert_eq!(parse_select_all("SELECT * FROM `a``b`"), Some("a`b".to_string()));
        assert_eq!(parse_select_all("SELECT * FROM dogs"), None);
        assert_eq!(parse_select_all("SELECT * FROM `a`b`"), None);
        assert_eq!(parse_select_all("DELETE FROM `dogs`"), None);
    }

    #[tokio::test]
    async fn test_connect_and_close_are_counted() {
        let driver = pets_driver();
        let counters = driver.counters();

        let mut conn = driver.connect(&endpoint(Some("pets")), &creds()).await.unwrap();
        assert_eq!(counters.connects(), 1);
        assert_eq!(counters.open(), 1);

        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(counters.closes(), 1);
        assert_eq!(counters.open(), 0);
    }

    #[tokio::test]
    async fn test_unknown_catalog_is_connection_error() {
        let driver = pets_driver();
        let err = driver
            .connect(&endpoint(Some("nope")), &creds())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Connection);
        assert_eq!(driver.counters().connect_attempts(), 1);
        assert_eq!(driver.counters().connects(), 0);
    }

    #[tokio::test]
    async fn test_list_tables_in_insertion_order() {
        let driver = pets_driver();
        let mut conn = driver.connect(&endpoint(Some("pets")), &creds()).await.unwrap();
        assert_eq!(conn.list_tables("%").await.unwrap(), vec!["dogs", "cats"]);
        assert_eq!(conn.list_tables("c%").await.unwrap(), vec!["cats"]);
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_tables_without_catalog_fails() {
        let driver = pets_driver();
        let mut conn = driver.connect(&endpoint(None), &creds()).await.unwrap();
        assert!(conn.list_tables("%").await.is_err());
        assert_eq!(conn.list_catalogs().await.unwrap(), vec!["mysql", "pets"]);
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_query_returns_schema_and_rows() {
        let driver = pets_driver();
        let mut conn = driver.connect(&endpoint(Some("pets")), &creds()).await.unwrap();

        let result = conn.execute_query("SELECT * FROM `dogs`").await.unwrap();
        assert_eq!(result.columns.len(), 2);
        assert_eq!(result.rows.len(), 1);

        let result = conn.execute_query("SELECT * FROM `cats`").await.unwrap();
        assert_eq!(result.columns.len(), 1);
        assert!(result.rows.is_empty());

        assert!(conn.execute_query("SELECT * FROM `user`").await.is_err());
        conn.close().await.unwrap();
        assert!(conn.execute_query("SELECT * FROM `dogs`").await.is_err());
    }
}
