//! Generic schema enumeration through driver metadata calls.
//!
//! Nothing about any particular schema is assumed. Catalogs and tables come
//! from the driver's listing calls; columns come from the result schema of
//! `SELECT *` against the table, the same statement a value fetch runs, so
//! the discovered column set always matches what a fetch will see.

use crate::Result;
use crate::connection::ConnectionManager;
use crate::driver::CellValue;
use crate::error::DbTreeError;
use crate::models::{Catalog, Column, Table};
use tokio_util::sync::CancellationToken;

/// Table name pattern matching every table
pub const ANY_TABLE: &str = "%";

/// Everything one `SELECT *` against a table produced.
///
/// Passed explicitly between discovery and fetch instead of being kept as
/// shared "current table" state.
#[derive(Debug, Clone, PartialEq)]
pub struct TableContext {
    /// Catalog the table belongs to
    pub catalog: String,
    /// Table name
    pub table: String,
    /// Result schema, in ordinal order
    pub columns: Vec<Column>,
    /// Rows in retrieval order
    pub rows: Vec<Vec<CellValue>>,
}

impl TableContext {
    /// Position of `column` in the result schema.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }
}

/// Enumerates catalogs, tables and columns.
///
/// Each call opens and releases its own connection and depends on no state
/// left by an earlier call.
#[derive(Debug, Clone)]
pub struct SchemaExplorer {
    manager: ConnectionManager,
}

impl SchemaExplorer {
    /// Creates an explorer over `manager`.
    pub const fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Connection manager used for every call.
    pub const fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Lists every catalog the server reports, in driver order.
    ///
    /// Connects to the bare endpoint. System catalogs are not filtered.
    pub async fn list_catalogs(&self) -> Result<Vec<Catalog>> {
        tracing::debug!("Listing catalogs");
        let mut conn = self.manager.connect(None).await?;
        let names = conn.list_catalogs().await;
        conn.release().await;

        let catalogs: Vec<Catalog> = names?.into_iter().map(Catalog::new).collect();
        tracing::debug!("Found {} catalogs", catalogs.len());
        Ok(catalogs)
    }

    /// Lists the tables of `catalog`, in driver order.
    pub async fn list_tables(&self, catalog: &str) -> Result<Vec<Table>> {
        tracing::debug!("Listing tables in catalog '{}'", catalog);
        let mut conn = self.manager.connect(Some(catalog)).await?;
        let names = conn.list_tables(ANY_TABLE).await;
        conn.release().await;

        let tables: Vec<Table> = names?
            .into_iter()
            .map(|name| Table::new(catalog, name))
            .collect();
        tracing::debug!("Found {} tables in '{}'", tables.len(), catalog);
        Ok(tables)
    }

    /// Lists the columns of `catalog.table` in ordinal order.
    ///
    /// Runs the full-table query and keeps only its result schema.
    pub async fn list_columns(&self, catalog: &str, table: &str) -> Result<Vec<Column>> {
        Ok(self.table_context(catalog, table).await?.columns)
    }

    /// Runs `SELECT *` against `catalog.table` and returns its schema and rows.
    pub async fn table_context(&self, catalog: &str, table: &str) -> Result<TableContext> {
        self.table_context_cancellable(catalog, table, &CancellationToken::new())
            .await
    }

    /// Like [`table_context`](Self::table_context), abandoned as soon as
    /// `cancel` fires.
    ///
    /// A cancelled call still releases its connection before returning
    /// `DbTreeError::Cancelled`.
    pub async fn table_context_cancellable(
        &self,
        catalog: &str,
        table: &str,
        cancel: &CancellationToken,
    ) -> Result<TableContext> {
        let sql = self.select_all_sql(table)?;

        let mut conn = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DbTreeError::Cancelled),
            conn = self.manager.connect(Some(catalog)) => conn?,
        };

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DbTreeError::Cancelled),
            result = conn.execute_query(&sql) => result,
        };
        conn.release().await;

        let result = outcome.inspect_err(|e| {
            tracing::debug!("SELECT * on {}.{} did not complete: {}", catalog, table, e);
        })?;

        let columns = result
            .columns
            .into_iter()
            .map(|column| Column {
                name: column.name,
                ordinal_position: column.ordinal,
                table: table.to_string(),
                catalog: catalog.to_string(),
            })
            .collect();

        Ok(TableContext {
            catalog: catalog.to_string(),
            table: table.to_string(),
            columns,
            rows: result.rows,
        })
    }

    /// The only data statement ever issued: every row of one table.
    ///
    /// The table name is quoted for the driver rather than interpolated raw.
    pub fn select_all_sql(&self, table: &str) -> Result<String> {
        Ok(format!(
            "SELECT * FROM {}",
            self.manager.quote_identifier(table)?
        ))
    }
}
