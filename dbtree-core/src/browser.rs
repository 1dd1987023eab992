//! Headless entry point bundling discovery and fetching.
//!
//! Everything a front end or test harness needs: the five browse operations,
//! the startup probe and a selection-driven fetcher.

use crate::Result;
use crate::config::{ConnectionConfig, FetchOptions};
use crate::connection::ConnectionManager;
use crate::driver::{Driver, create_driver};
use crate::explorer::SchemaExplorer;
use crate::fetcher::ColumnDataFetcher;
use crate::hierarchy::{Hierarchy, HierarchyBuilder};
use crate::models::{Catalog, Column, ColumnRef, ColumnText, Table};
use crate::security::Credentials;
use crate::selection::SelectionFetcher;
use std::sync::Arc;

/// Schema discovery and column retrieval against one endpoint.
///
/// # Example
/// ```rust
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> dbtree_core::Result<()> {
/// use dbtree_core::config::ConnectionConfig;
/// use dbtree_core::driver::{MemoryCatalog, MemoryDriver, MemoryTable};
/// use dbtree_core::security::Credentials;
/// use dbtree_core::SchemaBrowser;
/// use std::sync::Arc;
///
/// let driver = MemoryDriver::new().with_catalog(
///     MemoryCatalog::new("pets")
///         .with_table(MemoryTable::new("dogs", ["name"]).with_text_row(["Rex"])),
/// );
/// let browser = SchemaBrowser::new(
///     Arc::new(driver),
///     ConnectionConfig::default(),
///     Credentials::new("root".to_string(), None),
/// );
///
/// let tree = browser.build_hierarchy().await;
/// assert_eq!(tree.leaves().count(), 1);
///
/// let text = browser.fetch_column_text("pets", "dogs", "name").await?;
/// assert_eq!(text.to_text(), "Rex");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SchemaBrowser {
    explorer: SchemaExplorer,
    fetcher: ColumnDataFetcher,
}

impl SchemaBrowser {
    /// Creates a browser over an already constructed driver.
    pub fn new(driver: Arc<dyn Driver>, config: ConnectionConfig, credentials: Credentials) -> Self {
        let explorer = SchemaExplorer::new(ConnectionManager::new(driver, config, credentials));
        let fetcher = ColumnDataFetcher::new(explorer.clone(), FetchOptions::default());
        Self { explorer, fetcher }
    }

    /// Creates a browser for the driver named in `config`.
    ///
    /// # Errors
    /// Returns a configuration error if `config` is invalid or names a driver
    /// that was not compiled in.
    pub fn from_config(config: ConnectionConfig, credentials: Credentials) -> Result<Self> {
        let driver = create_driver(&config)?;
        Ok(Self::new(driver, config, credentials))
    }

    /// Replaces how fetched values are rendered.
    #[must_use]
    pub fn with_fetch_options(mut self, options: FetchOptions) -> Self {
        self.fetcher = ColumnDataFetcher::new(self.explorer.clone(), options);
        self
    }

    /// Discovery half of the browser.
    pub const fn explorer(&self) -> &SchemaExplorer {
        &self.explorer
    }

    /// Fetch half of the browser.
    pub const fn fetcher(&self) -> &ColumnDataFetcher {
        &self.fetcher
    }

    /// Connects to the initial catalog and releases the connection.
    pub async fn probe(&self) -> Result<()> {
        self.explorer.manager().probe().await
    }

    /// Lists every catalog the server reports.
    pub async fn list_catalogs(&self) -> Result<Vec<Catalog>> {
        self.explorer.list_catalogs().await
    }

    /// Lists the tables of `catalog`.
    pub async fn list_tables(&self, catalog: &str) -> Result<Vec<Table>> {
        self.explorer.list_tables(catalog).await
    }

    /// Lists the columns of `catalog.table` in ordinal order.
    pub async fn list_columns(&self, catalog: &str, table: &str) -> Result<Vec<Column>> {
        self.explorer.list_columns(catalog, table).await
    }

    /// Fetches the formatted values of one column.
    pub async fn fetch_column_text(
        &self,
        catalog: &str,
        table: &str,
        column: &str,
    ) -> Result<ColumnText> {
        self.fetcher
            .fetch_column_text(&ColumnRef::new(catalog, table, column))
            .await
    }

    /// Discovers the full tree. Failed branches are recorded, not returned
    /// as an error.
    pub async fn build_hierarchy(&self) -> Hierarchy {
        HierarchyBuilder::new(&self.explorer).build().await
    }

    /// A fetcher that runs each selection as its own cancellable task.
    pub fn selection_fetcher(&self) -> SelectionFetcher {
        SelectionFetcher::new(self.fetcher.clone())
    }
}
