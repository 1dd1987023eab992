//! Connection lifecycle: one fresh connection per operation.
//!
//! There is no pooling and no reuse. Every discovery or fetch call opens a
//! [`ScopedConnection`], does its work and hands the connection back through
//! [`ScopedConnection::release`] on every exit path.

use crate::Result;
use crate::config::ConnectionConfig;
use crate::driver::{
    Driver, DriverConnection, Endpoint, ResultSet, validate_catalog_name, validate_identifier,
};
use crate::error::{DbTreeError, DriverMessage};
use crate::models::DriverKind;
use crate::security::Credentials;
use std::sync::Arc;
use std::time::Duration;

/// Opens connections to the configured endpoint.
///
/// Cheap to clone; clones share the driver, configuration and credentials.
#[derive(Clone)]
pub struct ConnectionManager {
    driver: Arc<dyn Driver>,
    config: Arc<ConnectionConfig>,
    credentials: Arc<Credentials>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("driver", &self.driver.kind())
            .field("config", &self.config)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl ConnectionManager {
    /// Creates a manager for `config`'s endpoint using `driver`.
    pub fn new(driver: Arc<dyn Driver>, config: ConnectionConfig, credentials: Credentials) -> Self {
        Self {
            driver,
            config: Arc::new(config),
            credentials: Arc::new(credentials),
        }
    }

    /// The configuration connections are opened with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Which driver connections go through.
    pub fn driver_kind(&self) -> DriverKind {
        self.driver.kind()
    }

    /// Quotes `identifier` the way the driver expects.
    pub fn quote_identifier(&self, identifier: &str) -> Result<String> {
        validate_identifier(identifier)?;
        Ok(self.driver.quote_identifier(identifier))
    }

    /// Opens a connection, scoped to `catalog` when given.
    ///
    /// # Errors
    /// Returns `DbTreeError::Configuration` for an invalid catalog name and
    /// `DbTreeError::Connection` when the driver refuses or `connect_timeout`
    /// elapses.
    pub async fn connect(&self, catalog: Option<&str>) -> Result<ScopedConnection> {
        if let Some(catalog) = catalog {
            validate_catalog_name(catalog)?;
        }

        let endpoint = Endpoint::for_catalog(&self.config, catalog);
        tracing::debug!("Connecting to {}", endpoint);

        let conn = tokio::time::timeout(
            self.config.connect_timeout,
            self.driver.connect(&endpoint, &self.credentials),
        )
        .await
        .map_err(|_| {
            DbTreeError::connection_failed(
                endpoint.to_string(),
                DriverMessage::new(format!(
                    "timed out after {:?}",
                    self.config.connect_timeout
                )),
            )
        })?
        .inspect_err(|e| tracing::warn!("Connection to {} failed: {}", endpoint, e))?;

        Ok(ScopedConnection {
            conn: Some(conn),
            endpoint,
            query_timeout: self.config.query_timeout,
        })
    }

    /// Connects to the initial catalog and releases straight away.
    ///
    /// Used as the startup check that the endpoint, credentials and default
    /// catalog are all usable before discovery begins.
    pub async fn probe(&self) -> Result<()> {
        let conn = self.connect(Some(&self.config.initial_catalog)).await?;
        tracing::info!("Connected to {}", conn.endpoint());
        conn.release().await;
        Ok(())
    }
}

/// An open connection owned by exactly one operation.
///
/// Must be handed back with [`release`](Self::release); dropping it without
/// releasing leaves closing to the driver and logs a warning.
pub struct ScopedConnection {
    conn: Option<Box<dyn DriverConnection>>,
    endpoint: Endpoint,
    query_timeout: Duration,
}

impl std::fmt::Debug for ScopedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedConnection")
            .field("endpoint", &self.endpoint)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl ScopedConnection {
    /// Where this connection points.
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn conn(&mut self) -> Result<&mut Box<dyn DriverConnection>> {
        self.conn.as_mut().ok_or_else(|| {
            DbTreeError::query_failed(
                self.endpoint.to_string(),
                DriverMessage::new("connection already released"),
            )
        })
    }

    /// Catalog names in driver order.
    pub async fn list_catalogs(&mut self) -> Result<Vec<String>> {
        self.conn()?.list_catalogs().await
    }

    /// Table names of the connected catalog matching `pattern`, in driver order.
    pub async fn list_tables(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.conn()?.list_tables(pattern).await
    }

    /// Runs `sql`, bounded by the configured query timeout.
    pub async fn execute_query(&mut self, sql: &str) -> Result<ResultSet> {
        let query_timeout = self.query_timeout;
        tracing::trace!("Executing on {}: {}", self.endpoint, sql);

        tokio::time::timeout(query_timeout, self.conn()?.execute_query(sql))
            .await
            .map_err(|e| {
                DbTreeError::query_failed(format!("{} (after {:?})", sql, query_timeout), e)
            })?
    }

    /// Closes the connection.
    ///
    /// Close failures are logged and swallowed.
    pub async fn release(mut self) {
        if let Some(mut conn) = self.conn.take() {
            match conn.close().await {
                Ok(()) => tracing::trace!("Released connection to {}", self.endpoint),
                Err(e) => tracing::warn!("Closing connection to {} failed: {}", self.endpoint, e),
            }
        }
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        if self.conn.is_some() {
            tracing::warn!(
                "Connection to {} dropped without release",
                self.endpoint
            );
        }
    }
}
