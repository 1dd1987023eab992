//! Database connection configuration.
//!
//! This module provides the `ConnectionConfig` struct describing where the
//! driver endpoint lives and which catalog to probe at startup.

use crate::Result;
use crate::driver::MAX_CATALOG_NAME_LEN;
use crate::error::DbTreeError;
use crate::models::DriverKind;
use crate::security::decode_userinfo;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default MySQL port when the URL does not name one
pub const MYSQL_DEFAULT_PORT: u16 = 3306;

/// Configuration for database connections.
///
/// Supplied once at startup and never changed afterwards.
///
/// # Security
/// This struct intentionally does NOT store passwords. They live in
/// [`crate::security::Credentials`] and are never logged or serialized.
///
/// # Example
/// ```rust
/// use dbtree_core::config::ConnectionConfig;
///
/// let config = ConnectionConfig::new("localhost".to_string())
///     .with_port(3306)
///     .with_initial_catalog("pets".to_string())
///     .with_username("root".to_string());
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Driver used to reach the server
    pub driver: DriverKind,
    /// Database host address (a directory for SQLite)
    pub host: String,
    /// Optional port number
    pub port: Option<u16>,
    /// Catalog probed at startup
    pub initial_catalog: String,
    /// Username (password handled separately)
    pub username: String,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Query timeout duration
    pub query_timeout: Duration,
    /// Whether sessions are switched to read-only
    pub read_only: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::MySql,
            host: "localhost".to_string(),
            port: None,
            initial_catalog: "pets".to_string(),
            username: "root".to_string(),
            connect_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(30),
            read_only: true,
        }
    }
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}://{}{}/{}",
            self.driver.scheme(),
            self.host,
            self.port.map_or_else(String::new, |p| format!(":{}", p)),
            self.initial_catalog
        )
        // Intentionally omit username and never include credentials
    }
}

impl ConnectionConfig {
    /// Creates a new connection config with safe defaults.
    pub fn new(host: String) -> Self {
        Self {
            host,
            ..Default::default()
        }
    }

    /// Builder method to set the driver.
    pub const fn with_driver(mut self, driver: DriverKind) -> Self {
        self.driver = driver;
        self
    }

    /// Builder method to set port.
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Builder method to set the initial catalog.
    pub fn with_initial_catalog(mut self, catalog: String) -> Self {
        self.initial_catalog = catalog;
        self
    }

    /// Builder method to set username.
    pub fn with_username(mut self, username: String) -> Self {
        self.username = username;
        self
    }

    /// Builder method to set the query timeout.
    pub const fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Validates connection configuration parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(DbTreeError::configuration("host cannot be empty"));
        }

        if self.port == Some(0) {
            return Err(DbTreeError::configuration("port must be greater than 0"));
        }

        if self.initial_catalog.is_empty() {
            return Err(DbTreeError::configuration(
                "initial catalog cannot be empty",
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(DbTreeError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(DbTreeError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Parses a connection URL into a configuration.
    ///
    /// Accepted forms:
    /// - `mysql://user@host:port/catalog`
    /// - `sqlite:///path/to/dir/catalog.db` (the directory becomes the host)
    ///
    /// Query parameters `connect_timeout` and `query_timeout` (seconds,
    /// 1..=300) are honored; anything else is ignored. A password embedded in
    /// the URL is NOT read here; see [`crate::security::Credentials::from_url`].
    pub fn from_url(connection_string: &str) -> Result<Self> {
        let url = Url::parse(connection_string).map_err(|e| {
            DbTreeError::configuration(format!("Invalid connection string format: {}", e))
        })?;

        let driver = DriverKind::from_scheme(url.scheme()).ok_or_else(|| {
            DbTreeError::configuration(format!(
                "Unrecognized connection scheme '{}'",
                url.scheme()
            ))
        })?;

        let mut config = match driver {
            DriverKind::MySql => parse_server_url(&url)?,
            DriverKind::Sqlite => parse_sqlite_url(&url)?,
            DriverKind::Memory => {
                return Err(DbTreeError::configuration(
                    "memory driver cannot be configured from a URL",
                ));
            }
        };

        for (key, value) in url.query_pairs() {
            let seconds = value
                .parse::<u64>()
                .ok()
                .filter(|secs| (1..=300).contains(secs));
            match (key.as_ref(), seconds) {
                ("connect_timeout", Some(secs)) => {
                    config.connect_timeout = Duration::from_secs(secs);
                }
                ("query_timeout", Some(secs)) => {
                    config.query_timeout = Duration::from_secs(secs);
                }
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_server_url(url: &Url) -> Result<ConnectionConfig> {
    let host = url
        .host_str()
        .ok_or_else(|| DbTreeError::configuration("Connection string must specify a host"))?;

    let mut config = ConnectionConfig::new(host.to_string())
        .with_driver(DriverKind::MySql)
        .with_port(url.port().unwrap_or(MYSQL_DEFAULT_PORT));

    let catalog = decode_path(url)?;
    let catalog = catalog.trim_start_matches('/');
    if catalog.is_empty() {
        return Err(DbTreeError::configuration(
            "Connection string must name an initial catalog",
        ));
    }
    if catalog.len() > MAX_CATALOG_NAME_LEN {
        return Err(DbTreeError::configuration(format!(
            "Catalog name too long: maximum {} characters",
            MAX_CATALOG_NAME_LEN
        )));
    }
    config.initial_catalog = catalog.to_string();

    let username = decode_userinfo(url.username())?;
    if !username.is_empty() {
        config.username = username;
    }

    Ok(config)
}

fn parse_sqlite_url(url: &Url) -> Result<ConnectionConfig> {
    let decoded = decode_path(url)?;
    let path = std::path::Path::new(&decoded);
    let directory = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| DbTreeError::configuration("SQLite URL must name a catalog file"))?;
    let catalog = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| DbTreeError::configuration("SQLite URL must name a catalog file"))?;

    Ok(ConnectionConfig::new(directory)
        .with_driver(DriverKind::Sqlite)
        .with_initial_catalog(catalog))
}

/// The URL path with percent escapes resolved.
fn decode_path(url: &Url) -> Result<String> {
    percent_encoding::percent_decode_str(url.path())
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .map_err(|_| DbTreeError::configuration("Connection string path is not valid UTF-8"))
}
