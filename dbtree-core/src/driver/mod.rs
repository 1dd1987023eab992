//! Driver traits and factory for generic metadata access.
//!
//! A driver knows how to reach one kind of server and exposes the handful of
//! calls the explorer needs: list catalogs, list tables, run a statement and
//! hand back its rows together with the result schema. Nothing here knows
//! about hierarchies or text rendering.
//!
//! # Module Structure
//! - `memory`: in-process driver with call counting and failure injection
//! - `mysql`: MySQL/MariaDB over `sqlx` (feature `mysql`)
//! - `sqlite`: a directory of SQLite files, one file per catalog (feature `sqlite`)

use crate::config::ConnectionConfig;
use crate::models::DriverKind;
use crate::security::Credentials;
use crate::{Result, error::DbTreeError};
use async_trait::async_trait;
use std::sync::Arc;

pub mod memory;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{ConnectionCounters, MemoryCatalog, MemoryDriver, MemoryTable};

/// Maximum catalog name length accepted before a connection is attempted
pub const MAX_CATALOG_NAME_LEN: usize = 64;

/// Where a connection goes: the driver endpoint, optionally scoped to a catalog.
///
/// `Display` never includes credentials and is what ends up in logs and
/// error context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name, or directory for file-backed drivers
    pub host: String,
    /// Port, when the driver uses one
    pub port: Option<u16>,
    /// Catalog to scope the connection to
    pub catalog: Option<String>,
}

impl Endpoint {
    /// Endpoint for `config`'s host, scoped to `catalog` when given.
    pub fn for_catalog(config: &ConnectionConfig, catalog: Option<&str>) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            catalog: catalog.map(str::to_string),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write!(f, "/{}", self.catalog.as_deref().unwrap_or_default())
    }
}

/// One column of a statement's result schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultColumn {
    /// Column name as reported by the driver
    pub name: String,
    /// 1-based position in the result
    pub ordinal: u32,
}

/// A single value as decoded by a driver.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// SQL NULL
    Null,
    /// Character data
    Text(String),
    /// Signed integer
    Integer(i64),
    /// Unsigned integer
    Unsigned(u64),
    /// Floating point
    Float(f64),
    /// Boolean
    Boolean(bool),
    /// Binary data
    Bytes(Vec<u8>),
    /// The driver could not decode the value; carries the SQL type name
    Undecodable { type_name: String },
}

/// Rows of a statement together with its result schema.
///
/// `columns` is populated from the prepared statement, so it is present even
/// when the statement returns no rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Result schema in ordinal order
    pub columns: Vec<ResultColumn>,
    /// Rows in retrieval order
    pub rows: Vec<Vec<CellValue>>,
}

impl ResultSet {
    /// Builds a result schema from column names in result order.
    pub fn with_column_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = names
            .into_iter()
            .zip(1u32..)
            .map(|(name, ordinal)| ResultColumn {
                name: name.into(),
                ordinal,
            })
            .collect();
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Position of `name` in the result schema (exact match).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// A driver that can open connections to one kind of server.
///
/// # Object Safety
/// This trait is object-safe; the engine holds drivers as `Arc<dyn Driver>`.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Which driver this is.
    fn kind(&self) -> DriverKind;

    /// Opens a connection to `endpoint`.
    ///
    /// # Errors
    /// Returns `DbTreeError::Connection` for unreachable hosts, rejected
    /// credentials and unknown catalogs.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Box<dyn DriverConnection>>;

    /// Quotes `identifier` for interpolation into statement text.
    ///
    /// Defaults to MySQL backtick quoting.
    fn quote_identifier(&self, identifier: &str) -> String {
        quote_with(identifier, '`')
    }
}

/// An open, exclusively owned connection.
#[async_trait]
pub trait DriverConnection: Send {
    /// Names of every catalog the server reports, in driver order.
    async fn list_catalogs(&mut self) -> Result<Vec<String>>;

    /// Names of tables in the connected catalog matching a SQL `LIKE` pattern.
    async fn list_tables(&mut self, pattern: &str) -> Result<Vec<String>>;

    /// Runs `sql` and returns every row together with the result schema.
    async fn execute_query(&mut self, sql: &str) -> Result<ResultSet>;

    /// Closes the connection. Calling it more than once is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Wraps `identifier` in `quote`, doubling any embedded quote characters.
pub fn quote_with(identifier: &str, quote: char) -> String {
    let mut quoted = String::with_capacity(identifier.len().saturating_add(2));
    quoted.push(quote);
    for ch in identifier.chars() {
        if ch == quote {
            quoted.push(quote);
        }
        quoted.push(ch);
    }
    quoted.push(quote);
    quoted
}

/// Rejects identifiers that cannot be quoted safely.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(DbTreeError::configuration("identifier cannot be empty"));
    }
    if identifier.contains('\0') {
        return Err(DbTreeError::configuration(
            "identifier contains a NUL character",
        ));
    }
    Ok(())
}

/// Rejects catalog names that could escape the endpoint they are appended to.
pub fn validate_catalog_name(catalog: &str) -> Result<()> {
    validate_identifier(catalog)?;
    if catalog.len() > MAX_CATALOG_NAME_LEN {
        return Err(DbTreeError::configuration(format!(
            "Invalid catalog name length: must be 1-{} characters, got {}",
            MAX_CATALOG_NAME_LEN,
            catalog.len()
        )));
    }
    if catalog.contains(['/', '\\']) || catalog == "." || catalog == ".." {
        return Err(DbTreeError::configuration(
            "Catalog name contains invalid characters",
        ));
    }
    Ok(())
}

/// Case-insensitive SQL `LIKE` match supporting `%` and `_`.
pub fn like_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().flat_map(char::to_lowercase).collect();
    let text: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();

    // matches[j] == pattern[..i] matches text[..j]
    let mut matches = vec![false; text.len().saturating_add(1)];
    matches[0] = true;
    for p in &pattern {
        let mut next = vec![false; matches.len()];
        match p {
            '%' => {
                let mut seen = false;
                for (j, slot) in next.iter_mut().enumerate() {
                    seen |= matches[j];
                    *slot = seen;
                }
            }
            _ => {
                for j in 0..text.len() {
                    if matches[j] && (*p == '_' || *p == text[j]) {
                        next[j.saturating_add(1)] = true;
                    }
                }
            }
        }
        matches = next;
    }
    matches[text.len()]
}

/// Creates the driver named by `config.driver`.
///
/// # Errors
/// Returns a configuration error if the driver was not compiled in, or for
/// the in-memory driver, which has to be built directly with its data.
pub fn create_driver(config: &ConnectionConfig) -> Result<Arc<dyn Driver>> {
    config.validate()?;

    match config.driver {
        #[cfg(feature = "mysql")]
        DriverKind::MySql => Ok(Arc::new(mysql::MySqlDriver::new(config))),
        #[cfg(not(feature = "mysql"))]
        DriverKind::MySql => Err(DbTreeError::configuration(
            "MySQL support not compiled in. Use --features mysql",
        )),
        #[cfg(feature = "sqlite")]
        DriverKind::Sqlite => Ok(Arc::new(sqlite::SqliteDriver::new(config))),
        #[cfg(not(feature = "sqlite"))]
        DriverKind::Sqlite => Err(DbTreeError::configuration(
            "SQLite support not compiled in. Use --features sqlite",
        )),
        DriverKind::Memory => Err(DbTreeError::configuration(
            "The in-memory driver is constructed directly with MemoryDriver::new",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_with_backticks() {
        assert_eq!(quote_with("dogs", '`'), "`dogs`");
        assert_eq!(quote_with("my`table", '`'), "`my``table`");
        assert_eq!(quote_with("x; DROP TABLE y", '`'), "`x; DROP TABLE y`");
        assert_eq!(quote_with("say \"hi\"", '"'), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("dogs").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("do\0gs").is_err());
    }

    #[test]
    fn test_validate_catalog_name() {
        assert!(validate_catalog_name("pets").is_ok());
        assert!(validate_catalog_name("information_schema").is_ok());
        assert!(validate_catalog_name("../etc").is_err());
        assert!(validate_catalog_name("..").is_err());
        assert!(validate_catalog_name("a\\b").is_err());
        assert!(validate_catalog_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_like_matches() {
        assert!(like_matches("%", ""));
        assert!(like_matches("%", "dogs"));
        assert!(like_matches("do%", "dogs"));
        assert!(like_matches("DO_S", "dogs"));
        assert!(like_matches("%g%", "dogs"));
        assert!(!like_matches("cat%", "dogs"));
        assert!(!like_matches("do_", "dogs"));
        assert!(!like_matches("", "dogs"));
    }

    #[test]
    fn test_endpoint_display() {
        let config = ConnectionConfig::new("db.local".to_string()).with_port(3306);
        assert_eq!(
            Endpoint::for_catalog(&config, Some("pets")).to_string(),
            "db.local:3306/pets"
        );
        assert_eq!(Endpoint::for_catalog(&config, None).to_string(), "db.local:3306/");
    }

    #[test]
    fn test_result_set_columns() {
        let result = ResultSet::with_column_names(["id", "name"]);
        assert_eq!(result.columns[0].ordinal, 1);
        assert_eq!(result.columns[1].ordinal, 2);
        assert_eq!(result.column_index("name"), Some(1));
        assert_eq!(result.column_index("NAME"), None);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn test_create_memory_driver_from_config_is_rejected() {
        let config = ConnectionConfig::default().with_driver(DriverKind::Memory);
        assert!(create_driver(&config).is_err());
    }

    mod quoting_properties {
        use super::super::quote_with;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn quoted_identifier_round_trips(identifier in "\\PC*") {
                let quoted = quote_with(&identifier, '`');
                prop_assert!(quoted.starts_with('`') && quoted.ends_with('`'));
                let inner = &quoted[1..quoted.len() - 1];
                prop_assert_eq!(inner.replace("``", "`"), identifier);
            }

            #[test]
            fn quoted_identifier_has_no_lone_quote(identifier in "[a-z`;' ]{0,24}") {
                let quoted = quote_with(&identifier, '`');
                let inner = &quoted[1..quoted.len() - 1];
                prop_assert_eq!(inner.matches('`').count() % 2, 0);
            }
        }
    }
}
