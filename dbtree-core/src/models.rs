//! Core data models for discovered schema and fetched values.
//!
//! Catalogs, tables and columns are discovered at startup and never
//! refreshed. [`ColumnText`] is produced fresh for every fetch.

use serde::{Deserialize, Serialize};

/// Supported driver kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// MySQL or MariaDB server
    MySql,
    /// Directory of SQLite files
    Sqlite,
    /// In-process fixture driver
    Memory,
}

impl DriverKind {
    /// URL scheme used for this driver's endpoints.
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }

    /// Detects the driver from a URL scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Some(Self::MySql),
            "sqlite" => Some(Self::Sqlite),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MySql => write!(f, "MySQL"),
            Self::Sqlite => write!(f, "SQLite"),
            Self::Memory => write!(f, "in-memory"),
        }
    }
}

/// A top-level namespace reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Catalog {
    /// Catalog name
    pub name: String,
}

impl Catalog {
    /// A catalog named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A table discovered inside a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Catalog holding the table
    pub catalog: String,
}

impl Table {
    /// Table `name` inside `catalog`.
    pub fn new(catalog: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            catalog: catalog.into(),
        }
    }
}

/// A column read from the result schema of `SELECT *` against its table.
///
/// `ordinal_position` is 1-based and matches the position row fetches expose.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// 1-based position in the result schema
    pub ordinal_position: u32,
    /// Table holding the column
    pub table: String,
    /// Catalog holding the table
    pub catalog: String,
}

/// Fully qualified address of one column: what a leaf selection resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Catalog name
    pub catalog: String,
    /// Table name
    pub table: String,
    /// Column name
    pub column: String,
}

impl ColumnRef {
    /// Address of `catalog.table.column`.
    pub fn new(
        catalog: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            table: table.into(),
            column: column.into(),
        }
    }

    /// Parses `catalog.table.column`.
    ///
    /// Splits on the first and last dot, so table names containing dots
    /// still resolve; catalog and column names cannot contain one.
    pub fn parse_dotted(path: &str) -> Option<Self> {
        let (catalog, rest) = path.split_once('.')?;
        let (table, column) = rest.rsplit_once('.')?;
        if catalog.is_empty() || table.is_empty() || column.is_empty() {
            return None;
        }
        Some(Self::new(catalog, table, column))
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.table, self.column)
    }
}

/// Formatted values of one column, one entry per row in retrieval order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnText {
    /// Catalog the values came from
    pub catalog: String,
    /// Table the values came from
    pub table: String,
    /// Column the values came from
    pub column: String,
    /// Formatted values in retrieval order
    pub values: Vec<String>,
}

impl ColumnText {
    /// An empty result for `column`.
    pub fn empty(column: &ColumnRef) -> Self {
        Self {
            catalog: column.catalog.clone(),
            table: column.table.clone(),
            column: column.column.clone(),
            values: Vec::new(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Newline-joined rendering for a text pane.
    pub fn to_text(&self) -> String {
        self.values.join("\n")
    }
}
