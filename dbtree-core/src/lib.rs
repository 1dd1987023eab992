//! Core engine for dbtree.
//!
//! Discovers the catalogs, tables and columns of a live database purely
//! through driver metadata calls, assembles them into a navigable tree, and
//! fetches the values of any selected column as text.
//!
//! # Security Guarantees
//! - No credentials stored or logged in any data structures
//! - Passwords zeroed on drop
//! - Sessions opened read-only where the driver supports it
//! - Table names are quoted, never interpolated raw
//!
//! # Architecture
//! - `driver`: object-safe driver traits and the MySQL, SQLite and in-memory
//!   implementations
//! - `connection`: one scoped connection per operation, always released
//! - `explorer`: catalog, table and column enumeration
//! - `hierarchy`: the root, catalog, table, column tree as an arena
//! - `fetcher` / `selection`: column retrieval, optionally as a cancellable
//!   task per selection
//! - `browser`: the facade bundling all of the above

pub mod browser;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod explorer;
pub mod fetcher;
pub mod hierarchy;
pub mod logging;
pub mod models;
pub mod security;
pub mod selection;

// Re-export commonly used types
pub use browser::SchemaBrowser;
pub use config::{ConnectionConfig, FetchOptions};
pub use connection::{ConnectionManager, ScopedConnection};
pub use error::{DbTreeError, ErrorKind, Result};
pub use explorer::{SchemaExplorer, TableContext};
pub use fetcher::ColumnDataFetcher;
pub use hierarchy::{
    DiscoveryFailure, DiscoveryScope, Hierarchy, HierarchyBuilder, HierarchyNode, NodeId,
    NodeKind,
};
pub use logging::init_logging;
pub use models::{Catalog, Column, ColumnRef, ColumnText, DriverKind, Table};
pub use security::Credentials;
pub use selection::SelectionFetcher;
