//! SQLite driver treating a directory as the server.
//!
//! Each `*.db`, `*.sqlite` or `*.sqlite3` file in the endpoint directory is a
//! catalog named after its file stem. Files are opened read-only and never
//! created, so naming a catalog that has no file fails like an unknown
//! database would on a server.

use super::{CellValue, Driver, DriverConnection, Endpoint, ResultColumn, ResultSet, quote_with};
use crate::Result;
use crate::config::ConnectionConfig;
use crate::error::{DbTreeError, DriverMessage};
use crate::models::DriverKind;
use crate::security::Credentials;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, SqliteConnection, Statement};
use sqlx::{TypeInfo, ValueRef};
use std::path::{Path, PathBuf};

/// File extensions recognized as catalogs
pub const CATALOG_EXTENSIONS: &[&str] = &["db", "sqlite", "sqlite3"];

/// User tables and views in creation order; SQLite internals excluded.
const LIST_TABLES_QUERY: &str = r#"
    SELECT name
    FROM sqlite_master
    WHERE type IN ('table', 'view')
    AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
    AND name LIKE ?
    ORDER BY rowid
"#;

/// SQLite driver
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    read_only: bool,
}

impl SqliteDriver {
    /// Creates a driver using `config`'s session settings.
    pub const fn new(config: &ConnectionConfig) -> Self {
        Self {
            read_only: config.read_only,
        }
    }
}

/// Finds the file backing `catalog` inside `directory`.
async fn catalog_path(directory: &Path, catalog: &str) -> Option<PathBuf> {
    for extension in CATALOG_EXTENSIONS {
        let candidate = directory.join(format!("{}.{}", catalog, extension));
        if tokio::fs::metadata(&candidate)
            .await
            .is_ok_and(|m| m.is_file())
        {
            return Some(candidate);
        }
    }
    None
}

/// Catalog names present in `directory`, sorted by name.
async fn catalog_names(directory: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(directory).await?;
    let mut names = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let recognized = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| CATALOG_EXTENSIONS.contains(&e));
        if !recognized || !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            names.push(stem.to_string());
        }
    }

    names.sort();
    names.dedup();
    Ok(names)
}

#[async_trait]
impl Driver for SqliteDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    async fn connect(
        &self,
        endpoint: &Endpoint,
        _credentials: &Credentials,
    ) -> Result<Box<dyn DriverConnection>> {
        let directory = PathBuf::from(&endpoint.host);

        let is_dir = tokio::fs::metadata(&directory)
            .await
            .map_err(|e| DbTreeError::connection_failed(endpoint.to_string(), e))?
            .is_dir();
        if !is_dir {
            return Err(DbTreeError::connection_failed(
                endpoint.to_string(),
                DriverMessage::new("endpoint is not a directory"),
            ));
        }

        // Without a catalog there is no file to open; an in-memory database
        // stands in so the connection lifecycle is the same.
        let options = match &endpoint.catalog {
            Some(catalog) => {
                let path = catalog_path(&directory, catalog).await.ok_or_else(|| {
                    DbTreeError::connection_failed(
                        endpoint.to_string(),
                        DriverMessage::new(format!("Unknown database '{}'", catalog)),
                    )
                })?;
                SqliteConnectOptions::new()
                    .filename(path)
                    .read_only(self.read_only)
                    .create_if_missing(false)
            }
            None => SqliteConnectOptions::new().in_memory(true),
        };

        let conn = options
            .connect()
            .await
            .map_err(|e| DbTreeError::connection_failed(endpoint.to_string(), e))?;

        tracing::trace!("Opened SQLite connection to {}", endpoint);
        Ok(Box::new(SqliteDriverConnection {
            conn: Some(conn),
            directory,
            endpoint: endpoint.to_string(),
        }))
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_with(identifier, '"')
    }
}

struct SqliteDriverConnection {
    conn: Option<SqliteConnection>,
    directory: PathBuf,
    endpoint: String,
}

impl SqliteDriverConnection {
    fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.conn.as_mut().ok_or_else(|| {
            DbTreeError::query_failed(
                self.endpoint.clone(),
                DriverMessage::new("connection already closed"),
            )
        })
    }
}

#[async_trait]
impl DriverConnection for SqliteDriverConnection {
    async fn list_catalogs(&mut self) -> Result<Vec<String>> {
        self.conn()?;
        catalog_names(&self.directory).await.map_err(|e| {
            DbTreeError::query_failed(format!("Failed to list catalogs in {}", self.endpoint), e)
        })
    }

    async fn list_tables(&mut self, pattern: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(LIST_TABLES_QUERY)
            .bind(pattern)
            .fetch_all(self.conn()?)
            .await
            .map_err(|e| DbTreeError::query_failed("Failed to list tables", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("name")
                    .map_err(|e| DbTreeError::query_failed("Failed to read table name", e))
            })
            .collect()
    }

    async fn execute_query(&mut self, sql: &str) -> Result<ResultSet> {
        let conn = self.conn()?;

        let statement = conn
            .prepare(sql)
            .await
            .map_err(|e| DbTreeError::query_failed(sql.to_string(), e))?;

        let columns: Vec<ResultColumn> = statement
            .columns()
            .iter()
            .zip(1u32..)
            .map(|(column, ordinal)| ResultColumn {
                name: column.name().to_string(),
                ordinal,
            })
            .collect();

        let rows = statement
            .query()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| DbTreeError::query_failed(sql.to_string(), e))?;

        let rows = rows
            .iter()
            .map(|row| (0..columns.len()).map(|i| decode_cell(row, i)).collect())
            .collect();

        Ok(ResultSet { columns, rows })
    }

    async fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn
                .close()
                .await
                .map_err(|e| DbTreeError::query_failed(format!("close {}", self.endpoint), e)),
            None => Ok(()),
        }
    }
}

/// Decodes one cell by the storage class of the stored value.
///
/// SQLite column declarations are advisory, so the value's own type decides
/// and decoding skips the declared-type compatibility check.
fn decode_cell(row: &SqliteRow, index: usize) -> CellValue {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return CellValue::Null,
        Ok(raw) => raw.type_info().name().to_ascii_uppercase(),
        Err(_) => {
            return CellValue::Undecodable {
                type_name: "UNKNOWN".to_string(),
            };
        }
    };

    let decoded = match type_name.as_str() {
        "INTEGER" | "BIGINT" | "INT" | "INT4" | "INT8" => row
            .try_get_unchecked::<i64, _>(index)
            .map(CellValue::Integer),
        "BOOLEAN" => row
            .try_get_unchecked::<bool, _>(index)
            .map(CellValue::Boolean),
        "REAL" | "NUMERIC" => row
            .try_get_unchecked::<f64, _>(index)
            .map(CellValue::Float),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(CellValue::Bytes),
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(CellValue::Text),
    };

    decoded.unwrap_or(CellValue::Undecodable { type_name })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catalog_names_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["test.db", "pets.sqlite", "mysql.sqlite3", "notes.txt", "pets.db"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.db")).unwrap();

        let names = catalog_names(dir.path()).await.unwrap();
        assert_eq!(names, vec!["mysql", "pets", "test"]);
    }

    #[tokio::test]
    async fn test_catalog_path_prefers_db_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pets.sqlite"), b"").unwrap();
        std::fs::write(dir.path().join("pets.db"), b"").unwrap();

        let path = catalog_path(dir.path(), "pets").await.unwrap();
        assert!(path.ends_with("pets.db"));
        assert!(catalog_path(dir.path(), "cars").await.is_none());
    }

    #[test]
    fn test_sqlite_quoting() {
        let driver = SqliteDriver::new(&ConnectionConfig::default());
        assert_eq!(driver.quote_identifier("dogs"), "\"dogs\"");
        assert_eq!(driver.quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
