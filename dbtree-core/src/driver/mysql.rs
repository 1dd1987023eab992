//! MySQL driver over a single unpooled `sqlx` connection.
//!
//! # Security Features
//! - Credentials go straight into `MySqlConnectOptions`, never into a URL string
//! - Sessions are switched to read-only when configured
//! - `max_execution_time` bounds every statement server-side

use super::{CellValue, Driver, DriverConnection, Endpoint, ResultColumn, ResultSet};
use crate::Result;
use crate::config::{ConnectionConfig, MYSQL_DEFAULT_PORT};
use crate::error::{DbTreeError, DriverMessage};
use crate::models::DriverKind;
use crate::security::Credentials;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, MySqlConnection, Row, Statement};
use sqlx::{TypeInfo, ValueRef};
use std::time::Duration;

/// Catalog listing, same ordering as JDBC `getCatalogs()`.
// Cast to CHAR to avoid VARBINARY type issues in MySQL 8.0+
const LIST_CATALOGS_QUERY: &str = r#"
    SELECT CAST(SCHEMA_NAME AS CHAR) AS TABLE_CAT
    FROM INFORMATION_SCHEMA.SCHEMATA
    ORDER BY SCHEMA_NAME
"#;

/// Tables and views of the connected catalog, same ordering as JDBC `getTables()`.
const LIST_TABLES_QUERY: &str = r#"
    SELECT CAST(TABLE_NAME AS CHAR) AS TABLE_NAME
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = DATABASE()
    AND TABLE_NAME LIKE ?
    ORDER BY TABLE_TYPE, TABLE_NAME
"#;

/// MySQL driver
#[derive(Debug, Clone)]
pub struct MySqlDriver {
    query_timeout: Duration,
    read_only: bool,
}

impl MySqlDriver {
    /// Creates a driver using `config`'s session settings.
    pub const fn new(config: &ConnectionConfig) -> Self {
        Self {
            query_timeout: config.query_timeout,
            read_only: config.read_only,
        }
    }

    fn connect_options(endpoint: &Endpoint, credentials: &Credentials) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port.unwrap_or(MYSQL_DEFAULT_PORT))
            .username(credentials.username());

        if let Some(password) = credentials.password() {
            options = options.password(password);
        }
        if let Some(catalog) = &endpoint.catalog {
            options = options.database(catalog);
        }

        options
    }

    /// Session setup run on every new connection.
    async fn configure_session(&self, conn: &mut MySqlConnection) -> sqlx::Result<()> {
        let timeout_ms = self.query_timeout.as_millis().min(u128::from(u32::MAX));
        conn.execute(format!("SET max_execution_time = {}", timeout_ms).as_str())
            .await?;

        if self.read_only {
            conn.execute("SET SESSION TRANSACTION READ ONLY").await?;
        }

        // Consistent rendering of TIMESTAMP values
        conn.execute("SET time_zone = '+00:00'").await?;
        Ok(())
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::MySql
    }

    async fn connect(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Box<dyn DriverConnection>> {
        let options = Self::connect_options(endpoint, credentials);

        let mut conn = options
            .connect()
            .await
            .map_err(|e| DbTreeError::connection_failed(endpoint.to_string(), e))?;

        if let Err(e) = self.configure_session(&mut conn).await {
            if let Err(close_err) = conn.close().await {
                tracing::debug!("Close after failed session setup also failed: {}", close_err);
            }
            return Err(DbTreeError::connection_failed(
                format!("{} (session setup)", endpoint),
                e,
            ));
        }

        tracing::trace!("Opened MySQL connection to {}", endpoint);
        Ok(Box::new(MySqlDriverConnection {
            conn: Some(conn),
            endpoint: endpoint.to_string(),
        }))
    }
}

struct MySqlDriverConnection {
    conn: Option<MySqlConnection>,
    endpoint: String,
}

impl MySqlDriverConnection {
    fn conn(&mut self) -> Result<&mut MySqlConnection> {
        self.conn.as_mut().ok_or_else(|| {
            DbTreeError::query_failed(
                self.endpoint.clone(),
                DriverMessage::new("connection already closed"),
            )
        })
    }
}

#[async_trait]
impl DriverConnection for MySqlDriverConnection {
    async fn list_catalogs(&mut self) -> Result<Vec<String>> {
        let rows = sqlx::query(LIST_CATALOGS_QUERY)
            .fetch_all(self.conn()?)
            .await
            .map_err(|e| DbTreeError::query_failed("Failed to list catalogs", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("TABLE_CAT")
                    .map_err(|e| DbTreeError::query_failed("Failed to read catalog name", e))
            })
            .collect()
    }

    async fn list_tables(&mut self, pattern: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(LIST_TABLES_QUERY)
            .bind(pattern)
            .fetch_all(self.conn()?)
            .await
            .map_err(|e| DbTreeError::query_failed("Failed to list tables", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("TABLE_NAME")
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

/// Decodes one cell, trying the types MySQL values commonly map to.
fn decode_cell(row: &MySqlRow, index: usize) -> CellValue {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return CellValue::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => {
            return CellValue::Undecodable {
                type_name: "UNKNOWN".to_string(),
            };
        }
    };

    if let Ok(v) = row.try_get::<String, _>(index) {
        return CellValue::Text(v);
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return CellValue::Integer(v);
    }
    if let Ok(v) = row.try_get::<u64, _>(index) {
        return CellValue::Unsigned(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return CellValue::Float(v);
    }
    if let Ok(v) = row.try_get::<f32, _>(index) {
        return CellValue::Float(f64::from(v));
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return CellValue::Boolean(v);
    }
    if let Ok(v) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(index) {
        return CellValue::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string());
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(index) {
        return CellValue::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string());
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(index) {
        return CellValue::Text(v.to_string());
    }
    if let Ok(v) = row.try_get::<chrono::NaiveTime, _>(index) {
        return CellValue::Text(v.to_string());
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return CellValue::Bytes(v);
    }
    // DECIMAL travels as text in the binary protocol
    if type_name == "DECIMAL"
        && let Ok(v) = row.try_get_unchecked::<String, _>(index)
    {
        return CellValue::Text(v);
    }

    CellValue::Undecodable { type_name }
}
