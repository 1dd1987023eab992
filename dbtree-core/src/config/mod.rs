//! Configuration types for the exploration engine.
//!
//! - `ConnectionConfig`: where the driver endpoint lives and which catalog to probe
//! - `FetchOptions`: how fetched values are rendered as text
//!
//! # Security
//! These structs intentionally do NOT store passwords.
//! Credentials are handled separately through the security module.

mod connection;
mod fetch;

pub use connection::{ConnectionConfig, MYSQL_DEFAULT_PORT};
pub use fetch::FetchOptions;
