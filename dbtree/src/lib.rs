//! Library module for dbtree
//!
//! Exposes the presentation helpers for testing.
//! The CLI itself lives in main.rs.

pub mod browse;
pub mod render;
