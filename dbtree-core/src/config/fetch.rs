//! Column fetch rendering options.

use serde::{Deserialize, Serialize};

/// Controls how fetched cell values are rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Text shown for SQL NULL
    pub null_text: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            null_text: "NULL".to_string(),
        }
    }
}

impl FetchOptions {
    /// Builder method to set the NULL placeholder.
    pub fn with_null_text(mut self, null_text: impl Into<String>) -> Self {
        self.null_text = null_text.into();
        self
    }
}
