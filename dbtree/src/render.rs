//! Text and JSON rendering of discovery and fetch results.

use clap::ValueEnum;
use dbtree_core::{ColumnRef, ColumnText, DbTreeError, DiscoveryFailure, Hierarchy, Result};
use std::error::Error as _;

/// How `tree` prints the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TreeFormat {
    /// Indented outline, two spaces per level
    #[default]
    Outline,
    /// Flat node arena plus discovery failures
    Json,
}

/// Renders `hierarchy` in `format`.
pub fn render_hierarchy(hierarchy: &Hierarchy, format: TreeFormat) -> Result<String> {
    match format {
        TreeFormat::Outline => Ok(hierarchy.render_outline()),
        TreeFormat::Json => serde_json::to_string_pretty(hierarchy)
            .map_err(|e| DbTreeError::serialization("hierarchy JSON", e)),
    }
}

/// One line per discovery failure, tagged by kind.
pub fn describe_failure(failure: &DiscoveryFailure) -> String {
    format!("[{}] {}: {}", failure.kind, failure.scope, failure.message)
}

/// An error tagged by kind, including its source chain.
pub fn describe_error(error: &DbTreeError) -> String {
    let mut message = format!("[{}] {}", error.kind(), error);
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Column leaves of `hierarchy` in tree order, resolved from ancestry.
pub fn leaf_columns(hierarchy: &Hierarchy) -> Vec<ColumnRef> {
    hierarchy
        .leaves()
        .filter_map(|leaf| hierarchy.column_ref(leaf.id))
        .collect()
}

/// Numbered menu of selectable columns, starting at 1.
pub fn render_leaf_menu(columns: &[ColumnRef]) -> String {
    let width = columns.len().to_string().len();
    columns
        .iter()
        .zip(1usize..)
        .map(|(column, number)| format!("{:>width$}  {}\n", number, column, width = width))
        .collect()
}

/// Header plus newline-joined values for one fetch.
pub fn render_column_text(text: &ColumnText) -> String {
    let mut out = format!(
        "== {}.{}.{} ({} rows) ==\n",
        text.catalog,
        text.table,
        text.column,
        text.len()
    );
    if !text.is_empty() {
        out.push_str(&text.to_text());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbtree_core::error::DriverMessage;
    use dbtree_core::{DiscoveryScope, ErrorKind};

    #[test]
    fn test_describe_failure() {
        let failure = DiscoveryFailure {
            scope: DiscoveryScope::Tables {
                catalog: "mysql".to_string(),
            },
            kind: ErrorKind::Query,
            message: "denied".to_string(),
        };
        assert_eq!(describe_failure(&failure), "[query] tables of 'mysql': denied");
    }

    #[test]
    fn test_describe_error_includes_source() {
        let error = DbTreeError::connection_failed("localhost/pets", DriverMessage::new("refused"));
        assert_eq!(
            describe_error(&error),
            "[connection] Database connection failed: localhost/pets: refused"
        );
    }

    #[test]
    fn test_leaf_menu_numbering() {
        let columns: Vec<ColumnRef> = (0..10)
            .map(|i| ColumnRef::new("pets", "dogs", format!("c{}", i)))
            .collect();
        let menu = render_leaf_menu(&columns);
        assert!(menu.starts_with(" 1  pets.dogs.c0\n"));
        assert!(menu.ends_with("10  pets.dogs.c9\n"));
    }

    #[test]
    fn test_render_column_text() {
        let mut text = ColumnText::empty(&ColumnRef::new("pets", "dogs", "name"));
        assert_eq!(render_column_text(&text), "== pets.dogs.name (0 rows) ==\n");

        text.values = vec!["Rex".to_string(), "Mimi".to_string()];
        assert_eq!(
            render_column_text(&text),
            "== pets.dogs.name (2 rows) ==\nRex\nMimi\n"
        );
    }
}
