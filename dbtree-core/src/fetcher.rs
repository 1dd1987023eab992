//! On-demand retrieval of one column's values as text.

use crate::Result;
use crate::config::FetchOptions;
use crate::driver::CellValue;
use crate::error::DbTreeError;
use crate::explorer::{SchemaExplorer, TableContext};
use crate::models::{ColumnRef, ColumnText};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio_util::sync::CancellationToken;

/// Fetches every value of a selected column.
///
/// Each fetch re-runs `SELECT *` against the table named in the request
/// over a fresh connection; nothing is cached between fetches.
#[derive(Debug, Clone)]
pub struct ColumnDataFetcher {
    explorer: SchemaExplorer,
    options: FetchOptions,
}

impl ColumnDataFetcher {
    /// Creates a fetcher rendering values with `options`.
    pub const fn new(explorer: SchemaExplorer, options: FetchOptions) -> Self {
        Self { explorer, options }
    }

    /// Rendering options in use.
    pub const fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Returns the values of `column`, one per row in retrieval order.
    ///
    /// An empty table gives an empty result. So does a column name the table
    /// no longer has; that case is logged but not reported as an error.
    ///
    /// # Errors
    /// `Connection` or `Query` when the table cannot be read, `Extraction`
    /// when a value cannot be rendered as text.
    pub async fn fetch_column_text(&self, column: &ColumnRef) -> Result<ColumnText> {
        self.fetch_column_text_cancellable(column, &CancellationToken::new())
            .await
    }

    /// Like [`fetch_column_text`](Self::fetch_column_text), abandoned with
    /// `DbTreeError::Cancelled` once `cancel` fires. The connection is
    /// released either way.
    pub async fn fetch_column_text_cancellable(
        &self,
        column: &ColumnRef,
        cancel: &CancellationToken,
    ) -> Result<ColumnText> {
        tracing::debug!("Fetching {}", column);
        let context = self
            .explorer
            .table_context_cancellable(&column.catalog, &column.table, cancel)
            .await?;

        let text = extract_column(&context, column, &self.options)?;
        tracing::debug!("Fetched {} values for {}", text.len(), column);
        Ok(text)
    }
}

/// Pulls `column` out of every row of `context`.
fn extract_column(
    context: &TableContext,
    column: &ColumnRef,
    options: &FetchOptions,
) -> Result<ColumnText> {
    let mut text = ColumnText::empty(column);

    let Some(index) = context.column_index(&column.column) else {
        tracing::warn!(
            "Column '{}' not in result schema of {}.{}; returning no values",
            column.column,
            context.catalog,
            context.table
        );
        return Ok(text);
    };

    text.values.reserve(context.rows.len());
    for (row_number, row) in context.rows.iter().enumerate() {
        let cell = row.get(index).ok_or_else(|| {
            DbTreeError::extraction(row_number, &column.column, "row shorter than result schema")
        })?;
        let value = render_cell(cell, options).ok_or_else(|| {
            let type_name = match cell {
                CellValue::Undecodable { type_name } => type_name.as_str(),
                _ => "unknown",
            };
            DbTreeError::extraction(
                row_number,
                &column.column,
                format!("cannot render {} value as text", type_name),
            )
        })?;
        text.values.push(value);
    }

    Ok(text)
}

/// String form of one cell, `None` if the driver could not decode it.
///
/// Binary values that are not UTF-8 are rendered as base64.
pub fn render_cell(cell: &CellValue, options: &FetchOptions) -> Option<String> {
    let rendered = match cell {
        CellValue::Null => options.null_text.clone(),
        CellValue::Text(value) => value.clone(),
        CellValue::Integer(value) => value.to_string(),
        CellValue::Unsigned(value) => value.to_string(),
        CellValue::Float(value) => value.to_string(),
        CellValue::Boolean(value) => value.to_string(),
        CellValue::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(value) => value.to_string(),
            Err(_) => BASE64.encode(bytes),
        },
        CellValue::Undecodable { .. } => return None,
    };
    Some(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Column;

    fn context(columns: &[&str], rows: Vec<Vec<CellValue>>) -> TableContext {
        TableContext {
            catalog: "pets".to_string(),
            table: "dogs".to_string(),
            columns: columns
                .iter()
                .zip(1u32..)
                .map(|(name, ordinal)| Column {
                    name: (*name).to_string(),
                    ordinal_position: ordinal,
                    table: "dogs".to_string(),
                    catalog: "pets".to_string(),
                })
                .collect(),
            rows,
        }
    }

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_string())
    }

    #[test]
    fn test_render_cell() {
        let options = FetchOptions::default();
        assert_eq!(render_cell(&CellValue::Null, &options).unwrap(), "NULL");
        assert_eq!(render_cell(&CellValue::Integer(-7), &options).unwrap(), "-7");
        assert_eq!(render_cell(&CellValue::Unsigned(u64::MAX), &options).unwrap(), "18446744073709551615");
        assert_eq!(render_cell(&CellValue::Float(2.5), &options).unwrap(), "2.5");
        assert_eq!(render_cell(&CellValue::Boolean(true), &options).unwrap(), "true");
        assert_eq!(render_cell(&CellValue::Bytes(b"woof".to_vec()), &options).unwrap(), "woof");
        assert_eq!(render_cell(&CellValue::Bytes(vec![0xff, 0xfe]), &options).unwrap(), "//4=");
        assert!(
            render_cell(&CellValue::Undecodable { type_name: "GEOMETRY".to_string() }, &options)
                .is_none()
        );

        let options = FetchOptions::default().with_null_text("");
        assert_eq!(render_cell(&CellValue::Null, &options).unwrap(), "");
    }

    #[test]
    fn test_extract_column_in_row_order() {
        let context = context(
            &["id", "name"],
            vec![
                vec![CellValue::Integer(1), text("Rex")],
                vec![CellValue::Integer(2), text("Mimi")],
                vec![CellValue::Integer(3), text("Fido")],
            ],
        );
        let column = ColumnRef::new("pets", "dogs", "name");
        let result = extract_column(&context, &column, &FetchOptions::default()).unwrap();
        assert_eq!(result.values, vec!["Rex", "Mimi", "Fido"]);
        assert_eq!(result.table, "dogs");
    }

    #[test]
    fn test_extract_missing_column_is_empty() {
        let context = context(&["name"], vec![vec![text("Rex")]]);
        let column = ColumnRef::new("pets", "dogs", "color");
        let result = extract_column(&context, &column, &FetchOptions::default()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_extract_undecodable_reports_row() {
        let context = context(
            &["shape"],
            vec![
                vec![text("POINT(0 0)")],
                vec![CellValue::Undecodable {
                    type_name: "GEOMETRY".to_string(),
                }],
            ],
        );
        let column = ColumnRef::new("pets", "dogs", "shape");
        let err = extract_column(&context, &column, &FetchOptions::default()).unwrap_err();
        match err {
            DbTreeError::Extraction { row, column, context } => {
                assert_eq!(row, 1);
                assert_eq!(column, "shape");
                assert!(context.contains("GEOMETRY"));
            }
            other => panic!("expected extraction error, got {other:?}"),
        }
    }
}
