//! Interactive selection loop.
//!
//! Reads one selection per line and shows each fetch as it completes. A new
//! selection typed while a fetch is still running supersedes it.

use crate::render::{describe_error, render_column_text, render_leaf_menu};
use dbtree_core::{ColumnRef, DbTreeError, Result, SchemaBrowser};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// What one input line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseCommand {
    /// Fetch and show a column
    Select(ColumnRef),
    /// Print the column menu again
    List,
    /// Stop browsing
    Quit,
    /// Blank line
    Nothing,
}

/// Parses a line: a menu number, `catalog.table.column`, `list` or `quit`.
///
/// # Errors
/// Returns a message for the user when the line names no known column.
pub fn parse_line(line: &str, columns: &[ColumnRef]) -> std::result::Result<BrowseCommand, String> {
    let line = line.trim();
    match line {
        "" => return Ok(BrowseCommand::Nothing),
        "list" | "ls" => return Ok(BrowseCommand::List),
        "quit" | "exit" | "q" => return Ok(BrowseCommand::Quit),
        _ => {}
    }

    if let Ok(number) = line.parse::<usize>() {
        return number
            .checked_sub(1)
            .and_then(|index| columns.get(index))
            .cloned()
            .map(BrowseCommand::Select)
            .ok_or_else(|| format!("No column numbered {}", number));
    }

    let column = ColumnRef::parse_dotted(line)
        .ok_or_else(|| format!("Expected a number or catalog.table.column, got '{}'", line))?;
    if columns.contains(&column) {
        Ok(BrowseCommand::Select(column))
    } else {
        Err(format!("Unknown column '{}'", column))
    }
}

async fn write_out<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> Result<()> {
    output
        .write_all(text.as_bytes())
        .await
        .map_err(|e| DbTreeError::io("write browse output", e))?;
    output
        .flush()
        .await
        .map_err(|e| DbTreeError::io("flush browse output", e))
}

async fn write_result<W: AsyncWrite + Unpin>(
    output: &mut W,
    result: Result<dbtree_core::ColumnText>,
) -> Result<()> {
    match result {
        Ok(text) => write_out(output, &render_column_text(&text)).await,
        Err(e) => write_out(output, &format!("{}\n", describe_error(&e))).await,
    }
}

/// Runs the selection loop until `input` ends or the user quits.
///
/// A fetch still running when input ends is waited for and shown.
pub async fn run_browse<R, W>(
    browser: &SchemaBrowser,
    columns: &[ColumnRef],
    input: R,
    mut output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut selection = browser.selection_fetcher();

    write_out(&mut output, &render_leaf_menu(columns)).await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = line.map_err(|e| DbTreeError::io("read selection", e))?;
                let Some(line) = line else { break };
                match parse_line(&line, columns) {
                    Ok(BrowseCommand::Select(column)) => {
                        tracing::debug!("Selected {}", column);
                        selection.select(column).await;
                    }
                    Ok(BrowseCommand::List) => {
                        write_out(&mut output, &render_leaf_menu(columns)).await?;
                    }
                    Ok(BrowseCommand::Quit) => {
                        selection.cancel().await;
                        return Ok(());
                    }
                    Ok(BrowseCommand::Nothing) => {}
                    Err(message) => write_out(&mut output, &format!("{}\n", message)).await?,
                }
            }
            Some(result) = selection.next_result(), if selection.in_flight().is_some() => {
                write_result(&mut output, result).await?;
            }
        }
    }

    if let Some(result) = selection.next_result().await {
        write_result(&mut output, result).await?;
    }
    Ok(())
}
