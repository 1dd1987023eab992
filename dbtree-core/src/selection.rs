//! Background fetching driven by leaf selection.
//!
//! At most one fetch is in flight. Selecting a new column cancels the
//! previous fetch and waits for it to release its connection before the new
//! fetch starts, so two fetches never hold connections at once.

use crate::Result;
use crate::error::{DbTreeError, DriverMessage};
use crate::fetcher::ColumnDataFetcher;
use crate::models::{ColumnRef, ColumnText};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct InFlight {
    column: ColumnRef,
    cancel: CancellationToken,
    handle: JoinHandle<Result<ColumnText>>,
}

/// Runs one cancellable fetch task per selection.
///
/// # Example
/// ```rust,no_run
/// # async fn demo(browser: dbtree_core::SchemaBrowser) {
/// use dbtree_core::models::ColumnRef;
///
/// let mut selection = browser.selection_fetcher();
/// selection.select(ColumnRef::new("pets", "dogs", "name")).await;
/// selection.select(ColumnRef::new("pets", "cats", "name")).await;
///
/// // Only the cats fetch is still running
/// if let Some(Ok(text)) = selection.next_result().await {
///     println!("{}", text.to_text());
/// }
/// # }
/// ```
pub struct SelectionFetcher {
    fetcher: ColumnDataFetcher,
    current: Option<InFlight>,
}

impl std::fmt::Debug for SelectionFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionFetcher")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl SelectionFetcher {
    /// Creates a fetcher with nothing in flight.
    pub const fn new(fetcher: ColumnDataFetcher) -> Self {
        Self {
            fetcher,
            current: None,
        }
    }

    /// Column whose fetch has not been collected yet.
    pub fn in_flight(&self) -> Option<&ColumnRef> {
        self.current.as_ref().map(|current| &current.column)
    }

    /// Starts fetching `column`, superseding any fetch still running.
    ///
    /// Returns once the superseded fetch has wound down and the new one has
    /// been spawned.
    pub async fn select(&mut self, column: ColumnRef) {
        if let Some(previous) = self.cancel().await {
            tracing::debug!("Selection of {} superseded {}", column, previous);
        }

        let cancel = CancellationToken::new();
        let fetcher = self.fetcher.clone();
        let task_column = column.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            fetcher
                .fetch_column_text_cancellable(&task_column, &task_cancel)
                .await
        });

        self.current = Some(InFlight {
            column,
            cancel,
            handle,
        });
    }

    /// Waits for the current fetch and returns its result.
    ///
    /// Returns `None` when nothing was selected since the last result.
    /// Cancel safe: if this future is dropped, the fetch keeps running and a
    /// later call still gets its result.
    pub async fn next_result(&mut self) -> Option<Result<ColumnText>> {
        let current = self.current.as_mut()?;
        let joined = (&mut current.handle).await;
        self.current = None;
        Some(joined.unwrap_or_else(|e| Err(join_failure(e))))
    }

    /// Cancels the current fetch and waits until it has released its
    /// connection. Returns the column that was being fetched.
    pub async fn cancel(&mut self) -> Option<ColumnRef> {
        let current = self.current.take()?;
        current.cancel.cancel();
        if let Err(e) = current.handle.await {
            tracing::warn!("Fetch task for {} ended abnormally: {}", current.column, e);
        }
        Some(current.column)
    }
}

impl Drop for SelectionFetcher {
    fn drop(&mut self) {
        // The task releases its own connection once it observes the token
        if let Some(current) = &self.current {
            current.cancel.cancel();
        }
    }
}

fn join_failure(error: tokio::task::JoinError) -> DbTreeError {
    if error.is_cancelled() {
        DbTreeError::Cancelled
    } else {
        DbTreeError::query_failed(
            "fetch task",
            DriverMessage::new(format!("fetch task panicked: {}", error)),
        )
    }
}
