//! Typed messages between an engine and its background worker.
//!
//! One tagged union per direction. Replies are keyed by row index, batch id,
//! or item index, never by issue order, because completions arrive out of
//! order.

use crate::auth::TokenClass;
use crate::model::{BatchId, Item, ItemIndex, Marker, RequestError, Row, RowIndex, SnapshotId};
use crate::view_state::types::ContainerWidth;
use serde::Serialize;

/// Which slice of metadata a `FetchData` request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "method", content = "key", rename_all = "snake_case")]
pub enum DataMethod {
    /// A whole batch, subject to stale-batch cancellation.
    Batch(BatchId),
    /// A single item, outside the batch cadence.
    Single(ItemIndex),
}

/// Engine to worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerRequest {
    /// Install a token obtained by logging in.
    InstallToken {
        /// Credential class.
        class: TokenClass,
        /// Raw token.
        token: String,
    },
    /// Fetch and lay out one row.
    FetchRow {
        /// Row to fetch.
        index: RowIndex,
        /// Snapshot the row belongs to.
        timestamp: SnapshotId,
        /// Container width to lay out for.
        window_width: ContainerWidth,
        /// Whether this is the collection's final row.
        is_last_row: bool,
        /// Engine's snapshot token, used only when the worker has none.
        token: String,
    },
    /// Fetch item metadata.
    FetchData {
        /// Batch or single item.
        method: DataMethod,
        /// Snapshot the data belongs to.
        timestamp: SnapshotId,
        /// Engine's snapshot token, used only when the worker has none.
        token: String,
    },
    /// Fetch the scrollbar index.
    FetchScrollbar {
        /// Snapshot to index.
        timestamp: SnapshotId,
    },
    /// Add and remove tags on items.
    EditTags {
        /// Items to edit.
        items: Vec<ItemIndex>,
        /// Tags to add.
        add: Vec<String>,
        /// Tags to remove.
        remove: Vec<String>,
    },
    /// Add and remove album membership.
    EditAlbums {
        /// Items to edit.
        items: Vec<ItemIndex>,
        /// Albums to add to.
        add: Vec<String>,
        /// Albums to remove from.
        remove: Vec<String>,
    },
    /// Delete items.
    DeleteData {
        /// Items to delete.
        items: Vec<ItemIndex>,
    },
    /// Request a decoded thumbnail.
    Thumbnail {
        /// Item index.
        index: ItemIndex,
        /// Item hash.
        hash: String,
        /// Longest edge in pixels.
        target_size: u32,
    },
    /// The item left the visible window.
    AbortThumbnail {
        /// Item index.
        index: ItemIndex,
    },
    /// Drop queued work: the snapshot or width changed.
    Reset,
    /// Forget all credentials.
    Logout,
    /// Stop the worker.
    Shutdown,
}

/// Severity of a [`WorkerReply::Notification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Informational.
    Info,
    /// Something the user should know failed.
    Error,
}

/// Worker to engine.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerReply {
    /// A laid-out row.
    FetchRowReturn {
        /// The row, with zero offset.
        row: Row,
        /// Snapshot it was laid out under.
        timestamp: SnapshotId,
    },
    /// A row request failed.
    RowFailed {
        /// Row index.
        index: RowIndex,
        /// Snapshot of the request.
        timestamp: SnapshotId,
        /// What went wrong.
        error: RequestError,
    },
    /// Decoded metadata.
    ReturnData {
        /// What was requested.
        method: DataMethod,
        /// Snapshot of the request.
        timestamp: SnapshotId,
        /// Items in index order.
        items: Vec<Item>,
    },
    /// A batch was superseded before it finished decoding; nothing was committed.
    DataCancelled {
        /// Cancelled batch.
        batch: BatchId,
    },
    /// A metadata request failed.
    DataFailed {
        /// What was requested.
        method: DataMethod,
        /// What went wrong.
        error: RequestError,
    },
    /// Scrollbar markers.
    ScrollbarReturn {
        /// Snapshot they index.
        timestamp: SnapshotId,
        /// Markers in index order.
        markers: Vec<Marker>,
    },
    /// Items after a tag edit.
    EditTagsReturn {
        /// Updated items.
        items: Vec<Item>,
    },
    /// A token was renewed; the engine should use it for later requests.
    TokenRenewed {
        /// Credential class.
        class: TokenClass,
        /// New raw token.
        token: String,
    },
    /// A thumbnail finished decoding.
    ThumbnailReady {
        /// Item index.
        index: ItemIndex,
        /// Handle to the decoded image.
        url: String,
    },
    /// A thumbnail could not be produced.
    ThumbnailFailed {
        /// Item index.
        index: ItemIndex,
        /// What went wrong.
        error: RequestError,
    },
    /// User-facing message.
    Notification {
        /// Severity.
        level: NotificationLevel,
        /// Message text.
        message: String,
    },
}
