//! Core identifier newtypes with smart constructors.
//!
//! Index newtypes partition the server-side item index. String identifiers
//! validate non-empty input at construction time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a row in the collection. Rows partition the item index at a
/// fixed nominal capacity, so row indices are contiguous from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowIndex(usize);

impl RowIndex {
    /// Create a row index from a raw 0-based value.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw 0-based value.
    pub fn get(&self) -> usize {
        self.0
    }

    /// Row holding the given item for a fixed row capacity.
    pub fn containing(item: ItemIndex, row_capacity: usize) -> Self {
        Self(item.get() / row_capacity.max(1))
    }

    /// The next row.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// The previous row, or `None` at row 0.
    pub fn prev(&self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}

impl fmt::Display for RowIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}", self.0)
    }
}

/// Position of an item in the server-resident index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemIndex(usize);

impl ItemIndex {
    /// Create an item index from a raw 0-based value.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw 0-based value.
    pub fn get(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ItemIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item {}", self.0)
    }
}

/// Fixed-size contiguous slice of the item index used for metadata prefetch.
///
/// Batch granularity is independent of row granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(usize);

impl BatchId {
    /// Create a batch id from a raw value.
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub fn get(&self) -> usize {
        self.0
    }

    /// Batch holding the given item.
    pub fn containing(item: ItemIndex, batch_size: usize) -> Self {
        Self(item.get() / batch_size.max(1))
    }

    /// Half-open item range `[start, end)` covered by this batch, clipped to `item_count`.
    pub fn item_range(&self, batch_size: usize, item_count: usize) -> (ItemIndex, ItemIndex) {
        let start = (self.0 * batch_size).min(item_count);
        let end = (start + batch_size).min(item_count);
        (ItemIndex::new(start), ItemIndex::new(end))
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch {}", self.0)
    }
}

/// Opaque identifier ("timestamp") of one consistent view of the collection.
///
/// Invalidated whenever the filter or sort changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

/// Error returned for an empty snapshot identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Snapshot id must not be empty")]
pub struct InvalidSnapshotId;

impl SnapshotId {
    /// Smart constructor: validates a non-empty snapshot id.
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidSnapshotId> {
        let raw = raw.into();
        if raw.is_empty() {
            Err(InvalidSnapshotId)
        } else {
            Ok(Self(raw))
        }
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of an isolation context (e.g. "main" or "modal").
///
/// Each isolation owns its own full component set; nothing is shared across them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IsolationId(String);

/// Error returned for an empty isolation name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Isolation id must not be empty")]
pub struct InvalidIsolationId;

impl IsolationId {
    /// Smart constructor: validates a non-empty isolation name.
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidIsolationId> {
        let raw = raw.into();
        if raw.is_empty() {
            Err(InvalidIsolationId)
        } else {
            Ok(Self(raw))
        }
    }

    /// The default isolation used by the primary view.
    pub fn main() -> Self {
        Self("main".to_string())
    }

    /// Borrow the raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IsolationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
