//! Wire types for the consumed services and validation at the parsing boundary.
//!
//! Everything the engine computes on has passed through here first, so layout
//! and ledger code never see malformed input.

use super::error::SchemaError;
use super::identifiers::{ItemIndex, RowIndex};
use crate::view_state::types::AspectRatio;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unlaid-out item inside a row reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    /// Item index in the collection.
    pub index: usize,
    /// Original pixel width.
    pub width: u32,
    /// Original pixel height.
    pub height: u32,
}

/// Raw row descriptor returned by `GET rows`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// Row index.
    pub index: usize,
    /// First item (inclusive).
    pub start: usize,
    /// Last item (exclusive).
    pub end: usize,
    /// Items in index order.
    pub items: Vec<RawItem>,
}

impl RawRow {
    /// Decode a row reply body.
    pub fn parse(body: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(body).map_err(|e| SchemaError::json("row", &e))
    }

    /// Check the row against the request and return its layout input.
    ///
    /// # Errors
    /// - `RowIndexMismatch` when the reply is for another row
    /// - `RowStart` when the row does not begin at `index * row_capacity`
    /// - `RowLength` when the item count disagrees with `end - start`, or a
    ///   non-final row is short of `row_capacity`
    /// - `ItemOutOfPlace` when the k-th item is not item `start + k`
    /// - `NonPositiveDimension` for a zero-sized item
    pub fn validate(
        &self,
        expected: RowIndex,
        row_capacity: usize,
        is_last_row: bool,
    ) -> Result<Vec<(ItemIndex, AspectRatio)>, SchemaError> {
        if self.index != expected.get() {
            return Err(SchemaError::RowIndexMismatch {
                expected: expected.get(),
                actual: self.index,
            });
        }
        let first = expected.get() * row_capacity;
        if self.start != first {
            return Err(SchemaError::RowStart {
                row: self.index,
                expected: first,
                actual: self.start,
            });
        }
        let span = self.end.saturating_sub(self.start);
        if span != self.items.len() || (!is_last_row && span != row_capacity) {
            return Err(SchemaError::RowLength {
                row: self.index,
                expected: if is_last_row { span } else { row_capacity },
                actual: self.items.len(),
            });
        }
        if let Some((k, item)) = self
            .items
            .iter()
            .enumerate()
            .find(|(k, item)| item.index != self.start + k)
        {
            return Err(SchemaError::ItemOutOfPlace {
                row: self.index,
                expected: self.start + k,
                actual: item.index,
            });
        }
        self.items
            .iter()
            .map(|item| {
                AspectRatio::from_dimensions(item.width, item.height)
                    .map(|ratio| (ItemIndex::new(item.index), ratio))
                    .map_err(|_| SchemaError::NonPositiveDimension { item: item.index })
            })
            .collect()
    }
}

/// Bulk metadata for one item, returned by `GET data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Item index in the collection.
    pub index: ItemIndex,
    /// Content hash; doubles as the handle for per-item credentials.
    pub hash: String,
    /// Original pixel width.
    pub width: u32,
    /// Original pixel height.
    pub height: u32,
    /// Capture time, when known.
    #[serde(default)]
    pub taken_at: Option<DateTime<Utc>>,
    /// Tag names.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Album names.
    #[serde(default)]
    pub albums: Vec<String>,
    /// Per-item hash token, when the service issues one with the metadata.
    #[serde(default)]
    pub token: Option<String>,
}

impl Item {
    /// Decode and validate one element of a `data` reply.
    pub fn decode(value: serde_json::Value) -> Result<Self, SchemaError> {
        let item: Item =
            serde_json::from_value(value).map_err(|e| SchemaError::json("item", &e))?;
        if item.hash.is_empty() {
            return Err(SchemaError::EmptyField("hash"));
        }
        if item.width == 0 || item.height == 0 {
            return Err(SchemaError::NonPositiveDimension {
                item: item.index.get(),
            });
        }
        Ok(item)
    }
}

/// Decode a `data` reply body into its still-undecoded elements.
///
/// Elements are decoded one at a time by the worker so a superseded batch can
/// stop between items.
pub fn parse_item_array(body: &str) -> Result<Vec<serde_json::Value>, SchemaError> {
    serde_json::from_str(body).map_err(|e| SchemaError::json("data", &e))
}

/// One entry of the sparse chronological index returned by `GET scrollbar`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    /// First item of the marked period.
    pub index: ItemIndex,
    /// Human label, e.g. "2024-05".
    pub label: String,
}

impl Marker {
    /// Decode a scrollbar reply body.
    pub fn parse_all(body: &str) -> Result<Vec<Marker>, SchemaError> {
        serde_json::from_str(body).map_err(|e| SchemaError::json("scrollbar", &e))
    }
}

/// Body of a token renewal reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReply {
    /// Renewed raw token.
    pub token: String,
}

impl TokenReply {
    /// Decode a renewal reply body.
    pub fn parse(body: &str) -> Result<Self, SchemaError> {
        let reply: TokenReply =
            serde_json::from_str(body).map_err(|e| SchemaError::json("token", &e))?;
        if reply.token.is_empty() {
            return Err(SchemaError::EmptyField("token"));
        }
        Ok(reply)
    }
}
