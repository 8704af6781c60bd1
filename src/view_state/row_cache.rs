//! Cache of realized rows for the current layout key

use super::layout_params::LayoutKey;
use crate::model::{Row, RowIndex};
use std::collections::BTreeMap;

/// Outcome of [`RowCache::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// Row stored.
    Stored,
    /// Row was laid out under a different key and was dropped.
    Stale,
}

/// Realized rows keyed by index, valid for exactly one [`LayoutKey`].
///
/// Rows are ordered so the viewport can walk them by position. Each worker
/// reply is the sole writer of its row's entry.
#[derive(Debug, Clone, Default)]
pub struct RowCache {
    rows: BTreeMap<RowIndex, Row>,
    layout: Option<LayoutKey>,
}

impl RowCache {
    /// Create an empty cache with no key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every row and accept only rows produced under `layout`.
    pub fn reset(&mut self, layout: LayoutKey) {
        self.rows.clear();
        self.layout = Some(layout);
    }

    /// Drop every row and the key.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.layout = None;
    }

    /// Current key.
    pub fn layout(&self) -> Option<&LayoutKey> {
        self.layout.as_ref()
    }

    /// Store a row laid out for the current key.
    pub fn insert(&mut self, row: Row) -> Insert {
        let Some(layout) = &self.layout else {
            return Insert::Stale;
        };
        if row.snapshot != layout.snapshot || row.container_width != layout.container_width.get() {
            return Insert::Stale;
        }
        self.rows.insert(row.row_index, row);
        Insert::Stored
    }

    /// Row under the current key.
    pub fn get(&self, row: RowIndex) -> Option<&Row> {
        self.rows.get(&row)
    }

    /// True when the row is cached under the current key.
    pub fn contains(&self, row: RowIndex) -> bool {
        self.rows.contains_key(&row)
    }

    /// Add `delta` to the offset of every cached row after `row`.
    pub fn shift_after(&mut self, row: RowIndex, delta: i64) {
        if delta == 0 {
            return;
        }
        for (_, cached) in self.rows.range_mut(row.next()..) {
            cached.offset += delta;
        }
    }

    /// Iterate over all cached rows in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    /// Number of cached rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemIndex, SnapshotId};
    use crate::view_state::types::ContainerWidth;

    fn key(snapshot: &str, width: u32) -> LayoutKey {
        LayoutKey::new(
            SnapshotId::new(snapshot).unwrap(),
            ContainerWidth::new(width).unwrap(),
        )
    }

    fn test_row(index: usize, snapshot: &str, width: u32) -> Row {
        Row {
            start: ItemIndex::new(index * 4),
            end: ItemIndex::new(index * 4 + 4),
            row_index: RowIndex::new(index),
            row_height: 2400,
            offset: 0,
            top_pixel_accumulated: index as i64 * 2400,
            display_elements: Vec::new(),
            container_width: width,
            snapshot: SnapshotId::new(snapshot).unwrap(),
        }
    }

    #[test]
    fn new_cache_is_empty_without_key() {
        let cache = RowCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.layout(), None);
    }

    #[test]
    fn insert_without_key_is_stale() {
        let mut cache = RowCache::new();
        assert_eq!(cache.insert(test_row(0, "t1", 1000)), Insert::Stale);
    }

    #[test]
    fn insert_and_get_round_trip() {
        let mut cache = RowCache::new();
        cache.reset(key("t1", 1000));
        assert_eq!(cache.insert(test_row(2, "t1", 1000)), Insert::Stored);
        assert!(cache.contains(RowIndex::new(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn insert_rejects_other_snapshot() {
        let mut cache = RowCache::new();
        cache.reset(key("t1", 1000));
        assert_eq!(cache.insert(test_row(2, "t0", 1000)), Insert::Stale);
        assert!(cache.is_empty());
    }

    #[test]
    fn insert_rejects_other_width() {
        let mut cache = RowCache::new();
        cache.reset(key("t1", 1000));
        assert_eq!(cache.insert(test_row(2, "t1", 800)), Insert::Stale);
    }

    #[test]
    fn shift_after_moves_only_later_rows() {
        let mut cache = RowCache::new();
        cache.reset(key("t1", 1000));
        for i in 0..5 {
            cache.insert(test_row(i, "t1", 1000));
        }

        cache.shift_after(RowIndex::new(2), 250);

        let offsets: Vec<i64> = cache.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 0, 0, 250, 250]);
    }

    #[test]
    fn reset_clears_rows() {
        let mut cache = RowCache::new();
        cache.reset(key("t1", 1000));
        cache.insert(test_row(0, "t1", 1000));
        cache.reset(key("t2", 1000));
        assert!(cache.is_empty());
        assert_eq!(cache.layout(), Some(&key("t2", 1000)));
    }
}
