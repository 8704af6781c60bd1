//! Laid-out geometry: display elements, subrows, and rows.
//!
//! Pure data. A [`Row`] is immutable after layout until the next re-layout;
//! only its `offset` moves as earlier rows are measured.

use super::identifiers::{ItemIndex, RowIndex, SnapshotId};
use serde::Serialize;

/// One thumbnail's box inside a row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayElement {
    /// Item this box renders.
    pub item: ItemIndex,
    /// Width in pixels, excluding padding.
    pub display_width: f64,
    /// Height in pixels, excluding padding.
    pub display_height: f64,
    /// Top of the owning subrow relative to the row top.
    pub display_top_pixel_accumulated: f64,
}

/// One justified line within a row. Transient layout output.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SubRow {
    /// Boxes in left-to-right order.
    pub display_elements: Vec<DisplayElement>,
}

impl SubRow {
    /// Uniform height of the subrow (0 for an empty subrow).
    pub fn height(&self) -> f64 {
        self.display_elements
            .first()
            .map(|e| e.display_height)
            .unwrap_or(0.0)
    }

    /// Sum of box widths, excluding padding.
    pub fn width_sum(&self) -> f64 {
        self.display_elements.iter().map(|e| e.display_width).sum()
    }

    /// Number of boxes.
    pub fn len(&self) -> usize {
        self.display_elements.len()
    }

    /// True when the subrow has no boxes.
    pub fn is_empty(&self) -> bool {
        self.display_elements.is_empty()
    }
}

/// Output of the justification engine for one row.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RowLayout {
    /// Justified lines, top to bottom.
    pub subrows: Vec<SubRow>,
    /// Σ(subrow height + 2 * padding).
    pub realized_height: f64,
}

impl RowLayout {
    /// Flatten the subrows into display elements in reading order.
    pub fn into_elements(self) -> Vec<DisplayElement> {
        self.subrows
            .into_iter()
            .flat_map(|s| s.display_elements)
            .collect()
    }
}

/// One renderable strip: a fixed-capacity partition of the item index.
///
/// # Invariants
/// - `start..end` is half-open; `end - start` equals the nominal capacity
///   except possibly for the final row
/// - `top_pixel_accumulated == row_index * nominal_row_height`
/// - `offset` is the sum of ledger deltas of every row with a smaller index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    /// First item (inclusive).
    pub start: ItemIndex,
    /// Last item (exclusive).
    pub end: ItemIndex,
    /// Position of the row in the collection.
    pub row_index: RowIndex,
    /// Realized height in whole pixels.
    pub row_height: i64,
    /// Cumulative correction from the offset ledger.
    pub offset: i64,
    /// Nominal top before correction.
    pub top_pixel_accumulated: i64,
    /// Laid-out boxes in reading order.
    pub display_elements: Vec<DisplayElement>,
    /// Container width the row was laid out for.
    pub container_width: u32,
    /// Snapshot the row belongs to.
    pub snapshot: SnapshotId,
}

impl Row {
    /// Corrected top position.
    pub fn top(&self) -> i64 {
        self.top_pixel_accumulated + self.offset
    }

    /// Corrected bottom position (exclusive).
    pub fn bottom(&self) -> i64 {
        self.top() + self.row_height
    }

    /// True when `[top, bottom)` intersects `[start, end)`.
    pub fn intersects(&self, start: i64, end: i64) -> bool {
        self.top() < end && self.bottom() > start
    }

    /// Number of items in the row.
    pub fn len(&self) -> usize {
        self.end.get().saturating_sub(self.start.get())
    }

    /// True when the row holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(item: usize, width: f64, height: f64, top: f64) -> DisplayElement {
        DisplayElement {
            item: ItemIndex::new(item),
            display_width: width,
            display_height: height,
            display_top_pixel_accumulated: top,
        }
    }

    fn row(index: usize, offset: i64, height: i64) -> Row {
        Row {
            start: ItemIndex::new(index * 10),
            end: ItemIndex::new(index * 10 + 10),
            row_index: RowIndex::new(index),
            row_height: height,
            offset,
            top_pixel_accumulated: index as i64 * 100,
            display_elements: Vec::new(),
            container_width: 1000,
            snapshot: SnapshotId::new("t").unwrap(),
        }
    }

    #[test]
    fn subrow_height_is_first_element_height() {
        let subrow = SubRow {
            display_elements: vec![element(0, 100.0, 80.0, 0.0), element(1, 50.0, 80.0, 0.0)],
        };
        assert_eq!(subrow.height(), 80.0);
        assert_eq!(subrow.width_sum(), 150.0);
        assert_eq!(subrow.len(), 2);
    }

    #[test]
    fn empty_subrow_has_zero_height() {
        assert_eq!(SubRow::default().height(), 0.0);
        assert!(SubRow::default().is_empty());
    }

    #[test]
    fn row_top_includes_offset() {
        let r = row(3, 25, 120);
        assert_eq!(r.top(), 325);
        assert_eq!(r.bottom(), 445);
    }

    #[test]
    fn row_intersects_half_open_range() {
        let r = row(1, 0, 100); // [100, 200)
        assert!(r.intersects(150, 160));
        assert!(r.intersects(0, 101));
        assert!(!r.intersects(0, 100));
        assert!(!r.intersects(200, 300));
    }

    #[test]
    fn layout_flattens_in_reading_order() {
        let layout = RowLayout {
            subrows: vec![
                SubRow { display_elements: vec![element(0, 1.0, 1.0, 0.0)] },
                SubRow { display_elements: vec![element(1, 1.0, 1.0, 1.0)] },
            ],
            realized_height: 2.0,
        };
        let items: Vec<_> = layout.into_elements().iter().map(|e| e.item.get()).collect();
        assert_eq!(items, vec![0, 1]);
    }
}
