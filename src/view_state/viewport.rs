//! Viewport reconciler - visible row window and scroll correction
//!
//! Given a scroll offset and viewport height, computes which cached rows
//! intersect the padded pixel range, and keeps the content under the user
//! still while measured heights change above it.
//!
//! # Reconciliation
//!
//! 1. A pending anchor pins the window to the anchored row until that row's
//!    data arrives; the scroll offset then jumps to the row and the anchor clears.
//! 2. Otherwise the first on-screen row of the previous frame is the reference.
//!    If its offset moved by Δ, scrollTop moves by Δ (clamped).
//! 3. Visible rows are collected from the previous frame's rows when they still
//!    intersect the range, or from a binary search over the ledger otherwise,
//!    then padded with one cached row on each side.

use super::offset_ledger::OffsetLedger;
use super::row_cache::RowCache;
use super::scroll::{ScrollBounds, ScrollClamp, ScrollInput};
use crate::model::{Row, RowIndex};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Tunables for the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportConfig {
    /// Pixels added above and below the viewport.
    pub padding: i64,
    /// Slack subtracted from the bottom scroll bound.
    pub end_padding: i64,
    /// Whether input comes from a touch device.
    pub touch: bool,
    /// Momentum suppression after a clamp on touch devices.
    pub touch_lock: Duration,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            padding: 1000,
            end_padding: 0,
            touch: false,
            touch_lock: Duration::from_millis(100),
        }
    }
}

/// One row of the visible window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VisibleRow {
    /// Row index.
    pub row_index: RowIndex,
    /// Corrected top.
    pub top: i64,
    /// Realized (or nominal, for a placeholder) height.
    pub height: i64,
    /// Ledger offset at the time of this frame.
    pub offset: i64,
    /// False for an anchored row whose data has not arrived.
    pub loaded: bool,
}

impl VisibleRow {
    fn from_row(row: &Row) -> Self {
        Self {
            row_index: row.row_index,
            top: row.top(),
            height: row.row_height,
            offset: row.offset,
            loaded: true,
        }
    }

    fn placeholder(row: RowIndex, ledger: &OffsetLedger) -> Self {
        Self {
            row_index: row,
            top: ledger.top_of(row),
            height: ledger.height_of(row),
            offset: ledger.offset_of(row),
            loaded: false,
        }
    }
}

/// Result of one reconciliation: the rows to render.
///
/// `visible_rows` is sorted by corrected top.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ViewportWindow {
    /// Scroll offset after correction.
    pub scroll_top: i64,
    /// Top of the padded range.
    pub start_height: i64,
    /// Bottom of the padded range (exclusive).
    pub end_height: i64,
    /// Rows to render.
    pub visible_rows: Vec<VisibleRow>,
}

impl ViewportWindow {
    /// Indices of the visible rows, in order.
    pub fn row_indices(&self) -> Vec<RowIndex> {
        self.visible_rows.iter().map(|r| r.row_index).collect()
    }

    /// Check if a row is in the window.
    pub fn contains(&self, row: RowIndex) -> bool {
        self.visible_rows.iter().any(|r| r.row_index == row)
    }

    /// Number of visible rows.
    pub fn len(&self) -> usize {
        self.visible_rows.len()
    }

    /// Check if the window is empty.
    pub fn is_empty(&self) -> bool {
        self.visible_rows.is_empty()
    }
}

/// What changed during [`ViewportReconciler::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reconciliation {
    /// Scroll shift applied to compensate for offset changes.
    pub correction: Option<i64>,
    /// The pending anchor's row arrived and the anchor was cleared.
    pub anchor_resolved: bool,
    /// The window differs from the previous frame.
    pub changed: bool,
}

/// Viewport state for one isolation context.
#[derive(Debug, Clone)]
pub struct ViewportReconciler {
    config: ViewportConfig,
    scroll_top: i64,
    viewport_height: i64,
    anchor: Option<RowIndex>,
    window: ViewportWindow,
    clamp: ScrollClamp,
}

impl ViewportReconciler {
    /// Create a reconciler scrolled to the top.
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            scroll_top: 0,
            viewport_height: 0,
            anchor: None,
            window: ViewportWindow::default(),
            clamp: ScrollClamp::new(config.touch, config.touch_lock),
        }
    }

    /// Forget the previous frame, anchor, and scroll position.
    pub fn clear(&mut self) {
        self.scroll_top = 0;
        self.anchor = None;
        self.window = ViewportWindow::default();
    }

    /// Current scroll offset.
    pub fn scroll_top(&self) -> i64 {
        self.scroll_top
    }

    /// Current viewport height.
    pub fn viewport_height(&self) -> i64 {
        self.viewport_height
    }

    /// Set the viewport height.
    pub fn set_viewport_height(&mut self, height: i64) {
        self.viewport_height = height.max(0);
    }

    /// Window computed by the last reconciliation.
    pub fn window(&self) -> &ViewportWindow {
        &self.window
    }

    /// Pending anchor, if any.
    pub fn anchor(&self) -> Option<RowIndex> {
        self.anchor
    }

    /// Pin the window to `row` until its data arrives.
    pub fn set_anchor(&mut self, row: RowIndex) {
        self.anchor = Some(row);
    }

    /// Padded pixel range `[start_height, end_height)` around the viewport.
    pub fn padded_range(&self) -> (i64, i64) {
        let start = (self.scroll_top - self.config.padding).max(0);
        let end = self.scroll_top + self.viewport_height + self.config.padding;
        (start, end)
    }

    /// Scroll bounds for the ledger's current total height.
    pub fn bounds(&self, ledger: &OffsetLedger) -> ScrollBounds {
        ScrollBounds::new(
            ledger.total_height(),
            self.viewport_height,
            self.config.end_padding,
        )
    }

    /// Intercept manual scroll input and re-clamp it.
    pub fn user_scroll(&mut self, requested: i64, ledger: &OffsetLedger, now: Instant) -> ScrollInput {
        let bounds = self.bounds(ledger);
        let input = self.clamp.intercept(requested, self.scroll_top, &bounds, now);
        self.scroll_top = input.position();
        input
    }

    /// Recompute the window against the current cache and ledger.
    pub fn reconcile(&mut self, cache: &RowCache, ledger: &OffsetLedger) -> Reconciliation {
        let bounds = self.bounds(ledger);
        let mut outcome = Reconciliation::default();

        if let Some(anchor) = self.anchor {
            match cache.get(anchor) {
                Some(row) => {
                    self.scroll_top = bounds.clamp(row.top());
                    self.anchor = None;
                    outcome.anchor_resolved = true;
                }
                None => {
                    self.scroll_top = bounds.clamp(ledger.top_of(anchor));
                    let (start_height, end_height) = self.padded_range();
                    let window = ViewportWindow {
                        scroll_top: self.scroll_top,
                        start_height,
                        end_height,
                        visible_rows: vec![VisibleRow::placeholder(anchor, ledger)],
                    };
                    outcome.changed = window != self.window;
                    self.window = window;
                    return outcome;
                }
            }
        } else {
            outcome.correction = self.correct_scroll(cache, &bounds);
        }

        let (start_height, end_height) = self.padded_range();
        let visible_rows = self.collect_rows(cache, ledger, start_height, end_height);
        let window = ViewportWindow {
            scroll_top: self.scroll_top,
            start_height,
            end_height,
            visible_rows,
        };
        outcome.changed = window != self.window;
        self.window = window;
        outcome
    }

    /// Shift scrollTop by the offset change of the first on-screen row that
    /// was visible in the previous frame.
    fn correct_scroll(&mut self, cache: &RowCache, bounds: &ScrollBounds) -> Option<i64> {
        let previous_top = self.window.scroll_top;
        let reference = self
            .window
            .visible_rows
            .iter()
            .filter(|r| r.loaded)
            .find(|r| r.top + r.height > previous_top)?;
        let current = cache.get(reference.row_index)?;
        let delta = current.offset - reference.offset;
        if delta == 0 {
            return None;
        }

        let before = self.scroll_top;
        self.scroll_top = bounds.clamp(self.scroll_top + delta);
        Some(self.scroll_top - before)
    }

    fn collect_rows(
        &self,
        cache: &RowCache,
        ledger: &OffsetLedger,
        start: i64,
        end: i64,
    ) -> Vec<VisibleRow> {
        let row_count = ledger.row_count();
        let seed = self.reuse_seed(cache, start, end).or_else(|| ledger.row_at(start));
        let Some(mut first) = seed else {
            return Vec::new();
        };

        while let Some(prev) = first.prev() {
            if extent(prev, cache, ledger).1 > start {
                first = prev;
            } else {
                break;
            }
        }

        let mut rows = Vec::new();
        let mut current = first;
        while current.get() < row_count {
            let (top, bottom) = extent(current, cache, ledger);
            if top >= end {
                break;
            }
            if bottom > start {
                if let Some(row) = cache.get(current) {
                    rows.push(VisibleRow::from_row(row));
                }
            }
            current = current.next();
        }

        let before = rows
            .first()
            .and_then(|r| r.row_index.prev())
            .and_then(|idx| cache.get(idx));
        if let Some(row) = before {
            rows.insert(0, VisibleRow::from_row(row));
        }
        let after = rows.last().and_then(|r| cache.get(r.row_index.next()));
        if let Some(row) = after {
            rows.push(VisibleRow::from_row(row));
        }

        rows
    }

    /// Lowest previously visible row that still intersects the range.
    fn reuse_seed(&self, cache: &RowCache, start: i64, end: i64) -> Option<RowIndex> {
        self.window
            .visible_rows
            .iter()
            .filter_map(|r| cache.get(r.row_index))
            .find(|row| row.intersects(start, end))
            .map(|row| row.row_index)
    }
}

/// `[top, bottom)` of a row, from the cache when present and the ledger otherwise.
fn extent(row: RowIndex, cache: &RowCache, ledger: &OffsetLedger) -> (i64, i64) {
    match cache.get(row) {
        Some(cached) => (cached.top(), cached.bottom()),
        None => {
            let top = ledger.top_of(row);
            (top, top + ledger.height_of(row))
        }
    }
}

#[cfg(test)]
#[path = "viewport_tests.rs"]
mod tests;
