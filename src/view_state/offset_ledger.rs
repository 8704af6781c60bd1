//! OffsetLedger - realized-vs-nominal row height bookkeeping
//!
//! Rows are provisioned a nominal height before measurement. The first
//! measurement of a row under the current [`LayoutKey`] records
//! `delta = realized - nominal`; every later row shifts by that delta.
//!
//! Deltas live in a Fenwick tree, so the offset of any row (the sum of deltas
//! of all rows before it) is a prefix sum.
//!
//! # Invariants
//!
//! - `Σ deltas == total_height() - total_height_original()` after every step
//! - A row is measured at most once per key; later measurements are ignored,
//!   which makes the total independent of measurement arrival order
//!
//! # Complexity
//!
//! - `measure`: O(log n)
//! - `offset_of`: O(log n)
//! - `row_at`: O(log² n)
//! - `reset`: O(n)

use super::layout_params::LayoutKey;
use crate::model::RowIndex;
use std::collections::HashMap;

/// Outcome of [`OffsetLedger::measure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    /// First measurement; later rows shift by `delta`.
    Applied {
        /// Realized minus nominal height.
        delta: i64,
    },
    /// Row already has a delta under the current key; nothing changed.
    AlreadyMeasured,
    /// The measurement was produced under another key and was dropped.
    StaleKey,
}

/// Ledger of row height deltas for one layout key.
#[derive(Debug, Clone)]
pub struct OffsetLedger {
    /// Fenwick tree over deltas (0-indexed API over the crate's 1-indexed storage)
    tree: Vec<isize>,
    /// Recorded deltas by row, for idempotence checks.
    deltas: HashMap<RowIndex, i64>,
    row_count: usize,
    nominal_row_height: i64,
    delta_sum: i64,
    key: Option<LayoutKey>,
}

impl OffsetLedger {
    /// Creates an empty ledger with no rows.
    ///
    /// # Examples
    ///
    /// ```
    /// # use photoscroll::view_state::offset_ledger::OffsetLedger;
    /// let ledger = OffsetLedger::new(2400);
    /// assert_eq!(ledger.row_count(), 0);
    /// assert_eq!(ledger.total_height(), 0);
    /// ```
    pub fn new(nominal_row_height: i64) -> Self {
        Self {
            tree: Vec::new(),
            deltas: HashMap::new(),
            row_count: 0,
            nominal_row_height,
            delta_sum: 0,
            key: None,
        }
    }

    /// Atomically discards every measurement and provisions `row_count` rows
    /// under a new key.
    pub fn reset(&mut self, key: LayoutKey, row_count: usize) {
        self.tree.clear();
        self.tree.resize(row_count, 0);
        self.deltas.clear();
        self.row_count = row_count;
        self.delta_sum = 0;
        self.key = Some(key);
    }

    /// Drops all state, leaving the ledger without a key.
    pub fn clear(&mut self) {
        self.tree.clear();
        self.deltas.clear();
        self.row_count = 0;
        self.delta_sum = 0;
        self.key = None;
    }

    /// Key the current measurements belong to.
    pub fn key(&self) -> Option<&LayoutKey> {
        self.key.as_ref()
    }

    /// Records the realized height of `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is outside the provisioned range.
    ///
    /// # Examples
    ///
    /// ```
    /// # use photoscroll::view_state::offset_ledger::{Measurement, OffsetLedger};
    /// # use photoscroll::view_state::layout_params::LayoutKey;
    /// # use photoscroll::view_state::types::ContainerWidth;
    /// # use photoscroll::model::{RowIndex, SnapshotId};
    /// let key = LayoutKey::new(SnapshotId::new("t").unwrap(), ContainerWidth::new(1000).unwrap());
    /// let mut ledger = OffsetLedger::new(2400);
    /// ledger.reset(key.clone(), 10);
    /// assert_eq!(ledger.measure(&key, RowIndex::new(3), 2650), Measurement::Applied { delta: 250 });
    /// assert_eq!(ledger.offset_of(RowIndex::new(4)), 250);
    /// assert_eq!(ledger.offset_of(RowIndex::new(3)), 0);
    /// ```
    pub fn measure(&mut self, key: &LayoutKey, row: RowIndex, realized_height: i64) -> Measurement {
        if self.key.as_ref() != Some(key) {
            return Measurement::StaleKey;
        }
        assert!(
            row.get() < self.row_count,
            "{} out of bounds (rows: {})",
            row,
            self.row_count
        );
        if self.deltas.contains_key(&row) {
            return Measurement::AlreadyMeasured;
        }

        let delta = realized_height - self.nominal_row_height;
        self.deltas.insert(row, delta);
        self.delta_sum += delta;
        if delta != 0 {
            fenwick::array::update(&mut self.tree, row.get(), delta as isize);
        }
        Measurement::Applied { delta }
    }

    /// Recorded delta for `row`, if measured.
    pub fn delta(&self, row: RowIndex) -> Option<i64> {
        self.deltas.get(&row).copied()
    }

    /// True when `row` has been measured under the current key.
    pub fn is_measured(&self, row: RowIndex) -> bool {
        self.deltas.contains_key(&row)
    }

    /// Sum of the deltas of every row before `row`.
    pub fn offset_of(&self, row: RowIndex) -> i64 {
        match row.get().min(self.row_count) {
            0 => 0,
            end => fenwick::array::prefix_sum(&self.tree, end - 1) as i64,
        }
    }

    /// Corrected top of `row`.
    pub fn top_of(&self, row: RowIndex) -> i64 {
        row.get() as i64 * self.nominal_row_height + self.offset_of(row)
    }

    /// Current height of `row`: realized when measured, nominal otherwise.
    pub fn height_of(&self, row: RowIndex) -> i64 {
        self.nominal_row_height + self.delta(row).unwrap_or(0)
    }

    /// Binary search for the row containing pixel `y`.
    ///
    /// Returns the last row when `y` is past the end, and `None` only for an
    /// empty ledger.
    pub fn row_at(&self, y: i64) -> Option<RowIndex> {
        if self.row_count == 0 {
            return None;
        }

        // First row whose bottom is > y
        let mut left = 0;
        let mut right = self.row_count;
        while left < right {
            let mid = left + (right - left) / 2;
            let row = RowIndex::new(mid);
            if self.top_of(row) + self.height_of(row) > y {
                right = mid;
            } else {
                left = mid + 1;
            }
        }

        Some(RowIndex::new(left.min(self.row_count - 1)))
    }

    /// Total corrected height.
    pub fn total_height(&self) -> i64 {
        self.total_height_original() + self.delta_sum
    }

    /// Total height before any measurement.
    pub fn total_height_original(&self) -> i64 {
        self.row_count as i64 * self.nominal_row_height
    }

    /// Sum of all recorded deltas.
    pub fn delta_sum(&self) -> i64 {
        self.delta_sum
    }

    /// Number of provisioned rows.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Nominal height of an unmeasured row.
    pub fn nominal_row_height(&self) -> i64 {
        self.nominal_row_height
    }

    /// Number of measured rows.
    pub fn measured_count(&self) -> usize {
        self.deltas.len()
    }
}
