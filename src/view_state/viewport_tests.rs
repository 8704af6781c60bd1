//! Tests for the viewport reconciler
//!
//! Rows are realized through a small fixture that keeps the ledger and the
//! row cache in step the same way the engine does.

use super::*;
use crate::model::{ItemIndex, SnapshotId};
use crate::view_state::layout_params::LayoutKey;
use crate::view_state::offset_ledger::Measurement;
use crate::view_state::types::ContainerWidth;
use proptest::prelude::*;

const NOMINAL: i64 = 2400;

// ===== Test Helpers =====

struct Fixture {
    key: LayoutKey,
    ledger: OffsetLedger,
    cache: RowCache,
}

impl Fixture {
    fn new(rows: usize) -> Self {
        let key = LayoutKey::new(
            SnapshotId::new("t1").expect("valid snapshot"),
            ContainerWidth::new(1000).expect("valid width"),
        );
        let mut ledger = OffsetLedger::new(NOMINAL);
        ledger.reset(key.clone(), rows);
        let mut cache = RowCache::new();
        cache.reset(key.clone());
        Self { key, ledger, cache }
    }

    /// Measure a row and store it in the cache.
    fn realize(&mut self, index: usize, height: i64) {
        let row_index = RowIndex::new(index);
        if let Measurement::Applied { delta } = self.ledger.measure(&self.key, row_index, height) {
            self.cache.shift_after(row_index, delta);
        }
        let row = Row {
            start: ItemIndex::new(index * 40),
            end: ItemIndex::new(index * 40 + 40),
            row_index,
            row_height: height,
            offset: self.ledger.offset_of(row_index),
            top_pixel_accumulated: index as i64 * NOMINAL,
            display_elements: Vec::new(),
            container_width: 1000,
            snapshot: self.key.snapshot.clone(),
        };
        self.cache.insert(row);
    }

    fn realize_all(&mut self, height: i64) {
        for i in 0..self.ledger.row_count() {
            self.realize(i, height);
        }
    }
}

fn reconciler(viewport_height: i64) -> ViewportReconciler {
    let mut reconciler = ViewportReconciler::new(ViewportConfig::default());
    reconciler.set_viewport_height(viewport_height);
    reconciler
}

fn indices(window: &ViewportWindow) -> Vec<usize> {
    window.row_indices().iter().map(|r| r.get()).collect()
}

// ===== Window Collection =====

#[test]
fn empty_ledger_yields_empty_window() {
    let fixture = Fixture::new(0);
    let mut r = reconciler(800);
    r.reconcile(&fixture.cache, &fixture.ledger);
    assert!(r.window().is_empty());
}

#[test]
fn top_of_collection_shows_first_row_and_margin() {
    let mut fixture = Fixture::new(10);
    fixture.realize_all(NOMINAL);
    let mut r = reconciler(800);

    r.reconcile(&fixture.cache, &fixture.ledger);

    // padded range [0, 1800) intersects only row 0; row 1 is the margin
    assert_eq!(r.padded_range(), (0, 1800));
    assert_eq!(indices(r.window()), vec![0, 1]);
}

#[test]
fn middle_of_collection_adds_margin_on_both_sides() {
    let mut fixture = Fixture::new(10);
    fixture.realize_all(NOMINAL);
    let mut r = reconciler(800);
    r.user_scroll(12_000, &fixture.ledger, Instant::now());

    r.reconcile(&fixture.cache, &fixture.ledger);

    // [11000, 13800) intersects rows 4 and 5
    assert_eq!(indices(r.window()), vec![3, 4, 5, 6]);
}

#[test]
fn uncached_rows_are_not_rendered() {
    let mut fixture = Fixture::new(10);
    fixture.realize(0, NOMINAL);
    fixture.realize(2, NOMINAL);
    let mut r = reconciler(4000);

    r.reconcile(&fixture.cache, &fixture.ledger);

    assert_eq!(indices(r.window()), vec![0, 2]);
    assert!(r.window().visible_rows.iter().all(|row| row.loaded));
}

#[test]
fn rows_are_sorted_by_top() {
    let mut fixture = Fixture::new(10);
    fixture.realize_all(1800);
    let mut r = reconciler(3000);
    r.user_scroll(5000, &fixture.ledger, Instant::now());

    r.reconcile(&fixture.cache, &fixture.ledger);

    let tops: Vec<i64> = r.window().visible_rows.iter().map(|v| v.top).collect();
    let mut sorted = tops.clone();
    sorted.sort();
    assert_eq!(tops, sorted);
}

// ===== Scroll Correction =====

#[test]
fn measurement_above_viewport_shifts_scroll_top() {
    let mut fixture = Fixture::new(10);
    for i in [3, 4, 5, 6] {
        fixture.realize(i, NOMINAL);
    }
    let mut r = reconciler(800);
    r.user_scroll(12_000, &fixture.ledger, Instant::now());
    r.reconcile(&fixture.cache, &fixture.ledger);

    fixture.realize(2, 2650);
    let outcome = r.reconcile(&fixture.cache, &fixture.ledger);

    assert_eq!(outcome.correction, Some(250));
    assert_eq!(r.scroll_top(), 12_250);
    assert!(outcome.changed);
}

#[test]
fn measurement_below_reference_does_not_correct() {
    let mut fixture = Fixture::new(10);
    for i in 3..8 {
        fixture.realize(i, NOMINAL);
    }
    let mut r = reconciler(800);
    r.user_scroll(12_000, &fixture.ledger, Instant::now());
    r.reconcile(&fixture.cache, &fixture.ledger);

    fixture.realize(8, 3000);
    let outcome = r.reconcile(&fixture.cache, &fixture.ledger);

    assert_eq!(outcome.correction, None);
    assert_eq!(r.scroll_top(), 12_000);
    assert!(!outcome.changed);
}

#[test]
fn reference_row_keeps_its_relative_position() {
    let mut fixture = Fixture::new(10);
    for i in 3..8 {
        fixture.realize(i, NOMINAL);
    }
    let mut r = reconciler(800);
    r.user_scroll(12_500, &fixture.ledger, Instant::now());
    r.reconcile(&fixture.cache, &fixture.ledger);
    let before = fixture.cache.get(RowIndex::new(5)).map(|row| row.top()).unwrap_or(0) - r.scroll_top();

    fixture.realize(1, 1900);
    r.reconcile(&fixture.cache, &fixture.ledger);
    let after = fixture.cache.get(RowIndex::new(5)).map(|row| row.top()).unwrap_or(0) - r.scroll_top();

    assert_eq!(before, after);
}

#[test]
fn correction_is_clamped_at_top() {
    let mut fixture = Fixture::new(10);
    for i in 1..4 {
        fixture.realize(i, NOMINAL);
    }
    let mut r = reconciler(800);
    r.user_scroll(2_500, &fixture.ledger, Instant::now());
    r.reconcile(&fixture.cache, &fixture.ledger);

    fixture.realize(0, 100);
    let outcome = r.reconcile(&fixture.cache, &fixture.ledger);

    assert_eq!(outcome.correction, Some(-2300));
    assert_eq!(r.scroll_top(), 200);
}

// ===== Anchoring =====

#[test]
fn pending_anchor_shows_placeholder() {
    let fixture = Fixture::new(10);
    let mut r = reconciler(800);
    r.set_anchor(RowIndex::new(7));

    r.reconcile(&fixture.cache, &fixture.ledger);

    let window = r.window();
    assert_eq!(window.len(), 1);
    assert_eq!(window.visible_rows[0].row_index, RowIndex::new(7));
    assert!(!window.visible_rows[0].loaded);
    assert_eq!(r.scroll_top(), 7 * NOMINAL);
    assert_eq!(r.anchor(), Some(RowIndex::new(7)));
}

#[test]
fn anchor_resolves_when_row_arrives() {
    let mut fixture = Fixture::new(10);
    let mut r = reconciler(800);
    r.set_anchor(RowIndex::new(7));
    r.reconcile(&fixture.cache, &fixture.ledger);

    fixture.realize(7, 2000);
    let outcome = r.reconcile(&fixture.cache, &fixture.ledger);

    assert!(outcome.anchor_resolved);
    assert_eq!(r.anchor(), None);
    assert_eq!(r.scroll_top(), 7 * NOMINAL);
    assert!(r.window().contains(RowIndex::new(7)));
}

#[test]
fn anchor_near_end_is_clamped() {
    let fixture = Fixture::new(10);
    let mut r = reconciler(3000);
    r.set_anchor(RowIndex::new(9));

    r.reconcile(&fixture.cache, &fixture.ledger);

    assert_eq!(r.scroll_top(), 10 * NOMINAL - 3000);
}

#[test]
fn clear_drops_anchor_and_position() {
    let mut fixture = Fixture::new(10);
    fixture.realize_all(NOMINAL);
    let mut r = reconciler(800);
    r.user_scroll(5000, &fixture.ledger, Instant::now());
    r.set_anchor(RowIndex::new(3));

    r.clear();

    assert_eq!(r.scroll_top(), 0);
    assert_eq!(r.anchor(), None);
    assert!(r.window().is_empty());
}

// ===== User Scroll =====

#[test]
fn user_scroll_is_clamped_to_content() {
    let fixture = Fixture::new(10);
    let mut r = reconciler(800);

    let input = r.user_scroll(1_000_000, &fixture.ledger, Instant::now());

    assert_eq!(input, ScrollInput::Clamped(10 * NOMINAL - 800));
    assert_eq!(r.scroll_top(), 10 * NOMINAL - 800);
}

// ===== Properties =====

proptest! {
    /// Window matches a brute-force scan and moves by at most one row per pixel
    #[test]
    fn prop_window_is_contiguous_and_monotonic(
        heights in prop::collection::vec(300i64..5000, 1..30),
        viewport in 100i64..2000,
        fraction in 0.0f64..1.0,
    ) {
        let mut fixture = Fixture::new(heights.len());
        for (i, &h) in heights.iter().enumerate() {
            fixture.realize(i, h);
        }
        let total = fixture.ledger.total_height();
        let scroll = (total as f64 * fraction) as i64;
        let mut r = reconciler(viewport);

        r.user_scroll(scroll, &fixture.ledger, Instant::now());
        r.reconcile(&fixture.cache, &fixture.ledger);
        let first = indices(r.window());

        let (start, end) = r.padded_range();
        let hits: Vec<usize> = fixture
            .cache
            .iter()
            .filter(|row| row.intersects(start, end))
            .map(|row| row.row_index.get())
            .collect();
        prop_assert!(!hits.is_empty());
        let lo = hits[0].saturating_sub(1);
        let hi = (hits[hits.len() - 1] + 1).min(heights.len() - 1);
        prop_assert_eq!(&first, &(lo..=hi).collect::<Vec<_>>());

        r.user_scroll(r.scroll_top() + 1, &fixture.ledger, Instant::now());
        r.reconcile(&fixture.cache, &fixture.ledger);
        let second = indices(r.window());

        prop_assert!(second[0] >= first[0] && second[0] <= first[0] + 1);
        let (a, b) = (first[first.len() - 1], second[second.len() - 1]);
        prop_assert!(b >= a && b <= a + 1);
    }
}
