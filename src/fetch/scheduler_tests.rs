//! Tests for FetchScheduler planning and cadence

use super::*;
use crate::model::{Row, SnapshotId};
use crate::view_state::layout_params::LayoutKey;
use crate::view_state::types::ContainerWidth;

// ===== Test Helpers =====

fn key() -> LayoutKey {
    LayoutKey::new(
        SnapshotId::new("t1").expect("valid snapshot"),
        ContainerWidth::new(1000).expect("valid width"),
    )
}

fn state(rows: usize) -> (RowCache, OffsetLedger) {
    let mut ledger = OffsetLedger::new(2400);
    ledger.reset(key(), rows);
    let mut cache = RowCache::new();
    cache.reset(key());
    (cache, ledger)
}

fn cached_row(index: usize) -> Row {
    Row {
        start: ItemIndex::new(index * 40),
        end: ItemIndex::new(index * 40 + 40),
        row_index: RowIndex::new(index),
        row_height: 2400,
        offset: 0,
        top_pixel_accumulated: index as i64 * 2400,
        display_elements: Vec::new(),
        container_width: 1000,
        snapshot: SnapshotId::new("t1").expect("valid snapshot"),
    }
}

fn ctx<'a>(cache: &'a RowCache, ledger: &'a OffsetLedger, range: (i64, i64)) -> FetchContext<'a> {
    FetchContext {
        cache,
        ledger,
        range,
        anchor: None,
        item_count: ledger.row_count() * 40,
        has_token: true,
    }
}

fn row_indices(commands: &[FetchCommand]) -> Vec<usize> {
    commands
        .iter()
        .filter_map(|c| match c {
            FetchCommand::Row { index, .. } => Some(index.get()),
            FetchCommand::Batch(_) => None,
        })
        .collect()
}

fn batch_ids(commands: &[FetchCommand]) -> Vec<usize> {
    commands
        .iter()
        .filter_map(|c| match c {
            FetchCommand::Batch(b) => Some(b.get()),
            FetchCommand::Row { .. } => None,
        })
        .collect()
}

// ===== Row Planning =====

#[test]
fn rows_cover_range_plus_one_either_side() {
    let (cache, ledger) = state(20);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());

    // [9600, 14400) covers rows 4 and 5
    let commands = scheduler.plan_rows(&ctx(&cache, &ledger, (9600, 14400)));

    assert_eq!(row_indices(&commands), vec![3, 4, 5, 6]);
}

#[test]
fn requested_rows_are_not_requested_again() {
    let (cache, ledger) = state(20);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());
    let c = ctx(&cache, &ledger, (9600, 14400));

    scheduler.plan_rows(&c);
    let second = scheduler.plan_rows(&c);

    assert!(second.is_empty());
    assert_eq!(scheduler.rows_in_flight(), 4);
}

#[test]
fn cached_rows_are_skipped() {
    let (mut cache, ledger) = state(20);
    cache.insert(cached_row(4));
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());

    let commands = scheduler.plan_rows(&ctx(&cache, &ledger, (9600, 14400)));

    assert_eq!(row_indices(&commands), vec![3, 5, 6]);
}

#[test]
fn failed_row_can_be_retried() {
    let (cache, ledger) = state(20);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());
    let c = ctx(&cache, &ledger, (0, 100));

    scheduler.plan_rows(&c);
    scheduler.row_failed(RowIndex::new(0));

    assert_eq!(row_indices(&scheduler.plan_rows(&c)), vec![0]);
}

#[test]
fn last_row_is_flagged() {
    let (cache, ledger) = state(3);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());

    let commands = scheduler.plan_rows(&ctx(&cache, &ledger, (0, 100_000)));

    assert_eq!(
        commands.last(),
        Some(&FetchCommand::Row {
            index: RowIndex::new(2),
            is_last_row: true
        })
    );
    assert!(matches!(
        commands[0],
        FetchCommand::Row {
            is_last_row: false,
            ..
        }
    ));
}

#[test]
fn anchor_restricts_to_anchored_row() {
    let (cache, ledger) = state(20);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());
    let mut c = ctx(&cache, &ledger, (0, 5000));
    c.anchor = Some(RowIndex::new(12));

    let commands = scheduler.plan_rows(&c);

    assert_eq!(row_indices(&commands), vec![12]);
}

#[test]
fn missing_token_drops_requests_without_marking() {
    let (cache, ledger) = state(20);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());
    let mut c = ctx(&cache, &ledger, (0, 100));
    c.has_token = false;

    assert!(scheduler.plan_rows(&c).is_empty());
    assert!(scheduler.plan_batches(&c).is_empty());
    assert_eq!(scheduler.rows_in_flight(), 0);

    c.has_token = true;
    assert_eq!(row_indices(&scheduler.plan_rows(&c)), vec![0, 1]);
}

#[test]
fn empty_snapshot_plans_nothing() {
    let (cache, ledger) = state(0);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());
    let c = ctx(&cache, &ledger, (0, 100));
    assert!(scheduler.plan_rows(&c).is_empty());
    assert!(scheduler.plan_batches(&c).is_empty());
}

// ===== Batch Planning =====

#[test]
fn batches_cover_rows_plus_one_either_side() {
    let (cache, ledger) = state(50);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());

    // rows 9..=12 -> items 360..=519 -> batches 3..=5, padded to 2..=6
    let commands = scheduler.plan_batches(&ctx(&cache, &ledger, (24_000, 28_800)));

    assert_eq!(batch_ids(&commands), vec![2, 3, 4, 5, 6]);
    assert_eq!(scheduler.batches_in_flight(), 5);
}

#[test]
fn fetched_batches_are_skipped() {
    let (cache, ledger) = state(50);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());
    let c = ctx(&cache, &ledger, (0, 100));

    let first = scheduler.plan_batches(&c);
    for batch in batch_ids(&first) {
        scheduler.batch_completed(BatchId::new(batch));
    }

    assert!(scheduler.plan_batches(&c).is_empty());
    assert!(scheduler.is_batch_fetched(BatchId::new(0)));
}

#[test]
fn invalidated_batch_is_fetched_again() {
    let (cache, ledger) = state(50);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());
    let c = ctx(&cache, &ledger, (0, 100));
    for batch in batch_ids(&scheduler.plan_batches(&c)) {
        scheduler.batch_completed(BatchId::new(batch));
    }

    scheduler.invalidate_batches([BatchId::new(0)]);

    assert_eq!(batch_ids(&scheduler.plan_batches(&c)), vec![0]);
}

#[test]
fn window_evicts_oldest_batches() {
    let (cache, ledger) = state(500);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());

    scheduler.plan_batches(&ctx(&cache, &ledger, (0, 100)));
    assert!(scheduler.is_batch_in_flight(BatchId::new(0)));

    // far away: rows 199..=201 -> batches 79..=80, padded 78..=81
    scheduler.plan_batches(&ctx(&cache, &ledger, (480_000, 482_400)));
    scheduler.plan_batches(&ctx(&cache, &ledger, (960_000, 962_400)));

    assert!(!scheduler.is_batch_in_flight(BatchId::new(0)));
    assert_eq!(scheduler.batches_in_flight(), 6);
}

#[test]
fn cancelled_batch_can_be_requested_again() {
    let (cache, ledger) = state(50);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());
    let c = ctx(&cache, &ledger, (0, 100));
    scheduler.plan_batches(&c);

    scheduler.batch_cancelled(BatchId::new(0));

    assert_eq!(batch_ids(&scheduler.plan_batches(&c)), vec![0]);
}

#[test]
fn final_batch_is_not_exceeded() {
    let (cache, ledger) = state(5);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());
    let mut c = ctx(&cache, &ledger, (0, 100_000));
    c.item_count = 190;

    let commands = scheduler.plan_batches(&c);

    assert_eq!(batch_ids(&commands), vec![0, 1]);
}

// ===== Cadence =====

#[test]
fn poll_waits_for_debounce() {
    let (cache, ledger) = state(20);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());
    let c = ctx(&cache, &ledger, (0, 100));
    let t0 = Instant::now();

    scheduler.viewport_changed(t0);

    assert!(scheduler.poll(t0 + Duration::from_millis(10), &c).is_empty());
    let rows = scheduler.poll(t0 + Duration::from_millis(50), &c);
    assert_eq!(row_indices(&rows), vec![0, 1]);
    assert!(batch_ids(&rows).is_empty());

    let batches = scheduler.poll(t0 + Duration::from_millis(75), &c);
    assert_eq!(batch_ids(&batches), vec![0, 1]);
    assert!(!scheduler.is_pending());
}

#[test]
fn next_deadline_is_earliest_cadence() {
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());
    let t0 = Instant::now();
    assert_eq!(scheduler.next_deadline(), None);

    scheduler.viewport_changed(t0);

    assert_eq!(scheduler.next_deadline(), Some(t0 + Duration::from_millis(50)));
}

#[test]
fn reset_forgets_everything() {
    let (cache, ledger) = state(20);
    let mut scheduler = FetchScheduler::new(SchedulerConfig::default());
    let c = ctx(&cache, &ledger, (0, 100));
    scheduler.plan_rows(&c);
    scheduler.plan_batches(&c);
    scheduler.viewport_changed(Instant::now());

    scheduler.reset();

    assert_eq!(scheduler.rows_in_flight(), 0);
    assert_eq!(scheduler.batches_in_flight(), 0);
    assert!(!scheduler.is_pending());
}
