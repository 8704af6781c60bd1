//! Fetch scheduler - which rows and batches to request
//!
//! Two independent cadences share one viewport signal:
//!
//! - **Rows**: every row overlapping the padded viewport, plus one row of
//!   look-ahead and look-behind, that is neither cached nor already requested.
//!   Under an anchor, only the anchored row.
//! - **Batches**: bulk metadata for every batch overlapping those rows, plus
//!   one batch either side, not yet fetched nor in flight.
//!
//! A row leaves the requested set only on completion or failure, so at most
//! one request per row is ever outstanding.

use super::debounce::Debouncer;
use super::ring::BatchWindow;
use crate::model::{BatchId, ItemIndex, RowIndex};
use crate::view_state::offset_ledger::OffsetLedger;
use crate::view_state::row_cache::RowCache;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Tunables for [`FetchScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Items per row.
    pub row_capacity: usize,
    /// Items per metadata batch.
    pub batch_size: usize,
    /// Capacity of the in-flight batch window.
    pub inflight_batches: usize,
    /// Row cadence quiet period.
    pub row_debounce: Duration,
    /// Row cadence maximum wait.
    pub row_max_wait: Duration,
    /// Batch cadence quiet period.
    pub batch_debounce: Duration,
    /// Batch cadence maximum wait.
    pub batch_max_wait: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            row_capacity: 40,
            batch_size: 100,
            inflight_batches: 6,
            row_debounce: Duration::from_millis(50),
            row_max_wait: Duration::from_millis(100),
            batch_debounce: Duration::from_millis(75),
            batch_max_wait: Duration::from_millis(1000),
        }
    }
}

/// One outbound request decided by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchCommand {
    /// Fetch a raw row.
    Row {
        /// Row to fetch.
        index: RowIndex,
        /// Whether this is the final row of the collection.
        is_last_row: bool,
    },
    /// Prefetch metadata for a batch.
    Batch(BatchId),
}

/// Read-only view of engine state the scheduler plans against.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext<'a> {
    /// Realized rows.
    pub cache: &'a RowCache,
    /// Row geometry.
    pub ledger: &'a OffsetLedger,
    /// Padded viewport pixel range `[start, end)`.
    pub range: (i64, i64),
    /// Pending locate anchor.
    pub anchor: Option<RowIndex>,
    /// Items in the snapshot.
    pub item_count: usize,
    /// Whether a snapshot token is installed.
    pub has_token: bool,
}

/// Fetch state for one isolation context.
#[derive(Debug, Clone)]
pub struct FetchScheduler {
    config: SchedulerConfig,
    rows_requested: HashSet<RowIndex>,
    in_flight: BatchWindow,
    batches_fetched: HashSet<BatchId>,
    row_cadence: Debouncer,
    batch_cadence: Debouncer,
}

impl FetchScheduler {
    /// Create an idle scheduler.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            rows_requested: HashSet::new(),
            in_flight: BatchWindow::new(config.inflight_batches),
            batches_fetched: HashSet::new(),
            row_cadence: Debouncer::new(config.row_debounce, config.row_max_wait),
            batch_cadence: Debouncer::new(config.batch_debounce, config.batch_max_wait),
        }
    }

    /// Scheduler configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Forget all requests and pending signals.
    pub fn reset(&mut self) {
        self.rows_requested.clear();
        self.in_flight.clear();
        self.batches_fetched.clear();
        self.row_cadence.cancel();
        self.batch_cadence.cancel();
    }

    /// Signal that the viewport moved or resized.
    pub fn viewport_changed(&mut self, now: Instant) {
        self.row_cadence.signal(now);
        self.batch_cadence.signal(now);
    }

    /// True while either cadence has a pending signal.
    pub fn is_pending(&self) -> bool {
        self.row_cadence.is_pending() || self.batch_cadence.is_pending()
    }

    /// Earliest instant at which [`poll`](Self::poll) may produce work.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.row_cadence.deadline(), self.batch_cadence.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run whichever cadences are due.
    pub fn poll(&mut self, now: Instant, ctx: &FetchContext<'_>) -> Vec<FetchCommand> {
        let mut commands = Vec::new();
        if self.row_cadence.poll(now) {
            commands.extend(self.plan_rows(ctx));
        }
        if self.batch_cadence.poll(now) {
            commands.extend(self.plan_batches(ctx));
        }
        commands
    }

    /// Rows to request now, marking them requested.
    pub fn plan_rows(&mut self, ctx: &FetchContext<'_>) -> Vec<FetchCommand> {
        let Some(rows) = self.target_rows(ctx) else {
            return Vec::new();
        };
        if !ctx.has_token {
            warn!(rows = ?rows, "No snapshot token; dropping row requests");
            return Vec::new();
        }

        let last = ctx.ledger.row_count().saturating_sub(1);
        let mut commands = Vec::new();
        for index in rows.start().get()..=rows.end().get() {
            let row = RowIndex::new(index);
            if ctx.cache.contains(row) || !self.rows_requested.insert(row) {
                continue;
            }
            commands.push(FetchCommand::Row {
                index: row,
                is_last_row: index == last,
            });
        }
        commands
    }

    /// Batches to request now, recording them in the in-flight window.
    pub fn plan_batches(&mut self, ctx: &FetchContext<'_>) -> Vec<FetchCommand> {
        let Some(rows) = self.target_rows(ctx) else {
            return Vec::new();
        };
        if ctx.item_count == 0 || self.config.batch_size == 0 {
            return Vec::new();
        }
        if !ctx.has_token {
            warn!(rows = ?rows, "No snapshot token; dropping batch requests");
            return Vec::new();
        }

        let batches = self.batch_span(&rows, ctx.item_count);
        let mut commands = Vec::new();
        for id in batches {
            let batch = BatchId::new(id);
            if self.batches_fetched.contains(&batch) || self.in_flight.contains(batch) {
                continue;
            }
            if let Some(evicted) = self.in_flight.push(batch) {
                debug!(batch = evicted.get(), "Batch evicted from in-flight window");
            }
            commands.push(FetchCommand::Batch(batch));
        }
        commands
    }

    /// A row reply arrived.
    pub fn row_completed(&mut self, row: RowIndex) {
        self.rows_requested.remove(&row);
    }

    /// A row request failed; a later viewport signal may retry it.
    pub fn row_failed(&mut self, row: RowIndex) {
        self.rows_requested.remove(&row);
    }

    /// A batch reply was committed.
    pub fn batch_completed(&mut self, batch: BatchId) {
        self.in_flight.remove(batch);
        self.batches_fetched.insert(batch);
    }

    /// A batch was cancelled or failed; it may be requested again.
    pub fn batch_cancelled(&mut self, batch: BatchId) {
        self.in_flight.remove(batch);
    }

    /// Forget fetched metadata for batches so they are requested again.
    pub fn invalidate_batches(&mut self, batches: impl IntoIterator<Item = BatchId>) {
        for batch in batches {
            self.batches_fetched.remove(&batch);
        }
    }

    /// True while a request for `row` is outstanding.
    pub fn is_row_requested(&self, row: RowIndex) -> bool {
        self.rows_requested.contains(&row)
    }

    /// True once a batch's metadata has been committed.
    pub fn is_batch_fetched(&self, batch: BatchId) -> bool {
        self.batches_fetched.contains(&batch)
    }

    /// True while a batch is in the in-flight window.
    pub fn is_batch_in_flight(&self, batch: BatchId) -> bool {
        self.in_flight.contains(batch)
    }

    /// Number of outstanding row requests.
    pub fn rows_in_flight(&self) -> usize {
        self.rows_requested.len()
    }

    /// Number of batches in the in-flight window.
    pub fn batches_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Rows covering the padded viewport plus one either side, or just the anchor.
    fn target_rows(&self, ctx: &FetchContext<'_>) -> Option<RangeInclusive<RowIndex>> {
        let row_count = ctx.ledger.row_count();
        if row_count == 0 {
            return None;
        }
        if let Some(anchor) = ctx.anchor {
            let anchor = RowIndex::new(anchor.get().min(row_count - 1));
            return Some(anchor..=anchor);
        }

        let (start, end) = ctx.range;
        let first = ctx.ledger.row_at(start)?;
        let last = ctx.ledger.row_at((end - 1).max(start))?;
        let first = first.prev().unwrap_or(first);
        let last = RowIndex::new((last.get() + 1).min(row_count - 1));
        Some(first..=last)
    }

    /// Batch ids overlapping the rows' items, plus one either side.
    fn batch_span(&self, rows: &RangeInclusive<RowIndex>, item_count: usize) -> RangeInclusive<usize> {
        let capacity = self.config.row_capacity.max(1);
        let size = self.config.batch_size;
        let first_item = (rows.start().get() * capacity).min(item_count - 1);
        let last_item = ((rows.end().get() + 1) * capacity)
            .min(item_count)
            .saturating_sub(1)
            .max(first_item);

        let last_batch = (item_count - 1) / size;
        let first = BatchId::containing(ItemIndex::new(first_item), size).get();
        let last = BatchId::containing(ItemIndex::new(last_item), size).get();
        first.saturating_sub(1)..=(last + 1).min(last_batch)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
