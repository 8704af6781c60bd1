//! Isolation context: one complete engine per independently scrolled view.
//!
//! A [`ScrollEngine`] owns its ledger, row cache, reconciler, scheduler, and
//! worker transport. Nothing is shared between engines, so a main view and a
//! modal sub-view scroll independently.
//!
//! The engine is driven by [`ScrollEngine::tick`]:
//!
//! 1. Drain worker replies, measuring and caching rows as they arrive
//! 2. Reconcile the visible window, correcting scroll position
//! 3. Request and abort thumbnails for items entering and leaving the window
//! 4. Poll the scheduler and send whatever it decides to fetch

pub mod events;

pub use events::{EngineEvent, Notifier, SubscriptionId};

use crate::fetch::{FetchCommand, FetchContext, FetchScheduler, SchedulerConfig};
use crate::model::{
    BatchId, EngineError, IsolationId, Item, ItemIndex, Marker, Row, RowIndex, SnapshotId,
};
use crate::view_state::layout_params::LayoutKey;
use crate::view_state::offset_ledger::{Measurement, OffsetLedger};
use crate::view_state::row_cache::{Insert, RowCache};
use crate::view_state::scroll::ScrollInput;
use crate::view_state::types::ContainerWidth;
use crate::view_state::viewport::{Reconciliation, ViewportConfig, ViewportReconciler, ViewportWindow};
use crate::worker::{DataMethod, WorkerReply, WorkerRequest, WorkerTransport};
use crate::auth::TokenClass;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// One consistent view of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Snapshot identifier sent with every request.
    pub id: SnapshotId,
    /// Number of items in the snapshot.
    pub item_count: usize,
    /// Snapshot token from login, if one is known.
    pub token: Option<String>,
}

/// Tunables for one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Height provisioned for a row before it is measured.
    pub nominal_row_height: i64,
    /// Viewport padding, end slack, and touch lock.
    pub viewport: ViewportConfig,
    /// Row and batch cadence.
    pub scheduler: SchedulerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nominal_row_height: 2400,
            viewport: ViewportConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Virtual-scrolling engine for one isolation context.
pub struct ScrollEngine<T> {
    isolation: IsolationId,
    config: EngineConfig,
    transport: T,
    ledger: OffsetLedger,
    cache: RowCache,
    reconciler: ViewportReconciler,
    scheduler: FetchScheduler,
    snapshot: Option<Snapshot>,
    width: Option<ContainerWidth>,
    token: Option<String>,
    metadata: BTreeMap<ItemIndex, Item>,
    markers: Vec<Marker>,
    thumbnails_requested: HashSet<ItemIndex>,
    thumbnails: HashMap<ItemIndex, String>,
    thumbnails_failed: HashSet<ItemIndex>,
    notifier: Notifier,
}

impl<T: WorkerTransport> ScrollEngine<T> {
    /// Create an engine with no snapshot.
    pub fn new(isolation: IsolationId, config: EngineConfig, transport: T) -> Self {
        Self {
            isolation,
            config,
            transport,
            ledger: OffsetLedger::new(config.nominal_row_height),
            cache: RowCache::new(),
            reconciler: ViewportReconciler::new(config.viewport),
            scheduler: FetchScheduler::new(config.scheduler),
            snapshot: None,
            width: None,
            token: None,
            metadata: BTreeMap::new(),
            markers: Vec::new(),
            thumbnails_requested: HashSet::new(),
            thumbnails: HashMap::new(),
            thumbnails_failed: HashSet::new(),
            notifier: Notifier::new(),
        }
    }

    /// Switch to a new snapshot, discarding all layout and metadata.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::WorkerClosed` if the worker has stopped.
    pub fn establish(&mut self, snapshot: Snapshot, now: Instant) -> Result<(), EngineError> {
        info!(
            isolation = %self.isolation,
            snapshot = %snapshot.id,
            items = snapshot.item_count,
            "Establishing snapshot"
        );
        self.transport.send(WorkerRequest::Reset)?;
        if let Some(token) = &snapshot.token {
            self.transport.send(WorkerRequest::InstallToken {
                class: TokenClass::Snapshot,
                token: token.clone(),
            })?;
            self.token = Some(token.clone());
        }
        self.transport.send(WorkerRequest::FetchScrollbar {
            timestamp: snapshot.id.clone(),
        })?;

        self.snapshot = Some(snapshot);
        self.metadata.clear();
        self.markers.clear();
        self.thumbnails.clear();
        self.thumbnails_failed.clear();
        self.reset_layout(now);
        Ok(())
    }

    /// Set the container width. A change re-lays out every row.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::WorkerClosed` if the worker has stopped.
    pub fn set_container_width(&mut self, width: ContainerWidth, now: Instant) -> Result<(), EngineError> {
        if self.width == Some(width) {
            return Ok(());
        }
        debug!(isolation = %self.isolation, width = width.get(), "Container width changed");
        self.width = Some(width);
        if self.snapshot.is_some() {
            self.transport.send(WorkerRequest::Reset)?;
        }
        self.reset_layout(now);
        Ok(())
    }

    /// Set the viewport height.
    pub fn set_viewport_height(&mut self, height: i64, now: Instant) {
        self.reconciler.set_viewport_height(height);
        self.scheduler.viewport_changed(now);
    }

    /// Scroll to `scroll_top`, clamped to the content.
    pub fn scroll_to(&mut self, scroll_top: i64, now: Instant) -> ScrollInput {
        let input = self.reconciler.user_scroll(scroll_top, &self.ledger, now);
        if !matches!(input, ScrollInput::Locked(_)) {
            self.scheduler.viewport_changed(now);
        }
        input
    }

    /// Jump to the row containing `item`.
    ///
    /// The window is pinned to that row until it arrives.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` if there is no snapshot or the item
    /// is out of range.
    pub fn locate(&mut self, item: ItemIndex, now: Instant) -> Result<RowIndex, EngineError> {
        let item_count = self.item_count();
        if item.get() >= item_count {
            return Err(EngineError::InvalidInput(format!(
                "{} is outside a collection of {} items",
                item, item_count
            )));
        }
        let row = RowIndex::containing(item, self.config.scheduler.row_capacity);
        debug!(isolation = %self.isolation, item = item.get(), row = row.get(), "Locating item");
        self.reconciler.set_anchor(row);
        self.scheduler.viewport_changed(now);
        Ok(row)
    }

    /// Process replies, reconcile the window, and send due requests.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::WorkerClosed` if the worker has stopped.
    pub fn tick(&mut self, now: Instant) -> Result<Reconciliation, EngineError> {
        let mut relaid = false;
        while let Some(reply) = self.transport.try_recv()? {
            relaid |= self.apply_reply(reply);
        }

        let outcome = self.reconciler.reconcile(&self.cache, &self.ledger);
        if let Some(delta) = outcome.correction {
            debug!(isolation = %self.isolation, delta, "Scroll corrected");
            self.publish(EngineEvent::ScrollCorrected {
                isolation: self.isolation.clone(),
                delta,
            });
        }
        // Measured rows move every later row, so the rows under the viewport may differ
        if relaid || outcome.correction.is_some() || outcome.anchor_resolved {
            self.scheduler.viewport_changed(now);
        }
        if outcome.changed {
            let window = self.reconciler.window();
            let event = EngineEvent::WindowChanged {
                isolation: self.isolation.clone(),
                scroll_top: window.scroll_top,
                rows: window.len(),
            };
            self.publish(event);
        }

        self.sync_thumbnails()?;
        self.dispatch(now)?;
        Ok(outcome)
    }

    /// Discard all state and drop queued worker work.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::WorkerClosed` if the worker has stopped.
    pub fn teardown(&mut self) -> Result<(), EngineError> {
        info!(isolation = %self.isolation, "Tearing down isolation context");
        self.transport.send(WorkerRequest::Reset)?;
        self.snapshot = None;
        self.ledger.clear();
        self.cache.clear();
        self.reconciler.clear();
        self.scheduler.reset();
        self.metadata.clear();
        self.markers.clear();
        self.thumbnails_requested.clear();
        self.thumbnails.clear();
        self.thumbnails_failed.clear();
        self.publish(EngineEvent::Reset {
            isolation: self.isolation.clone(),
            snapshot: None,
        });
        Ok(())
    }

    /// Forget every credential, here and in the worker.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::WorkerClosed` if the worker has stopped.
    pub fn logout(&mut self) -> Result<(), EngineError> {
        self.token = None;
        self.transport.send(WorkerRequest::Logout)
    }

    /// Install a snapshot token after logging in.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::WorkerClosed` if the worker has stopped.
    pub fn install_token(&mut self, token: String) -> Result<(), EngineError> {
        self.token = Some(token.clone());
        self.transport.send(WorkerRequest::InstallToken {
            class: TokenClass::Snapshot,
            token,
        })
    }

    /// Fetch one item's metadata outside the batch cadence.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` without a snapshot, or
    /// `EngineError::WorkerClosed` if the worker has stopped.
    pub fn fetch_single(&mut self, item: ItemIndex) -> Result<(), EngineError> {
        let timestamp = self.current_snapshot()?.id.clone();
        self.transport.send(WorkerRequest::FetchData {
            method: DataMethod::Single(item),
            timestamp,
            token: self.token.clone().unwrap_or_default(),
        })
    }

    /// Add and remove tags. The reply overwrites cached metadata.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::WorkerClosed` if the worker has stopped.
    pub fn edit_tags(&mut self, items: Vec<ItemIndex>, add: Vec<String>, remove: Vec<String>) -> Result<(), EngineError> {
        self.transport.send(WorkerRequest::EditTags { items, add, remove })
    }

    /// Add and remove album membership.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::WorkerClosed` if the worker has stopped.
    pub fn edit_albums(&mut self, items: Vec<ItemIndex>, add: Vec<String>, remove: Vec<String>) -> Result<(), EngineError> {
        self.transport.send(WorkerRequest::EditAlbums { items, add, remove })
    }

    /// Delete items and invalidate the metadata of their batches.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::WorkerClosed` if the worker has stopped.
    pub fn delete(&mut self, items: Vec<ItemIndex>, now: Instant) -> Result<(), EngineError> {
        let batch_size = self.config.scheduler.batch_size;
        let batches: HashSet<BatchId> = items
            .iter()
            .map(|&item| BatchId::containing(item, batch_size))
            .collect();
        for item in &items {
            self.metadata.remove(item);
        }
        self.scheduler.invalidate_batches(batches);
        self.scheduler.viewport_changed(now);
        self.transport.send(WorkerRequest::DeleteData { items })
    }

    /// Pixel position of a scrollbar marker under the current layout.
    pub fn marker_position(&self, marker: &Marker) -> Option<i64> {
        let row = RowIndex::containing(marker.index, self.config.scheduler.row_capacity);
        (row.get() < self.ledger.row_count()).then(|| self.ledger.top_of(row))
    }

    /// True when nothing is pending: no debounced signal, no outstanding
    /// request, and no unresolved anchor.
    pub fn is_settled(&self) -> bool {
        !self.scheduler.is_pending()
            && self.scheduler.rows_in_flight() == 0
            && self.scheduler.batches_in_flight() == 0
            && self.reconciler.anchor().is_none()
    }

    /// Earliest instant at which [`tick`](Self::tick) may send requests.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Isolation context of this engine.
    pub fn isolation(&self) -> &IsolationId {
        &self.isolation
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Current container width.
    pub fn container_width(&self) -> Option<ContainerWidth> {
        self.width
    }

    /// Items in the current snapshot, zero without one.
    pub fn item_count(&self) -> usize {
        self.snapshot.as_ref().map_or(0, |s| s.item_count)
    }

    /// Window from the last tick.
    pub fn window(&self) -> &ViewportWindow {
        self.reconciler.window()
    }

    /// Current scroll offset.
    pub fn scroll_top(&self) -> i64 {
        self.reconciler.scroll_top()
    }

    /// Total content height.
    pub fn total_height(&self) -> i64 {
        self.ledger.total_height()
    }

    /// Row height bookkeeping.
    pub fn ledger(&self) -> &OffsetLedger {
        &self.ledger
    }

    /// Realized rows.
    pub fn cache(&self) -> &RowCache {
        &self.cache
    }

    /// Fetch state.
    pub fn scheduler(&self) -> &FetchScheduler {
        &self.scheduler
    }

    /// Cached metadata for one item.
    pub fn item(&self, index: ItemIndex) -> Option<&Item> {
        self.metadata.get(&index)
    }

    /// Number of items with cached metadata.
    pub fn metadata_len(&self) -> usize {
        self.metadata.len()
    }

    /// Scrollbar markers for the current snapshot.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Decoded thumbnail handle for an item.
    pub fn thumbnail(&self, index: ItemIndex) -> Option<&str> {
        self.thumbnails.get(&index).map(String::as_str)
    }

    /// Event subscriptions.
    pub fn notifier_mut(&mut self) -> &mut Notifier {
        &mut self.notifier
    }

    /// The worker transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The worker transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn current_snapshot(&self) -> Result<&Snapshot, EngineError> {
        self.snapshot
            .as_ref()
            .ok_or_else(|| EngineError::InvalidInput("no snapshot established".to_string()))
    }

    fn layout_key(&self) -> Option<LayoutKey> {
        let snapshot = self.snapshot.as_ref()?;
        Some(LayoutKey::new(snapshot.id.clone(), self.width?))
    }

    fn publish(&mut self, event: EngineEvent) {
        self.notifier.publish(event);
    }

    /// Discard every measurement and provision rows for the current key.
    fn reset_layout(&mut self, now: Instant) {
        self.reconciler.clear();
        self.scheduler.reset();
        self.thumbnails_requested.clear();
        match self.layout_key() {
            Some(key) => {
                let capacity = self.config.scheduler.row_capacity.max(1);
                let rows = self.item_count().div_ceil(capacity);
                info!(
                    isolation = %self.isolation,
                    snapshot = %key.snapshot,
                    width = key.container_width.get(),
                    rows,
                    "Layout reset"
                );
                self.ledger.reset(key.clone(), rows);
                self.cache.reset(key);
                self.scheduler.viewport_changed(now);
            }
            None => {
                self.ledger.clear();
                self.cache.clear();
            }
        }
        let snapshot = self.snapshot.as_ref().map(|s| s.id.clone());
        self.publish(EngineEvent::Reset {
            isolation: self.isolation.clone(),
            snapshot,
        });
    }

    fn is_current(&self, timestamp: &SnapshotId) -> bool {
        self.snapshot.as_ref().is_some_and(|s| s.id == *timestamp)
    }

    /// Apply one reply. Returns true if a row measurement moved later rows.
    fn apply_reply(&mut self, reply: WorkerReply) -> bool {
        match reply {
            WorkerReply::FetchRowReturn { row, timestamp } => {
                if self.is_current(&timestamp) {
                    return self.apply_row(row);
                }
                debug!(row = row.row_index.get(), snapshot = %timestamp, "Dropping row from superseded snapshot");
            }
            WorkerReply::RowFailed {
                index,
                timestamp,
                error,
            } => {
                if self.is_current(&timestamp) {
                    debug!(row = index.get(), error = %error, "Row request failed");
                    self.scheduler.row_failed(index);
                }
            }
            WorkerReply::ReturnData {
                method,
                timestamp,
                items,
            } => {
                if !self.is_current(&timestamp) {
                    debug!(snapshot = %timestamp, "Dropping metadata from superseded snapshot");
                    return false;
                }
                if let DataMethod::Batch(batch) = method {
                    self.scheduler.batch_completed(batch);
                }
                self.commit_items(items);
            }
            WorkerReply::DataCancelled { batch } => {
                debug!(batch = batch.get(), "Batch cancelled by worker");
                self.scheduler.batch_cancelled(batch);
            }
            WorkerReply::DataFailed { method, error } => {
                debug!(method = ?method, error = %error, "Metadata request failed");
                if let DataMethod::Batch(batch) = method {
                    self.scheduler.batch_cancelled(batch);
                }
            }
            WorkerReply::ScrollbarReturn { timestamp, markers } => {
                if self.is_current(&timestamp) {
                    self.markers = markers;
                }
            }
            WorkerReply::EditTagsReturn { items } => self.commit_items(items),
            WorkerReply::TokenRenewed { class, token } => {
                if class == TokenClass::Snapshot {
                    self.token = Some(token);
                }
            }
            WorkerReply::ThumbnailReady { index, url } => {
                if self.thumbnails_requested.remove(&index) {
                    self.thumbnails.insert(index, url);
                }
            }
            WorkerReply::ThumbnailFailed { index, error } => {
                debug!(item = index.get(), error = %error, "Thumbnail failed");
                if self.thumbnails_requested.remove(&index) {
                    self.thumbnails_failed.insert(index);
                }
            }
            WorkerReply::Notification { level, message } => {
                self.publish(EngineEvent::Notification {
                    isolation: self.isolation.clone(),
                    level,
                    message,
                });
            }
        }
        false
    }

    /// Measure, shift later rows, and cache. Returns true if later rows moved.
    fn apply_row(&mut self, mut row: Row) -> bool {
        let Some(key) = self.layout_key() else {
            return false;
        };
        let index = row.row_index;
        if index.get() >= self.ledger.row_count() {
            warn!(row = index.get(), rows = self.ledger.row_count(), "Row outside the collection");
            self.scheduler.row_failed(index);
            return false;
        }
        if row.container_width != key.container_width.get() {
            debug!(row = index.get(), width = row.container_width, "Dropping row laid out for another width");
            return false;
        }

        let moved = match self.ledger.measure(&key, index, row.row_height) {
            Measurement::Applied { delta } => {
                self.cache.shift_after(index, delta);
                delta != 0
            }
            Measurement::AlreadyMeasured => false,
            Measurement::StaleKey => return false,
        };
        row.offset = self.ledger.offset_of(index);
        row.top_pixel_accumulated = index.get() as i64 * self.ledger.nominal_row_height();
        if matches!(self.cache.insert(row), Insert::Stored) {
            self.scheduler.row_completed(index);
        }
        moved
    }

    fn commit_items(&mut self, items: Vec<Item>) {
        if items.is_empty() {
            return;
        }
        let indices: Vec<ItemIndex> = items.iter().map(|item| item.index).collect();
        for item in items {
            self.metadata.insert(item.index, item);
        }
        self.publish(EngineEvent::MetadataArrived {
            isolation: self.isolation.clone(),
            items: indices,
        });
    }

    /// Request thumbnails for items in loaded visible rows and abort those
    /// that left the window.
    fn sync_thumbnails(&mut self) -> Result<(), EngineError> {
        let mut wanted: HashMap<ItemIndex, u32> = HashMap::new();
        for visible in self.reconciler.window().visible_rows.iter().filter(|r| r.loaded) {
            let Some(row) = self.cache.get(visible.row_index) else {
                error!(row = visible.row_index.get(), "Visible row missing from cache");
                panic!("{} is visible but not cached", visible.row_index);
            };
            for element in &row.display_elements {
                let size = element.display_width.max(element.display_height).ceil() as u32;
                wanted.insert(element.item, size.max(1));
            }
        }

        let leaving: Vec<ItemIndex> = self
            .thumbnails_requested
            .iter()
            .filter(|index| !wanted.contains_key(index))
            .copied()
            .collect();
        for index in leaving {
            self.thumbnails_requested.remove(&index);
            self.transport.send(WorkerRequest::AbortThumbnail { index })?;
        }

        let mut entering: Vec<(ItemIndex, u32)> = wanted
            .into_iter()
            .filter(|(index, _)| {
                !self.thumbnails_requested.contains(index)
                    && !self.thumbnails.contains_key(index)
                    && !self.thumbnails_failed.contains(index)
            })
            .collect();
        entering.sort();
        for (index, target_size) in entering {
            let Some(item) = self.metadata.get(&index) else {
                continue;
            };
            let hash = item.hash.clone();
            self.thumbnails_requested.insert(index);
            self.transport.send(WorkerRequest::Thumbnail {
                index,
                hash,
                target_size,
            })?;
        }
        Ok(())
    }

    /// Send whatever the scheduler decides is due.
    fn dispatch(&mut self, now: Instant) -> Result<(), EngineError> {
        let (Some(snapshot), Some(width)) = (self.snapshot.as_ref(), self.width) else {
            return Ok(());
        };
        let ctx = FetchContext {
            cache: &self.cache,
            ledger: &self.ledger,
            range: self.reconciler.padded_range(),
            anchor: self.reconciler.anchor(),
            item_count: snapshot.item_count,
            has_token: self.token.is_some(),
        };
        let commands = self.scheduler.poll(now, &ctx);
        let timestamp = snapshot.id.clone();
        let token = self.token.clone().unwrap_or_default();

        for command in commands {
            let request = match command {
                FetchCommand::Row { index, is_last_row } => WorkerRequest::FetchRow {
                    index,
                    timestamp: timestamp.clone(),
                    window_width: width,
                    is_last_row,
                    token: token.clone(),
                },
                FetchCommand::Batch(batch) => WorkerRequest::FetchData {
                    method: DataMethod::Batch(batch),
                    timestamp: timestamp.clone(),
                    token: token.clone(),
                },
            };
            self.transport.send(request)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
