//! Background worker - dispatch table, job queue, and soft cancellation
//!
//! Requests become jobs on a FIFO queue; [`Worker::step`] runs one job. A job
//! that needs a token either gets it, parks under the token class being
//! renewed, or fails. Renewals are themselves jobs queued behind the work
//! that triggered them, so every caller that arrives while a token is expired
//! parks under the same renewal.
//!
//! Batch metadata decodes one item per step and checks the in-flight window
//! before each item. A batch evicted from the window is discarded whole: the
//! decoded items are dropped and `DataCancelled` is sent instead.

use super::protocol::{DataMethod, NotificationLevel, WorkerReply, WorkerRequest};
use super::service::CollectionService;
use super::thumbnail::{ThumbnailDone, ThumbnailJob, ThumbnailPool};
use crate::auth::{Acquire, RenewCall, TokenClass, TokenManager, TokenState};
use crate::fetch::BatchWindow;
use crate::model::wire::parse_item_array;
use crate::model::{
    AuthError, BatchId, Item, ItemIndex, Marker, RawRow, RequestError, Row, RowIndex,
    SchemaError, ServiceError, SnapshotId, TokenReply,
};
use crate::view_state::justify::{justify, JustifyParams};
use crate::view_state::types::ContainerWidth;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, error, info, warn};

/// Layout and fetch parameters the worker needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerConfig {
    /// Items per row.
    pub row_capacity: usize,
    /// Items per metadata batch.
    pub batch_size: usize,
    /// Nominal row height, for `top_pixel_accumulated`.
    pub nominal_row_height: i64,
    /// Per-item padding.
    pub padding: f64,
    /// Provisional subrow height cap.
    pub max_subrow_height: f64,
    /// Capacity of the in-flight batch window.
    pub inflight_batches: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            row_capacity: 40,
            batch_size: 100,
            nominal_row_height: 2400,
            padding: 4.0,
            max_subrow_height: 250.0,
            inflight_batches: 6,
        }
    }
}

#[derive(Debug, Clone)]
enum Job {
    Row {
        index: RowIndex,
        timestamp: SnapshotId,
        width: ContainerWidth,
        is_last_row: bool,
        retried: bool,
    },
    Data {
        method: DataMethod,
        timestamp: SnapshotId,
        retried: bool,
    },
    Decode {
        batch: BatchId,
        timestamp: SnapshotId,
        pending: VecDeque<Value>,
        decoded: Vec<Item>,
    },
    Scrollbar {
        timestamp: SnapshotId,
        retried: bool,
    },
    EditTags {
        items: Vec<ItemIndex>,
        add: Vec<String>,
        remove: Vec<String>,
        retried: bool,
    },
    EditAlbums {
        items: Vec<ItemIndex>,
        add: Vec<String>,
        remove: Vec<String>,
        retried: bool,
    },
    Delete {
        items: Vec<ItemIndex>,
        retried: bool,
    },
    Thumbnail {
        index: ItemIndex,
        hash: String,
        target_size: u32,
        retried: bool,
    },
    Renew(RenewCall),
}

impl Job {
    /// Token class the job authenticates with.
    fn class(&self) -> TokenClass {
        match self {
            Job::Thumbnail { hash, .. } => TokenClass::Hash(hash.clone()),
            _ => TokenClass::Snapshot,
        }
    }

    /// Batch the job belongs to, if it is subject to cancellation.
    fn batch(&self) -> Option<BatchId> {
        match self {
            Job::Data {
                method: DataMethod::Batch(batch),
                ..
            }
            | Job::Decode { batch, .. } => Some(*batch),
            _ => None,
        }
    }

    /// Consume the job's single retry. False if it was already used.
    fn take_retry(&mut self) -> bool {
        match self {
            Job::Row { retried, .. }
            | Job::Data { retried, .. }
            | Job::Scrollbar { retried, .. }
            | Job::EditTags { retried, .. }
            | Job::EditAlbums { retried, .. }
            | Job::Delete { retried, .. }
            | Job::Thumbnail { retried, .. } => !std::mem::replace(retried, true),
            Job::Decode { .. } | Job::Renew(_) => false,
        }
    }
}

/// Background worker for one isolation context.
pub struct Worker<S, P> {
    service: S,
    pool: P,
    tokens: TokenManager,
    config: WorkerConfig,
    queue: VecDeque<Job>,
    parked: HashMap<TokenClass, Vec<Job>>,
    window: BatchWindow,
    thumbnails: HashSet<ItemIndex>,
    outbox: Vec<WorkerReply>,
    clock: fn() -> DateTime<Utc>,
    closed: bool,
}

impl<S: CollectionService, P: ThumbnailPool> Worker<S, P> {
    /// Create a worker.
    pub fn new(service: S, pool: P, tokens: TokenManager, config: WorkerConfig) -> Self {
        Self {
            service,
            pool,
            tokens,
            config,
            queue: VecDeque::new(),
            parked: HashMap::new(),
            window: BatchWindow::new(config.inflight_batches),
            thumbnails: HashSet::new(),
            outbox: Vec::new(),
            clock: Utc::now,
            closed: false,
        }
    }

    /// Use a fixed clock for token expiry checks.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Accept one request. Work happens in [`step`](Self::step).
    pub fn handle(&mut self, request: WorkerRequest) {
        match request {
            WorkerRequest::InstallToken { class, token } => {
                if let Err(e) = self.tokens.install(class.clone(), &token) {
                    warn!(class = %class, error = %e, "Rejected installed token");
                    self.notify(NotificationLevel::Error, format!("Invalid credentials: {}", e));
                }
            }
            WorkerRequest::FetchRow {
                index,
                timestamp,
                window_width,
                is_last_row,
                token,
            } => {
                self.adopt_snapshot_token(&token);
                self.queue.push_back(Job::Row {
                    index,
                    timestamp,
                    width: window_width,
                    is_last_row,
                    retried: false,
                });
            }
            WorkerRequest::FetchData {
                method,
                timestamp,
                token,
            } => {
                self.adopt_snapshot_token(&token);
                if let DataMethod::Batch(batch) = method {
                    if let Some(evicted) = self.window.push(batch) {
                        debug!(batch = evicted.get(), by = batch.get(), "Batch evicted");
                    }
                }
                self.queue.push_back(Job::Data {
                    method,
                    timestamp,
                    retried: false,
                });
            }
            WorkerRequest::FetchScrollbar { timestamp } => {
                self.queue.push_back(Job::Scrollbar {
                    timestamp,
                    retried: false,
                });
            }
            WorkerRequest::EditTags { items, add, remove } => {
                self.queue.push_back(Job::EditTags {
                    items,
                    add,
                    remove,
                    retried: false,
                });
            }
            WorkerRequest::EditAlbums { items, add, remove } => {
                self.queue.push_back(Job::EditAlbums {
                    items,
                    add,
                    remove,
                    retried: false,
                });
            }
            WorkerRequest::DeleteData { items } => {
                self.queue.push_back(Job::Delete {
                    items,
                    retried: false,
                });
            }
            WorkerRequest::Thumbnail {
                index,
                hash,
                target_size,
            } => {
                self.queue.push_back(Job::Thumbnail {
                    index,
                    hash,
                    target_size,
                    retried: false,
                });
            }
            WorkerRequest::AbortThumbnail { index } => self.abort_thumbnail(index),
            WorkerRequest::Reset => self.reset(),
            WorkerRequest::Logout => self.logout(),
            WorkerRequest::Shutdown => self.closed = true,
        }
    }

    /// Collect finished thumbnails and run at most one job.
    ///
    /// Returns false when there was nothing to do.
    pub fn step(&mut self) -> bool {
        let mut worked = false;
        for done in self.pool.poll() {
            worked = true;
            match done {
                ThumbnailDone::Ready { index, url } => {
                    self.thumbnails.remove(&index);
                    self.outbox.push(WorkerReply::ThumbnailReady { index, url });
                }
                ThumbnailDone::Failed { index, reason } => {
                    self.thumbnails.remove(&index);
                    self.outbox.push(WorkerReply::ThumbnailFailed {
                        index,
                        error: RequestError::Transport(reason),
                    });
                }
            }
        }
        if let Some(job) = self.queue.pop_front() {
            self.run(job);
            worked = true;
        }
        worked
    }

    /// Step until no work remains.
    pub fn run_until_idle(&mut self) {
        while self.step() {}
    }

    /// Take every reply produced so far.
    pub fn take_replies(&mut self) -> Vec<WorkerReply> {
        std::mem::take(&mut self.outbox)
    }

    /// True when no job is queued and the pool has nothing pending.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.pool.pending() == 0
    }

    /// True after `Shutdown`.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of queued jobs.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Number of jobs waiting on a renewal.
    pub fn parked(&self) -> usize {
        self.parked.values().map(Vec::len).sum()
    }

    /// The remote service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// The token manager.
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn notify(&mut self, level: NotificationLevel, message: String) {
        self.outbox.push(WorkerReply::Notification { level, message });
    }

    /// Install the engine's snapshot token if the worker has none yet.
    fn adopt_snapshot_token(&mut self, token: &str) {
        let now = self.now();
        if token.is_empty() || self.tokens.state(&TokenClass::Snapshot, now) != TokenState::Absent {
            return;
        }
        if let Err(e) = self.tokens.install(TokenClass::Snapshot, token) {
            warn!(error = %e, "Ignoring malformed snapshot token from request");
        }
    }

    fn park(&mut self, class: TokenClass, job: Job) {
        debug!(class = %class, "Job parked until renewal completes");
        self.parked.entry(class).or_default().push(job);
    }

    fn run(&mut self, job: Job) {
        let job = match job {
            Job::Renew(call) => return self.renew(call),
            Job::Decode {
                batch,
                timestamp,
                pending,
                decoded,
            } => return self.decode_step(batch, timestamp, pending, decoded),
            other => other,
        };

        if let Some(batch) = job.batch() {
            if !self.window.contains(batch) {
                debug!(batch = batch.get(), "Batch superseded before fetch");
                self.outbox.push(WorkerReply::DataCancelled { batch });
                return;
            }
        }

        let class = job.class();
        let now = self.now();
        let token = match self.tokens.acquire(&class, now) {
            Ok(Acquire::Ready(token)) => token,
            Ok(Acquire::Renew(call)) => {
                let waiting = call.class();
                self.queue.push_back(Job::Renew(call));
                self.park(waiting, job);
                return;
            }
            Ok(Acquire::Wait(waiting)) => {
                self.park(waiting, job);
                return;
            }
            Err(e) => return self.fail(job, RequestError::Auth(e)),
        };

        let mut job = job;
        match self.execute(&job, &token) {
            Ok(()) => {}
            Err(ServiceError::Unauthorized) if job.take_retry() => {
                debug!(class = %class, "Token rejected; marking expired and retrying");
                self.tokens.mark_expired(&class, &token);
                self.queue.push_back(job);
            }
            Err(e) => self.fail(job, e.into()),
        }
    }

    fn execute(&mut self, job: &Job, token: &str) -> Result<(), ServiceError> {
        match job {
            Job::Row {
                index,
                timestamp,
                width,
                is_last_row,
                ..
            } => {
                let body = self.service.fetch_row(*index, timestamp, width.get(), token)?;
                let raw = RawRow::parse(&body)?;
                let items = raw.validate(*index, self.config.row_capacity, *is_last_row)?;
                let params = JustifyParams::new(*width, self.config.padding, self.config.max_subrow_height);
                let layout = justify(&items, &params, *is_last_row);

                let row = Row {
                    start: ItemIndex::new(raw.start),
                    end: ItemIndex::new(raw.end),
                    row_index: *index,
                    row_height: layout.realized_height.round() as i64,
                    offset: 0,
                    top_pixel_accumulated: index.get() as i64 * self.config.nominal_row_height,
                    display_elements: layout.into_elements(),
                    container_width: width.get(),
                    snapshot: timestamp.clone(),
                };
                debug!(row = index.get(), height = row.row_height, "Row laid out");
                self.outbox.push(WorkerReply::FetchRowReturn {
                    row,
                    timestamp: timestamp.clone(),
                });
            }
            Job::Data {
                method, timestamp, ..
            } => {
                let (start, end) = match *method {
                    DataMethod::Batch(batch) => batch.item_range(self.config.batch_size, usize::MAX),
                    DataMethod::Single(item) => (item, ItemIndex::new(item.get() + 1)),
                };
                let body = self.service.fetch_data(timestamp, start, end, token)?;
                let values = parse_item_array(&body)?;
                match *method {
                    DataMethod::Batch(batch) => self.queue.push_back(Job::Decode {
                        batch,
                        timestamp: timestamp.clone(),
                        decoded: Vec::with_capacity(values.len()),
                        pending: values.into(),
                    }),
                    DataMethod::Single(_) => {
                        let items = decode_all(values)?;
                        self.adopt_item_tokens(&items);
                        self.outbox.push(WorkerReply::ReturnData {
                            method: *method,
                            timestamp: timestamp.clone(),
                            items,
                        });
                    }
                }
            }
            Job::Scrollbar { timestamp, .. } => {
                let body = self.service.fetch_scrollbar(timestamp, token)?;
                let markers = Marker::parse_all(&body)?;
                self.outbox.push(WorkerReply::ScrollbarReturn {
                    timestamp: timestamp.clone(),
                    markers,
                });
            }
            Job::EditTags {
                items, add, remove, ..
            } => {
                let body = self.service.edit_tags(items, add, remove, token)?;
                let items = decode_all(parse_item_array(&body)?)?;
                self.outbox.push(WorkerReply::EditTagsReturn { items });
            }
            Job::EditAlbums {
                items, add, remove, ..
            } => {
                self.service.edit_albums(items, add, remove, token)?;
                self.notify(
                    NotificationLevel::Info,
                    format!("Updated albums for {} items", items.len()),
                );
            }
            Job::Delete { items, .. } => {
                self.service.delete_data(items, token)?;
                self.notify(NotificationLevel::Info, format!("Deleted {} items", items.len()));
            }
            Job::Thumbnail {
                index,
                hash,
                target_size,
                ..
            } => {
                self.thumbnails.insert(*index);
                self.pool.submit(ThumbnailJob {
                    index: *index,
                    hash: hash.clone(),
                    target_size: *target_size,
                    token: token.to_string(),
                });
            }
            Job::Decode { .. } | Job::Renew(_) => {
                error!("Decode and renew jobs are not executed with a token");
            }
        }
        Ok(())
    }

    fn decode_step(
        &mut self,
        batch: BatchId,
        timestamp: SnapshotId,
        mut pending: VecDeque<Value>,
        mut decoded: Vec<Item>,
    ) {
        if !self.window.contains(batch) {
            debug!(
                batch = batch.get(),
                discarded = decoded.len(),
                "Batch superseded during decode; discarding"
            );
            self.outbox.push(WorkerReply::DataCancelled { batch });
            return;
        }

        match pending.pop_front() {
            Some(value) => match Item::decode(value) {
                Ok(item) => {
                    decoded.push(item);
                    self.queue.push_back(Job::Decode {
                        batch,
                        timestamp,
                        pending,
                        decoded,
                    });
                }
                Err(e) => {
                    let job = Job::Decode {
                        batch,
                        timestamp,
                        pending,
                        decoded,
                    };
                    self.fail(job, RequestError::Schema(e));
                }
            },
            None => {
                self.window.remove(batch);
                self.adopt_item_tokens(&decoded);
                debug!(batch = batch.get(), items = decoded.len(), "Batch decoded");
                self.outbox.push(WorkerReply::ReturnData {
                    method: DataMethod::Batch(batch),
                    timestamp,
                    items: decoded,
                });
            }
        }
    }

    fn adopt_item_tokens(&mut self, items: &[Item]) {
        for item in items {
            if let Some(token) = &item.token {
                if let Err(e) = self.tokens.install(TokenClass::Hash(item.hash.clone()), token) {
                    warn!(item = item.index.get(), error = %e, "Ignoring malformed item token");
                }
            }
        }
    }

    fn renew(&mut self, call: RenewCall) {
        let class = call.class();
        let result = match &call {
            RenewCall::Timestamp { token } => self.service.renew_timestamp_token(token),
            RenewCall::Hash {
                expired, bearer, ..
            } => self.service.renew_hash_token(expired, bearer),
        };
        let outcome = result
            .map_err(|e| e.to_string())
            .and_then(|body| TokenReply::parse(&body).map(|r| r.token).map_err(|e| e.to_string()));
        let renewed = outcome.as_ref().ok().cloned();

        let parked = self.parked.remove(&class).unwrap_or_default();
        match (self.tokens.finish_renewal(&class, outcome), renewed) {
            (Ok(()), Some(token)) => {
                debug!(class = %class, resumed = parked.len(), "Resuming parked jobs");
                self.queue.extend(parked);
                self.outbox.push(WorkerReply::TokenRenewed { class, token });
            }
            (Ok(()), None) => {
                error!(class = %class, "Renewal reported success without a token");
                self.queue.extend(parked);
            }
            (Err(e), _) => {
                self.notify(NotificationLevel::Error, format!("{}; please sign in again", e));
                for job in parked {
                    self.fail(job, RequestError::Auth(e.clone()));
                }
            }
        }
    }

    fn fail(&mut self, job: Job, error: RequestError) {
        match &error {
            RequestError::Transport(reason) => {
                self.notify(NotificationLevel::Error, format!("Request failed: {}", reason));
            }
            RequestError::Schema(e) => warn!(error = %e, "Dropping reply that violates the wire schema"),
            RequestError::Auth(e) => warn!(error = %e, "Request failed authorization"),
        }

        match job {
            Job::Row {
                index, timestamp, ..
            } => self.outbox.push(WorkerReply::RowFailed {
                index,
                timestamp,
                error,
            }),
            Job::Data { method, .. } => {
                if let DataMethod::Batch(batch) = method {
                    self.window.remove(batch);
                }
                self.outbox.push(WorkerReply::DataFailed { method, error });
            }
            Job::Decode { batch, .. } => {
                self.window.remove(batch);
                self.outbox.push(WorkerReply::DataFailed {
                    method: DataMethod::Batch(batch),
                    error,
                });
            }
            Job::Scrollbar { .. } => {
                self.notify(NotificationLevel::Error, format!("Could not load timeline: {}", error));
            }
            Job::EditTags { .. } | Job::EditAlbums { .. } | Job::Delete { .. } => {
                self.notify(NotificationLevel::Error, format!("Edit failed: {}", error));
            }
            Job::Thumbnail { index, .. } => {
                self.outbox.push(WorkerReply::ThumbnailFailed { index, error });
            }
            Job::Renew(call) => {
                error!(class = %call.class(), error = %error, "Renew job failed outside the renewal path");
            }
        }
    }

    fn abort_thumbnail(&mut self, index: ItemIndex) {
        let is_target = |job: &Job| matches!(job, Job::Thumbnail { index: i, .. } if *i == index);
        self.queue.retain(|job| !is_target(job));
        for jobs in self.parked.values_mut() {
            jobs.retain(|job| !is_target(job));
        }
        if self.thumbnails.remove(&index) {
            self.pool.abort(index);
        }
    }

    fn reset(&mut self) {
        let dropped = self.queue.len() + self.parked();
        // Renewals must finish or their class stays marked as renewing
        self.queue.retain(|job| matches!(job, Job::Renew(_)));
        self.parked.clear();
        self.window.clear();
        for index in self.thumbnails.drain() {
            self.pool.abort(index);
        }
        info!(dropped, "Worker reset");
    }

    fn logout(&mut self) {
        self.tokens.logout();
        self.queue.retain(|job| !matches!(job, Job::Renew(_)));
        for (class, jobs) in std::mem::take(&mut self.parked) {
            for job in jobs {
                self.fail(job, RequestError::Auth(AuthError::Absent(class.clone())));
            }
        }
        info!("Logged out");
    }
}

fn decode_all(values: Vec<Value>) -> Result<Vec<Item>, SchemaError> {
    values.into_iter().map(Item::decode).collect()
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
