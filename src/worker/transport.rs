//! Message passing between an engine and its worker.
//!
//! [`LocalTransport`] runs the worker inline and is stepped explicitly, which
//! keeps tests deterministic. [`ThreadTransport`] runs it on its own thread
//! behind a pair of `std::sync::mpsc` channels.

use super::handler::Worker;
use super::protocol::{WorkerReply, WorkerRequest};
use super::service::CollectionService;
use super::thumbnail::ThumbnailPool;
use crate::model::EngineError;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// How often an otherwise idle worker thread polls a busy thumbnail pool.
const POOL_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Send requests to a worker and receive its replies.
pub trait WorkerTransport {
    /// Post a request.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::WorkerClosed` if the worker has stopped.
    fn send(&mut self, request: WorkerRequest) -> Result<(), EngineError>;

    /// Take the next reply if one is ready.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::WorkerClosed` if the worker stopped and no
    /// replies remain.
    fn try_recv(&mut self) -> Result<Option<WorkerReply>, EngineError>;
}

/// Worker owned by the caller and stepped on the caller's thread.
pub struct LocalTransport<S, P> {
    worker: Worker<S, P>,
    inbox: VecDeque<WorkerReply>,
}

impl<S: CollectionService, P: ThumbnailPool> LocalTransport<S, P> {
    /// Wrap a worker.
    pub fn new(worker: Worker<S, P>) -> Self {
        Self {
            worker,
            inbox: VecDeque::new(),
        }
    }

    /// Run one worker job. Returns false if there was nothing to do.
    pub fn step(&mut self) -> bool {
        let worked = self.worker.step();
        self.inbox.extend(self.worker.take_replies());
        worked
    }

    /// Run the worker until it has nothing left to do.
    pub fn run_until_idle(&mut self) {
        self.worker.run_until_idle();
        self.inbox.extend(self.worker.take_replies());
    }

    /// The wrapped worker.
    pub fn worker(&self) -> &Worker<S, P> {
        &self.worker
    }

    /// The wrapped worker, mutably.
    pub fn worker_mut(&mut self) -> &mut Worker<S, P> {
        &mut self.worker
    }
}

impl<S: CollectionService, P: ThumbnailPool> WorkerTransport for LocalTransport<S, P> {
    fn send(&mut self, request: WorkerRequest) -> Result<(), EngineError> {
        if self.worker.is_closed() {
            return Err(EngineError::WorkerClosed);
        }
        self.worker.handle(request);
        // Replies produced synchronously, such as notifications
        self.inbox.extend(self.worker.take_replies());
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<WorkerReply>, EngineError> {
        match self.inbox.pop_front() {
            Some(reply) => Ok(Some(reply)),
            None if self.worker.is_closed() => Err(EngineError::WorkerClosed),
            None => Ok(None),
        }
    }
}

/// Worker running on a dedicated thread.
#[derive(Debug)]
pub struct ThreadTransport {
    requests: Sender<WorkerRequest>,
    replies: Receiver<WorkerReply>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadTransport {
    /// Move `worker` onto a new thread.
    pub fn spawn<S, P>(worker: Worker<S, P>) -> Self
    where
        S: CollectionService + Send + 'static,
        P: ThumbnailPool + Send + 'static,
    {
        let (request_tx, request_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();
        let handle = std::thread::spawn(move || worker_loop(worker, request_rx, reply_tx));
        Self {
            requests: request_tx,
            replies: reply_rx,
            handle: Some(handle),
        }
    }

    /// Block up to `timeout` for the next reply.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::WorkerClosed` if the worker thread has exited.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<WorkerReply>, EngineError> {
        match self.replies.recv_timeout(timeout) {
            Ok(reply) => Ok(Some(reply)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::WorkerClosed),
        }
    }
}

impl WorkerTransport for ThreadTransport {
    fn send(&mut self, request: WorkerRequest) -> Result<(), EngineError> {
        self.requests
            .send(request)
            .map_err(|_| EngineError::WorkerClosed)
    }

    fn try_recv(&mut self) -> Result<Option<WorkerReply>, EngineError> {
        match self.replies.try_recv() {
            Ok(reply) => Ok(Some(reply)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(EngineError::WorkerClosed),
        }
    }
}

impl Drop for ThreadTransport {
    fn drop(&mut self) {
        let _ = self.requests.send(WorkerRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
    }
}

fn worker_loop<S, P>(
    mut worker: Worker<S, P>,
    requests: Receiver<WorkerRequest>,
    replies: Sender<WorkerReply>,
) where
    S: CollectionService,
    P: ThumbnailPool,
{
    debug!("Worker thread started");
    loop {
        // Block only when there is nothing left to run
        if worker.is_idle() {
            match requests.recv() {
                Ok(request) => worker.handle(request),
                Err(_) => break,
            }
        } else if worker.queued() == 0 {
            // Only the pool is busy; wake for its results or a new request
            match requests.recv_timeout(POOL_POLL_INTERVAL) {
                Ok(request) => worker.handle(request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        loop {
            match requests.try_recv() {
                Ok(request) => worker.handle(request),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }
        if worker.is_closed() {
            break;
        }
        worker.step();
        for reply in worker.take_replies() {
            if replies.send(reply).is_err() {
                return;
            }
        }
    }
    debug!("Worker thread stopped");
}
