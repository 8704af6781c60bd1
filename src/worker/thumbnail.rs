//! Image decode/resize pool contract.
//!
//! The pool is an external collaborator reached only through submit, abort,
//! and poll. Jobs are keyed by item index; aborting an index drops its job if
//! it has not completed yet.

use crate::model::ItemIndex;
use std::collections::VecDeque;

/// One decode request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailJob {
    /// Item index.
    pub index: ItemIndex,
    /// Item hash, the handle the pool fetches by.
    pub hash: String,
    /// Longest edge in pixels.
    pub target_size: u32,
    /// Per-item hash token.
    pub token: String,
}

/// One finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailDone {
    /// Decoded image handle.
    Ready {
        /// Item index.
        index: ItemIndex,
        /// Object URL of the decoded image.
        url: String,
    },
    /// Decode failed.
    Failed {
        /// Item index.
        index: ItemIndex,
        /// Reason reported by the pool.
        reason: String,
    },
}

/// Request/abort/poll interface to an image pool.
pub trait ThumbnailPool {
    /// Queue a job, replacing any pending job for the same index.
    fn submit(&mut self, job: ThumbnailJob);

    /// Drop the pending job for `index`. Returns true if one was dropped.
    fn abort(&mut self, index: ItemIndex) -> bool;

    /// Collect finished jobs.
    fn poll(&mut self) -> Vec<ThumbnailDone>;

    /// Number of jobs not yet returned by [`poll`](Self::poll).
    fn pending(&self) -> usize;
}

/// Pool that completes every job on the next poll, producing a synthetic URL.
#[derive(Debug, Clone, Default)]
pub struct ImmediatePool {
    queue: VecDeque<ThumbnailJob>,
}

impl ImmediatePool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ThumbnailPool for ImmediatePool {
    fn submit(&mut self, job: ThumbnailJob) {
        self.queue.retain(|queued| queued.index != job.index);
        self.queue.push_back(job);
    }

    fn abort(&mut self, index: ItemIndex) -> bool {
        let before = self.queue.len();
        self.queue.retain(|queued| queued.index != index);
        self.queue.len() != before
    }

    fn poll(&mut self) -> Vec<ThumbnailDone> {
        self.queue
            .drain(..)
            .map(|job| {
                if job.token.is_empty() {
                    ThumbnailDone::Failed {
                        index: job.index,
                        reason: "missing token".to_string(),
                    }
                } else {
                    ThumbnailDone::Ready {
                        index: job.index,
                        url: format!("blob:photoscroll/{}/{}", job.hash, job.target_size),
                    }
                }
            })
            .collect()
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(index: usize) -> ThumbnailJob {
        ThumbnailJob {
            index: ItemIndex::new(index),
            hash: format!("h{}", index),
            target_size: 256,
            token: "tok".to_string(),
        }
    }

    #[test]
    fn poll_completes_submitted_jobs() {
        let mut pool = ImmediatePool::new();
        pool.submit(job(1));
        pool.submit(job(2));

        let done = pool.poll();

        assert_eq!(done.len(), 2);
        assert_eq!(
            done[0],
            ThumbnailDone::Ready {
                index: ItemIndex::new(1),
                url: "blob:photoscroll/h1/256".to_string()
            }
        );
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn abort_drops_pending_job() {
        let mut pool = ImmediatePool::new();
        pool.submit(job(1));
        assert!(pool.abort(ItemIndex::new(1)));
        assert!(!pool.abort(ItemIndex::new(1)));
        assert!(pool.poll().is_empty());
    }

    #[test]
    fn resubmit_replaces_pending_job() {
        let mut pool = ImmediatePool::new();
        pool.submit(job(1));
        pool.submit(ThumbnailJob {
            target_size: 512,
            ..job(1)
        });
        assert_eq!(pool.pending(), 1);
    }
}
