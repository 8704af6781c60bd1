//! Bounded window of in-flight batch ids

use crate::model::BatchId;
use std::collections::{HashSet, VecDeque};

/// FIFO of the most recently requested batches with O(1) membership.
///
/// Pushing past capacity evicts the oldest id. An evicted batch is stale:
/// its reply, if it ever arrives, must not be committed.
#[derive(Debug, Clone)]
pub struct BatchWindow {
    order: VecDeque<BatchId>,
    members: HashSet<BatchId>,
    capacity: usize,
}

impl BatchWindow {
    /// Create a window holding at most `capacity` batches (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a new in-flight batch, returning the id it evicted.
    ///
    /// Pushing an id already in the window leaves the window unchanged.
    pub fn push(&mut self, batch: BatchId) -> Option<BatchId> {
        if !self.members.insert(batch) {
            return None;
        }
        self.order.push_back(batch);
        if self.order.len() > self.capacity {
            let evicted = self.order.pop_front()?;
            self.members.remove(&evicted);
            return Some(evicted);
        }
        None
    }

    /// True when the batch is still current.
    pub fn contains(&self, batch: BatchId) -> bool {
        self.members.contains(&batch)
    }

    /// Drop a batch from the window (it completed or failed).
    pub fn remove(&mut self, batch: BatchId) -> bool {
        if !self.members.remove(&batch) {
            return false;
        }
        self.order.retain(|b| *b != batch);
        true
    }

    /// Drop every batch.
    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }

    /// Number of batches in flight.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if no batch is in flight.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Maximum number of in-flight batches.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Batches in request order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = BatchId> + '_ {
        self.order.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(id: usize) -> BatchId {
        BatchId::new(id)
    }

    #[test]
    fn push_within_capacity_evicts_nothing() {
        let mut window = BatchWindow::new(3);
        assert_eq!(window.push(batch(1)), None);
        assert_eq!(window.push(batch(2)), None);
        assert_eq!(window.len(), 2);
        assert!(window.contains(batch(1)));
    }

    #[test]
    fn push_past_capacity_evicts_oldest() {
        let mut window = BatchWindow::new(2);
        window.push(batch(1));
        window.push(batch(2));
        assert_eq!(window.push(batch(3)), Some(batch(1)));
        assert!(!window.contains(batch(1)));
        assert!(window.contains(batch(3)));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn duplicate_push_is_ignored() {
        let mut window = BatchWindow::new(2);
        window.push(batch(1));
        window.push(batch(2));
        assert_eq!(window.push(batch(1)), None);
        assert_eq!(window.iter().collect::<Vec<_>>(), vec![batch(1), batch(2)]);
    }

    #[test]
    fn remove_frees_a_slot() {
        let mut window = BatchWindow::new(2);
        window.push(batch(1));
        window.push(batch(2));
        assert!(window.remove(batch(1)));
        assert!(!window.remove(batch(1)));
        assert_eq!(window.push(batch(3)), None);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut window = BatchWindow::new(0);
        assert_eq!(window.capacity(), 1);
        window.push(batch(1));
        assert_eq!(window.push(batch(2)), Some(batch(1)));
    }

    #[test]
    fn clear_empties_window() {
        let mut window = BatchWindow::new(6);
        for i in 0..4 {
            window.push(batch(i));
        }
        window.clear();
        assert!(window.is_empty());
        assert!(!window.contains(batch(0)));
    }
}
