//! Keyed min-priority queues for grid propagation
//!
//! Keys are dense grid cell indices. Both strategies order entries by
//! `(priority, key)`, so for the same sequence of operations they pop keys
//! in exactly the same order.

mod bucket;
mod heap;

pub use bucket::BucketQueue;
pub use heap::IndexedHeap;

use crate::config::QueueMode;

/// Handle to a queued entry, valid until the entry is popped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    pub fn key(self) -> u32 {
        self.0
    }
}

/// Min-priority queue contract shared by all strategies
pub trait PriorityQueue {
    /// Insert a key that is not currently queued
    fn push(&mut self, key: u32, priority: f64) -> Handle;

    /// Lower the priority of a queued entry; larger values are ignored
    fn decrease_priority(&mut self, handle: Handle, priority: f64);

    /// Remove and return the key with the smallest priority
    ///
    /// # Panics
    /// Panics if the queue is empty.
    fn pop_min(&mut self) -> u32;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the queue selected by `mode` for keys `0..keys`
///
/// `bound` is an upper bound on pushed priorities; the bucketed strategy
/// derives its bucket width from it.
pub fn new_queue(mode: QueueMode, keys: usize, bound: f64) -> Box<dyn PriorityQueue> {
    match mode {
        QueueMode::Heap => Box::new(IndexedHeap::new(keys)),
        QueueMode::Bucket { bucket_size } => {
            let buckets = (keys / bucket_size.max(1)).max(1);
            Box::new(BucketQueue::new(keys, buckets, bound))
        }
    }
}
