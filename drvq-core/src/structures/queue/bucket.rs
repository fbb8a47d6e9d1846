//! Bucketed priority queue
//!
//! Priorities are partitioned into `buckets` fixed-width ranges over
//! `[0, bound)`. Only the lowest non-empty bucket is kept heap-ordered; the
//! rest are unsorted lists that are heapified when the active bucket drains.
//! Entries whose bucket lies below the active one are clamped into it, which
//! keeps every unsorted entry strictly greater than every active entry.

use super::heap::IndexedHeap;
use super::{Handle, PriorityQueue};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Absent,
    Active,
    Bucket { bucket: u32, index: u32 },
}

#[derive(Debug, Clone)]
pub struct BucketQueue {
    active: IndexedHeap,
    buckets: Vec<Vec<(u32, f64)>>,
    slots: Vec<Slot>,
    current: usize,
    width: f64,
    pending: usize,
}

impl BucketQueue {
    pub fn new(keys: usize, buckets: usize, bound: f64) -> Self {
        let buckets = buckets.max(1);
        let width = if bound.is_finite() && bound > 0.0 {
            bound / buckets as f64
        } else {
            1.0
        };
        Self {
            active: IndexedHeap::new(keys),
            buckets: vec![Vec::new(); buckets],
            slots: vec![Slot::Absent; keys],
            current: 0,
            width,
            pending: 0,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bucket_of(&self, priority: f64) -> usize {
        let b = (priority / self.width) as usize;
        b.min(self.buckets.len() - 1).max(self.current)
    }

    fn place(&mut self, key: u32, priority: f64) {
        let b = self.bucket_of(priority);
        if b == self.current {
            self.active.insert(key, priority);
            self.slots[key as usize] = Slot::Active;
        } else {
            let list = &mut self.buckets[b];
            self.slots[key as usize] = Slot::Bucket {
                bucket: b as u32,
                index: list.len() as u32,
            };
            list.push((key, priority));
            self.pending += 1;
        }
    }

    fn take_from_bucket(&mut self, bucket: usize, index: usize) -> (u32, f64) {
        let list = &mut self.buckets[bucket];
        let entry = list.swap_remove(index);
        if let Some(&(moved, _)) = list.get(index) {
            self.slots[moved as usize] = Slot::Bucket {
                bucket: bucket as u32,
                index: index as u32,
            };
        }
        self.pending -= 1;
        entry
    }

    /// Activate the next non-empty bucket once the active heap drains
    fn refill(&mut self) -> bool {
        let Some(next) = (self.current + 1..self.buckets.len()).find(|&b| !self.buckets[b].is_empty())
        else {
            return false;
        };
        self.current = next;
        let entries = std::mem::take(&mut self.buckets[next]);
        self.pending -= entries.len();
        for &(key, _) in &entries {
            self.slots[key as usize] = Slot::Active;
        }
        self.active.extend(entries);
        true
    }
}

impl PriorityQueue for BucketQueue {
    fn push(&mut self, key: u32, priority: f64) -> Handle {
        debug_assert_eq!(self.slots[key as usize], Slot::Absent);
        self.place(key, priority);
        Handle(key)
    }

    fn decrease_priority(&mut self, handle: Handle, priority: f64) {
        let key = handle.key();
        match self.slots[key as usize] {
            Slot::Active => self.active.decrease(key, priority),
            Slot::Bucket { bucket, index } => {
                let (bucket, index) = (bucket as usize, index as usize);
                if priority < self.buckets[bucket][index].1 {
                    self.take_from_bucket(bucket, index);
                    self.place(key, priority);
                }
            }
            Slot::Absent => debug_assert!(false, "key {} not queued", key),
        }
    }

    fn pop_min(&mut self) -> u32 {
        if self.active.size() == 0 && !self.refill() {
            panic!("pop_min on empty queue");
        }
        match self.active.pop() {
            Some((key, _)) => {
                self.slots[key as usize] = Slot::Absent;
                key
            }
            None => panic!("pop_min on empty queue"),
        }
    }

    fn len(&self) -> usize {
        self.active.size() + self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_spread_over_buckets() {
        let mut queue = BucketQueue::new(16, 4, 4.0);
        assert_eq!(queue.bucket_count(), 4);
        for key in 0..8u32 {
            queue.push(key, 3.9 - key as f64 * 0.5);
        }
        assert_eq!(queue.len(), 8);
        let order: Vec<u32> = (0..8).map(|_| queue.pop_min()).collect();
        assert_eq!(order, vec![7, 6, 5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_decrease_moves_between_buckets() {
        let mut queue = BucketQueue::new(4, 4, 4.0);
        queue.push(0, 1.5);
        let h = queue.push(1, 3.5);
        queue.push(2, 2.5);
        queue.decrease_priority(h, 0.1);
        assert_eq!(queue.pop_min(), 1);
        assert_eq!(queue.pop_min(), 0);
        assert_eq!(queue.pop_min(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_refilled_bucket_keeps_decrease_key() {
        let mut queue = BucketQueue::new(32, 2, 2.0);
        queue.push(31, 0.5);
        let mut handles = Vec::new();
        for key in 0..20u32 {
            handles.push(queue.push(key, 1.0 + ((key * 7) % 20) as f64 * 0.04));
        }
        assert_eq!(queue.pop_min(), 31);
        // Drains the first bucket; the next pop heapifies the second
        assert_eq!(queue.pop_min(), 0);
        queue.decrease_priority(handles[13], 0.9);
        queue.decrease_priority(handles[19], 1.0);
        assert_eq!(queue.pop_min(), 13);
        assert_eq!(queue.pop_min(), 19);
        let rest: Vec<u32> = (0..17).map(|_| queue.pop_min()).collect();
        let mut expected: Vec<u32> = (1..19).filter(|&k| k != 13).collect();
        expected.sort_by_key(|&k| (k * 7) % 20);
        assert_eq!(rest, expected);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_late_low_priority_clamped_to_active() {
        let mut queue = BucketQueue::new(4, 4, 4.0);
        queue.push(0, 2.5);
        queue.push(1, 3.5);
        assert_eq!(queue.pop_min(), 0);
        // Below the active bucket, must still come out first
        queue.push(2, 0.2);
        assert_eq!(queue.pop_min(), 2);
        assert_eq!(queue.pop_min(), 1);
    }

    #[test]
    fn test_priorities_above_bound() {
        let mut queue = BucketQueue::new(3, 2, 1.0);
        queue.push(0, 10.0);
        queue.push(1, 5.0);
        queue.push(2, 0.1);
        assert_eq!(queue.pop_min(), 2);
        assert_eq!(queue.pop_min(), 1);
        assert_eq!(queue.pop_min(), 0);
    }
}
