//! Indexed binary min-heap with decrease-key

use std::cmp::Ordering;

use super::{Handle, PriorityQueue};

const ABSENT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Entry {
    priority: f64,
    key: u32,
}

impl Entry {
    #[inline]
    fn precedes(&self, other: &Entry) -> bool {
        match self.priority.total_cmp(&other.priority) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => self.key < other.key,
        }
    }
}

/// Binary heap over keys `0..keys` tracking each key's heap slot
#[derive(Debug, Clone)]
pub struct IndexedHeap {
    entries: Vec<Entry>,
    position: Vec<u32>,
}

impl IndexedHeap {
    pub fn new(keys: usize) -> Self {
        Self {
            entries: Vec::new(),
            position: vec![ABSENT; keys],
        }
    }

    pub fn contains(&self, key: u32) -> bool {
        self.position[key as usize] != ABSENT
    }

    pub(crate) fn insert(&mut self, key: u32, priority: f64) {
        debug_assert!(!self.contains(key), "key {} already queued", key);
        let slot = self.entries.len();
        self.entries.push(Entry { priority, key });
        self.position[key as usize] = slot as u32;
        self.sift_up(slot);
    }

    /// Add many keys at once and restore heap order bottom-up
    pub(crate) fn extend(&mut self, items: impl IntoIterator<Item = (u32, f64)>) {
        for (key, priority) in items {
            debug_assert!(!self.contains(key), "key {} already queued", key);
            self.position[key as usize] = self.entries.len() as u32;
            self.entries.push(Entry { priority, key });
        }
        for slot in (0..self.entries.len() / 2).rev() {
            self.sift_down(slot);
        }
    }

    pub(crate) fn decrease(&mut self, key: u32, priority: f64) {
        let slot = self.position[key as usize];
        debug_assert!(slot != ABSENT, "key {} not queued", key);
        let slot = slot as usize;
        if priority < self.entries[slot].priority {
            self.entries[slot].priority = priority;
            self.sift_up(slot);
        }
    }

    /// Pop the minimum entry, or `None` when empty
    pub(crate) fn pop(&mut self) -> Option<(u32, f64)> {
        if self.entries.is_empty() {
            return None;
        }
        let last = self.entries.len() - 1;
        self.swap(0, last);
        let top = self.entries.pop()?;
        self.position[top.key as usize] = ABSENT;
        if !self.entries.is_empty() {
            self.sift_down(0);
        }
        Some((top.key, top.priority))
    }

    pub(crate) fn size(&self) -> usize {
        self.entries.len()
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.position[self.entries[a].key as usize] = a as u32;
        self.position[self.entries[b].key as usize] = b as u32;
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if !self.entries[slot].precedes(&self.entries[parent]) {
                break;
            }
            self.swap(slot, parent);
            slot = parent;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * slot + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.entries[right].precedes(&self.entries[left]) {
                right
            } else {
                left
            };
            if !self.entries[child].precedes(&self.entries[slot]) {
                break;
            }
            self.swap(slot, child);
            slot = child;
        }
    }
}

impl PriorityQueue for IndexedHeap {
    fn push(&mut self, key: u32, priority: f64) -> Handle {
        self.insert(key, priority);
        Handle(key)
    }

    fn decrease_priority(&mut self, handle: Handle, priority: f64) {
        self.decrease(handle.key(), priority);
    }

    fn pop_min(&mut self) -> u32 {
        match self.pop() {
            Some((key, _)) => key,
            None => panic!("pop_min on empty queue"),
        }
    }

    fn len(&self) -> usize {
        self.size()
    }
}
