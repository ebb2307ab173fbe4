//! Bounded min-heap for "best K of N" selections.
//!
//! The root is always the worst retained item, so deciding whether a new
//! candidate makes the cut is a single comparison. Keeping K items out of N
//! costs O(N log K).

use std::cmp::Ordering;

/// A binary min-heap holding at most `capacity` items.
///
/// Ordering comes from an injected comparator; "greater" means "better".
pub struct PriorityQueue<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    items: Vec<T>,
    capacity: usize,
    compare: F,
}

impl<T, F> PriorityQueue<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    pub fn new(capacity: usize, compare: F) -> Self {
        PriorityQueue {
            items: Vec::with_capacity(capacity),
            capacity,
            compare,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Offer an item.
    ///
    /// Under capacity it is always kept. At capacity it replaces the current
    /// minimum only if strictly greater; otherwise it is discarded. Returns
    /// whether the item was kept.
    pub fn push(&mut self, item: T) -> bool {
        if self.capacity == 0 {
            return false;
        }

        if self.items.len() < self.capacity {
            self.items.push(item);
            self.sift_up(self.items.len() - 1);
            return true;
        }

        if (self.compare)(&item, &self.items[0]) != Ordering::Greater {
            return false;
        }

        self.items[0] = item;
        self.sift_down(0);
        true
    }

    /// The current minimum.
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Remove and return the current minimum.
    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let min = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        min
    }

    /// Drain the queue, best item first.
    pub fn into_sorted_vec(mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.items.len());
        while let Some(item) = self.pop() {
            out.push(item);
        }
        out.reverse();
        out
    }

    fn less(&self, a: usize, b: usize) -> bool {
        (self.compare)(&self.items[a], &self.items[b]) == Ordering::Less
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.less(idx, parent) {
                break;
            }
            self.items.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut smallest = idx;

            if left < len && self.less(left, smallest) {
                smallest = left;
            }
            if right < len && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.items.swap(idx, smallest);
            idx = smallest;
        }
    }
}
