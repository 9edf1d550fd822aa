//! Fixed-capacity FIFO history.
//!
//! Used by every rate consumer to keep the most recent derived samples.
//! Appending at capacity evicts the oldest element; iteration is always
//! oldest-first.

use serde::{Serialize, Serializer};
use std::collections::VecDeque;

/// Default capacity: 60 samples, about two minutes at a 2-second interval.
pub const DEFAULT_CAPACITY: usize = 60;

/// Bounded history of samples in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T> {
    /// Maximum number of items to keep
    capacity: usize,
    /// Items in arrival order
    items: VecDeque<T>,
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer holding at most `capacity` items.
    ///
    /// A capacity of zero is clamped to one so that `latest()` always
    /// reflects the last push.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an item, returning the evicted oldest item if at capacity.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Most recently appended item
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest retained item
    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Iterate oldest-first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// Get the most recent N items, newest first
    pub fn recent(&self, n: usize) -> Vec<&T> {
        self.items.iter().rev().take(n).collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    /// Clear all items
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy the retained items out, oldest-first
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T> Extend<T> for RingBuffer<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// Serialized as a plain oldest-first sequence for UI consumers.
impl<T: Serialize> Serialize for RingBuffer<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.items.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_basic() {
        let mut buffer = RingBuffer::new(10);
        assert!(buffer.is_empty());

        buffer.push(1);
        buffer.push(2);

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.latest(), Some(&2));
        assert_eq!(buffer.oldest(), Some(&1));
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut buffer = RingBuffer::new(3);

        assert_eq!(buffer.push(1), None);
        assert_eq!(buffer.push(2), None);
        assert_eq!(buffer.push(3), None);
        assert!(buffer.is_full());
        assert_eq!(buffer.push(4), Some(1));

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.to_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn test_ring_buffer_keeps_most_recent_n() {
        let capacity = 60;
        let extra = 17;
        let mut buffer = RingBuffer::new(capacity);
        buffer.extend(0..(capacity + extra));

        assert_eq!(buffer.len(), capacity);
        let expected: Vec<usize> = (extra..capacity + extra).collect();
        assert_eq!(buffer.to_vec(), expected);
    }

    #[test]
    fn test_recent_is_newest_first() {
        let mut buffer = RingBuffer::new(5);
        buffer.extend(["a", "b", "c"]);

        assert_eq!(buffer.recent(2), vec![&"c", &"b"]);
        assert_eq!(buffer.recent(10).len(), 3);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buffer = RingBuffer::new(0);
        buffer.push('x');
        buffer.push('y');

        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.latest(), Some(&'y'));
    }

    #[test]
    fn test_serializes_as_sequence() {
        let mut buffer = RingBuffer::new(2);
        buffer.extend([1, 2, 3]);

        let json = serde_json::to_string(&buffer).unwrap();
        assert_eq!(json, "[2,3]");
    }
}
