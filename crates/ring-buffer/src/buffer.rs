//! Ring Buffer Implementation

use serde::ser::{Serialize, Serializer};
use std::collections::VecDeque;

/// Default buffer capacity (30 points = 30 s at 1 Hz)
pub const DEFAULT_CAPACITY: usize = 30;

/// Values that carry their capture time
pub trait Timestamped {
    /// Capture time (Unix ms)
    fn timestamp_ms(&self) -> u64;
}

/// Bounded buffer; pushing into a full buffer drops the oldest value
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T> {
    storage: VecDeque<T>,
    capacity: usize,
    /// Total values written (for statistics)
    total_written: u64,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            storage: VecDeque::with_capacity(capacity),
            capacity,
            total_written: 0,
        }
    }

    /// Create a buffer with default capacity (30 points)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Append a value, evicting the oldest when full
    pub fn push(&mut self, value: T) {
        if self.storage.len() == self.capacity {
            self.storage.pop_front();
        }
        self.storage.push_back(value);
        self.total_written += 1;
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.storage.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.storage.len() as f64 / self.capacity as f64
    }

    /// Oldest retained value
    pub fn first(&self) -> Option<&T> {
        self.storage.front()
    }

    /// Most recent value
    pub fn latest(&self) -> Option<&T> {
        self.storage.back()
    }

    /// Values oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.storage.iter()
    }

    /// Total values ever pushed, evicted ones included
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    pub fn clear(&mut self) {
        self.storage.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Read the last N values (most recent first)
    pub fn read_last(&self, count: usize) -> Vec<T> {
        self.storage.iter().rev().take(count).cloned().collect()
    }

    /// Snapshot oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.storage.iter().cloned().collect()
    }
}

impl<T: Clone + Timestamped> RingBuffer<T> {
    /// Values captured at or after `cutoff_ms`, oldest first
    pub fn read_since(&self, cutoff_ms: u64) -> Vec<T> {
        self.storage
            .iter()
            .filter(|v| v.timestamp_ms() >= cutoff_ms)
            .cloned()
            .collect()
    }
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl<T: Serialize> Serialize for RingBuffer<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.storage.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Point {
        timestamp_ms: u64,
        value: f64,
    }

    impl Timestamped for Point {
        fn timestamp_ms(&self) -> u64 {
            self.timestamp_ms
        }
    }

    #[test]
    fn test_push_and_read() {
        let mut buffer = RingBuffer::new(10);
        for i in 0..5 {
            buffer.push(i * 100);
        }

        assert_eq!(buffer.len(), 5);
        let values = buffer.read_last(3);
        assert_eq!(values, vec![400, 300, 200]);
        assert_eq!(buffer.latest(), Some(&400));
    }

    #[test]
    fn test_overwrite_oldest() {
        let mut buffer = RingBuffer::with_default_capacity();
        for i in 1..=40 {
            buffer.push(i);
        }

        assert_eq!(buffer.len(), 30);
        assert!(buffer.is_full());
        assert_eq!(buffer.first(), Some(&11));
        assert_eq!(buffer.latest(), Some(&40));
        assert_eq!(buffer.total_written(), 40);
    }

    #[test]
    fn test_fill_ratio() {
        let mut buffer = RingBuffer::new(100);
        assert_eq!(buffer.fill_ratio(), 0.0);
        for _ in 0..50 {
            buffer.push(());
        }
        assert!((buffer.fill_ratio() - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_read_since() {
        let mut buffer = RingBuffer::new(5);
        for i in 0..5 {
            buffer.push(Point {
                timestamp_ms: i * 1000,
                value: i as f64,
            });
        }
        let recent = buffer.read_since(3000);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].value, 3.0);
    }

    #[test]
    fn test_serializes_oldest_first() {
        let mut buffer = RingBuffer::new(2);
        buffer.push(1);
        buffer.push(2);
        buffer.push(3);
        assert_eq!(serde_json::to_string(&buffer).unwrap(), "[2,3]");
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity(capacity in 1usize..64, pushes in 0usize..256) {
            let mut buffer = RingBuffer::new(capacity);
            for i in 0..pushes {
                buffer.push(i);
            }
            prop_assert_eq!(buffer.len(), pushes.min(capacity));
            if pushes > 0 {
                prop_assert_eq!(buffer.latest(), Some(&(pushes - 1)));
                prop_assert_eq!(buffer.first(), Some(&pushes.saturating_sub(capacity)));
            }
        }
    }
}
