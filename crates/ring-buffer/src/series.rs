//! One ring buffer per metric

use crate::buffer::RingBuffer;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::hash::Hash;

/// Keyed set of equally sized ring buffers
#[derive(Debug, Clone)]
pub struct SeriesMap<K, T> {
    series: HashMap<K, RingBuffer<T>>,
    capacity: usize,
}

impl<K: Eq + Hash, T> SeriesMap<K, T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            series: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append to the series for `key`, creating it on first use
    pub fn push(&mut self, key: K, value: T) {
        let capacity = self.capacity;
        self.series
            .entry(key)
            .or_insert_with(|| RingBuffer::new(capacity))
            .push(value);
    }

    pub fn get(&self, key: &K) -> Option<&RingBuffer<T>> {
        self.series.get(key)
    }

    /// Most recent value of one series
    pub fn latest(&self, key: &K) -> Option<&T> {
        self.series.get(key).and_then(RingBuffer::latest)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.series.keys()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }
}

impl<K: Eq + Hash, T> Default for SeriesMap<K, T> {
    fn default() -> Self {
        Self::new(crate::DEFAULT_CAPACITY)
    }
}

impl<K: Eq + Hash + Serialize, T: Serialize> Serialize for SeriesMap<K, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.series.len()))?;
        for (key, buffer) in &self.series {
            map.serialize_entry(key, buffer)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_are_independent() {
        let mut series = SeriesMap::new(3);
        for i in 0..5 {
            series.push("rpm", i);
        }
        series.push("speed", 42);

        assert_eq!(series.get(&"rpm").map(RingBuffer::len), Some(3));
        assert_eq!(series.latest(&"rpm"), Some(&4));
        assert_eq!(series.latest(&"speed"), Some(&42));
        assert!(series.get(&"boost").is_none());
    }

    #[test]
    fn test_serializes_as_object() {
        let mut series = SeriesMap::new(2);
        series.push("rpm".to_string(), 850);
        let json = serde_json::to_value(&series).unwrap();
        assert_eq!(json["rpm"], serde_json::json!([850]));
    }
}
