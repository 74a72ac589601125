//! Bounded history buffers
//!
//! [`RingBuffer`] keeps the most recent N values of one series and silently
//! evicts the oldest; [`SeriesMap`] keeps one buffer per metric.

mod buffer;
mod series;

pub use buffer::{RingBuffer, Timestamped, DEFAULT_CAPACITY};
pub use series::SeriesMap;
