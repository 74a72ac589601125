//! Alerting System
//!
//! Maps live values onto normal/warning/danger status and deduplicates the
//! resulting alerts with a per-key cooldown.

mod manager;
mod thresholds;

pub use manager::{Alert, AlertConfig, AlertManager, AlertState};
pub use thresholds::{Direction, Status, Threshold, Thresholds};
