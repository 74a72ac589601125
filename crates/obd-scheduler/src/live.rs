//! Latest values and recent history

use crate::poller::Snapshot;
use obd_protocol::Pid;
use ring_buffer::{SeriesMap, Timestamped};
use serde::{Deserialize, Serialize};

/// History key of the derived boost channel
pub const BOOST_METRIC: &str = "boost_psi";

/// Standard atmosphere (kPa)
const ATMOSPHERIC_KPA: f64 = 101.3;
const KPA_TO_PSI: f64 = 0.145038;

/// Turbo boost above atmosphere in psi, never negative
pub fn boost_psi(map_kpa: f64) -> f64 {
    let psi = (map_kpa - ATMOSPHERIC_KPA).max(0.0) * KPA_TO_PSI;
    (psi * 10.0).round() / 10.0
}

/// One retained value of one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Capture time (Unix ms)
    pub timestamp_ms: u64,
    pub value: f64,
    /// Value was substituted rather than read
    pub fallback: bool,
}

impl Timestamped for HistoryPoint {
    fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}

/// What the dashboard displays
#[derive(Debug, Clone, Serialize)]
pub struct LiveData {
    pub snapshot: Option<Snapshot>,
    pub boost_psi: Option<f64>,
    pub history: SeriesMap<&'static str, HistoryPoint>,
}

impl LiveData {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            snapshot: None,
            boost_psi: None,
            history: SeriesMap::new(history_capacity),
        }
    }

    /// Fold a completed poll into the current values and history
    pub fn record(&mut self, snapshot: &Snapshot) {
        for reading in &snapshot.readings {
            self.history.push(
                reading.pid.name(),
                HistoryPoint {
                    timestamp_ms: reading.timestamp_ms,
                    value: reading.value(),
                    fallback: reading.sample.is_fallback(),
                },
            );
        }

        self.boost_psi = None;
        if let Some(map) = snapshot.get(Pid::IntakeManifoldPressure) {
            let boost = boost_psi(map.value());
            self.history.push(
                BOOST_METRIC,
                HistoryPoint {
                    timestamp_ms: map.timestamp_ms,
                    value: boost,
                    fallback: map.sample.is_fallback(),
                },
            );
            self.boost_psi = Some(boost);
        }

        self.snapshot = Some(snapshot.clone());
    }

    /// Values of one channel, oldest first
    pub fn series(&self, metric: &str) -> Vec<HistoryPoint> {
        self.history
            .keys()
            .find(|k| **k == metric)
            .and_then(|k| self.history.get(k))
            .map(|buffer| buffer.to_vec())
            .unwrap_or_default()
    }
}

impl Default for LiveData {
    fn default() -> Self {
        Self::new(ring_buffer::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{FallbackReason, Reading, Sample};

    fn snapshot(ts: u64, map: f64) -> Snapshot {
        Snapshot {
            timestamp_ms: ts,
            readings: vec![
                Reading {
                    pid: Pid::Rpm,
                    sample: Sample::Live(850.0),
                    timestamp_ms: ts,
                },
                Reading {
                    pid: Pid::IntakeManifoldPressure,
                    sample: Sample::Fallback {
                        value: map,
                        reason: FallbackReason::NoData,
                    },
                    timestamp_ms: ts,
                },
            ],
        }
    }

    #[test]
    fn test_boost_conversion() {
        assert_eq!(boost_psi(101.0), 0.0);
        assert_eq!(boost_psi(201.3), 14.5);
    }

    #[test]
    fn test_history_keeps_last_thirty() {
        let mut live = LiveData::default();
        for i in 0..40 {
            live.record(&snapshot(i, 150.0));
        }
        let rpm = live.series("rpm");
        assert_eq!(rpm.len(), 30);
        assert_eq!(rpm[0].timestamp_ms, 10);
        assert_eq!(live.series(BOOST_METRIC).len(), 30);
        assert_eq!(live.snapshot.as_ref().map(|s| s.timestamp_ms), Some(39));
    }

    #[test]
    fn test_fallback_flag_in_history() {
        let mut live = LiveData::default();
        live.record(&snapshot(1, 101.0));
        assert!(live.series("map_pressure")[0].fallback);
        assert!(!live.series("rpm")[0].fallback);
        assert_eq!(live.boost_psi, Some(0.0));
        assert!(live.series("unknown").is_empty());
    }

    #[test]
    fn test_serializes_history_by_channel() {
        let mut live = LiveData::default();
        live.record(&snapshot(5, 150.0));
        let json = serde_json::to_value(&live).unwrap();
        assert_eq!(json["history"]["rpm"][0]["value"], 850.0);
        assert_eq!(json["boost_psi"], 7.1);
    }
}
