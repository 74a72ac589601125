//! Alert Manager Implementation

use crate::thresholds::{Status, Thresholds};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Fired alerts kept for display
const MAX_RECENT_ALERTS: usize = 50;

/// Alert configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Cooldown period between duplicate alerts (seconds)
    pub cooldown_seconds: u64,
    pub thresholds: Thresholds,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 30,
            thresholds: Thresholds::default(),
        }
    }
}

/// State of an alert key
#[derive(Debug, Clone)]
pub struct AlertState {
    /// Last time this alert was fired
    pub last_fired: Instant,
    /// Number of times fired
    pub fire_count: usize,
    /// Whether alert is acknowledged
    pub acknowledged: bool,
}

/// A fired alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Deduplication key, `<metric>-<level>`
    pub key: String,
    pub metric: String,
    pub level: Status,
    pub value: f64,
    pub message: String,
    /// Time the alert fired (Unix ms)
    pub timestamp_ms: u64,
    pub acknowledged: bool,
}

fn describe(metric: &str, level: Status) -> &'static str {
    match (metric, level) {
        ("coolant_temp", Status::Danger) => "Engine overheating! Stop engine immediately",
        ("coolant_temp", _) => "High engine temperature, monitor closely",
        ("battery_voltage", Status::Danger) => "Low battery voltage! Check charging system",
        ("battery_voltage", _) => "Low battery voltage, check battery condition",
        ("fuel_rail_pressure", Status::Danger) => "Low fuel pressure! Check fuel system",
        ("fuel_rail_pressure", _) => "Low fuel pressure, monitor fuel system",
        ("battery_soc", Status::Danger) => "Very low battery SOC! Charge immediately",
        ("battery_soc", _) => "Low battery SOC, consider charging",
        _ => "Value out of range",
    }
}

/// Alert manager for threshold checks and deduplication
pub struct AlertManager {
    config: AlertConfig,
    /// Alert states by key
    states: HashMap<String, AlertState>,
    recent: VecDeque<Alert>,
}

impl AlertManager {
    /// Create a new alert manager
    pub fn new(config: AlertConfig) -> Self {
        info!("Creating alert manager with config: {:?}", config);
        Self {
            config,
            states: HashMap::new(),
            recent: VecDeque::new(),
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.config.thresholds
    }

    /// Check if a key is outside its cooldown window
    pub fn should_fire(&self, key: &str, now: Instant) -> bool {
        let cooldown = Duration::from_secs(self.config.cooldown_seconds);
        match self.states.get(key) {
            Some(state) if now.saturating_duration_since(state.last_fired) < cooldown => {
                debug!("Alert {} suppressed: in cooldown period", key);
                false
            }
            _ => true,
        }
    }

    /// Record that an alert was fired
    pub fn record_fire(&mut self, key: &str, now: Instant) {
        let state = self.states.entry(key.to_string()).or_insert(AlertState {
            last_fired: now,
            fire_count: 0,
            acknowledged: false,
        });
        state.last_fired = now;
        state.fire_count += 1;
        state.acknowledged = false;

        info!("Alert recorded: {} (count: {})", key, state.fire_count);
    }

    /// Check one value, returning an alert if it should be raised now
    pub fn evaluate(&mut self, metric: &str, value: f64, timestamp_ms: u64) -> Option<Alert> {
        self.evaluate_at(metric, value, timestamp_ms, Instant::now())
    }

    /// [`evaluate`](Self::evaluate) against an explicit clock
    pub fn evaluate_at(
        &mut self,
        metric: &str,
        value: f64,
        timestamp_ms: u64,
        now: Instant,
    ) -> Option<Alert> {
        let level = self.config.thresholds.status(metric, value);
        if level == Status::Normal {
            return None;
        }

        let key = format!("{}-{}", metric, level.as_str());
        if !self.should_fire(&key, now) {
            return None;
        }
        self.record_fire(&key, now);

        let alert = Alert {
            key,
            metric: metric.to_string(),
            level,
            value,
            message: format!("{} ({})", describe(metric, level), value),
            timestamp_ms,
            acknowledged: false,
        };
        warn!("{}", alert.message);
        metrics::counter!("alerts_fired_total", "level" => level.as_str()).increment(1);

        if self.recent.len() == MAX_RECENT_ALERTS {
            self.recent.pop_front();
        }
        self.recent.push_back(alert.clone());
        Some(alert)
    }

    /// Acknowledge an alert key
    pub fn acknowledge(&mut self, key: &str) -> bool {
        let Some(state) = self.states.get_mut(key) else {
            return false;
        };
        state.acknowledged = true;
        for alert in self.recent.iter_mut().filter(|a| a.key == key) {
            alert.acknowledged = true;
        }
        info!("Alert acknowledged: {}", key);
        true
    }

    /// Get pending (unacknowledged) alerts, oldest first
    pub fn pending(&self) -> Vec<Alert> {
        self.recent
            .iter()
            .filter(|a| !a.acknowledged)
            .cloned()
            .collect()
    }

    /// Every retained alert, oldest first
    pub fn recent(&self) -> Vec<Alert> {
        self.recent.iter().cloned().collect()
    }

    pub fn state(&self, key: &str) -> Option<&AlertState> {
        self.states.get(key)
    }

    /// Clear all alert states
    pub fn clear(&mut self) {
        self.states.clear();
        self.recent.clear();
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_value_does_not_fire() {
        let mut manager = AlertManager::default();
        assert!(manager.evaluate("coolant_temp", 88.0, 0).is_none());
        assert!(manager.evaluate("rpm", 6500.0, 0).is_none());
    }

    #[test]
    fn test_deduplication() {
        let mut manager = AlertManager::default();
        let start = Instant::now();

        let alert = manager.evaluate_at("coolant_temp", 106.0, 0, start).unwrap();
        assert_eq!(alert.key, "coolant_temp-danger");
        assert_eq!(alert.level, Status::Danger);

        // Immediate duplicate should not fire
        assert!(manager
            .evaluate_at("coolant_temp", 107.0, 1, start + Duration::from_secs(10))
            .is_none());
        assert!(manager
            .evaluate_at("coolant_temp", 107.0, 2, start + Duration::from_secs(31))
            .is_some());
        assert_eq!(manager.state("coolant_temp-danger").unwrap().fire_count, 2);
    }

    #[test]
    fn test_levels_have_separate_cooldowns() {
        let mut manager = AlertManager::default();
        let now = Instant::now();
        assert!(manager.evaluate_at("battery_voltage", 12.1, 0, now).is_some());
        assert!(manager.evaluate_at("battery_voltage", 11.9, 0, now).is_some());
        assert!(manager.evaluate_at("battery_voltage", 12.1, 0, now).is_none());
    }

    #[test]
    fn test_acknowledgement() {
        let mut manager = AlertManager::default();
        manager.evaluate("fuel_rail_pressure", 100.0, 0).unwrap();
        assert_eq!(manager.pending().len(), 1);

        assert!(manager.acknowledge("fuel_rail_pressure-danger"));
        assert!(manager.state("fuel_rail_pressure-danger").unwrap().acknowledged);
        assert!(manager.pending().is_empty());
        assert_eq!(manager.recent().len(), 1);
        assert!(!manager.acknowledge("unknown"));
    }

    #[test]
    fn test_alert_serializes() {
        let mut manager = AlertManager::default();
        let alert = manager.evaluate("coolant_temp", 96.0, 1_000).unwrap();
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["metric"], "coolant_temp");
    }
}
