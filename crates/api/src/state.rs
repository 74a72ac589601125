//! Shared application state

use crate::config::AppConfig;
use alerting::{Alert, AlertManager};
use metrics_exporter_prometheus::PrometheusHandle;
use obd_protocol::{ConnectionManager, ObdClient};
use obd_scheduler::{Poller, Snapshot};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub type SharedState = Arc<AppState>;

/// Running poll loop of the active session
pub struct PollerHandle {
    pub poller: Arc<Poller>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

pub struct AppState {
    pub manager: ConnectionManager,
    pub poller: RwLock<Option<PollerHandle>>,
    pub alerts: Arc<Mutex<AlertManager>>,
    pub config: AppConfig,
    pub version: String,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(manager: ConnectionManager, config: AppConfig) -> Self {
        Self {
            manager,
            poller: RwLock::new(None),
            alerts: Arc::new(Mutex::new(AlertManager::new(config.alerts.clone()))),
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Current poller, if a session is being polled
    pub async fn poller(&self) -> Option<Arc<Poller>> {
        self.poller.read().await.as_ref().map(|h| h.poller.clone())
    }

    /// Replace the poll loop with one bound to `client`
    pub async fn start_polling(&self, client: ObdClient) {
        self.stop_polling().await;

        let poller = Arc::new(Poller::new(client, self.config.polling.poller_config()));
        let shutdown = CancellationToken::new();
        let run = tokio::spawn(poller.clone().run(shutdown.clone()));
        let evaluate = tokio::spawn(evaluate_alerts(
            poller.subscribe(),
            self.alerts.clone(),
            shutdown.clone(),
        ));

        *self.poller.write().await = Some(PollerHandle {
            poller,
            shutdown,
            tasks: vec![run, evaluate],
        });
        info!("Polling started");
    }

    pub async fn stop_polling(&self) {
        let handle = self.poller.write().await.take();
        if let Some(handle) = handle {
            handle.shutdown.cancel();
            for task in handle.tasks {
                let _ = task.await;
            }
            info!("Polling stopped");
        }
    }
}

/// Run every completed snapshot through the alert thresholds
async fn evaluate_alerts(
    mut updates: watch::Receiver<Option<Snapshot>>,
    alerts: Arc<Mutex<AlertManager>>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let Some(snapshot) = updates.borrow_and_update().clone() else {
                    continue;
                };
                for alert in raise_alerts(&mut *alerts.lock().await, &snapshot) {
                    debug!("Raised {}", alert.key);
                }
            }
        }
    }
}

/// Alerts due for the live readings of one snapshot; substituted values
/// never raise alerts
pub fn raise_alerts(alerts: &mut AlertManager, snapshot: &Snapshot) -> Vec<Alert> {
    snapshot
        .readings
        .iter()
        .filter(|reading| !reading.sample.is_fallback())
        .filter_map(|reading| {
            alerts.evaluate(reading.pid.name(), reading.value(), reading.timestamp_ms)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{FallbackReason, Pid, Reading, Sample};

    fn reading(pid: Pid, sample: Sample) -> Reading {
        Reading {
            pid,
            sample,
            timestamp_ms: 1,
        }
    }

    #[test]
    fn test_only_live_readings_raise_alerts() {
        let mut alerts = AlertManager::default();
        let snapshot = Snapshot {
            timestamp_ms: 1,
            readings: vec![
                reading(
                    Pid::BatteryVoltage,
                    Sample::Fallback {
                        value: 12.2,
                        reason: FallbackReason::NoData,
                    },
                ),
                reading(Pid::CoolantTemp, Sample::Live(110.0)),
            ],
        };

        let raised = raise_alerts(&mut alerts, &snapshot);
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].key, "coolant_temp-danger");
        assert!(alerts.state("battery_voltage-warning").is_none());
    }
}
