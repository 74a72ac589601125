//! PID Poller Implementation
//!
//! Every tick issues one command per channel. The session queue serializes
//! them on the wire; the snapshot is assembled once every channel has either
//! been decoded or substituted. A tick that arrives while the previous poll is
//! still running is skipped, never stacked.

use crate::live::LiveData;
use futures::future::join_all;
use obd_protocol::{Codec, FallbackPolicy, ObdClient, Pid, Reading};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Configuration for the poller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Time between poll starts (default: 1 s)
    pub interval: Duration,
    /// Channels requested every tick, in request order
    pub pids: Vec<Pid>,
    /// What to substitute for unusable readings
    pub fallback: FallbackPolicy,
    /// Points kept per channel
    pub history_capacity: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            pids: Pid::ALL.to_vec(),
            fallback: FallbackPolicy::default(),
            history_capacity: ring_buffer::DEFAULT_CAPACITY,
        }
    }
}

/// All channels of one completed poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Completion time (Unix ms)
    pub timestamp_ms: u64,
    pub readings: Vec<Reading>,
}

impl Snapshot {
    pub fn get(&self, pid: Pid) -> Option<&Reading> {
        self.readings.iter().find(|r| r.pid == pid)
    }

    pub fn value(&self, pid: Pid) -> Option<f64> {
        self.get(pid).map(Reading::value)
    }

    /// Number of channels that had to be substituted
    pub fn fallback_count(&self) -> usize {
        self.readings.iter().filter(|r| r.sample.is_fallback()).count()
    }
}

/// Result of asking for a poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(Snapshot),
    /// A poll was already running
    Skipped,
}

/// Clears the in-progress flag however the poll ends
struct PollGuard<'a>(&'a AtomicBool);

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Polls one session and owns its live data
pub struct Poller {
    client: ObdClient,
    codec: Mutex<Codec>,
    config: PollerConfig,
    in_progress: AtomicBool,
    skipped: AtomicU64,
    live: Arc<RwLock<LiveData>>,
    updates: watch::Sender<Option<Snapshot>>,
}

impl Poller {
    pub fn new(client: ObdClient, config: PollerConfig) -> Self {
        let codec = Codec::new(config.fallback);
        Self::with_codec(client, config, codec)
    }

    /// Use a prepared codec (seeded fallback generator)
    pub fn with_codec(client: ObdClient, config: PollerConfig, codec: Codec) -> Self {
        let (updates, _) = watch::channel(None);
        info!(
            "Poller created for {} channel(s) every {:?}",
            config.pids.len(),
            config.interval
        );
        Self {
            client,
            codec: Mutex::new(codec),
            live: Arc::new(RwLock::new(LiveData::new(config.history_capacity))),
            config,
            in_progress: AtomicBool::new(false),
            skipped: AtomicU64::new(0),
            updates,
        }
    }

    /// Shared live data, mutated only by completed polls
    pub fn live(&self) -> Arc<RwLock<LiveData>> {
        self.live.clone()
    }

    /// Receive every completed snapshot
    pub fn subscribe(&self) -> watch::Receiver<Option<Snapshot>> {
        self.updates.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Ticks dropped because a poll was still running
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    fn skip(&self) -> PollOutcome {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("obd_poll_skipped_total").increment(1);
        debug!("Poll still running, skipping tick");
        PollOutcome::Skipped
    }

    /// Request every channel once
    pub async fn poll_once(&self) -> PollOutcome {
        if self.in_progress.swap(true, Ordering::AcqRel) {
            return self.skip();
        }
        let _guard = PollGuard(&self.in_progress);
        let started = Instant::now();

        let responses = join_all(
            self.config
                .pids
                .iter()
                .map(|pid| self.client.send_command(pid.command())),
        )
        .await;

        let timestamp_ms = obd_protocol::now_ms();
        let readings: Vec<Reading> = {
            let mut codec = self.codec.lock().unwrap_or_else(|p| p.into_inner());
            self.config
                .pids
                .iter()
                .zip(responses)
                .map(|(pid, response)| codec.read(*pid, response, timestamp_ms))
                .collect()
        };
        let snapshot = Snapshot {
            timestamp_ms,
            readings,
        };

        self.live.write().await.record(&snapshot);
        self.updates.send_replace(Some(snapshot.clone()));

        metrics::histogram!("obd_poll_duration_seconds").record(started.elapsed().as_secs_f64());
        debug!(
            "Poll complete in {:?} ({} substituted)",
            started.elapsed(),
            snapshot.fallback_count()
        );
        PollOutcome::Completed(snapshot)
    }

    /// Poll on every tick until `shutdown` fires or the session ends
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("Starting poller");
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut current: Option<JoinHandle<PollOutcome>> = None;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = self.client.closed() => {
                    info!("Session closed, stopping poller");
                    break;
                }
                _ = interval.tick() => {
                    if self.is_polling() {
                        self.skip();
                        continue;
                    }
                    let poller = self.clone();
                    current = Some(tokio::spawn(async move { poller.poll_once().await }));
                }
            }
        }

        if let Some(handle) = current {
            handle.abort();
        }
        info!("Poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::mock::MockAdapter;
    use obd_protocol::{ClientConfig, FallbackGenerator, InitSequence, Sample};

    async fn client(adapter: &MockAdapter) -> ObdClient {
        let config = ClientConfig {
            init: InitSequence::minimal(),
            ..Default::default()
        };
        ObdClient::connect(adapter, &adapter.device(), config)
            .await
            .unwrap()
    }

    fn poller(client: ObdClient) -> Poller {
        let codec = Codec::with_generator(FallbackGenerator::seeded(FallbackPolicy::Simulate, 7));
        Poller::with_codec(client, PollerConfig::default(), codec)
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_has_every_channel() {
        let adapter = MockAdapter::new();
        adapter.set_response("010D", "41 0D 3C");
        let poller = poller(client(&adapter).await);

        let PollOutcome::Completed(snapshot) = poller.poll_once().await else {
            panic!("poll was skipped");
        };
        assert_eq!(snapshot.readings.len(), Pid::ALL.len());
        assert_eq!(snapshot.value(Pid::Speed), Some(60.0));
        assert_eq!(snapshot.value(Pid::BatteryVoltage), Some(12.5));
        assert_eq!(snapshot.fallback_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channels_degrade_independently() {
        let adapter = MockAdapter::new();
        adapter.set_response("0105", "NO DATA");
        adapter.set_silent("0123");
        let poller = poller(client(&adapter).await);

        let PollOutcome::Completed(snapshot) = poller.poll_once().await else {
            panic!("poll was skipped");
        };
        assert_eq!(snapshot.fallback_count(), 2);

        let coolant = snapshot.get(Pid::CoolantTemp).unwrap();
        assert!(Pid::CoolantTemp.nominal_range().contains(coolant.value()));
        assert!(matches!(
            snapshot.get(Pid::FuelRailPressure).unwrap().sample,
            Sample::Fallback { .. }
        ));
        assert!(matches!(snapshot.get(Pid::Rpm).unwrap().sample, Sample::Live(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_poll_is_skipped() {
        let adapter = MockAdapter::new();
        let poller = poller(client(&adapter).await);

        let (a, b) = tokio::join!(poller.poll_once(), poller.poll_once());
        assert!(matches!(a, PollOutcome::Completed(_)));
        assert_eq!(b, PollOutcome::Skipped);
        assert_eq!(poller.skipped_ticks(), 1);
        assert!(!poller.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_session_substitutes_everything() {
        let adapter = MockAdapter::new();
        let client = client(&adapter).await;
        client.disconnect().await;
        let poller = poller(client);

        let PollOutcome::Completed(snapshot) = poller.poll_once().await else {
            panic!("poll was skipped");
        };
        assert_eq!(snapshot.fallback_count(), Pid::ALL.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_data_and_updates() {
        let adapter = MockAdapter::new();
        let poller = poller(client(&adapter).await);
        let mut updates = poller.subscribe();

        poller.poll_once().await;
        poller.poll_once().await;

        assert!(updates.has_changed().unwrap());
        assert!(updates.borrow_and_update().is_some());
        let live = poller.live();
        let live = live.read().await;
        assert_eq!(live.series("rpm").len(), 2);
        assert_eq!(live.boost_psi, Some(0.0));
    }
}
