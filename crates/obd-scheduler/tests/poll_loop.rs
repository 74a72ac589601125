use obd_protocol::mock::MockAdapter;
use obd_protocol::{ClientConfig, InitSequence, ObdClient};
use obd_scheduler::{Poller, PollerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn connect(adapter: &MockAdapter) -> ObdClient {
    let config = ClientConfig {
        init: InitSequence::minimal(),
        ..Default::default()
    };
    ObdClient::connect(adapter, &adapter.device(), config)
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_slow_adapter_skips_ticks() {
    let adapter = MockAdapter::new();
    let client = connect(&adapter).await;
    // nine channels at 300 ms each outlast two ticks
    adapter.set_latency(Duration::from_millis(300));

    let poller = Arc::new(Poller::new(client, PollerConfig::default()));
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(poller.clone().run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(5_500)).await;
    shutdown.cancel();
    task.await.unwrap();

    assert!(poller.skipped_ticks() >= 2, "skipped {}", poller.skipped_ticks());
    let live = poller.live();
    let rpm = live.read().await.series("rpm");
    assert!(!rpm.is_empty());
    assert!(rpm.len() <= 2);
}

#[tokio::test(start_paused = true)]
async fn test_poller_stops_when_session_ends() {
    let adapter = MockAdapter::new();
    let client = connect(&adapter).await;

    let poller = Arc::new(Poller::new(client.clone(), PollerConfig::default()));
    let task = tokio::spawn(poller.clone().run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    client.disconnect().await;
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("poller did not stop")
        .unwrap();

    let live = poller.live();
    assert!(live.read().await.series("rpm").len() >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_updates_are_published() {
    let adapter = MockAdapter::new();
    let client = connect(&adapter).await;
    let poller = Arc::new(Poller::new(client, PollerConfig::default()));
    let mut updates = poller.subscribe();

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(poller.clone().run(shutdown.clone()));

    updates.changed().await.unwrap();
    let snapshot = updates.borrow().clone().unwrap();
    assert_eq!(snapshot.readings.len(), 9);

    shutdown.cancel();
    task.await.unwrap();
}
