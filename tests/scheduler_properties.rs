//! Scheduler behaviour against in-memory sinks

use async_trait::async_trait;
use clock_sync_gateway::metrics::SyncMetrics;
use clock_sync_gateway::registry::SinkError;
use clock_sync_gateway::scheduler::epoch_millis;
use clock_sync_gateway::{
    BroadcastScheduler, Connection, MessageSink, Registry, SchedulerSettings, ShardAssignment,
    TickOutcome,
};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Clone, Default)]
struct RecordingSink {
    sent: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    fn messages(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send_text(&self, payload: String) -> Result<(), SinkError> {
        self.sent.lock().push(payload);
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl MessageSink for FailingSink {
    async fn send_text(&self, _payload: String) -> Result<(), SinkError> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone").into())
    }
}

struct HangingSink;

#[async_trait]
impl MessageSink for HangingSink {
    async fn send_text(&self, _payload: String) -> Result<(), SinkError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

fn settings(threshold: usize, interval: Duration) -> SchedulerSettings {
    SchedulerSettings {
        delay: Duration::ZERO,
        interval,
        threshold,
        send_timeout: Duration::from_millis(200),
    }
}

fn registry_with(sinks: &[RecordingSink]) -> Arc<Registry> {
    let registry = Arc::new(Registry::new(10, ShardAssignment::Random));
    for sink in sinks {
        registry.register(Arc::new(Connection::new(sink.clone())));
    }
    registry
}

#[tokio::test]
async fn below_threshold_produces_no_sends() {
    let sinks: Vec<RecordingSink> = (0..4).map(|_| RecordingSink::default()).collect();
    let registry = registry_with(&sinks);
    let scheduler = BroadcastScheduler::new(
        registry,
        settings(5, Duration::from_millis(10)),
        SyncMetrics::detached(),
    );

    for _ in 0..3 {
        assert_eq!(scheduler.tick().await, TickOutcome::Waiting { total: 4 });
    }
    assert!(sinks.iter().all(|s| s.messages().is_empty()));
}

#[tokio::test]
async fn exactly_threshold_sends_one_timestamp_each() {
    let sinks: Vec<RecordingSink> = (0..5).map(|_| RecordingSink::default()).collect();
    let registry = registry_with(&sinks);
    let scheduler = BroadcastScheduler::new(
        registry,
        settings(5, Duration::from_millis(10)),
        SyncMetrics::detached(),
    );

    let before = epoch_millis();
    let outcome = scheduler.tick().await;
    let after = epoch_millis();

    match outcome {
        TickOutcome::Broadcast(report) => {
            assert_eq!(report.total, 5);
            assert_eq!(report.delivered, 5);
            assert_eq!(report.failed, 0);
        }
        other => panic!("expected broadcast, got {other:?}"),
    }

    for sink in &sinks {
        let messages = sink.messages();
        assert_eq!(messages.len(), 1);
        let ts: u64 = messages[0].parse().expect("payload is a decimal integer");
        assert!(ts >= before && ts <= after, "{ts} not within [{before}, {after}]");
    }
}

#[tokio::test]
async fn repeated_ticks_rebroadcast_fresh_timestamps() {
    let sink = RecordingSink::default();
    let registry = registry_with(&[sink.clone()]);
    let scheduler = BroadcastScheduler::new(
        registry,
        settings(1, Duration::from_millis(10)),
        SyncMetrics::detached(),
    );
    let (tx, rx) = broadcast::channel(1);

    let handle = tokio::spawn(scheduler.run(rx));
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();
    handle.await.unwrap();

    let stamps: Vec<u64> = sink
        .messages()
        .iter()
        .map(|m| m.parse().unwrap())
        .collect();
    assert!(stamps.len() >= 3, "only {} broadcasts", stamps.len());
    for pair in stamps.windows(2) {
        assert!(pair[1] > pair[0], "timestamps not increasing: {stamps:?}");
    }
}

#[tokio::test]
async fn failing_connection_does_not_block_the_rest() {
    let healthy: Vec<RecordingSink> = (0..6).map(|_| RecordingSink::default()).collect();
    let registry = registry_with(&healthy);
    let broken = Arc::new(Connection::new(FailingSink));
    let broken_shard = registry.register(Arc::clone(&broken));

    let scheduler = BroadcastScheduler::new(
        Arc::clone(&registry),
        settings(7, Duration::from_millis(10)),
        SyncMetrics::detached(),
    );

    match scheduler.tick().await {
        TickOutcome::Broadcast(report) => {
            assert_eq!(report.delivered, 6);
            assert_eq!(report.failed, 1);
        }
        other => panic!("expected broadcast, got {other:?}"),
    }
    assert!(healthy.iter().all(|s| s.messages().len() == 1));

    // Still counted until its own session unregisters it, but skipped
    assert!(broken.is_closed());
    assert_eq!(registry.total_count(), 7);
    match scheduler.tick().await {
        TickOutcome::Broadcast(report) => {
            assert_eq!(report.delivered, 6);
            assert_eq!(report.failed, 0);
        }
        other => panic!("expected broadcast, got {other:?}"),
    }

    assert!(registry.unregister(&broken, broken_shard));
    assert_eq!(scheduler.tick().await, TickOutcome::Waiting { total: 6 });
}

#[tokio::test]
async fn hanging_connection_times_out() {
    let healthy = RecordingSink::default();
    let registry = Arc::new(Registry::new(1, ShardAssignment::Random));
    registry.register(Arc::new(Connection::new(HangingSink)));
    registry.register(Arc::new(Connection::new(healthy.clone())));

    let scheduler = BroadcastScheduler::new(
        registry,
        settings(2, Duration::from_millis(10)),
        SyncMetrics::detached(),
    );

    let outcome = tokio::time::timeout(Duration::from_secs(2), scheduler.tick())
        .await
        .expect("tick must not hang");
    match outcome {
        TickOutcome::Broadcast(report) => {
            assert_eq!(report.delivered, 1);
            assert_eq!(report.failed, 1);
        }
        other => panic!("expected broadcast, got {other:?}"),
    }
    assert_eq!(healthy.messages().len(), 1);
}

#[tokio::test]
async fn hanging_connection_does_not_delay_its_shard_siblings() {
    let healthy = RecordingSink::default();
    let registry = Arc::new(Registry::new(1, ShardAssignment::Random));
    // Hanging client first, so a sequential send would stall the healthy one
    registry.register(Arc::new(Connection::new(HangingSink)));
    registry.register(Arc::new(Connection::new(healthy.clone())));

    let send_timeout = Duration::from_millis(500);
    let scheduler = BroadcastScheduler::new(
        registry,
        SchedulerSettings {
            send_timeout,
            ..settings(2, Duration::from_millis(10))
        },
        SyncMetrics::detached(),
    );

    let started = std::time::Instant::now();
    let tick = tokio::spawn(async move { scheduler.tick().await });

    while healthy.messages().is_empty() {
        assert!(
            started.elapsed() < send_timeout / 2,
            "healthy client still waiting after {:?}",
            started.elapsed()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    match tick.await.unwrap() {
        TickOutcome::Broadcast(report) => {
            assert_eq!(report.delivered, 1);
            assert_eq!(report.failed, 1);
        }
        other => panic!("expected broadcast, got {other:?}"),
    }
}

#[tokio::test]
async fn only_test_connect_never_broadcasts() {
    use clock_sync_gateway::{SyncConfig, SyncServer};

    let config = SyncConfig {
        delay: Duration::ZERO,
        interval: Duration::from_millis(10),
        threshold: 0,
        port: 0,
        http_port: 0,
        only_test_connect: true,
        ..SyncConfig::default()
    };
    let server = SyncServer::bind(config, SyncMetrics::detached())
        .await
        .unwrap();

    let sink = RecordingSink::default();
    let registry = server.registry();
    for _ in 0..3 {
        registry.register(Arc::new(Connection::new(sink.clone())));
    }

    let (tx, mut rx) = broadcast::channel::<()>(1);
    let handle = tokio::spawn(server.run(async move {
        let _ = rx.recv().await;
    }));

    tokio::time::sleep(Duration::from_millis(150)).await;
    tx.send(()).unwrap();
    tokio_test::assert_ok!(handle.await.unwrap());

    assert!(sink.messages().is_empty());
}
