//! Worker pool reconciliation against real spawned processes.
//!
//! A shell script stands in for the subscriber worker: it performs the
//! readiness handshake on stdout and then streams CSV latency records, which
//! lets these tests drive the full spawn/handshake/poll/terminate path
//! without a fabric broker.

#![cfg(unix)]

use fabric_bench::aggregator::LatencyAggregator;
use fabric_bench::pool::{ReconcileOutcome, WorkerConfig, WorkerPoolManager};
use fabric_bench::reader::TransportReader;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

fn write_script(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("stat script").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod script");
    path
}

fn worker_config(command: PathBuf) -> WorkerConfig {
    WorkerConfig {
        command,
        fabric_address: "localhost".to_string(),
        fabric_port: 61613,
        username: "system".to_string(),
        password: "manager".to_string(),
        topic: "pmu.data".to_string(),
        readiness_timeout: Duration::from_secs(5),
    }
}

/// Drive reconciliation until the live count converges. Readiness arrives
/// asynchronously, so a spawn takes one or more ticks to complete.
async fn reconcile_until_live(pool: &mut WorkerPoolManager, desired: usize) {
    for _ in 0..250 {
        pool.reconcile(desired).await;
        if pool.live_count() == desired {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("pool did not converge to {} live workers", desired);
}

const STREAMING_WORKER: &str = r#"#!/bin/sh
echo "Starting Subscription"
while true; do
  echo "$1,100.0,100.05,0.05"
  sleep 0.02
done
"#;

const SILENT_WORKER: &str = r#"#!/bin/sh
echo "Starting Subscription"
while true; do sleep 1; done
"#;

const FAILING_WORKER: &str = r#"#!/bin/sh
echo "something went wrong before subscribing"
exit 1
"#;

/// The first worker streams normally; every later one stalls before its
/// readiness sentinel.
const STALLING_SECOND_WORKER: &str = r#"#!/bin/sh
if [ "$1" = "sub-0" ]; then
  echo "Starting Subscription"
  while true; do
    echo "$1,100.0,100.05,0.05"
    sleep 0.02
  done
else
  sleep 60
fi
"#;

#[tokio::test]
async fn pool_grows_one_worker_per_tick() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "worker.sh", SILENT_WORKER);
    let mut pool = WorkerPoolManager::new(worker_config(script));

    // Each call either advances the in-flight handshake or promotes exactly
    // one worker; the live count never jumps.
    let mut spawned = 0;
    for _ in 0..250 {
        let before = pool.live_count();
        match pool.reconcile(2).await {
            ReconcileOutcome::Spawned(_) => spawned += 1,
            ReconcileOutcome::Pending(_) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(pool.live_count() <= before + 1);
        if pool.live_count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(spawned, 2);
    assert_eq!(pool.live_count(), 2);

    // Converged: repeated reconciliation with an unchanged desired count
    // is an idempotent no-op.
    assert_eq!(pool.reconcile(2).await, ReconcileOutcome::Unchanged);
    assert_eq!(pool.live_count(), 2);

    pool.shutdown().await;
    assert_eq!(pool.live_count(), 0);
}

#[tokio::test]
async fn pool_shrinks_to_zero() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "worker.sh", SILENT_WORKER);
    let mut pool = WorkerPoolManager::new(worker_config(script));

    reconcile_until_live(&mut pool, 3).await;

    // Desired count 0: one termination per tick until empty.
    assert!(matches!(
        pool.reconcile(0).await,
        ReconcileOutcome::Terminated(_)
    ));
    assert_eq!(pool.live_count(), 2);
    pool.reconcile(0).await;
    pool.reconcile(0).await;
    assert_eq!(pool.live_count(), 0);
    assert_eq!(pool.reconcile(0).await, ReconcileOutcome::Unchanged);
}

#[tokio::test]
async fn failed_spawn_is_reported_and_retried_next_tick() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "worker.sh", FAILING_WORKER);
    let mut pool = WorkerPoolManager::new(worker_config(script));

    // Two distinct spawn attempts fail: the first failure is reported, and
    // the pool tries again rather than giving up.
    let mut failures = 0;
    for _ in 0..250 {
        match pool.reconcile(1).await {
            ReconcileOutcome::SpawnFailed(_) => {
                failures += 1;
                if failures == 2 {
                    break;
                }
            }
            ReconcileOutcome::Pending(_) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(failures, 2);
    assert_eq!(pool.live_count(), 0);

    pool.shutdown().await;
}

#[tokio::test]
async fn slow_handshake_does_not_stall_polling_of_live_workers() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "worker.sh", STALLING_SECOND_WORKER);
    let mut config = worker_config(script);
    config.readiness_timeout = Duration::from_secs(60);
    let mut pool = WorkerPoolManager::new(config);
    let aggregator = LatencyAggregator::new();
    let mut reader = TransportReader::new();

    reconcile_until_live(&mut pool, 1).await;

    // The second worker never becomes ready within its generous deadline;
    // each reconciliation step must still return promptly so the live
    // worker keeps getting polled in the same tick.
    for _ in 0..25 {
        let started = std::time::Instant::now();
        let outcome = pool.reconcile(2).await;
        assert!(matches!(outcome, ReconcileOutcome::Pending(_)));
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "reconcile blocked on the spawning worker"
        );
        reader.poll(pool.workers_mut(), &aggregator);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let summaries = aggregator.summarize();
    assert_eq!(summaries.len(), 1);
    assert!(
        summaries[0].count > 0,
        "live worker records should keep flowing during the handshake"
    );

    // Shutdown reaps the still-spawning worker too.
    pool.shutdown().await;
    assert_eq!(pool.live_count(), 0);
}

#[tokio::test]
async fn samples_flow_from_workers_to_aggregator() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "worker.sh", STREAMING_WORKER);
    let mut pool = WorkerPoolManager::new(worker_config(script));
    let aggregator = LatencyAggregator::new();
    let mut reader = TransportReader::new();

    reconcile_until_live(&mut pool, 2).await;

    // Poll until both workers have reported.
    for _ in 0..100 {
        reader.poll(pool.workers_mut(), &aggregator);
        let summaries = aggregator.summarize();
        if summaries.len() == 2 && summaries.iter().all(|s| s.count > 0) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let summaries = aggregator.summarize();
    assert_eq!(summaries.len(), 2, "both workers should have buckets");
    for summary in &summaries {
        assert!(summary.count > 0);
        let mean = summary.mean_latency.unwrap();
        assert!((mean - 0.05).abs() < 1e-9);
    }

    // Terminating one worker leaves the other's bucket untouched.
    let before = aggregator.summarize();
    pool.reconcile(1).await;
    assert_eq!(pool.live_count(), 1);
    let after = aggregator.summarize();
    assert_eq!(before.len(), after.len());
    let survivor = pool.workers_mut()[0].id().to_string();
    let before_count = before
        .iter()
        .find(|s| s.subscriber_id == survivor)
        .unwrap()
        .count;
    let after_count = after
        .iter()
        .find(|s| s.subscriber_id == survivor)
        .unwrap()
        .count;
    assert!(after_count >= before_count);

    pool.shutdown().await;
}

#[tokio::test]
async fn malformed_records_are_discarded_not_fatal() {
    const NOISY_WORKER: &str = r#"#!/bin/sh
echo "Starting Subscription"
echo "garbage"
echo "$1,100.0,100.05,0.05"
while true; do sleep 1; done
"#;

    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "worker.sh", NOISY_WORKER);
    let mut pool = WorkerPoolManager::new(worker_config(script));
    let aggregator = LatencyAggregator::new();
    let mut reader = TransportReader::new();

    reconcile_until_live(&mut pool, 1).await;

    for _ in 0..100 {
        reader.poll(pool.workers_mut(), &aggregator);
        if aggregator.total_samples() == 1 && reader.parse_failures() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(aggregator.total_samples(), 1);
    assert_eq!(reader.parse_failures(), 1);

    pool.shutdown().await;
}
