//! Architectural Contract Test: Shutdown Determinism
//!
//! This test verifies that shutdown is deterministic and complete.
//!
//! Constraints verified:
//! - `run` returns promptly after `stop`
//! - Every polling task has exited when `run` returns
//! - A task stuck in a provider call is aborted after the drain timeout
//! - A stopped manager cannot be started again, in either mode
//! - Stuck tasks share one drain deadline instead of one each
//!
//! If this test fails, someone has added:
//! - Detached background tasks
//! - Tasks that ignore cancellation
//! - Blocking operations in the shutdown path

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use ddns_core::Error;
use ddns_core::config::Domain;
use ddns_core::traits::IpSource;
use ddns_core::{DnsManager, ManagerState};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn domains() -> Vec<Domain> {
    vec![
        Domain::new("a.example", ["www"]),
        Domain::new("b.example", ["www"]),
        Domain::new("c.example", ["www"]),
    ]
}

fn manager(provider: &Arc<MockDnsProvider>, drain: Duration) -> Arc<DnsManager> {
    let (registry, _) = mock_registry(provider);
    let lookup = MockRecordLookup::new();
    for host in ["www.a.example", "www.b.example", "www.c.example"] {
        lookup.resolves(host, OLD_IP);
    }
    DnsManager::builder(mock_settings(domains()), registry)
        .ip_source(FixedIpSource::new(Some(NEW_IP)))
        .record_lookup(lookup)
        .notifier(RecordingNotifier::new())
        .drain_timeout(drain)
        .build()
        .expect("manager builds")
}

#[tokio::test]
async fn stop_drains_every_task() {
    let provider = MockDnsProvider::new();
    let manager = manager(&provider, Duration::from_secs(5));
    assert_eq!(manager.state(), ManagerState::Uninitialized);

    let runner = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run().await })
    };
    assert!(wait_until(Duration::from_secs(2), || provider.call_count() == 3).await);
    assert_eq!(manager.state(), ManagerState::Running);
    assert_eq!(manager.active_tasks(), 3);

    manager.stop();
    let result = tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("run returns promptly after stop")
        .expect("runner did not panic");

    assert!(result.is_ok());
    assert_eq!(manager.state(), ManagerState::Stopped);
    assert_eq!(manager.active_tasks(), 0, "no polling task outlives run()");
}

#[tokio::test]
async fn stuck_provider_call_is_aborted_after_drain_timeout() {
    let provider = MockDnsProvider::new();
    provider.set_delay(Duration::from_secs(60));
    let manager = manager(&provider, Duration::from_millis(100));

    let runner = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run().await })
    };
    // Every task is now parked inside update_ip
    assert!(wait_until(Duration::from_secs(2), || provider.call_count() == 3).await);

    manager.stop();
    tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("drain timeout bounds shutdown")
        .expect("runner did not panic")
        .expect("clean shutdown");

    assert_eq!(manager.active_tasks(), 0);
}

#[tokio::test]
async fn stopped_manager_cannot_run_again() {
    let provider = MockDnsProvider::new();
    let manager = manager(&provider, Duration::from_secs(1));

    let runner = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run().await })
    };
    assert!(wait_until(Duration::from_secs(2), || manager.generation() == 1).await);
    manager.stop();
    runner.await.unwrap().unwrap();

    assert!(manager.run().await.is_err());
    assert_eq!(manager.generation(), 1, "no generation started after stop");
}

#[tokio::test]
async fn stuck_tasks_share_one_drain_deadline() {
    let provider = MockDnsProvider::new();
    provider.set_delay(Duration::from_secs(60));
    let drain = Duration::from_millis(400);
    let manager = manager(&provider, drain);

    let runner = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run().await })
    };
    assert!(wait_until(Duration::from_secs(2), || provider.call_count() == 3).await);

    let started = std::time::Instant::now();
    manager.stop();
    runner.await.unwrap().unwrap();

    // Three stuck tasks drained one after another would take 3 x 400ms.
    assert!(
        started.elapsed() < Duration::from_millis(1000),
        "drain took {:?}",
        started.elapsed()
    );
    assert_eq!(manager.active_tasks(), 0);
}

#[tokio::test]
async fn run_once_is_refused_while_running_or_after_stop() {
    let provider = MockDnsProvider::new();
    let manager = manager(&provider, Duration::from_secs(1));

    let runner = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run().await })
    };
    assert!(wait_until(Duration::from_secs(2), || provider.call_count() == 3).await);

    assert!(matches!(manager.run_once().await, Err(Error::State(_))));
    assert_eq!(manager.state(), ManagerState::Running, "daemon keeps running");

    manager.stop();
    runner.await.unwrap().unwrap();

    assert!(matches!(manager.run_once().await, Err(Error::State(_))));
    assert_eq!(manager.state(), ManagerState::Stopped);
    assert_eq!(provider.call_count(), 3, "refused runs touch no provider");
}

/// IpSource with a refresher that only exits on cancellation
struct RefreshingSource {
    exited: Arc<std::sync::atomic::AtomicBool>,
}

#[async_trait::async_trait]
impl IpSource for RefreshingSource {
    async fn current(&self) -> Option<std::net::IpAddr> {
        Some(NEW_IP)
    }

    fn cached(&self) -> Option<std::net::IpAddr> {
        Some(NEW_IP)
    }

    fn start_refresh(self: Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        Some(tokio::spawn(async move {
            cancel.cancelled().await;
            self.exited.store(true, std::sync::atomic::Ordering::SeqCst);
        }))
    }
}

#[tokio::test]
async fn refresher_is_stopped_with_the_manager() {
    let provider = MockDnsProvider::new();
    let (registry, _) = mock_registry(&provider);
    let exited = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let manager = DnsManager::builder(mock_settings(domains()), registry)
        .ip_source(Arc::new(RefreshingSource {
            exited: exited.clone(),
        }))
        .record_lookup(MockRecordLookup::new())
        .build()
        .unwrap();

    let runner = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run().await })
    };
    assert!(wait_until(Duration::from_secs(2), || manager.generation() == 1).await);

    manager.stop();
    runner.await.unwrap().unwrap();

    assert!(exited.load(std::sync::atomic::Ordering::SeqCst));
}
