//! Heartbeat connection tests against in-process backends.

use std::sync::Arc;
use std::time::Duration;

use pingpong_balancer::health::BackendPool;
use pingpong_balancer::security::PermissionClient;

mod common;
use common::{heartbeat_settings, wait_until, within, MockBackend, SECRET};

fn pool_for(backends: &[&MockBackend], secret: &str) -> Arc<BackendPool> {
    let settings = heartbeat_settings();
    let urls: Vec<String> = backends.iter().map(|b| b.url()).collect();
    let permissions = Arc::new(PermissionClient::new(secret, settings.max_retries, settings.retry_interval()));
    Arc::new(BackendPool::new(&urls, &settings, permissions))
}

fn state_of(pool: &BackendPool, index: usize) -> &'static str {
    pool.snapshot()[index].state
}

#[tokio::test]
async fn test_pool_becomes_ready_and_pings() {
    let a = MockBackend::start("app-a").await;
    let b = MockBackend::start("app-b").await;
    let pool = pool_for(&[&a, &b], SECRET);

    pool.start().await;
    within(Duration::from_secs(5), pool.await_ready()).await;

    assert!(wait_until(Duration::from_secs(5), || pool.active_backends().len() == 2).await);
    assert_eq!(pool.active_backends(), vec![a.url(), b.url()]);
    assert_eq!(pool.live_count(), 2);

    assert!(wait_until(Duration::from_secs(5), || a.pings() >= 2 && b.pings() >= 2).await);

    let snapshot = pool.snapshot();
    assert_eq!(snapshot[0].name, "Instance 0");
    assert_eq!(snapshot[0].state, "to_run");
    assert_eq!(
        snapshot[0].app.as_ref().and_then(|app| app.instance_id.clone()),
        Some("app-a".to_string())
    );

    within(Duration::from_secs(5), pool.shutdown()).await;
    assert_eq!(state_of(&pool, 0), "to_quit");
    assert_eq!(state_of(&pool, 1), "to_quit");
    assert!(pool.active_backends().is_empty());
}

#[tokio::test]
async fn test_service_restart_triggers_reconnect() {
    let a = MockBackend::start("app-a").await;
    let pool = pool_for(&[&a], SECRET);

    pool.start().await;
    within(Duration::from_secs(5), pool.await_ready()).await;
    assert_eq!(a.permission_requests(), 1);

    a.close_heartbeats(1012);

    // a fresh permission is requested for the new link
    assert!(wait_until(Duration::from_secs(5), || a.permission_requests() >= 2).await);
    assert!(wait_until(Duration::from_secs(5), || pool.active_backends().len() == 1).await);
    assert_eq!(pool.live_count(), 1);

    within(Duration::from_secs(5), pool.shutdown()).await;
}

#[tokio::test]
async fn test_normal_closure_terminates_connection() {
    let a = MockBackend::start("app-a").await;
    let b = MockBackend::start("app-b").await;
    let pool = pool_for(&[&a, &b], SECRET);

    pool.start().await;
    within(Duration::from_secs(5), pool.await_ready()).await;
    assert!(wait_until(Duration::from_secs(5), || pool.live_count() == 2).await);

    a.close_heartbeats(1000);

    assert!(wait_until(Duration::from_secs(5), || state_of(&pool, 0) == "to_quit").await);
    assert!(wait_until(Duration::from_secs(5), || pool.live_count() == 1).await);
    assert_eq!(pool.active_backends(), vec![b.url()]);
    assert_eq!(a.permission_requests(), 1);

    // the dead backend stays visible to diagnostics
    assert_eq!(pool.snapshot().len(), 2);
    within(Duration::from_secs(5), pool.shutdown()).await;
}

#[tokio::test]
async fn test_unknown_close_code_terminates_connection() {
    let a = MockBackend::start("app-a").await;
    let pool = pool_for(&[&a], SECRET);

    pool.start().await;
    within(Duration::from_secs(5), pool.await_ready()).await;

    a.close_heartbeats(4999);

    assert!(wait_until(Duration::from_secs(5), || state_of(&pool, 0) == "to_quit").await);
    assert_eq!(pool.live_count(), 0);
    within(Duration::from_secs(5), pool.shutdown()).await;
}

#[tokio::test]
async fn test_wrong_secret_never_ready() {
    let a = MockBackend::start("app-a").await;
    let pool = pool_for(&[&a], "not-the-secret");

    pool.start().await;

    assert!(wait_until(Duration::from_secs(5), || state_of(&pool, 0) == "to_quit").await);
    assert!(!pool.is_ready());
    assert!(pool.active_backends().is_empty());
    // a refused handshake is final, not retried
    assert_eq!(a.permission_requests(), 1);

    within(Duration::from_secs(5), pool.shutdown()).await;
}

#[tokio::test]
async fn test_unreachable_backend_gives_up_after_retries() {
    let pool = {
        let settings = heartbeat_settings();
        let urls = vec!["http://127.0.0.1:9".to_string()];
        let permissions = Arc::new(PermissionClient::new(SECRET, settings.max_retries, settings.retry_interval()));
        Arc::new(BackendPool::new(&urls, &settings, permissions))
    };

    pool.start().await;
    assert!(wait_until(Duration::from_secs(5), || state_of(&pool, 0) == "to_quit").await);
    assert!(!pool.is_ready());
    within(Duration::from_secs(5), pool.shutdown()).await;
}

#[tokio::test]
async fn test_shutdown_interrupts_connect_retries() {
    let settings = {
        let mut s = heartbeat_settings();
        s.retry_interval_ms = 60_000;
        s.max_retries = 10;
        s
    };
    let urls = vec!["http://127.0.0.1:9".to_string()];
    let permissions = Arc::new(PermissionClient::new(SECRET, settings.max_retries, settings.retry_interval()));
    let pool = BackendPool::new(&urls, &settings, permissions);

    pool.start().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    within(Duration::from_secs(5), pool.shutdown()).await;
    assert_eq!(state_of(&pool, 0), "to_quit");
}
