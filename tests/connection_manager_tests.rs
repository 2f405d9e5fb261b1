//! Lifecycle tests for the connection manager against a scripted driver

mod common;

use common::{manager_for, MockDriver, TEST_URI};
use insightlink::driver::{Driver, DriverEvent};
use insightlink::health::HealthStatus;
use insightlink::{
    ConnectionError, ConnectionManager, ConnectionOptions, ConnectionState, DriverError,
    DriverErrorKind,
};
use std::sync::Arc;

#[tokio::test]
async fn test_connected_fast_path_makes_no_calls() {
    let driver = MockDriver::new();
    let manager = manager_for(&driver);

    manager.connect().await.unwrap();
    assert_eq!(driver.attempt_count(), 1);

    manager.connect().await.unwrap();
    manager.connect().await.unwrap();
    assert_eq!(driver.attempt_count(), 1);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_adopts_session_held_by_driver() {
    let driver = MockDriver::new();
    driver.set_active(true);
    let manager = manager_for(&driver);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    manager.connect().await.unwrap();

    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(driver.attempt_count(), 0);
}

#[tokio::test]
async fn test_dials_again_when_driver_lost_session() {
    let driver = MockDriver::new();
    let manager = manager_for(&driver);
    manager.connect().await.unwrap();

    // Local flag still says connected, but the driver disagrees
    driver.set_active(false);
    manager.connect().await.unwrap();

    assert_eq!(driver.attempt_count(), 2);
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_tls_failures_then_success() {
    let tls = DriverError::unknown("TLS handshake failed");
    let driver = MockDriver::scripted(vec![Err(tls.clone()), Err(tls.clone()), Err(tls), Ok(())]);
    let manager = manager_for(&driver);

    manager.connect().await.unwrap();

    let attempts = driver.attempts();
    assert_eq!(attempts.len(), 4);
    assert!(attempts[0].tls.enabled);
    assert!(attempts[1..].iter().all(|options| !options.tls.enabled));
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.stats().tls_retries, 3);
}

#[tokio::test]
async fn test_tls_retries_exhausted() {
    let driver = MockDriver::always_failing(DriverError::unknown("SSL alert number 40"), 10);
    let manager = manager_for(&driver);

    let err = manager.connect().await.unwrap_err();

    assert_eq!(driver.attempt_count(), 4);
    assert_eq!(
        err,
        ConnectionError::TlsExhausted {
            attempts: 4,
            message: "SSL alert number 40".to_string(),
        }
    );
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(manager.stats().failed_connects, 1);
}

#[tokio::test]
async fn test_non_tls_failure_is_not_retried() {
    let driver = MockDriver::always_failing(DriverError::unknown("auth failed"), 1);
    let manager = manager_for(&driver);

    let err = manager.connect().await.unwrap_err();

    assert_eq!(driver.attempt_count(), 1);
    assert!(matches!(
        err,
        ConnectionError::Connection {
            kind: DriverErrorKind::Unknown,
            ..
        }
    ));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_structured_auth_error_with_tls_in_message_is_not_retried() {
    let driver = MockDriver::always_failing(
        DriverError::new(DriverErrorKind::Authentication, "SCRAM failed over TLS"),
        1,
    );
    let manager = manager_for(&driver);

    let err = manager.connect().await.unwrap_err();

    assert_eq!(driver.attempt_count(), 1);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_failure_does_not_stick_across_calls() {
    let driver = MockDriver::scripted(vec![Err(DriverError::new(
        DriverErrorKind::Network,
        "connection refused",
    ))]);
    let manager = manager_for(&driver);

    assert!(manager.connect().await.is_err());
    manager.connect().await.unwrap();

    assert_eq!(driver.attempt_count(), 2);
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_missing_uri_fails_without_dialing() {
    let driver = MockDriver::new();
    let manager = ConnectionManager::new(
        Arc::clone(&driver) as Arc<dyn Driver>,
        ConnectionOptions::new(""),
    );

    let err = manager.connect().await.unwrap_err();

    assert!(matches!(err, ConnectionError::Configuration { .. }));
    assert_eq!(driver.attempt_count(), 0);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_driver_configuration_error_is_surfaced() {
    let driver = MockDriver::always_failing(
        DriverError::new(DriverErrorKind::Configuration, "unknown option tlsInsecure"),
        1,
    );
    let manager = manager_for(&driver);

    let err = manager.connect().await.unwrap_err();

    assert_eq!(
        err,
        ConnectionError::Configuration {
            details: "unknown option tlsInsecure".to_string(),
        }
    );
    assert_eq!(driver.attempt_count(), 1);
}

#[tokio::test]
async fn test_disconnect_and_reconnect_events() {
    let driver = MockDriver::new();
    let manager = manager_for(&driver);
    manager.connect().await.unwrap();

    driver.set_active(false);
    driver.fire(DriverEvent::Disconnected);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    driver.set_active(true);
    driver.fire(DriverEvent::Reconnected);
    assert_eq!(manager.state(), ConnectionState::Connected);

    assert_eq!(driver.attempt_count(), 1);
    let stats = manager.stats();
    assert_eq!(stats.disconnect_events, 1);
    assert_eq!(stats.reconnect_events, 1);
}

#[tokio::test]
async fn test_error_event_leaves_state_alone() {
    let driver = MockDriver::new();
    let manager = manager_for(&driver);
    manager.connect().await.unwrap();

    driver.fire(DriverEvent::Error("heartbeat timed out".to_string()));

    assert_eq!(manager.state(), ConnectionState::Connected);
    let stats = manager.stats();
    assert_eq!(stats.error_events, 1);
    assert_eq!(stats.last_error.as_deref(), Some("heartbeat timed out"));
}

#[tokio::test]
async fn test_single_subscription_across_connects() {
    let driver = MockDriver::new();
    let manager = manager_for(&driver);
    assert_eq!(driver.listener_count(), 1);

    for _ in 0..3 {
        manager.connect().await.unwrap();
        driver.set_active(false);
        driver.fire(DriverEvent::Disconnected);
    }

    assert_eq!(driver.attempt_count(), 3);
    assert_eq!(driver.listener_count(), 1);
    assert_eq!(manager.stats().disconnect_events, 3);
}

#[tokio::test]
async fn test_concurrent_connects_share_one_attempt() {
    let (driver, gate) = MockDriver::gated();
    let manager = manager_for(&driver);

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.connect().await })
        })
        .collect();

    // Wait until the leader is inside the driver
    while driver.attempt_count() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(manager.state(), ConnectionState::Connecting);
    gate.add_permits(1);

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(driver.attempt_count(), 1);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_concurrent_callers_share_failure() {
    let (driver, gate) = MockDriver::gated_with(vec![Err(DriverError::new(
        DriverErrorKind::Timeout,
        "server selection timed out",
    ))]);
    let manager = manager_for(&driver);

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect().await }
    });
    while driver.attempt_count() == 0 {
        tokio::task::yield_now().await;
    }
    let second = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect().await }
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    gate.add_permits(1);
    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert!(first.is_err());
    assert_eq!(first, second);
    assert_eq!(driver.attempt_count(), 1);
    assert_eq!(manager.stats().failed_connects, 1);
}

#[tokio::test]
async fn test_driver_panic_does_not_block_later_connects() {
    let driver = MockDriver::panicking_once();
    let manager = manager_for(&driver);

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect().await }
    })
    .await;
    assert!(first.unwrap_err().is_panic());
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    manager.connect().await.unwrap();
    assert_eq!(driver.attempt_count(), 2);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_abandoned_attempt_is_released() {
    let (driver, gate) = MockDriver::gated();
    let manager = manager_for(&driver);

    let caller = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect().await }
    });
    while driver.attempt_count() == 0 {
        tokio::task::yield_now().await;
    }
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    // Nobody waits on the old attempt, so this call dials again
    gate.add_permits(1);
    manager.connect().await.unwrap();
    assert_eq!(driver.attempt_count(), 2);

    drop(manager);
    assert_eq!(Arc::strong_count(&driver), 1);
}

#[tokio::test]
async fn test_health_report_after_connect() {
    let driver = MockDriver::new();
    let manager = manager_for(&driver);

    let report = manager.health();
    assert_eq!(report.status, HealthStatus::Unavailable);
    assert!(report.session.is_none());

    manager.connect().await.unwrap();
    let report = manager.health();
    assert_eq!(report.status, HealthStatus::Healthy);
    let session = report.session.as_ref().unwrap();
    assert_eq!(session.host, "db.example.com:27017");
    assert_eq!(session.database, "insights");
    assert!(report.uptime().is_some());
    assert_eq!(report.stats.attempts, 1);

    driver.set_active(false);
    assert_eq!(manager.health().status, HealthStatus::Degraded);
}

#[tokio::test]
async fn test_independent_managers_do_not_share_state() {
    let first_driver = MockDriver::new();
    let second_driver = MockDriver::new();
    let first = manager_for(&first_driver);
    let second = manager_for(&second_driver);

    first.connect().await.unwrap();

    assert!(first.is_connected());
    assert!(!second.is_connected());
    assert_eq!(second.options().uri, TEST_URI);
}
