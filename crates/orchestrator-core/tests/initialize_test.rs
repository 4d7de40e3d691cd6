//! Session initialization against mock collaborators

mod common;

use std::time::{Duration, Instant};

use serial_test::serial;

use common::{collect_events, connection_config, fast_config, next_event, Harness};
use rtc_orchestrator_core::config::{ConnectionConfig, SessionOptions};
use rtc_orchestrator_core::connection::ConnectionState;
use rtc_orchestrator_core::events::LifecycleEvent;
use rtc_orchestrator_core::mock::{Call, ConnectBehavior};
use rtc_orchestrator_core::orchestrator::OrchestratorState;
use rtc_orchestrator_core::providers::ResourceKind;
use rtc_orchestrator_core::recovery::RetryConfig;
use rtc_orchestrator_core::{OrchestratorError, ProviderError};

#[tokio::test]
async fn test_initialize_connects_with_session_url_and_joins() {
    let harness = Harness::new();
    let mut orchestrator = harness.orchestrator();
    let mut events = orchestrator.subscribe_stream();

    let report = orchestrator
        .initialize(connection_config().with_app_id("demo-app"), "room1")
        .await
        .unwrap();

    assert_eq!(report.connection.url, "wss://x?room=room1");
    assert_eq!(report.session_id.as_str(), "room1");
    assert!(report.resource_error.is_none());
    let kinds = report.resources.as_ref().unwrap().kinds.clone();
    assert_eq!(kinds, vec![ResourceKind::AudioCapture, ResourceKind::VideoCapture]);

    let params = harness.library.last_params().unwrap();
    assert_eq!(params.url, "wss://x?room=room1");
    assert_eq!(params.auth_token, "secret-token");
    assert_eq!(params.app_id.as_deref(), Some("demo-app"));

    assert_eq!(harness.journal.count(&Call::Join("room1".to_string())), 1);
    assert_eq!(harness.journal.count(&Call::LibraryInit), 1);

    match next_event(&mut events, Duration::from_millis(200)).await {
        Some(LifecycleEvent::Established { connection }) => assert_eq!(connection, report.connection),
        other => panic!("expected Established, got {:?}", other),
    }
    assert_eq!(orchestrator.state(), OrchestratorState::Active);
}

#[tokio::test]
async fn test_join_happens_after_established() {
    let harness = Harness::new();
    let mut orchestrator = harness.orchestrator();

    orchestrator.initialize(connection_config(), "room1").await.unwrap();

    let init = harness.journal.position(&Call::LibraryInit).unwrap();
    let connect = harness.journal.position(&Call::Connect).unwrap();
    let acquire = harness.journal.position(&Call::Acquire).unwrap();
    let join = harness.journal.position(&Call::Join("room1".to_string())).unwrap();

    assert!(init < connect);
    assert!(init < acquire);
    assert!(connect < join);
    assert!(acquire < join);
}

#[tokio::test]
async fn test_custom_session_parameter() {
    let harness = Harness::new();
    let mut orchestrator = harness.orchestrator();

    let config = ConnectionConfig::new("wss://signal.example.com/ws?v=2", "t")
        .with_session_options(SessionOptions::default().with_session_param("channel"));
    let report = orchestrator.initialize(config, "team standup").await.unwrap();

    assert_eq!(
        report.connection.url,
        "wss://signal.example.com/ws?v=2&channel=team+standup"
    );
}

#[tokio::test]
async fn test_connection_failure_rejects_without_join() {
    let harness = Harness::new();
    harness
        .library
        .set_connect_behavior(ConnectBehavior::Fail(ProviderError::new("auth")));
    let mut orchestrator = harness.orchestrator();
    let mut events = orchestrator.subscribe_stream();

    let err = orchestrator.initialize(connection_config(), "room1").await.unwrap_err();

    match &err {
        OrchestratorError::Connection { source } => assert_eq!(source.message, "auth"),
        other => panic!("expected connection error, got {:?}", other),
    }
    assert_eq!(harness.journal.count(&Call::Join("room1".to_string())), 0);

    let emitted = collect_events(&mut events, Duration::from_millis(100)).await;
    assert_eq!(emitted, vec![LifecycleEvent::Failed { error: err.clone() }]);
    assert_eq!(orchestrator.state(), OrchestratorState::Failed);
}

#[tokio::test]
async fn test_rejected_handshake_start_is_a_connection_failure() {
    let harness = Harness::new();
    harness
        .library
        .set_connect_behavior(ConnectBehavior::RejectStart(ProviderError::new("bad url")));
    let mut orchestrator = harness.orchestrator();

    let err = orchestrator.initialize(connection_config(), "room1").await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Connection { .. }));
    assert_eq!(harness.journal.count(&Call::Join("room1".to_string())), 0);
}

#[tokio::test]
async fn test_resource_failure_does_not_block_session() {
    let harness = Harness::new();
    harness.resources.fail_acquire(ProviderError::new("camera busy"));
    let mut orchestrator = harness.orchestrator();
    let mut events = orchestrator.subscribe_stream();

    let report = orchestrator.initialize(connection_config(), "room1").await.unwrap();

    assert!(!report.has_local_media());
    assert!(matches!(
        report.resource_error,
        Some(OrchestratorError::ResourceAcquisition { .. })
    ));
    assert_eq!(harness.journal.count(&Call::Join("room1".to_string())), 1);
    assert!(matches!(
        next_event(&mut events, Duration::from_millis(200)).await,
        Some(LifecycleEvent::Established { .. })
    ));
}

#[tokio::test]
async fn test_both_failures_report_connection_error() {
    let harness = Harness::new();
    harness.resources.fail_acquire(ProviderError::new("no devices"));
    harness
        .library
        .set_connect_behavior(ConnectBehavior::Fail(ProviderError::new("auth")));
    let mut orchestrator = harness.orchestrator();

    let err = orchestrator.initialize(connection_config(), "room1").await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Connection { .. }));
}

#[tokio::test]
async fn test_library_init_failure_is_retried_on_next_attempt() {
    let harness = Harness::new();
    harness.library.fail_init_once(ProviderError::new("runtime unavailable"));
    let mut orchestrator = harness.orchestrator();

    let err = orchestrator.initialize(connection_config(), "room1").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Initialization { .. }));
    assert_eq!(harness.journal.count(&Call::Connect), 0);

    orchestrator.teardown().await;
    orchestrator.initialize(connection_config(), "room1").await.unwrap();
    assert_eq!(harness.journal.count(&Call::LibraryInit), 2);
}

#[tokio::test]
async fn test_runtime_shared_between_orchestrators_initializes_once() {
    let harness = Harness::new();
    let mut first = harness.orchestrator();
    let mut second = harness.orchestrator();

    first.initialize(connection_config(), "room1").await.unwrap();
    second.initialize(connection_config(), "room2").await.unwrap();

    assert_eq!(harness.journal.count(&Call::LibraryInit), 1);
    assert_eq!(harness.library.connection_count(), 2);
    assert_ne!(
        first.connection_info().unwrap().id,
        second.connection_info().unwrap().id
    );
}

#[tokio::test]
#[serial]
async fn test_connect_and_acquire_run_concurrently() {
    let harness = Harness::new();
    harness
        .library
        .set_connect_behavior(ConnectBehavior::EstablishAfter(Duration::from_millis(300)));
    harness.resources.set_acquire_delay(Duration::from_millis(300));
    let mut orchestrator = harness.orchestrator();

    let started = Instant::now();
    orchestrator.initialize(connection_config(), "room1").await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(550));
}

#[tokio::test]
#[serial]
async fn test_connect_timeout_fails_attempt() {
    let harness = Harness::new();
    harness.library.set_connect_behavior(ConnectBehavior::Hang);
    let mut orchestrator = harness.orchestrator_with(fast_config().with_connect_timeout(Duration::from_millis(100)));
    let mut events = orchestrator.subscribe_stream();

    let err = orchestrator.initialize(connection_config(), "room1").await.unwrap_err();

    assert!(matches!(err, OrchestratorError::OperationTimeout { .. }));
    assert_eq!(harness.journal.count(&Call::Disconnect), 1);
    assert_eq!(harness.journal.count(&Call::Join("room1".to_string())), 0);
    assert!(matches!(
        next_event(&mut events, Duration::from_millis(200)).await,
        Some(LifecycleEvent::Failed { .. })
    ));
}

#[tokio::test]
#[serial]
async fn test_connect_retry_recovers_from_timeout() {
    let harness = Harness::new();
    harness.library.queue_connect_behavior(ConnectBehavior::Hang);
    let config = fast_config()
        .with_connect_timeout(Duration::from_millis(100))
        .with_connect_retry(RetryConfig::fixed(2, Duration::from_millis(10)));
    let mut orchestrator = harness.orchestrator_with(config);
    let mut events = orchestrator.subscribe_stream();

    orchestrator.initialize(connection_config(), "room1").await.unwrap();

    assert_eq!(harness.library.connection_count(), 2);
    // Only the final outcome is reported
    let emitted = collect_events(&mut events, Duration::from_millis(100)).await;
    assert_eq!(emitted.len(), 1);
    assert!(matches!(emitted[0], LifecycleEvent::Established { .. }));
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let harness = Harness::new();
    harness
        .library
        .set_connect_behavior(ConnectBehavior::Fail(ProviderError::new("auth")));
    let config = fast_config().with_connect_retry(RetryConfig::fixed(3, Duration::from_millis(10)));
    let mut orchestrator = harness.orchestrator_with(config);

    orchestrator.initialize(connection_config(), "room1").await.unwrap_err();

    assert_eq!(harness.library.connection_count(), 1);
}

#[tokio::test]
async fn test_join_failure_rejects_initialize() {
    let harness = Harness::new();
    harness.sessions.fail_join(ProviderError::new("room full"));
    let mut orchestrator = harness.orchestrator();

    let err = orchestrator.initialize(connection_config(), "room1").await.unwrap_err();

    assert!(matches!(err, OrchestratorError::SessionJoin { .. }));
    assert!(orchestrator.session().is_none());
    // The connection stays open until teardown
    assert_eq!(orchestrator.connection_state().await, Some(ConnectionState::Established));
}

#[tokio::test]
#[serial]
async fn test_join_timeout() {
    let harness = Harness::new();
    harness.sessions.set_join_delay(Duration::from_secs(5));
    let mut orchestrator = harness.orchestrator_with(fast_config().with_join_timeout(Duration::from_millis(100)));

    let err = orchestrator.initialize(connection_config(), "room1").await.unwrap_err();

    assert_eq!(
        err,
        OrchestratorError::OperationTimeout {
            operation: "join-session".to_string(),
            duration_ms: 100,
        }
    );
}
