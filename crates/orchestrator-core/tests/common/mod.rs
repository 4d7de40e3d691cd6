//! Shared fixtures for orchestrator integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use rtc_orchestrator_core::config::{ConnectionConfig, OrchestratorConfig};
use rtc_orchestrator_core::events::{LifecycleEvent, LifecycleEventHandler};
use rtc_orchestrator_core::mock::{CallJournal, MockResourceProvider, MockSessionProvider, MockSignalingLibrary};
use rtc_orchestrator_core::orchestrator::{OrchestratorBuilder, SessionOrchestrator};
use rtc_orchestrator_core::runtime::SignalingRuntime;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rtc_orchestrator_core=debug")
        .with_test_writer()
        .try_init();
}

/// Mock collaborators wired to one journal
pub struct Harness {
    pub journal: CallJournal,
    pub library: Arc<MockSignalingLibrary>,
    pub runtime: Arc<SignalingRuntime>,
    pub resources: Arc<MockResourceProvider>,
    pub sessions: Arc<MockSessionProvider>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let journal = CallJournal::new();
        let library = Arc::new(MockSignalingLibrary::new(journal.clone()));
        Self {
            runtime: Arc::new(SignalingRuntime::new(library.clone())),
            resources: Arc::new(MockResourceProvider::new(journal.clone())),
            sessions: Arc::new(MockSessionProvider::new(journal.clone())),
            library,
            journal,
        }
    }

    pub fn orchestrator(&self) -> SessionOrchestrator {
        self.orchestrator_with(fast_config())
    }

    pub fn orchestrator_with(&self, config: OrchestratorConfig) -> SessionOrchestrator {
        OrchestratorBuilder::new()
            .signaling_runtime(self.runtime.clone())
            .resource_provider(self.resources.clone())
            .session_provider(self.sessions.clone())
            .config(config)
            .build()
            .expect("valid orchestrator")
    }
}

/// Timeouts short enough to keep failing tests quick
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig::new()
        .with_connect_timeout(Duration::from_secs(2))
        .with_join_timeout(Duration::from_secs(2))
        .with_teardown_step_timeout(Duration::from_secs(2))
}

pub fn connection_config() -> ConnectionConfig {
    ConnectionConfig::new("wss://x", "secret-token")
}

/// Next event from a stream, or `None` if nothing arrives within `wait`
pub async fn next_event(
    events: &mut broadcast::Receiver<LifecycleEvent>,
    wait: Duration,
) -> Option<LifecycleEvent> {
    tokio::time::timeout(wait, events.recv()).await.ok()?.ok()
}

/// Drain every event that arrives within `wait`
pub async fn collect_events(events: &mut broadcast::Receiver<LifecycleEvent>, wait: Duration) -> Vec<LifecycleEvent> {
    let mut collected = Vec::new();
    while let Some(event) = next_event(events, wait).await {
        collected.push(event);
    }
    collected
}

/// Handler that records what it receives
#[derive(Default)]
pub struct RecordingHandler {
    pub received: Mutex<Vec<LifecycleEvent>>,
}

#[async_trait]
impl LifecycleEventHandler for RecordingHandler {
    async fn on_lifecycle_event(&self, event: LifecycleEvent) {
        self.received.lock().await.push(event);
    }
}
