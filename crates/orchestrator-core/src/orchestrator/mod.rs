//! Session lifecycle orchestrator
//!
//! [`SessionOrchestrator`] sequences everything needed to enter a real-time
//! session and to leave it again:
//!
//! 1. initialize the signaling library (once per [`SignalingRuntime`])
//! 2. open the signaling connection and acquire local resources concurrently
//! 3. publish `Established` and join the session
//!
//! Any failure before the join stops the sequence; a resource acquisition
//! failure alone does not. Teardown runs leave, disconnect and release in that
//! order, each step isolated from the others, and never fails as a whole.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rtc_orchestrator_core::config::ConnectionConfig;
//! use rtc_orchestrator_core::mock::{CallJournal, MockResourceProvider, MockSessionProvider, MockSignalingLibrary};
//! use rtc_orchestrator_core::orchestrator::OrchestratorBuilder;
//!
//! # tokio_test::block_on(async {
//! let journal = CallJournal::new();
//! let mut orchestrator = OrchestratorBuilder::new()
//!     .signaling_library(Arc::new(MockSignalingLibrary::new(journal.clone())))
//!     .resource_provider(Arc::new(MockResourceProvider::new(journal.clone())))
//!     .session_provider(Arc::new(MockSessionProvider::new(journal.clone())))
//!     .build()
//!     .unwrap();
//!
//! let report = orchestrator
//!     .initialize(ConnectionConfig::new("wss://x", "token"), "room1")
//!     .await
//!     .unwrap();
//! assert_eq!(report.connection.url, "wss://x?room=room1");
//!
//! let teardown = orchestrator.teardown().await;
//! assert!(teardown.is_clean());
//! # })
//! ```

mod builder;
mod steps;
mod types;

pub use builder::OrchestratorBuilder;
pub use types::{
    InitializeReport, OrchestratorState, OrchestratorStats, SessionContext, TeardownReport,
};

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{ConnectionConfig, OrchestratorConfig, SessionId};
use crate::connection::{ConnectionInfo, ConnectionState};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::{EventEmitter, EventSubscription, LifecycleEvent};
use crate::providers::{LocalResourceProvider, LocalResourceSet, SessionProvider};
use crate::runtime::SignalingRuntime;

use steps::{initialize_pipeline, teardown_pipeline, AttemptContext};

/// Drives one session lifecycle at a time
pub struct SessionOrchestrator {
    context: AttemptContext,
    state: OrchestratorState,
    stats: OrchestratorStats,
}

impl SessionOrchestrator {
    pub fn new(
        runtime: Arc<SignalingRuntime>,
        resource_provider: Arc<dyn LocalResourceProvider>,
        session_provider: Arc<dyn SessionProvider>,
        emitter: Arc<EventEmitter>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            context: AttemptContext::new(runtime, resource_provider, session_provider, emitter, config),
            state: OrchestratorState::Idle,
            stats: OrchestratorStats::default(),
        }
    }

    /// Bring the session up
    ///
    /// Resolves once the session has been joined. Rejects with the
    /// underlying error when library initialization, the connection or the
    /// join fails; in the connection case a `Failed` event has already been
    /// emitted and no join was attempted.
    ///
    /// Call [`teardown`](Self::teardown) before initializing again.
    pub async fn initialize(
        &mut self,
        config: ConnectionConfig,
        session_id: impl Into<SessionId>,
    ) -> OrchestratorResult<InitializeReport> {
        if !self.state.can_initialize() {
            return Err(OrchestratorError::invalid_state("Idle or Closed", self.state.to_string()));
        }
        let session_id = session_id.into();
        if session_id.is_empty() {
            return Err(OrchestratorError::MissingConfiguration {
                field: "session_id".to_string(),
            });
        }
        config.validate()?;

        info!(session_id = %session_id, endpoint = %config.endpoint, "Initializing session");
        self.stats.attempts += 1;
        self.set_state(OrchestratorState::Initializing);
        self.context.begin(config, session_id.clone());

        let outcome = initialize_pipeline()
            .run_fail_fast(&mut self.context)
            .await
            .and_then(|steps| match &self.context.connection {
                Some(handle) => Ok((steps, handle.info().clone())),
                None => Err(OrchestratorError::invalid_state("Established connection", "no connection")),
            });

        match outcome {
            Ok((steps, connection)) => {
                self.stats.established += 1;
                self.set_state(OrchestratorState::Active);
                info!(
                    session_id = %session_id,
                    connection_id = %connection.id,
                    local_media = self.context.resources.is_some(),
                    "Session initialized"
                );

                Ok(InitializeReport {
                    session_id,
                    connection,
                    resources: self.context.resources.as_ref().map(LocalResourceSet::summary),
                    resource_error: self.context.resource_error.clone(),
                    steps,
                })
            }
            Err(e) => {
                self.stats.failed += 1;
                self.set_state(OrchestratorState::Failed);
                error!(session_id = %session_id, error = %e, category = e.category(), "Session initialization failed");
                Err(e)
            }
        }
    }

    /// Leave the session, close the connection and release local resources
    ///
    /// Every step runs even if an earlier one fails, and each is bounded by
    /// the configured teardown step timeout. Steps with nothing to clean up
    /// are skipped, so calling this before `initialize` or twice in a row has
    /// no side effects.
    pub async fn teardown(&mut self) -> TeardownReport {
        info!(state = %self.state, "Tearing down session");
        self.set_state(OrchestratorState::TearingDown);

        let pipeline = teardown_pipeline(self.context.config.teardown_step_timeout);
        let steps = pipeline.run_isolated(&mut self.context).await;
        self.context.finish();

        let report = TeardownReport { steps };
        if report.is_clean() {
            info!("Teardown complete");
        } else {
            for (step, e) in report.failures() {
                warn!(step = step, error = %e, "Teardown step did not complete cleanly");
            }
        }

        self.stats.teardowns += 1;
        self.set_state(OrchestratorState::Closed);
        report
    }

    fn set_state(&mut self, state: OrchestratorState) {
        self.state = state;
        self.stats.state = state;
        self.stats.last_transition = Utc::now();
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.stats.clone()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.context.config
    }

    pub fn runtime(&self) -> &Arc<SignalingRuntime> {
        &self.context.runtime
    }

    /// Event emitter carrying this orchestrator's lifecycle events
    pub fn events(&self) -> &Arc<EventEmitter> {
        &self.context.emitter
    }

    pub fn subscribe(&self, subscription: EventSubscription) -> Uuid {
        self.context.emitter.subscribe(subscription)
    }

    pub fn unsubscribe(&self, subscription_id: Uuid) -> bool {
        self.context.emitter.unsubscribe(subscription_id)
    }

    pub fn subscribe_stream(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.context.emitter.subscribe_stream()
    }

    /// Current connection, if one is open
    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.context.connection.as_ref().map(|c| c.info())
    }

    pub async fn connection_state(&self) -> Option<ConnectionState> {
        match &self.context.connection {
            Some(connection) => Some(connection.state().await),
            None => None,
        }
    }

    /// Joined session, if any
    pub fn session(&self) -> Option<&SessionContext> {
        self.context.session.as_ref()
    }

    pub fn resources(&self) -> Option<&LocalResourceSet> {
        self.context.resources.as_ref()
    }
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("state", &self.state)
            .field("connection", &self.context.connection)
            .field("session", &self.context.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::mock::{
        Call, CallJournal, ConnectBehavior, MockResourceProvider, MockSessionProvider, MockSignalingLibrary,
    };

    struct Fixture {
        journal: CallJournal,
        library: Arc<MockSignalingLibrary>,
        resources: Arc<MockResourceProvider>,
        sessions: Arc<MockSessionProvider>,
    }

    impl Fixture {
        fn new() -> Self {
            let journal = CallJournal::new();
            Self {
                library: Arc::new(MockSignalingLibrary::new(journal.clone())),
                resources: Arc::new(MockResourceProvider::new(journal.clone())),
                sessions: Arc::new(MockSessionProvider::new(journal.clone())),
                journal,
            }
        }

        fn orchestrator(&self) -> SessionOrchestrator {
            OrchestratorBuilder::new()
                .signaling_library(self.library.clone())
                .resource_provider(self.resources.clone())
                .session_provider(self.sessions.clone())
                .build()
                .unwrap()
        }
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("wss://x", "token")
    }

    #[tokio::test]
    async fn test_initialize_then_teardown() {
        let fixture = Fixture::new();
        let mut orchestrator = fixture.orchestrator();

        let report = orchestrator.initialize(config(), "room1").await.unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Active);
        assert!(report.has_local_media());
        assert_eq!(orchestrator.session().unwrap().session_id.as_str(), "room1");
        assert_eq!(orchestrator.connection_state().await, Some(ConnectionState::Established));

        let teardown = orchestrator.teardown().await;
        assert!(teardown.is_clean());
        assert_eq!(orchestrator.state(), OrchestratorState::Closed);
        assert!(orchestrator.session().is_none());
        assert!(orchestrator.connection_info().is_none());

        let stats = orchestrator.stats();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.established, 1);
        assert_eq!(stats.teardowns, 1);
        assert_eq!(fixture.journal.count(&Call::Leave), 1);
    }

    #[tokio::test]
    async fn test_second_initialize_requires_teardown() {
        let fixture = Fixture::new();
        let mut orchestrator = fixture.orchestrator();

        orchestrator.initialize(config(), "room1").await.unwrap();
        let err = orchestrator.initialize(config(), "room2").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidState { .. }));

        orchestrator.teardown().await;
        orchestrator.initialize(config(), "room2").await.unwrap();
        assert_eq!(fixture.journal.count(&Call::LibraryInit), 1);
        assert_eq!(fixture.journal.count(&Call::Join("room2".to_string())), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_leaves_state_untouched() {
        let fixture = Fixture::new();
        let mut orchestrator = fixture.orchestrator();

        let err = orchestrator.initialize(config(), "  ").await.unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::MissingConfiguration {
                field: "session_id".to_string()
            }
        );

        let err = orchestrator
            .initialize(ConnectionConfig::new("wss://x", ""), "room1")
            .await
            .unwrap_err();
        assert_eq!(err.category(), "configuration");

        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert!(fixture.journal.is_empty());
    }

    #[tokio::test]
    async fn test_failed_initialize_records_stats() {
        let fixture = Fixture::new();
        fixture
            .library
            .set_connect_behavior(ConnectBehavior::Fail(ProviderError::new("auth")));
        let mut orchestrator = fixture.orchestrator();

        let err = orchestrator.initialize(config(), "room1").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Connection { .. }));
        assert_eq!(orchestrator.state(), OrchestratorState::Failed);
        assert_eq!(orchestrator.stats().failed, 1);

        // acquired resources from the failed attempt are still released
        let teardown = orchestrator.teardown().await;
        assert!(teardown.is_clean());
        assert_eq!(fixture.journal.count(&Call::Release), 1);
        assert_eq!(fixture.journal.count(&Call::Leave), 0);
    }

    #[tokio::test]
    async fn test_init_failure_skips_connection() {
        let fixture = Fixture::new();
        fixture.library.fail_init_once(ProviderError::new("no runtime"));
        let mut orchestrator = fixture.orchestrator();

        let err = orchestrator.initialize(config(), "room1").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Initialization { .. }));
        assert_eq!(fixture.journal.count(&Call::Connect), 0);
        assert_eq!(fixture.journal.count(&Call::Acquire), 0);
    }
}
