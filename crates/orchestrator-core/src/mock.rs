//! In-memory collaborators for tests and demos
//!
//! Every mock records the calls it receives in a shared [`CallJournal`], so
//! tests can assert on the exact order in which the orchestrator drove its
//! collaborators. Failures, delays and connection outcomes are scripted
//! through setter methods.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::config::SessionId;
use crate::error::ProviderError;
use crate::providers::{
    ConnectionParams, LocalResource, LocalResourceProvider, LocalResourceSet, ResourceKind, SessionProvider,
    SignalingConnection, SignalingEvent, SignalingEventSink, SignalingLibrary,
};

/// Reason the mock connection reports after a client-side disconnect
pub const MOCK_CLOSED_REASON: &str = "closed by client";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A collaborator call observed by a mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    LibraryInit,
    CreateConnection { url: String },
    Connect,
    Disconnect,
    Acquire,
    Release,
    Join(String),
    Leave,
}

/// Ordered, shared record of collaborator calls
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: Call) {
        lock(&self.calls).push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        lock(&self.calls).iter().filter(|c| *c == call).count()
    }

    /// Index of the first occurrence of `call`
    pub fn position(&self, call: &Call) -> Option<usize> {
        lock(&self.calls).iter().position(|c| c == call)
    }

    pub fn len(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.calls).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }
}

/// How a mock connection reacts to `connect`
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectBehavior {
    /// Report `ESTABLISHED` immediately
    Establish,
    /// Report `ESTABLISHED` after a delay
    EstablishAfter(Duration),
    /// Report `FAILED`
    Fail(ProviderError),
    /// Refuse to start the handshake at all
    RejectStart(ProviderError),
    /// Report `ESTABLISHED` and then `DISCONNECTED` right away
    EstablishThenDrop(String),
    /// Never report anything
    Hang,
}

/// Scripted [`SignalingConnection`]
pub struct MockSignalingConnection {
    journal: CallJournal,
    behavior: ConnectBehavior,
    sink: Mutex<Option<SignalingEventSink>>,
    disconnect_error: Option<ProviderError>,
    disconnect_delay: Option<Duration>,
}

impl MockSignalingConnection {
    /// Push a `DISCONNECTED` event as if the remote side went away
    pub fn drop_connection(&self, reason: impl Into<String>) -> bool {
        match lock(&self.sink).as_ref() {
            Some(sink) => sink.send(SignalingEvent::Disconnected(reason.into())).is_ok(),
            None => false,
        }
    }

    /// Push an arbitrary event
    pub fn send_event(&self, event: SignalingEvent) -> bool {
        match lock(&self.sink).as_ref() {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl SignalingConnection for MockSignalingConnection {
    fn connect(&self, events: SignalingEventSink) -> Result<(), ProviderError> {
        self.journal.record(Call::Connect);
        debug!(behavior = ?self.behavior, "Mock connect");

        match &self.behavior {
            ConnectBehavior::Establish => {
                let _ = events.send(SignalingEvent::Established);
            }
            ConnectBehavior::EstablishAfter(delay) => {
                let delay = *delay;
                let sink = events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = sink.send(SignalingEvent::Established);
                });
            }
            ConnectBehavior::Fail(error) => {
                let _ = events.send(SignalingEvent::Failed(error.clone()));
            }
            ConnectBehavior::RejectStart(error) => return Err(error.clone()),
            ConnectBehavior::EstablishThenDrop(reason) => {
                let _ = events.send(SignalingEvent::Established);
                let _ = events.send(SignalingEvent::Disconnected(reason.clone()));
            }
            ConnectBehavior::Hang => {}
        }

        *lock(&self.sink) = Some(events);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.journal.record(Call::Disconnect);
        if let Some(delay) = self.disconnect_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.disconnect_error {
            return Err(error.clone());
        }
        // Real transports report their own closure as well
        self.drop_connection(MOCK_CLOSED_REASON);
        Ok(())
    }
}

/// Scripted [`SignalingLibrary`]
pub struct MockSignalingLibrary {
    journal: CallJournal,
    init_failures: Mutex<VecDeque<ProviderError>>,
    default_behavior: Mutex<ConnectBehavior>,
    queued_behaviors: Mutex<VecDeque<ConnectBehavior>>,
    disconnect_error: Mutex<Option<ProviderError>>,
    disconnect_delay: Mutex<Option<Duration>>,
    connections: Mutex<Vec<Arc<MockSignalingConnection>>>,
    last_params: Mutex<Option<ConnectionParams>>,
}

impl MockSignalingLibrary {
    pub fn new(journal: CallJournal) -> Self {
        Self {
            journal,
            init_failures: Mutex::new(VecDeque::new()),
            default_behavior: Mutex::new(ConnectBehavior::Establish),
            queued_behaviors: Mutex::new(VecDeque::new()),
            disconnect_error: Mutex::new(None),
            disconnect_delay: Mutex::new(None),
            connections: Mutex::new(Vec::new()),
            last_params: Mutex::new(None),
        }
    }

    /// Make the next `init` call fail
    pub fn fail_init_once(&self, error: ProviderError) {
        lock(&self.init_failures).push_back(error);
    }

    /// Behavior for every connection without a queued behavior
    pub fn set_connect_behavior(&self, behavior: ConnectBehavior) {
        *lock(&self.default_behavior) = behavior;
    }

    /// Behavior for the next connection only
    pub fn queue_connect_behavior(&self, behavior: ConnectBehavior) {
        lock(&self.queued_behaviors).push_back(behavior);
    }

    pub fn fail_disconnect(&self, error: ProviderError) {
        *lock(&self.disconnect_error) = Some(error);
    }

    pub fn set_disconnect_delay(&self, delay: Duration) {
        *lock(&self.disconnect_delay) = Some(delay);
    }

    /// Report `DISCONNECTED` on every connection created so far
    pub fn drop_connections(&self, reason: &str) -> usize {
        lock(&self.connections)
            .iter()
            .filter(|c| c.drop_connection(reason))
            .count()
    }

    pub fn last_connection(&self) -> Option<Arc<MockSignalingConnection>> {
        lock(&self.connections).last().cloned()
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.connections).len()
    }

    pub fn last_params(&self) -> Option<ConnectionParams> {
        lock(&self.last_params).clone()
    }
}

#[async_trait]
impl SignalingLibrary for MockSignalingLibrary {
    async fn init(&self) -> Result<(), ProviderError> {
        self.journal.record(Call::LibraryInit);
        let failure = lock(&self.init_failures).pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn create_connection(&self, params: ConnectionParams) -> Result<Arc<dyn SignalingConnection>, ProviderError> {
        self.journal.record(Call::CreateConnection { url: params.url.clone() });

        let behavior = lock(&self.queued_behaviors)
            .pop_front()
            .unwrap_or_else(|| lock(&self.default_behavior).clone());
        let connection = Arc::new(MockSignalingConnection {
            journal: self.journal.clone(),
            behavior,
            sink: Mutex::new(None),
            disconnect_error: lock(&self.disconnect_error).clone(),
            disconnect_delay: *lock(&self.disconnect_delay),
        });

        *lock(&self.last_params) = Some(params);
        lock(&self.connections).push(connection.clone());
        Ok(connection)
    }
}

/// Scripted [`LocalResourceProvider`]
pub struct MockResourceProvider {
    journal: CallJournal,
    devices: Vec<LocalResource>,
    acquire_error: Mutex<Option<ProviderError>>,
    release_error: Mutex<Option<ProviderError>>,
    acquire_delay: Mutex<Option<Duration>>,
    release_delay: Mutex<Option<Duration>>,
    released: Mutex<Vec<Uuid>>,
}

impl MockResourceProvider {
    /// Provider handing out one microphone and one camera
    pub fn new(journal: CallJournal) -> Self {
        Self::with_devices(
            journal,
            vec![
                LocalResource {
                    device_id: "mock-mic-0".to_string(),
                    kind: ResourceKind::AudioCapture,
                    label: "Mock Microphone".to_string(),
                },
                LocalResource {
                    device_id: "mock-cam-0".to_string(),
                    kind: ResourceKind::VideoCapture,
                    label: "Mock Camera".to_string(),
                },
            ],
        )
    }

    pub fn with_devices(journal: CallJournal, devices: Vec<LocalResource>) -> Self {
        Self {
            journal,
            devices,
            acquire_error: Mutex::new(None),
            release_error: Mutex::new(None),
            acquire_delay: Mutex::new(None),
            release_delay: Mutex::new(None),
            released: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_acquire(&self, error: ProviderError) {
        *lock(&self.acquire_error) = Some(error);
    }

    pub fn fail_release(&self, error: ProviderError) {
        *lock(&self.release_error) = Some(error);
    }

    pub fn set_acquire_delay(&self, delay: Duration) {
        *lock(&self.acquire_delay) = Some(delay);
    }

    pub fn set_release_delay(&self, delay: Duration) {
        *lock(&self.release_delay) = Some(delay);
    }

    /// Ids of every resource set handed back through `release`
    pub fn released(&self) -> Vec<Uuid> {
        lock(&self.released).clone()
    }
}

#[async_trait]
impl LocalResourceProvider for MockResourceProvider {
    async fn acquire(&self) -> Result<LocalResourceSet, ProviderError> {
        self.journal.record(Call::Acquire);
        let delay = *lock(&self.acquire_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = lock(&self.acquire_error).clone();
        match failure {
            Some(error) => Err(error),
            None => Ok(LocalResourceSet::new(self.devices.clone())),
        }
    }

    async fn release(&self, resources: LocalResourceSet) -> Result<(), ProviderError> {
        self.journal.record(Call::Release);
        lock(&self.released).push(resources.id);
        let delay = *lock(&self.release_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = lock(&self.release_error).clone();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Scripted [`SessionProvider`]
pub struct MockSessionProvider {
    journal: CallJournal,
    join_error: Mutex<Option<ProviderError>>,
    leave_error: Mutex<Option<ProviderError>>,
    join_delay: Mutex<Option<Duration>>,
    leave_delay: Mutex<Option<Duration>>,
}

impl MockSessionProvider {
    pub fn new(journal: CallJournal) -> Self {
        Self {
            journal,
            join_error: Mutex::new(None),
            leave_error: Mutex::new(None),
            join_delay: Mutex::new(None),
            leave_delay: Mutex::new(None),
        }
    }

    pub fn fail_join(&self, error: ProviderError) {
        *lock(&self.join_error) = Some(error);
    }

    pub fn fail_leave(&self, error: ProviderError) {
        *lock(&self.leave_error) = Some(error);
    }

    pub fn set_join_delay(&self, delay: Duration) {
        *lock(&self.join_delay) = Some(delay);
    }

    pub fn set_leave_delay(&self, delay: Duration) {
        *lock(&self.leave_delay) = Some(delay);
    }
}

#[async_trait]
impl SessionProvider for MockSessionProvider {
    async fn join(&self, session_id: &SessionId) -> Result<(), ProviderError> {
        self.journal.record(Call::Join(session_id.to_string()));
        let delay = *lock(&self.join_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = lock(&self.join_error).clone();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn leave(&self) -> Result<(), ProviderError> {
        self.journal.record(Call::Leave);
        let delay = *lock(&self.leave_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = lock(&self.leave_error).clone();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
