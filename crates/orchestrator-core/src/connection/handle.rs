//! Connection handle
//!
//! Wraps exactly one [`SignalingConnection`] for one connection attempt. The
//! handle owns the event channel of that connection and the state machine
//! that interprets it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::form_urlencoded;
use uuid::Uuid;

use crate::config::{ConnectionConfig, SessionId, SessionOptions};
use crate::connection::state::{ConnectionState, ConnectionStateMachine, Transition};
use crate::error::{OrchestratorError, OrchestratorResult, ProviderError};
use crate::events::{EventEmitter, LifecycleEvent};
use crate::providers::{ConnectionParams, SignalingConnection, SignalingEvent, SignalingLibrary};

/// Reason reported when the application closes the connection itself
pub const CLIENT_DISCONNECT_REASON: &str = "client disconnect";

/// Public description of a connection, carried by lifecycle events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: Uuid,
    /// Signaling URL the connection was opened against
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            created_at: Utc::now(),
        }
    }
}

/// Compose the signaling URL for a connection
///
/// The endpoint text is kept verbatim; query pairs are appended with `?` or
/// `&` as appropriate. The session pair is only added when `session_id` is set.
///
/// ```rust
/// use rtc_orchestrator_core::config::{SessionId, SessionOptions};
/// use rtc_orchestrator_core::connection::build_signaling_url;
///
/// let room = SessionId::from("room1");
/// let url = build_signaling_url("wss://x", &SessionOptions::default(), Some(&room));
/// assert_eq!(url, "wss://x?room=room1");
/// ```
pub fn build_signaling_url(endpoint: &str, options: &SessionOptions, session_id: Option<&SessionId>) -> String {
    let mut pairs: Vec<(&str, &str)> = options
        .extra_query
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    if let Some(session_id) = session_id {
        pairs.push((options.session_param.as_str(), session_id.as_str()));
    }
    if pairs.is_empty() {
        return endpoint.to_string();
    }

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();

    let separator = if !endpoint.contains('?') {
        "?"
    } else if endpoint.ends_with('?') || endpoint.ends_with('&') {
        ""
    } else {
        "&"
    };
    format!("{}{}{}", endpoint, separator, query)
}

/// Live handle to one signaling connection
///
/// Obtained from [`ConnectionHandle::connect`], which only resolves once the
/// handshake has settled. After the owner has published `Established` via
/// [`publish_established`](Self::publish_established), a background watcher
/// turns the first `DISCONNECTED` into a lifecycle event.
pub struct ConnectionHandle {
    info: ConnectionInfo,
    connection: Arc<dyn SignalingConnection>,
    machine: Arc<Mutex<ConnectionStateMachine>>,
    emitter: Arc<EventEmitter>,
    /// Events received after settlement, consumed by the watcher once published
    pending_events: Option<mpsc::UnboundedReceiver<SignalingEvent>>,
    watcher: Option<JoinHandle<()>>,
    published: bool,
    closed: bool,
}

impl ConnectionHandle {
    /// Open a connection and wait until it is established or has failed
    ///
    /// The event channel is created before the handshake starts. Settlement is
    /// bounded by `timeout`; on expiry the attempt is marked failed and the
    /// half-open connection is closed on a best-effort basis.
    pub async fn connect(
        library: &dyn SignalingLibrary,
        config: &ConnectionConfig,
        session_id: Option<&SessionId>,
        emitter: Arc<EventEmitter>,
        timeout: Duration,
    ) -> OrchestratorResult<Self> {
        let url = build_signaling_url(&config.endpoint, &config.session_options, session_id);
        let info = ConnectionInfo::new(url.clone());
        debug!(connection_id = %info.id, url = %url, "Opening signaling connection");

        let connection = library
            .create_connection(ConnectionParams {
                app_id: config.app_id.clone(),
                auth_token: config.auth_token.clone(),
                url,
            })
            .map_err(OrchestratorError::connection)?;

        let mut machine = ConnectionStateMachine::new();
        machine.begin_connect()?;
        let machine = Arc::new(Mutex::new(machine));

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        if let Err(e) = connection.connect(events_tx) {
            machine.lock().await.fail(e.clone());
            return Err(OrchestratorError::connection(e));
        }

        let settled = tokio::time::timeout(timeout, Self::await_settlement(&info, &machine, &mut events_rx)).await;

        match settled {
            Ok(Ok(())) => {
                info!(connection_id = %info.id, "Signaling connection established");
                Ok(Self {
                    info,
                    connection,
                    machine,
                    emitter,
                    pending_events: Some(events_rx),
                    watcher: None,
                    published: false,
                    closed: false,
                })
            }
            Ok(Err(e)) => {
                debug!(connection_id = %info.id, error = %e, "Signaling connection failed");
                Err(e)
            }
            Err(_) => {
                let duration_ms = timeout.as_millis() as u64;
                machine
                    .lock()
                    .await
                    .fail(ProviderError::transient(format!("connect timed out after {}ms", duration_ms)));
                warn!(connection_id = %info.id, timeout_ms = duration_ms, "Signaling connection timed out");
                if let Err(e) = connection.disconnect().await {
                    warn!(connection_id = %info.id, error = %e, "Failed to close timed out connection");
                }
                Err(OrchestratorError::OperationTimeout {
                    operation: "connect".to_string(),
                    duration_ms,
                })
            }
        }
    }

    async fn await_settlement(
        info: &ConnectionInfo,
        machine: &Mutex<ConnectionStateMachine>,
        events: &mut mpsc::UnboundedReceiver<SignalingEvent>,
    ) -> OrchestratorResult<()> {
        while let Some(event) = events.recv().await {
            let transition = machine.lock().await.apply(&event);
            match transition {
                Transition::Established => return Ok(()),
                Transition::Failed(error) => return Err(OrchestratorError::connection(error)),
                Transition::Disconnected(reason) => {
                    // Not reachable from Connecting, kept for exhaustiveness
                    return Err(OrchestratorError::ConnectionClosed { reason });
                }
                Transition::Ignored { state, input } => {
                    debug!(connection_id = %info.id, %state, event = input, "Ignoring signaling event");
                }
            }
        }

        let reason = "signaling event channel closed".to_string();
        machine.lock().await.fail(ProviderError::new(reason.clone()));
        Err(OrchestratorError::ConnectionClosed { reason })
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn id(&self) -> Uuid {
        self.info.id
    }

    pub async fn state(&self) -> ConnectionState {
        self.machine.lock().await.state()
    }

    /// Emit `Established` and start watching for the first disconnect
    ///
    /// Any `DISCONNECTED` that arrived in between was buffered and is
    /// processed now, so `Disconnected` can never precede `Established`.
    /// Calling this more than once has no effect.
    pub async fn publish_established(&mut self) {
        if self.published || self.closed {
            return;
        }
        self.published = true;

        self.emitter
            .emit(LifecycleEvent::Established {
                connection: self.info.clone(),
            })
            .await;

        if let Some(events) = self.pending_events.take() {
            self.watcher = Some(tokio::spawn(watch_disconnect(
                self.info.clone(),
                self.machine.clone(),
                self.emitter.clone(),
                events,
            )));
        }
    }

    /// Close the connection; a no-op when it never connected or is already closed
    pub async fn disconnect(&mut self) -> OrchestratorResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Closing the machine first makes the watcher ignore anything the
        // transport reports about its own shutdown.
        let (state, transition) = {
            let mut machine = self.machine.lock().await;
            let state = machine.state();
            (state, machine.close(CLIENT_DISCONNECT_REASON))
        };

        if let Some(watcher) = self.watcher.take() {
            if state == ConnectionState::Disconnected {
                // The watcher owns the remote disconnect and finishes right after emitting it
                if let Err(e) = watcher.await {
                    warn!(connection_id = %self.info.id, error = %e, "Disconnect watcher did not finish cleanly");
                }
            } else {
                watcher.abort();
            }
        }
        self.pending_events = None;

        // Emitted before the transport close, which the teardown step timeout may cancel
        if let Transition::Disconnected(reason) = transition {
            if self.published {
                self.emitter
                    .emit(LifecycleEvent::Disconnected {
                        connection: self.info.clone(),
                        reason,
                    })
                    .await;
            }
        }

        let result = match state {
            ConnectionState::Established | ConnectionState::Disconnected => {
                debug!(connection_id = %self.info.id, %state, "Disconnecting signaling connection");
                self.connection
                    .disconnect()
                    .await
                    .map_err(|e| OrchestratorError::teardown("disconnect", e))
            }
            _ => Ok(()),
        };

        info!(connection_id = %self.info.id, "Signaling connection closed");
        result
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("info", &self.info)
            .field("published", &self.published)
            .field("closed", &self.closed)
            .finish()
    }
}

async fn watch_disconnect(
    info: ConnectionInfo,
    machine: Arc<Mutex<ConnectionStateMachine>>,
    emitter: Arc<EventEmitter>,
    mut events: mpsc::UnboundedReceiver<SignalingEvent>,
) {
    while let Some(event) = events.recv().await {
        let transition = machine.lock().await.apply(&event);
        match transition {
            Transition::Disconnected(reason) => {
                info!(connection_id = %info.id, reason = %reason, "Signaling connection lost");
                emitter
                    .emit(LifecycleEvent::Disconnected {
                        connection: info.clone(),
                        reason,
                    })
                    .await;
                return;
            }
            Transition::Ignored { state, input } => {
                debug!(connection_id = %info.id, %state, event = input, "Ignoring signaling event");
                if state.is_terminal() {
                    return;
                }
            }
            _ => {}
        }
    }
}
