//! Lifecycle events and their delivery
//!
//! The orchestrator surfaces three discrete transitions to the rest of the
//! application:
//!
//! - **Established** - the signaling connection completed its handshake
//! - **Disconnected** - an established connection went away (at most once)
//! - **Failed** - the connection attempt failed
//!
//! Events are transient: they are dispatched, never stored. A subscriber that
//! registers late does not see earlier events.
//!
//! # Usage Examples
//!
//! ## Handler-based observer
//!
//! ```rust
//! use rtc_orchestrator_core::events::{EventEmitter, EventSubscription, LifecycleEventHandler};
//! use rtc_orchestrator_core::connection::ConnectionInfo;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct StatusBar;
//!
//! #[async_trait]
//! impl LifecycleEventHandler for StatusBar {
//!     async fn on_established(&self, connection: ConnectionInfo) {
//!         println!("online via {}", connection.url);
//!     }
//! }
//!
//! let emitter = EventEmitter::new();
//! let id = emitter.subscribe(EventSubscription::all_events(Arc::new(StatusBar)));
//! assert_eq!(emitter.subscription_count(), 1);
//! assert!(emitter.unsubscribe(id));
//! ```
//!
//! ## Stream-based observer
//!
//! ```rust
//! use rtc_orchestrator_core::events::EventEmitter;
//!
//! let emitter = EventEmitter::new();
//! let mut events = emitter.subscribe_stream();
//! assert!(events.try_recv().is_err()); // nothing is replayed
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error};
use uuid::Uuid;

use crate::connection::ConnectionInfo;
use crate::error::OrchestratorError;

/// Capacity of the broadcast channel used by stream subscribers
const STREAM_CAPACITY: usize = 64;

/// A lifecycle transition
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// The connection completed its handshake
    Established {
        connection: ConnectionInfo,
    },
    /// An established connection was closed or lost
    Disconnected {
        connection: ConnectionInfo,
        reason: String,
    },
    /// The connection attempt failed
    Failed {
        error: OrchestratorError,
    },
}

impl LifecycleEvent {
    pub fn kind(&self) -> LifecycleEventKind {
        match self {
            LifecycleEvent::Established { .. } => LifecycleEventKind::Established,
            LifecycleEvent::Disconnected { .. } => LifecycleEventKind::Disconnected,
            LifecycleEvent::Failed { .. } => LifecycleEventKind::Failed,
        }
    }

    /// Connection this event refers to; `Failed` carries none
    pub fn connection_id(&self) -> Option<Uuid> {
        match self {
            LifecycleEvent::Established { connection } | LifecycleEvent::Disconnected { connection, .. } => {
                Some(connection.id)
            }
            LifecycleEvent::Failed { .. } => None,
        }
    }

    pub fn passes_filter(&self, filter: &EventFilter) -> bool {
        if let Some(kinds) = &filter.kinds {
            if !kinds.contains(&self.kind()) {
                return false;
            }
        }

        if let Some(connection_ids) = &filter.connection_ids {
            match self.connection_id() {
                Some(id) if connection_ids.contains(&id) => {}
                _ => return false,
            }
        }

        true
    }
}

/// Discriminant of [`LifecycleEvent`], used for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEventKind {
    Established,
    Disconnected,
    Failed,
}

impl fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleEventKind::Established => "established",
            LifecycleEventKind::Disconnected => "disconnected",
            LifecycleEventKind::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Selects which events a subscription receives; `None` fields match everything
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub kinds: Option<HashSet<LifecycleEventKind>>,
    /// Restrict to specific connections. `Failed` events never match this.
    pub connection_ids: Option<HashSet<Uuid>>,
}

impl EventFilter {
    pub fn kinds(kinds: impl IntoIterator<Item = LifecycleEventKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
            connection_ids: None,
        }
    }
}

/// Observer of lifecycle transitions
///
/// This is the dispatch sink the surrounding application implements to keep
/// its observable connection status up to date. Every method has an empty
/// default, so implementors only override what they care about.
#[async_trait]
pub trait LifecycleEventHandler: Send + Sync {
    async fn on_established(&self, _connection: ConnectionInfo) {}

    async fn on_disconnected(&self, _connection: ConnectionInfo, _reason: String) {}

    async fn on_failed(&self, _error: OrchestratorError) {}

    /// Dispatch entry point; routes to the per-kind methods by default
    async fn on_lifecycle_event(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Established { connection } => self.on_established(connection).await,
            LifecycleEvent::Disconnected { connection, reason } => {
                self.on_disconnected(connection, reason).await
            }
            LifecycleEvent::Failed { error } => self.on_failed(error).await,
        }
    }
}

/// A registered handler together with its filter
#[derive(Clone)]
pub struct EventSubscription {
    handler: Arc<dyn LifecycleEventHandler>,
    filter: EventFilter,
    id: Uuid,
}

impl EventSubscription {
    pub fn new(handler: Arc<dyn LifecycleEventHandler>, filter: EventFilter) -> Self {
        Self {
            handler,
            filter,
            id: Uuid::new_v4(),
        }
    }

    pub fn all_events(handler: Arc<dyn LifecycleEventHandler>) -> Self {
        Self::new(handler, EventFilter::default())
    }

    pub fn for_kinds(
        handler: Arc<dyn LifecycleEventHandler>,
        kinds: impl IntoIterator<Item = LifecycleEventKind>,
    ) -> Self {
        Self::new(handler, EventFilter::kinds(kinds))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn should_receive(&self, event: &LifecycleEvent) -> bool {
        event.passes_filter(&self.filter)
    }

    pub async fn deliver_event(&self, event: LifecycleEvent) {
        if self.should_receive(&event) {
            self.handler.on_lifecycle_event(event).await;
        }
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish()
    }
}

/// Publishes lifecycle events to handler subscriptions and stream receivers
pub struct EventEmitter {
    subscriptions: DashMap<Uuid, EventSubscription>,
    stream_tx: broadcast::Sender<LifecycleEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (stream_tx, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            subscriptions: DashMap::new(),
            stream_tx,
        }
    }

    /// Register a subscription; it receives events emitted from now on
    pub fn subscribe(&self, subscription: EventSubscription) -> Uuid {
        let id = subscription.id();
        self.subscriptions.insert(id, subscription);
        id
    }

    pub fn unsubscribe(&self, subscription_id: Uuid) -> bool {
        self.subscriptions.remove(&subscription_id).is_some()
    }

    /// Receive every event emitted from now on as a stream
    pub fn subscribe_stream(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.stream_tx.subscribe()
    }

    /// Deliver `event` once to every matching subscription and stream receiver
    ///
    /// Handler deliveries run concurrently; this returns after all of them
    /// have finished.
    pub async fn emit(&self, event: LifecycleEvent) {
        debug!(kind = %event.kind(), subscribers = self.subscriptions.len(), "Emitting lifecycle event");

        // Snapshot so handlers may (un)subscribe without deadlocking the map
        let subscriptions: Vec<EventSubscription> =
            self.subscriptions.iter().map(|entry| entry.value().clone()).collect();

        let tasks: Vec<_> = subscriptions
            .into_iter()
            .map(|subscription| {
                let event_clone = event.clone();
                tokio::spawn(async move {
                    subscription.deliver_event(event_clone).await;
                })
            })
            .collect();

        for task in tasks {
            if let Err(e) = task.await {
                error!("Error delivering lifecycle event: {}", e);
            }
        }

        // No receivers is fine
        let _ = self.stream_tx.send(event);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("subscriptions", &self.subscriptions.len())
            .field("stream_receivers", &self.stream_tx.receiver_count())
            .finish()
    }
}
