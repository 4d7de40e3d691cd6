//! Collaborator interfaces
//!
//! The orchestrator does not implement signaling, media capture or session
//! semantics. It drives three collaborators through the traits below:
//!
//! - [`SignalingLibrary`] / [`SignalingConnection`] - handshake and transport
//! - [`LocalResourceProvider`] - local capture devices
//! - [`SessionProvider`] - membership in the shared session
//!
//! A signaling connection reports its progress as [`SignalingEvent`] values
//! pushed into a channel handed to [`SignalingConnection::connect`]. The
//! channel exists before the handshake starts, so no event can be missed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::SessionId;
use crate::error::ProviderError;

/// Progress notifications emitted by a signaling connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    /// Handshake completed
    Established,
    /// Handshake failed
    Failed(ProviderError),
    /// An established connection went away
    Disconnected(String),
}

impl SignalingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SignalingEvent::Established => "ESTABLISHED",
            SignalingEvent::Failed(_) => "FAILED",
            SignalingEvent::Disconnected(_) => "DISCONNECTED",
        }
    }
}

/// Sending half of a connection's event channel
pub type SignalingEventSink = mpsc::UnboundedSender<SignalingEvent>;

/// Parameters for constructing a signaling connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub app_id: Option<String>,
    pub auth_token: String,
    /// Fully composed signaling URL, session parameters included
    pub url: String,
}

/// Entry point of the underlying signaling library
#[async_trait]
pub trait SignalingLibrary: Send + Sync {
    /// One-time library initialization
    async fn init(&self) -> Result<(), ProviderError>;

    /// Construct (but do not start) a connection
    fn create_connection(&self, params: ConnectionParams) -> Result<Arc<dyn SignalingConnection>, ProviderError>;
}

/// A single signaling connection as exposed by the library
#[async_trait]
pub trait SignalingConnection: Send + Sync {
    /// Start the handshake; the outcome arrives on `events`
    ///
    /// An `Err` here means the attempt could not even start and is treated
    /// like a `Failed` event.
    fn connect(&self, events: SignalingEventSink) -> Result<(), ProviderError>;

    /// Close the connection; resolves once the transport is fully closed
    async fn disconnect(&self) -> Result<(), ProviderError>;
}

/// Kind of local capture resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Microphone capture
    AudioCapture,
    /// Camera capture
    VideoCapture,
    /// Screen or window capture
    ScreenCapture,
}

/// One acquired local resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalResource {
    /// Device identifier as reported by the provider
    pub device_id: String,
    pub kind: ResourceKind,
    /// Human-readable device name
    pub label: String,
}

/// Set of local resources acquired for one orchestration attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalResourceSet {
    pub id: Uuid,
    pub resources: Vec<LocalResource>,
    pub acquired_at: DateTime<Utc>,
}

impl LocalResourceSet {
    pub fn new(resources: Vec<LocalResource>) -> Self {
        Self {
            id: Uuid::new_v4(),
            resources,
            acquired_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn has(&self, kind: ResourceKind) -> bool {
        self.resources.iter().any(|r| r.kind == kind)
    }

    pub fn summary(&self) -> ResourceSummary {
        ResourceSummary {
            set_id: self.id,
            kinds: self.resources.iter().map(|r| r.kind).collect(),
        }
    }
}

/// Lightweight description of an acquired resource set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub set_id: Uuid,
    pub kinds: Vec<ResourceKind>,
}

/// Acquires and releases local media resources
#[async_trait]
pub trait LocalResourceProvider: Send + Sync {
    async fn acquire(&self) -> Result<LocalResourceSet, ProviderError>;

    async fn release(&self, resources: LocalResourceSet) -> Result<(), ProviderError>;
}

/// Joins and leaves the shared session
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn join(&self, session_id: &SessionId) -> Result<(), ProviderError>;

    async fn leave(&self) -> Result<(), ProviderError>;
}
