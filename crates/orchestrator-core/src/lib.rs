//! Session establishment orchestration for real-time communication clients
//!
//! Entering a session takes a handful of asynchronous collaborators that must
//! be driven in a precise order: a signaling library that needs one-time
//! initialization, a signaling connection whose handshake completes through
//! events, local capture devices, and a session service to join. This crate
//! sequences them and reports the connection lifecycle to the application.
//!
//! - [`connection::ConnectionHandle`] turns the event-driven handshake into an
//!   awaitable outcome
//! - [`orchestrator::SessionOrchestrator`] runs initialization and teardown
//! - [`events::EventEmitter`] publishes `Established`, `Disconnected` and
//!   `Failed` lifecycle events
//!
//! Collaborators are supplied through the traits in [`providers`]; in-memory
//! versions live in [`mock`].

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod mock;
pub mod orchestrator;
pub mod pipeline;
pub mod providers;
pub mod recovery;
pub mod runtime;

pub use config::{ConnectionConfig, OrchestratorConfig, SessionId, SessionOptions};
pub use connection::{ConnectionHandle, ConnectionInfo, ConnectionState};
pub use error::{OrchestratorError, OrchestratorResult, ProviderError};
pub use events::{
    EventEmitter, EventFilter, EventSubscription, LifecycleEvent, LifecycleEventHandler, LifecycleEventKind,
};
pub use orchestrator::{
    InitializeReport, OrchestratorBuilder, OrchestratorState, OrchestratorStats, SessionOrchestrator,
    TeardownReport,
};
pub use providers::{
    LocalResourceProvider, LocalResourceSet, SessionProvider, SignalingConnection, SignalingEvent,
    SignalingLibrary,
};
pub use recovery::RetryConfig;
pub use runtime::{InitToken, SignalingRuntime};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
