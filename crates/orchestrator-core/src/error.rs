//! Error types for session orchestration
//!
//! Errors are split by the lifecycle step that produced them so callers can
//! react to the stage that failed rather than parsing messages.
//!
//! # Error Categories
//!
//! - **Initialization** - the signaling library could not be initialized; fatal
//! - **Connection** - the signaling handshake failed; session join is skipped
//! - **Resources** - local media could not be acquired; the connection attempt
//!   still runs to completion
//! - **Session** - joining the session failed after a successful connection
//! - **Teardown** - a single teardown step failed; logged and isolated
//! - **Configuration / State / Timeout** - problems raised by this crate itself
//!
//! Collaborators report failures as [`ProviderError`]. The orchestrator wraps
//! that value in the kind-specific variant without altering it, so the
//! originating error can always be recovered:
//!
//! ```rust
//! use rtc_orchestrator_core::{OrchestratorError, ProviderError};
//!
//! let err = OrchestratorError::connection(ProviderError::new("auth"));
//! assert_eq!(err.provider_error().map(|e| e.message.as_str()), Some("auth"));
//! assert_eq!(err.category(), "connection");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Error value reported by an external collaborator
///
/// The signaling library, resource provider and session provider all fail
/// with this type. `transient` marks failures worth retrying (network blips,
/// busy devices); permanent failures such as rejected credentials leave it unset.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ProviderError {
    /// Human-readable reason as reported by the collaborator
    pub message: String,
    /// Whether retrying the same operation may succeed
    pub transient: bool,
}

impl ProviderError {
    /// Create a permanent provider error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }

    /// Create a provider error that is worth retrying
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }
}

/// Errors produced while establishing or tearing down a session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("Signaling library initialization failed: {source}")]
    Initialization { source: ProviderError },

    #[error("Connection failed: {source}")]
    Connection { source: ProviderError },

    #[error("Local resource acquisition failed: {source}")]
    ResourceAcquisition { source: ProviderError },

    #[error("Session join failed: {source}")]
    SessionJoin { source: ProviderError },

    #[error("Teardown step '{step}' failed: {source}")]
    Teardown { step: String, source: ProviderError },

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Missing required configuration: {field}")]
    MissingConfiguration { field: String },

    #[error("Invalid orchestrator state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("Operation '{operation}' timed out after {duration_ms}ms")]
    OperationTimeout { operation: String, duration_ms: u64 },

    #[error("Connection closed before it settled: {reason}")]
    ConnectionClosed { reason: String },
}

impl OrchestratorError {
    /// Create an initialization error
    pub fn initialization(source: ProviderError) -> Self {
        Self::Initialization { source }
    }

    /// Create a connection error
    pub fn connection(source: ProviderError) -> Self {
        Self::Connection { source }
    }

    /// Create a resource acquisition error
    pub fn resource_acquisition(source: ProviderError) -> Self {
        Self::ResourceAcquisition { source }
    }

    /// Create a session join error
    pub fn session_join(source: ProviderError) -> Self {
        Self::SessionJoin { source }
    }

    /// Create a teardown error for the named step
    pub fn teardown(step: impl Into<String>, source: ProviderError) -> Self {
        Self::Teardown {
            step: step.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// The collaborator error carried by this error, if any
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            OrchestratorError::Initialization { source }
            | OrchestratorError::Connection { source }
            | OrchestratorError::ResourceAcquisition { source }
            | OrchestratorError::SessionJoin { source }
            | OrchestratorError::Teardown { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Check if retrying the failed operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            OrchestratorError::OperationTimeout { .. } => true,

            OrchestratorError::Connection { source }
            | OrchestratorError::ResourceAcquisition { source }
            | OrchestratorError::SessionJoin { source } => source.transient,

            // Init failures are never retried inside this crate
            OrchestratorError::Initialization { .. } => false,

            _ => false,
        }
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            OrchestratorError::Initialization { .. } => "initialization",
            OrchestratorError::Connection { .. } | OrchestratorError::ConnectionClosed { .. } => {
                "connection"
            }
            OrchestratorError::ResourceAcquisition { .. } => "resources",
            OrchestratorError::SessionJoin { .. } => "session",
            OrchestratorError::Teardown { .. } => "teardown",
            OrchestratorError::InvalidConfiguration { .. }
            | OrchestratorError::MissingConfiguration { .. } => "configuration",
            OrchestratorError::InvalidState { .. } => "state",
            OrchestratorError::OperationTimeout { .. } => "timeout",
        }
    }
}
