//! Connection state machine
//!
//! ```text
//! Idle ──begin_connect──▶ Connecting ──ESTABLISHED──▶ Established ──DISCONNECTED / close──▶ Disconnected
//!                              │
//!                              └──FAILED / fail──▶ Failed
//! ```
//!
//! Every signaling event is fed through [`ConnectionStateMachine::apply`].
//! Events that are not valid in the current state are reported as
//! [`Transition::Ignored`] instead of changing anything, which is what makes
//! `Established`/`Failed` mutually exclusive and `Disconnected` one-shot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult, ProviderError};
use crate::providers::SignalingEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Established,
    Disconnected,
    Failed,
}

impl ConnectionState {
    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of feeding an input to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Established,
    Failed(ProviderError),
    Disconnected(String),
    /// Input was not valid in `state` and had no effect
    Ignored {
        state: ConnectionState,
        input: &'static str,
    },
}

impl Transition {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Transition::Ignored { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    changed_at: DateTime<Utc>,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            changed_at: Utc::now(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// When the current state was entered
    pub fn changed_at(&self) -> DateTime<Utc> {
        self.changed_at
    }

    /// Idle → Connecting; a machine drives exactly one attempt
    pub fn begin_connect(&mut self) -> OrchestratorResult<()> {
        match self.state {
            ConnectionState::Idle => {
                self.enter(ConnectionState::Connecting);
                Ok(())
            }
            other => Err(OrchestratorError::invalid_state("Idle", other.to_string())),
        }
    }

    /// Feed a signaling event
    pub fn apply(&mut self, event: &SignalingEvent) -> Transition {
        match (self.state, event) {
            (ConnectionState::Connecting, SignalingEvent::Established) => {
                self.enter(ConnectionState::Established);
                Transition::Established
            }
            (ConnectionState::Connecting, SignalingEvent::Failed(error)) => {
                self.enter(ConnectionState::Failed);
                Transition::Failed(error.clone())
            }
            (ConnectionState::Established, SignalingEvent::Disconnected(reason)) => {
                self.enter(ConnectionState::Disconnected);
                Transition::Disconnected(reason.clone())
            }
            (state, event) => Transition::Ignored {
                state,
                input: event.name(),
            },
        }
    }

    /// Local failure while connecting (timeout, dropped channel)
    pub fn fail(&mut self, error: ProviderError) -> Transition {
        if self.state == ConnectionState::Connecting {
            self.enter(ConnectionState::Failed);
            Transition::Failed(error)
        } else {
            Transition::Ignored {
                state: self.state,
                input: "fail",
            }
        }
    }

    /// Local close of an established connection
    pub fn close(&mut self, reason: impl Into<String>) -> Transition {
        if self.state == ConnectionState::Established {
            self.enter(ConnectionState::Disconnected);
            Transition::Disconnected(reason.into())
        } else {
            Transition::Ignored {
                state: self.state,
                input: "close",
            }
        }
    }

    fn enter(&mut self, state: ConnectionState) {
        self.state = state;
        self.changed_at = Utc::now();
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
