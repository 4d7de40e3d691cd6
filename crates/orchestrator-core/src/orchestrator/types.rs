//! Orchestrator state and reports

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SessionId;
use crate::connection::ConnectionInfo;
use crate::error::OrchestratorError;
use crate::pipeline::{StepOutcome, StepReport};
use crate::providers::ResourceSummary;

/// High-level state of an orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrchestratorState {
    /// Nothing has been attempted yet
    Idle,
    /// `initialize` is running
    Initializing,
    /// Connected and joined
    Active,
    /// The last `initialize` failed; call `teardown` before retrying
    Failed,
    /// `teardown` is running
    TearingDown,
    /// Torn down; a new attempt may start
    Closed,
}

impl OrchestratorState {
    /// Whether `initialize` may be called in this state
    pub fn can_initialize(&self) -> bool {
        matches!(self, OrchestratorState::Idle | OrchestratorState::Closed)
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The joined session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub joined_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            joined_at: Utc::now(),
        }
    }
}

/// Result of a successful `initialize`
#[derive(Debug, Clone, PartialEq)]
pub struct InitializeReport {
    pub session_id: SessionId,
    pub connection: ConnectionInfo,
    /// Acquired local resources, if acquisition succeeded
    pub resources: Option<ResourceSummary>,
    /// Non-fatal acquisition failure; the session was joined without local media
    pub resource_error: Option<OrchestratorError>,
    pub steps: Vec<StepReport>,
}

impl InitializeReport {
    pub fn has_local_media(&self) -> bool {
        self.resources.is_some()
    }
}

/// Result of `teardown`; teardown itself never fails
#[derive(Debug, Clone, PartialEq)]
pub struct TeardownReport {
    pub steps: Vec<StepReport>,
}

impl TeardownReport {
    /// Every step either completed or had nothing to do
    pub fn is_clean(&self) -> bool {
        !self.steps.iter().any(|s| s.outcome.is_failed())
    }

    pub fn failures(&self) -> Vec<(&'static str, &OrchestratorError)> {
        self.steps
            .iter()
            .filter_map(|s| match &s.outcome {
                StepOutcome::Failed(e) => Some((s.step, e)),
                _ => None,
            })
            .collect()
    }

    pub fn outcome_of(&self, step: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step == step).map(|s| &s.outcome)
    }
}

/// Counters describing an orchestrator's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub state: OrchestratorState,
    pub attempts: u64,
    pub established: u64,
    pub failed: u64,
    pub teardowns: u64,
    pub last_transition: DateTime<Utc>,
}

impl Default for OrchestratorStats {
    fn default() -> Self {
        Self {
            state: OrchestratorState::Idle,
            attempts: 0,
            established: 0,
            failed: 0,
            teardowns: 0,
            last_transition: Utc::now(),
        }
    }
}
