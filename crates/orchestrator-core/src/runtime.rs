//! Process-scoped signaling library initialization
//!
//! The signaling library must be initialized once before any connection is
//! created. Instead of module-level global state, the application creates a
//! single [`SignalingRuntime`] and shares it (behind an `Arc`) with every
//! orchestrator. [`SignalingRuntime::ensure_initialized`] runs the library's
//! `init` at most once successfully and hands out an [`InitToken`] as proof.
//!
//! A failed `init` leaves the runtime uninitialized, so a later orchestration
//! attempt calls `init` again.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::providers::SignalingLibrary;

/// Proof that the signaling library has been initialized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitToken {
    initialized_at: DateTime<Utc>,
}

impl InitToken {
    pub fn initialized_at(&self) -> DateTime<Utc> {
        self.initialized_at
    }
}

pub struct SignalingRuntime {
    library: Arc<dyn SignalingLibrary>,
    token: OnceCell<InitToken>,
}

impl SignalingRuntime {
    pub fn new(library: Arc<dyn SignalingLibrary>) -> Self {
        Self {
            library,
            token: OnceCell::new(),
        }
    }

    /// Initialize the library if needed; concurrent callers share one `init`
    pub async fn ensure_initialized(&self) -> OrchestratorResult<InitToken> {
        if let Some(token) = self.token.get() {
            debug!("Signaling library already initialized");
            return Ok(*token);
        }

        let token = self
            .token
            .get_or_try_init(|| async {
                self.library.init().await.map_err(|e| {
                    error!(error = %e, "Signaling library initialization failed");
                    OrchestratorError::initialization(e)
                })?;
                info!("Signaling library initialized");
                Ok::<_, OrchestratorError>(InitToken {
                    initialized_at: Utc::now(),
                })
            })
            .await?;
        Ok(*token)
    }

    pub fn token(&self) -> Option<InitToken> {
        self.token.get().copied()
    }

    pub fn is_initialized(&self) -> bool {
        self.token.initialized()
    }

    pub fn library(&self) -> &Arc<dyn SignalingLibrary> {
        &self.library
    }
}

impl fmt::Debug for SignalingRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalingRuntime")
            .field("token", &self.token.get())
            .finish()
    }
}
