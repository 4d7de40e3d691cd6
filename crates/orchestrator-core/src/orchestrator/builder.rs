//! Orchestrator builder
//!
//! Collects the collaborators a [`SessionOrchestrator`] needs and validates
//! the configuration before handing one out.

use std::sync::Arc;

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::EventEmitter;
use crate::orchestrator::SessionOrchestrator;
use crate::providers::{LocalResourceProvider, SessionProvider, SignalingLibrary};
use crate::runtime::SignalingRuntime;

/// Builder for [`SessionOrchestrator`]
///
/// A signaling runtime (or a library to wrap in a fresh one), a resource
/// provider and a session provider are required. Orchestrators that should
/// share one library initialization must be given the same runtime.
#[derive(Default)]
pub struct OrchestratorBuilder {
    runtime: Option<Arc<SignalingRuntime>>,
    resource_provider: Option<Arc<dyn LocalResourceProvider>>,
    session_provider: Option<Arc<dyn SessionProvider>>,
    emitter: Option<Arc<EventEmitter>>,
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signaling_runtime(mut self, runtime: Arc<SignalingRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Use `library` through a runtime owned by this orchestrator
    pub fn signaling_library(mut self, library: Arc<dyn SignalingLibrary>) -> Self {
        self.runtime = Some(Arc::new(SignalingRuntime::new(library)));
        self
    }

    pub fn resource_provider(mut self, provider: Arc<dyn LocalResourceProvider>) -> Self {
        self.resource_provider = Some(provider);
        self
    }

    pub fn session_provider(mut self, provider: Arc<dyn SessionProvider>) -> Self {
        self.session_provider = Some(provider);
        self
    }

    /// Publish lifecycle events on an existing emitter
    pub fn event_emitter(mut self, emitter: Arc<EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> OrchestratorResult<SessionOrchestrator> {
        self.config.validate()?;

        let runtime = self.runtime.ok_or_else(|| OrchestratorError::MissingConfiguration {
            field: "signaling_runtime".to_string(),
        })?;
        let resource_provider = self.resource_provider.ok_or_else(|| OrchestratorError::MissingConfiguration {
            field: "resource_provider".to_string(),
        })?;
        let session_provider = self.session_provider.ok_or_else(|| OrchestratorError::MissingConfiguration {
            field: "session_provider".to_string(),
        })?;
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(EventEmitter::new()));

        Ok(SessionOrchestrator::new(
            runtime,
            resource_provider,
            session_provider,
            emitter,
            self.config,
        ))
    }
}
