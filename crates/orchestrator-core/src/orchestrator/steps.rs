//! Initialization and teardown pipelines
//!
//! ```text
//! initialize (fail-fast):  init-library → connect-and-acquire → join-session
//! teardown   (isolated):   leave-session → disconnect → release-resources
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{ConnectionConfig, OrchestratorConfig, SessionId};
use crate::connection::ConnectionHandle;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::{EventEmitter, LifecycleEvent};
use crate::orchestrator::types::SessionContext;
use crate::pipeline::{Pipeline, StepStatus};
use crate::providers::{LocalResourceProvider, LocalResourceSet, SessionProvider};
use crate::recovery::{retry_with_backoff, with_timeout};
use crate::runtime::{InitToken, SignalingRuntime};

pub(crate) const STEP_INIT_LIBRARY: &str = "init-library";
pub(crate) const STEP_CONNECT_AND_ACQUIRE: &str = "connect-and-acquire";
pub(crate) const STEP_JOIN_SESSION: &str = "join-session";
pub(crate) const STEP_LEAVE_SESSION: &str = "leave-session";
pub(crate) const STEP_DISCONNECT: &str = "disconnect";
pub(crate) const STEP_RELEASE_RESOURCES: &str = "release-resources";

/// Collaborators plus everything one orchestration attempt produced
pub(crate) struct AttemptContext {
    pub(crate) runtime: Arc<SignalingRuntime>,
    pub(crate) resource_provider: Arc<dyn LocalResourceProvider>,
    pub(crate) session_provider: Arc<dyn SessionProvider>,
    pub(crate) emitter: Arc<EventEmitter>,
    pub(crate) config: OrchestratorConfig,

    pub(crate) connection_config: Option<ConnectionConfig>,
    pub(crate) session_id: Option<SessionId>,
    pub(crate) token: Option<InitToken>,
    pub(crate) connection: Option<ConnectionHandle>,
    pub(crate) resources: Option<LocalResourceSet>,
    pub(crate) resource_error: Option<OrchestratorError>,
    pub(crate) session: Option<SessionContext>,
}

impl AttemptContext {
    pub(crate) fn new(
        runtime: Arc<SignalingRuntime>,
        resource_provider: Arc<dyn LocalResourceProvider>,
        session_provider: Arc<dyn SessionProvider>,
        emitter: Arc<EventEmitter>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            runtime,
            resource_provider,
            session_provider,
            emitter,
            config,
            connection_config: None,
            session_id: None,
            token: None,
            connection: None,
            resources: None,
            resource_error: None,
            session: None,
        }
    }

    /// Start a fresh attempt
    pub(crate) fn begin(&mut self, connection_config: ConnectionConfig, session_id: SessionId) {
        self.connection_config = Some(connection_config);
        self.session_id = Some(session_id);
        self.resource_error = None;
    }

    /// Forget per-attempt inputs once teardown has run
    pub(crate) fn finish(&mut self) {
        self.connection_config = None;
        self.session_id = None;
        self.resource_error = None;
        self.token = None;
    }

    fn inputs(&self) -> OrchestratorResult<(ConnectionConfig, SessionId)> {
        match (&self.connection_config, &self.session_id) {
            (Some(config), Some(session_id)) => Ok((config.clone(), session_id.clone())),
            _ => Err(OrchestratorError::invalid_state("attempt started", "no attempt in progress")),
        }
    }
}

pub(crate) fn initialize_pipeline() -> Pipeline<AttemptContext> {
    Pipeline::new("initialize")
        .step(STEP_INIT_LIBRARY, init_library)
        .step(STEP_CONNECT_AND_ACQUIRE, connect_and_acquire)
        .step(STEP_JOIN_SESSION, join_session)
}

pub(crate) fn teardown_pipeline(step_timeout: Duration) -> Pipeline<AttemptContext> {
    Pipeline::new("teardown")
        .with_step_timeout(step_timeout)
        .step(STEP_LEAVE_SESSION, leave_session)
        .step(STEP_DISCONNECT, disconnect)
        .step(STEP_RELEASE_RESOURCES, release_resources)
}

fn init_library(ctx: &mut AttemptContext) -> BoxFuture<'_, OrchestratorResult<StepStatus>> {
    Box::pin(async move {
        ctx.token = Some(ctx.runtime.ensure_initialized().await?);
        Ok(StepStatus::Completed)
    })
}

/// Open the connection with the configured timeout and retry policy
async fn establish_connection(
    runtime: &SignalingRuntime,
    connection_config: &ConnectionConfig,
    session_id: &SessionId,
    emitter: &Arc<EventEmitter>,
    config: &OrchestratorConfig,
) -> OrchestratorResult<ConnectionHandle> {
    let library = runtime.library().as_ref();
    let timeout = config.connect_timeout;

    retry_with_backoff("connect", &config.connect_retry, move |_attempt| {
        let emitter = emitter.clone();
        async move { ConnectionHandle::connect(library, connection_config, Some(session_id), emitter, timeout).await }
    })
    .await
}

/// Connect and acquire local resources concurrently
///
/// Both operations always run to completion. A resource failure is recorded
/// but does not fail the step; a connection failure emits `Failed` and stops
/// the pipeline before session join.
fn connect_and_acquire(ctx: &mut AttemptContext) -> BoxFuture<'_, OrchestratorResult<StepStatus>> {
    Box::pin(async move {
        let (connection_config, session_id) = ctx.inputs()?;

        let (connected, acquired) = tokio::join!(
            establish_connection(&ctx.runtime, &connection_config, &session_id, &ctx.emitter, &ctx.config),
            ctx.resource_provider.acquire(),
        );

        match acquired {
            Ok(resources) => {
                info!(
                    session_id = %session_id,
                    resource_set = %resources.id,
                    count = resources.len(),
                    "Local resources acquired"
                );
                ctx.resources = Some(resources);
            }
            Err(e) => {
                let error = OrchestratorError::resource_acquisition(e);
                warn!(session_id = %session_id, error = %error, "Local resource acquisition failed");
                ctx.resource_error = Some(error);
            }
        }

        match connected {
            Ok(mut handle) => {
                handle.publish_established().await;
                ctx.connection = Some(handle);
                Ok(StepStatus::Completed)
            }
            Err(error) => {
                ctx.emitter
                    .emit(LifecycleEvent::Failed { error: error.clone() })
                    .await;
                Err(error)
            }
        }
    })
}

fn join_session(ctx: &mut AttemptContext) -> BoxFuture<'_, OrchestratorResult<StepStatus>> {
    Box::pin(async move {
        let (_, session_id) = ctx.inputs()?;
        if ctx.connection.is_none() {
            return Err(OrchestratorError::invalid_state("Established connection", "no connection"));
        }

        let provider = ctx.session_provider.clone();
        let join_id = session_id.clone();
        with_timeout(STEP_JOIN_SESSION, ctx.config.join_timeout, async move {
            provider.join(&join_id).await.map_err(OrchestratorError::session_join)
        })
        .await?;

        info!(session_id = %session_id, "Joined session");
        ctx.session = Some(SessionContext::new(session_id));
        Ok(StepStatus::Completed)
    })
}

fn leave_session(ctx: &mut AttemptContext) -> BoxFuture<'_, OrchestratorResult<StepStatus>> {
    Box::pin(async move {
        let Some(session) = ctx.session.take() else {
            return Ok(StepStatus::Skipped);
        };
        ctx.session_provider
            .leave()
            .await
            .map_err(|e| OrchestratorError::teardown(STEP_LEAVE_SESSION, e))?;
        info!(session_id = %session.session_id, "Left session");
        Ok(StepStatus::Completed)
    })
}

fn disconnect(ctx: &mut AttemptContext) -> BoxFuture<'_, OrchestratorResult<StepStatus>> {
    Box::pin(async move {
        let Some(mut handle) = ctx.connection.take() else {
            return Ok(StepStatus::Skipped);
        };
        handle.disconnect().await?;
        Ok(StepStatus::Completed)
    })
}

fn release_resources(ctx: &mut AttemptContext) -> BoxFuture<'_, OrchestratorResult<StepStatus>> {
    Box::pin(async move {
        let Some(resources) = ctx.resources.take() else {
            return Ok(StepStatus::Skipped);
        };
        let mut pending = PendingRelease::new(resources.id);
        let result = ctx.resource_provider.release(resources).await;
        let set_id = pending.settle();
        result.map_err(|e| OrchestratorError::teardown(STEP_RELEASE_RESOURCES, e))?;
        info!(resource_set = %set_id, "Local resources released");
        Ok(StepStatus::Completed)
    })
}

/// Warns with the set id when a release is dropped before the provider answered
struct PendingRelease {
    set_id: Uuid,
    settled: bool,
}

impl PendingRelease {
    fn new(set_id: Uuid) -> Self {
        Self { set_id, settled: false }
    }

    fn settle(&mut self) -> Uuid {
        self.settled = true;
        self.set_id
    }
}

impl Drop for PendingRelease {
    fn drop(&mut self) {
        if !self.settled {
            warn!(resource_set = %self.set_id, "Resource release abandoned before the provider answered");
        }
    }
}
