//! Ordered task pipeline
//!
//! A [`Pipeline`] is a named list of steps executed strictly in order over a
//! shared context. It runs in one of two modes:
//!
//! - [`Pipeline::run_fail_fast`] stops at the first failing step and returns
//!   that step's error unchanged (used for initialization)
//! - [`Pipeline::run_isolated`] runs every step regardless of earlier failures
//!   and reports each outcome (used for teardown)
//!
//! Steps are plain functions so the order and fault-tolerance contract can be
//! read off the pipeline definition.
//!
//! ```rust
//! use futures::future::BoxFuture;
//! use rtc_orchestrator_core::pipeline::{Pipeline, StepOutcome, StepStatus};
//! use rtc_orchestrator_core::OrchestratorResult;
//!
//! fn bump(counter: &mut u32) -> BoxFuture<'_, OrchestratorResult<StepStatus>> {
//!     Box::pin(async move {
//!         *counter += 1;
//!         Ok(StepStatus::Completed)
//!     })
//! }
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::<u32>::new("demo").step("first", bump).step("second", bump);
//! let mut counter = 0;
//! let reports = pipeline.run_isolated(&mut counter).await;
//! assert_eq!(counter, 2);
//! assert!(reports.iter().all(|r| r.outcome == StepOutcome::Completed));
//! # })
//! ```

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::recovery::with_timeout;

/// What a successful step did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepStatus {
    Completed,
    /// Nothing to do, e.g. no session to leave
    Skipped,
}

/// Recorded result of one step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed,
    Skipped,
    Failed(OrchestratorError),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

impl From<StepStatus> for StepOutcome {
    fn from(status: StepStatus) -> Self {
        match status {
            StepStatus::Completed => StepOutcome::Completed,
            StepStatus::Skipped => StepOutcome::Skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: &'static str,
    pub outcome: StepOutcome,
    pub elapsed: Duration,
}

/// A pipeline step over context `C`
pub type StepFn<C> = for<'c> fn(&'c mut C) -> BoxFuture<'c, OrchestratorResult<StepStatus>>;

pub struct Pipeline<C> {
    name: &'static str,
    steps: Vec<(&'static str, StepFn<C>)>,
    step_timeout: Option<Duration>,
}

impl<C: Send> Pipeline<C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
            step_timeout: None,
        }
    }

    /// Append a step; steps run in the order they are added
    pub fn step(mut self, name: &'static str, run: StepFn<C>) -> Self {
        self.steps.push((name, run));
        self
    }

    /// Bound every step by `timeout`
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|(name, _)| *name).collect()
    }

    async fn run_step(&self, name: &'static str, run: StepFn<C>, context: &mut C) -> StepReport {
        debug!(pipeline = self.name, step = name, "Running step");
        let started = Instant::now();

        let result = match self.step_timeout {
            Some(timeout) => with_timeout(name, timeout, run(context)).await,
            None => run(context).await,
        };

        let outcome = match result {
            Ok(status) => status.into(),
            Err(e) => StepOutcome::Failed(e),
        };
        StepReport {
            step: name,
            outcome,
            elapsed: started.elapsed(),
        }
    }

    /// Run steps in order, stopping at the first failure
    ///
    /// The failing step's error is returned as-is.
    pub async fn run_fail_fast(&self, context: &mut C) -> OrchestratorResult<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(self.steps.len());
        for &(name, run) in &self.steps {
            let report = self.run_step(name, run, context).await;
            if let StepOutcome::Failed(e) = &report.outcome {
                error!(
                    pipeline = self.name,
                    step = name,
                    error = %e,
                    category = e.category(),
                    "Step failed, aborting pipeline"
                );
                return Err(e.clone());
            }
            reports.push(report);
        }
        Ok(reports)
    }

    /// Run every step in order; a failing step never prevents the next one
    pub async fn run_isolated(&self, context: &mut C) -> Vec<StepReport> {
        let mut reports = Vec::with_capacity(self.steps.len());
        for &(name, run) in &self.steps {
            let report = self.run_step(name, run, context).await;
            if let StepOutcome::Failed(e) = &report.outcome {
                warn!(
                    pipeline = self.name,
                    step = name,
                    error = %e,
                    category = e.category(),
                    "Step failed, continuing"
                );
            }
            reports.push(report);
        }
        reports
    }
}
