//! Races stage completions and broadcasts aborts.
//!
//! Every executor funnels its handles through a [`Supervisor`]: launched
//! handles are raced, the first failure (or collaborator error) aborts every
//! other live stage, and the outcome is folded into a [`PipelineResult`].

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{RunError, TaskError};
use crate::task::{AbortHandle, StageState, TaskExit, TaskHandle};

/// A stage that exited non-zero on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub task: String,
    pub code: i32,
}

/// Outcome of one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineResult {
    /// First stage to fail. Only set when failures do not abort the group
    /// (`continue_on_error`); otherwise the group returns `Err` instead.
    pub first_failure: Option<StageFailure>,
    /// True when no stage was aborted or left unlaunched.
    pub all_completed: bool,
    /// How each launched stage ended, in completion order.
    pub exits: Vec<TaskExit>,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        self.first_failure.is_none()
    }
}

/// When to stop the remaining stages.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AbortPolicy {
    /// Keep siblings running after a failure.
    pub continue_on_error: bool,
    /// Stop siblings after the first success.
    pub race: bool,
}

type Settling = BoxFuture<'static, Result<TaskExit, TaskError>>;

pub(crate) struct Supervisor {
    policy: AbortPolicy,
    running: FuturesUnordered<Settling>,
    aborts: Vec<AbortHandle>,
    exits: Vec<TaskExit>,
    first_failure: Option<StageFailure>,
    error: Option<RunError>,
    stopping: bool,
    interrupted: bool,
    unlaunched: bool,
}

impl Supervisor {
    pub(crate) fn new(policy: AbortPolicy) -> Self {
        Self {
            policy,
            running: FuturesUnordered::new(),
            aborts: Vec::new(),
            exits: Vec::new(),
            first_failure: None,
            error: None,
            stopping: false,
            interrupted: false,
            unlaunched: false,
        }
    }

    pub(crate) fn watch(&mut self, handle: TaskHandle) {
        self.aborts.push(handle.abort_handle());
        self.running.push(handle.settled().boxed());
    }

    /// Record a collaborator failure (spawn error) and stop everything.
    pub(crate) fn fail(&mut self, error: RunError) {
        warn!("{error}");
        if self.error.is_none() {
            self.error = Some(error);
        }
        self.stop();
    }

    /// No further stages should be launched.
    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping
    }

    pub(crate) fn running(&self) -> usize {
        self.running.len()
    }

    /// Some stages were never launched because the group stopped early.
    pub(crate) fn mark_unlaunched(&mut self) {
        self.unlaunched = true;
    }

    /// Abort every live stage. Settled stages ignore the call.
    fn stop(&mut self) {
        self.stopping = true;
        let aborted = self.aborts.iter().filter(|a| a.abort()).count();
        if aborted > 0 {
            warn!(aborted, "aborted remaining stages");
        }
    }

    /// Wait for one stage to settle. Returns `false` when nothing is running.
    pub(crate) async fn settle_next(&mut self, shutdown: &CancellationToken) -> bool {
        if self.running.is_empty() {
            return false;
        }

        let settled = tokio::select! {
            biased;
            _ = shutdown.cancelled(), if !self.interrupted => {
                warn!("interrupted, aborting running stages");
                self.interrupted = true;
                self.stop();
                return true;
            }
            settled = self.running.next() => settled,
        };

        match settled {
            Some(Ok(exit)) => self.record(exit),
            Some(Err(err)) => self.fail(err.into()),
            None => return false,
        }
        true
    }

    fn record(&mut self, exit: TaskExit) {
        match exit.state {
            StageState::Succeeded if self.policy.race && !self.stopping => {
                debug!(task = %exit.task, "race won");
                self.stop();
            }
            StageState::Failed(code) => {
                if self.first_failure.is_none() && self.error.is_none() && !self.interrupted {
                    warn!(task = %exit.task, code, "stage failed");
                    self.first_failure = Some(StageFailure {
                        task: exit.task.clone(),
                        code,
                    });
                }
                if !self.policy.continue_on_error {
                    self.stop();
                }
            }
            _ => {}
        }
        self.exits.push(exit);
    }

    /// Wait for every launched stage, then fold the outcome.
    pub(crate) async fn finish(mut self, shutdown: &CancellationToken) -> Result<PipelineResult, RunError> {
        while self.settle_next(shutdown).await {}

        if self.interrupted || shutdown.is_cancelled() {
            return Err(RunError::Interrupted);
        }
        if let Some(error) = self.error {
            return Err(error);
        }

        let all_completed = !self.unlaunched
            && self.exits.iter().all(|e| e.state != StageState::Aborted);
        match self.first_failure {
            Some(StageFailure { task, code }) if !self.policy.continue_on_error => {
                Err(RunError::TaskFailed { task, code })
            }
            first_failure => Ok(PipelineResult {
                first_failure,
                all_completed,
                exits: self.exits,
            }),
        }
    }
}
