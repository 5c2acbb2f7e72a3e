//! Handles to launched tasks.
//!
//! A [`TaskHandle`] wraps the tokio task driving one stage. Its state moves
//! `Pending -> Running -> {Succeeded | Failed(code) | Aborted}`; `Aborted` is
//! only entered when [`AbortHandle::abort`] fires while the stage is live.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TaskError;

/// Lifecycle of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Running,
    Succeeded,
    Failed(i32),
    Aborted,
}

impl StageState {
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            StageState::Succeeded | StageState::Failed(_) | StageState::Aborted
        )
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageState::Pending => write!(f, "pending"),
            StageState::Running => write!(f, "running"),
            StageState::Succeeded => write!(f, "succeeded"),
            StageState::Failed(code) => write!(f, "failed ({code})"),
            StageState::Aborted => write!(f, "aborted"),
        }
    }
}

/// How a stage ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskExit {
    pub task: String,
    pub state: StageState,
}

impl TaskExit {
    /// The non-zero exit code, if the stage failed on its own.
    pub fn failure_code(&self) -> Option<i32> {
        match self.state {
            StageState::Failed(code) => Some(code),
            _ => None,
        }
    }
}

type SharedState = Arc<Mutex<StageState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, StageState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Cloneable abort side of a [`TaskHandle`].
#[derive(Clone)]
pub struct AbortHandle {
    task: Arc<str>,
    state: SharedState,
    cancel: CancellationToken,
}

impl AbortHandle {
    /// Ask the stage to stop. Returns `false` (and does nothing) when the
    /// stage has already settled or an abort is already in flight.
    pub fn abort(&self) -> bool {
        let state = lock(&self.state);
        if state.is_settled() || self.cancel.is_cancelled() {
            return false;
        }
        debug!(task = %self.task, state = %*state, "aborting stage");
        self.cancel.cancel();
        true
    }

    pub fn state(&self) -> StageState {
        *lock(&self.state)
    }

    pub fn task(&self) -> &str {
        &self.task
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle")
            .field("task", &self.task)
            .field("state", &self.state())
            .finish()
    }
}

/// One launched task: a completion future plus an abort switch.
pub struct TaskHandle {
    abort: AbortHandle,
    join: JoinHandle<Result<i32, TaskError>>,
}

impl TaskHandle {
    /// Launch `run` on the runtime.
    ///
    /// `run` receives the stage's cancellation token and must resolve with the
    /// process exit code soon after the token fires.
    pub fn launch<F, Fut>(task: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<i32, TaskError>> + Send + 'static,
    {
        let task: Arc<str> = Arc::from(task.into());
        let cancel = CancellationToken::new();
        let state: SharedState = Arc::new(Mutex::new(StageState::Pending));
        let work = run(cancel.clone());

        let join = tokio::spawn({
            let task = Arc::clone(&task);
            let state = Arc::clone(&state);
            let cancel = cancel.clone();
            async move {
                {
                    let mut s = lock(&state);
                    if *s == StageState::Pending {
                        *s = StageState::Running;
                    }
                }
                let result = work.await;
                // Same critical section as `AbortHandle::abort`: an abort either
                // lands before this and wins, or sees a settled stage and backs off.
                let settled = {
                    let mut s = lock(&state);
                    *s = match &result {
                        _ if cancel.is_cancelled() => StageState::Aborted,
                        Ok(0) => StageState::Succeeded,
                        Ok(code) => StageState::Failed(*code),
                        Err(_) => StageState::Failed(1),
                    };
                    *s
                };
                debug!(task = %task, state = %settled, "stage settled");
                result
            }
        });

        Self {
            abort: AbortHandle { task, state, cancel },
            join,
        }
    }

    pub fn task(&self) -> &str {
        self.abort.task()
    }

    pub fn state(&self) -> StageState {
        self.abort.state()
    }

    pub fn abort(&self) -> bool {
        self.abort.abort()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Wait for the stage to settle.
    ///
    /// `Err` means the stage ended without an exit code (I/O failure while
    /// waiting, or a panic).
    pub async fn settled(self) -> Result<TaskExit, TaskError> {
        let task = self.abort.task.to_string();
        match self.join.await {
            Ok(Ok(_)) => Ok(TaskExit {
                task,
                state: self.abort.state(),
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => {
                *lock(&self.abort.state) = StageState::Failed(1);
                Err(TaskError::Panicked { task })
            }
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("abort", &self.abort).finish_non_exhaustive()
    }
}
