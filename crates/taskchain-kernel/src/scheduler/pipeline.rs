//! Pipe-chained group execution.
//!
//! All stages start together; each stage's stdout feeds the next stage's
//! stdin through a bounded pipe, like a shell pipeline:
//!
//! ```text
//!   input ─▶ task[0] ─pipe─▶ task[1] ─pipe─▶ … ─pipe─▶ task[n-1] ─▶ output
//! ```
//!
//! The first stage to exit non-zero aborts every other stage.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::pipe_stream::{pipe, PIPE_BUFFER_SIZE};
use super::supervise::{AbortPolicy, PipelineResult, Supervisor};
use crate::error::RunError;
use crate::task::{ErrorOutput, SpawnRequest, StageInput, StageOutput, TaskSpawner, TaskSpec};

/// Wiring for one stage, built before anything is launched.
#[derive(Debug)]
struct PipelineStage {
    task: TaskSpec,
    input: StageInput,
    output: StageOutput,
    error: ErrorOutput,
}

/// Runs a list of tasks as one concurrent pipe chain.
pub struct PipelineExecutor {
    spawner: Arc<dyn TaskSpawner>,
    pipe_capacity: usize,
    continue_on_error: bool,
    announce: bool,
    shutdown: CancellationToken,
}

impl PipelineExecutor {
    pub fn new(spawner: Arc<dyn TaskSpawner>) -> Self {
        Self {
            spawner,
            pipe_capacity: PIPE_BUFFER_SIZE,
            continue_on_error: false,
            announce: false,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }

    /// Keep the other stages running when one fails.
    pub fn with_continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    pub fn with_announce(mut self, enabled: bool) -> Self {
        self.announce = enabled;
        self
    }

    /// Cancelling `shutdown` aborts every stage and fails the run.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Run `tasks` as a pipe chain.
    ///
    /// `input` feeds the first task; [`StageInput::Empty`] means no upstream
    /// data. The last task writes to `output`. Every stage shares
    /// `error_output` and receives `extra_flags`.
    ///
    /// Fails with [`RunError::TaskFailed`] naming the first stage to exit
    /// non-zero, after every other stage has been aborted and has settled.
    pub async fn run(
        &self,
        tasks: &[TaskSpec],
        input: StageInput,
        output: StageOutput,
        error_output: ErrorOutput,
        extra_flags: &[String],
    ) -> Result<PipelineResult, RunError> {
        if tasks.is_empty() {
            return Ok(PipelineResult {
                all_completed: true,
                ..Default::default()
            });
        }

        let stages = self.wire(tasks, input, output, error_output);
        info!(stages = stages.len(), "starting pipeline");

        let mut supervisor = Supervisor::new(AbortPolicy {
            continue_on_error: self.continue_on_error,
            race: false,
        });

        // Launch everything before awaiting anything.
        let mut stages = stages.into_iter();
        for stage in stages.by_ref() {
            let request = SpawnRequest {
                stdin: stage.input,
                stdout: stage.output,
                stderr: stage.error,
                flags: extra_flags.to_vec(),
                announce: self.announce,
                ..SpawnRequest::new(stage.task.clone())
            };
            match self.spawner.spawn(request).await {
                Ok(handle) => {
                    debug!(task = %stage.task, "stage launched");
                    supervisor.watch(handle);
                }
                Err(source) => {
                    supervisor.fail(RunError::Spawn {
                        task: stage.task.to_string(),
                        source,
                    });
                    break;
                }
            }
        }
        // Dropping unlaunched stages closes their pipe ends, so launched
        // neighbours see EOF or a broken pipe instead of hanging.
        if stages.len() > 0 {
            supervisor.mark_unlaunched();
        }
        drop(stages);

        supervisor.finish(&self.shutdown).await
    }

    /// Walk the tasks last to first, giving each a fresh pipe as input and the
    /// previous iteration's pipe as output.
    fn wire(
        &self,
        tasks: &[TaskSpec],
        input: StageInput,
        output: StageOutput,
        error_output: ErrorOutput,
    ) -> Vec<PipelineStage> {
        let mut stages = Vec::with_capacity(tasks.len());
        let mut downstream = Some(output);
        let mut input = Some(input);

        for (i, task) in tasks.iter().enumerate().rev() {
            let output = downstream.take().unwrap_or(StageOutput::Discard);
            let stage_input = if i == 0 {
                input.take().unwrap_or(StageInput::Empty)
            } else {
                let (writer, reader) = pipe(self.pipe_capacity);
                downstream = Some(StageOutput::Pipe(writer));
                StageInput::Pipe(reader)
            };
            stages.push(PipelineStage {
                task: task.clone(),
                input: stage_input,
                output,
                error: error_output,
            });
        }

        stages.reverse();
        stages
    }
}
