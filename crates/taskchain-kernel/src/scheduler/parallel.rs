//! Parallel group execution.
//!
//! Every task of the group runs at the same time (optionally capped) and
//! shares the orchestrator's stdio. The launch loop here is shared with the
//! waterfall executor, which is the same loop with a limit of one.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::supervise::{AbortPolicy, PipelineResult, Supervisor};
use crate::error::RunError;
use crate::task::{ErrorOutput, SpawnRequest, StageInput, StageOutput, TaskSpawner, TaskSpec};

/// Knobs shared by the parallel and waterfall executors.
#[derive(Debug, Clone, Default)]
pub struct GroupSettings {
    pub continue_on_error: bool,
    /// Parallel only: stop the group after the first success.
    pub race: bool,
    /// Parallel only: cap on concurrently running tasks.
    pub max_parallel: Option<NonZeroUsize>,
    pub print_label: bool,
    pub print_name: bool,
}

/// `[name]` labels padded to the longest task in the group.
pub fn labels(tasks: &[TaskSpec]) -> Vec<String> {
    let names: Vec<String> = tasks.iter().map(ToString::to_string).collect();
    let width = names.iter().map(|n| n.chars().count()).max().unwrap_or(0);
    names.iter().map(|n| format!("[{n:<width$}] ")).collect()
}

/// Keeps up to `limit` tasks running until the list is exhausted or the
/// supervisor stops.
pub(super) async fn run_limited(
    spawner: &dyn TaskSpawner,
    tasks: &[TaskSpec],
    settings: &GroupSettings,
    limit: usize,
    error_output: ErrorOutput,
    extra_flags: &[String],
    shutdown: &CancellationToken,
) -> Result<PipelineResult, RunError> {
    let labels = settings.print_label.then(|| labels(tasks));
    let mut supervisor = Supervisor::new(AbortPolicy {
        continue_on_error: settings.continue_on_error,
        race: settings.race,
    });
    let mut next = 0usize;

    loop {
        while next < tasks.len()
            && supervisor.running() < limit
            && !supervisor.is_stopping()
            && !shutdown.is_cancelled()
        {
            let task = &tasks[next];
            let request = SpawnRequest {
                stdin: StageInput::Inherit,
                stdout: StageOutput::Inherit,
                stderr: error_output,
                flags: extra_flags.to_vec(),
                label: labels.as_ref().map(|l| l[next].clone()),
                announce: settings.print_name,
                ..SpawnRequest::new(task.clone())
            };
            next += 1;
            match spawner.spawn(request).await {
                Ok(handle) => {
                    debug!(task = %task, "task launched");
                    supervisor.watch(handle);
                }
                Err(source) => supervisor.fail(RunError::Spawn {
                    task: task.to_string(),
                    source,
                }),
            }
        }

        if !supervisor.settle_next(shutdown).await {
            break;
        }
    }

    if next < tasks.len() {
        supervisor.mark_unlaunched();
    }
    supervisor.finish(shutdown).await
}

/// Runs every task of a group at the same time.
pub struct ParallelExecutor {
    spawner: Arc<dyn TaskSpawner>,
    settings: GroupSettings,
    shutdown: CancellationToken,
}

impl ParallelExecutor {
    pub fn new(spawner: Arc<dyn TaskSpawner>, settings: GroupSettings) -> Self {
        Self {
            spawner,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub async fn run(
        &self,
        tasks: &[TaskSpec],
        error_output: ErrorOutput,
        extra_flags: &[String],
    ) -> Result<PipelineResult, RunError> {
        let limit = self
            .settings
            .max_parallel
            .map_or(tasks.len(), NonZeroUsize::get)
            .max(1);
        info!(tasks = tasks.len(), limit, "starting parallel group");

        run_limited(
            self.spawner.as_ref(),
            tasks,
            &self.settings,
            limit,
            error_output,
            extra_flags,
            &self.shutdown,
        )
        .await
    }
}
