//! Folds a run plan group by group.
//!
//! Each group is resolved against the manifest only when its turn comes, then
//! handed to the executor for its kind. A group starts after the previous one
//! has fully settled; a failing group ends the run.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::RunError;
use crate::manifest::{resolve_tasks, Manifest};
use crate::plan::{GroupKind, RunGroup, RunOptions, RunPlan};
use crate::scheduler::{
    GroupSettings, ParallelExecutor, PipelineExecutor, PipelineResult, StageFailure,
    WaterfallExecutor, PIPE_BUFFER_SIZE,
};
use crate::task::{ErrorOutput, StageInput, StageOutput, TaskSpawner, TaskSpec};

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Groups that ran, in order.
    pub groups: usize,
    /// Tasks launched across every group.
    pub tasks: usize,
    /// First failure tolerated under `continue_on_error`.
    pub first_failure: Option<StageFailure>,
}

pub struct RunPlanDriver {
    spawner: Arc<dyn TaskSpawner>,
    scripts: Vec<String>,
    pipe_capacity: usize,
    shutdown: CancellationToken,
}

impl RunPlanDriver {
    pub fn new(spawner: Arc<dyn TaskSpawner>, manifest: &Manifest) -> Self {
        Self {
            spawner,
            scripts: manifest.script_names().into_iter().map(String::from).collect(),
            pipe_capacity: PIPE_BUFFER_SIZE,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Token that aborts the run when cancelled.
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Execute `plan`.
    ///
    /// Returns the first failure as [`RunError::TaskFailed`]. Under
    /// `continue_on_error` the remaining groups still run before that error is
    /// returned.
    pub async fn run(&self, plan: RunPlan) -> Result<RunSummary, RunError> {
        let extra_flags = plan.config().to_flags();
        let (groups, options) = plan.into_parts();
        let mut summary = RunSummary::default();

        for (index, group) in groups.iter().enumerate() {
            if self.shutdown.is_cancelled() {
                return Err(RunError::Interrupted);
            }

            let scripts: Vec<&str> = self.scripts.iter().map(String::as_str).collect();
            let tasks = resolve_tasks(&group.patterns, &scripts, &options.rest_args)?;
            info!(group = index, kind = %group.kind, tasks = tasks.len(), "running group");

            let result = self.run_group(group, &tasks, &options, &extra_flags).await?;
            summary.groups += 1;
            summary.tasks += result.exits.len();

            if let Some(failure) = result.first_failure {
                warn!(task = %failure.task, code = failure.code, "continuing after failure");
                summary.first_failure.get_or_insert(failure);
            }
        }

        match summary.first_failure {
            Some(StageFailure { task, code }) => Err(RunError::TaskFailed { task, code }),
            None => Ok(summary),
        }
    }

    async fn run_group(
        &self,
        group: &RunGroup,
        tasks: &[TaskSpec],
        options: &RunOptions,
        extra_flags: &[String],
    ) -> Result<PipelineResult, RunError> {
        let settings = GroupSettings {
            continue_on_error: options.continue_on_error,
            race: options.race,
            max_parallel: options.max_parallel,
            print_label: options.print_label,
            print_name: options.print_name,
        };
        let error_output = ErrorOutput::Inherit;

        match group.kind {
            GroupKind::Sequential => {
                PipelineExecutor::new(Arc::clone(&self.spawner))
                    .with_pipe_capacity(self.pipe_capacity)
                    .with_continue_on_error(options.continue_on_error)
                    .with_announce(options.print_name)
                    .with_shutdown(self.shutdown.clone())
                    .run(
                        tasks,
                        StageInput::Inherit,
                        StageOutput::Inherit,
                        error_output,
                        extra_flags,
                    )
                    .await
            }
            GroupKind::Parallel => {
                ParallelExecutor::new(Arc::clone(&self.spawner), settings)
                    .with_shutdown(self.shutdown.clone())
                    .run(tasks, error_output, extra_flags)
                    .await
            }
            GroupKind::Waterfall => {
                WaterfallExecutor::new(Arc::clone(&self.spawner), settings)
                    .with_shutdown(self.shutdown.clone())
                    .run(tasks, error_output, extra_flags)
                    .await
            }
        }
    }
}
