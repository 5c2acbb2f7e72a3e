//! One-at-a-time group execution.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::parallel::{run_limited, GroupSettings};
use super::supervise::PipelineResult;
use crate::error::RunError;
use crate::task::{ErrorOutput, TaskSpawner, TaskSpec};

/// Runs the tasks of a group one after another in declaration order,
/// stopping at the first failure unless `continue_on_error` is set.
pub struct WaterfallExecutor {
    spawner: Arc<dyn TaskSpawner>,
    settings: GroupSettings,
    shutdown: CancellationToken,
}

impl WaterfallExecutor {
    /// `race` and `max_parallel` in `settings` are ignored.
    pub fn new(spawner: Arc<dyn TaskSpawner>, settings: GroupSettings) -> Self {
        Self {
            spawner,
            settings: GroupSettings {
                race: false,
                max_parallel: None,
                ..settings
            },
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
        info!(tasks = tasks.len(), "starting waterfall group");
        run_limited(
            self.spawner.as_ref(),
            tasks,
            &self.settings,
            1,
            error_output,
            extra_flags,
            &self.shutdown,
        )
        .await
    }
}
