//! taskchain-kernel: the core of taskchain.
//!
//! This crate provides:
//!
//! - **Plan**: turns a flat argument list into ordered, typed task groups
//! - **Manifest**: reads `package.json` scripts and resolves task patterns
//! - **Scheduler**: pipe-chained, parallel, and waterfall group executors
//! - **Task**: task handles, the spawner seam, and the process spawner
//! - **Driver**: runs a plan group by group
//! - **Config**: environment overrides and the runner config file

pub mod config;
pub mod driver;
pub mod error;
pub mod manifest;
pub mod plan;
pub mod scheduler;
pub mod task;

pub use config::{ConfigOverrides, RunnerConfig};
pub use driver::{RunPlanDriver, RunSummary};
pub use error::{ConfigError, ManifestError, ParseError, RunError, TaskError};
pub use manifest::Manifest;
pub use plan::{parse, GroupKind, RunGroup, RunOptions, RunPlan};
pub use scheduler::{PipelineExecutor, PipelineResult, StageFailure};
pub use task::{ProcessSpawner, SpawnRequest, StageState, TaskHandle, TaskSpawner, TaskSpec};

// Shutdown signalling for embedders wiring up Ctrl-C.
pub use tokio_util::sync::CancellationToken;
