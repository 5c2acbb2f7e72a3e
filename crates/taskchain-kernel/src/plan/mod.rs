//! Run plans: ordered groups of task patterns and how to run each group.
//!
//! ```text
//!   taskchain clean -p lint test -s build:* -- --watch
//!
//!   ┌──────────────┐   ┌──────────────────┐   ┌────────────────────┐
//!   │ Sequential   │──▶│ Parallel         │──▶│ Sequential         │
//!   │ [clean]      │   │ [lint, test]     │   │ [build:*]          │
//!   └──────────────┘   └──────────────────┘   └────────────────────┘
//!          └──────────── shared Arc<ConfigOverrides> ───────────┘
//! ```

mod parser;
pub mod placeholder;
mod token;

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::config::ConfigOverrides;

pub use parser::parse;

/// How the tasks of one group are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// Concurrent pipe chain: each task's stdout feeds the next task's stdin.
    Sequential,
    /// All tasks at once; the first failure aborts the rest.
    Parallel,
    /// One task at a time; the first failure stops the group.
    Waterfall,
}

impl GroupKind {
    /// The canonical flag that introduces a group of this kind.
    pub fn flag(self) -> &'static str {
        match self {
            GroupKind::Sequential => "-s",
            GroupKind::Parallel => "-p",
            GroupKind::Waterfall => "-w",
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKind::Sequential => write!(f, "sequential"),
            GroupKind::Parallel => write!(f, "parallel"),
            GroupKind::Waterfall => write!(f, "waterfall"),
        }
    }
}

/// One segment of a run plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunGroup {
    pub kind: GroupKind,
    /// Task-name patterns in declaration order.
    pub patterns: Vec<String>,
    /// Shared by every group of the plan.
    pub config: Arc<ConfigOverrides>,
}

impl RunGroup {
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Options that apply to the whole run. The last occurrence of a flag wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub silent: bool,
    pub continue_on_error: bool,
    pub print_name: bool,
    pub print_label: bool,
    pub race: bool,
    pub max_parallel: Option<NonZeroUsize>,
    pub npm_path: Option<String>,
    /// Arguments after `--`, spliced into patterns via placeholders.
    pub rest_args: Vec<String>,
}

/// Parsed command line: groups in execution order plus run-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    groups: Vec<RunGroup>,
    config: Arc<ConfigOverrides>,
    options: RunOptions,
}

impl RunPlan {
    /// All groups, including empty ones introduced by redundant mode flags.
    pub fn groups(&self) -> &[RunGroup] {
        &self.groups
    }

    /// Groups that will actually run.
    pub fn runnable_groups(&self) -> impl Iterator<Item = &RunGroup> {
        self.groups.iter().filter(|g| !g.is_empty())
    }

    pub fn config(&self) -> &Arc<ConfigOverrides> {
        &self.config
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut RunOptions {
        &mut self.options
    }

    /// Consume the plan, dropping empty groups.
    pub fn into_parts(self) -> (Vec<RunGroup>, RunOptions) {
        let groups = self.groups.into_iter().filter(|g| !g.is_empty()).collect();
        (groups, self.options)
    }

    /// Re-serialize every group as a mode flag and its patterns.
    ///
    /// Empty groups are written too: they keep two sequential groups from
    /// merging into one pipe chain when the result is parsed again.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for group in &self.groups {
            args.push(group.kind.flag().to_string());
            args.extend(group.patterns.iter().cloned());
        }
        args
    }
}
