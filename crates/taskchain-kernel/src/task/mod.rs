//! Tasks: what to run, where its streams go, and the spawner seam.

mod handle;
mod process;

use std::fmt;
use std::io;

use async_trait::async_trait;

use crate::plan::placeholder::split_words;
use crate::scheduler::{PipeReader, PipeWriter};

pub use handle::{AbortHandle, StageState, TaskExit, TaskHandle};
pub use process::ProcessSpawner;

/// A resolved task: a script name plus literal arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskSpec {
    pub script: String,
    pub args: Vec<String>,
}

impl TaskSpec {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split `text` into script and arguments. `None` for blank input.
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = split_words(text).into_iter();
        let script = words.next()?;
        Some(Self {
            script,
            args: words.collect(),
        })
    }
}

impl From<&str> for TaskSpec {
    fn from(text: &str) -> Self {
        Self::parse(text).unwrap_or_else(|| Self::new(text))
    }
}

impl fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.script)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Where a stage's stdin comes from.
#[derive(Debug)]
pub enum StageInput {
    /// No upstream feed: stdin reads EOF immediately.
    Empty,
    /// The orchestrator's own stdin.
    Inherit,
    /// The previous stage's output.
    Pipe(PipeReader),
}

/// Where a stage's stdout goes.
#[derive(Debug)]
pub enum StageOutput {
    Inherit,
    Discard,
    /// The next stage's input.
    Pipe(PipeWriter),
}

/// Where a stage's stderr goes. Shared by all stages of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOutput {
    Inherit,
    Discard,
}

/// Everything needed to launch one stage.
#[derive(Debug)]
pub struct SpawnRequest {
    pub task: TaskSpec,
    pub stdin: StageInput,
    pub stdout: StageOutput,
    pub stderr: ErrorOutput,
    /// Extra invocation flags, e.g. `--<pkg>:<var>=<value>` overrides.
    pub flags: Vec<String>,
    /// Prefix for inherited output lines, already padded.
    pub label: Option<String>,
    /// Print `> task` before launching.
    pub announce: bool,
}

impl SpawnRequest {
    pub fn new(task: TaskSpec) -> Self {
        Self {
            task,
            stdin: StageInput::Empty,
            stdout: StageOutput::Inherit,
            stderr: ErrorOutput::Inherit,
            flags: Vec::new(),
            label: None,
            announce: false,
        }
    }
}

/// Launches tasks. The process-backed implementation is [`ProcessSpawner`];
/// tests substitute scripted spawners.
#[async_trait]
pub trait TaskSpawner: Send + Sync {
    /// Start the task without waiting for it to finish.
    async fn spawn(&self, request: SpawnRequest) -> io::Result<TaskHandle>;
}
