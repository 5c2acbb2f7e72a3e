//! Error types for plan parsing and task execution.

use std::io;
use std::path::PathBuf;

use taskchain_glob::PatternError;
use thiserror::Error;

/// The argument list could not be turned into a run plan.
///
/// Always raised before any task is launched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("option {0} requires a value")]
    MissingValue(String),
    #[error("invalid value for {option}: {value}")]
    InvalidValue { option: String, value: String },
}

/// The package manifest could not be read.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The runner config file exists but could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config from {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("could not determine config directory")]
    NoConfigDir,
}

/// A launched task failed without reporting an exit code.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{task}: {source}")]
    Io {
        task: String,
        #[source]
        source: io::Error,
    },
    #[error("{task}: task panicked")]
    Panicked { task: String },
}

/// Why a group, or the whole run, did not succeed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("task {task} exited with code {code}")]
    TaskFailed { task: String, code: i32 },
    #[error("failed to spawn {task}: {source}")]
    Spawn {
        task: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("no script matches pattern: {0}")]
    NoMatch(String),
    #[error("run interrupted")]
    Interrupted,
}

impl RunError {
    /// Exit code to surface at the process boundary.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::TaskFailed { code, .. } => (*code).clamp(1, 255) as u8,
            RunError::Interrupted => 130,
            _ => 1,
        }
    }

    /// Name of the task this error is attributed to, if any.
    pub fn task(&self) -> Option<&str> {
        match self {
            RunError::TaskFailed { task, .. } | RunError::Spawn { task, .. } => Some(task),
            RunError::Task(TaskError::Io { task, .. } | TaskError::Panicked { task }) => {
                Some(task)
            }
            _ => None,
        }
    }
}
