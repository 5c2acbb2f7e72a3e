//! Configuration: the per-run override table and the runner config file.
//!
//! The override table is built from the `npm_package_*` environment that npm
//! exports to scripts, then amended by `--<pkg>:<var>=<value>` flags. The
//! runner config is loaded from `~/.config/taskchain/config.toml`.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::ConfigError;

/// Env var npm sets to the running package's name.
pub const PACKAGE_NAME_VAR: &str = "npm_package_name";
/// Prefix npm uses for `config` entries of the running package.
pub const PACKAGE_CONFIG_PREFIX: &str = "npm_package_config_";
/// Env var naming an explicit runner config file.
pub const CONFIG_PATH_VAR: &str = "TASKCHAIN_CONFIG";

/// Package scope → variable → value.
///
/// Writing the same (scope, variable) pair replaces the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    scopes: BTreeMap<String, BTreeMap<String, String>>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the initial table from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build the initial table from `(key, value)` pairs.
    ///
    /// `npm_package_config_<var>` entries land under the scope named by
    /// `npm_package_name`. Without a package name the table is empty.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut package = None;
        let mut entries = Vec::new();
        for (key, value) in vars {
            let key = key.as_ref();
            if key == PACKAGE_NAME_VAR {
                package = Some(value.into());
            } else if let Some(var) = key.strip_prefix(PACKAGE_CONFIG_PREFIX) {
                if !var.is_empty() {
                    entries.push((var.to_string(), value.into()));
                }
            }
        }

        let mut table = Self::new();
        if let Some(package) = package {
            for (var, value) in entries {
                table.set(&package, &var, value);
            }
        }
        table
    }

    pub fn set(&mut self, scope: &str, var: &str, value: impl Into<String>) {
        self.scopes
            .entry(scope.to_string())
            .or_default()
            .insert(var.to_string(), value.into());
    }

    pub fn get(&self, scope: &str, var: &str) -> Option<&str> {
        self.scopes.get(scope)?.get(var).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.values().all(BTreeMap::is_empty)
    }

    /// Iterate `(scope, var, value)` in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.scopes.iter().flat_map(|(scope, vars)| {
            vars.iter()
                .map(move |(var, value)| (scope.as_str(), var.as_str(), value.as_str()))
        })
    }

    /// Render as `--<scope>:<var>=<value>` flags for `npm run`.
    pub fn to_flags(&self) -> Vec<String> {
        self.iter()
            .map(|(scope, var, value)| format!("--{scope}:{var}={value}"))
            .collect()
    }
}

/// Defaults for run options, overridable on the command line.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Executable used to run scripts. Falls back to `npm_execpath`, then `npm`.
    pub npm_path: Option<String>,
    /// Cap on concurrently running tasks in parallel groups. Zero is rejected.
    pub max_parallel: Option<NonZeroUsize>,
    /// Prefix output lines with the task name.
    pub print_label: bool,
    /// Print `> task` before each task starts.
    pub print_name: bool,
    /// Buffer size in bytes for each pipe between chained stages.
    pub pipe_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            npm_path: None,
            max_parallel: None,
            print_label: false,
            print_name: false,
            pipe_capacity: crate::scheduler::PIPE_BUFFER_SIZE,
        }
    }
}

impl RunnerConfig {
    /// Load from `$TASKCHAIN_CONFIG`, else the default path.
    ///
    /// A missing file yields the default configuration.
    pub fn load() -> Result<Self, ConfigError> {
        let path = match std::env::var_os(CONFIG_PATH_VAR) {
            Some(path) => PathBuf::from(path),
            None => Self::config_path()?,
        };

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `<config dir>/taskchain/config.toml`.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from("", "", "taskchain").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}
