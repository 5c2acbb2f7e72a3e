//! Package manifest loading and task-pattern resolution.
//!
//! Scripts come from the `scripts` table of `package.json`, in file order.
//! Patterns are resolved against those names with [`taskchain_glob`].

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use taskchain_glob::{is_pattern, ScriptPattern};
use tracing::debug;

use crate::error::{ManifestError, RunError};
use crate::plan::placeholder::{expand, split_words};
use crate::task::TaskSpec;

pub const MANIFEST_FILE: &str = "package.json";

#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    scripts: Map<String, Value>,
}

/// The parts of `package.json` the runner cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub name: Option<String>,
    scripts: Vec<String>,
}

impl Manifest {
    /// Read `package.json` from `dir`.
    pub fn load(dir: &Path) -> Result<Self, ManifestError> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).map_err(|source| ManifestError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse manifest JSON. `path` is only used for error messages.
    pub fn parse(content: &str, path: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        let raw: RawManifest =
            serde_json::from_str(content).map_err(|source| ManifestError::Parse {
                path: path.into(),
                source,
            })?;
        // Non-string entries are not runnable scripts.
        let scripts = raw
            .scripts
            .into_iter()
            .filter_map(|(name, body)| body.is_string().then_some(name))
            .collect();
        Ok(Self {
            name: raw.name,
            scripts,
        })
    }

    /// Build a manifest from script names alone.
    pub fn from_scripts<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            scripts: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Script names in file order.
    pub fn script_names(&self) -> Vec<&str> {
        self.scripts.iter().map(String::as_str).collect()
    }
}

/// Resolve a group's patterns to concrete tasks.
///
/// Placeholders are expanded from `rest_args` first. The first word of each
/// pattern selects scripts; the remaining words become task arguments.
/// Duplicates keep their first position.
pub fn resolve_tasks(
    patterns: &[String],
    scripts: &[&str],
    rest_args: &[String],
) -> Result<Vec<TaskSpec>, RunError> {
    let mut tasks: Vec<TaskSpec> = Vec::new();

    for pattern in patterns {
        let expanded = expand(pattern, rest_args);
        let mut words = split_words(&expanded).into_iter();
        let Some(name) = words.next() else {
            continue;
        };
        let args: Vec<String> = words.collect();

        let matched: Vec<&str> = if is_pattern(&name) {
            ScriptPattern::new(&name)?.filter(scripts.iter().copied())
        } else {
            scripts.iter().copied().filter(|s| *s == name).collect()
        };
        if matched.is_empty() {
            return Err(RunError::NoMatch(pattern.clone()));
        }
        debug!(pattern = %pattern, matched = matched.len(), "pattern resolved");

        for script in matched {
            let task = TaskSpec::new(script).with_args(args.iter().cloned());
            if !tasks.contains(&task) {
                tasks.push(task);
            }
        }
    }

    Ok(tasks)
}
