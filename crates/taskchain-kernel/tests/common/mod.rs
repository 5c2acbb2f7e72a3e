//! Scripted in-memory spawner shared by the executor and driver tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use taskchain_kernel::task::{SpawnRequest, StageInput, StageOutput, TaskHandle, TaskSpawner};
use taskchain_kernel::TaskError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// What a scripted task does once launched.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Exit with `code` after `after`.
    Exit { code: i32, after: Duration },
    /// Run until aborted.
    Hang,
    /// Write `text` to stdout, then exit 0.
    Emit(&'static str),
    /// Copy stdin to stdout, uppercased, then exit 0.
    Upper,
    /// Lose track of the task after `after`: it settles without an exit code.
    Lost { after: Duration },
}

pub fn exit(code: i32, millis: u64) -> Behavior {
    Behavior::Exit {
        code,
        after: Duration::from_millis(millis),
    }
}

#[derive(Default)]
struct Record {
    launched: Vec<String>,
    aborted: Vec<String>,
    flags: Vec<Vec<String>>,
}

/// Spawner whose tasks follow a script instead of running processes.
/// Tasks without a behavior fail to spawn.
#[derive(Default)]
pub struct ScriptedSpawner {
    behaviors: HashMap<String, Behavior>,
    record: Arc<Mutex<Record>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ScriptedSpawner {
    pub fn new<I, S>(behaviors: I) -> Self
    where
        I: IntoIterator<Item = (S, Behavior)>,
        S: Into<String>,
    {
        Self {
            behaviors: behaviors.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..Default::default()
        }
    }

    pub fn launched(&self) -> Vec<String> {
        self.record.lock().unwrap().launched.clone()
    }

    pub fn aborted(&self) -> Vec<String> {
        let mut aborted = self.record.lock().unwrap().aborted.clone();
        aborted.sort();
        aborted
    }

    pub fn flags(&self) -> Vec<Vec<String>> {
        self.record.lock().unwrap().flags.clone()
    }

    /// Most tasks ever running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskSpawner for ScriptedSpawner {
    async fn spawn(&self, request: SpawnRequest) -> io::Result<TaskHandle> {
        let name = request.task.to_string();
        let behavior = self
            .behaviors
            .get(&request.task.script)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.clone()))?;

        {
            let mut record = self.record.lock().unwrap();
            record.launched.push(name.clone());
            record.flags.push(request.flags.clone());
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let record = Arc::clone(&self.record);
        let active = Arc::clone(&self.active);
        let SpawnRequest { stdin, stdout, .. } = request;

        Ok(TaskHandle::launch(name.clone(), move |cancel| async move {
            let result = tokio::select! {
                code = behave(behavior, stdin, stdout) => code.ok_or_else(|| TaskError::Io {
                    task: name.clone(),
                    source: io::Error::other("lost track of child"),
                }),
                _ = cancel.cancelled() => {
                    record.lock().unwrap().aborted.push(name);
                    Ok(143)
                }
            };
            active.fetch_sub(1, Ordering::SeqCst);
            result
        }))
    }
}

/// `None` when the task settles without an exit code.
async fn behave(behavior: Behavior, stdin: StageInput, stdout: StageOutput) -> Option<i32> {
    match behavior {
        Behavior::Exit { code, after } => {
            tokio::time::sleep(after).await;
            Some(code)
        }
        Behavior::Lost { after } => {
            tokio::time::sleep(after).await;
            None
        }
        Behavior::Hang => std::future::pending().await,
        Behavior::Emit(text) => {
            write_out(stdout, text.as_bytes()).await;
            Some(0)
        }
        Behavior::Upper => {
            let mut input = Vec::new();
            if let StageInput::Pipe(mut reader) = stdin {
                let _ = reader.read_to_end(&mut input).await;
            }
            write_out(stdout, &input.to_ascii_uppercase()).await;
            Some(0)
        }
    }
}

async fn write_out(stdout: StageOutput, bytes: &[u8]) {
    if let StageOutput::Pipe(mut writer) = stdout {
        let _ = writer.write_all(bytes).await;
        writer.close();
    }
}
