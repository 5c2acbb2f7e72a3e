//! Process-backed task spawner: `npm run <script>` through `tokio::process`.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{ErrorOutput, SpawnRequest, StageInput, StageOutput, TaskHandle, TaskSpawner, TaskSpec};
use crate::error::TaskError;
use crate::scheduler::{PipeReader, PipeWriter};

/// How long an aborted stage gets between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Runs scripts as child processes of the package runner (npm by default).
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: String,
    cwd: PathBuf,
    silent: bool,
}

impl ProcessSpawner {
    /// Spawner rooted at `cwd`, using `npm_execpath` or `npm`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        let program = std::env::var("npm_execpath")
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "npm".to_string());
        Self {
            program,
            cwd: cwd.into(),
            silent: false,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Pass `--silent` to the runner.
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Build the command line for `task`.
    ///
    /// A JavaScript runner path (`npm_execpath` usually points at
    /// `npm-cli.js`) is run through node.
    pub fn command(&self, task: &TaskSpec, flags: &[String]) -> Command {
        let mut cmd = if is_script_path(&self.program) {
            let node = std::env::var("npm_node_execpath").unwrap_or_else(|_| "node".to_string());
            let mut cmd = Command::new(node);
            cmd.arg(&self.program);
            cmd
        } else {
            Command::new(&self.program)
        };

        cmd.current_dir(&self.cwd).arg("run").arg(&task.script);
        if self.silent {
            cmd.arg("--silent");
        }
        cmd.args(flags);
        if !task.args.is_empty() {
            cmd.arg("--").args(&task.args);
        }
        cmd
    }
}

fn is_script_path(program: &str) -> bool {
    [".js", ".cjs", ".mjs"].iter().any(|ext| program.ends_with(ext))
}

#[async_trait]
impl TaskSpawner for ProcessSpawner {
    async fn spawn(&self, request: SpawnRequest) -> io::Result<TaskHandle> {
        let SpawnRequest {
            task,
            stdin,
            stdout,
            stderr,
            flags,
            label,
            announce,
        } = request;
        let name = task.to_string();

        if announce {
            let mut out = tokio::io::stdout();
            out.write_all(format!("\n> {name}\n\n").as_bytes()).await?;
            out.flush().await?;
        }

        let mut cmd = self.command(&task, &flags);
        cmd.stdin(match &stdin {
            StageInput::Empty => Stdio::null(),
            StageInput::Inherit => Stdio::inherit(),
            StageInput::Pipe(_) => Stdio::piped(),
        });
        cmd.stdout(match (&stdout, &label) {
            (StageOutput::Inherit, None) => Stdio::inherit(),
            (StageOutput::Discard, _) => Stdio::null(),
            _ => Stdio::piped(),
        });
        cmd.stderr(match (stderr, &label) {
            (ErrorOutput::Inherit, None) => Stdio::inherit(),
            (ErrorOutput::Inherit, Some(_)) => Stdio::piped(),
            (ErrorOutput::Discard, _) => Stdio::null(),
        });
        // Own process group, so an abort reaches the runner's children too.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd.kill_on_drop(true);

        debug!(task = %name, program = %self.program, "spawning");
        let mut child = cmd.spawn()?;

        let feeder = match (stdin, child.stdin.take()) {
            (StageInput::Pipe(reader), Some(sink)) => Some(tokio::spawn(feed_from_pipe(reader, sink))),
            _ => None,
        };

        let mut drains: Vec<JoinHandle<()>> = Vec::new();
        if let Some(source) = child.stdout.take() {
            match (stdout, &label) {
                (StageOutput::Pipe(writer), _) => {
                    drains.push(tokio::spawn(pump_into_pipe(source, writer)));
                }
                (_, Some(label)) => {
                    drains.push(tokio::spawn(relay_labeled(source, tokio::io::stdout(), label.clone())));
                }
                _ => {}
            }
        }
        if let (Some(source), Some(label)) = (child.stderr.take(), label) {
            drains.push(tokio::spawn(relay_labeled(source, tokio::io::stderr(), label)));
        }

        Ok(TaskHandle::launch(name.clone(), move |cancel| async move {
            let finished = tokio::select! {
                status = child.wait() => Some(status),
                _ = cancel.cancelled() => None,
            };
            let status = match finished {
                Some(status) => status,
                None => stop_child(&mut child, &name).await,
            }
            .map_err(|source| TaskError::Io {
                task: name.clone(),
                source,
            })?;

            // Upstream may still be producing; the feeder must not outlive us.
            if let Some(feeder) = feeder {
                feeder.abort();
            }
            for drain in drains {
                let _ = drain.await;
            }
            Ok(exit_code(status))
        }))
    }
}

async fn stop_child(child: &mut Child, task: &str) -> io::Result<ExitStatus> {
    signal_child(child, false);
    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(task, "stage ignored SIGTERM, killing");
            signal_child(child, true);
            child.wait().await
        }
    }
}

fn signal_child(child: &mut Child, force: bool) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        if let Ok(pid) = i32::try_from(pid)
            && killpg(Pid::from_raw(pid), signal).is_ok()
        {
            return;
        }
    }
    let _ = child.start_kill();
}

fn exit_code(status: ExitStatus) -> i32 {
    // Killed by a signal: no code, report a plain failure.
    status.code().unwrap_or(1)
}

async fn feed_from_pipe<W>(mut reader: PipeReader, mut sink: W)
where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = tokio::io::copy(&mut reader, &mut sink).await {
        debug!("stdin feed ended early: {e}");
    }
    let _ = sink.shutdown().await;
}

async fn pump_into_pipe<R>(mut source: R, mut writer: PipeWriter)
where
    R: AsyncRead + Unpin,
{
    if let Err(e) = tokio::io::copy(&mut source, &mut writer).await {
        debug!("stdout pump ended early: {e}");
    }
    writer.close();
}

async fn relay_labeled<R, W>(source: R, mut sink: W, label: String)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(source);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let mut out = Vec::with_capacity(label.len() + line.len() + 1);
                out.extend_from_slice(label.as_bytes());
                out.extend_from_slice(&line);
                if !line.ends_with(b"\n") {
                    out.push(b'\n');
                }
                if sink.write_all(&out).await.is_err() {
                    break;
                }
                let _ = sink.flush().await;
            }
        }
    }
}
