//! taskchain CLI entry point.
//!
//! Usage:
//!   taskchain clean build:*            # Pipe chain: clean | build:js | build:css
//!   taskchain -p lint test             # Run lint and test in parallel
//!   taskchain -w setup -p a b -s c     # Mixed groups, run in order

use std::env;
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use taskchain_kernel::{
    parse, ConfigOverrides, Manifest, ProcessSpawner, RunError, RunPlan, RunPlanDriver,
    RunnerConfig,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(|s| s.as_str()) {
        None | Some("--help" | "-h") => {
            print_help();
            return Ok(ExitCode::SUCCESS);
        }
        Some("--version" | "-v") => {
            println!("taskchain {}", env!("CARGO_PKG_VERSION"));
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let mut plan = match parse(&args, ConfigOverrides::from_env()) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("taskchain: {e}");
            eprintln!("Run 'taskchain --help' for usage.");
            return Ok(ExitCode::FAILURE);
        }
    };

    init_tracing(plan.options().silent);

    let config = RunnerConfig::load().context("Failed to load runner config")?;
    apply_config(&mut plan, &config);

    let cwd = env::current_dir().context("Failed to determine working directory")?;
    let manifest = Manifest::load(&cwd).context("Failed to load package.json")?;

    let options = plan.options();
    let mut spawner = ProcessSpawner::new(&cwd).with_silent(options.silent);
    if let Some(npm_path) = &options.npm_path {
        spawner = spawner.with_program(npm_path);
    }

    let driver = RunPlanDriver::new(Arc::new(spawner), &manifest)
        .with_pipe_capacity(config.pipe_capacity);

    let rt = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let result = rt.block_on(async {
        let shutdown = driver.shutdown().clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
        driver.run(plan).await
    });

    match result {
        Ok(summary) => {
            tracing::info!(groups = summary.groups, tasks = summary.tasks, "run complete");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            report(&e);
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}

/// Config-file values fill in whatever the command line left unset.
fn apply_config(plan: &mut RunPlan, config: &RunnerConfig) {
    let options = plan.options_mut();
    options.print_label |= config.print_label;
    options.print_name |= config.print_name;
    if options.npm_path.is_none() {
        options.npm_path = config.npm_path.clone();
    }
    if options.max_parallel.is_none() {
        options.max_parallel = config.max_parallel;
    }
}

fn init_tracing(silent: bool) {
    let default = if silent { "error" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal()),
        )
        .with(filter)
        .init();
}

fn report(error: &RunError) {
    match error {
        RunError::TaskFailed { task, code } => {
            eprintln!("ERROR: \"{task}\" exited with {code}.");
        }
        RunError::Interrupted => eprintln!("ERROR: interrupted."),
        other => match other.task() {
            Some(task) => eprintln!("ERROR: \"{task}\": {other}"),
            None => eprintln!("ERROR: {other}"),
        },
    }
}

fn print_help() {
    println!(
        r#"taskchain v{}

Usage:
  taskchain [OPTIONS] <patterns...> [-- <args...>]

Groups:
  -s, --sequential, --serial   Pipe chain: each task's stdout feeds the next task
  -p, --parallel               Run the following tasks in parallel
  -w, --waterfall              Run the following tasks one at a time

Options:
  -c, --continue-on-error      Keep going after a task fails (still exits non-zero)
  -n, --print-name             Print "> task" before each task starts
  -l, --print-label            Prefix output lines with "[task] "
  -r, --race                   Stop a parallel group after its first success
  --max-parallel <n>           Cap concurrently running tasks in parallel groups
  --npm-path <path>            Script runner executable (default: $npm_execpath or npm)
  --silent                     Pass --silent to the runner and quiet logging
  --<pkg>:<var>=<value>        Override npm_package_config_<var> for <pkg>
  -h, --help                   Show this help
  -v, --version                Show version

Patterns:
  build:*                      Scripts one segment below build:
  test:**                      Scripts any depth below test:
  "test {{1}}"                 Spliced passthrough argument (also {{@}} and {{*}})

Config:
  $TASKCHAIN_CONFIG or <config dir>/taskchain/config.toml
  keys: npm_path, max_parallel, print_label, print_name, pipe_capacity
"#,
        env!("CARGO_PKG_VERSION")
    );
}
