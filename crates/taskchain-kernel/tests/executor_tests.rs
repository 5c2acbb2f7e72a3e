//! Group executor tests against a scripted spawner.

mod common;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use common::{exit, Behavior, ScriptedSpawner};
use taskchain_kernel::scheduler::{
    pipe, GroupSettings, ParallelExecutor, PipelineExecutor, StageFailure, WaterfallExecutor,
};
use taskchain_kernel::task::{ErrorOutput, StageInput, StageOutput, TaskHandle, TaskSpec};
use taskchain_kernel::{CancellationToken, RunError, StageState, TaskError};
use tokio::io::AsyncReadExt;

fn tasks(names: &[&str]) -> Vec<TaskSpec> {
    names.iter().map(|n| TaskSpec::from(*n)).collect()
}

async fn run_pipeline(
    spawner: &Arc<ScriptedSpawner>,
    names: &[&str],
) -> Result<taskchain_kernel::PipelineResult, RunError> {
    PipelineExecutor::new(spawner.clone())
        .run(
            &tasks(names),
            StageInput::Empty,
            StageOutput::Discard,
            ErrorOutput::Discard,
            &[],
        )
        .await
}

// ── Pipe chain ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn middle_failure_aborts_siblings_and_names_the_stage() {
    let spawner = Arc::new(ScriptedSpawner::new([
        ("a", Behavior::Hang),
        ("b", exit(3, 10)),
        ("c", Behavior::Hang),
    ]));

    let err = run_pipeline(&spawner, &["a", "b", "c"]).await.unwrap_err();

    assert!(
        matches!(err, RunError::TaskFailed { ref task, code: 3 } if task == "b"),
        "{err:?}"
    );
    assert_eq!(err.exit_code(), 3);
    assert_eq!(spawner.aborted(), vec!["a", "c"]);
}

#[tokio::test]
async fn all_zero_pipeline_succeeds() {
    let spawner = Arc::new(ScriptedSpawner::new([
        ("a", exit(0, 5)),
        ("b", exit(0, 1)),
        ("c", exit(0, 10)),
    ]));

    let result = run_pipeline(&spawner, &["a", "b", "c"]).await.unwrap();

    assert!(result.is_success());
    assert!(result.all_completed);
    assert_eq!(result.exits.len(), 3);
    assert!(result.exits.iter().all(|e| e.state == StageState::Succeeded));
    assert!(spawner.aborted().is_empty());
}

#[tokio::test]
async fn every_stage_launches_before_any_settles() {
    let spawner = Arc::new(ScriptedSpawner::new([
        ("fast", exit(0, 0)),
        ("slow", exit(0, 20)),
    ]));

    run_pipeline(&spawner, &["fast", "slow", "fast"]).await.unwrap();

    assert_eq!(spawner.launched(), vec!["fast", "slow", "fast"]);
    assert_eq!(spawner.peak(), 3);
}

#[tokio::test]
async fn output_flows_through_the_chain() {
    let spawner = Arc::new(ScriptedSpawner::new([
        ("emit", Behavior::Emit("hello pipes\n")),
        ("upper", Behavior::Upper),
    ]));
    let (sink, mut out) = pipe(1024);

    PipelineExecutor::new(spawner.clone())
        .with_pipe_capacity(4)
        .run(
            &tasks(&["emit", "upper", "upper"]),
            StageInput::Empty,
            StageOutput::Pipe(sink),
            ErrorOutput::Discard,
            &[],
        )
        .await
        .unwrap();

    let mut text = String::new();
    out.read_to_string(&mut text).await.unwrap();
    assert_eq!(text, "HELLO PIPES\n");
}

#[tokio::test]
async fn external_input_feeds_the_first_stage() {
    let spawner = Arc::new(ScriptedSpawner::new([("upper", Behavior::Upper)]));
    let (mut feed, input) = pipe(64);
    let (sink, mut out) = pipe(64);

    tokio::io::AsyncWriteExt::write_all(&mut feed, b"abc").await.unwrap();
    drop(feed);

    PipelineExecutor::new(spawner.clone())
        .run(
            &tasks(&["upper"]),
            StageInput::Pipe(input),
            StageOutput::Pipe(sink),
            ErrorOutput::Discard,
            &[],
        )
        .await
        .unwrap();

    let mut text = String::new();
    out.read_to_string(&mut text).await.unwrap();
    assert_eq!(text, "ABC");
}

#[tokio::test]
async fn extra_flags_reach_every_stage() {
    let spawner = Arc::new(ScriptedSpawner::new([("a", exit(0, 0)), ("b", exit(0, 0))]));
    let flags = vec!["--web:port=80".to_string()];

    PipelineExecutor::new(spawner.clone())
        .run(
            &tasks(&["a", "b"]),
            StageInput::Empty,
            StageOutput::Discard,
            ErrorOutput::Discard,
            &flags,
        )
        .await
        .unwrap();

    assert_eq!(spawner.flags(), vec![flags.clone(), flags]);
}

#[tokio::test]
async fn continue_on_error_lets_siblings_finish() {
    let spawner = Arc::new(ScriptedSpawner::new([("a", exit(2, 0)), ("b", exit(0, 20))]));

    let result = PipelineExecutor::new(spawner.clone())
        .with_continue_on_error(true)
        .run(
            &tasks(&["a", "b"]),
            StageInput::Empty,
            StageOutput::Discard,
            ErrorOutput::Discard,
            &[],
        )
        .await
        .unwrap();

    assert_eq!(
        result.first_failure,
        Some(StageFailure {
            task: "a".into(),
            code: 2
        })
    );
    assert!(spawner.aborted().is_empty());
}

#[tokio::test]
async fn spawn_failure_aborts_launched_stages() {
    let spawner = Arc::new(ScriptedSpawner::new([("a", Behavior::Hang)]));

    let err = run_pipeline(&spawner, &["a", "missing", "a"]).await.unwrap_err();

    assert!(matches!(err, RunError::Spawn { ref task, .. } if task == "missing"));
    assert_eq!(spawner.launched(), vec!["a"]);
    assert_eq!(spawner.aborted(), vec!["a"]);
}

#[tokio::test]
async fn stage_lost_without_exit_code_aborts_siblings() {
    let spawner = Arc::new(ScriptedSpawner::new([
        ("a", Behavior::Hang),
        (
            "b",
            Behavior::Lost {
                after: Duration::from_millis(5),
            },
        ),
        ("c", Behavior::Hang),
    ]));

    let err = run_pipeline(&spawner, &["a", "b", "c"]).await.unwrap_err();

    assert!(
        matches!(err, RunError::Task(TaskError::Io { ref task, .. }) if task == "b"),
        "{err:?}"
    );
    assert_eq!(err.task(), Some("b"));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(spawner.aborted(), vec!["a", "c"]);
}

#[tokio::test]
async fn shutdown_interrupts_the_pipeline() {
    let spawner = Arc::new(ScriptedSpawner::new([("a", Behavior::Hang)]));
    let shutdown = CancellationToken::new();

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = PipelineExecutor::new(spawner.clone())
        .with_shutdown(shutdown)
        .run(
            &tasks(&["a", "a"]),
            StageInput::Empty,
            StageOutput::Discard,
            ErrorOutput::Discard,
            &[],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Interrupted));
    assert_eq!(err.exit_code(), 130);
    assert_eq!(spawner.aborted(), vec!["a", "a"]);
}

#[tokio::test]
async fn abort_after_settle_is_a_noop() {
    let handle = TaskHandle::launch("done", |_| async { Ok(0) });
    let abort = handle.abort_handle();

    let exit = handle.settled().await.unwrap();

    assert_eq!(exit.state, StageState::Succeeded);
    assert!(!abort.abort());
    assert_eq!(abort.state(), StageState::Succeeded);
}

// ── Parallel ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn parallel_failure_aborts_the_rest() {
    let spawner = Arc::new(ScriptedSpawner::new([("bad", exit(1, 5)), ("slow", Behavior::Hang)]));

    let err = ParallelExecutor::new(spawner.clone(), GroupSettings::default())
        .run(&tasks(&["slow", "bad"]), ErrorOutput::Discard, &[])
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::TaskFailed { ref task, code: 1 } if task == "bad"));
    assert_eq!(spawner.aborted(), vec!["slow"]);
}

#[tokio::test]
async fn race_stops_after_first_success() {
    let spawner = Arc::new(ScriptedSpawner::new([("quick", exit(0, 5)), ("slow", Behavior::Hang)]));
    let settings = GroupSettings {
        race: true,
        ..Default::default()
    };

    let result = ParallelExecutor::new(spawner.clone(), settings)
        .run(&tasks(&["slow", "quick"]), ErrorOutput::Discard, &[])
        .await
        .unwrap();

    assert!(result.is_success());
    assert!(!result.all_completed);
    assert_eq!(spawner.aborted(), vec!["slow"]);
}

#[tokio::test]
async fn max_parallel_caps_running_tasks() {
    let spawner = Arc::new(ScriptedSpawner::new([("t", exit(0, 5))]));
    let settings = GroupSettings {
        max_parallel: NonZeroUsize::new(2),
        ..Default::default()
    };

    let result = ParallelExecutor::new(spawner.clone(), settings)
        .run(&tasks(&["t", "t", "t", "t", "t"]), ErrorOutput::Discard, &[])
        .await
        .unwrap();

    assert_eq!(result.exits.len(), 5);
    assert_eq!(spawner.launched().len(), 5);
    assert_eq!(spawner.peak(), 2);
}

// ── Waterfall ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn waterfall_stops_at_first_failure() {
    let spawner = Arc::new(ScriptedSpawner::new([
        ("a", exit(0, 0)),
        ("b", exit(5, 0)),
        ("c", exit(0, 0)),
    ]));

    let err = WaterfallExecutor::new(spawner.clone(), GroupSettings::default())
        .run(&tasks(&["a", "b", "c"]), ErrorOutput::Discard, &[])
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::TaskFailed { ref task, code: 5 } if task == "b"));
    assert_eq!(spawner.launched(), vec!["a", "b"]);
    assert_eq!(spawner.peak(), 1);
}

#[tokio::test]
async fn waterfall_continue_on_error_runs_everything() {
    let spawner = Arc::new(ScriptedSpawner::new([
        ("a", exit(0, 0)),
        ("b", exit(5, 0)),
        ("c", exit(0, 0)),
    ]));
    let settings = GroupSettings {
        continue_on_error: true,
        ..Default::default()
    };

    let result = WaterfallExecutor::new(spawner.clone(), settings)
        .run(&tasks(&["a", "b", "c"]), ErrorOutput::Discard, &[])
        .await
        .unwrap();

    assert_eq!(spawner.launched(), vec!["a", "b", "c"]);
    assert_eq!(result.first_failure.map(|f| f.task), Some("b".to_string()));
}
