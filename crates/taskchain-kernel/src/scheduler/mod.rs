//! Group executors for taskchain.
//!
//! This module provides:
//! - **Pipe chains**: run a group's tasks concurrently, with the stdout of
//!   each task flowing into the stdin of the next.
//! - **Parallel groups**: run a group's tasks concurrently on shared stdio.
//! - **Waterfall groups**: run a group's tasks one at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PipelineExecutor                        │
//! │  ┌─────────┐    pipe     ┌─────────┐    pipe     ┌────────┐│
//! │  │ task0   │────────────▶│ task1   │────────────▶│ task2  ││
//! │  │ (spawn) │   stdout    │ (spawn) │   stdout    │ (spawn)││
//! │  └─────────┘             └─────────┘             └────────┘│
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Supervisor                             │
//! │  running: FuturesUnordered<settled stage>                   │
//! │  - first failure → abort every other live stage             │
//! │  - race → abort the rest after the first success            │
//! │  - shutdown token → abort everything, Interrupted           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod parallel;
mod pipe_stream;
mod pipeline;
mod supervise;
mod waterfall;

pub use parallel::{labels, GroupSettings, ParallelExecutor};
pub use pipe_stream::{pipe, PipeReader, PipeWriter, PIPE_BUFFER_SIZE};
pub use pipeline::PipelineExecutor;
pub use supervise::{PipelineResult, StageFailure};
pub use waterfall::WaterfallExecutor;
