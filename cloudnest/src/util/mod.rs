//! Process execution and polling helpers.

mod process;
mod wait;

pub use process::{CommandLine, CommandRunner, ProcessRunner, RunOptions, StepResult};
pub use wait::{parse_millis, wait, wait_for};
