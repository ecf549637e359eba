//! Generic table-driven pipeline execution framework.
//!
//! ## Architecture
//!
//! ```text
//! Pipeline → Stages → Tasks
//!
//! - Pipeline: Orchestrates execution of all stages, tracks run state
//! - Stage: Named group of related tasks, run one after another
//! - Task: Atomic unit of work
//! ```
//!
//! Execution is strictly sequential. The first failing task moves the run to
//! `PipelineState::Failed` and no later task is started. Nothing is rolled
//! back: whatever earlier tasks created is left in place for inspection.
//!
//! ## Example
//!
//! ```ignore
//! use pipeline::{ExecutionPlan, PipelineBuilder, PipelineExecutor, Stage};
//!
//! let plan = ExecutionPlan::new(vec![
//!     Stage::sequential("prepare", vec![Box::new(TaskA)]),
//!     Stage::sequential("apply", vec![Box::new(TaskB)]),
//! ]);
//!
//! let run = PipelineExecutor::execute(PipelineBuilder::from_plan(plan), ctx).await;
//! run.metrics.log_summary();
//! run.into_result()?;
//! ```

mod metrics;
#[allow(clippy::module_inception)]
mod pipeline;
mod stage;
mod task;

pub use metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
pub use pipeline::{
    ExecutionPlan, Pipeline, PipelineBuilder, PipelineExecutor, PipelineRun, PipelineState,
};
pub use stage::Stage;
pub use task::{BoxedTask, PipelineTask};
