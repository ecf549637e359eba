//! Generic pipeline execution framework.
//!
//! Provides a table-driven pipeline executor that runs stages of tasks in
//! order and reports the run as an explicit state machine.

use super::metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
use super::stage::Stage;
use super::task::BoxedTask;
use cloudnest_shared::errors::{ProvisionError, ProvisionResult};
use std::time::Instant;

pub struct ExecutionPlan<Ctx> {
    stages: Vec<Stage<BoxedTask<Ctx>>>,
}

impl<Ctx> ExecutionPlan<Ctx> {
    pub fn new(stages: Vec<Stage<BoxedTask<Ctx>>>) -> Self {
        Self { stages }
    }

    pub fn stages(self) -> Vec<Stage<BoxedTask<Ctx>>> {
        self.stages
    }

    /// Task names in execution order.
    pub fn task_names(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|stage| stage.tasks.iter())
            .map(|task| task.name())
            .collect()
    }
}

pub struct Pipeline<Ctx> {
    stages: Vec<Stage<BoxedTask<Ctx>>>,
}

impl<Ctx> Pipeline<Ctx> {
    pub fn new(stages: Vec<Stage<BoxedTask<Ctx>>>) -> Self {
        Self { stages }
    }
}

pub struct PipelineBuilder;

impl PipelineBuilder {
    pub fn from_plan<Ctx>(plan: ExecutionPlan<Ctx>) -> Pipeline<Ctx> {
        Pipeline::new(plan.stages())
    }
}

/// Lifecycle of one pipeline run.
///
/// `Succeeded` and `Failed` are terminal. There is no rollback state: a
/// failed run leaves every resource created by earlier tasks in place.
#[derive(Debug)]
pub enum PipelineState {
    Pending,
    Running {
        stage: &'static str,
        task: String,
    },
    Succeeded,
    Failed {
        stage: &'static str,
        task: String,
        reason: ProvisionError,
    },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed { .. })
    }
}

/// Outcome of `PipelineExecutor::execute`.
#[derive(Debug)]
pub struct PipelineRun {
    pub state: PipelineState,
    pub metrics: PipelineMetrics,
}

impl PipelineRun {
    pub fn succeeded(&self) -> bool {
        matches!(self.state, PipelineState::Succeeded)
    }

    /// Collapse the run into a `Result`, surfacing the failure reason.
    pub fn into_result(self) -> ProvisionResult<PipelineMetrics> {
        match self.state {
            PipelineState::Succeeded => Ok(self.metrics),
            PipelineState::Failed { reason, .. } => Err(reason),
            other => Err(ProvisionError::Internal(format!(
                "pipeline finished in non-terminal state {:?}",
                other
            ))),
        }
    }
}

/// Pipeline executor framework.
///
/// This provides the generic infrastructure for executing a table-driven pipeline.
/// The actual task execution logic is provided by task implementations.
pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Execute a pipeline.
    ///
    /// Iterates through stages and runs their tasks one at a time. Stops at the
    /// first task error and records it as `PipelineState::Failed`.
    ///
    /// Generic over:
    /// - `Ctx`: Shared pipeline context (use interior mutability for writes)
    pub async fn execute<Ctx>(pipeline: Pipeline<Ctx>, ctx: Ctx) -> PipelineRun
    where
        Ctx: Clone,
    {
        let total_start = Instant::now();
        let mut stage_metrics = Vec::new();
        let mut state = PipelineState::Pending;
        tracing::debug!(state = ?state, "Pipeline created");

        for (index, stage) in pipeline.stages.into_iter().enumerate() {
            let stage_start = Instant::now();
            let mut task_metrics = Vec::new();
            let mut failure = None;

            for task in stage.tasks {
                let name = task.name().to_string();
                state = PipelineState::Running {
                    stage: stage.name,
                    task: name.clone(),
                };
                tracing::trace!(state = ?state, "Pipeline transition");

                let task_start = Instant::now();
                match task.run(ctx.clone()).await {
                    Ok(()) => {
                        let duration_ms = task_start.elapsed().as_millis();
                        tracing::debug!(stage = stage.name, task = %name, duration_ms, "Task finished");
                        task_metrics.push(TaskMetrics { name, duration_ms });
                    }
                    Err(reason) => {
                        failure = Some((name, reason));
                        break;
                    }
                }
            }

            stage_metrics.push(StageMetrics {
                index,
                name: stage.name,
                duration_ms: stage_start.elapsed().as_millis(),
                tasks: task_metrics,
            });

            if let Some((task, reason)) = failure {
                tracing::error!(stage = stage.name, task = %task, "Pipeline failed: {}", reason);
                state = PipelineState::Failed {
                    stage: stage.name,
                    task,
                    reason,
                };
                break;
            }
        }

        if !state.is_terminal() {
            state = PipelineState::Succeeded;
        }

        PipelineRun {
            state,
            metrics: PipelineMetrics {
                total_duration_ms: total_start.elapsed().as_millis(),
                stages: stage_metrics,
            },
        }
    }
}
