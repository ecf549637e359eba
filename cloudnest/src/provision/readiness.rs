//! Readiness gates between VM start and cluster installation.
//!
//! ```text
//!   vm_agent_ready        (lxc query: processes != -1)
//!   user_provisioned      (id + getent for the guest user)
//!   identity_propagation  (fixed delay)
//!   seed_service_active   (snapd.seeded.service "active (exited)")
//! ```
//!
//! Each polled gate gets the same deadline and poll interval. A gate that
//! never opens fails the run with `ReadinessTimeout`.

use super::tasks::{log_task_error, task_start};
use super::ProvisionCtx;
use crate::lxd::{self, Lxd};
use crate::pipeline::{BoxedTask, PipelineTask};
use crate::sunbeam::{self, Sunbeam};
use crate::util::{CommandRunner, RunOptions, wait, wait_for};
use async_trait::async_trait;
use cloudnest_shared::errors::{ProvisionError, ProvisionResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Deadline and poll cadence for one named gate.
#[derive(Debug, Clone)]
pub struct ReadinessCheck {
    pub name: &'static str,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl ReadinessCheck {
    pub fn new(name: &'static str, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            name,
            timeout,
            poll_interval,
        }
    }

    /// Poll `probe` until it reports ready, naming this gate on timeout.
    pub async fn wait_until<F, Fut>(&self, probe: F) -> ProvisionResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProvisionResult<bool>>,
    {
        wait_for(probe, self.timeout, self.poll_interval)
            .await
            .map_err(|e| match e {
                ProvisionError::Timeout { elapsed_ms, .. } => ProvisionError::ReadinessTimeout {
                    gate: self.name.to_string(),
                    elapsed_ms,
                },
                other => other,
            })
    }
}

/// Probes evaluated on every poll tick.
pub struct ReadinessProbes {
    runner: Arc<dyn CommandRunner>,
    lxd: Lxd,
    sunbeam: Sunbeam,
    probe_timeout: Duration,
}

impl ReadinessProbes {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        lxd: Lxd,
        sunbeam: Sunbeam,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            lxd,
            sunbeam,
            probe_timeout,
        }
    }

    /// The guest agent reports a real process count.
    pub async fn vm_agent_ready(&self) -> ProvisionResult<bool> {
        let result = self
            .runner
            .run_or_fail(
                &self.lxd.query_state(),
                RunOptions::default().with_timeout(self.probe_timeout),
            )
            .await?;
        lxd::agent_ready(&result.stdout)
    }

    /// Both the identity lookup and the passwd entry exist for the guest user.
    pub async fn user_provisioned(&self) -> ProvisionResult<bool> {
        let options = RunOptions::probe().with_timeout(self.probe_timeout);
        let id = self.runner.run(&self.sunbeam.user_id(), options).await?;
        if !id.success() {
            return Ok(false);
        }
        let entry = self.runner.run(&self.sunbeam.user_entry(), options).await?;
        Ok(entry.success())
    }

    /// The snap seeding unit has finished.
    pub async fn seed_service_active(&self) -> ProvisionResult<bool> {
        let result = self
            .runner
            .run(
                &self.sunbeam.seed_status(),
                RunOptions::probe().with_timeout(self.probe_timeout),
            )
            .await?;
        Ok(sunbeam::seed_service_active(&result.stdout))
    }
}

/// Polled readiness conditions, in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    VmAgentReady,
    UserProvisioned,
    SeedServiceActive,
}

impl Gate {
    pub fn name(&self) -> &'static str {
        match self {
            Gate::VmAgentReady => "vm_agent_ready",
            Gate::UserProvisioned => "user_provisioned",
            Gate::SeedServiceActive => "seed_service_active",
        }
    }
}

pub struct ReadinessGateTask {
    gate: Gate,
}

impl ReadinessGateTask {
    pub fn new(gate: Gate) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl PipelineTask<ProvisionCtx> for ReadinessGateTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> ProvisionResult<()> {
        let task_name = self.name();
        let vm = task_start(&ctx, task_name).await;

        let (check, probes) = {
            let ctx = ctx.lock().await;
            let check = ReadinessCheck::new(
                self.gate.name(),
                ctx.options.gate_timeout,
                ctx.options.gate_poll_interval,
            );
            let probes = ReadinessProbes::new(
                Arc::clone(&ctx.runner),
                ctx.lxd.clone(),
                ctx.sunbeam.clone(),
                // The gate deadline cuts off a stuck check first; this only reaps the child.
                ctx.options.gate_timeout + ctx.options.gate_poll_interval,
            );
            (check, probes)
        };

        let probes = &probes;
        let result = match self.gate {
            Gate::VmAgentReady => check.wait_until(|| probes.vm_agent_ready()).await,
            Gate::UserProvisioned => check.wait_until(|| probes.user_provisioned()).await,
            Gate::SeedServiceActive => check.wait_until(|| probes.seed_service_active()).await,
        };
        result.inspect_err(|e| log_task_error(&vm, task_name, e))?;

        tracing::info!(vm = %vm, gate = task_name, "Readiness gate open");
        Ok(())
    }

    fn name(&self) -> &str {
        self.gate.name()
    }
}

/// Fixed pause after the guest user appears, while the guest identity
/// service catches up. Not a polled condition.
pub struct IdentityPropagationTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for IdentityPropagationTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> ProvisionResult<()> {
        let vm = task_start(&ctx, self.name()).await;
        let delay = ctx.lock().await.options.identity_delay;

        tracing::debug!(vm = %vm, delay_ms = delay.as_millis() as u64, "Waiting for identity propagation");
        wait(delay).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "identity_propagation"
    }
}

/// The gate sequence as pipeline tasks.
pub fn readiness_gates() -> Vec<BoxedTask<ProvisionCtx>> {
    vec![
        Box::new(ReadinessGateTask::new(Gate::VmAgentReady)),
        Box::new(ReadinessGateTask::new(Gate::UserProvisioned)),
        Box::new(IdentityPropagationTask),
        Box::new(ReadinessGateTask::new(Gate::SeedServiceActive)),
    ]
}
