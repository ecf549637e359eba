//! Tasks: hypervisor initialization and VM launch.

use super::{log_task_error, task_start};
use crate::pipeline::PipelineTask;
use crate::provision::ProvisionCtx;
use crate::util::RunOptions;
use async_trait::async_trait;
use cloudnest_shared::errors::ProvisionResult;
use std::sync::Arc;

pub struct HypervisorInitTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for HypervisorInitTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> ProvisionResult<()> {
        let task_name = self.name();
        let vm = task_start(&ctx, task_name).await;

        let (runner, lxd, timeout) = {
            let ctx = ctx.lock().await;
            (Arc::clone(&ctx.runner), ctx.lxd.clone(), ctx.options.launch_timeout)
        };
        let options = RunOptions::default().with_timeout(timeout);

        runner
            .run_or_fail(&lxd.init(), options)
            .await
            .inspect_err(|e| log_task_error(&vm, task_name, e))?;

        let listing = runner
            .run_or_fail(&lxd.list(), options)
            .await
            .inspect_err(|e| log_task_error(&vm, task_name, e))?;
        tracing::debug!("lxc list:\n{}", listing.stdout);

        Ok(())
    }

    fn name(&self) -> &str {
        "hypervisor_init"
    }
}

pub struct VmLaunchTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for VmLaunchTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> ProvisionResult<()> {
        let task_name = self.name();
        let vm = task_start(&ctx, task_name).await;

        let (runner, lxd, config, timeout) = {
            let ctx = ctx.lock().await;
            (
                Arc::clone(&ctx.runner),
                ctx.lxd.clone(),
                ctx.config.clone(),
                ctx.options.launch_timeout,
            )
        };
        let options = RunOptions::default().with_timeout(timeout);

        tracing::info!(
            vm = %vm,
            flavor = %config.flavor,
            cores = config.cores,
            memory = %config.memory,
            disk = %config.disk,
            "Launching VM"
        );

        for command in [lxd.create_vm(&config), lxd.start_vm()] {
            runner
                .run_or_fail(&command, options)
                .await
                .inspect_err(|e| log_task_error(&vm, task_name, e))?;
        }

        let listing = runner
            .run_or_fail(&lxd.list(), options)
            .await
            .inspect_err(|e| log_task_error(&vm, task_name, e))?;
        tracing::info!(vm = %vm, "VM started\n{}", listing.stdout.trim_end());

        Ok(())
    }

    fn name(&self) -> &str {
        "vm_launch"
    }
}
