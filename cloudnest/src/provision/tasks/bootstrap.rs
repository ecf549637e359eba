//! Tasks: OpenStack install, node preparation, cluster bootstrap.
//!
//! All three run inside the VM as the guest user and share the install time bound.

use super::{log_task_error, task_start};
use crate::pipeline::PipelineTask;
use crate::provision::ProvisionCtx;
use crate::sunbeam::Sunbeam;
use crate::util::{CommandLine, CommandRunner, RunOptions};
use async_trait::async_trait;
use cloudnest_shared::errors::ProvisionResult;
use std::sync::Arc;

/// Run one in-VM command built from the context's `Sunbeam` helper.
async fn run_in_vm<F>(ctx: &ProvisionCtx, task_name: &str, build: F) -> ProvisionResult<()>
where
    F: FnOnce(&Sunbeam, &str) -> CommandLine,
{
    let vm = task_start(ctx, task_name).await;

    let (runner, command, timeout): (Arc<dyn CommandRunner>, CommandLine, _) = {
        let ctx = ctx.lock().await;
        (
            Arc::clone(&ctx.runner),
            build(&ctx.sunbeam, &ctx.options.openstack_channel),
            ctx.options.install_timeout,
        )
    };

    runner
        .run_or_fail(&command, RunOptions::default().with_timeout(timeout))
        .await
        .inspect_err(|e| log_task_error(&vm, task_name, e))?;
    Ok(())
}

pub struct OpenstackInstallTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for OpenstackInstallTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> ProvisionResult<()> {
        run_in_vm(&ctx, self.name(), |sunbeam, channel| sunbeam.install(channel)).await
    }

    fn name(&self) -> &str {
        "openstack_install"
    }
}

pub struct NodePrepareTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for NodePrepareTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> ProvisionResult<()> {
        run_in_vm(&ctx, self.name(), |sunbeam, _| sunbeam.prepare_node()).await
    }

    fn name(&self) -> &str {
        "node_prepare"
    }
}

pub struct ClusterBootstrapTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for ClusterBootstrapTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> ProvisionResult<()> {
        run_in_vm(&ctx, self.name(), |sunbeam, _| sunbeam.bootstrap()).await
    }

    fn name(&self) -> &str {
        "cluster_bootstrap"
    }
}
