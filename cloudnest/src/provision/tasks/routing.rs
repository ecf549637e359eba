//! Tasks: discover the VM gateway address and route the cloud subnet through it.

use super::{log_task_error, task_start};
use crate::network::{self, NetworkInventory};
use crate::pipeline::PipelineTask;
use crate::provision::ProvisionCtx;
use crate::util::RunOptions;
use async_trait::async_trait;
use cloudnest_shared::errors::{ProvisionError, ProvisionResult};
use std::sync::Arc;

pub struct NetworkDiscoveryTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for NetworkDiscoveryTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> ProvisionResult<()> {
        let task_name = self.name();
        let vm = task_start(&ctx, task_name).await;

        let (runner, command, prefix, netmask, timeout) = {
            let ctx = ctx.lock().await;
            (
                Arc::clone(&ctx.runner),
                ctx.lxd.list_json(),
                ctx.options.interface_prefix.clone(),
                ctx.options.gateway_netmask.clone(),
                ctx.options.launch_timeout,
            )
        };

        let gateway = async {
            let listing = runner
                .run_or_fail(&command, RunOptions::default().with_timeout(timeout))
                .await?;
            let inventory = NetworkInventory::from_lxc_json(&listing.stdout)?;
            let gateway = network::resolve_gateway_address(&inventory, &vm, &prefix, &netmask)?;
            Ok::<String, ProvisionError>(gateway)
        }
        .await
        .inspect_err(|e| log_task_error(&vm, task_name, e))?;

        tracing::info!(vm = %vm, gateway = %gateway, "Discovered gateway address");

        let mut ctx = ctx.lock().await;
        ctx.gateway = Some(gateway);
        Ok(())
    }

    fn name(&self) -> &str {
        "network_discovery"
    }
}

pub struct HostRouteTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for HostRouteTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> ProvisionResult<()> {
        let task_name = self.name();
        let vm = task_start(&ctx, task_name).await;

        let (runner, subnet, gateway, timeout) = {
            let ctx = ctx.lock().await;
            let gateway = ctx.gateway.clone().ok_or_else(|| {
                ProvisionError::Internal("network_discovery task must run first".into())
            })?;
            (
                Arc::clone(&ctx.runner),
                ctx.options.route_subnet.clone(),
                gateway,
                ctx.options.launch_timeout,
            )
        };

        runner
            .run_or_fail(
                &network::host_route(&subnet, &gateway),
                RunOptions::default().with_timeout(timeout),
            )
            .await
            .inspect_err(|e| log_task_error(&vm, task_name, e))?;

        tracing::info!(subnet = %subnet, gateway = %gateway, "Installed host route");
        Ok(())
    }

    fn name(&self) -> &str {
        "host_route"
    }
}
