//! Provisioning tasks.
//!
//! Each task reads what it needs from the shared context, releases the lock,
//! runs its commands, then stores its output for later tasks.

mod bootstrap;
mod credentials;
mod hypervisor;
mod routing;

pub use bootstrap::{ClusterBootstrapTask, NodePrepareTask, OpenstackInstallTask};
pub use credentials::{CredentialsExportTask, CredentialsWriteTask};
pub use hypervisor::{HypervisorInitTask, VmLaunchTask};
pub use routing::{HostRouteTask, NetworkDiscoveryTask};

use super::ProvisionCtx;
use cloudnest_shared::errors::ProvisionError;

/// Log task start and return the VM name for log fields.
pub(crate) async fn task_start(ctx: &ProvisionCtx, task_name: &str) -> String {
    let vm = ctx.lock().await.options.vm_name.clone();
    tracing::info!(vm = %vm, task = task_name, "Task started");
    vm
}

pub(crate) fn log_task_error(vm: &str, task_name: &str, error: &ProvisionError) {
    tracing::error!(vm = vm, task = task_name, error = %error, "Task failed");
}
