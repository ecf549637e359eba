//! Provisioning orchestration.
//!
//! ## Architecture
//!
//! ```text
//!   1. hypervisor   HypervisorInit      (lxd init --auto)
//!   2. launch       VmLaunch            (lxc init --vm + lxc start)
//!   3. readiness    VmAgentReady → UserProvisioned → IdentityPropagation → SeedServiceActive
//!   4. install      OpenstackInstall    (snap install openstack)
//!   5. bootstrap    NodePrepare → ClusterBootstrap
//!   6. credentials  CredentialsExport → CredentialsWrite
//!   7. routing      NetworkDiscovery → HostRoute
//! ```
//!
//! Every failure is fatal and nothing is torn down: a failed run leaves the VM
//! (and whatever part of the cluster got bootstrapped) running for inspection.
//! Re-run from scratch rather than resuming.

mod readiness;
mod tasks;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use readiness::{Gate, ReadinessCheck, ReadinessProbes};
pub use types::{ProvisionContext, ProvisionReport};

use crate::config::{ProvisionerOptions, ProvisioningConfig};
use crate::credentials::CredentialSink;
use crate::pipeline::{
    BoxedTask, ExecutionPlan, PipelineBuilder, PipelineExecutor, PipelineRun, Stage,
};
use crate::util::CommandRunner;
use chrono::Utc;
use cloudnest_shared::errors::{ProvisionError, ProvisionResult};
use std::sync::Arc;
use tokio::sync::Mutex;

use tasks::{
    ClusterBootstrapTask, CredentialsExportTask, CredentialsWriteTask, HostRouteTask,
    HypervisorInitTask, NetworkDiscoveryTask, NodePrepareTask, OpenstackInstallTask,
    VmLaunchTask,
};

pub type ProvisionCtx = Arc<Mutex<ProvisionContext>>;

// ============================================================================
// EXECUTION PLAN
// ============================================================================

fn get_execution_plan() -> ExecutionPlan<ProvisionCtx> {
    let stages: Vec<Stage<BoxedTask<ProvisionCtx>>> = vec![
        Stage::sequential("hypervisor", vec![Box::new(HypervisorInitTask)]),
        Stage::sequential("launch", vec![Box::new(VmLaunchTask)]),
        Stage::sequential("readiness", readiness::readiness_gates()),
        Stage::sequential("install", vec![Box::new(OpenstackInstallTask)]),
        Stage::sequential(
            "bootstrap",
            vec![Box::new(NodePrepareTask), Box::new(ClusterBootstrapTask)],
        ),
        Stage::sequential(
            "credentials",
            vec![Box::new(CredentialsExportTask), Box::new(CredentialsWriteTask)],
        ),
        Stage::sequential(
            "routing",
            vec![Box::new(NetworkDiscoveryTask), Box::new(HostRouteTask)],
        ),
    ];

    ExecutionPlan::new(stages)
}

/// Runs the full provisioning pipeline once.
///
/// # Example
///
/// ```ignore
/// let provisioner = Provisioner::new(
///     ProvisioningConfig::resolve(inputs)?,
///     ProvisionerOptions::default(),
///     Arc::new(ProcessRunner::new()),
///     Arc::new(FsCredentialSink),
/// );
/// let report = provisioner.run().await?;
/// ```
pub struct Provisioner {
    config: ProvisioningConfig,
    options: ProvisionerOptions,
    runner: Arc<dyn CommandRunner>,
    sink: Arc<dyn CredentialSink>,
}

impl Provisioner {
    pub fn new(
        config: ProvisioningConfig,
        options: ProvisionerOptions,
        runner: Arc<dyn CommandRunner>,
        sink: Arc<dyn CredentialSink>,
    ) -> Self {
        Self {
            config,
            options,
            runner,
            sink,
        }
    }

    /// Task names in the order they run.
    pub fn task_names() -> Vec<String> {
        get_execution_plan()
            .task_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Execute every stage and return the raw run (state + metrics) along
    /// with the final context.
    pub async fn execute(self) -> (PipelineRun, ProvisionCtx) {
        let ctx = ProvisionContext::new(self.config, self.options, self.runner, self.sink);
        let ctx = Arc::new(Mutex::new(ctx));

        let pipeline = PipelineBuilder::from_plan(get_execution_plan());
        let run = PipelineExecutor::execute(pipeline, Arc::clone(&ctx)).await;
        (run, ctx)
    }

    /// Execute every stage, failing with the first task error.
    pub async fn run(self) -> ProvisionResult<ProvisionReport> {
        let started_at = Utc::now();
        let (run, ctx) = self.execute().await;

        run.metrics.log_summary();
        run.into_result()?;

        let ctx = ctx.lock().await;
        let gateway = ctx
            .gateway
            .clone()
            .ok_or_else(|| ProvisionError::Internal("gateway was not set".into()))?;

        Ok(ProvisionReport {
            vm_name: ctx.options.vm_name.clone(),
            config: ctx.config.clone(),
            gateway,
            route_subnet: ctx.options.route_subnet.clone(),
            credential_paths: vec![
                ctx.options.clouds_yaml_path.clone(),
                ctx.options.workdir_copy.clone(),
            ],
            started_at,
            finished_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{RecordingSink, ScriptedRunner};
    use super::*;
    use crate::pipeline::PipelineState;
    use crate::util::StepResult;
    use std::path::PathBuf;

    const CLOUDS_YAML: &str = "clouds:\n  sunbeam-admin:\n    auth:\n      username: admin\n";
    const SEED_ACTIVE: &str = "snapd.seeded.service - Wait until snapd is fully seeded\n   \
                               Active: active (exited) since Tue 2024-06-04 10:00:00 UTC\n";
    const INVENTORY: &str = r#"[{"name":"openstack","state":{"network":{
        "br-ex":{"addresses":[{"family":"inet","address":"10.20.20.1","netmask":"24"}]},
        "enp5s0":{"addresses":[{"family":"inet","address":"10.248.96.56","netmask":"24"}]},
        "lo":{"addresses":[{"family":"inet","address":"127.0.0.1","netmask":"8"}]}
    }}}]"#;

    fn options() -> ProvisionerOptions {
        ProvisionerOptions {
            clouds_yaml_path: PathBuf::from("/home/runner/.config/openstack/clouds.yaml"),
            workdir_copy: PathBuf::from("clouds.yaml"),
            ..Default::default()
        }
    }

    fn healthy_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .respond_seq(
                "lxc query",
                vec![
                    StepResult::stdout(r#"{"processes":-1}"#),
                    StepResult::stdout(r#"{"processes":38}"#),
                ],
            )
            .respond("systemctl status", StepResult::stdout(SEED_ACTIVE))
            .respond("list --format=json", StepResult::stdout(INVENTORY))
    }

    fn provisioner(runner: &Arc<ScriptedRunner>, sink: &Arc<RecordingSink>) -> Provisioner {
        let runner: Arc<dyn CommandRunner> = runner.clone();
        let sink: Arc<dyn CredentialSink> = sink.clone();
        Provisioner::new(ProvisioningConfig::default(), options(), runner, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_provisions_and_routes_through_gateway() {
        let runner = Arc::new(
            healthy_runner().respond("cloud-config -a", StepResult::stdout(CLOUDS_YAML)),
        );
        let sink = Arc::new(RecordingSink::default());

        let report = provisioner(&runner, &sink).run().await.unwrap();

        assert_eq!(report.gateway, "10.248.96.56");
        assert_eq!(report.route_subnet, "172.16.1.192/26");

        let calls = runner.calls();
        assert_eq!(calls.first().map(String::as_str), Some("sudo lxd init --auto"));
        assert_eq!(
            calls.last().map(String::as_str),
            Some("sudo ip route replace 172.16.1.192/26 via 10.248.96.56")
        );

        let writes = sink.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(
            writes[0].0,
            PathBuf::from("/home/runner/.config/openstack/clouds.yaml")
        );
        assert_eq!(writes[1].0, PathBuf::from("clouds.yaml"));
        assert!(writes.iter().all(|(_, contents)| contents == CLOUDS_YAML));
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_route_is_time_bounded() {
        let runner = Arc::new(
            healthy_runner().respond("cloud-config -a", StepResult::stdout(CLOUDS_YAML)),
        );
        let sink = Arc::new(RecordingSink::default());

        provisioner(&runner, &sink).run().await.unwrap();

        assert_eq!(
            runner.timeout_for("ip route replace"),
            Some(options().launch_timeout)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_instances_listed_again_after_start() {
        let runner = Arc::new(
            healthy_runner().respond("cloud-config -a", StepResult::stdout(CLOUDS_YAML)),
        );
        let sink = Arc::new(RecordingSink::default());

        provisioner(&runner, &sink).run().await.unwrap();

        let calls = runner.calls();
        let listings: Vec<usize> = calls
            .iter()
            .enumerate()
            .filter(|(_, call)| call.as_str() == "lxc list")
            .map(|(index, _)| index)
            .collect();
        let started = calls
            .iter()
            .position(|call| call.starts_with("lxc start"))
            .unwrap();
        assert_eq!(listings.len(), 2);
        assert!(listings[0] < started);
        assert!(listings[1] > started);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_run_in_stage_order() {
        let runner = Arc::new(
            healthy_runner().respond("cloud-config -a", StepResult::stdout(CLOUDS_YAML)),
        );
        let sink = Arc::new(RecordingSink::default());

        provisioner(&runner, &sink).run().await.unwrap();

        let calls = runner.calls();
        let position = |needle: &str| {
            calls
                .iter()
                .position(|call| call.contains(needle))
                .unwrap_or_else(|| panic!("`{needle}` was never run"))
        };
        let order = [
            "lxd init --auto",
            "lxc init ubuntu:24.04 openstack --vm",
            "lxc start openstack",
            "lxc query",
            "id ubuntu",
            "getent passwd ubuntu",
            "systemctl status snapd.seeded.service",
            "snap install openstack --channel 2024.1/beta",
            "prepare-node-script",
            "cluster bootstrap --accept-defaults",
            "cloud-config -a",
            "lxc list --format=json",
            "ip route replace",
        ];
        for pair in order.windows(2) {
            assert!(
                position(pair[0]) < position(pair[1]),
                "`{}` should run before `{}`",
                pair[0],
                pair[1]
            );
        }
        assert_eq!(runner.calls_matching("lxc query"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_credential_export_failure_aborts_before_write() {
        let runner = Arc::new(healthy_runner().respond(
            "cloud-config -a",
            StepResult::failed(1, "permission denied"),
        ));
        let sink = Arc::new(RecordingSink::default());

        let (run, _ctx) = provisioner(&runner, &sink).execute().await;

        match &run.state {
            PipelineState::Failed { stage, task, reason } => {
                assert_eq!(*stage, "credentials");
                assert_eq!(task, "credentials_export");
                match reason {
                    ProvisionError::CommandFailure {
                        exit_code, stderr, ..
                    } => {
                        assert_eq!(*exit_code, 1);
                        assert_eq!(stderr, "permission denied");
                    }
                    other => panic!("unexpected reason: {other:?}"),
                }
            }
            other => panic!("unexpected state: {other:?}"),
        }

        assert!(sink.writes().is_empty());
        assert_eq!(runner.calls_matching("cloud-config -a"), 1);
        assert_eq!(runner.calls_matching("ip route"), 0);
        assert_eq!(
            run.metrics.completed_tasks().last().copied(),
            Some("cluster_bootstrap")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_credentials_are_rejected() {
        let runner = Arc::new(healthy_runner());
        let sink = Arc::new(RecordingSink::default());

        let err = provisioner(&runner, &sink).run().await.unwrap_err();

        assert!(matches!(err, ProvisionError::InvalidInput(_)));
        assert!(sink.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_timeout_aborts_before_install() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .respond("lxc query", StepResult::stdout(r#"{"processes":12}"#))
                .respond(
                    "systemctl status",
                    StepResult::stdout("Active: activating (start)"),
                ),
        );
        let sink = Arc::new(RecordingSink::default());

        let err = provisioner(&runner, &sink).run().await.unwrap_err();

        match err {
            ProvisionError::ReadinessTimeout { gate, .. } => {
                assert_eq!(gate, "seed_service_active")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(runner.calls_matching("snap install"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_leaves_vm_in_place() {
        let runner = Arc::new(
            healthy_runner().respond("lxc start", StepResult::failed(1, "Error: not enough memory")),
        );
        let sink = Arc::new(RecordingSink::default());

        let err = provisioner(&runner, &sink).run().await.unwrap_err();

        assert_eq!(err.exit_code(), Some(1));
        let calls = runner.calls();
        assert!(
            !calls
                .iter()
                .any(|call| call.contains("delete") || call.contains("lxc stop")),
            "no teardown expected, got {calls:?}"
        );
        assert_eq!(runner.calls_matching("lxc query"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_ethernet_interface_fails_resolution() {
        let inventory = r#"[{"name":"openstack","state":{"network":{
            "lo":{"addresses":[{"family":"inet","address":"127.0.0.1","netmask":"8"}]}
        }}}]"#;
        let runner = Arc::new(
            healthy_runner()
                .respond("cloud-config -a", StepResult::stdout(CLOUDS_YAML))
                .respond("list --format=json", StepResult::stdout(inventory)),
        );
        let sink = Arc::new(RecordingSink::default());

        let err = provisioner(&runner, &sink).run().await.unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::Resolution(cloudnest_shared::ResolutionFailure::InterfaceNotFound { .. })
        ));
        assert_eq!(runner.calls_matching("ip route"), 0);
    }

    #[test]
    fn test_task_order() {
        assert_eq!(
            Provisioner::task_names(),
            vec![
                "hypervisor_init",
                "vm_launch",
                "vm_agent_ready",
                "user_provisioned",
                "identity_propagation",
                "seed_service_active",
                "openstack_install",
                "node_prepare",
                "cluster_bootstrap",
                "credentials_export",
                "credentials_write",
                "network_discovery",
                "host_route",
            ]
        );
    }
}
