//! cloudnest CLI.
//!
//! Inputs follow the GitHub Actions convention: every flag also reads an
//! `INPUT_<NAME>` environment variable, and empty values fall back to defaults.

use anyhow::Context;
use clap::Parser;
use cloudnest::{
    FsCredentialSink, ProcessRunner, ProvisionerOptions, Provisioner, ProvisioningConfig,
    ProvisioningInputs, config::expand_home, util::parse_millis,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "cloudnest",
    about = "Provision a Sunbeam OpenStack cloud in a nested LXD VM and route to it"
)]
struct Args {
    /// Ubuntu release of the VM image [default: 24.04]
    #[arg(long, env = "INPUT_FLAVOR")]
    flavor: Option<String>,

    /// Virtual CPUs [default: 6]
    #[arg(long, env = "INPUT_CORES")]
    cores: Option<String>,

    /// VM memory, e.g. 32GiB [default: 32GiB]
    #[arg(long, env = "INPUT_MEMORY")]
    memory: Option<String>,

    /// Root disk size, e.g. 50GB [default: 50GB]
    #[arg(long, env = "INPUT_DISK")]
    disk: Option<String>,

    /// Name of the LXD instance
    #[arg(long, default_value = "openstack")]
    vm_name: String,

    /// Where to write the admin clouds.yaml
    #[arg(long, default_value = "~/.config/openstack/clouds.yaml")]
    clouds_yaml: PathBuf,

    /// Deadline per readiness gate, in milliseconds [default: 300000]
    #[arg(long, env = "INPUT_GATE_TIMEOUT_MS")]
    gate_timeout_ms: Option<String>,

    /// Poll interval of the readiness gates, in milliseconds [default: 10000]
    #[arg(long, env = "INPUT_GATE_POLL_INTERVAL_MS")]
    gate_poll_interval_ms: Option<String>,

    /// Also write logs to cloudnest.log in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _guard = match cloudnest::init_logging(args.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = ProvisioningConfig::resolve(ProvisioningInputs {
        flavor: args.flavor,
        cores: args.cores,
        memory: args.memory,
        disk: args.disk,
    })
    .context("invalid provisioning input")?;

    let mut options = ProvisionerOptions {
        vm_name: args.vm_name,
        clouds_yaml_path: expand_home(&args.clouds_yaml),
        ..Default::default()
    };
    if let Some(raw) = args.gate_timeout_ms.as_deref().filter(|raw| !raw.trim().is_empty()) {
        options.gate_timeout = parse_millis(raw).context("invalid gate timeout")?;
    }
    if let Some(raw) = args
        .gate_poll_interval_ms
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
    {
        options.gate_poll_interval = parse_millis(raw).context("invalid gate poll interval")?;
    }

    let report = Provisioner::new(
        config,
        options,
        Arc::new(ProcessRunner::new()),
        Arc::new(FsCredentialSink),
    )
    .run()
    .await
    .context("provisioning failed")?;

    let elapsed = report.finished_at - report.started_at;
    tracing::info!(
        vm = %report.vm_name,
        gateway = %report.gateway,
        subnet = %report.route_subnet,
        elapsed_secs = elapsed.num_seconds(),
        "OpenStack is ready"
    );
    for path in &report.credential_paths {
        tracing::info!(path = %path.display(), "Credentials written");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
