//! LXD command builders and output decoding.
//!
//! Only the command-line contract of `lxc` is relied upon. Structured output
//! is always requested as JSON (`lxc query`, `lxc list --format=json`).

use crate::config::ProvisioningConfig;
use crate::util::CommandLine;
use cloudnest_shared::errors::{ProvisionError, ProvisionResult};
use serde::Deserialize;

/// Reported process count while the guest agent is not yet running.
pub const AGENT_NOT_RUNNING: i64 = -1;

/// Builds `lxc` invocations for one named instance.
#[derive(Debug, Clone)]
pub struct Lxd {
    vm_name: String,
}

impl Lxd {
    pub fn new(vm_name: impl Into<String>) -> Self {
        Self {
            vm_name: vm_name.into(),
        }
    }

    /// `sudo lxd init --auto`. Safe to repeat on an initialized host.
    pub fn init(&self) -> CommandLine {
        CommandLine::new("sudo").args(["lxd", "init", "--auto"])
    }

    /// Plain `lxc list`, run for the log.
    pub fn list(&self) -> CommandLine {
        CommandLine::new("lxc").arg("list")
    }

    /// `lxc list --format=json`, the network inventory source.
    pub fn list_json(&self) -> CommandLine {
        CommandLine::new("lxc").args(["list", "--format=json"])
    }

    /// Create (but do not start) the VM with the requested shape.
    pub fn create_vm(&self, config: &ProvisioningConfig) -> CommandLine {
        CommandLine::new("lxc")
            .arg("init")
            .arg(format!("ubuntu:{}", config.flavor))
            .arg(&self.vm_name)
            .arg("--vm")
            .arg("-d")
            .arg(format!("root,size={}", config.disk))
            .arg("-c")
            .arg(format!("limits.cpu={}", config.cores))
            .arg("-c")
            .arg(format!("limits.memory={}", config.memory))
    }

    pub fn start_vm(&self) -> CommandLine {
        CommandLine::new("lxc").args(["start", self.vm_name.as_str()])
    }

    /// Query the instance state document (`GET /1.0/instances/<name>/state`).
    pub fn query_state(&self) -> CommandLine {
        CommandLine::new("lxc")
            .arg("query")
            .arg(format!("/1.0/instances/{}/state", self.vm_name))
    }

    /// Run `command` inside the VM as root.
    pub fn exec<I, S>(&self, command: I) -> CommandLine
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandLine::new("lxc")
            .args(["exec", self.vm_name.as_str(), "--"])
            .args(command)
    }

    /// Run `command` inside the VM through a login shell of `user`.
    pub fn exec_as<I, S>(&self, user: &str, command: I) -> CommandLine
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exec(["sudo", "-i", "-u", user]).args(command)
    }
}

#[derive(Debug, Deserialize)]
struct InstanceState {
    processes: i64,
}

/// Whether the guest agent is up, judged from an `lxc query` state document.
pub fn agent_ready(state_json: &str) -> ProvisionResult<bool> {
    let state: InstanceState = serde_json::from_str(state_json)
        .map_err(|e| ProvisionError::Parse(format!("instance state: {}", e)))?;
    Ok(state.processes != AGENT_NOT_RUNNING)
}
