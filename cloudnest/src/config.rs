//! Provisioning configuration.
//!
//! `ProvisioningConfig` holds the caller-tunable VM shape and is resolved once,
//! before the pipeline starts. `ProvisionerOptions` holds the values that the
//! action treats as fixed (VM name, routed subnet, credential paths, timeouts)
//! so they can be threaded explicitly instead of living in globals.

use cloudnest_shared::errors::{ProvisionError, ProvisionResult};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_FLAVOR: &str = "24.04";
pub const DEFAULT_CORES: &str = "6";
pub const DEFAULT_MEMORY: &str = "32GiB";
pub const DEFAULT_DISK: &str = "50GB";

/// Raw, unvalidated inputs as handed over by the caller.
///
/// `None` and empty strings both mean "use the default".
#[derive(Debug, Clone, Default)]
pub struct ProvisioningInputs {
    pub flavor: Option<String>,
    pub cores: Option<String>,
    pub memory: Option<String>,
    pub disk: Option<String>,
}

/// VM shape for a single pipeline run. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisioningConfig {
    pub flavor: String,
    pub cores: u32,
    pub memory: ByteSize,
    pub disk: ByteSize,
}

impl ProvisioningConfig {
    /// Substitute defaults for missing inputs and validate the result.
    pub fn resolve(inputs: ProvisioningInputs) -> ProvisionResult<Self> {
        let flavor = or_default(inputs.flavor, DEFAULT_FLAVOR);
        let cores = or_default(inputs.cores, DEFAULT_CORES);
        let memory = or_default(inputs.memory, DEFAULT_MEMORY);
        let disk = or_default(inputs.disk, DEFAULT_DISK);

        let cores: u32 = cores.parse().map_err(|_| {
            ProvisionError::InvalidInput(format!("cores must be a positive integer, got `{cores}`"))
        })?;
        if cores == 0 {
            return Err(ProvisionError::InvalidInput(
                "cores must be greater than zero".into(),
            ));
        }

        let config = Self {
            flavor,
            cores,
            memory: memory.parse()?,
            disk: disk.parse()?,
        };

        tracing::debug!(
            flavor = %config.flavor,
            cores = config.cores,
            memory = %config.memory,
            disk = %config.disk,
            "Resolved provisioning config"
        );

        Ok(config)
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            flavor: DEFAULT_FLAVOR.to_string(),
            cores: 6,
            memory: ByteSize::from_bytes(32 * 1024 * 1024 * 1024),
            disk: ByteSize::from_bytes(50 * 1000 * 1000 * 1000),
        }
    }
}

fn or_default(value: Option<String>, default: &str) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

/// A size in bytes, parsed from the unit suffixes LXD understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ByteSize(u64);

impl ByteSize {
    pub fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }
}

const UNITS: &[(&str, u64)] = &[
    ("B", 1),
    ("kB", 1000),
    ("KB", 1000),
    ("MB", 1000 * 1000),
    ("GB", 1000 * 1000 * 1000),
    ("TB", 1000 * 1000 * 1000 * 1000),
    ("KiB", 1024),
    ("MiB", 1024 * 1024),
    ("GiB", 1024 * 1024 * 1024),
    ("TiB", 1024 * 1024 * 1024 * 1024),
];

impl FromStr for ByteSize {
    type Err = ProvisionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let split = raw
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(raw.len());
        let (number, unit) = raw.split_at(split);

        let invalid = || ProvisionError::InvalidInput(format!("invalid size `{raw}`"));

        let number: u64 = number.parse().map_err(|_| invalid())?;
        let multiplier = if unit.is_empty() {
            1
        } else {
            UNITS
                .iter()
                .find(|(suffix, _)| *suffix == unit)
                .map(|(_, m)| *m)
                .ok_or_else(invalid)?
        };

        let bytes = number.checked_mul(multiplier).ok_or_else(invalid)?;
        if bytes == 0 {
            return Err(ProvisionError::InvalidInput(format!(
                "size must be greater than zero, got `{raw}`"
            )));
        }

        Ok(Self(bytes))
    }
}

/// Renders in the plain-bytes form LXD accepts for `limits.memory` and `size=`.
impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

/// Fixed parameters of the provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionerOptions {
    /// Name of the LXD instance hosting the cloud.
    pub vm_name: String,
    /// Guest user that runs the cluster bootstrap tooling.
    pub vm_user: String,
    /// Subnet routed from the host through the VM (cloud load-balancer range).
    pub route_subnet: String,
    /// Name prefix of the VM's virtio Ethernet devices.
    pub interface_prefix: String,
    /// Prefix length identifying the externally reachable address.
    pub gateway_netmask: String,
    /// Snap channel of the `openstack` snap.
    pub openstack_channel: String,
    /// Destination of the exported admin credentials.
    pub clouds_yaml_path: PathBuf,
    /// Copy of the credentials kept in the working directory.
    pub workdir_copy: PathBuf,
    pub gate_timeout: Duration,
    pub gate_poll_interval: Duration,
    /// Settling time for the guest identity service after the user appears.
    pub identity_delay: Duration,
    /// Upper bound for VM creation and start.
    pub launch_timeout: Duration,
    /// Upper bound for package install, node preparation and bootstrap.
    pub install_timeout: Duration,
}

impl Default for ProvisionerOptions {
    fn default() -> Self {
        Self {
            vm_name: "openstack".to_string(),
            vm_user: "ubuntu".to_string(),
            route_subnet: "172.16.1.192/26".to_string(),
            interface_prefix: "enp".to_string(),
            gateway_netmask: "24".to_string(),
            openstack_channel: "2024.1/beta".to_string(),
            clouds_yaml_path: expand_home(Path::new("~/.config/openstack/clouds.yaml")),
            workdir_copy: PathBuf::from("clouds.yaml"),
            gate_timeout: Duration::from_secs(5 * 60),
            gate_poll_interval: Duration::from_secs(10),
            identity_delay: Duration::from_secs(10),
            launch_timeout: Duration::from_secs(5 * 60),
            install_timeout: Duration::from_secs(60 * 60),
        }
    }
}

/// Expand a leading `~` to the current user's home directory.
///
/// Paths without `~`, or hosts without a resolvable home, are returned as-is.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let config = ProvisioningConfig::resolve(ProvisioningInputs::default()).unwrap();
        assert_eq!(config, ProvisioningConfig::default());
    }

    #[test]
    fn test_resolve_empty_inputs_use_defaults() {
        let config = ProvisioningConfig::resolve(ProvisioningInputs {
            flavor: Some(String::new()),
            cores: Some("  ".into()),
            memory: None,
            disk: Some(String::new()),
        })
        .unwrap();

        assert_eq!(config.flavor, "24.04");
        assert_eq!(config.cores, 6);
    }

    #[test]
    fn test_resolve_overrides() {
        let config = ProvisioningConfig::resolve(ProvisioningInputs {
            flavor: Some("22.04".into()),
            cores: Some("16".into()),
            memory: Some("64GiB".into()),
            disk: Some("100GB".into()),
        })
        .unwrap();

        assert_eq!(config.flavor, "22.04");
        assert_eq!(config.cores, 16);
        assert_eq!(config.memory.bytes(), 64 * 1024 * 1024 * 1024);
        assert_eq!(config.disk.bytes(), 100_000_000_000);
    }

    #[test]
    fn test_resolve_rejects_bad_cores() {
        for cores in ["six", "-1", "0", "2.5"] {
            let result = ProvisioningConfig::resolve(ProvisioningInputs {
                cores: Some(cores.into()),
                ..Default::default()
            });
            assert!(
                matches!(result, Err(ProvisionError::InvalidInput(_))),
                "cores `{cores}` should be rejected"
            );
        }
    }

    #[test]
    fn test_byte_size_parse() {
        assert_eq!("512".parse::<ByteSize>().unwrap().bytes(), 512);
        assert_eq!("1KiB".parse::<ByteSize>().unwrap().bytes(), 1024);
        assert_eq!("2kB".parse::<ByteSize>().unwrap().bytes(), 2000);
        assert_eq!("32GiB".parse::<ByteSize>().unwrap().to_string(), "34359738368B");
    }

    #[test]
    fn test_byte_size_rejects_garbage() {
        for raw in ["", "GiB", "12XB", "0GB", "1.5GiB", "99999999999999TiB"] {
            assert!(raw.parse::<ByteSize>().is_err(), "`{raw}` should be rejected");
        }
    }

    #[test]
    fn test_config_serializes_sizes_as_bytes() {
        let value = serde_json::to_value(ProvisioningConfig::default()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "flavor": "24.04",
                "cores": 6,
                "memory": 34_359_738_368u64,
                "disk": 50_000_000_000u64,
            })
        );
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(
            expand_home(Path::new("/etc/openstack/clouds.yaml")),
            PathBuf::from("/etc/openstack/clouds.yaml")
        );
        assert_eq!(expand_home(Path::new("clouds.yaml")), PathBuf::from("clouds.yaml"));
    }
}
