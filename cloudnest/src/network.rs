//! Network topology discovery.
//!
//! Decodes the instance list reported by LXD into a `NetworkInventory` and
//! picks the VM address the host should route through.

use crate::util::CommandLine;
use cloudnest_shared::errors::{ProvisionError, ProvisionResult, ResolutionFailure};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Per-VM interfaces, keyed by VM name.
///
/// Interfaces are kept in name order so "first matching interface" does not
/// depend on how the hypervisor happened to serialize them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkInventory {
    pub vms: BTreeMap<String, VmNetwork>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmNetwork {
    pub interfaces: BTreeMap<String, Interface>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Interface {
    #[serde(default)]
    pub addresses: Vec<InterfaceAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterfaceAddress {
    #[serde(default)]
    pub family: String,
    pub address: String,
    pub netmask: String,
}

// Wire shape of `lxc list --format=json`, reduced to the fields used here.
#[derive(Deserialize)]
struct LxcInstance {
    name: String,
    #[serde(default)]
    state: Option<LxcState>,
}

#[derive(Deserialize)]
struct LxcState {
    #[serde(default)]
    network: Option<BTreeMap<String, Interface>>,
}

impl NetworkInventory {
    /// Parse the output of `lxc list --format=json`.
    ///
    /// Stopped instances report no state; they appear with no interfaces.
    pub fn from_lxc_json(raw: &str) -> ProvisionResult<Self> {
        let instances: Vec<LxcInstance> = serde_json::from_str(raw)
            .map_err(|e| ProvisionError::Parse(format!("instance list: {}", e)))?;

        let vms = instances
            .into_iter()
            .map(|instance| {
                let interfaces = instance
                    .state
                    .and_then(|state| state.network)
                    .unwrap_or_default();
                (instance.name, VmNetwork { interfaces })
            })
            .collect();

        Ok(Self { vms })
    }
}

/// Select the routable IPv4 address of `vm_name`.
///
/// Takes the first interface whose name starts with `interface_prefix`, then
/// the first of its addresses whose netmask equals `netmask`.
pub fn resolve_gateway_address(
    inventory: &NetworkInventory,
    vm_name: &str,
    interface_prefix: &str,
    netmask: &str,
) -> Result<String, ResolutionFailure> {
    let vm = inventory
        .vms
        .get(vm_name)
        .ok_or_else(|| ResolutionFailure::VmNotFound(vm_name.to_string()))?;

    let (interface_name, interface) = vm
        .interfaces
        .iter()
        .find(|(name, _)| name.starts_with(interface_prefix))
        .ok_or_else(|| ResolutionFailure::InterfaceNotFound {
            vm: vm_name.to_string(),
            prefix: interface_prefix.to_string(),
        })?;

    let address = interface
        .addresses
        .iter()
        .find(|addr| addr.netmask == netmask)
        .ok_or_else(|| ResolutionFailure::AddressNotFound {
            interface: interface_name.clone(),
            netmask: netmask.to_string(),
        })?;

    tracing::debug!(
        vm = vm_name,
        interface = %interface_name,
        address = %address.address,
        "Resolved gateway address"
    );

    Ok(address.address.clone())
}

/// Route `subnet` on the host through `gateway`.
///
/// Uses `replace` so a host that already carries the route from an earlier
/// run is updated instead of rejected.
pub fn host_route(subnet: &str, gateway: &str) -> CommandLine {
    CommandLine::new("sudo").args(["ip", "route", "replace", subnet, "via", gateway])
}
